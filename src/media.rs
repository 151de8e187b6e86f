//! Tracks, samples and time ranges shared by the demuxers and writers.

use std::fmt;
use std::path::PathBuf;

use bytes::Bytes;

pub const MICROS_PER_SECOND: u64 = 1_000_000;

/// Converts a tick count in `timescale` units to microseconds.
pub fn ticks_to_us(ticks: u64, timescale: u32) -> u64 {
    if timescale == 0 {
        return 0;
    }
    (ticks as u128 * MICROS_PER_SECOND as u128 / timescale as u128) as u64
}

/// Converts microseconds to the nearest tick in `timescale` units.
pub fn us_to_ticks(us: u64, timescale: u32) -> u64 {
    let scaled = us as u128 * timescale as u128;
    ((scaled + MICROS_PER_SECOND as u128 / 2) / MICROS_PER_SECOND as u128) as u64
}

/// Codec family of a track, as far as trimming cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Codec {
    /// Layer I/II/III MPEG audio; every frame carries its own sync header.
    MpegAudio,
    /// AAC carried in an MP4 sample table.
    Aac,
    /// Opus carried in an MP4 sample table.
    Opus,
    /// Anything else, identified by its mime type.
    Other(String),
}

impl Codec {
    pub fn mime(&self) -> &str {
        match self {
            Codec::MpegAudio => "audio/mpeg",
            Codec::Aac => "audio/mp4a-latm",
            Codec::Opus => "audio/opus",
            Codec::Other(mime) => mime,
        }
    }

    pub fn is_audio(&self) -> bool {
        self.mime().starts_with("audio/")
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

/// Format descriptor of a track, read once from the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackFormat {
    pub codec: Codec,
    pub sample_rate: u32,
    pub channels: u16,
    /// Codec specific configuration (the AudioSpecificConfig for AAC).
    pub codec_config: Vec<u8>,
    /// Largest sample payload in bytes.
    pub max_sample_size: u32,
    /// Media timescale the source counts sample times in.
    pub timescale: u32,
    /// Average bitrate in bits per second.
    pub bitrate: u32,
    pub language: String,
    pub duration_us: u64,
}

/// One track of an opened container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub index: usize,
    pub format: TrackFormat,
}

impl Track {
    pub fn mime(&self) -> &str {
        self.format.codec.mime()
    }
}

/// One encoded access unit, handed from demuxer to writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub data: Bytes,
    /// Presentation time in microseconds.
    pub pts_us: u64,
    pub duration_us: u64,
    /// Decodable without any earlier sample.
    pub is_sync: bool,
}

/// Requested trim window.
///
/// An `end_us` of zero means "until the end of the stream".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeRange {
    pub start_us: u64,
    pub end_us: u64,
}

impl TimeRange {
    pub fn new(start_us: u64, end_us: u64) -> Self {
        Self { start_us, end_us }
    }

    pub fn from_millis(start_ms: u64, end_ms: u64) -> Self {
        Self {
            start_us: start_ms.saturating_mul(1_000),
            end_us: end_ms.saturating_mul(1_000),
        }
    }

    /// The whole stream.
    pub fn full() -> Self {
        Self::default()
    }

    pub fn is_bounded(&self) -> bool {
        self.end_us > 0
    }

    /// Whether a sample presented at `pts_us` lies past the end bound.
    ///
    /// The window is half-open: a sample exactly at the end is excluded.
    pub fn excludes(&self, pts_us: u64) -> bool {
        self.is_bounded() && pts_us >= self.end_us
    }
}

/// How the trimmed output is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputVariant {
    /// Payload bytes written back to back as an elementary stream.
    Raw,
    /// Samples framed in a single-track MP4 container.
    Muxed,
}

impl OutputVariant {
    pub fn for_codec(codec: &Codec) -> Self {
        match codec {
            Codec::MpegAudio => OutputVariant::Raw,
            Codec::Aac | Codec::Opus | Codec::Other(_) => OutputVariant::Muxed,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputVariant::Raw => "mp3",
            OutputVariant::Muxed => "m4a",
        }
    }

    /// Mime type of the file this variant produces.
    pub fn mime(self) -> &'static str {
        match self {
            OutputVariant::Raw => "audio/mpeg",
            OutputVariant::Muxed => "audio/mp4",
        }
    }
}

impl fmt::Display for OutputVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputVariant::Raw => f.write_str("raw"),
            OutputVariant::Muxed => f.write_str("muxed"),
        }
    }
}

/// Outcome of a successful trim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimResult {
    pub path: PathBuf,
    pub variant: OutputVariant,
    /// Number of samples written.
    pub samples: u64,
    /// Payload bytes written.
    pub bytes: u64,
    pub first_pts_us: Option<u64>,
    pub last_pts_us: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_range_excludes_nothing() {
        let range = TimeRange::from_millis(5_000, 0);
        assert!(!range.is_bounded());
        assert!(!range.excludes(u64::MAX));
    }

    #[test]
    fn end_bound_is_exclusive() {
        let range = TimeRange::from_millis(0, 10_000);
        assert!(!range.excludes(9_999_999));
        assert!(range.excludes(10_000_000));
    }

    #[test]
    fn tick_conversion_survives_aac_frame_durations() {
        let us = ticks_to_us(1024, 44_100);
        assert_eq!(us, 23_219);
        assert_eq!(us_to_ticks(us, 44_100), 1024);
        assert_eq!(ticks_to_us(7, 0), 0);
    }

    #[test]
    fn variant_follows_codec_family() {
        assert_eq!(OutputVariant::for_codec(&Codec::MpegAudio), OutputVariant::Raw);
        assert_eq!(OutputVariant::for_codec(&Codec::Aac), OutputVariant::Muxed);
        assert_eq!(
            OutputVariant::for_codec(&Codec::Other("audio/flac".into())),
            OutputVariant::Muxed
        );
        assert_eq!(OutputVariant::Raw.extension(), "mp3");
        assert_eq!(OutputVariant::Muxed.extension(), "m4a");
    }

    #[test]
    fn only_audio_mimes_count_as_audio() {
        assert!(Codec::Opus.is_audio());
        assert!(!Codec::Other("video/avc".into()).is_audio());
    }
}
