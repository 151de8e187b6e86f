//! Demuxing of every non-ISO container through `symphonia`'s format readers.
//!
//! Covers MPEG audio (`.mp3`, `.mp2`), ADTS AAC, Ogg, FLAC, WAV and the other
//! formats its default registry knows. Packets are handed out untouched: for MPEG
//! audio a packet is a whole frame, header included.

use std::collections::VecDeque;
use std::io;

use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;
use symphonia::core::codecs::{
    CodecParameters, CODEC_TYPE_AAC, CODEC_TYPE_MP1, CODEC_TYPE_MP2, CODEC_TYPE_MP3,
    CODEC_TYPE_NULL, CODEC_TYPE_OPUS,
};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::{Time, TimeBase};

use crate::media::{Codec, Sample, Track, TrackFormat, MICROS_PER_SECOND};
use crate::{Error, Result};

fn ts_to_us(ts: u64, time_base: TimeBase) -> u64 {
    if time_base.denom == 0 {
        return 0;
    }
    (ts as u128 * time_base.numer as u128 * MICROS_PER_SECOND as u128 / time_base.denom as u128)
        as u64
}

/// Builds the AudioSpecificConfig matching an ADTS header at the start of `head`.
fn adts_audio_specific_config(head: &[u8]) -> Option<Vec<u8>> {
    if head.len() < 4 {
        return None;
    }
    let word = BigEndian::read_u32(head);
    // 12-bit sync, layer always 0.
    if word >> 20 != 0xFFF || (word >> 17) & 0b11 != 0 {
        return None;
    }
    let object_type = ((word >> 14) & 0b11) as u8 + 1;
    let freq_index = ((word >> 10) & 0xF) as u8;
    let chan_conf = ((word >> 6) & 0b111) as u8;

    Some(vec![
        (object_type << 3) | (freq_index >> 1),
        ((freq_index & 1) << 7) | (chan_conf << 3),
    ])
}

fn codec_of(params: &CodecParameters) -> Codec {
    match params.codec {
        CODEC_TYPE_MP1 | CODEC_TYPE_MP2 | CODEC_TYPE_MP3 => Codec::MpegAudio,
        CODEC_TYPE_AAC => Codec::Aac,
        CODEC_TYPE_OPUS => Codec::Opus,
        CODEC_TYPE_NULL => Codec::Other("application/octet-stream".to_string()),
        other => {
            let name = symphonia::default::get_codecs()
                .get_codec(other)
                .map(|d| d.short_name)
                .unwrap_or("unknown");
            Codec::Other(format!("audio/{}", name))
        }
    }
}

fn time_base_of(params: &CodecParameters) -> Option<TimeBase> {
    params
        .time_base
        .or_else(|| params.sample_rate.map(|rate| TimeBase::new(1, rate)))
}

fn describe_track(
    index: usize,
    track: &symphonia::core::formats::Track,
    head: &[u8],
    size: u64,
) -> Track {
    let params = &track.codec_params;
    let codec = codec_of(params);
    let sample_rate = params.sample_rate.unwrap_or(0);
    let time_base = time_base_of(params);

    let duration_us = match (params.n_frames, time_base) {
        (Some(frames), Some(tb)) => ts_to_us(frames, tb),
        _ => 0,
    };
    let bitrate = if duration_us > 0 {
        (size as u128 * 8 * MICROS_PER_SECOND as u128 / duration_us as u128) as u32
    } else {
        0
    };

    let codec_config = match (&codec, &params.extra_data) {
        (_, Some(extra)) => extra.to_vec(),
        (Codec::Aac, None) => adts_audio_specific_config(head).unwrap_or_default(),
        _ => Vec::new(),
    };
    let timescale = match time_base {
        Some(tb) if tb.numer == 1 => tb.denom,
        _ => sample_rate,
    };

    Track {
        index,
        format: TrackFormat {
            codec,
            sample_rate,
            channels: params.channels.map(|c| c.count() as u16).unwrap_or(0),
            codec_config,
            max_sample_size: 0,
            timescale,
            bitrate,
            language: track.language.clone().unwrap_or_else(|| "und".to_string()),
            duration_us,
        },
    }
}

#[derive(Debug, Clone, Copy)]
struct Selection {
    track_id: u32,
    time_base: TimeBase,
    sample_count: Option<u64>,
}

/// Demuxer over any container `symphonia` has a format reader for.
pub struct GenericDemuxer {
    reader: Box<dyn FormatReader>,
    tracks: Vec<Track>,
    /// Reader track ids, parallel to `tracks`.
    track_ids: Vec<u32>,
    selection: Option<Selection>,
    /// Samples read ahead while resolving a seek.
    pending: VecDeque<Sample>,
    finished: bool,
}

impl GenericDemuxer {
    /// Detects the container of `source` and describes its tracks.
    ///
    /// `head` holds the first bytes of the source, used to recover codec
    /// configuration the reader does not expose.
    pub fn new(
        source: Box<dyn MediaSource>,
        extension: Option<&str>,
        head: &[u8],
        size: u64,
    ) -> Result<Self> {
        let mss = MediaSourceStream::new(source, Default::default());
        let mut hint = Hint::new();
        if let Some(extension) = extension {
            hint.with_extension(extension);
        }

        let found = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| Error::UnsupportedFormat(format!("Unrecognised container: {}", e)))?;
        let reader = found.format;

        let mut tracks = Vec::new();
        let mut track_ids = Vec::new();
        for track in reader.tracks() {
            let described = describe_track(tracks.len(), track, head, size);
            log::debug!(
                "Found track {} ({}, {} Hz, {} channels)",
                track.id,
                described.mime(),
                described.format.sample_rate,
                described.format.channels
            );
            tracks.push(described);
            track_ids.push(track.id);
        }

        Ok(Self {
            reader,
            tracks,
            track_ids,
            selection: None,
            pending: VecDeque::new(),
            finished: false,
        })
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Restricts packet reading to the track at `index`.
    pub fn select(&mut self, index: usize) -> Result<()> {
        let track_id = *self
            .track_ids
            .get(index)
            .ok_or_else(|| Error::Unknown(format!("No track at index {}", index)))?;
        let track = self
            .reader
            .tracks()
            .iter()
            .find(|t| t.id == track_id)
            .ok_or_else(|| Error::Unknown(format!("Track {} disappeared", track_id)))?;

        let params = &track.codec_params;
        let time_base = time_base_of(params).ok_or_else(|| {
            Error::UnsupportedFormat(format!("Track {} has no time base", track_id))
        })?;
        let sample_count = match (params.n_frames, params.max_frames_per_packet) {
            (Some(frames), Some(per_packet)) if per_packet > 0 => {
                Some((frames + per_packet - 1) / per_packet)
            }
            _ => None,
        };

        self.selection = Some(Selection {
            track_id,
            time_base,
            sample_count,
        });
        Ok(())
    }

    pub fn sample_count(&self) -> Option<u64> {
        self.selection.and_then(|s| s.sample_count)
    }

    fn selection(&self) -> Result<Selection> {
        self.selection
            .ok_or_else(|| Error::Unknown("No track selected".to_string()))
    }

    /// Moves to the last packet presented at or before `position_us`.
    ///
    /// The reader's own seek lands somewhere before the target; packets are
    /// then read forward until the one after the target shows up.
    pub fn seek(&mut self, position_us: u64) -> Result<()> {
        let selection = self.selection()?;
        self.pending.clear();

        if position_us > 0 {
            let time = Time::new(
                position_us / MICROS_PER_SECOND,
                (position_us % MICROS_PER_SECOND) as f64 / MICROS_PER_SECOND as f64,
            );
            let to = SeekTo::Time {
                time,
                track_id: Some(selection.track_id),
            };
            match self.reader.seek(SeekMode::Accurate, to) {
                Ok(seeked) => {
                    self.finished = false;
                    log::debug!(
                        "Reader seeked to ts {} for requested ts {}",
                        seeked.actual_ts,
                        seeked.required_ts
                    );
                }
                Err(SymphoniaError::SeekError(kind)) => {
                    log::warn!("Reader cannot seek ({:?}), reading forward to {}us", kind, position_us);
                }
                Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    log::warn!("Seek to {}us ran past the end of the stream", position_us);
                    self.finished = true;
                }
                Err(e) => return Err(Error::from_symphonia(e, "Failed to seek")),
            }
        }

        let mut at_or_before = None;
        while let Some(sample) = self.read_packet(selection)? {
            if sample.pts_us > position_us {
                if at_or_before.is_none() {
                    log::warn!(
                        "First packet after seek is at {}us, past the requested {}us",
                        sample.pts_us,
                        position_us
                    );
                }
                self.pending.extend(at_or_before);
                self.pending.push_back(sample);
                return Ok(());
            }
            at_or_before = Some(sample);
        }
        self.pending.extend(at_or_before);
        Ok(())
    }

    pub fn next_sample(&mut self) -> Result<Option<Sample>> {
        let selection = self.selection()?;
        match self.pending.pop_front() {
            Some(sample) => Ok(Some(sample)),
            None => self.read_packet(selection),
        }
    }

    fn read_packet(&mut self, selection: Selection) -> Result<Option<Sample>> {
        while !self.finished {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    self.finished = true;
                    break;
                }
                Err(SymphoniaError::ResetRequired) => {
                    log::warn!("Stream parameters changed mid-stream, stopping there");
                    self.finished = true;
                    break;
                }
                Err(e) => return Err(Error::from_symphonia(e, "Failed to read packet")),
            };
            if packet.track_id() != selection.track_id {
                continue;
            }

            let pts_us = ts_to_us(packet.ts(), selection.time_base);
            let end_us = ts_to_us(packet.ts() + packet.dur(), selection.time_base);
            return Ok(Some(Sample {
                pts_us,
                duration_us: end_us - pts_us,
                // Packets of the audio codecs read here all decode on their own.
                is_sync: true,
                data: Bytes::from(packet.data),
            }));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const HEADER_128K_44K: u32 = 0xFFFB_9064;
    const FRAME_LEN: usize = 417;

    fn frame(fill: u8) -> Vec<u8> {
        let mut data = HEADER_128K_44K.to_be_bytes().to_vec();
        data.resize(FRAME_LEN, fill);
        data
    }

    fn stream(frames: usize) -> Vec<u8> {
        (0..frames).flat_map(|i| frame(i as u8)).collect()
    }

    fn open(data: Vec<u8>, extension: &str) -> GenericDemuxer {
        let head = data[..12.min(data.len())].to_vec();
        let size = data.len() as u64;
        let mut demuxer =
            GenericDemuxer::new(Box::new(Cursor::new(data)), Some(extension), &head, size).unwrap();
        demuxer.select(0).unwrap();
        demuxer
    }

    fn drain(demuxer: &mut GenericDemuxer) -> Vec<Sample> {
        let mut samples = Vec::new();
        while let Some(sample) = demuxer.next_sample().unwrap() {
            samples.push(sample);
        }
        samples
    }

    #[test]
    fn mpeg_packets_are_whole_frames() {
        let mut demuxer = open(stream(12), "mp3");
        let format = &demuxer.tracks()[0].format;
        assert_eq!(format.codec, Codec::MpegAudio);
        assert_eq!(format.sample_rate, 44_100);
        assert_eq!(format.channels, 2);

        let samples = drain(&mut demuxer);
        assert_eq!(samples.len(), 12);
        assert_eq!(samples[3].data.as_ref(), frame(3).as_slice());
        assert_eq!(samples[1].pts_us, 26_122);
        assert!(samples.iter().all(|s| s.is_sync));
    }

    #[test]
    fn seek_lands_on_frame_at_or_before_position() {
        let mut demuxer = open(stream(100), "mp3");

        demuxer.seek(1_000_000).unwrap();
        let sample = demuxer.next_sample().unwrap().unwrap();
        assert_eq!(sample.pts_us, 992_653);
        assert_eq!(sample.data.as_ref(), frame(38).as_slice());
        assert_eq!(demuxer.next_sample().unwrap().unwrap().pts_us, 1_018_775);

        demuxer.seek(0).unwrap();
        assert_eq!(demuxer.next_sample().unwrap().unwrap().pts_us, 0);
    }

    #[test]
    fn builds_audio_specific_config_from_adts_header() {
        assert_eq!(
            adts_audio_specific_config(&[0xFF, 0xF1, 0x50, 0x80, 0x00]),
            Some(vec![0x12, 0x10])
        );
        assert_eq!(adts_audio_specific_config(&[0xFF, 0xFB, 0x90, 0x64]), None);
        assert_eq!(adts_audio_specific_config(&[0xFF]), None);
    }

    #[test]
    fn unknown_bytes_are_unsupported() {
        let data = b"just some text, nothing to hear".to_vec();
        let err = GenericDemuxer::new(Box::new(Cursor::new(data)), Some("mp3"), b"just", 31)
            .err()
            .unwrap();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }

    #[test]
    fn time_base_conversion_is_exact_for_whole_seconds() {
        assert_eq!(ts_to_us(44_100, TimeBase::new(1, 44_100)), 1_000_000);
        assert_eq!(ts_to_us(3, TimeBase::new(1001, 30_000)), 100_100);
    }
}
