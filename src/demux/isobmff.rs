//! Demuxing of ISO base media files (`.mp4`, `.m4a`) on top of the `mp4` crate.

use std::io::{Read, Seek};

use mp4::{MediaType, Mp4Track, TrackType};

use crate::media::{ticks_to_us, Codec, Sample, Track, TrackFormat};
use crate::{Error, Result};

/// Builds the two-byte AudioSpecificConfig of an AAC track.
fn audio_specific_config(track: &Mp4Track) -> Option<Vec<u8>> {
    let profile = track.audio_profile().ok()? as u8;
    let freq_index = track.sample_freq_index().ok()? as u8;
    let chan_conf = track.channel_config().ok()? as u8;

    Some(vec![
        (profile << 3) | (freq_index >> 1),
        ((freq_index & 1) << 7) | (chan_conf << 3),
    ])
}

fn codec_of(track: &Mp4Track) -> Codec {
    let mime = match track.track_type() {
        Ok(TrackType::Audio) => match track.media_type() {
            Ok(MediaType::AAC) => return Codec::Aac,
            Ok(MediaType::OPUS) => return Codec::Opus,
            _ => "audio/unknown",
        },
        Ok(TrackType::Video) => match track.media_type() {
            Ok(MediaType::H264) => "video/avc",
            Ok(MediaType::H265) => "video/hevc",
            _ => "video/unknown",
        },
        Ok(_) => "text/unknown",
        Err(_) => "application/octet-stream",
    };
    Codec::Other(mime.to_string())
}

fn describe_track(index: usize, track: &Mp4Track) -> Track {
    let codec = codec_of(track);
    let stsz = &track.trak.mdia.minf.stbl.stsz;
    let max_sample_size = if stsz.sample_size > 0 {
        stsz.sample_size
    } else {
        stsz.sample_sizes.iter().copied().max().unwrap_or(0)
    };

    let (sample_rate, channels) = if codec.is_audio() {
        (
            track.sample_freq_index().map(|f| f.freq()).unwrap_or(0),
            track.channel_config().map(|c| c as u16).unwrap_or(0),
        )
    } else {
        (0, 0)
    };
    let codec_config = match codec {
        Codec::Aac => audio_specific_config(track).unwrap_or_default(),
        _ => Vec::new(),
    };

    Track {
        index,
        format: TrackFormat {
            codec,
            sample_rate,
            channels,
            codec_config,
            max_sample_size,
            timescale: track.timescale(),
            bitrate: track.bitrate(),
            language: track.language().to_string(),
            duration_us: track.duration().as_micros() as u64,
        },
    }
}

#[derive(Debug, Clone, Copy)]
struct Selection {
    track_id: u32,
    timescale: u32,
    sample_count: u32,
}

/// Demuxer over an MP4 file, reading one selected track sample by sample.
pub struct Mp4Demuxer<R> {
    reader: mp4::Mp4Reader<R>,
    tracks: Vec<Track>,
    /// Container track ids, parallel to `tracks`.
    track_ids: Vec<u32>,
    selection: Option<Selection>,
    /// 1-based id of the next sample to hand out.
    next_sample_id: u32,
}

impl<R: Read + Seek> Mp4Demuxer<R> {
    /// Parses the container header and describes every track in file order.
    pub fn new(reader: R, size: u64) -> Result<Self> {
        // A header that cannot be read to the end is a broken container, not
        // a transport failure.
        let reader = mp4::Mp4Reader::read_header(reader, size).map_err(|e| {
            Error::UnsupportedFormat(format!("Failed to parse MP4 header: {}", e))
        })?;

        let mut tracks = Vec::new();
        let mut track_ids = Vec::new();
        for trak in &reader.moov.traks {
            let track_id = trak.tkhd.track_id;
            let Some(track) = reader.tracks().get(&track_id) else {
                log::warn!("Track {} has no readable sample table, ignoring it", track_id);
                continue;
            };
            let described = describe_track(tracks.len(), track);
            log::debug!(
                "Found track {} ({}) with {} samples",
                track_id,
                described.mime(),
                track.sample_count()
            );
            tracks.push(described);
            track_ids.push(track_id);
        }

        Ok(Self {
            reader,
            tracks,
            track_ids,
            selection: None,
            next_sample_id: 1,
        })
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Restricts sample reading to the track at `index`.
    pub fn select(&mut self, index: usize) -> Result<()> {
        let track_id = *self
            .track_ids
            .get(index)
            .ok_or_else(|| Error::Unknown(format!("No track at index {}", index)))?;
        let sample_count = self
            .reader
            .sample_count(track_id)
            .map_err(|e| Error::from_mp4_read(e, "Failed to get sample count"))?;

        self.selection = Some(Selection {
            track_id,
            timescale: self.tracks[index].format.timescale,
            sample_count,
        });
        self.next_sample_id = 1;
        Ok(())
    }

    pub fn sample_count(&self) -> Option<u64> {
        self.selection.map(|s| s.sample_count as u64)
    }

    fn selection(&self) -> Result<Selection> {
        self.selection
            .ok_or_else(|| Error::Unknown("No track selected".to_string()))
    }

    /// Moves to the last sync sample decoded at or before `position_us`.
    ///
    /// Only the sample tables are consulted; no payload is read.
    pub fn seek(&mut self, position_us: u64) -> Result<()> {
        let selection = self.selection()?;
        let track = self
            .reader
            .tracks()
            .get(&selection.track_id)
            .ok_or_else(|| Error::Unknown(format!("Track {} disappeared", selection.track_id)))?;
        let stbl = &track.trak.mdia.minf.stbl;

        let mut target = 1u32;
        let mut sample_id = 1u32;
        let mut dts = 0u64;
        'walk: for entry in &stbl.stts.entries {
            for _ in 0..entry.sample_count {
                if ticks_to_us(dts, selection.timescale) > position_us {
                    break 'walk;
                }
                target = sample_id;
                dts += entry.sample_delta as u64;
                sample_id += 1;
            }
        }

        let sync = match &stbl.stss {
            Some(stss) => match stss.entries.iter().copied().take_while(|&id| id <= target).last() {
                Some(id) => id,
                None => {
                    let first = stss.entries.first().copied().unwrap_or(1);
                    log::warn!(
                        "No sync sample at or before {}us, starting at sync sample {} instead",
                        position_us,
                        first
                    );
                    first
                }
            },
            None => target,
        };

        log::debug!(
            "Seek to {}us resolved to sample {} (sync sample {})",
            position_us,
            target,
            sync
        );
        self.next_sample_id = sync;
        Ok(())
    }

    pub fn next_sample(&mut self) -> Result<Option<Sample>> {
        let selection = self.selection()?;
        if self.next_sample_id == 0 || self.next_sample_id > selection.sample_count {
            return Ok(None);
        }

        let sample_id = self.next_sample_id;
        let sample = match self.reader.read_sample(selection.track_id, sample_id) {
            Ok(Some(sample)) => sample,
            Ok(None) => {
                log::warn!("Sample {} not found, treating as end of stream", sample_id);
                self.next_sample_id = selection.sample_count + 1;
                return Ok(None);
            }
            Err(e) => {
                return Err(Error::from_mp4_read(
                    e,
                    &format!("Failed to read sample {}", sample_id),
                ))
            }
        };
        self.next_sample_id += 1;

        let pts_ticks = (sample.start_time as i64 + sample.rendering_offset as i64).max(0) as u64;
        Ok(Some(Sample {
            pts_us: ticks_to_us(pts_ticks, selection.timescale),
            duration_us: ticks_to_us(sample.duration as u64, selection.timescale),
            is_sync: sample.is_sync,
            data: sample.bytes,
        }))
    }
}
