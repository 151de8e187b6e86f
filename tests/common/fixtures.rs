//! Synthesised input files for the integration tests.

#![allow(dead_code)]

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use mp4::{
    AacConfig, AudioObjectType, AvcConfig, ChannelConfig, MediaConfig, Mp4Config, Mp4Sample,
    Mp4Writer, OpusConfig, SampleFreqIndex, TrackConfig, TrackType,
};
use ringtone_trimmer::{ContainerDemuxer, Sample};

/// MPEG-1 Layer III, 128 kbit/s, 44.1 kHz, joint stereo, no CRC, no padding.
pub const MP3_HEADER: [u8; 4] = [0xFF, 0xFB, 0x90, 0x64];
pub const MP3_FRAME_LEN: usize = 417;
pub const MP3_FRAME_SAMPLES: u64 = 1152;
pub const SAMPLE_RATE: u64 = 44_100;

pub const AAC_FRAME_TICKS: u32 = 1024;

pub const OPUS_SAMPLE_RATE: u32 = 48_000;
/// 20 ms Opus packets.
pub const OPUS_FRAME_TICKS: u32 = 960;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Presentation time of MP3 frame `index`.
pub fn mp3_frame_pts(index: u64) -> u64 {
    index * MP3_FRAME_SAMPLES * 1_000_000 / SAMPLE_RATE
}

/// Frames whose payloads differ from each other and hold no sync bytes.
pub fn mp3_frames(count: usize) -> Vec<Vec<u8>> {
    (0..count)
        .map(|i| {
            let mut frame = MP3_HEADER.to_vec();
            frame.extend((0..MP3_FRAME_LEN - 4).map(|j| ((i * 31 + j) % 0x7F) as u8));
            frame
        })
        .collect()
}

/// Number of MP3 frames covering `seconds` of audio.
pub fn mp3_frames_for_seconds(seconds: u64) -> usize {
    (seconds * SAMPLE_RATE / MP3_FRAME_SAMPLES) as usize
}

fn id3v2_tag() -> Vec<u8> {
    let mut tag = b"ID3\x03\x00\x00\x00\x00\x00\x14".to_vec();
    tag.extend([0u8; 20]);
    tag
}

/// Writes `frames` as an MP3 file, optionally behind an ID3v2 tag.
pub fn write_mp3(dir: &Path, name: &str, frames: &[Vec<u8>], with_id3: bool) -> PathBuf {
    let path = dir.join(name);
    let mut out = BufWriter::new(File::create(&path).unwrap());
    if with_id3 {
        out.write_all(&id3v2_tag()).unwrap();
    }
    for frame in frames {
        out.write_all(frame).unwrap();
    }
    out.flush().unwrap();
    path
}

/// Payloads of the AAC fixture samples.
pub fn aac_payloads(count: u32) -> Vec<Vec<u8>> {
    (0..count)
        .map(|i| vec![(i % 251) as u8; 180 + (i % 13) as usize])
        .collect()
}

fn mp4_config() -> Mp4Config {
    Mp4Config {
        major_brand: str::parse("isom").unwrap(),
        minor_version: 512,
        compatible_brands: vec![str::parse("isom").unwrap(), str::parse("mp41").unwrap()],
        timescale: 1000,
    }
}

/// Writes an M4A with one AAC-LC stereo 44.1 kHz track of `samples` samples.
pub fn write_m4a(dir: &Path, name: &str, samples: u32) -> PathBuf {
    write_m4a_with_sync(dir, name, samples, |_| true)
}

/// Like [`write_m4a`], with `is_sync` deciding which samples are sync samples.
pub fn write_m4a_with_sync(
    dir: &Path,
    name: &str,
    samples: u32,
    is_sync: impl Fn(u32) -> bool,
) -> PathBuf {
    let media_conf = MediaConfig::AacConfig(AacConfig {
        bitrate: 128_000,
        profile: AudioObjectType::AacLowComplexity,
        freq_index: SampleFreqIndex::Freq44100,
        chan_conf: ChannelConfig::Stereo,
    });
    let payloads = aac_payloads(samples);
    write_audio_mp4(dir, name, media_conf, SAMPLE_RATE as u32, AAC_FRAME_TICKS, &payloads, is_sync)
}

/// Writes an MP4 with one Opus stereo 48 kHz track of `samples` packets.
pub fn write_opus_mp4(dir: &Path, name: &str, samples: u32) -> PathBuf {
    let media_conf = MediaConfig::OpusConfig(OpusConfig {
        bitrate: 96_000,
        freq_index: SampleFreqIndex::Freq48000,
        chan_conf: ChannelConfig::Stereo,
        pre_skip: 0,
    });
    let payloads = aac_payloads(samples);
    write_audio_mp4(dir, name, media_conf, OPUS_SAMPLE_RATE, OPUS_FRAME_TICKS, &payloads, |_| true)
}

fn write_audio_mp4(
    dir: &Path,
    name: &str,
    media_conf: MediaConfig,
    timescale: u32,
    frame_ticks: u32,
    payloads: &[Vec<u8>],
    is_sync: impl Fn(u32) -> bool,
) -> PathBuf {
    let path = dir.join(name);
    let out = BufWriter::new(File::create(&path).unwrap());
    let mut writer = Mp4Writer::write_start(out, &mp4_config()).unwrap();
    writer
        .add_track(&TrackConfig {
            track_type: TrackType::Audio,
            timescale,
            language: "und".to_string(),
            media_conf,
        })
        .unwrap();

    for (i, payload) in payloads.iter().enumerate() {
        let sample = Mp4Sample {
            start_time: i as u64 * frame_ticks as u64,
            duration: frame_ticks,
            rendering_offset: 0,
            is_sync: is_sync(i as u32),
            bytes: Bytes::from(payload.clone()),
        };
        writer.write_sample(1, &sample).unwrap();
    }
    writer.write_end().unwrap();
    writer.into_writer().flush().unwrap();
    path
}

/// ADTS header for an AAC-LC stereo 44.1 kHz frame carrying `payload_len` bytes.
fn adts_header(payload_len: usize) -> [u8; 7] {
    let len = payload_len + 7;
    [
        0xFF,
        0xF1,
        0x50,
        0x80 | ((len >> 11) & 0x03) as u8,
        ((len >> 3) & 0xFF) as u8,
        (((len & 0x07) << 5) | 0x1F) as u8,
        0xFC,
    ]
}

/// Writes the AAC fixture payloads as a raw ADTS stream (`.aac`).
pub fn write_adts(dir: &Path, name: &str, samples: u32) -> PathBuf {
    let path = dir.join(name);
    let mut out = BufWriter::new(File::create(&path).unwrap());
    for payload in aac_payloads(samples) {
        out.write_all(&adts_header(payload.len())).unwrap();
        out.write_all(&payload).unwrap();
    }
    out.flush().unwrap();
    path
}

/// Writes an MP4 holding a single H.264 video track and nothing else.
pub fn write_video_only_mp4(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    let out = BufWriter::new(File::create(&path).unwrap());
    let mut writer = Mp4Writer::write_start(out, &mp4_config()).unwrap();
    writer
        .add_track(&TrackConfig {
            track_type: TrackType::Video,
            timescale: 1000,
            language: "und".to_string(),
            media_conf: MediaConfig::AvcConfig(AvcConfig {
                width: 320,
                height: 240,
                seq_param_set: vec![0x67, 0x42, 0x00, 0x1E, 0x95, 0xA8, 0x28, 0x0F, 0x64],
                pic_param_set: vec![0x68, 0xCE, 0x3C, 0x80],
            }),
        })
        .unwrap();

    for i in 0..3u64 {
        let sample = Mp4Sample {
            start_time: i * 40,
            duration: 40,
            rendering_offset: 0,
            is_sync: i == 0,
            bytes: Bytes::from(vec![0, 0, 0, 4, 0x65, 0x88, 0x84, i as u8]),
        };
        writer.write_sample(1, &sample).unwrap();
    }
    writer.write_end().unwrap();
    writer.into_writer().flush().unwrap();
    path
}

/// Reads every sample of the first audio track of `path`.
pub fn read_samples(path: &Path) -> Vec<Sample> {
    let mut demuxer = ContainerDemuxer::open(path).unwrap();
    demuxer.select_audio_track().unwrap();
    let mut samples = Vec::new();
    while let Some(sample) = demuxer.next_sample().unwrap() {
        samples.push(sample);
    }
    demuxer.release();
    samples
}

/// Files currently in `dir`, or none if it does not exist.
pub fn files_in(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}
