//! Single-track MP4 output on top of `mp4::Mp4Writer`.

use std::fs::File;
use std::io::BufWriter;

use mp4::{
    AacConfig, AudioObjectType, ChannelConfig, MediaConfig, Mp4Config, Mp4Sample, Mp4Writer,
    OpusConfig, SampleFreqIndex, TrackConfig, TrackType,
};

use crate::media::{us_to_ticks, Codec, Sample, TrackFormat};
use crate::{Error, Result};

/// Sampling frequencies in AudioSpecificConfig index order.
const SAMPLE_RATES: [u32; 13] = [
    96_000, 88_200, 64_000, 48_000, 44_100, 32_000, 24_000, 22_050, 16_000, 12_000, 11_025, 8_000,
    7_350,
];

fn freq_index_for(sample_rate: u32) -> Result<SampleFreqIndex> {
    let index = SAMPLE_RATES
        .iter()
        .position(|&rate| rate == sample_rate)
        .ok_or_else(|| {
            Error::UnsupportedFormat(format!("Unsupported sample rate {} Hz", sample_rate))
        })?;
    SampleFreqIndex::try_from(index as u8)
        .map_err(|e| Error::UnsupportedFormat(format!("Invalid frequency index: {}", e)))
}

fn channel_config_for(channels: u16) -> Result<ChannelConfig> {
    ChannelConfig::try_from(channels as u8)
        .map_err(|e| Error::UnsupportedFormat(format!("Unsupported channel count {}: {}", channels, e)))
}

/// Reads profile, frequency index and channel configuration from an
/// AudioSpecificConfig, falling back to AAC-LC when none was carried.
fn aac_parameters(format: &TrackFormat) -> Result<(AudioObjectType, SampleFreqIndex, ChannelConfig)> {
    let asc = &format.codec_config;
    if asc.len() < 2 {
        log::debug!("No AudioSpecificConfig, assuming AAC-LC");
        return Ok((
            AudioObjectType::AacLowComplexity,
            freq_index_for(format.sample_rate)?,
            channel_config_for(format.channels)?,
        ));
    }

    let object_type = asc[0] >> 3;
    let freq_index = ((asc[0] & 0x07) << 1) | (asc[1] >> 7);
    let chan_conf = (asc[1] >> 3) & 0x0F;
    if object_type == 31 || freq_index == 15 {
        return Err(Error::UnsupportedFormat(
            "Escaped AudioSpecificConfig fields are not supported".to_string(),
        ));
    }

    let invalid = |what: &str, e: mp4::Error| {
        Error::UnsupportedFormat(format!("Invalid AudioSpecificConfig {}: {}", what, e))
    };
    Ok((
        AudioObjectType::try_from(object_type).map_err(|e| invalid("profile", e))?,
        SampleFreqIndex::try_from(freq_index).map_err(|e| invalid("frequency", e))?,
        ChannelConfig::try_from(chan_conf).map_err(|e| invalid("channels", e))?,
    ))
}

/// Describes the source track to the MP4 writer.
fn media_config(format: &TrackFormat) -> Result<MediaConfig> {
    match &format.codec {
        Codec::Aac => {
            let (profile, freq_index, chan_conf) = aac_parameters(format)?;
            Ok(MediaConfig::AacConfig(AacConfig {
                bitrate: format.bitrate,
                profile,
                freq_index,
                chan_conf,
            }))
        }
        Codec::Opus => Ok(MediaConfig::OpusConfig(OpusConfig {
            bitrate: format.bitrate,
            freq_index: freq_index_for(format.sample_rate)?,
            chan_conf: channel_config_for(format.channels)?,
            pre_skip: 0,
        })),
        Codec::MpegAudio | Codec::Other(_) => Err(Error::UnsupportedFormat(format!(
            "Cannot mux {} into an MP4 container",
            format.codec
        ))),
    }
}

/// Creates the MP4 configuration with appropriate brands and timescale.
fn create_mp4_config(timescale: u32) -> Mp4Config {
    Mp4Config {
        major_brand: str::parse("M4A ").unwrap_or_default(),
        minor_version: 512,
        compatible_brands: vec![
            str::parse("M4A ").unwrap_or_default(),
            str::parse("isom").unwrap_or_default(),
            str::parse("iso2").unwrap_or_default(),
            str::parse("mp41").unwrap_or_default(),
        ],
        timescale,
    }
}

/// Muxes the samples of one audio track into a new MP4 file.
pub struct ContainerMuxer {
    writer: Mp4Writer<BufWriter<File>>,
    timescale: u32,
    samples: u32,
}

impl ContainerMuxer {
    const TRACK_ID: u32 = 1;

    /// Starts the container and registers the single audio track.
    pub fn new(file: File, format: &TrackFormat, buffer_size: usize) -> Result<Self> {
        let media_conf = media_config(format)?;
        let timescale = if format.timescale > 0 {
            format.timescale
        } else {
            format.sample_rate
        };

        let out = BufWriter::with_capacity(buffer_size, file);
        let mut writer = Mp4Writer::write_start(out, &create_mp4_config(timescale))
            .map_err(|e| Error::from_mp4_write(e, "Failed to create MP4 writer"))?;

        let track_conf = TrackConfig {
            track_type: TrackType::Audio,
            timescale,
            language: format.language.clone(),
            media_conf,
        };
        writer
            .add_track(&track_conf)
            .map_err(|e| Error::from_mp4_write(e, "Failed to add audio track"))?;

        log::debug!(
            "Muxing {} track ({} Hz, {} channels, timescale {})",
            format.codec,
            format.sample_rate,
            format.channels,
            timescale
        );

        Ok(Self {
            writer,
            timescale,
            samples: 0,
        })
    }

    pub fn write_sample(&mut self, sample: Sample) -> Result<()> {
        let mp4_sample = Mp4Sample {
            start_time: us_to_ticks(sample.pts_us, self.timescale),
            duration: us_to_ticks(sample.duration_us, self.timescale) as u32,
            rendering_offset: 0,
            is_sync: sample.is_sync,
            bytes: sample.data,
        };
        self.writer
            .write_sample(Self::TRACK_ID, &mp4_sample)
            .map_err(|e| {
                Error::from_mp4_write(e, &format!("Failed to write sample {}", self.samples + 1))
            })?;
        self.samples += 1;
        Ok(())
    }

    /// Writes the sample tables and syncs the file. The output is only
    /// usable once this has succeeded.
    pub fn finish(mut self) -> Result<()> {
        self.writer
            .write_end()
            .map_err(|e| Error::from_mp4_write(e, "Failed to finalize MP4 file"))?;
        let file = self
            .writer
            .into_writer()
            .into_inner()
            .map_err(|e| Error::Io(e.into_error()))?;
        file.sync_all()?;
        log::debug!("MP4 output finished with {} samples", self.samples);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::TrackFormat;

    fn format(codec: Codec, codec_config: Vec<u8>) -> TrackFormat {
        TrackFormat {
            codec,
            sample_rate: 44_100,
            channels: 2,
            codec_config,
            max_sample_size: 0,
            timescale: 44_100,
            bitrate: 128_000,
            language: "und".to_string(),
            duration_us: 0,
        }
    }

    #[test]
    fn reads_aac_lc_stereo_config() {
        let (profile, freq, chan) = aac_parameters(&format(Codec::Aac, vec![0x12, 0x10])).unwrap();
        assert_eq!(profile, AudioObjectType::AacLowComplexity);
        assert_eq!(freq, SampleFreqIndex::Freq44100);
        assert_eq!(chan, ChannelConfig::Stereo);
    }

    #[test]
    fn missing_config_falls_back_to_format_fields() {
        let (profile, freq, chan) = aac_parameters(&format(Codec::Aac, Vec::new())).unwrap();
        assert_eq!(profile, AudioObjectType::AacLowComplexity);
        assert_eq!(freq, SampleFreqIndex::Freq44100);
        assert_eq!(chan, ChannelConfig::Stereo);
    }

    #[test]
    fn refuses_codecs_without_mp4_description() {
        let err = media_config(&format(Codec::Other("audio/flac".into()), Vec::new())).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }

    #[test]
    fn odd_sample_rates_are_rejected() {
        assert!(freq_index_for(44_100).is_ok());
        assert!(freq_index_for(44_000).is_err());
    }
}
