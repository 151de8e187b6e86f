//! The trim pipeline: demux, filter by time range, write.

use std::path::PathBuf;

use crate::demux::ContainerDemuxer;
use crate::error::ErrorKind;
use crate::media::{OutputVariant, TimeRange, TrimResult};
use crate::writer::{OutputWriter, ScratchFile};
use crate::Result;

/// Configuration options for trimming.
#[derive(Debug, Clone)]
pub struct TrimConfig {
    /// Directory trimmed files are written to.
    pub scratch_dir: PathBuf,

    /// File name prefix of trimmed files.
    pub file_stem: String,

    /// Buffer size for the output file (in bytes)
    pub buffer_size: usize,

    /// Log copy progress every this many percent of the source samples
    pub progress_log_interval_pct: u32,
}

impl Default for TrimConfig {
    fn default() -> Self {
        Self {
            scratch_dir: std::env::temp_dir().join("ringtone_trimmer"),
            file_stem: "trimmed_ringtone".to_string(),
            buffer_size: 1024 * 1024,
            progress_log_interval_pct: 10,
        }
    }
}

impl TrimConfig {
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    pub fn with_file_stem(mut self, stem: impl Into<String>) -> Self {
        self.file_stem = stem.into();
        self
    }
}

/// What to trim and where to cut.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimRequest {
    pub input: PathBuf,
    pub range: TimeRange,
}

impl TrimRequest {
    pub fn new(input: impl Into<PathBuf>, range: TimeRange) -> Self {
        Self {
            input: input.into(),
            range,
        }
    }

    pub fn from_millis(input: impl Into<PathBuf>, start_ms: u64, end_ms: u64) -> Self {
        Self::new(input, TimeRange::from_millis(start_ms, end_ms))
    }
}

/// Where a pipeline run currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimStage {
    Init,
    TrackSelected,
    Seeking,
    Copying,
    Finalizing,
    Done,
    Failed(ErrorKind),
}

#[derive(Debug, Default)]
struct CopyStats {
    samples: u64,
    bytes: u64,
    first_pts_us: Option<u64>,
    last_pts_us: Option<u64>,
}

/// Drives one input through demuxer and writer in a single sequential pass.
#[derive(Debug)]
pub struct TrimPipeline {
    config: TrimConfig,
    stage: TrimStage,
}

impl TrimPipeline {
    pub fn new(config: TrimConfig) -> Self {
        Self {
            config,
            stage: TrimStage::Init,
        }
    }

    pub fn config(&self) -> &TrimConfig {
        &self.config
    }

    pub fn stage(&self) -> TrimStage {
        self.stage
    }

    /// Trims `request.input` to `request.range` and writes a new file into
    /// the scratch directory.
    ///
    /// The demuxer is released on every path. On failure no output file is
    /// left behind.
    pub fn run(&mut self, request: &TrimRequest) -> Result<TrimResult> {
        self.stage = TrimStage::Init;
        let range = request.range;
        log::info!(
            "Trimming {} from {}us to {}",
            request.input.display(),
            range.start_us,
            if range.is_bounded() {
                format!("{}us", range.end_us)
            } else {
                "end of stream".to_string()
            }
        );
        if range.is_bounded() && range.end_us <= range.start_us {
            log::warn!(
                "End {}us is not after start {}us, output will be empty or nearly so",
                range.end_us,
                range.start_us
            );
        }

        let outcome = ContainerDemuxer::open(&request.input).and_then(|mut demuxer| {
            let outcome = self.trim(&mut demuxer, range);
            demuxer.release();
            outcome
        });

        match &outcome {
            Ok(result) => {
                self.advance(TrimStage::Done);
                log::info!(
                    "Wrote {} samples ({} bytes) to {}",
                    result.samples,
                    result.bytes,
                    result.path.display()
                );
            }
            Err(e) => {
                self.advance(TrimStage::Failed(e.kind()));
                log::error!("Trim of {} failed: {}", request.input.display(), e);
            }
        }
        outcome
    }

    fn advance(&mut self, next: TrimStage) {
        log::debug!("Trim stage {:?} -> {:?}", self.stage, next);
        self.stage = next;
    }

    fn trim(&mut self, demuxer: &mut ContainerDemuxer, range: TimeRange) -> Result<TrimResult> {
        let format = demuxer.select_audio_track()?.format.clone();
        self.advance(TrimStage::TrackSelected);

        self.advance(TrimStage::Seeking);
        demuxer.seek(range.start_us)?;

        let variant = OutputVariant::for_codec(&format.codec);
        let (scratch, file) =
            ScratchFile::create(&self.config.scratch_dir, &self.config.file_stem, variant)?;
        let mut writer = OutputWriter::create(file, &format, self.config.buffer_size)?;
        log::debug!(
            "Writing {} output for {} to {}",
            variant,
            format.codec,
            scratch.path().display()
        );

        self.advance(TrimStage::Copying);
        let stats = self.copy(demuxer, &mut writer, range)?;

        self.advance(TrimStage::Finalizing);
        writer.finish()?;

        Ok(TrimResult {
            path: scratch.commit(),
            variant,
            samples: stats.samples,
            bytes: stats.bytes,
            first_pts_us: stats.first_pts_us,
            last_pts_us: stats.last_pts_us,
        })
    }

    /// Forwards samples until end of stream or the end bound.
    fn copy(
        &self,
        demuxer: &mut ContainerDemuxer,
        writer: &mut OutputWriter,
        range: TimeRange,
    ) -> Result<CopyStats> {
        // Streams without a sample count only log the final tally.
        let total = demuxer.sample_count().unwrap_or(0);
        let log_interval = (total * self.config.progress_log_interval_pct as u64 / 100).max(1);
        let mut stats = CopyStats::default();

        while let Some(sample) = demuxer.next_sample()? {
            if range.excludes(sample.pts_us) {
                log::debug!("Reached end bound at {}us", sample.pts_us);
                break;
            }
            if let Some(last) = stats.last_pts_us {
                if sample.pts_us < last {
                    log::warn!(
                        "Sample at {}us arrived after {}us, keeping source order",
                        sample.pts_us,
                        last
                    );
                }
            }

            stats.first_pts_us.get_or_insert(sample.pts_us);
            stats.last_pts_us = Some(sample.pts_us);
            stats.bytes += sample.data.len() as u64;
            writer.write_sample(sample)?;
            stats.samples += 1;

            if total > 0 && stats.samples % log_interval == 0 {
                log::info!("Copy progress: {} of {} samples", stats.samples, total);
            }
        }

        Ok(stats)
    }
}
