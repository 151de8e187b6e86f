//! # Ringtone Trimmer
//!
//! Cuts a time range out of an audio file without re-encoding it, producing a
//! new file suitable as a device ringtone.
//!
//! MP4 and M4A inputs are read with the `mp4` crate; every other container
//! (MP3, ADTS AAC, Ogg and the rest) goes through `symphonia`'s format readers. MPEG
//! audio is copied frame by frame into a bare `.mp3` stream; AAC and Opus
//! samples are remuxed into a single-track `.m4a` container.
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use ringtone_trimmer::{TrimConfig, TrimPipeline, TrimRequest};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut pipeline = TrimPipeline::new(TrimConfig::default());
//!     let request = TrimRequest::from_millis("song.mp3", 5_000, 35_000);
//!     let trimmed = pipeline.run(&request)?;
//!
//!     println!("Wrote {} samples to {}", trimmed.samples, trimmed.path.display());
//!
//!     Ok(())
//! }
//! ```
//!
//! Use [`worker::spawn_trim`] to run the same pass on a worker thread.

pub mod demux;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod service;
pub mod worker;
pub mod writer;

pub use demux::ContainerDemuxer;
pub use error::{Error, ErrorKind};
pub use media::{Codec, OutputVariant, Sample, TimeRange, Track, TrackFormat, TrimResult};
pub use pipeline::{TrimConfig, TrimPipeline, TrimRequest, TrimStage};
pub use worker::{spawn_trim, TrimHandle};

/// Re-export of the Result type specialized for this library
pub type Result<T> = std::result::Result<T, Error>;
