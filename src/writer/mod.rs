//! Output writers and scratch output files.

pub mod muxer;
pub mod raw;

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub use muxer::ContainerMuxer;
pub use raw::RawStreamWriter;

use crate::media::{OutputVariant, Sample, TrackFormat};
use crate::{Error, Result};

/// Persists the trimmed sample stream, raw or muxed depending on codec.
pub enum OutputWriter {
    Raw(RawStreamWriter),
    Muxed(ContainerMuxer),
}

impl OutputWriter {
    /// Picks the variant for `format.codec` and prepares it on `file`.
    pub fn create(file: File, format: &TrackFormat, buffer_size: usize) -> Result<Self> {
        match OutputVariant::for_codec(&format.codec) {
            OutputVariant::Raw => Ok(OutputWriter::Raw(RawStreamWriter::new(file, buffer_size))),
            OutputVariant::Muxed => Ok(OutputWriter::Muxed(ContainerMuxer::new(
                file,
                format,
                buffer_size,
            )?)),
        }
    }

    pub fn variant(&self) -> OutputVariant {
        match self {
            OutputWriter::Raw(_) => OutputVariant::Raw,
            OutputWriter::Muxed(_) => OutputVariant::Muxed,
        }
    }

    pub fn write_sample(&mut self, sample: Sample) -> Result<()> {
        match self {
            OutputWriter::Raw(writer) => writer.write_sample(sample),
            OutputWriter::Muxed(writer) => writer.write_sample(sample),
        }
    }

    pub fn finish(self) -> Result<()> {
        match self {
            OutputWriter::Raw(writer) => writer.finish(),
            OutputWriter::Muxed(writer) => writer.finish(),
        }
    }
}

/// Attempts before giving up on finding a free output name.
const MAX_NAME_ATTEMPTS: u32 = 1000;

static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// A freshly created output file that is deleted again unless committed.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    committed: bool,
}

impl ScratchFile {
    /// Creates `<dir>/<stem>_<millis>_<seq>.<ext>`, never reusing an existing name.
    pub fn create(dir: &Path, stem: &str, variant: OutputVariant) -> Result<(Self, File)> {
        fs::create_dir_all(dir)?;
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);

        for _ in 0..MAX_NAME_ATTEMPTS {
            let sequence = NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
            let path = dir.join(format!(
                "{}_{}_{}.{}",
                stem,
                millis,
                sequence,
                variant.extension()
            ));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => {
                    log::debug!("Created output file {}", path.display());
                    return Ok((
                        Self {
                            path,
                            committed: false,
                        },
                        file,
                    ));
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }

        Err(Error::Io(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("No free output name in {}", dir.display()),
        )))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keeps the file and hands back its path.
    pub fn commit(mut self) -> PathBuf {
        self.committed = true;
        std::mem::take(&mut self.path)
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => log::debug!("Removed incomplete output {}", self.path.display()),
            Err(e) => log::warn!(
                "Failed to remove incomplete output {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn names_carry_stem_and_extension() {
        let dir = tempfile::tempdir().unwrap();
        let (scratch, _file) = ScratchFile::create(dir.path(), "trimmed", OutputVariant::Muxed).unwrap();
        let name = scratch.path().file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.starts_with("trimmed_"));
        assert!(name.ends_with(".m4a"));
        scratch.commit();
    }

    #[test]
    fn uncommitted_file_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let (scratch, file) = ScratchFile::create(dir.path(), "trimmed", OutputVariant::Raw).unwrap();
        let path = scratch.path().to_path_buf();
        drop(file);
        assert!(path.exists());
        drop(scratch);
        assert!(!path.exists());
    }

    #[test]
    fn committed_file_survives() {
        let dir = tempfile::tempdir().unwrap();
        let (scratch, _file) = ScratchFile::create(dir.path(), "trimmed", OutputVariant::Raw).unwrap();
        let path = scratch.commit();
        assert!(path.exists());
    }

    #[test]
    fn rapid_creation_never_collides() {
        let dir = tempfile::tempdir().unwrap();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let dir = dir.path().to_path_buf();
                std::thread::spawn(move || {
                    (0..25)
                        .map(|_| {
                            ScratchFile::create(&dir, "trimmed", OutputVariant::Raw)
                                .unwrap()
                                .0
                                .commit()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let paths: HashSet<PathBuf> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(paths.len(), 200);
    }
}
