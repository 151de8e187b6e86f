//! Passthrough writer for self-framed elementary streams.

use std::fs::File;
use std::io::{BufWriter, Write};

use crate::media::Sample;
use crate::{Error, Result};

/// Writes sample payloads back to back, with no timing or container metadata.
///
/// Only valid for codecs whose frames carry their own sync header, so that the
/// concatenation is itself a playable stream.
#[derive(Debug)]
pub struct RawStreamWriter {
    out: BufWriter<File>,
    bytes: u64,
}

impl RawStreamWriter {
    pub fn new(file: File, buffer_size: usize) -> Self {
        Self {
            out: BufWriter::with_capacity(buffer_size, file),
            bytes: 0,
        }
    }

    pub fn write_sample(&mut self, sample: Sample) -> Result<()> {
        self.out.write_all(&sample.data)?;
        self.bytes += sample.data.len() as u64;
        Ok(())
    }

    /// Flushes buffered bytes and syncs the file to disk.
    pub fn finish(self) -> Result<()> {
        let file = self.out.into_inner().map_err(|e| Error::Io(e.into_error()))?;
        file.sync_all()?;
        log::debug!("Raw stream finished after {} bytes", self.bytes);
        Ok(())
    }
}
