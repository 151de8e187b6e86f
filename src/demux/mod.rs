//! Container demuxing.
//!
//! [`ContainerDemuxer`] sniffs the input, hands it to the matching backend and
//! exposes one sequential sample stream for the selected audio track.

pub mod generic;
pub mod isobmff;

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

pub use self::generic::GenericDemuxer;
pub use self::isobmff::Mp4Demuxer;

use crate::media::{Sample, Track};
use crate::{Error, Result};

/// Container families the demuxer routes between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// ISO base media file format, read with the `mp4` crate.
    Mp4,
    /// Anything else, left to `symphonia`'s format registry.
    Other,
}

impl ContainerKind {
    /// Picks the backend from the leading bytes of a file.
    pub fn sniff(head: &[u8]) -> Self {
        if head.len() >= 8 && &head[4..8] == b"ftyp" {
            ContainerKind::Mp4
        } else {
            ContainerKind::Other
        }
    }
}

enum Backend {
    Mp4(Mp4Demuxer<BufReader<File>>),
    Generic(GenericDemuxer),
}

/// An opened input file and the sample stream of its selected audio track.
pub struct ContainerDemuxer {
    path: PathBuf,
    kind: ContainerKind,
    backend: Option<Backend>,
    tracks: Vec<Track>,
    selected: Option<usize>,
}

impl ContainerDemuxer {
    /// Opens and parses the container at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the path does not exist and
    /// [`Error::UnsupportedFormat`] if no backend can parse it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::NotFound(path.to_path_buf()))
            }
            Err(e) => return Err(Error::Io(e)),
        };
        let size = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let mut head = Vec::with_capacity(12);
        reader.by_ref().take(12).read_to_end(&mut head)?;
        reader.seek(SeekFrom::Start(0))?;

        let kind = ContainerKind::sniff(&head);
        let (backend, tracks) = match kind {
            ContainerKind::Mp4 => {
                let demuxer = Mp4Demuxer::new(reader, size)?;
                let tracks = demuxer.tracks().to_vec();
                (Backend::Mp4(demuxer), tracks)
            }
            ContainerKind::Other => {
                let extension = path.extension().and_then(|e| e.to_str());
                let demuxer =
                    GenericDemuxer::new(Box::new(reader.into_inner()), extension, &head, size)?;
                let tracks = demuxer.tracks().to_vec();
                (Backend::Generic(demuxer), tracks)
            }
        };

        log::info!(
            "Opened {} ({:?}, {} bytes, {} tracks)",
            path.display(),
            kind,
            size,
            tracks.len()
        );

        Ok(Self {
            path: path.to_path_buf(),
            kind,
            backend: Some(backend),
            tracks,
            selected: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Selects the first track whose mime type starts with `audio/`.
    pub fn select_audio_track(&mut self) -> Result<&Track> {
        let index = self
            .tracks
            .iter()
            .position(|t| t.format.codec.is_audio())
            .ok_or(Error::NoAudioTrack)?;

        match self.backend_mut()? {
            Backend::Mp4(demuxer) => demuxer.select(index)?,
            Backend::Generic(demuxer) => demuxer.select(index)?,
        }
        self.selected = Some(index);

        let track = &self.tracks[index];
        log::debug!("Selected audio track {} ({})", index, track.mime());
        Ok(track)
    }

    pub fn selected_track(&self) -> Option<&Track> {
        self.selected.map(|i| &self.tracks[i])
    }

    /// Number of samples in the selected track, when the container says.
    pub fn sample_count(&self) -> Option<u64> {
        match self.backend.as_ref()? {
            Backend::Mp4(demuxer) => demuxer.sample_count(),
            Backend::Generic(demuxer) => demuxer.sample_count(),
        }
    }

    /// Repositions to the nearest sync sample at or before `position_us`.
    ///
    /// The next sample returned may therefore start before `position_us`.
    pub fn seek(&mut self, position_us: u64) -> Result<()> {
        self.require_selection()?;
        match self.backend_mut()? {
            Backend::Mp4(demuxer) => demuxer.seek(position_us),
            Backend::Generic(demuxer) => demuxer.seek(position_us),
        }
    }

    /// Hands out the next sample in source order, or `None` at end of stream.
    pub fn next_sample(&mut self) -> Result<Option<Sample>> {
        self.require_selection()?;
        match self.backend_mut()? {
            Backend::Mp4(demuxer) => demuxer.next_sample(),
            Backend::Generic(demuxer) => demuxer.next_sample(),
        }
    }

    /// Closes the input. Safe to call more than once.
    pub fn release(&mut self) {
        if self.backend.take().is_some() {
            log::debug!("Released demuxer for {}", self.path.display());
        }
    }

    pub fn is_released(&self) -> bool {
        self.backend.is_none()
    }

    fn require_selection(&self) -> Result<()> {
        match self.selected {
            Some(_) => Ok(()),
            None => Err(Error::Unknown("No audio track selected".to_string())),
        }
    }

    fn backend_mut(&mut self) -> Result<&mut Backend> {
        self.backend
            .as_mut()
            .ok_or_else(|| Error::Unknown(format!("Demuxer for {} already released", self.path.display())))
    }
}

impl Drop for ContainerDemuxer {
    fn drop(&mut self) {
        self.release();
    }
}
