//! Error handling for the ringtone trimmer.

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Errors that can occur while trimming an audio file.
#[derive(Debug)]
pub enum Error {
    /// The input path does not exist.
    NotFound(PathBuf),

    /// The input container could not be parsed, or its codec cannot be written.
    UnsupportedFormat(String),

    /// The input has no track with an `audio/` mime type.
    NoAudioTrack,

    /// An I/O error occurred.
    Io(io::Error),

    /// The output container could not be written or finalized.
    Write(String),

    /// A fault that fits none of the other categories.
    Unknown(String),
}

/// Coarse failure categories reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    UnsupportedFormat,
    NoAudioTrack,
    Io,
    Unknown,
}

impl ErrorKind {
    /// Stable failure code handed across the caller boundary.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::UnsupportedFormat => "UNSUPPORTED_FORMAT",
            ErrorKind::NoAudioTrack => "NO_AUDIO_TRACK",
            ErrorKind::Io => "IO_ERROR",
            ErrorKind::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl Error {
    /// Folds this error into its reporting category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Error::NoAudioTrack => ErrorKind::NoAudioTrack,
            Error::Io(_) | Error::Write(_) => ErrorKind::Io,
            Error::Unknown(_) => ErrorKind::Unknown,
        }
    }

    /// Classifies an error raised by the `mp4` crate while reading.
    ///
    /// Transport failures stay I/O errors; everything else means the
    /// container itself is malformed.
    pub(crate) fn from_mp4_read(err: mp4::Error, context: &str) -> Self {
        match err {
            mp4::Error::IoError(e) => Error::Io(e),
            other => Error::UnsupportedFormat(format!("{}: {}", context, other)),
        }
    }

    /// Classifies an error raised by a `symphonia` format reader.
    pub(crate) fn from_symphonia(err: symphonia::core::errors::Error, context: &str) -> Self {
        match err {
            symphonia::core::errors::Error::IoError(e) => Error::Io(e),
            other => Error::UnsupportedFormat(format!("{}: {}", context, other)),
        }
    }

    /// Classifies an error raised by the `mp4` crate while writing.
    pub(crate) fn from_mp4_write(err: mp4::Error, context: &str) -> Self {
        match err {
            mp4::Error::IoError(e) => Error::Io(e),
            other => Error::Write(format!("{}: {}", context, other)),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound(path) => write!(f, "Input file not found: {}", path.display()),
            Error::UnsupportedFormat(msg) => write!(f, "Unsupported format: {}", msg),
            Error::NoAudioTrack => write!(f, "No audio track found"),
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::Write(msg) => write!(f, "Output write error: {}", msg),
            Error::Unknown(msg) => write!(f, "Unknown error: {}", msg),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}
