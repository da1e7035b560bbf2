//! Error types for the tail stream library.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for tailing operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors not tied to a specific tailing step.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// File watching errors from the notify crate.
    #[error("File watcher error: {0}")]
    Watcher(#[from] notify::Error),

    /// The tailed path could not be opened.
    #[error("Failed to open {}: {source}", path.display())]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The open file lost its last name and nothing replaced it.
    #[error("File deleted: {}", path.display())]
    FileDeleted { path: PathBuf },

    /// The tailed file was renamed and the move policy treats that as an error.
    #[error("File moved: {} -> {}", from.display(), to.display())]
    FileMoved { from: PathBuf, to: PathBuf },

    /// Stat before a read failed for a reason other than the file being gone.
    #[error("Error during truncate detection on {}: {source}", path.display())]
    TruncateCheckFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Reading from the open handle failed.
    #[error("Failed to read {}: {source}", path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The change watcher stopped delivering signals.
    #[error("Watch subscription closed for {}", path.display())]
    WatchClosed { path: PathBuf },

    /// An option value could not be parsed or is out of range.
    #[error("Invalid value for option {key}: {message}")]
    InvalidOption { key: String, message: String },

    /// An option name that the configuration does not know.
    #[error("Unrecognized option: {key}")]
    UnknownOption { key: String },
}

/// Coarse classification of an error's operating system cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    PermissionDenied,
    Other,
}

impl Error {
    /// Classifies the error by its underlying OS condition.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::FileDeleted { .. } => ErrorKind::NotFound,
            Error::Io(source)
            | Error::OpenFailed { source, .. }
            | Error::TruncateCheckFailed { source, .. }
            | Error::ReadFailed { source, .. } => classify_io(source.kind()),
            Error::Watcher(e) => match &e.kind {
                notify::ErrorKind::PathNotFound => ErrorKind::NotFound,
                notify::ErrorKind::Io(source) => classify_io(source.kind()),
                _ => ErrorKind::Other,
            },
            _ => ErrorKind::Other,
        }
    }
}

fn classify_io(kind: io::ErrorKind) -> ErrorKind {
    match kind {
        io::ErrorKind::NotFound => ErrorKind::NotFound,
        io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
        _ => ErrorKind::Other,
    }
}

/// A convenient Result type for tailing operations.
pub type Result<T> = std::result::Result<T, Error>;
