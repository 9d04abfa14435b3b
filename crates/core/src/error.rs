use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MvDoseError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error(transparent)]
    SourceOpen(#[from] SourceOpenError),
    #[error("failed to read source {name}: {source}")]
    SourceRead {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("input path does not exist: {0:?}")]
    InputNotFound(PathBuf),
    #[error("invalid date: {0}")]
    InvalidDate(String),
}

pub type Result<T> = std::result::Result<T, MvDoseError>;

/// Why a source could not be opened.
#[derive(Debug)]
pub enum SourceOpenReason {
    Io(std::io::Error),
    Archive(zip::result::ZipError),
    EntryMissing,
}

impl fmt::Display for SourceOpenReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceOpenReason::Io(err) => write!(f, "{err}"),
            SourceOpenReason::Archive(err) => write!(f, "archive error: {err}"),
            SourceOpenReason::EntryMissing => write!(f, "entry not found in archive"),
        }
    }
}

#[derive(Error, Debug)]
#[error("failed to open source {name}{}: {reason}", archive_suffix(.archive))]
pub struct SourceOpenError {
    pub name: String,
    pub archive: Option<PathBuf>,
    pub reason: SourceOpenReason,
}

fn archive_suffix(archive: &Option<PathBuf>) -> String {
    match archive {
        Some(path) => format!(" in archive {}", path.display()),
        None => String::new(),
    }
}
