use std::fmt;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::io::{BufRead, BufReader, Cursor, Read};
use std::path::{Path, PathBuf};

use tracing::debug;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::error::{MvDoseError, Result, SourceOpenError, SourceOpenReason};

/// Upper bound on trusting an archive header's declared size when buffering.
const MAX_PREALLOC: u64 = 1 << 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    File,
    ArchiveEntry,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::File => "file",
            SourceKind::ArchiveEntry => "archive-entry",
        }
    }
}

/// One physical log source: a plain file or a member of a zip archive.
///
/// Equality and hashing only look at the identity (the file path, or the
/// entry name inside the archive), so the same entry found in two archives
/// counts as one source.
#[derive(Debug, Clone)]
pub struct Source {
    identity: String,
    kind: SourceKind,
    /// Filesystem location for plain files; the identity is only its display form.
    path: Option<PathBuf>,
    archive: Option<PathBuf>,
}

impl Source {
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            identity: path.as_ref().to_string_lossy().into_owned(),
            kind: SourceKind::File,
            path: Some(path.as_ref().to_path_buf()),
            archive: None,
        }
    }

    pub fn archive_entry(archive: impl AsRef<Path>, entry: impl Into<String>) -> Self {
        Self {
            identity: entry.into(),
            kind: SourceKind::ArchiveEntry,
            path: None,
            archive: Some(archive.as_ref().to_path_buf()),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Final path component of the identity.
    pub fn name(&self) -> &str {
        self.identity
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.identity)
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn archive(&self) -> Option<&Path> {
        self.archive.as_deref()
    }

    /// Opens the source for one linear read.
    ///
    /// Archive members are decompressed into memory here and the archive
    /// handle is released before this returns.
    pub fn open(&self) -> std::result::Result<SourceReader, SourceOpenError> {
        let inner: Box<dyn BufRead + Send> = match (self.kind, self.archive.as_deref()) {
            (SourceKind::ArchiveEntry, Some(archive)) => {
                Box::new(Cursor::new(self.read_entry(archive)?))
            }
            _ => {
                let path = self
                    .path
                    .as_deref()
                    .unwrap_or_else(|| Path::new(&self.identity));
                let file = File::open(path)
                    .map_err(|err| self.open_error(SourceOpenReason::Io(err)))?;
                Box::new(BufReader::new(file))
            }
        };
        debug!(source = %self, "opened source");
        Ok(SourceReader {
            name: self.name().to_string(),
            inner,
            buf: Vec::new(),
            lines_read: 0,
        })
    }

    fn read_entry(&self, archive: &Path) -> std::result::Result<Vec<u8>, SourceOpenError> {
        let file =
            File::open(archive).map_err(|err| self.open_error(SourceOpenReason::Io(err)))?;
        let mut zip = ZipArchive::new(BufReader::new(file))
            .map_err(|err| self.open_error(SourceOpenReason::Archive(err)))?;
        let mut entry = zip.by_name(&self.identity).map_err(|err| match err {
            ZipError::FileNotFound => self.open_error(SourceOpenReason::EntryMissing),
            other => self.open_error(SourceOpenReason::Archive(other)),
        })?;
        let hint = entry.size().min(MAX_PREALLOC) as usize;
        let mut bytes = Vec::with_capacity(hint);
        entry
            .read_to_end(&mut bytes)
            .map_err(|err| self.open_error(SourceOpenReason::Io(err)))?;
        Ok(bytes)
    }

    fn open_error(&self, reason: SourceOpenReason) -> SourceOpenError {
        SourceOpenError {
            name: self.identity.clone(),
            archive: self.archive.clone(),
            reason,
        }
    }
}

impl PartialEq for Source {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
    }
}

impl Eq for Source {}

impl Hash for Source {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity.hash(state);
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.archive {
            Some(archive) => write!(f, "{}!{}", archive.display(), self.identity),
            None => write!(f, "{}", self.identity),
        }
    }
}

/// Sequential line producer over one opened source.
///
/// Only obtainable through [`Source::open`]; the underlying handle is
/// released when the reader is closed or dropped.
pub struct SourceReader {
    name: String,
    inner: Box<dyn BufRead + Send>,
    buf: Vec<u8>,
    lines_read: usize,
}

impl SourceReader {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Next line without its terminator, or `None` at the end of this source.
    pub fn next_line(&mut self) -> Result<Option<String>> {
        self.buf.clear();
        let read = self
            .inner
            .read_until(b'\n', &mut self.buf)
            .map_err(|source| MvDoseError::SourceRead {
                name: self.name.clone(),
                source,
            })?;
        if read == 0 {
            return Ok(None);
        }
        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        }
        self.lines_read += 1;
        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }

    pub fn lines_read(&self) -> usize {
        self.lines_read
    }

    /// Releases the source, returning how many lines were read from it.
    pub fn close(self) -> usize {
        self.lines_read
    }
}

impl Drop for SourceReader {
    fn drop(&mut self) {
        debug!(source = %self.name, lines = self.lines_read, "closed source");
    }
}

impl fmt::Debug for SourceReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceReader")
            .field("name", &self.name)
            .field("lines_read", &self.lines_read)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};
    use zip::write::FileOptions;
    use zip::ZipWriter;

    #[test]
    fn file_reader_strips_line_terminators() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "first\r\nsecond\nthird").unwrap();
        let source = Source::file(file.path());
        let mut reader = source.open().unwrap();
        assert_eq!(reader.next_line().unwrap().as_deref(), Some("first"));
        assert_eq!(reader.next_line().unwrap().as_deref(), Some("second"));
        assert_eq!(reader.next_line().unwrap().as_deref(), Some("third"));
        assert_eq!(reader.next_line().unwrap(), None);
        assert_eq!(reader.next_line().unwrap(), None);
        assert_eq!(reader.close(), 3);
    }

    #[test]
    fn missing_file_is_an_open_error() {
        let dir = tempdir().unwrap();
        let source = Source::file(dir.path().join("TreatmentView_2024-01-01.log"));
        let err = source.open().unwrap_err();
        assert!(matches!(err.reason, SourceOpenReason::Io(_)));
        assert!(err.archive.is_none());
    }

    #[test]
    fn archive_entry_reads_member_lines() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("logs.zip");
        let mut writer = ZipWriter::new(File::create(&archive).unwrap());
        writer
            .start_file("logs/TreatmentView_2024-01-01.log", FileOptions::default())
            .unwrap();
        writer.write_all(b"alpha\nbeta\n").unwrap();
        writer.finish().unwrap();

        let source = Source::archive_entry(&archive, "logs/TreatmentView_2024-01-01.log");
        assert_eq!(source.name(), "TreatmentView_2024-01-01.log");
        let mut reader = source.open().unwrap();
        assert_eq!(reader.next_line().unwrap().as_deref(), Some("alpha"));
        assert_eq!(reader.next_line().unwrap().as_deref(), Some("beta"));
        assert_eq!(reader.next_line().unwrap(), None);
    }

    #[test]
    fn missing_archive_entry_reports_entry_missing() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("logs.zip");
        let mut writer = ZipWriter::new(File::create(&archive).unwrap());
        writer
            .start_file("other.txt", FileOptions::default())
            .unwrap();
        writer.write_all(b"x\n").unwrap();
        writer.finish().unwrap();

        let source = Source::archive_entry(&archive, "TreatmentView_2024-01-01.log");
        let err = source.open().unwrap_err();
        assert!(matches!(err.reason, SourceOpenReason::EntryMissing));
        assert_eq!(err.archive.as_deref(), Some(archive.as_path()));
    }

    #[cfg(unix)]
    #[test]
    fn file_under_non_utf8_directory_opens() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempdir().unwrap();
        let odd = dir.path().join(OsStr::from_bytes(b"logs_\xff"));
        std::fs::create_dir(&odd).unwrap();
        let path = odd.join("TreatmentView_2024-01-01.log");
        std::fs::write(&path, "only\n").unwrap();

        let source = Source::file(&path);
        assert!(source.identity().contains('\u{fffd}'));
        let mut reader = source.open().unwrap();
        assert_eq!(reader.next_line().unwrap().as_deref(), Some("only"));
    }

    #[test]
    fn equality_is_by_identity_only() {
        let a = Source::archive_entry("/a.zip", "TreatmentView_2024-01-01.log");
        let b = Source::archive_entry("/b.zip", "TreatmentView_2024-01-01.log");
        let c = Source::file("/logs/TreatmentView_2024-01-01.log");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
