use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::error::{MvDoseError, Result};
use crate::source::Source;

const ZIP_MAGIC: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];

static LOG_FILENAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^TreatmentView_(\d{4}-\d{2}-\d{2})\.log(?:\.(\d+))?$").expect("valid regex")
});

/// Ordering key embedded in a qualifying log file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LogFileKey {
    pub date: NaiveDate,
    pub sequence: u64,
}

/// Parses `TreatmentView_<YYYY-MM-DD>.log[.<N>]`; anything else does not qualify.
pub fn parse_log_filename(name: &str) -> Option<LogFileKey> {
    let caps = LOG_FILENAME.captures(name)?;
    let date = NaiveDate::parse_from_str(caps.get(1)?.as_str(), "%Y-%m-%d").ok()?;
    let sequence = match caps.get(2) {
        Some(seq) => seq.as_str().parse().ok()?,
        None => 0,
    };
    Some(LogFileKey { date, sequence })
}

pub fn is_log_filename(name: &str) -> bool {
    parse_log_filename(name).is_some()
}

/// True when the file starts with the zip local-header signature.
pub fn is_zip_archive(path: &Path) -> bool {
    let Ok(file) = File::open(path) else {
        return false;
    };
    let mut magic = [0u8; 4];
    match BufReader::new(file).read_exact(&mut magic) {
        Ok(()) => magic == ZIP_MAGIC,
        Err(_) => false,
    }
}

/// Expands one user-supplied path into its qualifying sources, unordered.
pub fn collect_sources(path: &Path) -> Result<Vec<Source>> {
    if path.is_dir() {
        collect_from_dir(path)
    } else if is_zip_archive(path) {
        collect_from_archive(path)
    } else if path.is_file() {
        Ok(vec![Source::file(path)])
    } else {
        Err(MvDoseError::InputNotFound(path.to_path_buf()))
    }
}

fn collect_from_dir(root: &Path) -> Result<Vec<Source>> {
    let mut sources = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if is_zip_archive(path) {
            sources.extend(collect_from_archive(path)?);
        } else if entry.file_name().to_str().is_some_and(is_log_filename) {
            sources.push(Source::file(path));
        }
    }
    debug!(root = %root.display(), found = sources.len(), "scanned directory");
    Ok(sources)
}

fn collect_from_archive(archive: &Path) -> Result<Vec<Source>> {
    let file = File::open(archive)?;
    let zip = ZipArchive::new(BufReader::new(file))?;
    let sources: Vec<Source> = zip
        .file_names()
        .filter(|entry| !entry.ends_with('/'))
        .filter(|entry| is_log_filename(entry_basename(entry)))
        .map(|entry| Source::archive_entry(archive, entry))
        .collect();
    debug!(archive = %archive.display(), found = sources.len(), "scanned archive");
    Ok(sources)
}

fn entry_basename(entry: &str) -> &str {
    entry.rsplit(['/', '\\']).next().unwrap_or(entry)
}

/// Orders sources by the (date, sequence) embedded in their names.
///
/// The sort is stable, so sources with equal keys keep their discovery order.
/// Sources whose name carries no key sort first.
pub fn sort_sources(sources: &mut [Source]) {
    sources.sort_by_key(|source| parse_log_filename(source.name()));
}

/// Removes later duplicates, keeping the first occurrence of each identity.
pub fn dedup_sources(sources: Vec<Source>) -> Vec<Source> {
    sources.into_iter().unique().collect()
}

/// Discovers, deduplicates and orders the sources under one path.
pub fn discover(path: &Path) -> Result<Vec<Source>> {
    discover_all(&[path.to_path_buf()])
}

/// Same as [`discover`] over several paths, merged into one ordered list.
pub fn discover_all(paths: &[PathBuf]) -> Result<Vec<Source>> {
    let mut collected = Vec::new();
    for path in paths {
        collected.extend(collect_sources(path)?);
    }
    let found = collected.len();
    let mut sources = dedup_sources(collected);
    sort_sources(&mut sources);
    info!(
        inputs = paths.len(),
        found,
        unique = sources.len(),
        "discovered log sources"
    );
    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use tempfile::tempdir;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    fn names(sources: &[Source]) -> Vec<&str> {
        sources.iter().map(|s| s.name()).collect()
    }

    #[test]
    fn walk_errors_are_not_swallowed() {
        let dir = tempdir().unwrap();
        let err = collect_from_dir(&dir.path().join("vanished")).unwrap_err();
        assert!(matches!(err, MvDoseError::Walk(_)));
    }

    #[test]
    fn filename_grammar_extracts_date_and_sequence() {
        let key = parse_log_filename("TreatmentView_2024-01-01.log.2").unwrap();
        assert_eq!(key.date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(key.sequence, 2);
        let key = parse_log_filename("TreatmentView_2024-01-01.log").unwrap();
        assert_eq!(key.sequence, 0);
        assert!(parse_log_filename("treatmentview_2024-01-01.log").is_none());
        assert!(parse_log_filename("TreatmentView_2024-01-01.txt").is_none());
        assert!(parse_log_filename("TreatmentView_2024-13-01.log").is_none());
        assert!(parse_log_filename("TreatmentView_2024-01-01.log.x").is_none());
    }

    #[test]
    fn sources_are_ordered_by_date_then_sequence() {
        let mut sources = vec![
            Source::file("/logs/TreatmentView_2024-01-02.log"),
            Source::file("/logs/TreatmentView_2024-01-01.log.2"),
            Source::file("/logs/TreatmentView_2024-01-01.log"),
        ];
        sort_sources(&mut sources);
        assert_eq!(
            names(&sources),
            vec![
                "TreatmentView_2024-01-01.log",
                "TreatmentView_2024-01-01.log.2",
                "TreatmentView_2024-01-02.log",
            ]
        );
    }

    #[test]
    fn sequence_compares_numerically() {
        let mut sources = vec![
            Source::file("TreatmentView_2024-01-01.log.10"),
            Source::file("TreatmentView_2024-01-01.log.9"),
        ];
        sort_sources(&mut sources);
        assert_eq!(
            names(&sources),
            vec![
                "TreatmentView_2024-01-01.log.9",
                "TreatmentView_2024-01-01.log.10"
            ]
        );
    }

    #[test]
    fn zip_detection_uses_magic_bytes() {
        let dir = tempdir().unwrap();
        let disguised = dir.path().join("archive.dat");
        let mut writer = ZipWriter::new(File::create(&disguised).unwrap());
        writer.start_file("a.txt", FileOptions::default()).unwrap();
        writer.write_all(b"x").unwrap();
        writer.finish().unwrap();
        let fake = dir.path().join("fake.zip");
        fs::write(&fake, b"not a zip").unwrap();
        let short = dir.path().join("short.zip");
        fs::write(&short, b"PK").unwrap();

        assert!(is_zip_archive(&disguised));
        assert!(!is_zip_archive(&fake));
        assert!(!is_zip_archive(&short));
    }

    #[test]
    fn directory_scan_recurses_and_expands_archives() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a/b");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.path().join("TreatmentView_2024-01-03.log"), "x\n").unwrap();
        fs::write(nested.join("TreatmentView_2024-01-01.log"), "x\n").unwrap();
        fs::write(nested.join("notes.txt"), "x\n").unwrap();

        let mut writer = ZipWriter::new(File::create(nested.join("backup.bin")).unwrap());
        writer
            .start_file("TreatmentView_2024-01-02.log.1", FileOptions::default())
            .unwrap();
        writer.write_all(b"x\n").unwrap();
        writer
            .start_file("readme.md", FileOptions::default())
            .unwrap();
        writer.write_all(b"x\n").unwrap();
        writer.finish().unwrap();

        let sources = discover(dir.path()).unwrap();
        assert_eq!(
            names(&sources),
            vec![
                "TreatmentView_2024-01-01.log",
                "TreatmentView_2024-01-02.log.1",
                "TreatmentView_2024-01-03.log",
            ]
        );
        assert!(sources[1].archive().is_some());
    }

    #[test]
    fn repeated_inputs_are_deduplicated() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("TreatmentView_2024-01-01.log");
        fs::write(&log, "x\n").unwrap();
        let sources = discover_all(&[log.clone(), log.clone(), dir.path().to_path_buf()]).unwrap();
        assert_eq!(sources.len(), 1);
    }

    #[test]
    fn single_plain_file_is_taken_as_is() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("export.txt");
        fs::write(&log, "x\n").unwrap();
        let sources = discover(&log).unwrap();
        assert_eq!(names(&sources), vec!["export.txt"]);
    }

    #[test]
    fn missing_input_is_an_error() {
        let dir = tempdir().unwrap();
        let err = discover(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, MvDoseError::InputNotFound(_)));
    }
}
