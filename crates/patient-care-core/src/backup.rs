//! Backup and restore of the store file.
//!
//! A backup is a gzip-compressed tar archive holding the raw store file (under
//! the live file's name) and a `backup_meta.json` summary. Restore extracts to a
//! scratch directory next to the live store, validates, then closes the live
//! connection, copies the file over, and reopens through the same handle.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::DATABASE_VERSION;
use crate::db::{Database, DbError, RecordCounts};

/// Name of the metadata member inside every archive.
pub const METADATA_FILE: &str = "backup_meta.json";
/// File name prefix of generated archives.
pub const BACKUP_PREFIX: &str = "patientcare_backup_";
/// File name suffix of generated archives.
pub const BACKUP_EXTENSION: &str = ".tar.gz";

/// Backup and restore errors.
#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Backup archive not found: {}", .0.display())]
    ArchiveNotFound(PathBuf),

    #[error("Backup archive is missing {0}")]
    MissingMember(String),

    #[error("Store file checksum mismatch (expected {expected}, found {actual})")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Store is in memory; there is no store file")]
    NoStoreFile,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Backup metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<rusqlite::Error> for BackupError {
    fn from(e: rusqlite::Error) -> Self {
        BackupError::Db(e.into())
    }
}

/// Summary written next to the store file in every archive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackupMetadata {
    /// `YYYYMMDD_HHMMSS`, local time
    pub backup_date: String,
    /// Store format version tag
    pub database_version: String,
    pub records: RecordCounts,
    /// SHA-256 of the store file; absent in archives from older builds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

/// Result of a successful backup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSummary {
    pub backup_path: PathBuf,
    pub size_bytes: u64,
    pub metadata: BackupMetadata,
}

/// Result of a successful restore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreSummary {
    pub archive: PathBuf,
    pub metadata: BackupMetadata,
    /// Row counts read from the restored store
    pub restored: RecordCounts,
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn store_file_name(path: &Path) -> Result<String, BackupError> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or(BackupError::NoStoreFile)
}

fn append_member<W: std::io::Write>(
    builder: &mut tar::Builder<W>,
    name: &str,
    bytes: &[u8],
    mtime: u64,
) -> std::io::Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(mtime);
    builder.append_data(&mut header, name, bytes)
}

/// Upper bound on archives sharing one timestamp.
const MAX_SAME_SECOND: u32 = 1000;

/// Create a new archive file without replacing an existing one.
///
/// Backups taken within the same second get a `_1`, `_2`, ... suffix.
fn create_archive_file(backup_dir: &Path, stamp: &str) -> Result<(PathBuf, File), BackupError> {
    for attempt in 0..MAX_SAME_SECOND {
        let name = if attempt == 0 {
            format!("{BACKUP_PREFIX}{stamp}{BACKUP_EXTENSION}")
        } else {
            format!("{BACKUP_PREFIX}{stamp}_{attempt}{BACKUP_EXTENSION}")
        };
        let path = backup_dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("too many backups stamped {stamp}"),
    )
    .into())
}

/// Timestamp and same-second counter of an archive name, for ordering.
fn archive_sort_key(path: &Path) -> (String, u32) {
    let stem = path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.strip_prefix(BACKUP_PREFIX))
        .and_then(|n| n.strip_suffix(BACKUP_EXTENSION))
        .unwrap_or_default();
    // `YYYYMMDD_HHMMSS` is 15 characters; anything after is `_<n>`
    match stem.get(..15) {
        Some(stamp) => {
            let counter = stem[15..]
                .strip_prefix('_')
                .and_then(|n| n.parse().ok())
                .unwrap_or(0);
            (stamp.to_string(), counter)
        }
        None => (stem.to_string(), 0),
    }
}

/// Write a timestamped archive of the live store into `backup_dir`.
pub fn create_backup(db: &Database, backup_dir: &Path) -> Result<BackupSummary, BackupError> {
    let db_path = db.path().ok_or(BackupError::NoStoreFile)?;
    let db_name = store_file_name(db_path)?;
    let records = db.counts()?;

    let store_bytes = fs::read(db_path)?;
    let now = chrono::Local::now();
    let metadata = BackupMetadata {
        backup_date: now.format("%Y%m%d_%H%M%S").to_string(),
        database_version: DATABASE_VERSION.to_string(),
        records,
        checksum: Some(sha256_hex(&store_bytes)),
    };
    let metadata_json = serde_json::to_vec_pretty(&metadata)?;

    fs::create_dir_all(backup_dir)?;
    let (backup_path, file) = create_archive_file(backup_dir, &metadata.backup_date)?;

    {
        let gz = GzEncoder::new(file, flate2::Compression::default());
        let mut tar = tar::Builder::new(gz);
        let mtime = now.timestamp().max(0) as u64;
        append_member(&mut tar, &db_name, &store_bytes, mtime)?;
        append_member(&mut tar, METADATA_FILE, &metadata_json, mtime)?;
        tar.into_inner()?.finish()?;
    }

    let size_bytes = fs::metadata(&backup_path)?.len();
    tracing::info!(
        path = %backup_path.display(),
        patients = records.patients,
        medicines = records.medicines,
        size_bytes,
        "Backup created"
    );

    Ok(BackupSummary {
        backup_path,
        size_bytes,
        metadata,
    })
}

/// Archives in `backup_dir`, newest first.
pub fn list_backups(backup_dir: &Path) -> Result<Vec<PathBuf>, BackupError> {
    if !backup_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut archives: Vec<PathBuf> = fs::read_dir(backup_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(BACKUP_PREFIX) && n.ends_with(BACKUP_EXTENSION))
        })
        .collect();
    archives.sort_by_key(|path| std::cmp::Reverse(archive_sort_key(path)));
    Ok(archives)
}

fn read_counts(path: &Path) -> Result<RecordCounts, BackupError> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    let patients: u32 = conn.query_row("SELECT COUNT(*) FROM patients", [], |row| row.get(0))?;
    let medicines: u32 = conn.query_row("SELECT COUNT(*) FROM medicines", [], |row| row.get(0))?;
    Ok(RecordCounts {
        patients,
        medicines,
    })
}

/// Close the store, copy `source` over `live_path`, and reopen.
///
/// On failure the handle is reconnected to whatever file is on disk; a partial
/// copy is not undone.
fn replace_store(db: &mut Database, source: &Path, live_path: &Path) -> Result<(), BackupError> {
    db.close()?;
    let swapped = fs::copy(source, live_path)
        .map_err(BackupError::from)
        .and_then(|_| db.reopen().map_err(BackupError::from));
    if let Err(e) = swapped {
        tracing::error!(error = %e, "Restore failed after closing the store; reconnecting");
        if let Err(reconnect) = db.reopen() {
            tracing::error!(error = %reconnect, "Could not reconnect to the store file");
        }
        return Err(e);
    }
    Ok(())
}

/// Replace the live store with the one inside `archive`.
///
/// The archive is fully validated before the live connection is touched. If
/// the copy or reopen fails, the handle is reconnected to whatever file is on
/// disk so the application stays usable; a partial copy is not undone.
pub fn restore_backup(db: &mut Database, archive: &Path) -> Result<RestoreSummary, BackupError> {
    if !archive.is_file() {
        return Err(BackupError::ArchiveNotFound(archive.to_path_buf()));
    }
    let live_path = db.path().ok_or(BackupError::NoStoreFile)?.to_path_buf();
    let db_name = store_file_name(&live_path)?;

    // Removed on drop, whatever happens below
    let staging_parent = live_path.parent().unwrap_or_else(|| Path::new("."));
    let staging = tempfile::Builder::new()
        .prefix("restore_")
        .tempdir_in(staging_parent)?;

    tar::Archive::new(GzDecoder::new(File::open(archive)?)).unpack(staging.path())?;

    let extracted = staging.path().join(&db_name);
    if !extracted.is_file() {
        return Err(BackupError::MissingMember(db_name));
    }
    let metadata_path = staging.path().join(METADATA_FILE);
    if !metadata_path.is_file() {
        return Err(BackupError::MissingMember(METADATA_FILE.to_string()));
    }
    let metadata: BackupMetadata = serde_json::from_slice(&fs::read(&metadata_path)?)?;

    if let Some(expected) = &metadata.checksum {
        let actual = sha256_hex(&fs::read(&extracted)?);
        if !expected.eq_ignore_ascii_case(&actual) {
            return Err(BackupError::ChecksumMismatch {
                expected: expected.clone(),
                actual,
            });
        }
    }

    let restored = read_counts(&extracted)?;
    if restored != metadata.records {
        tracing::warn!(
            expected = ?metadata.records,
            found = ?restored,
            "Backup metadata counts differ from archived store"
        );
    }

    replace_store(db, &extracted, &live_path)?;

    tracing::info!(
        archive = %archive.display(),
        backup_date = %metadata.backup_date,
        patients = restored.patients,
        medicines = restored.medicines,
        "Backup restored"
    );

    Ok(RestoreSummary {
        archive: archive.to_path_buf(),
        metadata,
        restored,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Frequency, MedicineInput, PatientInput};
    use chrono::NaiveDate;

    fn seeded_store(dir: &Path) -> Database {
        let mut db = Database::open(dir.join("patientcare.db")).unwrap();
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let input = PatientInput::new("Asha Rao")
            .with_medicine(MedicineInput::new("Metformin", start, 20, Frequency::Twice));
        db.create_patient(&input).unwrap();
        db
    }

    fn staging_dirs(dir: &Path) -> usize {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("restore_"))
            .count()
    }

    fn write_archive(path: &Path, members: &[(&str, &[u8])]) {
        let gz = GzEncoder::new(File::create(path).unwrap(), flate2::Compression::default());
        let mut tar = tar::Builder::new(gz);
        for (name, bytes) in members {
            append_member(&mut tar, name, bytes, 0).unwrap();
        }
        tar.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_backup_contains_store_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let db = seeded_store(dir.path());

        let summary = create_backup(&db, &dir.path().join("backups")).unwrap();
        assert!(summary.backup_path.is_file());
        assert_eq!(summary.metadata.records.patients, 1);
        assert_eq!(summary.metadata.records.medicines, 1);
        assert_eq!(summary.metadata.database_version, DATABASE_VERSION);

        let mut archive =
            tar::Archive::new(GzDecoder::new(File::open(&summary.backup_path).unwrap()));
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["patientcare.db".to_string(), METADATA_FILE.to_string()]);
    }

    #[test]
    fn test_backup_in_memory_fails() {
        let db = Database::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(create_backup(&db, dir.path()), Err(BackupError::NoStoreFile)));
    }

    #[test]
    fn test_restore_missing_archive() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = seeded_store(dir.path());
        let result = restore_backup(&mut db, &dir.path().join("nope.tar.gz"));
        assert!(matches!(result, Err(BackupError::ArchiveNotFound(_))));
        assert_eq!(db.counts().unwrap().patients, 1);
    }

    #[test]
    fn test_restore_missing_store_member() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = seeded_store(dir.path());
        let archive = dir.path().join("bad.tar.gz");
        write_archive(&archive, &[(METADATA_FILE, &b"{}"[..])]);

        let result = restore_backup(&mut db, &archive);
        assert!(matches!(result, Err(BackupError::MissingMember(ref m)) if m == "patientcare.db"));
        assert_eq!(db.counts().unwrap().patients, 1);
        assert_eq!(staging_dirs(dir.path()), 0);
    }

    #[test]
    fn test_restore_missing_metadata_member() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = seeded_store(dir.path());
        let store = fs::read(dir.path().join("patientcare.db")).unwrap();
        let archive = dir.path().join("bad.tar.gz");
        write_archive(&archive, &[("patientcare.db", store.as_slice())]);

        let result = restore_backup(&mut db, &archive);
        assert!(matches!(result, Err(BackupError::MissingMember(ref m)) if m == METADATA_FILE));
        assert_eq!(staging_dirs(dir.path()), 0);
    }

    #[test]
    fn test_restore_checksum_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = seeded_store(dir.path());
        let store = fs::read(dir.path().join("patientcare.db")).unwrap();
        let metadata = BackupMetadata {
            backup_date: "20240101_000000".into(),
            database_version: DATABASE_VERSION.into(),
            records: RecordCounts {
                patients: 1,
                medicines: 1,
            },
            checksum: Some("00".repeat(32)),
        };
        let metadata_json = serde_json::to_vec(&metadata).unwrap();
        let archive = dir.path().join("tampered.tar.gz");
        write_archive(
            &archive,
            &[
                ("patientcare.db", store.as_slice()),
                (METADATA_FILE, metadata_json.as_slice()),
            ],
        );

        let result = restore_backup(&mut db, &archive);
        assert!(matches!(result, Err(BackupError::ChecksumMismatch { .. })));
        assert_eq!(db.counts().unwrap().patients, 1);
        assert_eq!(staging_dirs(dir.path()), 0);
    }

    #[test]
    fn test_metadata_without_checksum_parses() {
        let json = r#"{"backup_date":"20240101_120000","database_version":"1.0","records":{"patients":3,"medicines":5}}"#;
        let metadata: BackupMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(metadata.records.medicines, 5);
        assert!(metadata.checksum.is_none());
    }

    #[test]
    fn test_list_backups_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        for stamp in ["20240101_000000", "20240301_000000", "20240201_000000"] {
            File::create(dir.path().join(format!("{BACKUP_PREFIX}{stamp}{BACKUP_EXTENSION}")))
                .unwrap();
        }
        File::create(dir.path().join("notes.txt")).unwrap();

        let listed = list_backups(dir.path()).unwrap();
        assert_eq!(listed.len(), 3);
        assert!(listed[0].to_string_lossy().contains("20240301"));
        assert!(list_backups(&dir.path().join("absent")).unwrap().is_empty());
    }

    #[test]
    fn test_back_to_back_backups_keep_both() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = seeded_store(dir.path());
        let backups = dir.path().join("backups");

        let first = create_backup(&db, &backups).unwrap();
        let start = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        db.create_patient(
            &PatientInput::new("Ravi Kumar")
                .with_medicine(MedicineInput::new("Aspirin", start, 10, Frequency::Once)),
        )
        .unwrap();
        let second = create_backup(&db, &backups).unwrap();

        assert_ne!(first.backup_path, second.backup_path);
        let listed = list_backups(&backups).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0], second.backup_path);

        // The earlier snapshot is intact.
        restore_backup(&mut db, &first.backup_path).unwrap();
        assert_eq!(db.counts().unwrap().patients, 1);
    }

    #[test]
    fn test_same_second_archives_listed_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["20240101_000000", "20240101_000000_2", "20240101_000000_10", "20240101_000000_1"] {
            File::create(dir.path().join(format!("{BACKUP_PREFIX}{name}{BACKUP_EXTENSION}")))
                .unwrap();
        }
        let names: Vec<String> = list_backups(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                format!("{BACKUP_PREFIX}20240101_000000_10{BACKUP_EXTENSION}"),
                format!("{BACKUP_PREFIX}20240101_000000_2{BACKUP_EXTENSION}"),
                format!("{BACKUP_PREFIX}20240101_000000_1{BACKUP_EXTENSION}"),
                format!("{BACKUP_PREFIX}20240101_000000{BACKUP_EXTENSION}"),
            ]
        );
    }

    #[test]
    fn test_failed_swap_reconnects_to_live_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = seeded_store(dir.path());
        let live = dir.path().join("patientcare.db");

        // The copy fails after the connection has been closed.
        let result = replace_store(&mut db, &dir.path().join("vanished.db"), &live);
        assert!(matches!(result, Err(BackupError::Io(_))));

        assert_eq!(db.path(), Some(live.as_path()));
        assert_eq!(db.counts().unwrap().patients, 1);
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        db.create_patient(
            &PatientInput::new("Meera Nair")
                .with_medicine(MedicineInput::new("Zinc", start, 10, Frequency::Once)),
        )
        .unwrap();
        assert_eq!(db.counts().unwrap().patients, 2);
    }
}
