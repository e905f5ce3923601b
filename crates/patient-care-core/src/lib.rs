//! Patient Care Core Library
//!
//! Single-user tracker for patients and their medication courses, backed by a
//! local SQLite store.
//!
//! # Architecture
//!
//! ```text
//!   PatientForm ──validate──▶ PatientInput ──▶ Database (patients 1─N medicines)
//!                                                  │
//!                       ┌──────────────────────────┼─────────────────────────┐
//!                       ▼                          ▼                         ▼
//!                 PatientRow listing         Patient PDF export      tar.gz backup/restore
//!          (remaining tablets, highlight)
//! ```
//!
//! # Modules
//!
//! - [`db`]: SQLite store, lowest-free id allocation, id resequencing
//! - [`models`]: Patient and medicine-course types
//! - [`dosage`]: End-date and remaining-tablet arithmetic
//! - [`validation`]: Entry-form checks
//! - [`listing`]: Table rows with stock highlighting
//! - [`export`]: Per-patient PDF report
//! - [`backup`]: Archive and restore of the store file
//! - [`config`]: Data directory and log settings

pub mod backup;
pub mod config;
pub mod db;
pub mod dosage;
pub mod export;
pub mod listing;
pub mod models;
pub mod validation;

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use thiserror::Error;

pub use backup::{BackupError, BackupMetadata, BackupSummary, RestoreSummary};
pub use config::{Config, ConfigError};
pub use db::{Database, DbError, RecordCounts, ResequenceReport};
pub use dosage::DosageError;
pub use export::ExportError;
pub use listing::{Highlight, PatientRow};
pub use models::{Frequency, MedicineCourse, MedicineInput, Patient, PatientDetail, PatientInput};
pub use validation::{MedicineForm, PatientForm, ValidationError};

/// Errors surfaced by [`PatientCare`].
#[derive(Error, Debug)]
pub enum PatientCareError {
    #[error("Patient {0} not found")]
    NotFound(i64),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Dosage(#[from] DosageError),

    #[error(transparent)]
    Backup(#[from] BackupError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type PatientCareResult<T> = Result<T, PatientCareError>;

/// Application entry point: owns the store handle and configuration.
pub struct PatientCare {
    db: Database,
    config: Config,
}

impl PatientCare {
    /// Open (creating if needed) the store under `config.data_dir`.
    pub fn open(config: Config) -> PatientCareResult<Self> {
        config.ensure_dirs()?;
        let db = Database::open(config.db_path())?;
        Ok(Self { db, config })
    }

    /// In-memory store; backup and restore are unavailable.
    pub fn open_in_memory() -> PatientCareResult<Self> {
        Ok(Self {
            db: Database::open_in_memory()?,
            config: Config::with_data_dir(std::env::temp_dir().join(config::APP_NAME)),
        })
    }

    /// Last day of a course given as entered text, rejecting malformed input.
    pub fn course_end_date(start: &str, quantity: i64, frequency: &str) -> PatientCareResult<String> {
        Ok(dosage::try_compute_end_date(start, quantity, frequency)?)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Validate the form and create the patient with its courses.
    pub fn save_patient(&mut self, form: &PatientForm) -> PatientCareResult<Patient> {
        let input = form.validate()?;
        Ok(self.db.create_patient(&input)?)
    }

    /// Validate the form and replace the patient's fields and courses.
    pub fn update_patient(&mut self, patient_id: i64, form: &PatientForm) -> PatientCareResult<Patient> {
        let input = form.validate()?;
        if !self.db.update_patient(patient_id, &input)? {
            return Err(PatientCareError::NotFound(patient_id));
        }
        self.db
            .get_patient(patient_id)?
            .ok_or(PatientCareError::NotFound(patient_id))
    }

    /// Delete the patient and compact the remaining ids.
    pub fn delete_patient(&mut self, patient_id: i64) -> PatientCareResult<ResequenceReport> {
        self.db
            .delete_patient(patient_id)?
            .ok_or(PatientCareError::NotFound(patient_id))
    }

    /// Listing rows as of today.
    pub fn patient_rows(&self) -> PatientCareResult<Vec<PatientRow>> {
        self.patient_rows_on(dosage::today())
    }

    pub fn patient_rows_on(&self, today: NaiveDate) -> PatientCareResult<Vec<PatientRow>> {
        Ok(self.db.list_patient_rows(today)?)
    }

    /// Rows whose patient name contains `term`; blank lists everything.
    pub fn search(&self, term: &str) -> PatientCareResult<Vec<PatientRow>> {
        Ok(self.db.search_patient_rows(term, dosage::today())?)
    }

    pub fn patient_detail(&self, patient_id: i64) -> PatientCareResult<PatientDetail> {
        self.db
            .get_patient_detail(patient_id)?
            .ok_or(PatientCareError::NotFound(patient_id))
    }

    pub fn next_patient_id(&self) -> PatientCareResult<i64> {
        Ok(self.db.next_patient_id()?)
    }

    pub fn counts(&self) -> PatientCareResult<RecordCounts> {
        Ok(self.db.counts()?)
    }

    /// Write the patient's PDF report to `output`, or to the exports directory.
    pub fn export_pdf(&self, patient_id: i64, output: Option<&Path>) -> PatientCareResult<PathBuf> {
        let detail = self.patient_detail(patient_id)?;
        let path = match output {
            Some(path) => path.to_path_buf(),
            None => export::default_export_path(&self.config.exports_dir(), patient_id),
        };
        Ok(export::export_patient_pdf(&detail, &path, dosage::today())?)
    }

    /// Archive the store into the backups directory.
    pub fn backup(&self) -> PatientCareResult<BackupSummary> {
        Ok(backup::create_backup(&self.db, &self.config.backups_dir())?)
    }

    /// Archives in the backups directory, newest first.
    pub fn list_backups(&self) -> PatientCareResult<Vec<PathBuf>> {
        Ok(backup::list_backups(&self.config.backups_dir())?)
    }

    /// Replace the live store with the archived one.
    pub fn restore(&mut self, archive: &Path) -> PatientCareResult<RestoreSummary> {
        Ok(backup::restore_backup(&mut self.db, archive)?)
    }

    /// Compact patient ids to 1..=n.
    pub fn resequence(&mut self) -> PatientCareResult<ResequenceReport> {
        Ok(self.db.resequence_patient_ids()?)
    }
}
