//! Tabular listing rows with derived remaining-tablet values.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{MedicineCourse, Patient};

/// Remaining counts at or below this are critical.
pub const CRITICAL_THRESHOLD: i64 = 3;
/// Remaining counts at or below this (and above critical) are a warning.
pub const WARNING_THRESHOLD: i64 = 5;

/// Row highlight level in the patient listing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Highlight {
    Critical,
    Warning,
    Normal,
}

impl Highlight {
    pub fn for_remaining(remaining: i64) -> Self {
        if remaining <= CRITICAL_THRESHOLD {
            Highlight::Critical
        } else if remaining <= WARNING_THRESHOLD {
            Highlight::Warning
        } else {
            Highlight::Normal
        }
    }
}

/// One listing line: a patient joined with at most one of their courses.
///
/// A patient with no courses still appears once, with `medicine: None` and a
/// remaining count of zero.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientRow {
    pub patient: Patient,
    pub medicine: Option<MedicineCourse>,
    pub remaining: i64,
    pub highlight: Highlight,
}

impl PatientRow {
    pub fn new(patient: Patient, medicine: Option<MedicineCourse>, today: NaiveDate) -> Self {
        let remaining = medicine
            .as_ref()
            .map(|m| m.remaining_tablets(today))
            .unwrap_or(0);
        Self {
            patient,
            medicine,
            remaining,
            highlight: Highlight::for_remaining(remaining),
        }
    }
}
