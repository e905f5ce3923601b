//! Medicine-course models.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::dosage;

/// Date format used for every persisted calendar date.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Dosing frequency codes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Frequency {
    /// Once daily
    #[serde(rename = "OD")]
    Once,
    /// Twice daily
    #[serde(rename = "BD")]
    Twice,
    /// Three times daily
    #[serde(rename = "TDS")]
    Thrice,
    /// Four times daily
    #[serde(rename = "QID")]
    FourTimes,
}

impl Frequency {
    pub const ALL: [Frequency; 4] = [
        Frequency::Once,
        Frequency::Twice,
        Frequency::Thrice,
        Frequency::FourTimes,
    ];

    /// The stored code for this frequency.
    pub fn code(&self) -> &'static str {
        match self {
            Frequency::Once => "OD",
            Frequency::Twice => "BD",
            Frequency::Thrice => "TDS",
            Frequency::FourTimes => "QID",
        }
    }

    /// Tablets taken per day.
    pub fn daily_count(&self) -> u32 {
        match self {
            Frequency::Once => 1,
            Frequency::Twice => 2,
            Frequency::Thrice => 3,
            Frequency::FourTimes => 4,
        }
    }

    /// Parse a code, ignoring case and surrounding whitespace.
    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim();
        Self::ALL
            .into_iter()
            .find(|f| f.code().eq_ignore_ascii_case(code))
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Frequency {
    type Err = dosage::DosageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_code(s).ok_or_else(|| dosage::DosageError::UnknownFrequency(s.to_string()))
    }
}

/// A persisted medicine course.
///
/// Dates and the frequency stay as stored text so that rows written by other
/// tools (or restored from old backups) can still be listed; derived values
/// fall back to safe defaults when they do not parse.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MedicineCourse {
    pub medicine_id: i64,
    pub patient_id: i64,
    /// Title-cased medicine name
    pub name: String,
    /// `YYYY-MM-DD`
    pub start_date: String,
    /// Tablet count
    pub quantity: i64,
    /// Frequency code (OD, BD, TDS, QID)
    pub frequency: String,
    /// `YYYY-MM-DD`
    pub end_date: String,
}

impl MedicineCourse {
    /// Parsed frequency, if the stored code is recognised.
    pub fn parsed_frequency(&self) -> Option<Frequency> {
        Frequency::from_code(&self.frequency)
    }

    /// Tablets left as of `today`.
    pub fn remaining_tablets(&self, today: NaiveDate) -> i64 {
        dosage::remaining_tablets(
            &self.start_date,
            &self.end_date,
            self.quantity,
            &self.frequency,
            today,
        )
    }
}

/// A validated medicine course ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct MedicineInput {
    pub name: String,
    pub start_date: NaiveDate,
    pub quantity: u32,
    pub frequency: Frequency,
    pub end_date: NaiveDate,
}

impl MedicineInput {
    /// Create a course whose end date is derived from start, quantity and frequency.
    pub fn new(
        name: impl Into<String>,
        start_date: NaiveDate,
        quantity: u32,
        frequency: Frequency,
    ) -> Self {
        let end_date = dosage::end_date(start_date, quantity, frequency).unwrap_or(start_date);
        Self {
            name: name.into(),
            start_date,
            quantity,
            frequency,
            end_date,
        }
    }

    /// Override the derived end date with an independently edited one.
    pub fn with_end_date(mut self, end_date: NaiveDate) -> Self {
        self.end_date = end_date;
        self
    }
}
