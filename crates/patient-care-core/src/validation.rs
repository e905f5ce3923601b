//! Entry-form validation.
//!
//! Raw text typed into the patient form is checked here and turned into a
//! [`PatientInput`]. Nothing reaches the store until the whole form passes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dosage;
use crate::models::{Frequency, MedicineInput, PatientInput};

/// Form validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Patient name is required")]
    MissingName,

    #[error("Age must be a number, got {0:?}")]
    InvalidAge(String),

    #[error("Mobile number must be exactly 10 digits or empty, got {0:?}")]
    InvalidMobile(String),

    #[error("{medicine}: quantity must be a positive integer, got {value:?}")]
    InvalidQuantity { medicine: String, value: String },

    #[error("{medicine}: frequency must be one of OD, BD, TDS, QID, got {value:?}")]
    UnknownFrequency { medicine: String, value: String },

    #[error("{medicine}: invalid date {value:?} (expected YYYY-MM-DD)")]
    InvalidDate { medicine: String, value: String },

    #[error("At least one medicine must be provided")]
    NoMedicines,
}

pub type ValidationResult<T> = Result<T, ValidationError>;

/// Mobile numbers are optional; when present they must be exactly 10 ASCII digits.
pub fn validate_mobile_number(mobile: &str) -> bool {
    mobile.is_empty() || (mobile.len() == 10 && mobile.bytes().all(|b| b.is_ascii_digit()))
}

/// Capitalise the first letter of every alphabetic run and lowercase the rest.
pub fn title_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_alpha = false;
    for c in value.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

/// One medicine row of the entry form, as typed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MedicineForm {
    pub name: String,
    pub start_date: String,
    pub quantity: String,
    pub frequency: String,
    /// Independently edited end date; derived when absent
    pub end_date: Option<String>,
}

impl MedicineForm {
    /// Validate the row. Rows with a blank name are skipped (`Ok(None)`).
    pub fn validate(&self) -> ValidationResult<Option<MedicineInput>> {
        let name = title_case(self.name.trim());
        if name.is_empty() {
            return Ok(None);
        }

        let start_date = dosage::parse_date(&self.start_date).map_err(|_| {
            ValidationError::InvalidDate {
                medicine: name.clone(),
                value: self.start_date.clone(),
            }
        })?;

        let quantity_text = self.quantity.trim();
        let quantity = quantity_text
            .parse::<u32>()
            .ok()
            .filter(|q| *q > 0 && quantity_text.bytes().all(|b| b.is_ascii_digit()))
            .ok_or_else(|| ValidationError::InvalidQuantity {
                medicine: name.clone(),
                value: self.quantity.clone(),
            })?;

        let frequency = Frequency::from_code(&self.frequency).ok_or_else(|| {
            ValidationError::UnknownFrequency {
                medicine: name.clone(),
                value: self.frequency.clone(),
            }
        })?;

        let mut input = MedicineInput::new(name.clone(), start_date, quantity, frequency);
        if let Some(end) = self.end_date.as_deref().filter(|e| !e.trim().is_empty()) {
            let end_date = dosage::parse_date(end).map_err(|_| ValidationError::InvalidDate {
                medicine: name,
                value: end.to_string(),
            })?;
            input = input.with_end_date(end_date);
        }
        Ok(Some(input))
    }
}

/// The patient entry form, as typed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PatientForm {
    pub name: String,
    pub age: String,
    pub gender: String,
    pub address: String,
    pub mobile: String,
    pub medicines: Vec<MedicineForm>,
}

impl PatientForm {
    /// Validate every field and every medicine row.
    pub fn validate(&self) -> ValidationResult<PatientInput> {
        let name = title_case(self.name.trim());
        if name.is_empty() {
            return Err(ValidationError::MissingName);
        }

        let age = self.age.trim();
        let age = if age.is_empty() {
            None
        } else if age.bytes().all(|b| b.is_ascii_digit()) {
            Some(
                age.parse::<u32>()
                    .map_err(|_| ValidationError::InvalidAge(self.age.clone()))?,
            )
        } else {
            return Err(ValidationError::InvalidAge(self.age.clone()));
        };

        let mobile = self.mobile.trim();
        if !validate_mobile_number(mobile) {
            return Err(ValidationError::InvalidMobile(self.mobile.clone()));
        }

        let mut medicines = Vec::new();
        for row in &self.medicines {
            if let Some(medicine) = row.validate()? {
                medicines.push(medicine);
            }
        }
        if medicines.is_empty() {
            return Err(ValidationError::NoMedicines);
        }

        Ok(PatientInput {
            name,
            age,
            gender: non_empty(&self.gender),
            address: non_empty(&self.address),
            mobile_number: non_empty(mobile),
            medicines,
        })
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
