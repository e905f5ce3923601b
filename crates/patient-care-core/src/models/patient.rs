//! Patient models.

use serde::{Deserialize, Serialize};

use super::{MedicineCourse, MedicineInput};

/// A stored patient record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    /// Contiguous identifier starting at 1
    pub patient_id: i64,
    /// Title-cased full name
    pub name: String,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub address: Option<String>,
    /// Exactly 10 digits when present
    pub mobile_number: Option<String>,
    /// Set by the store at creation
    pub entry_date: String,
}

/// Validated patient fields plus the full set of medicine courses to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct PatientInput {
    pub name: String,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub mobile_number: Option<String>,
    pub medicines: Vec<MedicineInput>,
}

impl PatientInput {
    /// Create an input with only the required name and no courses.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            age: None,
            gender: None,
            address: None,
            mobile_number: None,
            medicines: Vec::new(),
        }
    }

    /// Append a medicine course.
    pub fn with_medicine(mut self, medicine: MedicineInput) -> Self {
        self.medicines.push(medicine);
        self
    }
}

/// A patient together with all of their medicine courses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientDetail {
    pub patient: Patient,
    pub medicines: Vec<MedicineCourse>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Frequency;
    use chrono::NaiveDate;

    #[test]
    fn test_new_input() {
        let input = PatientInput::new("Asha Rao");
        assert_eq!(input.name, "Asha Rao");
        assert!(input.medicines.is_empty());
        assert!(input.mobile_number.is_none());
    }

    #[test]
    fn test_with_medicine() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let input = PatientInput::new("Asha Rao")
            .with_medicine(MedicineInput::new("Metformin", start, 30, Frequency::Twice));
        assert_eq!(input.medicines.len(), 1);
        assert_eq!(input.medicines[0].name, "Metformin");
    }
}
