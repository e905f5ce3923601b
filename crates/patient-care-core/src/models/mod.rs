//! Domain models for the patient care system.

mod medicine;
mod patient;

pub use medicine::*;
pub use patient::*;
