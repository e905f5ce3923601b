//! Document export.

mod pdf;

pub use pdf::*;
