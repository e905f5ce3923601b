//! SQLite schema definition.

/// Complete database schema for the patient care store.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Patients
-- ============================================================================

-- patient_id is assigned by the application (lowest unused id) and kept
-- contiguous by resequencing, so no AUTOINCREMENT here.
CREATE TABLE IF NOT EXISTS patients (
    patient_id INTEGER PRIMARY KEY,
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    age INTEGER CHECK (age IS NULL OR age >= 0),
    gender TEXT,
    address TEXT,
    mobile_number TEXT CHECK (
        mobile_number IS NULL
        OR (length(mobile_number) = 10 AND mobile_number NOT GLOB '*[^0-9]*')
    ),
    entry_date TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_patients_name ON patients(name);

-- ============================================================================
-- Medicine courses
-- ============================================================================

CREATE TABLE IF NOT EXISTS medicines (
    medicine_id INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_id INTEGER NOT NULL REFERENCES patients(patient_id) ON DELETE CASCADE,
    medicine_name TEXT NOT NULL CHECK (length(trim(medicine_name)) > 0),
    start_date TEXT NOT NULL,                    -- YYYY-MM-DD
    quantity INTEGER NOT NULL CHECK (quantity > 0),
    frequency TEXT NOT NULL CHECK (frequency IN ('OD', 'BD', 'TDS', 'QID')),
    end_date TEXT NOT NULL                       -- YYYY-MM-DD
);

CREATE INDEX IF NOT EXISTS idx_medicines_patient ON medicines(patient_id);
"#;
