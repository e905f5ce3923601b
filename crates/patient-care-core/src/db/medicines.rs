//! Medicine-course database operations.

use rusqlite::{params, Connection, Row};

use super::{Database, DbResult};
use crate::dosage::format_date;
use crate::models::{MedicineCourse, MedicineInput};

pub(crate) const MEDICINE_COLUMNS: &str =
    "medicine_id, patient_id, medicine_name, start_date, quantity, frequency, end_date";

pub(crate) fn medicine_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<MedicineCourse> {
    Ok(MedicineCourse {
        medicine_id: row.get(offset)?,
        patient_id: row.get(offset + 1)?,
        name: row.get(offset + 2)?,
        start_date: row.get(offset + 3)?,
        quantity: row.get(offset + 4)?,
        frequency: row.get(offset + 5)?,
        end_date: row.get(offset + 6)?,
    })
}

/// Insert every course for a patient. Callers run this inside a transaction.
pub(crate) fn insert_medicines(
    conn: &Connection,
    patient_id: i64,
    medicines: &[MedicineInput],
) -> DbResult<()> {
    let mut stmt = conn.prepare(
        r#"
        INSERT INTO medicines (
            patient_id, medicine_name, start_date, quantity, frequency, end_date
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )?;
    for medicine in medicines {
        stmt.execute(params![
            patient_id,
            medicine.name,
            format_date(medicine.start_date),
            medicine.quantity,
            medicine.frequency.code(),
            format_date(medicine.end_date),
        ])?;
    }
    Ok(())
}

pub(crate) fn medicines_for(conn: &Connection, patient_id: i64) -> DbResult<Vec<MedicineCourse>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MEDICINE_COLUMNS} FROM medicines WHERE patient_id = ? ORDER BY medicine_id"
    ))?;
    let rows = stmt.query_map([patient_id], |row| medicine_from_row(row, 0))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

impl Database {
    /// List a patient's medicine courses in entry order.
    pub fn list_medicines(&self, patient_id: i64) -> DbResult<Vec<MedicineCourse>> {
        medicines_for(&self.conn, patient_id)
    }
}
