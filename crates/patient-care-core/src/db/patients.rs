//! Patient database operations.

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::medicines::{insert_medicines, medicine_from_row, medicines_for};
use super::{Database, DbError, DbResult, ResequenceReport};
use crate::listing::PatientRow;
use crate::models::{Patient, PatientDetail, PatientInput};

const PATIENT_COLUMNS: &str =
    "patient_id, name, age, gender, address, mobile_number, entry_date";

const ROWS_QUERY: &str = r#"
    SELECT p.patient_id, p.name, p.age, p.gender, p.address, p.mobile_number, p.entry_date,
           m.medicine_id, m.patient_id, m.medicine_name, m.start_date,
           m.quantity, m.frequency, m.end_date
    FROM patients p
    LEFT JOIN medicines m ON m.patient_id = p.patient_id
"#;

fn patient_from_row(row: &Row<'_>) -> rusqlite::Result<Patient> {
    Ok(Patient {
        patient_id: row.get(0)?,
        name: row.get(1)?,
        age: row.get(2)?,
        gender: row.get(3)?,
        address: row.get(4)?,
        mobile_number: row.get(5)?,
        entry_date: row.get(6)?,
    })
}

fn fetch_patient(conn: &Connection, patient_id: i64) -> DbResult<Option<Patient>> {
    conn.query_row(
        &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE patient_id = ?"),
        [patient_id],
        patient_from_row,
    )
    .optional()
    .map_err(Into::into)
}

/// Lowest positive integer not used as a patient id.
fn lowest_free_id(conn: &Connection) -> DbResult<i64> {
    let mut stmt = conn.prepare("SELECT patient_id FROM patients ORDER BY patient_id")?;
    let ids = stmt.query_map([], |row| row.get::<_, i64>(0))?;

    let mut candidate = 1;
    for id in ids {
        let id = id?;
        if id == candidate {
            candidate += 1;
        } else if id > candidate {
            break;
        }
    }
    Ok(candidate)
}

fn require_medicines(input: &PatientInput) -> DbResult<()> {
    if input.medicines.is_empty() {
        return Err(DbError::Constraint(
            "a patient needs at least one medicine course".into(),
        ));
    }
    Ok(())
}

impl Database {
    /// Insert a patient and all of their medicine courses atomically.
    ///
    /// The patient gets the lowest unused id, filling any gap left by a
    /// deletion that was not followed by resequencing.
    pub fn create_patient(&mut self, input: &PatientInput) -> DbResult<Patient> {
        require_medicines(input)?;

        let tx = self.conn.transaction()?;
        let patient_id = lowest_free_id(&tx)?;
        tx.execute(
            r#"
            INSERT INTO patients (
                patient_id, name, age, gender, address, mobile_number
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                patient_id,
                input.name,
                input.age,
                input.gender,
                input.address,
                input.mobile_number,
            ],
        )?;
        insert_medicines(&tx, patient_id, &input.medicines)?;
        let patient = fetch_patient(&tx, patient_id)?
            .ok_or_else(|| DbError::NotFound(format!("patient {patient_id}")))?;
        tx.commit()?;

        tracing::info!(
            patient_id,
            medicines = input.medicines.len(),
            "Patient created"
        );
        Ok(patient)
    }

    /// Update patient fields and replace the full medicine set.
    ///
    /// Existing courses are deleted and the new ones inserted, so course ids
    /// change on every update. Returns `false` if the patient does not exist.
    pub fn update_patient(&mut self, patient_id: i64, input: &PatientInput) -> DbResult<bool> {
        require_medicines(input)?;

        let tx = self.conn.transaction()?;
        let rows_affected = tx.execute(
            r#"
            UPDATE patients SET
                name = ?2,
                age = ?3,
                gender = ?4,
                address = ?5,
                mobile_number = ?6
            WHERE patient_id = ?1
            "#,
            params![
                patient_id,
                input.name,
                input.age,
                input.gender,
                input.address,
                input.mobile_number,
            ],
        )?;
        if rows_affected == 0 {
            return Ok(false);
        }
        tx.execute("DELETE FROM medicines WHERE patient_id = ?", [patient_id])?;
        insert_medicines(&tx, patient_id, &input.medicines)?;
        tx.commit()?;

        tracing::info!(
            patient_id,
            medicines = input.medicines.len(),
            "Patient updated"
        );
        Ok(true)
    }

    /// Get a patient by id.
    pub fn get_patient(&self, patient_id: i64) -> DbResult<Option<Patient>> {
        fetch_patient(&self.conn, patient_id)
    }

    /// Get a patient together with all of their courses.
    pub fn get_patient_detail(&self, patient_id: i64) -> DbResult<Option<PatientDetail>> {
        let Some(patient) = fetch_patient(&self.conn, patient_id)? else {
            return Ok(None);
        };
        let medicines = medicines_for(&self.conn, patient_id)?;
        Ok(Some(PatientDetail { patient, medicines }))
    }

    /// List all patients by id.
    pub fn list_patients(&self) -> DbResult<Vec<Patient>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PATIENT_COLUMNS} FROM patients ORDER BY patient_id"
        ))?;
        let rows = stmt.query_map([], patient_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Id the next created patient will receive.
    pub fn next_patient_id(&self) -> DbResult<i64> {
        lowest_free_id(&self.conn)
    }

    /// Delete a patient and their courses, then resequence all patient ids.
    ///
    /// Deletion and resequencing commit together or not at all. Returns `None`
    /// if no such patient exists.
    pub fn delete_patient(&mut self, patient_id: i64) -> DbResult<Option<ResequenceReport>> {
        if fetch_patient(&self.conn, patient_id)?.is_none() {
            return Ok(None);
        }

        // Foreign keys are suspended for the remap, so the cascade is done by hand.
        let report = self.with_foreign_keys_suspended(|tx| {
            let medicines = tx.execute("DELETE FROM medicines WHERE patient_id = ?", [patient_id])?;
            tx.execute("DELETE FROM patients WHERE patient_id = ?", [patient_id])?;
            tracing::debug!(patient_id, medicines, "Patient rows removed");
            super::resequence::remap_patient_ids(tx)
        })?;

        tracing::info!(
            patient_id,
            renumbered = report.changes.len(),
            "Patient deleted"
        );
        Ok(Some(report))
    }

    /// All patients left-joined with their courses, ordered by patient then course.
    pub fn list_patient_rows(&self, today: NaiveDate) -> DbResult<Vec<PatientRow>> {
        let sql = format!("{ROWS_QUERY} ORDER BY p.patient_id, m.medicine_id");
        self.query_rows(&sql, [], today)
    }

    /// Rows whose patient name contains `term`, ignoring case.
    ///
    /// Matching uses Unicode lowercasing, which SQLite's ASCII-only `lower()`
    /// cannot do, so rows are filtered after the join. A blank term lists
    /// everything.
    pub fn search_patient_rows(&self, term: &str, today: NaiveDate) -> DbResult<Vec<PatientRow>> {
        let term = term.trim().to_lowercase();
        let rows = self.list_patient_rows(today)?;
        if term.is_empty() {
            return Ok(rows);
        }
        Ok(rows
            .into_iter()
            .filter(|row| row.patient.name.to_lowercase().contains(&term))
            .collect())
    }

    fn query_rows<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
        today: NaiveDate,
    ) -> DbResult<Vec<PatientRow>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| {
            let patient = patient_from_row(row)?;
            let medicine_id: Option<i64> = row.get(7)?;
            let medicine = match medicine_id {
                Some(_) => Some(medicine_from_row(row, 7)?),
                None => None,
            };
            Ok((patient, medicine))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (patient, medicine) = row?;
            out.push(PatientRow::new(patient, medicine, today));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::Highlight;
    use crate::models::{Frequency, MedicineInput};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn input(name: &str) -> PatientInput {
        let mut input = PatientInput::new(name).with_medicine(MedicineInput::new(
            "Metformin",
            date(2024, 1, 1),
            20,
            Frequency::Once,
        ));
        input.age = Some(50);
        input.mobile_number = Some("9876543210".into());
        input
    }

    #[test]
    fn test_create_and_get() {
        let mut db = setup_db();

        let created = db.create_patient(&input("Asha Rao")).unwrap();
        assert_eq!(created.patient_id, 1);
        assert!(!created.entry_date.is_empty());

        let detail = db.get_patient_detail(1).unwrap().unwrap();
        assert_eq!(detail.patient.name, "Asha Rao");
        assert_eq!(detail.patient.age, Some(50));
        assert_eq!(detail.medicines.len(), 1);
        assert_eq!(detail.medicines[0].end_date, "2024-01-20");
    }

    #[test]
    fn test_create_requires_medicine() {
        let mut db = setup_db();
        let result = db.create_patient(&PatientInput::new("Asha Rao"));
        assert!(matches!(result, Err(DbError::Constraint(_))));
        assert_eq!(db.counts().unwrap().patients, 0);
    }

    #[test]
    fn test_sequential_ids() {
        let mut db = setup_db();
        for (i, name) in ["A", "B", "C"].iter().enumerate() {
            let p = db.create_patient(&input(name)).unwrap();
            assert_eq!(p.patient_id, i as i64 + 1);
        }
        assert_eq!(db.next_patient_id().unwrap(), 4);
    }

    #[test]
    fn test_fills_lowest_gap() {
        let db = setup_db();
        for id in [1, 2, 4, 7] {
            db.conn()
                .execute("INSERT INTO patients (patient_id, name) VALUES (?1, 'X')", [id])
                .unwrap();
        }
        assert_eq!(db.next_patient_id().unwrap(), 3);

        let mut db = db;
        let created = db.create_patient(&input("Gap Filler")).unwrap();
        assert_eq!(created.patient_id, 3);
        assert_eq!(db.next_patient_id().unwrap(), 5);
    }

    #[test]
    fn test_update_replaces_medicines() {
        let mut db = setup_db();
        db.create_patient(&input("Asha Rao")).unwrap();
        let before = db.get_patient(1).unwrap().unwrap();

        let mut changed = PatientInput::new("Asha R. Rao")
            .with_medicine(MedicineInput::new("Aspirin", date(2024, 2, 1), 10, Frequency::Twice))
            .with_medicine(MedicineInput::new("Statin", date(2024, 2, 1), 30, Frequency::Once));
        changed.gender = Some("Female".into());
        assert!(db.update_patient(1, &changed).unwrap());

        let detail = db.get_patient_detail(1).unwrap().unwrap();
        assert_eq!(detail.patient.name, "Asha R. Rao");
        assert_eq!(detail.patient.age, None);
        assert_eq!(detail.patient.entry_date, before.entry_date);
        let names: Vec<_> = detail.medicines.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Aspirin", "Statin"]);
    }

    #[test]
    fn test_update_missing_patient() {
        let mut db = setup_db();
        assert!(!db.update_patient(9, &input("Nobody")).unwrap());
        assert_eq!(db.counts().unwrap().medicines, 0);
    }

    #[test]
    fn test_delete_resequences() {
        let mut db = setup_db();
        for name in ["One", "Two", "Three"] {
            db.create_patient(&input(name)).unwrap();
        }

        let report = db.delete_patient(2).unwrap().unwrap();
        assert_eq!(report.patient_count, 2);

        let patients = db.list_patients().unwrap();
        let ids: Vec<_> = patients.iter().map(|p| p.patient_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(patients[1].name, "Three");
        assert_eq!(db.list_medicines(2).unwrap().len(), 1);
        assert!(db.list_medicines(3).unwrap().is_empty());
    }

    #[test]
    fn test_delete_missing_patient() {
        let mut db = setup_db();
        assert!(db.delete_patient(5).unwrap().is_none());
    }

    #[test]
    fn test_rows_include_patients_without_medicines() {
        let mut db = setup_db();
        db.create_patient(&input("Asha Rao")).unwrap();
        db.conn()
            .execute("INSERT INTO patients (patient_id, name) VALUES (2, 'Bare Patient')", [])
            .unwrap();

        let rows = db.list_patient_rows(date(2024, 1, 5)).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].remaining, 16);
        assert_eq!(rows[0].highlight, Highlight::Normal);
        assert!(rows[1].medicine.is_none());
        assert_eq!(rows[1].remaining, 0);
    }

    #[test]
    fn test_search_case_insensitive_substring() {
        let mut db = setup_db();
        db.create_patient(&input("Asha Rao")).unwrap();
        db.create_patient(&input("Ravi Kumar")).unwrap();
        db.create_patient(&input("Meera Nair")).unwrap();

        let today = date(2024, 1, 5);
        let rows = db.search_patient_rows("RA", today).unwrap();
        let names: Vec<_> = rows.iter().map(|r| r.patient.name.as_str()).collect();
        assert_eq!(names, vec!["Asha Rao", "Ravi Kumar", "Meera Nair"]);

        let rows = db.search_patient_rows("kum", today).unwrap();
        assert_eq!(rows.len(), 1);

        assert!(db.search_patient_rows("100%", today).unwrap().is_empty());
        assert_eq!(db.search_patient_rows("  ", today).unwrap().len(), 3);
    }

    #[test]
    fn test_search_matches_accented_names_in_any_case() {
        let mut db = setup_db();
        db.create_patient(&input("Émile Zola")).unwrap();
        db.create_patient(&input("Asha Rao")).unwrap();

        let today = date(2024, 1, 5);
        for term in ["émile", "ÉMILE", "Émile", "zola"] {
            let rows = db.search_patient_rows(term, today).unwrap();
            assert_eq!(rows.len(), 1, "term {term:?}");
            assert_eq!(rows[0].patient.name, "Émile Zola");
        }
    }
}
