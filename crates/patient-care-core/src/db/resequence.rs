//! Patient id resequencing.
//!
//! After a deletion the remaining patient ids are compacted to `1..=n`,
//! keeping their relative order, and every medicine row follows its patient.

use std::collections::BTreeSet;

use rusqlite::{Connection, Transaction};
use serde::{Deserialize, Serialize};

use super::{Database, DbError, DbResult};

/// One renumbered patient.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdChange {
    pub old_id: i64,
    pub new_id: i64,
}

/// Outcome of a resequencing pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResequenceReport {
    /// Only ids that actually moved
    pub changes: Vec<IdChange>,
    /// Patients in the store after the pass
    pub patient_count: usize,
}

/// Build the old → new id mapping and check that it is a bijection from the
/// existing id set onto `1..=n`.
///
/// Ids must be positive and distinct. Sorted ascending, the i-th id is then at
/// least `i + 1`, so every new id is `<=` its old id.
pub fn plan_resequence(ids: &[i64]) -> DbResult<Vec<IdChange>> {
    let unique: BTreeSet<i64> = ids.iter().copied().collect();
    if unique.len() != ids.len() {
        return Err(DbError::Resequence("duplicate patient ids".into()));
    }
    if let Some(bad) = unique.iter().find(|id| **id < 1) {
        return Err(DbError::Resequence(format!("non-positive patient id {bad}")));
    }

    let mapping: Vec<IdChange> = unique
        .iter()
        .enumerate()
        .map(|(index, old_id)| IdChange {
            old_id: *old_id,
            new_id: index as i64 + 1,
        })
        .collect();

    let targets: BTreeSet<i64> = mapping.iter().map(|c| c.new_id).collect();
    let expected: BTreeSet<i64> = (1..=ids.len() as i64).collect();
    if targets != expected || mapping.iter().any(|c| c.new_id > c.old_id) {
        return Err(DbError::Resequence("id mapping is not a bijection onto 1..=n".into()));
    }
    Ok(mapping)
}

/// Apply the compaction. Foreign keys must be off and a transaction open.
pub(crate) fn remap_patient_ids(conn: &Connection) -> DbResult<ResequenceReport> {
    let ids: Vec<i64> = {
        let mut stmt = conn.prepare("SELECT patient_id FROM patients ORDER BY patient_id")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>()?
    };
    let mapping = plan_resequence(&ids)?;

    // Ascending order with new_id <= old_id never lands on an id still in use.
    let mut move_patient = conn.prepare("UPDATE patients SET patient_id = ?1 WHERE patient_id = ?2")?;
    let mut move_medicines =
        conn.prepare("UPDATE medicines SET patient_id = ?1 WHERE patient_id = ?2")?;
    let mut changes = Vec::new();
    for change in mapping.iter().filter(|c| c.old_id != c.new_id) {
        move_patient.execute([change.new_id, change.old_id])?;
        move_medicines.execute([change.new_id, change.old_id])?;
        changes.push(*change);
    }

    Ok(ResequenceReport {
        changes,
        patient_count: mapping.len(),
    })
}

fn foreign_key_violations(conn: &Connection) -> DbResult<usize> {
    let mut stmt = conn.prepare("PRAGMA foreign_key_check")?;
    let mut rows = stmt.query([])?;
    let mut count = 0;
    while rows.next()?.is_some() {
        count += 1;
    }
    Ok(count)
}

impl Database {
    /// Compact patient ids to `1..=n` as a single all-or-nothing unit.
    pub fn resequence_patient_ids(&mut self) -> DbResult<ResequenceReport> {
        let report = self.with_foreign_keys_suspended(|tx| remap_patient_ids(tx))?;
        tracing::info!(
            renumbered = report.changes.len(),
            patients = report.patient_count,
            "Patient ids resequenced"
        );
        Ok(report)
    }

    /// Run `f` in a transaction with foreign-key enforcement switched off.
    ///
    /// The transaction only commits if `PRAGMA foreign_key_check` finds no
    /// dangling references afterwards. Enforcement is switched back on whatever
    /// the outcome. SQLite ignores the pragma inside a transaction, so it is set
    /// around it.
    pub(crate) fn with_foreign_keys_suspended<T>(
        &mut self,
        f: impl FnOnce(&Transaction<'_>) -> DbResult<T>,
    ) -> DbResult<T> {
        self.conn.pragma_update(None, "foreign_keys", false)?;
        let result = run_checked(&mut self.conn, f);
        let restored = self.conn.pragma_update(None, "foreign_keys", true);

        match (result, restored) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), restored) => {
                if let Err(pragma_err) = restored {
                    tracing::error!(error = %pragma_err, "Could not re-enable foreign keys");
                }
                Err(e)
            }
        }
    }
}

fn run_checked<T>(
    conn: &mut Connection,
    f: impl FnOnce(&Transaction<'_>) -> DbResult<T>,
) -> DbResult<T> {
    let tx = conn.transaction()?;
    let value = f(&tx)?;
    let violations = foreign_key_violations(&tx)?;
    if violations > 0 {
        tracing::warn!(violations, "Rolling back: dangling medicine references");
        return Err(DbError::Resequence(format!(
            "{violations} foreign key violation(s) after remap"
        )));
    }
    tx.commit()?;
    Ok(value)
}
