//! Patient snapshot database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::models::{CompletionStatus, PatientSnapshot, Semester, SnapshotOrigin};

const SNAPSHOT_COLUMNS: &str = r#"
    ps.id, ps.user_id, ps.academic_year_id, ps.semester, ps.demographics,
    ps.address, ps.emergency_contact, ps.health_history, ps.completion_status,
    ps.autofilled_from_year_id, ps.autofilled_from_semester, ps.created_at, ps.updated_at
"#;

impl Database {
    /// Insert a new snapshot. Returns the new id.
    pub fn insert_snapshot(&self, snapshot: &PatientSnapshot) -> DbResult<i64> {
        let result = self.conn.execute(
            r#"
            INSERT INTO patient_snapshots (
                user_id, academic_year_id, semester, demographics, address,
                emergency_contact, health_history, completion_status,
                autofilled_from_year_id, autofilled_from_semester, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                snapshot.user_id,
                snapshot.academic_year_id,
                snapshot.semester.as_str(),
                serde_json::to_string(&snapshot.demographics)?,
                serde_json::to_string(&snapshot.address)?,
                serde_json::to_string(&snapshot.emergency_contact)?,
                serde_json::to_string(&snapshot.health_history)?,
                snapshot.completion_status.as_str(),
                snapshot.autofilled_from.map(|o| o.academic_year_id),
                snapshot.autofilled_from.map(|o| o.semester.as_str()),
                snapshot.created_at,
                snapshot.updated_at,
            ],
        );
        map_snapshot_insert(self, result, snapshot.user_id)
    }

    /// Create a snapshot for `(user, year, semester)` by copying every
    /// profile block from `source_id` verbatim. Returns the new id.
    pub fn insert_autofilled_snapshot(
        &self,
        source_id: i64,
        academic_year_id: i64,
        semester: Semester,
        now: &str,
    ) -> DbResult<i64> {
        let result = self.conn.execute(
            r#"
            INSERT INTO patient_snapshots (
                user_id, academic_year_id, semester, demographics, address,
                emergency_contact, health_history, completion_status,
                autofilled_from_year_id, autofilled_from_semester, created_at, updated_at
            )
            SELECT user_id, ?2, ?3, demographics, address,
                   emergency_contact, health_history, 'incomplete',
                   academic_year_id, semester, ?4, ?4
            FROM patient_snapshots
            WHERE id = ?1
            "#,
            params![source_id, academic_year_id, semester.as_str(), now],
        );
        match result {
            Ok(0) => Err(DbError::NotFound(format!("patient snapshot {}", source_id))),
            other => map_snapshot_insert(self, other, source_id),
        }
    }

    /// Replace the profile blocks and completion status of a snapshot.
    pub fn update_snapshot(&self, snapshot: &PatientSnapshot) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE patient_snapshots SET
                demographics = ?2,
                address = ?3,
                emergency_contact = ?4,
                health_history = ?5,
                completion_status = ?6,
                updated_at = ?7
            WHERE id = ?1
            "#,
            params![
                snapshot.id,
                serde_json::to_string(&snapshot.demographics)?,
                serde_json::to_string(&snapshot.address)?,
                serde_json::to_string(&snapshot.emergency_contact)?,
                serde_json::to_string(&snapshot.health_history)?,
                snapshot.completion_status.as_str(),
                snapshot.updated_at,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a snapshot by ID.
    pub fn get_snapshot(&self, id: i64) -> DbResult<Option<PatientSnapshot>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM patient_snapshots ps WHERE ps.id = ?", SNAPSHOT_COLUMNS),
                [id],
                read_snapshot_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// The snapshot for one `(user, year, semester)`, if it exists.
    pub fn find_snapshot(
        &self,
        user_id: i64,
        academic_year_id: i64,
        semester: Semester,
    ) -> DbResult<Option<PatientSnapshot>> {
        self.conn
            .query_row(
                &format!(
                    r#"SELECT {} FROM patient_snapshots ps
                       WHERE ps.user_id = ?1 AND ps.academic_year_id = ?2 AND ps.semester = ?3"#,
                    SNAPSHOT_COLUMNS
                ),
                params![user_id, academic_year_id, semester.as_str()],
                read_snapshot_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Most recent snapshot of `user_id` by `(year end desc, created_at desc)`.
    pub fn latest_snapshot_for_user(&self, user_id: i64) -> DbResult<Option<PatientSnapshot>> {
        self.conn
            .query_row(
                &format!(
                    r#"SELECT {} FROM patient_snapshots ps
                       JOIN academic_years ay ON ay.id = ps.academic_year_id
                       WHERE ps.user_id = ?
                       ORDER BY ay.end_date DESC, ps.created_at DESC, ps.id DESC
                       LIMIT 1"#,
                    SNAPSHOT_COLUMNS
                ),
                [user_id],
                read_snapshot_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Every snapshot owned by `user_id`, newest first.
    pub fn list_snapshots_for_user(&self, user_id: i64) -> DbResult<Vec<PatientSnapshot>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"SELECT {} FROM patient_snapshots ps
               JOIN academic_years ay ON ay.id = ps.academic_year_id
               WHERE ps.user_id = ?
               ORDER BY ay.end_date DESC, ps.created_at DESC, ps.id DESC"#,
            SNAPSHOT_COLUMNS
        ))?;
        let rows = stmt.query_map([user_id], read_snapshot_row)?;

        let mut snapshots = Vec::new();
        for row in rows {
            snapshots.push(row?.try_into()?);
        }
        Ok(snapshots)
    }
}

fn map_snapshot_insert(
    db: &Database,
    result: rusqlite::Result<usize>,
    context: i64,
) -> DbResult<i64> {
    match result {
        Ok(_) => Ok(db.conn.last_insert_rowid()),
        Err(e) => {
            let err = DbError::from(e);
            if err.is_unique_violation() {
                Err(DbError::Duplicate(format!("patient snapshot for {}", context)))
            } else {
                Err(err)
            }
        }
    }
}

/// Intermediate row struct for database mapping.
struct SnapshotRow {
    id: i64,
    user_id: i64,
    academic_year_id: i64,
    semester: String,
    demographics: String,
    address: String,
    emergency_contact: String,
    health_history: String,
    completion_status: String,
    autofilled_from_year_id: Option<i64>,
    autofilled_from_semester: Option<String>,
    created_at: String,
    updated_at: String,
}

fn read_snapshot_row(row: &Row<'_>) -> rusqlite::Result<SnapshotRow> {
    Ok(SnapshotRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        academic_year_id: row.get(2)?,
        semester: row.get(3)?,
        demographics: row.get(4)?,
        address: row.get(5)?,
        emergency_contact: row.get(6)?,
        health_history: row.get(7)?,
        completion_status: row.get(8)?,
        autofilled_from_year_id: row.get(9)?,
        autofilled_from_semester: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

impl TryFrom<SnapshotRow> for PatientSnapshot {
    type Error = DbError;

    fn try_from(row: SnapshotRow) -> Result<Self, Self::Error> {
        let autofilled_from = match (row.autofilled_from_year_id, row.autofilled_from_semester) {
            (Some(academic_year_id), Some(semester)) => Some(SnapshotOrigin {
                academic_year_id,
                semester: string_to_semester(&semester)?,
            }),
            _ => None,
        };
        let completion_status = CompletionStatus::parse(&row.completion_status).ok_or_else(|| {
            DbError::Constraint(format!("Unknown completion status: {}", row.completion_status))
        })?;

        Ok(PatientSnapshot {
            id: row.id,
            user_id: row.user_id,
            academic_year_id: row.academic_year_id,
            semester: string_to_semester(&row.semester)?,
            demographics: serde_json::from_str(&row.demographics)?,
            address: serde_json::from_str(&row.address)?,
            emergency_contact: serde_json::from_str(&row.emergency_contact)?,
            health_history: serde_json::from_str(&row.health_history)?,
            completion_status,
            autofilled_from,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub(crate) fn string_to_semester(s: &str) -> Result<Semester, DbError> {
    Semester::parse(s).ok_or_else(|| DbError::Constraint(format!("Unknown semester: {}", s)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AcademicYearInput, Choice, DateRange};
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn seed_year(db: &Database, first_year: i32) -> i64 {
        let y = first_year;
        db.insert_year(
            &AcademicYearInput {
                label: format!("{}-{}", y, y + 1),
                start: d(y, 8, 1),
                end: d(y + 1, 7, 31),
                first_semester: DateRange::new(d(y, 8, 1), d(y, 12, 20)),
                second_semester: DateRange::new(d(y + 1, 1, 6), d(y + 1, 5, 30)),
                summer: DateRange::new(d(y + 1, 6, 9), d(y + 1, 7, 31)),
            },
            "now",
        )
        .unwrap()
    }

    #[test]
    fn test_insert_and_find() {
        let db = Database::open_in_memory().unwrap();
        let year = seed_year(&db, 2024);

        let mut snapshot = PatientSnapshot::blank(7, year, Semester::First);
        snapshot.demographics.surname = Some("Santos".into());
        let id = db.insert_snapshot(&snapshot).unwrap();

        let found = db.find_snapshot(7, year, Semester::First).unwrap().unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.demographics.surname.as_deref(), Some("Santos"));
        assert!(db.find_snapshot(7, year, Semester::Second).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_term_rejected() {
        let db = Database::open_in_memory().unwrap();
        let year = seed_year(&db, 2024);
        db.insert_snapshot(&PatientSnapshot::blank(7, year, Semester::First)).unwrap();
        let err = db
            .insert_snapshot(&PatientSnapshot::blank(7, year, Semester::First))
            .unwrap_err();
        assert!(matches!(err, DbError::Duplicate(_)));
    }

    #[test]
    fn test_autofill_copies_history_verbatim() {
        let db = Database::open_in_memory().unwrap();
        let year = seed_year(&db, 2024);

        let mut source = PatientSnapshot::blank(7, year, Semester::First);
        source.health_history.allergies = vec![Choice::plain("Peanuts"), Choice::other("Latex")];
        source.completion_status = CompletionStatus::Complete;
        let source_id = db.insert_snapshot(&source).unwrap();

        let new_id = db
            .insert_autofilled_snapshot(source_id, year, Semester::Second, "2025-01-07T08:00:00")
            .unwrap();

        let raw = |id: i64| -> String {
            db.conn()
                .query_row(
                    "SELECT health_history FROM patient_snapshots WHERE id = ?",
                    [id],
                    |row| row.get(0),
                )
                .unwrap()
        };
        assert_eq!(raw(source_id), raw(new_id));

        let copy = db.get_snapshot(new_id).unwrap().unwrap();
        assert_eq!(copy.completion_status, CompletionStatus::Incomplete);
        assert_eq!(
            copy.autofilled_from,
            Some(SnapshotOrigin {
                academic_year_id: year,
                semester: Semester::First
            })
        );
    }

    #[test]
    fn test_latest_orders_by_year_end() {
        let db = Database::open_in_memory().unwrap();
        let older = seed_year(&db, 2023);
        let newer = seed_year(&db, 2024);

        db.insert_snapshot(&PatientSnapshot::blank(7, newer, Semester::First)).unwrap();
        db.insert_snapshot(&PatientSnapshot::blank(7, older, Semester::Summer)).unwrap();

        let latest = db.latest_snapshot_for_user(7).unwrap().unwrap();
        assert_eq!(latest.academic_year_id, newer);

        let all = db.list_snapshots_for_user(7).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].academic_year_id, newer);
        assert!(db.latest_snapshot_for_user(8).unwrap().is_none());
    }
}
