//! Academic year database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{date_to_string, string_to_date, Database, DbError, DbResult};
use crate::models::{AcademicYear, AcademicYearInput, DateRange};

const YEAR_COLUMNS: &str = r#"
    id, label, start_date, end_date, first_sem_start, first_sem_end,
    second_sem_start, second_sem_end, summer_start, summer_end,
    is_current, created_at, updated_at
"#;

impl Database {
    /// Insert a new academic year (not current). Returns the new id.
    pub fn insert_year(&self, input: &AcademicYearInput, now: &str) -> DbResult<i64> {
        let result = self.conn.execute(
            r#"
            INSERT INTO academic_years (
                label, start_date, end_date, first_sem_start, first_sem_end,
                second_sem_start, second_sem_end, summer_start, summer_end,
                is_current, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10, ?10)
            "#,
            params![
                input.label,
                date_to_string(input.start),
                date_to_string(input.end),
                date_to_string(input.first_semester.start),
                date_to_string(input.first_semester.end),
                date_to_string(input.second_semester.start),
                date_to_string(input.second_semester.end),
                date_to_string(input.summer.start),
                date_to_string(input.summer.end),
                now,
            ],
        );
        match result {
            Ok(_) => Ok(self.conn.last_insert_rowid()),
            Err(e) => {
                let err = DbError::from(e);
                if err.is_unique_violation() {
                    Err(DbError::Duplicate(format!("academic year {}", input.label)))
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Replace the label and ranges of an existing year.
    pub fn update_year(&self, id: i64, input: &AcademicYearInput, now: &str) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute(
                r#"
                UPDATE academic_years SET
                    label = ?2,
                    start_date = ?3,
                    end_date = ?4,
                    first_sem_start = ?5,
                    first_sem_end = ?6,
                    second_sem_start = ?7,
                    second_sem_end = ?8,
                    summer_start = ?9,
                    summer_end = ?10,
                    updated_at = ?11
                WHERE id = ?1
                "#,
                params![
                    id,
                    input.label,
                    date_to_string(input.start),
                    date_to_string(input.end),
                    date_to_string(input.first_semester.start),
                    date_to_string(input.first_semester.end),
                    date_to_string(input.second_semester.start),
                    date_to_string(input.second_semester.end),
                    date_to_string(input.summer.start),
                    date_to_string(input.summer.end),
                    now,
                ],
            )
            .map_err(|e| {
                let err = DbError::from(e);
                if err.is_unique_violation() {
                    DbError::Duplicate(format!("academic year {}", input.label))
                } else {
                    err
                }
            })?;
        Ok(rows_affected > 0)
    }

    /// Get a year by ID.
    pub fn get_year(&self, id: i64) -> DbResult<Option<AcademicYear>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM academic_years WHERE id = ?", YEAR_COLUMNS),
                [id],
                read_year_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// The year flagged current, if any.
    pub fn get_current_year(&self) -> DbResult<Option<AcademicYear>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM academic_years WHERE is_current = 1", YEAR_COLUMNS),
                [],
                read_year_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// All years, newest first.
    pub fn list_years(&self) -> DbResult<Vec<AcademicYear>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM academic_years ORDER BY start_date DESC",
            YEAR_COLUMNS
        ))?;
        let rows = stmt.query_map([], read_year_row)?;

        let mut years = Vec::new();
        for row in rows {
            years.push(row?.try_into()?);
        }
        Ok(years)
    }

    /// Clear every current flag, then set it on `id`.
    ///
    /// Must run inside a transaction so readers never see two current years.
    pub fn set_current_year(&self, id: i64, now: &str) -> DbResult<bool> {
        self.conn.execute(
            "UPDATE academic_years SET is_current = 0, updated_at = ?1 WHERE is_current = 1",
            [now],
        )?;
        let rows_affected = self.conn.execute(
            "UPDATE academic_years SET is_current = 1, updated_at = ?2 WHERE id = ?1",
            params![id, now],
        )?;
        Ok(rows_affected > 0)
    }
}

/// Intermediate row struct for database mapping.
struct AcademicYearRow {
    id: i64,
    label: String,
    start_date: String,
    end_date: String,
    first_sem_start: String,
    first_sem_end: String,
    second_sem_start: String,
    second_sem_end: String,
    summer_start: String,
    summer_end: String,
    is_current: bool,
    created_at: String,
    updated_at: String,
}

fn read_year_row(row: &Row<'_>) -> rusqlite::Result<AcademicYearRow> {
    Ok(AcademicYearRow {
        id: row.get(0)?,
        label: row.get(1)?,
        start_date: row.get(2)?,
        end_date: row.get(3)?,
        first_sem_start: row.get(4)?,
        first_sem_end: row.get(5)?,
        second_sem_start: row.get(6)?,
        second_sem_end: row.get(7)?,
        summer_start: row.get(8)?,
        summer_end: row.get(9)?,
        is_current: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

impl TryFrom<AcademicYearRow> for AcademicYear {
    type Error = DbError;

    fn try_from(row: AcademicYearRow) -> Result<Self, Self::Error> {
        Ok(AcademicYear {
            id: row.id,
            label: row.label,
            start: string_to_date(&row.start_date)?,
            end: string_to_date(&row.end_date)?,
            first_semester: DateRange::new(
                string_to_date(&row.first_sem_start)?,
                string_to_date(&row.first_sem_end)?,
            ),
            second_semester: DateRange::new(
                string_to_date(&row.second_sem_start)?,
                string_to_date(&row.second_sem_end)?,
            ),
            summer: DateRange::new(
                string_to_date(&row.summer_start)?,
                string_to_date(&row.summer_end)?,
            ),
            is_current: row.is_current,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
