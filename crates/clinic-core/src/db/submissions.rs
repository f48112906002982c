//! Document submission database operations.

use std::collections::BTreeMap;

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::models::{Campus, DocumentSubmission, FileRef, FileSlot, StaffSnapshot, SubmissionStatus};

const SUBMISSION_COLUMNS: &str = r#"
    ds.id, ds.user_id, ds.patient_snapshot_id, ds.academic_year_id, ds.files, ds.status,
    ds.submitted_at, ds.reviewed_by, ds.reviewed_at, ds.rejection_reason,
    ds.consultation_reason, ds.advised_by, ds.advised_at, ds.certificate,
    ds.issued_at, ds.issued_by, ds.issuer, ds.certificate_emailed_at,
    ds.certificate_emailed_by, ds.created_at, ds.updated_at
"#;

impl Database {
    /// Insert a new submission. Returns the new id.
    pub fn insert_submission(&self, submission: &DocumentSubmission) -> DbResult<i64> {
        let result = self.conn.execute(
            r#"
            INSERT INTO document_submissions (
                user_id, patient_snapshot_id, academic_year_id, files, status,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                submission.user_id,
                submission.patient_snapshot_id,
                submission.academic_year_id,
                serde_json::to_string(&submission.files)?,
                submission.status.as_str(),
                submission.created_at,
                submission.updated_at,
            ],
        );
        match result {
            Ok(_) => Ok(self.conn.last_insert_rowid()),
            Err(e) => {
                let err = DbError::from(e);
                if err.is_unique_violation() {
                    Err(DbError::Duplicate(format!(
                        "submission for user {} in year {}",
                        submission.user_id, submission.academic_year_id
                    )))
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Write back every mutable column of a submission.
    pub fn update_submission(&self, submission: &DocumentSubmission) -> DbResult<bool> {
        let issuer = submission
            .issuer
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let rows_affected = self.conn.execute(
            r#"
            UPDATE document_submissions SET
                files = ?2,
                status = ?3,
                submitted_at = ?4,
                reviewed_by = ?5,
                reviewed_at = ?6,
                rejection_reason = ?7,
                consultation_reason = ?8,
                advised_by = ?9,
                advised_at = ?10,
                certificate = ?11,
                issued_at = ?12,
                issued_by = ?13,
                issuer = ?14,
                certificate_emailed_at = ?15,
                certificate_emailed_by = ?16,
                updated_at = ?17
            WHERE id = ?1
            "#,
            params![
                submission.id,
                serde_json::to_string(&submission.files)?,
                submission.status.as_str(),
                submission.submitted_at,
                submission.reviewed_by,
                submission.reviewed_at,
                submission.rejection_reason,
                submission.consultation_reason,
                submission.advised_by,
                submission.advised_at,
                submission.certificate,
                submission.issued_at,
                submission.issued_by,
                issuer,
                submission.certificate_emailed_at,
                submission.certificate_emailed_by,
                submission.updated_at,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a submission by ID.
    pub fn get_submission(&self, id: i64) -> DbResult<Option<DocumentSubmission>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM document_submissions ds WHERE ds.id = ?", SUBMISSION_COLUMNS),
                [id],
                read_submission_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// The submission for one `(user, year)`, if it exists.
    pub fn find_submission(
        &self,
        user_id: i64,
        academic_year_id: i64,
    ) -> DbResult<Option<DocumentSubmission>> {
        self.conn
            .query_row(
                &format!(
                    r#"SELECT {} FROM document_submissions ds
                       WHERE ds.user_id = ?1 AND ds.academic_year_id = ?2"#,
                    SUBMISSION_COLUMNS
                ),
                params![user_id, academic_year_id],
                read_submission_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Latest issued submission of a user, preferring `prefer_year`.
    pub fn find_issued_submission(
        &self,
        user_id: i64,
        prefer_year: i64,
    ) -> DbResult<Option<DocumentSubmission>> {
        self.conn
            .query_row(
                &format!(
                    r#"SELECT {} FROM document_submissions ds
                       WHERE ds.user_id = ?1 AND ds.status = 'issued'
                       ORDER BY (ds.academic_year_id = ?2) DESC, ds.issued_at DESC, ds.id DESC
                       LIMIT 1"#,
                    SUBMISSION_COLUMNS
                ),
                params![user_id, prefer_year],
                read_submission_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Submissions by status, oldest first.
    ///
    /// `campuses` limits results to patients whose profile campus is in the
    /// list; `None` means every campus.
    pub fn list_submissions(
        &self,
        status: Option<SubmissionStatus>,
        campuses: Option<&[Campus]>,
    ) -> DbResult<Vec<DocumentSubmission>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"SELECT {}, json_extract(ps.demographics, '$.campus') AS campus
               FROM document_submissions ds
               JOIN patient_snapshots ps ON ps.id = ds.patient_snapshot_id
               WHERE (?1 IS NULL OR ds.status = ?1)
               ORDER BY ds.updated_at ASC, ds.id ASC"#,
            SUBMISSION_COLUMNS
        ))?;

        let rows = stmt.query_map([status.map(|s| s.as_str())], |row| {
            Ok((read_submission_row(row)?, row.get::<_, Option<String>>(21)?))
        })?;

        let mut submissions = Vec::new();
        for row in rows {
            let (row, campus) = row?;
            // Profiles without a campus are visible to every scope
            if let (Some(allowed), Some(campus)) = (campuses, campus.as_deref().and_then(Campus::parse)) {
                if !allowed.contains(&campus) {
                    continue;
                }
            }
            submissions.push(row.try_into()?);
        }
        Ok(submissions)
    }
}

/// Intermediate row struct for database mapping.
struct SubmissionRow {
    id: i64,
    user_id: i64,
    patient_snapshot_id: i64,
    academic_year_id: i64,
    files: String,
    status: String,
    submitted_at: Option<String>,
    reviewed_by: Option<i64>,
    reviewed_at: Option<String>,
    rejection_reason: Option<String>,
    consultation_reason: Option<String>,
    advised_by: Option<i64>,
    advised_at: Option<String>,
    certificate: Option<Vec<u8>>,
    issued_at: Option<String>,
    issued_by: Option<i64>,
    issuer: Option<String>,
    certificate_emailed_at: Option<String>,
    certificate_emailed_by: Option<i64>,
    created_at: String,
    updated_at: String,
}

fn read_submission_row(row: &Row<'_>) -> rusqlite::Result<SubmissionRow> {
    Ok(SubmissionRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        patient_snapshot_id: row.get(2)?,
        academic_year_id: row.get(3)?,
        files: row.get(4)?,
        status: row.get(5)?,
        submitted_at: row.get(6)?,
        reviewed_by: row.get(7)?,
        reviewed_at: row.get(8)?,
        rejection_reason: row.get(9)?,
        consultation_reason: row.get(10)?,
        advised_by: row.get(11)?,
        advised_at: row.get(12)?,
        certificate: row.get(13)?,
        issued_at: row.get(14)?,
        issued_by: row.get(15)?,
        issuer: row.get(16)?,
        certificate_emailed_at: row.get(17)?,
        certificate_emailed_by: row.get(18)?,
        created_at: row.get(19)?,
        updated_at: row.get(20)?,
    })
}

impl TryFrom<SubmissionRow> for DocumentSubmission {
    type Error = DbError;

    fn try_from(row: SubmissionRow) -> Result<Self, Self::Error> {
        let files: BTreeMap<FileSlot, FileRef> = serde_json::from_str(&row.files)?;
        let issuer: Option<StaffSnapshot> =
            row.issuer.as_deref().map(serde_json::from_str).transpose()?;
        let status = SubmissionStatus::parse(&row.status)
            .ok_or_else(|| DbError::Constraint(format!("Unknown submission status: {}", row.status)))?;

        Ok(DocumentSubmission {
            id: row.id,
            user_id: row.user_id,
            patient_snapshot_id: row.patient_snapshot_id,
            academic_year_id: row.academic_year_id,
            files,
            status,
            submitted_at: row.submitted_at,
            reviewed_by: row.reviewed_by,
            reviewed_at: row.reviewed_at,
            rejection_reason: row.rejection_reason,
            consultation_reason: row.consultation_reason,
            advised_by: row.advised_by,
            advised_at: row.advised_at,
            certificate: row.certificate,
            issued_at: row.issued_at,
            issued_by: row.issued_by,
            issuer,
            certificate_emailed_at: row.certificate_emailed_at,
            certificate_emailed_by: row.certificate_emailed_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
