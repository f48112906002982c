//! Consultation form database operations.

use rusqlite::{params, OptionalExtension};

use super::{date_to_string, opt_date, opt_time, string_to_date, time_to_string, Database, DbError, DbResult};
use crate::models::{DentalForm, MedicalForm};

impl Database {
    /// Insert a medical form. Returns the new id.
    pub fn insert_medical_form(&self, form: &MedicalForm) -> DbResult<i64> {
        let result = self.conn.execute(
            r#"
            INSERT INTO medical_forms (
                patient_snapshot_id, appointment_id, academic_year_id, file_no, identity,
                vitals, general_survey, findings, diagnosis, recommendations,
                examiner, exam_date, created_by, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                form.patient_snapshot_id,
                form.appointment_id,
                form.academic_year_id,
                form.file_no,
                serde_json::to_string(&form.identity)?,
                serde_json::to_string(&form.vitals)?,
                form.general_survey,
                form.findings,
                form.diagnosis,
                form.recommendations,
                serde_json::to_string(&form.examiner)?,
                date_to_string(form.exam_date),
                form.created_by,
                form.created_at,
            ],
        );
        map_form_insert(self, result, "medical", form.appointment_id)
    }

    /// The medical form recorded for an appointment.
    pub fn get_medical_form_for_appointment(&self, appointment_id: i64) -> DbResult<Option<MedicalForm>> {
        self.conn
            .query_row(
                r#"
                SELECT id, patient_snapshot_id, appointment_id, academic_year_id, file_no,
                       identity, vitals, general_survey, findings, diagnosis,
                       recommendations, examiner, exam_date, created_by, created_at
                FROM medical_forms
                WHERE appointment_id = ?
                "#,
                [appointment_id],
                |row| {
                    Ok(MedicalFormRow {
                        id: row.get(0)?,
                        patient_snapshot_id: row.get(1)?,
                        appointment_id: row.get(2)?,
                        academic_year_id: row.get(3)?,
                        file_no: row.get(4)?,
                        identity: row.get(5)?,
                        vitals: row.get(6)?,
                        general_survey: row.get(7)?,
                        findings: row.get(8)?,
                        diagnosis: row.get(9)?,
                        recommendations: row.get(10)?,
                        examiner: row.get(11)?,
                        exam_date: row.get(12)?,
                        created_by: row.get(13)?,
                        created_at: row.get(14)?,
                    })
                },
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Insert a dental form. Returns the new id.
    pub fn insert_dental_form(&self, form: &DentalForm) -> DbResult<i64> {
        let result = self.conn.execute(
            r#"
            INSERT INTO dental_forms (
                patient_snapshot_id, appointment_id, academic_year_id, file_no, identity,
                findings, examiner, exam_date, next_appointment_date, next_appointment_time,
                follow_up_appointment_id, created_by, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                form.patient_snapshot_id,
                form.appointment_id,
                form.academic_year_id,
                form.file_no,
                serde_json::to_string(&form.identity)?,
                serde_json::to_string(&form.findings)?,
                serde_json::to_string(&form.examiner)?,
                date_to_string(form.exam_date),
                form.next_appointment_date.map(date_to_string),
                form.next_appointment_time.map(time_to_string),
                form.follow_up_appointment_id,
                form.created_by,
                form.created_at,
            ],
        );
        map_form_insert(self, result, "dental", form.appointment_id)
    }

    /// Link the follow-up booked from a dental form.
    pub fn set_dental_follow_up(&self, form_id: i64, appointment_id: i64) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE dental_forms SET follow_up_appointment_id = ?2 WHERE id = ?1",
            params![form_id, appointment_id],
        )?;
        Ok(rows_affected > 0)
    }

    /// The dental form recorded for an appointment.
    pub fn get_dental_form_for_appointment(&self, appointment_id: i64) -> DbResult<Option<DentalForm>> {
        self.conn
            .query_row(
                r#"
                SELECT id, patient_snapshot_id, appointment_id, academic_year_id, file_no,
                       identity, findings, examiner, exam_date, next_appointment_date,
                       next_appointment_time, follow_up_appointment_id, created_by, created_at
                FROM dental_forms
                WHERE appointment_id = ?
                "#,
                [appointment_id],
                |row| {
                    Ok(DentalFormRow {
                        id: row.get(0)?,
                        patient_snapshot_id: row.get(1)?,
                        appointment_id: row.get(2)?,
                        academic_year_id: row.get(3)?,
                        file_no: row.get(4)?,
                        identity: row.get(5)?,
                        findings: row.get(6)?,
                        examiner: row.get(7)?,
                        exam_date: row.get(8)?,
                        next_appointment_date: row.get(9)?,
                        next_appointment_time: row.get(10)?,
                        follow_up_appointment_id: row.get(11)?,
                        created_by: row.get(12)?,
                        created_at: row.get(13)?,
                    })
                },
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }
}

fn map_form_insert(
    db: &Database,
    result: rusqlite::Result<usize>,
    kind: &str,
    appointment_id: i64,
) -> DbResult<i64> {
    match result {
        Ok(_) => Ok(db.conn.last_insert_rowid()),
        Err(e) => {
            let err = DbError::from(e);
            if err.is_unique_violation() {
                Err(DbError::Duplicate(format!(
                    "{} form for appointment {}",
                    kind, appointment_id
                )))
            } else {
                Err(err)
            }
        }
    }
}

/// Intermediate row struct for database mapping.
struct MedicalFormRow {
    id: i64,
    patient_snapshot_id: i64,
    appointment_id: i64,
    academic_year_id: i64,
    file_no: String,
    identity: String,
    vitals: String,
    general_survey: Option<String>,
    findings: Option<String>,
    diagnosis: Option<String>,
    recommendations: Option<String>,
    examiner: String,
    exam_date: String,
    created_by: i64,
    created_at: String,
}

impl TryFrom<MedicalFormRow> for MedicalForm {
    type Error = DbError;

    fn try_from(row: MedicalFormRow) -> Result<Self, Self::Error> {
        Ok(MedicalForm {
            id: row.id,
            patient_snapshot_id: row.patient_snapshot_id,
            appointment_id: row.appointment_id,
            academic_year_id: row.academic_year_id,
            file_no: row.file_no,
            identity: serde_json::from_str(&row.identity)?,
            vitals: serde_json::from_str(&row.vitals)?,
            general_survey: row.general_survey,
            findings: row.findings,
            diagnosis: row.diagnosis,
            recommendations: row.recommendations,
            examiner: serde_json::from_str(&row.examiner)?,
            exam_date: string_to_date(&row.exam_date)?,
            created_by: row.created_by,
            created_at: row.created_at,
        })
    }
}

/// Intermediate row struct for database mapping.
struct DentalFormRow {
    id: i64,
    patient_snapshot_id: i64,
    appointment_id: i64,
    academic_year_id: i64,
    file_no: String,
    identity: String,
    findings: String,
    examiner: String,
    exam_date: String,
    next_appointment_date: Option<String>,
    next_appointment_time: Option<String>,
    follow_up_appointment_id: Option<i64>,
    created_by: i64,
    created_at: String,
}

impl TryFrom<DentalFormRow> for DentalForm {
    type Error = DbError;

    fn try_from(row: DentalFormRow) -> Result<Self, Self::Error> {
        Ok(DentalForm {
            id: row.id,
            patient_snapshot_id: row.patient_snapshot_id,
            appointment_id: row.appointment_id,
            academic_year_id: row.academic_year_id,
            file_no: row.file_no,
            identity: serde_json::from_str(&row.identity)?,
            findings: serde_json::from_str(&row.findings)?,
            examiner: serde_json::from_str(&row.examiner)?,
            exam_date: string_to_date(&row.exam_date)?,
            next_appointment_date: opt_date(row.next_appointment_date)?,
            next_appointment_time: opt_time(row.next_appointment_time)?,
            follow_up_appointment_id: row.follow_up_appointment_id,
            created_by: row.created_by,
            created_at: row.created_at,
        })
    }
}
