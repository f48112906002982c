//! Appointment database operations.

use chrono::{NaiveDate, NaiveTime};
use rusqlite::{params, OptionalExtension, Row};

use super::{
    date_to_string, opt_date, opt_time, string_to_date, string_to_time, time_to_string, Database,
    DbError, DbResult,
};
use super::snapshots::string_to_semester;
use crate::models::{
    Appointment, AppointmentFilter, AppointmentKind, AppointmentStatus, Campus,
};

const APPOINTMENT_COLUMNS: &str = r#"
    id, user_id, patient_snapshot_id, academic_year_id, semester, campus, kind,
    appointment_date, appointment_time, purpose, status, doctor_id,
    original_date, original_time, rescheduled_by, rescheduled_at, reschedule_reason,
    cancelled_by, cancelled_at, notes, created_by, created_at, updated_at
"#;

const ACTIVE_STATUSES: &str = "('pending', 'confirmed', 'scheduled')";

impl Database {
    /// Take the per-(date, campus) lock row.
    ///
    /// Inside an immediate transaction this orders every booking for the
    /// same day behind one write.
    pub fn lock_day(&self, date: NaiveDate, campus: Campus) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO day_locks (lock_date, campus, version) VALUES (?1, ?2, 1)
            ON CONFLICT (lock_date, campus) DO UPDATE SET version = version + 1
            "#,
            params![date_to_string(date), campus.as_str()],
        )?;
        Ok(())
    }

    /// Active appointments on a day, optionally ignoring one row.
    pub fn count_active_on(
        &self,
        date: NaiveDate,
        campus: Campus,
        exclude_id: Option<i64>,
    ) -> DbResult<u32> {
        let count: u32 = self.conn.query_row(
            &format!(
                r#"SELECT COUNT(*) FROM appointments
                   WHERE appointment_date = ?1 AND campus = ?2
                     AND status IN {}
                     AND (?3 IS NULL OR id <> ?3)"#,
                ACTIVE_STATUSES
            ),
            params![date_to_string(date), campus.as_str(), exclude_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// True if an active appointment already holds the slot.
    pub fn is_slot_taken(
        &self,
        date: NaiveDate,
        time: NaiveTime,
        campus: Campus,
        exclude_id: Option<i64>,
    ) -> DbResult<bool> {
        let taken: bool = self.conn.query_row(
            &format!(
                r#"SELECT EXISTS (
                     SELECT 1 FROM appointments
                     WHERE appointment_date = ?1 AND appointment_time = ?2 AND campus = ?3
                       AND status IN {}
                       AND (?4 IS NULL OR id <> ?4))"#,
                ACTIVE_STATUSES
            ),
            params![date_to_string(date), time_to_string(time), campus.as_str(), exclude_id],
            |row| row.get(0),
        )?;
        Ok(taken)
    }

    /// Start times held by active appointments on a day.
    pub fn active_times_on(&self, date: NaiveDate, campus: Campus) -> DbResult<Vec<NaiveTime>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"SELECT appointment_time FROM appointments
               WHERE appointment_date = ?1 AND campus = ?2 AND status IN {}
               ORDER BY appointment_time"#,
            ACTIVE_STATUSES
        ))?;
        let rows = stmt.query_map(params![date_to_string(date), campus.as_str()], |row| {
            row.get::<_, String>(0)
        })?;

        let mut times = Vec::new();
        for row in rows {
            times.push(string_to_time(&row?)?);
        }
        Ok(times)
    }

    /// Insert a new appointment. Returns the new id.
    pub fn insert_appointment(&self, appointment: &Appointment) -> DbResult<i64> {
        let result = self.conn.execute(
            r#"
            INSERT INTO appointments (
                user_id, patient_snapshot_id, academic_year_id, semester, campus, kind,
                appointment_date, appointment_time, purpose, status, doctor_id,
                original_date, original_time, rescheduled_by, rescheduled_at, reschedule_reason,
                cancelled_by, cancelled_at, notes, created_by, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                      ?17, ?18, ?19, ?20, ?21, ?22)
            "#,
            params![
                appointment.user_id,
                appointment.patient_snapshot_id,
                appointment.academic_year_id,
                appointment.semester.as_str(),
                appointment.campus.as_str(),
                appointment.kind.as_str(),
                date_to_string(appointment.date),
                time_to_string(appointment.time),
                appointment.purpose,
                appointment.status.as_str(),
                appointment.doctor_id,
                appointment.original_date.map(date_to_string),
                appointment.original_time.map(time_to_string),
                appointment.rescheduled_by,
                appointment.rescheduled_at,
                appointment.reschedule_reason,
                appointment.cancelled_by,
                appointment.cancelled_at,
                appointment.notes,
                appointment.created_by,
                appointment.created_at,
                appointment.updated_at,
            ],
        );
        match result {
            Ok(_) => Ok(self.conn.last_insert_rowid()),
            Err(e) => Err(slot_conflict(e.into(), appointment)),
        }
    }

    /// Write back every mutable column of an appointment.
    pub fn update_appointment(&self, appointment: &Appointment) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute(
                r#"
                UPDATE appointments SET
                    appointment_date = ?2,
                    appointment_time = ?3,
                    purpose = ?4,
                    status = ?5,
                    doctor_id = ?6,
                    original_date = ?7,
                    original_time = ?8,
                    rescheduled_by = ?9,
                    rescheduled_at = ?10,
                    reschedule_reason = ?11,
                    cancelled_by = ?12,
                    cancelled_at = ?13,
                    notes = ?14,
                    updated_at = ?15
                WHERE id = ?1
                "#,
                params![
                    appointment.id,
                    date_to_string(appointment.date),
                    time_to_string(appointment.time),
                    appointment.purpose,
                    appointment.status.as_str(),
                    appointment.doctor_id,
                    appointment.original_date.map(date_to_string),
                    appointment.original_time.map(time_to_string),
                    appointment.rescheduled_by,
                    appointment.rescheduled_at,
                    appointment.reschedule_reason,
                    appointment.cancelled_by,
                    appointment.cancelled_at,
                    appointment.notes,
                    appointment.updated_at,
                ],
            )
            .map_err(|e| slot_conflict(e.into(), appointment))?;
        Ok(rows_affected > 0)
    }

    /// Get an appointment by ID.
    pub fn get_appointment(&self, id: i64) -> DbResult<Option<Appointment>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM appointments WHERE id = ?", APPOINTMENT_COLUMNS),
                [id],
                read_appointment_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Every appointment on a day at a campus, by time.
    pub fn list_appointments_on(&self, date: NaiveDate, campus: Campus) -> DbResult<Vec<Appointment>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"SELECT {} FROM appointments
               WHERE appointment_date = ?1 AND campus = ?2
               ORDER BY appointment_time, id"#,
            APPOINTMENT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![date_to_string(date), campus.as_str()], read_appointment_row)?;
        collect_appointments(rows)
    }

    /// Appointments at a campus between two dates inclusive.
    pub fn list_appointments_between(
        &self,
        campus: Campus,
        from: NaiveDate,
        to: NaiveDate,
    ) -> DbResult<Vec<Appointment>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"SELECT {} FROM appointments
               WHERE campus = ?1 AND appointment_date BETWEEN ?2 AND ?3
               ORDER BY appointment_date, appointment_time, id"#,
            APPOINTMENT_COLUMNS
        ))?;
        let rows = stmt.query_map(
            params![campus.as_str(), date_to_string(from), date_to_string(to)],
            read_appointment_row,
        )?;
        collect_appointments(rows)
    }

    /// Filtered listing, optionally restricted to one owner.
    pub fn list_appointments(
        &self,
        filter: &AppointmentFilter,
        owner_id: Option<i64>,
    ) -> DbResult<Vec<Appointment>> {
        let mut stmt = self.conn.prepare(&format!(
            r#"SELECT {} FROM appointments
               WHERE (?1 IS NULL OR appointment_date = ?1)
                 AND (?2 IS NULL OR status = ?2)
                 AND (?3 IS NULL OR kind = ?3)
                 AND (?4 IS NULL OR campus = ?4)
                 AND (?5 IS NULL OR academic_year_id = ?5)
                 AND (?6 IS NULL OR user_id = ?6)
               ORDER BY appointment_date DESC, appointment_time DESC, id DESC"#,
            APPOINTMENT_COLUMNS
        ))?;
        let rows = stmt.query_map(
            params![
                filter.date.map(date_to_string),
                filter.status.map(|s| s.as_str()),
                filter.kind.map(|k| k.as_str()),
                filter.campus.map(|c| c.as_str()),
                filter.academic_year_id,
                owner_id,
            ],
            read_appointment_row,
        )?;
        collect_appointments(rows)
    }
}

fn slot_conflict(err: DbError, appointment: &Appointment) -> DbError {
    if err.is_unique_violation() {
        DbError::Duplicate(format!(
            "slot {} {} at campus {}",
            date_to_string(appointment.date),
            time_to_string(appointment.time),
            appointment.campus.as_str()
        ))
    } else {
        err
    }
}

fn collect_appointments(
    rows: impl Iterator<Item = rusqlite::Result<AppointmentRow>>,
) -> DbResult<Vec<Appointment>> {
    let mut appointments = Vec::new();
    for row in rows {
        appointments.push(row?.try_into()?);
    }
    Ok(appointments)
}

/// Intermediate row struct for database mapping.
struct AppointmentRow {
    id: i64,
    user_id: i64,
    patient_snapshot_id: i64,
    academic_year_id: i64,
    semester: String,
    campus: String,
    kind: String,
    appointment_date: String,
    appointment_time: String,
    purpose: String,
    status: String,
    doctor_id: Option<i64>,
    original_date: Option<String>,
    original_time: Option<String>,
    rescheduled_by: Option<i64>,
    rescheduled_at: Option<String>,
    reschedule_reason: Option<String>,
    cancelled_by: Option<i64>,
    cancelled_at: Option<String>,
    notes: String,
    created_by: i64,
    created_at: String,
    updated_at: String,
}

fn read_appointment_row(row: &Row<'_>) -> rusqlite::Result<AppointmentRow> {
    Ok(AppointmentRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        patient_snapshot_id: row.get(2)?,
        academic_year_id: row.get(3)?,
        semester: row.get(4)?,
        campus: row.get(5)?,
        kind: row.get(6)?,
        appointment_date: row.get(7)?,
        appointment_time: row.get(8)?,
        purpose: row.get(9)?,
        status: row.get(10)?,
        doctor_id: row.get(11)?,
        original_date: row.get(12)?,
        original_time: row.get(13)?,
        rescheduled_by: row.get(14)?,
        rescheduled_at: row.get(15)?,
        reschedule_reason: row.get(16)?,
        cancelled_by: row.get(17)?,
        cancelled_at: row.get(18)?,
        notes: row.get(19)?,
        created_by: row.get(20)?,
        created_at: row.get(21)?,
        updated_at: row.get(22)?,
    })
}

impl TryFrom<AppointmentRow> for Appointment {
    type Error = DbError;

    fn try_from(row: AppointmentRow) -> Result<Self, Self::Error> {
        let campus = Campus::parse(&row.campus)
            .ok_or_else(|| DbError::Constraint(format!("Unknown campus: {}", row.campus)))?;
        let kind = AppointmentKind::parse(&row.kind)
            .ok_or_else(|| DbError::Constraint(format!("Unknown appointment kind: {}", row.kind)))?;
        let status = AppointmentStatus::parse(&row.status)
            .ok_or_else(|| DbError::Constraint(format!("Unknown appointment status: {}", row.status)))?;

        Ok(Appointment {
            id: row.id,
            user_id: row.user_id,
            patient_snapshot_id: row.patient_snapshot_id,
            academic_year_id: row.academic_year_id,
            semester: string_to_semester(&row.semester)?,
            campus,
            kind,
            date: string_to_date(&row.appointment_date)?,
            time: string_to_time(&row.appointment_time)?,
            purpose: row.purpose,
            status,
            doctor_id: row.doctor_id,
            original_date: opt_date(row.original_date)?,
            original_time: opt_time(row.original_time)?,
            rescheduled_by: row.rescheduled_by,
            rescheduled_at: row.rescheduled_at,
            reschedule_reason: row.reschedule_reason,
            cancelled_by: row.cancelled_by,
            cancelled_at: row.cancelled_at,
            notes: row.notes,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
