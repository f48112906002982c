//! SQLite schema definition.

/// Complete database schema for the clinic core.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Academic Calendar
-- ============================================================================

CREATE TABLE IF NOT EXISTS academic_years (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    label TEXT NOT NULL UNIQUE,
    start_date TEXT NOT NULL,                     -- YYYY-MM-DD
    end_date TEXT NOT NULL,
    first_sem_start TEXT NOT NULL,
    first_sem_end TEXT NOT NULL,
    second_sem_start TEXT NOT NULL,
    second_sem_end TEXT NOT NULL,
    summer_start TEXT NOT NULL,
    summer_end TEXT NOT NULL,
    is_current INTEGER NOT NULL DEFAULT 0 CHECK (is_current IN (0, 1)),
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- At most one current year
CREATE UNIQUE INDEX IF NOT EXISTS idx_academic_years_current
    ON academic_years(is_current) WHERE is_current = 1;

-- ============================================================================
-- Staff Profiles
-- ============================================================================

CREATE TABLE IF NOT EXISTS staff_profiles (
    user_id INTEGER PRIMARY KEY,
    full_name TEXT NOT NULL,
    position TEXT NOT NULL,
    license_no TEXT,
    ptr_no TEXT,
    phone TEXT,
    campuses TEXT NOT NULL DEFAULT '',            -- comma-separated, first is primary
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- ============================================================================
-- Patient Snapshots (one per user per term)
-- ============================================================================

CREATE TABLE IF NOT EXISTS patient_snapshots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    academic_year_id INTEGER NOT NULL REFERENCES academic_years(id),
    semester TEXT NOT NULL CHECK (semester IN ('first', 'second', 'summer')),
    demographics TEXT NOT NULL DEFAULT '{}',      -- JSON
    address TEXT NOT NULL DEFAULT '{}',           -- JSON
    emergency_contact TEXT NOT NULL DEFAULT '{}', -- JSON
    health_history TEXT NOT NULL DEFAULT '{}',    -- JSON, copied verbatim on autofill
    completion_status TEXT NOT NULL DEFAULT 'incomplete',
    autofilled_from_year_id INTEGER REFERENCES academic_years(id),
    autofilled_from_semester TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (user_id, academic_year_id, semester)
);

CREATE INDEX IF NOT EXISTS idx_snapshots_user ON patient_snapshots(user_id);

-- ============================================================================
-- Stored Files (upload content, owned by the persistence layer)
-- ============================================================================

CREATE TABLE IF NOT EXISTS stored_files (
    storage_key TEXT PRIMARY KEY,
    file_name TEXT NOT NULL,
    sha256 TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    content BLOB NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- ============================================================================
-- Document Submissions
-- ============================================================================

CREATE TABLE IF NOT EXISTS document_submissions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    patient_snapshot_id INTEGER NOT NULL REFERENCES patient_snapshots(id),
    academic_year_id INTEGER NOT NULL REFERENCES academic_years(id),
    files TEXT NOT NULL DEFAULT '{}',             -- JSON map slot -> FileRef
    status TEXT NOT NULL DEFAULT 'pending',
    submitted_at TEXT,
    reviewed_by INTEGER,
    reviewed_at TEXT,
    rejection_reason TEXT,
    consultation_reason TEXT,
    advised_by INTEGER,
    advised_at TEXT,
    certificate BLOB,
    issued_at TEXT,
    issued_by INTEGER,
    issuer TEXT,                                  -- JSON StaffSnapshot
    certificate_emailed_at TEXT,
    certificate_emailed_by INTEGER,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (user_id, academic_year_id),
    CHECK (status <> 'rejected' OR COALESCE(length(trim(rejection_reason)), 0) > 0),
    CHECK (status <> 'issued' OR COALESCE(length(certificate), 0) > 0)
);

CREATE INDEX IF NOT EXISTS idx_submissions_status ON document_submissions(status);

-- ============================================================================
-- Appointments
-- ============================================================================

CREATE TABLE IF NOT EXISTS appointments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    patient_snapshot_id INTEGER NOT NULL REFERENCES patient_snapshots(id),
    academic_year_id INTEGER NOT NULL REFERENCES academic_years(id),
    semester TEXT NOT NULL,
    campus TEXT NOT NULL CHECK (campus IN ('a', 'b', 'c')),
    kind TEXT NOT NULL CHECK (kind IN ('medical', 'dental')),
    appointment_date TEXT NOT NULL,               -- YYYY-MM-DD
    appointment_time TEXT NOT NULL,               -- HH:MM
    purpose TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL,
    doctor_id INTEGER,
    original_date TEXT,
    original_time TEXT,
    rescheduled_by INTEGER,
    rescheduled_at TEXT,
    reschedule_reason TEXT,
    cancelled_by INTEGER,
    cancelled_at TEXT,
    notes TEXT NOT NULL DEFAULT '',
    created_by INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- One active booking per slot
CREATE UNIQUE INDEX IF NOT EXISTS idx_appointments_active_slot
    ON appointments(appointment_date, appointment_time, campus)
    WHERE status IN ('pending', 'confirmed', 'scheduled');

CREATE INDEX IF NOT EXISTS idx_appointments_day ON appointments(appointment_date, campus);
CREATE INDEX IF NOT EXISTS idx_appointments_user ON appointments(user_id);

-- Per-(date, campus) lock row, bumped before every capacity check
CREATE TABLE IF NOT EXISTS day_locks (
    lock_date TEXT NOT NULL,
    campus TEXT NOT NULL,
    version INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (lock_date, campus)
);

-- ============================================================================
-- Consultation Forms
-- ============================================================================

CREATE TABLE IF NOT EXISTS medical_forms (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_snapshot_id INTEGER NOT NULL REFERENCES patient_snapshots(id),
    appointment_id INTEGER NOT NULL UNIQUE REFERENCES appointments(id),
    academic_year_id INTEGER NOT NULL REFERENCES academic_years(id),
    file_no TEXT NOT NULL,
    identity TEXT NOT NULL,                       -- JSON PatientIdentity
    vitals TEXT NOT NULL,                         -- JSON Vitals
    general_survey TEXT,
    findings TEXT,
    diagnosis TEXT,
    recommendations TEXT,
    examiner TEXT NOT NULL,                       -- JSON StaffSnapshot
    exam_date TEXT NOT NULL,
    created_by INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (patient_snapshot_id, appointment_id)
);

CREATE TABLE IF NOT EXISTS dental_forms (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_snapshot_id INTEGER NOT NULL REFERENCES patient_snapshots(id),
    appointment_id INTEGER NOT NULL UNIQUE REFERENCES appointments(id),
    academic_year_id INTEGER NOT NULL REFERENCES academic_years(id),
    file_no TEXT NOT NULL,
    identity TEXT NOT NULL,
    findings TEXT NOT NULL,                       -- JSON DentalFindings
    examiner TEXT NOT NULL,
    exam_date TEXT NOT NULL,
    next_appointment_date TEXT,
    next_appointment_time TEXT,
    follow_up_appointment_id INTEGER REFERENCES appointments(id),
    created_by INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (patient_snapshot_id, appointment_id)
);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn.execute(
            r#"INSERT INTO academic_years (label, start_date, end_date, first_sem_start, first_sem_end,
                 second_sem_start, second_sem_end, summer_start, summer_end)
               VALUES ('2024-2025', '2024-08-01', '2025-07-31', '2024-08-01', '2024-12-20',
                 '2025-01-06', '2025-05-30', '2025-06-09', '2025-07-31')"#,
            [],
        )
        .unwrap();
        conn.execute(
            r#"INSERT INTO patient_snapshots (user_id, academic_year_id, semester, created_at, updated_at)
               VALUES (7, 1, 'second', '2025-01-01', '2025-01-01')"#,
            [],
        )
        .unwrap();
        conn
    }

    fn insert_appointment(conn: &Connection, time: &str, status: &str) -> rusqlite::Result<usize> {
        conn.execute(
            r#"INSERT INTO appointments (user_id, patient_snapshot_id, academic_year_id, semester,
                 campus, kind, appointment_date, appointment_time, status, created_by, created_at, updated_at)
               VALUES (7, 1, 1, 'second', 'a', 'medical', '2025-03-10', ?1, ?2, 7, 'x', 'x')"#,
            [time, status],
        )
    }

    #[test]
    fn test_schema_valid() {
        let conn = Connection::open_in_memory().unwrap();
        let result = conn.execute_batch(SCHEMA);
        assert!(result.is_ok(), "Schema should be valid SQL: {:?}", result);

        // Applying twice is a no-op
        assert!(conn.execute_batch(SCHEMA).is_ok());
    }

    #[test]
    fn test_active_slot_unique() {
        let conn = setup();
        insert_appointment(&conn, "09:00", "pending").unwrap();
        assert!(insert_appointment(&conn, "09:00", "confirmed").is_err());

        // Cancelled rows do not hold the slot
        conn.execute("UPDATE appointments SET status = 'cancelled'", []).unwrap();
        assert!(insert_appointment(&conn, "09:00", "confirmed").is_ok());
        assert!(insert_appointment(&conn, "09:00", "cancelled").is_ok());
    }

    #[test]
    fn test_single_current_year() {
        let conn = setup();
        conn.execute("UPDATE academic_years SET is_current = 1 WHERE id = 1", [])
            .unwrap();
        let result = conn.execute(
            r#"INSERT INTO academic_years (label, start_date, end_date, first_sem_start, first_sem_end,
                 second_sem_start, second_sem_end, summer_start, summer_end, is_current)
               VALUES ('2025-2026', '2025-08-01', '2026-07-31', '2025-08-01', '2025-12-20',
                 '2026-01-06', '2026-05-30', '2026-06-09', '2026-07-31', 1)"#,
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_snapshot_unique_per_term() {
        let conn = setup();
        let result = conn.execute(
            r#"INSERT INTO patient_snapshots (user_id, academic_year_id, semester, created_at, updated_at)
               VALUES (7, 1, 'second', 'x', 'x')"#,
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_rejected_requires_reason() {
        let conn = setup();
        let result = conn.execute(
            r#"INSERT INTO document_submissions (user_id, patient_snapshot_id, academic_year_id, status, created_at, updated_at)
               VALUES (7, 1, 1, 'rejected', 'x', 'x')"#,
            [],
        );
        assert!(result.is_err());
    }
}
