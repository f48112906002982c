//! Staff profile database operations.

use rusqlite::{params, OptionalExtension};

use super::{Database, DbResult};
use crate::models::{CampusSet, StaffProfile};

impl Database {
    /// Insert or replace a staff profile.
    pub fn upsert_staff_profile(&self, profile: &StaffProfile) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO staff_profiles (
                user_id, full_name, position, license_no, ptr_no, phone, campuses, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT (user_id) DO UPDATE SET
                full_name = excluded.full_name,
                position = excluded.position,
                license_no = excluded.license_no,
                ptr_no = excluded.ptr_no,
                phone = excluded.phone,
                campuses = excluded.campuses,
                updated_at = excluded.updated_at
            "#,
            params![
                profile.user_id,
                profile.full_name,
                profile.position,
                profile.license_no,
                profile.ptr_no,
                profile.phone,
                profile.campuses.to_csv(),
                profile.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Get a staff profile by user ID.
    pub fn get_staff_profile(&self, user_id: i64) -> DbResult<Option<StaffProfile>> {
        Ok(self
            .conn
            .query_row(
                r#"
                SELECT user_id, full_name, position, license_no, ptr_no, phone, campuses, updated_at
                FROM staff_profiles
                WHERE user_id = ?
                "#,
                [user_id],
                |row| {
                    let campuses: String = row.get(6)?;
                    Ok(StaffProfile {
                        user_id: row.get(0)?,
                        full_name: row.get(1)?,
                        position: row.get(2)?,
                        license_no: row.get(3)?,
                        ptr_no: row.get(4)?,
                        phone: row.get(5)?,
                        campuses: CampusSet::parse(&campuses),
                        updated_at: row.get(7)?,
                    })
                },
            )
            .optional()?)
    }
}
