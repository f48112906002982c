//! Cached accessor for the current academic year.

use std::sync::RwLock;

use tracing::debug;

use crate::db::Database;
use crate::error::{PortalError, PortalResult};
use crate::models::AcademicYear;

#[derive(Debug, Clone)]
struct Cached {
    data_version: i64,
    year: AcademicYear,
}

/// Copy of the current year for one connection.
///
/// Entries are tagged with the connection's `data_version`, so a commit
/// from any other connection on the same file forces a reload. Writes made
/// through this connection call [`CurrentYearCache::invalidate`].
#[derive(Debug, Default)]
pub struct CurrentYearCache {
    inner: RwLock<Option<Cached>>,
}

impl CurrentYearCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached year, reloading it from `db` on a miss or after an outside commit.
    pub fn get_or_load(&self, db: &Database) -> PortalResult<AcademicYear> {
        let data_version = db.data_version()?;
        if let Ok(guard) = self.inner.read() {
            if let Some(cached) = guard.as_ref().filter(|c| c.data_version == data_version) {
                return Ok(cached.year.clone());
            }
        }

        debug!(data_version, "current year cache miss");
        let year = db.get_current_year()?.ok_or(PortalError::NotConfigured)?;
        if let Ok(mut guard) = self.inner.write() {
            *guard = Some(Cached {
                data_version,
                year: year.clone(),
            });
        }
        Ok(year)
    }

    pub fn invalidate(&self) {
        if let Ok(mut guard) = self.inner.write() {
            *guard = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AcademicYearInput, DateRange};
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn input(label: &str, y: i32) -> AcademicYearInput {
        AcademicYearInput {
            label: label.into(),
            start: d(y, 8, 1),
            end: d(y + 1, 7, 31),
            first_semester: DateRange::new(d(y, 8, 1), d(y, 12, 20)),
            second_semester: DateRange::new(d(y + 1, 1, 6), d(y + 1, 5, 30)),
            summer: DateRange::new(d(y + 1, 6, 9), d(y + 1, 7, 31)),
        }
    }

    #[test]
    fn test_reloads_after_commit_from_other_connection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clinic.db");
        let first = Database::open(&path).unwrap();
        let second = Database::open(&path).unwrap();

        let old = first.insert_year(&input("2024-2025", 2024), "t0").unwrap();
        let new = first.insert_year(&input("2025-2026", 2025), "t0").unwrap();
        first.set_current_year(old, "t1").unwrap();

        let cache = CurrentYearCache::new();
        assert_eq!(cache.get_or_load(&second).unwrap().id, old);

        first.set_current_year(new, "t2").unwrap();
        assert_eq!(cache.get_or_load(&second).unwrap().id, new);
    }

    #[test]
    fn test_invalidate_forces_reload_on_same_connection() {
        let db = Database::open_in_memory().unwrap();
        let old = db.insert_year(&input("2024-2025", 2024), "t0").unwrap();
        let new = db.insert_year(&input("2025-2026", 2025), "t0").unwrap();
        db.set_current_year(old, "t1").unwrap();

        let cache = CurrentYearCache::new();
        assert_eq!(cache.get_or_load(&db).unwrap().id, old);

        db.set_current_year(new, "t2").unwrap();
        cache.invalidate();
        assert_eq!(cache.get_or_load(&db).unwrap().id, new);
    }

    #[test]
    fn test_not_configured_without_current_year() {
        let db = Database::open_in_memory().unwrap();
        let err = CurrentYearCache::new().get_or_load(&db).unwrap_err();
        assert_eq!(err.kind(), "not_configured");
    }
}
