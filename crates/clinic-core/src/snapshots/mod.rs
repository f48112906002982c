//! Patient snapshot store.
//!
//! One profile per `(user, year, semester)`. A new term's snapshot is
//! seeded from the user's most recent prior snapshot, and the seed's
//! origin is reported back so callers can label autofilled data.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::context::ServiceContext;
use crate::db::Database;
use crate::error::{PortalError, PortalResult, ValidationError};
use crate::identity;
use crate::models::{
    CompletionStatus, PatientSnapshot, Semester, SnapshotOrigin, SnapshotPatch, User,
};

/// Projected snapshot for a term, without persisting anything.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AutofillPreview {
    pub snapshot: PatientSnapshot,
    /// True when the term already has a stored snapshot
    pub exists: bool,
    pub autofilled_from_year: Option<i64>,
    pub autofilled_from_semester: Option<Semester>,
}

/// Patient snapshot service.
pub struct SnapshotStore<'a> {
    ctx: ServiceContext<'a>,
}

impl<'a> SnapshotStore<'a> {
    pub fn new(ctx: ServiceContext<'a>) -> Self {
        Self { ctx }
    }

    /// Existing snapshot for the term, or a new one autofilled from the
    /// most recent prior snapshot. `autofilled_from` names the source.
    pub fn get_or_create(
        &self,
        caller: &User,
        user_id: i64,
        academic_year_id: i64,
        semester: Semester,
    ) -> PortalResult<PatientSnapshot> {
        identity::require_owner_or_staff(caller, user_id, None)?;
        if let Some(existing) = self.ctx.db.find_snapshot(user_id, academic_year_id, semester)? {
            return Ok(existing);
        }

        let now = self.ctx.stamp();
        self.ctx.write("get_or_create_snapshot", |db| {
            ensure_snapshot(db, user_id, academic_year_id, semester, &now)
        })
    }

    /// Merge `patch` block by block, validate, and recompute derived fields.
    pub fn update(
        &self,
        caller: &User,
        snapshot_id: i64,
        patch: SnapshotPatch,
    ) -> PortalResult<PatientSnapshot> {
        identity::require_active(caller)?;
        let today = self.ctx.clock.today();
        let now = self.ctx.stamp();
        let home_city = self.ctx.config.home_city.as_str();

        let snapshot = self.ctx.write("update_snapshot", |db| {
            let mut snapshot = db
                .get_snapshot(snapshot_id)?
                .ok_or_else(|| PortalError::not_found("patient_snapshot", snapshot_id))?;
            identity::require_owner_or_staff(
                caller,
                snapshot.user_id,
                snapshot.demographics.campus,
            )?;

            patch.clone().apply_to(&mut snapshot);
            snapshot.health_history.validate()?;

            if let Some(dob) = snapshot.demographics.date_of_birth {
                if dob > today {
                    return Err(ValidationError::BadFormat {
                        field: "demographics.date_of_birth".into(),
                        reason: "cannot be in the future".into(),
                    }
                    .into());
                }
                snapshot.demographics.age = snapshot.demographics.age_on(today);
            }

            snapshot.recompute_addresses(home_city);
            snapshot.completion_status = if snapshot.required_fields_present() {
                CompletionStatus::Complete
            } else {
                CompletionStatus::Incomplete
            };
            snapshot.updated_at = now.clone();

            db.update_snapshot(&snapshot)?;
            Ok(snapshot)
        })?;

        info!(
            snapshot_id,
            user_id = snapshot.user_id,
            status = snapshot.completion_status.as_str(),
            "patient snapshot updated"
        );
        Ok(snapshot)
    }

    /// Every snapshot the caller owns, newest first.
    pub fn list_mine(&self, caller: &User) -> PortalResult<Vec<PatientSnapshot>> {
        identity::require_active(caller)?;
        debug!(user_id = caller.id, "listing snapshots");
        Ok(self.ctx.db.list_snapshots_for_user(caller.id)?)
    }

    pub fn get(&self, caller: &User, snapshot_id: i64) -> PortalResult<PatientSnapshot> {
        let snapshot = self
            .ctx
            .db
            .get_snapshot(snapshot_id)?
            .ok_or_else(|| PortalError::not_found("patient_snapshot", snapshot_id))?;
        identity::require_owner_or_staff(caller, snapshot.user_id, snapshot.demographics.campus)?;
        Ok(snapshot)
    }

    /// What `get_or_create` would return for the caller's term.
    pub fn autofill_preview(
        &self,
        caller: &User,
        academic_year_id: i64,
        semester: Semester,
    ) -> PortalResult<AutofillPreview> {
        identity::require_active(caller)?;
        let db = self.ctx.db;

        if let Some(existing) = db.find_snapshot(caller.id, academic_year_id, semester)? {
            return Ok(AutofillPreview {
                autofilled_from_year: existing.autofilled_from.map(|o| o.academic_year_id),
                autofilled_from_semester: existing.autofilled_from.map(|o| o.semester),
                snapshot: existing,
                exists: true,
            });
        }

        let mut projected = PatientSnapshot::blank(caller.id, academic_year_id, semester);
        if let Some(prior) = db.latest_snapshot_for_user(caller.id)? {
            projected.demographics = prior.demographics;
            projected.address = prior.address;
            projected.emergency_contact = prior.emergency_contact;
            projected.health_history = prior.health_history;
            projected.autofilled_from = Some(SnapshotOrigin {
                academic_year_id: prior.academic_year_id,
                semester: prior.semester,
            });
        }

        Ok(AutofillPreview {
            autofilled_from_year: projected.autofilled_from.map(|o| o.academic_year_id),
            autofilled_from_semester: projected.autofilled_from.map(|o| o.semester),
            snapshot: projected,
            exists: false,
        })
    }
}

/// Find or create the snapshot for a term. Call inside a transaction.
pub(crate) fn ensure_snapshot(
    db: &Database,
    user_id: i64,
    academic_year_id: i64,
    semester: Semester,
    now: &str,
) -> PortalResult<PatientSnapshot> {
    if let Some(existing) = db.find_snapshot(user_id, academic_year_id, semester)? {
        return Ok(existing);
    }
    if db.get_year(academic_year_id)?.is_none() {
        return Err(PortalError::not_found("academic_year", academic_year_id));
    }

    let id = match db.latest_snapshot_for_user(user_id)? {
        Some(prior) => {
            let id = db.insert_autofilled_snapshot(prior.id, academic_year_id, semester, now)?;
            info!(
                user_id,
                academic_year_id,
                semester = semester.as_str(),
                from_year = prior.academic_year_id,
                from_semester = prior.semester.as_str(),
                "snapshot autofilled"
            );
            id
        }
        None => {
            let mut blank = PatientSnapshot::blank(user_id, academic_year_id, semester);
            blank.created_at = now.to_string();
            blank.updated_at = now.to_string();
            let id = db.insert_snapshot(&blank)?;
            info!(user_id, academic_year_id, semester = semester.as_str(), "blank snapshot created");
            id
        }
    };

    db.get_snapshot(id)?
        .ok_or_else(|| PortalError::not_found("patient_snapshot", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::CurrentYearCache;
    use crate::config::{FixedClock, PortalConfig};
    use crate::models::{
        AcademicYearInput, Address, Choice, DateRange, Demographics, EmergencyContact, Gender,
        HealthHistory,
    };
    use chrono::{NaiveDate, NaiveTime};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    struct Fixture {
        db: Database,
        config: PortalConfig,
        clock: FixedClock,
        cache: CurrentYearCache,
        year: i64,
    }

    impl Fixture {
        fn new() -> Self {
            let db = Database::open_in_memory().unwrap();
            let year = db
                .insert_year(
                    &AcademicYearInput {
                        label: "2024-2025".into(),
                        start: d(2024, 8, 1),
                        end: d(2025, 7, 31),
                        first_semester: DateRange::new(d(2024, 8, 1), d(2024, 12, 20)),
                        second_semester: DateRange::new(d(2025, 1, 6), d(2025, 5, 30)),
                        summer: DateRange::new(d(2025, 6, 9), d(2025, 7, 31)),
                    },
                    "now",
                )
                .unwrap();
            Self {
                db,
                config: PortalConfig::default(),
                clock: FixedClock::at(d(2025, 3, 3), NaiveTime::from_hms_opt(9, 0, 0).unwrap()),
                cache: CurrentYearCache::new(),
                year,
            }
        }

        fn store(&self) -> SnapshotStore<'_> {
            SnapshotStore::new(ServiceContext::new(&self.db, &self.config, &self.clock, &self.cache))
        }
    }

    fn full_patch() -> SnapshotPatch {
        SnapshotPatch {
            demographics: Some(Demographics {
                surname: Some("Santos".into()),
                first_name: Some("Maria".into()),
                date_of_birth: Some(d(2004, 5, 17)),
                gender: Some(Gender::Female),
                phone: Some("0917".into()),
                ..Default::default()
            }),
            address: Some(Address {
                street: Some("12 Rizal St".into()),
                barangay: Some("Tetuan".into()),
                city: Some("Zamboanga City".into()),
                full: None,
            }),
            emergency_contact: Some(EmergencyContact {
                name: Some("Jose Santos".into()),
                phone: Some("0918".into()),
                street: Some("4 Mabini".into()),
                barangay: Some("Putik".into()),
                ..Default::default()
            }),
            health_history: Some(HealthHistory {
                allergies: vec![Choice::other("Shellfish")],
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_first_access_creates_blank() {
        let fx = Fixture::new();
        let student = User::student(7);
        let snapshot = fx.store().get_or_create(&student, 7, fx.year, Semester::Second).unwrap();
        assert!(snapshot.autofilled_from.is_none());
        assert_eq!(snapshot.completion_status, CompletionStatus::Incomplete);

        // Second call returns the same row
        let again = fx.store().get_or_create(&student, 7, fx.year, Semester::Second).unwrap();
        assert_eq!(again.id, snapshot.id);
    }

    #[test]
    fn test_new_term_autofills_from_prior() {
        let fx = Fixture::new();
        let student = User::student(7);
        let store = fx.store();
        let first = store.get_or_create(&student, 7, fx.year, Semester::First).unwrap();
        store.update(&student, first.id, full_patch()).unwrap();

        let second = store.get_or_create(&student, 7, fx.year, Semester::Second).unwrap();
        assert_eq!(second.demographics.surname.as_deref(), Some("Santos"));
        assert_eq!(second.completion_status, CompletionStatus::Incomplete);
        assert_eq!(
            second.autofilled_from,
            Some(SnapshotOrigin {
                academic_year_id: fx.year,
                semester: Semester::First
            })
        );
    }

    #[test]
    fn test_update_recomputes_addresses_and_status() {
        let fx = Fixture::new();
        let student = User::student(7);
        let store = fx.store();
        let snapshot = store.get_or_create(&student, 7, fx.year, Semester::Second).unwrap();

        let updated = store.update(&student, snapshot.id, full_patch()).unwrap();
        assert_eq!(
            updated.address.full.as_deref(),
            Some("12 Rizal St, Tetuan, Zamboanga City")
        );
        assert_eq!(
            updated.emergency_contact.full_address.as_deref(),
            Some("4 Mabini, Putik, Zamboanga City")
        );
        assert_eq!(updated.completion_status, CompletionStatus::Complete);
        assert_eq!(updated.demographics.age, Some(20));
    }

    #[test]
    fn test_unspecified_other_rejected() {
        let fx = Fixture::new();
        let student = User::student(7);
        let store = fx.store();
        let snapshot = store.get_or_create(&student, 7, fx.year, Semester::Second).unwrap();

        let patch = SnapshotPatch {
            health_history: Some(HealthHistory {
                comorbidities: vec![Choice::other("  ")],
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = store.update(&student, snapshot.id, patch).unwrap_err();
        assert_eq!(err.kind(), "unspecified_other");
        assert_eq!(err.field(), Some("health_history.comorbidities"));

        // Nothing was written
        let stored = fx.db.get_snapshot(snapshot.id).unwrap().unwrap();
        assert!(stored.health_history.comorbidities.is_empty());
    }

    #[test]
    fn test_hospital_admission_requires_details() {
        let fx = Fixture::new();
        let student = User::student(7);
        let store = fx.store();
        let snapshot = store.get_or_create(&student, 7, fx.year, Semester::Second).unwrap();

        let patch = SnapshotPatch {
            health_history: Some(HealthHistory {
                hospital_admission_or_surgery: true,
                hospital_admission_details: Some("appendectomy".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = store.update(&student, snapshot.id, patch).unwrap_err();
        assert_eq!(err.field(), Some("health_history.hospital_admission_year"));
    }

    #[test]
    fn test_other_student_cannot_update() {
        let fx = Fixture::new();
        let store = fx.store();
        let snapshot = store
            .get_or_create(&User::student(7), 7, fx.year, Semester::Second)
            .unwrap();
        let err = store
            .update(&User::student(8), snapshot.id, SnapshotPatch::default())
            .unwrap_err();
        assert_eq!(err.kind(), "forbidden");
    }

    #[test]
    fn test_preview_does_not_persist() {
        let fx = Fixture::new();
        let student = User::student(7);
        let store = fx.store();
        let first = store.get_or_create(&student, 7, fx.year, Semester::First).unwrap();
        store.update(&student, first.id, full_patch()).unwrap();

        let preview = store.autofill_preview(&student, fx.year, Semester::Summer).unwrap();
        assert!(!preview.exists);
        assert_eq!(preview.autofilled_from_semester, Some(Semester::First));
        assert_eq!(preview.snapshot.demographics.first_name.as_deref(), Some("Maria"));
        assert!(fx.db.find_snapshot(7, fx.year, Semester::Summer).unwrap().is_none());

        assert_eq!(store.list_mine(&student).unwrap().len(), 1);
    }
}
