//! Scheduler: slot validation, capacity and atomic reservation.
//!
//! Reservations run inside one immediate transaction that first bumps the
//! `(date, campus)` lock row, then counts active bookings, then checks the
//! slot. The partial unique index on active slots backs the slot check.

mod grid;

pub use grid::{slot_grid, validate_date, validate_slot, validate_time};

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::context::ServiceContext;
use crate::db::{Database, DbError};
use crate::error::{PortalError, PortalResult, SchedulerError, ValidationError};
use crate::identity;
use crate::models::{
    AcademicYear, Appointment, AppointmentKind, AppointmentStatus, Campus, Role, Semester, User,
};
use crate::snapshots::ensure_snapshot;

/// Longest range accepted by [`Scheduler::booking_stats`].
const MAX_STATS_DAYS: i64 = 366;

/// A request to book one slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookingRequest {
    /// Patient the appointment is for
    pub user_id: i64,
    pub kind: AppointmentKind,
    pub campus: Campus,
    pub date: NaiveDate,
    pub time: NaiveTime,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub doctor_id: Option<i64>,
}

/// One row of a day view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleSlot {
    pub time: NaiveTime,
    pub available: bool,
    /// Present for staff callers when the slot is held
    pub booking: Option<BookedSlot>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookedSlot {
    pub appointment_id: i64,
    pub patient_name: String,
    pub kind: AppointmentKind,
    pub status: AppointmentStatus,
    pub purpose: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DayUtilisation {
    pub date: NaiveDate,
    pub booked: u32,
    pub capacity: u32,
    pub utilisation: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BookingStats {
    pub total: u32,
    pub by_status: BTreeMap<AppointmentStatus, u32>,
    pub by_kind: BTreeMap<AppointmentKind, u32>,
    pub per_day: Vec<DayUtilisation>,
}

/// Scheduler service.
pub struct Scheduler<'a> {
    ctx: ServiceContext<'a>,
}

impl<'a> Scheduler<'a> {
    pub fn new(ctx: ServiceContext<'a>) -> Self {
        Self { ctx }
    }

    /// Book a slot.
    ///
    /// Owners get a `pending` appointment. Staff bookings start
    /// `confirmed`, or `scheduled` when a doctor is assigned.
    pub fn book(&self, caller: &User, request: &BookingRequest) -> PortalResult<Appointment> {
        identity::require_owner_or_staff(caller, request.user_id, Some(request.campus))?;

        let config = &self.ctx.config.scheduler;
        if let Err(e) = validate_slot(config, self.ctx.clock.today(), request.date, request.time) {
            warn!(
                user_id = request.user_id,
                date = %request.date,
                time = %request.time,
                code = e.code(),
                "booking rejected"
            );
            return Err(e.into());
        }

        let status = initial_status(caller, request.doctor_id);
        let now = self.ctx.stamp();

        let appointment = self.ctx.write("book_appointment", |db| {
            // Read under the write lock so a concurrent activation is observed
            let year = db.get_current_year()?.ok_or(PortalError::NotConfigured)?;
            let semester = term_for(&year, request.date);
            let snapshot = ensure_snapshot(db, request.user_id, year.id, semester, &now)?;
            let draft = Appointment {
                id: 0,
                user_id: request.user_id,
                patient_snapshot_id: snapshot.id,
                academic_year_id: year.id,
                semester,
                campus: request.campus,
                kind: request.kind,
                date: request.date,
                time: request.time,
                purpose: request.purpose.trim().to_string(),
                status,
                doctor_id: request.doctor_id,
                original_date: None,
                original_time: None,
                rescheduled_by: None,
                rescheduled_at: None,
                reschedule_reason: None,
                cancelled_by: None,
                cancelled_at: None,
                notes: String::new(),
                created_by: caller.id,
                created_at: now.clone(),
                updated_at: now.clone(),
            };
            reserve(db, config, draft)
        })?;

        info!(
            appointment_id = appointment.id,
            user_id = appointment.user_id,
            campus = appointment.campus.as_str(),
            date = %appointment.date,
            time = %appointment.time,
            status = appointment.status.as_str(),
            "appointment booked"
        );
        Ok(appointment)
    }

    /// Open start times for a day, capped by remaining capacity.
    pub fn available_slots(
        &self,
        caller: &User,
        date: NaiveDate,
        campus: Campus,
    ) -> PortalResult<Vec<NaiveTime>> {
        identity::require_active(caller)?;
        let config = &self.ctx.config.scheduler;
        if validate_date(config, self.ctx.clock.today(), date).is_err() {
            return Ok(Vec::new());
        }

        let db = self.ctx.db;
        let taken = db.active_times_on(date, campus)?;
        let remaining = config.max_per_day.saturating_sub(taken.len() as u32) as usize;

        let mut open: Vec<NaiveTime> = slot_grid(config)
            .into_iter()
            .filter(|slot| !taken.contains(slot))
            .collect();
        open.truncate(remaining);

        debug!(date = %date, campus = campus.as_str(), open = open.len(), "available slots");
        Ok(open)
    }

    /// Every grid slot of a day with availability. Booking details are
    /// only filled in for staff.
    pub fn daily_schedule(
        &self,
        caller: &User,
        date: NaiveDate,
        campus: Campus,
    ) -> PortalResult<Vec<ScheduleSlot>> {
        identity::require_active(caller)?;
        let with_details = caller.role.is_staff();
        if with_details {
            identity::require_staff_for(caller, Some(campus))?;
        }

        let db = self.ctx.db;
        let config = &self.ctx.config.scheduler;
        let active: Vec<Appointment> = db
            .list_appointments_on(date, campus)?
            .into_iter()
            .filter(|a| a.status.is_active())
            .collect();
        let has_capacity = (active.len() as u32) < config.max_per_day;

        let mut schedule = Vec::new();
        for time in slot_grid(config) {
            let held = active.iter().find(|a| a.time == time);
            let booking = match (held, with_details) {
                (Some(appointment), true) => Some(BookedSlot {
                    appointment_id: appointment.id,
                    patient_name: patient_name(db, appointment)?,
                    kind: appointment.kind,
                    status: appointment.status,
                    purpose: appointment.purpose.clone(),
                }),
                _ => None,
            };
            schedule.push(ScheduleSlot {
                time,
                available: held.is_none() && has_capacity,
                booking,
            });
        }
        Ok(schedule)
    }

    /// Counts by status and kind plus per-day utilisation for a campus.
    ///
    /// Utilisation is non-cancelled bookings over `max_per_day`.
    pub fn booking_stats(
        &self,
        caller: &User,
        campus: Campus,
        from: NaiveDate,
        to: NaiveDate,
    ) -> PortalResult<BookingStats> {
        identity::require_staff_for(caller, Some(campus))?;
        if from > to {
            return Err(ValidationError::InconsistentDates(format!("{} is after {}", from, to)).into());
        }
        if (to - from).num_days() >= MAX_STATS_DAYS {
            return Err(ValidationError::BadFormat {
                field: "to".into(),
                reason: format!("range may span at most {} days", MAX_STATS_DAYS),
            }
            .into());
        }

        let capacity = self.ctx.config.scheduler.max_per_day;
        let appointments = self.ctx.db.list_appointments_between(campus, from, to)?;

        let mut stats = BookingStats::default();
        let mut per_day: BTreeMap<NaiveDate, u32> = BTreeMap::new();
        for appointment in &appointments {
            stats.total += 1;
            *stats.by_status.entry(appointment.status).or_default() += 1;
            *stats.by_kind.entry(appointment.kind).or_default() += 1;
            if appointment.status != AppointmentStatus::Cancelled {
                *per_day.entry(appointment.date).or_default() += 1;
            }
        }

        let mut date = from;
        while date <= to {
            let booked = per_day.get(&date).copied().unwrap_or(0);
            if booked > 0 || is_working_day(&self.ctx.config.scheduler, date) {
                stats.per_day.push(DayUtilisation {
                    date,
                    booked,
                    capacity,
                    utilisation: f64::from(booked) / f64::from(capacity),
                });
            }
            date += Duration::days(1);
        }
        Ok(stats)
    }
}

fn is_working_day(config: &SchedulerConfig, date: NaiveDate) -> bool {
    use chrono::{Datelike, Weekday};
    !config.weekdays_only || !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Semester an appointment on `date` belongs to.
pub(crate) fn term_for(year: &AcademicYear, date: NaiveDate) -> Semester {
    year.semester_of(date)
        .unwrap_or_else(|| year.semester_or_next(date))
}

fn initial_status(caller: &User, doctor_id: Option<i64>) -> AppointmentStatus {
    match (caller.role, doctor_id) {
        (Role::Student, _) => AppointmentStatus::Pending,
        (_, Some(_)) => AppointmentStatus::Scheduled,
        (_, None) => AppointmentStatus::Confirmed,
    }
}

fn patient_name(db: &Database, appointment: &Appointment) -> PortalResult<String> {
    Ok(db
        .get_snapshot(appointment.patient_snapshot_id)?
        .map(|s| s.display_name())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| format!("Patient #{}", appointment.user_id)))
}

/// Take the day lock and check capacity and slot for `(date, time, campus)`.
/// `exclude_id` skips the appointment being moved. Call inside a transaction.
pub(crate) fn claim_slot(
    db: &Database,
    config: &SchedulerConfig,
    date: NaiveDate,
    time: NaiveTime,
    campus: Campus,
    exclude_id: Option<i64>,
) -> PortalResult<()> {
    db.lock_day(date, campus)?;

    let active = db.count_active_on(date, campus, exclude_id)?;
    if active >= config.max_per_day {
        warn!(date = %date, campus = campus.as_str(), active, "day full");
        return Err(SchedulerError::DayFull.into());
    }
    if db.is_slot_taken(date, time, campus, exclude_id)? {
        warn!(date = %date, time = %time, campus = campus.as_str(), "slot taken");
        return Err(SchedulerError::SlotTaken.into());
    }
    Ok(())
}

/// Claim the slot and insert `draft`. Call inside a transaction.
pub(crate) fn reserve(
    db: &Database,
    config: &SchedulerConfig,
    mut draft: Appointment,
) -> PortalResult<Appointment> {
    claim_slot(db, config, draft.date, draft.time, draft.campus, None)?;
    draft.id = db.insert_appointment(&draft).map_err(slot_taken_on_duplicate)?;
    Ok(draft)
}

/// The unique slot index fired: another writer holds the slot.
pub(crate) fn slot_taken_on_duplicate(err: DbError) -> PortalError {
    if err.is_unique_violation() {
        SchedulerError::SlotTaken.into()
    } else {
        err.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::CurrentYearCache;
    use crate::config::{FixedClock, PortalConfig};
    use crate::models::{AcademicYearInput, CampusSet, DateRange};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    struct Fixture {
        db: Database,
        config: PortalConfig,
        clock: FixedClock,
        cache: CurrentYearCache,
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
            db.set_current_year(year, "now").unwrap();
            Self {
                db,
                config: PortalConfig::default(),
                // Monday
                clock: FixedClock::at(d(2025, 3, 3), t(9, 0)),
                cache: CurrentYearCache::new(),
            }
        }

        fn scheduler(&self) -> Scheduler<'_> {
            Scheduler::new(ServiceContext::new(&self.db, &self.config, &self.clock, &self.cache))
        }
    }

    fn request(user_id: i64, time: NaiveTime) -> BookingRequest {
        BookingRequest {
            user_id,
            kind: AppointmentKind::Medical,
            campus: Campus::A,
            date: d(2025, 3, 10),
            time,
            purpose: "checkup".into(),
            doctor_id: None,
        }
    }

    #[test]
    fn test_owner_booking_is_pending_and_creates_snapshot() {
        let fx = Fixture::new();
        let appointment = fx.scheduler().book(&User::student(7), &request(7, t(9, 0))).unwrap();
        assert_eq!(appointment.status, AppointmentStatus::Pending);
        assert_eq!(appointment.semester, Semester::Second);

        let snapshot = fx.db.get_snapshot(appointment.patient_snapshot_id).unwrap().unwrap();
        assert_eq!(snapshot.user_id, 7);
        assert_eq!(snapshot.semester, Semester::Second);
    }

    #[test]
    fn test_staff_booking_status() {
        let fx = Fixture::new();
        let staff = User::staff(50, CampusSet::parse("a"));
        let scheduler = fx.scheduler();

        let confirmed = scheduler.book(&staff, &request(7, t(9, 0))).unwrap();
        assert_eq!(confirmed.status, AppointmentStatus::Confirmed);

        let mut with_doctor = request(8, t(9, 20));
        with_doctor.doctor_id = Some(51);
        assert_eq!(
            scheduler.book(&staff, &with_doctor).unwrap().status,
            AppointmentStatus::Scheduled
        );

        let mut other_campus = request(9, t(9, 40));
        other_campus.campus = Campus::C;
        assert_eq!(scheduler.book(&staff, &other_campus).unwrap_err().kind(), "forbidden");
    }

    #[test]
    fn test_student_cannot_book_for_others() {
        let fx = Fixture::new();
        let err = fx.scheduler().book(&User::student(7), &request(8, t(9, 0))).unwrap_err();
        assert_eq!(err.kind(), "forbidden");
    }

    #[test]
    fn test_blocked_checked_first() {
        let fx = Fixture::new();
        let mut student = User::student(7);
        student.blocked = true;
        let mut bad = request(7, t(9, 15));
        bad.date = d(2025, 3, 1);
        assert_eq!(fx.scheduler().book(&student, &bad).unwrap_err().kind(), "blocked");
    }

    #[test]
    fn test_slot_taken() {
        let fx = Fixture::new();
        let scheduler = fx.scheduler();
        scheduler.book(&User::student(7), &request(7, t(9, 0))).unwrap();
        let err = scheduler.book(&User::student(8), &request(8, t(9, 0))).unwrap_err();
        assert_eq!(err.kind(), "slot_taken");
    }

    #[test]
    fn test_not_configured_without_year() {
        let fx = Fixture::new();
        fx.db.conn().execute("UPDATE academic_years SET is_current = 0", []).unwrap();
        let err = fx.scheduler().book(&User::student(7), &request(7, t(9, 0))).unwrap_err();
        assert_eq!(err.kind(), "not_configured");
    }

    #[test]
    fn test_available_slots_shrink_and_cap() {
        let fx = Fixture::new();
        let config = PortalConfig {
            scheduler: SchedulerConfig {
                max_per_day: 3,
                ..SchedulerConfig::default()
            },
            ..PortalConfig::default()
        };
        let scheduler = Scheduler::new(ServiceContext::new(&fx.db, &config, &fx.clock, &fx.cache));
        let student = User::student(7);
        let date = d(2025, 3, 10);

        let open = scheduler.available_slots(&student, date, Campus::A).unwrap();
        assert_eq!(open, vec![t(8, 0), t(8, 20), t(8, 40)]);

        scheduler.book(&student, &request(7, t(8, 20))).unwrap();
        let open = scheduler.available_slots(&student, date, Campus::A).unwrap();
        assert_eq!(open, vec![t(8, 0), t(8, 40)]);

        scheduler.book(&User::student(8), &request(8, t(8, 0))).unwrap();
        scheduler.book(&User::student(9), &request(9, t(10, 0))).unwrap();
        assert!(scheduler.available_slots(&student, date, Campus::A).unwrap().is_empty());

        let err = scheduler.book(&User::student(10), &request(10, t(11, 0))).unwrap_err();
        assert_eq!(err.kind(), "day_full");

        // Weekend days have nothing to offer
        assert!(scheduler
            .available_slots(&student, d(2025, 3, 8), Campus::A)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_daily_schedule_hides_details_from_students() {
        let fx = Fixture::new();
        let scheduler = fx.scheduler();
        scheduler.book(&User::student(7), &request(7, t(9, 0))).unwrap();
        let date = d(2025, 3, 10);

        let staff_view = scheduler
            .daily_schedule(&User::staff(50, CampusSet::parse("a")), date, Campus::A)
            .unwrap();
        let slot = staff_view.iter().find(|s| s.time == t(9, 0)).unwrap();
        assert!(!slot.available);
        let booking = slot.booking.as_ref().unwrap();
        assert_eq!(booking.patient_name, "Patient #7");
        assert_eq!(booking.status, AppointmentStatus::Pending);

        let student_view = scheduler.daily_schedule(&User::student(8), date, Campus::A).unwrap();
        assert_eq!(student_view.len(), slot_grid(&fx.config.scheduler).len());
        assert!(student_view.iter().all(|s| s.booking.is_none()));
        assert!(!student_view.iter().find(|s| s.time == t(9, 0)).unwrap().available);
    }

    #[test]
    fn test_booking_stats() {
        let fx = Fixture::new();
        let scheduler = fx.scheduler();
        scheduler.book(&User::student(7), &request(7, t(9, 0))).unwrap();
        let mut dental = request(8, t(9, 20));
        dental.kind = AppointmentKind::Dental;
        scheduler.book(&User::student(8), &dental).unwrap();

        let admin = User::admin(1);
        // Monday to Sunday
        let stats = scheduler
            .booking_stats(&admin, Campus::A, d(2025, 3, 10), d(2025, 3, 16))
            .unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.by_status.get(&AppointmentStatus::Pending), Some(&2));
        assert_eq!(stats.by_kind.get(&AppointmentKind::Dental), Some(&1));
        assert_eq!(stats.per_day.len(), 5);
        assert_eq!(stats.per_day[0].booked, 2);
        assert!((stats.per_day[0].utilisation - 0.1).abs() < 1e-9);

        let err = scheduler
            .booking_stats(&admin, Campus::A, d(2025, 3, 16), d(2025, 3, 10))
            .unwrap_err();
        assert_eq!(err.kind(), "inconsistent_dates");
    }
}
