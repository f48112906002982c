//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use clinic_core::models::DateRange;
use clinic_core::{
    AcademicYearInput, AppointmentKind, BookingRequest, Campus, CampusSet, CertificateRenderer,
    CertificateRequest, FixedClock, HealthPortal, PortalConfig, RenderError, StaffProfile, User,
};

/// Renders a fixed text body so issued bytes can be compared.
pub struct TextRenderer;

impl CertificateRenderer for TextRenderer {
    fn render(&self, request: &CertificateRequest<'_>) -> Result<Vec<u8>, RenderError> {
        Ok(format!(
            "%PDF-stub certificate {} issued by {} on {}",
            request.submission_id, request.issuer.name, request.issue_date
        )
        .into_bytes())
    }
}

pub fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

pub fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

/// Monday 2025-03-03, one week before the scenario dates.
pub fn clock() -> FixedClock {
    FixedClock::at(d(2025, 3, 3), t(9, 0))
}

pub fn admin() -> User {
    User::admin(1)
}

pub fn staff() -> User {
    User::staff(50, CampusSet::parse("a"))
}

pub fn year_input() -> AcademicYearInput {
    AcademicYearInput {
        label: "2024-2025".into(),
        start: d(2024, 8, 1),
        end: d(2025, 7, 31),
        first_semester: DateRange::new(d(2024, 8, 1), d(2024, 12, 20)),
        second_semester: DateRange::new(d(2025, 1, 6), d(2025, 5, 30)),
        summer: DateRange::new(d(2025, 6, 9), d(2025, 7, 31)),
    }
}

/// Create the year, make it current and register the staff member's profile.
pub fn seed(portal: &HealthPortal) -> i64 {
    let year = portal.create_year(&admin(), &year_input()).unwrap();
    portal.activate_year(&admin(), year.id).unwrap();

    let mut profile = StaffProfile::new(50, "Ana Reyes, MD".into(), "University Physician".into());
    profile.license_no = Some("0123456".into());
    profile.campuses = CampusSet::parse("a");
    portal.upsert_staff_profile(&staff(), &profile).unwrap();
    year.id
}

pub fn portal_with(config: PortalConfig) -> HealthPortal {
    HealthPortal::open_in_memory(config, Arc::new(TextRenderer))
        .unwrap()
        .with_clock(clock())
}

pub fn seeded_portal() -> (HealthPortal, i64) {
    let portal = portal_with(PortalConfig::default());
    let year = seed(&portal);
    (portal, year)
}

pub fn file_portal(path: &Path) -> HealthPortal {
    HealthPortal::open(path, PortalConfig::default(), Arc::new(TextRenderer))
        .unwrap()
        .with_clock(clock())
}

pub fn booking(user_id: i64, date: NaiveDate, time: NaiveTime) -> BookingRequest {
    BookingRequest {
        user_id,
        kind: AppointmentKind::Medical,
        campus: Campus::A,
        date,
        time,
        purpose: "pre-enrolment checkup".into(),
        doctor_id: None,
    }
}
