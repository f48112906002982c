//! Clinic Core Library
//!
//! Scheduling, document review and per-term patient profiles for a
//! university health service.
//!
//! # Architecture
//!
//! ```text
//!  caller (User from the identity provider)
//!        │
//!        ▼
//!  Identity Gate ── blocked? verified? role? campus?
//!        │
//!        ├──► Academic Calendar ── current year (cached) ──┐
//!        │                                                 │
//!        ├──► Patient Snapshot Store ◄── autofill ─────────┤
//!        │          ▲                                      │
//!        │          │                                      ▼
//!        ├──► Document Review Engine ──► CertificateRenderer (external)
//!        │
//!        ├──► Scheduler ── day lock ─► capacity ─► slot ─► insert
//!        │          ▲
//!        ├──► Appointment Lifecycle
//!        │          ▲
//!        └──► Consultation Form Binder ── completes + follow-up
//!                   │
//!                   ▼
//!        SQLite (one BEGIN IMMEDIATE per write)
//! ```
//!
//! # Modules
//!
//! - [`db`]: SQLite persistence, one `impl Database` block per table group
//! - [`models`]: domain types and the two status transition tables
//! - [`calendar`]: academic years and the current-year accessor
//! - [`identity`]: access guards
//! - [`snapshots`]: per-term patient profiles with autofill
//! - [`review`]: document submissions and certificate issuance
//! - [`scheduler`]: slot grid, capacity and booking
//! - [`appointments`]: reschedule, cancel, confirm
//! - [`forms`]: consultation forms that complete appointments

pub mod appointments;
pub mod calendar;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod forms;
pub mod identity;
pub mod models;
pub mod review;
pub mod scheduler;
pub mod snapshots;

// Re-export commonly used types
pub use appointments::{AppointmentLifecycle, CertificateLink};
pub use calendar::{AcademicCalendar, CurrentYearCache};
pub use config::{Clock, FixedClock, PortalConfig, SchedulerConfig, SystemClock};
pub use context::ServiceContext;
pub use db::Database;
pub use error::{AuthError, ErrorShape, PortalError, PortalResult, SchedulerError, StateError, ValidationError};
pub use forms::{ConsultationBinder, FormOutcome};
pub use models::{
    AcademicYear, AcademicYearInput, Appointment, AppointmentFilter, AppointmentKind,
    AppointmentStatus, Campus, CampusSet, DentalForm, DentalFormPayload, DocumentSubmission,
    FileSlot, MedicalForm, MedicalFormPayload, PatientSnapshot, Role, Semester, SnapshotPatch,
    StaffProfile, SubmissionStatus, UploadedFile, User,
};
pub use review::{CertificateRenderer, CertificateRequest, IssuedCertificate, RenderError, ReviewEngine};
pub use scheduler::{BookingRequest, BookingStats, ScheduleSlot, Scheduler};
pub use snapshots::{AutofillPreview, SnapshotStore};

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime};
use tracing::info;

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe entry point bundling the database, configuration, clock,
/// current-year cache and certificate renderer.
///
/// Each method corresponds to one request of the HTTP surface. Run one
/// `HealthPortal` per connection; separate instances on the same file
/// coordinate through SQLite locking.
pub struct HealthPortal {
    db: Arc<Mutex<Database>>,
    config: PortalConfig,
    clock: Box<dyn Clock>,
    current_year: CurrentYearCache,
    renderer: Arc<dyn CertificateRenderer>,
}

impl HealthPortal {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(
        path: P,
        config: PortalConfig,
        renderer: Arc<dyn CertificateRenderer>,
    ) -> PortalResult<Self> {
        config.validate()?;
        let db = Database::open_with_timeout(path.as_ref(), Duration::from_millis(config.busy_timeout_ms))?;
        info!(path = %path.as_ref().display(), "health portal opened");
        Ok(Self::from_parts(db, config, renderer))
    }

    /// Create an in-memory database (for testing).
    pub fn open_in_memory(
        config: PortalConfig,
        renderer: Arc<dyn CertificateRenderer>,
    ) -> PortalResult<Self> {
        config.validate()?;
        Ok(Self::from_parts(Database::open_in_memory()?, config, renderer))
    }

    fn from_parts(db: Database, config: PortalConfig, renderer: Arc<dyn CertificateRenderer>) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            config,
            clock: Box::new(SystemClock),
            current_year: CurrentYearCache::new(),
            renderer,
        }
    }

    /// Replace the wall clock.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    fn with_ctx<T>(&self, f: impl FnOnce(ServiceContext<'_>) -> PortalResult<T>) -> PortalResult<T> {
        let db = self.db.lock()?;
        f(ServiceContext::new(&db, &self.config, self.clock.as_ref(), &self.current_year))
    }

    // =========================================================================
    // Academic Calendar
    // =========================================================================

    pub fn current_year(&self) -> PortalResult<AcademicYear> {
        self.with_ctx(|ctx| AcademicCalendar::new(ctx).get_current())
    }

    pub fn current_term(&self) -> PortalResult<(AcademicYear, Semester)> {
        self.with_ctx(|ctx| AcademicCalendar::new(ctx).current_term())
    }

    pub fn create_year(&self, caller: &User, input: &AcademicYearInput) -> PortalResult<AcademicYear> {
        self.with_ctx(|ctx| AcademicCalendar::new(ctx).create_year(caller, input))
    }

    pub fn update_year(
        &self,
        caller: &User,
        year_id: i64,
        input: &AcademicYearInput,
    ) -> PortalResult<AcademicYear> {
        self.with_ctx(|ctx| AcademicCalendar::new(ctx).update_year(caller, year_id, input))
    }

    pub fn get_year(&self, caller: &User, year_id: i64) -> PortalResult<AcademicYear> {
        self.with_ctx(|ctx| AcademicCalendar::new(ctx).get_year(caller, year_id))
    }

    pub fn list_years(&self, caller: &User) -> PortalResult<Vec<AcademicYear>> {
        self.with_ctx(|ctx| AcademicCalendar::new(ctx).list_years(caller))
    }

    pub fn activate_year(&self, caller: &User, year_id: i64) -> PortalResult<AcademicYear> {
        self.with_ctx(|ctx| AcademicCalendar::new(ctx).activate(caller, year_id))
    }

    // =========================================================================
    // Staff Profiles
    // =========================================================================

    /// Admins edit any profile; staff edit their own.
    pub fn upsert_staff_profile(&self, caller: &User, profile: &StaffProfile) -> PortalResult<StaffProfile> {
        identity::require_staff(caller)?;
        if caller.role != Role::Admin && caller.id != profile.user_id {
            return Err(AuthError::Forbidden("another user's staff profile".into()).into());
        }
        self.with_ctx(|ctx| {
            let mut stored = profile.clone();
            stored.updated_at = ctx.stamp();
            ctx.db.upsert_staff_profile(&stored)?;
            info!(user_id = stored.user_id, by = caller.id, "staff profile saved");
            Ok(stored)
        })
    }

    pub fn get_staff_profile(&self, caller: &User, user_id: i64) -> PortalResult<Option<StaffProfile>> {
        identity::require_staff(caller)?;
        self.with_ctx(|ctx| Ok(ctx.db.get_staff_profile(user_id)?))
    }

    // =========================================================================
    // Patient Snapshots
    // =========================================================================

    /// The caller's snapshot for a term, created on first access. Missing
    /// year or semester default to the current term.
    pub fn my_snapshot(
        &self,
        caller: &User,
        academic_year_id: Option<i64>,
        semester: Option<Semester>,
    ) -> PortalResult<PatientSnapshot> {
        self.with_ctx(|ctx| {
            let (year_id, semester) = resolve_term(ctx, academic_year_id, semester)?;
            SnapshotStore::new(ctx).get_or_create(caller, caller.id, year_id, semester)
        })
    }

    pub fn snapshot_for(
        &self,
        caller: &User,
        user_id: i64,
        academic_year_id: i64,
        semester: Semester,
    ) -> PortalResult<PatientSnapshot> {
        self.with_ctx(|ctx| SnapshotStore::new(ctx).get_or_create(caller, user_id, academic_year_id, semester))
    }

    pub fn autofill_preview(
        &self,
        caller: &User,
        academic_year_id: Option<i64>,
        semester: Option<Semester>,
    ) -> PortalResult<AutofillPreview> {
        self.with_ctx(|ctx| {
            let (year_id, semester) = resolve_term(ctx, academic_year_id, semester)?;
            SnapshotStore::new(ctx).autofill_preview(caller, year_id, semester)
        })
    }

    pub fn update_snapshot(
        &self,
        caller: &User,
        snapshot_id: i64,
        patch: SnapshotPatch,
    ) -> PortalResult<PatientSnapshot> {
        self.with_ctx(|ctx| SnapshotStore::new(ctx).update(caller, snapshot_id, patch))
    }

    pub fn my_snapshots(&self, caller: &User) -> PortalResult<Vec<PatientSnapshot>> {
        self.with_ctx(|ctx| SnapshotStore::new(ctx).list_mine(caller))
    }

    // =========================================================================
    // Medical Documents
    // =========================================================================

    fn with_review<T>(&self, f: impl FnOnce(ReviewEngine<'_>) -> PortalResult<T>) -> PortalResult<T> {
        self.with_ctx(|ctx| f(ReviewEngine::new(ctx, self.renderer.as_ref())))
    }

    pub fn upload_document(
        &self,
        caller: &User,
        academic_year_id: i64,
        slot: FileSlot,
        file: UploadedFile,
    ) -> PortalResult<DocumentSubmission> {
        self.with_review(|engine| engine.upload(caller, academic_year_id, slot, file))
    }

    pub fn submit_for_review(&self, caller: &User, academic_year_id: i64) -> PortalResult<DocumentSubmission> {
        self.with_review(|engine| engine.submit_for_review(caller, academic_year_id))
    }

    pub fn verify_submission(&self, caller: &User, submission_id: i64) -> PortalResult<DocumentSubmission> {
        self.with_review(|engine| engine.verify(caller, submission_id))
    }

    pub fn reject_submission(
        &self,
        caller: &User,
        submission_id: i64,
        reason: &str,
    ) -> PortalResult<DocumentSubmission> {
        self.with_review(|engine| engine.reject(caller, submission_id, reason))
    }

    pub fn advise_for_consultation(
        &self,
        caller: &User,
        submission_id: i64,
        reason: &str,
    ) -> PortalResult<DocumentSubmission> {
        self.with_review(|engine| engine.advise_for_consultation(caller, submission_id, reason))
    }

    pub fn issue_certificate(&self, caller: &User, submission_id: i64) -> PortalResult<IssuedCertificate> {
        self.with_review(|engine| engine.issue(caller, submission_id))
    }

    pub fn download_certificate(&self, caller: &User, submission_id: i64) -> PortalResult<Vec<u8>> {
        self.with_review(|engine| engine.download(caller, submission_id))
    }

    pub fn record_certificate_emailed(
        &self,
        caller: &User,
        submission_id: i64,
    ) -> PortalResult<DocumentSubmission> {
        self.with_review(|engine| engine.record_certificate_emailed(caller, submission_id))
    }

    pub fn review_queue(
        &self,
        caller: &User,
        status: Option<SubmissionStatus>,
    ) -> PortalResult<Vec<DocumentSubmission>> {
        self.with_review(|engine| engine.review_queue(caller, status))
    }

    pub fn my_submission(&self, caller: &User, academic_year_id: i64) -> PortalResult<Option<DocumentSubmission>> {
        self.with_review(|engine| engine.get_mine(caller, academic_year_id))
    }

    // =========================================================================
    // Scheduling
    // =========================================================================

    pub fn book(&self, caller: &User, request: &BookingRequest) -> PortalResult<Appointment> {
        self.with_ctx(|ctx| Scheduler::new(ctx).book(caller, request))
    }

    pub fn available_slots(&self, caller: &User, date: NaiveDate, campus: Campus) -> PortalResult<Vec<NaiveTime>> {
        self.with_ctx(|ctx| Scheduler::new(ctx).available_slots(caller, date, campus))
    }

    pub fn daily_schedule(&self, caller: &User, date: NaiveDate, campus: Campus) -> PortalResult<Vec<ScheduleSlot>> {
        self.with_ctx(|ctx| Scheduler::new(ctx).daily_schedule(caller, date, campus))
    }

    pub fn booking_stats(
        &self,
        caller: &User,
        campus: Campus,
        from: NaiveDate,
        to: NaiveDate,
    ) -> PortalResult<BookingStats> {
        self.with_ctx(|ctx| Scheduler::new(ctx).booking_stats(caller, campus, from, to))
    }

    // =========================================================================
    // Appointments
    // =========================================================================

    pub fn list_appointments(&self, caller: &User, filter: &AppointmentFilter) -> PortalResult<Vec<Appointment>> {
        self.with_ctx(|ctx| AppointmentLifecycle::new(ctx).list(caller, filter))
    }

    pub fn get_appointment(&self, caller: &User, appointment_id: i64) -> PortalResult<Appointment> {
        self.with_ctx(|ctx| AppointmentLifecycle::new(ctx).get(caller, appointment_id))
    }

    pub fn reschedule(
        &self,
        caller: &User,
        appointment_id: i64,
        new_date: NaiveDate,
        new_time: NaiveTime,
        reason: &str,
    ) -> PortalResult<Appointment> {
        self.with_ctx(|ctx| {
            AppointmentLifecycle::new(ctx).reschedule(caller, appointment_id, new_date, new_time, reason)
        })
    }

    pub fn cancel(&self, caller: &User, appointment_id: i64) -> PortalResult<Appointment> {
        self.with_ctx(|ctx| AppointmentLifecycle::new(ctx).cancel(caller, appointment_id))
    }

    pub fn confirm(&self, caller: &User, appointment_id: i64, doctor_id: Option<i64>) -> PortalResult<Appointment> {
        self.with_ctx(|ctx| AppointmentLifecycle::new(ctx).confirm(caller, appointment_id, doctor_id))
    }

    pub fn complete(&self, caller: &User, appointment_id: i64) -> PortalResult<Appointment> {
        self.with_ctx(|ctx| AppointmentLifecycle::new(ctx).complete(caller, appointment_id))
    }

    pub fn medical_certificate_for(
        &self,
        caller: &User,
        appointment_id: i64,
    ) -> PortalResult<Option<CertificateLink>> {
        self.with_ctx(|ctx| AppointmentLifecycle::new(ctx).medical_certificate_for(caller, appointment_id))
    }

    // =========================================================================
    // Consultation Forms
    // =========================================================================

    pub fn submit_medical_form(
        &self,
        caller: &User,
        appointment_id: i64,
        payload: MedicalFormPayload,
    ) -> PortalResult<FormOutcome<MedicalForm>> {
        self.with_ctx(|ctx| ConsultationBinder::new(ctx).submit_medical_form(caller, appointment_id, payload))
    }

    pub fn submit_dental_form(
        &self,
        caller: &User,
        appointment_id: i64,
        payload: DentalFormPayload,
    ) -> PortalResult<FormOutcome<DentalForm>> {
        self.with_ctx(|ctx| ConsultationBinder::new(ctx).submit_dental_form(caller, appointment_id, payload))
    }

    pub fn medical_form_for(&self, caller: &User, appointment_id: i64) -> PortalResult<Option<MedicalForm>> {
        self.with_ctx(|ctx| ConsultationBinder::new(ctx).get_medical_form_for_appointment(caller, appointment_id))
    }

    pub fn dental_form_for(&self, caller: &User, appointment_id: i64) -> PortalResult<Option<DentalForm>> {
        self.with_ctx(|ctx| ConsultationBinder::new(ctx).get_dental_form_for_appointment(caller, appointment_id))
    }
}

/// Explicit `(year, semester)` or the current term for whatever is missing.
fn resolve_term(
    ctx: ServiceContext<'_>,
    academic_year_id: Option<i64>,
    semester: Option<Semester>,
) -> PortalResult<(i64, Semester)> {
    match (academic_year_id, semester) {
        (Some(year_id), Some(semester)) => Ok((year_id, semester)),
        (Some(year_id), None) => {
            let year = ctx
                .db
                .get_year(year_id)?
                .ok_or_else(|| PortalError::not_found("academic_year", year_id))?;
            Ok((year_id, year.semester_or_next(ctx.clock.today())))
        }
        (None, semester) => {
            let (year, current) = AcademicCalendar::new(ctx).current_term()?;
            Ok((year.id, semester.unwrap_or(current)))
        }
    }
}
