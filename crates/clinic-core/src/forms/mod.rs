//! Consultation form binder.
//!
//! Submitting a form is the only way an appointment completes. The form
//! insert, the status change and any dental follow-up booking share one
//! transaction.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::appointments::load_for;
use crate::context::ServiceContext;
use crate::db::Database;
use crate::error::{PortalError, PortalResult, ValidationError};
use crate::identity;
use crate::models::{
    Appointment, AppointmentAction, AppointmentKind, AppointmentStatus, DentalForm,
    DentalFormPayload, MedicalForm, MedicalFormPayload, PatientIdentity, PatientSnapshot, Sex,
    StaffSnapshot, User,
};
use crate::scheduler::{reserve, term_for, validate_slot};
use crate::snapshots::ensure_snapshot;

/// A stored form with the appointment it completed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FormOutcome<F> {
    pub form: F,
    pub appointment: Appointment,
    /// Booked from a dental form's next appointment date
    pub follow_up: Option<Appointment>,
}

/// Form binder service.
pub struct ConsultationBinder<'a> {
    ctx: ServiceContext<'a>,
}

/// Everything a form needs from the appointment, resolved inside the
/// transaction.
struct Binding {
    appointment: Appointment,
    snapshot: PatientSnapshot,
    examiner: StaffSnapshot,
    completed: AppointmentStatus,
}

impl<'a> ConsultationBinder<'a> {
    pub fn new(ctx: ServiceContext<'a>) -> Self {
        Self { ctx }
    }

    pub fn submit_medical_form(
        &self,
        caller: &User,
        appointment_id: i64,
        payload: MedicalFormPayload,
    ) -> PortalResult<FormOutcome<MedicalForm>> {
        identity::require_staff(caller)?;
        let now = self.ctx.stamp();
        let today = self.ctx.clock.today();
        let default_sex = self.ctx.config.default_sex;

        let outcome = self.ctx.write("submit_medical_form", |db| {
            let binding = bind(db, caller, appointment_id, AppointmentKind::Medical)?;
            let exam_date = payload.exam_date.unwrap_or(today);

            let mut form = MedicalForm {
                id: 0,
                patient_snapshot_id: binding.snapshot.id,
                appointment_id,
                academic_year_id: binding.appointment.academic_year_id,
                file_no: file_no(&binding),
                identity: fill_identity(payload.identity.clone(), &binding.snapshot, exam_date, default_sex),
                vitals: payload.vitals.clone(),
                general_survey: payload.general_survey.clone(),
                findings: payload.findings.clone(),
                diagnosis: payload.diagnosis.clone(),
                recommendations: payload.recommendations.clone(),
                examiner: binding.examiner.clone(),
                exam_date,
                created_by: caller.id,
                created_at: now.clone(),
            };
            form.id = db.insert_medical_form(&form)?;
            let appointment = complete(db, binding, &now)?;

            Ok(FormOutcome {
                form,
                appointment,
                follow_up: None,
            })
        })?;

        info!(
            appointment_id,
            form_id = outcome.form.id,
            file_no = %outcome.form.file_no,
            examiner = caller.id,
            "medical form submitted"
        );
        Ok(outcome)
    }

    /// Store a dental form, complete the appointment, and book the follow-up
    /// when the payload names a next appointment date.
    pub fn submit_dental_form(
        &self,
        caller: &User,
        appointment_id: i64,
        payload: DentalFormPayload,
    ) -> PortalResult<FormOutcome<DentalForm>> {
        identity::require_staff(caller)?;
        let now = self.ctx.stamp();
        let today = self.ctx.clock.today();
        let default_sex = self.ctx.config.default_sex;
        let scheduler = &self.ctx.config.scheduler;

        let follow_up_time = payload
            .next_appointment_date
            .map(|_| payload.next_appointment_time.unwrap_or(scheduler.follow_up_default_time));
        if let (Some(date), Some(time)) = (payload.next_appointment_date, follow_up_time) {
            validate_slot(scheduler, today, date, time)?;
        }

        let outcome = self.ctx.write("submit_dental_form", |db| {
            let binding = bind(db, caller, appointment_id, AppointmentKind::Dental)?;
            let exam_date = payload.exam_date.unwrap_or(today);

            let mut form = DentalForm {
                id: 0,
                patient_snapshot_id: binding.snapshot.id,
                appointment_id,
                academic_year_id: binding.appointment.academic_year_id,
                file_no: file_no(&binding),
                identity: fill_identity(payload.identity.clone(), &binding.snapshot, exam_date, default_sex),
                findings: payload.findings.clone(),
                examiner: binding.examiner.clone(),
                exam_date,
                next_appointment_date: payload.next_appointment_date,
                next_appointment_time: follow_up_time,
                follow_up_appointment_id: None,
                created_by: caller.id,
                created_at: now.clone(),
            };
            form.id = db.insert_dental_form(&form)?;
            let appointment = complete(db, binding, &now)?;

            let follow_up = match (form.next_appointment_date, form.next_appointment_time) {
                (Some(date), Some(time)) => {
                    let booked = book_follow_up(db, self.ctx, caller, &appointment, date, time, &now)?;
                    db.set_dental_follow_up(form.id, booked.id)?;
                    form.follow_up_appointment_id = Some(booked.id);
                    Some(booked)
                }
                _ => None,
            };

            Ok(FormOutcome {
                form,
                appointment,
                follow_up,
            })
        })?;

        info!(
            appointment_id,
            form_id = outcome.form.id,
            file_no = %outcome.form.file_no,
            examiner = caller.id,
            follow_up = ?outcome.follow_up.as_ref().map(|a| a.id),
            "dental form submitted"
        );
        Ok(outcome)
    }

    pub fn get_medical_form_for_appointment(
        &self,
        caller: &User,
        appointment_id: i64,
    ) -> PortalResult<Option<MedicalForm>> {
        identity::require_active(caller)?;
        load_for(self.ctx.db, caller, appointment_id)?;
        Ok(self.ctx.db.get_medical_form_for_appointment(appointment_id)?)
    }

    pub fn get_dental_form_for_appointment(
        &self,
        caller: &User,
        appointment_id: i64,
    ) -> PortalResult<Option<DentalForm>> {
        identity::require_active(caller)?;
        load_for(self.ctx.db, caller, appointment_id)?;
        Ok(self.ctx.db.get_dental_form_for_appointment(appointment_id)?)
    }
}

fn bind(db: &Database, caller: &User, appointment_id: i64, kind: AppointmentKind) -> PortalResult<Binding> {
    let appointment = load_for(db, caller, appointment_id)?;
    if appointment.kind != kind {
        return Err(ValidationError::BadFormat {
            field: "appointment.kind".into(),
            reason: format!(
                "a {} form cannot complete a {} appointment",
                kind.as_str(),
                appointment.kind.as_str()
            ),
        }
        .into());
    }
    let completed = appointment.status.apply(AppointmentAction::CompleteByForm)?;

    let snapshot = db
        .get_snapshot(appointment.patient_snapshot_id)?
        .ok_or_else(|| PortalError::not_found("patient_snapshot", appointment.patient_snapshot_id))?;
    let examiner = db
        .get_staff_profile(caller.id)?
        .ok_or_else(|| PortalError::not_found("staff_profile", caller.id))?
        .snapshot();

    Ok(Binding {
        appointment,
        snapshot,
        examiner,
        completed,
    })
}

fn complete(db: &Database, binding: Binding, now: &str) -> PortalResult<Appointment> {
    let mut appointment = binding.appointment;
    appointment.status = binding.completed;
    appointment.updated_at = now.to_string();
    db.update_appointment(&appointment)?;
    Ok(appointment)
}

/// `<prefix>-<student id>-<appointment id>`; the user id stands in when the
/// profile has no student id.
fn file_no(binding: &Binding) -> String {
    let patient = binding
        .snapshot
        .demographics
        .student_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| binding.appointment.user_id.to_string());
    format!(
        "{}-{}-{}",
        binding.appointment.kind.file_prefix(),
        patient,
        binding.appointment.id
    )
}

/// Fill identity fields the examiner left blank from the patient's snapshot.
fn fill_identity(
    mut identity: PatientIdentity,
    snapshot: &PatientSnapshot,
    exam_date: NaiveDate,
    default_sex: Sex,
) -> PatientIdentity {
    let demographics = &snapshot.demographics;
    if identity.surname.is_none() {
        identity.surname = demographics.surname.clone();
    }
    if identity.first_name.is_none() {
        identity.first_name = demographics.first_name.clone();
    }
    if identity.middle_name.is_none() {
        identity.middle_name = demographics.middle_name.clone();
    }
    if identity.age.is_none() {
        identity.age = demographics.age_on(exam_date);
    }
    if identity.sex.is_none() {
        identity.sex = Some(Sex::from_gender(demographics.gender, default_sex));
    }
    identity
}

fn book_follow_up(
    db: &Database,
    ctx: ServiceContext<'_>,
    caller: &User,
    source: &Appointment,
    date: NaiveDate,
    time: chrono::NaiveTime,
    now: &str,
) -> PortalResult<Appointment> {
    let year = db
        .get_year(source.academic_year_id)?
        .ok_or_else(|| PortalError::not_found("academic_year", source.academic_year_id))?;
    let semester = term_for(&year, date);
    let snapshot = ensure_snapshot(db, source.user_id, year.id, semester, now)?;

    let mut draft = source.clone();
    draft.id = 0;
    draft.patient_snapshot_id = snapshot.id;
    draft.semester = semester;
    draft.date = date;
    draft.time = time;
    draft.purpose = format!("Follow-up of appointment #{}", source.id);
    draft.status = AppointmentStatus::Confirmed;
    draft.original_date = None;
    draft.original_time = None;
    draft.rescheduled_by = None;
    draft.rescheduled_at = None;
    draft.reschedule_reason = None;
    draft.cancelled_by = None;
    draft.cancelled_at = None;
    draft.notes = String::new();
    draft.created_by = caller.id;
    draft.created_at = now.to_string();
    draft.updated_at = now.to_string();

    let booked = reserve(db, &ctx.config.scheduler, draft)?;
    info!(
        appointment_id = booked.id,
        source = source.id,
        date = %booked.date,
        time = %booked.time,
        "follow-up booked"
    );
    Ok(booked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::CurrentYearCache;
    use crate::config::{FixedClock, PortalConfig};
    use crate::models::{
        AcademicYearInput, Campus, CampusSet, DateRange, Demographics, Gender, StaffProfile,
        Vitals,
    };
    use crate::scheduler::{BookingRequest, Scheduler};
    use chrono::NaiveTime;

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

            let mut profile = StaffProfile::new(50, "Dr. Ana Reyes".into(), "Dentist".into());
            profile.license_no = Some("LIC-0042".into());
            profile.campuses = CampusSet::parse("a");
            db.upsert_staff_profile(&profile).unwrap();

            Self {
                db,
                config: PortalConfig::default(),
                clock: FixedClock::at(d(2025, 3, 3), t(9, 0)),
                cache: CurrentYearCache::new(),
            }
        }

        fn ctx(&self) -> ServiceContext<'_> {
            ServiceContext::new(&self.db, &self.config, &self.clock, &self.cache)
        }

        fn binder(&self) -> ConsultationBinder<'_> {
            ConsultationBinder::new(self.ctx())
        }

        fn book(&self, kind: AppointmentKind) -> Appointment {
            Scheduler::new(self.ctx())
                .book(
                    &staff(),
                    &BookingRequest {
                        user_id: 7,
                        kind,
                        campus: Campus::A,
                        date: d(2025, 3, 10),
                        time: t(9, 0),
                        purpose: "consultation".into(),
                        doctor_id: None,
                    },
                )
                .unwrap()
        }

        fn fill_profile(&self, snapshot_id: i64) {
            let mut snapshot = self.db.get_snapshot(snapshot_id).unwrap().unwrap();
            snapshot.demographics = Demographics {
                student_id: Some("2021-00123".into()),
                surname: Some("Santos".into()),
                first_name: Some("Maria".into()),
                date_of_birth: Some(d(2004, 5, 17)),
                gender: Some(Gender::Other),
                ..Default::default()
            };
            self.db.update_snapshot(&snapshot).unwrap();
        }
    }

    fn staff() -> User {
        User::staff(50, CampusSet::parse("a"))
    }

    #[test]
    fn test_medical_form_autofills_and_completes() {
        let fx = Fixture::new();
        let appointment = fx.book(AppointmentKind::Medical);
        fx.fill_profile(appointment.patient_snapshot_id);

        let payload = MedicalFormPayload {
            identity: PatientIdentity {
                first_name: Some("Mia".into()),
                ..Default::default()
            },
            vitals: Vitals {
                blood_pressure: Some("110/70".into()),
                ..Default::default()
            },
            diagnosis: Some("fit to study".into()),
            ..Default::default()
        };
        let outcome = fx.binder().submit_medical_form(&staff(), appointment.id, payload).unwrap();

        assert_eq!(outcome.appointment.status, AppointmentStatus::Completed);
        assert_eq!(outcome.form.file_no, format!("MD-2021-00123-{}", appointment.id));
        assert_eq!(outcome.form.identity.first_name.as_deref(), Some("Mia"));
        assert_eq!(outcome.form.identity.surname.as_deref(), Some("Santos"));
        assert_eq!(outcome.form.identity.age, Some(20));
        assert_eq!(outcome.form.identity.sex, Some(Sex::Male));
        assert_eq!(outcome.form.examiner.name, "Dr. Ana Reyes");
        assert_eq!(outcome.form.examiner.license_no.as_deref(), Some("LIC-0042"));
        assert_eq!(outcome.form.exam_date, d(2025, 3, 3));

        let stored = fx.db.get_medical_form_for_appointment(appointment.id).unwrap().unwrap();
        assert_eq!(stored, outcome.form);
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let fx = Fixture::new();
        let appointment = fx.book(AppointmentKind::Medical);
        let err = fx
            .binder()
            .submit_dental_form(&staff(), appointment.id, DentalFormPayload::default())
            .unwrap_err();
        assert_eq!(err.kind(), "bad_format");
        assert_eq!(err.field(), Some("appointment.kind"));
    }

    #[test]
    fn test_second_form_rejected_without_side_effects() {
        let fx = Fixture::new();
        let appointment = fx.book(AppointmentKind::Medical);
        let binder = fx.binder();
        binder
            .submit_medical_form(&staff(), appointment.id, MedicalFormPayload::default())
            .unwrap();

        // The appointment is now terminal
        let err = binder
            .submit_medical_form(&staff(), appointment.id, MedicalFormPayload::default())
            .unwrap_err();
        assert_eq!(err.kind(), "illegal_transition");
    }

    #[test]
    fn test_duplicate_form_rolls_back_status() {
        let fx = Fixture::new();
        let appointment = fx.book(AppointmentKind::Medical);
        fx.binder()
            .submit_medical_form(&staff(), appointment.id, MedicalFormPayload::default())
            .unwrap();

        // Reopen the appointment behind the binder's back
        let mut reopened = fx.db.get_appointment(appointment.id).unwrap().unwrap();
        reopened.status = AppointmentStatus::Confirmed;
        fx.db.update_appointment(&reopened).unwrap();

        let err = fx
            .binder()
            .submit_medical_form(&staff(), appointment.id, MedicalFormPayload::default())
            .unwrap_err();
        assert_eq!(err.kind(), "conflict");
        assert_eq!(
            fx.db.get_appointment(appointment.id).unwrap().unwrap().status,
            AppointmentStatus::Confirmed
        );
    }

    #[test]
    fn test_missing_staff_profile() {
        let fx = Fixture::new();
        let appointment = fx.book(AppointmentKind::Medical);
        let admin = User::admin(1);
        let err = fx
            .binder()
            .submit_medical_form(&admin, appointment.id, MedicalFormPayload::default())
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
        assert_eq!(
            fx.db.get_appointment(appointment.id).unwrap().unwrap().status,
            AppointmentStatus::Confirmed
        );
    }

    #[test]
    fn test_dental_form_books_follow_up() {
        let fx = Fixture::new();
        let appointment = fx.book(AppointmentKind::Dental);
        let payload = DentalFormPayload {
            next_appointment_date: Some(d(2025, 3, 24)),
            ..Default::default()
        };
        let outcome = fx.binder().submit_dental_form(&staff(), appointment.id, payload).unwrap();

        assert_eq!(outcome.appointment.status, AppointmentStatus::Completed);
        assert_eq!(outcome.form.file_no, format!("DN-7-{}", appointment.id));
        let follow_up = outcome.follow_up.unwrap();
        assert_eq!(follow_up.status, AppointmentStatus::Confirmed);
        assert_eq!(follow_up.kind, AppointmentKind::Dental);
        assert_eq!(follow_up.date, d(2025, 3, 24));
        assert_eq!(follow_up.time, t(10, 0));
        assert_eq!(follow_up.campus, Campus::A);
        assert_eq!(follow_up.user_id, 7);
        assert_eq!(outcome.form.follow_up_appointment_id, Some(follow_up.id));

        let stored = fx.db.get_dental_form_for_appointment(appointment.id).unwrap().unwrap();
        assert_eq!(stored.follow_up_appointment_id, Some(follow_up.id));
        assert_eq!(stored.next_appointment_time, Some(t(10, 0)));
    }

    #[test]
    fn test_follow_up_on_weekend_rejected_up_front() {
        let fx = Fixture::new();
        let appointment = fx.book(AppointmentKind::Dental);
        let payload = DentalFormPayload {
            next_appointment_date: Some(d(2025, 3, 22)),
            ..Default::default()
        };
        let err = fx
            .binder()
            .submit_dental_form(&staff(), appointment.id, payload)
            .unwrap_err();
        assert_eq!(err.kind(), "non_working_day");
        assert!(fx.db.get_dental_form_for_appointment(appointment.id).unwrap().is_none());
    }

    #[test]
    fn test_owner_can_read_form() {
        let fx = Fixture::new();
        let appointment = fx.book(AppointmentKind::Medical);
        let binder = fx.binder();
        assert!(binder
            .get_medical_form_for_appointment(&User::student(7), appointment.id)
            .unwrap()
            .is_none());
        binder
            .submit_medical_form(&staff(), appointment.id, MedicalFormPayload::default())
            .unwrap();
        assert!(binder
            .get_medical_form_for_appointment(&User::student(7), appointment.id)
            .unwrap()
            .is_some());
        assert_eq!(
            binder
                .get_medical_form_for_appointment(&User::student(8), appointment.id)
                .unwrap_err()
                .kind(),
            "forbidden"
        );
    }
}
