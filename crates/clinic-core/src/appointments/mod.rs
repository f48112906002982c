//! Appointment lifecycle.
//!
//! Status changes go through [`AppointmentStatus::apply`]. Completion is
//! only reachable through the consultation form binder.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::context::ServiceContext;
use crate::db::Database;
use crate::error::{PortalError, PortalResult, StateError, ValidationError};
use crate::identity;
use crate::models::{
    Appointment, AppointmentAction, AppointmentFilter, AppointmentStatus, Role, User,
};
use crate::scheduler::{claim_slot, slot_taken_on_duplicate, validate_slot};

/// Where the patient's issued medical certificate can be fetched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CertificateLink {
    pub submission_id: i64,
    pub academic_year_id: i64,
    pub issued_at: Option<String>,
    pub url: String,
}

/// Appointment lifecycle service.
pub struct AppointmentLifecycle<'a> {
    ctx: ServiceContext<'a>,
}

impl<'a> AppointmentLifecycle<'a> {
    pub fn new(ctx: ServiceContext<'a>) -> Self {
        Self { ctx }
    }

    /// Move an appointment to a new slot.
    ///
    /// The new slot goes through the same checks as a booking, with this
    /// appointment excluded from the capacity count. The first move keeps
    /// the original date and time. Owner moves need staff approval again.
    pub fn reschedule(
        &self,
        caller: &User,
        appointment_id: i64,
        new_date: NaiveDate,
        new_time: NaiveTime,
        reason: &str,
    ) -> PortalResult<Appointment> {
        identity::require_active(caller)?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ValidationError::MissingField {
                field: "reschedule_reason".into(),
            }
            .into());
        }

        let config = &self.ctx.config.scheduler;
        let today = self.ctx.clock.today();
        let now = self.ctx.stamp();

        let appointment = self.ctx.write("reschedule_appointment", |db| {
            let mut appointment = load_for(db, caller, appointment_id)?;
            let by_owner = caller.role == Role::Student;
            let next = appointment
                .status
                .apply(AppointmentAction::Reschedule { by_owner })?;
            validate_slot(config, today, new_date, new_time)?;
            claim_slot(db, config, new_date, new_time, appointment.campus, Some(appointment.id))?;

            let (old_date, old_time) = (appointment.date, appointment.time);
            if !appointment.was_rescheduled() {
                appointment.original_date = Some(old_date);
                appointment.original_time = Some(old_time);
            }
            appointment.date = new_date;
            appointment.time = new_time;
            appointment.status = next;
            appointment.rescheduled_by = Some(caller.id);
            appointment.rescheduled_at = Some(now.clone());
            appointment.reschedule_reason = Some(reason.to_string());
            appointment.append_note(
                &now,
                &format!(
                    "Rescheduled from {} {} to {} {} by user {}: {}",
                    old_date,
                    old_time.format("%H:%M"),
                    new_date,
                    new_time.format("%H:%M"),
                    caller.id,
                    reason
                ),
            );
            appointment.updated_at = now.clone();
            db.update_appointment(&appointment)
                .map_err(slot_taken_on_duplicate)?;
            Ok(appointment)
        })?;

        info!(
            appointment_id,
            by = caller.id,
            date = %appointment.date,
            time = %appointment.time,
            status = appointment.status.as_str(),
            "appointment rescheduled"
        );
        Ok(appointment)
    }

    /// Cancel an appointment. Frees its slot and its share of the day.
    pub fn cancel(&self, caller: &User, appointment_id: i64) -> PortalResult<Appointment> {
        identity::require_active(caller)?;
        let now = self.ctx.stamp();

        let appointment = self.ctx.write("cancel_appointment", |db| {
            let mut appointment = load_for(db, caller, appointment_id)?;
            appointment.status = appointment.status.apply(AppointmentAction::Cancel)?;
            appointment.cancelled_by = Some(caller.id);
            appointment.cancelled_at = Some(now.clone());
            appointment.updated_at = now.clone();
            db.update_appointment(&appointment)?;
            Ok(appointment)
        })?;

        info!(appointment_id, by = caller.id, "appointment cancelled");
        Ok(appointment)
    }

    /// Staff approval. Assigning a doctor schedules the appointment.
    pub fn confirm(
        &self,
        caller: &User,
        appointment_id: i64,
        doctor_id: Option<i64>,
    ) -> PortalResult<Appointment> {
        identity::require_staff(caller)?;
        let now = self.ctx.stamp();

        let appointment = self.ctx.write("confirm_appointment", |db| {
            let mut appointment = load_for(db, caller, appointment_id)?;
            appointment.status = appointment.status.apply(AppointmentAction::Confirm {
                doctor_assigned: doctor_id.is_some(),
            })?;
            if doctor_id.is_some() {
                appointment.doctor_id = doctor_id;
            }
            appointment.updated_at = now.clone();
            db.update_appointment(&appointment)?;
            Ok(appointment)
        })?;

        info!(
            appointment_id,
            by = caller.id,
            status = appointment.status.as_str(),
            "appointment confirmed"
        );
        Ok(appointment)
    }

    /// Always refused: appointments complete by submitting a consultation form.
    pub fn complete(&self, caller: &User, appointment_id: i64) -> PortalResult<Appointment> {
        identity::require_staff(caller)?;
        let appointment = load_for(self.ctx.db, caller, appointment_id)?;
        Err(StateError::IllegalTransition {
            entity: "appointment",
            from: appointment.status.as_str().to_string(),
            action: "complete".into(),
        }
        .into())
    }

    pub fn get(&self, caller: &User, appointment_id: i64) -> PortalResult<Appointment> {
        identity::require_active(caller)?;
        load_for(self.ctx.db, caller, appointment_id)
    }

    /// Filtered listing. Students see their own appointments; staff see
    /// their campuses; admins see everything.
    pub fn list(&self, caller: &User, filter: &AppointmentFilter) -> PortalResult<Vec<Appointment>> {
        identity::require_active(caller)?;
        let db = self.ctx.db;

        let appointments = match caller.role {
            Role::Student => db.list_appointments(filter, Some(caller.id))?,
            Role::Staff | Role::Admin => {
                if filter.campus.is_some() {
                    identity::require_staff_for(caller, filter.campus)?;
                }
                db.list_appointments(filter, None)?
                    .into_iter()
                    .filter(|a| identity::can_access_campus(caller, Some(a.campus)))
                    .collect()
            }
        };
        debug!(user_id = caller.id, count = appointments.len(), "listed appointments");
        Ok(appointments)
    }

    /// The patient's issued certificate, preferring the appointment's year.
    pub fn medical_certificate_for(
        &self,
        caller: &User,
        appointment_id: i64,
    ) -> PortalResult<Option<CertificateLink>> {
        identity::require_active(caller)?;
        let db = self.ctx.db;
        let appointment = load_for(db, caller, appointment_id)?;
        let link = db
            .find_issued_submission(appointment.user_id, appointment.academic_year_id)?
            .map(|submission| CertificateLink {
                submission_id: submission.id,
                academic_year_id: submission.academic_year_id,
                issued_at: submission.issued_at,
                url: format!("/medical-documents/{}/download-certificate", submission.id),
            });
        Ok(link)
    }
}

/// Load an appointment and check the caller may act on it.
pub(crate) fn load_for(db: &Database, caller: &User, appointment_id: i64) -> PortalResult<Appointment> {
    let appointment = db
        .get_appointment(appointment_id)?
        .ok_or_else(|| PortalError::not_found("appointment", appointment_id))?;
    identity::require_owner_or_staff(caller, appointment.user_id, Some(appointment.campus))?;
    Ok(appointment)
}
