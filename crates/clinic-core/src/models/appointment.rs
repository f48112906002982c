//! Appointment models and the lifecycle transition table.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use super::calendar::Semester;
use super::identity::Campus;
use crate::error::StateError;

/// Kind of consultation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentKind {
    Medical,
    Dental,
}

impl AppointmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentKind::Medical => "medical",
            AppointmentKind::Dental => "dental",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "medical" => Some(AppointmentKind::Medical),
            "dental" => Some(AppointmentKind::Dental),
            _ => None,
        }
    }

    /// Prefix used in consultation form file numbers.
    pub fn file_prefix(&self) -> &'static str {
        match self {
            AppointmentKind::Medical => "MD",
            AppointmentKind::Dental => "DN",
        }
    }
}

/// Appointment status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Scheduled,
    Completed,
    Cancelled,
}

/// Lifecycle operations on an appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppointmentAction {
    /// Owner reschedules force re-approval
    Reschedule { by_owner: bool },
    Confirm { doctor_assigned: bool },
    Cancel,
    /// Only reachable through a consultation form submission
    CompleteByForm,
}

impl AppointmentAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentAction::Reschedule { .. } => "reschedule",
            AppointmentAction::Confirm { .. } => "confirm",
            AppointmentAction::Cancel => "cancel",
            AppointmentAction::CompleteByForm => "complete",
        }
    }
}

impl AppointmentStatus {
    pub const ACTIVE: [AppointmentStatus; 3] = [
        AppointmentStatus::Pending,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Scheduled,
    ];

    pub const ALL: [AppointmentStatus; 5] = [
        AppointmentStatus::Pending,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Scheduled,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(AppointmentStatus::Pending),
            "confirmed" => Some(AppointmentStatus::Confirmed),
            "scheduled" => Some(AppointmentStatus::Scheduled),
            "completed" => Some(AppointmentStatus::Completed),
            "cancelled" => Some(AppointmentStatus::Cancelled),
            _ => None,
        }
    }

    /// Active appointments hold a slot and count against daily capacity.
    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AppointmentStatus::Completed | AppointmentStatus::Cancelled)
    }

    /// Transition table for the appointment lifecycle.
    pub fn apply(self, action: AppointmentAction) -> Result<AppointmentStatus, StateError> {
        use AppointmentAction as A;
        use AppointmentStatus as S;

        if self.is_terminal() {
            return Err(StateError::IllegalTransition {
                entity: "appointment",
                from: self.as_str().to_string(),
                action: action.as_str().to_string(),
            });
        }

        let next = match (self, action) {
            (_, A::Reschedule { by_owner: true }) => S::Pending,
            (current, A::Reschedule { by_owner: false }) => current,
            (S::Pending | S::Confirmed, A::Confirm { doctor_assigned: true }) => S::Scheduled,
            (S::Pending, A::Confirm { doctor_assigned: false }) => S::Confirmed,
            (S::Confirmed, A::Confirm { doctor_assigned: false }) => S::Confirmed,
            (_, A::Cancel) => S::Cancelled,
            (_, A::CompleteByForm) => S::Completed,
            (from, action) => {
                return Err(StateError::IllegalTransition {
                    entity: "appointment",
                    from: from.as_str().to_string(),
                    action: action.as_str().to_string(),
                })
            }
        };
        Ok(next)
    }
}

/// A booked consultation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: i64,
    pub user_id: i64,
    pub patient_snapshot_id: i64,
    pub academic_year_id: i64,
    pub semester: Semester,
    pub campus: Campus,
    pub kind: AppointmentKind,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub purpose: String,
    pub status: AppointmentStatus,
    pub doctor_id: Option<i64>,
    pub original_date: Option<NaiveDate>,
    pub original_time: Option<NaiveTime>,
    pub rescheduled_by: Option<i64>,
    pub rescheduled_at: Option<String>,
    pub reschedule_reason: Option<String>,
    pub cancelled_by: Option<i64>,
    pub cancelled_at: Option<String>,
    pub notes: String,
    pub created_by: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl Appointment {
    pub fn was_rescheduled(&self) -> bool {
        self.original_date.is_some()
    }

    /// Append a timestamped line to the free-text notes.
    pub fn append_note(&mut self, stamp: &str, note: &str) {
        if !self.notes.is_empty() {
            self.notes.push('\n');
        }
        self.notes.push_str(&format!("[{}] {}", stamp, note));
    }
}

/// Listing filter; `None` fields do not constrain.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppointmentFilter {
    pub date: Option<NaiveDate>,
    pub status: Option<AppointmentStatus>,
    pub kind: Option<AppointmentKind>,
    pub campus: Option<Campus>,
    pub academic_year_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_reschedule_forces_pending() {
        let next = AppointmentStatus::Confirmed
            .apply(AppointmentAction::Reschedule { by_owner: true })
            .unwrap();
        assert_eq!(next, AppointmentStatus::Pending);

        let next = AppointmentStatus::Scheduled
            .apply(AppointmentAction::Reschedule { by_owner: false })
            .unwrap();
        assert_eq!(next, AppointmentStatus::Scheduled);
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        for status in [AppointmentStatus::Completed, AppointmentStatus::Cancelled] {
            assert!(status.apply(AppointmentAction::Cancel).is_err());
            assert!(status.apply(AppointmentAction::CompleteByForm).is_err());
            assert!(status
                .apply(AppointmentAction::Reschedule { by_owner: false })
                .is_err());
        }
    }

    #[test]
    fn test_confirm() {
        use AppointmentAction::Confirm;
        assert_eq!(
            AppointmentStatus::Pending.apply(Confirm { doctor_assigned: false }).unwrap(),
            AppointmentStatus::Confirmed
        );
        assert_eq!(
            AppointmentStatus::Confirmed.apply(Confirm { doctor_assigned: true }).unwrap(),
            AppointmentStatus::Scheduled
        );
        assert!(AppointmentStatus::Scheduled
            .apply(Confirm { doctor_assigned: false })
            .is_err());
    }

    #[test]
    fn test_active_statuses() {
        assert!(AppointmentStatus::Pending.is_active());
        assert!(AppointmentStatus::Scheduled.is_active());
        assert!(!AppointmentStatus::Completed.is_active());
        assert!(!AppointmentStatus::Cancelled.is_active());
    }
}
