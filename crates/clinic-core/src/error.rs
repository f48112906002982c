//! Error taxonomy shared by every clinic operation.
//!
//! Each variant maps to a stable `kind` code so callers can render
//! actionable messages without parsing text.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::DbError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthError {
    #[error("authentication required")]
    Unauthenticated,

    #[error("account is blocked: {reason}")]
    Blocked { reason: String },

    #[error("email address has not been verified")]
    EmailUnverified,

    #[error("forbidden: {0}")]
    Forbidden(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{field} is required")]
    MissingField { field: String },

    #[error("{field} is malformed: {reason}")]
    BadFormat { field: String, reason: String },

    #[error("{field} selects \"Other\" without specifying it")]
    UnspecifiedOther { field: String },

    #[error("inconsistent dates: {0}")]
    InconsistentDates(String),
}

impl ValidationError {
    pub fn field(&self) -> Option<&str> {
        match self {
            ValidationError::MissingField { field }
            | ValidationError::BadFormat { field, .. }
            | ValidationError::UnspecifiedOther { field } => Some(field.as_str()),
            ValidationError::InconsistentDates(_) => None,
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("appointments must be booked for a future date")]
    PastDate,

    #[error("appointments cannot be booked that far ahead")]
    TooFar,

    #[error("the clinic is closed on that day")]
    NonWorkingDay,

    #[error("that time is outside clinic hours")]
    OutsideHours,

    #[error("appointment times must fall on the 20-minute slot grid")]
    BadAlignment,

    #[error("no slots remain for that day")]
    DayFull,

    #[error("this slot was just taken, refresh to see remaining slots")]
    SlotTaken,
}

impl SchedulerError {
    pub fn code(&self) -> &'static str {
        match self {
            SchedulerError::PastDate => "past_date",
            SchedulerError::TooFar => "too_far",
            SchedulerError::NonWorkingDay => "non_working_day",
            SchedulerError::OutsideHours => "outside_hours",
            SchedulerError::BadAlignment => "bad_alignment",
            SchedulerError::DayFull => "day_full",
            SchedulerError::SlotTaken => "slot_taken",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateError {
    #[error("cannot {action} a {entity} in state {from}")]
    IllegalTransition {
        entity: &'static str,
        from: String,
        action: String,
    },

    #[error("submission is incomplete, missing: {}", .missing.join(", "))]
    Incomplete { missing: Vec<String> },
}

/// Top-level error for clinic operations.
#[derive(Error, Debug)]
pub enum PortalError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("certificate service failed: {0}")]
    ExternalService(String),

    #[error("no academic year is configured as current")]
    NotConfigured,

    #[error("database error: {0}")]
    Database(DbError),
}

pub type PortalResult<T> = Result<T, PortalError>;

impl From<DbError> for PortalError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::Duplicate(what) => PortalError::Conflict(what),
            DbError::NotFound(what) => PortalError::NotFound {
                entity: "record",
                id: what,
            },
            other => PortalError::Database(other),
        }
    }
}

impl From<rusqlite::Error> for PortalError {
    fn from(e: rusqlite::Error) -> Self {
        DbError::from(e).into()
    }
}

impl From<serde_json::Error> for PortalError {
    fn from(e: serde_json::Error) -> Self {
        PortalError::Database(DbError::from(e))
    }
}

impl<T> From<std::sync::PoisonError<T>> for PortalError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        PortalError::Database(DbError::Poisoned(e.to_string()))
    }
}

impl PortalError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        PortalError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Stable snake_case discriminator.
    pub fn kind(&self) -> &'static str {
        match self {
            PortalError::Auth(e) => match e {
                AuthError::Unauthenticated => "unauthenticated",
                AuthError::Blocked { .. } => "blocked",
                AuthError::EmailUnverified => "email_unverified",
                AuthError::Forbidden(_) => "forbidden",
            },
            PortalError::Validation(e) => match e {
                ValidationError::MissingField { .. } => "missing_field",
                ValidationError::BadFormat { .. } => "bad_format",
                ValidationError::UnspecifiedOther { .. } => "unspecified_other",
                ValidationError::InconsistentDates(_) => "inconsistent_dates",
            },
            PortalError::Scheduler(e) => e.code(),
            PortalError::State(e) => match e {
                StateError::IllegalTransition { .. } => "illegal_transition",
                StateError::Incomplete { .. } => "incomplete",
            },
            PortalError::NotFound { .. } => "not_found",
            PortalError::Conflict(_) => "conflict",
            PortalError::ExternalService(_) => "external_service_error",
            PortalError::NotConfigured => "not_configured",
            PortalError::Database(_) => "internal",
        }
    }

    pub fn field(&self) -> Option<&str> {
        match self {
            PortalError::Validation(e) => e.field(),
            _ => None,
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            PortalError::Auth(AuthError::Unauthenticated) => 401,
            PortalError::Auth(_) => 403,
            PortalError::Validation(_) | PortalError::Scheduler(_) | PortalError::State(_) => 400,
            PortalError::NotFound { .. } => 404,
            PortalError::Conflict(_) => 409,
            PortalError::ExternalService(_) => 502,
            PortalError::NotConfigured | PortalError::Database(_) => 500,
        }
    }

    /// True for transient lock contention that is worth retrying.
    pub fn is_lock_conflict(&self) -> bool {
        matches!(self, PortalError::Database(e) if e.is_busy())
    }

    pub fn to_shape(&self) -> ErrorShape {
        ErrorShape {
            kind: self.kind().to_string(),
            message: self.to_string(),
            field: self.field().map(str::to_string),
        }
    }
}

/// Serialisable error payload `{kind, message, field?}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorShape {
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}
