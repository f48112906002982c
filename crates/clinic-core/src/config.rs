//! Runtime configuration.
//!
//! Resolved once at startup and passed into services. Every constant the
//! scheduler enforces lives in [`SchedulerConfig`] so tests and deployments
//! can reason about one value.

use std::path::Path;

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::{PortalResult, ValidationError};
use crate::models::Sex;

/// Scheduler constants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    pub max_per_day: u32,
    pub slot_minutes: u32,
    pub work_start: NaiveTime,
    pub work_end: NaiveTime,
    pub lunch_start: NaiveTime,
    pub lunch_end: NaiveTime,
    pub horizon_days: i64,
    pub weekdays_only: bool,
    /// Time used for follow-ups booked from a dental form without a time
    pub follow_up_default_time: NaiveTime,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_per_day: 20,
            slot_minutes: 20,
            work_start: hm(8, 0),
            work_end: hm(17, 0),
            lunch_start: hm(12, 0),
            lunch_end: hm(13, 0),
            horizon_days: 30,
            weekdays_only: true,
            follow_up_default_time: hm(10, 0),
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_per_day == 0 {
            return Err(ValidationError::BadFormat {
                field: "scheduler.max_per_day".into(),
                reason: "must be positive".into(),
            });
        }
        if self.slot_minutes == 0 || self.slot_minutes > 240 {
            return Err(ValidationError::BadFormat {
                field: "scheduler.slot_minutes".into(),
                reason: "must be between 1 and 240".into(),
            });
        }
        if self.work_start >= self.work_end {
            return Err(ValidationError::BadFormat {
                field: "scheduler.work_end".into(),
                reason: "must be after work_start".into(),
            });
        }
        if self.lunch_start > self.lunch_end
            || self.lunch_start < self.work_start
            || self.lunch_end > self.work_end
        {
            return Err(ValidationError::BadFormat {
                field: "scheduler.lunch_start".into(),
                reason: "lunch must sit inside working hours".into(),
            });
        }
        if self.horizon_days < 1 {
            return Err(ValidationError::BadFormat {
                field: "scheduler.horizon_days".into(),
                reason: "must be at least one day".into(),
            });
        }
        Ok(())
    }
}

/// Clinic-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PortalConfig {
    pub scheduler: SchedulerConfig,
    /// Appended to every emergency-contact address
    pub home_city: String,
    /// Sex recorded on forms when the profile gender is "Other" or unset
    pub default_sex: Sex,
    /// Internal retries on lock contention before surfacing the error
    pub lock_retries: u32,
    pub busy_timeout_ms: u64,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            home_city: "Zamboanga City".into(),
            default_sex: Sex::Male,
            lock_retries: 3,
            busy_timeout_ms: 5_000,
        }
    }
}

impl PortalConfig {
    pub fn validate(&self) -> PortalResult<()> {
        self.scheduler.validate()?;
        if self.home_city.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "home_city".into(),
            }
            .into());
        }
        Ok(())
    }

    /// Parse from JSON; missing keys take their defaults.
    pub fn from_json_str(json: &str) -> PortalResult<Self> {
        let config: PortalConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> PortalResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ValidationError::BadFormat {
                field: "config".into(),
                reason: format!("cannot read {}: {}", path.as_ref().display(), e),
            }
        })?;
        Self::from_json_str(&raw)
    }
}

/// Source of the current local time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }

    /// Timestamp string stored on audit columns.
    fn stamp(&self) -> String {
        self.now().format("%Y-%m-%dT%H:%M:%S").to_string()
    }
}

/// Wall clock in the server's local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        let now = Local::now().naive_local();
        now.with_nanosecond(0).unwrap_or(now)
    }
}

/// Frozen clock for tests and replays.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl FixedClock {
    pub fn at(date: NaiveDate, time: NaiveTime) -> Self {
        Self(date.and_time(time))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}
