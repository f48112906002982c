//! Slot grid and booking-date validation. Pure; no storage access.

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Timelike, Weekday};

use crate::config::SchedulerConfig;
use crate::error::SchedulerError;

/// Every bookable start time of a working day, ascending.
///
/// Steps from `work_start` by `slot_minutes` while before `work_end`,
/// dropping starts inside `[lunch_start, lunch_end)`. The default
/// configuration yields 24 slots: 12 before lunch and 12 after.
pub fn slot_grid(config: &SchedulerConfig) -> Vec<NaiveTime> {
    let step = Duration::minutes(i64::from(config.slot_minutes));
    let mut slots = Vec::new();
    let mut current = config.work_start;
    while current < config.work_end {
        if !in_lunch(config, current) {
            slots.push(current);
        }
        let (next, wrapped) = current.overflowing_add_signed(step);
        if wrapped != 0 || next <= current {
            break;
        }
        current = next;
    }
    slots
}

fn in_lunch(config: &SchedulerConfig, time: NaiveTime) -> bool {
    config.lunch_start <= time && time < config.lunch_end
}

/// Date checks in order: past, horizon, weekday.
pub fn validate_date(
    config: &SchedulerConfig,
    today: NaiveDate,
    date: NaiveDate,
) -> Result<(), SchedulerError> {
    if date <= today {
        return Err(SchedulerError::PastDate);
    }
    if date > today + Duration::days(config.horizon_days) {
        return Err(SchedulerError::TooFar);
    }
    if config.weekdays_only && matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
        return Err(SchedulerError::NonWorkingDay);
    }
    Ok(())
}

/// Time checks in order: working hours and lunch, then grid alignment.
pub fn validate_time(config: &SchedulerConfig, time: NaiveTime) -> Result<(), SchedulerError> {
    if time < config.work_start || time >= config.work_end || in_lunch(config, time) {
        return Err(SchedulerError::OutsideHours);
    }
    let offset = time.signed_duration_since(config.work_start);
    let aligned = time.nanosecond() == 0
        && offset.num_seconds() % (i64::from(config.slot_minutes) * 60) == 0;
    if !aligned {
        return Err(SchedulerError::BadAlignment);
    }
    Ok(())
}

/// Full slot validation in the documented order.
pub fn validate_slot(
    config: &SchedulerConfig,
    today: NaiveDate,
    date: NaiveDate,
    time: NaiveTime,
) -> Result<(), SchedulerError> {
    validate_date(config, today, date)?;
    validate_time(config, time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_default_grid() {
        let grid = slot_grid(&SchedulerConfig::default());
        assert_eq!(grid.first(), Some(&t(8, 0)));
        assert_eq!(grid.last(), Some(&t(16, 40)));
        assert!(grid.contains(&t(11, 40)));
        assert!(!grid.contains(&t(12, 0)));
        assert!(!grid.contains(&t(12, 40)));
        assert!(grid.contains(&t(13, 0)));

        let morning = grid.iter().filter(|s| **s < t(12, 0)).count();
        assert_eq!(morning, 12);
        assert_eq!(grid.len(), 24);
    }

    #[test]
    fn test_date_rules() {
        let config = SchedulerConfig::default();
        // Monday 2025-03-03
        let today = d(2025, 3, 3);
        assert_eq!(validate_date(&config, today, today), Err(SchedulerError::PastDate));
        assert_eq!(
            validate_date(&config, today, d(2025, 3, 1)),
            Err(SchedulerError::PastDate)
        );
        assert_eq!(
            validate_date(&config, today, d(2025, 4, 3)),
            Err(SchedulerError::TooFar)
        );
        assert_eq!(
            validate_date(&config, today, d(2025, 3, 8)),
            Err(SchedulerError::NonWorkingDay)
        );
        assert!(validate_date(&config, today, d(2025, 3, 10)).is_ok());
        // Exactly at the horizon is allowed
        assert!(validate_date(&config, today, d(2025, 4, 2)).is_ok());
    }

    #[test]
    fn test_time_rules() {
        let config = SchedulerConfig::default();
        assert_eq!(validate_time(&config, t(9, 15)), Err(SchedulerError::BadAlignment));
        assert_eq!(validate_time(&config, t(12, 20)), Err(SchedulerError::OutsideHours));
        assert_eq!(validate_time(&config, t(7, 40)), Err(SchedulerError::OutsideHours));
        assert_eq!(validate_time(&config, t(17, 0)), Err(SchedulerError::OutsideHours));
        assert_eq!(
            validate_time(&config, NaiveTime::from_hms_opt(9, 0, 30).unwrap()),
            Err(SchedulerError::BadAlignment)
        );
        assert!(validate_time(&config, t(9, 20)).is_ok());
        assert!(validate_time(&config, t(13, 0)).is_ok());
    }

    #[test]
    fn test_past_date_checked_before_time() {
        let config = SchedulerConfig::default();
        let today = d(2025, 3, 3);
        assert_eq!(
            validate_slot(&config, today, d(2025, 3, 1), t(9, 15)),
            Err(SchedulerError::PastDate)
        );
    }

    proptest! {
        /// A time validates iff it is on the generated grid.
        #[test]
        fn prop_grid_matches_validation(minute in 0u32..(24 * 60)) {
            let config = SchedulerConfig::default();
            let time = NaiveTime::from_hms_opt(minute / 60, minute % 60, 0).unwrap();
            let on_grid = slot_grid(&config).contains(&time);
            prop_assert_eq!(validate_time(&config, time).is_ok(), on_grid);
        }

        /// Every grid slot lies inside working hours and outside lunch.
        #[test]
        fn prop_grid_within_hours(slot_minutes in prop::sample::select(vec![10u32, 15, 20, 30, 60])) {
            let config = SchedulerConfig { slot_minutes, ..SchedulerConfig::default() };
            for slot in slot_grid(&config) {
                prop_assert!(slot >= config.work_start && slot < config.work_end);
                prop_assert!(!(config.lunch_start <= slot && slot < config.lunch_end));
            }
        }
    }
}
