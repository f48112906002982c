//! Academic calendar: years, semesters and the current-year selection.

mod cache;

pub use cache::CurrentYearCache;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::context::ServiceContext;
use crate::error::{PortalError, PortalResult, ValidationError};
use crate::identity;
use crate::models::{AcademicYear, AcademicYearInput, Semester, User};

/// Academic calendar service.
pub struct AcademicCalendar<'a> {
    ctx: ServiceContext<'a>,
}

impl<'a> AcademicCalendar<'a> {
    pub fn new(ctx: ServiceContext<'a>) -> Self {
        Self { ctx }
    }

    /// The current academic year.
    ///
    /// Fails with `NotConfigured` when no year has been activated.
    pub fn get_current(&self) -> PortalResult<AcademicYear> {
        self.ctx.current_year.get_or_load(self.ctx.db)
    }

    /// Current year and the semester of today (or the next one when
    /// today falls between terms).
    pub fn current_term(&self) -> PortalResult<(AcademicYear, Semester)> {
        let year = self.get_current()?;
        let semester = year.semester_or_next(self.ctx.clock.today());
        Ok((year, semester))
    }

    /// Make `year_id` the only current year.
    pub fn activate(&self, caller: &User, year_id: i64) -> PortalResult<AcademicYear> {
        identity::require_admin(caller)?;

        let now = self.ctx.stamp();
        let year = self.ctx.write("activate_year", |db| {
            if !db.set_current_year(year_id, &now)? {
                return Err(PortalError::not_found("academic_year", year_id));
            }
            db.get_year(year_id)?
                .ok_or_else(|| PortalError::not_found("academic_year", year_id))
        })?;
        self.ctx.current_year.invalidate();

        info!(year_id, label = %year.label, "academic year activated");
        Ok(year)
    }

    pub fn create_year(&self, caller: &User, input: &AcademicYearInput) -> PortalResult<AcademicYear> {
        identity::require_admin(caller)?;
        validate_year(input)?;

        let now = self.ctx.stamp();
        let year = self.ctx.write("create_year", |db| {
            let id = db.insert_year(input, &now)?;
            db.get_year(id)?
                .ok_or_else(|| PortalError::not_found("academic_year", id))
        })?;

        info!(year_id = year.id, label = %year.label, "academic year created");
        Ok(year)
    }

    pub fn update_year(
        &self,
        caller: &User,
        year_id: i64,
        input: &AcademicYearInput,
    ) -> PortalResult<AcademicYear> {
        identity::require_admin(caller)?;
        validate_year(input)?;

        let now = self.ctx.stamp();
        let year = self.ctx.write("update_year", |db| {
            if !db.update_year(year_id, input, &now)? {
                return Err(PortalError::not_found("academic_year", year_id));
            }
            db.get_year(year_id)?
                .ok_or_else(|| PortalError::not_found("academic_year", year_id))
        })?;
        if year.is_current {
            self.ctx.current_year.invalidate();
        }

        info!(year_id, "academic year updated");
        Ok(year)
    }

    pub fn get_year(&self, caller: &User, year_id: i64) -> PortalResult<AcademicYear> {
        identity::require_admin(caller)?;
        self.ctx
            .db
            .get_year(year_id)?
            .ok_or_else(|| PortalError::not_found("academic_year", year_id))
    }

    pub fn list_years(&self, caller: &User) -> PortalResult<Vec<AcademicYear>> {
        identity::require_admin(caller)?;
        Ok(self.ctx.db.list_years()?)
    }
}

/// Pure semester lookup.
pub fn semester_of(year: &AcademicYear, date: NaiveDate) -> Option<Semester> {
    year.semester_of(date)
}

/// Check `first.end < second.start <= second.end < summer.start <= summer.end`
/// and that the year range covers all three semesters.
pub fn validate_year(input: &AcademicYearInput) -> Result<(), ValidationError> {
    if input.label.trim().is_empty() {
        return Err(ValidationError::MissingField {
            field: "label".into(),
        });
    }

    let first = input.first_semester;
    let second = input.second_semester;
    let summer = input.summer;

    let ordered = input.start <= first.start
        && first.start <= first.end
        && first.end < second.start
        && second.start <= second.end
        && second.end < summer.start
        && summer.start <= summer.end
        && summer.end <= input.end;

    if !ordered {
        warn!(label = %input.label, "rejected academic year with overlapping ranges");
        return Err(ValidationError::InconsistentDates(format!(
            "semesters of {} must be ordered and disjoint within {}..{}",
            input.label, input.start, input.end
        )));
    }
    Ok(())
}
