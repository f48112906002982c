//! Academic calendar models.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Semester tag derived from a date inside an academic year.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Semester {
    First,
    Second,
    Summer,
}

impl Semester {
    pub const ALL: [Semester; 3] = [Semester::First, Semester::Second, Semester::Summer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Semester::First => "first",
            Semester::Second => "second",
            Semester::Summer => "summer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "first" => Some(Semester::First),
            "second" => Some(Semester::Second),
            "summer" => Some(Semester::Summer),
            _ => None,
        }
    }
}

/// Inclusive date range.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Input for creating or updating an academic year.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AcademicYearInput {
    /// Display label, e.g. "2024-2025"
    pub label: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub first_semester: DateRange,
    pub second_semester: DateRange,
    pub summer: DateRange,
}

/// A labelled academic year containing three semesters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AcademicYear {
    pub id: i64,
    pub label: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub first_semester: DateRange,
    pub second_semester: DateRange,
    pub summer: DateRange,
    /// At most one year is current at any time
    pub is_current: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl AcademicYear {
    /// Look up which semester a date falls in. Pure; does not touch storage.
    pub fn semester_of(&self, date: NaiveDate) -> Option<Semester> {
        if self.first_semester.contains(date) {
            Some(Semester::First)
        } else if self.second_semester.contains(date) {
            Some(Semester::Second)
        } else if self.summer.contains(date) {
            Some(Semester::Summer)
        } else {
            None
        }
    }

    pub fn range_of(&self, semester: Semester) -> DateRange {
        match semester {
            Semester::First => self.first_semester,
            Semester::Second => self.second_semester,
            Semester::Summer => self.summer,
        }
    }

    /// Semester for `date`, or the nearest upcoming one when `date` falls
    /// between terms. Dates after the summer term map to summer.
    pub fn semester_or_next(&self, date: NaiveDate) -> Semester {
        if let Some(semester) = self.semester_of(date) {
            return semester;
        }
        Semester::ALL
            .into_iter()
            .find(|s| date < self.range_of(*s).start)
            .unwrap_or(Semester::Summer)
    }
}
