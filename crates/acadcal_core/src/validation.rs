//! Date-range and nesting rules for Academic Years and Terms.
//!
//! # Responsibility
//! - Check `start < end` for years and terms in isolation.
//! - Check that a term's range lies inside its owning year's range.
//!
//! # Invariants
//! - Every function here is pure: no clock, no storage, no shared state.
//! - Nesting checks report every violated boundary, not only the first.

use crate::model::CalendarEntity;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Closed calendar interval `[start, end]`.
///
/// Construction does not validate ordering; use the `validate_*` functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// `true` when `start < end`.
    pub fn is_ordered(&self) -> bool {
        self.start < self.end
    }

    /// `true` when `other` lies fully inside `self`, bounds included.
    pub fn contains_range(&self, other: &DateRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl Display for DateRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// A year or term whose start is not strictly before its end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeError {
    pub entity: CalendarEntity,
    pub range: DateRange,
}

impl Display for RangeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self.entity {
            CalendarEntity::AcademicYear => "academic year",
            CalendarEntity::Term => "term",
        };
        write!(
            f,
            "{label} start date {} must be before end date {}",
            self.range.start, self.range.end
        )
    }
}

impl Error for RangeError {}

/// One violated boundary of the term-inside-year rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NestingReason {
    /// Term start is not before term end.
    InvalidTermRange,
    /// Term starts before its year starts.
    StartsBeforeYear,
    /// Term ends after its year ends.
    EndsAfterYear,
}

/// A term range that escapes its owning year.
///
/// `reasons` is never empty and keeps check order: term range, start
/// bound, end bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestingViolation {
    pub term: DateRange,
    pub year: DateRange,
    pub reasons: Vec<NestingReason>,
}

impl NestingViolation {
    pub fn has(&self, reason: NestingReason) -> bool {
        self.reasons.contains(&reason)
    }

    /// `true` when the term range is malformed but otherwise inside the year.
    pub fn is_range_only(&self) -> bool {
        self.reasons == [NestingReason::InvalidTermRange]
    }
}

impl Display for NestingViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "term {} does not fit academic year {}:", self.term, self.year)?;
        for reason in &self.reasons {
            let text = match reason {
                NestingReason::InvalidTermRange => "term start must be before term end",
                NestingReason::StartsBeforeYear => "term starts before the academic year",
                NestingReason::EndsAfterYear => "term ends after the academic year",
            };
            write!(f, " {text};")?;
        }
        Ok(())
    }
}

impl Error for NestingViolation {}

/// Fails when `start >= end` for an Academic Year.
pub fn validate_year_range(start: NaiveDate, end: NaiveDate) -> Result<(), RangeError> {
    validate_range(CalendarEntity::AcademicYear, DateRange::new(start, end))
}

/// Fails when `start >= end` for a Term, regardless of its year.
pub fn validate_term_range(start: NaiveDate, end: NaiveDate) -> Result<(), RangeError> {
    validate_range(CalendarEntity::Term, DateRange::new(start, end))
}

/// Checks that `term` is well-formed and lies inside `year`.
///
/// All three checks always run so callers can present every violation at
/// once.
pub fn validate_term_nesting(term: DateRange, year: DateRange) -> Result<(), NestingViolation> {
    if term.is_ordered() && year.contains_range(&term) {
        return Ok(());
    }

    let mut reasons = Vec::new();
    if !term.is_ordered() {
        reasons.push(NestingReason::InvalidTermRange);
    }
    if term.start < year.start {
        reasons.push(NestingReason::StartsBeforeYear);
    }
    if term.end > year.end {
        reasons.push(NestingReason::EndsAfterYear);
    }

    Err(NestingViolation {
        term,
        year,
        reasons,
    })
}

fn validate_range(entity: CalendarEntity, range: DateRange) -> Result<(), RangeError> {
    if range.is_ordered() {
        Ok(())
    } else {
        Err(RangeError { entity, range })
    }
}
