//! Term record.

use super::academic_year::YearId;
use crate::validation::DateRange;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier of a Term.
pub type TermId = Uuid;

/// Sub-period of an Academic Year.
///
/// `academic_year_id` is fixed at creation. Moving a term to another year
/// means deleting it and creating a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    pub id: TermId,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub academic_year_id: YearId,
    /// Advisory, scoped to the term.
    pub is_active: bool,
    /// Tenant-wide exclusive flag; at most one term per tenant holds it.
    pub is_current: bool,
}

impl Term {
    /// Creates a non-current, inactive term owned by `academic_year_id`.
    pub fn new(
        name: impl Into<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
        academic_year_id: YearId,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            start_date,
            end_date,
            academic_year_id,
            is_active: false,
            is_current: false,
        }
    }

    /// Returns the stored date bounds.
    pub fn range(&self) -> DateRange {
        DateRange::new(self.start_date, self.end_date)
    }
}
