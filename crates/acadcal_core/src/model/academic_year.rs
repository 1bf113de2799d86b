//! Academic Year record.

use crate::validation::DateRange;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier of an Academic Year.
pub type YearId = Uuid;

/// Top-level calendar container owning zero or more terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcademicYear {
    pub id: YearId,
    /// Free-text label such as `2024-2025`.
    pub name: String,
    /// Inclusive first day. Always strictly before `end_date`.
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Advisory marker for the tenant's operative year. Several years may
    /// carry it at once; readers pick one deterministically.
    pub is_active: bool,
}

impl AcademicYear {
    /// Creates an inactive year with a freshly generated id.
    ///
    /// Does not validate the date range; the store does that before
    /// anything is persisted.
    pub fn new(name: impl Into<String>, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            start_date,
            end_date,
            is_active: false,
        }
    }

    /// Returns the stored date bounds.
    pub fn range(&self) -> DateRange {
        DateRange::new(self.start_date, self.end_date)
    }
}
