//! Academic calendar domain model.
//!
//! # Responsibility
//! - Define the canonical Academic Year and Term records.
//! - Keep the ownership relation (year owns terms) explicit in types.
//!
//! # Invariants
//! - Every record is identified by a stable UUID assigned at creation.
//! - A term refers to its year by id only; it never holds the year itself.
//! - Records are hard-deleted; there is no tombstone state.

pub mod academic_year;
pub mod term;

pub use academic_year::{AcademicYear, YearId};
pub use term::{Term, TermId};

/// Which side of the year/term hierarchy a record belongs to.
///
/// Carried by range and lookup errors so callers can tell whether the year
/// or the term is at fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalendarEntity {
    AcademicYear,
    Term,
}
