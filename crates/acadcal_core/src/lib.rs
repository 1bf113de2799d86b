//! Academic calendar core: years, terms and the current-term contract.
//! This crate is the single source of truth for calendar invariants.

pub mod config;
pub mod db;
pub mod fallback;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod validation;

pub use config::{CalendarConfig, ConfigError, YearEditPolicy};
pub use fallback::estimate_fallback_term;
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::{AcademicYear, CalendarEntity, Term, TermId, YearId};
pub use repo::calendar_repo::{
    CalendarRepository, RepoError, RepoResult, SqliteCalendarRepository,
};
pub use service::calendar_store::{CalendarEvent, CalendarStore, Promotion, StoreError};
pub use service::creation_flow::{CascadingCreationFlow, FlowError, FlowState};
pub use service::selection::{CurrentSelectionCoordinator, SelectionError, SelectionState};
pub use validation::{
    validate_term_nesting, validate_term_range, validate_year_range, DateRange, NestingReason,
    NestingViolation, RangeError,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
