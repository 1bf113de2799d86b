//! Calendar use-case services.
//!
//! # Responsibility
//! - Orchestrate validation and repository calls into use-case APIs.
//! - Hold session state (selection, creation flow) apart from storage.
//!
//! # Invariants
//! - Services never bypass `CalendarStore` validation to write records.

pub mod calendar_store;
pub mod creation_flow;
pub mod selection;
