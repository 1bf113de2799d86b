//! Persistence boundary for academic calendar records.
//!
//! # Responsibility
//! - Define the storage contract consumed by the calendar store.
//! - Isolate SQLite query details from validation and orchestration.
//!
//! # Invariants
//! - A repository instance is bound to one tenant; no query crosses tenants.
//! - Repositories do not validate calendar rules; the store does, before any
//!   write reaches them.
//! - Missing rows surface as semantic not-found errors, not silent no-ops.

pub mod calendar_repo;
