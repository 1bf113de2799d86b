//! Month-based term label shown when a tenant has no terms yet.
//!
//! The label is a display guess. It must never be persisted or treated as a
//! real `Term` record.

use chrono::{Datelike, NaiveDate};

/// Estimates a human-readable term label for `today`.
///
/// Jan-Mar map to term 1, Apr-Jul to term 2, Aug-Nov to term 3, and
/// December rolls over to term 1 of the following year.
pub fn estimate_fallback_term(today: NaiveDate) -> String {
    let year = today.year();
    let (term_number, label_year) = match today.month() {
        1..=3 => (1, year),
        4..=7 => (2, year),
        8..=11 => (3, year),
        _ => (1, year + 1),
    };
    format!("Term {term_number}, {label_year}")
}
