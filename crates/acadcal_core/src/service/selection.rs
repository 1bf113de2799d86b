//! Session-scoped term selection and tenant current-term promotion.
//!
//! # Responsibility
//! - Track which term one viewing session is looking at.
//! - Resolve a default selection from a year's ordered terms, or from
//!   everything the tenant has stored.
//! - Move the tenant's persisted current flag through the store.
//!
//! # Invariants
//! - An explicit selection is never replaced by a default.
//! - Selection is view state; changing it never writes to storage.
//! - Promotion is clear-then-set. A gap between the two steps is re-run once
//!   before it is reported as `TransientCurrentInconsistency`.

use crate::fallback::estimate_fallback_term;
use crate::model::{Term, TermId, YearId};
use crate::repo::calendar_repo::CalendarRepository;
use crate::service::calendar_store::{CalendarStore, Promotion, StoreError};
use chrono::NaiveDate;
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Selection state of one viewing session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SelectionState {
    /// Nothing resolved yet.
    #[default]
    Unselected,
    Selected(Term),
    /// Default resolution found no terms; show the fallback label instead.
    NoDataAvailable,
}

/// Errors from selection and promotion operations.
#[derive(Debug)]
pub enum SelectionError {
    TermNotFound(TermId),
    /// Previous current term was cleared, the new one could not be set even
    /// after a repair attempt. The tenant has no current term.
    TransientCurrentInconsistency { term_id: TermId, source: StoreError },
    Store(StoreError),
}

impl Display for SelectionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TermNotFound(id) => write!(f, "term not found: {id}"),
            Self::TransientCurrentInconsistency { term_id, source } => write!(
                f,
                "tenant has no current term after failing to promote {term_id}: {source}"
            ),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SelectionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::TermNotFound(_) => None,
            Self::TransientCurrentInconsistency { source, .. } => Some(source),
            Self::Store(err) => Some(err),
        }
    }
}

impl From<StoreError> for SelectionError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::TermNotFound(id) => Self::TermNotFound(id),
            other => Self::Store(other),
        }
    }
}

/// Tracks the selected term of one session.
#[derive(Debug, Clone, Default)]
pub struct CurrentSelectionCoordinator {
    state: SelectionState,
}

impl CurrentSelectionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    /// Returns the in-session selection, if any.
    pub fn get_selected_term(&self) -> Option<&Term> {
        match &self.state {
            SelectionState::Selected(term) => Some(term),
            SelectionState::Unselected | SelectionState::NoDataAvailable => None,
        }
    }

    /// Records an explicit user choice.
    pub fn set_selected_term(&mut self, term: Term) {
        self.state = SelectionState::Selected(term);
    }

    pub fn clear_selection(&mut self) {
        self.state = SelectionState::Unselected;
    }

    /// Picks a default from `terms` unless a term is already selected.
    ///
    /// Prefers the term flagged current, then the first term in the given
    /// order. An empty slice moves to `NoDataAvailable`.
    pub fn resolve_default_selection(&mut self, terms: &[Term]) -> Option<&Term> {
        if !matches!(self.state, SelectionState::Selected(_)) {
            self.state = match terms
                .iter()
                .find(|term| term.is_current)
                .or_else(|| terms.first())
            {
                Some(term) => SelectionState::Selected(term.clone()),
                None => SelectionState::NoDataAvailable,
            };
        }
        self.get_selected_term()
    }

    /// Resolves a default selection from the tenant's stored calendar.
    ///
    /// Candidate lists are tried in order: the terms of the year owning the
    /// tenant's current term, the active year's terms, then each year's
    /// terms latest first. The first non-empty list goes through
    /// `resolve_default_selection`. `NoDataAvailable` is reached only when
    /// the tenant has no terms at all.
    pub fn resolve_from_store<R: CalendarRepository>(
        &mut self,
        store: &CalendarStore<R>,
    ) -> Result<Option<&Term>, SelectionError> {
        let terms = default_candidates(store)?;
        Ok(self.resolve_default_selection(&terms))
    }

    /// Label for "which term is this session on".
    ///
    /// Falls back to the month-based estimate whenever no real term is
    /// selected.
    pub fn display_label(&self, today: NaiveDate) -> String {
        match &self.state {
            SelectionState::Selected(term) => term.name.clone(),
            SelectionState::Unselected | SelectionState::NoDataAvailable => {
                estimate_fallback_term(today)
            }
        }
    }

    /// Drops the selection when it points at a deleted term.
    pub fn forget_term(&mut self, term_id: TermId) {
        if self.get_selected_term().is_some_and(|term| term.id == term_id) {
            self.state = SelectionState::Unselected;
        }
    }

    /// Drops the selection when it belongs to a deleted year.
    pub fn forget_year(&mut self, year_id: YearId) {
        if self
            .get_selected_term()
            .is_some_and(|term| term.academic_year_id == year_id)
        {
            self.state = SelectionState::Unselected;
        }
    }

    /// Persisted tenant current term, independent of this session.
    pub fn current_term<R: CalendarRepository>(
        &self,
        store: &CalendarStore<R>,
    ) -> Result<Option<Term>, SelectionError> {
        store.current_term().map_err(Into::into)
    }

    /// Makes `term_id` the tenant's only current term.
    ///
    /// Idempotent for a term that already holds the flag. The session
    /// selection is not changed, only its copy of the current flags.
    pub fn promote_to_current<R: CalendarRepository>(
        &mut self,
        store: &mut CalendarStore<R>,
        term_id: TermId,
    ) -> Result<Term, SelectionError> {
        match store.promote_term(term_id) {
            Ok(promotion) => Ok(self.apply_promotion(promotion)),
            Err(StoreError::CurrentTermCleared { source, .. }) => {
                warn!(
                    "event=current_term_swap module=selection status=warn term_id={term_id} error_code=set_after_clear_failed error={source}"
                );
                self.reconcile_current_term(store, term_id)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Re-runs the clear/set sequence for `term_id`.
    ///
    /// Used to repair a promotion that stopped between its two steps. Safe
    /// to call when nothing is broken.
    pub fn reconcile_current_term<R: CalendarRepository>(
        &mut self,
        store: &mut CalendarStore<R>,
        term_id: TermId,
    ) -> Result<Term, SelectionError> {
        match store.promote_term(term_id) {
            Ok(promotion) => {
                info!("event=current_term_reconcile module=selection status=ok term_id={term_id}");
                Ok(self.apply_promotion(promotion))
            }
            Err(StoreError::TermNotFound(id)) => Err(SelectionError::TermNotFound(id)),
            Err(err) => {
                error!(
                    "event=current_term_reconcile module=selection status=error term_id={term_id} error={err}"
                );
                Err(SelectionError::TransientCurrentInconsistency {
                    term_id,
                    source: err,
                })
            }
        }
    }

    fn apply_promotion(&mut self, promotion: Promotion) -> Term {
        let current = promotion.term().clone();
        if let SelectionState::Selected(selected) = &mut self.state {
            selected.is_current = selected.id == current.id;
        }
        current
    }
}

fn default_candidates<R: CalendarRepository>(
    store: &CalendarStore<R>,
) -> Result<Vec<Term>, StoreError> {
    if let Some(current) = store.current_term()? {
        return store.list_terms_for_year(current.academic_year_id);
    }
    if let Some(year) = store.active_academic_year()? {
        let terms = store.list_terms_for_year(year.id)?;
        if !terms.is_empty() {
            return Ok(terms);
        }
    }
    for year in store.list_academic_years()? {
        let terms = store.list_terms_for_year(year.id)?;
        if !terms.is_empty() {
            return Ok(terms);
        }
    }
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::{CurrentSelectionCoordinator, SelectionState};
    use crate::model::Term;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn term(name: &str, start_month: u32, is_current: bool) -> Term {
        let mut term = Term::new(
            name,
            date(2024, start_month, 1),
            date(2024, start_month + 2, 1),
            Uuid::nil(),
        );
        term.is_current = is_current;
        term
    }

    #[test]
    fn default_prefers_current_term() {
        let terms = vec![term("Term 1", 1, false), term("Term 2", 4, true)];
        let mut coordinator = CurrentSelectionCoordinator::new();
        let selected = coordinator.resolve_default_selection(&terms).unwrap();
        assert_eq!(selected.name, "Term 2");
    }

    #[test]
    fn default_falls_back_to_first_term() {
        let terms = vec![term("Term 1", 1, false), term("Term 2", 4, false)];
        let mut coordinator = CurrentSelectionCoordinator::new();
        assert_eq!(
            coordinator.resolve_default_selection(&terms).unwrap().name,
            "Term 1"
        );
    }

    #[test]
    fn empty_terms_yield_no_data_and_fallback_label() {
        let mut coordinator = CurrentSelectionCoordinator::new();
        assert!(coordinator.resolve_default_selection(&[]).is_none());
        assert_eq!(coordinator.state(), &SelectionState::NoDataAvailable);
        assert!(coordinator.get_selected_term().is_none());
        assert_eq!(coordinator.display_label(date(2024, 3, 15)), "Term 1, 2024");
    }

    #[test]
    fn explicit_selection_wins_over_defaults() {
        let browsing = term("Old term", 1, false);
        let terms = vec![term("Term 2", 4, true)];
        let mut coordinator = CurrentSelectionCoordinator::new();
        coordinator.set_selected_term(browsing.clone());

        let selected = coordinator.resolve_default_selection(&terms).unwrap();
        assert_eq!(selected.id, browsing.id);
        assert_eq!(coordinator.display_label(date(2024, 3, 15)), "Old term");
    }

    #[test]
    fn forgetting_selected_records_returns_to_unselected() {
        let chosen = term("Term 1", 1, false);
        let mut coordinator = CurrentSelectionCoordinator::new();

        coordinator.set_selected_term(chosen.clone());
        coordinator.forget_term(Uuid::new_v4());
        assert!(coordinator.get_selected_term().is_some());
        coordinator.forget_term(chosen.id);
        assert_eq!(coordinator.state(), &SelectionState::Unselected);

        coordinator.set_selected_term(chosen.clone());
        coordinator.forget_year(chosen.academic_year_id);
        assert_eq!(coordinator.state(), &SelectionState::Unselected);
    }
}
