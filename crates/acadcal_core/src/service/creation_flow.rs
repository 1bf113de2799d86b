//! Two-step "new year, then maybe its first term" creation flow.
//!
//! # Invariants
//! - The flow only offers a term prompt; it never creates a term on its own.
//! - Resting states are `Idle` and `TermPromptShown`. Every other state is
//!   reported as a transition and immediately left.
//! - A failed term creation keeps the prompt open so input can be fixed.
//! - A year is offered at most once per flow, and only while it owns no
//!   terms in the store.

use crate::model::{AcademicYear, Term, YearId};
use crate::repo::calendar_repo::CalendarRepository;
use crate::service::calendar_store::{CalendarEvent, CalendarStore, StoreError};
use crate::validation::DateRange;
use chrono::NaiveDate;
use log::info;
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// States of the cascading creation flow, also used as transition events.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FlowState {
    #[default]
    Idle,
    YearCreated(AcademicYear),
    /// Caller should render a "create the first term?" prompt for this year.
    TermPromptShown(AcademicYear),
    TermCreated(Term),
    Skipped(AcademicYear),
}

/// Errors from flow operations.
#[derive(Debug)]
pub enum FlowError {
    /// Accept/decline called while no prompt is open.
    NoPendingPrompt,
    Store(StoreError),
}

impl Display for FlowError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoPendingPrompt => write!(f, "no term prompt is pending"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for FlowError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::NoPendingPrompt => None,
            Self::Store(err) => Some(err),
        }
    }
}

impl From<StoreError> for FlowError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Cascading creation state machine shared by every "new year" entry point.
#[derive(Debug, Clone, Default)]
pub struct CascadingCreationFlow {
    state: FlowState,
    /// Years this flow already reacted to, by any entry point.
    handled_years: HashSet<YearId>,
}

impl CascadingCreationFlow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &FlowState {
        &self.state
    }

    /// Year the open prompt is about, if any.
    pub fn pending_year(&self) -> Option<&AcademicYear> {
        match &self.state {
            FlowState::TermPromptShown(year) => Some(year),
            _ => None,
        }
    }

    /// Bounds to pre-fill the term form with.
    pub fn prompt_bounds(&self) -> Option<DateRange> {
        self.pending_year().map(AcademicYear::range)
    }

    /// Creates a year through the store and opens the term prompt.
    ///
    /// Returns the created year and the transitions the flow went through.
    pub fn create_year<R: CalendarRepository>(
        &mut self,
        store: &mut CalendarStore<R>,
        name: impl Into<String>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<(AcademicYear, Vec<FlowState>), StoreError> {
        let year = store.create_academic_year(name, start, end)?;
        let transitions = self.on_year_created(&year, 0);
        Ok((year, transitions))
    }

    /// Feeds a drained store event into the flow.
    ///
    /// Only `YearCreated` moves the flow, and only for a year this flow has
    /// not handled yet that still exists and owns no terms. The term count
    /// is read from `store`, since the event may be older than later writes.
    pub fn observe<R: CalendarRepository>(
        &mut self,
        store: &CalendarStore<R>,
        event: &CalendarEvent,
    ) -> Result<Vec<FlowState>, StoreError> {
        let CalendarEvent::YearCreated { year, .. } = event else {
            return Ok(Vec::new());
        };
        if self.handled_years.contains(&year.id) {
            return Ok(Vec::new());
        }
        let year = match store.get_academic_year(year.id)? {
            Some(year) => year,
            None => return Ok(Vec::new()),
        };
        let term_count = store.list_terms_for_year(year.id)?.len();
        Ok(self.on_year_created(&year, term_count))
    }

    /// Accepts the prompt by creating the year's first term.
    pub fn accept<R: CalendarRepository>(
        &mut self,
        store: &mut CalendarStore<R>,
        name: impl Into<String>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<(Term, Vec<FlowState>), FlowError> {
        let year_id = self.pending_year().ok_or(FlowError::NoPendingPrompt)?.id;
        let term = store.create_term(name, start, end, year_id)?;

        info!("event=creation_flow module=flow status=ok outcome=term_created year_id={year_id}");
        self.state = FlowState::Idle;
        Ok((term.clone(), vec![FlowState::TermCreated(term), FlowState::Idle]))
    }

    /// Declines the prompt; the year keeps zero terms.
    pub fn decline(&mut self) -> Result<Vec<FlowState>, FlowError> {
        let year = self.pending_year().cloned().ok_or(FlowError::NoPendingPrompt)?;
        info!(
            "event=creation_flow module=flow status=ok outcome=skipped year_id={}",
            year.id
        );
        self.state = FlowState::Idle;
        Ok(vec![FlowState::Skipped(year), FlowState::Idle])
    }

    fn on_year_created(&mut self, year: &AcademicYear, term_count: usize) -> Vec<FlowState> {
        self.handled_years.insert(year.id);
        let mut transitions = Vec::new();
        if term_count > 0 {
            return transitions;
        }
        // A newer year supersedes a prompt that was never answered.
        if let Some(previous) = self.pending_year().cloned() {
            transitions.push(FlowState::Skipped(previous));
            transitions.push(FlowState::Idle);
        }
        transitions.push(FlowState::YearCreated(year.clone()));
        transitions.push(FlowState::TermPromptShown(year.clone()));
        self.state = FlowState::TermPromptShown(year.clone());
        transitions
    }
}

#[cfg(test)]
mod tests {
    use super::{CascadingCreationFlow, FlowError, FlowState};
    use crate::db::open_db_in_memory;
    use crate::repo::calendar_repo::SqliteCalendarRepository;
    use crate::service::calendar_store::{CalendarEvent, CalendarStore};
    use chrono::NaiveDate;
    use rusqlite::Connection;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn store(conn: &Connection) -> CalendarStore<SqliteCalendarRepository<'_>> {
        CalendarStore::new(SqliteCalendarRepository::try_new(conn, "tenant-a").unwrap())
    }

    fn created_event<R: crate::CalendarRepository>(
        store: &mut CalendarStore<R>,
        name: &str,
    ) -> CalendarEvent {
        store
            .create_academic_year(name, date(2024, 1, 1), date(2024, 12, 1))
            .unwrap();
        store.take_events().pop().unwrap()
    }

    #[test]
    fn year_created_event_opens_prompt() {
        let conn = open_db_in_memory().unwrap();
        let mut store = store(&conn);
        let event = created_event(&mut store, "2024-2025");
        let CalendarEvent::YearCreated { year: created, .. } = event.clone() else {
            panic!("unexpected event: {event:?}");
        };

        let mut flow = CascadingCreationFlow::new();
        let transitions = flow.observe(&store, &event).unwrap();
        assert_eq!(
            transitions,
            vec![
                FlowState::YearCreated(created.clone()),
                FlowState::TermPromptShown(created.clone()),
            ]
        );
        assert_eq!(flow.pending_year(), Some(&created));
        assert_eq!(flow.prompt_bounds(), Some(created.range()));
    }

    #[test]
    fn year_that_gained_terms_does_not_prompt() {
        let conn = open_db_in_memory().unwrap();
        let mut store = store(&conn);
        let event = created_event(&mut store, "2024-2025");
        let CalendarEvent::YearCreated { year, .. } = &event else {
            panic!("unexpected event: {event:?}");
        };
        store
            .create_term("Term 1", date(2024, 1, 1), date(2024, 4, 1), year.id)
            .unwrap();

        let mut flow = CascadingCreationFlow::new();
        assert!(flow.observe(&store, &event).unwrap().is_empty());
        assert_eq!(flow.state(), &FlowState::Idle);
    }

    #[test]
    fn decline_returns_to_idle() {
        let conn = open_db_in_memory().unwrap();
        let mut store = store(&conn);
        let mut flow = CascadingCreationFlow::new();
        let (created, _) = flow
            .create_year(&mut store, "2024-2025", date(2024, 1, 1), date(2024, 12, 1))
            .unwrap();

        let transitions = flow.decline().unwrap();
        assert_eq!(transitions, vec![FlowState::Skipped(created), FlowState::Idle]);
        assert_eq!(flow.state(), &FlowState::Idle);
        assert!(matches!(flow.decline(), Err(FlowError::NoPendingPrompt)));
    }

    #[test]
    fn newer_year_supersedes_open_prompt() {
        let conn = open_db_in_memory().unwrap();
        let mut store = store(&conn);
        let mut flow = CascadingCreationFlow::new();
        let (first, _) = flow
            .create_year(&mut store, "first", date(2024, 1, 1), date(2024, 12, 1))
            .unwrap();
        let (second, transitions) = flow
            .create_year(&mut store, "second", date(2025, 1, 1), date(2025, 12, 1))
            .unwrap();

        assert_eq!(transitions[0], FlowState::Skipped(first));
        assert_eq!(flow.pending_year(), Some(&second));
    }
}
