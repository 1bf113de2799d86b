use acadcal_core::db::open_db_in_memory;
use acadcal_core::{
    AcademicYear, CalendarEvent, CalendarRepository, CalendarStore, CurrentSelectionCoordinator,
    RepoError, RepoResult, SelectionError, SelectionState, SqliteCalendarRepository, Term, TermId,
    YearId,
};
use chrono::NaiveDate;
use rusqlite::Connection;
use std::cell::Cell;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Delegates to SQLite but fails the next `failures` set-current calls.
///
/// Keeps the trait's two-step swap so the gap between clear and set is
/// observable.
struct FlakyRepository<'conn> {
    inner: SqliteCalendarRepository<'conn>,
    failures: Cell<u32>,
}

impl<'conn> FlakyRepository<'conn> {
    fn new(conn: &'conn Connection, failures: u32) -> Self {
        Self {
            inner: SqliteCalendarRepository::try_new(conn, "tenant-a").unwrap(),
            failures: Cell::new(failures),
        }
    }
}

impl CalendarRepository for FlakyRepository<'_> {
    fn tenant_id(&self) -> &str {
        self.inner.tenant_id()
    }
    fn insert_year(&self, year: &AcademicYear) -> RepoResult<()> {
        self.inner.insert_year(year)
    }
    fn update_year(&self, year: &AcademicYear) -> RepoResult<()> {
        self.inner.update_year(year)
    }
    fn delete_year(&self, id: YearId) -> RepoResult<()> {
        self.inner.delete_year(id)
    }
    fn get_year(&self, id: YearId) -> RepoResult<Option<AcademicYear>> {
        self.inner.get_year(id)
    }
    fn list_years(&self) -> RepoResult<Vec<AcademicYear>> {
        self.inner.list_years()
    }
    fn active_year(&self) -> RepoResult<Option<AcademicYear>> {
        self.inner.active_year()
    }
    fn insert_term(&self, term: &Term) -> RepoResult<()> {
        self.inner.insert_term(term)
    }
    fn update_term(&self, term: &Term) -> RepoResult<()> {
        self.inner.update_term(term)
    }
    fn delete_term(&self, id: TermId) -> RepoResult<()> {
        self.inner.delete_term(id)
    }
    fn get_term(&self, id: TermId) -> RepoResult<Option<Term>> {
        self.inner.get_term(id)
    }
    fn list_terms_for_year(&self, year_id: YearId) -> RepoResult<Vec<Term>> {
        self.inner.list_terms_for_year(year_id)
    }
    fn count_terms_for_year(&self, year_id: YearId) -> RepoResult<u64> {
        self.inner.count_terms_for_year(year_id)
    }
    fn current_term(&self) -> RepoResult<Option<Term>> {
        self.inner.current_term()
    }
    fn clear_current_term(&self) -> RepoResult<Option<TermId>> {
        self.inner.clear_current_term()
    }
    fn set_current_term(&self, id: TermId) -> RepoResult<()> {
        let remaining = self.failures.get();
        if remaining > 0 {
            self.failures.set(remaining - 1);
            return Err(RepoError::InvalidData("injected set failure".to_string()));
        }
        self.inner.set_current_term(id)
    }
}

fn seed<R: CalendarRepository>(store: &mut CalendarStore<R>) -> (Term, Term) {
    let year = store
        .create_academic_year("2024", date(2024, 1, 1), date(2024, 12, 1))
        .unwrap();
    let first = store
        .create_term("Term 1", date(2024, 1, 1), date(2024, 4, 1), year.id)
        .unwrap();
    let second = store
        .create_term("Term 2", date(2024, 4, 2), date(2024, 7, 31), year.id)
        .unwrap();
    (first, second)
}

fn current_flags<R: CalendarRepository>(store: &CalendarStore<R>, terms: &[&Term]) -> Vec<bool> {
    terms
        .iter()
        .map(|term| store.get_term(term.id).unwrap().unwrap().is_current)
        .collect()
}

#[test]
fn promotion_moves_the_flag_exclusively() {
    let conn = open_db_in_memory().unwrap();
    let mut store =
        CalendarStore::new(SqliteCalendarRepository::try_new(&conn, "tenant-a").unwrap());
    let (first, second) = seed(&mut store);
    let mut coordinator = CurrentSelectionCoordinator::new();

    let current = coordinator.promote_to_current(&mut store, first.id).unwrap();
    assert!(current.is_current);
    assert_eq!(current_flags(&store, &[&first, &second]), vec![true, false]);

    coordinator.promote_to_current(&mut store, second.id).unwrap();
    assert_eq!(current_flags(&store, &[&first, &second]), vec![false, true]);
    assert_eq!(store.current_term().unwrap().unwrap().id, second.id);

    let events: Vec<CalendarEvent> = store
        .take_events()
        .into_iter()
        .filter(|event| matches!(event, CalendarEvent::CurrentTermChanged { .. }))
        .collect();
    assert_eq!(
        events,
        vec![
            CalendarEvent::CurrentTermChanged {
                previous: None,
                current: first.id,
            },
            CalendarEvent::CurrentTermChanged {
                previous: Some(first.id),
                current: second.id,
            },
        ]
    );
}

#[test]
fn promoting_the_current_term_again_changes_nothing() {
    let conn = open_db_in_memory().unwrap();
    let mut store =
        CalendarStore::new(SqliteCalendarRepository::try_new(&conn, "tenant-a").unwrap());
    let (first, second) = seed(&mut store);
    let mut coordinator = CurrentSelectionCoordinator::new();

    coordinator.promote_to_current(&mut store, first.id).unwrap();
    store.take_events();
    let again = coordinator.promote_to_current(&mut store, first.id).unwrap();

    assert_eq!(again.id, first.id);
    assert!(store.take_events().is_empty());
    assert_eq!(current_flags(&store, &[&first, &second]), vec![true, false]);
}

#[test]
fn promotion_updates_the_session_copy_but_not_the_selection() {
    let conn = open_db_in_memory().unwrap();
    let mut store =
        CalendarStore::new(SqliteCalendarRepository::try_new(&conn, "tenant-a").unwrap());
    let (first, second) = seed(&mut store);
    let mut coordinator = CurrentSelectionCoordinator::new();
    coordinator.set_selected_term(first.clone());

    coordinator.promote_to_current(&mut store, second.id).unwrap();
    let selected = coordinator.get_selected_term().unwrap();
    assert_eq!(selected.id, first.id);
    assert!(!selected.is_current);

    coordinator.promote_to_current(&mut store, first.id).unwrap();
    assert!(coordinator.get_selected_term().unwrap().is_current);
}

#[test]
fn promoting_unknown_term_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let mut store =
        CalendarStore::new(SqliteCalendarRepository::try_new(&conn, "tenant-a").unwrap());
    let mut coordinator = CurrentSelectionCoordinator::new();

    let missing = uuid::Uuid::new_v4();
    assert!(matches!(
        coordinator.promote_to_current(&mut store, missing),
        Err(SelectionError::TermNotFound(id)) if id == missing
    ));
}

#[test]
fn failed_set_after_clear_is_repaired_once() {
    let conn = open_db_in_memory().unwrap();
    let mut store = CalendarStore::new(FlakyRepository::new(&conn, 0));
    let (first, second) = seed(&mut store);
    let mut coordinator = CurrentSelectionCoordinator::new();
    coordinator.promote_to_current(&mut store, first.id).unwrap();

    let mut store = CalendarStore::new(FlakyRepository::new(&conn, 1));
    let current = coordinator.promote_to_current(&mut store, second.id).unwrap();

    assert_eq!(current.id, second.id);
    assert_eq!(current_flags(&store, &[&first, &second]), vec![false, true]);
}

#[test]
fn repeated_set_failure_reports_transient_inconsistency() {
    let conn = open_db_in_memory().unwrap();
    let mut store = CalendarStore::new(FlakyRepository::new(&conn, 0));
    let (first, second) = seed(&mut store);
    let mut coordinator = CurrentSelectionCoordinator::new();
    coordinator.promote_to_current(&mut store, first.id).unwrap();

    let mut store = CalendarStore::new(FlakyRepository::new(&conn, 2));
    let err = coordinator
        .promote_to_current(&mut store, second.id)
        .unwrap_err();
    assert!(matches!(
        err,
        SelectionError::TransientCurrentInconsistency { term_id, .. } if term_id == second.id
    ));
    assert!(store.current_term().unwrap().is_none());

    let repaired = coordinator
        .reconcile_current_term(&mut store, second.id)
        .unwrap();
    assert_eq!(repaired.id, second.id);
    assert_eq!(current_flags(&store, &[&first, &second]), vec![false, true]);
}

#[test]
fn empty_tenant_falls_back_to_estimated_label() {
    let conn = open_db_in_memory().unwrap();
    let store =
        CalendarStore::new(SqliteCalendarRepository::try_new(&conn, "tenant-a").unwrap());
    let mut coordinator = CurrentSelectionCoordinator::new();

    assert!(coordinator.current_term(&store).unwrap().is_none());
    assert!(coordinator.resolve_default_selection(&[]).is_none());
    assert_eq!(coordinator.state(), &SelectionState::NoDataAvailable);
    assert_eq!(coordinator.display_label(date(2024, 12, 10)), "Term 1, 2025");
}

#[test]
fn default_selection_follows_persisted_current_term() {
    let conn = open_db_in_memory().unwrap();
    let mut store =
        CalendarStore::new(SqliteCalendarRepository::try_new(&conn, "tenant-a").unwrap());
    let (first, second) = seed(&mut store);
    CurrentSelectionCoordinator::new()
        .promote_to_current(&mut store, second.id)
        .unwrap();

    let terms = store.list_terms_for_year(first.academic_year_id).unwrap();
    let mut coordinator = CurrentSelectionCoordinator::new();
    let selected = coordinator.resolve_default_selection(&terms).unwrap();
    assert_eq!(selected.id, second.id);
    assert_eq!(coordinator.display_label(date(2024, 5, 1)), "Term 2");
}

#[test]
fn store_resolution_uses_terms_of_years_that_are_not_active() {
    let conn = open_db_in_memory().unwrap();
    let mut store =
        CalendarStore::new(SqliteCalendarRepository::try_new(&conn, "tenant-a").unwrap());
    let (first, _) = seed(&mut store);
    assert!(store.active_academic_year().unwrap().is_none());

    let mut coordinator = CurrentSelectionCoordinator::new();
    let selected = coordinator.resolve_from_store(&store).unwrap().unwrap();
    assert_eq!(selected.id, first.id);
    assert_eq!(coordinator.display_label(date(2024, 2, 10)), "Term 1");
}

#[test]
fn store_resolution_prefers_current_term_over_empty_active_year() {
    let conn = open_db_in_memory().unwrap();
    let mut store =
        CalendarStore::new(SqliteCalendarRepository::try_new(&conn, "tenant-a").unwrap());
    let (_, second) = seed(&mut store);
    CurrentSelectionCoordinator::new()
        .promote_to_current(&mut store, second.id)
        .unwrap();
    let empty = store
        .create_academic_year("2025", date(2025, 1, 1), date(2025, 12, 1))
        .unwrap();
    store.set_academic_year_active(empty.id, true).unwrap();

    let mut coordinator = CurrentSelectionCoordinator::new();
    let selected = coordinator.resolve_from_store(&store).unwrap().unwrap();
    assert_eq!(selected.id, second.id);
    assert!(selected.is_current);
}

#[test]
fn store_resolution_prefers_active_year_over_other_years() {
    let conn = open_db_in_memory().unwrap();
    let mut store =
        CalendarStore::new(SqliteCalendarRepository::try_new(&conn, "tenant-a").unwrap());
    let (older_first, _) = seed(&mut store);
    let newer = store
        .create_academic_year("2025", date(2025, 1, 1), date(2025, 12, 1))
        .unwrap();
    let newer_first = store
        .create_term("Term 1", date(2025, 1, 1), date(2025, 4, 1), newer.id)
        .unwrap();

    let mut coordinator = CurrentSelectionCoordinator::new();
    assert_eq!(
        coordinator.resolve_from_store(&store).unwrap().unwrap().id,
        newer_first.id
    );

    store
        .set_academic_year_active(older_first.academic_year_id, true)
        .unwrap();
    let mut coordinator = CurrentSelectionCoordinator::new();
    assert_eq!(
        coordinator.resolve_from_store(&store).unwrap().unwrap().id,
        older_first.id
    );
}

#[test]
fn store_resolution_without_terms_falls_back_to_estimate() {
    let conn = open_db_in_memory().unwrap();
    let mut store =
        CalendarStore::new(SqliteCalendarRepository::try_new(&conn, "tenant-a").unwrap());
    let year = store
        .create_academic_year("2024", date(2024, 1, 1), date(2024, 12, 1))
        .unwrap();
    store.set_academic_year_active(year.id, true).unwrap();

    let mut coordinator = CurrentSelectionCoordinator::new();
    assert!(coordinator.resolve_from_store(&store).unwrap().is_none());
    assert_eq!(coordinator.state(), &SelectionState::NoDataAvailable);
    assert_eq!(coordinator.display_label(date(2024, 2, 10)), "Term 1, 2024");
}
