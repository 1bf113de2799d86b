//! Academic calendar store.
//!
//! # Responsibility
//! - Validate every year/term mutation before it reaches the repository.
//! - Cache per-year term listings and invalidate them on every write.
//! - Queue `CalendarEvent`s so callers can react to committed changes.
//!
//! # Invariants
//! - No write is issued when validation fails; the typed failure is returned
//!   unchanged.
//! - Term listings are ordered by start date ascending.
//! - A year that owns terms is only deleted with explicit confirmation.
//! - Repository failures are reported, never retried here.

use crate::config::YearEditPolicy;
use crate::model::{AcademicYear, CalendarEntity, Term, TermId, YearId};
use crate::repo::calendar_repo::{CalendarRepository, RepoError};
use crate::validation::{
    validate_term_nesting, validate_year_range, DateRange, NestingViolation, RangeError,
};
use chrono::NaiveDate;
use log::{info, warn};
use std::cell::RefCell;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors from calendar store operations.
#[derive(Debug)]
pub enum StoreError {
    /// Name is blank after trim.
    InvalidName(CalendarEntity),
    /// Start date is not before end date.
    InvalidRange(RangeError),
    /// Term escapes its owning year.
    NestingViolation(NestingViolation),
    /// Year edit would leave owned terms outside the new range.
    TermsOutsideYear {
        year_id: YearId,
        violations: Vec<(TermId, NestingViolation)>,
    },
    /// Year owns terms and deletion was not confirmed.
    HasDependentTerms { year_id: YearId, term_count: u64 },
    YearNotFound(YearId),
    TermNotFound(TermId),
    /// Clear step of a current-term swap committed, set step failed.
    CurrentTermCleared { term_id: TermId, source: RepoError },
    /// Any other repository failure.
    Persistence(RepoError),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName(entity) => match entity {
                CalendarEntity::AcademicYear => write!(f, "academic year name must not be blank"),
                CalendarEntity::Term => write!(f, "term name must not be blank"),
            },
            Self::InvalidRange(err) => write!(f, "{err}"),
            Self::NestingViolation(err) => write!(f, "{err}"),
            Self::TermsOutsideYear {
                year_id,
                violations,
            } => write!(
                f,
                "new range of academic year {year_id} would leave {} term(s) outside it",
                violations.len()
            ),
            Self::HasDependentTerms {
                year_id,
                term_count,
            } => write!(
                f,
                "academic year {year_id} owns {term_count} term(s); confirm to delete them too"
            ),
            Self::YearNotFound(id) => write!(f, "academic year not found: {id}"),
            Self::TermNotFound(id) => write!(f, "term not found: {id}"),
            Self::CurrentTermCleared { term_id, source } => write!(
                f,
                "previous current term was cleared but term {term_id} was not set: {source}"
            ),
            Self::Persistence(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidRange(err) => Some(err),
            Self::NestingViolation(err) => Some(err),
            Self::CurrentTermCleared { source, .. } => Some(source),
            Self::Persistence(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for StoreError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::YearNotFound(id) => Self::YearNotFound(id),
            RepoError::TermNotFound(id) => Self::TermNotFound(id),
            RepoError::CurrentTermCleared { term_id, source } => Self::CurrentTermCleared {
                term_id,
                source: *source,
            },
            other => Self::Persistence(other),
        }
    }
}

impl From<RangeError> for StoreError {
    fn from(value: RangeError) -> Self {
        Self::InvalidRange(value)
    }
}

/// Committed change notifications, drained with `CalendarStore::take_events`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalendarEvent {
    YearCreated {
        year: AcademicYear,
        term_count: u64,
    },
    YearUpdated {
        year: AcademicYear,
    },
    YearDeleted {
        year_id: YearId,
        removed_terms: u64,
    },
    TermCreated {
        term: Term,
    },
    TermUpdated {
        term: Term,
    },
    TermDeleted {
        term_id: TermId,
        year_id: YearId,
    },
    CurrentTermChanged {
        previous: Option<TermId>,
        current: TermId,
    },
    /// A year edit committed under `YearEditPolicy::Warn` left these terms
    /// outside the year.
    TermsOutsideYear {
        year_id: YearId,
        term_ids: Vec<TermId>,
    },
}

/// Result of moving the tenant's current flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Promotion {
    /// The flag moved; `previous` held it before.
    Changed {
        previous: Option<TermId>,
        current: Term,
    },
    /// The term already held the flag; nothing was written.
    Unchanged(Term),
}

impl Promotion {
    pub fn term(&self) -> &Term {
        match self {
            Self::Changed { current, .. } => current,
            Self::Unchanged(term) => term,
        }
    }
}

#[derive(Debug)]
struct CachedTerms {
    revision: u64,
    terms: Vec<Term>,
}

/// Validating facade over one tenant's calendar repository.
///
/// Mutations take `&mut self`, so one store instance is the single writer
/// for its tenant and a conflicting write cannot start before the previous
/// one returned.
///
/// Every committed write queues a `CalendarEvent`. Long-lived hosts must
/// drain the queue with `take_events` or it grows without bound.
pub struct CalendarStore<R: CalendarRepository> {
    repo: R,
    year_edit_policy: YearEditPolicy,
    term_cache: RefCell<HashMap<YearId, CachedTerms>>,
    revisions: HashMap<YearId, u64>,
    events: Vec<CalendarEvent>,
}

impl<R: CalendarRepository> CalendarStore<R> {
    /// Creates a store rejecting year edits that would orphan terms.
    pub fn new(repo: R) -> Self {
        Self::with_policy(repo, YearEditPolicy::default())
    }

    pub fn with_policy(repo: R, year_edit_policy: YearEditPolicy) -> Self {
        Self {
            repo,
            year_edit_policy,
            term_cache: RefCell::new(HashMap::new()),
            revisions: HashMap::new(),
            events: Vec::new(),
        }
    }

    pub fn tenant_id(&self) -> &str {
        self.repo.tenant_id()
    }

    pub fn year_edit_policy(&self) -> YearEditPolicy {
        self.year_edit_policy
    }

    /// Drains queued change events in commit order.
    pub fn take_events(&mut self) -> Vec<CalendarEvent> {
        std::mem::take(&mut self.events)
    }

    /// Counter bumped by every write touching `year_id`.
    ///
    /// Readers holding a copy of a year's terms compare revisions to detect
    /// that their copy went stale. Unknown and deleted years report 0.
    pub fn year_revision(&self, year_id: YearId) -> u64 {
        self.revisions.get(&year_id).copied().unwrap_or(0)
    }

    /// Creates a year after validating its name and range.
    pub fn create_academic_year(
        &mut self,
        name: impl Into<String>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<AcademicYear, StoreError> {
        let name = normalize_name(name.into(), CalendarEntity::AcademicYear)?;
        validate_year_range(start, end)?;

        let year = AcademicYear::new(name, start, end);
        self.repo.insert_year(&year)?;
        self.invalidate_year(year.id);

        info!(
            "event=year_create module=store status=ok tenant={} year_id={}",
            self.repo.tenant_id(),
            year.id
        );
        self.events.push(CalendarEvent::YearCreated {
            year: year.clone(),
            term_count: 0,
        });
        Ok(year)
    }

    /// Renames and re-ranges a year.
    ///
    /// Owned terms are checked against the new range and handled according
    /// to the store's `YearEditPolicy`.
    pub fn update_academic_year(
        &mut self,
        id: YearId,
        name: impl Into<String>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<AcademicYear, StoreError> {
        let name = normalize_name(name.into(), CalendarEntity::AcademicYear)?;
        validate_year_range(start, end)?;
        let existing = self.require_year(id)?;

        let new_range = DateRange::new(start, end);
        let violations: Vec<(TermId, NestingViolation)> = self
            .repo
            .list_terms_for_year(id)?
            .into_iter()
            .filter_map(|term| {
                validate_term_nesting(term.range(), new_range)
                    .err()
                    .map(|violation| (term.id, violation))
            })
            .collect();

        if !violations.is_empty() && self.year_edit_policy == YearEditPolicy::Reject {
            return Err(StoreError::TermsOutsideYear {
                year_id: id,
                violations,
            });
        }

        let year = AcademicYear {
            name,
            start_date: start,
            end_date: end,
            ..existing
        };
        self.repo.update_year(&year)?;
        self.invalidate_year(id);
        info!(
            "event=year_update module=store status=ok tenant={} year_id={id}",
            self.repo.tenant_id()
        );
        self.events
            .push(CalendarEvent::YearUpdated { year: year.clone() });

        if !violations.is_empty() {
            warn!(
                "event=year_update module=store status=warn tenant={} year_id={id} terms_outside={}",
                self.repo.tenant_id(),
                violations.len()
            );
            self.events.push(CalendarEvent::TermsOutsideYear {
                year_id: id,
                term_ids: violations.into_iter().map(|(term_id, _)| term_id).collect(),
            });
        }
        Ok(year)
    }

    /// Sets the advisory active flag of a year.
    pub fn set_academic_year_active(
        &mut self,
        id: YearId,
        is_active: bool,
    ) -> Result<AcademicYear, StoreError> {
        let existing = self.require_year(id)?;
        let year = AcademicYear {
            is_active,
            ..existing
        };
        self.repo.update_year(&year)?;
        self.invalidate_year(id);
        self.events
            .push(CalendarEvent::YearUpdated { year: year.clone() });
        Ok(year)
    }

    /// Deletes a year and, once `confirmed`, every term it owns.
    pub fn delete_academic_year(&mut self, id: YearId, confirmed: bool) -> Result<(), StoreError> {
        self.require_year(id)?;
        let term_count = self.repo.count_terms_for_year(id)?;
        if term_count > 0 && !confirmed {
            return Err(StoreError::HasDependentTerms {
                year_id: id,
                term_count,
            });
        }

        self.repo.delete_year(id)?;
        self.invalidate_year(id);
        self.revisions.remove(&id);
        info!(
            "event=year_delete module=store status=ok tenant={} year_id={id} removed_terms={term_count}",
            self.repo.tenant_id()
        );
        self.events.push(CalendarEvent::YearDeleted {
            year_id: id,
            removed_terms: term_count,
        });
        Ok(())
    }

    pub fn get_academic_year(&self, id: YearId) -> Result<Option<AcademicYear>, StoreError> {
        self.repo.get_year(id).map_err(Into::into)
    }

    /// Lists years, latest start first.
    pub fn list_academic_years(&self) -> Result<Vec<AcademicYear>, StoreError> {
        self.repo.list_years().map_err(Into::into)
    }

    /// Year used to seed default views; unrelated to the current term flag.
    pub fn active_academic_year(&self) -> Result<Option<AcademicYear>, StoreError> {
        self.repo.active_year().map_err(Into::into)
    }

    /// Creates a term inside `academic_year_id`.
    pub fn create_term(
        &mut self,
        name: impl Into<String>,
        start: NaiveDate,
        end: NaiveDate,
        academic_year_id: YearId,
    ) -> Result<Term, StoreError> {
        let name = normalize_name(name.into(), CalendarEntity::Term)?;
        let year = self.require_year(academic_year_id)?;
        check_term_fits(DateRange::new(start, end), &year)?;

        let term = Term::new(name, start, end, academic_year_id);
        self.repo.insert_term(&term)?;
        self.invalidate_year(academic_year_id);
        info!(
            "event=term_create module=store status=ok tenant={} year_id={academic_year_id} term_id={}",
            self.repo.tenant_id(),
            term.id
        );
        self.events
            .push(CalendarEvent::TermCreated { term: term.clone() });
        Ok(term)
    }

    /// Renames and re-ranges a term within its existing year.
    pub fn update_term(
        &mut self,
        id: TermId,
        name: impl Into<String>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Term, StoreError> {
        let name = normalize_name(name.into(), CalendarEntity::Term)?;
        let existing = self.require_term(id)?;
        let year = self.owning_year(&existing)?;
        check_term_fits(DateRange::new(start, end), &year)?;

        let term = Term {
            name,
            start_date: start,
            end_date: end,
            ..existing
        };
        self.repo.update_term(&term)?;
        self.invalidate_year(term.academic_year_id);
        info!(
            "event=term_update module=store status=ok tenant={} term_id={id}",
            self.repo.tenant_id()
        );
        self.events
            .push(CalendarEvent::TermUpdated { term: term.clone() });
        Ok(term)
    }

    /// Sets the advisory active flag of a term.
    pub fn set_term_active(&mut self, id: TermId, is_active: bool) -> Result<Term, StoreError> {
        let existing = self.require_term(id)?;
        let term = Term {
            is_active,
            ..existing
        };
        self.repo.update_term(&term)?;
        self.invalidate_year(term.academic_year_id);
        self.events
            .push(CalendarEvent::TermUpdated { term: term.clone() });
        Ok(term)
    }

    /// Hard-deletes a term. Irreversible.
    pub fn delete_term(&mut self, id: TermId) -> Result<(), StoreError> {
        let term = self.require_term(id)?;
        self.repo.delete_term(id)?;
        self.invalidate_year(term.academic_year_id);
        info!(
            "event=term_delete module=store status=ok tenant={} term_id={id}",
            self.repo.tenant_id()
        );
        self.events.push(CalendarEvent::TermDeleted {
            term_id: id,
            year_id: term.academic_year_id,
        });
        Ok(())
    }

    pub fn get_term(&self, id: TermId) -> Result<Option<Term>, StoreError> {
        self.repo.get_term(id).map_err(Into::into)
    }

    /// Lists a year's terms by start date ascending.
    ///
    /// Served from the per-year cache when the cached copy is still at the
    /// year's current revision.
    pub fn list_terms_for_year(&self, year_id: YearId) -> Result<Vec<Term>, StoreError> {
        let revision = self.year_revision(year_id);
        if let Some(cached) = self.term_cache.borrow().get(&year_id) {
            if cached.revision == revision {
                return Ok(cached.terms.clone());
            }
        }

        if self.repo.get_year(year_id)?.is_none() {
            return Err(StoreError::YearNotFound(year_id));
        }
        let terms = self.repo.list_terms_for_year(year_id)?;
        self.term_cache.borrow_mut().insert(
            year_id,
            CachedTerms {
                revision,
                terms: terms.clone(),
            },
        );
        Ok(terms)
    }

    /// Term flagged current for the tenant, if any.
    pub fn current_term(&self) -> Result<Option<Term>, StoreError> {
        self.repo.current_term().map_err(Into::into)
    }

    /// Moves the tenant's current flag to `term_id`.
    ///
    /// Calling it for the term that already holds the flag writes nothing.
    /// A failure after the clear step surfaces as `CurrentTermCleared`; the
    /// caller decides whether to re-run the swap.
    pub fn promote_term(&mut self, term_id: TermId) -> Result<Promotion, StoreError> {
        let target = self.require_term(term_id)?;
        if target.is_current {
            return Ok(Promotion::Unchanged(target));
        }
        let previous = self.repo.current_term()?;

        let swap = self.repo.swap_current_term(term_id);
        if let Some(previous) = &previous {
            self.invalidate_year(previous.academic_year_id);
        }
        self.invalidate_year(target.academic_year_id);
        swap?;

        let current = self.require_term(term_id)?;
        let previous = previous.map(|term| term.id);
        info!(
            "event=current_term_swap module=store status=ok tenant={} term_id={term_id}",
            self.repo.tenant_id()
        );
        self.events.push(CalendarEvent::CurrentTermChanged {
            previous,
            current: term_id,
        });
        Ok(Promotion::Changed { previous, current })
    }

    fn require_year(&self, id: YearId) -> Result<AcademicYear, StoreError> {
        self.repo.get_year(id)?.ok_or(StoreError::YearNotFound(id))
    }

    fn require_term(&self, id: TermId) -> Result<Term, StoreError> {
        self.repo.get_term(id)?.ok_or(StoreError::TermNotFound(id))
    }

    fn owning_year(&self, term: &Term) -> Result<AcademicYear, StoreError> {
        self.repo.get_year(term.academic_year_id)?.ok_or_else(|| {
            StoreError::Persistence(RepoError::InvalidData(format!(
                "term {} references missing academic year {}",
                term.id, term.academic_year_id
            )))
        })
    }

    fn invalidate_year(&mut self, year_id: YearId) {
        *self.revisions.entry(year_id).or_insert(0) += 1;
        self.term_cache.get_mut().remove(&year_id);
    }
}

/// Runs the nesting check and reports a malformed-but-contained term range
/// as a plain range error.
fn check_term_fits(term: DateRange, year: &AcademicYear) -> Result<(), StoreError> {
    validate_term_nesting(term, year.range()).map_err(|violation| {
        if violation.is_range_only() {
            StoreError::InvalidRange(RangeError {
                entity: CalendarEntity::Term,
                range: term,
            })
        } else {
            StoreError::NestingViolation(violation)
        }
    })
}

fn normalize_name(value: String, entity: CalendarEntity) -> Result<String, StoreError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(StoreError::InvalidName(entity));
    }
    Ok(trimmed.to_string())
}
