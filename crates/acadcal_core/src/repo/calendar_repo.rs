//! Calendar repository contract and SQLite implementation.
//!
//! # Invariants
//! - Term listings are ordered `start_date ASC, id ASC`.
//! - Year listings are ordered `start_date DESC, id ASC`.
//! - `swap_current_term` never leaves two terms flagged current; a failure
//!   between its clear and set steps is reported as `CurrentTermCleared`.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::{AcademicYear, Term, TermId, YearId};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const DATE_FORMAT: &str = "%Y-%m-%d";

const YEAR_SELECT_SQL: &str = "SELECT
    id,
    name,
    start_date,
    end_date,
    is_active
FROM academic_years";

const TERM_SELECT_SQL: &str = "SELECT
    id,
    academic_year_id,
    name,
    start_date,
    end_date,
    is_active,
    is_current
FROM terms";

pub type RepoResult<T> = Result<T, RepoError>;

/// Errors from calendar persistence operations.
#[derive(Debug)]
pub enum RepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Academic year does not exist for this tenant.
    YearNotFound(YearId),
    /// Term does not exist for this tenant.
    TermNotFound(TermId),
    /// The previous current flag was cleared but setting the new one failed.
    ///
    /// The tenant has no current term until the swap is re-run.
    CurrentTermCleared {
        term_id: TermId,
        source: Box<RepoError>,
    },
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Persisted data cannot be converted to a valid record.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::YearNotFound(id) => write!(f, "academic year not found: {id}"),
            Self::TermNotFound(id) => write!(f, "term not found: {id}"),
            Self::CurrentTermCleared { term_id, source } => write!(
                f,
                "current term was cleared but term {term_id} could not be set: {source}"
            ),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "calendar repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "calendar repository requires table `{table}`")
            }
            Self::InvalidData(message) => write!(f, "invalid calendar data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::CurrentTermCleared { source, .. } => Some(source.as_ref()),
            Self::YearNotFound(_)
            | Self::TermNotFound(_)
            | Self::UninitializedConnection { .. }
            | Self::MissingRequiredTable(_)
            | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Storage contract for one tenant's academic years and terms.
pub trait CalendarRepository {
    /// Tenant every call of this instance is scoped to.
    fn tenant_id(&self) -> &str;

    fn insert_year(&self, year: &AcademicYear) -> RepoResult<()>;
    /// Overwrites name, range and active flag of an existing year.
    fn update_year(&self, year: &AcademicYear) -> RepoResult<()>;
    /// Hard-deletes a year together with every term it owns.
    fn delete_year(&self, id: YearId) -> RepoResult<()>;
    fn get_year(&self, id: YearId) -> RepoResult<Option<AcademicYear>>;
    fn list_years(&self) -> RepoResult<Vec<AcademicYear>>;
    /// Latest-starting year flagged active, if any.
    fn active_year(&self) -> RepoResult<Option<AcademicYear>>;

    fn insert_term(&self, term: &Term) -> RepoResult<()>;
    /// Overwrites name, range and active flag. Owning year and current flag
    /// are left untouched.
    fn update_term(&self, term: &Term) -> RepoResult<()>;
    fn delete_term(&self, id: TermId) -> RepoResult<()>;
    fn get_term(&self, id: TermId) -> RepoResult<Option<Term>>;
    fn list_terms_for_year(&self, year_id: YearId) -> RepoResult<Vec<Term>>;
    fn count_terms_for_year(&self, year_id: YearId) -> RepoResult<u64>;

    /// Term currently flagged current for the tenant, if any.
    fn current_term(&self) -> RepoResult<Option<Term>>;
    /// Clears the current flag and returns the previous holder.
    fn clear_current_term(&self) -> RepoResult<Option<TermId>>;
    /// Flags `id` current. Fails if another term still holds the flag.
    fn set_current_term(&self, id: TermId) -> RepoResult<()>;

    /// Moves the current flag to `id`.
    ///
    /// The default runs clear-then-set as two steps. Stores with real
    /// transactions should override it with one atomic step.
    fn swap_current_term(&self, id: TermId) -> RepoResult<()> {
        self.clear_current_term()?;
        self.set_current_term(id)
            .map_err(|err| RepoError::CurrentTermCleared {
                term_id: id,
                source: Box::new(err),
            })
    }
}

/// SQLite-backed calendar repository for one tenant.
pub struct SqliteCalendarRepository<'conn> {
    conn: &'conn Connection,
    tenant_id: String,
}

impl<'conn> SqliteCalendarRepository<'conn> {
    /// Creates repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection, tenant_id: impl Into<String>) -> RepoResult<Self> {
        ensure_calendar_connection_ready(conn)?;
        Ok(Self {
            conn,
            tenant_id: tenant_id.into(),
        })
    }
}

impl CalendarRepository for SqliteCalendarRepository<'_> {
    fn tenant_id(&self) -> &str {
        self.tenant_id.as_str()
    }

    fn insert_year(&self, year: &AcademicYear) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO academic_years (
                id,
                tenant_id,
                name,
                start_date,
                end_date,
                is_active
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                year.id.to_string(),
                self.tenant_id,
                year.name,
                date_to_db(year.start_date),
                date_to_db(year.end_date),
                bool_to_int(year.is_active),
            ],
        )?;
        Ok(())
    }

    fn update_year(&self, year: &AcademicYear) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE academic_years
             SET name = ?3,
                 start_date = ?4,
                 end_date = ?5,
                 is_active = ?6,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1
               AND tenant_id = ?2;",
            params![
                year.id.to_string(),
                self.tenant_id,
                year.name,
                date_to_db(year.start_date),
                date_to_db(year.end_date),
                bool_to_int(year.is_active),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::YearNotFound(year.id));
        }
        Ok(())
    }

    fn delete_year(&self, id: YearId) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        // Explicit child delete keeps the cascade independent of the
        // connection's foreign_keys pragma.
        tx.execute(
            "DELETE FROM terms WHERE academic_year_id = ?1 AND tenant_id = ?2;",
            params![id.to_string(), self.tenant_id],
        )?;
        let changed = tx.execute(
            "DELETE FROM academic_years WHERE id = ?1 AND tenant_id = ?2;",
            params![id.to_string(), self.tenant_id],
        )?;
        if changed == 0 {
            return Err(RepoError::YearNotFound(id));
        }
        tx.commit()?;
        Ok(())
    }

    fn get_year(&self, id: YearId) -> RepoResult<Option<AcademicYear>> {
        let mut stmt = self.conn.prepare(&format!(
            "{YEAR_SELECT_SQL}
             WHERE id = ?1
               AND tenant_id = ?2;"
        ))?;
        let mut rows = stmt.query(params![id.to_string(), self.tenant_id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_year_row(row)?));
        }
        Ok(None)
    }

    fn list_years(&self) -> RepoResult<Vec<AcademicYear>> {
        let mut stmt = self.conn.prepare(&format!(
            "{YEAR_SELECT_SQL}
             WHERE tenant_id = ?1
             ORDER BY start_date DESC, id ASC;"
        ))?;
        let mut rows = stmt.query([self.tenant_id.as_str()])?;
        let mut years = Vec::new();
        while let Some(row) = rows.next()? {
            years.push(parse_year_row(row)?);
        }
        Ok(years)
    }

    fn active_year(&self) -> RepoResult<Option<AcademicYear>> {
        let mut stmt = self.conn.prepare(&format!(
            "{YEAR_SELECT_SQL}
             WHERE tenant_id = ?1
               AND is_active = 1
             ORDER BY start_date DESC, id ASC
             LIMIT 1;"
        ))?;
        let mut rows = stmt.query([self.tenant_id.as_str()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_year_row(row)?));
        }
        Ok(None)
    }

    fn insert_term(&self, term: &Term) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO terms (
                id,
                tenant_id,
                academic_year_id,
                name,
                start_date,
                end_date,
                is_active,
                is_current
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0);",
            params![
                term.id.to_string(),
                self.tenant_id,
                term.academic_year_id.to_string(),
                term.name,
                date_to_db(term.start_date),
                date_to_db(term.end_date),
                bool_to_int(term.is_active),
            ],
        )?;
        Ok(())
    }

    fn update_term(&self, term: &Term) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE terms
             SET name = ?3,
                 start_date = ?4,
                 end_date = ?5,
                 is_active = ?6,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1
               AND tenant_id = ?2;",
            params![
                term.id.to_string(),
                self.tenant_id,
                term.name,
                date_to_db(term.start_date),
                date_to_db(term.end_date),
                bool_to_int(term.is_active),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::TermNotFound(term.id));
        }
        Ok(())
    }

    fn delete_term(&self, id: TermId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM terms WHERE id = ?1 AND tenant_id = ?2;",
            params![id.to_string(), self.tenant_id],
        )?;
        if changed == 0 {
            return Err(RepoError::TermNotFound(id));
        }
        Ok(())
    }

    fn get_term(&self, id: TermId) -> RepoResult<Option<Term>> {
        let mut stmt = self.conn.prepare(&format!(
            "{TERM_SELECT_SQL}
             WHERE id = ?1
               AND tenant_id = ?2;"
        ))?;
        let mut rows = stmt.query(params![id.to_string(), self.tenant_id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_term_row(row)?));
        }
        Ok(None)
    }

    fn list_terms_for_year(&self, year_id: YearId) -> RepoResult<Vec<Term>> {
        let mut stmt = self.conn.prepare(&format!(
            "{TERM_SELECT_SQL}
             WHERE academic_year_id = ?1
               AND tenant_id = ?2
             ORDER BY start_date ASC, id ASC;"
        ))?;
        let mut rows = stmt.query(params![year_id.to_string(), self.tenant_id])?;
        let mut terms = Vec::new();
        while let Some(row) = rows.next()? {
            terms.push(parse_term_row(row)?);
        }
        Ok(terms)
    }

    fn count_terms_for_year(&self, year_id: YearId) -> RepoResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*)
             FROM terms
             WHERE academic_year_id = ?1
               AND tenant_id = ?2;",
            params![year_id.to_string(), self.tenant_id],
            |row| row.get(0),
        )?;
        u64::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("negative term count `{count}`")))
    }

    fn current_term(&self) -> RepoResult<Option<Term>> {
        let mut stmt = self.conn.prepare(&format!(
            "{TERM_SELECT_SQL}
             WHERE tenant_id = ?1
               AND is_current = 1;"
        ))?;
        let mut rows = stmt.query([self.tenant_id.as_str()])?;
        let current = match rows.next()? {
            Some(row) => Some(parse_term_row(row)?),
            None => None,
        };
        if rows.next()?.is_some() {
            return Err(RepoError::InvalidData(format!(
                "tenant `{}` has more than one current term",
                self.tenant_id
            )));
        }
        Ok(current)
    }

    fn clear_current_term(&self) -> RepoResult<Option<TermId>> {
        clear_current_in(self.conn, self.tenant_id.as_str())
    }

    fn set_current_term(&self, id: TermId) -> RepoResult<()> {
        set_current_in(self.conn, self.tenant_id.as_str(), id)
    }

    fn swap_current_term(&self, id: TermId) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        clear_current_in(&tx, self.tenant_id.as_str())?;
        set_current_in(&tx, self.tenant_id.as_str(), id)?;
        tx.commit()?;
        Ok(())
    }
}

fn clear_current_in(conn: &Connection, tenant_id: &str) -> RepoResult<Option<TermId>> {
    let previous: Option<String> = conn
        .query_row(
            "SELECT id FROM terms WHERE tenant_id = ?1 AND is_current = 1 LIMIT 1;",
            [tenant_id],
            |row| row.get(0),
        )
        .optional()?;
    conn.execute(
        "UPDATE terms
         SET is_current = 0,
             updated_at = (strftime('%s', 'now') * 1000)
         WHERE tenant_id = ?1
           AND is_current = 1;",
        [tenant_id],
    )?;
    previous
        .map(|value| parse_uuid(&value, "terms.id"))
        .transpose()
}

fn set_current_in(conn: &Connection, tenant_id: &str, id: TermId) -> RepoResult<()> {
    let changed = conn.execute(
        "UPDATE terms
         SET is_current = 1,
             updated_at = (strftime('%s', 'now') * 1000)
         WHERE id = ?1
           AND tenant_id = ?2;",
        params![id.to_string(), tenant_id],
    )?;
    if changed == 0 {
        return Err(RepoError::TermNotFound(id));
    }
    Ok(())
}

fn parse_year_row(row: &Row<'_>) -> RepoResult<AcademicYear> {
    let id_text: String = row.get("id")?;
    let start_text: String = row.get("start_date")?;
    let end_text: String = row.get("end_date")?;
    Ok(AcademicYear {
        id: parse_uuid(&id_text, "academic_years.id")?,
        name: row.get("name")?,
        start_date: parse_date(&start_text, "academic_years.start_date")?,
        end_date: parse_date(&end_text, "academic_years.end_date")?,
        is_active: parse_flag(row.get("is_active")?, "academic_years.is_active")?,
    })
}

fn parse_term_row(row: &Row<'_>) -> RepoResult<Term> {
    let id_text: String = row.get("id")?;
    let year_text: String = row.get("academic_year_id")?;
    let start_text: String = row.get("start_date")?;
    let end_text: String = row.get("end_date")?;
    Ok(Term {
        id: parse_uuid(&id_text, "terms.id")?,
        name: row.get("name")?,
        start_date: parse_date(&start_text, "terms.start_date")?,
        end_date: parse_date(&end_text, "terms.end_date")?,
        academic_year_id: parse_uuid(&year_text, "terms.academic_year_id")?,
        is_active: parse_flag(row.get("is_active")?, "terms.is_active")?,
        is_current: parse_flag(row.get("is_current")?, "terms.is_current")?,
    })
}

fn date_to_db(value: NaiveDate) -> String {
    value.format(DATE_FORMAT).to_string()
}

fn parse_date(value: &str, column: &'static str) -> RepoResult<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|_| RepoError::InvalidData(format!("invalid date `{value}` in {column}")))
}

fn parse_uuid(value: &str, column: &'static str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

fn parse_flag(value: i64, column: &'static str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid flag value `{other}` in {column}"
        ))),
    }
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

fn ensure_calendar_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in ["academic_years", "terms"] {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
    }
    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}
