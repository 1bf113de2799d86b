use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

/// Academic year and term administration.
#[derive(Parser)]
#[command(name = "acadcal", version, about = "Academic year and term administration")]
pub struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override `[storage].db_path` from config.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Override `[tenant].id` from config.
    #[arg(long, global = true)]
    pub tenant: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Manage academic years.
    #[command(subcommand)]
    Year(YearCommand),
    /// Manage terms.
    #[command(subcommand)]
    Term(TermCommand),
    /// Show the term in effect for the tenant, or the estimated label.
    Current(CurrentArgs),
    /// Print the month-based term label for a date.
    Fallback(FallbackArgs),
}

#[derive(Subcommand)]
pub enum YearCommand {
    /// Create a year, optionally with its first term.
    Create(YearCreateArgs),
    /// Rename or re-range a year.
    Update(YearUpdateArgs),
    /// Delete a year.
    Delete(YearDeleteArgs),
    /// List years, latest first.
    List,
    /// Set or clear the advisory active flag.
    Activate(YearActivateArgs),
}

#[derive(Args)]
pub struct YearCreateArgs {
    pub name: String,
    #[arg(long, value_parser = parse_date)]
    pub start: NaiveDate,
    #[arg(long, value_parser = parse_date)]
    pub end: NaiveDate,
    /// Answer the first-term prompt with this term name.
    #[arg(long, requires_all = ["term_start", "term_end"])]
    pub first_term: Option<String>,
    #[arg(long, value_parser = parse_date)]
    pub term_start: Option<NaiveDate>,
    #[arg(long, value_parser = parse_date)]
    pub term_end: Option<NaiveDate>,
}

#[derive(Args)]
pub struct YearUpdateArgs {
    pub id: String,
    pub name: String,
    #[arg(long, value_parser = parse_date)]
    pub start: NaiveDate,
    #[arg(long, value_parser = parse_date)]
    pub end: NaiveDate,
}

#[derive(Args)]
pub struct YearDeleteArgs {
    pub id: String,
    /// Also delete every term the year owns.
    #[arg(long)]
    pub confirm: bool,
}

#[derive(Args)]
pub struct YearActivateArgs {
    pub id: String,
    /// Clear the flag instead of setting it.
    #[arg(long)]
    pub off: bool,
}

#[derive(Subcommand)]
pub enum TermCommand {
    /// Create a term inside a year.
    Create(TermCreateArgs),
    /// Rename or re-range a term.
    Update(TermUpdateArgs),
    /// Delete a term.
    Delete(TermIdArgs),
    /// List a year's terms by start date.
    List(TermListArgs),
    /// Make a term the tenant's current term.
    Promote(TermIdArgs),
}

#[derive(Args)]
pub struct TermCreateArgs {
    pub name: String,
    #[arg(long)]
    pub year: String,
    #[arg(long, value_parser = parse_date)]
    pub start: NaiveDate,
    #[arg(long, value_parser = parse_date)]
    pub end: NaiveDate,
}

#[derive(Args)]
pub struct TermUpdateArgs {
    pub id: String,
    pub name: String,
    #[arg(long, value_parser = parse_date)]
    pub start: NaiveDate,
    #[arg(long, value_parser = parse_date)]
    pub end: NaiveDate,
}

#[derive(Args)]
pub struct TermIdArgs {
    pub id: String,
}

#[derive(Args)]
pub struct TermListArgs {
    #[arg(long)]
    pub year: String,
}

#[derive(Args)]
pub struct CurrentArgs {
    /// Date used for the fallback label (defaults to today).
    #[arg(long, value_parser = parse_date)]
    pub date: Option<NaiveDate>,
}

#[derive(Args)]
pub struct FallbackArgs {
    /// Defaults to today.
    #[arg(long, value_parser = parse_date)]
    pub date: Option<NaiveDate>,
}

fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|err| format!("expected YYYY-MM-DD, got `{value}`: {err}"))
}
