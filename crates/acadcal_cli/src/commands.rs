//! Subcommand handlers.

use acadcal_core::db::open_db;
use acadcal_core::{
    core_version, estimate_fallback_term, init_logging, AcademicYear, CalendarConfig,
    CalendarEvent, CalendarStore, CascadingCreationFlow, CurrentSelectionCoordinator, FlowState,
    SqliteCalendarRepository, Term, TermId, YearId,
};
use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use log::info;
use uuid::Uuid;

use crate::cli::{
    Cli, Command, CurrentArgs, FallbackArgs, TermCommand, YearCommand, YearCreateArgs,
};

type Store<'conn> = CalendarStore<SqliteCalendarRepository<'conn>>;

/// Loads config, opens the tenant's store and dispatches the subcommand.
pub fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => CalendarConfig::load(path)
            .with_context(|| format!("failed to load config: {}", path.display()))?,
        None => CalendarConfig::default(),
    };
    if let Some(db) = cli.db {
        config.storage.db_path = db;
    }
    if let Some(tenant) = cli.tenant {
        if tenant.trim().is_empty() {
            bail!("--tenant must not be blank");
        }
        config.tenant.id = tenant.trim().to_string();
    }
    if let Some(dir) = &config.logging.dir {
        init_logging(&config.logging.level, dir).context("failed to initialize logging")?;
    }

    if let Command::Fallback(args) = &cli.command {
        return fallback(args);
    }

    let conn = open_db(&config.storage.db_path).with_context(|| {
        format!(
            "failed to open calendar database: {}",
            config.storage.db_path.display()
        )
    })?;
    let repo = SqliteCalendarRepository::try_new(&conn, config.tenant.id.as_str())
        .context("calendar database is not ready")?;
    let mut store = CalendarStore::with_policy(repo, config.calendar.year_edit_policy);
    info!(
        "event=cli_command module=cli status=start tenant={} core_version={}",
        store.tenant_id(),
        core_version()
    );

    match cli.command {
        Command::Year(command) => year(&mut store, command),
        Command::Term(command) => term(&mut store, command),
        Command::Current(args) => current(&store, &args),
        Command::Fallback(args) => fallback(&args),
    }
}

fn year(store: &mut Store<'_>, command: YearCommand) -> Result<()> {
    match command {
        YearCommand::Create(args) => create_year(store, args),
        YearCommand::Update(args) => {
            let id = parse_id(&args.id)?;
            let year = store.update_academic_year(id, args.name, args.start, args.end)?;
            println!("updated {}", format_year(&year));
            for event in store.take_events() {
                if let CalendarEvent::TermsOutsideYear { term_ids, .. } = event {
                    println!(
                        "warning: {} term(s) now fall outside this year",
                        term_ids.len()
                    );
                }
            }
            Ok(())
        }
        YearCommand::Delete(args) => {
            let id: YearId = parse_id(&args.id)?;
            store.delete_academic_year(id, args.confirm)?;
            println!("deleted academic year {id}");
            Ok(())
        }
        YearCommand::List => {
            for year in store.list_academic_years()? {
                println!("{}", format_year(&year));
            }
            Ok(())
        }
        YearCommand::Activate(args) => {
            let year = store.set_academic_year_active(parse_id(&args.id)?, !args.off)?;
            println!("{}", format_year(&year));
            Ok(())
        }
    }
}

fn create_year(store: &mut Store<'_>, args: YearCreateArgs) -> Result<()> {
    let mut flow = CascadingCreationFlow::new();
    let (year, transitions) = flow.create_year(store, args.name, args.start, args.end)?;
    println!("created {}", format_year(&year));
    print_transitions(&transitions);

    match (args.first_term, args.term_start, args.term_end) {
        (Some(name), Some(start), Some(end)) => {
            let (_, transitions) = flow
                .accept(store, name, start, end)
                .context("academic year was created but its first term was rejected")?;
            print_transitions(&transitions);
        }
        _ => print_transitions(&flow.decline()?),
    }
    Ok(())
}

fn term(store: &mut Store<'_>, command: TermCommand) -> Result<()> {
    match command {
        TermCommand::Create(args) => {
            let year_id = parse_id(&args.year)?;
            let term = store.create_term(args.name, args.start, args.end, year_id)?;
            println!("created {}", format_term(&term));
        }
        TermCommand::Update(args) => {
            let id = parse_id(&args.id)?;
            let term = store.update_term(id, args.name, args.start, args.end)?;
            println!("updated {}", format_term(&term));
        }
        TermCommand::Delete(args) => {
            let id: TermId = parse_id(&args.id)?;
            store.delete_term(id)?;
            println!("deleted term {id}");
        }
        TermCommand::List(args) => {
            for term in store.list_terms_for_year(parse_id(&args.year)?)? {
                println!("{}", format_term(&term));
            }
        }
        TermCommand::Promote(args) => {
            let mut coordinator = CurrentSelectionCoordinator::new();
            let term = coordinator.promote_to_current(store, parse_id(&args.id)?)?;
            println!("current {}", format_term(&term));
        }
    }
    Ok(())
}

fn current(store: &Store<'_>, args: &CurrentArgs) -> Result<()> {
    let on = args.date.unwrap_or_else(today);
    let mut coordinator = CurrentSelectionCoordinator::new();

    let selected = coordinator.resolve_from_store(store)?.cloned();
    match selected {
        Some(term) => println!("{}", format_term(&term)),
        None => println!("{} (estimated)", coordinator.display_label(on)),
    }
    Ok(())
}

fn fallback(args: &FallbackArgs) -> Result<()> {
    println!("{}", estimate_fallback_term(args.date.unwrap_or_else(today)));
    Ok(())
}

fn print_transitions(transitions: &[FlowState]) {
    for state in transitions {
        match state {
            FlowState::Idle => {}
            FlowState::YearCreated(_) => {}
            FlowState::TermPromptShown(year) => {
                println!("prompt: create the first term of {}?", year.name)
            }
            FlowState::TermCreated(term) => println!("created {}", format_term(term)),
            FlowState::Skipped(year) => println!("no first term created for {}", year.name),
        }
    }
}

fn format_year(year: &AcademicYear) -> String {
    format!(
        "{} {} {}..{}{}",
        year.id,
        year.name,
        year.start_date,
        year.end_date,
        if year.is_active { " [active]" } else { "" }
    )
}

fn format_term(term: &Term) -> String {
    format!(
        "{} {} {}..{}{}",
        term.id,
        term.name,
        term.start_date,
        term.end_date,
        if term.is_current { " [current]" } else { "" }
    )
}

fn parse_id(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value.trim()).with_context(|| format!("invalid id `{value}`"))
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}
