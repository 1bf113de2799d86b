//! `acadcal` command-line entry point.

mod cli;
mod commands;

use std::process;

use clap::Parser;

use crate::cli::Cli;

fn main() {
    let cli = Cli::parse();
    if let Err(e) = commands::run(cli) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
