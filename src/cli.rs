//! CLI argument parsing for the wedding-guest-worker binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::services::importer::template::TEMPLATE_FILENAME;

#[derive(Parser)]
#[command(name = "wedding-guest-worker", about = "Wedding planner guest import worker")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the worker server (default if no subcommand given)
    Serve,
    /// Run database migrations and exit
    Migrate,
    /// Import a guest file locally and print the report
    Import {
        /// CSV, XLSX or XLS file
        file: PathBuf,
        /// Event the guests belong to (required with --commit)
        #[arg(long)]
        event: Option<Uuid>,
        /// Store the valid guests through the configured guest store
        #[arg(long, requires = "event")]
        commit: bool,
    },
    /// Write the guest data template CSV
    Template {
        #[arg(long, short, default_value = TEMPLATE_FILENAME)]
        output: PathBuf,
    },
    /// List guests stored for an event
    List {
        #[arg(long)]
        event: Uuid,
    },
}
