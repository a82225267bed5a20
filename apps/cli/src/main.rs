//! sigvault: export messages, attachments and keys from Signal Desktop.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod files;
mod interval;
mod render;
mod sandbox;
mod select;

use commands::Outcome;

#[derive(Debug, Parser)]
#[command(
    name = "sigvault",
    version,
    about = "Export messages, attachments and keys from Signal Desktop"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check the integrity of the database
    #[command(name = "check-database", visible_alias = "check")]
    CheckDatabase(commands::check::CheckArgs),

    /// Export attachments, one directory per conversation
    #[command(name = "export-attachments", visible_alias = "att")]
    ExportAttachments(commands::export_attachments::ExportAttachmentsArgs),

    /// Export contact and group avatars
    #[command(name = "export-avatars", visible_alias = "avt")]
    ExportAvatars(commands::export_avatars::ExportAvatarsArgs),

    /// Decrypt the database into a plaintext SQLite file
    #[command(name = "export-database", visible_alias = "db")]
    ExportDatabase(commands::export_database::ExportDatabaseArgs),

    /// Print the safeStorage key (or the database key)
    #[command(name = "export-key", visible_alias = "key")]
    ExportKey(commands::export_key::ExportKeyArgs),

    /// Export message transcripts, one file per conversation
    #[command(name = "export-messages", visible_alias = "msg")]
    ExportMessages(commands::export_messages::ExportMessagesArgs),

    /// Store a raw safeStorage key in the OS keystore
    #[command(name = "import-key")]
    ImportKey(commands::import_key::ImportKeyArgs),

    /// Run a single SQL statement against the database
    #[command(name = "query-database", visible_alias = "query")]
    QueryDatabase(commands::query::QueryArgs),
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match &cli.command {
        Command::CheckDatabase(args) => commands::check::run(args),
        Command::ExportAttachments(args) => commands::export_attachments::run(args),
        Command::ExportAvatars(args) => commands::export_avatars::run(args),
        Command::ExportDatabase(args) => commands::export_database::run(args),
        Command::ExportKey(args) => commands::export_key::run(args),
        Command::ExportMessages(args) => commands::export_messages::run(args),
        Command::ImportKey(args) => commands::import_key::run(args),
        Command::QueryDatabase(args) => commands::query::run(args),
    };

    match result {
        Ok(Outcome::Clean) => ExitCode::SUCCESS,
        Ok(Outcome::Failed) => ExitCode::FAILURE,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
