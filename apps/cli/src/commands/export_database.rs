use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::commands::{create_new_file, CommonArgs, Outcome};
use crate::sandbox::Plan;

#[derive(Debug, Args)]
pub struct ExportDatabaseArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Destination for the plaintext database
    #[arg(value_name = "file")]
    pub file: PathBuf,
}

pub fn run(args: &ExportDatabaseArgs) -> Result<Outcome> {
    let dir = args.common.signal_dir()?;
    // The export database and its temporary files.
    let out_dir = args
        .file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| std::path::Path::new("."));
    Plan::for_signal_dir(&dir).write_to(out_dir).apply()?;

    // SQLCipher unconditionally overwrites existing files, so fail here
    // if the export database already exists.
    create_new_file(&args.file, false)?;

    let ctx = args.common.open_context(&dir)?;
    match ctx.write_database(&args.file) {
        Ok(()) => Ok(Outcome::Clean),
        Err(err) => {
            tracing::error!("{err}");
            Ok(Outcome::Failed)
        }
    }
}
