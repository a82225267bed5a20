use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::commands::{create_new_file, CommonArgs, Outcome};
use crate::sandbox::Plan;

#[derive(Debug, Args)]
pub struct ExportKeyArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Export the unsealed database key instead of the safeStorage key
    #[arg(short = 'D')]
    pub database_key: bool,

    /// Output file (default: standard output)
    #[arg(value_name = "file")]
    pub file: Option<PathBuf>,
}

pub fn run(args: &ExportKeyArgs) -> Result<Outcome> {
    let dir = args.common.signal_dir()?;
    Plan::for_signal_dir(&dir).apply()?;

    let ctx = args.common.open_context(&dir)?;

    let data = if args.database_key {
        ctx.database_key().as_bytes().to_vec()
    } else {
        ctx.encryption_key()?.bytes().to_vec()
    };

    match &args.file {
        Some(path) => {
            // Keys are written private and never overwrite an existing file.
            let mut file = create_new_file(path, true)?;
            file.write_all(&data)?;
            writeln!(file)?;
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&data)?;
            writeln!(stdout)?;
        }
    }

    Ok(Outcome::Clean)
}
