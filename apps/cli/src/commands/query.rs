use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::commands::{create_new_file, CommonArgs, Outcome};
use crate::sandbox::Plan;

#[derive(Debug, Args)]
pub struct QueryArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Output file (default: standard output)
    #[arg(short = 'o', value_name = "outfile")]
    pub outfile: Option<PathBuf>,

    /// The SQL statement to run
    #[arg(value_name = "query")]
    pub query: String,
}

pub fn run(args: &QueryArgs) -> Result<Outcome> {
    let dir = args.common.signal_dir()?;
    let mut plan = Plan::for_signal_dir(&dir);
    if let Some(out) = &args.outfile {
        plan = plan.write_to(out);
    }
    plan.apply()?;

    let ctx = args.common.open_context(&dir)?;
    let rows = match ctx.query(&args.query) {
        Ok(rows) => rows,
        Err(err) => {
            tracing::error!("{err}");
            return Ok(Outcome::Failed);
        }
    };

    let mut out: Box<dyn Write> = match &args.outfile {
        Some(path) => Box::new(create_new_file(path, true)?),
        None => Box::new(std::io::stdout().lock()),
    };
    for columns in rows {
        writeln!(out, "{}", columns.join("|"))?;
    }

    Ok(Outcome::Clean)
}
