use anyhow::Result;
use clap::Args;

use crate::commands::{CommonArgs, Outcome};
use crate::sandbox::Plan;

#[derive(Debug, Args)]
pub struct CheckArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

pub fn run(args: &CheckArgs) -> Result<Outcome> {
    let dir = args.common.signal_dir()?;
    Plan::for_signal_dir(&dir).apply()?;

    let ctx = args.common.open_context(&dir)?;
    let results = ctx.check_database()?;

    if results.is_empty() {
        Ok(Outcome::Clean)
    } else {
        for line in results {
            println!("{line}");
        }
        Ok(Outcome::Failed)
    }
}
