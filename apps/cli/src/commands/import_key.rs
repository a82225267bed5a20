use std::io::Read;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use sigvault_store::paths;

use crate::commands::Outcome;

#[derive(Debug, Args)]
pub struct ImportKeyArgs {
    /// Signal Desktop profile directory
    #[arg(short = 'd', value_name = "directory")]
    pub dir: Option<PathBuf>,

    /// Use the Signal Beta profile and keystore entries
    #[arg(short = 'B')]
    pub beta: bool,

    /// File holding the raw key (default: standard input)
    #[arg(value_name = "file")]
    pub file: Option<PathBuf>,
}

pub fn run(args: &ImportKeyArgs) -> Result<Outcome> {
    let key = match args.file.as_deref() {
        None => read_stdin()?,
        Some(path) if path.as_os_str() == "-" => read_stdin()?,
        Some(path) => std::fs::read(path)?,
    };
    // Strip the trailing newline an `export-key` run appended.
    let key = key
        .strip_suffix(b"\r\n")
        .or_else(|| key.strip_suffix(b"\n"))
        .unwrap_or(&key)
        .to_vec();

    let dir = match &args.dir {
        Some(dir) => dir.clone(),
        None => paths::desktop_dir(args.beta)?,
    };
    let app =
        sigvault_crypto::keystore::AppIdentity::new(paths::app_name(args.beta), dir);

    sigvault_store::context::import_encryption_key(&app, key)?;
    Ok(Outcome::Clean)
}

fn read_stdin() -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    std::io::stdin().read_to_end(&mut buf)?;
    Ok(buf)
}
