//! Command plumbing shared by the subcommands.

pub mod check;
pub mod export_attachments;
pub mod export_avatars;
pub mod export_database;
pub mod export_key;
pub mod export_messages;
pub mod import_key;
pub mod query;

use std::fs::{File, OpenOptions};
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Args;
use sigvault_crypto::keystore::AppIdentity;
use sigvault_crypto::{Os, RawKey};
use sigvault_store::{paths, Context};

/// Whether every item of a bulk command succeeded. Per-item failures are
/// logged as they happen; `Failed` only drives the exit code.
pub enum Outcome {
    Clean,
    Failed,
}

impl Outcome {
    pub fn and(self, ok: bool) -> Outcome {
        if ok {
            self
        } else {
            Outcome::Failed
        }
    }
}

#[derive(Debug, Args)]
pub struct CommonArgs {
    /// Signal Desktop profile directory
    #[arg(short = 'd', value_name = "directory")]
    pub dir: Option<PathBuf>,

    /// Use the Signal Beta profile and keystore entries
    #[arg(short = 'B')]
    pub beta: bool,

    /// Read the raw safeStorage key from "[system:]file"; "-" is stdin
    #[arg(short = 'k', value_name = "keyfile")]
    pub keyfile: Option<String>,
}

impl CommonArgs {
    pub fn signal_dir(&self) -> Result<PathBuf> {
        match &self.dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(paths::desktop_dir(self.beta)?),
        }
    }

    pub fn raw_key(&self) -> Result<Option<RawKey>> {
        match &self.keyfile {
            Some(spec) => Ok(Some(read_key_file(spec)?)),
            None => Ok(None),
        }
    }

    pub fn app_identity(&self, dir: &Path) -> AppIdentity {
        AppIdentity::new(paths::app_name(self.beta), dir)
    }

    pub fn open_context(&self, dir: &Path) -> Result<Context> {
        let key = self.raw_key()?;
        Ok(Context::open(self.app_identity(dir), key)?)
    }
}

/// Parse a `-k [system:]file` argument. The key is the file's first line.
fn read_key_file(spec: &str) -> Result<RawKey> {
    let (os, file) = match spec.split_once(':') {
        Some((system, file)) => (Some(Os::parse(system)?), file),
        None => (None, spec),
    };

    let content = if file == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(file)?
    };
    let line = content.lines().next().unwrap_or("");

    Ok(RawKey::new(
        line.as_bytes().to_vec(),
        os.unwrap_or_else(Os::current),
    ))
}

/// Resolve an optional export directory argument, creating it if needed.
pub fn export_dir(arg: &Option<PathBuf>) -> Result<PathBuf> {
    let dir = arg.clone().unwrap_or_else(|| PathBuf::from("."));
    match std::fs::create_dir(&dir) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
        Err(e) => return Err(e.into()),
    }
    Ok(dir)
}

/// Exclusive-create an output file, optionally private (0600).
pub fn create_new_file(path: &Path, private: bool) -> Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    if private {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    #[cfg(not(unix))]
    let _ = private;
    Ok(options.open(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_file_parses_system_prefix_and_first_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key");
        std::fs::write(&path, "s3cret\ntrailing junk\n").unwrap();

        let key = read_key_file(&format!("linux:{}", path.display())).unwrap();
        assert_eq!(key.os(), Os::Linux);
        assert_eq!(key.bytes(), b"s3cret");

        let key = read_key_file(path.to_str().unwrap()).unwrap();
        assert_eq!(key.os(), Os::current());
        assert_eq!(key.bytes(), b"s3cret");
    }

    #[test]
    fn key_file_rejects_unknown_system() {
        let err = read_key_file("beos:/tmp/key").unwrap_err();
        assert!(err.to_string().contains("invalid system"));
    }

    #[test]
    fn export_dir_creates_and_tolerates_existing() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out");
        let arg = Some(target.clone());
        assert_eq!(export_dir(&arg).unwrap(), target);
        assert!(target.is_dir());
        // Second resolution is a no-op.
        assert_eq!(export_dir(&arg).unwrap(), target);
    }

    #[test]
    fn create_new_file_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        create_new_file(&path, false).unwrap();
        assert!(create_new_file(&path, false).is_err());
    }
}
