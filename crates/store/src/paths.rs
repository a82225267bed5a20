//! Data-store layout and profile directory discovery.

use std::path::{Path, PathBuf};

use directories::BaseDirs;

use crate::error::{Result, StoreError};

pub const CONFIG_FILE: &str = "config.json";
pub const DATABASE_DIR: &str = "sql";
pub const DATABASE_FILE: &str = "db.sqlite";
pub const ATTACHMENT_DIR: &str = "attachments.noindex";

pub fn config_file(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE)
}

pub fn database_file(dir: &Path) -> PathBuf {
    dir.join(DATABASE_DIR).join(DATABASE_FILE)
}

pub fn attachment_dir(dir: &Path) -> PathBuf {
    dir.join(ATTACHMENT_DIR)
}

/// The keystore entry name for the production or beta variant.
pub fn app_name(beta: bool) -> &'static str {
    if beta {
        "Signal Beta"
    } else {
        "Signal"
    }
}

/// Locate the Signal Desktop profile directory.
///
/// Tries the platform config directory first, then the Flatpak and Snap
/// locations, and falls back to the default when none exists yet.
pub fn desktop_dir(beta: bool) -> Result<PathBuf> {
    let base = BaseDirs::new()
        .ok_or_else(|| StoreError::Config("cannot determine user directories".into()))?;

    let default_dir = base.config_dir().join(app_name(beta));
    if default_dir.exists() {
        return Ok(default_dir);
    }

    if !beta {
        let flatpak_dir = base
            .home_dir()
            .join(".var/app/org.signal.Signal/config/Signal");
        if flatpak_dir.exists() {
            return Ok(flatpak_dir);
        }

        let snap_dir = base
            .home_dir()
            .join("snap/signal-desktop/current/.config/Signal");
        if snap_dir.exists() {
            return Ok(snap_dir);
        }
    }

    Ok(default_dir)
}
