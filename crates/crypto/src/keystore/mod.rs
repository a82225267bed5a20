//! OS keystore access for the raw safeStorage secret.
//!
//! Each platform has one or more backends holding the secret that Chromium's
//! os_crypt wrote there: the macOS Keychain, the freedesktop Secret Service
//! (GNOME Keyring), KWallet 4/5/6, or DPAPI via the `Local State` file on
//! Windows. The backend hint comes from the application's
//! `safeStorageBackend` config value; on Linux the Secret Service is the
//! default when no hint is present.
//!
//! Keystore calls block until the OS answers and may suspend on user
//! interaction (wallet unlock prompts).

use std::path::PathBuf;

use crate::error::CryptoError;
use crate::safe_storage::RawKey;

#[cfg(target_os = "macos")]
mod keychain;
#[cfg(all(unix, not(target_os = "macos")))]
mod kwallet;
#[cfg(all(unix, not(target_os = "macos")))]
mod libsecret;
#[cfg(windows)]
mod local_state;

/// The safeStorage backend selected by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Libsecret,
    Kwallet4,
    Kwallet5,
    Kwallet6,
}

impl Backend {
    /// Parse a `safeStorageBackend` config value.
    pub fn from_config(name: &str) -> Result<Backend, CryptoError> {
        match name {
            "gnome_libsecret" => Ok(Backend::Libsecret),
            "kwallet" => Ok(Backend::Kwallet4),
            "kwallet5" => Ok(Backend::Kwallet5),
            "kwallet6" => Ok(Backend::Kwallet6),
            _ => Err(CryptoError::KeystoreFailure(format!(
                "invalid or unsupported safeStorage backend: {name:?}"
            ))),
        }
    }
}

/// The application whose keystore entries are consulted.
#[derive(Debug, Clone)]
pub struct AppIdentity {
    /// Keystore entry name, e.g. `Signal` or `Signal Beta`.
    pub name: String,
    /// The application's profile directory (holds `Local State` on Windows).
    pub dir: PathBuf,
}

impl AppIdentity {
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>) -> AppIdentity {
        AppIdentity {
            name: name.into(),
            dir: dir.into(),
        }
    }
}

/// Fetch the raw safeStorage secret from the platform keystore.
#[cfg(target_os = "macos")]
pub fn fetch_raw_key(app: &AppIdentity, _backend: Option<Backend>) -> Result<RawKey, CryptoError> {
    keychain::fetch(app)
}

/// Fetch the raw safeStorage secret from the platform keystore.
#[cfg(windows)]
pub fn fetch_raw_key(app: &AppIdentity, _backend: Option<Backend>) -> Result<RawKey, CryptoError> {
    local_state::fetch(app)
}

/// Fetch the raw safeStorage secret from the platform keystore.
#[cfg(all(unix, not(target_os = "macos")))]
pub fn fetch_raw_key(app: &AppIdentity, backend: Option<Backend>) -> Result<RawKey, CryptoError> {
    match backend.unwrap_or(Backend::Libsecret) {
        Backend::Libsecret => libsecret::fetch(app),
        Backend::Kwallet4 => kwallet::fetch(kwallet::KWALLET4),
        Backend::Kwallet5 => kwallet::fetch(kwallet::KWALLET5),
        Backend::Kwallet6 => kwallet::fetch(kwallet::KWALLET6),
    }
}

/// Store a raw safeStorage secret into the platform keystore.
#[cfg(target_os = "macos")]
pub fn store_raw_key(
    app: &AppIdentity,
    _backend: Option<Backend>,
    key: &RawKey,
) -> Result<(), CryptoError> {
    keychain::store(app, key)
}

/// Store a raw safeStorage secret into the platform keystore.
#[cfg(windows)]
pub fn store_raw_key(
    app: &AppIdentity,
    _backend: Option<Backend>,
    key: &RawKey,
) -> Result<(), CryptoError> {
    local_state::store(app, key)
}

/// Store a raw safeStorage secret into the platform keystore.
#[cfg(all(unix, not(target_os = "macos")))]
pub fn store_raw_key(
    app: &AppIdentity,
    backend: Option<Backend>,
    key: &RawKey,
) -> Result<(), CryptoError> {
    match backend.unwrap_or(Backend::Libsecret) {
        Backend::Libsecret => libsecret::store(app, key),
        Backend::Kwallet4 => kwallet::store(kwallet::KWALLET4, key),
        Backend::Kwallet5 => kwallet::store(kwallet::KWALLET5, key),
        Backend::Kwallet6 => kwallet::store(kwallet::KWALLET6, key),
    }
}
