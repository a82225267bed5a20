//! macOS Keychain backend.
//!
//! Chromium's os_crypt stores the secret as a generic password with
//! service `"<app> Safe Storage"` and account `<app>`.

use keyring::Entry;

use crate::error::CryptoError;
use crate::keystore::AppIdentity;
use crate::safe_storage::{Os, RawKey};

const SERVICE_SUFFIX: &str = " Safe Storage";

fn entry(app: &AppIdentity) -> Result<Entry, CryptoError> {
    Ok(Entry::new(
        &format!("{}{SERVICE_SUFFIX}", app.name),
        &app.name,
    )?)
}

pub fn fetch(app: &AppIdentity) -> Result<RawKey, CryptoError> {
    let password = entry(app)?.get_password()?;
    Ok(RawKey::new(password.into_bytes(), Os::Macos))
}

pub fn store(app: &AppIdentity, key: &RawKey) -> Result<(), CryptoError> {
    let password = std::str::from_utf8(key.bytes())
        .map_err(|_| CryptoError::InvalidKey("key is not valid UTF-8".into()))?;
    entry(app)?.set_password(password)?;
    Ok(())
}
