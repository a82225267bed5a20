//! `config.json` parsing and database-key unsealing.

use std::fmt;
use std::path::Path;

use serde::Deserialize;
use sigvault_crypto::keystore::{self, AppIdentity, Backend};
use sigvault_crypto::{RawKey, SafeStorage};
use zeroize::Zeroizing;

use crate::error::{Result, StoreError};
use crate::paths;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    key: Option<String>,
    #[serde(rename = "encryptedKey")]
    encrypted_key: Option<String>,
    #[serde(rename = "safeStorageBackend")]
    safe_storage_backend: Option<String>,
}

/// The unsealed SQLCipher database key.
///
/// Held as the raw character string from the config (normally 64 hex
/// digits); rendered as a blob literal so SQLCipher uses raw-key mode
/// instead of stretching a passphrase. Zeroed on drop.
pub struct DatabaseKey(Zeroizing<Vec<u8>>);

impl DatabaseKey {
    pub(crate) fn new(key: Vec<u8>) -> DatabaseKey {
        DatabaseKey(Zeroizing::new(key))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The `x'<hex>'` form expected by `PRAGMA key`.
    pub fn pragma_value(&self) -> String {
        format!("x'{}'", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for DatabaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug)]
pub(crate) struct UnsealedKeys {
    pub db_key: DatabaseKey,
    pub safe_storage: Option<SafeStorage>,
    pub backend: Option<Backend>,
}

/// Parse the config and produce the database key.
///
/// Priority: a caller-supplied raw key forces the modern `encryptedKey`
/// path; otherwise a plaintext legacy `key` wins; otherwise the sealed
/// `encryptedKey` is opened with the secret from the OS keystore.
pub(crate) fn unseal_database_key(
    app: &AppIdentity,
    raw_key: Option<RawKey>,
) -> Result<UnsealedKeys> {
    let config = parse_config_file(&app.dir)?;

    let backend = config
        .safe_storage_backend
        .as_deref()
        .map(Backend::from_config)
        .transpose()?;

    if raw_key.is_none() {
        if let Some(key) = config.key.as_deref().filter(|k| !k.is_empty()) {
            return Ok(UnsealedKeys {
                db_key: DatabaseKey::new(key.as_bytes().to_vec()),
                safe_storage: None,
                backend,
            });
        }
    }

    let encrypted_hex = config
        .encrypted_key
        .as_deref()
        .ok_or_else(|| StoreError::Config("encrypted database key not found".into()))?;
    let envelope = hex::decode(encrypted_hex)
        .map_err(|e| StoreError::Config(format!("invalid encrypted database key: {e}")))?;

    let raw = match raw_key {
        Some(key) => key,
        None => keystore::fetch_raw_key(app, backend)?,
    };
    let safe_storage = SafeStorage::from_raw_key(raw)?;
    let key = safe_storage.decrypt(&envelope).map_err(|e| {
        StoreError::Key(format!("cannot decrypt database key: {e}"))
    })?;

    Ok(UnsealedKeys {
        db_key: DatabaseKey::new(key),
        safe_storage: Some(safe_storage),
        backend,
    })
}

fn parse_config_file(dir: &Path) -> Result<ConfigFile> {
    let path = paths::config_file(dir);
    let data = std::fs::read(&path)
        .map_err(|e| StoreError::Config(format!("cannot read {}: {e}", path.display())))?;
    serde_json::from_slice(&data)
        .map_err(|e| StoreError::Config(format!("cannot parse {}: {e}", path.display())))
}

/// The backend hint from the config, for key import before a context opens.
pub(crate) fn backend_hint(dir: &Path) -> Option<Backend> {
    let config = parse_config_file(dir).ok()?;
    config
        .safe_storage_backend
        .as_deref()
        .and_then(|name| Backend::from_config(name).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigvault_crypto::Os;
    use std::fs;

    fn app_for(dir: &Path) -> AppIdentity {
        AppIdentity::new("Signal", dir)
    }

    fn write_config(dir: &Path, contents: &str) {
        fs::write(dir.join("config.json"), contents).unwrap();
    }

    #[test]
    fn legacy_key_is_used_verbatim() {
        let tmp = tempfile::tempdir().unwrap();
        write_config(tmp.path(), r#"{"key": "0123abcd"}"#);

        let unsealed = unseal_database_key(&app_for(tmp.path()), None).unwrap();
        assert_eq!(unsealed.db_key.as_bytes(), b"0123abcd");
        assert!(unsealed.safe_storage.is_none());
        assert_eq!(unsealed.db_key.pragma_value(), "x'0123abcd'");
    }

    #[test]
    fn override_forces_modern_key_path() {
        let tmp = tempfile::tempdir().unwrap();

        let raw = RawKey::new(b"pass".to_vec(), Os::Linux);
        let ss = SafeStorage::from_raw_key(raw.clone()).unwrap();
        let envelope = ss.encrypt(b"DBKEY").unwrap();
        write_config(
            tmp.path(),
            &format!(
                r#"{{"key": "deadbeef", "encryptedKey": "{}"}}"#,
                hex::encode(&envelope)
            ),
        );

        let unsealed = unseal_database_key(&app_for(tmp.path()), Some(raw)).unwrap();
        assert_eq!(unsealed.db_key.as_bytes(), b"DBKEY");
        assert!(unsealed.safe_storage.is_some());
    }

    #[test]
    fn modern_path_decrypts_sealed_key() {
        let tmp = tempfile::tempdir().unwrap();

        let raw = RawKey::new(b"pass".to_vec(), Os::Linux);
        let ss = SafeStorage::from_raw_key(raw.clone()).unwrap();
        let envelope = ss.encrypt(b"DBKEY").unwrap();
        write_config(
            tmp.path(),
            &format!(r#"{{"encryptedKey": "{}"}}"#, hex::encode(&envelope)),
        );

        let unsealed = unseal_database_key(&app_for(tmp.path()), Some(raw)).unwrap();
        assert_eq!(unsealed.db_key.as_bytes(), b"DBKEY");
    }

    #[test]
    fn missing_config_file_is_a_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = unseal_database_key(&app_for(tmp.path()), None).unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn malformed_config_is_a_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        write_config(tmp.path(), "{not json");
        let err = unseal_database_key(&app_for(tmp.path()), None).unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn missing_keys_are_a_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        write_config(tmp.path(), "{}");
        let err = unseal_database_key(&app_for(tmp.path()), None).unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn invalid_encrypted_key_hex_is_a_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        write_config(tmp.path(), r#"{"encryptedKey": "zz"}"#);
        let raw = RawKey::new(b"pass".to_vec(), Os::Linux);
        let err = unseal_database_key(&app_for(tmp.path()), Some(raw)).unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn wrong_override_key_fails_decryption() {
        let tmp = tempfile::tempdir().unwrap();

        let ss =
            SafeStorage::from_raw_key(RawKey::new(b"pass".to_vec(), Os::Linux)).unwrap();
        let envelope = ss.encrypt(b"DBKEY").unwrap();
        write_config(
            tmp.path(),
            &format!(r#"{{"encryptedKey": "{}"}}"#, hex::encode(&envelope)),
        );

        let wrong = RawKey::new(b"wrong".to_vec(), Os::Linux);
        // A wrong key almost always trips the padding check; if the garbage
        // plaintext happens to unpad, it still cannot equal the real key.
        match unseal_database_key(&app_for(tmp.path()), Some(wrong)) {
            Err(err) => assert!(matches!(err, StoreError::Key(_))),
            Ok(unsealed) => assert_ne!(unsealed.db_key.as_bytes(), b"DBKEY"),
        }
    }

    #[test]
    fn unsupported_backend_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        write_config(
            tmp.path(),
            r#"{"key": "aa", "safeStorageBackend": "basic_text"}"#,
        );
        let err = unseal_database_key(&app_for(tmp.path()), None).unwrap_err();
        assert!(matches!(err, StoreError::Crypto(_)));
    }
}
