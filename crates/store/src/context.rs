//! The open data store.

use std::cell::{OnceCell, RefCell};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use sigvault_crypto::keystore::{self, AppIdentity, Backend};
use sigvault_crypto::{Os, RawKey, SafeStorage};

use crate::config::{self, DatabaseKey};
use crate::db::Db;
use crate::error::{Result, StoreError};
use crate::paths;
use crate::recipient::{Recipient, RecipientMaps};

const MIN_DATABASE_VERSION: i32 = 19;

/// One conversation: its opaque id plus its recipient.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: String,
    pub recipient: Rc<Recipient>,
}

/// A decrypted, read-only view of one Signal Desktop profile directory.
///
/// Owns the SQLCipher connection and the unsealed key material; both are
/// released (and the keys zeroed) on drop.
#[derive(Debug)]
pub struct Context {
    app: AppIdentity,
    db: Db,
    db_version: i32,
    db_key: DatabaseKey,
    backend: Option<Backend>,
    safe_storage: RefCell<Option<SafeStorage>>,
    recipients: OnceCell<RecipientMaps>,
}

impl Context {
    /// Unseal the database key and open the store read-only.
    ///
    /// `raw_key` overrides the OS keystore lookup and forces the modern
    /// `encryptedKey` path.
    pub fn open(app: AppIdentity, raw_key: Option<RawKey>) -> Result<Context> {
        let unsealed = config::unseal_database_key(&app, raw_key)?;

        let db_file = paths::database_file(&app.dir);
        // SQLite/SQLCipher doesn't produce a useful error message if the
        // database doesn't exist or can't be read.
        std::fs::File::open(&db_file).map_err(|e| {
            StoreError::Io(std::io::Error::new(
                e.kind(),
                format!("{}: {e}", db_file.display()),
            ))
        })?;

        let db = Db::open_ro(&db_file)?;
        db.apply_key(&unsealed.db_key.pragma_value())?;
        db.verify_key()?;

        let db_version = db.user_version()?;
        if db_version < MIN_DATABASE_VERSION {
            return Err(StoreError::UnsupportedVersion(db_version));
        }
        tracing::debug!(db_version, dir = %app.dir.display(), "database opened");

        Ok(Context {
            app,
            db,
            db_version,
            db_key: unsealed.db_key,
            backend: unsealed.backend,
            safe_storage: RefCell::new(unsealed.safe_storage),
            recipients: OnceCell::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.app.dir
    }

    pub fn db_version(&self) -> i32 {
        self.db_version
    }

    pub(crate) fn db(&self) -> &Db {
        &self.db
    }

    /// The unsealed SQLCipher key.
    pub fn database_key(&self) -> &DatabaseKey {
        &self.db_key
    }

    /// The raw safeStorage secret, fetched from the OS keystore on first
    /// use when the store was opened through the legacy plaintext key.
    pub fn encryption_key(&self) -> Result<RawKey> {
        if let Some(ss) = self.safe_storage.borrow().as_ref() {
            return Ok(ss.raw_key().clone());
        }
        let raw = keystore::fetch_raw_key(&self.app, self.backend)?;
        let ss = SafeStorage::from_raw_key(raw)?;
        let key = ss.raw_key().clone();
        *self.safe_storage.borrow_mut() = Some(ss);
        Ok(key)
    }

    /// Database integrity report; an empty result means the store is clean.
    pub fn check_database(&self) -> Result<Vec<String>> {
        let cipher_results = self.db.pragma_text_rows("cipher_integrity_check")?;
        if !cipher_results.is_empty() {
            return Ok(cipher_results);
        }

        let mut results = self.db.pragma_text_rows("integrity_check")?;
        if results.len() == 1 && results[0] == "ok" {
            results.clear();
        }

        let mut stmt = self.db.conn().prepare("PRAGMA foreign_key_check")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let table: String = row.get(0)?;
            match row.get::<_, Option<i64>>(1)? {
                Some(rowid) => results.push(format!(
                    "foreign key violation in row {rowid} of table {table}"
                )),
                None => results.push(format!("foreign key violation in table {table}")),
            }
        }

        Ok(results)
    }

    /// Run one SQL statement and return its rows rendered as text.
    pub fn query(&self, sql: &str) -> Result<Vec<Vec<String>>> {
        self.db.query_rows(sql)
    }

    /// All conversations, in database order.
    pub fn conversations(&self) -> Result<Vec<Conversation>> {
        Ok(self.recipient_maps()?.conversations())
    }

    fn recipient_maps(&self) -> Result<&RecipientMaps> {
        if let Some(maps) = self.recipients.get() {
            return Ok(maps);
        }
        let maps = RecipientMaps::load(&self.db, self.db_version)?;
        Ok(self.recipients.get_or_init(|| maps))
    }

    pub(crate) fn recipient_from_conversation_id(
        &self,
        id: &str,
    ) -> Result<Option<Rc<Recipient>>> {
        Ok(self.recipient_maps()?.by_conversation_id(id))
    }

    pub(crate) fn recipient_from_phone(&self, phone: &str) -> Result<Option<Rc<Recipient>>> {
        Ok(self.recipient_maps()?.by_phone(phone))
    }

    pub(crate) fn recipient_from_aci(&self, aci: &str) -> Result<Option<Rc<Recipient>>> {
        Ok(self.recipient_maps()?.by_aci(aci))
    }
}

/// Validate a raw safeStorage key and place it in the OS keystore.
///
/// The key must belong to the running system; the backend hint is taken
/// from the config when one exists.
pub fn import_encryption_key(app: &AppIdentity, key: Vec<u8>) -> Result<()> {
    let raw = RawKey::new(key, Os::current());
    // Rejects malformed key material before it reaches the keystore.
    let validated = SafeStorage::from_raw_key(raw)?;
    let backend = config::backend_hint(&app.dir);
    keystore::store_raw_key(app, backend, validated.raw_key())?;
    Ok(())
}

/// The files an operation on `dir` touches, for callers that sandbox
/// themselves before opening the store: the database with its WAL and
/// shared-memory siblings, the attachment tree, and SQLCipher's entropy
/// source.
pub fn intended_paths(dir: &Path) -> Vec<PathBuf> {
    let db_file = paths::database_file(dir);
    let mut wal = db_file.as_os_str().to_owned();
    wal.push("-wal");
    let mut shm = db_file.as_os_str().to_owned();
    shm.push("-shm");
    vec![
        db_file,
        PathBuf::from(wal),
        PathBuf::from(shm),
        paths::attachment_dir(dir),
        PathBuf::from("/dev/urandom"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intended_paths_cover_database_siblings() {
        let paths = intended_paths(Path::new("/profile"));
        let rendered: Vec<String> = paths
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        assert!(rendered.contains(&"/profile/sql/db.sqlite".to_string()));
        assert!(rendered.contains(&"/profile/sql/db.sqlite-wal".to_string()));
        assert!(rendered.contains(&"/profile/sql/db.sqlite-shm".to_string()));
        assert!(rendered.contains(&"/profile/attachments.noindex".to_string()));
        assert!(rendered.contains(&"/dev/urandom".to_string()));
    }
}
