//! Encrypted-to-plaintext database export.

use std::path::Path;

use rusqlite::backup::{Backup, StepResult};

use crate::context::Context;
use crate::db::Db;
use crate::error::{Result, StoreError};

impl Context {
    /// Decrypt the database into a fresh plaintext file at `path`.
    ///
    /// SQLCipher's recommended decrypt recipe (attach a plaintext database
    /// and `sqlcipher_export` into it) needs a writable source, but this
    /// store is open read-only because the host application may still be
    /// using it. Since SQLCipher 4.3.0 the backup API supports
    /// encrypted-to-encrypted copies, which allows a detour:
    ///
    /// 1. Back up the read-only source to a temporary encrypted in-memory
    ///    database (keyed with a dummy passphrase to switch the paging
    ///    layer to encrypted mode).
    /// 2. Attach `path` as a plaintext database to the clone.
    /// 3. `sqlcipher_export` into it and carry over `user_version`.
    ///
    /// The caller must create `path` with exclusive-create flags before
    /// calling: SQLCipher silently overwrites existing files.
    pub fn write_database(&self, path: &Path) -> Result<()> {
        let path_str = path
            .to_str()
            .ok_or_else(|| StoreError::Backup("export path is not valid UTF-8".into()))?;

        let mut clone = Db::open_in_memory()?;
        clone.apply_key("x")?;

        {
            let backup = Backup::new(self.db().conn(), clone.conn_mut())?;
            loop {
                match backup.step(-1)? {
                    StepResult::Done => break,
                    StepResult::More => continue,
                    StepResult::Busy | StepResult::Locked => {
                        return Err(StoreError::Backup("source database is busy".into()))
                    }
                    _ => unreachable!("unknown rusqlite backup::StepResult variant"),
                }
            }
        }

        clone
            .conn()
            .execute("ATTACH DATABASE ?1 AS plaintext KEY ''", [path_str])?;

        clone.exec("BEGIN TRANSACTION")?;
        {
            let mut stmt = clone.conn().prepare("SELECT sqlcipher_export('plaintext')")?;
            let mut rows = stmt.query([])?;
            while rows.next()?.is_some() {}
        }
        clone.set_user_version("plaintext", self.db_version())?;
        clone.exec("END TRANSACTION")?;
        clone.exec("DETACH DATABASE plaintext")?;

        Ok(())
    }
}
