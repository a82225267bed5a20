//! SQLCipher connection wrapper.
//!
//! Wraps a [`rusqlite::Connection`] against the bundled SQLCipher build.
//! Keys are installed as `x'<hex>'` blob literals through `execute_batch`:
//! the literal cannot be a bound parameter, and a quoted passphrase would
//! be PBKDF2-stretched by SQLCipher into a different key.

use std::path::Path;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};

use crate::error::{Result, StoreError};

#[derive(Debug)]
pub struct Db {
    conn: Connection,
}

impl Db {
    /// Open an existing database file read-only.
    pub fn open_ro(path: &Path) -> Result<Db> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Db { conn })
    }

    /// Open a fresh in-memory database (used for the export clone).
    pub fn open_in_memory() -> Result<Db> {
        Ok(Db {
            conn: Connection::open_in_memory()?,
        })
    }

    #[cfg(test)]
    pub fn open_rw(path: &Path) -> Result<Db> {
        Ok(Db {
            conn: Connection::open(path)?,
        })
    }

    /// Install an encryption key. `value` is the verbatim pragma value,
    /// normally the `x'<hex>'` blob literal from
    /// [`DatabaseKey::pragma_value`](crate::DatabaseKey::pragma_value).
    pub fn apply_key(&self, value: &str) -> Result<()> {
        self.conn
            .execute_batch(&format!("PRAGMA key = \"{value}\";"))?;
        Ok(())
    }

    /// Probe the database with a harmless read. Any failure here means the
    /// key is wrong (or the file is not a database), not that the SQL is.
    pub fn verify_key(&self) -> Result<()> {
        self.conn
            .query_row("SELECT count(*) FROM sqlite_master", [], |_| Ok(()))
            .map_err(StoreError::KeyVerify)
    }

    pub fn user_version(&self) -> Result<i32> {
        Ok(self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }

    pub fn set_user_version(&self, schema: &str, version: i32) -> Result<()> {
        self.conn.pragma_update(
            Some(rusqlite::DatabaseName::Attached(schema)),
            "user_version",
            version,
        )?;
        Ok(())
    }

    pub fn exec(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    /// Run one statement and collect every row with its columns rendered
    /// as text, the way the `query-database` command prints them.
    pub fn query_rows(&self, sql: &str) -> Result<Vec<Vec<String>>> {
        let mut stmt = self.conn.prepare(sql)?;
        let column_count = stmt.column_count();
        let mut rows = stmt.query([])?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut columns = Vec::with_capacity(column_count);
            for i in 0..column_count {
                columns.push(render_value(row.get_ref(i)?));
            }
            out.push(columns);
        }
        Ok(out)
    }

    /// Rows of a pragma whose results are single text columns.
    pub fn pragma_text_rows(&self, pragma: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(&format!("PRAGMA {pragma}"))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

fn render_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(v) => v.to_string(),
        ValueRef::Real(v) => v.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => String::from_utf8_lossy(b).into_owned(),
    }
}
