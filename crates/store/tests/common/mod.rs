//! Shared fixtures: a throwaway profile directory with an encrypted
//! database, the way Signal Desktop lays one out.

// Not every test target uses every helper.
#![allow(dead_code)]

use std::fs;
use std::path::Path;

use rusqlite::Connection;
use sigvault_crypto::keystore::AppIdentity;
use sigvault_store::Context;

pub fn db_key_hex() -> String {
    "ab".repeat(32)
}

/// A profile directory with a legacy plaintext `key` in its config.
pub fn new_profile() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("config.json"),
        format!(r#"{{"key": "{}"}}"#, db_key_hex()),
    )
    .unwrap();
    fs::create_dir_all(dir.path().join("sql")).unwrap();
    dir
}

/// Create the encrypted database and pin its schema version.
pub fn create_db(profile: &Path, user_version: i32) -> Connection {
    let conn = Connection::open(profile.join("sql").join("db.sqlite")).unwrap();
    conn.execute_batch(&format!("PRAGMA key = \"x'{}'\";", db_key_hex()))
        .unwrap();
    conn.pragma_update(None, "user_version", user_version)
        .unwrap();
    conn
}

/// The conversations and messages tables as of schema version ~1275.
pub fn create_message_schema(conn: &Connection) {
    conn.execute_batch(
        "CREATE TABLE conversations (
            id TEXT PRIMARY KEY,
            json TEXT,
            type TEXT,
            name TEXT,
            profileName TEXT,
            profileFamilyName TEXT,
            profileFullName TEXT,
            e164 TEXT,
            serviceId TEXT,
            groupId TEXT
        );
        CREATE TABLE messages (
            id TEXT PRIMARY KEY,
            conversationId TEXT,
            sourceServiceId TEXT,
            type TEXT,
            body TEXT,
            json TEXT,
            sent_at INTEGER,
            received_at INTEGER,
            received_at_ms INTEGER
        );",
    )
    .unwrap();
}

pub fn insert_contact(conn: &Connection, id: &str, name: &str, phone: &str, aci: &str) {
    conn.execute(
        "INSERT INTO conversations (id, json, type, name, e164, serviceId)
         VALUES (?1, '{}', 'private', ?2, ?3, ?4)",
        rusqlite::params![id, name, phone, aci],
    )
    .unwrap();
}

#[allow(dead_code)]
pub fn insert_group(conn: &Connection, id: &str, name: &str, group_id: &str) {
    conn.execute(
        "INSERT INTO conversations (id, json, type, name, groupId)
         VALUES (?1, '{}', 'group', ?2, ?3)",
        rusqlite::params![id, name, group_id],
    )
    .unwrap();
}

pub fn open_context(profile: &Path) -> Context {
    Context::open(AppIdentity::new("Signal", profile), None).unwrap()
}
