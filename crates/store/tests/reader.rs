//! Reader tests against fixture databases.

mod common;

use base64::prelude::*;
use common::*;
use sigvault_crypto::keystore::AppIdentity;
use sigvault_store::{Context, Interval, StoreError};

fn insert_message(
    conn: &rusqlite::Connection,
    id: &str,
    conversation: &str,
    source_aci: Option<&str>,
    kind: &str,
    body: &str,
    json: &str,
    sent_at: i64,
    received_at: i64,
    received_at_ms: Option<i64>,
) {
    conn.execute(
        "INSERT INTO messages
         (id, conversationId, sourceServiceId, type, body, json, sent_at, received_at, received_at_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
            id,
            conversation,
            source_aci,
            kind,
            body,
            json,
            sent_at,
            received_at,
            received_at_ms
        ],
    )
    .unwrap();
}

#[test]
fn messages_are_ordered_and_timed() {
    let profile = new_profile();
    let conn = create_db(profile.path(), 1275);
    create_message_schema(&conn);
    insert_contact(&conn, "conv1", "Alice", "+31611111111", "aci-alice");
    insert_contact(&conn, "conv2", "Bob", "+31622222222", "aci-bob");

    // Inserted out of order; received_at is the ordering counter.
    insert_message(
        &conn, "m2", "conv1", None, "outgoing", "second", "{}", 2000, 20, Some(2_000_000),
    );
    insert_message(
        &conn,
        "m1",
        "conv1",
        Some("aci-bob"),
        "incoming",
        "first",
        "{}",
        1000,
        10,
        Some(1_000_000),
    );
    drop(conn);

    let ctx = open_context(profile.path());
    let conversations = ctx.conversations().unwrap();
    let conv = conversations.iter().find(|c| c.id == "conv1").unwrap();

    let messages = ctx.conversation_messages(conv, Interval::default()).unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].body.text, "first");
    assert_eq!(messages[1].body.text, "second");
    for pair in messages.windows(2) {
        assert!(
            (pair[0].time_recv, pair[0].time_sent) <= (pair[1].time_recv, pair[1].time_sent)
        );
    }

    // The incoming message resolves its sender through the service id.
    let source = messages[0].source.as_ref().unwrap();
    assert_eq!(source.display_name(), "Bob");
    assert!(messages[1].source.is_none());
    assert!(messages[1].is_outgoing());
}

#[test]
fn received_time_falls_back_to_row_json() {
    let profile = new_profile();
    let conn = create_db(profile.path(), 1275);
    create_message_schema(&conn);
    insert_contact(&conn, "conv1", "Alice", "+31611111111", "aci-alice");

    insert_message(
        &conn,
        "m1",
        "conv1",
        None,
        "outgoing",
        "hello",
        r#"{"received_at_ms": 1700000000000}"#,
        1000,
        10,
        None,
    );
    insert_message(
        &conn,
        "m2",
        "conv1",
        None,
        "outgoing",
        "old style",
        r#"{"received_at": 1600000000000}"#,
        2000,
        20,
        None,
    );
    drop(conn);

    let ctx = open_context(profile.path());
    let conv = ctx.conversations().unwrap().remove(0);
    let messages = ctx.conversation_messages(&conv, Interval::default()).unwrap();
    assert_eq!(messages[0].time_recv, 1700000000000);
    assert_eq!(messages[1].time_recv, 1600000000000);
}

#[test]
fn mentions_are_spliced_into_the_body() {
    let profile = new_profile();
    let conn = create_db(profile.path(), 1275);
    create_message_schema(&conn);
    insert_contact(&conn, "conv1", "Alice", "+31611111111", "aci-alice");

    insert_message(
        &conn,
        "m1",
        "conv1",
        None,
        "outgoing",
        "hi \u{fffc}!",
        r#"{"bodyRanges": [{"start": 3, "length": 1, "mentionAci": "ACI-ALICE"}]}"#,
        1000,
        10,
        Some(1_000_000),
    );
    drop(conn);

    let ctx = open_context(profile.path());
    let conv = ctx.conversations().unwrap().remove(0);
    let messages = ctx.conversation_messages(&conv, Interval::default()).unwrap();

    // ACI lookups are case-insensitive.
    assert_eq!(messages[0].body.text, "hi @Alice!");
    assert_eq!(messages[0].body.mentions.len(), 1);
    assert_eq!(messages[0].body.mentions[0].start, 3);
    assert_eq!(messages[0].body.mentions[0].length, 6);
}

#[test]
fn invalid_mentions_drop_but_keep_text() {
    let profile = new_profile();
    let conn = create_db(profile.path(), 1275);
    create_message_schema(&conn);
    insert_contact(&conn, "conv1", "Alice", "+31611111111", "aci-alice");

    insert_message(
        &conn,
        "m1",
        "conv1",
        None,
        "outgoing",
        "abc",
        r#"{"bodyRanges": [{"start": 99, "length": 1, "mentionAci": "aci-alice"}]}"#,
        1000,
        10,
        Some(1_000_000),
    );
    drop(conn);

    let ctx = open_context(profile.path());
    let conv = ctx.conversations().unwrap().remove(0);
    let messages = ctx.conversation_messages(&conv, Interval::default()).unwrap();
    assert_eq!(messages[0].body.text, "abc");
    assert!(messages[0].body.mentions.is_empty());
}

#[test]
fn quotes_and_reactions_resolve_recipients() {
    let profile = new_profile();
    let conn = create_db(profile.path(), 1275);
    create_message_schema(&conn);
    insert_contact(&conn, "conv1", "Alice", "+31611111111", "aci-alice");
    insert_contact(&conn, "conv2", "Bob", "+31622222222", "aci-bob");

    let json = r#"{
        "quote": {"id": "1000", "authorAci": "aci-bob", "text": "first"},
        "reactions": [
            {"emoji": "x", "fromId": "conv2", "targetTimestamp": 5, "timestamp": 7},
            {"emoji": "y", "fromId": "+31611111111", "targetTimestamp": 6, "timestamp": 8}
        ]
    }"#;
    insert_message(
        &conn, "m1", "conv1", None, "outgoing", "reply", json, 2000, 20, Some(2_000_000),
    );
    drop(conn);

    let ctx = open_context(profile.path());
    let conv = ctx.conversations().unwrap().remove(0);
    let messages = ctx.conversation_messages(&conv, Interval::default()).unwrap();
    let msg = &messages[0];

    let quote = msg.quote.as_ref().unwrap();
    // The numeric-string id parses like a plain number.
    assert_eq!(quote.id, 1000);
    assert_eq!(quote.recipient.as_ref().unwrap().display_name(), "Bob");
    assert_eq!(quote.body.text, "first");

    assert_eq!(msg.reactions.len(), 2);
    assert_eq!(
        msg.reactions[0].recipient.as_ref().unwrap().display_name(),
        "Bob"
    );
    assert_eq!(
        msg.reactions[1].recipient.as_ref().unwrap().display_name(),
        "Alice"
    );
    assert_eq!(msg.reactions[0].time_sent, 5);
    assert_eq!(msg.reactions[0].time_recv, 7);
}

#[test]
fn interval_bounds_apply_to_sent_time() {
    let profile = new_profile();
    let conn = create_db(profile.path(), 1275);
    create_message_schema(&conn);
    insert_contact(&conn, "conv1", "Alice", "+31611111111", "aci-alice");

    for (id, sent) in [("m1", 1000i64), ("m2", 2000), ("m3", 3000)] {
        insert_message(
            &conn, id, "conv1", None, "outgoing", id, "{}", sent, sent, Some(sent),
        );
    }
    drop(conn);

    let ctx = open_context(profile.path());
    let conv = ctx.conversations().unwrap().remove(0);

    use chrono::{Local, TimeZone};
    let at = |ms: i64| Local.timestamp_millis_opt(ms).single().unwrap();

    let after = ctx
        .conversation_messages(
            &conv,
            Interval {
                min: Some(at(1500)),
                max: None,
            },
        )
        .unwrap();
    assert_eq!(after.len(), 2);

    let between = ctx
        .conversation_messages(
            &conv,
            Interval {
                min: Some(at(1500)),
                max: Some(at(2500)),
            },
        )
        .unwrap();
    assert_eq!(between.len(), 1);
    assert_eq!(between[0].body.text, "m2");

    let before = ctx
        .conversation_messages(
            &conv,
            Interval {
                min: None,
                max: Some(at(2500)),
            },
        )
        .unwrap();
    assert_eq!(before.len(), 2);
}

#[test]
fn attachments_decrypt_end_to_end() {
    use sigvault_crypto::cipher::{aes_cbc_encrypt, hmac_sha256};

    let profile = new_profile();
    let conn = create_db(profile.path(), 1275);
    create_message_schema(&conn);
    insert_contact(&conn, "conv1", "Alice", "+31611111111", "aci-alice");

    // Build an encrypted blob at attachments.noindex/ab/cd.
    let cipher_key = [1u8; 32];
    let mac_key = [2u8; 32];
    let iv = [3u8; 16];
    let ciphertext = aes_cbc_encrypt(&cipher_key, &iv, b"HELLO").unwrap();
    let mac = hmac_sha256(&mac_key, &[&iv, ciphertext.as_slice()]).unwrap();
    let mut blob = iv.to_vec();
    blob.extend_from_slice(&ciphertext);
    blob.extend_from_slice(&mac);

    let att_dir = profile.path().join("attachments.noindex").join("ab");
    std::fs::create_dir_all(&att_dir).unwrap();
    std::fs::write(att_dir.join("cd"), &blob).unwrap();

    let mut keys = cipher_key.to_vec();
    keys.extend_from_slice(&mac_key);
    let json = format!(
        r#"{{"attachments": [{{
            "contentType": "image/png",
            "fileName": "cat.png",
            "version": 2,
            "path": "ab/cd",
            "localKey": "{}",
            "size": 5
        }}]}}"#,
        BASE64_STANDARD.encode(&keys)
    );
    insert_message(
        &conn, "m1", "conv1", None, "outgoing", "", &json, 1000, 10, Some(1_000_000),
    );
    drop(conn);

    let ctx = open_context(profile.path());
    let conv = ctx.conversations().unwrap().remove(0);
    let attachments = ctx
        .conversation_attachments(&conv, Interval::default())
        .unwrap();
    assert_eq!(attachments.len(), 1);
    assert_eq!(attachments[0].file_name.as_deref(), Some("cat.png"));

    let mut out = Vec::new();
    ctx.write_attachment(&attachments[0], &mut out).unwrap();
    assert_eq!(out, b"HELLO");

    // A tampered blob must be rejected.
    let path = ctx.attachment_path(&attachments[0]).unwrap();
    let mut tampered = std::fs::read(&path).unwrap();
    let last = tampered.len() - 1;
    tampered[last] ^= 1;
    std::fs::write(&path, &tampered).unwrap();
    let err = ctx.read_attachment(&attachments[0]).unwrap_err();
    assert!(matches!(err, StoreError::Attachment(_)));
}

#[test]
fn wrong_database_key_fails_verification() {
    let profile = new_profile();
    let conn = create_db(profile.path(), 1275);
    create_message_schema(&conn);
    drop(conn);

    std::fs::write(
        profile.path().join("config.json"),
        format!(r#"{{"key": "{}"}}"#, "cd".repeat(32)),
    )
    .unwrap();

    let err = Context::open(AppIdentity::new("Signal", profile.path()), None).unwrap_err();
    assert!(matches!(err, StoreError::KeyVerify(_)));
}

#[test]
fn old_schema_versions_are_rejected() {
    let profile = new_profile();
    let conn = create_db(profile.path(), 18);
    drop(conn);

    let err = Context::open(AppIdentity::new("Signal", profile.path()), None).unwrap_err();
    assert!(matches!(err, StoreError::UnsupportedVersion(18)));
}

#[test]
fn sealed_key_opens_with_override() {
    use sigvault_crypto::{Os, RawKey, SafeStorage};

    let profile = new_profile();
    let conn = create_db(profile.path(), 1275);
    create_message_schema(&conn);
    drop(conn);

    // Re-seal the database key under a raw secret and switch the config to
    // the modern encryptedKey form.
    let raw = RawKey::new(b"pass".to_vec(), Os::Linux);
    let ss = SafeStorage::from_raw_key(raw.clone()).unwrap();
    let envelope = ss.encrypt(db_key_hex().as_bytes()).unwrap();
    std::fs::write(
        profile.path().join("config.json"),
        format!(r#"{{"encryptedKey": "{}"}}"#, hex::encode(&envelope)),
    )
    .unwrap();

    let ctx = Context::open(AppIdentity::new("Signal", profile.path()), Some(raw)).unwrap();
    assert_eq!(ctx.db_version(), 1275);
    assert_eq!(ctx.database_key().as_bytes(), db_key_hex().as_bytes());
}
