//! freedesktop Secret Service backend (GNOME Keyring).
//!
//! Chromium's os_crypt stores the secret under the schema
//! `chrome_libsecret_os_crypt_password_v2` with an `application` attribute
//! naming the app. libsecret records the schema name itself in the
//! `xdg:schema` attribute, so the lookup searches on both.

use std::collections::HashMap;

use zbus::blocking::{Connection, Proxy};
use zvariant::{OwnedObjectPath, OwnedValue, Type, Value};

use crate::error::CryptoError;
use crate::keystore::AppIdentity;
use crate::safe_storage::{Os, RawKey};

const SECRETS_BUS: &str = "org.freedesktop.secrets";
const SECRETS_PATH: &str = "/org/freedesktop/secrets";
const SERVICE_IFACE: &str = "org.freedesktop.Secret.Service";
const ITEM_IFACE: &str = "org.freedesktop.Secret.Item";
const COLLECTION_IFACE: &str = "org.freedesktop.Secret.Collection";
const DEFAULT_COLLECTION: &str = "/org/freedesktop/secrets/aliases/default";

const SCHEMA: &str = "chrome_libsecret_os_crypt_password_v2";
const SCHEMA_ATTR: &str = "xdg:schema";
const APPLICATION_ATTR: &str = "application";

/// The Secret Service wire representation of a secret.
#[derive(Debug, Type, serde::Serialize, serde::Deserialize)]
struct Secret {
    session: OwnedObjectPath,
    parameters: Vec<u8>,
    value: Vec<u8>,
    content_type: String,
}

fn connect() -> Result<Connection, CryptoError> {
    Connection::session().map_err(|e| {
        CryptoError::KeystoreUnavailable(format!("cannot connect to D-Bus session bus: {e}"))
    })
}

fn service_proxy(conn: &Connection) -> Result<Proxy<'_>, CryptoError> {
    Proxy::new(conn, SECRETS_BUS, SECRETS_PATH, SERVICE_IFACE).map_err(dbus_err)
}

fn open_session(service: &Proxy<'_>) -> Result<OwnedObjectPath, CryptoError> {
    let (_, session): (OwnedValue, OwnedObjectPath) = service
        .call("OpenSession", &("plain", Value::from("")))
        .map_err(dbus_err)?;
    Ok(session)
}

fn attributes(app_name: &str) -> HashMap<String, String> {
    HashMap::from([
        (SCHEMA_ATTR.to_string(), SCHEMA.to_string()),
        (APPLICATION_ATTR.to_string(), app_name.to_string()),
    ])
}

pub fn fetch(app: &AppIdentity) -> Result<RawKey, CryptoError> {
    let conn = connect()?;
    let service = service_proxy(&conn)?;
    let session = open_session(&service)?;

    let (unlocked, locked): (Vec<OwnedObjectPath>, Vec<OwnedObjectPath>) = service
        .call("SearchItems", &(attributes(&app.name),))
        .map_err(dbus_err)?;

    let item = match unlocked.into_iter().next() {
        Some(path) => path,
        None => {
            if locked.is_empty() {
                return Err(CryptoError::KeystoreEntryNotFound);
            }
            let (mut newly_unlocked, _prompt): (Vec<OwnedObjectPath>, OwnedObjectPath) =
                service.call("Unlock", &(locked,)).map_err(dbus_err)?;
            match newly_unlocked.pop() {
                Some(path) => path,
                None => {
                    return Err(CryptoError::KeystoreFailure(
                        "keystore entry is locked".into(),
                    ))
                }
            }
        }
    };

    let item_proxy =
        Proxy::new(&conn, SECRETS_BUS, item.as_str().to_string(), ITEM_IFACE).map_err(dbus_err)?;
    let secret: Secret = item_proxy
        .call("GetSecret", &(&session,))
        .map_err(dbus_err)?;

    Ok(RawKey::new(secret.value, Os::Linux))
}

pub fn store(app: &AppIdentity, key: &RawKey) -> Result<(), CryptoError> {
    let conn = connect()?;
    let service = service_proxy(&conn)?;
    let session = open_session(&service)?;

    let collection = Proxy::new(&conn, SECRETS_BUS, DEFAULT_COLLECTION, COLLECTION_IFACE)
        .map_err(dbus_err)?;

    let mut properties: HashMap<&str, Value<'_>> = HashMap::new();
    properties.insert(
        "org.freedesktop.Secret.Item.Label",
        Value::from(format!("{} Safe Storage", app.name)),
    );
    properties.insert(
        "org.freedesktop.Secret.Item.Attributes",
        Value::from(attributes(&app.name)),
    );

    let secret = Secret {
        session,
        parameters: Vec::new(),
        value: key.bytes().to_vec(),
        content_type: "text/plain".into(),
    };

    let (_item, _prompt): (OwnedObjectPath, OwnedObjectPath) = collection
        .call("CreateItem", &(properties, &secret, true))
        .map_err(dbus_err)?;

    Ok(())
}

fn dbus_err(err: zbus::Error) -> CryptoError {
    CryptoError::KeystoreFailure(format!("cannot access secret service: {err}"))
}
