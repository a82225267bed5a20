//! KWallet backend (kwalletd 4/5/6 over D-Bus).
//!
//! Chromium's os_crypt stores the secret as a password entry named
//! `"Chromium Safe Storage"` in the `"Chromium Keys"` folder of the
//! network wallet. The wallet open call may block on the user's unlock
//! prompt.

use zbus::blocking::{Connection, Proxy};

use crate::error::CryptoError;
use crate::safe_storage::{Os, RawKey};

const KWALLET_IFACE: &str = "org.kde.KWallet";

/// (bus name, object path) per kwalletd generation.
pub(super) const KWALLET4: (&str, &str) = ("org.kde.kwalletd", "/modules/kwalletd");
pub(super) const KWALLET5: (&str, &str) = ("org.kde.kwalletd5", "/modules/kwalletd5");
pub(super) const KWALLET6: (&str, &str) = ("org.kde.kwalletd6", "/modules/kwalletd6");

const FOLDER: &str = "Chromium Keys";
const ENTRY: &str = "Chromium Safe Storage";
const INVALID_HANDLE: i32 = -1;
const ENTRY_TYPE_PASSWORD: i32 = 1;

fn app_id() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "sigvault".to_string())
}

struct Wallet<'a> {
    proxy: Proxy<'a>,
    handle: i32,
    app_id: String,
}

impl Wallet<'_> {
    fn open(service: (&str, &str)) -> Result<Wallet<'static>, CryptoError> {
        let conn = Connection::session().map_err(|e| {
            CryptoError::KeystoreUnavailable(format!("cannot connect to D-Bus session bus: {e}"))
        })?;
        let proxy = Proxy::new(&conn, service.0.to_string(), service.1.to_string(), KWALLET_IFACE)
            .map_err(dbus_err)?;

        let wallet: String = proxy.call("networkWallet", &()).map_err(dbus_err)?;
        let app_id = app_id();

        // We have no window ID to attach the unlock prompt to.
        let handle: i32 = proxy
            .call("open", &(&wallet, 0i64, &app_id))
            .map_err(dbus_err)?;
        if handle == INVALID_HANDLE {
            return Err(CryptoError::KeystoreFailure(format!(
                "cannot open wallet {wallet:?}: invalid handle"
            )));
        }

        Ok(Wallet { proxy, handle, app_id })
    }

    fn read_key(&self) -> Result<RawKey, CryptoError> {
        let has_entry: bool = self
            .proxy
            .call("hasEntry", &(self.handle, FOLDER, ENTRY, &self.app_id))
            .map_err(dbus_err)?;
        if !has_entry {
            return Err(CryptoError::KeystoreEntryNotFound);
        }

        let entry_type: i32 = self
            .proxy
            .call("entryType", &(self.handle, FOLDER, ENTRY, &self.app_id))
            .map_err(dbus_err)?;
        if entry_type != ENTRY_TYPE_PASSWORD {
            return Err(CryptoError::KeystoreFailure(format!(
                "unexpected wallet entry type: {entry_type}"
            )));
        }

        let key: String = self
            .proxy
            .call("readPassword", &(self.handle, FOLDER, ENTRY, &self.app_id))
            .map_err(dbus_err)?;
        Ok(RawKey::new(key.into_bytes(), Os::Linux))
    }

    fn write_key(&self, key: &RawKey) -> Result<(), CryptoError> {
        let password = std::str::from_utf8(key.bytes())
            .map_err(|_| CryptoError::InvalidKey("key is not valid UTF-8".into()))?;
        let status: i32 = self
            .proxy
            .call(
                "writePassword",
                &(self.handle, FOLDER, ENTRY, password, &self.app_id),
            )
            .map_err(dbus_err)?;
        if status != 0 {
            return Err(CryptoError::KeystoreFailure(format!(
                "cannot write wallet entry: status {status}"
            )));
        }
        Ok(())
    }
}

impl Drop for Wallet<'_> {
    fn drop(&mut self) {
        let _: Result<i32, _> = self.proxy.call("close", &(self.handle, false, &self.app_id));
    }
}

pub fn fetch(service: (&str, &str)) -> Result<RawKey, CryptoError> {
    Wallet::open(service)?.read_key()
}

pub fn store(service: (&str, &str), key: &RawKey) -> Result<(), CryptoError> {
    Wallet::open(service)?.write_key(key)
}

fn dbus_err(err: zbus::Error) -> CryptoError {
    CryptoError::KeystoreFailure(format!("cannot access wallet: {err}"))
}
