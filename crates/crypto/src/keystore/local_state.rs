//! Windows backend: DPAPI plus the `Local State` file.
//!
//! Chromium's os_crypt keeps `os_crypt.encrypted_key` in `Local State`:
//! base64 of the ASCII prefix `DPAPI` followed by the DPAPI-wrapped
//! 32-byte AES key. The unwrapped key is re-encoded as base64 to form the
//! portable raw secret.

use std::ptr;

use base64::prelude::*;
use serde_json::{Map, Value};
use windows_sys::Win32::Foundation::LocalFree;
use windows_sys::Win32::Security::Cryptography::{
    CryptProtectData, CryptUnprotectData, CRYPT_INTEGER_BLOB, CRYPTPROTECT_UI_FORBIDDEN,
};

use crate::error::CryptoError;
use crate::keystore::AppIdentity;
use crate::safe_storage::{Os, RawKey};

const LOCAL_STATE_FILE: &str = "Local State";
const DPAPI_PREFIX: &[u8] = b"DPAPI";
const KEY_SIZE: usize = 32;

pub fn fetch(app: &AppIdentity) -> Result<RawKey, CryptoError> {
    let path = app.dir.join(LOCAL_STATE_FILE);
    let data = std::fs::read(&path).map_err(|e| {
        CryptoError::KeystoreFailure(format!("cannot read {}: {e}", path.display()))
    })?;

    let state: Value = serde_json::from_slice(&data).map_err(|e| {
        CryptoError::KeystoreFailure(format!("cannot parse {}: {e}", path.display()))
    })?;
    let encrypted_key = state
        .get("os_crypt")
        .and_then(|v| v.get("encrypted_key"))
        .and_then(Value::as_str)
        .ok_or(CryptoError::KeystoreEntryNotFound)?;

    let wrapped = BASE64_STANDARD
        .decode(encrypted_key)
        .map_err(|e| CryptoError::InvalidKey(format!("cannot decode encryption key: {e}")))?;
    let wrapped = wrapped
        .strip_prefix(DPAPI_PREFIX)
        .ok_or_else(|| CryptoError::InvalidKey("unsupported encryption key format".into()))?;

    let key = dpapi_unprotect(wrapped)?;
    if key.len() != KEY_SIZE {
        return Err(CryptoError::InvalidKey(
            "invalid encryption key length".into(),
        ));
    }

    Ok(RawKey::new(
        BASE64_STANDARD.encode(&key).into_bytes(),
        Os::Windows,
    ))
}

pub fn store(app: &AppIdentity, key: &RawKey) -> Result<(), CryptoError> {
    let decoded = BASE64_STANDARD
        .decode(key.bytes())
        .map_err(|e| CryptoError::InvalidKey(format!("invalid encryption key: {e}")))?;
    if decoded.len() != KEY_SIZE {
        return Err(CryptoError::InvalidKey(
            "invalid encryption key length".into(),
        ));
    }

    let mut wrapped = DPAPI_PREFIX.to_vec();
    wrapped.extend_from_slice(&dpapi_protect(&decoded)?);

    let path = app.dir.join(LOCAL_STATE_FILE);
    let mut state: Map<String, Value> = match std::fs::read(&path) {
        Ok(data) => serde_json::from_slice(&data).map_err(|e| {
            CryptoError::KeystoreFailure(format!("cannot parse {}: {e}", path.display()))
        })?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
        Err(e) => {
            return Err(CryptoError::KeystoreFailure(format!(
                "cannot read {}: {e}",
                path.display()
            )))
        }
    };

    let os_crypt = state
        .entry("os_crypt".to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    match os_crypt {
        Value::Object(map) => {
            map.insert(
                "encrypted_key".to_string(),
                Value::String(BASE64_STANDARD.encode(&wrapped)),
            );
        }
        _ => {
            return Err(CryptoError::KeystoreFailure(
                "malformed os_crypt section in Local State".into(),
            ))
        }
    }

    let rendered = serde_json::to_vec_pretty(&state).map_err(|e| {
        CryptoError::KeystoreFailure(format!("cannot encode Local State: {e}"))
    })?;
    std::fs::write(&path, rendered).map_err(|e| {
        CryptoError::KeystoreFailure(format!("cannot write {}: {e}", path.display()))
    })
}

fn dpapi_unprotect(ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    dpapi_call(ciphertext, |input, output| unsafe {
        CryptUnprotectData(
            input,
            ptr::null_mut(),
            ptr::null(),
            ptr::null(),
            ptr::null(),
            CRYPTPROTECT_UI_FORBIDDEN,
            output,
        )
    })
}

fn dpapi_protect(plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    dpapi_call(plaintext, |input, output| unsafe {
        CryptProtectData(
            input,
            ptr::null(),
            ptr::null(),
            ptr::null(),
            ptr::null(),
            CRYPTPROTECT_UI_FORBIDDEN,
            output,
        )
    })
}

fn dpapi_call(
    data: &[u8],
    call: impl FnOnce(*const CRYPT_INTEGER_BLOB, *mut CRYPT_INTEGER_BLOB) -> i32,
) -> Result<Vec<u8>, CryptoError> {
    if data.is_empty() {
        return Err(CryptoError::BadLength);
    }
    let input = CRYPT_INTEGER_BLOB {
        cbData: data.len() as u32,
        pbData: data.as_ptr() as *mut u8,
    };
    let mut output = CRYPT_INTEGER_BLOB {
        cbData: 0,
        pbData: ptr::null_mut(),
    };

    let status = call(&input, &mut output);
    if status == 0 {
        return Err(CryptoError::KeystoreFailure("DPAPI call failed".into()));
    }

    let result = unsafe {
        std::slice::from_raw_parts(output.pbData, output.cbData as usize).to_vec()
    };
    unsafe {
        LocalFree(output.pbData as _);
    }
    Ok(result)
}
