//! safeStorage raw keys, key derivation and the `v10`/`v11` envelope.
//!
//! The host application seals its database key with Chromium's os_crypt
//! scheme: on Linux and macOS the OS keystore yields an opaque password
//! that is stretched with PBKDF2-SHA1 into an AES-128-CBC key; on Windows
//! `Local State` yields a DPAPI-wrapped AES-256-GCM key. The ciphertext
//! carries a 3-byte ASCII version prefix (`v10` on macOS/Windows, `v11` on
//! Linux).

use std::fmt;

use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::cipher::{
    aes_cbc_decrypt, aes_cbc_encrypt, aes_gcm_open, aes_gcm_seal, pbkdf2_sha1, pkcs7_unpad,
    AES_BLOCK_SIZE, GCM_NONCE_SIZE, GCM_TAG_SIZE,
};
use crate::error::CryptoError;

const SALT: &[u8] = b"saltysalt";
const DERIVED_KEY_SIZE: usize = 16; // AES-128
const MACOS_ITERATIONS: u32 = 1003;
const LINUX_ITERATIONS: u32 = 1;
const WINDOWS_KEY_SIZE: usize = 32; // AES-256

const PREFIX_V10: &[u8] = b"v10";
const PREFIX_V11: &[u8] = b"v11";
const PREFIX_SIZE: usize = 3;

// Chromium uses a fixed all-spaces IV for the CBC envelope.
const CBC_IV: [u8; AES_BLOCK_SIZE] = [b' '; AES_BLOCK_SIZE];

/// The operating system a raw key belongs to.
///
/// The tag decides both the derivation schedule and the envelope format,
/// so keys exported on one system can be used on another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    Linux,
    Macos,
    Windows,
}

impl Os {
    /// The tag for the system this binary runs on.
    pub fn current() -> Os {
        if cfg!(target_os = "macos") {
            Os::Macos
        } else if cfg!(windows) {
            Os::Windows
        } else {
            Os::Linux
        }
    }

    pub fn parse(s: &str) -> Result<Os, CryptoError> {
        match s {
            "linux" => Ok(Os::Linux),
            "macos" => Ok(Os::Macos),
            "windows" => Ok(Os::Windows),
            _ => Err(CryptoError::InvalidKey(format!("invalid system: {s}"))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Os::Linux => "linux",
            Os::Macos => "macos",
            Os::Windows => "windows",
        }
    }
}

/// A raw safeStorage secret as stored in the OS keystore.
///
/// On Linux and macOS this is an opaque password; on Windows it is the
/// base64 encoding of a 32-byte AES key. Zeroed on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct RawKey {
    key: Vec<u8>,
    #[zeroize(skip)]
    os: Os,
}

impl RawKey {
    pub fn new(key: Vec<u8>, os: Os) -> RawKey {
        RawKey { key, os }
    }

    pub fn os(&self) -> Os {
        self.os
    }

    pub fn bytes(&self) -> &[u8] {
        &self.key
    }
}

impl fmt::Debug for RawKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawKey")
            .field("key", &"[REDACTED]")
            .field("os", &self.os)
            .finish()
    }
}

enum DerivedKey {
    Cbc(Zeroizing<Vec<u8>>),
    Gcm(Zeroizing<Vec<u8>>),
}

/// A raw key plus the AES key derived from it, ready to open or seal
/// safeStorage envelopes.
pub struct SafeStorage {
    raw: RawKey,
    derived: DerivedKey,
}

impl SafeStorage {
    /// Derive the envelope key from a raw secret.
    ///
    /// Linux/macOS secrets are stretched with PBKDF2-SHA1; Windows secrets
    /// must base64-decode to exactly 32 bytes.
    pub fn from_raw_key(raw: RawKey) -> Result<SafeStorage, CryptoError> {
        if raw.bytes().is_empty() {
            return Err(CryptoError::InvalidKey("empty encryption key".into()));
        }
        let derived = match raw.os() {
            Os::Linux => DerivedKey::Cbc(Zeroizing::new(pbkdf2_sha1(
                raw.bytes(),
                SALT,
                LINUX_ITERATIONS,
                DERIVED_KEY_SIZE,
            ))),
            Os::Macos => DerivedKey::Cbc(Zeroizing::new(pbkdf2_sha1(
                raw.bytes(),
                SALT,
                MACOS_ITERATIONS,
                DERIVED_KEY_SIZE,
            ))),
            Os::Windows => {
                use base64::prelude::*;
                let key = BASE64_STANDARD
                    .decode(raw.bytes())
                    .map_err(|e| CryptoError::InvalidKey(format!("invalid encryption key: {e}")))?;
                if key.len() != WINDOWS_KEY_SIZE {
                    return Err(CryptoError::InvalidKey(
                        "invalid encryption key length".into(),
                    ));
                }
                DerivedKey::Gcm(Zeroizing::new(key))
            }
        };
        Ok(SafeStorage { raw, derived })
    }

    pub fn raw_key(&self) -> &RawKey {
        &self.raw
    }

    /// Open a safeStorage envelope.
    pub fn decrypt(&self, envelope: &[u8]) -> Result<Vec<u8>, CryptoError> {
        match &self.derived {
            DerivedKey::Cbc(key) => {
                let prefix = match self.raw.os() {
                    Os::Linux => PREFIX_V11,
                    _ => PREFIX_V10,
                };
                let body = strip_prefix(envelope, prefix)?;
                let padded = aes_cbc_decrypt(key, &CBC_IV, body)?;
                Ok(pkcs7_unpad(&padded, AES_BLOCK_SIZE)?.to_vec())
            }
            DerivedKey::Gcm(key) => {
                let body = strip_prefix(envelope, PREFIX_V10)?;
                if body.len() < GCM_NONCE_SIZE + GCM_TAG_SIZE {
                    return Err(CryptoError::BadLength);
                }
                let (nonce, ciphertext) = body.split_at(GCM_NONCE_SIZE);
                aes_gcm_open(key, nonce, ciphertext)
            }
        }
    }

    /// Seal a plaintext into the envelope format this key's system expects.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        match &self.derived {
            DerivedKey::Cbc(key) => {
                let prefix = match self.raw.os() {
                    Os::Linux => PREFIX_V11,
                    _ => PREFIX_V10,
                };
                let mut envelope = prefix.to_vec();
                envelope.extend_from_slice(&aes_cbc_encrypt(key, &CBC_IV, plaintext)?);
                Ok(envelope)
            }
            DerivedKey::Gcm(key) => {
                let mut nonce = [0u8; GCM_NONCE_SIZE];
                rand::rng().fill_bytes(&mut nonce);
                let mut envelope = PREFIX_V10.to_vec();
                envelope.extend_from_slice(&nonce);
                envelope.extend_from_slice(&aes_gcm_seal(key, &nonce, plaintext)?);
                Ok(envelope)
            }
        }
    }
}

impl fmt::Debug for SafeStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafeStorage")
            .field("raw", &self.raw)
            .field("derived", &"[REDACTED]")
            .finish()
    }
}

fn strip_prefix<'a>(envelope: &'a [u8], prefix: &[u8]) -> Result<&'a [u8], CryptoError> {
    if envelope.len() < PREFIX_SIZE {
        return Err(CryptoError::BadLength);
    }
    if &envelope[..PREFIX_SIZE] != prefix {
        return Err(CryptoError::UnsupportedPrefix);
    }
    Ok(&envelope[PREFIX_SIZE..])
}
