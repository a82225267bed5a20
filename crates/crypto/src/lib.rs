//! sigvault-crypto -- safeStorage key recovery and envelope crypto.
//!
//! Implements the key-and-ciphertext pipeline that Signal Desktop uses to
//! protect its local data: the OS keystore lookup of the raw safeStorage
//! secret, the PBKDF2/base64 derivation of the safeStorage AES key, the
//! `v10`/`v11` envelope that seals the database key, and the per-file
//! AES-CBC + HMAC-SHA256 envelope of attachment blobs.
//!
//! ## Architecture
//!
//! - **Sync public API**: everything here is synchronous and blocking; OS
//!   keystore calls may suspend until the user unlocks a wallet.
//! - **Pure byte-level core**: [`cipher`], [`safe_storage`] and
//!   [`attachment`] operate on byte buffers only. Platform-conditional code
//!   is confined to [`keystore`].
//! - **Key hygiene**: raw secrets and derived keys are wrapped in types
//!   that zero their buffers on drop and redact their `Debug` output.
//!
//! ## Modules
//!
//! - [`error`] -- `CryptoError` enum
//! - [`cipher`] -- PBKDF2-SHA1, AES-CBC, AES-GCM, HMAC-SHA256, PKCS#7
//! - [`safe_storage`] -- raw/derived keys and the `v10`/`v11` envelope
//! - [`keystore`] -- Keychain / libsecret / KWallet / DPAPI backends
//! - [`attachment`] -- per-file attachment envelope decryption

pub mod attachment;
pub mod cipher;
pub mod error;
pub mod keystore;
pub mod safe_storage;

pub use error::CryptoError;
pub use safe_storage::{Os, RawKey, SafeStorage};
