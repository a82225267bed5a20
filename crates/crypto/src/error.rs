//! Error types for the sigvault-crypto crate.

use thiserror::Error;

/// Errors that can occur during key recovery and envelope decryption.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The provided key material is invalid (wrong length, malformed, etc.).
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// The envelope does not start with a recognised version prefix.
    #[error("unsupported encryption version prefix")]
    UnsupportedPrefix,

    /// The envelope or ciphertext has an impossible length.
    #[error("invalid ciphertext length")]
    BadLength,

    /// AEAD authentication failed (wrong key or tampered ciphertext).
    #[error("decryption authentication failed")]
    AuthFailure,

    /// PKCS#7 padding is malformed.
    #[error("invalid padding")]
    PaddingError,

    /// The attachment MAC does not match the file contents.
    #[error("MAC mismatch")]
    MacMismatch,

    /// No entry found in the OS keystore for the requested key.
    #[error("cannot find encryption key")]
    KeystoreEntryNotFound,

    /// The OS keystore cannot be reached on this platform.
    #[error("keystore unavailable: {0}")]
    KeystoreUnavailable(String),

    /// The OS keystore returned an error.
    #[error("keystore error: {0}")]
    KeystoreFailure(String),
}

#[cfg(target_os = "macos")]
impl From<keyring::Error> for CryptoError {
    fn from(err: keyring::Error) -> Self {
        match err {
            keyring::Error::NoEntry => CryptoError::KeystoreEntryNotFound,
            keyring::Error::NoStorageAccess(_) | keyring::Error::PlatformFailure(_) => {
                CryptoError::KeystoreUnavailable(err.to_string())
            }
            other => CryptoError::KeystoreFailure(other.to_string()),
        }
    }
}
