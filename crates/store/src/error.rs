use sigvault_crypto::CryptoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Missing or malformed `config.json`, or missing key fields.
    #[error("config error: {0}")]
    Config(String),

    /// Invalid key material outside the crypto layer.
    #[error("key error: {0}")]
    Key(String),

    /// Key recovery or envelope decryption failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// The database rejected the key; reported separately from plain SQL
    /// errors because any failure of the probe query means a bad key.
    #[error("cannot verify database key: {0}")]
    KeyVerify(#[source] rusqlite::Error),

    #[error("database version {0} not supported (yet)")]
    UnsupportedVersion(i32),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("backup error: {0}")]
    Backup(String),

    #[error("attachment error: {0}")]
    Attachment(String),

    #[error("attachment is pending")]
    AttachmentPending,

    #[error("cannot parse JSON data: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed structured payload in a message or recipient row.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Bad mention geometry; the caller demotes this to dropping the
    /// mentions and keeping the raw text.
    #[error("invalid mention: {0}")]
    Mention(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid hex data: {0}")]
    Hex(#[from] hex::FromHexError),
}

pub type Result<T> = std::result::Result<T, StoreError>;
