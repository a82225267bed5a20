//! sigvault-store -- read-only access to Signal Desktop's local data store.
//!
//! A [`Context`] owns the decrypted view of one profile directory: it
//! unseals the SQLCipher database key from `config.json` (through the OS
//! keystore when the key is sealed), opens the database read-only, and
//! exposes recipients, messages, attachments and the plaintext database
//! exporter on top of it.
//!
//! The core is single-threaded; a `Context` is used by one caller at a
//! time and releases the connection, statements and key material when it
//! is dropped.
//!
//! ## Modules
//!
//! - [`error`] -- `StoreError` enum
//! - [`paths`] -- profile directory discovery and data-store layout
//! - [`config`] -- `config.json` parsing and database-key unsealing
//! - [`db`] -- SQLCipher connection wrapper
//! - [`context`] -- the open data store
//! - [`recipient`] -- conversation recipients and display names
//! - [`message`] -- version-dispatched message queries
//! - [`mention`] -- mention geometry and body splicing
//! - [`quote`] / [`reaction`] / [`edit`] -- message sub-records
//! - [`attachment`] -- attachment records and blob decryption
//! - [`export`] -- encrypted-to-plaintext database export

pub mod attachment;
pub mod config;
pub mod context;
pub mod db;
pub mod edit;
mod error;
pub mod export;
pub mod mention;
pub mod message;
pub mod paths;
pub mod quote;
pub mod reaction;
pub mod recipient;

pub use attachment::{Attachment, AttachmentFile};
pub use config::DatabaseKey;
pub use context::{Context, Conversation};
pub use edit::Edit;
pub use error::{Result, StoreError};
pub use mention::Mention;
pub use message::{Interval, Message, MessageBody};
pub use quote::{Quote, QuoteAttachment};
pub use reaction::Reaction;
pub use recipient::{Contact, Group, Recipient, RecipientKind};
