//! Attachment records and blob access.
//!
//! Where the payload lives depends on the schema: from database version
//! 1360 on it sits in the dedicated `message_attachments` table, joined on
//! `(messageId, editHistoryIndex)`; before that it is embedded in the
//! message row's JSON column. The envelope crypto itself is in
//! `sigvault_crypto::attachment`.

use std::io::Write;
use std::path::PathBuf;

use serde::Deserialize;

use crate::context::Context;
use crate::error::{Result, StoreError};
use crate::message::Message;
use crate::paths;

/// Content type of a long-text attachment holding the full body of a
/// truncated message.
pub const LONG_TEXT_TYPE: &str = "text/x-signal-plain";

// For database versions >= 1360.
const ATTACHMENT_QUERY_1360: &str = "SELECT \
    size, \
    contentType, \
    path, \
    fileName, \
    localKey, \
    version, \
    pending \
    FROM message_attachments \
    WHERE messageId = ? AND editHistoryIndex = ? AND attachmentType = 'attachment' \
    ORDER BY orderInMessage";

const MESSAGE_ATTACHMENTS_MIN_VERSION: i32 = 1360;

/// Index value naming the message itself (not one of its edits) in the
/// `message_attachments` table.
pub(crate) const ROOT_EDIT_HISTORY_INDEX: i64 = -1;

/// The on-disk half of an attachment record, shared with avatars.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AttachmentFile {
    pub version: i64,
    pub path: Option<String>,
    #[serde(rename = "localKey")]
    pub local_key: Option<String>,
    pub size: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct AttachmentJson {
    #[serde(rename = "contentType")]
    pub content_type: String,
    #[serde(rename = "fileName")]
    pub file_name: Option<String>,
    pub pending: bool,
    #[serde(flatten)]
    pub file: AttachmentFile,
}

#[derive(Debug, Clone)]
pub struct Attachment {
    pub file_name: Option<String>,
    pub content_type: String,
    pub time_sent: i64,
    pub time_recv: i64,
    pub pending: bool,
    pub file: AttachmentFile,
}

impl Context {
    pub(crate) fn attachments_for_message(
        &self,
        msg: &Message,
        json_attachments: &[AttachmentJson],
    ) -> Result<Vec<Attachment>> {
        self.attachments_with_edit_index(msg, ROOT_EDIT_HISTORY_INDEX, json_attachments)
    }

    pub(crate) fn attachments_for_edit(
        &self,
        msg: &Message,
        edit_index: usize,
        json_attachments: &[AttachmentJson],
    ) -> Result<Vec<Attachment>> {
        self.attachments_with_edit_index(msg, edit_index as i64, json_attachments)
    }

    fn attachments_with_edit_index(
        &self,
        msg: &Message,
        edit_index: i64,
        json_attachments: &[AttachmentJson],
    ) -> Result<Vec<Attachment>> {
        if self.db_version() >= MESSAGE_ATTACHMENTS_MIN_VERSION {
            self.attachments_from_database(msg, edit_index)
        } else {
            Ok(attachments_from_json(msg, json_attachments))
        }
    }

    fn attachments_from_database(&self, msg: &Message, edit_index: i64) -> Result<Vec<Attachment>> {
        let mut stmt = self.db().conn().prepare(ATTACHMENT_QUERY_1360)?;
        let mut rows = stmt.query(rusqlite::params![msg.id, edit_index])?;

        let mut attachments = Vec::new();
        while let Some(row) = rows.next()? {
            attachments.push(Attachment {
                file_name: row.get::<_, Option<String>>(3)?.filter(|s| !s.is_empty()),
                content_type: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                time_sent: msg.time_sent,
                time_recv: msg.time_recv,
                pending: row.get::<_, Option<i64>>(6)?.unwrap_or(0) != 0,
                file: AttachmentFile {
                    version: row.get::<_, Option<i64>>(5)?.unwrap_or(0),
                    path: row.get::<_, Option<String>>(2)?,
                    local_key: row.get::<_, Option<String>>(4)?,
                    size: row.get::<_, Option<i64>>(0)?.unwrap_or(0),
                },
            });
        }
        Ok(attachments)
    }

    /// All attachments of a conversation in message order.
    pub fn conversation_attachments(
        &self,
        conversation: &crate::Conversation,
        interval: crate::Interval,
    ) -> Result<Vec<Attachment>> {
        let messages = self.conversation_messages(conversation, interval)?;
        Ok(messages
            .into_iter()
            .flat_map(|m| m.attachments)
            .collect())
    }

    /// Absolute path of an attachment blob, if the record names one.
    pub fn attachment_path(&self, attachment: &Attachment) -> Option<PathBuf> {
        if attachment.pending {
            return None;
        }
        attachment
            .file
            .path
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(|p| self.attachment_file_path(p))
    }

    fn attachment_file_path(&self, path: &str) -> PathBuf {
        // Records written on another platform may carry foreign separators.
        let foreign = if std::path::MAIN_SEPARATOR == '/' {
            '\\'
        } else {
            '/'
        };
        let native: String = path
            .chars()
            .map(|c| {
                if c == foreign {
                    std::path::MAIN_SEPARATOR
                } else {
                    c
                }
            })
            .collect();
        paths::attachment_dir(self.dir()).join(native)
    }

    /// Read and decrypt an attachment blob.
    pub fn read_attachment(&self, attachment: &Attachment) -> Result<Vec<u8>> {
        if attachment.pending {
            return Err(StoreError::AttachmentPending);
        }
        self.read_attachment_file(&attachment.file)
    }

    /// Stream a decrypted attachment to a writer.
    pub fn write_attachment(&self, attachment: &Attachment, writer: &mut dyn Write) -> Result<()> {
        let data = self.read_attachment(attachment)?;
        writer.write_all(&data)?;
        Ok(())
    }

    /// Read a contact or group avatar.
    pub fn read_avatar(&self, avatar: &AttachmentFile) -> Result<Vec<u8>> {
        self.read_attachment_file(avatar)
    }

    pub(crate) fn read_attachment_file(&self, file: &AttachmentFile) -> Result<Vec<u8>> {
        let path = file
            .path
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| StoreError::Attachment("attachment without path".into()))?;
        let full_path = self.attachment_file_path(path);

        // Records below version 2 predate attachment encryption.
        if file.version < 2 {
            return std::fs::read(&full_path).map_err(StoreError::Io);
        }

        let local_key = file
            .local_key
            .as_deref()
            .ok_or_else(|| StoreError::Attachment("attachment without keys".into()))?;
        let data = std::fs::read(&full_path)?;
        sigvault_crypto::attachment::decrypt(local_key, &data, file.size.max(0) as u64)
            .map_err(|e| StoreError::Attachment(e.to_string()))
    }
}

fn attachments_from_json(msg: &Message, json_attachments: &[AttachmentJson]) -> Vec<Attachment> {
    json_attachments
        .iter()
        .map(|j| Attachment {
            file_name: j.file_name.clone().filter(|s| !s.is_empty()),
            content_type: j.content_type.clone(),
            time_sent: msg.time_sent,
            time_recv: msg.time_recv,
            pending: j.pending,
            file: j.file.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_json_flattens_file_record() {
        let json = r#"{
            "contentType": "image/png",
            "fileName": "cat.png",
            "pending": false,
            "version": 2,
            "path": "ab/cdef",
            "localKey": "a2V5",
            "size": 1234
        }"#;
        let parsed: AttachmentJson = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.content_type, "image/png");
        assert_eq!(parsed.file_name.as_deref(), Some("cat.png"));
        assert_eq!(parsed.file.version, 2);
        assert_eq!(parsed.file.path.as_deref(), Some("ab/cdef"));
        assert_eq!(parsed.file.size, 1234);
    }

    #[test]
    fn attachment_json_defaults_missing_fields() {
        let parsed: AttachmentJson = serde_json::from_str("{}").unwrap();
        assert!(parsed.file_name.is_none());
        assert_eq!(parsed.file.version, 0);
        assert!(!parsed.pending);
    }
}
