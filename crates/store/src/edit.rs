//! Edit-history records.

use serde::Deserialize;

use crate::attachment::{AttachmentJson, LONG_TEXT_TYPE};
use crate::context::Context;
use crate::error::{Result, StoreError};
use crate::mention::MentionJson;
use crate::message::{Message, MessageBody};
use crate::quote::{Quote, QuoteJson};

// Based on EditHistoryType in ts/model-types.d.ts in the Signal-Desktop
// repository.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct EditJson {
    pub attachments: Vec<AttachmentJson>,
    pub body: Option<String>,
    #[serde(rename = "bodyRanges")]
    pub body_ranges: Vec<MentionJson>,
    pub quote: Option<QuoteJson>,
    pub timestamp: i64,
}

#[derive(Debug)]
pub struct Edit {
    pub body: MessageBody,
    pub attachments: Vec<crate::Attachment>,
    pub quote: Option<Quote>,
    pub time_edit: i64,
}

impl Context {
    pub(crate) fn parse_edits(&self, msg: &mut Message, json: &[EditJson]) -> Result<()> {
        for (index, jedit) in json.iter().enumerate() {
            let mut edit = Edit {
                body: MessageBody {
                    text: jedit.body.clone().unwrap_or_default(),
                    mentions: self.parse_mentions(&jedit.body_ranges)?,
                },
                attachments: self.attachments_for_edit(msg, index, &jedit.attachments)?,
                quote: self.parse_quote(jedit.quote.as_ref())?,
                time_edit: jedit.timestamp,
            };
            if let Err(err) = self.fix_edited_long_message(&mut edit) {
                // Fixing edited long messages is a best-effort attempt.
                tracing::warn!("cannot fix edited long message: {err}");
            }
            msg.edits.push(edit);
        }
        Ok(())
    }

    /// Restore the complete text of an edit from its long-text attachment.
    ///
    /// Works around what appears to be a bug in Signal Desktop; see Signal
    /// Desktop issue 6641.
    fn fix_edited_long_message(&self, edit: &mut Edit) -> Result<()> {
        let Some(index) = edit
            .attachments
            .iter()
            .position(|a| a.content_type == LONG_TEXT_TYPE)
        else {
            return Ok(());
        };

        let data = match self.read_attachment(&edit.attachments[index]) {
            Ok(data) => data,
            // Signal Desktop considers long-message attachments of edits
            // to be orphaned, and eventually removes them from disk.
            Err(StoreError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::Attachment(
                    "long-message attachment not or no longer available".into(),
                ))
            }
            Err(e) => return Err(e),
        };

        let long_text = String::from_utf8(data).map_err(|_| {
            StoreError::Attachment("long-message attachment is not valid UTF-8".into())
        })?;
        if !long_text.starts_with(&edit.body.text) {
            return Err(StoreError::Attachment(
                "long-message attachment does not match body text".into(),
            ));
        }

        edit.body.text = long_text;
        edit.attachments.remove(index);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edit_json_field_names() {
        let je: EditJson = serde_json::from_str(
            r#"{"body": "hi", "timestamp": 12, "attachments": [], "bodyRanges": []}"#,
        )
        .unwrap();
        assert_eq!(je.body.as_deref(), Some("hi"));
        assert_eq!(je.timestamp, 12);
        assert!(je.quote.is_none());
    }
}
