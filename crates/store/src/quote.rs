//! Quoted-message records.

use std::rc::Rc;

use serde::Deserialize;
use serde_json::Value;

use crate::attachment::LONG_TEXT_TYPE;
use crate::context::Context;
use crate::error::{Result, StoreError};
use crate::mention::MentionJson;
use crate::message::MessageBody;
use crate::recipient::Recipient;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct QuoteJson {
    pub attachments: Vec<QuoteAttachmentJson>,
    // Newer quotes carry "authorAci" (since database version 88) or
    // "authorUuid"; older ones an "author" phone number.
    pub author: Option<String>,
    #[serde(rename = "authorUuid")]
    pub author_uuid: Option<String>,
    #[serde(rename = "authorAci")]
    pub author_aci: Option<String>,
    #[serde(rename = "bodyRanges")]
    pub body_ranges: Vec<MentionJson>,
    // A JSON number now, but older rows encoded it as a numeric string.
    pub id: Value,
    pub text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct QuoteAttachmentJson {
    #[serde(rename = "contentType")]
    pub content_type: String,
    #[serde(rename = "fileName")]
    pub file_name: Option<String>,
}

#[derive(Debug)]
pub struct Quote {
    /// Sent time (ms since epoch) of the quoted message.
    pub id: i64,
    pub recipient: Option<Rc<Recipient>>,
    pub body: MessageBody,
    pub attachments: Vec<QuoteAttachment>,
}

#[derive(Debug, Clone)]
pub struct QuoteAttachment {
    pub file_name: Option<String>,
    pub content_type: String,
}

impl Context {
    pub(crate) fn parse_quote(&self, json: Option<&QuoteJson>) -> Result<Option<Quote>> {
        let Some(jq) = json else {
            return Ok(None);
        };

        let id = match &jq.id {
            Value::Number(n) => n
                .as_i64()
                .ok_or_else(|| StoreError::Protocol("cannot parse quote ID".into()))?,
            Value::String(s) => s
                .parse()
                .map_err(|_| StoreError::Protocol("cannot parse quote ID".into()))?,
            Value::Null => return Err(StoreError::Protocol("quote without ID".into())),
            _ => return Err(StoreError::Protocol("cannot parse quote ID".into())),
        };

        let recipient = if let Some(aci) = non_empty(&jq.author_aci) {
            self.recipient_from_aci(aci)?
        } else if let Some(uuid) = non_empty(&jq.author_uuid) {
            self.recipient_from_aci(uuid)?
        } else if let Some(phone) = non_empty(&jq.author) {
            self.recipient_from_phone(phone)?
        } else {
            return Err(StoreError::Protocol("quote without author".into()));
        };
        if recipient.is_none() {
            tracing::warn!("cannot find quote author");
        }

        let attachments = jq
            .attachments
            .iter()
            // Skip long-message attachments.
            .filter(|a| a.content_type != LONG_TEXT_TYPE)
            .map(|a| QuoteAttachment {
                file_name: a.file_name.clone().filter(|s| !s.is_empty()),
                content_type: a.content_type.clone(),
            })
            .collect();

        Ok(Some(Quote {
            id,
            recipient,
            body: MessageBody {
                text: jq.text.clone().unwrap_or_default(),
                mentions: self.parse_mentions(&jq.body_ranges)?,
            },
            attachments,
        }))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_id_accepts_number_and_string() {
        let jq: QuoteJson = serde_json::from_str(r#"{"id": 1700000000000}"#).unwrap();
        assert_eq!(jq.id.as_i64(), Some(1700000000000));

        let jq: QuoteJson = serde_json::from_str(r#"{"id": "1700000000000"}"#).unwrap();
        assert_eq!(jq.id.as_str(), Some("1700000000000"));
    }

    #[test]
    fn author_fields_deserialize() {
        let jq: QuoteJson = serde_json::from_str(
            r#"{"id": 1, "authorAci": "ACI", "authorUuid": "UUID", "author": "+316"}"#,
        )
        .unwrap();
        assert_eq!(jq.author_aci.as_deref(), Some("ACI"));
        assert_eq!(jq.author_uuid.as_deref(), Some("UUID"));
        assert_eq!(jq.author.as_deref(), Some("+316"));
    }
}
