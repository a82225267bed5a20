//! Version-dispatched message queries and row assembly.

use std::rc::Rc;

use chrono::{DateTime, Local};
use serde::Deserialize;

use crate::attachment::{Attachment, AttachmentJson};
use crate::context::{Context, Conversation};
use crate::edit::{Edit, EditJson};
use crate::error::Result;
use crate::mention::{insert_mentions, Mention, MentionJson};
use crate::quote::{Quote, QuoteJson};
use crate::reaction::{Reaction, ReactionJson};
use crate::recipient::{display_name, Recipient};

// The messages query changed shape four times. The source join moved from
// the raw "source" column to "sourceUuid" = conversations.uuid (20) to
// "sourceServiceId" = conversations.serviceId (88), and the received time
// moved from the row JSON to the "received_at" column (20), back to the
// JSON when that column became a counter (23), and finally to the
// materialized "received_at_ms" column (1270). Every shape yields the same
// eight columns; a shape without a received-time column selects NULL.

const MESSAGE_SELECT_19: &str = "SELECT \
    m.id, \
    m.conversationId, \
    m.source, \
    m.type, \
    m.body, \
    m.json, \
    m.sent_at, \
    NULL \
    FROM messages AS m ";

const MESSAGE_SELECT_20: &str = "SELECT \
    m.id, \
    m.conversationId, \
    c.id, \
    m.type, \
    m.body, \
    m.json, \
    m.sent_at, \
    m.received_at \
    FROM messages AS m \
    LEFT JOIN conversations AS c \
    ON m.sourceUuid = c.uuid ";

const MESSAGE_SELECT_23: &str = "SELECT \
    m.id, \
    m.conversationId, \
    c.id, \
    m.type, \
    m.body, \
    m.json, \
    m.sent_at, \
    NULL \
    FROM messages AS m \
    LEFT JOIN conversations AS c \
    ON m.sourceUuid = c.uuid ";

const MESSAGE_SELECT_88: &str = "SELECT \
    m.id, \
    m.conversationId, \
    c.id, \
    m.type, \
    m.body, \
    m.json, \
    m.sent_at, \
    NULL \
    FROM messages AS m \
    LEFT JOIN conversations AS c \
    ON m.sourceServiceId = c.serviceId ";

const MESSAGE_SELECT_1270: &str = "SELECT \
    m.id, \
    m.conversationId, \
    c.id, \
    m.type, \
    m.body, \
    m.json, \
    m.sent_at, \
    m.received_at_ms \
    FROM messages AS m \
    LEFT JOIN conversations AS c \
    ON m.sourceServiceId = c.serviceId ";

const MESSAGE_SELECTS: &[(i32, &str)] = &[
    (1270, MESSAGE_SELECT_1270),
    (88, MESSAGE_SELECT_88),
    (23, MESSAGE_SELECT_23),
    (20, MESSAGE_SELECT_20),
    (19, MESSAGE_SELECT_19),
];

const WHERE_CONVERSATION: &str = "WHERE m.conversationId = ? ";
const WHERE_SENT_BEFORE: &str = "AND (m.sent_at <= ? OR m.sent_at IS NULL) ";
const WHERE_SENT_AFTER: &str = "AND m.sent_at >= ? ";
const WHERE_SENT_BETWEEN: &str = "AND m.sent_at BETWEEN ? AND ? ";
const ORDER: &str = "ORDER BY m.received_at, m.sent_at";

const COLUMN_ID: usize = 0;
const COLUMN_CONVERSATION_ID: usize = 1;
const COLUMN_SOURCE: usize = 2;
const COLUMN_TYPE: usize = 3;
const COLUMN_BODY: usize = 4;
const COLUMN_JSON: usize = 5;
const COLUMN_SENT_AT: usize = 6;
const COLUMN_RECEIVED_AT: usize = 7;

fn select_for_version(db_version: i32) -> &'static str {
    MESSAGE_SELECTS
        .iter()
        .find(|(min, _)| db_version >= *min)
        .map(|(_, sql)| *sql)
        .unwrap_or(MESSAGE_SELECT_19)
}

/// Wall-clock bounds for message selection, applied to the sent time.
#[derive(Debug, Default, Clone, Copy)]
pub struct Interval {
    pub min: Option<DateTime<Local>>,
    pub max: Option<DateTime<Local>>,
}

#[derive(Debug, Clone, Default)]
pub struct MessageBody {
    pub text: String,
    pub mentions: Vec<Mention>,
}

#[derive(Debug)]
pub struct Message {
    pub id: String,
    pub conversation: Option<Rc<Recipient>>,
    /// The sender; `None` for outgoing messages and unresolvable sources.
    pub source: Option<Rc<Recipient>>,
    /// Type tag from the database, e.g. `incoming`, `outgoing`,
    /// `group-v2-change`.
    pub kind: String,
    pub body: MessageBody,
    pub time_sent: i64,
    pub time_recv: i64,
    pub attachments: Vec<Attachment>,
    pub reactions: Vec<Reaction>,
    pub quote: Option<Quote>,
    pub edits: Vec<Edit>,
}

impl Message {
    pub fn is_outgoing(&self) -> bool {
        self.kind == "outgoing"
    }
}

// The row JSON carries the structured payload the columns do not.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct MessageJson {
    pub attachments: Vec<AttachmentJson>,
    pub received_at: i64,
    pub received_at_ms: i64,
    #[serde(rename = "bodyRanges")]
    pub body_ranges: Vec<MentionJson>,
    pub reactions: Vec<ReactionJson>,
    pub quote: Option<QuoteJson>,
    #[serde(rename = "editHistory")]
    pub edit_history: Vec<EditJson>,
}

impl Context {
    /// Messages of one conversation in `(received_at, sent_at)` order.
    pub fn conversation_messages(
        &self,
        conversation: &Conversation,
        interval: Interval,
    ) -> Result<Vec<Message>> {
        let select = select_for_version(self.db_version());

        let mut params: Vec<rusqlite::types::Value> =
            vec![conversation.id.clone().into()];
        let sql = match (interval.min, interval.max) {
            (None, None) => format!("{select}{WHERE_CONVERSATION}{ORDER}"),
            (None, Some(max)) => {
                params.push(max.timestamp_millis().into());
                format!("{select}{WHERE_CONVERSATION}{WHERE_SENT_BEFORE}{ORDER}")
            }
            (Some(min), None) => {
                params.push(min.timestamp_millis().into());
                format!("{select}{WHERE_CONVERSATION}{WHERE_SENT_AFTER}{ORDER}")
            }
            (Some(min), Some(max)) => {
                params.push(min.timestamp_millis().into());
                params.push(max.timestamp_millis().into());
                format!("{select}{WHERE_CONVERSATION}{WHERE_SENT_BETWEEN}{ORDER}")
            }
        };

        let mut stmt = self.db().conn().prepare(&sql)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(params))?;

        let mut messages = Vec::new();
        while let Some(row) = rows.next()? {
            messages.push(self.message_from_row(row)?);
        }
        Ok(messages)
    }

    fn message_from_row(&self, row: &rusqlite::Row<'_>) -> Result<Message> {
        let text = |i: usize| -> rusqlite::Result<String> {
            Ok(row.get::<_, Option<String>>(i)?.unwrap_or_default())
        };

        let conversation = match row.get::<_, Option<String>>(COLUMN_CONVERSATION_ID)? {
            None => {
                // Likely a message with an error.
                tracing::warn!("conversation recipient has null ID");
                None
            }
            Some(id) => {
                let recipient = self.recipient_from_conversation_id(&id)?;
                if recipient.is_none() {
                    tracing::warn!(%id, "cannot find conversation recipient");
                }
                recipient
            }
        };

        let source = match row.get::<_, Option<String>>(COLUMN_SOURCE)? {
            None => None,
            Some(id) => {
                let recipient = self.resolve_source(&id)?;
                if recipient.is_none() {
                    tracing::warn!(%id, "cannot find source recipient");
                }
                recipient
            }
        };

        let mut msg = Message {
            id: text(COLUMN_ID)?,
            conversation,
            source,
            kind: text(COLUMN_TYPE)?,
            body: MessageBody {
                text: text(COLUMN_BODY)?,
                mentions: Vec::new(),
            },
            time_sent: row.get::<_, Option<i64>>(COLUMN_SENT_AT)?.unwrap_or(0),
            time_recv: 0,
            attachments: Vec::new(),
            reactions: Vec::new(),
            quote: None,
            edits: Vec::new(),
        };

        let column_received = row.get::<_, Option<i64>>(COLUMN_RECEIVED_AT)?;
        self.parse_message_json(&mut msg, column_received, &text(COLUMN_JSON)?)?;

        self.splice_body_mentions(&mut msg);
        Ok(msg)
    }

    // Before database version 20 the source column holds a phone number;
    // later it is a conversation id resolved through the join.
    fn resolve_source(&self, id: &str) -> Result<Option<Rc<Recipient>>> {
        if self.db_version() < 20 {
            if let Some(found) = self.recipient_from_phone(id)? {
                return Ok(Some(found));
            }
            return self.recipient_from_conversation_id(id.trim_start_matches('+'));
        }
        self.recipient_from_conversation_id(id)
    }

    fn parse_message_json(
        &self,
        msg: &mut Message,
        column_received: Option<i64>,
        raw_json: &str,
    ) -> Result<()> {
        let json: MessageJson = serde_json::from_str(raw_json)?;

        // Older rows keep the received time in the JSON "received_at";
        // newer ones moved it to "received_at_ms" (the column of the same
        // name, when present and non-NULL, is authoritative). See
        // Signal-Desktop commit d82ce079421c3fa08a0920a90b7abc19b1bb0e59.
        msg.time_recv = match column_received {
            Some(ms) if ms != 0 => ms,
            _ => {
                if json.received_at_ms != 0 {
                    json.received_at_ms
                } else {
                    json.received_at
                }
            }
        };

        msg.attachments = self.attachments_for_message(msg, &json.attachments)?;
        msg.body.mentions = self.parse_mentions(&json.body_ranges)?;
        msg.reactions = self.parse_reactions(&json.reactions)?;
        msg.quote = self.parse_quote(json.quote.as_ref())?;
        self.parse_edits(msg, &json.edit_history)?;
        Ok(())
    }

    // Bad mention geometry demotes to "drop mentions, keep text".
    fn splice_body_mentions(&self, msg: &mut Message) {
        let when = DateTime::from_timestamp_millis(msg.time_sent)
            .map(|t| t.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        if let Err(err) = insert_mentions(&mut msg.body) {
            tracing::warn!(
                conversation = %display_name(msg.conversation.as_deref()),
                sent = %when,
                "message with invalid mention: {err}"
            );
            msg.body.mentions.clear();
        }

        if let Some(quote) = &mut msg.quote {
            if let Err(err) = insert_mentions(&mut quote.body) {
                tracing::warn!(
                    conversation = %display_name(msg.conversation.as_deref()),
                    sent = %when,
                    "message with invalid mention in quote: {err}"
                );
                quote.body.mentions.clear();
            }
        }

        for edit in &mut msg.edits {
            if let Err(err) = insert_mentions(&mut edit.body) {
                tracing::warn!(
                    conversation = %display_name(msg.conversation.as_deref()),
                    sent = %when,
                    "message with invalid mention in edit: {err}"
                );
                edit.body.mentions.clear();
            }
            if let Some(quote) = &mut edit.quote {
                if let Err(err) = insert_mentions(&mut quote.body) {
                    tracing::warn!(
                        conversation = %display_name(msg.conversation.as_deref()),
                        sent = %when,
                        "message with invalid mention in edit quote: {err}"
                    );
                    quote.body.mentions.clear();
                }
            }
        }
    }
}
