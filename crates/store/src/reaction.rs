//! Reaction records.

use std::rc::Rc;

use serde::Deserialize;

use crate::context::Context;
use crate::error::Result;
use crate::recipient::Recipient;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ReactionJson {
    pub emoji: String,
    #[serde(rename = "fromId")]
    pub from_id: String,
    #[serde(rename = "targetTimestamp")]
    pub target_timestamp: i64,
    pub timestamp: i64,
}

#[derive(Debug, Clone)]
pub struct Reaction {
    pub recipient: Option<Rc<Recipient>>,
    pub time_sent: i64,
    pub time_recv: i64,
    pub emoji: String,
}

impl Context {
    pub(crate) fn parse_reactions(&self, json: &[ReactionJson]) -> Result<Vec<Reaction>> {
        let mut reactions = Vec::with_capacity(json.len());
        for jr in json {
            let recipient = self.recipient_from_reaction_id(&jr.from_id)?;
            if recipient.is_none() {
                tracing::warn!(id = %jr.from_id, "cannot find reaction recipient");
            }
            reactions.push(Reaction {
                recipient,
                time_sent: jr.target_timestamp,
                time_recv: jr.timestamp,
                emoji: jr.emoji.clone(),
            });
        }
        Ok(reactions)
    }

    // "fromId" is a conversation id on newer schemas and an E.164 phone
    // number on older ones; newer databases may still carry old-style ids.
    fn recipient_from_reaction_id(&self, id: &str) -> Result<Option<Rc<Recipient>>> {
        if self.db_version() < 20 {
            return self.recipient_from_conversation_id(id.trim_start_matches('+'));
        }
        if id.starts_with('+') {
            self.recipient_from_phone(id)
        } else {
            self.recipient_from_conversation_id(id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reaction_json_field_names() {
        let jr: ReactionJson = serde_json::from_str(
            r#"{"emoji": "👍", "fromId": "conv-1", "targetTimestamp": 5, "timestamp": 7}"#,
        )
        .unwrap();
        assert_eq!(jr.emoji, "👍");
        assert_eq!(jr.from_id, "conv-1");
        assert_eq!(jr.target_timestamp, 5);
        assert_eq!(jr.timestamp, 7);
    }
}
