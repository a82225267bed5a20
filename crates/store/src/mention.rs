//! Mention geometry and body splicing.
//!
//! Mentions arrive as `(start, length)` pairs measured in Unicode scalar
//! values into a body that holds an object-replacement placeholder
//! (U+FFFC) at each mention site. Splicing replaces each site with
//! `@<display name>` and rewrites the offsets to byte positions in the
//! result, which is what the formatters consume.

use std::rc::Rc;

use serde::Deserialize;

use crate::context::Context;
use crate::error::{Result, StoreError};
use crate::message::MessageBody;
use crate::recipient::{display_name, Recipient};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct MentionJson {
    pub start: i64,
    pub length: i64,
    // Renamed from "mentionUuid" at database version 88.
    #[serde(rename = "mentionUuid")]
    pub mention_uuid: Option<String>,
    #[serde(rename = "mentionAci")]
    pub mention_aci: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Mention {
    pub start: i64,
    pub length: i64,
    pub recipient: Option<Rc<Recipient>>,
}

impl Context {
    pub(crate) fn parse_mentions(&self, json_mentions: &[MentionJson]) -> Result<Vec<Mention>> {
        let mut mentions: Vec<Mention> = Vec::with_capacity(json_mentions.len());
        for jm in json_mentions {
            let id = jm
                .mention_aci
                .as_deref()
                .or(jm.mention_uuid.as_deref())
                .unwrap_or_default();
            let recipient = if id.is_empty() {
                None
            } else {
                let found = self.recipient_from_aci(id)?;
                if found.is_none() {
                    tracing::warn!(aci = id, "cannot find mention recipient");
                }
                found
            };

            let mention = Mention {
                start: jm.start,
                length: jm.length,
                recipient,
            };

            // Insert in start order. The JSON is usually already sorted, so
            // scan from the back.
            let mut i = mentions.len();
            while i > 0 && mentions[i - 1].start >= mention.start {
                i -= 1;
            }
            mentions.insert(i, mention);
        }
        Ok(mentions)
    }
}

/// Splice mentions into the body text.
///
/// On bad geometry the body is left untouched and an error is returned;
/// the caller drops the mentions and keeps the raw text.
pub(crate) fn insert_mentions(body: &mut MessageBody) -> Result<()> {
    let scalars: Vec<char> = body.text.chars().collect();
    let total = scalars.len() as i64;

    let mut prev_end = 0i64;
    for mention in &body.mentions {
        if mention.start < 0 || mention.length < 0 {
            return Err(StoreError::Mention(
                "negative mention start or length".into(),
            ));
        }
        if mention.start < prev_end {
            return Err(StoreError::Mention(
                "unordered or overlapping mentions".into(),
            ));
        }
        if mention.start + mention.length > total {
            return Err(StoreError::Mention("mention out of bounds".into()));
        }
        prev_end = mention.start + mention.length;
    }

    let mut text = String::with_capacity(body.text.len());
    let mut offset = 0usize;
    for mention in &mut body.mentions {
        text.extend(&scalars[offset..mention.start as usize]);
        offset = (mention.start + mention.length) as usize;

        let replacement = format!("@{}", display_name(mention.recipient.as_deref()));

        // The original start and length counted scalar values; the updated
        // values are byte counts into the spliced text.
        mention.start = text.len() as i64;
        mention.length = replacement.len() as i64;
        text.push_str(&replacement);
    }
    text.extend(&scalars[offset..]);
    body.text = text;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipient::{Contact, RecipientKind};

    fn contact(name: &str) -> Option<Rc<Recipient>> {
        Some(Rc::new(Recipient {
            kind: RecipientKind::Contact(Contact {
                name: name.into(),
                ..Contact::default()
            }),
            avatar: None,
        }))
    }

    fn mention(start: i64, length: i64, recipient: Option<Rc<Recipient>>) -> Mention {
        Mention {
            start,
            length,
            recipient,
        }
    }

    fn assert_mention(body: &MessageBody, idx: usize, start: i64, length: i64) {
        assert_eq!(body.mentions[idx].start, start, "start of mention {idx}");
        assert_eq!(body.mentions[idx].length, length, "length of mention {idx}");
    }

    #[test]
    fn updated_body_uses_byte_offsets() {
        let (part, foo, bar) = ("aàạ𝔞", "Fộo", "Bậr");
        let mut body = MessageBody {
            text: format!("{part}\u{fffc}{part}\u{fffc}{part}"),
            mentions: vec![mention(4, 1, contact(foo)), mention(9, 1, contact(bar))],
        };

        insert_mentions(&mut body).unwrap();

        assert_eq!(body.text, format!("{part}@{foo}{part}@{bar}{part}"));
        assert_mention(&body, 0, 10, 6);
        assert_mention(&body, 1, 26, 6);
    }

    #[test]
    fn unsorted_mentions_are_ordered_on_parse_shape() {
        // insert_mentions itself requires order; this mirrors splicing two
        // adjacent placeholders.
        let mut body = MessageBody {
            text: "\u{fffc}\u{fffc}".into(),
            mentions: vec![mention(0, 1, contact("Foo")), mention(1, 1, contact("Bar"))],
        };

        insert_mentions(&mut body).unwrap();

        assert_eq!(body.text, "@Foo@Bar");
        assert_mention(&body, 0, 0, 4);
        assert_mention(&body, 1, 4, 4);
    }

    #[test]
    fn zero_length_mention_inserts_without_replacing() {
        let (part, foo) = ("aàạ𝔞", "Fộo");
        let mut body = MessageBody {
            text: format!("{part}{part}"),
            mentions: vec![mention(4, 0, contact(foo))],
        };

        insert_mentions(&mut body).unwrap();

        assert_eq!(body.text, format!("{part}@{foo}{part}"));
        assert_mention(&body, 0, 10, 6);
    }

    #[test]
    fn long_mention_replaces_entire_range() {
        let (part, foo) = ("aàạ𝔞", "Fộo");
        let mut body = MessageBody {
            text: format!("{part}{part}{part}"),
            mentions: vec![mention(4, 4, contact(foo))],
        };

        insert_mentions(&mut body).unwrap();

        assert_eq!(body.text, format!("{part}@{foo}{part}"));
        assert_mention(&body, 0, 10, 6);
    }

    #[test]
    fn overlapping_mentions_are_rejected() {
        let mut body = MessageBody {
            text: "\u{fffc}\u{fffc}".into(),
            mentions: vec![mention(0, 1, None), mention(0, 1, None)],
        };
        assert!(insert_mentions(&mut body).is_err());

        let mut body = MessageBody {
            text: "\u{fffc}\u{fffc}\u{fffc}".into(),
            mentions: vec![mention(0, 2, None), mention(1, 1, None)],
        };
        assert!(insert_mentions(&mut body).is_err());
    }

    #[test]
    fn negative_geometry_is_rejected() {
        let mut body = MessageBody {
            text: "a".into(),
            mentions: vec![mention(-1, 1, None)],
        };
        assert!(insert_mentions(&mut body).is_err());

        let mut body = MessageBody {
            text: "a".into(),
            mentions: vec![mention(0, -1, None)],
        };
        assert!(insert_mentions(&mut body).is_err());
    }

    #[test]
    fn out_of_bounds_mentions_are_rejected() {
        let mut body = MessageBody {
            text: "a".into(),
            mentions: vec![mention(1, 1, None)],
        };
        assert!(insert_mentions(&mut body).is_err());

        let mut body = MessageBody {
            text: "a".into(),
            mentions: vec![mention(0, 2, None)],
        };
        assert!(insert_mentions(&mut body).is_err());
    }

    #[test]
    fn rejected_geometry_leaves_body_untouched() {
        let mut body = MessageBody {
            text: "abc".into(),
            mentions: vec![mention(5, 1, None)],
        };
        insert_mentions(&mut body).unwrap_err();
        assert_eq!(body.text, "abc");
    }

    #[test]
    fn reinsertion_over_output_indices_is_a_no_op() {
        // With ASCII names, byte offsets and scalar offsets coincide, so a
        // second pass over the spliced body reproduces it exactly.
        let mut body = MessageBody {
            text: "hi \u{fffc}!".into(),
            mentions: vec![mention(3, 1, contact("Bob"))],
        };
        insert_mentions(&mut body).unwrap();
        assert_eq!(body.text, "hi @Bob!");

        let once = body.text.clone();
        insert_mentions(&mut body).unwrap();
        assert_eq!(body.text, once);
        assert_mention(&body, 0, 3, 4);
    }
}
