//! The JSON format: an array of message objects per conversation.

use std::io::{self, Write};

use serde_json::{json, Value};
use sigvault_store::{Attachment, Edit, Message, MessageBody, Quote, Recipient, RecipientKind};

pub fn write_messages(w: &mut dyn Write, messages: &[Message]) -> io::Result<()> {
    let values: Vec<Value> = messages.iter().map(message_value).collect();
    serde_json::to_writer_pretty(&mut *w, &values).map_err(io::Error::other)?;
    writeln!(w)
}

fn message_value(msg: &Message) -> Value {
    json!({
        "conversation": recipient_value(msg.conversation.as_deref()),
        "source": recipient_value(msg.source.as_deref()),
        "type": msg.kind,
        "sentAt": msg.time_sent,
        "receivedAt": msg.time_recv,
        "body": body_value(&msg.body),
        "attachments": msg.attachments.iter().map(attachment_value).collect::<Vec<_>>(),
        "reactions": msg.reactions.iter().map(|r| json!({
            "emoji": r.emoji,
            "from": recipient_value(r.recipient.as_deref()),
            "sentAt": r.time_sent,
            "receivedAt": r.time_recv,
        })).collect::<Vec<_>>(),
        "quote": msg.quote.as_ref().map(quote_value),
        "editHistory": msg.edits.iter().map(edit_value).collect::<Vec<_>>(),
    })
}

fn recipient_value(recipient: Option<&Recipient>) -> Value {
    match recipient {
        None => Value::Null,
        Some(r) => match &r.kind {
            RecipientKind::Contact(c) => json!({
                "type": "contact",
                "name": c.name,
                "profileName": c.profile_name,
                "profileFamilyName": c.profile_family_name,
                "profileJoinedName": c.profile_joined_name,
                "phone": c.phone,
                "aci": c.aci,
                "username": c.username,
            }),
            RecipientKind::Group(g) => json!({
                "type": "group",
                "id": g.id,
                "name": g.name,
            }),
        },
    }
}

fn body_value(body: &MessageBody) -> Value {
    json!({
        "text": body.text,
        "mentions": body.mentions.iter().map(|m| json!({
            "start": m.start,
            "length": m.length,
            "recipient": recipient_value(m.recipient.as_deref()),
        })).collect::<Vec<_>>(),
    })
}

fn attachment_value(attachment: &Attachment) -> Value {
    json!({
        "fileName": attachment.file_name,
        "contentType": attachment.content_type,
        "size": attachment.file.size,
        "pending": attachment.pending,
    })
}

fn quote_value(quote: &Quote) -> Value {
    json!({
        "sentAt": quote.id,
        "from": recipient_value(quote.recipient.as_deref()),
        "body": body_value(&quote.body),
        "attachments": quote.attachments.iter().map(|a| json!({
            "fileName": a.file_name,
            "contentType": a.content_type,
        })).collect::<Vec<_>>(),
    })
}

fn edit_value(edit: &Edit) -> Value {
    json!({
        "sentAt": edit.time_edit,
        "body": body_value(&edit.body),
        "attachments": edit.attachments.iter().map(attachment_value).collect::<Vec<_>>(),
        "quote": edit.quote.as_ref().map(quote_value),
    })
}
