//! The long text format: one field-per-line block per message.

use std::io::{self, Write};

use sigvault_store::recipient::detailed_display_name;
use sigvault_store::{Attachment, Edit, Message, MessageBody, Quote, QuoteAttachment, Recipient};

use crate::render::{format_time, LONG_TIME_FORMAT};

pub fn write_messages(w: &mut dyn Write, messages: &[Message]) -> io::Result<()> {
    let Some(first) = messages.first() else {
        return Ok(());
    };
    write_recipient_field(w, "", "Conversation", first.conversation.as_deref())?;
    writeln!(w)?;
    for message in messages {
        write_message(w, message)?;
    }
    Ok(())
}

fn write_message(w: &mut dyn Write, msg: &Message) -> io::Result<()> {
    if msg.is_outgoing() {
        write_field(w, "", "From", "You")?;
    } else if msg.source.is_some() {
        write_recipient_field(w, "", "From", msg.source.as_deref())?;
    }

    if msg.kind.is_empty() {
        write_field(w, "", "Type", "unknown")?;
    } else {
        write_field(w, "", "Type", &msg.kind)?;
    }

    if msg.time_sent != 0 {
        write_time_field(w, "", "Sent", msg.time_sent)?;
    }
    if !msg.is_outgoing() {
        write_time_field(w, "", "Received", msg.time_recv)?;
    }

    write_attachment_fields(w, "", &msg.attachments)?;

    for reaction in &msg.reactions {
        write_field(
            w,
            "",
            "Reaction",
            &format!(
                "{} from {}",
                reaction.emoji,
                detailed_display_name(reaction.recipient.as_deref())
            ),
        )?;
    }

    if msg.edits.is_empty() {
        write_quote(w, "", msg.quote.as_ref())?;
        write_body(w, "", &msg.body)?;
    } else {
        write_field(w, "", "Edited", &format!("{} versions", msg.edits.len()))?;
        write_edit_history(w, &msg.edits)?;
    }

    writeln!(w)
}

fn write_field(w: &mut dyn Write, prefix: &str, field: &str, value: &str) -> io::Result<()> {
    if prefix.is_empty() {
        writeln!(w, "{field}: {value}")
    } else {
        writeln!(w, "{prefix} {field}: {value}")
    }
}

fn write_recipient_field(
    w: &mut dyn Write,
    prefix: &str,
    field: &str,
    recipient: Option<&Recipient>,
) -> io::Result<()> {
    write_field(w, prefix, field, &detailed_display_name(recipient))
}

fn write_time_field(w: &mut dyn Write, prefix: &str, field: &str, msec: i64) -> io::Result<()> {
    write_field(w, prefix, field, &format_time(msec, LONG_TIME_FORMAT))
}

fn write_attachment_fields(
    w: &mut dyn Write,
    prefix: &str,
    attachments: &[Attachment],
) -> io::Result<()> {
    for attachment in attachments {
        let file_name = attachment.file_name.as_deref().unwrap_or("no filename");
        write_field(
            w,
            prefix,
            "Attachment",
            &format!(
                "{file_name} ({}, {} bytes)",
                attachment.content_type, attachment.file.size
            ),
        )?;
    }
    Ok(())
}

fn write_body(w: &mut dyn Write, prefix: &str, body: &MessageBody) -> io::Result<()> {
    if body.text.is_empty() {
        return Ok(());
    }
    writeln!(w, "{prefix}")?;
    for line in body.text.split('\n') {
        if prefix.is_empty() {
            writeln!(w, "{line}")?;
        } else {
            writeln!(w, "{prefix} {line}")?;
        }
    }
    Ok(())
}

fn write_quote(w: &mut dyn Write, prefix: &str, quote: Option<&Quote>) -> io::Result<()> {
    let Some(quote) = quote else {
        return Ok(());
    };
    writeln!(w, "{prefix}")?;
    let quote_prefix = if prefix.is_empty() {
        ">".to_string()
    } else {
        format!("{prefix} >")
    };
    write_recipient_field(w, &quote_prefix, "From", quote.recipient.as_deref())?;
    write_time_field(w, &quote_prefix, "Sent", quote.id)?;
    write_quote_attachment_fields(w, &quote_prefix, &quote.attachments)?;
    write_body(w, &quote_prefix, &quote.body)
}

fn write_quote_attachment_fields(
    w: &mut dyn Write,
    prefix: &str,
    attachments: &[QuoteAttachment],
) -> io::Result<()> {
    for attachment in attachments {
        let file_name = attachment.file_name.as_deref().unwrap_or("no filename");
        write_field(
            w,
            prefix,
            "Attachment",
            &format!("{file_name} ({})", attachment.content_type),
        )?;
    }
    Ok(())
}

fn write_edit_history(w: &mut dyn Write, edits: &[Edit]) -> io::Result<()> {
    writeln!(w)?;
    let prefix = "|";
    for (i, edit) in edits.iter().enumerate() {
        write_field(w, prefix, "Version", &format!("{}", edits.len() - i))?;
        write_attachment_fields(w, prefix, &edit.attachments)?;
        write_time_field(w, prefix, "Sent", edit.time_edit)?;
        write_quote(w, prefix, edit.quote.as_ref())?;
        write_body(w, prefix, &edit.body)?;
        if i + 1 < edits.len() {
            writeln!(w, "{prefix}")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigvault_store::{Contact, RecipientKind};
    use std::rc::Rc;

    fn message(kind: &str, body: &str) -> Message {
        Message {
            id: "m1".into(),
            conversation: Some(Rc::new(Recipient {
                kind: RecipientKind::Contact(Contact {
                    name: "Alice".into(),
                    phone: "+316".into(),
                    ..Contact::default()
                }),
                avatar: None,
            })),
            source: None,
            kind: kind.into(),
            body: MessageBody {
                text: body.into(),
                mentions: Vec::new(),
            },
            time_sent: 0,
            time_recv: 0,
            attachments: Vec::new(),
            reactions: Vec::new(),
            quote: None,
            edits: Vec::new(),
        }
    }

    #[test]
    fn conversation_header_and_body() {
        let mut out = Vec::new();
        write_messages(&mut out, &[message("outgoing", "hello\nthere")]).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Conversation: Alice (+316)\n\n"));
        assert!(text.contains("From: You\n"));
        assert!(text.contains("Type: outgoing\n"));
        assert!(text.contains("\nhello\nthere\n"));
    }

    #[test]
    fn empty_message_list_renders_nothing() {
        let mut out = Vec::new();
        write_messages(&mut out, &[]).unwrap();
        assert!(out.is_empty());
    }
}
