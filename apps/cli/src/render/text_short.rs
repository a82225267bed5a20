//! The short text format: one line per message.

use std::io::{self, Write};

use sigvault_store::recipient::display_name;
use sigvault_store::Message;

use crate::render::{format_time, SHORT_TIME_FORMAT};

pub fn write_messages(w: &mut dyn Write, messages: &[Message]) -> io::Result<()> {
    for message in messages {
        write_message(w, message)?;
    }
    Ok(())
}

fn write_message(w: &mut dyn Write, msg: &Message) -> io::Result<()> {
    let name = if msg.is_outgoing() {
        "You".to_string()
    } else {
        display_name(msg.source.as_deref())
    };
    write!(w, "{} {name}:", format_time(msg.time_sent, SHORT_TIME_FORMAT))?;

    if msg.kind != "incoming" && msg.kind != "outgoing" {
        write!(w, " [{} message]", msg.kind)?;
    } else {
        let mut details = Vec::new();
        if let Some(quote) = &msg.quote {
            details.push(format!(
                "reply to {} on {}",
                display_name(quote.recipient.as_deref()),
                format_time(quote.id, SHORT_TIME_FORMAT)
            ));
        }
        if !msg.edits.is_empty() {
            details.push("edited".to_string());
        }
        if !msg.attachments.is_empty() {
            let plural = if msg.attachments.len() > 1 { "s" } else { "" };
            details.push(format!("{} attachment{plural}", msg.attachments.len()));
        }
        if !details.is_empty() {
            write!(w, " [{}]", details.join(", "))?;
        }
        if !msg.body.text.is_empty() {
            write!(w, " {}", msg.body.text)?;
        }
    }
    writeln!(w)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigvault_store::{MessageBody, Quote};

    fn message(kind: &str, body: &str) -> Message {
        Message {
            id: "m1".into(),
            conversation: None,
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
    fn outgoing_line_uses_you() {
        let mut out = Vec::new();
        write_messages(&mut out, &[message("outgoing", "hi")]).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("You:"));
        assert!(text.trim_end().ends_with("hi"));
    }

    #[test]
    fn unknown_sender_and_service_messages() {
        let mut out = Vec::new();
        write_messages(&mut out, &[message("group-v2-change", "")]).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Unknown:"));
        assert!(text.contains("[group-v2-change message]"));
    }

    #[test]
    fn reply_detail_uses_quote_time() {
        let mut msg = message("outgoing", "answer");
        msg.quote = Some(Quote {
            id: 0,
            recipient: None,
            body: MessageBody::default(),
            attachments: Vec::new(),
        });
        let mut out = Vec::new();
        write_messages(&mut out, &[msg]).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("[reply to Unknown on"));
    }
}
