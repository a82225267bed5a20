use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, ValueEnum};
use sigvault_store::{Context, Conversation, Interval};

use crate::commands::{export_dir, CommonArgs, Outcome};
use crate::files;
use crate::interval::parse_interval;
use crate::render;
use crate::sandbox::Plan;
use crate::select::select_conversations;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Text,
    TextShort,
    Json,
}

impl Format {
    fn extension(self) -> &'static str {
        match self {
            Format::Json => ".json",
            Format::Text | Format::TextShort => ".txt",
        }
    }
}

#[derive(Debug, Args)]
pub struct ExportMessagesArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Select conversations (repeatable)
    #[arg(short = 'c', value_name = "conversation")]
    pub conversations: Vec<String>,

    /// Output format
    #[arg(short = 'f', value_enum, default_value = "text", value_name = "format")]
    pub format: Format,

    /// Append to existing transcript files instead of refusing
    #[arg(short = 'i')]
    pub incremental: bool,

    /// Only export messages sent in this interval
    #[arg(short = 's', value_name = "interval")]
    pub interval: Option<String>,

    /// Export directory (default: current directory)
    #[arg(value_name = "directory")]
    pub directory: Option<PathBuf>,
}

pub fn run(args: &ExportMessagesArgs) -> Result<Outcome> {
    let signal_dir = args.common.signal_dir()?;
    let out_dir = export_dir(&args.directory)?;
    let interval = match &args.interval {
        Some(spec) => parse_interval(spec)?,
        None => Interval::default(),
    };

    Plan::for_signal_dir(&signal_dir).write_to(&out_dir).apply()?;

    let ctx = args.common.open_context(&signal_dir)?;
    let conversations = select_conversations(&ctx, &args.conversations)?;

    let mut outcome = Outcome::Clean;
    let mut used_filenames = HashSet::new();
    for conversation in &conversations {
        if let Err(err) = export_conversation(
            &ctx,
            &out_dir,
            conversation,
            args,
            interval,
            &mut used_filenames,
        ) {
            tracing::error!(
                conversation = %conversation.recipient.display_name(),
                "cannot export messages: {err}"
            );
            outcome = outcome.and(false);
        }
    }

    Ok(outcome)
}

fn export_conversation(
    ctx: &Context,
    out_dir: &Path,
    conversation: &Conversation,
    args: &ExportMessagesArgs,
    interval: Interval,
    used_filenames: &mut HashSet<String>,
) -> Result<()> {
    let messages = ctx.conversation_messages(conversation, interval)?;
    if messages.is_empty() {
        return Ok(());
    }

    let name = files::recipient_filename(
        &conversation.recipient,
        args.format.extension(),
        used_filenames,
    );
    let path = out_dir.join(name);

    let mut options = OpenOptions::new();
    options.write(true).create(true);
    if args.incremental {
        options.append(true);
    } else {
        options.create_new(true);
    }
    let file = options.open(&path)?;
    let mut writer = BufWriter::new(file);

    match args.format {
        Format::Text => render::text::write_messages(&mut writer, &messages)?,
        Format::TextShort => render::text_short::write_messages(&mut writer, &messages)?,
        Format::Json => render::json::write_messages(&mut writer, &messages)?,
    }

    use std::io::Write;
    writer.flush()?;
    Ok(())
}
