use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Args;
use sigvault_store::{Context, Recipient};

use crate::commands::{create_new_file, export_dir, CommonArgs, Outcome};
use crate::files;
use crate::sandbox::Plan;
use crate::select::select_conversations;

#[derive(Debug, Args)]
pub struct ExportAvatarsArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Select conversations (repeatable)
    #[arg(short = 'c', value_name = "conversation")]
    pub conversations: Vec<String>,

    /// Export directory (default: current directory)
    #[arg(value_name = "directory")]
    pub directory: Option<PathBuf>,
}

pub fn run(args: &ExportAvatarsArgs) -> Result<Outcome> {
    let signal_dir = args.common.signal_dir()?;
    let out_dir = export_dir(&args.directory)?;
    Plan::for_signal_dir(&signal_dir).write_to(&out_dir).apply()?;

    let ctx = args.common.open_context(&signal_dir)?;
    let conversations = select_conversations(&ctx, &args.conversations)?;

    let mut outcome = Outcome::Clean;
    let mut used_filenames = HashSet::new();
    for conversation in &conversations {
        if let Err(err) =
            export_avatar(&ctx, &out_dir, &conversation.recipient, &mut used_filenames)
        {
            tracing::error!(
                conversation = %conversation.recipient.display_name(),
                "cannot export avatar: {err}"
            );
            outcome = outcome.and(false);
        }
    }

    Ok(outcome)
}

fn export_avatar(
    ctx: &Context,
    out_dir: &Path,
    recipient: &Recipient,
    used_filenames: &mut HashSet<String>,
) -> Result<()> {
    let Some(avatar) = &recipient.avatar else {
        return Ok(());
    };

    let data = ctx.read_avatar(avatar)?;
    let name = files::recipient_filename(recipient, extension_for(&data), used_filenames);

    let mut file = create_new_file(&out_dir.join(name), false)?;
    file.write_all(&data)?;
    Ok(())
}

/// Infer the image type from magic bytes; unknown formats get no
/// extension.
fn extension_for(data: &[u8]) -> &'static str {
    if data.starts_with(b"\xff\xd8\xff") {
        ".jpg"
    } else if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        ".png"
    } else if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        ".webp"
    } else {
        ""
    }
}
