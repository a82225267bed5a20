use std::collections::HashSet;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Args;
use filetime::FileTime;
use sigvault_store::{Attachment, Context, Conversation, Interval};

use crate::commands::{create_new_file, export_dir, CommonArgs, Outcome};
use crate::files;
use crate::interval::parse_interval;
use crate::sandbox::Plan;
use crate::select::select_conversations;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExportMode {
    Copy,
    Hardlink,
    Symlink,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MtimeMode {
    None,
    Sent,
    Received,
}

#[derive(Debug, Args)]
pub struct ExportAttachmentsArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Select conversations (repeatable)
    #[arg(short = 'c', value_name = "conversation")]
    pub conversations: Vec<String>,

    /// Skip attachments recorded in the .incremental file
    #[arg(short = 'i')]
    pub incremental: bool,

    /// Hardlink the on-disk blobs instead of copying
    #[arg(short = 'L')]
    pub hardlink: bool,

    /// Symlink the on-disk blobs instead of copying
    #[arg(short = 'l')]
    pub symlink: bool,

    /// Set file modification times to the sent time
    #[arg(short = 'M')]
    pub mtime_sent: bool,

    /// Set file modification times to the received time
    #[arg(short = 'm')]
    pub mtime_received: bool,

    /// Only export attachments of messages sent in this interval
    #[arg(short = 's', value_name = "interval")]
    pub interval: Option<String>,

    /// Export directory (default: current directory)
    #[arg(value_name = "directory")]
    pub directory: Option<PathBuf>,
}

impl ExportAttachmentsArgs {
    fn export_mode(&self) -> ExportMode {
        if self.symlink {
            ExportMode::Symlink
        } else if self.hardlink {
            ExportMode::Hardlink
        } else {
            ExportMode::Copy
        }
    }

    fn mtime_mode(&self) -> MtimeMode {
        if self.mtime_received {
            MtimeMode::Received
        } else if self.mtime_sent {
            MtimeMode::Sent
        } else {
            MtimeMode::None
        }
    }
}

pub fn run(args: &ExportAttachmentsArgs) -> Result<Outcome> {
    let signal_dir = args.common.signal_dir()?;
    let out_dir = export_dir(&args.directory)?;
    let interval = match &args.interval {
        Some(spec) => parse_interval(spec)?,
        None => Interval::default(),
    };

    let mut plan = Plan::for_signal_dir(&signal_dir).write_to(&out_dir);
    if args.mtime_mode() != MtimeMode::None {
        plan = plan.with_fattr();
    }
    plan.apply()?;

    let ctx = args.common.open_context(&signal_dir)?;
    let conversations = select_conversations(&ctx, &args.conversations)?;

    let mut exported = if args.incremental {
        files::read_incremental(&out_dir)?
    } else {
        HashSet::new()
    };

    let mut outcome = Outcome::Clean;
    for conversation in &conversations {
        let ok = export_conversation(&ctx, &out_dir, conversation, args, interval, &mut exported);
        outcome = outcome.and(ok);
    }

    if args.incremental {
        files::write_incremental(&out_dir, &exported)?;
    }

    Ok(outcome)
}

fn export_conversation(
    ctx: &Context,
    out_dir: &Path,
    conversation: &Conversation,
    args: &ExportAttachmentsArgs,
    interval: Interval,
    exported: &mut HashSet<String>,
) -> bool {
    let attachments = match ctx.conversation_attachments(conversation, interval) {
        Ok(attachments) => attachments,
        Err(err) => {
            tracing::error!(
                conversation = %conversation.recipient.display_name(),
                "cannot list attachments: {err}"
            );
            return false;
        }
    };
    if attachments.is_empty() {
        return true;
    }

    let conv_dir = match conversation_dir(out_dir, conversation) {
        Ok(dir) => dir,
        Err(err) => {
            tracing::error!("{err}");
            return false;
        }
    };

    let mut ok = true;
    for attachment in &attachments {
        if args.incremental {
            if let Some(path) = &attachment.file.path {
                let id = Path::new(path)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.clone());
                if !exported.insert(id) {
                    continue;
                }
            }
        }

        let Some(source) = ctx.attachment_path(attachment) else {
            let reason = if attachment.pending {
                "skipping pending attachment"
            } else {
                "skipping attachment without path"
            };
            tracing::warn!(
                conversation = %conversation.recipient.display_name(),
                sent = attachment.time_sent,
                "{reason}"
            );
            continue;
        };
        if let Err(err) = std::fs::symlink_metadata(&source) {
            tracing::error!("{}: {err}", source.display());
            ok = false;
            continue;
        }

        let destination = match files::attachment_filename(&conv_dir, attachment) {
            Ok(name) => conv_dir.join(name),
            Err(err) => {
                tracing::error!("{err}");
                ok = false;
                continue;
            }
        };

        if let Err(err) = export_one(ctx, attachment, &source, &destination, args) {
            tracing::error!("{}: {err}", destination.display());
            ok = false;
        }
    }
    ok
}

fn export_one(
    ctx: &Context,
    attachment: &Attachment,
    source: &Path,
    destination: &Path,
    args: &ExportAttachmentsArgs,
) -> Result<()> {
    let mut mode = args.export_mode();

    // Linking the raw blob only makes sense for legacy unencrypted
    // attachments; encrypted ones always go through a decrypted copy.
    if mode != ExportMode::Copy && attachment.file.version >= 2 {
        tracing::warn!(
            "{}: attachment is encrypted, copying instead of linking",
            destination.display()
        );
        mode = ExportMode::Copy;
    }

    match mode {
        ExportMode::Copy => {
            let file = create_new_file(destination, false)?;
            let mut writer = BufWriter::new(file);
            ctx.write_attachment(attachment, &mut writer)?;
            use std::io::Write;
            writer.flush()?;
            set_mtime(destination, attachment, args.mtime_mode(), false)?;
        }
        ExportMode::Hardlink => {
            std::fs::hard_link(source, destination)?;
        }
        ExportMode::Symlink => {
            symlink(source, destination)?;
            set_mtime(destination, attachment, args.mtime_mode(), true)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn symlink(source: &Path, destination: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(source, destination)
}

#[cfg(windows)]
fn symlink(source: &Path, destination: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(source, destination)
}

fn set_mtime(
    path: &Path,
    attachment: &Attachment,
    mode: MtimeMode,
    no_follow: bool,
) -> std::io::Result<()> {
    let msec = match mode {
        MtimeMode::None => return Ok(()),
        MtimeMode::Sent => attachment.time_sent,
        MtimeMode::Received => attachment.time_recv,
    };
    let mtime = FileTime::from_unix_time(msec.div_euclid(1000), (msec.rem_euclid(1000) * 1_000_000) as u32);
    if no_follow {
        filetime::set_symlink_file_times(path, mtime, mtime)
    } else {
        filetime::set_file_mtime(path, mtime)
    }
}

fn conversation_dir(out_dir: &Path, conversation: &Conversation) -> Result<PathBuf> {
    let name = files::sanitize(&conversation.recipient.detailed_display_name());
    let dir = out_dir.join(name);
    match std::fs::create_dir(&dir) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
        Err(e) => return Err(e.into()),
    }
    Ok(dir)
}
