//! Export-file naming: sanitization, uniquification, content-type
//! extensions, and the incremental-export ledger.

use std::collections::HashSet;
use std::io::{BufRead, Write};
use std::path::Path;

use anyhow::{bail, Result};
use chrono::{Local, TimeZone};
use sigvault_store::{Attachment, Recipient};

const INCREMENTAL_FILE: &str = ".incremental";
const MAX_FILENAME_LEN: usize = 150;

/// Make a recipient- or sender-supplied name safe to use as a filename.
pub fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => out.push('_'),
            c if c.is_control() => out.push('_'),
            c => out.push(c),
        }
        if out.chars().count() >= MAX_FILENAME_LEN {
            break;
        }
    }
    let trimmed = out.trim();
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

/// A per-run unique filename derived from the recipient's display name.
pub fn recipient_filename(
    recipient: &Recipient,
    extension: &str,
    used: &mut HashSet<String>,
) -> String {
    let base = sanitize(&recipient.detailed_display_name());
    let mut name = format!("{base}{extension}");
    let mut counter = 2;
    while used.contains(&name) {
        name = format!("{base}-{counter}{extension}");
        counter += 1;
    }
    used.insert(name.clone());
    name
}

/// A filename that does not collide with anything already in `dir`.
pub fn unique_filename(dir: &Path, name: &str) -> Result<String> {
    if !entry_exists(dir, name) {
        return Ok(name.to_string());
    }

    let suffix = Path::new(name)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let prefix = name.strip_suffix(&suffix).unwrap_or(name);

    for counter in 2..u32::MAX {
        let candidate = format!("{prefix}-{counter}{suffix}");
        if !entry_exists(dir, &candidate) {
            return Ok(candidate);
        }
    }
    bail!("{name}: cannot generate unique name");
}

fn entry_exists(dir: &Path, name: &str) -> bool {
    // Do not follow symlinks; a dangling link still occupies the name.
    std::fs::symlink_metadata(dir.join(name)).is_ok()
}

/// A file extension for a MIME content type.
pub fn extension_from_content_type(content_type: &str) -> Option<String> {
    let essence = content_type.split(';').next().unwrap_or("").trim();
    // Avoid silly results, such as .jpe for image/jpeg.
    match essence {
        "image/jpeg" => return Some(".jpg".into()),
        "video/mp4" => return Some(".mp4".into()),
        "video/mpeg" => return Some(".mpg".into()),
        _ => {}
    }
    mime_guess::get_mime_extensions_str(essence)
        .and_then(|extensions| extensions.first())
        .map(|e| format!(".{e}"))
}

/// The export name of an attachment: its original filename when it has
/// one, otherwise a name derived from the sent time and content type.
pub fn attachment_filename(dir: &Path, attachment: &Attachment) -> Result<String> {
    let name = match &attachment.file_name {
        Some(file_name) => sanitize(file_name),
        None => {
            let extension =
                extension_from_content_type(&attachment.content_type).unwrap_or_default();
            let when = Local
                .timestamp_millis_opt(attachment.time_sent)
                .single()
                .map(|t| t.format("%Y-%m-%d-%H-%M-%S").to_string())
                .unwrap_or_else(|| attachment.time_sent.to_string());
            format!("attachment-{when}{extension}")
        }
    };
    unique_filename(dir, &name)
}

/// Base names exported by earlier incremental runs, one per line.
pub fn read_incremental(dir: &Path) -> std::io::Result<HashSet<String>> {
    let file = match std::fs::File::open(dir.join(INCREMENTAL_FILE)) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashSet::new()),
        Err(e) => return Err(e),
    };
    let mut exported = HashSet::new();
    for line in std::io::BufReader::new(file).lines() {
        exported.insert(line?);
    }
    Ok(exported)
}

pub fn write_incremental(dir: &Path, exported: &HashSet<String>) -> std::io::Result<()> {
    let mut file = std::fs::File::create(dir.join(INCREMENTAL_FILE))?;
    for id in exported {
        writeln!(file, "{id}")?;
    }
    Ok(())
}
