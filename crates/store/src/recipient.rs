//! Conversation recipients.
//!
//! All recipients are resolved up front into an arena keyed by
//! conversation id, with secondary indices by phone number and ACI;
//! messages, quotes, reactions and mentions hold `Rc` handles into it.

use std::collections::HashMap;
use std::rc::Rc;

use base64::prelude::*;
use serde::Deserialize;

use crate::attachment::AttachmentFile;
use crate::context::Conversation;
use crate::db::Db;
use crate::error::{Result, StoreError};

// The conversations table changed shape twice: before 20 the phone,
// service id and group id are synthesised from the row id; up to 87 the
// service id lives in "uuid"; from 88 on in "serviceId".
const RECIPIENT_QUERY_19: &str = "SELECT \
    id, \
    json, \
    type, \
    name, \
    profileName, \
    profileFamilyName, \
    profileFullName, \
    iif(type = 'private', '+' || id, NULL), \
    NULL, \
    iif(type = 'group', id, NULL) \
    FROM conversations";

const RECIPIENT_QUERY_20: &str = "SELECT \
    id, \
    json, \
    type, \
    name, \
    profileName, \
    profileFamilyName, \
    profileFullName, \
    e164, \
    uuid, \
    groupId \
    FROM conversations";

const RECIPIENT_QUERY_88: &str = "SELECT \
    id, \
    json, \
    type, \
    name, \
    profileName, \
    profileFamilyName, \
    profileFullName, \
    e164, \
    serviceId, \
    groupId \
    FROM conversations";

const RECIPIENT_QUERIES: &[(i32, &str)] = &[
    (88, RECIPIENT_QUERY_88),
    (20, RECIPIENT_QUERY_20),
    (19, RECIPIENT_QUERY_19),
];

const COLUMN_ID: usize = 0;
const COLUMN_JSON: usize = 1;
const COLUMN_TYPE: usize = 2;
const COLUMN_NAME: usize = 3;
const COLUMN_PROFILE_NAME: usize = 4;
const COLUMN_PROFILE_FAMILY_NAME: usize = 5;
const COLUMN_PROFILE_FULL_NAME: usize = 6;
const COLUMN_E164: usize = 7;
const COLUMN_SERVICE_ID: usize = 8;
const COLUMN_GROUP_ID: usize = 9;

#[derive(Debug)]
pub struct Recipient {
    pub kind: RecipientKind,
    pub avatar: Option<AttachmentFile>,
}

#[derive(Debug)]
pub enum RecipientKind {
    Contact(Contact),
    Group(Group),
}

#[derive(Debug, Default)]
pub struct Contact {
    /// Account identity UUID, distinct from the phone number.
    pub aci: String,
    pub name: String,
    pub profile_name: String,
    pub profile_family_name: String,
    pub profile_joined_name: String,
    pub phone: String,
    pub username: String,
}

#[derive(Debug, Default)]
pub struct Group {
    pub id: String,
    pub name: String,
}

// Based on ConversationAttributesType in ts/model-types.d.ts in the
// Signal-Desktop repository.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RecipientJson {
    username: Option<String>,
    /// For contacts.
    #[serde(rename = "profileAvatar")]
    profile_avatar: Option<AttachmentFile>,
    /// For groups.
    avatar: Option<AttachmentFile>,
}

impl Recipient {
    fn display_name_and_detail(&self) -> (String, String) {
        match &self.kind {
            RecipientKind::Contact(c) => {
                let name = [
                    &c.name,
                    &c.profile_joined_name,
                    &c.profile_name,
                    &c.phone,
                    &c.username,
                    &c.aci,
                ]
                .into_iter()
                .find(|s| !s.is_empty())
                .cloned()
                .unwrap_or_else(|| "Unknown".to_string());
                let detail = [&c.phone, &c.username, &c.aci]
                    .into_iter()
                    .find(|s| !s.is_empty())
                    .cloned()
                    .unwrap_or_default();
                (name, detail)
            }
            RecipientKind::Group(g) => {
                let name = if g.name.is_empty() {
                    "Unknown".to_string()
                } else {
                    g.name.clone()
                };
                // Newer group IDs are base64 of 32 bytes; re-render those in
                // URL-safe unpadded base64 for filename use. Older ones are
                // raw byte strings and become hex.
                let detail = match BASE64_STANDARD.decode(&g.id) {
                    Ok(raw) if raw.len() == 32 => BASE64_URL_SAFE_NO_PAD.encode(raw),
                    _ => hex::encode(g.id.as_bytes()),
                };
                (name, detail)
            }
        }
    }

    pub fn display_name(&self) -> String {
        self.display_name_and_detail().0
    }

    pub fn detailed_display_name(&self) -> String {
        let (name, detail) = self.display_name_and_detail();
        if detail.is_empty() {
            name
        } else {
            format!("{name} ({detail})")
        }
    }
}

/// Display name of a possibly unresolved recipient.
pub fn display_name(recipient: Option<&Recipient>) -> String {
    recipient
        .map(Recipient::display_name)
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Detailed display name of a possibly unresolved recipient.
pub fn detailed_display_name(recipient: Option<&Recipient>) -> String {
    recipient
        .map(Recipient::detailed_display_name)
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Removes one surrounding pair of FSI (U+2068) and PDI (U+2069)
/// characters from the string.
fn trim_bidi_chars(s: &str) -> &str {
    const FSI: char = '\u{2068}';
    const PDI: char = '\u{2069}';
    s.strip_prefix(FSI)
        .and_then(|inner| inner.strip_suffix(PDI))
        .unwrap_or(s)
}

#[derive(Debug)]
pub(crate) struct RecipientMaps {
    conversations: Vec<Conversation>,
    by_id: HashMap<String, Rc<Recipient>>,
    by_phone: HashMap<String, Rc<Recipient>>,
    by_aci: HashMap<String, Rc<Recipient>>,
}

impl RecipientMaps {
    pub fn load(db: &Db, db_version: i32) -> Result<RecipientMaps> {
        let query = RECIPIENT_QUERIES
            .iter()
            .find(|(min, _)| db_version >= *min)
            .map(|(_, sql)| *sql)
            .unwrap_or(RECIPIENT_QUERY_19);

        let mut maps = RecipientMaps {
            conversations: Vec::new(),
            by_id: HashMap::new(),
            by_phone: HashMap::new(),
            by_aci: HashMap::new(),
        };

        let mut stmt = db.conn().prepare(query)?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            maps.add_row(row)?;
        }
        Ok(maps)
    }

    fn add_row(&mut self, row: &rusqlite::Row<'_>) -> Result<()> {
        let text = |i: usize| -> rusqlite::Result<String> {
            Ok(row
                .get::<_, Option<String>>(i)?
                .unwrap_or_default())
        };

        let json: RecipientJson = serde_json::from_str(&text(COLUMN_JSON)?)?;

        let kind = match text(COLUMN_TYPE)?.as_str() {
            "private" => RecipientKind::Contact(Contact {
                aci: text(COLUMN_SERVICE_ID)?,
                name: trim_bidi_chars(&text(COLUMN_NAME)?).to_string(),
                profile_name: text(COLUMN_PROFILE_NAME)?,
                profile_family_name: text(COLUMN_PROFILE_FAMILY_NAME)?,
                profile_joined_name: text(COLUMN_PROFILE_FULL_NAME)?,
                phone: text(COLUMN_E164)?,
                username: json.username.clone().unwrap_or_default(),
            }),
            "group" => RecipientKind::Group(Group {
                id: text(COLUMN_GROUP_ID)?,
                name: text(COLUMN_NAME)?,
            }),
            other => {
                return Err(StoreError::Protocol(format!(
                    "unknown recipient type: {other:?}"
                )))
            }
        };

        let avatar_json = match &kind {
            RecipientKind::Contact(_) => json.profile_avatar,
            RecipientKind::Group(_) => json.avatar,
        };
        // Bundled app-asset avatars (e.g. the Signal release chat) do not
        // exist in the profile directory.
        let avatar = avatar_json.filter(|a| {
            a.path
                .as_deref()
                .is_some_and(|p| !p.is_empty() && !p.starts_with("images/"))
        });

        let recipient = Rc::new(Recipient { kind, avatar });

        let id = text(COLUMN_ID)?;
        self.conversations.push(Conversation {
            id: id.clone(),
            recipient: Rc::clone(&recipient),
        });
        self.by_id.insert(id, Rc::clone(&recipient));

        if let RecipientKind::Contact(contact) = &recipient.kind {
            if !contact.phone.is_empty() {
                self.by_phone
                    .insert(contact.phone.clone(), Rc::clone(&recipient));
            }
            if !contact.aci.is_empty() {
                self.by_aci
                    .insert(contact.aci.to_lowercase(), Rc::clone(&recipient));
            }
        }
        Ok(())
    }

    pub fn conversations(&self) -> Vec<Conversation> {
        self.conversations.clone()
    }

    pub fn by_conversation_id(&self, id: &str) -> Option<Rc<Recipient>> {
        self.by_id.get(id).cloned()
    }

    pub fn by_phone(&self, phone: &str) -> Option<Rc<Recipient>> {
        self.by_phone.get(phone).cloned()
    }

    pub fn by_aci(&self, aci: &str) -> Option<Rc<Recipient>> {
        self.by_aci.get(&aci.to_lowercase()).cloned()
    }
}
