//! Conversation selectors.
//!
//! Grammar: a leading `+` matches an E.164 phone number exactly, `/` a
//! case-insensitive regex over display names, `:` an ACI or group id,
//! `=` (or nothing) a case-insensitive display-name match. Each selector
//! consumes the conversations it matches, so repeated selectors partition
//! the set in argument order.

use anyhow::{bail, Result};
use regex::RegexBuilder;
use sigvault_store::{Context, Conversation, Recipient, RecipientKind};

pub fn select_conversations(ctx: &Context, selectors: &[String]) -> Result<Vec<Conversation>> {
    let mut remaining = ctx.conversations()?;
    if selectors.is_empty() {
        return Ok(remaining);
    }

    let mut selected = Vec::new();
    for selector in selectors {
        let matcher = matcher_for(selector)?;
        let (matched, rest): (Vec<_>, Vec<_>) = remaining
            .into_iter()
            .partition(|c| matcher(&c.recipient));
        selected.extend(matched);
        remaining = rest;
    }
    Ok(selected)
}

type Matcher = Box<dyn Fn(&Recipient) -> bool>;

fn matcher_for(selector: &str) -> Result<Matcher> {
    if selector.is_empty() || (selector.len() == 1 && "+/=:".contains(selector)) {
        bail!("empty conversation selector");
    }

    let matcher: Matcher = match selector.as_bytes()[0] {
        b'+' => {
            let phone = selector.to_string();
            Box::new(move |r| match &r.kind {
                RecipientKind::Contact(c) => c.phone == phone,
                RecipientKind::Group(_) => false,
            })
        }
        b'/' => {
            let regex = RegexBuilder::new(&selector[1..])
                .case_insensitive(true)
                .build()?;
            Box::new(move |r| regex.is_match(&r.display_name()))
        }
        b':' => {
            let id = selector[1..].to_string();
            Box::new(move |r| match &r.kind {
                RecipientKind::Contact(c) => id.eq_ignore_ascii_case(&c.aci),
                RecipientKind::Group(g) => id.eq_ignore_ascii_case(&g.id),
            })
        }
        _ => {
            let name = selector.strip_prefix('=').unwrap_or(selector).to_lowercase();
            Box::new(move |r| r.display_name().to_lowercase() == name)
        }
    };
    Ok(matcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigvault_store::{Contact, Group};

    fn contact(name: &str, phone: &str, aci: &str) -> Recipient {
        Recipient {
            kind: RecipientKind::Contact(Contact {
                name: name.into(),
                phone: phone.into(),
                aci: aci.into(),
                ..Contact::default()
            }),
            avatar: None,
        }
    }

    fn group(name: &str, id: &str) -> Recipient {
        Recipient {
            kind: RecipientKind::Group(Group {
                id: id.into(),
                name: name.into(),
            }),
            avatar: None,
        }
    }

    #[test]
    fn phone_selector_matches_contacts_only() {
        let m = matcher_for("+31612345678").unwrap();
        assert!(m(&contact("Alice", "+31612345678", "a")));
        assert!(!m(&contact("Bob", "+31687654321", "b")));
        assert!(!m(&group("+31612345678", "g")));
    }

    #[test]
    fn regex_selector_is_case_insensitive() {
        let m = matcher_for("/^ali").unwrap();
        assert!(m(&contact("Alice", "", "")));
        assert!(!m(&contact("Bob", "", "")));
    }

    #[test]
    fn id_selector_matches_aci_and_group_id() {
        let m = matcher_for(":ACI-1").unwrap();
        assert!(m(&contact("Alice", "", "aci-1")));
        let m = matcher_for(":grp-1").unwrap();
        assert!(m(&group("Friends", "GRP-1")));
    }

    #[test]
    fn name_selector_with_and_without_equals() {
        let m = matcher_for("=alice").unwrap();
        assert!(m(&contact("Alice", "", "")));
        let m = matcher_for("alice").unwrap();
        assert!(m(&contact("ALICE", "", "")));
        assert!(!m(&contact("Alicia", "", "")));
    }

    #[test]
    fn empty_selectors_are_rejected() {
        assert!(matcher_for("").is_err());
        assert!(matcher_for("+").is_err());
        assert!(matcher_for("/").is_err());
        assert!(matcher_for(":").is_err());
        assert!(matcher_for("=").is_err());
    }

    #[test]
    fn bad_regex_is_an_error() {
        assert!(matcher_for("/[").is_err());
    }
}
