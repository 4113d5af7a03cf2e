use crate::command::Entry;
use crate::keymap::Keymap;
use arc_swap::ArcSwap;
use log::{debug, info};
use std::collections::HashSet;
use std::sync::Arc;

/// Usernames allowed to run privileged commands, compared case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct AuthorizedUsers(HashSet<String>);

impl AuthorizedUsers {
    pub fn contains(&self, username: &str) -> bool {
        self.0.contains(&username.trim().to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for AuthorizedUsers {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        AuthorizedUsers(
            iter.into_iter()
                .map(|user| user.as_ref().trim().to_lowercase())
                .filter(|user| !user.is_empty())
                .collect(),
        )
    }
}

/// Finds the entry a chat message triggers.
///
/// Entries are scanned in keymap order and the first trigger that prefixes the
/// trimmed, lowercased message wins. A privileged entry only matches for
/// authorized users; for everyone else the scan moves on, so a later public
/// entry with an overlapping trigger can still match.
pub fn match_entry(username: &str, message: &str, keymap: &Keymap, authorized: &AuthorizedUsers) -> Option<Entry> {
    let message = message.trim().to_lowercase();
    for entry in keymap.iter() {
        let Some(trigger) = entry.matches(&message) else {
            continue;
        };
        if !entry.is_privileged() {
            return Some(entry.clone());
        }
        if authorized.contains(username) {
            return Some(entry.clone());
        }
        info!("{username} is not allowed to use {trigger:?}");
    }
    None
}

/// Holds the active keymap. Readers never block and always see one whole keymap.
pub struct Dispatcher {
    keymap: ArcSwap<Keymap>,
    authorized: AuthorizedUsers,
}

impl Dispatcher {
    pub fn new(keymap: Keymap, authorized: AuthorizedUsers) -> Self {
        Dispatcher {
            keymap: ArcSwap::from_pointee(keymap),
            authorized,
        }
    }

    pub fn dispatch(&self, username: &str, message: &str) -> Option<Entry> {
        let keymap = self.keymap.load();
        let entry = match_entry(username, message, &keymap, &self.authorized);
        if entry.is_none() {
            debug!("No command for {message:?}");
        }
        entry
    }

    /// Publishes a new keymap. Run state of the old one is discarded with it.
    pub fn install(&self, keymap: Arc<Keymap>) {
        info!("Installing keymap with {} commands", keymap.len());
        self.keymap.store(keymap);
    }

    pub fn keymap(&self) -> Arc<Keymap> {
        self.keymap.load_full()
    }

    pub fn authorized(&self) -> &AuthorizedUsers {
        &self.authorized
    }
}
