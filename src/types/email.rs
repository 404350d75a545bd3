//! Email template artifact types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::canonical::canonical_hash_hex;

/// An email template referenced by a node.
///
/// Templates are keyed by a string id rather than a UUID; the id doubles
/// as the stable reference nodes carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailTemplate {
    /// Template identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Localized subject lines, keyed by locale tag.
    #[serde(default)]
    pub subject: BTreeMap<String, String>,
    /// Localized message bodies, keyed by locale tag.
    #[serde(default)]
    pub message: BTreeMap<String, String>,
}

impl EmailTemplate {
    /// Create a template with a single-locale subject and message.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        locale: impl Into<String>,
        subject: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let locale = locale.into();
        let mut subjects = BTreeMap::new();
        subjects.insert(locale.clone(), subject.into());
        let mut messages = BTreeMap::new();
        messages.insert(locale, message.into());
        Self {
            id: id.into(),
            name: name.into(),
            subject: subjects,
            message: messages,
        }
    }

    /// Canonical hash of the template's localized content.
    ///
    /// Excludes the id, for the same reason scripts exclude theirs.
    pub fn content_hash(&self) -> String {
        canonical_hash_hex(&(&self.subject, &self.message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_tracks_localized_content() {
        let a = EmailTemplate::new("welcome", "Welcome", "en", "Hi", "Welcome aboard");
        let mut b = a.clone();
        b.id = "welcome2".to_string();
        assert_eq!(a.content_hash(), b.content_hash());

        b.message.insert("fr".to_string(), "Bienvenue".to_string());
        assert_ne!(a.content_hash(), b.content_hash());
    }
}
