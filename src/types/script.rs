//! Script artifact types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::canonical::canonical_hash_hex;

/// Unique identifier for a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScriptId(Uuid);

impl ScriptId {
    /// Create a new ScriptId from a UUID.
    pub fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse a ScriptId from a UUID string.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    /// Mint a fresh random ScriptId.
    pub fn mint() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ScriptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Source language of a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScriptLanguage {
    /// JavaScript source.
    JavaScript,
    /// Groovy source.
    Groovy,
}

impl ScriptLanguage {
    /// Parse a language tag from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "javascript" => Some(Self::JavaScript),
            "groovy" => Some(Self::Groovy),
            _ => None,
        }
    }
}

impl Default for ScriptLanguage {
    fn default() -> Self {
        Self::JavaScript
    }
}

impl fmt::Display for ScriptLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::JavaScript => write!(f, "javascript"),
            Self::Groovy => write!(f, "groovy"),
        }
    }
}

/// A script artifact referenced by a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    /// Unique script identifier.
    pub id: ScriptId,
    /// Script name, unique within a realm.
    pub name: String,
    /// Free-text description, shown by journey summaries.
    #[serde(default)]
    pub description: String,
    /// Source language tag.
    pub language: ScriptLanguage,
    /// Source text.
    pub source: String,
    /// Variable bindings available to the script.
    #[serde(default)]
    pub bindings: BTreeMap<String, String>,
}

impl Script {
    /// Create a script with empty description and bindings.
    pub fn new(
        id: ScriptId,
        name: impl Into<String>,
        language: ScriptLanguage,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            language,
            source: source.into(),
            bindings: BTreeMap::new(),
        }
    }

    /// Canonical hash of the script's semantic content.
    ///
    /// Identity (id) and name are excluded: two scripts with equal content
    /// hashes are interchangeable, which is what import-time deduplication
    /// compares after matching on name.
    pub fn content_hash(&self) -> String {
        canonical_hash_hex(&(&self.language, &self.source, &self.bindings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_parsing() {
        assert_eq!(ScriptLanguage::parse("JavaScript"), Some(ScriptLanguage::JavaScript));
        assert_eq!(ScriptLanguage::parse("groovy"), Some(ScriptLanguage::Groovy));
        assert_eq!(ScriptLanguage::parse("python"), None);
    }

    #[test]
    fn test_content_hash_ignores_identity() {
        let a = Script::new(ScriptId::mint(), "check", ScriptLanguage::JavaScript, "x()");
        let mut b = Script::new(ScriptId::mint(), "check-renamed", ScriptLanguage::JavaScript, "x()");
        assert_eq!(a.content_hash(), b.content_hash());

        b.source = "y()".to_string();
        assert_ne!(a.content_hash(), b.content_hash());
    }
}
