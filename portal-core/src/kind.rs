//! Entity kinds that partition the cache namespace.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Entity kind discriminator.
///
/// Identities of different kinds are never comparable: molecule `5` and
/// record `5` are unrelated entities and live under separate cache keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Molecule,
    #[serde(rename = "keyword")]
    KeywordSet,
    Record,
}

impl EntityKind {
    /// All kinds, in discriminant order.
    pub const ALL: [EntityKind; 3] = [
        EntityKind::Molecule,
        EntityKind::KeywordSet,
        EntityKind::Record,
    ];

    /// Stable tag used in logs and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Molecule => "molecule",
            EntityKind::KeywordSet => "keyword",
            EntityKind::Record => "record",
        }
    }

    /// Stable one-byte discriminant used in persisted cache keys.
    ///
    /// Never renumber an existing kind; on-disk caches would silently
    /// serve entities under the wrong namespace.
    pub fn to_byte(self) -> u8 {
        match self {
            EntityKind::Molecule => 0,
            EntityKind::KeywordSet => 1,
            EntityKind::Record => 2,
        }
    }

    /// Inverse of [`EntityKind::to_byte`].
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(EntityKind::Molecule),
            1 => Some(EntityKind::KeywordSet),
            2 => Some(EntityKind::Record),
            _ => None,
        }
    }

    /// Name of the server-advertised bulk-get limit for this kind.
    pub fn limit_key(&self) -> &'static str {
        match self {
            EntityKind::Molecule => "get_molecules",
            EntityKind::KeywordSet => "get_keywords",
            EntityKind::Record => "get_records",
        }
    }
}

fn normalize_token(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "molecule" | "molecules" => Ok(EntityKind::Molecule),
            "keyword" | "keywords" | "keywordset" => Ok(EntityKind::KeywordSet),
            "record" | "records" => Ok(EntityKind::Record),
            _ => Err(format!("Invalid EntityKind: {}", s)),
        }
    }
}
