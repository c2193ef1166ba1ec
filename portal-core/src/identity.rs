//! Canonical identities for cached entities.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Canonical string form of an entity id.
///
/// The server hands out integer ids, but call sites pass them around as
/// integers or strings interchangeably. Every id is normalized to its decimal
/// string form before it touches a cache key, so `5` and `"5"` resolve to the
/// same entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityIdentity(String);

impl EntityIdentity {
    /// Wrap an already-canonical string.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for EntityIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for EntityIdentity {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for EntityIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&EntityIdentity> for EntityIdentity {
    fn from(value: &EntityIdentity) -> Self {
        value.clone()
    }
}

impl From<String> for EntityIdentity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for EntityIdentity {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<&String> for EntityIdentity {
    fn from(value: &String) -> Self {
        Self(value.clone())
    }
}

macro_rules! identity_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for EntityIdentity {
                fn from(value: $ty) -> Self {
                    Self(value.to_string())
                }
            }

            impl From<&$ty> for EntityIdentity {
                fn from(value: &$ty) -> Self {
                    Self(value.to_string())
                }
            }
        )*
    };
}

identity_from_integer!(i32, i64, u32, u64, usize);

/// Normalize a sequence of raw ids, keeping order and duplicates.
pub fn identities<I, T>(ids: I) -> Vec<EntityIdentity>
where
    I: IntoIterator<Item = T>,
    T: Into<EntityIdentity>,
{
    ids.into_iter().map(Into::into).collect()
}
