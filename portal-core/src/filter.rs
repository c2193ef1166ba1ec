//! Field projections for partial fetches.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;

/// Field that is always requested so partial results can still be keyed.
pub const IDENTITY_FIELD: &str = "id";

/// Set of field names to request from the server.
///
/// A filtered fetch returns partially populated entities, so any call that
/// carries a `FieldFilter` bypasses the cache in both directions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldFilter {
    fields: BTreeSet<String>,
}

impl FieldFilter {
    /// Build a filter from field names. The identity field is always added.
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut fields: BTreeSet<String> = fields.into_iter().map(Into::into).collect();
        fields.insert(IDENTITY_FIELD.to_string());
        Self { fields }
    }

    /// Add another field.
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.fields.insert(field.into());
        self
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<'de> Deserialize<'de> for FieldFilter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<String>::deserialize(deserializer).map(Self::new)
    }
}
