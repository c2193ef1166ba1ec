//! Error types for Portal cache operations

use crate::{EntityIdentity, EntityKind};
use thiserror::Error;

fn display_list(ids: &[EntityIdentity]) -> String {
    ids.iter()
        .map(EntityIdentity::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors synthesized while resolving identities.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    /// Carries every missing identity, in request order.
    #[error("No {kind} found for ids: [{}]", display_list(.missing))]
    NotFound {
        kind: EntityKind,
        missing: Vec<EntityIdentity>,
    },

    #[error("Cannot get {requested} {kind} entities - over the server limit of {limit}")]
    LimitExceeded {
        kind: EntityKind,
        requested: usize,
        limit: usize,
    },
}

/// Remote fetch failures, produced by fetch strategies and passed through
/// the cache untouched.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Transport failure: {reason}")]
    Transport { reason: String },

    #[error("Server returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Unauthorized: {reason}")]
    Unauthorized { reason: String },

    #[error("Could not decode response: {reason}")]
    Decode { reason: String },
}

/// Key-value store failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Failed to open cache store: {reason}")]
    Open { reason: String },

    #[error("Cache transaction failed: {reason}")]
    Transaction { reason: String },

    #[error("Failed to serialize {kind} entry {id}: {reason}")]
    Serialization {
        kind: EntityKind,
        id: EntityIdentity,
        reason: String,
    },

    #[error("Failed to deserialize {kind} entry {id}: {reason}")]
    Deserialization {
        kind: EntityKind,
        id: EntityIdentity,
        reason: String,
    },

    #[error("Cache lock poisoned")]
    LockPoisoned,
}

/// Configuration errors. Raised when a cache is opened, never per call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Cache directory {path} is unavailable: {reason}")]
    CacheDirUnavailable { path: String, reason: String },
}

/// Master error type for all Portal errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PortalError {
    #[error("Resolve error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl PortalError {
    /// Missing identities carried by a `NotFound` error, if this is one.
    pub fn missing_identities(&self) -> Option<&[EntityIdentity]> {
        match self {
            PortalError::Resolve(ResolveError::NotFound { missing, .. }) => Some(missing),
            _ => None,
        }
    }
}

/// Result type alias for Portal operations.
pub type PortalResult<T> = Result<T, PortalError>;

// =============================================================================
// TESTS
// =============================================================================
