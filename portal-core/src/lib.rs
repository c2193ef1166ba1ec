//! Portal Core - Shared Types
//!
//! Plain data types used by every other Portal crate: entity kinds,
//! canonical identities, field filters, server limits, cache configuration
//! and the error taxonomy. No I/O lives here.

pub mod config;
pub mod error;
pub mod filter;
pub mod identity;
pub mod kind;

pub use config::{CacheConfig, ServerLimits};
pub use error::{
    CacheError, ConfigError, FetchError, PortalError, PortalResult, ResolveError,
};
pub use filter::{FieldFilter, IDENTITY_FIELD};
pub use identity::{identities, EntityIdentity};
pub use kind::EntityKind;
