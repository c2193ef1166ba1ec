//! Kind-scoped cache keys.
//!
//! A `KindScopedKey` can only be built from an [`EntityKind`] and an
//! [`EntityIdentity`] together, so there is no way to look up an identity
//! without naming its namespace.

use portal_core::{EntityIdentity, EntityKind};

/// Separator byte between the kind discriminant and the identity.
///
/// `0xFF` never appears in valid UTF-8, so it cannot be confused with the
/// first byte of an identity.
const SEPARATOR: u8 = 0xFF;

/// Length of the `[kind][separator]` header.
const HEADER_LEN: usize = 2;

/// Longest identity, in bytes, that fits in an LMDB key (511 bytes by default).
pub const MAX_ENCODED_IDENTITY_LEN: usize = 511 - HEADER_LEN;

/// A cache key scoped to one entity kind.
///
/// # Binary Format
///
/// - Byte 0: kind discriminant ([`EntityKind::to_byte`])
/// - Byte 1: separator (0xFF)
/// - Bytes 2..: identity as UTF-8
///
/// Keys sort by kind first, so a prefix scan over `[kind][0xFF]` visits
/// exactly one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KindScopedKey {
    kind: EntityKind,
    identity: EntityIdentity,
}

impl KindScopedKey {
    pub fn new(kind: EntityKind, identity: EntityIdentity) -> Self {
        Self { kind, identity }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn identity(&self) -> &EntityIdentity {
        &self.identity
    }

    /// Whether this key fits within the LMDB key size limit.
    pub fn fits_lmdb(&self) -> bool {
        self.identity.as_str().len() <= MAX_ENCODED_IDENTITY_LEN
    }

    /// Encode this key for persistent storage.
    pub fn encode(&self) -> Vec<u8> {
        let id = self.identity.as_str().as_bytes();
        let mut bytes = Vec::with_capacity(HEADER_LEN + id.len());
        bytes.push(self.kind.to_byte());
        bytes.push(SEPARATOR);
        bytes.extend_from_slice(id);
        bytes
    }

    /// Decode a key from bytes.
    ///
    /// Returns `None` if the header is short, the separator is wrong, the
    /// kind byte is unknown, or the identity is not UTF-8.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_LEN || bytes[1] != SEPARATOR {
            return None;
        }

        let kind = EntityKind::from_byte(bytes[0])?;
        let identity = std::str::from_utf8(&bytes[HEADER_LEN..]).ok()?;

        Some(Self::new(kind, EntityIdentity::from(identity)))
    }

    /// Prefix shared by every key of a kind.
    pub fn kind_prefix(kind: EntityKind) -> [u8; HEADER_LEN] {
        [kind.to_byte(), SEPARATOR]
    }
}
