//! Typed identifiers for compiled manifests.
//!
//! Each id is the lowercase hex form of a blake3 digest (or a prefix of
//! one). They serialize as bare strings, so a build request carries its
//! `manifest_checksum` exactly as the hex text a worker compares against.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

/// Hex characters kept in a [`ShortId`].
pub const SHORT_ID_LEN: usize = 12;

macro_rules! digest_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(hex: impl Into<String>) -> Self {
                Self(hex.into())
            }

            pub fn from_digest(digest: &blake3::Hash) -> Self {
                Self(digest.to_hex().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

digest_id!(
    /// Checksum of a whole manifest. Equal manifests always share it, and
    /// it is what a build request pins.
    ManifestId
);

digest_id!(
    /// Leading characters of a [`ManifestId`], for log lines and listings.
    ShortId
);

digest_id!(
    /// Chained digest of one pipeline: its name, the pipeline that provides
    /// its build root, and every stage in order.
    PipelineId
);

impl ManifestId {
    /// The display prefix of this id. Ids shorter than the prefix are
    /// returned whole.
    pub fn short(&self) -> ShortId {
        let end = self.0.len().min(SHORT_ID_LEN);
        ShortId(self.0[..end].to_owned())
    }
}

impl From<PipelineId> for ManifestId {
    fn from(id: PipelineId) -> Self {
        Self(id.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_ids_are_lowercase_hex() {
        let id = PipelineId::from_digest(&blake3::hash(b"os"));
        assert_eq!(id.len(), 64);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(id.to_string(), id.as_str());
    }

    #[test]
    fn manifest_id_serializes_as_bare_string() {
        let id = ManifestId::new("deadbeef");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"deadbeef\"");
        let back: ManifestId = serde_json::from_str("\"deadbeef\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn short_id_is_a_prefix() {
        let id = ManifestId::from(PipelineId::from_digest(&blake3::hash(b"image")));
        let short = id.short();
        assert_eq!(short.len(), SHORT_ID_LEN);
        assert!(id.starts_with(short.as_str()));
        assert_eq!(ManifestId::new("abc").short().as_str(), "abc");
    }
}
