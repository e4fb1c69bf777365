use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::blueprint::InputError;

/// Per-request options that are not part of the blueprint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ImageOptions {
    /// Requested image size in bytes; 0 selects the image type's default.
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub ostree: OstreeImageOptions,
}

/// Where an OSTree-based image gets its commit from, and which ref it
/// produces.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct OstreeImageOptions {
    /// Ref of the commit to build; empty selects the image type's default.
    #[serde(default)]
    pub image_ref: String,
    /// Parent ref for a new commit.
    #[serde(default)]
    pub parent_ref: String,
    /// Resolved commit checksum to fetch.
    #[serde(default)]
    pub fetch_checksum: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub content_url: String,
    /// Fetch with the host's registered consumer credentials.
    #[serde(default)]
    pub rhsm: bool,
}

impl OstreeImageOptions {
    pub fn has_commit_source(&self) -> bool {
        !self.fetch_checksum.is_empty() && !self.url.is_empty()
    }
}

pub fn parse_options_str(input: &str) -> Result<ImageOptions, serde_json::Error> {
    serde_json::from_str(input)
}

pub fn parse_options_file(path: impl AsRef<Path>) -> Result<ImageOptions, InputError> {
    let content = fs::read_to_string(path)?;
    Ok(parse_options_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_empty() {
        let opts = parse_options_str("{}").unwrap();
        assert_eq!(opts.size, 0);
        assert!(!opts.ostree.has_commit_source());
    }

    #[test]
    fn commit_source_needs_checksum_and_url() {
        let mut opts = parse_options_str(
            r#"{"size": 4294967296, "ostree": {"url": "https://ostree.example.com/repo"}}"#,
        )
        .unwrap();
        assert_eq!(opts.size, 4 << 30);
        assert!(!opts.ostree.has_commit_source());
        opts.ostree.fetch_checksum = "a".repeat(64);
        assert!(opts.ostree.has_commit_source());
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(parse_options_str(r#"{"sise": 1}"#).is_err());
    }
}
