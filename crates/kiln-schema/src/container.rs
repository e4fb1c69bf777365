use crate::blueprint::Container;
use serde::{Deserialize, Serialize};

/// A container image to embed, passed through to the manifest sources.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContainerSpec {
    pub source: String,
    /// Manifest digest, when the reference has been resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_verify: Option<bool>,
    /// Name the image is stored under inside the OS tree.
    #[serde(default)]
    pub local_name: String,
}

impl From<&Container> for ContainerSpec {
    fn from(c: &Container) -> Self {
        let local_name = if c.name.is_empty() {
            c.source.clone()
        } else {
            c.name.clone()
        };
        Self {
            source: c.source.clone(),
            digest: None,
            tls_verify: c.tls_verify,
            local_name,
        }
    }
}
