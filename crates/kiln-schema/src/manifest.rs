//! The build manifest handed to the external build engine.
//!
//! Pipelines and stages are opaque to the compiler beyond their order and
//! names: stage options are carried as JSON values. All maps are ordered so
//! that serializing the same manifest twice yields identical bytes.

use crate::container::ContainerSpec;
use crate::rpmmd::PackageSpec;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Schema tag consumers key off.
pub const MANIFEST_VERSION: &str = "2";

/// Secrets name used for content fetched with consumer certificates.
pub const RHSM_SECRETS: &str = "org.osbuild.rhsm";
/// Secrets name used for OSTree remotes fetched with consumer certificates.
pub const RHSM_CONSUMER_SECRETS: &str = "org.osbuild.rhsm.consumer";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    pub version: String,
    pub pipelines: Vec<Pipeline>,
    pub sources: Sources,
}

impl Manifest {
    pub fn new(pipelines: Vec<Pipeline>, sources: Sources) -> Self {
        Self {
            version: MANIFEST_VERSION.to_owned(),
            pipelines,
            sources,
        }
    }

    pub fn pipeline(&self, name: &str) -> Option<&Pipeline> {
        self.pipelines.iter().find(|p| p.name == name)
    }

    pub fn pipeline_names(&self) -> Vec<&str> {
        self.pipelines.iter().map(|p| p.name.as_str()).collect()
    }

    /// Compact JSON; identical manifests always serialize to identical bytes.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pipeline {
    pub name: String,
    /// `name:<pipeline>` reference to the build root this pipeline runs in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runner: Option<String>,
    #[serde(default)]
    pub stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            build: None,
            runner: None,
            stages: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_build(mut self, build_pipeline: &str) -> Self {
        self.build = Some(format!("name:{build_pipeline}"));
        self
    }

    #[must_use]
    pub fn with_runner(mut self, runner: impl Into<String>) -> Self {
        self.runner = Some(runner.into());
        self
    }

    pub fn add_stage(&mut self, stage: Stage) {
        self.stages.push(stage);
    }

    /// Name of the build pipeline, without the `name:` prefix.
    pub fn build_name(&self) -> Option<&str> {
        self.build
            .as_deref()
            .map(|b| b.strip_prefix("name:").unwrap_or(b))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub devices: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mounts: Option<Value>,
}

impl Stage {
    pub fn new(kind: impl Into<String>, options: Value) -> Self {
        Self {
            options: Some(options),
            ..Self::bare(kind)
        }
    }

    pub fn bare(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            inputs: None,
            options: None,
            devices: None,
            mounts: None,
        }
    }

    #[must_use]
    pub fn with_inputs(mut self, inputs: Value) -> Self {
        self.inputs = Some(inputs);
        self
    }

    #[must_use]
    pub fn with_devices(mut self, devices: Value) -> Self {
        self.devices = Some(devices);
        self
    }

    #[must_use]
    pub fn with_mounts(mut self, mounts: Value) -> Self {
        self.mounts = Some(mounts);
        self
    }
}

/// A resolved OSTree commit to pull into the build.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommitSpec {
    pub checksum: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sources {
    #[serde(
        rename = "org.osbuild.curl",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub curl: Option<CurlSource>,
    #[serde(
        rename = "org.osbuild.ostree",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub ostree: Option<OstreeSource>,
    #[serde(
        rename = "org.osbuild.inline",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub inline: Option<InlineSource>,
    #[serde(
        rename = "org.osbuild.skopeo",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub skopeo: Option<SkopeoSource>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Secrets {
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CurlSource {
    pub items: BTreeMap<String, CurlItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CurlItem {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets: Option<Secrets>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OstreeSource {
    pub items: BTreeMap<String, OstreeItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OstreeItem {
    pub remote: OstreeRemote,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OstreeRemote {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contenturl: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets: Option<Secrets>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InlineSource {
    pub items: BTreeMap<String, InlineItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InlineItem {
    pub encoding: String,
    pub data: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkopeoSource {
    pub items: BTreeMap<String, SkopeoItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkopeoItem {
    pub image: SkopeoImage,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkopeoImage {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(
        default,
        rename = "tls-verify",
        skip_serializing_if = "Option::is_none"
    )]
    pub tls_verify: Option<bool>,
}

/// Content address of an inline blob, as referenced by stages.
pub fn inline_data_id(data: &str) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(data.as_bytes())))
}

/// Build the sources section. Empty categories are omitted entirely.
pub fn gen_sources(
    packages: &[PackageSpec],
    commits: &[CommitSpec],
    inline_data: &[String],
    containers: &[ContainerSpec],
) -> Sources {
    let mut sources = Sources::default();

    if !packages.is_empty() {
        let items = packages
            .iter()
            .map(|pkg| {
                let secrets = pkg.secrets.as_ref().map(|name| Secrets { name: name.clone() });
                (
                    pkg.checksum.clone(),
                    CurlItem {
                        url: pkg.remote_location.clone(),
                        secrets,
                    },
                )
            })
            .collect();
        sources.curl = Some(CurlSource { items });
    }

    if !commits.is_empty() {
        let items = commits
            .iter()
            .map(|commit| {
                let remote = OstreeRemote {
                    url: commit.url.clone(),
                    contenturl: (!commit.content_url.is_empty())
                        .then(|| commit.content_url.clone()),
                    secrets: commit.secrets.as_ref().map(|name| Secrets { name: name.clone() }),
                };
                (commit.checksum.clone(), OstreeItem { remote })
            })
            .collect();
        sources.ostree = Some(OstreeSource { items });
    }

    if !inline_data.is_empty() {
        let items = inline_data
            .iter()
            .map(|data| {
                (
                    inline_data_id(data),
                    InlineItem {
                        encoding: "base64".to_owned(),
                        data: base64::engine::general_purpose::STANDARD.encode(data.as_bytes()),
                    },
                )
            })
            .collect();
        sources.inline = Some(InlineSource { items });
    }

    if !containers.is_empty() {
        let items = containers
            .iter()
            .map(|c| {
                let key = c.digest.clone().unwrap_or_else(|| c.source.clone());
                (
                    key,
                    SkopeoItem {
                        image: SkopeoImage {
                            name: c.source.clone(),
                            digest: c.digest.clone(),
                            tls_verify: c.tls_verify,
                        },
                    },
                )
            })
            .collect();
        sources.skopeo = Some(SkopeoSource { items });
    }

    sources
}
