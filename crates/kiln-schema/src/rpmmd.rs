//! Package sets, repositories, and resolved package specifications.

use crate::blueprint::InputError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// A package repository as seen by the depsolver.
///
/// A repository with an empty `package_sets` list applies to every package
/// set of a request; otherwise only to the named sets.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepoConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseurl: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metalink: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirrorlist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpg_key: Option<String>,
    #[serde(default)]
    pub check_gpg: bool,
    #[serde(default)]
    pub rhsm: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub package_sets: Vec<String>,
}

impl RepoConfig {
    pub fn new(name: impl Into<String>, baseurl: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            baseurl: Some(baseurl.into()),
            ..Self::default()
        }
    }

    /// Restrict this repository to the given package sets.
    #[must_use]
    pub fn scoped_to(mut self, sets: &[&str]) -> Self {
        self.package_sets = sets.iter().map(|s| (*s).to_owned()).collect();
        self
    }

    pub fn is_scoped(&self) -> bool {
        !self.package_sets.is_empty()
    }
}

/// Include/exclude package lists plus the repositories they resolve against.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageSet {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub repositories: Vec<RepoConfig>,
}

impl PackageSet {
    pub fn with_include<I, S>(include: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            include: include.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Concatenate includes, excludes and repositories, `self` first.
    #[must_use]
    pub fn append(mut self, other: PackageSet) -> PackageSet {
        self.include.extend(other.include);
        self.exclude.extend(other.exclude);
        self.repositories.extend(other.repositories);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }
}

/// An ordered sequence of package sets solved as successive layers.
pub type PackageSetChain = Vec<PackageSet>;

/// A concrete, installable package returned by the depsolver.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackageSpec {
    pub name: String,
    #[serde(default)]
    pub epoch: u32,
    pub version: String,
    pub release: String,
    pub arch: String,
    pub remote_location: String,
    /// `algorithm:hex`, e.g. `sha256:…`.
    pub checksum: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets: Option<String>,
    #[serde(default)]
    pub check_gpg: bool,
}

impl PackageSpec {
    /// `name-[epoch:]version-release.arch`
    pub fn nevra(&self) -> String {
        if self.epoch == 0 {
            format!(
                "{}-{}-{}.{}",
                self.name, self.version, self.release, self.arch
            )
        } else {
            format!(
                "{}-{}:{}-{}.{}",
                self.name, self.epoch, self.version, self.release, self.arch
            )
        }
    }
}

/// Read a JSON array of repositories.
pub fn parse_repos_file(path: impl AsRef<Path>) -> Result<Vec<RepoConfig>, InputError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
