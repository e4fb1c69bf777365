//! Request/result contract of the external dependency-resolution job.

use crate::blueprint::InputError;
use crate::rpmmd::{PackageSetChain, PackageSpec, RepoConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DepsolveError {
    #[error("depsolve failed: {0}")]
    Failed(String),
    #[error("depsolve result is missing package set '{0}'")]
    MissingPackageSet(String),
}

/// Work item for the depsolver: every named chain is solved independently,
/// each chain layer on top of the previous ones.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DepsolveJob {
    pub package_sets: BTreeMap<String, PackageSetChain>,
    /// Repositories applied to every set in addition to the per-set ones.
    #[serde(default)]
    pub repos: Vec<RepoConfig>,
    pub module_platform_id: String,
    pub arch: String,
    pub releasever: String,
}

impl DepsolveJob {
    pub fn requested_names(&self) -> impl Iterator<Item = &str> {
        self.package_sets.keys().map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DepsolveJobResult {
    #[serde(default)]
    pub package_specs: BTreeMap<String, Vec<PackageSpec>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl DepsolveJobResult {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            package_specs: BTreeMap::new(),
            error: error.into(),
        }
    }

    /// Accept the result for `job`.
    ///
    /// Extra or reordered names are tolerated, but every requested name must
    /// be present.
    pub fn into_package_specs(
        self,
        job: &DepsolveJob,
    ) -> Result<BTreeMap<String, Vec<PackageSpec>>, DepsolveError> {
        if !self.error.is_empty() {
            return Err(DepsolveError::Failed(self.error));
        }
        if let Some(missing) = job
            .requested_names()
            .find(|name| !self.package_specs.contains_key(*name))
        {
            return Err(DepsolveError::MissingPackageSet(missing.to_owned()));
        }
        Ok(self.package_specs)
    }
}

pub fn parse_depsolve_result_file(
    path: impl AsRef<Path>,
) -> Result<DepsolveJobResult, InputError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpmmd::PackageSet;

    fn job(names: &[&str]) -> DepsolveJob {
        DepsolveJob {
            package_sets: names
                .iter()
                .map(|n| ((*n).to_owned(), vec![PackageSet::with_include(["bash"])]))
                .collect(),
            module_platform_id: "platform:el8".to_owned(),
            arch: "x86_64".to_owned(),
            releasever: "8".to_owned(),
            ..DepsolveJob::default()
        }
    }

    fn result(names: &[&str]) -> DepsolveJobResult {
        DepsolveJobResult {
            package_specs: names
                .iter()
                .map(|n| ((*n).to_owned(), Vec::new()))
                .collect(),
            error: String::new(),
        }
    }

    #[test]
    fn superset_result_is_accepted() {
        let specs = result(&["build", "os", "extra"])
            .into_package_specs(&job(&["os", "build"]))
            .unwrap();
        assert_eq!(specs.len(), 3);
    }

    #[test]
    fn missing_name_is_contract_violation() {
        let err = result(&["build"])
            .into_package_specs(&job(&["build", "os"]))
            .unwrap_err();
        assert_eq!(err, DepsolveError::MissingPackageSet("os".to_owned()));
    }

    #[test]
    fn error_string_wins() {
        let err = DepsolveJobResult::failed("no package bash")
            .into_package_specs(&job(&[]))
            .unwrap_err();
        assert!(err.to_string().contains("no package bash"));
    }

    #[test]
    fn error_is_omitted_from_wire_when_empty() {
        let json = serde_json::to_string(&result(&["os"])).unwrap();
        assert_eq!(json, r#"{"package_specs":{"os":[]}}"#);
    }
}
