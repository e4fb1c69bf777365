use crate::DiskError;
use kiln_schema::FilesystemCustomization;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Rule for a path and everything below it.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PathPolicy {
    /// Only the path itself may be used, not its children.
    #[serde(default)]
    pub exact: bool,
    /// Neither the path nor its children may be used.
    #[serde(default)]
    pub deny: bool,
}

impl PathPolicy {
    pub const ALLOW: PathPolicy = PathPolicy {
        exact: false,
        deny: false,
    };
    pub const EXACT: PathPolicy = PathPolicy {
        exact: true,
        deny: false,
    };
    pub const DENY: PathPolicy = PathPolicy {
        exact: false,
        deny: true,
    };
}

/// The most specific matching policy wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MountpointPolicies {
    policies: BTreeMap<String, PathPolicy>,
}

impl MountpointPolicies {
    pub fn new<'a>(entries: impl IntoIterator<Item = (&'a str, PathPolicy)>) -> Self {
        Self {
            policies: entries
                .into_iter()
                .map(|(path, policy)| (path.to_owned(), policy))
                .collect(),
        }
    }

    /// Policy applied to custom filesystem mountpoints of disk images.
    pub fn default_mountpoints() -> Self {
        Self::new([
            ("/", PathPolicy::EXACT),
            ("/boot", PathPolicy::EXACT),
            ("/var", PathPolicy::ALLOW),
            ("/var/run", PathPolicy::DENY),
            ("/var/lock", PathPolicy::DENY),
            ("/opt", PathPolicy::ALLOW),
            ("/srv", PathPolicy::ALLOW),
            ("/usr", PathPolicy::ALLOW),
            ("/app", PathPolicy::ALLOW),
            ("/data", PathPolicy::ALLOW),
            ("/home", PathPolicy::ALLOW),
            ("/tmp", PathPolicy::ALLOW),
        ])
    }

    /// Permit every clean absolute path.
    pub fn allow_all() -> Self {
        Self::new([("/", PathPolicy::ALLOW)])
    }

    pub fn check(&self, path: &str) -> Result<(), String> {
        if !is_clean_absolute(path) {
            return Err(format!("{path}: must be a clean absolute path"));
        }
        let Some((prefix, policy)) = self.longest_match(path) else {
            return Err(format!("{path}: not allowed"));
        };
        if policy.deny {
            return Err(format!("{path}: {prefix} is denied"));
        }
        if policy.exact && path != prefix {
            return Err(format!("{path}: only {prefix} itself may be used"));
        }
        Ok(())
    }

    fn longest_match(&self, path: &str) -> Option<(&str, PathPolicy)> {
        self.policies
            .iter()
            .filter(|(prefix, _)| is_path_prefix(prefix, path))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(prefix, policy)| (prefix.as_str(), *policy))
    }
}

fn is_path_prefix(prefix: &str, path: &str) -> bool {
    if prefix == "/" {
        return path.starts_with('/');
    }
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn is_clean_absolute(path: &str) -> bool {
    if path == "/" {
        return true;
    }
    path.starts_with('/')
        && !path.ends_with('/')
        && path[1..]
            .split('/')
            .all(|c| !c.is_empty() && c != "." && c != "..")
}

/// Check every mountpoint against `policies`, reporting all violations at
/// once. Duplicate mountpoints are a violation too.
pub fn check_mountpoints(
    mountpoints: &[FilesystemCustomization],
    policies: &MountpointPolicies,
) -> Result<(), DiskError> {
    let mut errors = Vec::new();
    let mut seen = BTreeSet::new();
    for fs in mountpoints {
        if !seen.insert(fs.mountpoint.as_str()) {
            errors.push(format!("{}: duplicate mountpoint", fs.mountpoint));
            continue;
        }
        if let Err(e) = policies.check(&fs.mountpoint) {
            errors.push(e);
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(DiskError::InvalidMountpoints(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mps(paths: &[&str]) -> Vec<FilesystemCustomization> {
        paths
            .iter()
            .map(|p| FilesystemCustomization {
                mountpoint: (*p).to_owned(),
                minsize: 0,
            })
            .collect()
    }

    #[test]
    fn default_policy_accepts_common_paths() {
        let policies = MountpointPolicies::default_mountpoints();
        assert!(check_mountpoints(&mps(&["/", "/boot", "/var", "/var/log", "/home/user"]), &policies).is_ok());
    }

    #[test]
    fn exact_paths_reject_children() {
        let policies = MountpointPolicies::default_mountpoints();
        assert!(policies.check("/boot/efi").is_err());
        assert!(policies.check("/etc").is_err());
    }

    #[test]
    fn denied_subtree_wins_over_parent() {
        let policies = MountpointPolicies::default_mountpoints();
        assert!(policies.check("/var/run").is_err());
        assert!(policies.check("/var/run/foo").is_err());
        assert!(policies.check("/var/runner").is_ok());
    }

    #[test]
    fn unclean_paths_are_rejected() {
        let policies = MountpointPolicies::allow_all();
        for bad in ["var", "/var/", "/var//log", "/var/../etc", "/./var"] {
            assert!(policies.check(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn all_violations_are_reported() {
        let policies = MountpointPolicies::default_mountpoints();
        let err = check_mountpoints(&mps(&["/etc", "/var", "/var", "/boot/efi"]), &policies)
            .unwrap_err();
        match err {
            DiskError::InvalidMountpoints(errors) => assert_eq!(errors.len(), 3),
            other => panic!("unexpected error: {other}"),
        }
    }
}
