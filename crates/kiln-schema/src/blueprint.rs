use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Kernel package installed when the blueprint does not name one.
pub const DEFAULT_KERNEL_NAME: &str = "kernel";

#[derive(Debug, Error)]
pub enum InputError {
    #[error("failed to read input file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse blueprint: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("failed to parse JSON input: {0}")]
    ParseJson(#[from] serde_json::Error),
    #[error("package name must not be empty")]
    EmptyPackageName,
    #[error("group name must not be empty")]
    EmptyGroupName,
    #[error("container source must not be empty")]
    EmptyContainerSource,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Blueprint {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub packages: Vec<Package>,
    #[serde(default)]
    pub modules: Vec<Package>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub containers: Vec<Container>,
    #[serde(default)]
    pub customizations: Customizations,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Package {
    pub name: String,
    #[serde(default)]
    pub version: String,
}

impl Package {
    /// `name` for wildcard or empty versions, `name-version` otherwise.
    ///
    /// Emitting `name-*` would make the depsolver match every package that
    /// merely shares the prefix.
    pub fn to_name_version(&self) -> String {
        if self.version.is_empty() || self.version == "*" {
            self.name.clone()
        } else {
            format!("{}-{}", self.name, self.version)
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Group {
    pub name: String,
}

/// Container image to embed into the OS tree.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Container {
    pub source: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "tls-verify")]
    pub tls_verify: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Customizations {
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub kernel: Option<KernelCustomization>,
    #[serde(default)]
    pub user: Vec<UserCustomization>,
    #[serde(default)]
    pub group: Vec<GroupCustomization>,
    #[serde(default)]
    pub timezone: Option<TimezoneCustomization>,
    #[serde(default)]
    pub locale: Option<LocaleCustomization>,
    #[serde(default)]
    pub services: Option<ServicesCustomization>,
    #[serde(default)]
    pub filesystem: Vec<FilesystemCustomization>,
    #[serde(default)]
    pub installation_device: Option<String>,
    #[serde(default)]
    pub fdo: Option<FdoCustomization>,
    #[serde(default)]
    pub openscap: Option<OpenScapCustomization>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct KernelCustomization {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub append: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct UserCustomization {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub home: Option<String>,
    #[serde(default)]
    pub shell: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub uid: Option<u32>,
    #[serde(default)]
    pub gid: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct GroupCustomization {
    pub name: String,
    #[serde(default)]
    pub gid: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TimezoneCustomization {
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub ntpservers: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LocaleCustomization {
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub keyboard: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServicesCustomization {
    #[serde(default)]
    pub enabled: Vec<String>,
    #[serde(default)]
    pub disabled: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FilesystemCustomization {
    pub mountpoint: String,
    /// Minimum size in bytes.
    #[serde(default, alias = "size")]
    pub minsize: u64,
}

/// FIDO Device Onboarding settings for the simplified installer.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FdoCustomization {
    #[serde(default)]
    pub manufacturing_server_url: String,
    #[serde(default)]
    pub diun_pub_key_insecure: String,
    #[serde(default)]
    pub diun_pub_key_hash: String,
    #[serde(default)]
    pub diun_pub_key_root_certs: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct OpenScapCustomization {
    #[serde(default)]
    pub datastream: String,
    #[serde(default)]
    pub profile_id: String,
}

impl Blueprint {
    /// Package names to request from the depsolver.
    ///
    /// With `bootable`, the customized (or default) kernel is appended.
    pub fn packages_ex(&self, bootable: bool) -> Vec<String> {
        let mut out: Vec<String> = self
            .packages
            .iter()
            .chain(&self.modules)
            .map(Package::to_name_version)
            .collect();
        out.extend(self.groups.iter().map(|g| format!("@{}", g.name)));
        if bootable {
            out.push(self.customizations.kernel_name().to_owned());
        }
        out
    }

    pub fn packages(&self) -> Vec<String> {
        self.packages_ex(true)
    }

    fn validate(&self) -> Result<(), InputError> {
        if self
            .packages
            .iter()
            .chain(&self.modules)
            .any(|p| p.name.trim().is_empty())
        {
            return Err(InputError::EmptyPackageName);
        }
        if self.groups.iter().any(|g| g.name.trim().is_empty()) {
            return Err(InputError::EmptyGroupName);
        }
        if self.containers.iter().any(|c| c.source.trim().is_empty()) {
            return Err(InputError::EmptyContainerSource);
        }
        Ok(())
    }
}

impl Customizations {
    pub fn kernel_name(&self) -> &str {
        match &self.kernel {
            Some(k) if !k.name.is_empty() => &k.name,
            _ => DEFAULT_KERNEL_NAME,
        }
    }

    pub fn kernel_append(&self) -> &str {
        self.kernel.as_ref().map_or("", |k| k.append.as_str())
    }

    pub fn timezone(&self) -> Option<&str> {
        self.timezone.as_ref().and_then(|t| t.timezone.as_deref())
    }

    pub fn ntp_servers(&self) -> &[String] {
        self.timezone
            .as_ref()
            .map_or(&[][..], |t| t.ntpservers.as_slice())
    }

    pub fn installation_device(&self) -> &str {
        self.installation_device.as_deref().unwrap_or("")
    }

    /// Names of the customization sections that carry a value, in
    /// declaration order.
    pub fn set_sections(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.hostname.is_some() {
            out.push("hostname");
        }
        if self.kernel.is_some() {
            out.push("kernel");
        }
        if !self.user.is_empty() {
            out.push("user");
        }
        if !self.group.is_empty() {
            out.push("group");
        }
        if self.timezone.is_some() {
            out.push("timezone");
        }
        if self.locale.is_some() {
            out.push("locale");
        }
        if self.services.is_some() {
            out.push("services");
        }
        if !self.filesystem.is_empty() {
            out.push("filesystem");
        }
        if self.installation_device.is_some() {
            out.push("installation_device");
        }
        if self.fdo.is_some() {
            out.push("fdo");
        }
        if self.openscap.is_some() {
            out.push("openscap");
        }
        out
    }

    /// Return the set sections that are not in `allowed`.
    pub fn check_allowed(&self, allowed: &[&str]) -> Result<(), Vec<&'static str>> {
        let denied: Vec<&'static str> = self
            .set_sections()
            .into_iter()
            .filter(|s| !allowed.contains(s))
            .collect();
        if denied.is_empty() {
            Ok(())
        } else {
            Err(denied)
        }
    }
}

pub fn parse_blueprint_str(input: &str) -> Result<Blueprint, InputError> {
    let bp: Blueprint = toml::from_str(input)?;
    bp.validate()?;
    Ok(bp)
}

pub fn parse_blueprint_file(path: impl AsRef<Path>) -> Result<Blueprint, InputError> {
    let content = fs::read_to_string(path)?;
    parse_blueprint_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_blueprint() {
        let input = r#"
name = "edge-device"
description = "test"
version = "0.0.1"

[[packages]]
name = "tmux"
version = "*"

[[packages]]
name = "vim-enhanced"
version = "8.2"

[[modules]]
name = "nodejs"

[[groups]]
name = "core"

[[containers]]
source = "quay.io/fedora/fedora:latest"
name = "fedora"
tls-verify = true

[customizations]
hostname = "edge"
installation_device = "/dev/vda"

[customizations.kernel]
append = "nosmt"

[customizations.timezone]
timezone = "Europe/Berlin"
ntpservers = ["0.pool.ntp.org"]

[customizations.services]
enabled = ["sshd"]

[[customizations.filesystem]]
mountpoint = "/var"
minsize = 2147483648

[customizations.fdo]
manufacturing_server_url = "http://fdo.example.com:8080"
diun_pub_key_insecure = "true"
"#;
        let bp = parse_blueprint_str(input).expect("should parse");
        assert_eq!(bp.name, "edge-device");
        assert_eq!(bp.containers[0].tls_verify, Some(true));
        assert_eq!(bp.customizations.kernel_name(), "kernel");
        assert_eq!(bp.customizations.kernel_append(), "nosmt");
        assert_eq!(bp.customizations.timezone(), Some("Europe/Berlin"));
        assert_eq!(bp.customizations.filesystem[0].minsize, 2 << 30);
        assert_eq!(bp.customizations.installation_device(), "/dev/vda");
    }

    #[test]
    fn package_expansion_honours_versions_and_groups() {
        let bp = parse_blueprint_str(
            r#"
[[packages]]
name = "tmux"
version = "*"
[[packages]]
name = "vim"
version = "8.2"
[[groups]]
name = "core"
"#,
        )
        .unwrap();
        assert_eq!(bp.packages_ex(false), vec!["tmux", "vim-8.2", "@core"]);
        assert_eq!(bp.packages(), vec!["tmux", "vim-8.2", "@core", "kernel"]);
    }

    #[test]
    fn custom_kernel_name_is_used() {
        let bp = parse_blueprint_str(
            r#"
[customizations.kernel]
name = "kernel-rt"
"#,
        )
        .unwrap();
        assert_eq!(bp.customizations.kernel_name(), "kernel-rt");
    }

    #[test]
    fn rejects_unknown_fields() {
        let input = r#"
[customizations]
flavour = "spicy"
"#;
        assert!(parse_blueprint_str(input).is_err());
    }

    #[test]
    fn rejects_empty_package_name() {
        let input = r#"
[[packages]]
name = "  "
"#;
        assert!(matches!(
            parse_blueprint_str(input),
            Err(InputError::EmptyPackageName)
        ));
    }

    #[test]
    fn empty_blueprint_parses() {
        let bp = parse_blueprint_str("").unwrap();
        assert_eq!(bp, Blueprint::default());
        assert!(bp.customizations.set_sections().is_empty());
    }

    #[test]
    fn check_allowed_reports_denied_sections() {
        let bp = parse_blueprint_str(
            r#"
[customizations]
hostname = "h"
installation_device = "/dev/sda"
"#,
        )
        .unwrap();
        assert!(bp
            .customizations
            .check_allowed(&["hostname", "installation_device"])
            .is_ok());
        let denied = bp
            .customizations
            .check_allowed(&["installation_device", "fdo"])
            .unwrap_err();
        assert_eq!(denied, vec!["hostname"]);
    }
}
