//! SCOS: OSTree-only distributions built on Rocky Linux and openEuler.

use super::{packages, SCOS_OSCAP_PROFILES};
use crate::config::ImageConfig;
use crate::image_type::{ImageKind, ImageType, BUILD_PKGS_KEY, CONTAINER_PKGS_KEY, OS_PKGS_KEY};
use crate::platform::Platform;
use crate::registry::{Architecture, CatalogError, Distribution};

const SCOS_SERVICES: &[&str] = &["sshd.service", "containerd.service", "docker.service"];

fn image_types(alias_prefix: &str) -> Vec<ImageType> {
    let commit = ImageType::new(
        "ostree-commit",
        "commit.tar",
        "application/x-tar",
        ImageKind::OstreeCommit,
    )
    .aliases(&[format!("{alias_prefix}-commit").as_str()])
    .package_set(BUILD_PKGS_KEY, packages::scos_build)
    .package_set(OS_PKGS_KEY, packages::scos_commit)
    .image_config(ImageConfig::with_services(SCOS_SERVICES))
    .rpm_ostree()
    .payload_pipelines(&["os", "ostree-commit", "commit-archive"])
    .exports(&["commit-archive"]);

    let container = ImageType::new(
        "ostree-container",
        "container.tar",
        "application/x-tar",
        ImageKind::OstreeContainer,
    )
    .aliases(&[format!("{alias_prefix}-container").as_str()])
    .package_set(BUILD_PKGS_KEY, packages::scos_build)
    .package_set(OS_PKGS_KEY, packages::scos_commit)
    .package_set(CONTAINER_PKGS_KEY, packages::empty)
    .image_config(ImageConfig::with_services(SCOS_SERVICES))
    .rpm_ostree()
    .payload_pipelines(&["os", "ostree-commit", "container-tree", "container"])
    .exports(&["container"]);

    vec![commit, container]
}

fn scos(
    base: &str,
    label: &str,
    platform_id: &str,
    version: u32,
) -> Result<Distribution, CatalogError> {
    let version_str = version.to_string();
    let mut d = Distribution::new(&format!("scos-{base}-{version}"), "SCOS", &version_str);
    d.module_platform_id = format!("platform:{platform_id}{version}");
    d.ostree_ref_tmpl = format!("scos/{base}{version}/{{arch}}/os");
    d.ostree_osname = "scos".to_owned();
    d.isolabel_tmpl = format!("SCOS-{label}{version}-BaseOS-{{arch}}");
    d.runner = "org.osbuild.centos8".to_owned();
    d.default_image_config = ImageConfig {
        timezone: Some("UTC".to_owned()),
        locale: Some("en_US".to_owned()),
        ..ImageConfig::default()
    };
    d.oscap_profiles = SCOS_OSCAP_PROFILES.iter().map(|p| (*p).to_owned()).collect();

    let types = image_types(&format!("scos-{base}"));
    let mut x86_64 = Architecture::new(&d.name, "x86_64", Platform::x86("smartx"));
    x86_64.add_image_types(&types)?;
    let mut aarch64 = Architecture::new(&d.name, "aarch64", Platform::aarch64("smartx"));
    aarch64.add_image_types(&types)?;
    d.add_arch(x86_64)?;
    d.add_arch(aarch64)?;
    Ok(d)
}

pub fn rocky8() -> Result<Distribution, CatalogError> {
    scos("rocky", "Rocky", "el", 8)
}

pub fn oe1() -> Result<Distribution, CatalogError> {
    scos("oe", "OpenEuler", "oe", 1)
}
