//! The built-in distribution catalog.

mod packages;
mod partition_tables;
mod rhel8;
mod scos;

use crate::registry::{CatalogError, Registry};

pub(crate) const RHEL_OSCAP_PROFILES: &[&str] = &[
    "xccdf_org.ssgproject.content_profile_anssi_bp28_enhanced",
    "xccdf_org.ssgproject.content_profile_anssi_bp28_high",
    "xccdf_org.ssgproject.content_profile_anssi_bp28_intermediary",
    "xccdf_org.ssgproject.content_profile_anssi_bp28_minimal",
    "xccdf_org.ssgproject.content_profile_cis",
    "xccdf_org.ssgproject.content_profile_cis_server_l1",
    "xccdf_org.ssgproject.content_profile_cis_workstation_l1",
    "xccdf_org.ssgproject.content_profile_cis_workstation_l2",
    "xccdf_org.ssgproject.content_profile_cui",
    "xccdf_org.ssgproject.content_profile_e8",
    "xccdf_org.ssgproject.content_profile_hipaa",
    "xccdf_org.ssgproject.content_profile_ism_o",
    "xccdf_org.ssgproject.content_profile_ospp",
    "xccdf_org.ssgproject.content_profile_pci-dss",
    "xccdf_org.ssgproject.content_profile_stig",
    "xccdf_org.ssgproject.content_profile_stig_gui",
];

pub(crate) const SCOS_OSCAP_PROFILES: &[&str] = &[
    "xccdf_org.ssgproject.content_profile_ospp",
    "xccdf_org.ssgproject.content_profile_pci-dss",
    "xccdf_org.ssgproject.content_profile_standard",
];

/// Build the registry of every supported distribution.
///
/// An `Err` is a defect in the catalog itself; callers should refuse to
/// start rather than serve requests from it.
pub fn default_registry() -> Result<Registry, CatalogError> {
    Registry::builder()
        .add_distro(rhel8::rhel86()?)?
        .add_distro(rhel8::rhel87()?)?
        .add_distro(rhel8::centos8()?)?
        .add_distro(scos::rocky8()?)?
        .add_distro(scos::oe1()?)?
        .build()
}
