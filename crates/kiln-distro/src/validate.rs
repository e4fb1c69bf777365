//! Compatibility rules between an image type and the customizations and
//! options of one request.

use crate::image_type::{ImageKind, ImageTypeRef};
use kiln_disk::{check_mountpoints, DiskError, MountpointPolicies};
use kiln_schema::{ContainerSpec, Customizations, ImageOptions};
use thiserror::Error;
use tracing::warn;

const SIMPLIFIED_INSTALLER_ALLOWED: &[&str] = &["installation_device", "fdo"];
const INSTALLER_ALLOWED: &[&str] = &["user", "group"];
const OPENSCAP_MIN_VERSION: &str = "8.7";

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("embedding containers is not supported for {image_type} on {distro}")]
    ContainersNotSupported { image_type: String, distro: String },
    #[error("boot ISO image type \"{0}\" requires specifying a URL from which to retrieve the OSTree commit")]
    MissingOstreeCommit(String),
    #[error("unsupported blueprint customizations found for boot ISO image type \"{image_type}\": (allowed: {allowed})")]
    UnsupportedCustomizations { image_type: String, allowed: String },
    #[error("boot ISO image type \"{0}\" requires specifying an installation device to install to")]
    MissingInstallationDevice(String),
    #[error("boot ISO image type \"{0}\" requires specifying FDO.ManufacturingServerURL configuration to install to")]
    MissingFdoManufacturingServer(String),
    #[error("boot ISO image type \"{0}\" requires specifying one of [FDO.DiunPubKeyHash,FDO.DiunPubKeyInsecure,FDO.DiunPubKeyRootCerts] configuration to install to")]
    InvalidFdoDiunKey(String),
    #[error("raw OSTree image type \"{0}\" requires specifying a URL from which to retrieve the OSTree commit")]
    RawImageMissingCommit(String),
    #[error("kernel boot parameter customizations are not supported for ostree types")]
    KernelAppendNotSupported,
    #[error("custom mountpoints are not supported for ostree types")]
    MountpointsNotSupported,
    #[error(transparent)]
    Mountpoints(#[from] DiskError),
    #[error("OpenSCAP unsupported os version: {0}")]
    OpenScapUnsupportedVersion(String),
    #[error("OpenSCAP unsupported profile: {0}")]
    OpenScapUnsupportedProfile(String),
    #[error("OpenSCAP customizations are not supported for ostree types")]
    OpenScapNotSupported,
    #[error("OpenSCAP datastream cannot be empty")]
    OpenScapEmptyDatastream,
    #[error("OpenSCAP profile cannot be empty")]
    OpenScapEmptyProfile,
}

impl ImageTypeRef<'_> {
    /// Check a request against the image type. The first violated rule is
    /// reported.
    pub fn validate(
        &self,
        customizations: &Customizations,
        options: &ImageOptions,
        containers: &[ContainerSpec],
    ) -> Result<(), ValidationError> {
        let result = self.check_options(customizations, options, containers);
        if let Err(e) = &result {
            warn!(
                "rejected request for {}/{}/{}: {e}",
                self.distro.name, self.arch.name, self.image_type.name
            );
        }
        result
    }

    fn check_options(
        &self,
        customizations: &Customizations,
        options: &ImageOptions,
        containers: &[ContainerSpec],
    ) -> Result<(), ValidationError> {
        let it = self.image_type;
        let name = || it.name.clone();

        if !containers.is_empty() && it.rpm_ostree && !it.kind.is_ostree_artifact() {
            return Err(ValidationError::ContainersNotSupported {
                image_type: name(),
                distro: self.distro.name.clone(),
            });
        }

        if it.boot_iso && it.rpm_ostree {
            // The URL is only used to resolve the checksum, so the checksum
            // is what has to be present.
            if options.ostree.fetch_checksum.is_empty() {
                return Err(ValidationError::MissingOstreeCommit(name()));
            }

            match it.kind {
                ImageKind::OstreeSimplifiedInstaller => {
                    check_allowed(customizations, SIMPLIFIED_INSTALLER_ALLOWED, &it.name)?;
                    if customizations.installation_device().is_empty() {
                        return Err(ValidationError::MissingInstallationDevice(name()));
                    }
                    if let Some(fdo) = &customizations.fdo {
                        if fdo.manufacturing_server_url.is_empty() {
                            return Err(ValidationError::MissingFdoManufacturingServer(name()));
                        }
                        let anchors = [
                            &fdo.diun_pub_key_hash,
                            &fdo.diun_pub_key_insecure,
                            &fdo.diun_pub_key_root_certs,
                        ];
                        if anchors.iter().filter(|a| !a.is_empty()).count() != 1 {
                            return Err(ValidationError::InvalidFdoDiunKey(name()));
                        }
                    }
                }
                ImageKind::OstreeInstaller => {
                    check_allowed(customizations, INSTALLER_ALLOWED, &it.name)?;
                }
                _ => {}
            }
        }

        if it.kind == ImageKind::OstreeRawImage && options.ostree.fetch_checksum.is_empty() {
            return Err(ValidationError::RawImageMissingCommit(name()));
        }

        if !customizations.kernel_append().is_empty()
            && it.rpm_ostree
            && (!it.bootable || it.boot_iso)
        {
            return Err(ValidationError::KernelAppendNotSupported);
        }

        let mountpoints = &customizations.filesystem;
        if !mountpoints.is_empty() && it.rpm_ostree {
            return Err(ValidationError::MountpointsNotSupported);
        }
        check_mountpoints(mountpoints, &MountpointPolicies::default_mountpoints())?;

        if let Some(oscap) = &customizations.openscap {
            let distro = self.distro;
            if !distro.is_rhel() || version_less_than(&distro.os_version, OPENSCAP_MIN_VERSION) {
                return Err(ValidationError::OpenScapUnsupportedVersion(
                    distro.os_version.clone(),
                ));
            }
            if !distro.oscap_profiles.iter().any(|p| *p == oscap.profile_id) {
                return Err(ValidationError::OpenScapUnsupportedProfile(
                    oscap.profile_id.clone(),
                ));
            }
            if it.rpm_ostree {
                return Err(ValidationError::OpenScapNotSupported);
            }
            if oscap.datastream.is_empty() {
                return Err(ValidationError::OpenScapEmptyDatastream);
            }
            if oscap.profile_id.is_empty() {
                return Err(ValidationError::OpenScapEmptyProfile);
            }
        }

        Ok(())
    }
}

fn check_allowed(
    customizations: &Customizations,
    allowed: &[&str],
    image_type: &str,
) -> Result<(), ValidationError> {
    customizations
        .check_allowed(allowed)
        .map_err(|_| ValidationError::UnsupportedCustomizations {
            image_type: image_type.to_owned(),
            allowed: allowed.join(", "),
        })
}

/// Numeric comparison of dotted versions; missing components count as 0.
pub fn version_less_than(a: &str, b: &str) -> bool {
    fn parts(v: &str) -> Vec<u64> {
        v.split('.').map(|p| p.parse().unwrap_or(0)).collect()
    }
    let (a, b) = (parts(a), parts(b));
    let len = a.len().max(b.len());
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        if x != y {
            return x < y;
        }
    }
    false
}
