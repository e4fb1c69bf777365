//! Image type descriptors and their binding to an architecture.

use crate::config::ImageConfig;
use crate::platform::BootType;
use crate::registry::{Architecture, Distribution};
use crate::DistroError;
use kiln_disk::{align_up, new_partition_table, PartitionTable, MEBIBYTE};
use kiln_schema::{FilesystemCustomization, ImageOptions, PackageSet};
use rand::Rng;
use std::collections::BTreeMap;
use tracing::debug;

pub const BUILD_PKGS_KEY: &str = "build";
pub const OS_PKGS_KEY: &str = "os";
pub const CONTAINER_PKGS_KEY: &str = "container";
pub const INSTALLER_PKGS_KEY: &str = "installer";
pub const BLUEPRINT_PKGS_KEY: &str = "blueprint";

/// Constructor of a named base package set.
pub type PackageSetFn = fn(&ImageTypeRef<'_>) -> PackageSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskFormat {
    Raw,
    Qcow2,
    /// VHD, sized in whole MiB.
    Vpc,
}

impl DiskFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            DiskFormat::Raw => "raw",
            DiskFormat::Qcow2 => "qcow2",
            DiskFormat::Vpc => "vpc",
        }
    }
}

/// Image family; selects the pipeline construction and the family-specific
/// validation rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Disk(DiskFormat),
    Archive,
    OstreeCommit,
    OstreeContainer,
    OstreeInstaller,
    OstreeSimplifiedInstaller,
    OstreeRawImage,
}

impl ImageKind {
    /// The two OSTree artifacts that a commit is built into directly.
    pub fn is_ostree_artifact(self) -> bool {
        matches!(self, ImageKind::OstreeCommit | ImageKind::OstreeContainer)
    }
}

#[derive(Debug, Clone)]
pub struct ImageType {
    pub name: String,
    pub aliases: Vec<String>,
    pub filename: String,
    pub mime_type: String,
    pub kind: ImageKind,
    pub rpm_ostree: bool,
    pub bootable: bool,
    pub boot_iso: bool,
    /// Overrides the architecture's boot type when set.
    pub boot_type: Option<BootType>,
    pub package_sets: BTreeMap<String, PackageSetFn>,
    /// Chain name to the ordered set names solved as its layers.
    pub package_set_chains: BTreeMap<String, Vec<String>>,
    pub default_image_config: Option<ImageConfig>,
    pub kernel_options: String,
    pub default_size: u64,
    pub build_pipelines: Vec<String>,
    pub payload_pipelines: Vec<String>,
    pub exports: Vec<String>,
    /// Base layout per architecture name.
    pub base_partition_tables: BTreeMap<String, PartitionTable>,
}

impl ImageType {
    pub fn new(name: &str, filename: &str, mime_type: &str, kind: ImageKind) -> Self {
        let mut chains = BTreeMap::new();
        chains.insert(
            OS_PKGS_KEY.to_owned(),
            vec![OS_PKGS_KEY.to_owned(), BLUEPRINT_PKGS_KEY.to_owned()],
        );
        Self {
            name: name.to_owned(),
            aliases: Vec::new(),
            filename: filename.to_owned(),
            mime_type: mime_type.to_owned(),
            kind,
            rpm_ostree: false,
            bootable: false,
            boot_iso: false,
            boot_type: None,
            package_sets: BTreeMap::new(),
            package_set_chains: chains,
            default_image_config: None,
            kernel_options: String::new(),
            default_size: 0,
            build_pipelines: vec!["build".to_owned()],
            payload_pipelines: Vec::new(),
            exports: Vec::new(),
            base_partition_tables: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| (*a).to_owned()).collect();
        self
    }

    #[must_use]
    pub fn package_set(mut self, name: &str, f: PackageSetFn) -> Self {
        self.package_sets.insert(name.to_owned(), f);
        self
    }

    #[must_use]
    pub fn chain(mut self, name: &str, sets: &[&str]) -> Self {
        self.package_set_chains
            .insert(name.to_owned(), sets.iter().map(|s| (*s).to_owned()).collect());
        self
    }

    #[must_use]
    pub fn image_config(mut self, config: ImageConfig) -> Self {
        self.default_image_config = Some(config);
        self
    }

    #[must_use]
    pub fn kernel_options(mut self, options: &str) -> Self {
        self.kernel_options = options.to_owned();
        self
    }

    #[must_use]
    pub fn default_size(mut self, size: u64) -> Self {
        self.default_size = size;
        self
    }

    #[must_use]
    pub fn rpm_ostree(mut self) -> Self {
        self.rpm_ostree = true;
        self
    }

    #[must_use]
    pub fn bootable(mut self) -> Self {
        self.bootable = true;
        self
    }

    #[must_use]
    pub fn boot_iso(mut self) -> Self {
        self.boot_iso = true;
        self
    }

    #[must_use]
    pub fn boot_type(mut self, boot_type: BootType) -> Self {
        self.boot_type = Some(boot_type);
        self
    }

    #[must_use]
    pub fn payload_pipelines(mut self, names: &[&str]) -> Self {
        self.payload_pipelines = names.iter().map(|n| (*n).to_owned()).collect();
        self
    }

    #[must_use]
    pub fn exports(mut self, names: &[&str]) -> Self {
        self.exports = names.iter().map(|n| (*n).to_owned()).collect();
        self
    }

    #[must_use]
    pub fn partition_tables(mut self, tables: BTreeMap<String, PartitionTable>) -> Self {
        self.base_partition_tables = tables;
        self
    }
}

/// An image type as resolved through the registry, together with the
/// architecture and distribution it belongs to.
#[derive(Debug, Clone, Copy)]
pub struct ImageTypeRef<'a> {
    pub distro: &'a Distribution,
    pub arch: &'a Architecture,
    pub image_type: &'a ImageType,
}

impl<'a> ImageTypeRef<'a> {
    pub fn name(&self) -> &'a str {
        &self.image_type.name
    }

    pub fn filename(&self) -> &'a str {
        &self.image_type.filename
    }

    pub fn mime_type(&self) -> &'a str {
        &self.image_type.mime_type
    }

    pub fn kind(&self) -> ImageKind {
        self.image_type.kind
    }

    /// Ref of the commit this image type produces, for OSTree types only.
    pub fn ostree_ref(&self) -> String {
        if self.image_type.rpm_ostree {
            self.distro.ostree_ref_tmpl.replace("{arch}", &self.arch.name)
        } else {
            String::new()
        }
    }

    /// Effective image size: VHD images are rounded up to a whole MiB and a
    /// zero size selects the image type's default.
    pub fn size(&self, requested: u64) -> Result<u64, DistroError> {
        let mut size = requested;
        if self.image_type.kind == ImageKind::Disk(DiskFormat::Vpc) {
            size = align_up(size, MEBIBYTE)?;
        }
        if size == 0 {
            size = self.image_type.default_size;
        }
        Ok(size)
    }

    pub fn boot_type(&self) -> BootType {
        self.image_type
            .boot_type
            .unwrap_or_else(|| self.arch.platform.boot_type())
    }

    pub fn supports_uefi(&self) -> bool {
        self.boot_type().supports_uefi()
    }

    pub fn build_pipelines(&self) -> &'a [String] {
        &self.image_type.build_pipelines
    }

    pub fn payload_pipelines(&self) -> &'a [String] {
        &self.image_type.payload_pipelines
    }

    pub fn payload_package_sets(&self) -> Vec<String> {
        vec![BLUEPRINT_PKGS_KEY.to_owned()]
    }

    pub fn package_set_chains(&self) -> &'a BTreeMap<String, Vec<String>> {
        &self.image_type.package_set_chains
    }

    pub fn exports(&self) -> Vec<String> {
        if self.image_type.exports.is_empty() {
            vec!["assembler".to_owned()]
        } else {
            self.image_type.exports.clone()
        }
    }

    pub fn base_partition_table(&self) -> Option<&'a PartitionTable> {
        self.image_type.base_partition_tables.get(&self.arch.name)
    }

    /// Type of the architecture's base partition table, or empty.
    pub fn partition_type(&self) -> String {
        self.base_partition_table()
            .map(|pt| pt.pt_type.to_string())
            .unwrap_or_default()
    }

    /// Image configuration with unset fields inherited from the
    /// distribution.
    pub fn default_image_config(&self) -> ImageConfig {
        self.image_type
            .default_image_config
            .clone()
            .unwrap_or_default()
            .inherit_from(&self.distro.default_image_config)
    }

    /// Concrete partition table for this request. Non-OSTree images are
    /// converted to LVM when custom mountpoints need it.
    pub fn partition_table<R: Rng>(
        &self,
        mountpoints: &[FilesystemCustomization],
        options: &ImageOptions,
        rng: &mut R,
    ) -> Result<PartitionTable, DistroError> {
        let base = self
            .base_partition_table()
            .ok_or_else(|| DistroError::UnknownArch(self.arch.name.clone()))?;
        let image_size = self.size(options.size)?;
        let lvmify = !self.image_type.rpm_ostree;
        debug!(
            "deriving partition table for {}/{}: size={image_size} lvmify={lvmify}",
            self.arch.name, self.image_type.name
        );
        Ok(new_partition_table(base, mountpoints, image_size, lvmify, rng)?)
    }
}
