//! Distribution catalog and manifest compiler for kiln.
//!
//! This crate resolves (distribution, architecture, image type) triples
//! through an immutable `Registry`, merges package sets into the chains sent
//! to the depsolver, validates per-request customizations and options,
//! constructs the pipeline list of each image family, and assembles the
//! final manifest (`compile`).

pub mod assembler;
pub mod catalog;
pub mod config;
pub mod image_type;
pub mod package_sets;
pub mod pipeline;
pub mod platform;
pub mod registry;
pub mod validate;

pub use assembler::compile;
pub use catalog::default_registry;
pub use config::ImageConfig;
pub use image_type::{
    DiskFormat, ImageKind, ImageType, ImageTypeRef, PackageSetFn, BLUEPRINT_PKGS_KEY,
    BUILD_PKGS_KEY, CONTAINER_PKGS_KEY, INSTALLER_PKGS_KEY, OS_PKGS_KEY,
};
pub use package_sets::make_package_set_chains;
pub use platform::{BootType, Platform};
pub use registry::{
    Architecture, CatalogError, Distribution, Registry, RegistryBuilder, RegistryError,
};
pub use validate::ValidationError;

use kiln_disk::DiskError;

/// Errors raised while compiling a single request.
#[derive(Debug, thiserror::Error)]
pub enum DistroError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Disk(#[from] DiskError),
    #[error("unknown arch: {0}")]
    UnknownArch(String),
    #[error("no resolved packages for package set '{set}' of image type {image_type}")]
    MissingPackageSpecs { image_type: String, set: String },
    #[error("kernel package '{kernel}' not found in resolved package set '{set}'")]
    MissingKernel { kernel: String, set: String },
}
