//! Input and wire types for the kiln manifest compiler.
//!
//! This crate defines the schema layer: TOML blueprint parsing (`Blueprint`),
//! per-request `ImageOptions`, package sets and resolved package specs, the
//! depsolve job contract, the manifest wire format with its sources, and
//! deterministic manifest identity (`compute_manifest_id`).

pub mod blueprint;
pub mod container;
pub mod depsolve;
pub mod identity;
pub mod manifest;
pub mod options;
pub mod rpmmd;
pub mod types;

pub use blueprint::{
    parse_blueprint_file, parse_blueprint_str, Blueprint, Customizations, FdoCustomization,
    FilesystemCustomization, InputError, OpenScapCustomization, DEFAULT_KERNEL_NAME,
};
pub use container::ContainerSpec;
pub use depsolve::{parse_depsolve_result_file, DepsolveError, DepsolveJob, DepsolveJobResult};
pub use identity::{compute_manifest_id, pipeline_ids, BuildRequest, ManifestIdentity};
pub use manifest::{
    gen_sources, inline_data_id, CommitSpec, Manifest, Pipeline, Sources, Stage,
    MANIFEST_VERSION,
};
pub use options::{parse_options_file, parse_options_str, ImageOptions, OstreeImageOptions};
pub use rpmmd::{parse_repos_file, PackageSet, PackageSetChain, PackageSpec, RepoConfig};
pub use types::{ManifestId, PipelineId, ShortId};
