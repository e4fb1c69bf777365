//! Compose orchestration for kiln.
//!
//! This crate ties the registry, the depsolver and the manifest compiler
//! together into the `Composer`: resolve the (distro, arch, image type)
//! triple, emit a depsolve job, hand it to a `Depsolver`, and compile the
//! resolved packages into a manifest with its build request. Independent
//! requests can be composed in parallel against one shared registry.

pub mod composer;
pub mod depsolve;

pub use composer::{ComposeRequest, ComposeResult, Composer};
pub use depsolve::{run_depsolve_job, Depsolver, MockDepsolver};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("catalog error: {0}")]
    Catalog(#[from] kiln_distro::CatalogError),
    #[error(transparent)]
    Registry(#[from] kiln_distro::RegistryError),
    #[error(transparent)]
    Distro(#[from] kiln_distro::DistroError),
    #[error(transparent)]
    Depsolve(#[from] kiln_schema::DepsolveError),
    #[error("input error: {0}")]
    Input(#[from] kiln_schema::InputError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("compose worker panicked")]
    WorkerPanicked,
}

impl CoreError {
    /// True for errors caused by the request content rather than the
    /// catalog lookup or the environment.
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            CoreError::Input(_)
                | CoreError::Distro(kiln_distro::DistroError::Validation(_))
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CoreError::Registry(_) | CoreError::Distro(kiln_distro::DistroError::Registry(_))
        )
    }
}
