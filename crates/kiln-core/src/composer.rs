use crate::depsolve::{run_depsolve_job, Depsolver};
use crate::CoreError;
use kiln_distro::{compile, default_registry, DistroError, ImageTypeRef, Registry};
use kiln_schema::{
    compute_manifest_id, Blueprint, BuildRequest, ContainerSpec, DepsolveJob, ImageOptions,
    Manifest, ManifestIdentity, PackageSpec, RepoConfig,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::thread;
use tracing::{debug, info};

/// Everything needed to compile one image.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComposeRequest {
    pub distro: String,
    pub arch: String,
    /// Canonical image type name or one of its aliases.
    pub image_type: String,
    #[serde(default)]
    pub blueprint: Blueprint,
    #[serde(default)]
    pub options: ImageOptions,
    #[serde(default)]
    pub repos: Vec<RepoConfig>,
    /// Seed for the generated partition and filesystem UUIDs.
    #[serde(default)]
    pub seed: u64,
}

impl ComposeRequest {
    pub fn new(distro: &str, arch: &str, image_type: &str) -> Self {
        Self {
            distro: distro.to_owned(),
            arch: arch.to_owned(),
            image_type: image_type.to_owned(),
            ..Self::default()
        }
    }

    fn containers(&self) -> Vec<ContainerSpec> {
        self.blueprint
            .containers
            .iter()
            .map(ContainerSpec::from)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComposeResult {
    pub manifest: Manifest,
    pub identity: ManifestIdentity,
    pub build_request: BuildRequest,
}

/// Compiles requests against a shared, read-only registry.
///
/// A `Composer` is cheap to clone; clones share the same registry.
#[derive(Debug, Clone)]
pub struct Composer {
    registry: Arc<Registry>,
}

impl Composer {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    /// Composer over the built-in distribution catalog.
    pub fn with_default_catalog() -> Result<Self, CoreError> {
        Ok(Self::new(default_registry()?))
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn resolve(&self, request: &ComposeRequest) -> Result<ImageTypeRef<'_>, CoreError> {
        Ok(self
            .registry
            .resolve(&request.distro, &request.arch, &request.image_type)?)
    }

    /// The depsolve job for `request`, with repositories attached to each
    /// package set.
    pub fn depsolve_job(&self, request: &ComposeRequest) -> Result<DepsolveJob, CoreError> {
        let it = self.resolve(request)?;
        Ok(DepsolveJob {
            package_sets: it.resolve_package_sets(
                &request.blueprint,
                &request.options,
                &request.repos,
            ),
            repos: Vec::new(),
            module_platform_id: it.distro.module_platform_id.clone(),
            arch: it.arch.name.clone(),
            releasever: it.distro.releasever.clone(),
        })
    }

    /// Compile `request` from already resolved package specs.
    pub fn compile(
        &self,
        request: &ComposeRequest,
        package_specs: &BTreeMap<String, Vec<PackageSpec>>,
    ) -> Result<ComposeResult, CoreError> {
        let it = self.resolve(request)?;
        let manifest = compile(
            it,
            &request.blueprint,
            &request.options,
            &request.repos,
            package_specs,
            &request.containers(),
            request.seed,
        )?;

        let identity = compute_manifest_id(&manifest)?;
        info!(
            "manifest for {}/{}/{}: {}",
            it.distro.name,
            it.arch.name,
            it.name(),
            identity.short_id
        );
        let build_request = BuildRequest {
            distro: it.distro.name.clone(),
            arch: it.arch.name.clone(),
            image_type: it.name().to_owned(),
            blueprint: request.blueprint.name.clone(),
            manifest_checksum: identity.manifest_id.clone(),
        };
        Ok(ComposeResult {
            manifest,
            identity,
            build_request,
        })
    }

    /// Resolve, depsolve and compile one request.
    ///
    /// The request is validated before the solver is invoked.
    pub fn compose(
        &self,
        request: &ComposeRequest,
        solver: &dyn Depsolver,
    ) -> Result<ComposeResult, CoreError> {
        let it = self.resolve(request)?;
        it.validate(
            &request.blueprint.customizations,
            &request.options,
            &request.containers(),
        )
        .map_err(DistroError::from)?;

        let job = self.depsolve_job(request)?;
        let package_specs = run_depsolve_job(solver, &job).into_package_specs(&job)?;
        self.compile(request, &package_specs)
    }

    /// Compose independent requests in parallel on at most
    /// `available_parallelism` workers at a time.
    ///
    /// Results are returned in request order.
    pub fn compose_many(
        &self,
        requests: &[ComposeRequest],
        solver: &dyn Depsolver,
    ) -> Vec<Result<ComposeResult, CoreError>> {
        let workers = thread::available_parallelism().map_or(1, NonZeroUsize::get);
        self.compose_batched(requests, solver, workers)
    }

    fn compose_batched(
        &self,
        requests: &[ComposeRequest],
        solver: &dyn Depsolver,
        workers: usize,
    ) -> Vec<Result<ComposeResult, CoreError>> {
        debug!(
            "composing {} requests on up to {workers} workers",
            requests.len()
        );
        let mut results = Vec::with_capacity(requests.len());
        for batch in requests.chunks(workers.max(1)) {
            thread::scope(|s| {
                let handles: Vec<_> = batch
                    .iter()
                    .map(|request| s.spawn(move || self.compose(request, solver)))
                    .collect();
                results.extend(
                    handles
                        .into_iter()
                        .map(|h| h.join().unwrap_or(Err(CoreError::WorkerPanicked))),
                );
            });
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockDepsolver;

    fn composer() -> Composer {
        Composer::with_default_catalog().unwrap()
    }

    #[test]
    fn depsolve_job_carries_platform() {
        let c = composer();
        let job = c
            .depsolve_job(&ComposeRequest::new("rhel-87", "aarch64", "qcow2"))
            .unwrap();
        assert_eq!(job.arch, "aarch64");
        assert_eq!(job.module_platform_id, "platform:el8");
        assert!(job.package_sets.contains_key("build"));
        assert!(job.package_sets.contains_key("os"));
    }

    #[test]
    fn alias_resolves_to_canonical_name() {
        let c = composer();
        let mut request = ComposeRequest::new("rhel-87", "x86_64", "rhel-edge-commit");
        request.blueprint.name = "edge".to_owned();
        let result = c.compose(&request, &MockDepsolver::new()).unwrap();
        assert_eq!(result.build_request.image_type, "edge-commit");
        assert_eq!(result.build_request.blueprint, "edge");
        assert_eq!(result.build_request.manifest_checksum, result.identity.manifest_id);
    }

    #[test]
    fn unknown_distro_is_not_found() {
        let err = composer()
            .compose(&ComposeRequest::new("nope-1", "x86_64", "qcow2"), &MockDepsolver::new())
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn batches_preserve_request_order() {
        let c = composer();
        let types = ["qcow2", "tar", "vhd", "edge-installer", "ami"];
        let requests: Vec<_> = (0..13)
            .map(|i| ComposeRequest::new("rhel-87", "x86_64", types[i % types.len()]))
            .collect();
        let solver = MockDepsolver::new();
        let batched = c.compose_batched(&requests, &solver, 3);
        assert_eq!(batched.len(), requests.len());
        for (request, result) in requests.iter().zip(&batched) {
            match result {
                Ok(r) => assert_eq!(r.build_request.image_type, request.image_type),
                Err(e) => {
                    assert_eq!(request.image_type, "edge-installer");
                    assert!(e.is_request_error());
                }
            }
        }

        let one_at_a_time = c.compose_batched(&requests, &solver, 1);
        let ids = |results: &[Result<ComposeResult, CoreError>]| {
            results
                .iter()
                .map(|r| r.as_ref().ok().map(|r| r.identity.manifest_id.clone()))
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(&batched), ids(&one_at_a_time));
    }

    #[test]
    fn compose_many_handles_more_requests_than_workers() {
        let workers = thread::available_parallelism().map_or(1, NonZeroUsize::get);
        let requests = vec![ComposeRequest::new("centos-8", "aarch64", "tar"); 2 * workers + 1];
        let results = composer().compose_many(&requests, &MockDepsolver::new());
        assert_eq!(results.len(), requests.len());
        assert!(results.iter().all(Result::is_ok));
    }

    #[test]
    fn invalid_request_never_reaches_solver() {
        let solver = MockDepsolver::new();
        let err = composer()
            .compose(&ComposeRequest::new("rhel-87", "x86_64", "edge-installer"), &solver)
            .unwrap_err();
        assert!(err.is_request_error());
        assert_eq!(solver.solved_chains(), 0);
    }
}
