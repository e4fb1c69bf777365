use kiln_schema::{DepsolveError, DepsolveJob, DepsolveJobResult, PackageSetChain, PackageSpec};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;
use tracing::{debug, warn};

/// A dependency resolver for package set chains.
///
/// Each chain is solved as successive layers: packages resolved for an
/// earlier layer stay installed while the next layer is solved on top.
pub trait Depsolver: Send + Sync {
    fn name(&self) -> &str;

    /// Resolve one chain of `job` into concrete packages.
    fn solve_chain(
        &self,
        chain: &PackageSetChain,
        job: &DepsolveJob,
    ) -> Result<Vec<PackageSpec>, DepsolveError>;
}

/// Solve every named chain of `job`.
///
/// Never fails: a solver error is recorded in the result's `error` field
/// and the partial specs are dropped, as the job consumer expects.
pub fn run_depsolve_job(solver: &dyn Depsolver, job: &DepsolveJob) -> DepsolveJobResult {
    debug!(
        "dispatching depsolve job to {}: {} chains for {} ({})",
        solver.name(),
        job.package_sets.len(),
        job.arch,
        job.module_platform_id
    );
    let mut package_specs = BTreeMap::new();
    for (name, chain) in &job.package_sets {
        match solver.solve_chain(chain, job) {
            Ok(specs) => {
                debug!("chain '{name}' resolved to {} packages", specs.len());
                package_specs.insert(name.clone(), specs);
            }
            Err(e) => {
                warn!("depsolve of chain '{name}' failed: {e}");
                return DepsolveJobResult::failed(format!("{name}: {e}"));
            }
        }
    }
    DepsolveJobResult {
        package_specs,
        error: String::new(),
    }
}

const MOCK_BASEURL: &str = "https://mock.invalid/repo";

/// Deterministic in-process solver.
///
/// Every include resolves to exactly one package named after it, with a
/// checksum derived from the platform, arch and name. Package groups
/// (`@name`) cannot be expanded and are skipped.
pub struct MockDepsolver {
    unavailable: BTreeSet<String>,
    solved: Mutex<usize>,
}

impl Default for MockDepsolver {
    fn default() -> Self {
        Self {
            unavailable: BTreeSet::new(),
            solved: Mutex::new(0),
        }
    }
}

impl MockDepsolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat `names` as missing from every repository.
    #[must_use]
    pub fn with_unavailable<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unavailable.extend(names.into_iter().map(Into::into));
        self
    }

    /// Number of chains solved so far.
    pub fn solved_chains(&self) -> usize {
        self.solved.lock().map_or(0, |s| *s)
    }

    fn spec(
        name: &str,
        baseurl: &str,
        check_gpg: bool,
        rhsm: bool,
        job: &DepsolveJob,
    ) -> PackageSpec {
        let mut spec = PackageSpec {
            name: name.to_owned(),
            epoch: 0,
            version: "1.0".to_owned(),
            release: format!("1.{}", job.releasever),
            arch: job.arch.clone(),
            remote_location: String::new(),
            checksum: String::new(),
            secrets: rhsm.then(|| "org.osbuild.rhsm".to_owned()),
            check_gpg,
        };
        let nevra = spec.nevra();
        let digest = Sha256::digest(format!("{}:{nevra}", job.module_platform_id).as_bytes());
        spec.remote_location = format!(
            "{}/Packages/{nevra}.rpm",
            baseurl.trim_end_matches('/')
        );
        spec.checksum = format!("sha256:{}", hex::encode(digest));
        spec
    }
}

impl Depsolver for MockDepsolver {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn solve_chain(
        &self,
        chain: &PackageSetChain,
        job: &DepsolveJob,
    ) -> Result<Vec<PackageSpec>, DepsolveError> {
        let mut resolved: BTreeMap<String, PackageSpec> = BTreeMap::new();
        for layer in chain {
            let repo = layer.repositories.iter().chain(&job.repos).next();
            let baseurl = repo
                .and_then(|r| r.baseurl.as_deref())
                .unwrap_or(MOCK_BASEURL);
            let check_gpg = repo.is_some_and(|r| r.check_gpg);
            let rhsm = repo.is_some_and(|r| r.rhsm);

            for name in &layer.include {
                if name.starts_with('@') || layer.exclude.contains(name) {
                    continue;
                }
                if self.unavailable.contains(name) {
                    return Err(DepsolveError::Failed(format!("no package matches '{name}'")));
                }
                resolved
                    .entry(name.clone())
                    .or_insert_with(|| Self::spec(name, baseurl, check_gpg, rhsm, job));
            }
        }

        if let Ok(mut solved) = self.solved.lock() {
            *solved += 1;
        }
        Ok(resolved.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_schema::{PackageSet, RepoConfig};

    fn job(chains: &[(&str, PackageSetChain)]) -> DepsolveJob {
        DepsolveJob {
            package_sets: chains
                .iter()
                .map(|(n, c)| ((*n).to_owned(), c.clone()))
                .collect(),
            repos: Vec::new(),
            module_platform_id: "platform:el8".to_owned(),
            arch: "x86_64".to_owned(),
            releasever: "8".to_owned(),
        }
    }

    #[test]
    fn mock_is_deterministic_and_sorted() {
        let mut set = PackageSet::with_include(["vim", "bash", "@core", "bash"]);
        set.repositories.push(RepoConfig::new("baseos", "https://repo.example.com/"));
        let job = job(&[("os", vec![set])]);

        let solver = MockDepsolver::new();
        let a = solver.solve_chain(&job.package_sets["os"], &job).unwrap();
        let b = solver.solve_chain(&job.package_sets["os"], &job).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            a.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
            vec!["bash", "vim"]
        );
        assert_eq!(
            a[0].remote_location,
            "https://repo.example.com/Packages/bash-1.0-1.8.x86_64.rpm"
        );
        assert!(a[0].checksum.starts_with("sha256:"));
        assert_eq!(a[0].checksum.len(), "sha256:".len() + 64);
        assert_eq!(solver.solved_chains(), 2);
    }

    #[test]
    fn excludes_apply_to_their_layer() {
        let mut base = PackageSet::with_include(["bash", "dracut"]);
        base.exclude.push("dracut".to_owned());
        let chain = vec![base, PackageSet::with_include(["dracut"])];
        let job = job(&[("os", chain)]);
        let specs = MockDepsolver::new()
            .solve_chain(&job.package_sets["os"], &job)
            .unwrap();
        assert_eq!(specs.len(), 2);
    }

    #[test]
    fn job_result_covers_every_chain() {
        let job = job(&[
            ("build", vec![PackageSet::with_include(["rpm"])]),
            ("os", vec![PackageSet::with_include(["kernel"])]),
        ]);
        let result = run_depsolve_job(&MockDepsolver::new(), &job);
        assert!(result.error.is_empty());
        let specs = result.into_package_specs(&job).unwrap();
        assert_eq!(specs.keys().collect::<Vec<_>>(), vec!["build", "os"]);
    }

    #[test]
    fn solver_failure_is_captured() {
        let job = job(&[("os", vec![PackageSet::with_include(["nope"])])]);
        let solver = MockDepsolver::new().with_unavailable(["nope"]);
        let result = run_depsolve_job(&solver, &job);
        assert!(result.package_specs.is_empty());
        assert!(result.error.contains("nope"));
        assert!(matches!(
            result.into_package_specs(&job),
            Err(DepsolveError::Failed(_))
        ));
    }
}
