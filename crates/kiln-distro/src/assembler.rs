//! Final manifest assembly.

use crate::image_type::ImageTypeRef;
use crate::pipeline::{image_pipelines, ImageContext};
use crate::DistroError;
use kiln_schema::manifest::RHSM_CONSUMER_SECRETS;
use kiln_schema::{
    gen_sources, Blueprint, CommitSpec, ContainerSpec, ImageOptions, Manifest, PackageSpec,
    RepoConfig,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use tracing::info;

/// Compile one request into a manifest.
///
/// Validation runs first and no pipeline is constructed for a rejected
/// request. `package_specs` is keyed by package set chain name, as returned
/// by the depsolver. Identical inputs produce byte-identical manifests.
pub fn compile(
    image: ImageTypeRef<'_>,
    blueprint: &Blueprint,
    options: &ImageOptions,
    repos: &[RepoConfig],
    package_specs: &BTreeMap<String, Vec<PackageSpec>>,
    containers: &[ContainerSpec],
    seed: u64,
) -> Result<Manifest, DistroError> {
    let customizations = &blueprint.customizations;
    image.validate(customizations, options, containers)?;

    let fdo_root_certs = customizations
        .fdo
        .as_ref()
        .map(|fdo| fdo.diun_pub_key_root_certs.as_str())
        .filter(|certs| !certs.is_empty());

    let mut rng = StdRng::seed_from_u64(seed);
    let mut ctx = ImageContext {
        image,
        customizations,
        options,
        repos,
        package_specs,
        containers,
        fdo_root_certs,
        rng: &mut rng,
    };
    let pipelines = image_pipelines(&mut ctx)?;

    let packages: Vec<PackageSpec> = package_specs.values().flatten().cloned().collect();

    let ostree = &options.ostree;
    let mut commits = Vec::new();
    if ostree.has_commit_source() {
        commits.push(CommitSpec {
            checksum: ostree.fetch_checksum.clone(),
            url: ostree.url.clone(),
            content_url: ostree.content_url.clone(),
            secrets: ostree.rhsm.then(|| RHSM_CONSUMER_SECRETS.to_owned()),
        });
    }

    let inline: Vec<String> = fdo_root_certs.map(str::to_owned).into_iter().collect();

    info!(
        "compiled {}/{}/{}: {} pipelines, {} packages",
        image.distro.name,
        image.arch.name,
        image.name(),
        pipelines.len(),
        packages.len()
    );
    Ok(Manifest::new(
        pipelines,
        gen_sources(&packages, &commits, &inline, containers),
    ))
}
