//! Pipeline construction per image family.
//!
//! Every family produces `build` followed by the image type's payload
//! pipelines, in declaration order. Stage options are emitted as JSON
//! values in the build engine's schema.

mod disk;
mod installer;
mod os;
mod ostree;

use crate::image_type::{DiskFormat, ImageKind, ImageTypeRef};
use crate::DistroError;
use kiln_schema::{ContainerSpec, Customizations, ImageOptions, PackageSpec, Pipeline, RepoConfig, Stage};
use rand::rngs::StdRng;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::debug;

pub(crate) const BUILD_PIPELINE: &str = "build";
const SECTOR_SIZE: u64 = 512;

/// Everything a pipeline constructor may read, plus the request's random
/// source.
pub struct ImageContext<'a> {
    pub image: ImageTypeRef<'a>,
    pub customizations: &'a Customizations,
    pub options: &'a ImageOptions,
    pub repos: &'a [RepoConfig],
    /// Resolved packages keyed by package set chain name.
    pub package_specs: &'a BTreeMap<String, Vec<PackageSpec>>,
    pub containers: &'a [ContainerSpec],
    /// Inline blob referenced by the FDO stage, if any.
    pub fdo_root_certs: Option<&'a str>,
    pub rng: &'a mut StdRng,
}

impl ImageContext<'_> {
    fn specs(&self, set: &str) -> Result<&[PackageSpec], DistroError> {
        self.package_specs
            .get(set)
            .map(Vec::as_slice)
            .ok_or_else(|| DistroError::MissingPackageSpecs {
                image_type: self.image.name().to_owned(),
                set: set.to_owned(),
            })
    }

    /// `version-release.arch` of the requested kernel in a resolved set.
    fn kernel_version(&self, set: &str) -> Result<String, DistroError> {
        let kernel = self.customizations.kernel_name();
        self.specs(set)?
            .iter()
            .find(|p| p.name == kernel)
            .map(|p| format!("{}-{}.{}", p.version, p.release, p.arch))
            .ok_or_else(|| DistroError::MissingKernel {
                kernel: kernel.to_owned(),
                set: set.to_owned(),
            })
    }

    /// Kernel command line of the image type plus the blueprint's append.
    fn kernel_options(&self) -> String {
        let base = &self.image.image_type.kernel_options;
        let append = self.customizations.kernel_append();
        match (base.is_empty(), append.is_empty()) {
            (_, true) => base.clone(),
            (true, false) => append.to_owned(),
            (false, false) => format!("{base} {append}"),
        }
    }

    fn ostree_ref(&self) -> String {
        if self.options.ostree.image_ref.is_empty() {
            self.image.ostree_ref()
        } else {
            self.options.ostree.image_ref.clone()
        }
    }

    fn isolabel(&self) -> String {
        self.image
            .distro
            .isolabel_tmpl
            .replace("{arch}", &self.image.arch.name)
    }
}

/// Construct the ordered pipeline list for one request.
pub fn image_pipelines(ctx: &mut ImageContext<'_>) -> Result<Vec<Pipeline>, DistroError> {
    let mut pipelines = vec![os::build_pipeline(ctx)?];
    let kind = ctx.image.kind();
    match kind {
        ImageKind::Disk(format) => {
            let pt = ctx.image.partition_table(
                &ctx.customizations.filesystem,
                ctx.options,
                &mut *ctx.rng,
            )?;
            pipelines.push(os::os_pipeline(ctx, Some(&pt))?);
            let raw_name = if format == DiskFormat::Raw {
                ctx.image.filename()
            } else {
                disk::DISK_IMAGE_FILENAME
            };
            pipelines.push(disk::image_pipeline("os", &pt, raw_name, ctx.image));
            if format != DiskFormat::Raw {
                pipelines.push(disk::qemu_pipeline(format, raw_name, ctx.image.filename()));
            }
        }
        ImageKind::Archive => {
            pipelines.push(os::os_pipeline(ctx, None)?);
            pipelines.push(disk::tar_pipeline("archive", "os", ctx.image.filename()));
        }
        ImageKind::OstreeCommit => {
            pipelines.push(os::os_pipeline(ctx, None)?);
            pipelines.push(ostree::commit_pipeline(ctx));
            pipelines.push(disk::tar_pipeline(
                "commit-archive",
                "ostree-commit",
                ctx.image.filename(),
            ));
        }
        ImageKind::OstreeContainer => {
            pipelines.push(os::os_pipeline(ctx, None)?);
            pipelines.push(ostree::commit_pipeline(ctx));
            pipelines.push(ostree::container_tree_pipeline(ctx)?);
            pipelines.push(ostree::container_pipeline(ctx));
        }
        ImageKind::OstreeInstaller => {
            let kernel_version = ctx.kernel_version(crate::INSTALLER_PKGS_KEY)?;
            pipelines.push(installer::anaconda_tree_pipeline(ctx, &kernel_version)?);
            pipelines.push(installer::bootiso_tree_pipeline(ctx, &kernel_version));
            pipelines.push(installer::bootiso_pipeline(ctx));
        }
        ImageKind::OstreeRawImage => {
            let pt = ctx.image.partition_table(&[], ctx.options, &mut *ctx.rng)?;
            pipelines.push(ostree::deployment_pipeline(ctx, &pt));
            pipelines.push(disk::image_pipeline(
                "ostree-deployment",
                &pt,
                disk::RAW_IMAGE_FILENAME,
                ctx.image,
            ));
            pipelines.push(disk::xz_pipeline(disk::RAW_IMAGE_FILENAME, ctx.image.filename()));
        }
        ImageKind::OstreeSimplifiedInstaller => {
            let pt = ctx.image.partition_table(&[], ctx.options, &mut *ctx.rng)?;
            let kernel_version = ctx.kernel_version(crate::INSTALLER_PKGS_KEY)?;
            pipelines.push(ostree::deployment_pipeline(ctx, &pt));
            pipelines.push(disk::image_pipeline(
                "ostree-deployment",
                &pt,
                disk::RAW_IMAGE_FILENAME,
                ctx.image,
            ));
            pipelines.push(disk::xz_pipeline(
                disk::RAW_IMAGE_FILENAME,
                disk::COMPRESSED_IMAGE_FILENAME,
            ));
            pipelines.push(installer::coi_tree_pipeline(ctx, &kernel_version)?);
            pipelines.push(installer::efiboot_tree_pipeline(ctx));
            pipelines.push(installer::simplified_bootiso_tree_pipeline(ctx, &kernel_version));
            pipelines.push(installer::bootiso_pipeline(ctx));
        }
    }
    debug!(
        "constructed {} pipelines for {}: {:?}",
        pipelines.len(),
        ctx.image.name(),
        pipelines.iter().map(|p| p.name.as_str()).collect::<Vec<_>>()
    );
    Ok(pipelines)
}

/// Install resolved packages from the sources section.
fn rpm_stage(specs: &[PackageSpec], repos: &[RepoConfig], ostree_booted: bool) -> Stage {
    let mut gpgkeys: Vec<&str> = repos
        .iter()
        .filter(|r| r.check_gpg)
        .filter_map(|r| r.gpg_key.as_deref())
        .collect();
    gpgkeys.sort_unstable();
    gpgkeys.dedup();

    let mut options = json!({"gpgkeys": gpgkeys});
    if ostree_booted {
        options["ostree_booted"] = json!(true);
        options["dbpath"] = json!("/usr/share/rpm");
    }
    let references: Vec<Value> = specs
        .iter()
        .map(|p| json!({"id": p.checksum, "options": {"metadata": {"rpm.check_gpg": p.check_gpg}}}))
        .collect();
    Stage::new("org.osbuild.rpm", options).with_inputs(json!({
        "packages": {
            "type": "org.osbuild.files",
            "origin": "org.osbuild.source",
            "references": references,
        }
    }))
}

fn selinux_stage() -> Stage {
    Stage::new(
        "org.osbuild.selinux",
        json!({"file_contexts": "etc/selinux/targeted/contexts/files/file_contexts"}),
    )
}

/// Input referencing the tree of another pipeline.
fn tree_input(pipeline: &str) -> Value {
    json!({
        "type": "org.osbuild.tree",
        "origin": "org.osbuild.pipeline",
        "references": [format!("name:{pipeline}")],
    })
}

/// Input referencing one file produced by another pipeline.
fn file_input(pipeline: &str, file: &str) -> Value {
    json!({
        "type": "org.osbuild.files",
        "origin": "org.osbuild.pipeline",
        "references": {format!("name:{pipeline}"): {"file": file}},
    })
}

fn oci_arch(arch: &str) -> &str {
    match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        other => other,
    }
}

fn sectors(bytes: u64) -> u64 {
    bytes / SECTOR_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::default_registry;
    use rand::SeedableRng;

    fn spec(name: &str) -> PackageSpec {
        PackageSpec {
            name: name.to_owned(),
            version: "4.18.0".to_owned(),
            release: "425.el8".to_owned(),
            arch: "x86_64".to_owned(),
            checksum: format!("sha256:{name}"),
            ..PackageSpec::default()
        }
    }

    #[test]
    fn kernel_options_join_image_type_and_blueprint() {
        let reg = default_registry().unwrap();
        let image = reg.resolve("rhel-87", "x86_64", "edge-raw-image").unwrap();
        let mut customizations = Customizations::default();
        customizations.kernel = Some(kiln_schema::blueprint::KernelCustomization {
            name: String::new(),
            append: "quiet".to_owned(),
        });
        let specs = BTreeMap::new();
        let mut rng = StdRng::seed_from_u64(0);
        let ctx = ImageContext {
            image,
            customizations: &customizations,
            options: &ImageOptions::default(),
            repos: &[],
            package_specs: &specs,
            containers: &[],
            fdo_root_certs: None,
            rng: &mut rng,
        };
        assert_eq!(ctx.kernel_options(), "modprobe.blacklist=vc4 quiet");
        assert_eq!(ctx.ostree_ref(), "rhel/8/x86_64/edge");
        assert_eq!(ctx.isolabel(), "RHEL-8-7-0-BaseOS-x86_64");
    }

    #[test]
    fn kernel_version_comes_from_resolved_set() {
        let reg = default_registry().unwrap();
        let image = reg.resolve("rhel-87", "x86_64", "edge-installer").unwrap();
        let customizations = Customizations::default();
        let mut specs = BTreeMap::new();
        specs.insert("installer".to_owned(), vec![spec("bash"), spec("kernel")]);
        let mut rng = StdRng::seed_from_u64(0);
        let ctx = ImageContext {
            image,
            customizations: &customizations,
            options: &ImageOptions::default(),
            repos: &[],
            package_specs: &specs,
            containers: &[],
            fdo_root_certs: None,
            rng: &mut rng,
        };
        assert_eq!(
            ctx.kernel_version("installer").unwrap(),
            "4.18.0-425.el8.x86_64"
        );
        assert!(matches!(
            ctx.kernel_version("build"),
            Err(DistroError::MissingPackageSpecs { .. })
        ));
    }

    #[test]
    fn rpm_stage_references_checksums_and_dedups_keys() {
        let mut repo = RepoConfig::new("baseos", "https://example.com/baseos");
        repo.check_gpg = true;
        repo.gpg_key = Some("KEY".to_owned());
        let stage = rpm_stage(&[spec("bash")], &[repo.clone(), repo], true);
        let options = stage.options.unwrap();
        assert_eq!(options["gpgkeys"], json!(["KEY"]));
        assert_eq!(options["ostree_booted"], json!(true));
        assert_eq!(
            stage.inputs.unwrap()["packages"]["references"][0]["id"],
            "sha256:bash"
        );
    }
}
