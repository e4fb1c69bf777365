//! OSTree commits, their container wrapping and deployed OSTree trees.

use super::os::{fstab_stage, grub2_options, groups_stage, users_stage};
use super::{oci_arch, rpm_stage, tree_input, ImageContext, BUILD_PIPELINE};
use crate::image_type::CONTAINER_PKGS_KEY;
use crate::DistroError;
use kiln_disk::PartitionTable;
use kiln_schema::{Pipeline, Stage};
use serde_json::{json, Value};

const COMMIT_REPO: &str = "/repo";
const CONTAINER_REPO: &str = "/usr/share/nginx/html/repo";
const SYSROOT_REPO: &str = "/ostree/repo";
const CONTAINER_HTTP_PORT: &str = "8080";

/// Input pulling the request's commit from the sources section.
pub(super) fn source_commit_input(checksum: &str, reference: &str) -> Value {
    json!({
        "type": "org.osbuild.ostree",
        "origin": "org.osbuild.source",
        "references": {checksum: {"ref": reference}},
    })
}

/// Commit the `os` tree into a fresh repository.
pub(super) fn commit_pipeline(ctx: &ImageContext<'_>) -> Pipeline {
    let ostree = &ctx.options.ostree;
    let reference = ctx.ostree_ref();
    let mut p = Pipeline::new("ostree-commit").with_build(BUILD_PIPELINE);
    p.add_stage(Stage::new("org.osbuild.ostree.init", json!({"path": COMMIT_REPO})));

    let mut options = json!({
        "ref": reference,
        "os_version": ctx.image.distro.os_version,
    });
    if ostree.has_commit_source() {
        let parent_ref = if ostree.parent_ref.is_empty() {
            reference.as_str()
        } else {
            ostree.parent_ref.as_str()
        };
        p.add_stage(
            Stage::new("org.osbuild.ostree.pull", json!({"repo": COMMIT_REPO}))
                .with_inputs(json!({
                    "commits": source_commit_input(&ostree.fetch_checksum, parent_ref),
                })),
        );
        options["parent"] = json!(ostree.fetch_checksum);
    }
    p.add_stage(
        Stage::new("org.osbuild.ostree.commit", options)
            .with_inputs(json!({"tree": tree_input("os")})),
    );
    p
}

/// A tree serving the commit over HTTP from inside a container.
pub(super) fn container_tree_pipeline(ctx: &ImageContext<'_>) -> Result<Pipeline, DistroError> {
    let specs = ctx.specs(CONTAINER_PKGS_KEY)?;
    let mut p = Pipeline::new("container-tree").with_build(BUILD_PIPELINE);
    if !specs.is_empty() {
        p.add_stage(rpm_stage(specs, ctx.repos, false));
    }
    p.add_stage(Stage::new("org.osbuild.ostree.init", json!({"path": CONTAINER_REPO})));
    p.add_stage(
        Stage::new("org.osbuild.ostree.pull", json!({"repo": CONTAINER_REPO}))
            .with_inputs(json!({"commits": {
                "type": "org.osbuild.ostree",
                "origin": "org.osbuild.pipeline",
                "references": {"name:ostree-commit": {"ref": ctx.ostree_ref()}},
            }})),
    );
    Ok(p)
}

pub(super) fn container_pipeline(ctx: &ImageContext<'_>) -> Pipeline {
    let has_server = ctx
        .package_specs
        .get(CONTAINER_PKGS_KEY)
        .is_some_and(|specs| !specs.is_empty());
    let mut options = json!({
        "filename": ctx.image.filename(),
        "architecture": oci_arch(&ctx.image.arch.name),
    });
    if has_server {
        options["config"] = json!({
            "Cmd": ["nginx", "-g", "daemon off;", "-c", "/etc/nginx/nginx.conf"],
            "ExposedPorts": [CONTAINER_HTTP_PORT],
        });
    }
    let mut p = Pipeline::new("container").with_build(BUILD_PIPELINE);
    p.add_stage(
        Stage::new("org.osbuild.oci-archive", options)
            .with_inputs(json!({"base": tree_input("container-tree")})),
    );
    p
}

/// Deploy the request's commit into a sysroot laid out for `pt`.
pub(super) fn deployment_pipeline(ctx: &ImageContext<'_>, pt: &PartitionTable) -> Pipeline {
    let ostree = &ctx.options.ostree;
    let osname = &ctx.image.distro.ostree_osname;
    let reference = ctx.ostree_ref();
    let kernel_opts: Vec<String> = ctx
        .kernel_options()
        .split_whitespace()
        .map(str::to_owned)
        .collect();
    let deployment = json!({"osname": osname, "ref": reference});

    let mut p = Pipeline::new("ostree-deployment").with_build(BUILD_PIPELINE);
    p.add_stage(Stage::new("org.osbuild.ostree.init-fs", json!({})));
    p.add_stage(
        Stage::new(
            "org.osbuild.ostree.pull",
            json!({"repo": SYSROOT_REPO, "remote": osname}),
        )
        .with_inputs(json!({
            "commits": source_commit_input(&ostree.fetch_checksum, &reference),
        })),
    );
    p.add_stage(Stage::new("org.osbuild.ostree.os-init", json!({"osname": osname})));
    p.add_stage(Stage::new(
        "org.osbuild.ostree.config",
        json!({
            "repo": SYSROOT_REPO,
            "config": {"sysroot": {"readonly": true, "bootloader": "none"}},
        }),
    ));
    p.add_stage(Stage::new(
        "org.osbuild.mkdir",
        json!({"paths": [{"path": "/boot/efi", "mode": 0o700}]}),
    ));
    p.add_stage(Stage::new(
        "org.osbuild.ostree.deploy",
        json!({
            "osname": osname,
            "ref": reference,
            "remote": osname,
            "mounts": ["/boot", "/boot/efi"],
            "rootfs": {"label": "root"},
            "kernel_opts": kernel_opts,
        }),
    ));
    if !ostree.url.is_empty() {
        let mut remote = json!({"name": osname, "url": ostree.url});
        if !ostree.content_url.is_empty() {
            remote["contenturl"] = json!(ostree.content_url);
        }
        p.add_stage(Stage::new(
            "org.osbuild.ostree.remotes",
            json!({"repo": SYSROOT_REPO, "remotes": [remote]}),
        ));
    }
    p.add_stage(Stage::new(
        "org.osbuild.ostree.fillvar",
        json!({"deployment": deployment}),
    ));

    let mut fstab = fstab_stage(pt);
    if let Some(options) = fstab.options.as_mut() {
        options["ostree"] = json!({"deployment": deployment});
    }
    p.add_stage(fstab);

    let c = ctx.customizations;
    if !c.group.is_empty() {
        p.add_stage(with_deployment(groups_stage(&c.group), &deployment));
    }
    if !c.user.is_empty() {
        p.add_stage(with_deployment(users_stage(&c.user), &deployment));
    }
    p.add_stage(Stage::new(
        "org.osbuild.ostree.selinux",
        json!({"deployment": deployment}),
    ));

    let mut grub = grub2_options(ctx, pt);
    grub["write_defaults"] = json!(false);
    grub["greenboot"] = json!(true);
    grub["ignore_missing"] = json!(true);
    p.add_stage(Stage::new("org.osbuild.grub2", grub));
    p
}

/// Run a configuration stage against the deployment instead of the tree
/// root.
fn with_deployment(mut stage: Stage, deployment: &Value) -> Stage {
    stage.mounts = Some(json!([{
        "type": "org.osbuild.ostree.deployment",
        "name": "ostree.deployment",
        "options": {"deployment": deployment},
    }]));
    stage
}
