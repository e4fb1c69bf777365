//! The build root and the OS tree.

use super::{rpm_stage, selinux_stage, ImageContext, BUILD_PIPELINE};
use crate::image_type::{ImageKind, BUILD_PKGS_KEY, OS_PKGS_KEY};
use crate::DistroError;
use kiln_disk::{Filesystem, PartitionTable};
use kiln_schema::blueprint::{GroupCustomization, UserCustomization};
use kiln_schema::{ContainerSpec, Pipeline, Stage};
use serde_json::{json, Map, Value};

const CONTAINERS_STORAGE_PATH: &str = "/usr/share/containers/storage";

pub(super) fn build_pipeline(ctx: &ImageContext<'_>) -> Result<Pipeline, DistroError> {
    let mut p = Pipeline::new(BUILD_PIPELINE).with_runner(&ctx.image.distro.runner);
    p.add_stage(rpm_stage(ctx.specs(BUILD_PKGS_KEY)?, ctx.repos, false));
    p.add_stage(
        Stage::new(
            "org.osbuild.selinux",
            json!({
                "file_contexts": "etc/selinux/targeted/contexts/files/file_contexts",
                "labels": {"/usr/bin/cp": "system_u:object_r:install_exec_t:s0"},
            }),
        ),
    );
    Ok(p)
}

/// The `os` tree. A partition table is given for bootable disk images and
/// adds fstab and bootloader configuration.
pub(super) fn os_pipeline(
    ctx: &ImageContext<'_>,
    pt: Option<&PartitionTable>,
) -> Result<Pipeline, DistroError> {
    let it = ctx.image.image_type;
    let c = ctx.customizations;
    let config = ctx.image.default_image_config();
    let mut p = Pipeline::new("os").with_build(BUILD_PIPELINE);

    p.add_stage(rpm_stage(ctx.specs(OS_PKGS_KEY)?, ctx.repos, it.rpm_ostree));

    if !ctx.containers.is_empty() {
        if it.rpm_ostree {
            p.add_stage(Stage::new(
                "org.osbuild.containers.storage.conf",
                json!({
                    "filename": "/etc/containers/storage.conf",
                    "config": {"storage": {"options": {
                        "additionalimagestores": [CONTAINERS_STORAGE_PATH],
                    }}},
                }),
            ));
        }
        p.add_stage(skopeo_stage(ctx.containers, it.rpm_ostree));
    }

    if pt.is_some() {
        p.add_stage(Stage::new("org.osbuild.fix-bls", json!({})));
    }

    let language = c
        .locale
        .as_ref()
        .and_then(|l| l.languages.first().cloned())
        .or(config.locale.clone());
    if let Some(language) = language {
        p.add_stage(Stage::new("org.osbuild.locale", json!({"language": language})));
    }
    if let Some(keymap) = c.locale.as_ref().and_then(|l| l.keyboard.as_deref()) {
        p.add_stage(Stage::new("org.osbuild.keymap", json!({"keymap": keymap})));
    }
    if let Some(hostname) = &c.hostname {
        p.add_stage(Stage::new("org.osbuild.hostname", json!({"hostname": hostname})));
    }
    if let Some(zone) = c.timezone().map(str::to_owned).or(config.timezone.clone()) {
        p.add_stage(Stage::new("org.osbuild.timezone", json!({"zone": zone})));
    }
    if !c.ntp_servers().is_empty() {
        p.add_stage(Stage::new(
            "org.osbuild.chrony",
            json!({"timeservers": c.ntp_servers()}),
        ));
    }
    if !c.group.is_empty() {
        p.add_stage(groups_stage(&c.group));
    }
    if !c.user.is_empty() {
        p.add_stage(users_stage(&c.user));
    }

    if it.rpm_ostree {
        p.add_stage(Stage::new(
            "org.osbuild.ostree.preptree",
            json!({"etc_group_members": ["wheel", "docker"]}),
        ));
    }

    let mut enabled = config.enabled_services.clone();
    let mut disabled = config.disabled_services.clone();
    if let Some(services) = &c.services {
        enabled.extend(services.enabled.iter().cloned());
        disabled.extend(services.disabled.iter().cloned());
    }
    if !enabled.is_empty() || !disabled.is_empty() || config.default_target.is_some() {
        let mut options = Map::new();
        if !enabled.is_empty() {
            options.insert("enabled_services".to_owned(), json!(enabled));
        }
        if !disabled.is_empty() {
            options.insert("disabled_services".to_owned(), json!(disabled));
        }
        if let Some(target) = &config.default_target {
            options.insert("default_target".to_owned(), json!(target));
        }
        p.add_stage(Stage::new("org.osbuild.systemd", Value::Object(options)));
    }

    if let Some(pt) = pt {
        p.add_stage(fstab_stage(pt));
        if matches!(it.kind, ImageKind::Disk(_)) {
            p.add_stage(grub2_stage(ctx, pt));
        }
    }

    if let Some(oscap) = &c.openscap {
        p.add_stage(Stage::new(
            "org.osbuild.oscap.remediation",
            json!({
                "data_dir": "/oscap_data",
                "config": {
                    "datastream": oscap.datastream,
                    "profile_id": oscap.profile_id,
                },
            }),
        ));
    }

    p.add_stage(selinux_stage());
    Ok(p)
}

fn skopeo_stage(containers: &[ContainerSpec], ostree: bool) -> Stage {
    let mut references = Map::new();
    for c in containers {
        let key = c.digest.clone().unwrap_or_else(|| c.source.clone());
        references.insert(key, json!({"name": c.local_name}));
    }
    let mut destination = json!({"type": "containers-storage"});
    if ostree {
        destination["storage-path"] = json!(CONTAINERS_STORAGE_PATH);
    }
    Stage::new("org.osbuild.skopeo", json!({"destination": destination})).with_inputs(json!({
        "images": {
            "type": "org.osbuild.containers",
            "origin": "org.osbuild.source",
            "references": references,
        }
    }))
}

pub(super) fn groups_stage(groups: &[GroupCustomization]) -> Stage {
    let mut out = Map::new();
    for g in groups {
        let mut entry = Map::new();
        if let Some(gid) = g.gid {
            entry.insert("gid".to_owned(), json!(gid));
        }
        out.insert(g.name.clone(), Value::Object(entry));
    }
    Stage::new("org.osbuild.groups", json!({"groups": out}))
}

pub(super) fn users_stage(users: &[UserCustomization]) -> Stage {
    let mut out = Map::new();
    for u in users {
        let mut entry = Map::new();
        let optional = [
            ("description", &u.description),
            ("home", &u.home),
            ("shell", &u.shell),
            ("password", &u.password),
            ("key", &u.key),
        ];
        for (field, value) in optional {
            if let Some(v) = value {
                entry.insert(field.to_owned(), json!(v));
            }
        }
        if let Some(uid) = u.uid {
            entry.insert("uid".to_owned(), json!(uid));
        }
        if let Some(gid) = u.gid {
            entry.insert("gid".to_owned(), json!(gid));
        }
        if !u.groups.is_empty() {
            entry.insert("groups".to_owned(), json!(u.groups));
        }
        out.insert(u.name.clone(), Value::Object(entry));
    }
    Stage::new("org.osbuild.users", json!({"users": out}))
}

pub(super) fn fstab_stage(pt: &PartitionTable) -> Stage {
    let mut filesystems: Vec<&Filesystem> = pt.filesystems();
    filesystems.sort_by(|a, b| a.mountpoint.cmp(&b.mountpoint));
    let entries: Vec<Value> = filesystems
        .into_iter()
        .map(|fs| {
            json!({
                "uuid": fs.uuid,
                "vfs_type": fs.fs_type,
                "path": fs.mountpoint,
                "options": fs.fstab_options,
                "freq": fs.fstab_freq,
                "passno": fs.fstab_passno,
            })
        })
        .collect();
    Stage::new("org.osbuild.fstab", json!({"filesystems": entries}))
}

/// Bootloader configuration for a package-based disk image.
fn grub2_stage(ctx: &ImageContext<'_>, pt: &PartitionTable) -> Stage {
    let mut options = grub2_options(ctx, pt);
    options["write_defaults"] = json!(false);
    Stage::new("org.osbuild.grub2", options)
}

pub(super) fn grub2_options(ctx: &ImageContext<'_>, pt: &PartitionTable) -> Value {
    let mut options = json!({"kernel_opts": ctx.kernel_options()});
    if let Some(root) = pt.find_filesystem("/") {
        options["root_fs_uuid"] = json!(root.uuid);
    }
    if let Some(boot) = pt.find_filesystem("/boot") {
        options["boot_fs_uuid"] = json!(boot.uuid);
    }
    let boot_type = ctx.image.boot_type();
    if boot_type.supports_bios() {
        options["legacy"] = json!("i386-pc");
    }
    if boot_type.supports_uefi() {
        options["uefi"] = json!({
            "vendor": ctx.image.arch.platform.uefi_vendor,
            "unified": true,
        });
    }
    options
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn users_stage_omits_unset_fields() {
        let users = vec![UserCustomization {
            name: "admin".to_owned(),
            key: Some("ssh-ed25519 AAAA".to_owned()),
            groups: vec!["wheel".to_owned()],
            uid: Some(1000),
            ..UserCustomization::default()
        }];
        let options = users_stage(&users).options.unwrap();
        assert_eq!(
            options,
            json!({"users": {"admin": {
                "key": "ssh-ed25519 AAAA",
                "uid": 1000,
                "groups": ["wheel"],
            }}})
        );
    }

    #[test]
    fn skopeo_prefers_digest_reference() {
        let containers = vec![ContainerSpec {
            source: "quay.io/x/y:1".to_owned(),
            digest: Some("sha256:abc".to_owned()),
            tls_verify: None,
            local_name: "y".to_owned(),
        }];
        let stage = skopeo_stage(&containers, true);
        assert_eq!(
            stage.inputs.unwrap()["images"]["references"]["sha256:abc"]["name"],
            "y"
        );
        assert_eq!(
            stage.options.unwrap()["destination"]["storage-path"],
            CONTAINERS_STORAGE_PATH
        );
    }
}
