//! Installer ISOs: the Anaconda-based OSTree installer and the
//! coreos-installer based simplified installer.

use super::disk::COMPRESSED_IMAGE_FILENAME;
use super::os::{groups_stage, users_stage};
use super::ostree::source_commit_input;
use super::{file_input, rpm_stage, tree_input, ImageContext, BUILD_PIPELINE};
use crate::image_type::INSTALLER_PKGS_KEY;
use crate::DistroError;
use kiln_schema::{inline_data_id, Pipeline, Stage};
use serde_json::{json, Value};

const KICKSTART_PATH: &str = "/osbuild.ks";
const PXEBOOT_DIR: &str = "/images/pxeboot";
const FDO_ROOT_CERTS_PATH: &str = "/fdo_diun_pub_key_root_certs.pem";

const ANACONDA_MODULES: &[&str] = &[
    "org.fedoraproject.Anaconda.Modules.Network",
    "org.fedoraproject.Anaconda.Modules.Payloads",
    "org.fedoraproject.Anaconda.Modules.Storage",
];

const INSTALLER_DRACUT_MODULES: &[&str] = &[
    "bash", "systemd", "fips", "systemd-initrd", "modsign", "nss-softokn", "i18n",
    "convertfs", "network-manager", "network", "ifcfg", "url-lib", "drm",
    "plymouth", "crypt", "dm", "dmsquash-live", "kernel-modules",
    "kernel-modules-extra", "kernel-network-modules", "livenet", "lvm", "mdraid",
    "qemu", "qemu-net", "resume", "rootfs-block", "terminfo", "udev-rules",
    "dracut-systemd", "pollcdrom", "usrmount", "base", "fs-lib", "img-lib",
    "shutdown", "uefi-lib", "anaconda", "rdma", "rngd", "multipath", "fcoe",
    "fcoe-uefi", "iscsi", "lunmask", "nfs",
];

const COI_DRACUT_MODULES: &[&str] = &["coreos-installer", "fdo", "rdcore"];

fn kernel_files(pipeline: &str, kernel_version: &str) -> Stage {
    Stage::new(
        "org.osbuild.copy",
        json!({"paths": [
            {
                "from": format!("input://kernel/boot/vmlinuz-{kernel_version}"),
                "to": format!("tree://{PXEBOOT_DIR}/vmlinuz"),
            },
            {
                "from": format!("input://kernel/boot/initramfs-{kernel_version}.img"),
                "to": format!("tree://{PXEBOOT_DIR}/initrd.img"),
            },
        ]}),
    )
    .with_inputs(json!({"kernel": tree_input(pipeline)}))
}

fn dracut_stage(kernel_version: &str, modules: &[&str]) -> Stage {
    Stage::new(
        "org.osbuild.dracut",
        json!({
            "kernel": [kernel_version],
            "modules": modules,
            "install": ["/.buildstamp"],
        }),
    )
}

fn buildstamp_stage(ctx: &ImageContext<'_>) -> Stage {
    let distro = ctx.image.distro;
    Stage::new(
        "org.osbuild.buildstamp",
        json!({
            "arch": ctx.image.arch.name,
            "product": distro.product,
            "version": distro.os_version,
            "variant": "edge",
            "final": true,
        }),
    )
}

/// The Anaconda runtime booted from the ISO.
pub(super) fn anaconda_tree_pipeline(
    ctx: &ImageContext<'_>,
    kernel_version: &str,
) -> Result<Pipeline, DistroError> {
    let mut p = Pipeline::new("anaconda-tree").with_build(BUILD_PIPELINE);
    p.add_stage(rpm_stage(ctx.specs(INSTALLER_PKGS_KEY)?, ctx.repos, false));
    p.add_stage(buildstamp_stage(ctx));
    p.add_stage(Stage::new("org.osbuild.locale", json!({"language": "en_US.UTF-8"})));
    p.add_stage(Stage::new(
        "org.osbuild.users",
        json!({"users": {
            "install": {
                "uid": 0,
                "gid": 0,
                "home": "/root",
                "shell": "/usr/libexec/anaconda/run-anaconda",
                "password": "",
            },
            "root": {"password": ""},
        }}),
    ));
    p.add_stage(Stage::new(
        "org.osbuild.anaconda",
        json!({"kickstart-modules": ANACONDA_MODULES}),
    ));
    p.add_stage(Stage::new(
        "org.osbuild.lorax-script",
        json!({
            "path": "99-generic/runtime-postinstall.tmpl",
            "basearch": ctx.image.arch.name,
        }),
    ));
    p.add_stage(dracut_stage(kernel_version, INSTALLER_DRACUT_MODULES));
    p.add_stage(Stage::new(
        "org.osbuild.selinux.config",
        json!({"state": "permissive"}),
    ));
    Ok(p)
}

fn grub2_iso_stage(ctx: &ImageContext<'_>, kernel_opts: &[String]) -> Stage {
    let distro = ctx.image.distro;
    Stage::new(
        "org.osbuild.grub2.iso",
        json!({
            "product": {"name": distro.product, "version": distro.os_version},
            "kernel": {"dir": PXEBOOT_DIR, "opts": kernel_opts},
            "isolabel": ctx.isolabel(),
            "architectures": [grub_efi_arch(&ctx.image.arch.name)],
            "vendor": ctx.image.arch.platform.uefi_vendor,
        }),
    )
}

fn grub_efi_arch(arch: &str) -> &'static str {
    if arch == "aarch64" {
        "AA64"
    } else {
        "X64"
    }
}

fn discinfo_stage(ctx: &ImageContext<'_>) -> Stage {
    let distro = ctx.image.distro;
    Stage::new(
        "org.osbuild.discinfo",
        json!({
            "basearch": ctx.image.arch.name,
            "release": format!("{} {}", distro.product, distro.os_version),
        }),
    )
}

/// ISO contents for the Anaconda installer: runtime image, kickstart and the
/// embedded commit.
pub(super) fn bootiso_tree_pipeline(ctx: &ImageContext<'_>, kernel_version: &str) -> Pipeline {
    let isolabel = ctx.isolabel();
    let reference = ctx.ostree_ref();
    let osname = &ctx.image.distro.ostree_osname;
    let c = ctx.customizations;
    let mut p = Pipeline::new("bootiso-tree").with_build(BUILD_PIPELINE);

    p.add_stage(kernel_files("anaconda-tree", kernel_version));
    p.add_stage(
        Stage::new(
            "org.osbuild.squashfs",
            json!({
                "filename": "images/install.img",
                "compression": {"method": "xz", "options": {"bcj": bcj_filter(&ctx.image.arch.name)}},
            }),
        )
        .with_inputs(json!({"tree": tree_input("anaconda-tree")})),
    );
    let kernel_opts = vec![
        format!("inst.ks=hd:LABEL={isolabel}:{KICKSTART_PATH}"),
        format!("inst.stage2=hd:LABEL={isolabel}"),
    ];
    p.add_stage(grub2_iso_stage(ctx, &kernel_opts));
    p.add_stage(discinfo_stage(ctx));

    p.add_stage(Stage::new("org.osbuild.ostree.init", json!({"path": "/ostree/repo"})));
    p.add_stage(
        Stage::new("org.osbuild.ostree.pull", json!({"repo": "/ostree/repo"})).with_inputs(
            json!({
                "commits": source_commit_input(&ctx.options.ostree.fetch_checksum, &reference),
            }),
        ),
    );

    let mut kickstart = json!({
        "path": KICKSTART_PATH,
        "ostree": {
            "osname": osname,
            "url": "file:///run/install/repo/ostree/repo",
            "ref": reference,
            "gpg": false,
        },
    });
    if !c.user.is_empty() {
        kickstart["users"] = stage_option(users_stage(&c.user), "users");
    }
    if !c.group.is_empty() {
        kickstart["groups"] = stage_option(groups_stage(&c.group), "groups");
    }
    p.add_stage(Stage::new("org.osbuild.kickstart", kickstart));
    p
}

fn stage_option(stage: Stage, key: &str) -> Value {
    stage
        .options
        .and_then(|o| o.get(key).cloned())
        .unwrap_or(Value::Null)
}

fn bcj_filter(arch: &str) -> &'static str {
    if arch == "aarch64" {
        "arm"
    } else {
        "x86"
    }
}

/// Final ISO for either installer flavour.
pub(super) fn bootiso_pipeline(ctx: &ImageContext<'_>) -> Pipeline {
    let filename = ctx.image.filename();
    let mut options = json!({
        "filename": filename,
        "volid": ctx.isolabel(),
        "sysid": "LINUX",
        "efi": "images/efiboot.img",
    });
    if ctx.image.arch.platform.bios {
        options["boot"] = json!({"image": "isolinux/isolinux.bin", "catalog": "isolinux/boot.cat"});
        options["isohybridmbr"] = json!("/usr/share/syslinux/isohdpfx.bin");
    }
    let mut p = Pipeline::new("bootiso").with_build(BUILD_PIPELINE);
    p.add_stage(
        Stage::new("org.osbuild.xorrisofs", options)
            .with_inputs(json!({"tree": tree_input("bootiso-tree")})),
    );
    p.add_stage(Stage::new("org.osbuild.implantisomd5", json!({"filename": filename})));
    p
}

/// The coreos-installer initramfs environment.
pub(super) fn coi_tree_pipeline(
    ctx: &ImageContext<'_>,
    kernel_version: &str,
) -> Result<Pipeline, DistroError> {
    let mut p = Pipeline::new("coi-tree").with_build(BUILD_PIPELINE);
    p.add_stage(rpm_stage(ctx.specs(INSTALLER_PKGS_KEY)?, ctx.repos, false));
    p.add_stage(buildstamp_stage(ctx));
    if let Some(certs) = ctx.fdo_root_certs {
        p.add_stage(
            Stage::new("org.osbuild.fdo", json!({})).with_inputs(json!({"rootcerts": {
                "type": "org.osbuild.files",
                "origin": "org.osbuild.source",
                "references": {inline_data_id(certs): {}},
            }})),
        );
    }
    p.add_stage(dracut_stage(kernel_version, COI_DRACUT_MODULES));
    Ok(p)
}

/// Kernel command line of the simplified installer.
fn coreos_kernel_options(ctx: &ImageContext<'_>) -> Vec<String> {
    let c = ctx.customizations;
    let mut opts = vec![
        "rd.neednet=1".to_owned(),
        "coreos.inst.crypt_root=1".to_owned(),
        format!("coreos.inst.isoroot={}", ctx.isolabel()),
        format!("coreos.inst.install_dev={}", c.installation_device()),
        format!("coreos.inst.image_file=/run/media/iso/{COMPRESSED_IMAGE_FILENAME}"),
        "coreos.inst.insecure".to_owned(),
    ];
    if let Some(fdo) = &c.fdo {
        opts.push(format!(
            "fdo.manufacturing_server_url={}",
            fdo.manufacturing_server_url
        ));
        if !fdo.diun_pub_key_insecure.is_empty() {
            opts.push("fdo.diun_pub_key_insecure=true".to_owned());
        }
        if !fdo.diun_pub_key_hash.is_empty() {
            opts.push(format!("fdo.diun_pub_key_hash={}", fdo.diun_pub_key_hash));
        }
        if !fdo.diun_pub_key_root_certs.is_empty() {
            opts.push(format!("fdo.diun_pub_key_root_certs={FDO_ROOT_CERTS_PATH}"));
        }
    }
    opts
}

/// EFI boot configuration of the simplified installer.
pub(super) fn efiboot_tree_pipeline(ctx: &ImageContext<'_>) -> Pipeline {
    let mut p = Pipeline::new("efiboot-tree").with_build(BUILD_PIPELINE);
    p.add_stage(grub2_iso_stage(ctx, &coreos_kernel_options(ctx)));
    p
}

/// ISO contents for the simplified installer: the compressed disk image,
/// the installer kernel and the EFI boot tree.
pub(super) fn simplified_bootiso_tree_pipeline(
    ctx: &ImageContext<'_>,
    kernel_version: &str,
) -> Pipeline {
    let mut p = Pipeline::new("bootiso-tree").with_build(BUILD_PIPELINE);
    p.add_stage(
        Stage::new(
            "org.osbuild.copy",
            json!({"paths": [{
                "from": format!("input://file/{COMPRESSED_IMAGE_FILENAME}"),
                "to": format!("tree:///{COMPRESSED_IMAGE_FILENAME}"),
            }]}),
        )
        .with_inputs(json!({"file": file_input("xz", COMPRESSED_IMAGE_FILENAME)})),
    );
    p.add_stage(kernel_files("coi-tree", kernel_version));
    p.add_stage(
        Stage::new(
            "org.osbuild.copy",
            json!({"paths": [{"from": "input://tree/", "to": "tree:///"}]}),
        )
        .with_inputs(json!({"tree": tree_input("efiboot-tree")})),
    );
    p.add_stage(discinfo_stage(ctx));
    p
}
