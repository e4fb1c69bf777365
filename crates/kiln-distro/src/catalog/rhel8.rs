//! RHEL 8 family: rhel-86, rhel-87 and centos-8.

use super::{packages, partition_tables, RHEL_OSCAP_PROFILES};
use crate::config::ImageConfig;
use crate::image_type::{
    DiskFormat, ImageKind, ImageType, BUILD_PKGS_KEY, CONTAINER_PKGS_KEY, INSTALLER_PKGS_KEY,
    OS_PKGS_KEY,
};
use crate::platform::{BootType, Platform};
use crate::registry::{Architecture, CatalogError, Distribution};
use kiln_disk::GIBIBYTE;

const ISO_MIME: &str = "application/x-iso9660-image";
const TAR_MIME: &str = "application/x-tar";

const QCOW2_KERNEL_OPTIONS: &str =
    "console=tty0 console=ttyS0,115200n8 no_timer_check net.ifnames=0 crashkernel=auto";
const AMI_KERNEL_OPTIONS: &str = "console=ttyS0,115200n8 console=tty0 net.ifnames=0 rd.blacklist=nouveau nvme_core.io_timeout=4294967295 crashkernel=auto";
const VHD_KERNEL_OPTIONS: &str = "ro biosdevname=0 rootdelay=300 console=ttyS0 earlyprintk=ttyS0 net.ifnames=0";
const EDGE_KERNEL_OPTIONS: &str = "modprobe.blacklist=vc4";

const EDGE_SERVICES: &[&str] = &[
    "NetworkManager.service",
    "firewalld.service",
    "sshd.service",
    "greenboot-grub2-set-counter",
    "greenboot-grub2-set-success",
    "greenboot-healthcheck",
    "greenboot-rpm-ostree-grub2-check-fallback",
    "greenboot-status",
    "greenboot-task-runner",
    "redboot-auto-reboot",
    "redboot-task-runner",
];

fn image_types() -> Vec<ImageType> {
    let qcow2 = ImageType::new(
        "qcow2",
        "disk.qcow2",
        "application/x-qemu-disk",
        ImageKind::Disk(DiskFormat::Qcow2),
    )
    .package_set(BUILD_PKGS_KEY, packages::build)
    .package_set(OS_PKGS_KEY, packages::qcow2)
    .image_config(ImageConfig {
        default_target: Some("multi-user.target".to_owned()),
        ..ImageConfig::with_services(&["cloud-init.service", "cloud-config.service", "cloud-final.service"])
    })
    .kernel_options(QCOW2_KERNEL_OPTIONS)
    .bootable()
    .default_size(10 * GIBIBYTE)
    .payload_pipelines(&["os", "image", "qcow2"])
    .exports(&["qcow2"])
    .partition_tables(partition_tables::default_tables());

    let vhd = ImageType::new(
        "vhd",
        "disk.vhd",
        "application/x-vhd",
        ImageKind::Disk(DiskFormat::Vpc),
    )
    .package_set(BUILD_PKGS_KEY, packages::build)
    .package_set(OS_PKGS_KEY, packages::vhd)
    .image_config(ImageConfig::with_services(&["sshd", "waagent"]))
    .kernel_options(VHD_KERNEL_OPTIONS)
    .bootable()
    .default_size(4 * GIBIBYTE)
    .payload_pipelines(&["os", "image", "vpc"])
    .exports(&["vpc"])
    .partition_tables(partition_tables::default_tables());

    let ami = ImageType::new(
        "ami",
        "image.raw",
        "application/octet-stream",
        ImageKind::Disk(DiskFormat::Raw),
    )
    .package_set(BUILD_PKGS_KEY, packages::build)
    .package_set(OS_PKGS_KEY, packages::ami)
    .image_config(ImageConfig::with_services(&["sshd", "cloud-init", "cloud-init-local", "cloud-config", "cloud-final"]))
    .kernel_options(AMI_KERNEL_OPTIONS)
    .bootable()
    .default_size(10 * GIBIBYTE)
    .payload_pipelines(&["os", "image"])
    .exports(&["image"])
    .partition_tables(partition_tables::default_tables());

    let tar = ImageType::new("tar", "root.tar.xz", TAR_MIME, ImageKind::Archive)
        .package_set(BUILD_PKGS_KEY, packages::build)
        .package_set(OS_PKGS_KEY, packages::tar)
        .payload_pipelines(&["os", "archive"])
        .exports(&["archive"]);

    let edge_commit = ImageType::new("edge-commit", "commit.tar", TAR_MIME, ImageKind::OstreeCommit)
        .aliases(&["rhel-edge-commit"])
        .package_set(BUILD_PKGS_KEY, packages::edge_build)
        .package_set(OS_PKGS_KEY, packages::edge_commit)
        .image_config(ImageConfig::with_services(EDGE_SERVICES))
        .rpm_ostree()
        .payload_pipelines(&["os", "ostree-commit", "commit-archive"])
        .exports(&["commit-archive"]);

    let edge_container = ImageType::new(
        "edge-container",
        "container.tar",
        TAR_MIME,
        ImageKind::OstreeContainer,
    )
    .aliases(&["rhel-edge-container"])
    .package_set(BUILD_PKGS_KEY, packages::edge_build)
    .package_set(OS_PKGS_KEY, packages::edge_commit)
    .package_set(CONTAINER_PKGS_KEY, packages::edge_container)
    .image_config(ImageConfig::with_services(EDGE_SERVICES))
    .rpm_ostree()
    .payload_pipelines(&["os", "ostree-commit", "container-tree", "container"])
    .exports(&["container"]);

    let edge_installer = ImageType::new(
        "edge-installer",
        "installer.iso",
        ISO_MIME,
        ImageKind::OstreeInstaller,
    )
    .aliases(&["rhel-edge-installer"])
    .package_set(BUILD_PKGS_KEY, packages::installer_build)
    .package_set(INSTALLER_PKGS_KEY, packages::edge_installer)
    .rpm_ostree()
    .boot_iso()
    .payload_pipelines(&["anaconda-tree", "bootiso-tree", "bootiso"])
    .exports(&["bootiso"]);

    let edge_raw = ImageType::new(
        "edge-raw-image",
        "image.raw.xz",
        "application/xz",
        ImageKind::OstreeRawImage,
    )
    .package_set(BUILD_PKGS_KEY, packages::edge_build)
    .kernel_options(EDGE_KERNEL_OPTIONS)
    .rpm_ostree()
    .bootable()
    .default_size(10 * GIBIBYTE)
    .payload_pipelines(&["ostree-deployment", "image", "xz"])
    .exports(&["xz"])
    .partition_tables(partition_tables::edge_tables());

    let edge_simplified = ImageType::new(
        "edge-simplified-installer",
        "simplified-installer.iso",
        ISO_MIME,
        ImageKind::OstreeSimplifiedInstaller,
    )
    .package_set(BUILD_PKGS_KEY, packages::installer_build)
    .package_set(INSTALLER_PKGS_KEY, packages::simplified_installer)
    .kernel_options(EDGE_KERNEL_OPTIONS)
    .rpm_ostree()
    .bootable()
    .boot_iso()
    .boot_type(BootType::Uefi)
    .default_size(10 * GIBIBYTE)
    .payload_pipelines(&[
        "ostree-deployment",
        "image",
        "xz",
        "coi-tree",
        "efiboot-tree",
        "bootiso-tree",
        "bootiso",
    ])
    .exports(&["bootiso"])
    .partition_tables(partition_tables::edge_tables());

    vec![
        qcow2,
        vhd,
        ami,
        tar,
        edge_commit,
        edge_container,
        edge_installer,
        edge_raw,
        edge_simplified,
    ]
}

fn distro_config() -> ImageConfig {
    ImageConfig {
        timezone: Some("America/New_York".to_owned()),
        locale: Some("en_US.UTF-8".to_owned()),
        ..ImageConfig::default()
    }
}

fn with_arches(mut distro: Distribution, uefi_vendor: &str) -> Result<Distribution, CatalogError> {
    let types = image_types();
    let mut x86_64 = Architecture::new(&distro.name, "x86_64", Platform::x86(uefi_vendor));
    x86_64.add_image_types(&types)?;
    let mut aarch64 = Architecture::new(&distro.name, "aarch64", Platform::aarch64(uefi_vendor));
    aarch64.add_image_types(&types)?;
    distro.add_arch(x86_64)?;
    distro.add_arch(aarch64)?;
    Ok(distro)
}

fn rhel(minor: u32) -> Result<Distribution, CatalogError> {
    let mut d = Distribution::new(
        &format!("rhel-8{minor}"),
        "Red Hat Enterprise Linux",
        &format!("8.{minor}"),
    );
    d.releasever = "8".to_owned();
    d.module_platform_id = "platform:el8".to_owned();
    d.ostree_ref_tmpl = "rhel/8/{arch}/edge".to_owned();
    d.ostree_osname = "redhat".to_owned();
    d.isolabel_tmpl = format!("RHEL-8-{minor}-0-BaseOS-{{arch}}");
    d.runner = format!("org.osbuild.rhel8{minor}");
    d.default_image_config = distro_config();
    d.oscap_profiles = RHEL_OSCAP_PROFILES.iter().map(|p| (*p).to_owned()).collect();
    with_arches(d, "redhat")
}

pub fn rhel86() -> Result<Distribution, CatalogError> {
    rhel(6)
}

pub fn rhel87() -> Result<Distribution, CatalogError> {
    rhel(7)
}

pub fn centos8() -> Result<Distribution, CatalogError> {
    let mut d = Distribution::new("centos-8", "CentOS Stream", "8");
    d.module_platform_id = "platform:el8".to_owned();
    d.ostree_ref_tmpl = "centos/8/{arch}/edge".to_owned();
    d.ostree_osname = "centos".to_owned();
    d.isolabel_tmpl = "CentOS-Stream-8-BaseOS-{arch}".to_owned();
    d.runner = "org.osbuild.centos8".to_owned();
    d.default_image_config = distro_config();
    d.oscap_profiles = RHEL_OSCAP_PROFILES.iter().map(|p| (*p).to_owned()).collect();
    with_arches(d, "centos")
}
