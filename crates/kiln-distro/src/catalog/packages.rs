//! Base package sets. Each function is a `PackageSetFn`.

use crate::image_type::ImageTypeRef;
use kiln_schema::PackageSet;

fn set(include: &[&str], exclude: &[&str]) -> PackageSet {
    PackageSet {
        include: include.iter().map(|s| (*s).to_owned()).collect(),
        exclude: exclude.iter().map(|s| (*s).to_owned()).collect(),
        repositories: Vec::new(),
    }
}

fn release_package(it: &ImageTypeRef<'_>) -> &'static str {
    if it.distro.is_rhel() {
        "redhat-release"
    } else {
        "centos-stream-release"
    }
}

fn is_x86(it: &ImageTypeRef<'_>) -> bool {
    it.arch.name == "x86_64"
}

fn bootloader_set(it: &ImageTypeRef<'_>) -> PackageSet {
    if is_x86(it) {
        set(&["dracut-config-generic", "efibootmgr", "grub2-efi-x64", "grub2-pc", "shim-x64"], &[])
    } else {
        set(&["dracut-config-generic", "efibootmgr", "grub2-efi-aa64", "shim-aa64"], &[])
    }
}

pub fn build(it: &ImageTypeRef<'_>) -> PackageSet {
    let common = set(
        &[
            "dnf", "dosfstools", "e2fsprogs", "glibc", "lorax-templates-generic",
            "lvm2", "policycoreutils", "python36", "python3-iniparse", "qemu-img",
            "selinux-policy-targeted", "systemd", "tar", "xfsprogs", "xz",
        ],
        &[],
    );
    if is_x86(it) {
        common.append(set(&["grub2-pc"], &[]))
    } else {
        common
    }
}

pub fn edge_build(it: &ImageTypeRef<'_>) -> PackageSet {
    build(it).append(set(&["rpm-ostree"], &[]))
}

pub fn installer_build(it: &ImageTypeRef<'_>) -> PackageSet {
    let iso = set(
        &["isomd5sum", "genisoimage", "squashfs-tools", "xorriso", "lorax-templates-rhel"],
        &[],
    );
    let iso = if is_x86(it) {
        iso.append(set(&["grub2-efi-x64", "grub2-efi-x64-cdboot", "shim-x64", "syslinux", "syslinux-nonlinux"], &[]))
    } else {
        iso.append(set(&["grub2-efi-aa64-cdboot", "shim-aa64"], &[]))
    };
    edge_build(it).append(iso)
}

pub fn qcow2(it: &ImageTypeRef<'_>) -> PackageSet {
    set(
        &[
            "@core", "authselect-compat", "chrony", "cloud-init", "cloud-utils-growpart",
            "cockpit-system", "cockpit-ws", "dhcp-client", "dnf-utils", "dosfstools",
            "net-tools", "NetworkManager", "nfs-utils", "oddjob", "oddjob-mkhomedir",
            "psmisc", "python3-jsonschema", "qemu-guest-agent", "rsync", "tar", "tcpdump",
            release_package(it),
        ],
        &[
            "aic94xx-firmware", "alsa-firmware", "alsa-lib", "alsa-tools-firmware",
            "biosdevname", "dnf-plugin-spacewalk", "dracut-config-rescue", "fedora-release",
            "firewalld", "iprutils", "ivtv-firmware", "iwl1000-firmware", "langpacks-*",
            "libertas-sd8686-firmware", "plymouth", "rng-tools",
        ],
    )
    .append(bootloader_set(it))
}

pub fn vhd(it: &ImageTypeRef<'_>) -> PackageSet {
    set(
        &[
            "@core", "chrony", "cloud-init", "cloud-utils-growpart", "gdisk", "langpacks-en",
            "NetworkManager", "WALinuxAgent", "hyperv-daemons", release_package(it),
        ],
        &["dracut-config-rescue", "firewalld", "NetworkManager-config-server", "plymouth"],
    )
    .append(bootloader_set(it))
}

pub fn ami(it: &ImageTypeRef<'_>) -> PackageSet {
    set(
        &[
            "@core", "chrony", "cloud-init", "cloud-utils-growpart", "dhcp-client",
            "yum-utils", "NetworkManager", "rsync", release_package(it),
        ],
        &["aic94xx-firmware", "alsa-firmware", "biosdevname", "firewalld", "plymouth", "rng-tools"],
    )
    .append(bootloader_set(it))
}

pub fn tar(_: &ImageTypeRef<'_>) -> PackageSet {
    set(&["policycoreutils", "selinux-policy-targeted"], &["rng-tools"])
}

pub fn edge_commit(it: &ImageTypeRef<'_>) -> PackageSet {
    let common = set(
        &[
            "attr", "audit", "basesystem", "bash", "bash-completion", "chrony",
            "clevis", "clevis-dracut", "clevis-luks", "container-selinux", "coreutils",
            "criu", "cryptsetup", "curl", "dnsmasq", "dosfstools", "dracut-config-generic",
            "dracut-network", "e2fsprogs", "fdo-client", "fdo-owner-cli", "firewalld",
            "fuse-overlayfs", "fwupd", "glibc", "glibc-minimal-langpack", "gnupg2",
            "greenboot", "greenboot-default-health-checks", "gzip", "hostname",
            "ignition", "ima-evm-utils", "iproute", "iptables", "iputils", "keyutils",
            "less", "lvm2", "NetworkManager", "NetworkManager-wifi", "nss-altfiles",
            "openssh-clients", "openssh-server", "passwd", "pinentry", "platform-python",
            "podman", "policycoreutils", "policycoreutils-python-utils", "procps-ng",
            "redhat-release", "rootfiles", "rpm", "rpm-ostree", "rsync",
            "selinux-policy-targeted", "setools-console", "setup", "shadow-utils",
            "shim-x64", "skopeo", "slirp4netns", "sudo", "systemd", "tar", "tmux",
            "traceroute", "usbguard", "util-linux", "vim-minimal", "wpa_supplicant", "xz",
        ],
        &["rng-tools"],
    );
    if is_x86(it) {
        common.append(set(
            &["efibootmgr", "grub2-efi-x64", "grub2-pc", "grub2-pc-modules", "microcode_ctl"],
            &[],
        ))
    } else {
        common.append(set(&["efibootmgr", "grub2-efi-aa64", "iwl7260-firmware"], &[]))
    }
}

pub fn edge_container(_: &ImageTypeRef<'_>) -> PackageSet {
    set(&["nginx"], &[])
}

pub fn edge_installer(it: &ImageTypeRef<'_>) -> PackageSet {
    set(
        &[
            "anaconda-dracut", "anaconda-install-env-deps", "anaconda-widgets",
            "audit", "bind-utils", "curl", "dbus-x11", "dmidecode", "dnf",
            "dracut-config-generic", "dracut-network", "efibootmgr", "ethtool",
            "fcoe-utils", "gdb-gdbserver", "glibc-all-langpacks", "hostname",
            "initscripts", "ipmitool", "kernel", "kexec-tools", "less", "linux-firmware",
            "lldpad", "lsof", "lvm2", "mt-st", "mtr", "net-tools", "nfs-utils",
            "nm-connection-editor", "nmap-ncat", "openssh-clients", "openssh-server",
            "oscap-anaconda-addon", "ostree", "pciutils", "python3-pyatspi", "rdma-core",
            "rng-tools", "rpcbind", "rpm-ostree", "rsync", "rsyslog", "selinux-policy-targeted",
            "sg3_utils", "smartmontools", "spice-vdagent", "strace", "sudo", "tar",
            "tigervnc-server-minimal", "tmux", "usbutils", "vim-minimal", "xz",
        ],
        &[],
    )
    .append(bootloader_set(it))
}

pub fn simplified_installer(it: &ImageTypeRef<'_>) -> PackageSet {
    set(
        &[
            "attr", "basesystem", "binutils", "bsdtar", "clevis-dracut", "clevis-luks",
            "cloud-utils-growpart", "coreos-installer", "coreos-installer-dracut",
            "coreutils", "device-mapper-multipath", "dnsmasq", "dosfstools",
            "dracut-live", "e2fsprogs", "fcoe-utils", "fdo-init", "gzip", "ima-evm-utils",
            "iproute", "iptables", "iputils", "iscsi-initiator-utils", "kernel",
            "keyutils", "lldpad", "lvm2", "passwd", "policycoreutils",
            "policycoreutils-python-utils", "procps-ng", "redhat-logos", "rootfiles",
            "setools-console", "sudo", "traceroute", "util-linux",
        ],
        &[],
    )
    .append(bootloader_set(it))
}

pub fn scos_build(_: &ImageTypeRef<'_>) -> PackageSet {
    set(
        &[
            "dnf", "dosfstools", "e2fsprogs", "policycoreutils", "python3-iniparse",
            "rpm-ostree", "selinux-policy-targeted", "systemd", "tar", "xfsprogs", "xz",
        ],
        &[],
    )
}

pub fn scos_commit(_: &ImageTypeRef<'_>) -> PackageSet {
    set(
        &[
            "rocky-release", "basesystem", "network-scripts", "kernel",
            "glibc", "tmux", "nss-altfiles", "glibc-minimal-langpack",
            "lvm2", "cryptsetup", "dracut", "dracut-config-generic",
            "bash", "bash-completion", "crontabs", "logrotate",
            "coreutils", "which", "curl", "wget", "openssl", "jq",
            "hostname", "iproute", "iputils", "iptables",
            "openssh-clients", "openssh-server", "passwd",
            "dnsmasq", "traceroute", "tcpdump", "net-tools",
            "tar", "gzip", "xz", "man", "polkit",
            "e2fsprogs", "xfsprogs", "dosfstools",
            "sudo", "systemd", "util-linux", "vim-minimal",
            "setools-console", "kernel-tools",
            "setup", "shadow-utils", "attr", "audit",
            "policycoreutils", "selinux-policy-targeted",
            "procps-ng", "rpm", "rpm-ostree",
            "keyutils", "cracklib-dicts",
            "gnupg2", "pinentry", "cloud-init",
            "grub2", "grub2-efi-x64", "efibootmgr", "shim-x64",
            "containerd.io", "docker-ce", "docker-compose-plugin",
        ],
        &["geolite2-city", "geolite2-country", "glibc-all-langpacks", "mozjs78"],
    )
}

pub fn empty(_: &ImageTypeRef<'_>) -> PackageSet {
    PackageSet::default()
}
