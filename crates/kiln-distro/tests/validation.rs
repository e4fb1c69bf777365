use kiln_distro::{default_registry, Registry, ValidationError};
use kiln_schema::{parse_blueprint_str, ContainerSpec, ImageOptions};

fn registry() -> Registry {
    default_registry().unwrap()
}

fn commit_options() -> ImageOptions {
    let mut options = ImageOptions::default();
    options.ostree.fetch_checksum = "a".repeat(64);
    options.ostree.url = "https://ostree.example.com/repo".to_owned();
    options
}

fn check(
    reg: &Registry,
    distro: &str,
    image_type: &str,
    blueprint: &str,
    options: &ImageOptions,
) -> Result<(), ValidationError> {
    let it = reg.resolve(distro, "x86_64", image_type).unwrap();
    let bp = parse_blueprint_str(blueprint).unwrap();
    it.validate(&bp.customizations, options, &[])
}

#[test]
fn simplified_installer_rejects_two_fdo_anchors() {
    let reg = registry();
    let err = check(
        &reg,
        "rhel-87",
        "edge-simplified-installer",
        r#"
[customizations]
installation_device = "/dev/vda"

[customizations.fdo]
manufacturing_server_url = "http://fdo.example.com:8080"
diun_pub_key_hash = "sha256:abc"
diun_pub_key_insecure = "true"
"#,
        &commit_options(),
    )
    .unwrap_err();
    assert!(matches!(err, ValidationError::InvalidFdoDiunKey(_)));
}

#[test]
fn simplified_installer_accepts_one_fdo_anchor() {
    let reg = registry();
    check(
        &reg,
        "rhel-87",
        "edge-simplified-installer",
        r#"
[customizations]
installation_device = "/dev/vda"

[customizations.fdo]
manufacturing_server_url = "http://fdo.example.com:8080"
diun_pub_key_insecure = "true"
"#,
        &commit_options(),
    )
    .unwrap();
}

#[test]
fn simplified_installer_needs_installation_device() {
    let reg = registry();
    let err = check(&reg, "rhel-86", "edge-simplified-installer", "", &commit_options())
        .unwrap_err();
    assert!(matches!(err, ValidationError::MissingInstallationDevice(_)));
}

#[test]
fn simplified_installer_needs_manufacturing_server() {
    let reg = registry();
    let err = check(
        &reg,
        "rhel-86",
        "edge-simplified-installer",
        r#"
[customizations]
installation_device = "/dev/vda"

[customizations.fdo]
diun_pub_key_hash = "sha256:abc"
"#,
        &commit_options(),
    )
    .unwrap_err();
    assert!(matches!(err, ValidationError::MissingFdoManufacturingServer(_)));
}

#[test]
fn ostree_types_reject_custom_mountpoints() {
    let reg = registry();
    for image_type in ["edge-commit", "edge-container", "ostree-commit"] {
        let distro = if image_type.starts_with("ostree") {
            "scos-rocky-8"
        } else {
            "rhel-87"
        };
        // "/" is allowed by every mountpoint policy
        let err = check(
            &reg,
            distro,
            image_type,
            "[[customizations.filesystem]]\nmountpoint = \"/\"\nminsize = 1024\n",
            &ImageOptions::default(),
        )
        .unwrap_err();
        assert!(
            matches!(err, ValidationError::MountpointsNotSupported),
            "{image_type}: {err}"
        );
    }
}

#[test]
fn disk_images_check_mountpoint_policy() {
    let reg = registry();
    check(
        &reg,
        "rhel-87",
        "qcow2",
        "[[customizations.filesystem]]\nmountpoint = \"/var/log\"\nminsize = 1024\n",
        &ImageOptions::default(),
    )
    .unwrap();

    let err = check(
        &reg,
        "rhel-87",
        "qcow2",
        "[[customizations.filesystem]]\nmountpoint = \"/etc\"\nminsize = 1024\n",
        &ImageOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, ValidationError::Mountpoints(_)));
    assert!(err.to_string().contains("/etc"));
}

#[test]
fn installers_need_a_commit_checksum() {
    let reg = registry();
    let err = check(&reg, "rhel-87", "edge-installer", "", &ImageOptions::default())
        .unwrap_err();
    assert!(matches!(err, ValidationError::MissingOstreeCommit(_)));

    let err = check(&reg, "rhel-87", "edge-raw-image", "", &ImageOptions::default())
        .unwrap_err();
    assert!(matches!(err, ValidationError::RawImageMissingCommit(_)));
}

#[test]
fn installer_allows_only_users_and_groups() {
    let reg = registry();
    check(
        &reg,
        "rhel-87",
        "edge-installer",
        "[[customizations.user]]\nname = \"admin\"\n",
        &commit_options(),
    )
    .unwrap();

    let err = check(
        &reg,
        "rhel-87",
        "edge-installer",
        "[customizations]\nhostname = \"edge\"\n",
        &commit_options(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        ValidationError::UnsupportedCustomizations { .. }
    ));
    assert!(err.to_string().contains("user, group"));
}

#[test]
fn containers_rejected_only_for_non_commit_ostree_types() {
    let reg = registry();
    let containers = [ContainerSpec {
        source: "quay.io/fedora/fedora:latest".to_owned(),
        local_name: "fedora".to_owned(),
        ..ContainerSpec::default()
    }];
    let bp = parse_blueprint_str("").unwrap();

    let installer = reg.resolve("rhel-87", "x86_64", "edge-installer").unwrap();
    let err = installer
        .validate(&bp.customizations, &commit_options(), &containers)
        .unwrap_err();
    assert!(matches!(err, ValidationError::ContainersNotSupported { .. }));

    for (distro, image_type) in [
        ("rhel-87", "edge-commit"),
        ("rhel-87", "edge-container"),
        ("scos-oe-1", "ostree-commit"),
        ("rhel-87", "qcow2"),
    ] {
        let it = reg.resolve(distro, "x86_64", image_type).unwrap();
        it.validate(&bp.customizations, &ImageOptions::default(), &containers)
            .unwrap();
    }
}

#[test]
fn kernel_append_rejected_for_non_bootable_ostree() {
    let reg = registry();
    let err = check(
        &reg,
        "rhel-87",
        "edge-commit",
        "[customizations.kernel]\nappend = \"quiet\"\n",
        &ImageOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, ValidationError::KernelAppendNotSupported));

    check(
        &reg,
        "rhel-87",
        "edge-raw-image",
        "[customizations.kernel]\nappend = \"quiet\"\n",
        &commit_options(),
    )
    .unwrap();
}

#[test]
fn openscap_rules() {
    let reg = registry();
    let cis = r#"
[customizations.openscap]
datastream = "/usr/share/xml/scap/ssg/content/ssg-rhel8-ds.xml"
profile_id = "xccdf_org.ssgproject.content_profile_cis"
"#;
    check(&reg, "rhel-87", "qcow2", cis, &ImageOptions::default()).unwrap();

    let err = check(&reg, "rhel-86", "qcow2", cis, &ImageOptions::default()).unwrap_err();
    assert!(matches!(err, ValidationError::OpenScapUnsupportedVersion(v) if v == "8.6"));

    let err = check(&reg, "centos-8", "qcow2", cis, &ImageOptions::default()).unwrap_err();
    assert!(matches!(err, ValidationError::OpenScapUnsupportedVersion(_)));

    let unknown = cis.replace("content_profile_cis", "content_profile_nope");
    let err = check(&reg, "rhel-87", "qcow2", &unknown, &ImageOptions::default()).unwrap_err();
    assert!(matches!(err, ValidationError::OpenScapUnsupportedProfile(_)));

    let err = check(&reg, "rhel-87", "edge-commit", cis, &ImageOptions::default()).unwrap_err();
    assert!(matches!(err, ValidationError::OpenScapNotSupported));
}
