use kiln_core::{ComposeRequest, Composer, CoreError, MockDepsolver};
use kiln_schema::{parse_blueprint_str, RepoConfig};

fn request(distro: &str, arch: &str, image_type: &str) -> ComposeRequest {
    let mut request = ComposeRequest::new(distro, arch, image_type);
    request.repos = vec![RepoConfig::new("baseos", "https://repo.example.com/baseos")];
    request
}

fn edge_options(request: &mut ComposeRequest) {
    request.options.ostree.fetch_checksum = "d".repeat(64);
    request.options.ostree.url = "https://ostree.example.com/repo".to_owned();
}

#[test]
fn compose_is_reproducible() {
    let composer = Composer::with_default_catalog().unwrap();
    let solver = MockDepsolver::new();
    let mut req = request("rhel-87", "x86_64", "qcow2");
    req.blueprint = parse_blueprint_str(
        r#"
name = "web"

[[packages]]
name = "nginx"

[customizations]
hostname = "web01"
"#,
    )
    .unwrap();
    req.seed = 11;

    let a = composer.compose(&req, &solver).unwrap();
    let b = composer.compose(&req, &solver).unwrap();
    assert_eq!(a.manifest.to_json().unwrap(), b.manifest.to_json().unwrap());
    assert_eq!(a.identity, b.identity);

    let curl = a.manifest.sources.curl.as_ref().unwrap();
    assert!(curl
        .items
        .values()
        .any(|item| item.url.ends_with("/nginx-1.0-1.8.x86_64.rpm")));
}

#[test]
fn changing_a_customization_changes_identity() {
    let composer = Composer::with_default_catalog().unwrap();
    let solver = MockDepsolver::new();
    let plain = request("centos-8", "x86_64", "tar");
    let mut tuned = plain.clone();
    tuned.blueprint = parse_blueprint_str("[customizations]\nhostname = \"tuned\"\n").unwrap();

    let a = composer.compose(&plain, &solver).unwrap();
    let b = composer.compose(&tuned, &solver).unwrap();
    assert_ne!(a.identity.manifest_id, b.identity.manifest_id);
}

#[test]
fn os_tree_change_reaches_qcow2_checksum() {
    let composer = Composer::with_default_catalog().unwrap();
    let solver = MockDepsolver::new();
    let mut first = request("rhel-87", "x86_64", "qcow2");
    first.blueprint = parse_blueprint_str("[customizations]\nhostname = \"a\"\n").unwrap();
    let mut second = first.clone();
    second.blueprint = parse_blueprint_str("[customizations]\nhostname = \"b\"\n").unwrap();

    let a = composer.compose(&first, &solver).unwrap();
    let b = composer.compose(&second, &solver).unwrap();
    assert_eq!(a.manifest.pipeline("qcow2"), b.manifest.pipeline("qcow2"));
    assert_ne!(
        a.build_request.manifest_checksum,
        b.build_request.manifest_checksum
    );
}

#[test]
fn parallel_results_match_sequential() {
    let composer = Composer::with_default_catalog().unwrap();
    let solver = MockDepsolver::new();

    let mut installer = request("rhel-87", "x86_64", "edge-installer");
    edge_options(&mut installer);
    let mut raw = request("rhel-86", "aarch64", "edge-raw-image");
    edge_options(&mut raw);
    let requests = vec![
        request("rhel-87", "x86_64", "qcow2"),
        request("rhel-87", "aarch64", "ami"),
        request("scos-rocky-8", "x86_64", "scos-rocky-container"),
        installer,
        raw,
        request("nope-1", "x86_64", "qcow2"),
    ];

    let parallel = composer.compose_many(&requests, &solver);
    assert_eq!(parallel.len(), requests.len());
    for (req, result) in requests.iter().zip(&parallel) {
        match (composer.compose(req, &solver), result) {
            (Ok(seq), Ok(par)) => assert_eq!(
                seq.manifest.to_json().unwrap(),
                par.manifest.to_json().unwrap(),
                "{}/{}/{}",
                req.distro,
                req.arch,
                req.image_type
            ),
            (Err(seq), Err(par)) => assert_eq!(seq.to_string(), par.to_string()),
            _ => panic!("{}: sequential and parallel disagree", req.image_type),
        }
    }
    assert!(matches!(parallel[5], Err(CoreError::Registry(_))));
}

#[test]
fn solver_failure_surfaces_as_depsolve_error() {
    let composer = Composer::with_default_catalog().unwrap();
    let solver = MockDepsolver::new().with_unavailable(["nginx"]);
    let mut req = request("rhel-87", "x86_64", "qcow2");
    req.blueprint = parse_blueprint_str("[[packages]]\nname = \"nginx\"\n").unwrap();
    let err = composer.compose(&req, &solver).unwrap_err();
    assert!(matches!(err, CoreError::Depsolve(_)), "{err}");
    assert!(err.to_string().contains("nginx"));
}

#[test]
fn build_request_serializes() {
    let composer = Composer::with_default_catalog().unwrap();
    let mut req = request("scos-oe-1", "aarch64", "ostree-commit");
    req.blueprint.name = "base".to_owned();
    let result = composer.compose(&req, &MockDepsolver::new()).unwrap();
    let json = serde_json::to_value(&result.build_request).unwrap();
    assert_eq!(json["distro"], "scos-oe-1");
    assert_eq!(json["image_type"], "ostree-commit");
    assert_eq!(json["blueprint"], "base");
    assert_eq!(json["manifest_checksum"].as_str().unwrap().len(), 64);
}
