//! Merge image type, blueprint, and repository inputs into the package set
//! chains sent to the depsolver.

use crate::image_type::{
    ImageTypeRef, BLUEPRINT_PKGS_KEY, BUILD_PKGS_KEY, OS_PKGS_KEY,
};
use kiln_schema::{Blueprint, ImageOptions, PackageSet, PackageSetChain, RepoConfig};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

impl ImageTypeRef<'_> {
    /// Named package sets for a request, before repositories are attached.
    ///
    /// User packages go into a separate `blueprint` set so that excludes of
    /// the `os` set never filter them; the requested kernel is added to `os`
    /// as well so both layers agree on a single kernel.
    pub fn package_sets(&self, bp: &Blueprint, options: &ImageOptions) -> BTreeMap<String, PackageSet> {
        let it = self.image_type;
        let mut merged: BTreeMap<String, PackageSet> = it
            .package_sets
            .iter()
            .map(|(name, getter)| (name.clone(), getter(self)))
            .collect();
        merged.entry(OS_PKGS_KEY.to_owned()).or_default();

        let customizations = &bp.customizations;
        let mut bp_packages = bp.packages();

        if customizations.timezone().is_some() {
            bp_packages.push("chrony".to_owned());
        }

        // A mountpoint the base layout lacks turns the layout into LVM.
        if !it.rpm_ostree {
            let base = self.base_partition_table();
            let new_mountpoint = customizations
                .filesystem
                .iter()
                .any(|fs| !base.is_some_and(|pt| pt.contains_mountpoint(&fs.mountpoint)));
            if new_mountpoint {
                bp_packages.push("lvm2".to_owned());
            }
        }

        if !bp.containers.is_empty() {
            let mut extra = PackageSet::with_include(["skopeo"]);
            if it.rpm_ostree {
                // containers-storage.conf is written by a stage that needs it
                extra = extra.append(PackageSet::with_include(["python3-pytoml"]));
            }
            let build = merged.remove(BUILD_PKGS_KEY).unwrap_or_default();
            merged.insert(BUILD_PKGS_KEY.to_owned(), build.append(extra));
        }

        if customizations.openscap.is_some() {
            bp_packages.push("openscap-scanner".to_owned());
            bp_packages.push("scap-security-guide".to_owned());
        }

        merged.insert(
            BLUEPRINT_PKGS_KEY.to_owned(),
            PackageSet::with_include(bp_packages),
        );

        let os = merged.remove(OS_PKGS_KEY).unwrap_or_default();
        merged.insert(
            OS_PKGS_KEY.to_owned(),
            os.append(PackageSet::with_include([customizations.kernel_name()])),
        );

        if it.rpm_ostree && it.boot_iso && options.ostree.fetch_checksum.is_empty() {
            warn!(
                "package sets requested for {} without a resolved ostree commit",
                it.name
            );
        }
        merged
    }

    /// Package set chains for a request, keyed by chain name.
    pub fn resolve_package_sets(
        &self,
        bp: &Blueprint,
        options: &ImageOptions,
        repos: &[RepoConfig],
    ) -> BTreeMap<String, PackageSetChain> {
        let sets = self.package_sets(bp, options);
        let chains = make_package_set_chains(self.package_set_chains(), sets, repos);
        debug!(
            "resolved package set chains for {}/{}/{}: {:?}",
            self.distro.name,
            self.arch.name,
            self.image_type.name,
            chains.keys().collect::<Vec<_>>()
        );
        chains
    }
}

/// Attach repositories and group sets into chains.
///
/// A scoped repository is added only to the sets it names, an unscoped one
/// to every set. Sets that appear in a declared chain are solved as part of
/// it; every other set becomes a single-layer chain of its own name.
pub fn make_package_set_chains(
    chains: &BTreeMap<String, Vec<String>>,
    sets: BTreeMap<String, PackageSet>,
    repos: &[RepoConfig],
) -> BTreeMap<String, PackageSetChain> {
    let mut set_repos: BTreeMap<String, Vec<RepoConfig>> = BTreeMap::new();
    for repo in repos {
        if repo.is_scoped() {
            for name in &repo.package_sets {
                set_repos.entry(name.clone()).or_default().push(repo.clone());
            }
        } else {
            for name in sets.keys() {
                set_repos.entry(name.clone()).or_default().push(repo.clone());
            }
        }
    }
    let with_repos = |name: &str, mut set: PackageSet| {
        if let Some(extra) = set_repos.get(name) {
            set.repositories.extend(extra.iter().cloned());
        }
        set
    };

    let mut chained = BTreeSet::new();
    let mut out = BTreeMap::new();
    for (chain_name, set_names) in chains {
        let layers = set_names
            .iter()
            .map(|name| {
                chained.insert(name.as_str());
                with_repos(name, sets.get(name).cloned().unwrap_or_default())
            })
            .collect();
        out.insert(chain_name.clone(), layers);
    }
    for (name, set) in sets {
        if !chained.contains(name.as_str()) {
            let layer = with_repos(&name, set);
            out.insert(name, vec![layer]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImageConfig;
    use crate::image_type::{DiskFormat, ImageKind, ImageType};
    use crate::platform::Platform;
    use crate::registry::{Architecture, Distribution};
    use kiln_disk::{Filesystem, Partition, PartitionTable, PartitionTableType, GIBIBYTE};
    use kiln_schema::parse_blueprint_str;

    fn build_set(_: &ImageTypeRef<'_>) -> PackageSet {
        PackageSet::with_include(["rpm", "dnf"])
    }

    fn os_set(_: &ImageTypeRef<'_>) -> PackageSet {
        PackageSet {
            include: vec!["@core".into()],
            exclude: vec!["rng-tools".into()],
            repositories: Vec::new(),
        }
    }

    fn fixture(rpm_ostree: bool) -> (Distribution, Architecture, ImageType) {
        let mut tables = BTreeMap::new();
        tables.insert(
            "x86_64".to_owned(),
            PartitionTable::new(
                PartitionTableType::Gpt,
                vec![Partition::filesystem(
                    2 * GIBIBYTE,
                    kiln_disk::partition::FILESYSTEM_DATA_GUID,
                    Filesystem::new("xfs", "/", "root"),
                )],
            ),
        );
        let mut it = ImageType::new(
            "qcow2",
            "disk.qcow2",
            "application/x-qemu-disk",
            ImageKind::Disk(DiskFormat::Qcow2),
        )
        .package_set(BUILD_PKGS_KEY, build_set)
        .package_set(OS_PKGS_KEY, os_set)
        .image_config(ImageConfig::default())
        .partition_tables(tables);
        if rpm_ostree {
            it = it.rpm_ostree();
        }
        (
            Distribution::new("test-1", "Test", "1"),
            Architecture::new("test-1", "x86_64", Platform::x86("test")),
            it,
        )
    }

    fn sets(rpm_ostree: bool, bp: &str) -> BTreeMap<String, PackageSet> {
        let (distro, arch, image_type) = fixture(rpm_ostree);
        let it = ImageTypeRef {
            distro: &distro,
            arch: &arch,
            image_type: &image_type,
        };
        it.package_sets(&parse_blueprint_str(bp).unwrap(), &ImageOptions::default())
    }

    #[test]
    fn empty_blueprint_gets_kernel_in_os_and_blueprint_sets() {
        let sets = sets(false, "");
        assert_eq!(sets["os"].include, vec!["@core", "kernel"]);
        assert_eq!(sets["os"].exclude, vec!["rng-tools"]);
        assert_eq!(sets["blueprint"].include, vec!["kernel"]);
        assert_eq!(sets["build"].include, vec!["rpm", "dnf"]);
    }

    #[test]
    fn customizations_pull_in_tooling() {
        let sets = sets(
            false,
            r#"
[[packages]]
name = "tmux"

[[containers]]
source = "quay.io/fedora/fedora:latest"

[customizations.timezone]
timezone = "Europe/Berlin"

[[customizations.filesystem]]
mountpoint = "/var"
minsize = 1073741824

[customizations.openscap]
datastream = "/usr/share/xml/scap/ssg/content/ssg-rhel8-ds.xml"
profile_id = "xccdf_org.ssgproject.content_profile_cis"
"#,
        );
        assert_eq!(
            sets["blueprint"].include,
            vec![
                "tmux",
                "kernel",
                "chrony",
                "lvm2",
                "openscap-scanner",
                "scap-security-guide"
            ]
        );
        assert_eq!(sets["build"].include, vec!["rpm", "dnf", "skopeo"]);
    }

    #[test]
    fn ostree_never_adds_lvm_tooling() {
        let sets = sets(
            true,
            r#"
[[containers]]
source = "quay.io/fedora/fedora:latest"

[[customizations.filesystem]]
mountpoint = "/var"
"#,
        );
        assert!(!sets["blueprint"].include.contains(&"lvm2".to_owned()));
        assert_eq!(sets["build"].include, vec!["rpm", "dnf", "skopeo", "python3-pytoml"]);
    }

    #[test]
    fn existing_mountpoint_does_not_add_lvm() {
        let sets = sets(
            false,
            r#"
[[customizations.filesystem]]
mountpoint = "/"
minsize = 4294967296
"#,
        );
        assert_eq!(sets["blueprint"].include, vec!["kernel"]);
    }

    #[test]
    fn chains_group_sets_and_scope_repos() {
        let mut chains = BTreeMap::new();
        chains.insert("os".to_owned(), vec!["os".to_owned(), "blueprint".to_owned()]);
        let mut input = BTreeMap::new();
        input.insert("build".to_owned(), PackageSet::with_include(["rpm"]));
        input.insert("os".to_owned(), PackageSet::with_include(["@core"]));
        input.insert("blueprint".to_owned(), PackageSet::with_include(["tmux"]));
        let repos = vec![
            RepoConfig::new("baseos", "https://example.com/baseos"),
            RepoConfig::new("extras", "https://example.com/extras").scoped_to(&["blueprint"]),
        ];

        let out = make_package_set_chains(&chains, input, &repos);
        assert_eq!(out.keys().collect::<Vec<_>>(), vec!["build", "os"]);
        assert_eq!(out["build"].len(), 1);
        assert_eq!(out["build"][0].repositories.len(), 1);

        let os_chain = &out["os"];
        assert_eq!(os_chain[0].include, vec!["@core"]);
        assert_eq!(os_chain[1].include, vec!["tmux"]);
        let names = |set: &PackageSet| {
            set.repositories
                .iter()
                .map(|r| r.name.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(names(&os_chain[0]), vec!["baseos"]);
        assert_eq!(names(&os_chain[1]), vec!["baseos", "extras"]);
    }

    #[test]
    fn resolution_is_deterministic() {
        let (distro, arch, image_type) = fixture(false);
        let it = ImageTypeRef {
            distro: &distro,
            arch: &arch,
            image_type: &image_type,
        };
        let bp = parse_blueprint_str("[[packages]]\nname = \"vim\"\n").unwrap();
        let repos = [RepoConfig::new("baseos", "https://example.com")];
        let a = it.resolve_package_sets(&bp, &ImageOptions::default(), &repos);
        let b = it.resolve_package_sets(&bp, &ImageOptions::default(), &repos);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }
}
