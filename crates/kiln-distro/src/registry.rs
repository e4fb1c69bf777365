//! Distribution / architecture / image type lookup.
//!
//! A `Registry` is assembled once through `RegistryBuilder`, which checks the
//! catalog invariants and refuses to produce an inconsistent registry. After
//! construction it is read-only and can be shared between threads.

use crate::config::ImageConfig;
use crate::image_type::{
    ImageType, ImageTypeRef, BLUEPRINT_PKGS_KEY, BUILD_PKGS_KEY, OS_PKGS_KEY,
};
use crate::platform::Platform;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// Defects in the static catalog. Never caused by user input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("distribution '{0}' is registered twice")]
    DuplicateDistro(String),
    #[error("architecture '{arch}' is registered twice for {distro}")]
    DuplicateArch { distro: String, arch: String },
    #[error("image type '{image_type}' is registered twice for {arch}")]
    DuplicateImageType { arch: String, image_type: String },
    #[error("'{image_type}' image type has no 'build' package set defined")]
    MissingBuildPackageSet { image_type: String },
    #[error("image type alias '{alias}' for '{image_type}' is already defined for another image type '{existing}'")]
    DuplicateAlias {
        alias: String,
        image_type: String,
        existing: String,
    },
    #[error("image type alias '{alias}' shadows an image type of the same name")]
    AliasShadowsImageType { alias: String },
    #[error("image type '{alias}' is an alias to a non-existing image type '{target}'")]
    DanglingAlias { alias: String, target: String },
    #[error("package set chain '{chain}' of '{image_type}' references undefined package set '{set}'")]
    UndefinedChainSet {
        image_type: String,
        chain: String,
        set: String,
    },
}

/// Lookup failures for names supplied by a caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown distribution: {0}")]
    UnknownDistro(String),
    #[error("invalid architecture: {arch} (distribution {distro})")]
    UnknownArch { distro: String, arch: String },
    #[error("invalid image type: {image_type} (architecture {arch})")]
    UnknownImageType { arch: String, image_type: String },
}

#[derive(Debug, Clone)]
pub struct Distribution {
    pub name: String,
    pub product: String,
    pub os_version: String,
    pub releasever: String,
    pub module_platform_id: String,
    /// OSTree ref with an `{arch}` placeholder.
    pub ostree_ref_tmpl: String,
    /// Stateroot name of deployed OSTree systems.
    pub ostree_osname: String,
    /// ISO volume label with an `{arch}` placeholder.
    pub isolabel_tmpl: String,
    pub runner: String,
    pub default_image_config: ImageConfig,
    pub oscap_profiles: Vec<String>,
    arches: BTreeMap<String, Architecture>,
}

impl Distribution {
    pub fn new(name: &str, product: &str, os_version: &str) -> Self {
        Self {
            name: name.to_owned(),
            product: product.to_owned(),
            os_version: os_version.to_owned(),
            releasever: os_version.to_owned(),
            module_platform_id: String::new(),
            ostree_ref_tmpl: String::new(),
            ostree_osname: String::new(),
            isolabel_tmpl: String::new(),
            runner: String::new(),
            default_image_config: ImageConfig::default(),
            oscap_profiles: Vec::new(),
            arches: BTreeMap::new(),
        }
    }

    /// Sorted architecture names.
    pub fn list_arches(&self) -> Vec<&str> {
        self.arches.keys().map(String::as_str).collect()
    }

    pub fn arch(&self, name: &str) -> Result<&Architecture, RegistryError> {
        self.arches
            .get(name)
            .ok_or_else(|| RegistryError::UnknownArch {
                distro: self.name.clone(),
                arch: name.to_owned(),
            })
    }

    pub fn is_rhel(&self) -> bool {
        self.name.starts_with("rhel")
    }

    pub fn add_arch(&mut self, arch: Architecture) -> Result<(), CatalogError> {
        if self.arches.contains_key(&arch.name) {
            return Err(CatalogError::DuplicateArch {
                distro: self.name.clone(),
                arch: arch.name,
            });
        }
        self.arches.insert(arch.name.clone(), arch);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Architecture {
    pub name: String,
    /// Name of the owning distribution.
    pub distro: String,
    pub platform: Platform,
    image_types: BTreeMap<String, ImageType>,
    aliases: BTreeMap<String, String>,
}

impl Architecture {
    pub fn new(distro: &str, name: &str, platform: Platform) -> Self {
        Self {
            name: name.to_owned(),
            distro: distro.to_owned(),
            platform,
            image_types: BTreeMap::new(),
            aliases: BTreeMap::new(),
        }
    }

    /// Register image types. Each architecture keeps its own copy, so a
    /// template shared by several architectures is never shared state.
    pub fn add_image_types<'t>(
        &mut self,
        image_types: impl IntoIterator<Item = &'t ImageType>,
    ) -> Result<(), CatalogError> {
        for it in image_types {
            check_image_type(it)?;
            if self.image_types.contains_key(&it.name) {
                return Err(CatalogError::DuplicateImageType {
                    arch: self.name.clone(),
                    image_type: it.name.clone(),
                });
            }
            for alias in &it.aliases {
                if let Some(existing) = self.aliases.get(alias) {
                    return Err(CatalogError::DuplicateAlias {
                        alias: alias.clone(),
                        image_type: it.name.clone(),
                        existing: existing.clone(),
                    });
                }
                self.aliases.insert(alias.clone(), it.name.clone());
            }
            self.image_types.insert(it.name.clone(), it.clone());
        }
        Ok(())
    }

    /// Sorted canonical image type names.
    pub fn list_image_types(&self) -> Vec<&str> {
        self.image_types.keys().map(String::as_str).collect()
    }

    /// Alias to canonical name, sorted by alias.
    pub fn aliases(&self) -> &BTreeMap<String, String> {
        &self.aliases
    }

    /// Look up by canonical name, then by alias.
    pub fn image_type(&self, name: &str) -> Result<&ImageType, RegistryError> {
        if let Some(it) = self.image_types.get(name) {
            return Ok(it);
        }
        let Some(target) = self.aliases.get(name) else {
            return Err(RegistryError::UnknownImageType {
                arch: self.name.clone(),
                image_type: name.to_owned(),
            });
        };
        Ok(self
            .image_types
            .get(target)
            .expect("alias targets are checked when the registry is built"))
    }

    fn check(&self) -> Result<(), CatalogError> {
        for (alias, target) in &self.aliases {
            if self.image_types.contains_key(alias) {
                return Err(CatalogError::AliasShadowsImageType {
                    alias: alias.clone(),
                });
            }
            if !self.image_types.contains_key(target) {
                return Err(CatalogError::DanglingAlias {
                    alias: alias.clone(),
                    target: target.clone(),
                });
            }
        }
        Ok(())
    }
}

fn check_image_type(it: &ImageType) -> Result<(), CatalogError> {
    if !it.package_sets.contains_key(BUILD_PKGS_KEY) {
        return Err(CatalogError::MissingBuildPackageSet {
            image_type: it.name.clone(),
        });
    }
    for (chain, sets) in &it.package_set_chains {
        for set in sets {
            let always_present = set == OS_PKGS_KEY || set == BLUEPRINT_PKGS_KEY;
            if !always_present && !it.package_sets.contains_key(set) {
                return Err(CatalogError::UndefinedChainSet {
                    image_type: it.name.clone(),
                    chain: chain.clone(),
                    set: set.clone(),
                });
            }
        }
    }
    Ok(())
}

/// The catalog of every supported distribution.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    distros: BTreeMap<String, Distribution>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Sorted distribution names.
    pub fn list_distros(&self) -> Vec<&str> {
        self.distros.keys().map(String::as_str).collect()
    }

    pub fn distro(&self, name: &str) -> Result<&Distribution, RegistryError> {
        self.distros
            .get(name)
            .ok_or_else(|| RegistryError::UnknownDistro(name.to_owned()))
    }

    pub fn resolve(
        &self,
        distro: &str,
        arch: &str,
        image_type: &str,
    ) -> Result<ImageTypeRef<'_>, RegistryError> {
        let distro = self.distro(distro)?;
        let arch = distro.arch(arch)?;
        let image_type = arch.image_type(image_type)?;
        Ok(ImageTypeRef {
            distro,
            arch,
            image_type,
        })
    }

    /// Every (distro, arch, canonical image type) triple, sorted.
    pub fn all_image_types(&self) -> Vec<ImageTypeRef<'_>> {
        let mut out = Vec::new();
        for distro in self.distros.values() {
            for arch in distro.arches.values() {
                for image_type in arch.image_types.values() {
                    out.push(ImageTypeRef {
                        distro,
                        arch,
                        image_type,
                    });
                }
            }
        }
        out
    }
}

#[derive(Debug, Default)]
pub struct RegistryBuilder {
    distros: BTreeMap<String, Distribution>,
}

impl RegistryBuilder {
    pub fn add_distro(mut self, distro: Distribution) -> Result<Self, CatalogError> {
        if self.distros.contains_key(&distro.name) {
            return Err(CatalogError::DuplicateDistro(distro.name));
        }
        self.distros.insert(distro.name.clone(), distro);
        Ok(self)
    }

    pub fn build(self) -> Result<Registry, CatalogError> {
        for distro in self.distros.values() {
            for arch in distro.arches.values() {
                arch.check()?;
            }
        }
        debug!("registry built with {} distributions", self.distros.len());
        Ok(Registry {
            distros: self.distros,
        })
    }
}
