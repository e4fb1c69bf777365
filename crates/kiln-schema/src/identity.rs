use crate::manifest::{Manifest, Pipeline};
use crate::types::{ManifestId, PipelineId, ShortId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Deterministic identity of a compiled manifest.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ManifestIdentity {
    pub manifest_id: ManifestId,
    pub short_id: ShortId,
}

/// Description of a build, produced next to its manifest and used by
/// external tooling to cache and deduplicate build results.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildRequest {
    pub distro: String,
    pub arch: String,
    pub image_type: String,
    pub blueprint: String,
    pub manifest_checksum: ManifestId,
}

/// Compute the identity of every pipeline, in manifest order.
///
/// A pipeline's identity chains its name, the identity of its build root
/// (when that pipeline precedes it), its runner, and each stage in order.
/// Stage inputs naming an earlier pipeline are hashed with that pipeline's
/// identity, so changing any stage changes the identity of every pipeline
/// that builds on it or consumes its output.
pub fn pipeline_ids(manifest: &Manifest) -> Result<BTreeMap<String, PipelineId>, serde_json::Error> {
    let mut ids = BTreeMap::new();
    for pipeline in &manifest.pipelines {
        let id = pipeline_id(pipeline, &ids)?;
        ids.insert(pipeline.name.clone(), id);
    }
    Ok(ids)
}

fn pipeline_id(
    pipeline: &Pipeline,
    known: &BTreeMap<String, PipelineId>,
) -> Result<PipelineId, serde_json::Error> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(format!("pipeline:{}", pipeline.name).as_bytes());
    if let Some(build) = pipeline.build_name() {
        match known.get(build) {
            Some(id) => hasher.update(format!("build:{id}").as_bytes()),
            None => hasher.update(format!("build-ref:{build}").as_bytes()),
        };
    }
    if let Some(runner) = &pipeline.runner {
        hasher.update(format!("runner:{runner}").as_bytes());
    }
    let mut current = hasher.finalize();

    for stage in &pipeline.stages {
        let mut value = serde_json::to_value(stage)?;
        resolve_references(&mut value, known);
        let mut hasher = blake3::Hasher::new();
        hasher.update(current.as_bytes());
        hasher.update(serde_json::to_string(&value)?.as_bytes());
        current = hasher.finalize();
    }
    Ok(PipelineId::from_digest(&current))
}

/// Replace `name:<pipeline>` references with the identity of that pipeline,
/// so a stage consuming another pipeline's output changes with it.
fn resolve_references(value: &mut Value, known: &BTreeMap<String, PipelineId>) {
    match value {
        Value::String(s) => {
            if let Some(id) = referenced_id(s, known) {
                *s = id;
            }
        }
        Value::Array(items) => {
            for item in items {
                resolve_references(item, known);
            }
        }
        Value::Object(map) => {
            let entries = std::mem::take(map);
            for (key, mut item) in entries {
                resolve_references(&mut item, known);
                let key = referenced_id(&key, known).unwrap_or(key);
                map.insert(key, item);
            }
        }
        _ => {}
    }
}

fn referenced_id(s: &str, known: &BTreeMap<String, PipelineId>) -> Option<String> {
    let name = s.strip_prefix("name:")?;
    known.get(name).map(|id| format!("id:{id}"))
}

/// Identity of the manifest: the identity of its last pipeline.
pub fn compute_manifest_id(manifest: &Manifest) -> Result<ManifestIdentity, serde_json::Error> {
    let ids = pipeline_ids(manifest)?;
    let manifest_id = match manifest.pipelines.last().and_then(|p| ids.get(&p.name)) {
        Some(id) => ManifestId::from(id.clone()),
        None => ManifestId::from_digest(&blake3::hash(
            format!("manifest:{}:empty", manifest.version).as_bytes(),
        )),
    };

    Ok(ManifestIdentity {
        short_id: manifest_id.short(),
        manifest_id,
    })
}
