use super::{core_error, load_request, write_build_request, EXIT_SUCCESS, INVALID_REQUEST};
use crate::RequestArgs;
use kiln_core::{Composer, CoreError};
use kiln_schema::parse_depsolve_result_file;
use std::path::Path;

/// Compile a manifest from an externally produced depsolve result.
pub fn run(
    composer: &Composer,
    args: &RequestArgs,
    depsolved: &Path,
    build_request: Option<&Path>,
) -> Result<u8, String> {
    let request = load_request(args)?;
    let result = parse_depsolve_result_file(depsolved).map_err(|e| {
        format!(
            "{INVALID_REQUEST} failed to load depsolve result {}: {e}",
            depsolved.display()
        )
    })?;

    let job = composer.depsolve_job(&request).map_err(|e| core_error(&e))?;
    let package_specs = result
        .into_package_specs(&job)
        .map_err(|e| core_error(&CoreError::from(e)))?;
    let composed = composer
        .compile(&request, &package_specs)
        .map_err(|e| core_error(&e))?;

    let json = composed
        .manifest
        .to_json()
        .map_err(|e| format!("JSON serialization failed: {e}"))?;
    println!("{json}");
    if let Some(path) = build_request {
        write_build_request(path, &composed.build_request)?;
    }
    Ok(EXIT_SUCCESS)
}
