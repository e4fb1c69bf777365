pub mod completions;
pub mod compose;
pub mod list;
pub mod man_pages;
pub mod manifest;
pub mod packages;

use crate::RequestArgs;
use kiln_core::{ComposeRequest, CoreError};
use kiln_schema::{parse_blueprint_file, parse_options_file, parse_repos_file, BuildRequest};
use std::path::Path;
use tracing::debug;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_REQUEST_ERROR: u8 = 2;
pub const EXIT_NOT_FOUND: u8 = 3;

/// Message prefix of errors caused by the blueprint, options or other
/// request input.
pub const INVALID_REQUEST: &str = "invalid request:";
/// Message prefix of unknown distribution, architecture or image type.
pub const NOT_FOUND: &str = "not found:";

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

/// Render a core error with the prefix that selects its exit code.
pub fn core_error(e: &CoreError) -> String {
    if e.is_not_found() {
        format!("{NOT_FOUND} {e}")
    } else if e.is_request_error() {
        format!("{INVALID_REQUEST} {e}")
    } else {
        e.to_string()
    }
}

pub fn load_request(args: &RequestArgs) -> Result<ComposeRequest, String> {
    let mut request = ComposeRequest::new(&args.distro, &args.arch, &args.image_type);
    request.seed = args.seed;
    if let Some(path) = &args.blueprint {
        request.blueprint = parse_blueprint_file(path).map_err(|e| {
            format!("{INVALID_REQUEST} failed to load blueprint {}: {e}", path.display())
        })?;
    }
    if let Some(path) = &args.options {
        request.options = parse_options_file(path).map_err(|e| {
            format!("{INVALID_REQUEST} failed to load options {}: {e}", path.display())
        })?;
    }
    if let Some(path) = &args.repos {
        request.repos = parse_repos_file(path).map_err(|e| {
            format!("{INVALID_REQUEST} failed to load repositories {}: {e}", path.display())
        })?;
    }
    debug!(
        "request {}/{}/{}: {} repositories, seed {}",
        request.distro,
        request.arch,
        request.image_type,
        request.repos.len(),
        request.seed
    );
    Ok(request)
}

pub fn write_build_request(path: &Path, build_request: &BuildRequest) -> Result<(), String> {
    let content = json_pretty(build_request)?;
    std::fs::write(path, content).map_err(|e| format!("failed to write {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_distro::RegistryError;

    #[test]
    fn json_pretty_serializes_object() {
        let val = serde_json::json!({"key": "value"});
        let result = json_pretty(&val).unwrap();
        assert!(result.contains("\"key\""));
        assert!(result.contains("\"value\""));
    }

    #[test]
    fn exit_codes_are_distinct() {
        assert_ne!(EXIT_SUCCESS, EXIT_FAILURE);
        assert_ne!(EXIT_FAILURE, EXIT_REQUEST_ERROR);
        assert_ne!(EXIT_REQUEST_ERROR, EXIT_NOT_FOUND);
    }

    #[test]
    fn lookup_errors_get_not_found_prefix() {
        let e = CoreError::Registry(RegistryError::UnknownDistro("nope".to_owned()));
        assert!(core_error(&e).starts_with(NOT_FOUND));
    }

    #[test]
    fn missing_blueprint_file_is_a_request_error() {
        let args = RequestArgs {
            distro: "rhel-87".to_owned(),
            arch: "x86_64".to_owned(),
            image_type: "qcow2".to_owned(),
            blueprint: Some("/nonexistent/blueprint.toml".into()),
            options: None,
            repos: None,
            seed: 0,
        };
        let err = load_request(&args).unwrap_err();
        assert!(err.starts_with(INVALID_REQUEST), "{err}");
    }
}
