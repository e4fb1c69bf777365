use super::{core_error, json_pretty, load_request, write_build_request, EXIT_SUCCESS};
use crate::RequestArgs;
use kiln_core::{Composer, MockDepsolver};
use std::path::Path;

pub fn run(
    composer: &Composer,
    args: &RequestArgs,
    mock_depsolve: bool,
    build_request: Option<&Path>,
    json: bool,
) -> Result<u8, String> {
    if !mock_depsolve {
        return Err(
            "no depsolver available: pass --mock-depsolve, or run `kiln packages` and \
             `kiln manifest --depsolved`"
                .to_owned(),
        );
    }
    let request = load_request(args)?;
    let composed = composer
        .compose(&request, &MockDepsolver::new())
        .map_err(|e| core_error(&e))?;

    if json {
        println!("{}", json_pretty(&composed)?);
    } else {
        let manifest = composed
            .manifest
            .to_json()
            .map_err(|e| format!("JSON serialization failed: {e}"))?;
        println!("{manifest}");
    }
    if let Some(path) = build_request {
        write_build_request(path, &composed.build_request)?;
    }
    Ok(EXIT_SUCCESS)
}
