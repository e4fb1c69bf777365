use super::{core_error, json_pretty, load_request, EXIT_SUCCESS};
use crate::RequestArgs;
use kiln_core::Composer;

/// Print the depsolve job for the request as JSON.
pub fn run(composer: &Composer, args: &RequestArgs) -> Result<u8, String> {
    let request = load_request(args)?;
    let job = composer.depsolve_job(&request).map_err(|e| core_error(&e))?;
    println!("{}", json_pretty(&job)?);
    Ok(EXIT_SUCCESS)
}
