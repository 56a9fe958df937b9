//! check command - Dry-run the eligibility filter

use anyhow::Result;

use crate::cli::Context;
use crate::sync::EligibilityFilter;

/// Print whether pushes of `refname` from `source` would be synchronized,
/// and where. Reads only the configuration.
pub fn check(ctx: &Context, source: &str, refname: &str) -> Result<u8> {
    let config = ctx.load_config()?;
    let filter = EligibilityFilter::from_config(&config)?;

    match filter.route(refname, source) {
        Ok(route) => println!(
            "eligible: {} {} -> {}:{}",
            route.source, route.branch, route.target_branch, route.submodule_path
        ),
        Err(rejection) => println!("not eligible: {}", rejection),
    }

    Ok(0)
}
