//! config command - Show the resolved configuration

use anyhow::{Context as _, Result};

use crate::cli::Context;

/// Print the effective configuration as TOML, or just its location.
pub fn config(ctx: &Context, path_only: bool) -> Result<u8> {
    let config = ctx.load_config()?;

    if path_only {
        if let Some(path) = config.source_path() {
            println!("{}", path.display());
        }
        return Ok(0);
    }

    if let Some(path) = config.source_path() {
        println!("# {}", path.display());
    }
    print!(
        "{}",
        config.to_toml().context("failed to render configuration")?
    );
    Ok(0)
}
