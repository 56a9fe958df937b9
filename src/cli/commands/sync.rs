//! sync command - Synchronize one push event by hand

use anyhow::Result;

use crate::cli::commands::describe;
use crate::cli::Context;
use crate::core::types::Oid;
use crate::sync::notify::FanoutNotifier;
use crate::sync::Coordinator;

/// Synchronize `source`'s push of `refname` to `new`.
///
/// This is the operator's retry path after a failed hook run; it goes
/// through the same filter, lock and compare-and-swap as the hook.
pub fn sync(
    ctx: &Context,
    source: &str,
    refname: &str,
    new: &str,
    old: Option<&str>,
) -> Result<u8> {
    let config = ctx.load_config()?;
    let coordinator =
        Coordinator::from_config(&config, Box::new(FanoutNotifier::from_config(&config)))?;

    let zero = Oid::zero();
    let old = old.unwrap_or(zero.as_str());
    let result = coordinator.handle_event(old, new, refname, source);

    let code = match &result {
        Ok(_) => 0,
        Err(e) => e.exit_code(),
    };
    if code == 0 {
        if !ctx.quiet {
            println!("{}", describe(&result));
        }
    } else {
        eprintln!("{}", describe(&result));
    }

    Ok(code)
}
