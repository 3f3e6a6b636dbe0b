//! CLI entry: parse arguments, bring up telemetry, hand back the action.

use crate::cli::{actions::Action, commands, commands::logging, dispatch, telemetry};
use anyhow::Result;

/// Parse the command line, initialize logging/tracing, and build the action
/// the binary should execute.
///
/// # Errors
/// Returns an error when telemetry setup or argument dispatch fails;
/// argument errors exit through clap before this returns.
pub fn start() -> Result<Action> {
    let matches = commands::new().get_matches();

    let verbosity = matches
        .get_one::<u8>(logging::ARG_VERBOSITY)
        .copied()
        .unwrap_or_default();
    telemetry::init(logging::level_for(verbosity))?;

    dispatch::handler(&matches)
}
