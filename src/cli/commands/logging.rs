//! Verbosity flag shared by every invocation: repeated `-v` or a named
//! level via `FLUSTRI_LOG_LEVEL`.

use clap::{builder::ValueParser, Arg, ArgAction, Command};
use tracing::Level;

pub const ARG_VERBOSITY: &str = "verbosity";

/// Translate the counted flag into a tracing level; zero keeps ERROR only.
#[must_use]
pub const fn level_for(count: u8) -> Option<Level> {
    match count {
        0 => None,
        1 => Some(Level::WARN),
        2 => Some(Level::INFO),
        3 => Some(Level::DEBUG),
        _ => Some(Level::TRACE),
    }
}

fn parse_level() -> ValueParser {
    ValueParser::from(|value: &str| -> Result<u8, String> {
        match value.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            other => other
                .parse::<u8>()
                .ok()
                .filter(|count| *count <= 5)
                .ok_or_else(|| format!("invalid log level: {value}")),
        }
    })
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
            .env("FLUSTRI_LOG_LEVEL")
            .global(true)
            .action(ArgAction::Count)
            .value_parser(parse_level()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_map_to_levels() {
        assert_eq!(level_for(0), None);
        assert_eq!(level_for(1), Some(Level::WARN));
        assert_eq!(level_for(2), Some(Level::INFO));
        assert_eq!(level_for(3), Some(Level::DEBUG));
        assert_eq!(level_for(4), Some(Level::TRACE));
        assert_eq!(level_for(9), Some(Level::TRACE));
    }
}
