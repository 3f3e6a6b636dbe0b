//! Command-line argument dispatch and server initialization.
//!
//! This module maps validated CLI arguments to the appropriate action, such
//! as starting the API server with its full configuration state.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{auth, mail};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let auth_opts = auth::Options::parse(matches)?;
    let smtp = mail::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        jwt_secret: auth_opts.jwt_secret,
        domain_suffix: auth_opts.domain_suffix,
        code_ttl_seconds: auth_opts.code_ttl_seconds,
        token_ttl_seconds: auth_opts.token_ttl_seconds,
        smtp,
        frontend_origin: auth_opts.frontend_origin,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn handler_builds_server_args() {
        temp_env::with_vars(
            [
                ("FLUSTRI_DSN", Some("postgres://localhost:5432/flustri")),
                ("JWT_SECRET", Some("dispatch-secret")),
                ("CODE_TTL_SECONDS", Some("300")),
            ],
            || {
                let command = crate::cli::commands::new();
                let matches = command.get_matches_from(vec!["flustri"]);
                let action = handler(&matches).expect("action");
                let Action::Server(args) = action;
                assert_eq!(args.port, 8080);
                assert_eq!(args.dsn, "postgres://localhost:5432/flustri");
                assert_eq!(args.jwt_secret.expose_secret(), "dispatch-secret");
                assert_eq!(args.code_ttl_seconds, 300);
                assert_eq!(args.token_ttl_seconds, 604_800);
                assert!(args.smtp.is_none());
            },
        );
    }
}
