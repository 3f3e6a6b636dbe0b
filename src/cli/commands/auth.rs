//! Auth-core arguments: signing secret, domain gate, and lifetimes.

use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("jwt-secret")
                .long("jwt-secret")
                .help("Secret used to sign bearer tokens")
                .env("JWT_SECRET")
                .required(true),
        )
        .arg(
            Arg::new("email-domain-suffix")
                .long("email-domain-suffix")
                .help("Email-address tail that gates enrollment")
                .env("EMAIL_DOMAIN_SUFFIX")
                .default_value("@pec.edu.in"),
        )
        .arg(
            Arg::new("code-ttl-seconds")
                .long("code-ttl-seconds")
                .help("One-time-code lifetime in seconds")
                .env("CODE_TTL_SECONDS")
                .default_value("600")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("token-ttl-seconds")
                .long("token-ttl-seconds")
                .help("Bearer-token lifetime in seconds")
                .env("TOKEN_TTL_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("frontend-origin")
                .long("frontend-origin")
                .help("Frontend origin allowed by CORS")
                .env("FLUSTRI_FRONTEND_ORIGIN")
                .default_value("http://localhost:3000"),
        )
}

#[derive(Debug)]
pub struct Options {
    pub jwt_secret: SecretString,
    pub domain_suffix: String,
    pub code_ttl_seconds: i64,
    pub token_ttl_seconds: i64,
    pub frontend_origin: String,
}

impl Options {
    /// Extract the parsed auth options.
    ///
    /// # Errors
    /// Returns an error when a required argument is missing, which clap only
    /// allows for programmatic `ArgMatches`.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let jwt_secret = matches
            .get_one::<String>("jwt-secret")
            .cloned()
            .context("missing required argument: --jwt-secret")?;
        let domain_suffix = matches
            .get_one::<String>("email-domain-suffix")
            .cloned()
            .context("missing required argument: --email-domain-suffix")?;
        let code_ttl_seconds = matches
            .get_one::<i64>("code-ttl-seconds")
            .copied()
            .unwrap_or(600);
        let token_ttl_seconds = matches
            .get_one::<i64>("token-ttl-seconds")
            .copied()
            .unwrap_or(604_800);
        let frontend_origin = matches
            .get_one::<String>("frontend-origin")
            .cloned()
            .context("missing required argument: --frontend-origin")?;

        Ok(Self {
            jwt_secret: SecretString::from(jwt_secret),
            domain_suffix,
            code_ttl_seconds,
            token_ttl_seconds,
            frontend_origin,
        })
    }
}
