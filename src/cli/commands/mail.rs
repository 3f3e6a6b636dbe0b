//! SMTP arguments; without a host the server logs codes instead of mailing.

use anyhow::{bail, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

use crate::auth::SmtpConfig;

pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("smtp-host")
                .long("smtp-host")
                .help("SMTP relay host; omit to log codes instead of mailing")
                .env("SMTP_HOST"),
        )
        .arg(
            Arg::new("smtp-user")
                .long("smtp-user")
                .help("SMTP username")
                .env("EMAIL_USER"),
        )
        .arg(
            Arg::new("smtp-pass")
                .long("smtp-pass")
                .help("SMTP password")
                .env("EMAIL_PASS"),
        )
        .arg(
            Arg::new("mail-from")
                .long("mail-from")
                .help("Sender address; defaults to the SMTP username")
                .env("MAIL_FROM"),
        )
}

/// Resolve the optional SMTP configuration.
///
/// # Errors
/// Returns an error when a host is given without credentials.
pub fn parse(matches: &ArgMatches) -> Result<Option<SmtpConfig>> {
    let Some(host) = matches.get_one::<String>("smtp-host").cloned() else {
        return Ok(None);
    };

    let username = matches.get_one::<String>("smtp-user").cloned();
    let password = matches.get_one::<String>("smtp-pass").cloned();
    let (Some(username), Some(password)) = (username, password) else {
        bail!("--smtp-user and --smtp-pass are required when --smtp-host is set");
    };

    let from = matches
        .get_one::<String>("mail-from")
        .cloned()
        .unwrap_or_else(|| username.clone());

    Ok(Some(SmtpConfig {
        host,
        username,
        password: SecretString::from(password),
        from,
    }))
}
