use crate::{
    api,
    auth::{AuthConfig, SmtpConfig},
};
use anyhow::Result;
use secrecy::SecretString;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub jwt_secret: SecretString,
    pub domain_suffix: String,
    pub code_ttl_seconds: i64,
    pub token_ttl_seconds: i64,
    pub smtp: Option<SmtpConfig>,
    pub frontend_origin: String,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the server fails to start or stops with a failure.
pub async fn execute(args: Args) -> Result<()> {
    let auth_config = AuthConfig::new()
        .with_domain_suffix(args.domain_suffix)
        .with_code_ttl_seconds(args.code_ttl_seconds);

    let server_config = api::ServerConfig {
        jwt_secret: args.jwt_secret,
        token_ttl_seconds: args.token_ttl_seconds,
        auth: auth_config,
        smtp: args.smtp,
        frontend_origin: args.frontend_origin,
    };

    api::new(args.port, args.dsn, server_config).await
}
