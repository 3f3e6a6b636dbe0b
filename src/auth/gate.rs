//! Bearer-token gate run ahead of every protected operation.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use std::sync::Arc;
use uuid::Uuid;

use super::clock::Clock;
use super::error::GateError;
use super::models::Account;
use super::store::IdentityStore;
use super::token::TokenCodec;

/// Authenticated caller context attached to the request after the gate.
#[derive(Clone, Debug)]
pub struct Principal {
    pub account_id: Uuid,
    pub email: String,
    pub handle: String,
    pub avatar: Option<String>,
    pub verified: bool,
}

impl From<&Account> for Principal {
    fn from(account: &Account) -> Self {
        Self {
            account_id: account.id,
            email: account.email.clone(),
            handle: account.handle.clone(),
            avatar: account.avatar.clone(),
            verified: account.verified,
        }
    }
}

/// Resolves `Authorization: Bearer <token>` into a verified, active account.
///
/// Routine rejections are typed ([`GateError`]); only store I/O trips the
/// infrastructure variant.
pub struct RequestGate {
    store: Arc<dyn IdentityStore>,
    tokens: TokenCodec,
    clock: Arc<dyn Clock>,
}

impl RequestGate {
    #[must_use]
    pub fn new(store: Arc<dyn IdentityStore>, tokens: TokenCodec, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            tokens,
            clock,
        }
    }

    /// Authorize a request from its headers.
    ///
    /// # Errors
    /// `TokenRequired` when the bearer credential is absent or the scheme is
    /// not `Bearer`, otherwise as [`authorize_token`](Self::authorize_token).
    pub async fn authorize(&self, headers: &HeaderMap) -> Result<Principal, GateError> {
        let token = bearer_token(headers).ok_or(GateError::TokenRequired)?;
        self.authorize_token(&token).await
    }

    /// Authorize a raw token string (also used by the WebSocket upgrade,
    /// which may carry the token as a query parameter).
    ///
    /// # Errors
    /// `TokenRejected` for invalid or expired tokens, `AccountDisabled` when
    /// the token resolves to no account or one that is not verified+active.
    pub async fn authorize_token(&self, token: &str) -> Result<Principal, GateError> {
        let account_id = self
            .tokens
            .verify(token, self.clock.now())
            .map_err(|_| GateError::TokenRejected)?;

        let account = self
            .store
            .load_by_id(account_id)
            .await
            .map_err(GateError::Store)?;

        match account {
            Some(account) if account.verified && account.active => Ok(Principal::from(&account)),
            _ => Err(GateError::AccountDisabled),
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::clock::ManualClock;
    use crate::auth::store::MemoryStore;
    use anyhow::Result;
    use axum::http::HeaderValue;
    use chrono::{Duration, Utc};
    use secrecy::SecretString;

    struct Fixture {
        gate: RequestGate,
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        tokens: TokenCodec,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let tokens = TokenCodec::new(&SecretString::from("gate-test-secret"), Duration::days(7));
        let gate = RequestGate::new(store.clone(), tokens.clone(), clock.clone());
        Fixture {
            gate,
            store,
            clock,
            tokens,
        }
    }

    async fn seed_verified(store: &MemoryStore, email: &str, handle: &str) -> Result<Account> {
        let mut account = Account::new(email.to_string());
        account.handle = handle.to_string();
        account.verified = true;
        store.save(&account).await
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).expect("header"),
        );
        headers
    }

    #[tokio::test]
    async fn missing_or_malformed_header_requires_token() {
        let f = fixture();
        let missing = f.gate.authorize(&HeaderMap::new()).await;
        assert!(matches!(missing, Err(GateError::TokenRequired)));

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Token abc"));
        let wrong_scheme = f.gate.authorize(&headers).await;
        assert!(matches!(wrong_scheme, Err(GateError::TokenRequired)));
    }

    #[tokio::test]
    async fn garbage_and_tampered_tokens_are_rejected() -> Result<()> {
        let f = fixture();
        let account = seed_verified(&f.store, "alice@pec.edu.in", "BraveFox42").await?;

        let garbage = f.gate.authorize(&bearer("not.a.token")).await;
        assert!(matches!(garbage, Err(GateError::TokenRejected)));

        let token = f.tokens.issue(account.id, f.clock.now())?;
        let mut bytes = token.clone().into_bytes();
        let middle = bytes.len() / 2;
        bytes[middle] = if bytes[middle] == b'x' { b'y' } else { b'x' };
        let tampered = String::from_utf8(bytes)?;
        let rejected = f.gate.authorize(&bearer(&tampered)).await;
        assert!(matches!(rejected, Err(GateError::TokenRejected)));
        Ok(())
    }

    #[tokio::test]
    async fn expired_token_is_rejected() -> Result<()> {
        let f = fixture();
        let account = seed_verified(&f.store, "alice@pec.edu.in", "BraveFox42").await?;
        let token = f.tokens.issue(account.id, f.clock.now())?;

        f.clock.advance(Duration::days(7));
        let expired = f.gate.authorize(&bearer(&token)).await;
        assert!(matches!(expired, Err(GateError::TokenRejected)));
        Ok(())
    }

    #[tokio::test]
    async fn disabled_or_unverified_accounts_are_refused() -> Result<()> {
        let f = fixture();

        // Token for an account the store has never seen.
        let stranger = f.tokens.issue(Uuid::new_v4(), f.clock.now())?;
        let unknown = f.gate.authorize(&bearer(&stranger)).await;
        assert!(matches!(unknown, Err(GateError::AccountDisabled)));

        let account = seed_verified(&f.store, "alice@pec.edu.in", "BraveFox42").await?;
        f.store.set_active("alice@pec.edu.in", false)?;
        let token = f.tokens.issue(account.id, f.clock.now())?;
        let inactive = f.gate.authorize(&bearer(&token)).await;
        assert!(matches!(inactive, Err(GateError::AccountDisabled)));

        let mut bob = Account::new("bob@pec.edu.in".to_string());
        bob.pending = None;
        let bob = f.store.save(&bob).await?;
        let token = f.tokens.issue(bob.id, f.clock.now())?;
        let unverified = f.gate.authorize(&bearer(&token)).await;
        assert!(matches!(unverified, Err(GateError::AccountDisabled)));
        Ok(())
    }

    #[tokio::test]
    async fn valid_token_yields_the_principal() -> Result<()> {
        let f = fixture();
        let account = seed_verified(&f.store, "alice@pec.edu.in", "BraveFox42").await?;
        let token = f.tokens.issue(account.id, f.clock.now())?;

        let principal = f.gate.authorize(&bearer(&token)).await?;
        assert_eq!(principal.account_id, account.id);
        assert_eq!(principal.handle, "BraveFox42");
        assert_eq!(principal.email, "alice@pec.edu.in");
        assert!(principal.verified);
        Ok(())
    }
}
