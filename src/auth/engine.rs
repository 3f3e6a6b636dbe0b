//! The auth state machine: enrollment, login, code redemption, token issuance.
//!
//! The engine owns no I/O of its own; it orchestrates the identity store, the
//! code generator, the mailer, the clock, and the token codec through narrow
//! traits so every collaborator can be swapped for a fake in tests.
//!
//! Within one operation the clock is read once and that instant is used both
//! to stamp new expirations and to compare old ones. For issuance the order
//! is read, mutate, save, mail: the pending code is durable before the mail
//! leaves, so a delivered code can never refer to uncommitted state. A failed
//! mail send is surfaced to the caller but the saved code stays redeemable,
//! which makes an immediate retry of the same request cheap.

use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::debug;

use super::clock::Clock;
use super::error::AuthError;
use super::mailer::{render_code_email, Mailer};
use super::models::{Account, PendingCode, HANDLE_MAX_CHARS};
use super::otp::{self, CodeGenerator};
use super::store::IdentityStore;
use super::token::TokenCodec;

const MAIL_SUBJECT: &str = "Flustri - Email Verification";

const DEFAULT_DOMAIN_SUFFIX: &str = "@pec.edu.in";
const DEFAULT_CODE_TTL_SECONDS: i64 = 600;

/// Engine settings; the token TTL lives in the codec.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    domain_suffix: String,
    code_ttl_seconds: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            domain_suffix: DEFAULT_DOMAIN_SUFFIX.to_string(),
            code_ttl_seconds: DEFAULT_CODE_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_domain_suffix(mut self, suffix: String) -> Self {
        self.domain_suffix = suffix.to_lowercase();
        self
    }

    #[must_use]
    pub fn with_code_ttl_seconds(mut self, seconds: i64) -> Self {
        self.code_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn domain_suffix(&self) -> &str {
        &self.domain_suffix
    }

    #[must_use]
    pub fn code_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.code_ttl_seconds)
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Success payload of the two code-request operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodeSent {
    pub email: String,
}

/// Success payload of the two redemption operations.
#[derive(Clone, Debug)]
pub struct Authenticated {
    pub token: String,
    pub account: Account,
}

pub struct AuthEngine {
    store: Arc<dyn IdentityStore>,
    mailer: Arc<dyn Mailer>,
    codes: Arc<dyn CodeGenerator>,
    clock: Arc<dyn Clock>,
    tokens: TokenCodec,
    config: AuthConfig,
}

impl AuthEngine {
    #[must_use]
    pub fn new(
        store: Arc<dyn IdentityStore>,
        mailer: Arc<dyn Mailer>,
        codes: Arc<dyn CodeGenerator>,
        clock: Arc<dyn Clock>,
        tokens: TokenCodec,
        config: AuthConfig,
    ) -> Self {
        Self {
            store,
            mailer,
            codes,
            clock,
            tokens,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Start (or restart) enrollment for `email`.
    ///
    /// Creates the account on first contact, parks a fresh code on it, and
    /// mails the digits. A repeated request always replaces any prior code.
    ///
    /// # Errors
    /// `DomainNotAllowed` for foreign addresses, `MailDeliveryFailed` when the
    /// mail could not be dispatched (the stored code survives for a retry).
    pub async fn request_enrollment_code(&self, email: &str) -> Result<CodeSent, AuthError> {
        let email = normalize_email(email);
        if !email.ends_with(self.config.domain_suffix()) {
            return Err(AuthError::DomainNotAllowed);
        }

        let now = self.clock.now();
        let account = self
            .store
            .load_by_email(&email)
            .await
            .map_err(AuthError::Store)?
            .unwrap_or_else(|| Account::new(email));

        self.park_code_and_mail(account, now).await
    }

    /// Redeem an enrollment code, assigning the anonymous handle on first
    /// verification, and issue a bearer token.
    ///
    /// # Errors
    /// See [`AuthError`]; a `HandleTaken` rejection leaves the pending code in
    /// place so the caller can retry with a different name.
    pub async fn verify_enrollment_code(
        &self,
        email: &str,
        code: &str,
        handle: Option<&str>,
    ) -> Result<Authenticated, AuthError> {
        let email = normalize_email(email);
        let now = self.clock.now();
        let mut account = self
            .store
            .load_by_email(&email)
            .await
            .map_err(AuthError::Store)?
            .ok_or(AuthError::UnknownAccount)?;

        check_code(&account, code, now)?;

        let handle = handle.map(str::trim).filter(|h| !h.is_empty());
        if !account.verified && handle.is_none() {
            return Err(AuthError::HandleRequired);
        }

        if let Some(handle) = handle {
            // Re-submitting the current handle is a no-op; the uniqueness
            // query excludes the requesting account either way.
            if handle != account.handle {
                if handle.chars().count() > HANDLE_MAX_CHARS {
                    return Err(AuthError::InvalidHandle);
                }
                if self
                    .store
                    .handle_taken(handle, account.id)
                    .await
                    .map_err(AuthError::Store)?
                {
                    return Err(AuthError::HandleTaken);
                }
                account.handle = handle.to_string();
            }
        }

        account.verified = true;
        account.pending = None;
        let account = self.store.save(&account).await.map_err(AuthError::Store)?;
        debug!(email = %account.email, "enrollment verified");

        let token = self
            .tokens
            .issue(account.id, now)
            .map_err(AuthError::Store)?;
        Ok(Authenticated { token, account })
    }

    /// Park a login code on an existing verified account and mail it.
    ///
    /// # Errors
    /// `UnknownAccount` unless the account exists and is verified; mail
    /// failures behave as in enrollment.
    pub async fn request_login_code(&self, email: &str) -> Result<CodeSent, AuthError> {
        let email = normalize_email(email);
        let now = self.clock.now();
        let account = self
            .store
            .load_by_email(&email)
            .await
            .map_err(AuthError::Store)?
            .filter(|account| account.verified)
            .ok_or(AuthError::UnknownAccount)?;

        self.park_code_and_mail(account, now).await
    }

    /// Redeem a login code and issue a bearer token.
    ///
    /// # Errors
    /// `UnknownAccount` unless the account exists and is verified; code
    /// checks match enrollment redemption.
    pub async fn verify_login_code(
        &self,
        email: &str,
        code: &str,
    ) -> Result<Authenticated, AuthError> {
        let email = normalize_email(email);
        let now = self.clock.now();
        let mut account = self
            .store
            .load_by_email(&email)
            .await
            .map_err(AuthError::Store)?
            .filter(|account| account.verified)
            .ok_or(AuthError::UnknownAccount)?;

        check_code(&account, code, now)?;

        account.pending = None;
        let account = self.store.save(&account).await.map_err(AuthError::Store)?;
        debug!(email = %account.email, "login verified");

        let token = self
            .tokens
            .issue(account.id, now)
            .map_err(AuthError::Store)?;
        Ok(Authenticated { token, account })
    }

    /// Generate a code, persist it on the account, then dispatch the mail.
    ///
    /// The save commits before the send so a mail that arrives can always be
    /// validated against durable state; a failed send keeps the code parked.
    async fn park_code_and_mail(
        &self,
        mut account: Account,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<CodeSent, AuthError> {
        let code = self
            .codes
            .next(now)
            .map_err(|e| AuthError::Store(e.context("code generation failed")))?;
        account.pending = Some(PendingCode {
            code: code.clone(),
            expires_at: now + self.config.code_ttl(),
        });

        let account = self.store.save(&account).await.map_err(AuthError::Store)?;

        let body = render_code_email(&code, self.config.code_ttl().num_minutes());
        self.mailer
            .send(&account.email, MAIL_SUBJECT, &body)
            .await
            .map_err(AuthError::MailDeliveryFailed)?;

        Ok(CodeSent {
            email: account.email,
        })
    }
}

/// Normalize an email for lookup and storage.
fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validate a submitted code against the account's pending code.
///
/// Mismatch is reported before expiry; the digit comparison is constant-time.
fn check_code(account: &Account, submitted: &str, now: chrono::DateTime<chrono::Utc>) -> Result<(), AuthError> {
    let Some(pending) = &account.pending else {
        return Err(AuthError::InvalidCode);
    };
    if !otp::well_formed(submitted) {
        return Err(AuthError::InvalidCode);
    }
    let matches: bool = submitted
        .as_bytes()
        .ct_eq(pending.code.as_bytes())
        .into();
    if !matches {
        return Err(AuthError::InvalidCode);
    }
    if now >= pending.expires_at {
        return Err(AuthError::CodeExpired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::clock::ManualClock;
    use crate::auth::store::MemoryStore;
    use anyhow::Result;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use secrecy::SecretString;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Deterministic code source: 000001, 000002, ...
    struct SequentialCodes {
        counter: Mutex<u32>,
    }

    impl SequentialCodes {
        fn new() -> Self {
            Self {
                counter: Mutex::new(0),
            }
        }
    }

    impl CodeGenerator for SequentialCodes {
        fn next(&self, _now: DateTime<Utc>) -> Result<String> {
            let mut counter = self.counter.lock().expect("counter");
            *counter += 1;
            Ok(format!("{counter:06}"))
        }
    }

    /// Mailer that records every send and can be told to fail.
    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<(String, String, String)>>,
        fail: AtomicBool,
    }

    impl RecordingMailer {
        fn sent_count(&self) -> usize {
            self.sent.lock().expect("sent").len()
        }

        fn last_body(&self) -> Option<String> {
            self.sent
                .lock()
                .expect("sent")
                .last()
                .map(|(_, _, body)| body.clone())
        }
    }

    #[async_trait::async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, to: &str, subject: &str, body_html: &str) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("smtp unreachable");
            }
            self.sent.lock().expect("sent").push((
                to.to_string(),
                subject.to_string(),
                body_html.to_string(),
            ));
            Ok(())
        }
    }

    struct Harness {
        engine: AuthEngine,
        store: Arc<MemoryStore>,
        mailer: Arc<RecordingMailer>,
        clock: Arc<ManualClock>,
        tokens: TokenCodec,
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 1, 12, 0, 0).single().expect("t0")
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(RecordingMailer::default());
        let clock = Arc::new(ManualClock::new(t0()));
        let tokens = TokenCodec::new(&SecretString::from("engine-test-secret"), Duration::days(7));
        let engine = AuthEngine::new(
            store.clone(),
            mailer.clone(),
            Arc::new(SequentialCodes::new()),
            clock.clone(),
            tokens.clone(),
            AuthConfig::new(),
        );
        Harness {
            engine,
            store,
            mailer,
            clock,
            tokens,
        }
    }

    /// Pull the code that was parked on the stored account.
    async fn stored_code(store: &MemoryStore, email: &str) -> String {
        store
            .load_by_email(email)
            .await
            .expect("load")
            .and_then(|a| a.pending)
            .map(|p| p.code)
            .expect("pending code")
    }

    #[tokio::test]
    async fn foreign_domain_is_rejected_without_a_row() -> Result<()> {
        let h = harness();
        let result = h.engine.request_enrollment_code("user@other.edu").await;
        assert!(matches!(result, Err(AuthError::DomainNotAllowed)));
        assert!(h.store.load_by_email("user@other.edu").await?.is_none());
        assert_eq!(h.mailer.sent_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn enrollment_round_trip_assigns_handle_and_token() -> Result<()> {
        let h = harness();
        let sent = h.engine.request_enrollment_code("alice@pec.edu.in").await?;
        assert_eq!(sent.email, "alice@pec.edu.in");
        assert_eq!(h.mailer.sent_count(), 1);

        let code = stored_code(&h.store, "alice@pec.edu.in").await;
        assert!(h.mailer.last_body().is_some_and(|body| body.contains(&code)));

        h.clock.advance(Duration::minutes(5));
        let auth = h
            .engine
            .verify_enrollment_code("alice@pec.edu.in", &code, Some("BraveFox42"))
            .await?;

        assert_eq!(auth.account.handle, "BraveFox42");
        assert!(auth.account.verified);
        assert!(auth.account.pending.is_none());
        assert_eq!(
            h.tokens.verify(&auth.token, h.clock.now()),
            Ok(auth.account.id)
        );
        Ok(())
    }

    #[tokio::test]
    async fn code_expires_strictly_at_ttl() -> Result<()> {
        let h = harness();
        h.engine.request_enrollment_code("alice@pec.edu.in").await?;
        let code = stored_code(&h.store, "alice@pec.edu.in").await;

        // Exactly at the expiry instant the code is already dead.
        h.clock.advance(Duration::minutes(10));
        let at_expiry = h
            .engine
            .verify_enrollment_code("alice@pec.edu.in", &code, Some("BraveFox42"))
            .await;
        assert!(matches!(at_expiry, Err(AuthError::CodeExpired)));

        h.clock.advance(Duration::seconds(1));
        let past_expiry = h
            .engine
            .verify_enrollment_code("alice@pec.edu.in", &code, Some("BraveFox42"))
            .await;
        assert!(matches!(past_expiry, Err(AuthError::CodeExpired)));

        let account = h.store.load_by_email("alice@pec.edu.in").await?.expect("row");
        assert!(!account.verified);
        Ok(())
    }

    #[tokio::test]
    async fn first_verification_requires_a_handle() -> Result<()> {
        let h = harness();
        h.engine.request_enrollment_code("alice@pec.edu.in").await?;
        let code = stored_code(&h.store, "alice@pec.edu.in").await;

        let missing = h
            .engine
            .verify_enrollment_code("alice@pec.edu.in", &code, None)
            .await;
        assert!(matches!(missing, Err(AuthError::HandleRequired)));

        let blank = h
            .engine
            .verify_enrollment_code("alice@pec.edu.in", &code, Some("   "))
            .await;
        assert!(matches!(blank, Err(AuthError::HandleRequired)));
        Ok(())
    }

    #[tokio::test]
    async fn taken_handle_rejects_and_keeps_pending_code() -> Result<()> {
        let h = harness();

        h.engine.request_enrollment_code("alice@pec.edu.in").await?;
        let alice_code = stored_code(&h.store, "alice@pec.edu.in").await;
        h.engine
            .verify_enrollment_code("alice@pec.edu.in", &alice_code, Some("BraveFox42"))
            .await?;

        h.engine.request_enrollment_code("bob@pec.edu.in").await?;
        let bob_code = stored_code(&h.store, "bob@pec.edu.in").await;
        let collision = h
            .engine
            .verify_enrollment_code("bob@pec.edu.in", &bob_code, Some("BraveFox42"))
            .await;
        assert!(matches!(collision, Err(AuthError::HandleTaken)));

        // Bob stays unverified with the code intact so he can retry.
        let bob = h.store.load_by_email("bob@pec.edu.in").await?.expect("row");
        assert!(!bob.verified);
        assert!(bob.pending.is_some());

        let retry = h
            .engine
            .verify_enrollment_code("bob@pec.edu.in", &bob_code, Some("QuickHawk7"))
            .await?;
        assert_eq!(retry.account.handle, "QuickHawk7");
        Ok(())
    }

    #[tokio::test]
    async fn handle_length_boundary() -> Result<()> {
        let h = harness();
        h.engine.request_enrollment_code("alice@pec.edu.in").await?;
        let code = stored_code(&h.store, "alice@pec.edu.in").await;

        let too_long = "a".repeat(21);
        let rejected = h
            .engine
            .verify_enrollment_code("alice@pec.edu.in", &code, Some(&too_long))
            .await;
        assert!(matches!(rejected, Err(AuthError::InvalidHandle)));

        let exactly = "a".repeat(20);
        let accepted = h
            .engine
            .verify_enrollment_code("alice@pec.edu.in", &code, Some(&exactly))
            .await?;
        assert_eq!(accepted.account.handle.len(), 20);
        Ok(())
    }

    #[tokio::test]
    async fn resubmitting_the_current_handle_is_a_noop() -> Result<()> {
        let h = harness();
        h.engine.request_enrollment_code("alice@pec.edu.in").await?;
        let code = stored_code(&h.store, "alice@pec.edu.in").await;
        h.engine
            .verify_enrollment_code("alice@pec.edu.in", &code, Some("BraveFox42"))
            .await?;

        // Second enrollment pass with the same handle must not collide with
        // the account itself.
        h.engine.request_enrollment_code("alice@pec.edu.in").await?;
        let code = stored_code(&h.store, "alice@pec.edu.in").await;
        let again = h
            .engine
            .verify_enrollment_code("alice@pec.edu.in", &code, Some("BraveFox42"))
            .await?;
        assert_eq!(again.account.handle, "BraveFox42");
        Ok(())
    }

    #[tokio::test]
    async fn login_requires_a_verified_account() -> Result<()> {
        let h = harness();
        let unknown = h.engine.request_login_code("ghost@pec.edu.in").await;
        assert!(matches!(unknown, Err(AuthError::UnknownAccount)));

        h.engine.request_enrollment_code("alice@pec.edu.in").await?;
        let unverified = h.engine.request_login_code("alice@pec.edu.in").await;
        assert!(matches!(unverified, Err(AuthError::UnknownAccount)));
        Ok(())
    }

    #[tokio::test]
    async fn login_round_trip_clears_pending_and_issues_token() -> Result<()> {
        let h = harness();
        h.engine.request_enrollment_code("alice@pec.edu.in").await?;
        let code = stored_code(&h.store, "alice@pec.edu.in").await;
        h.engine
            .verify_enrollment_code("alice@pec.edu.in", &code, Some("BraveFox42"))
            .await?;

        h.engine.request_login_code("alice@pec.edu.in").await?;
        let login_code = stored_code(&h.store, "alice@pec.edu.in").await;
        let auth = h
            .engine
            .verify_login_code("alice@pec.edu.in", &login_code)
            .await?;

        assert!(auth.account.pending.is_none());
        assert_eq!(auth.account.handle, "BraveFox42");
        assert_eq!(
            h.tokens.verify(&auth.token, h.clock.now()),
            Ok(auth.account.id)
        );
        Ok(())
    }

    #[tokio::test]
    async fn new_issuance_invalidates_the_previous_code() -> Result<()> {
        let h = harness();
        h.engine.request_enrollment_code("alice@pec.edu.in").await?;
        let first = stored_code(&h.store, "alice@pec.edu.in").await;

        h.engine.request_enrollment_code("alice@pec.edu.in").await?;
        let second = stored_code(&h.store, "alice@pec.edu.in").await;
        assert_ne!(first, second);

        let stale = h
            .engine
            .verify_enrollment_code("alice@pec.edu.in", &first, Some("BraveFox42"))
            .await;
        assert!(matches!(stale, Err(AuthError::InvalidCode)));

        let fresh = h
            .engine
            .verify_enrollment_code("alice@pec.edu.in", &second, Some("BraveFox42"))
            .await;
        assert!(fresh.is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn mail_failure_keeps_the_code_redeemable() -> Result<()> {
        let h = harness();
        h.mailer.fail.store(true, Ordering::SeqCst);

        let failed = h.engine.request_enrollment_code("alice@pec.edu.in").await;
        assert!(matches!(failed, Err(AuthError::MailDeliveryFailed(_))));

        // The code committed before the send, so redemption still works.
        let code = stored_code(&h.store, "alice@pec.edu.in").await;
        let auth = h
            .engine
            .verify_enrollment_code("alice@pec.edu.in", &code, Some("BraveFox42"))
            .await?;
        assert!(auth.account.verified);
        Ok(())
    }

    #[tokio::test]
    async fn emails_are_normalized_before_storage_and_lookup() -> Result<()> {
        let h = harness();
        h.engine
            .request_enrollment_code("  Alice@PEC.EDU.IN ")
            .await?;
        assert!(h.store.load_by_email("alice@pec.edu.in").await?.is_some());

        let code = stored_code(&h.store, "alice@pec.edu.in").await;
        let auth = h
            .engine
            .verify_enrollment_code("ALICE@pec.edu.in", &code, Some("BraveFox42"))
            .await?;
        assert_eq!(auth.account.email, "alice@pec.edu.in");
        Ok(())
    }

    #[tokio::test]
    async fn malformed_codes_are_invalid_regardless_of_digits() -> Result<()> {
        let h = harness();
        h.engine.request_enrollment_code("alice@pec.edu.in").await?;

        for bad in ["12345", "1234567", "abcdef", "", "00001 "] {
            let result = h
                .engine
                .verify_enrollment_code("alice@pec.edu.in", bad, Some("BraveFox42"))
                .await;
            assert!(
                matches!(result, Err(AuthError::InvalidCode)),
                "expected InvalidCode for {bad:?}"
            );
        }
        Ok(())
    }

    #[tokio::test]
    async fn verify_for_unknown_email_is_unknown_account() -> Result<()> {
        let h = harness();
        let result = h
            .engine
            .verify_enrollment_code("ghost@pec.edu.in", "123456", Some("Ghost"))
            .await;
        assert!(matches!(result, Err(AuthError::UnknownAccount)));

        let login = h.engine.verify_login_code("ghost@pec.edu.in", "123456").await;
        assert!(matches!(login, Err(AuthError::UnknownAccount)));
        Ok(())
    }
}
