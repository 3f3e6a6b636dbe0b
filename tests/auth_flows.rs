//! Full walk of the account state machine across fake collaborators:
//! enrollment, login, and the request gate, with the clock under test
//! control and codes read out of the captured mail like a member would.

use anyhow::Result;
use async_trait::async_trait;
use axum::http::{header::AUTHORIZATION, HeaderMap, HeaderValue};
use chrono::{DateTime, Duration, TimeZone, Utc};
use secrecy::SecretString;
use std::sync::{Arc, Mutex};

use flustri::auth::clock::ManualClock;
use flustri::auth::{
    AuthConfig, AuthEngine, AuthError, GateError, IdentityStore, Mailer, MemoryStore, OsRngCodes,
    RequestGate, TokenCodec,
};

/// Captures every delivery so tests can read the code out of the body.
#[derive(Default)]
struct Mailbox {
    deliveries: Mutex<Vec<(String, String)>>,
}

impl Mailbox {
    fn last_code_for(&self, to: &str) -> Option<String> {
        self.deliveries
            .lock()
            .expect("mailbox")
            .iter()
            .rev()
            .find(|(recipient, _)| recipient == to)
            .and_then(|(_, body)| six_digit_run(body))
    }

    fn delivery_count(&self) -> usize {
        self.deliveries.lock().expect("mailbox").len()
    }
}

#[async_trait]
impl Mailer for Mailbox {
    async fn send(&self, to: &str, _subject: &str, body_html: &str) -> Result<()> {
        self.deliveries
            .lock()
            .expect("mailbox")
            .push((to.to_string(), body_html.to_string()));
        Ok(())
    }
}

/// First run of exactly six consecutive digits in the body.
fn six_digit_run(body: &str) -> Option<String> {
    let mut run = String::new();
    for c in body.chars().chain(std::iter::once(' ')) {
        if c.is_ascii_digit() {
            run.push(c);
        } else {
            if run.len() == 6 {
                return Some(run);
            }
            run.clear();
        }
    }
    None
}

struct World {
    engine: AuthEngine,
    gate: RequestGate,
    store: Arc<MemoryStore>,
    mailbox: Arc<Mailbox>,
    clock: Arc<ManualClock>,
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 1, 8, 0, 0).single().expect("t0")
}

fn world() -> World {
    let store = Arc::new(MemoryStore::new());
    let mailbox = Arc::new(Mailbox::default());
    let clock = Arc::new(ManualClock::new(t0()));
    let tokens = TokenCodec::new(&SecretString::from("flow-test-secret"), Duration::days(7));
    let engine = AuthEngine::new(
        store.clone(),
        mailbox.clone(),
        Arc::new(OsRngCodes::new(Duration::minutes(10))),
        clock.clone(),
        tokens.clone(),
        AuthConfig::new(),
    );
    let gate = RequestGate::new(store.clone(), tokens, clock.clone());
    World {
        engine,
        gate,
        store,
        mailbox,
        clock,
    }
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
async fn enroll_verify_login_and_gate_walk() -> Result<()> {
    let w = world();
    let email = "alice@pec.edu.in";

    // Enrollment: code request creates the row and mails a fresh code.
    w.engine.request_enrollment_code(email).await?;
    assert_eq!(w.mailbox.delivery_count(), 1);
    let code = w.mailbox.last_code_for(email).expect("enrollment code");

    // Redemption five minutes later assigns the handle and issues a token.
    w.clock.advance(Duration::minutes(5));
    let auth = w
        .engine
        .verify_enrollment_code(email, &code, Some("BraveFox42"))
        .await?;
    assert!(auth.account.verified);
    assert_eq!(auth.account.handle, "BraveFox42");
    assert!(auth.account.pending.is_none());

    let principal = w.gate.authorize(&bearer(&auth.token)).await?;
    assert_eq!(principal.account_id, auth.account.id);
    assert_eq!(principal.handle, "BraveFox42");

    // Login round trip: a fresh code supersedes the consumed one.
    w.engine.request_login_code(email).await?;
    assert_eq!(w.mailbox.delivery_count(), 2);
    let login_code = w.mailbox.last_code_for(email).expect("login code");

    let session = w.engine.verify_login_code(email, &login_code).await?;
    assert_eq!(session.account.id, auth.account.id);
    assert!(session.account.pending.is_none());

    let principal = w.gate.authorize(&bearer(&session.token)).await?;
    assert_eq!(principal.email, email);
    Ok(())
}

#[tokio::test]
async fn requesting_a_login_code_invalidates_the_previous_one() -> Result<()> {
    let w = world();
    let email = "alice@pec.edu.in";

    w.engine.request_enrollment_code(email).await?;
    let code = w.mailbox.last_code_for(email).expect("code");
    w.engine
        .verify_enrollment_code(email, &code, Some("BraveFox42"))
        .await?;

    w.engine.request_login_code(email).await?;
    let first = w.mailbox.last_code_for(email).expect("first login code");
    w.engine.request_login_code(email).await?;
    let second = w.mailbox.last_code_for(email).expect("second login code");
    assert_ne!(first, second);

    let stale = w.engine.verify_login_code(email, &first).await;
    assert!(matches!(stale, Err(AuthError::InvalidCode)));

    let fresh = w.engine.verify_login_code(email, &second).await;
    assert!(fresh.is_ok());
    Ok(())
}

#[tokio::test]
async fn enrollment_code_expires_after_ten_minutes() -> Result<()> {
    let w = world();
    let email = "alice@pec.edu.in";

    w.engine.request_enrollment_code(email).await?;
    let code = w.mailbox.last_code_for(email).expect("code");

    w.clock.advance(Duration::minutes(10) + Duration::seconds(1));
    let expired = w
        .engine
        .verify_enrollment_code(email, &code, Some("BraveFox42"))
        .await;
    assert!(matches!(expired, Err(AuthError::CodeExpired)));

    // A fresh request issues a redeemable replacement.
    w.engine.request_enrollment_code(email).await?;
    let code = w.mailbox.last_code_for(email).expect("fresh code");
    let auth = w
        .engine
        .verify_enrollment_code(email, &code, Some("BraveFox42"))
        .await?;
    assert!(auth.account.verified);
    Ok(())
}

#[tokio::test]
async fn deactivated_accounts_lose_gate_access_but_keep_their_row() -> Result<()> {
    let w = world();
    let email = "alice@pec.edu.in";

    w.engine.request_enrollment_code(email).await?;
    let code = w.mailbox.last_code_for(email).expect("code");
    let auth = w
        .engine
        .verify_enrollment_code(email, &code, Some("BraveFox42"))
        .await?;
    assert!(w.gate.authorize(&bearer(&auth.token)).await.is_ok());

    w.store.set_active(email, false)?;
    let refused = w.gate.authorize(&bearer(&auth.token)).await;
    assert!(matches!(refused, Err(GateError::AccountDisabled)));

    // The account itself survives; only token acceptance is disabled.
    assert!(w.store.load_by_email(email).await?.is_some());
    Ok(())
}

#[tokio::test]
async fn tokens_expire_at_seven_days_and_tampering_is_rejected() -> Result<()> {
    let w = world();
    let email = "alice@pec.edu.in";

    w.engine.request_enrollment_code(email).await?;
    let code = w.mailbox.last_code_for(email).expect("code");
    let auth = w
        .engine
        .verify_enrollment_code(email, &code, Some("BraveFox42"))
        .await?;

    let mut bytes = auth.token.clone().into_bytes();
    let middle = bytes.len() / 2;
    bytes[middle] = if bytes[middle] == b'A' { b'B' } else { b'A' };
    let tampered = String::from_utf8(bytes)?;
    let rejected = w.gate.authorize(&bearer(&tampered)).await;
    assert!(matches!(rejected, Err(GateError::TokenRejected)));

    w.clock.advance(Duration::days(7));
    let expired = w.gate.authorize(&bearer(&auth.token)).await;
    assert!(matches!(expired, Err(GateError::TokenRejected)));
    Ok(())
}

#[tokio::test]
async fn second_account_cannot_take_a_claimed_handle() -> Result<()> {
    let w = world();

    w.engine.request_enrollment_code("alice@pec.edu.in").await?;
    let code = w.mailbox.last_code_for("alice@pec.edu.in").expect("code");
    w.engine
        .verify_enrollment_code("alice@pec.edu.in", &code, Some("BraveFox42"))
        .await?;

    w.engine.request_enrollment_code("bob@pec.edu.in").await?;
    let code = w.mailbox.last_code_for("bob@pec.edu.in").expect("code");
    let collision = w
        .engine
        .verify_enrollment_code("bob@pec.edu.in", &code, Some("BraveFox42"))
        .await;
    assert!(matches!(collision, Err(AuthError::HandleTaken)));

    // The code survives the rejection, so a retry with a free name works.
    let auth = w
        .engine
        .verify_enrollment_code("bob@pec.edu.in", &code, Some("QuickHawk7"))
        .await?;
    assert_eq!(auth.account.handle, "QuickHawk7");
    Ok(())
}

#[test]
fn six_digit_run_finds_only_exact_runs() {
    assert_eq!(
        six_digit_run("your code is 042137, padding 600px"),
        Some("042137".to_string())
    );
    assert_eq!(six_digit_run("1234567 then 600px"), None);
    assert_eq!(six_digit_run("no digits here"), None);
}
