//! Account record owned by the auth core.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

/// Maximum length of an anonymous handle.
pub const HANDLE_MAX_CHARS: usize = 20;

/// One-time code parked on an account between issuance and redemption.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingCode {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// The sole persistent entity of the auth core, one row per email.
///
/// `pending` being `None` is the clean state; a `Some` always carries both the
/// digits and their expiry, so the "code without expiry" shape cannot exist.
#[derive(Clone, Debug)]
pub struct Account {
    /// Nil until the store has persisted the record once.
    pub id: Uuid,
    /// Lower-cased, domain-conformant address.
    pub email: String,
    /// Anonymous display name; empty until first verification.
    pub handle: String,
    pub avatar: Option<String>,
    pub verified: bool,
    pub active: bool,
    pub pending: Option<PendingCode>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Account {
    /// Fresh unverified record for a first enrollment request.
    #[must_use]
    pub fn new(email: String) -> Self {
        Self {
            id: Uuid::nil(),
            email,
            handle: String::new(),
            avatar: None,
            verified: false,
            active: true,
            pending: None,
            created_at: None,
            updated_at: None,
        }
    }
}

/// Account shape exposed to clients; never carries the pending code.
#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct UserBody {
    pub id: String,
    pub email: String,
    pub handle: String,
    pub avatar: Option<String>,
    pub verified: bool,
}

impl From<&Account> for UserBody {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id.to_string(),
            email: account.email.clone(),
            handle: account.handle.clone(),
            avatar: account.avatar.clone(),
            verified: account.verified,
        }
    }
}
