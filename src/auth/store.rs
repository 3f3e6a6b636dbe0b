//! Identity persistence contract and the in-memory double used by tests.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::models::Account;

/// Persistence contract consumed by the auth engine and the request gate.
///
/// Durability is read-your-writes. The engine assumes a single writer per
/// account but tolerates two racing writers: the second `save` is
/// authoritative.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn load_by_email(&self, email: &str) -> Result<Option<Account>>;

    async fn load_by_id(&self, id: Uuid) -> Result<Option<Account>>;

    async fn load_by_handle(&self, handle: &str) -> Result<Option<Account>>;

    /// Upsert the whole record keyed by email and return the stored row,
    /// with the id assigned on first save and timestamps refreshed.
    async fn save(&self, account: &Account) -> Result<Account>;

    /// True when a verified account other than `excluding` already owns
    /// `handle` (case-sensitive).
    async fn handle_taken(&self, handle: &str, excluding: Uuid) -> Result<bool>;
}

/// In-memory store double.
///
/// Backs the engine and gate tests; behaves like the real adapter, including
/// last-write-wins saves and id assignment on first save.
#[derive(Debug, Default)]
pub struct MemoryStore {
    accounts: Mutex<HashMap<String, Account>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Account>>> {
        self.accounts
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store poisoned"))
    }

    /// Flip the active flag directly, bypassing the engine (test helper).
    ///
    /// # Errors
    /// Returns an error when no account exists for `email`.
    pub fn set_active(&self, email: &str, active: bool) -> Result<()> {
        let mut accounts = self.lock()?;
        let account = accounts
            .get_mut(email)
            .ok_or_else(|| anyhow::anyhow!("no account for {email}"))?;
        account.active = active;
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn load_by_email(&self, email: &str) -> Result<Option<Account>> {
        Ok(self.lock()?.get(email).cloned())
    }

    async fn load_by_id(&self, id: Uuid) -> Result<Option<Account>> {
        Ok(self.lock()?.values().find(|a| a.id == id).cloned())
    }

    async fn load_by_handle(&self, handle: &str) -> Result<Option<Account>> {
        Ok(self.lock()?.values().find(|a| a.handle == handle).cloned())
    }

    async fn save(&self, account: &Account) -> Result<Account> {
        let mut stored = account.clone();
        if stored.id.is_nil() {
            stored.id = Uuid::new_v4();
        }
        let now = Utc::now();
        stored.created_at = stored.created_at.or(Some(now));
        stored.updated_at = Some(now);
        self.lock()?
            .insert(stored.email.clone(), stored.clone());
        Ok(stored)
    }

    async fn handle_taken(&self, handle: &str, excluding: Uuid) -> Result<bool> {
        Ok(self
            .lock()?
            .values()
            .any(|a| a.verified && a.handle == handle && a.id != excluding))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_assigns_id_once_and_keeps_created_at() -> Result<()> {
        let store = MemoryStore::new();
        let account = Account::new("alice@pec.edu.in".to_string());

        let first = store.save(&account).await?;
        assert!(!first.id.is_nil());
        let created = first.created_at;

        let second = store.save(&first).await?;
        assert_eq!(second.id, first.id);
        assert_eq!(second.created_at, created);
        Ok(())
    }

    #[tokio::test]
    async fn last_save_wins_per_email() -> Result<()> {
        let store = MemoryStore::new();
        let saved = store
            .save(&Account::new("alice@pec.edu.in".to_string()))
            .await?;

        let mut racing = saved.clone();
        racing.handle = "SilentFox7".to_string();
        store.save(&racing).await?;

        let loaded = store.load_by_email("alice@pec.edu.in").await?;
        assert_eq!(loaded.map(|a| a.handle), Some("SilentFox7".to_string()));
        Ok(())
    }

    #[tokio::test]
    async fn handle_taken_only_counts_other_verified_accounts() -> Result<()> {
        let store = MemoryStore::new();
        let mut alice = Account::new("alice@pec.edu.in".to_string());
        alice.handle = "BraveFox42".to_string();
        alice.verified = true;
        let alice = store.save(&alice).await?;

        // Unverified holder does not block the handle.
        let mut bob = Account::new("bob@pec.edu.in".to_string());
        bob.handle = "QuickHawk1".to_string();
        let bob = store.save(&bob).await?;

        assert!(store.handle_taken("BraveFox42", bob.id).await?);
        assert!(!store.handle_taken("BraveFox42", alice.id).await?);
        assert!(!store.handle_taken("QuickHawk1", alice.id).await?);
        Ok(())
    }
}
