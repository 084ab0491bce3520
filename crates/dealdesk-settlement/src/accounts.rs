//! Connected-account registry.
//!
//! Sellers receive transfers through a provider account. The registry maps
//! those accounts back to local users and keeps the capability flags the
//! provider reports on `account.updated`.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use dealdesk_types::{AccountId, DealdeskError, Result, UserId};
use serde::{Deserialize, Serialize};

/// A seller's provider account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedAccount {
    pub id: AccountId,
    pub owner: UserId,
    pub charges_enabled: bool,
    pub payouts_enabled: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct AccountRegistry {
    accounts: RwLock<HashMap<AccountId, ConnectedAccount>>,
}

impl AccountRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Link `id` to `owner`. Capabilities start disabled until the provider
    /// reports otherwise. Re-registering keeps the known capabilities.
    ///
    /// # Errors
    /// `Persistence` if the registry lock is poisoned.
    pub fn register(&self, id: AccountId, owner: UserId, now: DateTime<Utc>) -> Result<ConnectedAccount> {
        let mut accounts = self.write()?;
        let account = accounts
            .entry(id.clone())
            .and_modify(|a| {
                a.owner = owner;
                a.updated_at = now;
            })
            .or_insert_with(|| ConnectedAccount {
                id,
                owner,
                charges_enabled: false,
                payouts_enabled: false,
                updated_at: now,
            });
        Ok(account.clone())
    }

    /// # Errors
    /// `Persistence` if the registry lock is poisoned.
    pub fn get(&self, id: &AccountId) -> Result<Option<ConnectedAccount>> {
        Ok(self.read()?.get(id).cloned())
    }

    /// # Errors
    /// `Persistence` if the registry lock is poisoned.
    pub fn owner_of(&self, id: &AccountId) -> Result<Option<UserId>> {
        Ok(self.read()?.get(id).map(|a| a.owner))
    }

    /// Store the provider's capability flags. Returns `None` for an account
    /// the registry has never seen.
    ///
    /// # Errors
    /// `Persistence` if the registry lock is poisoned.
    pub fn update_capabilities(
        &self,
        id: &AccountId,
        charges_enabled: bool,
        payouts_enabled: bool,
        now: DateTime<Utc>,
    ) -> Result<Option<ConnectedAccount>> {
        let mut accounts = self.write()?;
        let Some(account) = accounts.get_mut(id) else {
            return Ok(None);
        };
        account.charges_enabled = charges_enabled;
        account.payouts_enabled = payouts_enabled;
        account.updated_at = now;
        Ok(Some(account.clone()))
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<AccountId, ConnectedAccount>>> {
        self.accounts
            .read()
            .map_err(|_| DealdeskError::Persistence("account registry lock poisoned".into()))
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<AccountId, ConnectedAccount>>> {
        self.accounts
            .write()
            .map_err(|_| DealdeskError::Persistence("account registry lock poisoned".into()))
    }
}
