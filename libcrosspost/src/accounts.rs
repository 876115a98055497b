//! Linked accounts and credential lifecycle
//!
//! [`AccountStore`] is the persistence seam for a user's platform accounts.
//! [`CredentialResolver`] sits on top of it and owns the rules for expiry
//! and refresh: a refreshed token is always persisted before it is used.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use crate::error::{PlatformError, PlatformResult, Result};
use crate::platforms::PlatformAdapter;
use crate::types::{Platform, PlatformAccount, TokenGrant};

/// Storage of linked platform accounts
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// The account linked by `user_id` on `platform`, active or not
    async fn get_account(&self, user_id: &str, platform: Platform)
        -> Result<Option<PlatformAccount>>;

    /// Insert or replace the account for its (user, platform) pair
    async fn save_account(&self, account: &PlatformAccount) -> Result<()>;
}

/// Process-local account store
#[derive(Default)]
pub struct InMemoryAccountStore {
    accounts: RwLock<HashMap<(String, Platform), PlatformAccount>>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accounts(accounts: impl IntoIterator<Item = PlatformAccount>) -> Self {
        let store = Self::new();
        for account in accounts {
            store.insert(account);
        }
        store
    }

    pub fn insert(&self, account: PlatformAccount) {
        let key = (account.user_id.clone(), account.platform);
        self.accounts
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, account);
    }

    /// Snapshot of a stored account
    pub fn get(&self, user_id: &str, platform: Platform) -> Option<PlatformAccount> {
        self.accounts
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(user_id.to_string(), platform))
            .cloned()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn get_account(
        &self,
        user_id: &str,
        platform: Platform,
    ) -> Result<Option<PlatformAccount>> {
        Ok(self.get(user_id, platform))
    }

    async fn save_account(&self, account: &PlatformAccount) -> Result<()> {
        self.insert(account.clone());
        Ok(())
    }
}

/// Resolves, refreshes and persists credentials for publish legs
#[derive(Clone)]
pub struct CredentialResolver {
    store: Arc<dyn AccountStore>,
}

impl CredentialResolver {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }

    /// Load the active account for (user, platform)
    ///
    /// A missing or inactive account is `AccountNotConnected`. A store
    /// failure is transient.
    pub async fn resolve(&self, user_id: &str, platform: Platform) -> PlatformResult<PlatformAccount> {
        match self.store.get_account(user_id, platform).await {
            Ok(Some(account)) if account.active => Ok(account),
            Ok(Some(_)) => {
                debug!(%platform, user_id, "Linked account is inactive");
                Err(PlatformError::account_not_connected(platform))
            }
            Ok(None) => Err(PlatformError::account_not_connected(platform)),
            Err(e) => Err(PlatformError::transient(format!(
                "Account store unavailable: {}",
                e
            ))),
        }
    }

    /// Whether the access token is past its expiry at `now` (unix seconds)
    ///
    /// Accounts without an expiry never expire.
    pub fn is_expired(account: &PlatformAccount, now: i64) -> bool {
        account.token_expiry.is_some_and(|expiry| expiry <= now)
    }

    /// Account with the grant's credentials applied
    ///
    /// Platforms that do not rotate refresh tokens omit one from the grant;
    /// the existing refresh token is kept in that case.
    pub fn apply_refresh(account: &PlatformAccount, grant: TokenGrant, now: i64) -> PlatformAccount {
        let mut refreshed = account.clone();
        refreshed.access_token = grant.access_token;
        refreshed.refresh_token = grant.refresh_token.or_else(|| account.refresh_token.clone());
        refreshed.token_expiry = grant.expires_in.map(|secs| now + secs);
        refreshed
    }

    /// Save refreshed credentials
    ///
    /// Failing to persist is `CredentialInvalid`: a token that was not saved
    /// must not be used.
    pub async fn persist(&self, account: &PlatformAccount) -> PlatformResult<()> {
        self.store.save_account(account).await.map_err(|e| {
            PlatformError::credential_invalid(format!(
                "Failed to persist refreshed {} credentials: {}",
                account.platform, e
            ))
        })
    }

    /// Refresh the account's token through its adapter and persist it
    ///
    /// Any refresh failure, including a missing refresh token, is
    /// `CredentialInvalid`.
    pub async fn refresh(
        &self,
        adapter: &dyn PlatformAdapter,
        account: &PlatformAccount,
        now: i64,
    ) -> PlatformResult<PlatformAccount> {
        let platform = account.platform;
        let refresh_token = account.refresh_token.as_ref().ok_or_else(|| {
            PlatformError::credential_invalid(format!(
                "{} access token expired and no refresh token is stored",
                platform
            ))
        })?;

        let grant = adapter
            .refresh_token(refresh_token.expose_secret())
            .await
            .map_err(|e| {
                warn!(%platform, error = %e, "Token refresh failed");
                PlatformError::credential_invalid(format!(
                    "Token refresh failed for {}: {}",
                    platform, e.message
                ))
            })?;

        let refreshed = Self::apply_refresh(account, grant, now);
        self.persist(&refreshed).await?;

        info!(%platform, user_id = %account.user_id, "Refreshed and stored access token");
        Ok(refreshed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CrosspostError, ErrorKind};
    use crate::platforms::mock::MockAdapter;
    use secrecy::SecretString;

    struct FailingStore;

    #[async_trait]
    impl AccountStore for FailingStore {
        async fn get_account(&self, _: &str, _: Platform) -> Result<Option<PlatformAccount>> {
            Err(CrosspostError::InvalidInput("store offline".to_string()))
        }

        async fn save_account(&self, _: &PlatformAccount) -> Result<()> {
            Err(CrosspostError::InvalidInput("store offline".to_string()))
        }
    }

    fn account() -> PlatformAccount {
        PlatformAccount::new("user-1", Platform::LinkedIn, "abc", "alice", "old-token")
            .with_refresh_token("refresh-1")
            .with_expiry(1_000)
    }

    #[tokio::test]
    async fn test_resolve() {
        let store = Arc::new(InMemoryAccountStore::with_accounts([account()]));
        let resolver = CredentialResolver::new(store.clone());

        let resolved = resolver.resolve("user-1", Platform::LinkedIn).await.unwrap();
        assert_eq!(resolved.username, "alice");

        let err = resolver.resolve("user-1", Platform::Twitter).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::AccountNotConnected);

        let mut inactive = account();
        inactive.active = false;
        store.insert(inactive);
        let err = resolver.resolve("user-1", Platform::LinkedIn).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::AccountNotConnected);
    }

    #[tokio::test]
    async fn test_resolve_store_failure_is_transient() {
        let resolver = CredentialResolver::new(Arc::new(FailingStore));
        let err = resolver.resolve("user-1", Platform::LinkedIn).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Transient);
    }

    #[test]
    fn test_is_expired() {
        let account = account();
        assert!(!CredentialResolver::is_expired(&account, 999));
        assert!(CredentialResolver::is_expired(&account, 1_000));
        assert!(CredentialResolver::is_expired(&account, 5_000));

        let mut forever = account;
        forever.token_expiry = None;
        assert!(!CredentialResolver::is_expired(&forever, i64::MAX));
    }

    #[test]
    fn test_apply_refresh_keeps_refresh_token() {
        let grant = MockAdapter::grant("new-token");
        let refreshed = CredentialResolver::apply_refresh(&account(), grant, 2_000);

        assert_eq!(refreshed.access_token.expose_secret(), "new-token");
        assert_eq!(
            refreshed.refresh_token.as_ref().unwrap().expose_secret(),
            "refresh-1"
        );
        assert_eq!(refreshed.token_expiry, Some(5_600));
    }

    #[test]
    fn test_apply_refresh_rotates_refresh_token() {
        let grant = TokenGrant {
            access_token: SecretString::from("new-token".to_string()),
            refresh_token: Some(SecretString::from("refresh-2".to_string())),
            expires_in: None,
        };
        let refreshed = CredentialResolver::apply_refresh(&account(), grant, 2_000);
        assert_eq!(
            refreshed.refresh_token.as_ref().unwrap().expose_secret(),
            "refresh-2"
        );
        assert_eq!(refreshed.token_expiry, None);
    }

    #[tokio::test]
    async fn test_refresh_persists_before_returning() {
        let store = Arc::new(InMemoryAccountStore::with_accounts([account()]));
        let resolver = CredentialResolver::new(store.clone());
        let adapter = MockAdapter::success(Platform::LinkedIn);

        let refreshed = resolver.refresh(&adapter, &account(), 2_000).await.unwrap();
        assert_eq!(refreshed.access_token.expose_secret(), "refreshed-token-1");

        let stored = store.get("user-1", Platform::LinkedIn).unwrap();
        assert_eq!(stored.access_token.expose_secret(), "refreshed-token-1");
        assert_eq!(adapter.refresh_call_count(), 1);
    }

    #[tokio::test]
    async fn test_refresh_failures_are_credential_invalid() {
        let resolver = CredentialResolver::new(Arc::new(InMemoryAccountStore::new()));

        let adapter = MockAdapter::success(Platform::LinkedIn)
            .refresh_failure(PlatformError::transient("token endpoint down"));
        let err = resolver.refresh(&adapter, &account(), 2_000).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::CredentialInvalid);

        let mut no_refresh = account();
        no_refresh.refresh_token = None;
        let err = resolver
            .refresh(&MockAdapter::success(Platform::LinkedIn), &no_refresh, 2_000)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::CredentialInvalid);
    }

    #[tokio::test]
    async fn test_persist_failure_is_credential_invalid() {
        let resolver = CredentialResolver::new(Arc::new(FailingStore));
        let adapter = MockAdapter::success(Platform::LinkedIn);

        let err = resolver.refresh(&adapter, &account(), 2_000).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::CredentialInvalid);
        assert!(err.message.contains("persist"));
    }
}
