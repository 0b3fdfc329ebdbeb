//! The login protocol.

use std::collections::HashMap;
use std::sync::Arc;

use schoolhub_core::{CoreError, Result, now_utc, to_rfc3339, validate_id};
use schoolhub_storage::{DynStore, StorageError};
use schoolhub_storage::keys::{LOGIN, namespace_prefix, token_key};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::blacklist::Blacklist;
use crate::config::AccessConfig;
use crate::directory::StudentDirectory;
use crate::password::PasswordHasher;
use crate::rate_limit::TokenBucket;
use crate::record::{IssuedToken, LoginKey, LoginRecord, Principal, PrincipalType, Session};
use crate::settings;
use crate::token::{is_well_formed, mint_token};

struct AccessState {
    records: HashMap<LoginKey, LoginRecord>,
    /// Live token -> owning login.
    tokens: HashMap<String, LoginKey>,
    /// Password given to logins provisioned from now on.
    default_password: String,
}

/// Credential verification, token issuance and brute-force lockout.
///
/// Records, the token index and the default password share one async
/// mutex, held across store writes. Password hashing and verification run
/// on the blocking pool without that lock. The blacklist is consulted
/// before any lookup and never takes the lock.
pub struct AccessControl {
    store: DynStore,
    students: Arc<dyn StudentDirectory>,
    config: AccessConfig,
    hasher: PasswordHasher,
    state: Mutex<AccessState>,
    blacklist: Blacklist,
}

impl AccessControl {
    /// Creates an empty instance; call [`load`](Self::load) to restore
    /// persisted logins.
    pub fn new(
        store: DynStore,
        students: Arc<dyn StudentDirectory>,
        config: AccessConfig,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| CoreError::invalid_input(e.to_string()))?;
        let hasher = PasswordHasher::new(&config.hashing)?;
        Ok(Self {
            store,
            students,
            blacklist: Blacklist::new(config.blacklist_ttl),
            state: Mutex::new(AccessState {
                records: HashMap::new(),
                tokens: HashMap::new(),
                default_password: config.default_password.clone(),
            }),
            hasher,
            config,
        })
    }

    pub fn config(&self) -> &AccessConfig {
        &self.config
    }

    /// Restores login records, live tokens and the remembered default
    /// password from the store. Returns the number of logins loaded.
    pub async fn load(&self) -> Result<usize> {
        let remembered = settings::load_default_password(&self.store).await?;
        let entries = self.store.bulk_load(&namespace_prefix(LOGIN)).await?;

        let mut records = HashMap::with_capacity(entries.len());
        let mut tokens = HashMap::new();
        for (store_key, value) in entries {
            let record: LoginRecord = serde_json::from_str(&value).map_err(|e| {
                StorageError::serialization(format!("login '{store_key}': {e}"))
            })?;
            if let Some(token) = &record.token {
                tokens.insert(token.value.clone(), record.key.clone());
            }
            records.insert(record.key.clone(), record);
        }

        let mut state = self.state.lock().await;
        let logins = records.len();
        info!(
            logins,
            tokens = tokens.len(),
            remembered_default = remembered.is_some(),
            "Access control loaded"
        );
        state.records = records;
        state.tokens = tokens;
        state.default_password = remembered.unwrap_or_else(|| self.config.default_password.clone());
        Ok(logins)
    }

    /// Verifies credentials and issues a fresh token.
    ///
    /// A student without a login record is provisioned on the spot if their
    /// registration number is known, with the current default password.
    /// Each wrong password costs one token from the login's limiter; when
    /// the limiter is empty the login name is blacklisted.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` for an empty login name or a short password
    /// - `PermissionDenied` if the name is blacklisted or the password is wrong
    /// - `NotFound` if there is no such login and none can be provisioned
    /// - `Internal` on store failure
    pub async fn login(&self, key: &LoginKey, password: &str) -> Result<Session> {
        validate_login_name(&key.login_name)?;
        self.validate_password(password)?;

        if self.blacklist.contains(&key.login_name) {
            debug!(login = %key, "Login attempt from blacklisted name");
            return Err(CoreError::permission_denied(format!(
                "login '{}' is blocked",
                key.login_name
            )));
        }

        let password_hash = match self.stored_hash(key).await {
            Some(hash) => hash,
            None => self.provision(key).await?,
        };
        let matches = self
            .hasher
            .verify_blocking(password, &password_hash)
            .await?;

        let mut state = self.state.lock().await;
        let Some(record) = state.records.get_mut(key) else {
            return Err(CoreError::not_found(format!("login '{key}'")));
        };

        if !matches {
            let limiter = record.limiter.get_or_insert_with(|| {
                TokenBucket::new(
                    self.config.rate_limit.capacity,
                    self.config.rate_limit.refill_window,
                )
            });
            if !limiter.try_acquire() && self.blacklist.insert(&key.login_name) {
                warn!(login = %key, "Failed login limit reached, login name blacklisted");
            }
            return Err(CoreError::permission_denied("invalid login name or password"));
        }

        record.limiter = None;
        let previous = record.token.as_ref().map(|t| t.value.clone());
        let token = mint_token();
        let issued_at = now_utc();
        let mut updated = record.clone();
        updated.token = Some(IssuedToken {
            value: token.clone(),
            issued_at,
        });
        // On failure the old token stays live.
        self.persist(&updated).await?;

        if let Some(old) = previous {
            state.tokens.remove(&old);
            if let Err(e) = self.store.delete(&token_key(&old)).await {
                warn!(login = %key, error = %e, "Failed to delete superseded token row");
            }
        }

        let session = Session {
            token,
            principal: updated.principal(),
        };
        state.tokens.insert(session.token.clone(), key.clone());
        state.records.insert(key.clone(), updated);

        info!(
            login = %key,
            principal_id = %session.principal.principal_id,
            issued_at = %to_rfc3339(issued_at),
            "Login succeeded"
        );
        Ok(session)
    }

    /// Resolves a token to its principal.
    ///
    /// An expired token is revoked on the spot and reported as `NotFound`.
    pub async fn verify_token(&self, token: &str) -> Result<Principal> {
        if !is_well_formed(token) {
            return Err(CoreError::not_found("unknown token"));
        }

        let mut state = self.state.lock().await;
        let key = state
            .tokens
            .get(token)
            .cloned()
            .ok_or_else(|| CoreError::not_found("unknown token"))?;
        let record = state
            .records
            .get(&key)
            .ok_or_else(|| CoreError::internal(format!("token bound to missing login '{key}'")))?;

        let expired = record.token.as_ref().is_some_and(|t| self.is_expired(t));
        if !expired {
            return Ok(record.principal());
        }

        let mut updated = record.clone();
        updated.token = None;
        if let Err(e) = self.persist_revocation(&updated, token).await {
            warn!(login = %key, error = %e, "Failed to purge expired token from store");
        }
        state.tokens.remove(token);
        state.records.insert(key.clone(), updated);
        debug!(login = %key, "Expired token purged");
        Err(CoreError::not_found("token expired"))
    }

    /// Revokes `token`, whoever it belongs to.
    pub async fn logout(&self, token: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let key = state
            .tokens
            .get(token)
            .cloned()
            .ok_or_else(|| CoreError::not_found("unknown token"))?;
        let mut updated = state
            .records
            .get(&key)
            .cloned()
            .ok_or_else(|| CoreError::internal(format!("token bound to missing login '{key}'")))?;

        updated.token = None;
        self.persist_revocation(&updated, token).await?;
        state.tokens.remove(token);
        state.records.insert(key.clone(), updated);

        info!(login = %key, "Logged out");
        Ok(())
    }

    /// Creates a login explicitly, e.g. for a teacher.
    pub async fn register(&self, key: LoginKey, principal_id: &str, password: &str) -> Result<()> {
        validate_login_name(&key.login_name)?;
        validate_id(principal_id)?;
        self.validate_password(password)?;
        if self.state.lock().await.records.contains_key(&key) {
            return Err(CoreError::already_exists(format!("login '{key}'")));
        }

        let hash = self.hasher.hash_blocking(password).await?;

        let mut state = self.state.lock().await;
        if state.records.contains_key(&key) {
            return Err(CoreError::already_exists(format!("login '{key}'")));
        }
        let record = LoginRecord::new(key.clone(), principal_id, hash);
        self.persist(&record).await?;
        state.records.insert(key.clone(), record);

        info!(login = %key, principal_id, "Login registered");
        Ok(())
    }

    /// Sets a new password without checking the old one. The live token,
    /// if any, stays valid.
    pub async fn update_password(&self, key: &LoginKey, new_password: &str) -> Result<()> {
        self.validate_password(new_password)?;
        if !self.state.lock().await.records.contains_key(key) {
            return Err(CoreError::not_found(format!("login '{key}'")));
        }

        let hash = self.hasher.hash_blocking(new_password).await?;

        let mut state = self.state.lock().await;
        let mut updated = state
            .records
            .get(key)
            .cloned()
            .ok_or_else(|| CoreError::not_found(format!("login '{key}'")))?;
        updated.password_hash = hash;
        self.persist(&updated).await?;
        state.records.insert(key.clone(), updated);

        info!(login = %key, "Password updated");
        Ok(())
    }

    /// Sets a new password after verifying the current one.
    pub async fn change_password(
        &self,
        key: &LoginKey,
        old_password: &str,
        new_password: &str,
    ) -> Result<()> {
        self.validate_password(new_password)?;
        let current = self
            .stored_hash(key)
            .await
            .ok_or_else(|| CoreError::not_found(format!("login '{key}'")))?;
        if !self.hasher.verify_blocking(old_password, &current).await? {
            return Err(CoreError::permission_denied("current password is incorrect"));
        }
        self.update_password(key, new_password).await
    }

    /// Resets every login to `default_password` and remembers it for logins
    /// provisioned later, including after a restart.
    ///
    /// Records are written first, then the settings pair. Returns the
    /// number of logins reset.
    pub async fn reset_all_passwords(&self, default_password: &str) -> Result<usize> {
        self.validate_password(default_password)?;
        let hash = self.hasher.hash_blocking(default_password).await?;

        let mut state = self.state.lock().await;
        let mut keys: Vec<LoginKey> = state.records.keys().cloned().collect();
        keys.sort_by(|a, b| a.to_string().cmp(&b.to_string()));

        for key in &keys {
            let Some(mut updated) = state.records.get(key).cloned() else {
                continue;
            };
            updated.password_hash = hash.clone();
            self.persist(&updated).await?;
            state.records.insert(key.clone(), updated);
        }

        settings::store_default_password(&self.store, default_password).await?;
        state.default_password = default_password.to_string();

        info!(logins = keys.len(), "All passwords reset to the default");
        Ok(keys.len())
    }

    /// Moves a login to a new login name, keeping its principal, password
    /// and live token.
    ///
    /// Call this when a student's registration number changes; otherwise
    /// the old login stays usable and the next login under the new number
    /// provisions a second record for the same student.
    pub async fn rename_login(&self, key: &LoginKey, new_login_name: &str) -> Result<LoginKey> {
        validate_login_name(new_login_name)?;
        let new_key = LoginKey::new(key.principal_type, new_login_name);

        let mut state = self.state.lock().await;
        if state.records.contains_key(&new_key) {
            return Err(CoreError::already_exists(format!("login '{new_key}'")));
        }
        let current = state
            .records
            .get(key)
            .cloned()
            .ok_or_else(|| CoreError::not_found(format!("login '{key}'")))?;

        let mut moved = current.clone();
        moved.key = new_key.clone();
        moved.limiter = None;
        self.persist(&moved).await?;
        if let Err(e) = self.store.delete(&key.store_key()).await {
            warn!(login = %key, error = %e, "Failed to remove renamed login, restoring it");
            if let Err(cleanup) = self.store.delete(&new_key.store_key()).await {
                warn!(login = %new_key, error = %cleanup, "Failed to remove new login row");
            }
            if let Err(cleanup) = self.persist(&current).await {
                warn!(login = %key, error = %cleanup, "Failed to restore token row");
            }
            return Err(e.into());
        }

        if let Some(token) = &moved.token {
            state.tokens.insert(token.value.clone(), new_key.clone());
        }
        state.records.remove(key);
        state.records.insert(new_key.clone(), moved);

        info!(from = %key, to = %new_key, "Login renamed");
        Ok(new_key)
    }

    /// Takes a login name off the blacklist. Returns whether it was listed.
    pub fn unblock(&self, login_name: &str) -> bool {
        let removed = self.blacklist.remove(login_name);
        if removed {
            info!(login_name, "Login name unblocked");
        }
        removed
    }

    /// Login names currently blacklisted, sorted.
    pub fn blacklisted(&self) -> Vec<String> {
        self.blacklist.names()
    }

    pub fn is_blacklisted(&self, login_name: &str) -> bool {
        self.blacklist.contains(login_name)
    }

    /// Number of live tokens.
    pub async fn active_tokens(&self) -> usize {
        self.state.lock().await.tokens.len()
    }

    pub async fn contains_login(&self, key: &LoginKey) -> bool {
        self.state.lock().await.records.contains_key(key)
    }

    async fn stored_hash(&self, key: &LoginKey) -> Option<String> {
        self.state
            .lock()
            .await
            .records
            .get(key)
            .map(|r| r.password_hash.clone())
    }

    /// Creates the login record of a student on first login.
    async fn provision(&self, key: &LoginKey) -> Result<String> {
        if key.principal_type != PrincipalType::Student {
            return Err(CoreError::not_found(format!("login '{key}'")));
        }
        let student_id = self
            .students
            .resolve_student(&key.login_name)
            .await
            .ok_or_else(|| CoreError::not_found(format!("login '{key}'")))?;

        let default_password = self.state.lock().await.default_password.clone();
        let hash = self.hasher.hash_blocking(&default_password).await?;

        let mut state = self.state.lock().await;
        if let Some(existing) = state.records.get(key) {
            // Provisioned concurrently.
            return Ok(existing.password_hash.clone());
        }
        let record = LoginRecord::new(key.clone(), student_id, hash);
        self.persist(&record).await?;
        let hash = record.password_hash.clone();
        info!(login = %key, principal_id = %record.principal_id, "Student login provisioned");
        state.records.insert(key.clone(), record);
        Ok(hash)
    }

    fn validate_password(&self, password: &str) -> Result<()> {
        let min = self.config.min_password_length;
        if password.chars().count() < min {
            return Err(CoreError::invalid_input(format!(
                "password must be at least {min} characters"
            )));
        }
        Ok(())
    }

    /// A TTL too large to add to the issue time never expires.
    fn is_expired(&self, token: &IssuedToken) -> bool {
        let ttl = self.config.token_ttl;
        if ttl.is_zero() {
            return false;
        }
        time::Duration::try_from(ttl)
            .ok()
            .and_then(|ttl| token.issued_at.checked_add(ttl))
            .is_some_and(|expires_at| now_utc() >= expires_at)
    }

    /// Writes the token row, if the record holds a token, then the login
    /// record.
    ///
    /// `load` trusts the login record, so it goes last: if it cannot be
    /// written the token row is removed again and the stored login keeps
    /// its previous token.
    async fn persist(&self, record: &LoginRecord) -> Result<()> {
        let payload = serde_json::to_string(record)?;
        let token_row = record.token.as_ref().map(|t| token_key(&t.value));
        if let Some(row) = &token_row {
            self.store.put(row, payload.clone()).await?;
        }
        if let Err(e) = self.store.put(&record.key.store_key(), payload).await {
            if let Some(row) = &token_row {
                if let Err(cleanup) = self.store.delete(row).await {
                    warn!(login = %record.key, error = %cleanup, "Failed to remove unbound token row");
                }
            }
            return Err(e.into());
        }
        Ok(())
    }

    async fn persist_revocation(&self, record: &LoginRecord, token: &str) -> Result<()> {
        self.persist(record).await?;
        self.store.delete(&token_key(token)).await?;
        Ok(())
    }
}

fn validate_login_name(login_name: &str) -> Result<()> {
    if login_name.trim().is_empty() {
        return Err(CoreError::invalid_input("login name must not be empty"));
    }
    if login_name.chars().any(|c| c == '/' || c.is_whitespace()) {
        return Err(CoreError::invalid_input(format!(
            "login name '{login_name}' contains '/' or whitespace"
        )));
    }
    Ok(())
}
