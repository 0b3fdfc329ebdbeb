//! The remembered default password.
//!
//! `reset_all_passwords` stores the new default as a pair of settings keys
//! so that logins provisioned after a restart still get it.

use schoolhub_core::Result;
use schoolhub_storage::DynStore;
use schoolhub_storage::keys::{ALLOW_DEFAULT_PASSWORD, DEFAULT_PASSWORD};
use tracing::debug;

/// Reads the sentinel pair. Returns the remembered password only when the
/// allow flag is set to `true`.
pub async fn load_default_password(store: &DynStore) -> Result<Option<String>> {
    let allowed = store.get(ALLOW_DEFAULT_PASSWORD).await?;
    if allowed.as_deref().map(str::trim) != Some("true") {
        return Ok(None);
    }
    let password = store.get(DEFAULT_PASSWORD).await?;
    debug!(present = password.is_some(), "Remembered default password read");
    Ok(password.filter(|p| !p.is_empty()))
}

/// Writes the sentinel pair, password first so the flag never points at a
/// missing value.
pub async fn store_default_password(store: &DynStore, password: &str) -> Result<()> {
    store.put(DEFAULT_PASSWORD, password.to_string()).await?;
    store.put(ALLOW_DEFAULT_PASSWORD, "true".to_string()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use schoolhub_storage::InMemoryStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_round_trip() {
        let store: DynStore = Arc::new(InMemoryStore::new());
        assert!(load_default_password(&store).await.unwrap().is_none());

        store_default_password(&store, "welcome1").await.unwrap();
        assert_eq!(
            load_default_password(&store).await.unwrap().as_deref(),
            Some("welcome1")
        );
    }

    #[tokio::test]
    async fn test_flag_off_ignores_password() {
        let store: DynStore = Arc::new(InMemoryStore::with_entries([
            (ALLOW_DEFAULT_PASSWORD, "false"),
            (DEFAULT_PASSWORD, "welcome1"),
        ]));
        assert!(load_default_password(&store).await.unwrap().is_none());
    }
}
