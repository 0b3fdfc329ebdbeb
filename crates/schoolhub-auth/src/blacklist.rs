//! Login names denied at the gate.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

/// Blacklisted login names with an optional expiry.
///
/// Entries are added only when a login's rate limiter runs dry. With a TTL
/// configured, expired entries are dropped lazily on lookup.
#[derive(Debug, Default)]
pub struct Blacklist {
    entries: DashMap<String, Instant>,
    ttl: Option<Duration>,
}

impl Blacklist {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Returns `true` if the name was not already listed.
    pub fn insert(&self, login_name: &str) -> bool {
        self.entries
            .insert(login_name.to_string(), Instant::now())
            .is_none()
    }

    pub fn contains(&self, login_name: &str) -> bool {
        self.contains_at(login_name, Instant::now())
    }

    pub fn contains_at(&self, login_name: &str, now: Instant) -> bool {
        let Some(added) = self.entries.get(login_name).map(|e| *e.value()) else {
            return false;
        };
        match self.ttl {
            Some(ttl) if now.saturating_duration_since(added) >= ttl => {
                self.entries.remove(login_name);
                false
            }
            _ => true,
        }
    }

    pub fn remove(&self, login_name: &str) -> bool {
        self.entries.remove(login_name).is_some()
    }

    /// Listed names, sorted. Expired entries are skipped.
    pub fn names(&self) -> Vec<String> {
        let now = Instant::now();
        let mut names: Vec<String> = self
            .entries
            .iter()
            .filter(|e| match self.ttl {
                Some(ttl) => now.saturating_duration_since(*e.value()) < ttl,
                None => true,
            })
            .map(|e| e.key().clone())
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_remove() {
        let blacklist = Blacklist::new(None);
        assert!(blacklist.insert("20190109"));
        assert!(!blacklist.insert("20190109"));
        assert!(blacklist.contains("20190109"));
        assert_eq!(blacklist.names(), vec!["20190109".to_string()]);

        assert!(blacklist.remove("20190109"));
        assert!(!blacklist.contains("20190109"));
        assert!(blacklist.is_empty());
    }

    #[test]
    fn test_ttl_expires_lazily() {
        let blacklist = Blacklist::new(Some(Duration::from_secs(60)));
        blacklist.insert("a");
        let now = Instant::now();
        assert!(blacklist.contains_at("a", now));
        assert_eq!(blacklist.len(), 1);

        assert!(!blacklist.contains_at("a", now + Duration::from_secs(61)));
        assert_eq!(blacklist.len(), 0);
    }
}
