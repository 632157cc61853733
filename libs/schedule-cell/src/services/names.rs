use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

use shared_config::AppConfig;

/// Shown when the backend has no user for an identifier.
pub const UNKNOWN_USER_NAME: &str = "Usuário não encontrado";

/// Shown while a lookup has not completed (timeout or transient failure).
pub const PENDING_NAME: &str = "Carregando...";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NameSource: Send + Sync {
    /// `Ok(None)` means the user does not exist.
    async fn fetch_display_name(&self, user_id: &str, auth_token: &str) -> anyhow::Result<Option<String>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CachedName {
    Known(String),
    Unknown,
}

impl CachedName {
    fn display(&self) -> String {
        match self {
            CachedName::Known(name) => name.clone(),
            CachedName::Unknown => UNKNOWN_USER_NAME.to_string(),
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    name: CachedName,
    stored_at: Instant,
}

/// Memoizing display-name lookup.
///
/// Positive and negative answers are kept for `ttl`; once `max_entries` is
/// reached the oldest entry is evicted. Failed or timed-out lookups are not
/// cached.
pub struct DisplayNameCache {
    source: Arc<dyn NameSource>,
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
    max_entries: usize,
    lookup_timeout: Duration,
}

impl DisplayNameCache {
    pub fn new(
        source: Arc<dyn NameSource>,
        ttl: Duration,
        max_entries: usize,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            source,
            entries: RwLock::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
            lookup_timeout,
        }
    }

    pub fn from_config(source: Arc<dyn NameSource>, config: &AppConfig) -> Self {
        Self::new(
            source,
            config.name_cache_ttl,
            config.name_cache_max_entries,
            config.name_lookup_timeout,
        )
    }

    pub async fn resolve(&self, user_id: &str, auth_token: &str) -> String {
        if let Some(name) = self.cached(user_id).await {
            return name.display();
        }

        let lookup = self.source.fetch_display_name(user_id, auth_token);
        match tokio::time::timeout(self.lookup_timeout, lookup).await {
            Ok(Ok(Some(name))) if !name.trim().is_empty() => {
                let name = CachedName::Known(name.trim().to_string());
                let display = name.display();
                self.store(user_id, name).await;
                display
            }
            Ok(Ok(_)) => {
                debug!("No display name for user {}", user_id);
                self.store(user_id, CachedName::Unknown).await;
                UNKNOWN_USER_NAME.to_string()
            }
            Ok(Err(e)) => {
                warn!("Display name lookup failed for {}: {}", user_id, e);
                PENDING_NAME.to_string()
            }
            Err(_) => {
                warn!("Display name lookup for {} timed out after {:?}", user_id, self.lookup_timeout);
                PENDING_NAME.to_string()
            }
        }
    }

    /// Resolves every id concurrently and returns a snapshot for expansion.
    pub async fn resolve_all<'a, I>(&self, user_ids: I, auth_token: &str) -> NameDirectory
    where
        I: IntoIterator<Item = &'a str>,
    {
        let unique: HashSet<&str> = user_ids.into_iter().filter(|id| !id.is_empty()).collect();
        let lookups = unique.into_iter().map(|id| async move {
            let name = self.resolve(id, auth_token).await;
            (id.to_string(), name)
        });

        join_all(lookups).await.into_iter().collect()
    }

    pub async fn invalidate(&self, user_id: &str) {
        self.entries.write().await.remove(user_id);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    async fn cached(&self, user_id: &str) -> Option<CachedName> {
        let entries = self.entries.read().await;
        entries
            .get(user_id)
            .filter(|entry| entry.stored_at.elapsed() < self.ttl)
            .map(|entry| entry.name.clone())
    }

    async fn store(&self, user_id: &str, name: CachedName) {
        let mut entries = self.entries.write().await;
        let ttl = self.ttl;
        entries.retain(|_, entry| entry.stored_at.elapsed() < ttl);

        if entries.len() >= self.max_entries && !entries.contains_key(user_id) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.stored_at)
                .map(|(id, _)| id.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }

        entries.insert(
            user_id.to_string(),
            CacheEntry {
                name,
                stored_at: Instant::now(),
            },
        );
    }
}

/// Synchronous id-to-name snapshot consumed by the expander.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameDirectory(HashMap<String, String>);

impl NameDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, user_id: impl Into<String>, name: impl Into<String>) {
        self.0.insert(user_id.into(), name.into());
    }

    /// Falls back to the pending placeholder for ids not resolved yet.
    pub fn display_name(&self, user_id: &str) -> String {
        self.0
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| PENDING_NAME.to_string())
    }
}

impl FromIterator<(String, String)> for NameDirectory {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    fn cache_with(source: MockNameSource, max_entries: usize) -> DisplayNameCache {
        DisplayNameCache::new(
            Arc::new(source),
            Duration::from_secs(60),
            max_entries,
            Duration::from_millis(100),
        )
    }

    #[tokio::test]
    async fn memoizes_known_names() {
        let mut source = MockNameSource::new();
        source
            .expect_fetch_display_name()
            .with(eq("pat-1"), eq("token"))
            .times(1)
            .returning(|_, _| Ok(Some("Ana Souza".to_string())));

        let cache = cache_with(source, 10);
        assert_eq!(cache.resolve("pat-1", "token").await, "Ana Souza");
        assert_eq!(cache.resolve("pat-1", "token").await, "Ana Souza");
    }

    #[tokio::test]
    async fn caches_unknown_users_as_negative_entries() {
        let mut source = MockNameSource::new();
        source
            .expect_fetch_display_name()
            .times(1)
            .returning(|_, _| Ok(None));

        let cache = cache_with(source, 10);
        assert_eq!(cache.resolve("ghost", "token").await, UNKNOWN_USER_NAME);
        assert_eq!(cache.resolve("ghost", "token").await, UNKNOWN_USER_NAME);
    }

    #[tokio::test]
    async fn failures_fall_back_to_placeholder_without_caching() {
        let mut source = MockNameSource::new();
        source
            .expect_fetch_display_name()
            .times(2)
            .returning(|_, _| Err(anyhow::anyhow!("backend down")));

        let cache = cache_with(source, 10);
        assert_eq!(cache.resolve("pat-1", "token").await, PENDING_NAME);
        assert_eq!(cache.resolve("pat-1", "token").await, PENDING_NAME);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let mut source = MockNameSource::new();
        source
            .expect_fetch_display_name()
            .times(2)
            .returning(|_, _| Ok(Some("Ana".to_string())));

        let cache = cache_with(source, 10);
        cache.resolve("pat-1", "token").await;
        tokio::time::advance(Duration::from_secs(61)).await;
        cache.resolve("pat-1", "token").await;
    }

    #[tokio::test(start_paused = true)]
    async fn evicts_oldest_entry_at_capacity() {
        let mut source = MockNameSource::new();
        source
            .expect_fetch_display_name()
            .returning(|id, _| Ok(Some(format!("name-{}", id))));

        let cache = cache_with(source, 2);
        cache.resolve("a", "token").await;
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.resolve("b", "token").await;
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.resolve("c", "token").await;

        assert_eq!(cache.len().await, 2);
        assert!(cache.cached("a").await.is_none());
        assert!(cache.cached("c").await.is_some());
    }

    #[tokio::test]
    async fn resolve_all_builds_directory() {
        let mut source = MockNameSource::new();
        source
            .expect_fetch_display_name()
            .returning(|id, _| Ok(Some(format!("name-{}", id))));

        let cache = cache_with(source, 10);
        let directory = cache.resolve_all(["a", "b", "a", ""], "token").await;

        assert_eq!(directory.display_name("a"), "name-a");
        assert_eq!(directory.display_name("b"), "name-b");
        assert_eq!(directory.display_name("missing"), PENDING_NAME);
    }
}
