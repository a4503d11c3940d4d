use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow, ensure};
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::trace;

use super::auth::{Authenticator, Authorizer};
use super::collaborators::GroupSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    pub capacity: usize,
    pub shards: usize,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            shards: 16,
        }
    }
}

struct CachedVerdict {
    verdict: bool,
    expires_at: Instant,
}

/// Lock-striped LRU of boolean verdicts keyed by digest. Expired entries are
/// dropped when they are looked up.
pub struct VerdictCache {
    shards: Box<[Mutex<LruCache<blake3::Hash, CachedVerdict>>]>,
    ttl: Duration,
}

impl VerdictCache {
    pub fn new(ttl: Duration, options: CacheOptions) -> Result<Self> {
        ensure!(options.shards > 0, "verdict cache needs at least one shard");
        let per_shard = options.capacity.div_ceil(options.shards);
        let per_shard = NonZeroUsize::new(per_shard)
            .ok_or_else(|| anyhow!("verdict cache capacity must be greater than zero"))?;
        let shards = (0..options.shards)
            .map(|_| Mutex::new(LruCache::new(per_shard)))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Ok(Self { shards, ttl })
    }

    fn shard(&self, key: &blake3::Hash) -> &Mutex<LruCache<blake3::Hash, CachedVerdict>> {
        let bytes = key.as_bytes();
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&bytes[..8]);
        let idx = (u64::from_le_bytes(prefix) % self.shards.len() as u64) as usize;
        &self.shards[idx]
    }

    pub fn get(&self, key: &blake3::Hash) -> Option<bool> {
        let mut shard = self.shard(key).lock();
        let (verdict, expires_at) = shard.get(key).map(|e| (e.verdict, e.expires_at))?;
        if expires_at <= Instant::now() {
            shard.pop(key);
            return None;
        }
        Some(verdict)
    }

    /// Entries whose expiry cannot be represented are not cached.
    pub fn insert(&self, key: blake3::Hash, verdict: bool) {
        let Some(expires_at) = Instant::now().checked_add(self.ttl) else {
            trace!(ttl = ?self.ttl, "verdict cache ttl out of range; not caching");
            return;
        };
        let entry = CachedVerdict { verdict, expires_at };
        self.shard(&key).lock().put(key, entry);
    }
}

fn update_field(hasher: &mut blake3::Hasher, field: &str) {
    hasher.update(&(field.len() as u64).to_le_bytes());
    hasher.update(field.as_bytes());
}

fn authentication_key(user: &str, secret: &str) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    update_field(&mut hasher, user);
    update_field(&mut hasher, secret);
    hasher.finalize()
}

fn authorization_key(user: &str, groups: &GroupSet) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    update_field(&mut hasher, user);
    hasher.update(&(groups.len() as u64).to_le_bytes());
    for group in groups {
        update_field(&mut hasher, group);
    }
    hasher.finalize()
}

pub struct CachedAuthenticator {
    name: Arc<str>,
    inner: Arc<dyn Authenticator>,
    cache: VerdictCache,
}

#[async_trait]
impl Authenticator for CachedAuthenticator {
    async fn authenticate(&self, user: &str, secret: &str) -> Result<bool> {
        let key = authentication_key(user, secret);
        if let Some(verdict) = self.cache.get(&key) {
            trace!(cache = %self.name, user, "authentication cache hit");
            crate::metrics::record_auth_cache(&self.name, "hit");
            return Ok(verdict);
        }
        crate::metrics::record_auth_cache(&self.name, "miss");
        let verdict = self.inner.authenticate(user, secret).await?;
        self.cache.insert(key, verdict);
        Ok(verdict)
    }
}

pub struct CachedAuthorizer {
    name: Arc<str>,
    inner: Arc<dyn Authorizer>,
    cache: VerdictCache,
}

#[async_trait]
impl Authorizer for CachedAuthorizer {
    async fn authorize(&self, user: &str, groups: &GroupSet) -> Result<bool> {
        let key = authorization_key(user, groups);
        if let Some(verdict) = self.cache.get(&key) {
            trace!(cache = %self.name, user, "authorization cache hit");
            crate::metrics::record_auth_cache(&self.name, "hit");
            return Ok(verdict);
        }
        crate::metrics::record_auth_cache(&self.name, "miss");
        let verdict = self.inner.authorize(user, groups).await?;
        self.cache.insert(key, verdict);
        Ok(verdict)
    }
}

/// Installs a verdict cache in front of `inner` unless `ttl` is zero.
pub fn cached_authenticator(
    name: Arc<str>,
    inner: Arc<dyn Authenticator>,
    ttl: Duration,
    options: CacheOptions,
) -> Result<Arc<dyn Authenticator>> {
    if ttl.is_zero() {
        return Ok(inner);
    }
    Ok(Arc::new(CachedAuthenticator {
        name,
        inner,
        cache: VerdictCache::new(ttl, options)?,
    }))
}

/// Installs a verdict cache in front of `inner` unless `ttl` is zero.
pub fn cached_authorizer(
    name: Arc<str>,
    inner: Arc<dyn Authorizer>,
    ttl: Duration,
    options: CacheOptions,
) -> Result<Arc<dyn Authorizer>> {
    if ttl.is_zero() {
        return Ok(inner);
    }
    Ok(Arc::new(CachedAuthorizer {
        name,
        inner,
        cache: VerdictCache::new(ttl, options)?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingBackend {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingBackend {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Authenticator for CountingBackend {
        async fn authenticate(&self, _user: &str, secret: &str) -> Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("directory unavailable");
            }
            Ok(secret == "pw")
        }
    }

    #[async_trait]
    impl Authorizer for CountingBackend {
        async fn authorize(&self, _user: &str, groups: &GroupSet) -> Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(groups.contains("ops"))
        }
    }

    fn groups(items: &[&str]) -> GroupSet {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn small() -> CacheOptions {
        CacheOptions {
            capacity: 64,
            shards: 4,
        }
    }

    #[tokio::test]
    async fn repeated_authentication_hits_backend_once() {
        let backend = Arc::new(CountingBackend::default());
        let cached = cached_authenticator(
            Arc::from("test"),
            backend.clone(),
            Duration::from_secs(60),
            small(),
        )
        .unwrap();
        for _ in 0..5 {
            assert!(cached.authenticate("alice", "pw").await.unwrap());
        }
        assert_eq!(backend.calls(), 1);

        assert!(!cached.authenticate("alice", "wrong").await.unwrap());
        assert!(!cached.authenticate("alice", "wrong").await.unwrap());
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn authorization_key_includes_group_set() {
        let backend = Arc::new(CountingBackend::default());
        let cached = cached_authorizer(
            Arc::from("test"),
            backend.clone(),
            Duration::from_secs(60),
            small(),
        )
        .unwrap();
        assert!(cached.authorize("alice", &groups(&["ops"])).await.unwrap());
        assert!(!cached.authorize("alice", &groups(&["dev"])).await.unwrap());
        assert!(cached.authorize("alice", &groups(&["ops"])).await.unwrap());
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let backend = Arc::new(CountingBackend {
            fail: true,
            ..Default::default()
        });
        let cached = cached_authenticator(
            Arc::from("test"),
            backend.clone(),
            Duration::from_secs(60),
            small(),
        )
        .unwrap();
        assert!(cached.authenticate("alice", "pw").await.is_err());
        assert!(cached.authenticate("alice", "pw").await.is_err());
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let backend = Arc::new(CountingBackend::default());
        let cached = cached_authenticator(
            Arc::from("test"),
            backend.clone(),
            Duration::from_secs(10),
            small(),
        )
        .unwrap();
        assert!(cached.authenticate("alice", "pw").await.unwrap());
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(cached.authenticate("alice", "pw").await.unwrap());
        assert_eq!(backend.calls(), 1);
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(cached.authenticate("alice", "pw").await.unwrap());
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn zero_ttl_bypasses_cache() {
        let backend = Arc::new(CountingBackend::default());
        let cached = cached_authenticator(
            Arc::from("test"),
            backend.clone(),
            Duration::ZERO,
            small(),
        )
        .unwrap();
        assert!(cached.authenticate("alice", "pw").await.unwrap());
        assert!(cached.authenticate("alice", "pw").await.unwrap());
        assert_eq!(backend.calls(), 2);
    }

    #[test]
    fn keys_never_embed_raw_secret() {
        let key = authentication_key("alice", "pw");
        assert_ne!(key, authentication_key("alice", "pw2"));
        assert_ne!(key, authentication_key("alic", "epw"));
        assert_ne!(
            authorization_key("alice", &groups(&["a", "b"])),
            authorization_key("alice", &groups(&["ab"]))
        );
    }

    #[test]
    fn key_fields_are_length_framed() {
        assert_ne!(
            authorization_key("a\0b", &groups(&["c"])),
            authorization_key("a", &groups(&["b", "c"]))
        );
        assert_ne!(
            authentication_key("a\0b", "c"),
            authentication_key("a", "b\0c")
        );
    }

    #[tokio::test]
    async fn unrepresentable_ttl_degrades_to_miss() {
        let backend = Arc::new(CountingBackend::default());
        let cached = cached_authenticator(
            Arc::from("test"),
            backend.clone(),
            Duration::from_secs(i64::MAX as u64),
            small(),
        )
        .unwrap();
        assert!(cached.authenticate("alice", "pw").await.unwrap());
        assert!(cached.authenticate("alice", "pw").await.unwrap());
        assert_eq!(backend.calls(), 2);
    }

    #[test]
    fn rejects_zero_capacity() {
        let err = VerdictCache::new(
            Duration::from_secs(1),
            CacheOptions {
                capacity: 0,
                shards: 1,
            },
        )
        .err()
        .expect("zero capacity should be rejected");
        assert!(err.to_string().contains("greater than zero"));
    }
}
