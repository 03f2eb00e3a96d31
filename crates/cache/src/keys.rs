//! Cache keys: logical identities of cached entities and binary assets.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Cache, CacheConfig};

/// Logical identity of a cached entity or page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheKey {
    ArticleList { page: u32 },
    Article(Url),
    Comments(Url),
    Topic { id: u64, page: u32 },
    TopicList { forum: u64, page: u32 },
    User(u64),
    History { page: u32 },
    Asset(AssetKey),
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::ArticleList { page } => write!(f, "news/{page}"),
            CacheKey::Article(url) => write!(f, "article/{url}"),
            CacheKey::Comments(url) => write!(f, "comments/{url}"),
            CacheKey::Topic { id, page } => write!(f, "topic/{id}/{page}"),
            CacheKey::TopicList { forum, page } => write!(f, "forum/{forum}/{page}"),
            CacheKey::User(id) => write!(f, "user/{id}"),
            CacheKey::History { page } => write!(f, "history/{page}"),
            CacheKey::Asset(key) => write!(f, "asset/{key}"),
        }
    }
}

/// Stable key for a binary asset, derived from its URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetKey(pub u64);

impl AssetKey {
    /// Hash of the normalized URL: scheme and host lower-cased (done by the
    /// parser), fragment dropped. Query strings are significant.
    pub fn from_url(url: &Url) -> Self {
        let mut normalized = url.clone();
        normalized.set_fragment(None);
        Self(fnv1a(normalized.as_str().as_bytes()))
    }

    pub fn parse(raw: &str) -> Result<Self, url::ParseError> {
        Url::parse(raw.trim()).map(|u| Self::from_url(&u))
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325;
    for b in bytes {
        h ^= *b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum AssetError {
    #[error("asset fetch failed: {0}")]
    Fetch(String),
}

/// Store for binary resources (images, attachments) keyed by URL.
#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn get(&self, key: AssetKey) -> Option<Bytes>;
    async fn put(&self, key: AssetKey, bytes: Bytes);
    async fn remove(&self, key: AssetKey) -> bool;
}

/// In-memory [`AssetStore`], weighted by byte length.
#[derive(Clone)]
pub struct MemoryAssetStore {
    cache: Cache<AssetKey, Bytes, AssetError>,
    ttl: Duration,
}

impl MemoryAssetStore {
    pub fn new(max_bytes: u64, ttl: Duration) -> Self {
        let config = CacheConfig { max_weight: max_bytes, refresh_ahead: None };
        let cache: Cache<AssetKey, Bytes, AssetError> =
            Cache::with_weigher("assets", config, |_, b: &Bytes| b.len() as u64);
        Self { cache, ttl }
    }

    /// Cached bytes for `url`, downloading through `fetch` on a miss.
    pub async fn get_or_fetch<F, Fut>(&self, url: &Url, fetch: F) -> Result<Bytes, AssetError>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Bytes, AssetError>> + Send + 'static,
    {
        self.cache.get_or_fetch(AssetKey::from_url(url), self.ttl, fetch).await
    }

    pub fn bytes(&self) -> u64 {
        self.cache.weight()
    }

    pub fn cache(&self) -> &Cache<AssetKey, Bytes, AssetError> {
        &self.cache
    }
}

#[async_trait]
impl AssetStore for MemoryAssetStore {
    async fn get(&self, key: AssetKey) -> Option<Bytes> {
        self.cache.peek(&key)
    }

    async fn put(&self, key: AssetKey, bytes: Bytes) {
        self.cache.insert(key, bytes, self.ttl);
    }

    async fn remove(&self, key: AssetKey) -> bool {
        self.cache.invalidate(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_key_ignores_case_of_host_and_fragment() {
        let a = AssetKey::parse("HTTPS://CDN.Example.com/img/a.png#top").unwrap();
        let b = AssetKey::parse("https://cdn.example.com/img/a.png").unwrap();
        assert_eq!(a, b);
        let c = AssetKey::parse("https://cdn.example.com/img/A.png").unwrap();
        assert_ne!(a, c);
        let d = AssetKey::parse("https://cdn.example.com/img/a.png?w=100").unwrap();
        assert_ne!(a, d);
    }

    #[test]
    fn fnv_reference_values() {
        assert_eq!(fnv1a(b""), 0xcbf29ce484222325);
        assert_eq!(fnv1a(b"a"), 0xaf63dc4c8601ec8c);
    }

    #[test]
    fn keys_display_as_paths() {
        assert_eq!(CacheKey::Topic { id: 7, page: 2 }.to_string(), "topic/7/2");
        assert_eq!(CacheKey::Asset(AssetKey(255)).to_string(), "asset/00000000000000ff");
    }

    #[tokio::test(start_paused = true)]
    async fn memory_store_is_weighted_by_bytes() {
        let store = MemoryAssetStore::new(8, Duration::from_secs(60));
        store.put(AssetKey(1), Bytes::from_static(b"12345")).await;
        store.put(AssetKey(2), Bytes::from_static(b"678")).await;
        assert_eq!(store.bytes(), 8);
        store.put(AssetKey(3), Bytes::from_static(b"9")).await;
        assert_eq!(store.get(AssetKey(1)).await, None);
        assert_eq!(store.get(AssetKey(3)).await.as_deref(), Some(&b"9"[..]));
        assert!(store.remove(AssetKey(2)).await);
        assert_eq!(store.bytes(), 1);
    }
}
