//! Lenta engine: transport, decoding, assembly and caching wired together.
//!
//! Each read goes through the cache of its content kind. A miss fetches the
//! raw body through the [`Transport`], decodes and assembles it, and builds
//! the display structure (comment tree, history buckets) before storing it.

#![forbid(unsafe_code)]

pub mod config;
pub mod mock;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use lenta_assemble::{assemble_page, Articles, Assembler, Comments, Posts, Topics, Users, Visits};
use lenta_cache::{Cache, CacheKey, CacheStats};
use lenta_core::{
    Article, ArticleBody, AssemblyError, Batch, BatchFailure, DecodeError, EntityError, EntityKind, ForumId,
    HistoryBucket, Topic, TopicId, UserId, UserProfile,
};
use lenta_decode::{decode_html_bytes, decode_single};
use lenta_history::aggregate_local;
use lenta_tree::{build, CommentTree};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

pub use config::{EngineConfig, Ttls};
pub use mock::MockTransport;

/// What to fetch from upstream. The transport maps it to a concrete call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Request {
    News { page: u32 },
    ArticleBody { url: Url },
    Comments { url: Url },
    Topic { id: TopicId, page: u32 },
    Forum { id: ForumId, page: u32 },
    User { id: UserId },
    History { page: u32, per_page: u32 },
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::News { page } => write!(f, "news?page={page}"),
            Request::ArticleBody { url } => write!(f, "article?url={url}"),
            Request::Comments { url } => write!(f, "comments?url={url}"),
            Request::Topic { id, page } => write!(f, "topic/{id}?page={page}"),
            Request::Forum { id, page } => write!(f, "forum/{id}?page={page}"),
            Request::User { id } => write!(f, "user/{id}"),
            Request::History { page, per_page } => write!(f, "history?page={page}&per_page={per_page}"),
        }
    }
}

/// Upstream access. Returns the raw response body.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, request: &Request) -> anyhow::Result<Vec<u8>>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("transport: {0}")]
    Transport(Arc<anyhow::Error>),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
    #[error("fetch of {key} failed: {cause}")]
    CacheFetchFailed {
        key: String,
        #[source]
        cause: Arc<EngineError>,
    },
}

impl From<EntityError> for EngineError {
    fn from(e: EntityError) -> Self {
        match e {
            EntityError::Decode(e) => EngineError::Decode(e),
            EntityError::Assembly(e) => EngineError::Assembly(e),
        }
    }
}

impl EngineError {
    /// The error that started it, looking through cache wrapping.
    pub fn root(&self) -> &EngineError {
        match self {
            EngineError::CacheFetchFailed { cause, .. } => cause.root(),
            other => other,
        }
    }
}

/// Comments (or forum posts) of one page, arranged for display.
#[derive(Debug, Clone)]
pub struct Thread {
    pub total: u64,
    pub tree: CommentTree,
    pub failed: Vec<BatchFailure>,
}

impl Thread {
    fn from_batch(batch: Batch<lenta_core::Comment>) -> Self {
        let Batch { total, succeeded, failed } = batch;
        Self { total, tree: build(succeeded), failed }
    }
}

/// One page of browsing history grouped by local day, newest day first.
#[derive(Debug, Clone)]
pub struct HistoryPage {
    pub total: u64,
    pub buckets: Vec<HistoryBucket>,
    pub failed: Vec<BatchFailure>,
}

async fn load<Tr>(transport: Arc<Tr>, request: Request) -> Result<Vec<u8>, EngineError>
where
    Tr: Transport + ?Sized,
{
    let t0 = Instant::now();
    match transport.fetch(&request).await {
        Ok(body) => {
            info!(request = %request, bytes = body.len(), took_ms = %t0.elapsed().as_millis(), "engine: fetch ok");
            Ok(body)
        }
        Err(e) => {
            warn!(request = %request, error = %e, took_ms = %t0.elapsed().as_millis(), "engine: fetch failed");
            Err(EngineError::Transport(Arc::new(e)))
        }
    }
}

fn parse<A: Assembler>(body: &[u8]) -> Result<Batch<A::Output>, EngineError> {
    let batch = assemble_page::<A>(body)?;
    if batch.is_partial() {
        warn!(kind = %A::KIND, failed = batch.failed.len(), ok = batch.len(), "engine: partial page");
    }
    Ok(batch)
}

async fn cached<T, Fut>(
    cache: &Cache<CacheKey, T, EngineError>,
    key: CacheKey,
    ttl: Duration,
    fut: Fut,
) -> Result<T, EngineError>
where
    T: Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<T, EngineError>> + Send + 'static,
{
    let t0 = Instant::now();
    let res = cache.get_or_fetch(key.clone(), ttl, move || fut).await;
    debug!(key = %key, ok = res.is_ok(), took_ms = %t0.elapsed().as_millis(), "engine: get");
    res.map_err(|cause| EngineError::CacheFetchFailed { key: key.to_string(), cause: Arc::new(cause) })
}

pub struct Engine<Tr: ?Sized> {
    config: EngineConfig,
    news: Cache<CacheKey, Arc<Batch<Article>>, EngineError>,
    articles: Cache<CacheKey, Arc<ArticleBody>, EngineError>,
    threads: Cache<CacheKey, Arc<Thread>, EngineError>,
    forums: Cache<CacheKey, Arc<Batch<Topic>>, EngineError>,
    users: Cache<CacheKey, UserProfile, EngineError>,
    history: Cache<CacheKey, Arc<HistoryPage>, EngineError>,
    transport: Arc<Tr>,
}

impl<Tr: ?Sized> Clone for Engine<Tr> {
    fn clone(&self) -> Self {
        Self {
            config: self.config,
            news: self.news.clone(),
            articles: self.articles.clone(),
            threads: self.threads.clone(),
            forums: self.forums.clone(),
            users: self.users.clone(),
            history: self.history.clone(),
            transport: Arc::clone(&self.transport),
        }
    }
}

impl<Tr> Engine<Tr>
where
    Tr: Transport + ?Sized + 'static,
{
    pub fn new(transport: Arc<Tr>, config: EngineConfig) -> Self {
        let c = config.cache;
        Self {
            config,
            news: Cache::new("news", c),
            articles: Cache::new("articles", c),
            threads: Cache::new("threads", c),
            forums: Cache::new("forums", c),
            users: Cache::new("users", c),
            history: Cache::new("history", c),
            transport,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn news(&self, page: u32) -> Result<Arc<Batch<Article>>, EngineError> {
        let body = load(Arc::clone(&self.transport), Request::News { page });
        cached(&self.news, CacheKey::ArticleList { page }, self.config.ttl.news, async move {
            Ok::<_, EngineError>(Arc::new(parse::<Articles>(&body.await?)?))
        })
        .await
    }

    pub async fn article_body(&self, url: &Url) -> Result<Arc<ArticleBody>, EngineError> {
        let body = load(Arc::clone(&self.transport), Request::ArticleBody { url: url.clone() });
        cached(&self.articles, CacheKey::Article(url.clone()), self.config.ttl.news, async move {
            let doc = decode_html_bytes(&body.await?)?;
            if doc.is_degraded() {
                debug!(issues = doc.issues.len(), "engine: article body degraded");
            }
            Ok::<_, EngineError>(Arc::new(doc))
        })
        .await
    }

    pub async fn comments(&self, url: &Url) -> Result<Arc<Thread>, EngineError> {
        let body = load(Arc::clone(&self.transport), Request::Comments { url: url.clone() });
        cached(&self.threads, CacheKey::Comments(url.clone()), self.config.ttl.comments, async move {
            Ok::<_, EngineError>(Arc::new(Thread::from_batch(parse::<Comments>(&body.await?)?)))
        })
        .await
    }

    pub async fn topic_posts(&self, id: TopicId, page: u32) -> Result<Arc<Thread>, EngineError> {
        let body = load(Arc::clone(&self.transport), Request::Topic { id, page });
        cached(&self.threads, CacheKey::Topic { id: id.0, page }, self.config.ttl.topic, async move {
            Ok::<_, EngineError>(Arc::new(Thread::from_batch(parse::<Posts>(&body.await?)?)))
        })
        .await
    }

    pub async fn forum_topics(&self, forum: ForumId, page: u32) -> Result<Arc<Batch<Topic>>, EngineError> {
        let body = load(Arc::clone(&self.transport), Request::Forum { id: forum, page });
        cached(&self.forums, CacheKey::TopicList { forum: forum.0, page }, self.config.ttl.topic, async move {
            Ok::<_, EngineError>(Arc::new(parse::<Topics>(&body.await?)?))
        })
        .await
    }

    pub async fn user(&self, id: UserId) -> Result<UserProfile, EngineError> {
        let body = load(Arc::clone(&self.transport), Request::User { id });
        cached(&self.users, CacheKey::User(id.0), self.config.ttl.user, async move {
            let record = decode_single(EntityKind::User, &body.await?)?;
            Ok::<_, EngineError>(Users::assemble(record)?)
        })
        .await
    }

    pub async fn history(&self, page: u32) -> Result<Arc<HistoryPage>, EngineError> {
        let per_page = self.config.history_per_page;
        let body = load(Arc::clone(&self.transport), Request::History { page, per_page });
        cached(&self.history, CacheKey::History { page }, self.config.ttl.history, async move {
            let Batch { total, succeeded, failed } = parse::<Visits>(&body.await?)?;
            Ok::<_, EngineError>(Arc::new(HistoryPage { total, buckets: aggregate_local(succeeded), failed }))
        })
        .await
    }

    /// Drop one cached entry. Asset keys are not held here.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let hit = match key {
            CacheKey::ArticleList { .. } => self.news.invalidate(key),
            CacheKey::Article(_) => self.articles.invalidate(key),
            CacheKey::Comments(_) | CacheKey::Topic { .. } => self.threads.invalidate(key),
            CacheKey::TopicList { .. } => self.forums.invalidate(key),
            CacheKey::User(_) => self.users.invalidate(key),
            CacheKey::History { .. } => self.history.invalidate(key),
            CacheKey::Asset(_) => false,
        };
        debug!(key = %key, hit, "engine: invalidate");
        hit
    }

    /// A comment was posted under `url`; its thread is stale.
    pub fn comment_posted(&self, url: &Url) {
        self.invalidate(&CacheKey::Comments(url.clone()));
    }

    /// A reply was posted in topic `id`; every cached page of it is stale.
    pub fn topic_replied(&self, id: TopicId) -> usize {
        let n = self.threads.invalidate_where(|k| matches!(k, CacheKey::Topic { id: t, .. } if *t == id.0));
        debug!(topic = %id, pages = n, "engine: topic invalidated");
        n
    }

    pub fn cache_stats(&self) -> Vec<(&'static str, CacheStats)> {
        vec![
            (self.news.name(), self.news.stats()),
            (self.articles.name(), self.articles.stats()),
            (self.threads.name(), self.threads.stats()),
            (self.forums.name(), self.forums.stats()),
            (self.users.name(), self.users.stats()),
            (self.history.name(), self.history.stats()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_paths() {
        let r = Request::History { page: 2, per_page: 50 };
        assert_eq!(r.to_string(), "history?page=2&per_page=50");
        assert_eq!(Request::Topic { id: TopicId(9), page: 1 }.to_string(), "topic/9?page=1");
    }

    #[test]
    fn root_looks_through_cache_wrapping() {
        let inner = EngineError::Decode(DecodeError::InvalidJson("eof".into()));
        let wrapped = EngineError::CacheFetchFailed { key: "news/1".into(), cause: Arc::new(inner) };
        assert!(matches!(wrapped.root(), EngineError::Decode(DecodeError::InvalidJson(_))));
        assert!(wrapped.to_string().starts_with("fetch of news/1 failed"));
    }

    #[test]
    fn entity_errors_keep_their_class() {
        let e: EngineError = EntityError::Decode(DecodeError::NotARecord { kind: EntityKind::User }).into();
        assert!(matches!(e, EngineError::Decode(_)));
    }
}
