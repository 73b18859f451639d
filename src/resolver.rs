use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::bundled::BundledDataset;
use crate::cache::ContentCache;
use crate::content::ContentQuery;
use crate::remote::{LearnRemote, with_timeout};
use crate::store::KvStore;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(8);

/// Tier of the fallback chain that produced a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentSource {
    Remote,
    Cache,
    Bundled,
    Placeholder,
}

impl ContentSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentSource::Remote => "remote",
            ContentSource::Cache => "cache",
            ContentSource::Bundled => "bundled",
            ContentSource::Placeholder => "placeholder",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub source: ContentSource,
    pub payload: Value,
}

impl Resolution {
    /// The "content unavailable" payload the UI renders when every tier misses.
    pub fn unavailable(query: &ContentQuery) -> Self {
        Self {
            source: ContentSource::Placeholder,
            payload: json!({
                "status": "unavailable",
                "kind": query.kind().as_str(),
                "id": query.scope_id(),
                "message": "This content is not available offline yet.",
            }),
        }
    }

    pub fn is_available(&self) -> bool {
        self.source != ContentSource::Placeholder
    }
}

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Skip the remote tier entirely (offline-only builds, tests).
    pub force_offline: bool,
    pub request_timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            force_offline: false,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// One source in the fallback chain.
#[async_trait(?Send)]
pub trait ResolveTier {
    fn source(&self) -> ContentSource;

    /// `None` hands the query to the next tier.
    async fn attempt(&self, query: &ContentQuery) -> Option<Value>;
}

/// Remote fetch with write-back into the cache.
pub struct RemoteTier<'a, R> {
    remote: &'a R,
    cache: ContentCache<'a>,
    timeout: Duration,
}

impl<'a, R: LearnRemote> RemoteTier<'a, R> {
    pub fn new(remote: &'a R, cache: ContentCache<'a>, timeout: Duration) -> Self {
        Self {
            remote,
            cache,
            timeout,
        }
    }
}

#[async_trait(?Send)]
impl<R: LearnRemote> ResolveTier for RemoteTier<'_, R> {
    fn source(&self) -> ContentSource {
        ContentSource::Remote
    }

    async fn attempt(&self, query: &ContentQuery) -> Option<Value> {
        match with_timeout(self.timeout, self.remote.fetch_content(query)).await {
            Ok(payload) => {
                if let Err(err) = self.cache.put(query, &payload) {
                    tracing::warn!(%query, error = %err, "failed to write content cache");
                }
                Some(payload)
            }
            Err(err) => {
                tracing::debug!(%query, error = %err, "remote fetch failed, falling back");
                None
            }
        }
    }
}

pub struct CacheTier<'a> {
    cache: ContentCache<'a>,
}

impl<'a> CacheTier<'a> {
    pub fn new(cache: ContentCache<'a>) -> Self {
        Self { cache }
    }
}

#[async_trait(?Send)]
impl ResolveTier for CacheTier<'_> {
    fn source(&self) -> ContentSource {
        ContentSource::Cache
    }

    async fn attempt(&self, query: &ContentQuery) -> Option<Value> {
        match self.cache.get(query) {
            Ok(entry) => entry.map(|e| e.payload),
            Err(err) => {
                tracing::warn!(%query, error = %err, "unreadable cache entry treated as a miss");
                None
            }
        }
    }
}

pub struct BundledTier<'a> {
    dataset: &'a BundledDataset,
}

impl<'a> BundledTier<'a> {
    pub fn new(dataset: &'a BundledDataset) -> Self {
        Self { dataset }
    }
}

#[async_trait(?Send)]
impl ResolveTier for BundledTier<'_> {
    fn source(&self) -> ContentSource {
        ContentSource::Bundled
    }

    async fn attempt(&self, query: &ContentQuery) -> Option<Value> {
        self.dataset.lookup(query)
    }
}

pub struct PlaceholderTier;

#[async_trait(?Send)]
impl ResolveTier for PlaceholderTier {
    fn source(&self) -> ContentSource {
        ContentSource::Placeholder
    }

    async fn attempt(&self, query: &ContentQuery) -> Option<Value> {
        Some(Resolution::unavailable(query).payload)
    }
}

/// Resolves content through an ordered list of tiers; the first tier that
/// yields a payload wins. Never fails.
pub struct ContentResolver<'a> {
    tiers: Vec<Box<dyn ResolveTier + 'a>>,
}

impl<'a> ContentResolver<'a> {
    /// The standard chain: remote (unless forced offline), cache, bundled, placeholder.
    pub fn new<R: LearnRemote + 'a>(
        store: &'a KvStore,
        remote: &'a R,
        dataset: &'a BundledDataset,
        config: &ResolverConfig,
    ) -> Self {
        let cache = ContentCache::new(store);
        let mut tiers: Vec<Box<dyn ResolveTier + 'a>> = Vec::with_capacity(4);
        if !config.force_offline {
            tiers.push(Box::new(RemoteTier::new(remote, cache, config.request_timeout)));
        }
        tiers.push(Box::new(CacheTier::new(cache)));
        tiers.push(Box::new(BundledTier::new(dataset)));
        tiers.push(Box::new(PlaceholderTier));
        Self { tiers }
    }

    pub fn from_tiers(tiers: Vec<Box<dyn ResolveTier + 'a>>) -> Self {
        Self { tiers }
    }

    /// Insert an extra tier at `position` (clamped to the end of the chain).
    pub fn with_tier(mut self, position: usize, tier: Box<dyn ResolveTier + 'a>) -> Self {
        let position = position.min(self.tiers.len());
        self.tiers.insert(position, tier);
        self
    }

    pub fn sources(&self) -> Vec<ContentSource> {
        self.tiers.iter().map(|t| t.source()).collect()
    }

    pub async fn resolve(&self, query: &ContentQuery) -> Resolution {
        for tier in &self.tiers {
            if let Some(payload) = tier.attempt(query).await {
                let source = tier.source();
                tracing::info!(%query, source = source.as_str(), "content resolved");
                return Resolution { source, payload };
            }
        }
        tracing::info!(%query, "no tier produced content");
        Resolution::unavailable(query)
    }
}
