use std::time::Duration;

use lenta_cache::CacheConfig;

/// Time-to-live per content kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ttls {
    /// News lists and article bodies.
    pub news: Duration,
    pub comments: Duration,
    /// Topic pages and forum topic lists.
    pub topic: Duration,
    pub user: Duration,
    pub history: Duration,
}

impl Default for Ttls {
    fn default() -> Self {
        Self {
            news: Duration::from_secs(300),
            comments: Duration::from_secs(60),
            topic: Duration::from_secs(120),
            user: Duration::from_secs(600),
            history: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Applied to each per-kind cache.
    pub cache: CacheConfig,
    pub ttl: Ttls,
    pub history_per_page: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { cache: CacheConfig::default(), ttl: Ttls::default(), history_per_page: 50 }
    }
}

fn env_secs(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let d = Ttls::default();
        let ttl = Ttls {
            news: env_secs("LENTA_TTL_NEWS_SECS", d.news),
            comments: env_secs("LENTA_TTL_COMMENTS_SECS", d.comments),
            topic: env_secs("LENTA_TTL_TOPIC_SECS", d.topic),
            user: env_secs("LENTA_TTL_USER_SECS", d.user),
            history: env_secs("LENTA_TTL_HISTORY_SECS", d.history),
        };
        let history_per_page = std::env::var("LENTA_HISTORY_PER_PAGE")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(50);
        Self { cache: CacheConfig::from_env(), ttl, history_per_page }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = EngineConfig::default();
        assert_eq!(c.history_per_page, 50);
        assert!(c.ttl.comments < c.ttl.news);
        assert_eq!(c.cache.refresh_ahead, None);
    }

    #[test]
    fn unset_variable_keeps_default() {
        let d = Duration::from_secs(7);
        assert_eq!(env_secs("LENTA_TEST_SURELY_UNSET_SECS", d), d);
    }
}
