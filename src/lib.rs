use std::sync::Arc;

use cache::{CacheInvalidator, CacheStore, ConnectionManager};
use config::{Config, RateLimitPolicy};
use middleware::{RateLimitGuard, RateLimiter};

pub mod cache;
pub mod config;
pub mod error;
pub mod middleware;
pub mod result;
pub mod utils;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub redis: Arc<ConnectionManager>,
    pub rate_limiter: Arc<RateLimiter>,
    pub cache: CacheStore,
    pub invalidator: CacheInvalidator,
}

impl AppState {
    /// 进程启动时构建一次，所有服务共享同一个 Redis 连接管理器
    pub fn build(config: Config) -> Self {
        let redis = ConnectionManager::new(config.redis.clone());
        let rate_limiter = Arc::new(RateLimiter::new(Arc::clone(&redis)));
        let cache = CacheStore::redis(Arc::clone(&redis), config.cache_max_inflight_writes);
        let invalidator = CacheInvalidator::new(cache.clone());

        Self {
            config,
            redis,
            rate_limiter,
            cache,
            invalidator,
        }
    }

    pub fn rate_limit_guard(&self, policy: RateLimitPolicy) -> RateLimitGuard {
        RateLimitGuard::new(Arc::clone(&self.rate_limiter), policy)
    }

    /// 等待后台缓存回写完成后关闭 Redis 连接
    pub async fn shutdown(&self) {
        self.cache.wait_for_pending_writes().await;
        self.redis.close().await;
    }
}
