use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::cache::connection::ConnectionManager;
use crate::cache::operations::backend::{CacheBackend, RedisCacheBackend};
use crate::error::CacheError;

/// 通用缓存操作
///
/// 所有操作在出错时都按未命中处理：读返回 `None`，写返回 `false`，
/// 删除返回 0。缓存不可用时系统行为与没有缓存时一致。
#[derive(Clone)]
pub struct CacheStore {
    pub(crate) backend: Arc<dyn CacheBackend>,
    pub(crate) write_permits: Arc<Semaphore>,
    pub(crate) max_inflight_writes: u32,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn CacheBackend>, max_inflight_writes: usize) -> Self {
        let max_inflight_writes = max_inflight_writes.clamp(1, u32::MAX as usize) as u32;
        Self {
            backend,
            write_permits: Arc::new(Semaphore::new(max_inflight_writes as usize)),
            max_inflight_writes,
        }
    }

    pub fn redis(connection: Arc<ConnectionManager>, max_inflight_writes: usize) -> Self {
        Self::new(
            Arc::new(RedisCacheBackend::new(connection)),
            max_inflight_writes,
        )
    }

    /// 读取并反序列化，错误类型对调用方可见
    pub async fn try_get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let Some(raw) = self.backend.get_raw(key).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.try_get(key).await {
            Ok(value) => value,
            Err(err) => {
                log_absorbed("get", key, &err);
                None
            }
        }
    }

    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl_seconds: u64) -> bool {
        if ttl_seconds == 0 {
            return false;
        }
        let result = match serde_json::to_string(value) {
            Ok(payload) => self.backend.set_raw(key, payload, ttl_seconds).await,
            Err(e) => Err(CacheError::Serialization(e)),
        };
        match result {
            Ok(()) => true,
            Err(err) => {
                log_absorbed("set", key, &err);
                false
            }
        }
    }

    pub async fn delete(&self, key: &str) -> bool {
        match self.backend.delete(key).await {
            Ok(removed) => removed,
            Err(err) => {
                log_absorbed("delete", key, &err);
                false
            }
        }
    }

    pub async fn delete_pattern(&self, pattern: &str) -> u64 {
        match self.backend.delete_matching(pattern).await {
            Ok(count) => {
                if count > 0 {
                    debug!(pattern, count, "Deleted cache keys by pattern");
                }
                count
            }
            Err(err) => {
                log_absorbed("delete_pattern", pattern, &err);
                0
            }
        }
    }
}

/// 连接类错误由 ConnectionManager 在状态切换时记录，这里不逐次记录
pub(crate) fn log_absorbed(op: &'static str, key: &str, err: &CacheError) {
    if !err.is_connectivity() {
        debug!(op, key, error = %err, "Cache operation failed, treating as miss");
    }
}
