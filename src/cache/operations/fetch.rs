use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::cache::operations::store::{CacheStore, log_absorbed};

impl CacheStore {
    /// 旁路缓存读取
    ///
    /// 命中时直接返回；未命中时调用 `producer`，返回其结果并在后台回写缓存。
    /// `producer` 的错误原样返回，缓存自身的错误不会影响调用方。
    pub async fn cached_fetch<T, E, F, Fut>(
        &self,
        key: &str,
        ttl_seconds: u64,
        producer: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.get::<T>(key).await {
            debug!(key, "Cache hit");
            return Ok(hit);
        }

        let value = producer().await?;
        self.spawn_write_back(key, &value, ttl_seconds);
        Ok(value)
    }

    /// 后台回写，并发数受信号量限制；队列已满时直接放弃本次回写
    fn spawn_write_back<T: Serialize>(&self, key: &str, value: &T, ttl_seconds: u64) {
        if ttl_seconds == 0 {
            return;
        }

        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(e) => {
                debug!(key, error = %e, "Skipping write-back of unserializable value");
                return;
            }
        };

        let permit = match Arc::clone(&self.write_permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                debug!(key, "Cache write-back queue saturated, skipping");
                return;
            }
        };

        let backend = Arc::clone(&self.backend);
        let key = key.to_owned();
        tokio::spawn(async move {
            let _permit = permit;
            if let Err(err) = backend.set_raw(&key, payload, ttl_seconds).await {
                log_absorbed("write_back", &key, &err);
            }
        });
    }

    /// 等待所有进行中的回写完成
    pub async fn wait_for_pending_writes(&self) {
        if let Ok(permits) = self.write_permits.acquire_many(self.max_inflight_writes).await {
            drop(permits);
        }
    }
}
