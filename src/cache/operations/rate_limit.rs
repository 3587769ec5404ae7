use std::sync::{Arc, LazyLock, Weak};
use std::time::Duration;

use dashmap::DashMap;
use redis::{AsyncCommands, Script};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

use crate::cache::connection::ConnectionManager;
use crate::cache::models::rate_limit::{CounterSnapshot, RateLimitEntry};
use crate::error::CacheError;

// INCR 会保留已有的过期时间，只有新键（或丢失 TTL 的键）才设置窗口
static INCREMENT_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r"
local count = redis.call('INCR', KEYS[1])
local ttl = redis.call('PTTL', KEYS[1])
if count == 1 or ttl < 0 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
    ttl = tonumber(ARGV[1])
end
return {count, ttl}
",
    )
});

/// Redis 计数器，增加与设置过期在一个脚本内原子完成
pub struct RedisCounterBackend {
    connection: Arc<ConnectionManager>,
}

impl RedisCounterBackend {
    pub fn new(connection: Arc<ConnectionManager>) -> Self {
        Self { connection }
    }

    pub async fn increment_and_check(
        &self,
        key: &str,
        window: Duration,
    ) -> Result<CounterSnapshot, CacheError> {
        let key = key.to_owned();
        let window_ms = window.as_millis() as u64;

        let (count, ttl_ms): (u64, i64) = self
            .connection
            .execute(move |mut conn| async move {
                let result: (u64, i64) = INCREMENT_SCRIPT
                    .key(&key)
                    .arg(window_ms)
                    .invoke_async(&mut conn)
                    .await?;
                Ok(result)
            })
            .await?;

        Ok(CounterSnapshot {
            count,
            remaining_ttl: Duration::from_millis(ttl_ms.max(0) as u64),
        })
    }

    pub async fn reset(&self, key: &str) -> Result<(), CacheError> {
        let key = key.to_owned();
        self.connection
            .execute(move |mut conn| async move {
                let _: () = conn.del(&key).await?;
                Ok(())
            })
            .await
    }
}

/// 本地降级计数器
///
/// 过期是惰性的：窗口结束后的首次访问会重新开窗；
/// 后台清理任务定期移除过期条目，避免内存无限增长。
#[derive(Default)]
pub struct LocalCounterBackend {
    entries: DashMap<String, RateLimitEntry>,
}

impl LocalCounterBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_and_check(&self, key: &str, window: Duration) -> CounterSnapshot {
        let now = Instant::now();
        // entry 持有分片锁，同一键的自增是串行的
        let mut entry = self
            .entries
            .entry(key.to_owned())
            .or_insert_with(|| RateLimitEntry::open(now, window));

        if entry.is_expired(now) {
            *entry = RateLimitEntry::open(now, window);
        }
        entry.count += 1;

        CounterSnapshot {
            count: entry.count,
            remaining_ttl: entry.reset_at.saturating_duration_since(now),
        }
    }

    pub fn reset(&self, key: &str) {
        self.entries.remove(key);
    }

    /// 移除过期条目，返回移除数量
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 启动定期清理任务；计数器被释放后任务自动退出
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let backend: Weak<Self> = Arc::downgrade(self);
        let every = every.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // 第一次 tick 立即返回
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(backend) = backend.upgrade() else {
                    break;
                };
                let removed = backend.sweep();
                if removed > 0 {
                    debug!(removed, remaining = backend.len(), "Swept expired local rate-limit entries");
                }
            }
        })
    }
}
