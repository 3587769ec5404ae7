use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

/// 本地计数器条目
#[derive(Debug, Clone, Copy)]
pub struct RateLimitEntry {
    pub count: u64,
    pub reset_at: Instant,
}

impl RateLimitEntry {
    /// 窗口从首次请求开始计算
    pub fn open(now: Instant, window: Duration) -> Self {
        Self {
            count: 0,
            reset_at: now + window,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.reset_at
    }
}

/// 一次自增后的计数快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub count: u64,
    pub remaining_ttl: Duration,
}

/// 限流判定结果
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitDecision {
    pub limited: bool,
    pub limit: u32,
    pub count: u64,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    #[serde(skip)]
    pub reset_after: Duration,
}

impl RateLimitDecision {
    pub fn from_snapshot(max_requests: u32, snapshot: CounterSnapshot) -> Self {
        let reset_at = Utc::now()
            + chrono::Duration::from_std(snapshot.remaining_ttl)
                .unwrap_or_else(|_| chrono::Duration::zero());

        Self {
            limited: snapshot.count > u64::from(max_requests),
            limit: max_requests,
            count: snapshot.count,
            remaining: u64::from(max_requests).saturating_sub(snapshot.count) as u32,
            reset_at,
            reset_after: snapshot.remaining_ttl,
        }
    }

    /// `Retry-After` 秒数，向上取整
    pub fn retry_after_secs(&self) -> u64 {
        self.reset_after.as_millis().div_ceil(1000) as u64
    }
}
