use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use redis::AsyncCommands;
use tokio::time::Instant;

use crate::cache::connection::ConnectionManager;
use crate::cache::models::CacheEntry;
use crate::error::CacheError;

const SCAN_BATCH: usize = 200;

/// 缓存存储后端，值为已序列化的字符串
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set_raw(&self, key: &str, value: String, ttl_seconds: u64) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// 删除所有匹配 glob 模式的键，返回删除数量
    async fn delete_matching(&self, pattern: &str) -> Result<u64, CacheError>;
}

/// Redis 缓存后端
pub struct RedisCacheBackend {
    connection: Arc<ConnectionManager>,
}

impl RedisCacheBackend {
    pub fn new(connection: Arc<ConnectionManager>) -> Self {
        Self { connection }
    }

    /// 扫描一页并删除其中的键，返回下一个游标和删除数量
    async fn delete_page(&self, pattern: &str, cursor: u64) -> Result<(u64, u64), CacheError> {
        let pattern = pattern.to_owned();
        let (next, keys): (u64, Vec<String>) = self
            .connection
            .execute_bulk(move |mut conn| async move {
                redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(SCAN_BATCH)
                    .query_async(&mut conn)
                    .await
            })
            .await?;

        if keys.is_empty() {
            return Ok((next, 0));
        }
        let removed: u64 = self
            .connection
            .execute_bulk(move |mut conn| async move { conn.del(&keys).await })
            .await?;
        Ok((next, removed))
    }
}

#[async_trait]
impl CacheBackend for RedisCacheBackend {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, CacheError> {
        let key = key.to_owned();
        self.connection
            .execute(move |mut conn| async move {
                let result: Option<String> = conn.get(&key).await?;
                Ok(result)
            })
            .await
    }

    async fn set_raw(&self, key: &str, value: String, ttl_seconds: u64) -> Result<(), CacheError> {
        let key = key.to_owned();
        self.connection
            .execute(move |mut conn| async move {
                let _: () = conn.set_ex(&key, value, ttl_seconds).await?;
                Ok(())
            })
            .await
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let key = key.to_owned();
        self.connection
            .execute(move |mut conn| async move {
                let removed: u64 = conn.del(&key).await?;
                Ok(removed > 0)
            })
            .await
    }

    async fn delete_matching(&self, pattern: &str) -> Result<u64, CacheError> {
        // 使用 SCAN 而不是 KEYS，避免阻塞 Redis；每次往返单独计时
        let mut cursor: u64 = 0;
        let mut deleted: u64 = 0;
        loop {
            match self.delete_page(pattern, cursor).await {
                Ok((next, removed)) => {
                    deleted += removed;
                    if next == 0 {
                        return Ok(deleted);
                    }
                    cursor = next;
                }
                Err(err) if deleted > 0 => {
                    tracing::debug!(pattern, deleted, error = %err, "Pattern delete stopped early");
                    return Ok(deleted);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// 进程内缓存后端，用于开发环境和测试
#[derive(Default)]
pub struct MemoryCacheBackend {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let value = self
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone());

        if value.is_none() {
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        }
        Ok(value)
    }

    async fn set_raw(&self, key: &str, value: String, ttl_seconds: u64) -> Result<(), CacheError> {
        self.entries
            .insert(key.to_owned(), CacheEntry::new(value, ttl_seconds));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| !entry.is_expired(now)))
    }

    async fn delete_matching(&self, pattern: &str) -> Result<u64, CacheError> {
        let now = Instant::now();
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| glob_match(pattern, entry.key()))
            .map(|entry| entry.key().clone())
            .collect();

        let deleted = keys
            .iter()
            .filter_map(|key| self.entries.remove(key))
            .filter(|(_, entry)| !entry.is_expired(now))
            .count();
        Ok(deleted as u64)
    }
}

/// Redis 风格的 glob 匹配，与 `SCAN MATCH` 语义一致：
/// `*`、`?`、`[abc]`、`[a-z]`、`[^a]` 以及 `\` 转义
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    // 最近一个 `*` 的位置，以及它当前吞掉的文本终点
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                star = Some((p, t));
                p += 1;
                continue;
            }
            Some('?') => {
                p += 1;
                t += 1;
                continue;
            }
            Some('[') => {
                let (matched, next) = match_class(&pattern, p, text[t]);
                if matched {
                    p = next;
                    t += 1;
                    continue;
                }
            }
            Some('\\') if p + 1 < pattern.len() && pattern[p + 1] == text[t] => {
                p += 2;
                t += 1;
                continue;
            }
            Some(&c) if c != '\\' && c == text[t] => {
                p += 1;
                t += 1;
                continue;
            }
            _ => {}
        }

        match star {
            Some((star_p, star_t)) => {
                p = star_p + 1;
                t = star_t + 1;
                star = Some((star_p, star_t + 1));
            }
            None => return false,
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

/// 匹配从 `start`（指向 `[`）开始的字符类，返回是否匹配以及类之后的位置。
/// 未闭合的类延伸到模式末尾，范围两端可以颠倒，和 Redis 相同
fn match_class(pattern: &[char], start: usize, c: char) -> (bool, usize) {
    let mut i = start + 1;
    let negate = pattern.get(i) == Some(&'^');
    if negate {
        i += 1;
    }

    let mut matched = false;
    while i < pattern.len() && pattern[i] != ']' {
        if pattern[i] == '\\' && i + 1 < pattern.len() {
            i += 1;
            matched |= pattern[i] == c;
        } else if i + 2 < pattern.len() && pattern[i + 1] == '-' {
            let (lo, hi) = if pattern[i] <= pattern[i + 2] {
                (pattern[i], pattern[i + 2])
            } else {
                (pattern[i + 2], pattern[i])
            };
            matched |= (lo..=hi).contains(&c);
            i += 2;
        } else {
            matched |= pattern[i] == c;
        }
        i += 1;
    }

    (matched != negate, (i + 1).min(pattern.len()))
}
