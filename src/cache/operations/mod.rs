/// 缓存操作
/// 提供计数器、通用缓存、旁路读取与失效的实现

// 限流计数器（Redis 与本地降级）
pub mod rate_limit;

// 缓存存储后端
pub mod backend;

// 通用缓存操作
pub mod store;

// 旁路缓存读取
mod fetch;

pub mod invalidation;

// 重新导出常用操作
pub use backend::{CacheBackend, MemoryCacheBackend, RedisCacheBackend, glob_match};
pub use invalidation::{CacheInvalidator, EntityKind};
pub use rate_limit::{LocalCounterBackend, RedisCounterBackend};
pub use store::CacheStore;
