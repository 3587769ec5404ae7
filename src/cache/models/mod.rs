/// 缓存数据模型
/// 定义计数器与缓存条目的结构体

pub mod cache_entry;
pub mod rate_limit;

pub use cache_entry::CacheEntry;
pub use rate_limit::{CounterSnapshot, RateLimitDecision, RateLimitEntry};
