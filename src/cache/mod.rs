// 缓存模块
// 包含 Redis 连接管理、键生成、数据结构和操作逻辑

pub mod connection;
pub mod keys;
pub mod models;
pub mod operations;

// 重新导出常用类型，方便其他模块使用
pub use connection::{ConnectionManager, ConnectionStatus};
pub use keys::{CachePrefix, build_key};
pub use operations::{CacheInvalidator, CacheStore, EntityKind};
