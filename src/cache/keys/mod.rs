/// 缓存键模块
/// 提供键生成函数、客户端标识解析和前缀表

pub mod client_keys;
pub mod prefixes;

pub use client_keys::{UNKNOWN_CLIENT, build_key, client_id, client_id_from_request};
pub use prefixes::CachePrefix;
