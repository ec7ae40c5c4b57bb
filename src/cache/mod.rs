//! 查询缓存层：内容寻址键、TTL 类别、SQLite 存储

pub mod key;
pub mod store;
pub mod ttl;

pub use key::{canonical_json, hash_params};
pub use store::{CacheEntry, QueryCache};
pub use ttl::{TtlClass, TtlPolicy};
