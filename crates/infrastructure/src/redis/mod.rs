//! Redis 共享存储实现
//!
//! 多实例部署时各实例共享同一份状态。

mod state;

pub use state::RedisState;
