//! 基础设施实现
//!
//! 状态存储的两个参考实现（进程内存与 Redis 共享存储），以及供
//! 测试和单进程部署使用的进程内传输层。

pub mod memory;
pub mod redis;

pub use self::memory::{MemoryHub, MemoryState, MemoryTransport, TestClient};
pub use self::redis::RedisState;
