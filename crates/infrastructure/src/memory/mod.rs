//! 进程内实现
//!
//! 单实例部署的内存状态存储，以及把多个"实例"接在同一个枢纽上的
//! 进程内传输层。

mod state;
mod transport;

pub use state::MemoryState;
pub use transport::{MemoryHub, MemoryTransport, TestClient};
