//! 聊天服务核心领域模型
//!
//! 包含命令错误、名称校验、消息实体、服务端事件，以及状态存储与
//! 传输层的抽象接口。

pub mod errors;
pub mod events;
pub mod ids;
pub mod lists;
pub mod message;
pub mod state;
pub mod transport;
pub mod validation;

// 重新导出常用类型
pub use errors::*;
pub use events::*;
pub use ids::*;
pub use lists::*;
pub use message::*;
pub use state::*;
pub use transport::*;
pub use validation::*;
