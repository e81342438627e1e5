//! 聊天服务应用层
//!
//! 在状态存储与传输层之上实现权限检查、命令分发、钩子流水线、
//! 多 socket 回显与集群事件扇出。

pub mod bus;
pub mod commands;
pub mod direct;
pub mod hooks;
pub mod retry;
pub mod room;
pub mod service;
pub mod user;

pub use bus::ClusterBus;
pub use commands::{Command, COMMAND_NAMES};
pub use direct::DirectMessaging;
pub use hooks::{
    AfterHook, BeforeHook, BeforeOutcome, CommandContext, CommandHooks, CommandOutcome,
    ConnectHook,
};
pub use room::Room;
pub use service::{ChatService, ChatServiceDependencies};
