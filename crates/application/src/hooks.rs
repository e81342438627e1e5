//! 命令钩子流水线
//!
//! 服务可以为每条命令注册 before/after 钩子：
//! 1. 参数校验失败直接应答，不触达钩子
//! 2. before 钩子可以短路应答，或替换命令参数
//! 3. 执行命令
//! 4. after 钩子可以改写执行结果
//! 5. 应答来源 socket
//!
//! 另有连接钩子，在 socket 接入时决定登录用户名。

use crate::commands::Command;
use async_trait::async_trait;
use domain::{ChatError, ChatResult, InstanceId, SocketId};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// 命令执行结果：`Ok(data)` 或命令错误
pub type CommandOutcome = Result<Value, ChatError>;

/// 命令执行上下文
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub user_name: String,
    /// 命令来源 socket
    pub socket_id: SocketId,
    pub instance_id: InstanceId,
}

/// before 钩子的裁决
pub enum BeforeOutcome {
    /// 按原参数继续执行
    Proceed,
    /// 以替换后的参数执行
    Replace(Command),
    /// 短路：跳过执行，直接以该结果应答
    Reply(CommandOutcome),
}

/// 命令执行前钩子
#[async_trait]
pub trait BeforeHook: Send + Sync {
    async fn run(&self, ctx: &CommandContext, command: &Command) -> BeforeOutcome;
}

/// 命令执行后钩子，可改写 `(error, data)`
#[async_trait]
pub trait AfterHook: Send + Sync {
    async fn run(
        &self,
        ctx: &CommandContext,
        command: &Command,
        outcome: CommandOutcome,
    ) -> CommandOutcome;
}

/// 连接钩子
///
/// 返回 `Ok(Some(name))` 指定登录用户名，`Ok(None)` 回退到握手
/// 参数 `user`，`Err` 拒绝本次连接。
#[async_trait]
pub trait ConnectHook: Send + Sync {
    async fn run(&self, socket: SocketId, handshake_user: Option<&str>) -> ChatResult<Option<String>>;
}

/// 钩子注册表，按命令名寻址
#[derive(Default)]
pub struct CommandHooks {
    before: HashMap<&'static str, Arc<dyn BeforeHook>>,
    after: HashMap<&'static str, Arc<dyn AfterHook>>,
    connect: Option<Arc<dyn ConnectHook>>,
}

impl CommandHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_before(&mut self, command: &'static str, hook: Arc<dyn BeforeHook>) {
        self.before.insert(command, hook);
    }

    pub fn set_after(&mut self, command: &'static str, hook: Arc<dyn AfterHook>) {
        self.after.insert(command, hook);
    }

    pub fn set_connect(&mut self, hook: Arc<dyn ConnectHook>) {
        self.connect = Some(hook);
    }

    pub fn before(&self, command: &str) -> Option<&Arc<dyn BeforeHook>> {
        self.before.get(command)
    }

    pub fn after(&self, command: &str) -> Option<&Arc<dyn AfterHook>> {
        self.after.get(command)
    }

    pub fn connect(&self) -> Option<&Arc<dyn ConnectHook>> {
        self.connect.as_ref()
    }
}
