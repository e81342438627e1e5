//! 传输层抽象接口
//!
//! 具体的 socket 实现（websocket、TCP 等）在这层之外。核心只依赖
//! 接受连接、按 socket/频道发送事件、频道成员管理与集群广播。
//!
//! 频道有两类：房间频道（房间内全部 socket）与用户回显频道（同一
//! 用户跨实例的全部 socket）。频道的跨实例扇出由具体传输负责；一个
//! 实例只能对自己持有的 socket 做 join/leave/disconnect。

use crate::errors::ChatError;
use crate::events::ServerEvent;
use crate::ids::{InstanceId, SocketId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// 传输层错误
#[derive(Error, Debug)]
pub enum TransportError {
    /// socket 未知或不属于本实例
    #[error("未知的 socket: {socket_id}")]
    InvalidSocket { socket_id: SocketId },

    /// 传输已关闭
    #[error("传输已关闭")]
    Closed,

    /// 底层传输失败
    #[error("传输错误: {message}")]
    Backend { message: String },
}

impl TransportError {
    pub fn invalid_socket(socket_id: SocketId) -> Self {
        Self::InvalidSocket { socket_id }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// 折叠为命令错误
    pub fn into_chat_error(self) -> ChatError {
        match self {
            TransportError::InvalidSocket { socket_id } => ChatError::invalid_socket(socket_id),
            other => ChatError::server_error(other.to_string()),
        }
    }
}

/// 传输结果类型
pub type TransportResult<T> = Result<T, TransportError>;

/// 命令应答，`(error, data)` 二元组，缺省侧为 null
#[derive(Debug, Clone, PartialEq)]
pub struct CommandAck {
    pub error: Value,
    pub data: Value,
}

impl CommandAck {
    pub fn ok(data: Value) -> Self {
        Self {
            error: Value::Null,
            data,
        }
    }

    pub fn error(error: Value) -> Self {
        Self {
            error,
            data: Value::Null,
        }
    }
}

/// 客户端发来的一条命令
#[derive(Debug)]
pub struct ClientCommand {
    pub name: String,
    pub args: Vec<Value>,
    /// 应答回调，每条命令恰好应答一次
    pub ack: oneshot::Sender<CommandAck>,
}

/// 新接入的 socket
#[derive(Debug)]
pub struct IncomingSocket {
    pub socket_id: SocketId,
    /// 握手查询参数 `user`
    pub handshake_user: Option<String>,
    /// 命令流，同一 socket 的命令按序处理
    pub commands: mpsc::UnboundedReceiver<ClientCommand>,
}

/// 集群广播包
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusPacket {
    pub event: String,
    pub args: Vec<Value>,
    pub origin: InstanceId,
    pub correlation: Option<Uuid>,
}

/// 房间频道名
pub fn room_channel(room: &str) -> String {
    format!("room:{room}")
}

/// 用户回显频道名
pub fn user_channel(user: &str) -> String {
    format!("user:{user}")
}

/// 集群总线的保留频道名
pub fn bus_channel(namespace: &str) -> String {
    format!("{namespace}:bus")
}

/// 传输层接口
#[async_trait]
pub trait Transport: Send + Sync {
    /// 本实例的稳定标识
    fn instance_id(&self) -> InstanceId;

    /// 等待下一个接入的 socket，传输关闭后返回 `None`
    async fn accept(&self) -> Option<IncomingSocket>;

    async fn emit_to_socket(&self, socket: SocketId, event: &ServerEvent) -> TransportResult<()>;

    async fn emit_to_channel(&self, channel: &str, event: &ServerEvent) -> TransportResult<()>;

    /// 向频道发送，跳过指定的发送者 socket
    async fn emit_to_channel_except(
        &self,
        sender: SocketId,
        channel: &str,
        event: &ServerEvent,
    ) -> TransportResult<()>;

    async fn join_channel(&self, socket: SocketId, channel: &str) -> TransportResult<()>;

    async fn leave_channel(&self, socket: SocketId, channel: &str) -> TransportResult<()>;

    /// 断开本实例持有的 socket
    async fn disconnect_socket(&self, socket: SocketId) -> TransportResult<()>;

    /// 集群广播，供 ClusterBus 使用
    async fn broadcast(&self, packet: BusPacket) -> TransportResult<()>;

    /// 订阅集群广播流
    fn subscribe_broadcast(&self) -> mpsc::UnboundedReceiver<BusPacket>;

    /// 停止接受新连接
    async fn close(&self);
}
