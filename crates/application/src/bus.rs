//! 集群总线
//!
//! 架在 `Transport::broadcast` 上的发布/订阅层，占用保留频道。
//! 支持命名事件与按关联 id 的请求/应答：请求事件在 `bus_ack_timeout`
//! 内未收到应答按失败处理，重试一次后以 `serverError` 上浮。
//!
//! 两个必备事件：
//! - `roomLeaveSocket(socketId, roomName)`：让持有该 socket 的实例
//!   将其移出房间频道，完成后回发 `socketRoomLeft`
//! - `disconnectUserSockets(userName)`：让每个实例断开该用户的本地
//!   socket

use crate::retry::{retry_async, Backoff, RetryConfig};
use domain::{BusPacket, ChatError, ChatResult, SocketId, Transport};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use uuid::Uuid;

pub const ROOM_LEAVE_SOCKET: &str = "roomLeaveSocket";
pub const SOCKET_ROOM_LEFT: &str = "socketRoomLeft";
pub const DISCONNECT_USER_SOCKETS: &str = "disconnectUserSockets";

const ACK_TIMEOUT_MESSAGE: &str = "cluster bus ack timeout";

/// 集群事件扇出
pub struct ClusterBus {
    transport: Arc<dyn Transport>,
    ack_timeout: Duration,
    pending: Mutex<HashMap<Uuid, oneshot::Sender<()>>>,
}

impl ClusterBus {
    pub fn new(transport: Arc<dyn Transport>, ack_timeout: Duration) -> Self {
        Self {
            transport,
            ack_timeout,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// 请求远端实例把 socket 移出房间频道，等待应答
    pub async fn room_leave_socket(&self, socket: SocketId, room: &str) -> ChatResult<()> {
        let config = RetryConfig {
            max_attempts: 2,
            backoff: Backoff::exponential(Duration::from_millis(100)),
            retryable_errors: vec![ACK_TIMEOUT_MESSAGE.to_string()],
        };
        retry_async(config, || self.room_leave_socket_once(socket, room)).await
    }

    async fn room_leave_socket_once(&self, socket: SocketId, room: &str) -> ChatResult<()> {
        let correlation = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(correlation, tx);

        let packet = BusPacket {
            event: ROOM_LEAVE_SOCKET.to_string(),
            args: vec![json!(socket), json!(room)],
            origin: self.transport.instance_id(),
            correlation: Some(correlation),
        };
        if let Err(err) = self.transport.broadcast(packet).await {
            self.pending.lock().await.remove(&correlation);
            tracing::error!(error = %err, "集群广播失败");
            return Err(ChatError::server_error("cluster broadcast failure"));
        }

        match tokio::time::timeout(self.ack_timeout, rx).await {
            Ok(Ok(())) => Ok(()),
            _ => {
                self.pending.lock().await.remove(&correlation);
                tracing::warn!(%socket, room, "等待 socketRoomLeft 应答超时");
                Err(ChatError::server_error(ACK_TIMEOUT_MESSAGE))
            }
        }
    }

    /// 通知全部实例断开某用户的本地 socket
    pub async fn disconnect_user_sockets(&self, user_name: &str) -> ChatResult<()> {
        let packet = BusPacket {
            event: DISCONNECT_USER_SOCKETS.to_string(),
            args: vec![json!(user_name)],
            origin: self.transport.instance_id(),
            correlation: None,
        };
        self.transport.broadcast(packet).await.map_err(|err| {
            tracing::error!(error = %err, "集群广播失败");
            ChatError::server_error("cluster broadcast failure")
        })
    }

    /// 响应端完成 `roomLeaveSocket` 后回发应答
    pub async fn reply_socket_room_left(
        &self,
        socket: SocketId,
        room: &str,
        correlation: Uuid,
    ) -> ChatResult<()> {
        let packet = BusPacket {
            event: SOCKET_ROOM_LEFT.to_string(),
            args: vec![json!(socket), json!(room)],
            origin: self.transport.instance_id(),
            correlation: Some(correlation),
        };
        self.transport.broadcast(packet).await.map_err(|err| {
            tracing::error!(error = %err, "集群广播失败");
            ChatError::server_error("cluster broadcast failure")
        })
    }

    /// 监听循环在收到应答事件时调用
    pub async fn complete(&self, correlation: Uuid) {
        if let Some(tx) = self.pending.lock().await.remove(&correlation) {
            let _ = tx.send(());
        }
    }
}
