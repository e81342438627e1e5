//! 进程内传输层
//!
//! 多个传输实例挂在同一个 `MemoryHub` 上，频道成员资格与集群广播
//! 都经过枢纽，因此可以在单个进程里搭出多实例拓扑。测试通过
//! `TestClient` 扮演客户端：发命令等应答、收事件帧。
//!
//! 一个实例只能对自己持有的 socket 做 join/leave/disconnect；向频道
//! 发送则跨实例扇出。

use async_trait::async_trait;
use domain::{
    BusPacket, ClientCommand, CommandAck, IncomingSocket, InstanceId, ServerEvent, SocketId,
    Transport, TransportError, TransportResult,
};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};

/// 客户端收到的一帧事件：(事件名, 位置参数)
pub type EventFrame = (String, Vec<Value>);

struct HubSocket {
    instance: InstanceId,
    events: mpsc::UnboundedSender<EventFrame>,
    commands: mpsc::UnboundedSender<ClientCommand>,
}

#[derive(Default)]
struct HubInner {
    sockets: HashMap<SocketId, HubSocket>,
    channels: HashMap<String, HashSet<SocketId>>,
}

/// 进程内传输枢纽
///
/// 持有全部实例的 socket 注册表、频道成员与集群广播订阅。
pub struct MemoryHub {
    inner: RwLock<HubInner>,
    buses: std::sync::Mutex<Vec<mpsc::UnboundedSender<BusPacket>>>,
}

impl MemoryHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: RwLock::new(HubInner::default()),
            buses: std::sync::Mutex::new(Vec::new()),
        })
    }

    /// 频道当前成员，测试断言用
    pub async fn channel_members(&self, channel: &str) -> Vec<SocketId> {
        let inner = self.inner.read().await;
        inner
            .channels
            .get(channel)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    async fn register_socket(&self, socket: SocketId, record: HubSocket) {
        self.inner.write().await.sockets.insert(socket, record);
    }

    /// 摘除 socket：注册表与全部频道成员资格一并清理
    async fn drop_socket(&self, socket: SocketId) {
        let mut inner = self.inner.write().await;
        inner.sockets.remove(&socket);
        for members in inner.channels.values_mut() {
            members.remove(&socket);
        }
    }

    async fn deliver_command(&self, socket: SocketId, command: ClientCommand) -> TransportResult<()> {
        let inner = self.inner.read().await;
        let record = inner
            .sockets
            .get(&socket)
            .ok_or(TransportError::Closed)?;
        record.commands.send(command).map_err(|_| TransportError::Closed)
    }

    fn add_bus_subscriber(&self) -> mpsc::UnboundedReceiver<BusPacket> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.buses.lock().expect("bus registry poisoned").push(tx);
        rx
    }

    fn broadcast(&self, packet: BusPacket) {
        let mut buses = self.buses.lock().expect("bus registry poisoned");
        // 发送失败说明订阅者已退出，顺手摘掉
        buses.retain(|bus| bus.send(packet.clone()).is_ok());
    }
}

/// 测试客户端
///
/// 对应一个已打开的 socket：`emit` 发命令并等待应答，`recv_event`
/// 读取服务端推送的事件帧。
pub struct TestClient {
    hub: Arc<MemoryHub>,
    socket_id: SocketId,
    events: mpsc::UnboundedReceiver<EventFrame>,
}

impl TestClient {
    pub fn socket_id(&self) -> SocketId {
        self.socket_id
    }

    /// 发送命令并等待 `(error, data)` 应答
    pub async fn emit(&self, name: &str, args: Vec<Value>) -> TransportResult<CommandAck> {
        let (tx, rx) = oneshot::channel();
        let command = ClientCommand {
            name: name.to_string(),
            args,
            ack: tx,
        };
        self.hub.deliver_command(self.socket_id, command).await?;
        rx.await.map_err(|_| TransportError::Closed)
    }

    /// 读取下一帧事件，socket 关闭后返回 `None`
    pub async fn recv_event(&mut self) -> Option<EventFrame> {
        self.events.recv().await
    }

    /// 客户端侧主动断开
    pub async fn close(&self) {
        self.hub.drop_socket(self.socket_id).await;
    }
}

/// 进程内传输实例
pub struct MemoryTransport {
    instance: InstanceId,
    hub: Arc<MemoryHub>,
    incoming_tx: std::sync::Mutex<Option<mpsc::UnboundedSender<IncomingSocket>>>,
    incoming_rx: Mutex<mpsc::UnboundedReceiver<IncomingSocket>>,
}

impl MemoryTransport {
    pub fn new(hub: Arc<MemoryHub>) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            instance: InstanceId::new(),
            hub,
            incoming_tx: std::sync::Mutex::new(Some(tx)),
            incoming_rx: Mutex::new(rx),
        })
    }

    /// 打开一个新的客户端 socket
    pub async fn open_socket(&self, handshake_user: Option<&str>) -> TransportResult<TestClient> {
        let incoming_tx = self
            .incoming_tx
            .lock()
            .expect("incoming registry poisoned")
            .clone()
            .ok_or(TransportError::Closed)?;

        let socket_id = SocketId::new();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        self.hub
            .register_socket(
                socket_id,
                HubSocket {
                    instance: self.instance,
                    events: events_tx,
                    commands: commands_tx,
                },
            )
            .await;

        let incoming = IncomingSocket {
            socket_id,
            handshake_user: handshake_user.map(str::to_string),
            commands: commands_rx,
        };
        if incoming_tx.send(incoming).is_err() {
            self.hub.drop_socket(socket_id).await;
            return Err(TransportError::Closed);
        }

        Ok(TestClient {
            hub: self.hub.clone(),
            socket_id,
            events: events_rx,
        })
    }

    fn frame(event: &ServerEvent) -> EventFrame {
        (event.name().to_string(), event.args())
    }

    /// socket 必须存在且属于本实例
    fn check_owned(&self, inner: &HubInner, socket: SocketId) -> TransportResult<()> {
        match inner.sockets.get(&socket) {
            Some(record) if record.instance == self.instance => Ok(()),
            _ => Err(TransportError::invalid_socket(socket)),
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn instance_id(&self) -> InstanceId {
        self.instance
    }

    async fn accept(&self) -> Option<IncomingSocket> {
        self.incoming_rx.lock().await.recv().await
    }

    async fn emit_to_socket(&self, socket: SocketId, event: &ServerEvent) -> TransportResult<()> {
        let inner = self.hub.inner.read().await;
        let record = inner
            .sockets
            .get(&socket)
            .ok_or_else(|| TransportError::invalid_socket(socket))?;
        let _ = record.events.send(Self::frame(event));
        Ok(())
    }

    async fn emit_to_channel(&self, channel: &str, event: &ServerEvent) -> TransportResult<()> {
        let inner = self.hub.inner.read().await;
        if let Some(members) = inner.channels.get(channel) {
            for socket in members {
                if let Some(record) = inner.sockets.get(socket) {
                    let _ = record.events.send(Self::frame(event));
                }
            }
        }
        Ok(())
    }

    async fn emit_to_channel_except(
        &self,
        sender: SocketId,
        channel: &str,
        event: &ServerEvent,
    ) -> TransportResult<()> {
        let inner = self.hub.inner.read().await;
        if let Some(members) = inner.channels.get(channel) {
            for socket in members {
                if *socket == sender {
                    continue;
                }
                if let Some(record) = inner.sockets.get(socket) {
                    let _ = record.events.send(Self::frame(event));
                }
            }
        }
        Ok(())
    }

    async fn join_channel(&self, socket: SocketId, channel: &str) -> TransportResult<()> {
        let mut inner = self.hub.inner.write().await;
        self.check_owned(&inner, socket)?;
        inner
            .channels
            .entry(channel.to_string())
            .or_default()
            .insert(socket);
        Ok(())
    }

    async fn leave_channel(&self, socket: SocketId, channel: &str) -> TransportResult<()> {
        let mut inner = self.hub.inner.write().await;
        self.check_owned(&inner, socket)?;
        if let Some(members) = inner.channels.get_mut(channel) {
            members.remove(&socket);
        }
        Ok(())
    }

    async fn disconnect_socket(&self, socket: SocketId) -> TransportResult<()> {
        {
            let inner = self.hub.inner.read().await;
            self.check_owned(&inner, socket)?;
            if let Some(record) = inner.sockets.get(&socket) {
                let _ = record.events.send(Self::frame(&ServerEvent::Disconnect));
            }
        }
        self.hub.drop_socket(socket).await;
        Ok(())
    }

    async fn broadcast(&self, packet: BusPacket) -> TransportResult<()> {
        self.hub.broadcast(packet);
        Ok(())
    }

    fn subscribe_broadcast(&self) -> mpsc::UnboundedReceiver<BusPacket> {
        self.hub.add_bus_subscriber()
    }

    async fn close(&self) {
        // 丢掉接入端的发送侧，accept 消化完队列后返回 None
        self.incoming_tx
            .lock()
            .expect("incoming registry poisoned")
            .take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_channel_membership_and_fanout() {
        let hub = MemoryHub::new();
        let transport = MemoryTransport::new(hub.clone());

        let mut c1 = transport.open_socket(Some("user1")).await.unwrap();
        let mut c2 = transport.open_socket(Some("user2")).await.unwrap();

        transport.join_channel(c1.socket_id(), "room:room1").await.unwrap();
        transport.join_channel(c2.socket_id(), "room:room1").await.unwrap();
        assert_eq!(hub.channel_members("room:room1").await.len(), 2);

        let event = ServerEvent::RoomAccessRemoved {
            room_name: "room1".to_string(),
        };
        transport
            .emit_to_channel_except(c1.socket_id(), "room:room1", &event)
            .await
            .unwrap();

        let (name, args) = c2.recv_event().await.unwrap();
        assert_eq!(name, "roomAccessRemoved");
        assert_eq!(args, vec![json!("room1")]);

        // 发送者被跳过
        transport.emit_to_channel("room:room1", &event).await.unwrap();
        let (name, _) = c1.recv_event().await.unwrap();
        assert_eq!(name, "roomAccessRemoved");
    }

    #[tokio::test]
    async fn test_foreign_socket_is_rejected() {
        let hub = MemoryHub::new();
        let t1 = MemoryTransport::new(hub.clone());
        let t2 = MemoryTransport::new(hub.clone());

        let client = t1.open_socket(None).await.unwrap();

        // 其它实例不能操作别人的 socket
        let err = t2.join_channel(client.socket_id(), "room:room1").await;
        assert!(matches!(err, Err(TransportError::InvalidSocket { .. })));
        let err = t2.disconnect_socket(client.socket_id()).await;
        assert!(matches!(err, Err(TransportError::InvalidSocket { .. })));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_instances() {
        let hub = MemoryHub::new();
        let t1 = MemoryTransport::new(hub.clone());
        let t2 = MemoryTransport::new(hub.clone());

        let mut rx1 = t1.subscribe_broadcast();
        let mut rx2 = t2.subscribe_broadcast();

        let packet = BusPacket {
            event: "testEvent".to_string(),
            args: vec![json!("x")],
            origin: t1.instance_id(),
            correlation: None,
        };
        t1.broadcast(packet).await.unwrap();

        // 广播到达包括来源在内的全部实例
        assert_eq!(rx1.recv().await.unwrap().event, "testEvent");
        assert_eq!(rx2.recv().await.unwrap().event, "testEvent");
    }

    #[tokio::test]
    async fn test_disconnect_sends_event_and_cleans_up() {
        let hub = MemoryHub::new();
        let transport = MemoryTransport::new(hub.clone());

        let mut client = transport.open_socket(None).await.unwrap();
        transport
            .join_channel(client.socket_id(), "room:room1")
            .await
            .unwrap();

        transport.disconnect_socket(client.socket_id()).await.unwrap();

        let (name, _) = client.recv_event().await.unwrap();
        assert_eq!(name, "disconnect");
        assert!(client.recv_event().await.is_none());
        assert!(hub.channel_members("room:room1").await.is_empty());
    }

    #[tokio::test]
    async fn test_close_stops_accepting() {
        let hub = MemoryHub::new();
        let transport = MemoryTransport::new(hub.clone());

        transport.close().await;
        assert!(matches!(
            transport.open_socket(None).await,
            Err(TransportError::Closed)
        ));
        assert!(transport.accept().await.is_none());
    }
}
