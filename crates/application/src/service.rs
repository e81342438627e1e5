//! 聊天服务组合根
//!
//! 把配置、状态存储、传输层与钩子接到一起，负责连接生命周期：
//! 接入 socket、解析登录身份、逐条处理命令（同一 socket 严格按序，
//! 不同 socket 并行）、监听集群总线，以及带超时的优雅关闭。

use crate::bus::{self, ClusterBus};
use crate::commands::Command;
use crate::hooks::{BeforeOutcome, CommandContext, CommandHooks};
use crate::user::{self, UserCommands};
use config::ServiceConfig;
use domain::{
    bus_channel, room_channel, user_channel, valid_name, BusPacket, ChatError, ClientCommand,
    CommandAck, IncomingSocket, InstanceId, ServerEvent, SocketId, StateStore, Transport,
    TransportError,
};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::{JoinHandle, JoinSet};

/// 服务装配依赖
pub struct ChatServiceDependencies {
    pub config: ServiceConfig,
    pub store: Arc<dyn StateStore>,
    pub transport: Arc<dyn Transport>,
    pub hooks: CommandHooks,
}

/// 服务内部共享状态
pub(crate) struct ServiceState {
    pub(crate) config: ServiceConfig,
    pub(crate) store: Arc<dyn StateStore>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) bus: ClusterBus,
    pub(crate) hooks: CommandHooks,
    pub(crate) instance: InstanceId,
}

/// 聊天服务实例
///
/// 每个配置的命名空间对应一个服务；同一进程可以装配多个实例
/// （测试里就是这么用的）。
pub struct ChatService {
    state: Arc<ServiceState>,
    background: Mutex<Vec<JoinHandle<()>>>,
    clients: Arc<Mutex<JoinSet<()>>>,
    active_sockets: Arc<Mutex<HashSet<SocketId>>>,
}

impl ChatService {
    /// 装配并启动服务：接入循环与总线监听立即开始运行
    pub fn start(deps: ChatServiceDependencies) -> Arc<Self> {
        let instance = deps.transport.instance_id();
        let bus = ClusterBus::new(
            deps.transport.clone(),
            Duration::from_millis(deps.config.bus_ack_timeout_ms),
        );
        let state = Arc::new(ServiceState {
            config: deps.config,
            store: deps.store,
            transport: deps.transport,
            bus,
            hooks: deps.hooks,
            instance,
        });
        let service = Arc::new(Self {
            state: state.clone(),
            background: Mutex::new(Vec::new()),
            clients: Arc::new(Mutex::new(JoinSet::new())),
            active_sockets: Arc::new(Mutex::new(HashSet::new())),
        });

        let accept = tokio::spawn(accept_loop(service.clone()));
        let bus_listener = tokio::spawn(bus_loop(state.clone()));
        {
            let mut background = service.background.try_lock().expect("newly created lock");
            background.push(accept);
            background.push(bus_listener);
        }

        tracing::info!(instance = %instance, namespace = %state.config.namespace, "聊天服务已启动");
        service
    }

    /// 本实例标识
    pub fn instance_id(&self) -> InstanceId {
        self.state.instance
    }

    /// 通过集群总线断开某用户在所有实例上的 socket
    pub async fn disconnect_user_sockets(&self, user_name: &str) -> Result<(), ChatError> {
        self.state.bus.disconnect_user_sockets(user_name).await
    }

    /// 优雅关闭
    ///
    /// 停止接受新连接，等待在途命令处理到 `close_timeout`，然后
    /// 强制断开剩余 socket。
    pub async fn close(&self) {
        self.state.transport.close().await;

        let deadline = Duration::from_millis(self.state.config.close_timeout_ms);
        let drained = tokio::time::timeout(deadline, self.drain_clients()).await;

        if drained.is_err() {
            let sockets: Vec<SocketId> =
                self.active_sockets.lock().await.iter().copied().collect();
            tracing::warn!(count = sockets.len(), "关闭超时，强制断开剩余 socket");
            for socket in sockets {
                let _ = self.state.transport.disconnect_socket(socket).await;
            }
            if tokio::time::timeout(deadline, self.drain_clients()).await.is_err() {
                self.clients.lock().await.abort_all();
            }
        }

        let mut background = self.background.lock().await;
        for task in background.drain(..) {
            task.abort();
        }
        tracing::info!(instance = %self.state.instance, "聊天服务已关闭");
    }

    async fn drain_clients(&self) {
        let mut clients = self.clients.lock().await;
        while clients.join_next().await.is_some() {}
    }
}

/// 接入循环，为每个新 socket 启动独立的客户端任务
async fn accept_loop(service: Arc<ChatService>) {
    while let Some(incoming) = service.state.transport.accept().await {
        let state = service.state.clone();
        let active = service.active_sockets.clone();
        service
            .clients
            .lock()
            .await
            .spawn(async move { add_client(state, active, incoming).await });
    }
}

/// 登录解析与命令泵
async fn add_client(
    state: Arc<ServiceState>,
    active: Arc<Mutex<HashSet<SocketId>>>,
    mut incoming: IncomingSocket,
) {
    let socket = incoming.socket_id;

    // 连接钩子优先，回退到握手参数 user
    let resolved = match state.hooks.connect() {
        Some(hook) => hook.run(socket, incoming.handshake_user.as_deref()).await,
        None => Ok(None),
    };
    let user_name = match resolved {
        Ok(Some(name)) => Some(name),
        Ok(None) => incoming.handshake_user.clone(),
        Err(err) => {
            reject(&state, socket, err).await;
            return;
        }
    };
    let user_name = match user_name {
        Some(name) if valid_name(&name) => name,
        _ => {
            reject(&state, socket, ChatError::NoLogin).await;
            return;
        }
    };

    if let Err(err) = state.store.login_user(&user_name, state.instance, socket).await {
        tracing::error!(error = %err, user = %user_name, "登录写入状态存储失败");
        reject(&state, socket, ChatError::server_error("state store failure")).await;
        return;
    }
    if let Err(err) = state
        .transport
        .join_channel(socket, &user_channel(&user_name))
        .await
    {
        tracing::error!(error = %err, user = %user_name, "加入回显频道失败");
        reject(&state, socket, err.into_chat_error()).await;
        return;
    }

    let confirmed = ServerEvent::LoginConfirmed {
        user_name: user_name.clone(),
        auth_data: json!({ "id": socket }),
    };
    let _ = state.transport.emit_to_socket(socket, &confirmed).await;
    tracing::debug!(user = %user_name, %socket, "登录成功");

    active.lock().await.insert(socket);
    // 同一 socket 的命令严格按序处理
    while let Some(command) = incoming.commands.recv().await {
        process_command(&state, &user_name, socket, command).await;
    }
    user::socket_disconnected(&state, &user_name, socket).await;
    active.lock().await.remove(&socket);
}

async fn reject(state: &Arc<ServiceState>, socket: SocketId, err: ChatError) {
    let rejected = ServerEvent::LoginRejected {
        error: err.to_wire(state.config.use_raw_error_objects),
    };
    let _ = state.transport.emit_to_socket(socket, &rejected).await;
    let _ = state.transport.disconnect_socket(socket).await;
    tracing::debug!(%socket, error = %err, "登录被拒绝");
}

/// 命令流水线：校验 → before 钩子 → 执行 → after 钩子 → 应答
async fn process_command(
    state: &Arc<ServiceState>,
    user_name: &str,
    socket: SocketId,
    command: ClientCommand,
) {
    let ClientCommand { name, args, ack } = command;
    let use_raw = state.config.use_raw_error_objects;

    // 校验失败直接应答，不触达钩子
    let mut parsed = match Command::parse(&name, &args) {
        Ok(parsed) => parsed,
        Err(err) => {
            let _ = ack.send(CommandAck::error(err.to_wire(use_raw)));
            return;
        }
    };

    let ctx = CommandContext {
        user_name: user_name.to_string(),
        socket_id: socket,
        instance_id: state.instance,
    };

    if let Some(hook) = state.hooks.before(parsed.name()) {
        match hook.run(&ctx, &parsed).await {
            BeforeOutcome::Proceed => {}
            BeforeOutcome::Replace(replacement) => parsed = replacement,
            BeforeOutcome::Reply(outcome) => {
                let payload = match outcome {
                    Ok(data) => CommandAck::ok(data),
                    Err(err) => CommandAck::error(err.to_wire(use_raw)),
                };
                let _ = ack.send(payload);
                return;
            }
        }
    }

    let executor = UserCommands::new(state.clone(), user_name, socket);
    let mut executed = executor.execute(&parsed).await;

    if let Some(hook) = state.hooks.after(parsed.name()) {
        executed.outcome = hook.run(&ctx, &parsed, executed.outcome).await;
    }

    // 先应答来源 socket，再向用户的其它 socket 补发回显
    let succeeded = executed.outcome.is_ok();
    let payload = match executed.outcome {
        Ok(data) => CommandAck::ok(data),
        Err(err) => CommandAck::error(err.to_wire(use_raw)),
    };
    let _ = ack.send(payload);

    if succeeded {
        for echo in executed.echoes {
            if let Err(err) = state
                .transport
                .emit_to_channel_except(socket, &user_channel(user_name), &echo)
                .await
            {
                tracing::warn!(error = %err, user = user_name, "回显投递失败");
            }
        }
        if executed.disconnect {
            let _ = state.transport.disconnect_socket(socket).await;
        }
    }
}

/// 集群总线监听
async fn bus_loop(state: Arc<ServiceState>) {
    let mut packets = state.transport.subscribe_broadcast();
    let channel = bus_channel(&state.config.namespace);
    tracing::debug!(instance = %state.instance, channel = %channel, "总线监听已启动");
    while let Some(packet) = packets.recv().await {
        handle_bus_packet(&state, packet).await;
    }
}

async fn handle_bus_packet(state: &Arc<ServiceState>, packet: BusPacket) {
    match packet.event.as_str() {
        bus::ROOM_LEAVE_SOCKET => {
            let socket = packet
                .args
                .first()
                .cloned()
                .and_then(|v| serde_json::from_value::<SocketId>(v).ok());
            let room = packet.args.get(1).and_then(|v| v.as_str().map(str::to_string));
            let (Some(socket), Some(room)) = (socket, room) else {
                tracing::warn!(event = %packet.event, "总线事件参数不完整");
                return;
            };
            match state
                .transport
                .leave_channel(socket, &room_channel(&room))
                .await
            {
                Ok(()) => {
                    if let Some(correlation) = packet.correlation {
                        let _ = state
                            .bus
                            .reply_socket_room_left(socket, &room, correlation)
                            .await;
                    }
                }
                // 不属于本实例的 socket，静默忽略
                Err(TransportError::InvalidSocket { .. }) => {}
                Err(err) => {
                    tracing::warn!(error = %err, %socket, "处理 roomLeaveSocket 失败");
                }
            }
        }
        bus::SOCKET_ROOM_LEFT => {
            if let Some(correlation) = packet.correlation {
                state.bus.complete(correlation).await;
            }
        }
        bus::DISCONNECT_USER_SOCKETS => {
            let Some(user_name) = packet.args.first().and_then(|v| v.as_str()) else {
                tracing::warn!(event = %packet.event, "总线事件参数不完整");
                return;
            };
            let sockets = state.store.user_sockets(user_name).await.unwrap_or_default();
            for (instance, socket) in sockets {
                if instance == state.instance {
                    let _ = state.transport.disconnect_socket(socket).await;
                }
            }
        }
        other => {
            tracing::debug!(event = other, "忽略未知总线事件");
        }
    }
}
