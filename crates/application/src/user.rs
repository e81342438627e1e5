//! 用户命令执行器
//!
//! 把 socket 层的命令面绑定到领域对象上：在线状态、逻辑加入/离开、
//! 驱逐、多 socket 回显与断连清理。
//!
//! 回显事件（`roomJoinedEcho`、`roomLeftEcho`、`directMessageEcho`）
//! 在来源 socket 的应答之后才发往用户回显频道，来源 socket 只收到
//! 应答本身。

use crate::commands::Command;
use crate::direct::DirectMessaging;
use crate::hooks::CommandOutcome;
use crate::room::{store_error, Room};
use crate::service::ServiceState;
use domain::{
    ensure_valid_name, room_channel, user_channel, ChatError, ChatResult, DirectList, Message,
    RoomList, ServerEvent, SocketId, StateStore, StoreError, Transport, TransportError,
};
use serde_json::{json, Value};
use std::sync::Arc;

/// 一次命令执行的完整结果
pub(crate) struct Executed {
    pub outcome: CommandOutcome,
    /// 应答之后发往用户回显频道的事件（跳过来源 socket）
    pub echoes: Vec<ServerEvent>,
    /// 应答之后断开来源 socket
    pub disconnect: bool,
}

impl Executed {
    fn reply(outcome: CommandOutcome) -> Self {
        Self {
            outcome,
            echoes: Vec::new(),
            disconnect: false,
        }
    }

    fn with_echo(outcome: CommandOutcome, echo: ServerEvent) -> Self {
        match outcome {
            Ok(data) => Self {
                outcome: Ok(data),
                echoes: vec![echo],
                disconnect: false,
            },
            err => Self::reply(err),
        }
    }
}

/// 绑定到单个 (用户, socket) 的命令执行器
pub(crate) struct UserCommands {
    state: Arc<ServiceState>,
    user_name: String,
    socket_id: SocketId,
}

impl UserCommands {
    pub fn new(state: Arc<ServiceState>, user_name: impl Into<String>, socket_id: SocketId) -> Self {
        Self {
            state,
            user_name: user_name.into(),
            socket_id,
        }
    }

    fn room(&self, name: &str) -> Room {
        Room::new(self.state.store.clone(), name)
    }

    fn require_direct_messages(&self) -> ChatResult<()> {
        if self.state.config.enable_direct_messages {
            Ok(())
        } else {
            Err(ChatError::NotAllowed)
        }
    }

    fn require_rooms_management(&self) -> ChatResult<()> {
        if self.state.config.enable_rooms_management {
            Ok(())
        } else {
            Err(ChatError::NotAllowed)
        }
    }

    /// 执行一条已通过校验与 before 钩子的命令
    pub async fn execute(&self, command: &Command) -> Executed {
        match command {
            Command::DirectAddToList {
                list_name,
                user_names,
            } => Executed::reply(self.direct_change_list(list_name, user_names, true).await),
            Command::DirectRemoveFromList {
                list_name,
                user_names,
            } => Executed::reply(self.direct_change_list(list_name, user_names, false).await),
            Command::DirectGetAccessList { list_name } => {
                Executed::reply(self.direct_get_list(list_name).await)
            }
            Command::DirectGetWhitelistMode => Executed::reply(self.direct_get_mode().await),
            Command::DirectSetWhitelistMode { mode } => {
                Executed::reply(self.direct_set_mode(*mode).await)
            }
            Command::DirectMessage {
                to_user,
                text_message,
            } => match self.direct_message(to_user, text_message).await {
                Ok((data, message)) => Executed::with_echo(
                    Ok(data),
                    ServerEvent::DirectMessageEcho {
                        to_user: to_user.clone(),
                        message,
                    },
                ),
                Err(err) => Executed::reply(Err(err)),
            },
            Command::RoomCreate {
                room_name,
                whitelist_only,
            } => Executed::reply(self.room_create(room_name, *whitelist_only).await),
            Command::RoomDelete { room_name } => Executed::reply(self.room_delete(room_name).await),
            Command::RoomJoin { room_name } => Executed::with_echo(
                self.room_join(room_name).await,
                ServerEvent::RoomJoinedEcho {
                    room_name: room_name.clone(),
                },
            ),
            Command::RoomLeave { room_name } => Executed::with_echo(
                self.room_leave(room_name).await,
                ServerEvent::RoomLeftEcho {
                    room_name: room_name.clone(),
                },
            ),
            Command::RoomMessage {
                room_name,
                text_message,
            } => Executed::reply(self.room_message(room_name, text_message).await),
            Command::RoomAddToList {
                room_name,
                list_name,
                user_names,
            } => Executed::reply(
                self.room_change_list(room_name, list_name, user_names, true)
                    .await,
            ),
            Command::RoomRemoveFromList {
                room_name,
                list_name,
                user_names,
            } => Executed::reply(
                self.room_change_list(room_name, list_name, user_names, false)
                    .await,
            ),
            Command::RoomGetAccessList {
                room_name,
                list_name,
            } => Executed::reply(self.room_get_list(room_name, list_name).await),
            Command::RoomGetWhitelistMode { room_name } => {
                Executed::reply(self.room_get_mode(room_name).await)
            }
            Command::RoomSetWhitelistMode { room_name, mode } => {
                Executed::reply(self.room_set_mode(room_name, *mode).await)
            }
            Command::RoomHistory { room_name } => {
                Executed::reply(self.room_history(room_name).await)
            }
            Command::ListRooms => Executed::reply(self.list_rooms().await),
            Command::Disconnect { reason } => {
                tracing::debug!(user = %self.user_name, socket = %self.socket_id, reason, "客户端请求断开");
                Executed {
                    outcome: Ok(Value::Null),
                    echoes: Vec::new(),
                    disconnect: true,
                }
            }
        }
    }

    // ---- 私聊 ----

    async fn direct_change_list(
        &self,
        list_name: &str,
        user_names: &[String],
        adding: bool,
    ) -> CommandOutcome {
        self.require_direct_messages()?;
        let list =
            DirectList::parse(list_name).ok_or_else(|| ChatError::no_list(list_name))?;
        let direct = DirectMessaging::new(self.state.store.clone(), &self.user_name);
        if adding {
            direct.add_to_list(&self.user_name, list, user_names).await?;
        } else {
            direct
                .remove_from_list(&self.user_name, list, user_names)
                .await?;
        }
        Ok(Value::Null)
    }

    async fn direct_get_list(&self, list_name: &str) -> CommandOutcome {
        self.require_direct_messages()?;
        let list =
            DirectList::parse(list_name).ok_or_else(|| ChatError::no_list(list_name))?;
        let direct = DirectMessaging::new(self.state.store.clone(), &self.user_name);
        let values = direct.get_list(&self.user_name, list).await?;
        Ok(json!(values))
    }

    async fn direct_get_mode(&self) -> CommandOutcome {
        self.require_direct_messages()?;
        let direct = DirectMessaging::new(self.state.store.clone(), &self.user_name);
        Ok(json!(direct.get_mode(&self.user_name).await?))
    }

    async fn direct_set_mode(&self, mode: bool) -> CommandOutcome {
        self.require_direct_messages()?;
        let direct = DirectMessaging::new(self.state.store.clone(), &self.user_name);
        direct.set_mode(&self.user_name, mode).await?;
        Ok(Value::Null)
    }

    async fn direct_message(
        &self,
        to_user: &str,
        text_message: &str,
    ) -> ChatResult<(Value, Message)> {
        self.require_direct_messages()?;
        let online = self
            .state
            .store
            .is_online(to_user)
            .await
            .map_err(|e| store_error(e, ChatError::no_user_online(to_user)))?;
        if !online {
            return Err(ChatError::no_user_online(to_user));
        }
        let recipient = DirectMessaging::new(self.state.store.clone(), to_user);
        recipient.check_access(&self.user_name).await?;

        let message = Message::new(&self.user_name, text_message);
        let event = ServerEvent::DirectMessage {
            from_user: self.user_name.clone(),
            message: message.clone(),
        };
        // 接收者的全部 socket 都收到消息
        if let Err(err) = self
            .state
            .transport
            .emit_to_channel(&user_channel(to_user), &event)
            .await
        {
            tracing::warn!(error = %err, to_user, "私聊消息投递失败");
        }
        Ok((json!(message), message))
    }

    // ---- 房间 ----

    async fn room_create(&self, room_name: &str, whitelist_only: bool) -> CommandOutcome {
        self.require_rooms_management()?;
        ensure_valid_name(room_name)?;
        match self
            .state
            .store
            .add_room(room_name, Some(&self.user_name), whitelist_only)
            .await
        {
            Ok(()) => Ok(Value::Null),
            Err(StoreError::AlreadyExists { .. }) => Err(ChatError::room_exists(room_name)),
            Err(err) => Err(store_error(err, ChatError::NotAllowed)),
        }
    }

    async fn room_delete(&self, room_name: &str) -> CommandOutcome {
        self.require_rooms_management()?;
        let room = self.room(room_name);
        room.check_is_owner(&self.user_name).await?;
        // 删除前先驱逐全部在场成员
        let members = self
            .state
            .store
            .room_get_list(room_name, RoomList::Userlist)
            .await
            .map_err(|e| store_error(e, ChatError::NotAllowed))?;
        for member in members {
            self.evict(&member, room_name).await?;
        }
        self.state
            .store
            .remove_room(room_name)
            .await
            .map_err(|e| store_error(e, ChatError::NotAllowed))?;
        Ok(Value::Null)
    }

    async fn room_join(&self, room_name: &str) -> CommandOutcome {
        let room = self.room(room_name);
        let newly_joined = room.join(&self.user_name).await?;
        self.state
            .transport
            .join_channel(self.socket_id, &room_channel(room_name))
            .await
            .map_err(TransportError::into_chat_error)?;
        self.state
            .store
            .user_room_add(&self.user_name, room_name)
            .await
            .map_err(|e| store_error(e, ChatError::no_user_online(&self.user_name)))?;

        if newly_joined && self.state.config.enable_userlist_updates {
            let event = ServerEvent::RoomUserJoined {
                room_name: room_name.to_string(),
                user_name: self.user_name.clone(),
            };
            if let Err(err) = self
                .state
                .transport
                .emit_to_channel_except(self.socket_id, &room_channel(room_name), &event)
                .await
            {
                tracing::warn!(error = %err, room = room_name, "加入通知投递失败");
            }
        }
        Ok(Value::Null)
    }

    async fn room_leave(&self, room_name: &str) -> CommandOutcome {
        let room = self.room(room_name);
        let was_member = room.leave(&self.user_name).await?;
        self.leave_room_channels(&self.user_name, room_name).await?;
        self.state
            .store
            .user_room_remove(&self.user_name, room_name)
            .await
            .map_err(|e| store_error(e, ChatError::no_user_online(&self.user_name)))?;

        if was_member && self.state.config.enable_userlist_updates {
            let event = ServerEvent::RoomUserLeft {
                room_name: room_name.to_string(),
                user_name: self.user_name.clone(),
            };
            if let Err(err) = self
                .state
                .transport
                .emit_to_channel(&room_channel(room_name), &event)
                .await
            {
                tracing::warn!(error = %err, room = room_name, "离开通知投递失败");
            }
        }
        Ok(Value::Null)
    }

    async fn room_message(&self, room_name: &str, text_message: &str) -> CommandOutcome {
        let room = self.room(room_name);
        let message = Message::new(&self.user_name, text_message);
        room.message(&self.user_name, message.clone()).await?;

        let event = ServerEvent::RoomMessage {
            room_name: room_name.to_string(),
            user_name: self.user_name.clone(),
            message: message.clone(),
        };
        if let Err(err) = self
            .state
            .transport
            .emit_to_channel_except(self.socket_id, &room_channel(room_name), &event)
            .await
        {
            tracing::warn!(error = %err, room = room_name, "房间消息投递失败");
        }
        Ok(json!(message))
    }

    async fn room_change_list(
        &self,
        room_name: &str,
        list_name: &str,
        user_names: &[String],
        adding: bool,
    ) -> CommandOutcome {
        let list = RoomList::parse(list_name).ok_or_else(|| ChatError::no_list(list_name))?;
        let room = self.room(room_name);
        let lost = if adding {
            room.add_to_list(&self.user_name, list, user_names).await?
        } else {
            room.remove_from_list(&self.user_name, list, user_names)
                .await?
        };
        for user in lost {
            self.evict(&user, room_name).await?;
        }
        Ok(Value::Null)
    }

    async fn room_get_list(&self, room_name: &str, list_name: &str) -> CommandOutcome {
        let list = RoomList::parse(list_name).ok_or_else(|| ChatError::no_list(list_name))?;
        let room = self.room(room_name);
        Ok(json!(room.get_list(&self.user_name, list).await?))
    }

    async fn room_get_mode(&self, room_name: &str) -> CommandOutcome {
        Ok(json!(self.room(room_name).get_mode().await?))
    }

    async fn room_set_mode(&self, room_name: &str, mode: bool) -> CommandOutcome {
        let room = self.room(room_name);
        let lost = room.change_mode(&self.user_name, mode).await?;
        for user in lost {
            self.evict(&user, room_name).await?;
        }
        Ok(Value::Null)
    }

    async fn room_history(&self, room_name: &str) -> CommandOutcome {
        let room = self.room(room_name);
        Ok(json!(room.history(&self.user_name).await?))
    }

    async fn list_rooms(&self) -> CommandOutcome {
        let rooms = self
            .state
            .store
            .list_rooms()
            .await
            .map_err(|e| store_error(e, ChatError::server_error("state store failure")))?;
        Ok(json!(rooms))
    }

    // ---- 驱逐与频道维护 ----

    /// 把用户的全部 socket 移出房间频道，远端实例经集群总线处理
    async fn leave_room_channels(&self, user_name: &str, room_name: &str) -> ChatResult<()> {
        let sockets = match self.state.store.user_sockets(user_name).await {
            Ok(sockets) => sockets,
            // 用户已不在线，没有需要清理的 socket
            Err(StoreError::NotFound { .. }) => return Ok(()),
            Err(err) => return Err(store_error(err, ChatError::no_user_online(user_name))),
        };
        let channel = room_channel(room_name);
        for (instance, socket) in sockets {
            if instance == self.state.instance {
                match self.state.transport.leave_channel(socket, &channel).await {
                    Ok(()) => {}
                    // socket 已消失，忽略
                    Err(TransportError::InvalidSocket { .. }) => {}
                    Err(err) => {
                        tracing::warn!(error = %err, %socket, "移出房间频道失败");
                    }
                }
            } else {
                self.state.bus.room_leave_socket(socket, room_name).await?;
            }
        }
        Ok(())
    }

    /// 驱逐失去访问权的用户并通知
    async fn evict(&self, user_name: &str, room_name: &str) -> ChatResult<()> {
        if let Err(err) = self
            .state
            .store
            .room_remove_from_list(room_name, RoomList::Userlist, &[user_name.to_string()])
            .await
        {
            if !matches!(err, StoreError::NotFound { .. }) {
                return Err(store_error(err, ChatError::NotAllowed));
            }
        }
        self.leave_room_channels(user_name, room_name).await?;
        if let Err(err) = self
            .state
            .store
            .user_room_remove(user_name, room_name)
            .await
        {
            if !matches!(err, StoreError::NotFound { .. }) {
                return Err(store_error(err, ChatError::no_user_online(user_name)));
            }
        }
        let event = ServerEvent::RoomAccessRemoved {
            room_name: room_name.to_string(),
        };
        if let Err(err) = self
            .state
            .transport
            .emit_to_channel(&user_channel(user_name), &event)
            .await
        {
            tracing::warn!(error = %err, user = user_name, "驱逐通知投递失败");
        }
        Ok(())
    }
}

/// socket 断开后的清理
///
/// 从在线集合移除该 socket；只有当用户在所有实例上都不再持有
/// socket 时才离开全部房间并注销。
pub(crate) async fn socket_disconnected(state: &Arc<ServiceState>, user_name: &str, socket: SocketId) {
    if let Err(err) = state
        .store
        .user_socket_remove(user_name, state.instance, socket)
        .await
    {
        if !matches!(err, StoreError::NotFound { .. }) {
            tracing::error!(error = %err, user = user_name, "移除 socket 记录失败");
        }
    }

    let remaining = state.store.user_sockets(user_name).await.unwrap_or_default();
    if !remaining.is_empty() {
        return;
    }

    let rooms = state.store.user_rooms(user_name).await.unwrap_or_default();
    for room_name in rooms {
        let room = Room::new(state.store.clone(), &room_name);
        let was_member = room.leave(user_name).await.unwrap_or(false);
        if was_member && state.config.enable_userlist_updates {
            let event = ServerEvent::RoomUserLeft {
                room_name: room_name.clone(),
                user_name: user_name.to_string(),
            };
            if let Err(err) = state
                .transport
                .emit_to_channel(&room_channel(&room_name), &event)
                .await
            {
                tracing::warn!(error = %err, room = %room_name, "离开通知投递失败");
            }
        }
    }

    if let Err(err) = state.store.logout_user(user_name).await {
        if !matches!(err, StoreError::NotFound { .. }) {
            tracing::error!(error = %err, user = user_name, "注销用户失败");
        }
    }
    tracing::debug!(user = user_name, %socket, "用户最后一个 socket 已断开");
}
