//! 状态存储抽象接口
//!
//! 房间、用户、在线注册表与 socket 注册表的统一后端。提供内存与
//! 共享（Redis）两种实现，二者语义必须一致。接口上的每一次调用
//! 在存储内都是原子的；跨调用的组合操作默认不构成事务。

use crate::ids::{InstanceId, SocketId};
use crate::lists::{DirectList, RoomList};
use crate::message::Message;
use async_trait::async_trait;
use thiserror::Error;

/// 存储后端错误
#[derive(Error, Debug)]
pub enum StoreError {
    /// 实体不存在
    #[error("不存在: {key}")]
    NotFound { key: String },

    /// 实体已存在
    #[error("已存在: {key}")]
    AlreadyExists { key: String },

    /// 后端失败（连接、序列化等）
    #[error("存储后端错误: {message}")]
    Backend { message: String },
}

impl StoreError {
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    pub fn already_exists(key: impl Into<String>) -> Self {
        Self::AlreadyExists { key: key.into() }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

/// 存储结果类型
pub type StoreResult<T> = Result<T, StoreError>;

/// 状态存储接口
///
/// 所有方法以实体名寻址。房间操作在房间不存在时返回 `NotFound`，
/// 用户操作同理。
#[async_trait]
pub trait StateStore: Send + Sync {
    // ---- 房间 ----

    /// 创建房间，已存在时返回 `AlreadyExists`
    async fn add_room(
        &self,
        name: &str,
        owner: Option<&str>,
        whitelist_only: bool,
    ) -> StoreResult<()>;

    /// 删除房间及其全部状态
    async fn remove_room(&self, name: &str) -> StoreResult<()>;

    async fn room_exists(&self, name: &str) -> StoreResult<bool>;

    async fn list_rooms(&self) -> StoreResult<Vec<String>>;

    async fn room_owner(&self, room: &str) -> StoreResult<Option<String>>;

    async fn room_whitelist_only(&self, room: &str) -> StoreResult<bool>;

    async fn room_whitelist_only_set(&self, room: &str, mode: bool) -> StoreResult<()>;

    async fn room_has_in_list(&self, room: &str, list: RoomList, name: &str) -> StoreResult<bool>;

    async fn room_get_list(&self, room: &str, list: RoomList) -> StoreResult<Vec<String>>;

    async fn room_add_to_list(
        &self,
        room: &str,
        list: RoomList,
        names: &[String],
    ) -> StoreResult<()>;

    async fn room_remove_from_list(
        &self,
        room: &str,
        list: RoomList,
        names: &[String],
    ) -> StoreResult<()>;

    /// 追加消息，超出上限时按 FIFO 淘汰最旧的
    async fn room_message_add(&self, room: &str, message: Message) -> StoreResult<()>;

    /// 按写入顺序（最旧在前）返回保留的消息
    async fn room_messages_get(&self, room: &str) -> StoreResult<Vec<Message>>;

    // ---- 用户与在线状态 ----

    /// 登录：创建或获取用户并注册 socket
    async fn login_user(
        &self,
        name: &str,
        instance: InstanceId,
        socket: SocketId,
    ) -> StoreResult<()>;

    /// 注销：销毁用户状态，最后一个 socket 消失时调用
    async fn logout_user(&self, name: &str) -> StoreResult<()>;

    async fn is_online(&self, name: &str) -> StoreResult<bool>;

    async fn online_users(&self) -> StoreResult<Vec<String>>;

    async fn user_socket_remove(
        &self,
        name: &str,
        instance: InstanceId,
        socket: SocketId,
    ) -> StoreResult<()>;

    async fn user_sockets(&self, name: &str) -> StoreResult<Vec<(InstanceId, SocketId)>>;

    async fn user_room_add(&self, name: &str, room: &str) -> StoreResult<()>;

    async fn user_room_remove(&self, name: &str, room: &str) -> StoreResult<()>;

    async fn user_rooms(&self, name: &str) -> StoreResult<Vec<String>>;

    // ---- 私聊列表 ----

    async fn direct_whitelist_only(&self, name: &str) -> StoreResult<bool>;

    async fn direct_whitelist_only_set(&self, name: &str, mode: bool) -> StoreResult<()>;

    async fn direct_has_in_list(
        &self,
        name: &str,
        list: DirectList,
        value: &str,
    ) -> StoreResult<bool>;

    async fn direct_get_list(&self, name: &str, list: DirectList) -> StoreResult<Vec<String>>;

    async fn direct_add_to_list(
        &self,
        name: &str,
        list: DirectList,
        values: &[String],
    ) -> StoreResult<()>;

    async fn direct_remove_from_list(
        &self,
        name: &str,
        list: DirectList,
        values: &[String],
    ) -> StoreResult<()>;
}
