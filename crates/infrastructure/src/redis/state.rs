//! Redis 状态存储
//!
//! 键都挂在命名空间前缀下。列表用 Set，标志位用 Hash，历史消息用
//! List（LPUSH + LTRIM 维持上限，读取时反转为写入顺序）。涉及多个
//! 键的单次调用走 MULTI/EXEC 管道，因此是全有或全无的。

use async_trait::async_trait;
use domain::{
    DirectList, InstanceId, Message, RoomList, SocketId, StateStore, StoreError, StoreResult,
};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};

/// Redis 状态存储
pub struct RedisState {
    client: Client,
    namespace: String,
    history_limit: usize,
}

fn redis_err(err: redis::RedisError) -> StoreError {
    tracing::error!(error = %err, "Redis 操作失败");
    StoreError::backend(format!("redis: {err}"))
}

impl RedisState {
    /// 连接 Redis 并返回存储实例
    pub async fn connect(
        url: &str,
        namespace: impl Into<String>,
        history_limit: usize,
    ) -> StoreResult<Self> {
        let client = Client::open(url).map_err(redis_err)?;
        // 启动时探活
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(redis_err)?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(redis_err)?;
        tracing::info!(url, "Redis 状态存储已连接");
        Ok(Self {
            client,
            namespace: namespace.into(),
            history_limit,
        })
    }

    async fn conn(&self) -> StoreResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(redis_err)
    }

    // ---- 键布局 ----

    fn rooms_key(&self) -> String {
        format!("{}:rooms", self.namespace)
    }

    fn room_meta_key(&self, room: &str) -> String {
        format!("{}:room:{{{room}}}:meta", self.namespace)
    }

    fn room_list_key(&self, room: &str, list: RoomList) -> String {
        format!("{}:room:{{{room}}}:list:{}", self.namespace, list.as_str())
    }

    fn room_history_key(&self, room: &str) -> String {
        format!("{}:room:{{{room}}}:history", self.namespace)
    }

    fn online_key(&self) -> String {
        format!("{}:online", self.namespace)
    }

    fn user_meta_key(&self, user: &str) -> String {
        format!("{}:user:{{{user}}}:meta", self.namespace)
    }

    fn user_sockets_key(&self, user: &str) -> String {
        format!("{}:user:{{{user}}}:sockets", self.namespace)
    }

    fn user_rooms_key(&self, user: &str) -> String {
        format!("{}:user:{{{user}}}:rooms", self.namespace)
    }

    fn direct_list_key(&self, user: &str, list: DirectList) -> String {
        format!("{}:user:{{{user}}}:direct:{}", self.namespace, list.as_str())
    }

    async fn ensure_room(&self, conn: &mut MultiplexedConnection, room: &str) -> StoreResult<()> {
        let exists: bool = conn
            .sismember(self.rooms_key(), room)
            .await
            .map_err(redis_err)?;
        if exists {
            Ok(())
        } else {
            Err(StoreError::not_found(format!("room:{room}")))
        }
    }

    async fn ensure_user(&self, conn: &mut MultiplexedConnection, user: &str) -> StoreResult<()> {
        let exists: bool = conn
            .sismember(self.online_key(), user)
            .await
            .map_err(redis_err)?;
        if exists {
            Ok(())
        } else {
            Err(StoreError::not_found(format!("user:{user}")))
        }
    }
}

fn socket_member(instance: InstanceId, socket: SocketId) -> String {
    format!("{instance}/{socket}")
}

fn parse_socket_member(member: &str) -> Option<(InstanceId, SocketId)> {
    let (instance, socket) = member.split_once('/')?;
    Some((InstanceId::parse(instance)?, SocketId::parse(socket)?))
}

#[async_trait]
impl StateStore for RedisState {
    async fn add_room(
        &self,
        name: &str,
        owner: Option<&str>,
        whitelist_only: bool,
    ) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let added: i64 = conn.sadd(self.rooms_key(), name).await.map_err(redis_err)?;
        if added == 0 {
            return Err(StoreError::already_exists(format!("room:{name}")));
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.hset(
            self.room_meta_key(name),
            "whitelistOnly",
            if whitelist_only { "1" } else { "0" },
        );
        if let Some(owner) = owner {
            pipe.hset(self.room_meta_key(name), "owner", owner);
        }
        let _: () = pipe.query_async(&mut conn).await.map_err(redis_err)?;
        Ok(())
    }

    async fn remove_room(&self, name: &str) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let removed: i64 = conn.srem(self.rooms_key(), name).await.map_err(redis_err)?;
        if removed == 0 {
            return Err(StoreError::not_found(format!("room:{name}")));
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.del(self.room_meta_key(name));
        pipe.del(self.room_history_key(name));
        for list in [
            RoomList::Userlist,
            RoomList::Blacklist,
            RoomList::Adminlist,
            RoomList::Whitelist,
        ] {
            pipe.del(self.room_list_key(name, list));
        }
        let _: () = pipe.query_async(&mut conn).await.map_err(redis_err)?;
        Ok(())
    }

    async fn room_exists(&self, name: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        conn.sismember(self.rooms_key(), name).await.map_err(redis_err)
    }

    async fn list_rooms(&self) -> StoreResult<Vec<String>> {
        let mut conn = self.conn().await?;
        let mut rooms: Vec<String> = conn.smembers(self.rooms_key()).await.map_err(redis_err)?;
        rooms.sort();
        Ok(rooms)
    }

    async fn room_owner(&self, room: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn().await?;
        self.ensure_room(&mut conn, room).await?;
        conn.hget(self.room_meta_key(room), "owner")
            .await
            .map_err(redis_err)
    }

    async fn room_whitelist_only(&self, room: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        self.ensure_room(&mut conn, room).await?;
        let mode: Option<String> = conn
            .hget(self.room_meta_key(room), "whitelistOnly")
            .await
            .map_err(redis_err)?;
        Ok(mode.as_deref() == Some("1"))
    }

    async fn room_whitelist_only_set(&self, room: &str, mode: bool) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        self.ensure_room(&mut conn, room).await?;
        let _: () = conn
            .hset(
                self.room_meta_key(room),
                "whitelistOnly",
                if mode { "1" } else { "0" },
            )
            .await
            .map_err(redis_err)?;
        Ok(())
    }

    async fn room_has_in_list(&self, room: &str, list: RoomList, name: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        self.ensure_room(&mut conn, room).await?;
        conn.sismember(self.room_list_key(room, list), name)
            .await
            .map_err(redis_err)
    }

    async fn room_get_list(&self, room: &str, list: RoomList) -> StoreResult<Vec<String>> {
        let mut conn = self.conn().await?;
        self.ensure_room(&mut conn, room).await?;
        let mut values: Vec<String> = conn
            .smembers(self.room_list_key(room, list))
            .await
            .map_err(redis_err)?;
        values.sort();
        Ok(values)
    }

    async fn room_add_to_list(
        &self,
        room: &str,
        list: RoomList,
        names: &[String],
    ) -> StoreResult<()> {
        if names.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn().await?;
        self.ensure_room(&mut conn, room).await?;
        let _: () = conn
            .sadd(self.room_list_key(room, list), names)
            .await
            .map_err(redis_err)?;
        Ok(())
    }

    async fn room_remove_from_list(
        &self,
        room: &str,
        list: RoomList,
        names: &[String],
    ) -> StoreResult<()> {
        if names.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn().await?;
        self.ensure_room(&mut conn, room).await?;
        let _: () = conn
            .srem(self.room_list_key(room, list), names)
            .await
            .map_err(redis_err)?;
        Ok(())
    }

    async fn room_message_add(&self, room: &str, message: Message) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        self.ensure_room(&mut conn, room).await?;
        let payload = serde_json::to_string(&message)
            .map_err(|e| StoreError::backend(format!("序列化消息失败: {e}")))?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.lpush(self.room_history_key(room), payload);
        pipe.ltrim(
            self.room_history_key(room),
            0,
            self.history_limit as isize - 1,
        );
        let _: () = pipe.query_async(&mut conn).await.map_err(redis_err)?;
        Ok(())
    }

    async fn room_messages_get(&self, room: &str) -> StoreResult<Vec<Message>> {
        let mut conn = self.conn().await?;
        self.ensure_room(&mut conn, room).await?;
        let raw: Vec<String> = conn
            .lrange(self.room_history_key(room), 0, -1)
            .await
            .map_err(redis_err)?;
        let mut messages = raw
            .iter()
            .map(|payload| {
                serde_json::from_str::<Message>(payload)
                    .map_err(|e| StoreError::backend(format!("反序列化消息失败: {e}")))
            })
            .collect::<StoreResult<Vec<Message>>>()?;
        // LPUSH 最新在前，反转为写入顺序
        messages.reverse();
        Ok(messages)
    }

    async fn login_user(
        &self,
        name: &str,
        instance: InstanceId,
        socket: SocketId,
    ) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.sadd(self.online_key(), name);
        pipe.sadd(self.user_sockets_key(name), socket_member(instance, socket));
        let _: () = pipe.query_async(&mut conn).await.map_err(redis_err)?;
        Ok(())
    }

    async fn logout_user(&self, name: &str) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let removed: i64 = conn.srem(self.online_key(), name).await.map_err(redis_err)?;
        if removed == 0 {
            return Err(StoreError::not_found(format!("user:{name}")));
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.del(self.user_meta_key(name));
        pipe.del(self.user_sockets_key(name));
        pipe.del(self.user_rooms_key(name));
        pipe.del(self.direct_list_key(name, DirectList::Blacklist));
        pipe.del(self.direct_list_key(name, DirectList::Whitelist));
        let _: () = pipe.query_async(&mut conn).await.map_err(redis_err)?;
        Ok(())
    }

    async fn is_online(&self, name: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        conn.sismember(self.online_key(), name).await.map_err(redis_err)
    }

    async fn online_users(&self) -> StoreResult<Vec<String>> {
        let mut conn = self.conn().await?;
        let mut users: Vec<String> = conn.smembers(self.online_key()).await.map_err(redis_err)?;
        users.sort();
        Ok(users)
    }

    async fn user_socket_remove(
        &self,
        name: &str,
        instance: InstanceId,
        socket: SocketId,
    ) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        self.ensure_user(&mut conn, name).await?;
        let _: () = conn
            .srem(self.user_sockets_key(name), socket_member(instance, socket))
            .await
            .map_err(redis_err)?;
        Ok(())
    }

    async fn user_sockets(&self, name: &str) -> StoreResult<Vec<(InstanceId, SocketId)>> {
        let mut conn = self.conn().await?;
        self.ensure_user(&mut conn, name).await?;
        let members: Vec<String> = conn
            .smembers(self.user_sockets_key(name))
            .await
            .map_err(redis_err)?;
        members
            .iter()
            .map(|member| {
                parse_socket_member(member)
                    .ok_or_else(|| StoreError::backend(format!("非法的 socket 记录: {member}")))
            })
            .collect()
    }

    async fn user_room_add(&self, name: &str, room: &str) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        self.ensure_user(&mut conn, name).await?;
        let _: () = conn
            .sadd(self.user_rooms_key(name), room)
            .await
            .map_err(redis_err)?;
        Ok(())
    }

    async fn user_room_remove(&self, name: &str, room: &str) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        self.ensure_user(&mut conn, name).await?;
        let _: () = conn
            .srem(self.user_rooms_key(name), room)
            .await
            .map_err(redis_err)?;
        Ok(())
    }

    async fn user_rooms(&self, name: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn().await?;
        self.ensure_user(&mut conn, name).await?;
        let mut rooms: Vec<String> = conn
            .smembers(self.user_rooms_key(name))
            .await
            .map_err(redis_err)?;
        rooms.sort();
        Ok(rooms)
    }

    async fn direct_whitelist_only(&self, name: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        self.ensure_user(&mut conn, name).await?;
        let mode: Option<String> = conn
            .hget(self.user_meta_key(name), "whitelistOnly")
            .await
            .map_err(redis_err)?;
        Ok(mode.as_deref() == Some("1"))
    }

    async fn direct_whitelist_only_set(&self, name: &str, mode: bool) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        self.ensure_user(&mut conn, name).await?;
        let _: () = conn
            .hset(
                self.user_meta_key(name),
                "whitelistOnly",
                if mode { "1" } else { "0" },
            )
            .await
            .map_err(redis_err)?;
        Ok(())
    }

    async fn direct_has_in_list(
        &self,
        name: &str,
        list: DirectList,
        value: &str,
    ) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        self.ensure_user(&mut conn, name).await?;
        conn.sismember(self.direct_list_key(name, list), value)
            .await
            .map_err(redis_err)
    }

    async fn direct_get_list(&self, name: &str, list: DirectList) -> StoreResult<Vec<String>> {
        let mut conn = self.conn().await?;
        self.ensure_user(&mut conn, name).await?;
        let mut values: Vec<String> = conn
            .smembers(self.direct_list_key(name, list))
            .await
            .map_err(redis_err)?;
        values.sort();
        Ok(values)
    }

    async fn direct_add_to_list(
        &self,
        name: &str,
        list: DirectList,
        values: &[String],
    ) -> StoreResult<()> {
        if values.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn().await?;
        self.ensure_user(&mut conn, name).await?;
        let _: () = conn
            .sadd(self.direct_list_key(name, list), values)
            .await
            .map_err(redis_err)?;
        Ok(())
    }

    async fn direct_remove_from_list(
        &self,
        name: &str,
        list: DirectList,
        values: &[String],
    ) -> StoreResult<()> {
        if values.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn().await?;
        self.ensure_user(&mut conn, name).await?;
        let _: () = conn
            .srem(self.direct_list_key(name, list), values)
            .await
            .map_err(redis_err)?;
        Ok(())
    }
}
