//! 内存状态存储
//!
//! 单实例部署与测试用的 `StateStore` 实现。每个接口调用在一次
//! 写锁内完成，天然满足单次调用的原子性。

use async_trait::async_trait;
use domain::{
    DirectList, InstanceId, Message, RoomList, SocketId, StateStore, StoreError, StoreResult,
};
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::RwLock;

#[derive(Default)]
struct RoomRecord {
    owner: Option<String>,
    whitelist_only: bool,
    userlist: HashSet<String>,
    blacklist: HashSet<String>,
    adminlist: HashSet<String>,
    whitelist: HashSet<String>,
    history: VecDeque<Message>,
}

impl RoomRecord {
    fn list(&self, list: RoomList) -> &HashSet<String> {
        match list {
            RoomList::Userlist => &self.userlist,
            RoomList::Blacklist => &self.blacklist,
            RoomList::Adminlist => &self.adminlist,
            RoomList::Whitelist => &self.whitelist,
        }
    }

    fn list_mut(&mut self, list: RoomList) -> &mut HashSet<String> {
        match list {
            RoomList::Userlist => &mut self.userlist,
            RoomList::Blacklist => &mut self.blacklist,
            RoomList::Adminlist => &mut self.adminlist,
            RoomList::Whitelist => &mut self.whitelist,
        }
    }
}

#[derive(Default)]
struct UserRecord {
    direct_whitelist_only: bool,
    direct_blacklist: HashSet<String>,
    direct_whitelist: HashSet<String>,
    sockets: HashSet<(InstanceId, SocketId)>,
    rooms: HashSet<String>,
}

impl UserRecord {
    fn list(&self, list: DirectList) -> &HashSet<String> {
        match list {
            DirectList::Blacklist => &self.direct_blacklist,
            DirectList::Whitelist => &self.direct_whitelist,
        }
    }

    fn list_mut(&mut self, list: DirectList) -> &mut HashSet<String> {
        match list {
            DirectList::Blacklist => &mut self.direct_blacklist,
            DirectList::Whitelist => &mut self.direct_whitelist,
        }
    }
}

/// 进程内存状态存储
pub struct MemoryState {
    history_limit: usize,
    rooms: RwLock<HashMap<String, RoomRecord>>,
    users: RwLock<HashMap<String, UserRecord>>,
}

impl MemoryState {
    pub fn new(history_limit: usize) -> Self {
        Self {
            history_limit,
            rooms: RwLock::new(HashMap::new()),
            users: RwLock::new(HashMap::new()),
        }
    }
}

fn room_key(name: &str) -> String {
    format!("room:{name}")
}

fn user_key(name: &str) -> String {
    format!("user:{name}")
}

#[async_trait]
impl StateStore for MemoryState {
    async fn add_room(
        &self,
        name: &str,
        owner: Option<&str>,
        whitelist_only: bool,
    ) -> StoreResult<()> {
        let mut rooms = self.rooms.write().await;
        if rooms.contains_key(name) {
            return Err(StoreError::already_exists(room_key(name)));
        }
        rooms.insert(
            name.to_string(),
            RoomRecord {
                owner: owner.map(str::to_string),
                whitelist_only,
                ..RoomRecord::default()
            },
        );
        Ok(())
    }

    async fn remove_room(&self, name: &str) -> StoreResult<()> {
        let mut rooms = self.rooms.write().await;
        rooms
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(room_key(name)))
    }

    async fn room_exists(&self, name: &str) -> StoreResult<bool> {
        Ok(self.rooms.read().await.contains_key(name))
    }

    async fn list_rooms(&self) -> StoreResult<Vec<String>> {
        let mut names: Vec<String> = self.rooms.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn room_owner(&self, room: &str) -> StoreResult<Option<String>> {
        let rooms = self.rooms.read().await;
        let record = rooms
            .get(room)
            .ok_or_else(|| StoreError::not_found(room_key(room)))?;
        Ok(record.owner.clone())
    }

    async fn room_whitelist_only(&self, room: &str) -> StoreResult<bool> {
        let rooms = self.rooms.read().await;
        let record = rooms
            .get(room)
            .ok_or_else(|| StoreError::not_found(room_key(room)))?;
        Ok(record.whitelist_only)
    }

    async fn room_whitelist_only_set(&self, room: &str, mode: bool) -> StoreResult<()> {
        let mut rooms = self.rooms.write().await;
        let record = rooms
            .get_mut(room)
            .ok_or_else(|| StoreError::not_found(room_key(room)))?;
        record.whitelist_only = mode;
        Ok(())
    }

    async fn room_has_in_list(&self, room: &str, list: RoomList, name: &str) -> StoreResult<bool> {
        let rooms = self.rooms.read().await;
        let record = rooms
            .get(room)
            .ok_or_else(|| StoreError::not_found(room_key(room)))?;
        Ok(record.list(list).contains(name))
    }

    async fn room_get_list(&self, room: &str, list: RoomList) -> StoreResult<Vec<String>> {
        let rooms = self.rooms.read().await;
        let record = rooms
            .get(room)
            .ok_or_else(|| StoreError::not_found(room_key(room)))?;
        let mut values: Vec<String> = record.list(list).iter().cloned().collect();
        values.sort();
        Ok(values)
    }

    async fn room_add_to_list(
        &self,
        room: &str,
        list: RoomList,
        names: &[String],
    ) -> StoreResult<()> {
        let mut rooms = self.rooms.write().await;
        let record = rooms
            .get_mut(room)
            .ok_or_else(|| StoreError::not_found(room_key(room)))?;
        let target = record.list_mut(list);
        for name in names {
            target.insert(name.clone());
        }
        Ok(())
    }

    async fn room_remove_from_list(
        &self,
        room: &str,
        list: RoomList,
        names: &[String],
    ) -> StoreResult<()> {
        let mut rooms = self.rooms.write().await;
        let record = rooms
            .get_mut(room)
            .ok_or_else(|| StoreError::not_found(room_key(room)))?;
        let target = record.list_mut(list);
        for name in names {
            target.remove(name);
        }
        Ok(())
    }

    async fn room_message_add(&self, room: &str, message: Message) -> StoreResult<()> {
        let mut rooms = self.rooms.write().await;
        let record = rooms
            .get_mut(room)
            .ok_or_else(|| StoreError::not_found(room_key(room)))?;
        record.history.push_back(message);
        // FIFO 淘汰最旧的
        while record.history.len() > self.history_limit {
            record.history.pop_front();
        }
        Ok(())
    }

    async fn room_messages_get(&self, room: &str) -> StoreResult<Vec<Message>> {
        let rooms = self.rooms.read().await;
        let record = rooms
            .get(room)
            .ok_or_else(|| StoreError::not_found(room_key(room)))?;
        Ok(record.history.iter().cloned().collect())
    }

    async fn login_user(
        &self,
        name: &str,
        instance: InstanceId,
        socket: SocketId,
    ) -> StoreResult<()> {
        let mut users = self.users.write().await;
        let record = users.entry(name.to_string()).or_default();
        record.sockets.insert((instance, socket));
        Ok(())
    }

    async fn logout_user(&self, name: &str) -> StoreResult<()> {
        let mut users = self.users.write().await;
        users
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(user_key(name)))
    }

    async fn is_online(&self, name: &str) -> StoreResult<bool> {
        Ok(self.users.read().await.contains_key(name))
    }

    async fn online_users(&self) -> StoreResult<Vec<String>> {
        let mut names: Vec<String> = self.users.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn user_socket_remove(
        &self,
        name: &str,
        instance: InstanceId,
        socket: SocketId,
    ) -> StoreResult<()> {
        let mut users = self.users.write().await;
        let record = users
            .get_mut(name)
            .ok_or_else(|| StoreError::not_found(user_key(name)))?;
        record.sockets.remove(&(instance, socket));
        Ok(())
    }

    async fn user_sockets(&self, name: &str) -> StoreResult<Vec<(InstanceId, SocketId)>> {
        let users = self.users.read().await;
        let record = users
            .get(name)
            .ok_or_else(|| StoreError::not_found(user_key(name)))?;
        Ok(record.sockets.iter().copied().collect())
    }

    async fn user_room_add(&self, name: &str, room: &str) -> StoreResult<()> {
        let mut users = self.users.write().await;
        let record = users
            .get_mut(name)
            .ok_or_else(|| StoreError::not_found(user_key(name)))?;
        record.rooms.insert(room.to_string());
        Ok(())
    }

    async fn user_room_remove(&self, name: &str, room: &str) -> StoreResult<()> {
        let mut users = self.users.write().await;
        let record = users
            .get_mut(name)
            .ok_or_else(|| StoreError::not_found(user_key(name)))?;
        record.rooms.remove(room);
        Ok(())
    }

    async fn user_rooms(&self, name: &str) -> StoreResult<Vec<String>> {
        let users = self.users.read().await;
        let record = users
            .get(name)
            .ok_or_else(|| StoreError::not_found(user_key(name)))?;
        let mut rooms: Vec<String> = record.rooms.iter().cloned().collect();
        rooms.sort();
        Ok(rooms)
    }

    async fn direct_whitelist_only(&self, name: &str) -> StoreResult<bool> {
        let users = self.users.read().await;
        let record = users
            .get(name)
            .ok_or_else(|| StoreError::not_found(user_key(name)))?;
        Ok(record.direct_whitelist_only)
    }

    async fn direct_whitelist_only_set(&self, name: &str, mode: bool) -> StoreResult<()> {
        let mut users = self.users.write().await;
        let record = users
            .get_mut(name)
            .ok_or_else(|| StoreError::not_found(user_key(name)))?;
        record.direct_whitelist_only = mode;
        Ok(())
    }

    async fn direct_has_in_list(
        &self,
        name: &str,
        list: DirectList,
        value: &str,
    ) -> StoreResult<bool> {
        let users = self.users.read().await;
        let record = users
            .get(name)
            .ok_or_else(|| StoreError::not_found(user_key(name)))?;
        Ok(record.list(list).contains(value))
    }

    async fn direct_get_list(&self, name: &str, list: DirectList) -> StoreResult<Vec<String>> {
        let users = self.users.read().await;
        let record = users
            .get(name)
            .ok_or_else(|| StoreError::not_found(user_key(name)))?;
        let mut values: Vec<String> = record.list(list).iter().cloned().collect();
        values.sort();
        Ok(values)
    }

    async fn direct_add_to_list(
        &self,
        name: &str,
        list: DirectList,
        values: &[String],
    ) -> StoreResult<()> {
        let mut users = self.users.write().await;
        let record = users
            .get_mut(name)
            .ok_or_else(|| StoreError::not_found(user_key(name)))?;
        let target = record.list_mut(list);
        for value in values {
            target.insert(value.clone());
        }
        Ok(())
    }

    async fn direct_remove_from_list(
        &self,
        name: &str,
        list: DirectList,
        values: &[String],
    ) -> StoreResult<()> {
        let mut users = self.users.write().await;
        let record = users
            .get_mut(name)
            .ok_or_else(|| StoreError::not_found(user_key(name)))?;
        let target = record.list_mut(list);
        for value in values {
            target.remove(value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_room_lifecycle() {
        let store = MemoryState::new(100);

        store.add_room("room1", Some("user1"), false).await.unwrap();
        assert!(store.room_exists("room1").await.unwrap());
        assert_eq!(store.room_owner("room1").await.unwrap(), Some("user1".to_string()));

        // 重复创建
        assert!(matches!(
            store.add_room("room1", None, false).await,
            Err(StoreError::AlreadyExists { .. })
        ));

        store.remove_room("room1").await.unwrap();
        assert!(!store.room_exists("room1").await.unwrap());
        assert!(matches!(
            store.remove_room("room1").await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_room_lists() {
        let store = MemoryState::new(100);
        store.add_room("room1", None, false).await.unwrap();

        store
            .room_add_to_list("room1", RoomList::Blacklist, &["user2".to_string()])
            .await
            .unwrap();
        assert!(store
            .room_has_in_list("room1", RoomList::Blacklist, "user2")
            .await
            .unwrap());
        assert_eq!(
            store.room_get_list("room1", RoomList::Blacklist).await.unwrap(),
            vec!["user2".to_string()]
        );

        store
            .room_remove_from_list("room1", RoomList::Blacklist, &["user2".to_string()])
            .await
            .unwrap();
        assert!(!store
            .room_has_in_list("room1", RoomList::Blacklist, "user2")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_history_is_bounded_fifo() {
        let store = MemoryState::new(3);
        store.add_room("room1", None, false).await.unwrap();

        for i in 0..5 {
            store
                .room_message_add("room1", Message::new("user1", format!("msg{i}")))
                .await
                .unwrap();
        }

        let history = store.room_messages_get("room1").await.unwrap();
        let texts: Vec<&str> = history.iter().map(|m| m.text_message.as_str()).collect();
        // 只保留最近 3 条，按写入顺序
        assert_eq!(texts, vec!["msg2", "msg3", "msg4"]);
    }

    #[tokio::test]
    async fn test_user_presence() {
        let store = MemoryState::new(100);
        let instance = InstanceId::new();
        let s1 = SocketId::new();
        let s2 = SocketId::new();

        store.login_user("user1", instance, s1).await.unwrap();
        store.login_user("user1", instance, s2).await.unwrap();
        assert!(store.is_online("user1").await.unwrap());
        assert_eq!(store.user_sockets("user1").await.unwrap().len(), 2);

        store.user_socket_remove("user1", instance, s1).await.unwrap();
        assert_eq!(store.user_sockets("user1").await.unwrap().len(), 1);

        store.logout_user("user1").await.unwrap();
        assert!(!store.is_online("user1").await.unwrap());
        assert!(matches!(
            store.user_sockets("user1").await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_direct_lists() {
        let store = MemoryState::new(100);
        store
            .login_user("user1", InstanceId::new(), SocketId::new())
            .await
            .unwrap();

        assert!(!store.direct_whitelist_only("user1").await.unwrap());
        store.direct_whitelist_only_set("user1", true).await.unwrap();
        assert!(store.direct_whitelist_only("user1").await.unwrap());

        store
            .direct_add_to_list("user1", DirectList::Whitelist, &["user2".to_string()])
            .await
            .unwrap();
        assert!(store
            .direct_has_in_list("user1", DirectList::Whitelist, "user2")
            .await
            .unwrap());

        // 注销销毁全部私聊状态
        store.logout_user("user1").await.unwrap();
        assert!(matches!(
            store.direct_whitelist_only("user1").await,
            Err(StoreError::NotFound { .. })
        ));
    }
}
