//! 房间权限层测试
//!
//! 覆盖加入/离开规则、列表变更协议与失去访问权集合的计算。

use application::Room;
use domain::{ChatError, RoomList, StateStore};
use infrastructure::MemoryState;
use std::sync::Arc;

async fn store_with_room(whitelist_only: bool) -> Arc<MemoryState> {
    let store = Arc::new(MemoryState::new(100));
    store
        .add_room("room1", Some("owner"), whitelist_only)
        .await
        .unwrap();
    store
}

fn names(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[tokio::test]
async fn test_join_public_room() {
    let store = store_with_room(false).await;
    let room = Room::new(store.clone(), "room1");

    // 首次加入是新的逻辑加入，重复加入不是
    assert!(room.join("user1").await.unwrap());
    assert!(!room.join("user1").await.unwrap());
    assert!(store
        .room_has_in_list("room1", RoomList::Userlist, "user1")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_blacklisted_user_cannot_join() {
    let store = store_with_room(false).await;
    store
        .room_add_to_list("room1", RoomList::Blacklist, &names(&["user1"]))
        .await
        .unwrap();
    let room = Room::new(store, "room1");

    assert_eq!(room.join("user1").await, Err(ChatError::NotAllowed));
}

#[tokio::test]
async fn test_whitelist_only_join_rules() {
    let store = store_with_room(true).await;
    store
        .room_add_to_list("room1", RoomList::Whitelist, &names(&["listed"]))
        .await
        .unwrap();
    store
        .room_add_to_list("room1", RoomList::Adminlist, &names(&["admin"]))
        .await
        .unwrap();
    let room = Room::new(store, "room1");

    // 白名单、管理员与房主放行，其他人拒绝
    assert!(room.join("listed").await.unwrap());
    assert!(room.join("admin").await.unwrap());
    assert!(room.join("owner").await.unwrap());
    assert_eq!(room.join("stranger").await, Err(ChatError::NotAllowed));
}

#[tokio::test]
async fn test_join_missing_room() {
    let store = Arc::new(MemoryState::new(100));
    let room = Room::new(store, "nowhere");
    assert_eq!(room.join("user1").await, Err(ChatError::NotAllowed));
}

#[tokio::test]
async fn test_message_and_history_require_membership() {
    let store = store_with_room(false).await;
    let room = Room::new(store, "room1");

    let err = room
        .message("user1", domain::Message::new("user1", "hi"))
        .await
        .unwrap_err();
    assert_eq!(err, ChatError::not_joined("room1"));
    assert_eq!(
        room.history("user1").await.unwrap_err(),
        ChatError::not_joined("room1")
    );
    assert_eq!(
        room.get_list("user1", RoomList::Userlist).await.unwrap_err(),
        ChatError::not_joined("room1")
    );

    room.join("user1").await.unwrap();
    room.message("user1", domain::Message::new("user1", "hi"))
        .await
        .unwrap();
    let history = room.history("user1").await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].text_message, "hi");
}

#[tokio::test]
async fn test_userlist_is_not_mutable_via_list_api() {
    let store = store_with_room(false).await;
    let room = Room::new(store, "room1");

    assert_eq!(
        room.add_to_list("owner", RoomList::Userlist, &names(&["user1"]))
            .await,
        Err(ChatError::NotAllowed)
    );
}

#[tokio::test]
async fn test_plain_member_cannot_change_lists() {
    let store = store_with_room(false).await;
    let room = Room::new(store, "room1");
    room.join("user1").await.unwrap();

    assert_eq!(
        room.add_to_list("user1", RoomList::Blacklist, &names(&["user2"]))
            .await,
        Err(ChatError::NotAllowed)
    );
}

#[tokio::test]
async fn test_admin_cannot_touch_owner_or_admins() {
    let store = store_with_room(false).await;
    store
        .room_add_to_list("room1", RoomList::Adminlist, &names(&["admin", "admin2"]))
        .await
        .unwrap();
    let room = Room::new(store, "room1");

    assert_eq!(
        room.add_to_list("admin", RoomList::Blacklist, &names(&["owner"]))
            .await,
        Err(ChatError::NotAllowed)
    );
    assert_eq!(
        room.add_to_list("admin", RoomList::Blacklist, &names(&["admin2"]))
            .await,
        Err(ChatError::NotAllowed)
    );
    // 普通用户可以被操作
    room.add_to_list("admin", RoomList::Blacklist, &names(&["user1"]))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_owner_bypasses_member_protection() {
    let store = store_with_room(false).await;
    store
        .room_add_to_list("room1", RoomList::Adminlist, &names(&["admin"]))
        .await
        .unwrap();
    let room = Room::new(store.clone(), "room1");

    // 房主可以把管理员拉黑；管理员身份保护其不被驱逐
    let lost = room
        .add_to_list("owner", RoomList::Blacklist, &names(&["admin"]))
        .await
        .unwrap();
    assert!(lost.is_empty());
    assert!(store
        .room_has_in_list("room1", RoomList::Blacklist, "admin")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_duplicate_add_and_missing_remove() {
    let store = store_with_room(false).await;
    let room = Room::new(store, "room1");

    room.add_to_list("owner", RoomList::Blacklist, &names(&["user1"]))
        .await
        .unwrap();
    assert_eq!(
        room.add_to_list("owner", RoomList::Blacklist, &names(&["user1"]))
            .await,
        Err(ChatError::name_in_list("user1", "blacklist"))
    );
    assert_eq!(
        room.remove_from_list("owner", RoomList::Whitelist, &names(&["user9"]))
            .await,
        Err(ChatError::no_name_in_list("user9", "whitelist"))
    );
}

#[tokio::test]
async fn test_add_remove_round_trip_restores_list() {
    let store = store_with_room(false).await;
    let room = Room::new(store.clone(), "room1");

    let before = store
        .room_get_list("room1", RoomList::Whitelist)
        .await
        .unwrap();
    room.add_to_list("owner", RoomList::Whitelist, &names(&["a", "b"]))
        .await
        .unwrap();
    room.remove_from_list("owner", RoomList::Whitelist, &names(&["a", "b"]))
        .await
        .unwrap();
    let after = store
        .room_get_list("room1", RoomList::Whitelist)
        .await
        .unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_blacklist_add_computes_lost_access() {
    let store = store_with_room(false).await;
    store
        .room_add_to_list("room1", RoomList::Adminlist, &names(&["admin"]))
        .await
        .unwrap();
    let room = Room::new(store.clone(), "room1");
    room.join("owner").await.unwrap();
    room.join("admin").await.unwrap();
    room.join("user1").await.unwrap();

    // 只有普通在场成员进入失去访问权集合
    let lost = room
        .add_to_list("owner", RoomList::Blacklist, &names(&["user1", "offline"]))
        .await
        .unwrap();
    assert_eq!(lost, vec!["user1".to_string()]);
}

#[tokio::test]
async fn test_whitelist_remove_in_whitelist_only_mode() {
    let store = store_with_room(true).await;
    store
        .room_add_to_list("room1", RoomList::Whitelist, &names(&["user1"]))
        .await
        .unwrap();
    let room = Room::new(store.clone(), "room1");
    room.join("user1").await.unwrap();

    let lost = room
        .remove_from_list("owner", RoomList::Whitelist, &names(&["user1"]))
        .await
        .unwrap();
    assert_eq!(lost, vec!["user1".to_string()]);
}

#[tokio::test]
async fn test_whitelist_remove_without_mode_is_harmless() {
    let store = store_with_room(false).await;
    store
        .room_add_to_list("room1", RoomList::Whitelist, &names(&["user1"]))
        .await
        .unwrap();
    let room = Room::new(store, "room1");
    room.join("user1").await.unwrap();

    let lost = room
        .remove_from_list("owner", RoomList::Whitelist, &names(&["user1"]))
        .await
        .unwrap();
    assert!(lost.is_empty());
}

#[tokio::test]
async fn test_adminlist_changes_never_evict() {
    let store = store_with_room(true).await;
    store
        .room_add_to_list("room1", RoomList::Adminlist, &names(&["admin"]))
        .await
        .unwrap();
    let room = Room::new(store, "room1");
    room.join("admin").await.unwrap();

    // 白名单模式下把管理员摘掉也不触发驱逐
    let lost = room
        .remove_from_list("owner", RoomList::Adminlist, &names(&["admin"]))
        .await
        .unwrap();
    assert!(lost.is_empty());
}

#[tokio::test]
async fn test_change_mode_requires_admin_and_reports_lost() {
    let store = store_with_room(false).await;
    store
        .room_add_to_list("room1", RoomList::Adminlist, &names(&["admin"]))
        .await
        .unwrap();
    store
        .room_add_to_list("room1", RoomList::Whitelist, &names(&["listed"]))
        .await
        .unwrap();
    let room = Room::new(store.clone(), "room1");
    for user in ["owner", "admin", "listed", "plain"] {
        room.join(user).await.unwrap();
    }

    assert_eq!(
        room.change_mode("plain", true).await,
        Err(ChatError::NotAllowed)
    );

    let lost = room.change_mode("owner", true).await.unwrap();
    assert_eq!(lost, vec!["plain".to_string()]);
    assert!(room.get_mode().await.unwrap());

    // 关闭白名单模式没有驱逐
    let lost = room.change_mode("admin", false).await.unwrap();
    assert!(lost.is_empty());
}

#[tokio::test]
async fn test_batch_aborts_on_first_failure_with_partial_progress() {
    let store = store_with_room(false).await;
    store
        .room_add_to_list("room1", RoomList::Blacklist, &names(&["dup"]))
        .await
        .unwrap();
    let room = Room::new(store.clone(), "room1");

    // "dup" 已经在黑名单里，整批以该项的错误中止
    let err = room
        .add_to_list("owner", RoomList::Blacklist, &names(&["fresh", "dup"]))
        .await
        .unwrap_err();
    assert_eq!(err, ChatError::name_in_list("dup", "blacklist"));

    // 中止前的部分进度允许可见；原有项不受影响
    assert!(store
        .room_has_in_list("room1", RoomList::Blacklist, "dup")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_check_is_owner() {
    let store = store_with_room(false).await;
    let room = Room::new(store, "room1");

    room.check_is_owner("owner").await.unwrap();
    assert_eq!(room.check_is_owner("user1").await, Err(ChatError::NotAllowed));
}
