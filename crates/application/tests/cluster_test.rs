//! 多实例场景测试
//!
//! 两个服务实例共享同一个枢纽与状态存储，验证跨实例的频道维护、
//! 驱逐与断连指令。

mod support;

use config::ServiceConfig;
use domain::{room_channel, ChatError, InstanceId, RoomList, SocketId, StateStore};
use infrastructure::{MemoryHub, MemoryState};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use support::{expect_event, login, next_event, start_instance, TestService};

fn test_config() -> ServiceConfig {
    let mut config = ServiceConfig::test_config();
    config.enable_userlist_updates = false;
    config
}

/// 同一存储、同一枢纽上的两个实例
fn two_instances() -> (TestService, TestService) {
    let hub = MemoryHub::new();
    let store: Arc<dyn StateStore> = Arc::new(MemoryState::new(100));
    let i1 = start_instance(
        hub.clone(),
        store.clone(),
        test_config(),
        application::CommandHooks::new(),
    );
    let i2 = start_instance(hub, store, test_config(), application::CommandHooks::new());
    (i1, i2)
}

async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..50 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached in time");
}

// ---- 场景 6：集群断连 ----

#[tokio::test]
async fn test_disconnect_user_sockets_across_instances() {
    let (i1, i2) = two_instances();

    let mut c1 = login(&i1, "user1").await;
    let mut c2 = login(&i2, "user1").await;
    assert_eq!(i1.store.user_sockets("user1").await.unwrap().len(), 2);

    i1.service.disconnect_user_sockets("user1").await.unwrap();

    let (event, _) = next_event(&mut c1).await;
    assert_eq!(event, "disconnect");
    let (event, _) = next_event(&mut c2).await;
    assert_eq!(event, "disconnect");
    assert!(c1.recv_event().await.is_none());
    assert!(c2.recv_event().await.is_none());

    wait_until(|| async { !i1.store.is_online("user1").await.unwrap() }).await;
}

// ---- 跨实例驱逐 ----

#[tokio::test]
async fn test_blacklist_eviction_across_instances() {
    let (i1, i2) = two_instances();
    i1.store.add_room("room1", Some("user1"), false).await.unwrap();

    let owner = login(&i1, "user1").await;
    let mut remote = login(&i2, "user2").await;

    owner.emit("roomJoin", vec![json!("room1")]).await.unwrap();
    remote.emit("roomJoin", vec![json!("room1")]).await.unwrap();
    assert_eq!(i1.hub.channel_members(&room_channel("room1")).await.len(), 2);

    // 另一实例上的成员被拉黑：集群总线负责把它的 socket 移出频道
    let ack = owner
        .emit(
            "roomAddToList",
            vec![json!("room1"), json!("blacklist"), json!(["user2"])],
        )
        .await
        .unwrap();
    assert_eq!(ack.error, Value::Null);

    let args = expect_event(&mut remote, "roomAccessRemoved").await;
    assert_eq!(args, vec![json!("room1")]);
    assert_eq!(
        i1.hub.channel_members(&room_channel("room1")).await,
        vec![owner.socket_id()]
    );
    assert_eq!(
        i1.store.room_get_list("room1", RoomList::Userlist).await.unwrap(),
        vec!["user1".to_string()]
    );
}

#[tokio::test]
async fn test_room_leave_removes_remote_sockets() {
    let (i1, i2) = two_instances();
    i1.store.add_room("room1", None, false).await.unwrap();

    let a = login(&i1, "user1").await;
    let b = login(&i2, "user1").await;

    a.emit("roomJoin", vec![json!("room1")]).await.unwrap();
    b.emit("roomJoin", vec![json!("room1")]).await.unwrap();
    assert_eq!(i1.hub.channel_members(&room_channel("room1")).await.len(), 2);

    // 一条 roomLeave 把该用户所有实例上的 socket 都移出频道
    let ack = a.emit("roomLeave", vec![json!("room1")]).await.unwrap();
    assert_eq!(ack.error, Value::Null);
    assert!(i1.hub.channel_members(&room_channel("room1")).await.is_empty());
    assert!(i1
        .store
        .room_get_list("room1", RoomList::Userlist)
        .await
        .unwrap()
        .is_empty());
}

// ---- 在线状态跨实例一致 ----

#[tokio::test]
async fn test_presence_spans_instances() {
    let (i1, i2) = two_instances();

    let c1 = login(&i1, "user1").await;
    let c2 = login(&i2, "user1").await;

    c1.close().await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    // 另一实例上还有 socket，用户保持在线
    assert!(i1.store.is_online("user1").await.unwrap());

    c2.close().await;
    wait_until(|| async { !i1.store.is_online("user1").await.unwrap() }).await;
}

// ---- 总线应答超时 ----

#[tokio::test]
async fn test_bus_ack_timeout_surfaces_server_error() {
    let hub = MemoryHub::new();
    let store: Arc<dyn StateStore> = Arc::new(MemoryState::new(100));
    let mut config = test_config();
    config.bus_ack_timeout_ms = 100;
    let service = start_instance(hub, store.clone(), config, application::CommandHooks::new());
    store.add_room("room1", None, false).await.unwrap();

    let client = login(&service, "user1").await;
    client.emit("roomJoin", vec![json!("room1")]).await.unwrap();

    // 伪造一个挂在不存在实例上的 socket 记录，没有实例会应答
    store
        .login_user("user1", InstanceId::new(), SocketId::new())
        .await
        .unwrap();

    let ack = client.emit("roomLeave", vec![json!("room1")]).await.unwrap();
    assert_eq!(
        ack.error,
        json!(ChatError::server_error("cluster bus ack timeout").to_string())
    );
}
