//! 集成测试辅助
//!
//! 在进程内装配完整的服务拓扑：共享枢纽 + 共享状态存储，可以拉起
//! 任意多个服务实例。

#![allow(dead_code)]

use application::{ChatService, ChatServiceDependencies, CommandHooks};
use config::ServiceConfig;
use domain::StateStore;
use infrastructure::{MemoryHub, MemoryState, MemoryTransport, TestClient};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub struct TestService {
    pub service: Arc<ChatService>,
    pub transport: Arc<MemoryTransport>,
    pub hub: Arc<MemoryHub>,
    pub store: Arc<dyn StateStore>,
}

/// 在给定枢纽与存储上启动一个服务实例
pub fn start_instance(
    hub: Arc<MemoryHub>,
    store: Arc<dyn StateStore>,
    config: ServiceConfig,
    hooks: CommandHooks,
) -> TestService {
    let transport = MemoryTransport::new(hub.clone());
    let service = ChatService::start(ChatServiceDependencies {
        config,
        store: store.clone(),
        transport: transport.clone(),
        hooks,
    });
    TestService {
        service,
        transport,
        hub,
        store,
    }
}

/// 单实例拓扑
pub fn start_service(config: ServiceConfig) -> TestService {
    let hub = MemoryHub::new();
    let store: Arc<dyn StateStore> = Arc::new(MemoryState::new(config.history_max_messages));
    start_instance(hub, store, config, CommandHooks::new())
}

/// 打开 socket 并完成登录
pub async fn login(service: &TestService, user_name: &str) -> TestClient {
    let mut client = service
        .transport
        .open_socket(Some(user_name))
        .await
        .expect("transport accepting");
    let (event, args) = next_event(&mut client).await;
    assert_eq!(event, "loginConfirmed", "unexpected event: {event} {args:?}");
    assert_eq!(args[0], Value::String(user_name.to_string()));
    client
}

/// 带超时地读取下一帧事件
pub async fn next_event(client: &mut TestClient) -> (String, Vec<Value>) {
    tokio::time::timeout(Duration::from_secs(2), client.recv_event())
        .await
        .expect("timed out waiting for event")
        .expect("socket closed while waiting for event")
}

/// 断言下一帧事件的名称并返回参数
pub async fn expect_event(client: &mut TestClient, name: &str) -> Vec<Value> {
    let (event, args) = next_event(client).await;
    assert_eq!(event, name, "unexpected event args: {args:?}");
    args
}

/// 断言一段时间内没有任何事件
pub async fn expect_silence(client: &mut TestClient) {
    let result = tokio::time::timeout(Duration::from_millis(200), client.recv_event()).await;
    assert!(result.is_err(), "expected no event, got {:?}", result.unwrap());
}
