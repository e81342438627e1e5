//! 主应用程序入口
//!
//! 装配单实例聊天服务并等待退出信号。

use application::{ChatService, ChatServiceDependencies, CommandHooks};
use config::{ServiceConfig, StoreBackend};
use domain::StateStore;
use infrastructure::{MemoryHub, MemoryState, MemoryTransport, RedisState};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = ServiceConfig::load()?;

    // 选择状态存储后端
    let store: Arc<dyn StateStore> = match config.store.backend {
        StoreBackend::Memory => {
            tracing::info!("使用内存状态存储");
            Arc::new(MemoryState::new(config.history_max_messages))
        }
        StoreBackend::Redis => {
            let url = config
                .store
                .redis_url
                .as_deref()
                .expect("validate 保证 redis_url 存在");
            tracing::info!("使用 Redis 共享状态存储");
            Arc::new(
                RedisState::connect(url, config.namespace.clone(), config.history_max_messages)
                    .await?,
            )
        }
    };

    let hub = MemoryHub::new();
    let transport = MemoryTransport::new(hub);

    let service = ChatService::start(ChatServiceDependencies {
        config,
        store,
        transport,
        hooks: CommandHooks::new(),
    });

    tracing::info!(instance = %service.instance_id(), "聊天服务运行中，Ctrl-C 退出");
    tokio::signal::ctrl_c().await?;

    service.close().await;
    Ok(())
}
