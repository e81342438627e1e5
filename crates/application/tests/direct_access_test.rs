//! 私聊权限层测试

use application::DirectMessaging;
use domain::{ChatError, DirectList, InstanceId, SocketId, StateStore};
use infrastructure::MemoryState;
use std::sync::Arc;

async fn store_with_user(name: &str) -> Arc<MemoryState> {
    let store = Arc::new(MemoryState::new(100));
    store
        .login_user(name, InstanceId::new(), SocketId::new())
        .await
        .unwrap();
    store
}

fn names(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[tokio::test]
async fn test_only_owner_mutates_lists() {
    let store = store_with_user("user1").await;
    let direct = DirectMessaging::new(store, "user1");

    direct
        .add_to_list("user1", DirectList::Blacklist, &names(&["user2"]))
        .await
        .unwrap();
    assert_eq!(
        direct
            .add_to_list("user2", DirectList::Blacklist, &names(&["user3"]))
            .await,
        Err(ChatError::NotAllowed)
    );
    assert_eq!(
        direct.get_list("user2", DirectList::Blacklist).await,
        Err(ChatError::NotAllowed)
    );
    assert_eq!(
        direct.set_mode("user2", true).await,
        Err(ChatError::NotAllowed)
    );
}

#[tokio::test]
async fn test_duplicate_and_missing_entries() {
    let store = store_with_user("user1").await;
    let direct = DirectMessaging::new(store, "user1");

    direct
        .add_to_list("user1", DirectList::Whitelist, &names(&["user2"]))
        .await
        .unwrap();
    assert_eq!(
        direct
            .add_to_list("user1", DirectList::Whitelist, &names(&["user2"]))
            .await,
        Err(ChatError::name_in_list("user2", "whitelist"))
    );
    assert_eq!(
        direct
            .remove_from_list("user1", DirectList::Blacklist, &names(&["user9"]))
            .await,
        Err(ChatError::no_name_in_list("user9", "blacklist"))
    );
}

#[tokio::test]
async fn test_check_access_default_allows() {
    let store = store_with_user("user1").await;
    let direct = DirectMessaging::new(store, "user1");

    direct.check_access("user2").await.unwrap();
}

#[tokio::test]
async fn test_blacklisted_sender_sees_no_user_online() {
    let store = store_with_user("user1").await;
    let direct = DirectMessaging::new(store, "user1");

    direct
        .add_to_list("user1", DirectList::Blacklist, &names(&["user2"]))
        .await
        .unwrap();
    // 隐私：黑名单成员不能得知自己被拉黑
    assert_eq!(
        direct.check_access("user2").await,
        Err(ChatError::no_user_online("user1"))
    );
}

#[tokio::test]
async fn test_whitelist_only_mode() {
    let store = store_with_user("user1").await;
    let direct = DirectMessaging::new(store, "user1");

    direct.set_mode("user1", true).await.unwrap();
    assert_eq!(
        direct.check_access("user2").await,
        Err(ChatError::NotAllowed)
    );

    direct
        .add_to_list("user1", DirectList::Whitelist, &names(&["user2"]))
        .await
        .unwrap();
    direct.check_access("user2").await.unwrap();

    // 关掉白名单模式恢复默认行为
    direct.set_mode("user1", false).await.unwrap();
    direct.check_access("user3").await.unwrap();
}

#[tokio::test]
async fn test_blacklist_overrides_whitelist() {
    let store = store_with_user("user1").await;
    let direct = DirectMessaging::new(store, "user1");

    direct.set_mode("user1", true).await.unwrap();
    direct
        .add_to_list("user1", DirectList::Whitelist, &names(&["user2"]))
        .await
        .unwrap();
    direct
        .add_to_list("user1", DirectList::Blacklist, &names(&["user2"]))
        .await
        .unwrap();

    // 黑名单优先于任何其它授权
    assert_eq!(
        direct.check_access("user2").await,
        Err(ChatError::no_user_online("user1"))
    );
}
