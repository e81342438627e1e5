//! 私聊权限层
//!
//! 每个用户持有自己的私聊黑名单、白名单与白名单模式开关。列表
//! 只有本人可以修改。发送权限：发送者不在接收者黑名单中，且接收
//! 者未开白名单模式或发送者在白名单中。
//!
//! 隐私约定：被拉黑的发送者收到 `noUserOnline` 而不是
//! `notAllowed`，避免暴露黑名单的存在。

use crate::room::store_error;
use domain::{ChatError, ChatResult, DirectList, StateStore};
use futures_util::stream::{self, TryStreamExt};
use std::sync::Arc;

/// 列表批量变更的最大在途项数
const LIST_BATCH_CONCURRENCY: usize = 16;

/// 权限检查过的私聊列表操作，`user_name` 是列表的所有者
pub struct DirectMessaging {
    store: Arc<dyn StateStore>,
    user_name: String,
}

impl DirectMessaging {
    pub fn new(store: Arc<dyn StateStore>, user_name: impl Into<String>) -> Self {
        Self {
            store,
            user_name: user_name.into(),
        }
    }

    fn missing(&self) -> ChatError {
        ChatError::no_user_online(&self.user_name)
    }

    fn ensure_owner(&self, author: &str) -> ChatResult<()> {
        if author == self.user_name {
            Ok(())
        } else {
            Err(ChatError::NotAllowed)
        }
    }

    async fn has_in_list(&self, list: DirectList, value: &str) -> ChatResult<bool> {
        self.store
            .direct_has_in_list(&self.user_name, list, value)
            .await
            .map_err(|e| store_error(e, self.missing()))
    }

    pub async fn get_list(&self, author: &str, list: DirectList) -> ChatResult<Vec<String>> {
        self.ensure_owner(author)?;
        self.store
            .direct_get_list(&self.user_name, list)
            .await
            .map_err(|e| store_error(e, self.missing()))
    }

    pub async fn get_mode(&self, author: &str) -> ChatResult<bool> {
        self.ensure_owner(author)?;
        self.store
            .direct_whitelist_only(&self.user_name)
            .await
            .map_err(|e| store_error(e, self.missing()))
    }

    pub async fn set_mode(&self, author: &str, mode: bool) -> ChatResult<()> {
        self.ensure_owner(author)?;
        self.store
            .direct_whitelist_only_set(&self.user_name, mode)
            .await
            .map_err(|e| store_error(e, self.missing()))
    }

    pub async fn add_to_list(
        &self,
        author: &str,
        list: DirectList,
        values: &[String],
    ) -> ChatResult<()> {
        self.change_list(author, list, values, true).await
    }

    pub async fn remove_from_list(
        &self,
        author: &str,
        list: DirectList,
        values: &[String],
    ) -> ChatResult<()> {
        self.change_list(author, list, values, false).await
    }

    async fn change_list(
        &self,
        author: &str,
        list: DirectList,
        values: &[String],
        adding: bool,
    ) -> ChatResult<()> {
        self.ensure_owner(author)?;
        stream::iter(values.iter().map(Ok::<_, ChatError>))
            .try_for_each_concurrent(LIST_BATCH_CONCURRENCY, |value| async move {
                let present = self.has_in_list(list, value).await?;
                if adding && present {
                    return Err(ChatError::name_in_list(value, list.as_str()));
                }
                if !adding && !present {
                    return Err(ChatError::no_name_in_list(value, list.as_str()));
                }
                let item = std::slice::from_ref(value);
                let result = if adding {
                    self.store
                        .direct_add_to_list(&self.user_name, list, item)
                        .await
                } else {
                    self.store
                        .direct_remove_from_list(&self.user_name, list, item)
                        .await
                };
                result.map_err(|e| store_error(e, self.missing()))
            })
            .await
    }

    /// 检查发送者能否给本用户发私聊
    pub async fn check_access(&self, sender: &str) -> ChatResult<()> {
        if self.has_in_list(DirectList::Blacklist, sender).await? {
            // 隐私：黑名单成员看到的是"不在线"
            return Err(self.missing());
        }
        let whitelist_only = self
            .store
            .direct_whitelist_only(&self.user_name)
            .await
            .map_err(|e| store_error(e, self.missing()))?;
        if whitelist_only && !self.has_in_list(DirectList::Whitelist, sender).await? {
            return Err(ChatError::NotAllowed);
        }
        Ok(())
    }
}
