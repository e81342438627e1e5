//! 房间权限层
//!
//! 在状态存储之上实施房间的访问控制规则。列表批量变更的每一项
//! 单独检查，最多 16 个在途；任何一项失败即中止整批，已完成的
//! 修改保持可见。
//!
//! 失去访问权的集合在变更完成之后计算：对每个候选成员重新评估
//! 访问谓词，并发的授权修改不会把仍被允许的成员踢出。

use domain::{ChatError, ChatResult, Message, RoomList, StateStore, StoreError};
use futures_util::stream::{self, TryStreamExt};
use std::collections::HashSet;
use std::sync::Arc;

/// 列表批量变更的最大在途项数
const LIST_BATCH_CONCURRENCY: usize = 16;

/// 把存储错误折叠为命令错误
///
/// `NotFound` 映射为调用方给出的领域错误，其余失败记录日志并
/// 以 `serverError` 上浮。
pub(crate) fn store_error(err: StoreError, on_missing: ChatError) -> ChatError {
    match err {
        StoreError::NotFound { .. } => on_missing,
        other => {
            tracing::error!(error = %other, "状态存储操作失败");
            ChatError::server_error("state store failure")
        }
    }
}

/// 权限检查过的房间操作
pub struct Room {
    store: Arc<dyn StateStore>,
    name: String,
}

impl Room {
    pub fn new(store: Arc<dyn StateStore>, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn missing_read(&self) -> ChatError {
        ChatError::not_joined(&self.name)
    }

    async fn owner(&self) -> ChatResult<Option<String>> {
        self.store
            .room_owner(&self.name)
            .await
            .map_err(|e| store_error(e, ChatError::NotAllowed))
    }

    async fn has_in_list(&self, list: RoomList, name: &str) -> ChatResult<bool> {
        self.store
            .room_has_in_list(&self.name, list, name)
            .await
            .map_err(|e| store_error(e, ChatError::NotAllowed))
    }

    async fn whitelist_only(&self) -> ChatResult<bool> {
        self.store
            .room_whitelist_only(&self.name)
            .await
            .map_err(|e| store_error(e, ChatError::NotAllowed))
    }

    /// 用户是否为管理员（房主或 adminlist 成员）
    async fn is_admin(&self, user: &str) -> ChatResult<bool> {
        if self.owner().await?.as_deref() == Some(user) {
            return Ok(true);
        }
        self.has_in_list(RoomList::Adminlist, user).await
    }

    /// 加入房间
    ///
    /// 黑名单成员被拒绝；白名单模式下只放行白名单、管理员与房主。
    /// 返回是否为新的逻辑加入（用户此前不在 userlist）。
    pub async fn join(&self, user: &str) -> ChatResult<bool> {
        let owner = self.owner().await?;
        if self.has_in_list(RoomList::Blacklist, user).await? {
            return Err(ChatError::NotAllowed);
        }
        if self.whitelist_only().await? {
            let admitted = owner.as_deref() == Some(user)
                || self.has_in_list(RoomList::Whitelist, user).await?
                || self.has_in_list(RoomList::Adminlist, user).await?;
            if !admitted {
                return Err(ChatError::NotAllowed);
            }
        }
        let already = self.has_in_list(RoomList::Userlist, user).await?;
        if !already {
            self.store
                .room_add_to_list(&self.name, RoomList::Userlist, &[user.to_string()])
                .await
                .map_err(|e| store_error(e, ChatError::NotAllowed))?;
        }
        Ok(!already)
    }

    /// 离开房间，无条件从 userlist 移除
    ///
    /// 返回用户此前是否在 userlist 中。
    pub async fn leave(&self, user: &str) -> ChatResult<bool> {
        let was_member = self
            .store
            .room_has_in_list(&self.name, RoomList::Userlist, user)
            .await
            .map_err(|e| store_error(e, self.missing_read()))?;
        if was_member {
            self.store
                .room_remove_from_list(&self.name, RoomList::Userlist, &[user.to_string()])
                .await
                .map_err(|e| store_error(e, self.missing_read()))?;
        }
        Ok(was_member)
    }

    /// 发送消息，只有 userlist 成员可以发言
    pub async fn message(&self, author: &str, message: Message) -> ChatResult<()> {
        self.ensure_joined(author).await?;
        self.store
            .room_message_add(&self.name, message)
            .await
            .map_err(|e| store_error(e, self.missing_read()))
    }

    /// 读取历史消息（写入顺序）
    pub async fn history(&self, author: &str) -> ChatResult<Vec<Message>> {
        self.ensure_joined(author).await?;
        self.store
            .room_messages_get(&self.name)
            .await
            .map_err(|e| store_error(e, self.missing_read()))
    }

    /// 读取访问控制列表，只有 userlist 成员可以读
    pub async fn get_list(&self, author: &str, list: RoomList) -> ChatResult<Vec<String>> {
        self.ensure_joined(author).await?;
        self.store
            .room_get_list(&self.name, list)
            .await
            .map_err(|e| store_error(e, self.missing_read()))
    }

    /// 读取白名单模式
    pub async fn get_mode(&self) -> ChatResult<bool> {
        self.store
            .room_whitelist_only(&self.name)
            .await
            .map_err(|e| store_error(e, self.missing_read()))
    }

    /// 切换白名单模式，仅管理员可用
    ///
    /// 切到 true 时返回因此失去访问权的在线成员。
    pub async fn change_mode(&self, author: &str, mode: bool) -> ChatResult<Vec<String>> {
        if !self.is_admin(author).await? {
            return Err(ChatError::NotAllowed);
        }
        self.store
            .room_whitelist_only_set(&self.name, mode)
            .await
            .map_err(|e| store_error(e, ChatError::NotAllowed))?;
        if !mode {
            return Ok(Vec::new());
        }

        let owner = self.owner().await?;
        let mut lost = Vec::new();
        for user in self
            .store
            .room_get_list(&self.name, RoomList::Userlist)
            .await
            .map_err(|e| store_error(e, ChatError::NotAllowed))?
        {
            if owner.as_deref() == Some(user.as_str()) {
                continue;
            }
            if self.has_in_list(RoomList::Adminlist, &user).await?
                || self.has_in_list(RoomList::Whitelist, &user).await?
            {
                continue;
            }
            lost.push(user);
        }
        Ok(lost)
    }

    /// 校验房主身份
    pub async fn check_is_owner(&self, user: &str) -> ChatResult<()> {
        if self.owner().await?.as_deref() == Some(user) {
            Ok(())
        } else {
            Err(ChatError::NotAllowed)
        }
    }

    /// 批量添加到列表，返回因此失去访问权的在线成员
    pub async fn add_to_list(
        &self,
        author: &str,
        list: RoomList,
        values: &[String],
    ) -> ChatResult<Vec<String>> {
        self.change_list(author, list, values, true).await
    }

    /// 批量从列表移除，返回因此失去访问权的在线成员
    pub async fn remove_from_list(
        &self,
        author: &str,
        list: RoomList,
        values: &[String],
    ) -> ChatResult<Vec<String>> {
        self.change_list(author, list, values, false).await
    }

    async fn ensure_joined(&self, author: &str) -> ChatResult<()> {
        let joined = self
            .store
            .room_has_in_list(&self.name, RoomList::Userlist, author)
            .await
            .map_err(|e| store_error(e, self.missing_read()))?;
        if joined {
            Ok(())
        } else {
            Err(self.missing_read())
        }
    }

    async fn change_list(
        &self,
        author: &str,
        list: RoomList,
        values: &[String],
        adding: bool,
    ) -> ChatResult<Vec<String>> {
        // userlist 不能通过本接口修改
        if list == RoomList::Userlist {
            return Err(ChatError::NotAllowed);
        }
        let owner = self.owner().await?;
        let author_is_owner = owner.as_deref() == Some(author);

        stream::iter(values.iter().map(Ok::<_, ChatError>))
            .try_for_each_concurrent(LIST_BATCH_CONCURRENCY, |value| {
                let owner = owner.as_deref();
                async move {
                    self.check_list_item(author, author_is_owner, owner, list, value, adding)
                        .await?;
                    let item = std::slice::from_ref(value);
                    let result = if adding {
                        self.store.room_add_to_list(&self.name, list, item).await
                    } else {
                        self.store.room_remove_from_list(&self.name, list, item).await
                    };
                    result.map_err(|e| store_error(e, ChatError::NotAllowed))
                }
            })
            .await?;

        self.lost_access_after(list, values, adding).await
    }

    /// 列表变更协议的单项检查
    async fn check_list_item(
        &self,
        author: &str,
        author_is_owner: bool,
        owner: Option<&str>,
        list: RoomList,
        value: &str,
        adding: bool,
    ) -> ChatResult<()> {
        if !author_is_owner {
            // 房主不可被操作
            if owner == Some(value) {
                return Err(ChatError::NotAllowed);
            }
            // 管理员不可被操作
            if self.has_in_list(RoomList::Adminlist, value).await? {
                return Err(ChatError::NotAllowed);
            }
            // 非管理员没有修改权
            if !self.has_in_list(RoomList::Adminlist, author).await? {
                return Err(ChatError::NotAllowed);
            }
        }
        let present = self.has_in_list(list, value).await?;
        if adding && present {
            return Err(ChatError::name_in_list(value, list.as_str()));
        }
        if !adding && !present {
            return Err(ChatError::no_name_in_list(value, list.as_str()));
        }
        Ok(())
    }

    /// 变更完成后，计算被波及成员里失去访问权的子集
    async fn lost_access_after(
        &self,
        list: RoomList,
        values: &[String],
        adding: bool,
    ) -> ChatResult<Vec<String>> {
        let relevant = match (list, adding) {
            (RoomList::Blacklist, true) => true,
            (RoomList::Whitelist, false) => self.whitelist_only().await?,
            // adminlist 变更不触发驱逐
            _ => false,
        };
        if !relevant {
            return Ok(Vec::new());
        }

        let owner = self.owner().await?;
        let mut seen = HashSet::new();
        let mut lost = Vec::new();
        for value in values {
            if !seen.insert(value.as_str()) {
                continue;
            }
            if !self.has_in_list(RoomList::Userlist, value).await? {
                continue;
            }
            if owner.as_deref() == Some(value.as_str())
                || self.has_in_list(RoomList::Adminlist, value).await?
            {
                continue;
            }
            let blacklisted = self.has_in_list(RoomList::Blacklist, value).await?;
            let shut_out =
                self.whitelist_only().await? && !self.has_in_list(RoomList::Whitelist, value).await?;
            if blacklisted || shut_out {
                lost.push(value.clone());
            }
        }
        Ok(lost)
    }
}
