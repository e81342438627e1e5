//! 名称校验
//!
//! 用户名与房间名共用同一套字符规则。

use crate::errors::{ChatError, ChatResult};

/// 检查名称是否合法
///
/// 合法名称非空，且每个字符都是非控制字符并排除 `:`、`{`、`}`。
/// DEL 属于控制字符，一并被拒绝。
pub fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| !c.is_control() && c != ':' && c != '{' && c != '}')
}

/// 校验名称，不合法时返回 `invalidName`
pub fn ensure_valid_name(name: &str) -> ChatResult<()> {
    if valid_name(name) {
        Ok(())
    } else {
        Err(ChatError::invalid_name(name))
    }
}
