//! 命令错误定义
//!
//! 定义客户端命令可能返回的所有稳定错误类型，并提供两种对外渲染
//! 模式：结构化对象 `{name, args}` 或字符串。

use serde_json::{json, Value};
use thiserror::Error;

/// 命令错误类型
///
/// 每个变体对应一个稳定的错误标签，标签随应答原样下发给客户端。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChatError {
    /// 非法的用户名或房间名
    #[error("invalidName: {name}")]
    InvalidName { name: String },

    /// 连接未携带有效的登录身份
    #[error("noLogin")]
    NoLogin,

    /// 权限不足
    #[error("notAllowed")]
    NotAllowed,

    /// 用户不在房间内
    #[error("notJoined: {room_name}")]
    NotJoined { room_name: String },

    /// 名称已存在于目标列表
    #[error("nameInList: {name} {list_name}")]
    NameInList { name: String, list_name: String },

    /// 名称不存在于目标列表
    #[error("noNameInList: {name} {list_name}")]
    NoNameInList { name: String, list_name: String },

    /// 未知的列表名
    #[error("noList: {list_name}")]
    NoList { list_name: String },

    /// 房间已存在
    #[error("roomExists: {room_name}")]
    RoomExists { room_name: String },

    /// 目标用户不在线
    #[error("noUserOnline: {user_name}")]
    NoUserOnline { user_name: String },

    /// 命令参数个数错误
    #[error("wrongArgumentsCount: expected {expected}, got {actual}")]
    WrongArgumentsCount { expected: usize, actual: usize },

    /// 命令参数类型错误
    #[error("badArgument: {argument} {value}")]
    BadArgument { argument: String, value: String },

    /// 未知的 socket
    #[error("invalidSocket: {socket_id}")]
    InvalidSocket { socket_id: String },

    /// 服务内部错误（后端失败统一折叠到这里）
    #[error("serverError: {message}")]
    ServerError { message: String },
}

impl ChatError {
    pub fn invalid_name(name: impl Into<String>) -> Self {
        Self::InvalidName { name: name.into() }
    }

    pub fn not_joined(room_name: impl Into<String>) -> Self {
        Self::NotJoined {
            room_name: room_name.into(),
        }
    }

    pub fn name_in_list(name: impl Into<String>, list_name: impl Into<String>) -> Self {
        Self::NameInList {
            name: name.into(),
            list_name: list_name.into(),
        }
    }

    pub fn no_name_in_list(name: impl Into<String>, list_name: impl Into<String>) -> Self {
        Self::NoNameInList {
            name: name.into(),
            list_name: list_name.into(),
        }
    }

    pub fn no_list(list_name: impl Into<String>) -> Self {
        Self::NoList {
            list_name: list_name.into(),
        }
    }

    pub fn room_exists(room_name: impl Into<String>) -> Self {
        Self::RoomExists {
            room_name: room_name.into(),
        }
    }

    pub fn no_user_online(user_name: impl Into<String>) -> Self {
        Self::NoUserOnline {
            user_name: user_name.into(),
        }
    }

    pub fn wrong_arguments_count(expected: usize, actual: usize) -> Self {
        Self::WrongArgumentsCount { expected, actual }
    }

    pub fn bad_argument(argument: impl Into<String>, value: impl Into<String>) -> Self {
        Self::BadArgument {
            argument: argument.into(),
            value: value.into(),
        }
    }

    pub fn invalid_socket(socket_id: impl ToString) -> Self {
        Self::InvalidSocket {
            socket_id: socket_id.to_string(),
        }
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::ServerError {
            message: message.into(),
        }
    }

    /// 稳定的错误标签
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidName { .. } => "invalidName",
            Self::NoLogin => "noLogin",
            Self::NotAllowed => "notAllowed",
            Self::NotJoined { .. } => "notJoined",
            Self::NameInList { .. } => "nameInList",
            Self::NoNameInList { .. } => "noNameInList",
            Self::NoList { .. } => "noList",
            Self::RoomExists { .. } => "roomExists",
            Self::NoUserOnline { .. } => "noUserOnline",
            Self::WrongArgumentsCount { .. } => "wrongArgumentsCount",
            Self::BadArgument { .. } => "badArgument",
            Self::InvalidSocket { .. } => "invalidSocket",
            Self::ServerError { .. } => "serverError",
        }
    }

    /// 错误的位置参数，用于结构化渲染
    pub fn args(&self) -> Vec<Value> {
        match self {
            Self::InvalidName { name } => vec![json!(name)],
            Self::NoLogin | Self::NotAllowed => vec![],
            Self::NotJoined { room_name } => vec![json!(room_name)],
            Self::NameInList { name, list_name } | Self::NoNameInList { name, list_name } => {
                vec![json!(name), json!(list_name)]
            }
            Self::NoList { list_name } => vec![json!(list_name)],
            Self::RoomExists { room_name } => vec![json!(room_name)],
            Self::NoUserOnline { user_name } => vec![json!(user_name)],
            Self::WrongArgumentsCount { expected, actual } => {
                vec![json!(expected), json!(actual)]
            }
            Self::BadArgument { argument, value } => vec![json!(argument), json!(value)],
            Self::InvalidSocket { socket_id } => vec![json!(socket_id)],
            Self::ServerError { message } => vec![json!(message)],
        }
    }

    /// 按服务配置渲染为下发给客户端的值
    pub fn to_wire(&self, use_raw_error_objects: bool) -> Value {
        if use_raw_error_objects {
            json!({ "name": self.kind(), "args": self.args() })
        } else {
            Value::String(self.to_string())
        }
    }
}

/// 命令结果类型
pub type ChatResult<T> = Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_tags() {
        assert_eq!(ChatError::NoLogin.kind(), "noLogin");
        assert_eq!(ChatError::NotAllowed.kind(), "notAllowed");
        assert_eq!(ChatError::not_joined("room1").kind(), "notJoined");
        assert_eq!(ChatError::room_exists("room1").kind(), "roomExists");
        assert_eq!(ChatError::wrong_arguments_count(2, 3).kind(), "wrongArgumentsCount");
    }

    #[test]
    fn test_string_rendering() {
        let err = ChatError::not_joined("room1");
        assert_eq!(err.to_wire(false), json!("notJoined: room1"));

        let err = ChatError::name_in_list("user2", "blacklist");
        assert_eq!(err.to_wire(false), json!("nameInList: user2 blacklist"));
    }

    #[test]
    fn test_raw_rendering() {
        let err = ChatError::no_user_online("user2");
        assert_eq!(
            err.to_wire(true),
            json!({ "name": "noUserOnline", "args": ["user2"] })
        );

        // 无参数错误的 args 必须是空数组
        assert_eq!(
            ChatError::NotAllowed.to_wire(true),
            json!({ "name": "notAllowed", "args": [] })
        );
    }

    #[test]
    fn test_wrong_arguments_count_args() {
        let err = ChatError::wrong_arguments_count(1, 4);
        assert_eq!(err.args(), vec![json!(1), json!(4)]);
    }
}
