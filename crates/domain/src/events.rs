//! 服务端事件定义
//!
//! 服务端推送给客户端的事件词汇表。事件在线上表示为
//! `(事件名, 位置参数)` 帧。

use crate::message::Message;
use serde_json::{json, Value};

/// 服务端到客户端的事件
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// 登录成功
    LoginConfirmed { user_name: String, auth_data: Value },
    /// 登录失败，socket 随后断开
    LoginRejected { error: Value },
    /// 收到私聊消息
    DirectMessage { from_user: String, message: Message },
    /// 私聊回显，发给发送者的其它 socket
    DirectMessageEcho { to_user: String, message: Message },
    /// 房间消息广播
    RoomMessage {
        room_name: String,
        user_name: String,
        message: Message,
    },
    /// 加入房间回显
    RoomJoinedEcho { room_name: String },
    /// 离开房间回显
    RoomLeftEcho { room_name: String },
    /// 其他成员加入房间
    RoomUserJoined { room_name: String, user_name: String },
    /// 其他成员离开房间
    RoomUserLeft { room_name: String, user_name: String },
    /// 当前用户失去房间访问权
    RoomAccessRemoved { room_name: String },
    /// 服务端主动断开
    Disconnect,
}

impl ServerEvent {
    /// 事件名
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::LoginConfirmed { .. } => "loginConfirmed",
            ServerEvent::LoginRejected { .. } => "loginRejected",
            ServerEvent::DirectMessage { .. } => "directMessage",
            ServerEvent::DirectMessageEcho { .. } => "directMessageEcho",
            ServerEvent::RoomMessage { .. } => "roomMessage",
            ServerEvent::RoomJoinedEcho { .. } => "roomJoinedEcho",
            ServerEvent::RoomLeftEcho { .. } => "roomLeftEcho",
            ServerEvent::RoomUserJoined { .. } => "roomUserJoined",
            ServerEvent::RoomUserLeft { .. } => "roomUserLeft",
            ServerEvent::RoomAccessRemoved { .. } => "roomAccessRemoved",
            ServerEvent::Disconnect => "disconnect",
        }
    }

    /// 事件的位置参数
    pub fn args(&self) -> Vec<Value> {
        match self {
            ServerEvent::LoginConfirmed {
                user_name,
                auth_data,
            } => vec![json!(user_name), auth_data.clone()],
            ServerEvent::LoginRejected { error } => vec![error.clone()],
            ServerEvent::DirectMessage { from_user, message } => {
                vec![json!(from_user), json!(message)]
            }
            ServerEvent::DirectMessageEcho { to_user, message } => {
                vec![json!(to_user), json!(message)]
            }
            ServerEvent::RoomMessage {
                room_name,
                user_name,
                message,
            } => vec![json!(room_name), json!(user_name), json!(message)],
            ServerEvent::RoomJoinedEcho { room_name }
            | ServerEvent::RoomLeftEcho { room_name }
            | ServerEvent::RoomAccessRemoved { room_name } => vec![json!(room_name)],
            ServerEvent::RoomUserJoined {
                room_name,
                user_name,
            }
            | ServerEvent::RoomUserLeft {
                room_name,
                user_name,
            } => vec![json!(room_name), json!(user_name)],
            ServerEvent::Disconnect => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        let ev = ServerEvent::RoomJoinedEcho {
            room_name: "room1".to_string(),
        };
        assert_eq!(ev.name(), "roomJoinedEcho");
        assert_eq!(ev.args(), vec![json!("room1")]);
    }

    #[test]
    fn test_room_message_args() {
        let message = Message::new("user1", "hi");
        let ev = ServerEvent::RoomMessage {
            room_name: "room1".to_string(),
            user_name: "user1".to_string(),
            message: message.clone(),
        };
        let args = ev.args();
        assert_eq!(args[0], json!("room1"));
        assert_eq!(args[1], json!("user1"));
        assert_eq!(args[2]["textMessage"], "hi");
    }

    #[test]
    fn test_disconnect_has_no_args() {
        assert!(ServerEvent::Disconnect.args().is_empty());
    }
}
