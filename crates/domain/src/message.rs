//! 消息实体定义
//!
//! 消息在创建时由服务端盖上毫秒时间戳，之后不可变。

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// 聊天消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// 消息正文
    pub text_message: String,
    /// 服务端分配的时间戳（毫秒）
    pub timestamp: i64,
    /// 发送者用户名
    pub author: String,
}

impl Message {
    /// 创建新消息，时间戳取当前服务器时间
    pub fn new(author: impl Into<String>, text_message: impl Into<String>) -> Self {
        Self {
            text_message: text_message.into(),
            timestamp: Utc::now().timestamp_millis(),
            author: author.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let before = Utc::now().timestamp_millis();
        let message = Message::new("user1", "hello");
        let after = Utc::now().timestamp_millis();

        assert_eq!(message.author, "user1");
        assert_eq!(message.text_message, "hello");
        assert!(message.timestamp >= before && message.timestamp <= after);
    }

    #[test]
    fn test_message_wire_format() {
        let message = Message::new("user1", "hello");
        let json = serde_json::to_value(&message).unwrap();

        // 线上格式使用 camelCase 字段名
        assert_eq!(json["textMessage"], "hello");
        assert_eq!(json["author"], "user1");
        assert!(json["timestamp"].is_i64());
    }

    #[test]
    fn test_message_round_trip() {
        let message = Message::new("user1", "hello");
        let json = serde_json::to_string(&message).unwrap();
        let parsed: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(message, parsed);
    }
}
