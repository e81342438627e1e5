//! 客户端命令词汇表
//!
//! 每条命令按名称寻址，携带位置参数。参数在进入钩子流水线之前
//! 完成校验：个数错误返回 `wrongArgumentsCount`，类型错误返回
//! `badArgument`。

use domain::{ChatError, ChatResult};
use serde_json::Value;

/// 全部命令名，传输层据此绑定命令
pub const COMMAND_NAMES: [&str; 19] = [
    "directAddToList",
    "directRemoveFromList",
    "directGetAccessList",
    "directGetWhitelistMode",
    "directSetWhitelistMode",
    "directMessage",
    "roomCreate",
    "roomDelete",
    "roomJoin",
    "roomLeave",
    "roomMessage",
    "roomAddToList",
    "roomRemoveFromList",
    "roomGetAccessList",
    "roomGetWhitelistMode",
    "roomSetWhitelistMode",
    "roomHistory",
    "listRooms",
    "disconnect",
];

/// 解析后的客户端命令
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    DirectAddToList {
        list_name: String,
        user_names: Vec<String>,
    },
    DirectRemoveFromList {
        list_name: String,
        user_names: Vec<String>,
    },
    DirectGetAccessList {
        list_name: String,
    },
    DirectGetWhitelistMode,
    DirectSetWhitelistMode {
        mode: bool,
    },
    DirectMessage {
        to_user: String,
        text_message: String,
    },
    RoomCreate {
        room_name: String,
        whitelist_only: bool,
    },
    RoomDelete {
        room_name: String,
    },
    RoomJoin {
        room_name: String,
    },
    RoomLeave {
        room_name: String,
    },
    RoomMessage {
        room_name: String,
        text_message: String,
    },
    RoomAddToList {
        room_name: String,
        list_name: String,
        user_names: Vec<String>,
    },
    RoomRemoveFromList {
        room_name: String,
        list_name: String,
        user_names: Vec<String>,
    },
    RoomGetAccessList {
        room_name: String,
        list_name: String,
    },
    RoomGetWhitelistMode {
        room_name: String,
    },
    RoomSetWhitelistMode {
        room_name: String,
        mode: bool,
    },
    RoomHistory {
        room_name: String,
    },
    ListRooms,
    Disconnect {
        reason: String,
    },
}

impl Command {
    /// 命令名
    pub fn name(&self) -> &'static str {
        match self {
            Command::DirectAddToList { .. } => "directAddToList",
            Command::DirectRemoveFromList { .. } => "directRemoveFromList",
            Command::DirectGetAccessList { .. } => "directGetAccessList",
            Command::DirectGetWhitelistMode => "directGetWhitelistMode",
            Command::DirectSetWhitelistMode { .. } => "directSetWhitelistMode",
            Command::DirectMessage { .. } => "directMessage",
            Command::RoomCreate { .. } => "roomCreate",
            Command::RoomDelete { .. } => "roomDelete",
            Command::RoomJoin { .. } => "roomJoin",
            Command::RoomLeave { .. } => "roomLeave",
            Command::RoomMessage { .. } => "roomMessage",
            Command::RoomAddToList { .. } => "roomAddToList",
            Command::RoomRemoveFromList { .. } => "roomRemoveFromList",
            Command::RoomGetAccessList { .. } => "roomGetAccessList",
            Command::RoomGetWhitelistMode { .. } => "roomGetWhitelistMode",
            Command::RoomSetWhitelistMode { .. } => "roomSetWhitelistMode",
            Command::RoomHistory { .. } => "roomHistory",
            Command::ListRooms => "listRooms",
            Command::Disconnect { .. } => "disconnect",
        }
    }

    /// 从命令名与位置参数解析
    pub fn parse(name: &str, args: &[Value]) -> ChatResult<Command> {
        match name {
            "directAddToList" => {
                expect_arity(args, 2)?;
                Ok(Command::DirectAddToList {
                    list_name: string_arg(&args[0], "listName")?,
                    user_names: string_array_arg(&args[1], "usernames")?,
                })
            }
            "directRemoveFromList" => {
                expect_arity(args, 2)?;
                Ok(Command::DirectRemoveFromList {
                    list_name: string_arg(&args[0], "listName")?,
                    user_names: string_array_arg(&args[1], "usernames")?,
                })
            }
            "directGetAccessList" => {
                expect_arity(args, 1)?;
                Ok(Command::DirectGetAccessList {
                    list_name: string_arg(&args[0], "listName")?,
                })
            }
            "directGetWhitelistMode" => {
                expect_arity(args, 0)?;
                Ok(Command::DirectGetWhitelistMode)
            }
            "directSetWhitelistMode" => {
                expect_arity(args, 1)?;
                Ok(Command::DirectSetWhitelistMode {
                    mode: bool_arg(&args[0], "mode")?,
                })
            }
            "directMessage" => {
                expect_arity(args, 2)?;
                Ok(Command::DirectMessage {
                    to_user: string_arg(&args[0], "toUser")?,
                    text_message: message_arg(&args[1])?,
                })
            }
            "roomCreate" => {
                expect_arity(args, 2)?;
                Ok(Command::RoomCreate {
                    room_name: string_arg(&args[0], "roomName")?,
                    whitelist_only: bool_arg(&args[1], "whitelistOnly")?,
                })
            }
            "roomDelete" => {
                expect_arity(args, 1)?;
                Ok(Command::RoomDelete {
                    room_name: string_arg(&args[0], "roomName")?,
                })
            }
            "roomJoin" => {
                expect_arity(args, 1)?;
                Ok(Command::RoomJoin {
                    room_name: string_arg(&args[0], "roomName")?,
                })
            }
            "roomLeave" => {
                expect_arity(args, 1)?;
                Ok(Command::RoomLeave {
                    room_name: string_arg(&args[0], "roomName")?,
                })
            }
            "roomMessage" => {
                expect_arity(args, 2)?;
                Ok(Command::RoomMessage {
                    room_name: string_arg(&args[0], "roomName")?,
                    text_message: message_arg(&args[1])?,
                })
            }
            "roomAddToList" => {
                expect_arity(args, 3)?;
                Ok(Command::RoomAddToList {
                    room_name: string_arg(&args[0], "roomName")?,
                    list_name: string_arg(&args[1], "listName")?,
                    user_names: string_array_arg(&args[2], "usernames")?,
                })
            }
            "roomRemoveFromList" => {
                expect_arity(args, 3)?;
                Ok(Command::RoomRemoveFromList {
                    room_name: string_arg(&args[0], "roomName")?,
                    list_name: string_arg(&args[1], "listName")?,
                    user_names: string_array_arg(&args[2], "usernames")?,
                })
            }
            "roomGetAccessList" => {
                expect_arity(args, 2)?;
                Ok(Command::RoomGetAccessList {
                    room_name: string_arg(&args[0], "roomName")?,
                    list_name: string_arg(&args[1], "listName")?,
                })
            }
            "roomGetWhitelistMode" => {
                expect_arity(args, 1)?;
                Ok(Command::RoomGetWhitelistMode {
                    room_name: string_arg(&args[0], "roomName")?,
                })
            }
            "roomSetWhitelistMode" => {
                expect_arity(args, 2)?;
                Ok(Command::RoomSetWhitelistMode {
                    room_name: string_arg(&args[0], "roomName")?,
                    mode: bool_arg(&args[1], "mode")?,
                })
            }
            "roomHistory" => {
                expect_arity(args, 1)?;
                Ok(Command::RoomHistory {
                    room_name: string_arg(&args[0], "roomName")?,
                })
            }
            "listRooms" => {
                expect_arity(args, 0)?;
                Ok(Command::ListRooms)
            }
            "disconnect" => {
                expect_arity(args, 1)?;
                Ok(Command::Disconnect {
                    reason: string_arg(&args[0], "reason")?,
                })
            }
            other => Err(ChatError::bad_argument("command", other)),
        }
    }
}

fn expect_arity(args: &[Value], expected: usize) -> ChatResult<()> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(ChatError::wrong_arguments_count(expected, args.len()))
    }
}

fn string_arg(value: &Value, argument: &str) -> ChatResult<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ChatError::bad_argument(argument, value.to_string()))
}

fn bool_arg(value: &Value, argument: &str) -> ChatResult<bool> {
    value
        .as_bool()
        .ok_or_else(|| ChatError::bad_argument(argument, value.to_string()))
}

fn string_array_arg(value: &Value, argument: &str) -> ChatResult<Vec<String>> {
    let items = value
        .as_array()
        .ok_or_else(|| ChatError::bad_argument(argument, value.to_string()))?;
    items
        .iter()
        .map(|v| string_arg(v, argument))
        .collect::<ChatResult<Vec<String>>>()
}

/// 消息参数必须是恰好只含 `textMessage` 字符串字段的对象
fn message_arg(value: &Value) -> ChatResult<String> {
    let obj = value
        .as_object()
        .ok_or_else(|| ChatError::bad_argument("msg", value.to_string()))?;
    if obj.len() != 1 {
        return Err(ChatError::bad_argument("msg", value.to_string()));
    }
    obj.get("textMessage")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ChatError::bad_argument("msg", value.to_string()))
}
