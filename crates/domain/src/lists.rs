//! 访问控制列表标识
//!
//! 房间与私聊各有一组固定的列表名，命令中以字符串寻址。

/// 房间访问控制列表
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomList {
    Userlist,
    Blacklist,
    Adminlist,
    Whitelist,
}

impl RoomList {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomList::Userlist => "userlist",
            RoomList::Blacklist => "blacklist",
            RoomList::Adminlist => "adminlist",
            RoomList::Whitelist => "whitelist",
        }
    }

    /// 从命令参数解析列表名，未知名称返回 `None`
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "userlist" => Some(RoomList::Userlist),
            "blacklist" => Some(RoomList::Blacklist),
            "adminlist" => Some(RoomList::Adminlist),
            "whitelist" => Some(RoomList::Whitelist),
            _ => None,
        }
    }
}

/// 私聊访问控制列表
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectList {
    Blacklist,
    Whitelist,
}

impl DirectList {
    pub fn as_str(&self) -> &'static str {
        match self {
            DirectList::Blacklist => "blacklist",
            DirectList::Whitelist => "whitelist",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "blacklist" => Some(DirectList::Blacklist),
            "whitelist" => Some(DirectList::Whitelist),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_list_round_trip() {
        for list in [
            RoomList::Userlist,
            RoomList::Blacklist,
            RoomList::Adminlist,
            RoomList::Whitelist,
        ] {
            assert_eq!(RoomList::parse(list.as_str()), Some(list));
        }
        assert_eq!(RoomList::parse("banlist"), None);
    }

    #[test]
    fn test_direct_list_round_trip() {
        assert_eq!(DirectList::parse("blacklist"), Some(DirectList::Blacklist));
        assert_eq!(DirectList::parse("whitelist"), Some(DirectList::Whitelist));
        // 私聊没有 userlist
        assert_eq!(DirectList::parse("userlist"), None);
    }
}
