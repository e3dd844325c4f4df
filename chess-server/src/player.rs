//! 玩家管理

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use protocol::{PlayerId, ProtocolError, RoomId, MAX_NICKNAME_LEN};

/// 玩家状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerStatus {
    /// 在线，在大厅
    Online,
    /// 在线，在房间中
    InRoom(RoomId),
    /// 断线中（保留座位）
    Disconnected(RoomId),
}

/// 玩家信息
#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub nickname: String,
    pub status: PlayerStatus,
}

/// 玩家管理器
pub struct PlayerManager {
    players: HashMap<PlayerId, Player>,
    /// 昵称 -> 玩家 ID（昵称唯一）
    nicknames: HashMap<String, PlayerId>,
    next_id: AtomicU64,
}

impl PlayerManager {
    pub fn new() -> Self {
        Self {
            players: HashMap::new(),
            nicknames: HashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// 验证昵称（去掉首尾空白后非空，且不超过最大长度）
    pub fn validate_nickname(nickname: &str) -> Result<(), ProtocolError> {
        let len = nickname.trim().chars().count();
        if len == 0 {
            return Err(ProtocolError::NicknameEmpty);
        }
        if len > MAX_NICKNAME_LEN {
            return Err(ProtocolError::NicknameTooLong {
                len,
                max: MAX_NICKNAME_LEN,
            });
        }
        Ok(())
    }

    /// 登录，返回新分配的玩家 ID
    pub fn login(&mut self, nickname: &str) -> Result<PlayerId, ProtocolError> {
        Self::validate_nickname(nickname)?;
        let nickname = nickname.trim().to_string();
        if self.nicknames.contains_key(&nickname) {
            return Err(ProtocolError::NicknameOccupied);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.nicknames.insert(nickname.clone(), id);
        self.players.insert(
            id,
            Player {
                id,
                nickname,
                status: PlayerStatus::Online,
            },
        );
        Ok(id)
    }

    /// 标记断线，只有在房间中的玩家会保留座位，返回房间 ID
    pub fn disconnect(&mut self, player_id: PlayerId) -> Option<RoomId> {
        let player = self.players.get_mut(&player_id)?;
        match player.status {
            PlayerStatus::InRoom(room_id) => {
                player.status = PlayerStatus::Disconnected(room_id);
                Some(room_id)
            }
            _ => None,
        }
    }

    /// 断线玩家重新连接，返回其房间 ID
    pub fn reconnect(&mut self, player_id: PlayerId) -> Option<RoomId> {
        let player = self.players.get_mut(&player_id)?;
        match player.status {
            PlayerStatus::Disconnected(room_id) => {
                player.status = PlayerStatus::InRoom(room_id);
                Some(room_id)
            }
            _ => None,
        }
    }

    /// 彻底移除玩家，释放昵称
    pub fn remove(&mut self, player_id: PlayerId) -> Option<Player> {
        let player = self.players.remove(&player_id)?;
        self.nicknames.remove(&player.nickname);
        Some(player)
    }

    pub fn get(&self, player_id: PlayerId) -> Option<&Player> {
        self.players.get(&player_id)
    }

    pub fn set_status(&mut self, player_id: PlayerId, status: PlayerStatus) {
        if let Some(player) = self.players.get_mut(&player_id) {
            player.status = status;
        }
    }

    pub fn nickname(&self, player_id: PlayerId) -> Option<&str> {
        self.players.get(&player_id).map(|p| p.nickname.as_str())
    }

    pub fn status(&self, player_id: PlayerId) -> Option<PlayerStatus> {
        self.players.get(&player_id).map(|p| p.status)
    }

    pub fn count(&self) -> usize {
        self.players.len()
    }
}

impl Default for PlayerManager {
    fn default() -> Self {
        Self::new()
    }
}
