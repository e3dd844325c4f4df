//! 房间系统

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use protocol::{
    Color, GameSession, Phase, PlayerId, RoomId, RoomInfo, RoomState, TurnCoordinator,
};
use tracing::{info, warn};

/// 房间：两个座位和一局棋
pub struct Room {
    pub id: RoomId,
    pub state: RoomState,
    pub white_player: Option<PlayerId>,
    pub black_player: Option<PlayerId>,
    /// 游戏开始后才存在
    pub session: Option<GameSession>,
    /// 各方客户端确认已应用到的事件序号
    acked: [u64; 2],
    pub created_at: Instant,
}

impl Room {
    pub fn new(id: RoomId) -> Self {
        Self {
            id,
            state: RoomState::Waiting,
            white_player: None,
            black_player: None,
            session: None,
            acked: [0; 2],
            created_at: Instant::now(),
        }
    }

    /// 房间信息（用于列表展示）
    pub fn info(&self, white_name: Option<String>, black_name: Option<String>) -> RoomInfo {
        RoomInfo {
            id: self.id,
            white_player: white_name,
            black_player: black_name,
            state: self.state,
        }
    }

    pub fn is_full(&self) -> bool {
        self.white_player.is_some() && self.black_player.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.white_player.is_none() && self.black_player.is_none()
    }

    pub fn has_player(&self, player_id: PlayerId) -> bool {
        self.color_of(player_id).is_some()
    }

    /// 玩家执哪一方
    pub fn color_of(&self, player_id: PlayerId) -> Option<Color> {
        if self.white_player == Some(player_id) {
            Some(Color::White)
        } else if self.black_player == Some(player_id) {
            Some(Color::Black)
        } else {
            None
        }
    }

    /// 指定一方的玩家
    pub fn player_of(&self, color: Color) -> Option<PlayerId> {
        match color {
            Color::White => self.white_player,
            Color::Black => self.black_player,
        }
    }

    pub fn opponent_of(&self, player_id: PlayerId) -> Option<PlayerId> {
        self.color_of(player_id)
            .and_then(|color| self.player_of(color.opponent()))
    }

    /// 两个座位上的玩家
    pub fn players(&self) -> impl Iterator<Item = PlayerId> {
        self.white_player.into_iter().chain(self.black_player)
    }

    /// 入座，优先使用偏好的一方，否则先白后黑；房间已满时返回 None
    pub fn add_player(&mut self, player_id: PlayerId, preferred: Option<Color>) -> Option<Color> {
        let order = match preferred {
            Some(color) => [color, color.opponent()],
            None => [Color::White, Color::Black],
        };
        for color in order {
            let seat = match color {
                Color::White => &mut self.white_player,
                Color::Black => &mut self.black_player,
            };
            if seat.is_none() {
                *seat = Some(player_id);
                return Some(color);
            }
        }
        None
    }

    /// 离座，返回其原来执的一方
    pub fn remove_player(&mut self, player_id: PlayerId) -> Option<Color> {
        let color = self.color_of(player_id)?;
        match color {
            Color::White => self.white_player = None,
            Color::Black => self.black_player = None,
        }
        Some(color)
    }

    /// 开始新对局，`king_guard` 决定是否拒绝送王的走法
    pub fn start_game(&mut self, king_guard: bool) {
        let coordinator = TurnCoordinator::new().with_king_guard(king_guard);
        self.session = Some(GameSession::new(coordinator));
        self.acked = [0; 2];
        self.state = RoomState::Playing;
    }

    pub fn finish(&mut self) {
        self.state = RoomState::Finished;
    }

    /// 记录客户端确认；超出已发出序号的确认返回 false
    ///
    /// 中继没能送出的提交停在待确认状态，任何一方确认到该序号后放行。
    pub fn record_ack(&mut self, color: Color, seq: u64) -> bool {
        let Some(session) = self.session.as_mut() else {
            return seq == 0;
        };
        if seq > session.coordinator().seq() {
            return false;
        }
        let slot = &mut self.acked[color as usize];
        *slot = (*slot).max(seq);

        if let Phase::AwaitingAck { through } = session.coordinator().phase() {
            if *slot >= through {
                match session.acknowledge(through) {
                    Ok(()) => info!("房间 {} 的 {} 确认到 {}，放行下一步", self.id, color, through),
                    Err(err) => warn!("房间 {} 放行提交失败: {}", self.id, err),
                }
            }
        }
        true
    }

    /// 客户端确认到的序号
    pub fn acked(&self, color: Color) -> u64 {
        self.acked[color as usize]
    }
}

/// 房间管理器
pub struct RoomManager {
    rooms: HashMap<RoomId, Room>,
    next_id: AtomicU64,
}

impl RoomManager {
    pub fn new() -> Self {
        Self {
            rooms: HashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn create(&mut self) -> RoomId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.rooms.insert(id, Room::new(id));
        id
    }

    pub fn get(&self, room_id: RoomId) -> Option<&Room> {
        self.rooms.get(&room_id)
    }

    pub fn get_mut(&mut self, room_id: RoomId) -> Option<&mut Room> {
        self.rooms.get_mut(&room_id)
    }

    pub fn remove(&mut self, room_id: RoomId) -> Option<Room> {
        self.rooms.remove(&room_id)
    }

    /// 可加入的房间（等待中），按 ID 排序
    pub fn list_joinable(&self) -> Vec<&Room> {
        let mut rooms: Vec<&Room> = self
            .rooms
            .values()
            .filter(|r| r.state == RoomState::Waiting && !r.is_full())
            .collect();
        rooms.sort_by_key(|r| r.id);
        rooms
    }

    /// 查找玩家所在的房间
    pub fn find_player_room(&self, player_id: PlayerId) -> Option<RoomId> {
        self.rooms
            .values()
            .find(|r| r.has_player(player_id))
            .map(|r| r.id)
    }

    pub fn count(&self) -> usize {
        self.rooms.len()
    }
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::new()
    }
}
