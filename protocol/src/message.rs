//! 消息类型定义

use serde::{Deserialize, Serialize};

use crate::coordinator::GameSnapshot;
use crate::error::ChessError;
use crate::event::SequencedEvent;
use crate::piece::{Cell, Color, PieceId};

/// 玩家 ID
pub type PlayerId = u64;

/// 房间 ID
pub type RoomId = u64;

/// 房间信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomInfo {
    pub id: RoomId,
    pub white_player: Option<String>,
    pub black_player: Option<String>,
    pub state: RoomState,
}

/// 房间状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomState {
    /// 等待玩家加入
    Waiting,
    /// 游戏进行中
    Playing,
    /// 游戏结束
    Finished,
}

/// 客户端发送给服务端的消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientMessage {
    // === 身份认证 ===
    /// 登录
    Login { nickname: String },
    /// 重连
    Reconnect { player_id: PlayerId, room_id: RoomId },

    // === 房间操作 ===
    /// 创建房间
    CreateRoom { preferred_color: Option<Color> },
    /// 加入房间
    JoinRoom { room_id: RoomId },
    /// 离开房间
    LeaveRoom,
    /// 获取房间列表
    ListRooms,

    // === 游戏操作 ===
    /// 走棋
    MakeMove { piece: PieceId, target: Cell },
    /// 确认已应用到 `seq` 为止的事件
    Ack { seq: u64 },
    /// 请求完整快照（序号断档后）
    RequestSnapshot,
    /// 认输
    Resign,

    // === 心跳 ===
    /// 心跳请求
    Ping,
}

/// 服务端发送给客户端的消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerMessage {
    // === 身份认证 ===
    /// 登录成功
    LoginSuccess { player_id: PlayerId },
    /// 重连成功
    ReconnectSuccess {
        room_id: RoomId,
        your_color: Color,
        snapshot: GameSnapshot,
    },

    // === 房间事件 ===
    /// 房间创建成功
    RoomCreated { room_id: RoomId, your_color: Color },
    /// 加入房间成功
    RoomJoined { room_id: RoomId, your_color: Color },
    /// 房间列表
    RoomList { rooms: Vec<RoomInfo> },
    /// 对手加入
    OpponentJoined { nickname: String },

    // === 游戏事件 ===
    /// 游戏开始
    GameStarted {
        snapshot: GameSnapshot,
        your_color: Color,
        white_player: String,
        black_player: String,
    },
    /// 权威事件
    Event(SequencedEvent),
    /// 完整快照
    Snapshot(GameSnapshot),

    // === 断线重连 ===
    /// 对手断线
    OpponentDisconnected { timeout_secs: u32 },
    /// 对手重连
    OpponentReconnected,

    // === 心跳 ===
    /// 心跳响应
    Pong,

    // === 错误 ===
    /// 错误消息（只发给请求方）
    Error { code: ErrorCode, message: String },
}

impl ServerMessage {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code,
            message: message.into(),
        }
    }

    /// 由规则错误构造错误消息
    pub fn rejection(err: &ChessError) -> Self {
        ServerMessage::Error {
            code: ErrorCode::from(err),
            message: err.to_string(),
        }
    }
}

/// 错误码定义
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum ErrorCode {
    // === 房间相关 (1xx) ===
    /// 房间不存在
    RoomNotFound = 100,
    /// 房间已满
    RoomFull = 101,
    /// 房间已关闭
    RoomClosed = 102,
    /// 不在房间中
    NotInRoom = 103,
    /// 已在房间中
    AlreadyInRoom = 104,

    // === 游戏相关 (2xx) ===
    /// 不是你的回合
    NotYourTurn = 200,
    /// 无效走法
    InvalidMove = 201,
    /// 游戏未开始
    GameNotStarted = 202,
    /// 游戏已结束
    GameAlreadyOver = 203,
    /// 上一步尚未确认
    MoveInFlight = 204,

    // === 玩家相关 (3xx) ===
    /// 无效昵称
    InvalidNickname = 300,
    /// 玩家不存在
    PlayerNotFound = 301,
    /// 昵称已被占用
    NicknameOccupied = 302,
    /// 尚未登录
    NotLoggedIn = 303,
    /// 当前连接已登录
    AlreadyLoggedIn = 304,

    // === 系统相关 (5xx) ===
    /// 内部错误
    InternalError = 500,
    /// 超时
    Timeout = 501,
    /// 连接数已满
    ServerFull = 502,
}

impl From<&ChessError> for ErrorCode {
    fn from(err: &ChessError) -> Self {
        match err {
            ChessError::NotYourTurn => ErrorCode::NotYourTurn,
            ChessError::StaleRequest => ErrorCode::GameAlreadyOver,
            ChessError::MoveInFlight | ChessError::AckMismatch { .. } => ErrorCode::MoveInFlight,
            ChessError::OccupancyViolation { .. } => ErrorCode::InternalError,
            ChessError::IllegalMove { .. }
            | ChessError::UnknownPiece { .. }
            | ChessError::NotYourPiece { .. }
            | ChessError::KingInCheck
            | ChessError::InvalidCell { .. }
            | ChessError::InvalidFen { .. } => ErrorCode::InvalidMove,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::GameEvent;

    #[test]
    fn test_message_serialize() {
        let msg = ClientMessage::MakeMove {
            piece: PieceId(12),
            target: "e4".parse().unwrap(),
        };
        let bytes = bincode::serialize(&msg).unwrap();
        let decoded: ClientMessage = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_event_message_serialize() {
        let msg = ServerMessage::Event(SequencedEvent {
            seq: 7,
            event: GameEvent::Check {
                king_color: Color::Black,
            },
        });
        let bytes = bincode::serialize(&msg).unwrap();
        let decoded: ServerMessage = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_snapshot_fits_in_frame() {
        let msg = ServerMessage::Snapshot(GameSnapshot::default());
        let bytes = bincode::serialize(&msg).unwrap();
        assert!(bytes.len() < crate::MAX_FRAME_SIZE);
    }

    #[test]
    fn test_rejection_code() {
        let msg = ServerMessage::rejection(&ChessError::NotYourTurn);
        match msg {
            ServerMessage::Error { code, message } => {
                assert_eq!(code, ErrorCode::NotYourTurn);
                assert_eq!(message, "Not your turn");
            }
            _ => panic!("Wrong message type"),
        }
        assert_eq!(ErrorCode::from(&ChessError::KingInCheck), ErrorCode::InvalidMove);
    }
}
