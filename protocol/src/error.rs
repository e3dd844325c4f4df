//! 错误类型定义

use thiserror::Error;

use crate::piece::{Cell, PieceId};

/// 象棋规则错误
///
/// 除 `OccupancyViolation` 外都属于玩家可恢复的错误：请求被拒绝，
/// 棋盘不变，也不会广播给其他玩家。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChessError {
    /// 不是你的回合
    #[error("Not your turn")]
    NotYourTurn,

    /// 目标格不在该棋子当前的走法集合内
    #[error("Illegal move: piece {piece} cannot reach {target}")]
    IllegalMove { piece: PieceId, target: Cell },

    /// 棋盘占用关系被破坏（内部错误，当前对局必须中止）
    #[error("Occupancy violation at {cell}")]
    OccupancyViolation { cell: Cell },

    /// 对局结束后仍提交走法
    #[error("Stale request: game is already over")]
    StaleRequest,

    /// 上一步尚未被中继确认
    #[error("Previous move is still awaiting relay acknowledgment")]
    MoveInFlight,

    /// 确认序号与待确认的提交不一致
    #[error("Unexpected acknowledgment: expected seq {expected}, got {actual}")]
    AckMismatch { expected: u64, actual: u64 },

    /// 棋子不存在
    #[error("Unknown piece: {id}")]
    UnknownPiece { id: PieceId },

    /// 试图移动对方的棋子
    #[error("Piece {id} does not belong to the requesting player")]
    NotYourPiece { id: PieceId },

    /// 走法会导致己方王被攻击
    #[error("Move would leave king in check")]
    KingInCheck,

    /// 无效的格子
    #[error("Invalid cell: {text}")]
    InvalidCell { text: String },

    /// 无效的 FEN 字符串
    #[error("Invalid FEN string: {reason}")]
    InvalidFen { reason: String },
}

impl ChessError {
    /// 是否为致命错误（需要中止对局）
    pub fn is_fatal(&self) -> bool {
        matches!(self, ChessError::OccupancyViolation { .. })
    }
}

/// 协议错误类型
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 序列化错误（bincode）
    #[error("Bincode serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// 协议版本不匹配
    #[error("Protocol version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u8, actual: u8 },

    /// 帧大小超限
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// 连接超时
    #[error("Connection timeout")]
    ConnectionTimeout,

    /// 连接已关闭
    #[error("Connection closed")]
    ConnectionClosed,

    /// 昵称为空
    #[error("Nickname is empty")]
    NicknameEmpty,

    /// 昵称过长
    #[error("Nickname too long: {len} chars (max: {max})")]
    NicknameTooLong { len: usize, max: usize },

    /// 昵称已被占用
    #[error("Nickname is already occupied")]
    NicknameOccupied,

    /// 事件序号不连续
    #[error("Sequence gap: expected event {expected}, got {actual}")]
    SequenceGap { expected: u64, actual: u64 },

    /// 同步通道已关闭
    #[error("Synchronization channel closed")]
    ChannelClosed,

    /// 没有任何参与方收到到 `seq` 为止的事件，提交仍等待确认
    #[error("Events through seq {seq} were not delivered to any peer")]
    Undelivered { seq: u64 },

    /// 象棋规则错误
    #[error("Chess error: {0}")]
    Chess(#[from] ChessError),
}

/// 协议操作结果类型
pub type Result<T> = std::result::Result<T, ProtocolError>;
