//! 国际象棋共享协议库
//!
//! 包含:
//! - 棋子、格子、棋盘等核心数据结构
//! - 走法生成、威胁检测和将死判定
//! - 回合协调器（权威状态机）、对局事件和观察者
//! - 同步通道、对局会话和非权威副本
//! - 消息类型定义 (ClientMessage, ServerMessage)
//! - 传输层抽象 (Connector, Connection, Listener traits) 和帧编解码
//! - FEN 局面格式

mod board;
mod checkmate;
mod constants;
mod coordinator;
mod error;
mod event;
mod fen;
mod message;
mod moves;
mod piece;
mod replica;
mod sync;
mod threat;
mod transport;

pub use board::Board;
pub use checkmate::{CheckStatus, CheckmateResolver};
pub use constants::*;
pub use coordinator::{
    GameResult, GameSnapshot, MoveRequest, Phase, TurnCoordinator, TurnState, WinReason,
};
pub use error::{ChessError, ProtocolError, Result};
pub use event::{GameEvent, GameObserver, SequencedEvent};
pub use fen::{Fen, INITIAL_FEN};
pub use message::{ClientMessage, ErrorCode, PlayerId, RoomId, RoomInfo, RoomState, ServerMessage};
pub use moves::{MoveGenerator, MoveSet};
pub use piece::{Cell, Color, Piece, PieceId, PieceType};
pub use replica::Replica;
pub use sync::{GameSession, Processed, SyncChannel, Ticket};
pub use threat::ThreatDetector;
pub use transport::{
    Connection, Connector, FrameReader, FrameWriter, Listener, NetworkConfig, TcpConnection,
    TcpConnector, TcpListener,
};
