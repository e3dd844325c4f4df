//! 对局事件
//!
//! 权威端每完成一步棋产生一组有序事件，带递增序号广播给所有参与方，
//! 副本按原样应用。

use serde::{Deserialize, Serialize};

use crate::piece::{Cell, Color, PieceId};

/// 对局事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameEvent {
    /// 棋子被吃（总在对应的 `Moved` 之前）
    Captured { piece: PieceId, cell: Cell },
    /// 棋子移动
    Moved { piece: PieceId, from: Cell, to: Cell },
    /// 轮到哪一方
    TurnChanged { active: Color },
    /// 该方的王被将军
    Check { king_color: Color },
    /// 将死，对局结束
    Checkmate { winner: Color },
    /// 一方放弃（认输、离开或断线超时），对局结束
    Abandoned { by: Color },
}

impl GameEvent {
    /// 是否为终局事件
    pub fn is_terminal(&self) -> bool {
        matches!(self, GameEvent::Checkmate { .. } | GameEvent::Abandoned { .. })
    }

    /// 把事件分发到观察者对应的回调
    pub fn dispatch<O: GameObserver + ?Sized>(&self, observer: &mut O) {
        match *self {
            GameEvent::Captured { piece, cell } => observer.on_captured(piece, cell),
            GameEvent::Moved { piece, from, to } => observer.on_moved(piece, from, to),
            GameEvent::TurnChanged { active } => observer.on_turn_changed(active),
            GameEvent::Check { king_color } => observer.on_check(king_color),
            GameEvent::Checkmate { winner } => observer.on_checkmate(winner),
            GameEvent::Abandoned { by } => observer.on_abandoned(by),
        }
    }
}

/// 带序号的事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencedEvent {
    /// 从 1 开始，每局单调递增
    pub seq: u64,
    pub event: GameEvent,
}

/// 对局事件观察者（表现层实现）
///
/// 所有回调都有空的默认实现，只需要覆盖关心的事件。
pub trait GameObserver {
    fn on_captured(&mut self, _piece: PieceId, _cell: Cell) {}

    fn on_moved(&mut self, _piece: PieceId, _from: Cell, _to: Cell) {}

    fn on_turn_changed(&mut self, _active: Color) {}

    fn on_check(&mut self, _king_color: Color) {}

    fn on_checkmate(&mut self, _winner: Color) {}

    fn on_abandoned(&mut self, _by: Color) {}
}
