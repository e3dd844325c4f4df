//! 非权威副本
//!
//! 客户端不重新校验走法，只按序号原样应用权威端广播的事件。
//! 序号不连续时拒绝事件，调用方应请求快照重新同步。

use tracing::debug;

use crate::board::Board;
use crate::coordinator::{GameResult, GameSnapshot, TurnState, WinReason};
use crate::error::{ChessError, ProtocolError, Result};
use crate::event::{GameEvent, SequencedEvent};
use crate::moves::{MoveGenerator, MoveSet};
use crate::piece::{Color, PieceId};

/// 对局副本
#[derive(Debug, Clone)]
pub struct Replica {
    board: Board,
    turn: TurnState,
    result: Option<GameResult>,
    last_seq: u64,
}

impl Replica {
    pub fn new() -> Self {
        Self::from_snapshot(GameSnapshot::default())
    }

    pub fn from_snapshot(snapshot: GameSnapshot) -> Self {
        Self {
            board: snapshot.board,
            turn: snapshot.turn,
            result: snapshot.result,
            last_seq: snapshot.seq,
        }
    }

    /// 应用一个权威事件
    pub fn receive(&mut self, event: &SequencedEvent) -> Result<()> {
        let expected = self.last_seq + 1;
        if event.seq != expected {
            return Err(ProtocolError::SequenceGap {
                expected,
                actual: event.seq,
            });
        }

        match event.event {
            GameEvent::Captured { piece, .. } => {
                self.board.remove(piece)?;
            }
            GameEvent::Moved { piece, to, .. } => {
                self.board.move_piece(piece, to)?;
            }
            GameEvent::TurnChanged { active } => {
                self.turn = TurnState::new(active);
            }
            GameEvent::Check { king_color } => {
                self.turn.is_check = true;
                self.turn.checked_king_color = Some(king_color);
            }
            GameEvent::Checkmate { winner } => {
                self.turn.is_checkmate = true;
                self.result = Some(GameResult::win(winner, WinReason::Checkmate));
            }
            GameEvent::Abandoned { by } => {
                self.result = Some(GameResult::win(by.opponent(), WinReason::Abandoned));
            }
        }

        debug!("副本已应用事件 {}", event.seq);
        self.last_seq = event.seq;
        Ok(())
    }

    /// 用于显示和本地预检的走法集合
    ///
    /// 与协调器的默认规则一致；服务器开启送王检查时，多出的拒绝由服务器返回。
    pub fn move_set(&self, piece: PieceId) -> std::result::Result<MoveSet, ChessError> {
        MoveGenerator::generate(&self.board, piece)
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn turn(&self) -> &TurnState {
        &self.turn
    }

    pub fn result(&self) -> Option<GameResult> {
        self.result
    }

    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    pub fn is_turn_of(&self, color: Color) -> bool {
        self.result.is_none() && self.turn.active_color == color
    }

    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            board: self.board.clone(),
            turn: self.turn,
            result: self.result,
            seq: self.last_seq,
        }
    }
}

impl Default for Replica {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::{MoveRequest, TurnCoordinator};
    use crate::piece::Cell;

    fn cell(s: &str) -> Cell {
        s.parse().unwrap()
    }

    fn play(coordinator: &mut TurnCoordinator, requester: Color, from: &str, to: &str) -> Vec<SequencedEvent> {
        let piece = coordinator.board().occupant_at(cell(from)).unwrap().id;
        let events = coordinator
            .request_move(MoveRequest {
                requester,
                piece,
                target: cell(to),
            })
            .unwrap();
        coordinator.acknowledge(coordinator.seq()).unwrap();
        events
    }

    #[test]
    fn test_replica_tracks_coordinator() {
        let mut coordinator = TurnCoordinator::new();
        let mut replica = Replica::new();

        let moves = [
            (Color::White, "e2", "e4"),
            (Color::Black, "d7", "d5"),
            (Color::White, "e4", "d5"),
            (Color::Black, "d8", "d5"),
        ];
        for (color, from, to) in moves {
            for event in play(&mut coordinator, color, from, to) {
                replica.receive(&event).unwrap();
            }
        }

        assert_eq!(replica.snapshot(), coordinator.snapshot());
        assert!(replica.is_turn_of(Color::White));
    }

    #[test]
    fn test_sequence_gap_rejected() {
        let mut coordinator = TurnCoordinator::new();
        let mut replica = Replica::new();
        let events = play(&mut coordinator, Color::White, "e2", "e4");

        let err = replica.receive(&events[1]).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::SequenceGap {
                expected: 1,
                actual: 2
            }
        ));
        assert_eq!(replica.last_seq(), 0);

        // 重复的事件同样被拒绝
        replica.receive(&events[0]).unwrap();
        assert!(replica.receive(&events[0]).is_err());
    }

    #[test]
    fn test_resync_from_snapshot() {
        let mut coordinator = TurnCoordinator::new();
        play(&mut coordinator, Color::White, "g1", "f3");
        let events = play(&mut coordinator, Color::Black, "g8", "f6");

        let mut replica = Replica::from_snapshot(coordinator.snapshot());
        assert_eq!(replica.last_seq(), events.last().unwrap().seq);

        for event in play(&mut coordinator, Color::White, "b1", "c3") {
            replica.receive(&event).unwrap();
        }
        assert_eq!(replica.board(), coordinator.board());
    }

    #[test]
    fn test_abandon_sets_result() {
        let mut coordinator = TurnCoordinator::new();
        let mut replica = Replica::new();

        for event in coordinator.abandon(Color::White).unwrap() {
            replica.receive(&event).unwrap();
        }
        assert_eq!(
            replica.result(),
            Some(GameResult::BlackWin(WinReason::Abandoned))
        );
        assert!(!replica.is_turn_of(Color::Black));
    }

    #[test]
    fn test_move_set_for_display() {
        let replica = Replica::new();
        let pawn = replica.board().occupant_at(cell("a2")).unwrap().id;

        let set = replica.move_set(pawn).unwrap();
        assert_eq!(set.reachable.len(), 2);
    }
}
