//! 回合协调器
//!
//! 权威端的状态机，一次只处理一步棋：
//!
//! ```text
//! WaitingForMove(c) -> Validating -> Applying -> CheckEvaluation -> AwaitingAck -> WaitingForMove(!c)
//!                                                                       \-> GameOver(result)
//! ```
//!
//! 一步棋的全部事件产生完毕并且中继确认之前，不会接受下一个请求。
//! 被拒绝的请求不修改任何状态，也不产生事件。

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::board::Board;
use crate::checkmate::CheckmateResolver;
use crate::error::ChessError;
use crate::event::{GameEvent, SequencedEvent};
use crate::moves::{MoveGenerator, MoveSet};
use crate::piece::{Cell, Color, PieceId};
use crate::threat::ThreatDetector;

/// 回合状态，只由协调器修改
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnState {
    pub active_color: Color,
    pub is_check: bool,
    pub checked_king_color: Option<Color>,
    pub is_checkmate: bool,
}

impl TurnState {
    pub fn new(active_color: Color) -> Self {
        Self {
            active_color,
            is_check: false,
            checked_king_color: None,
            is_checkmate: false,
        }
    }
}

impl Default for TurnState {
    fn default() -> Self {
        Self::new(Color::White)
    }
}

/// 胜利原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WinReason {
    /// 将死
    Checkmate,
    /// 对方认输、离开或断线超时
    Abandoned,
}

/// 对局结果，只设置一次
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameResult {
    /// 白方胜
    WhiteWin(WinReason),
    /// 黑方胜
    BlackWin(WinReason),
    /// 棋盘状态损坏，对局中止
    Aborted,
}

impl GameResult {
    pub fn win(winner: Color, reason: WinReason) -> Self {
        match winner {
            Color::White => GameResult::WhiteWin(reason),
            Color::Black => GameResult::BlackWin(reason),
        }
    }

    pub fn winner(&self) -> Option<Color> {
        match self {
            GameResult::WhiteWin(_) => Some(Color::White),
            GameResult::BlackWin(_) => Some(Color::Black),
            GameResult::Aborted => None,
        }
    }
}

/// 协调器阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    WaitingForMove(Color),
    Validating,
    Applying,
    CheckEvaluation,
    /// 事件已产生，等待中继确认到 `through` 为止的序号
    AwaitingAck { through: u64 },
    GameOver(GameResult),
}

/// 走棋请求
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRequest {
    pub requester: Color,
    pub piece: PieceId,
    pub target: Cell,
}

/// 完整对局状态，足以重建协调器或副本
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub board: Board,
    pub turn: TurnState,
    pub result: Option<GameResult>,
    /// 最后一个已发出事件的序号
    pub seq: u64,
}

impl Default for GameSnapshot {
    fn default() -> Self {
        Self {
            board: Board::initial(),
            turn: TurnState::default(),
            result: None,
            seq: 0,
        }
    }
}

/// 回合协调器
#[derive(Debug, Clone)]
pub struct TurnCoordinator {
    board: Board,
    turn: TurnState,
    phase: Phase,
    result: Option<GameResult>,
    seq: u64,
    /// 拒绝让己方王留在被攻击位置的走法
    king_guard: bool,
}

impl TurnCoordinator {
    /// 标准初始局面，白方先走
    pub fn new() -> Self {
        Self::with_board(Board::initial(), Color::White)
    }

    /// 从任意局面开始
    pub fn with_board(board: Board, active: Color) -> Self {
        Self::from_snapshot(GameSnapshot {
            board,
            turn: TurnState::new(active),
            result: None,
            seq: 0,
        })
    }

    /// 从快照恢复
    pub fn from_snapshot(snapshot: GameSnapshot) -> Self {
        let phase = match snapshot.result {
            Some(result) => Phase::GameOver(result),
            None => Phase::WaitingForMove(snapshot.turn.active_color),
        };
        Self {
            board: snapshot.board,
            turn: snapshot.turn,
            phase,
            result: snapshot.result,
            seq: snapshot.seq,
            king_guard: false,
        }
    }

    /// 开启送王检查：走完后己方王仍被攻击的请求以 `KingInCheck` 拒绝
    ///
    /// 默认关闭，只校验目标格是否在走法集合内。
    pub fn with_king_guard(mut self, enabled: bool) -> Self {
        self.king_guard = enabled;
        self
    }

    pub fn king_guard(&self) -> bool {
        self.king_guard
    }

    /// 处理走棋请求，成功时返回本步的有序事件
    ///
    /// 返回后协调器处于 `AwaitingAck`，必须调用 [`acknowledge`](Self::acknowledge)
    /// 才会接受下一步。
    pub fn request_move(&mut self, request: MoveRequest) -> Result<Vec<SequencedEvent>, ChessError> {
        match self.phase {
            Phase::GameOver(_) => return Err(ChessError::StaleRequest),
            Phase::AwaitingAck { .. } if self.result.is_some() => {
                return Err(ChessError::StaleRequest)
            }
            Phase::WaitingForMove(active) if active == request.requester => {}
            Phase::WaitingForMove(_) => return Err(ChessError::NotYourTurn),
            _ => return Err(ChessError::MoveInFlight),
        }

        self.transition(Phase::Validating);
        if let Err(err) = self.validate(&request) {
            if err.is_fatal() {
                self.abort(&err);
            } else {
                warn!(
                    "拒绝走法 {} -> {}（{}）: {}",
                    request.piece, request.target, request.requester, err
                );
                self.transition(Phase::WaitingForMove(self.turn.active_color));
            }
            return Err(err);
        }

        self.transition(Phase::Applying);
        let applied = match self.apply(&request) {
            Ok(applied) => applied,
            Err(err) => {
                self.abort(&err);
                return Err(err);
            }
        };

        self.transition(Phase::CheckEvaluation);
        let defender = request.requester.opponent();
        let status = match CheckmateResolver::evaluate(&self.board, defender) {
            Ok(status) => status,
            Err(err) => {
                self.abort(&err);
                return Err(err);
            }
        };
        self.turn = TurnState {
            active_color: defender,
            is_check: status.in_check,
            checked_king_color: status.in_check.then_some(defender),
            is_checkmate: status.is_checkmate(),
        };

        let mut events = Vec::with_capacity(5);
        if let Some((piece, cell)) = applied.captured {
            events.push(GameEvent::Captured { piece, cell });
        }
        events.push(GameEvent::Moved {
            piece: request.piece,
            from: applied.from,
            to: request.target,
        });
        events.push(GameEvent::TurnChanged { active: defender });
        if status.in_check {
            events.push(GameEvent::Check {
                king_color: defender,
            });
        }
        if status.is_checkmate() {
            events.push(GameEvent::Checkmate {
                winner: request.requester,
            });
            self.result = Some(GameResult::win(request.requester, WinReason::Checkmate));
            info!("将死: {} 获胜", request.requester);
        }

        let events = self.sequence(events);
        self.transition(Phase::AwaitingAck { through: self.seq });
        Ok(events)
    }

    /// 中继确认已送达到 `seq` 为止的事件
    pub fn acknowledge(&mut self, seq: u64) -> Result<(), ChessError> {
        let Phase::AwaitingAck { through } = self.phase else {
            return Err(ChessError::StaleRequest);
        };
        if seq != through {
            return Err(ChessError::AckMismatch {
                expected: through,
                actual: seq,
            });
        }

        let next = match self.result {
            Some(result) => Phase::GameOver(result),
            None => Phase::WaitingForMove(self.turn.active_color),
        };
        self.transition(next);
        Ok(())
    }

    /// `by` 一方放弃对局，任何非终局阶段都可以进入
    pub fn abandon(&mut self, by: Color) -> Result<Vec<SequencedEvent>, ChessError> {
        if self.result.is_some() {
            return Err(ChessError::StaleRequest);
        }
        let result = GameResult::win(by.opponent(), WinReason::Abandoned);
        self.result = Some(result);
        info!("{} 放弃对局", by);

        let events = self.sequence(vec![GameEvent::Abandoned { by }]);
        self.transition(Phase::GameOver(result));
        Ok(events)
    }

    /// 当前规则下某个棋子可走的目标，开启送王检查时排除会让己方王被攻击的目标
    pub fn legal_moves(&self, piece: PieceId) -> Result<MoveSet, ChessError> {
        if self.king_guard {
            ThreatDetector::safe_moves(&self.board, piece)
        } else {
            MoveGenerator::generate(&self.board, piece)
        }
    }

    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            board: self.board.clone(),
            turn: self.turn,
            result: self.result,
            seq: self.seq,
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn turn(&self) -> &TurnState {
        &self.turn
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn result(&self) -> Option<GameResult> {
        self.result
    }

    pub fn is_over(&self) -> bool {
        self.result.is_some()
    }

    /// 最后一个已发出事件的序号
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// 用最新的走法集合校验请求，开启送王检查时再在棋盘副本上确认
    fn validate(&self, request: &MoveRequest) -> Result<(), ChessError> {
        let illegal = ChessError::IllegalMove {
            piece: request.piece,
            target: request.target,
        };
        if !request.target.is_on_board() {
            return Err(illegal);
        }

        let piece = self
            .board
            .piece(request.piece)
            .ok_or(ChessError::UnknownPiece { id: request.piece })?;
        if piece.color != request.requester {
            return Err(ChessError::NotYourPiece { id: piece.id });
        }

        let set = MoveGenerator::generate(&self.board, request.piece)?;
        if !set.allows(&self.board, request.target) {
            return Err(illegal);
        }

        if self.king_guard
            && ThreatDetector::exposes_king(&self.board, request.piece, request.target)?
        {
            return Err(ChessError::KingInCheck);
        }
        Ok(())
    }

    /// 先吃子再移动
    fn apply(&mut self, request: &MoveRequest) -> Result<Applied, ChessError> {
        let captured = match self.board.occupant_at(request.target).map(|p| p.id) {
            Some(victim) => Some((victim, self.board.remove(victim)?)),
            None => None,
        };
        let from = self.board.move_piece(request.piece, request.target)?;
        debug!("已执行 {} {} -> {}", request.piece, from, request.target);
        Ok(Applied { captured, from })
    }

    fn sequence(&mut self, events: Vec<GameEvent>) -> Vec<SequencedEvent> {
        events
            .into_iter()
            .map(|event| {
                self.seq += 1;
                SequencedEvent {
                    seq: self.seq,
                    event,
                }
            })
            .collect()
    }

    fn abort(&mut self, err: &ChessError) {
        error!("棋盘状态不一致，中止对局: {}", err);
        self.result = Some(GameResult::Aborted);
        self.transition(Phase::GameOver(GameResult::Aborted));
    }

    fn transition(&mut self, next: Phase) {
        debug!("协调器阶段 {:?} -> {:?}", self.phase, next);
        self.phase = next;
    }
}

impl Default for TurnCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

struct Applied {
    captured: Option<(PieceId, Cell)>,
    from: Cell,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fen::Fen;

    fn cell(s: &str) -> Cell {
        s.parse().unwrap()
    }

    fn request(coordinator: &TurnCoordinator, requester: Color, from: &str, to: &str) -> MoveRequest {
        MoveRequest {
            requester,
            piece: coordinator.board().occupant_at(cell(from)).unwrap().id,
            target: cell(to),
        }
    }

    fn play(coordinator: &mut TurnCoordinator, requester: Color, from: &str, to: &str) -> Vec<SequencedEvent> {
        let req = request(coordinator, requester, from, to);
        let events = coordinator.request_move(req).unwrap();
        coordinator.acknowledge(coordinator.seq()).unwrap();
        events
    }

    fn kinds(events: &[SequencedEvent]) -> Vec<GameEvent> {
        events.iter().map(|e| e.event.clone()).collect()
    }

    #[test]
    fn test_simple_move_events() {
        let mut coordinator = TurnCoordinator::new();
        let req = request(&coordinator, Color::White, "e2", "e4");

        let events = coordinator.request_move(req).unwrap();
        assert_eq!(
            kinds(&events),
            vec![
                GameEvent::Moved {
                    piece: req.piece,
                    from: cell("e2"),
                    to: cell("e4"),
                },
                GameEvent::TurnChanged {
                    active: Color::Black
                },
            ]
        );
        assert_eq!(events[0].seq, 1);
        assert_eq!(events[1].seq, 2);
        assert_eq!(coordinator.phase(), Phase::AwaitingAck { through: 2 });

        coordinator.acknowledge(2).unwrap();
        assert_eq!(coordinator.phase(), Phase::WaitingForMove(Color::Black));
    }

    #[test]
    fn test_not_your_turn_leaves_state_unchanged() {
        let mut coordinator = TurnCoordinator::new();
        let before = coordinator.snapshot();
        let req = request(&coordinator, Color::Black, "e7", "e5");

        assert_eq!(coordinator.request_move(req), Err(ChessError::NotYourTurn));
        assert_eq!(coordinator.snapshot(), before);
        assert_eq!(coordinator.phase(), Phase::WaitingForMove(Color::White));
    }

    #[test]
    fn test_illegal_move_rejected() {
        let mut coordinator = TurnCoordinator::new();
        let before = coordinator.snapshot();
        let req = request(&coordinator, Color::White, "e2", "e5");

        assert_eq!(
            coordinator.request_move(req),
            Err(ChessError::IllegalMove {
                piece: req.piece,
                target: cell("e5"),
            })
        );
        assert_eq!(coordinator.snapshot(), before);
        assert_eq!(coordinator.seq(), 0);
    }

    #[test]
    fn test_moving_opponent_piece_rejected() {
        let mut coordinator = TurnCoordinator::new();
        let piece = coordinator.board().occupant_at(cell("e7")).unwrap().id;

        let err = coordinator
            .request_move(MoveRequest {
                requester: Color::White,
                piece,
                target: cell("e5"),
            })
            .unwrap_err();
        assert_eq!(err, ChessError::NotYourPiece { id: piece });
    }

    #[test]
    fn test_unknown_piece_rejected() {
        let mut coordinator = TurnCoordinator::new();
        let err = coordinator
            .request_move(MoveRequest {
                requester: Color::White,
                piece: PieceId(99),
                target: cell("e4"),
            })
            .unwrap_err();
        assert_eq!(err, ChessError::UnknownPiece { id: PieceId(99) });
    }

    #[test]
    fn test_self_check_rejected_with_king_guard() {
        let (board, active) = Fen::parse("k3r3/8/8/8/8/8/4N3/4K3 w").unwrap();
        let mut coordinator = TurnCoordinator::with_board(board, active).with_king_guard(true);
        let req = request(&coordinator, Color::White, "e2", "c3");

        assert_eq!(coordinator.request_move(req), Err(ChessError::KingInCheck));
        assert_eq!(coordinator.phase(), Phase::WaitingForMove(Color::White));
    }

    #[test]
    fn test_self_check_allowed_by_default() {
        let (board, active) = Fen::parse("k3r3/8/8/8/8/8/4N3/4K3 w").unwrap();
        let mut coordinator = TurnCoordinator::with_board(board, active);
        assert!(!coordinator.king_guard());

        let events = play(&mut coordinator, Color::White, "e2", "c3");
        assert_eq!(events.len(), 2);
        assert!(ThreatDetector::king_in_check(coordinator.board(), Color::White));
        assert_eq!(coordinator.phase(), Phase::WaitingForMove(Color::Black));
    }

    #[test]
    fn test_target_off_board_rejected() {
        // a1 象，b2 黑兵：索引 9 与 b2 相同
        let (board, active) = Fen::parse("k7/8/8/8/8/8/1p6/B6K w").unwrap();
        let mut coordinator = TurnCoordinator::with_board(board, active);
        let bishop = coordinator.board().occupant_at(cell("a1")).unwrap().id;
        let before = coordinator.snapshot();

        for target in [Cell::new_unchecked(9, 0), Cell::new_unchecked(8, 7), Cell::new_unchecked(255, 255)] {
            let err = coordinator
                .request_move(MoveRequest {
                    requester: Color::White,
                    piece: bishop,
                    target,
                })
                .unwrap_err();
            assert_eq!(err, ChessError::IllegalMove { piece: bishop, target });
        }
        assert_eq!(coordinator.snapshot(), before);
        assert_eq!(coordinator.phase(), Phase::WaitingForMove(Color::White));
        coordinator.board().verify().unwrap();
    }

    #[test]
    fn test_wire_request_with_off_board_target_is_refused() {
        #[derive(Serialize)]
        struct RawRequest {
            requester: Color,
            piece: PieceId,
            target: (u8, u8),
        }

        let (board, active) = Fen::parse("k7/8/8/8/8/8/1p6/B6K w").unwrap();
        let coordinator = TurnCoordinator::with_board(board, active);
        let bishop = coordinator.board().occupant_at(cell("a1")).unwrap().id;

        let bytes = bincode::serialize(&RawRequest {
            requester: Color::White,
            piece: bishop,
            target: (9, 0),
        })
        .unwrap();
        assert!(bincode::deserialize::<MoveRequest>(&bytes).is_err());

        let bytes = bincode::serialize(&RawRequest {
            requester: Color::White,
            piece: bishop,
            target: (1, 1),
        })
        .unwrap();
        let req: MoveRequest = bincode::deserialize(&bytes).unwrap();
        assert_eq!(req.target, cell("b2"));
    }

    #[test]
    fn test_move_in_flight_until_acknowledged() {
        let mut coordinator = TurnCoordinator::new();
        let req = request(&coordinator, Color::White, "g1", "f3");
        coordinator.request_move(req).unwrap();

        let reply = request(&coordinator, Color::Black, "g8", "f6");
        assert_eq!(coordinator.request_move(reply), Err(ChessError::MoveInFlight));

        assert_eq!(
            coordinator.acknowledge(1),
            Err(ChessError::AckMismatch {
                expected: 2,
                actual: 1
            })
        );
        coordinator.acknowledge(2).unwrap();
        assert!(coordinator.request_move(reply).is_ok());
    }

    #[test]
    fn test_acknowledge_without_pending_move() {
        let mut coordinator = TurnCoordinator::new();
        assert_eq!(coordinator.acknowledge(1), Err(ChessError::StaleRequest));
    }

    #[test]
    fn test_capture_precedes_move() {
        let (board, active) = Fen::parse("4k3/8/8/3p4/4P3/8/8/4K3 w").unwrap();
        let mut coordinator = TurnCoordinator::with_board(board, active);
        let victim = coordinator.board().occupant_at(cell("d5")).unwrap().id;

        let events = play(&mut coordinator, Color::White, "e4", "d5");
        assert_eq!(
            events[0].event,
            GameEvent::Captured {
                piece: victim,
                cell: cell("d5"),
            }
        );
        assert!(matches!(events[1].event, GameEvent::Moved { .. }));
        assert!(coordinator.board().piece(victim).unwrap().is_captured);
        assert_eq!(
            coordinator.board().occupant_at(cell("d5")).unwrap().color,
            Color::White
        );
    }

    #[test]
    fn test_check_sets_turn_state() {
        let (board, active) = Fen::parse("k7/8/8/8/8/8/8/4K2R w").unwrap();
        let mut coordinator = TurnCoordinator::with_board(board, active);

        let events = play(&mut coordinator, Color::White, "h1", "h8");
        assert_eq!(
            events.last().unwrap().event,
            GameEvent::Check {
                king_color: Color::Black
            }
        );
        let turn = coordinator.turn();
        assert!(turn.is_check);
        assert_eq!(turn.checked_king_color, Some(Color::Black));
        assert!(!turn.is_checkmate);

        // 下一步解除将军
        play(&mut coordinator, Color::Black, "a8", "a7");
        assert!(!coordinator.turn().is_check);
        assert_eq!(coordinator.turn().checked_king_color, None);
    }

    #[test]
    fn test_checkmate_ends_game() {
        // 白后从 d1 走到 d8，黑王被自己的兵困住
        let (board, active) = Fen::parse("6k1/5ppp/8/8/8/8/8/3QK3 w").unwrap();
        let mut coordinator = TurnCoordinator::with_board(board, active);

        let events = play(&mut coordinator, Color::White, "d1", "d8");
        let tail: Vec<_> = kinds(&events).into_iter().rev().take(2).collect();
        assert_eq!(
            tail,
            vec![
                GameEvent::Checkmate {
                    winner: Color::White
                },
                GameEvent::Check {
                    king_color: Color::Black
                },
            ]
        );
        assert!(coordinator.turn().is_checkmate);
        assert_eq!(
            coordinator.phase(),
            Phase::GameOver(GameResult::WhiteWin(WinReason::Checkmate))
        );

        let req = request(&coordinator, Color::Black, "g8", "h8");
        assert_eq!(coordinator.request_move(req), Err(ChessError::StaleRequest));
    }

    #[test]
    fn test_request_after_checkmate_before_ack_is_stale() {
        let (board, active) = Fen::parse("6k1/5ppp/8/8/8/8/8/3QK3 w").unwrap();
        let mut coordinator = TurnCoordinator::with_board(board, active);
        let req = request(&coordinator, Color::White, "d1", "d8");
        coordinator.request_move(req).unwrap();

        let reply = request(&coordinator, Color::Black, "g8", "h8");
        assert_eq!(coordinator.request_move(reply), Err(ChessError::StaleRequest));
    }

    #[test]
    fn test_abandon_from_any_phase() {
        let mut coordinator = TurnCoordinator::new();
        let req = request(&coordinator, Color::White, "e2", "e4");
        coordinator.request_move(req).unwrap();

        let events = coordinator.abandon(Color::Black).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].seq, 3);
        assert_eq!(events[0].event, GameEvent::Abandoned { by: Color::Black });
        assert_eq!(
            coordinator.result(),
            Some(GameResult::WhiteWin(WinReason::Abandoned))
        );

        // 终局后的确认和再次放弃都是过期请求
        assert_eq!(coordinator.acknowledge(2), Err(ChessError::StaleRequest));
        assert_eq!(coordinator.abandon(Color::White), Err(ChessError::StaleRequest));
    }

    #[test]
    fn test_snapshot_restores_coordinator() {
        let mut coordinator = TurnCoordinator::new();
        play(&mut coordinator, Color::White, "e2", "e4");
        play(&mut coordinator, Color::Black, "e7", "e5");

        let restored = TurnCoordinator::from_snapshot(coordinator.snapshot());
        assert_eq!(restored.snapshot(), coordinator.snapshot());
        assert_eq!(restored.phase(), Phase::WaitingForMove(Color::White));
        assert_eq!(restored.seq(), 4);
    }

    #[test]
    fn test_legal_moves_excludes_self_check() {
        let (board, active) = Fen::parse("k3r3/8/8/8/8/8/4N3/4K3 w").unwrap();
        let coordinator = TurnCoordinator::with_board(board, active).with_king_guard(true);
        let knight = coordinator.board().occupant_at(cell("e2")).unwrap().id;
        assert!(coordinator.legal_moves(knight).unwrap().is_empty());

        let king = coordinator.board().king(Color::White).unwrap().id;
        let set = coordinator.legal_moves(king).unwrap();
        assert!(set.reachable.contains(&cell("d1")));

        // 默认规则只看走法集合
        let coordinator = coordinator.with_king_guard(false);
        assert!(!coordinator.legal_moves(knight).unwrap().is_empty());
    }
}
