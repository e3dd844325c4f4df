//! 威胁检测
//!
//! 攻击方所有在场棋子（包括王）的可吃集合的并集，换算成被攻击棋子所在的格子。
//! 每次都完整重新计算，不做缓存。

use std::collections::BTreeSet;

use crate::board::Board;
use crate::error::ChessError;
use crate::moves::{MoveGenerator, MoveSet};
use crate::piece::{Cell, Color, PieceId};

/// 威胁检测器
pub struct ThreatDetector;

impl ThreatDetector {
    /// 被 `attacker` 一方威胁的防守方棋子所在格
    pub fn threat_set(board: &Board, attacker: Color) -> BTreeSet<Cell> {
        board
            .active_pieces(attacker)
            .flat_map(|piece| MoveGenerator::captures(board, piece))
            .filter_map(|id| board.piece(id))
            .map(|target| target.cell)
            .collect()
    }

    /// 格子上的棋子是否被 `by` 一方攻击
    ///
    /// 只有被占用的格子才会出现在威胁集合中，空格总是返回 false。
    pub fn is_attacked(board: &Board, cell: Cell, by: Color) -> bool {
        Self::threat_set(board, by).contains(&cell)
    }

    /// 指定阵营的王是否被将军，没有王时返回 false
    pub fn king_in_check(board: &Board, color: Color) -> bool {
        board
            .king(color)
            .is_some_and(|king| Self::is_attacked(board, king.cell, color.opponent()))
    }

    /// 在棋盘副本上执行走法，判断走完后己方王是否被攻击
    pub fn exposes_king(board: &Board, id: PieceId, target: Cell) -> Result<bool, ChessError> {
        let color = board.piece(id).ok_or(ChessError::UnknownPiece { id })?.color;

        let mut scratch = board.clone();
        if let Some(enemy) = scratch.occupant_at(target).map(|p| p.id) {
            scratch.remove(enemy)?;
        }
        scratch.move_piece(id, target)?;
        Ok(Self::king_in_check(&scratch, color))
    }

    /// 走法集合去掉会让己方王被攻击的目标
    pub fn safe_moves(board: &Board, id: PieceId) -> Result<MoveSet, ChessError> {
        let mut set = MoveGenerator::generate(board, id)?;

        let mut reachable = BTreeSet::new();
        for cell in set.reachable {
            if !Self::exposes_king(board, id, cell)? {
                reachable.insert(cell);
            }
        }
        set.reachable = reachable;

        let mut capturable = BTreeSet::new();
        for target in set.capturable {
            let Some(cell) = board.piece(target).map(|p| p.cell) else {
                continue;
            };
            if !Self::exposes_king(board, id, cell)? {
                capturable.insert(target);
            }
        }
        set.capturable = capturable;

        Ok(set)
    }
}
