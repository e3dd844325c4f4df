//! 将死判定
//!
//! 对被将军一方的王，在棋盘副本上逐个尝试其候选落点：先移除落点上的敌子，
//! 再把王移过去（原位置随之清空，不会再挡住穿过它的射线），
//! 然后重新计算对方的威胁集合。没有安全落点即为将死。
//!
//! 只考虑王自己逃走，不考虑其他棋子垫将或吃掉将军的棋子。

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::board::Board;
use crate::error::ChessError;
use crate::moves::MoveGenerator;
use crate::piece::{Cell, Color};
use crate::threat::ThreatDetector;

/// 将军状态评估结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckStatus {
    pub in_check: bool,
    /// 王的安全落点
    pub escapes: BTreeSet<Cell>,
}

impl CheckStatus {
    pub fn is_checkmate(&self) -> bool {
        self.in_check && self.escapes.is_empty()
    }
}

/// 将死判定器
pub struct CheckmateResolver;

impl CheckmateResolver {
    /// 评估指定阵营的将军状态；未被将军时不计算逃跑格
    pub fn evaluate(board: &Board, color: Color) -> Result<CheckStatus, ChessError> {
        if !ThreatDetector::king_in_check(board, color) {
            return Ok(CheckStatus::default());
        }
        Ok(CheckStatus {
            in_check: true,
            escapes: Self::escape_cells(board, color)?,
        })
    }

    /// 王走过去之后不会被攻击的候选格
    pub fn escape_cells(board: &Board, color: Color) -> Result<BTreeSet<Cell>, ChessError> {
        let Some(king) = board.king(color) else {
            return Ok(BTreeSet::new());
        };
        let king_id = king.id;
        let candidates = MoveGenerator::piece_moves(board, king).destinations(board);

        let mut escapes = BTreeSet::new();
        for candidate in candidates {
            let mut scratch = board.clone();
            if let Some(enemy) = scratch.occupant_at(candidate).map(|p| p.id) {
                scratch.remove(enemy)?;
            }
            scratch.move_piece(king_id, candidate)?;

            if !ThreatDetector::is_attacked(&scratch, candidate, color.opponent()) {
                escapes.insert(candidate);
            }
        }
        Ok(escapes)
    }
}
