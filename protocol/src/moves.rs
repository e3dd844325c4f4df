//! 走法生成
//!
//! 每种棋子有一组"移动方向"和一组"吃子方向"。方向是棋盘坐标系下的相对向量，
//! 黑方的"前方"是白方的镜像。除兵以外两组方向相同。
//!
//! 沿方向逐格行走直到最大步数：空格加入可达集合；遇到己方棋子停下且不包含；
//! 遇到敌方棋子停下并加入可吃集合（不是可达集合）。

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::board::Board;
use crate::constants::MAX_SLIDE_DISTANCE;
use crate::error::ChessError;
use crate::piece::{Cell, Color, Piece, PieceId, PieceType};

const ORTHOGONAL: [(i8, i8); 4] = [(0, 1), (0, -1), (1, 0), (-1, 0)];

const DIAGONAL: [(i8, i8); 4] = [(1, 1), (1, -1), (-1, 1), (-1, -1)];

const ALL_DIRECTIONS: [(i8, i8); 8] = [
    (0, 1),
    (0, -1),
    (1, 0),
    (-1, 0),
    (1, 1),
    (1, -1),
    (-1, 1),
    (-1, -1),
];

const KNIGHT_JUMPS: [(i8, i8); 8] = [
    (1, 2),
    (2, 1),
    (2, -1),
    (1, -2),
    (-1, -2),
    (-2, -1),
    (-2, 1),
    (-1, 2),
];

/// 单个棋子在某一时刻的走法集合
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveSet {
    /// 可以走到的空格
    pub reachable: BTreeSet<Cell>,
    /// 可以吃掉的敌方棋子
    pub capturable: BTreeSet<PieceId>,
}

impl MoveSet {
    /// 目标格是否合法（空格可达，或者上面是可吃的敌子）
    pub fn allows(&self, board: &Board, target: Cell) -> bool {
        if self.reachable.contains(&target) {
            return true;
        }
        board
            .occupant_at(target)
            .is_some_and(|p| self.capturable.contains(&p.id))
    }

    /// 全部目标格（可达格 + 可吃棋子所在格）
    pub fn destinations(&self, board: &Board) -> BTreeSet<Cell> {
        let mut cells = self.reachable.clone();
        cells.extend(
            self.capturable
                .iter()
                .filter_map(|id| board.piece(*id))
                .map(|p| p.cell),
        );
        cells
    }

    pub fn is_empty(&self) -> bool {
        self.reachable.is_empty() && self.capturable.is_empty()
    }
}

/// 一条射线要收集哪些结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RayMode {
    MoveAndCapture,
    MoveOnly,
    CaptureOnly,
}

/// 走法生成器
pub struct MoveGenerator;

impl MoveGenerator {
    /// 生成指定棋子的走法集合，已被吃的棋子返回空集合
    pub fn generate(board: &Board, id: PieceId) -> Result<MoveSet, ChessError> {
        let piece = board.piece(id).ok_or(ChessError::UnknownPiece { id })?;
        Ok(Self::piece_moves(board, piece))
    }

    /// 根据棋子属性生成走法（不查表）
    pub fn piece_moves(board: &Board, piece: &Piece) -> MoveSet {
        let mut set = MoveSet::default();
        if piece.is_captured {
            return set;
        }

        match piece.piece_type {
            PieceType::Pawn => {
                let forward = piece.color.forward();
                let max = if piece.has_moved { 1 } else { 2 };
                Self::trace(board, piece, (0, forward), max, RayMode::MoveOnly, &mut set);
                for dx in [-1, 1] {
                    Self::trace(board, piece, (dx, forward), 1, RayMode::CaptureOnly, &mut set);
                }
            }
            PieceType::Rook => Self::trace_all(board, piece, &ORTHOGONAL, MAX_SLIDE_DISTANCE, &mut set),
            PieceType::Bishop => Self::trace_all(board, piece, &DIAGONAL, MAX_SLIDE_DISTANCE, &mut set),
            PieceType::Queen => Self::trace_all(board, piece, &ALL_DIRECTIONS, MAX_SLIDE_DISTANCE, &mut set),
            PieceType::King => Self::trace_all(board, piece, &ALL_DIRECTIONS, 1, &mut set),
            // 跳跃：每个偏移只看落点，路径上的棋子不影响
            PieceType::Knight => Self::trace_all(board, piece, &KNIGHT_JUMPS, 1, &mut set),
        }

        set
    }

    /// 只计算可吃的敌子（威胁检测使用）
    pub fn captures(board: &Board, piece: &Piece) -> BTreeSet<PieceId> {
        Self::piece_moves(board, piece).capturable
    }

    fn trace_all(
        board: &Board,
        piece: &Piece,
        directions: &[(i8, i8)],
        max_distance: u8,
        set: &mut MoveSet,
    ) {
        for &direction in directions {
            Self::trace(board, piece, direction, max_distance, RayMode::MoveAndCapture, set);
        }
    }

    /// 沿一个方向行走，遇到第一个棋子即停止
    fn trace(
        board: &Board,
        piece: &Piece,
        (df, dr): (i8, i8),
        max_distance: u8,
        mode: RayMode,
        set: &mut MoveSet,
    ) {
        let mut current = piece.cell;
        for _ in 0..max_distance {
            let Some(next) = current.offset(df, dr) else {
                break;
            };
            match board.occupant_at(next) {
                None => {
                    if mode != RayMode::CaptureOnly {
                        set.reachable.insert(next);
                    }
                }
                Some(target) => {
                    if target.color != piece.color && mode != RayMode::MoveOnly {
                        set.capturable.insert(target.id);
                    }
                    break;
                }
            }
            current = next;
        }
    }

    /// 指定阵营全部在场棋子的走法集合
    pub fn generate_side(board: &Board, color: Color) -> Vec<(PieceId, MoveSet)> {
        board
            .active_pieces(color)
            .map(|p| (p.id, Self::piece_moves(board, p)))
            .collect()
    }
}
