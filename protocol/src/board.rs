//! 棋盘状态
//!
//! 棋盘拥有棋子实体表和格子到棋子的映射，是占用关系的唯一来源。
//! 所有修改都经过 `place` / `remove` / `move_piece`。

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{BOARD_SIZE, CELL_COUNT};
use crate::error::ChessError;
use crate::piece::{Cell, Color, Piece, PieceId, PieceType};

/// 底线棋子排列（a-h）
const BACK_RANK: [PieceType; BOARD_SIZE] = [
    PieceType::Rook,
    PieceType::Knight,
    PieceType::Bishop,
    PieceType::Queen,
    PieceType::King,
    PieceType::Bishop,
    PieceType::Knight,
    PieceType::Rook,
];

/// 棋盘
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    /// 实体表，下标即 PieceId
    pieces: Vec<Piece>,
    /// 8x8 格子，索引为 rank * 8 + file，使用 Vec 以支持 serde
    squares: Vec<Option<PieceId>>,
}

impl Board {
    /// 创建空棋盘
    pub fn empty() -> Self {
        Self {
            pieces: Vec::new(),
            squares: vec![None; CELL_COUNT],
        }
    }

    /// 创建初始棋盘（白方 #0-#15，黑方 #16-#31）
    pub fn initial() -> Self {
        let mut board = Self::empty();
        for color in [Color::White, Color::Black] {
            for (file, piece_type) in BACK_RANK.iter().enumerate() {
                let cell = Cell::new_unchecked(file as u8, color.back_rank());
                board.spawn(*piece_type, color, cell);
            }
            for file in 0..BOARD_SIZE as u8 {
                let cell = Cell::new_unchecked(file, color.pawn_rank());
                board.spawn(PieceType::Pawn, color, cell);
            }
        }
        board
    }

    /// 初始布局使用，格子保证为空
    fn spawn(&mut self, piece_type: PieceType, color: Color, cell: Cell) {
        let id = PieceId(self.pieces.len() as u8);
        self.pieces.push(Piece::new(id, piece_type, color, cell));
        self.squares[cell.to_index()] = Some(id);
    }

    /// 向棋盘添加新棋子（用于摆局面）
    pub fn add_piece(
        &mut self,
        piece_type: PieceType,
        color: Color,
        cell: Cell,
    ) -> Result<PieceId, ChessError> {
        Self::check_bounds(cell)?;
        if self.squares[cell.to_index()].is_some() {
            return Err(ChessError::OccupancyViolation { cell });
        }
        let id = PieceId(self.pieces.len() as u8);
        self.spawn(piece_type, color, cell);
        Ok(id)
    }

    /// 获取指定格子上的棋子
    pub fn occupant_at(&self, cell: Cell) -> Option<&Piece> {
        self.squares
            .get(cell.to_index())
            .copied()
            .flatten()
            .and_then(|id| self.pieces.get(id.index()))
    }

    /// 按 ID 获取棋子（包括已被吃的）
    pub fn piece(&self, id: PieceId) -> Option<&Piece> {
        self.pieces.get(id.index())
    }

    /// 把棋子放到空格上，格子已被占用时返回 `OccupancyViolation`
    pub fn place(&mut self, id: PieceId, cell: Cell) -> Result<(), ChessError> {
        if id.index() >= self.pieces.len() {
            return Err(ChessError::UnknownPiece { id });
        }
        Self::check_bounds(cell)?;
        if self.squares[cell.to_index()].is_some() {
            return Err(ChessError::OccupancyViolation { cell });
        }
        let piece = &mut self.pieces[id.index()];
        if piece.is_active() && self.squares[piece.cell.to_index()] == Some(id) {
            self.squares[piece.cell.to_index()] = None;
        }
        piece.cell = cell;
        piece.is_captured = false;
        self.squares[cell.to_index()] = Some(id);
        Ok(())
    }

    /// 把棋子移出棋盘并标记为被吃，返回其最后所在格
    pub fn remove(&mut self, id: PieceId) -> Result<Cell, ChessError> {
        let piece = self
            .pieces
            .get_mut(id.index())
            .ok_or(ChessError::UnknownPiece { id })?;
        let cell = piece.cell;
        if piece.is_captured || self.squares[cell.to_index()] != Some(id) {
            return Err(ChessError::OccupancyViolation { cell });
        }
        piece.is_captured = true;
        self.squares[cell.to_index()] = None;
        Ok(cell)
    }

    /// 原子地移动棋子：清空起点、占据终点、更新棋子所在格，返回起点
    ///
    /// 终点必须为空，吃子需要先 `remove`。
    pub fn move_piece(&mut self, id: PieceId, to: Cell) -> Result<Cell, ChessError> {
        let piece = self
            .pieces
            .get(id.index())
            .ok_or(ChessError::UnknownPiece { id })?;
        Self::check_bounds(to)?;
        let from = piece.cell;
        if piece.is_captured || self.squares[from.to_index()] != Some(id) {
            return Err(ChessError::OccupancyViolation { cell: from });
        }
        if self.squares[to.to_index()].is_some() {
            return Err(ChessError::OccupancyViolation { cell: to });
        }

        self.squares[from.to_index()] = None;
        self.squares[to.to_index()] = Some(id);
        let piece = &mut self.pieces[id.index()];
        piece.cell = to;
        piece.has_moved = true;
        Ok(from)
    }

    fn check_bounds(cell: Cell) -> Result<(), ChessError> {
        if cell.is_on_board() {
            Ok(())
        } else {
            Err(ChessError::InvalidCell {
                text: cell.to_string(),
            })
        }
    }

    /// 设置棋子是否已移动过（用于从局面导入）
    pub fn set_has_moved(&mut self, id: PieceId, has_moved: bool) -> Result<(), ChessError> {
        let piece = self
            .pieces
            .get_mut(id.index())
            .ok_or(ChessError::UnknownPiece { id })?;
        piece.has_moved = has_moved;
        Ok(())
    }

    /// 查找指定阵营的王
    pub fn king(&self, color: Color) -> Option<&Piece> {
        self.active_pieces(color)
            .find(|p| p.piece_type == PieceType::King)
    }

    /// 指定阵营仍在棋盘上的棋子
    pub fn active_pieces(&self, color: Color) -> impl Iterator<Item = &Piece> + '_ {
        self.pieces
            .iter()
            .filter(move |p| p.color == color && p.is_active())
    }

    /// 全部棋子（包括已被吃的）
    pub fn pieces(&self) -> &[Piece] {
        &self.pieces
    }

    /// 已被吃的棋子
    pub fn captured_pieces(&self) -> impl Iterator<Item = &Piece> + '_ {
        self.pieces.iter().filter(|p| p.is_captured)
    }

    /// 校验占用映射与棋子所在格一致
    pub fn verify(&self) -> Result<(), ChessError> {
        for (index, slot) in self.squares.iter().enumerate() {
            if let Some(id) = slot {
                let cell = Cell::from_index(index).unwrap_or(Cell::new_unchecked(0, 0));
                match self.pieces.get(id.index()) {
                    Some(piece) if piece.is_active() && piece.cell == cell => {}
                    _ => return Err(ChessError::OccupancyViolation { cell }),
                }
            }
        }
        for piece in self.pieces.iter().filter(|p| p.is_active()) {
            if self.squares.get(piece.cell.to_index()).copied().flatten() != Some(piece.id) {
                return Err(ChessError::OccupancyViolation { cell: piece.cell });
            }
        }
        Ok(())
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::initial()
    }
}

/// 文本棋盘（白方在下），调试和终端输出用
impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rank in (0..BOARD_SIZE as u8).rev() {
            write!(f, "{} ", rank + 1)?;
            for file in 0..BOARD_SIZE as u8 {
                let c = self
                    .occupant_at(Cell::new_unchecked(file, rank))
                    .map(|p| p.to_fen_char())
                    .unwrap_or('.');
                write!(f, " {}", c)?;
            }
            writeln!(f)?;
        }
        write!(f, "   a b c d e f g h")
    }
}
