//! 棋子与格子定义

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::BOARD_SIZE;
use crate::error::ChessError;

/// 棋子类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PieceType {
    Pawn,
    Rook,
    Knight,
    Bishop,
    Queen,
    King,
}

impl PieceType {
    /// 获取 FEN 字符（白方大写，黑方小写）
    pub fn to_fen_char(&self, color: Color) -> char {
        let c = match self {
            PieceType::Pawn => 'p',
            PieceType::Rook => 'r',
            PieceType::Knight => 'n',
            PieceType::Bishop => 'b',
            PieceType::Queen => 'q',
            PieceType::King => 'k',
        };
        match color {
            Color::White => c.to_ascii_uppercase(),
            Color::Black => c,
        }
    }

    /// 从 FEN 字符解析
    pub fn from_fen_char(c: char) -> Option<(PieceType, Color)> {
        let color = if c.is_ascii_uppercase() {
            Color::White
        } else {
            Color::Black
        };
        let piece_type = match c.to_ascii_lowercase() {
            'p' => PieceType::Pawn,
            'r' => PieceType::Rook,
            'n' => PieceType::Knight,
            'b' => PieceType::Bishop,
            'q' => PieceType::Queen,
            'k' => PieceType::King,
            _ => return None,
        };
        Some((piece_type, color))
    }

    /// 是否为滑行棋子（车、象、后）
    pub fn is_slider(&self) -> bool {
        matches!(self, PieceType::Rook | PieceType::Bishop | PieceType::Queen)
    }
}

/// 阵营
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Color {
    /// 白方（先手，位于 1-2 横线）
    White,
    /// 黑方（后手，位于 7-8 横线）
    Black,
}

impl Color {
    /// 获取对方阵营
    pub fn opponent(&self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }

    /// "前方" 在横线上的方向，黑方是白方的镜像
    pub fn forward(&self) -> i8 {
        match self {
            Color::White => 1,
            Color::Black => -1,
        }
    }

    /// 兵的初始横线（0 起）
    pub fn pawn_rank(&self) -> u8 {
        match self {
            Color::White => 1,
            Color::Black => 6,
        }
    }

    /// 底线（0 起）
    pub fn back_rank(&self) -> u8 {
        match self {
            Color::White => 0,
            Color::Black => 7,
        }
    }

    /// 获取 FEN 字符
    pub fn to_fen_char(&self) -> char {
        match self {
            Color::White => 'w',
            Color::Black => 'b',
        }
    }

    /// 从 FEN 字符解析
    pub fn from_fen_char(c: char) -> Option<Color> {
        match c {
            'w' | 'W' => Some(Color::White),
            'b' | 'B' => Some(Color::Black),
            _ => None,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::White => f.write_str("White"),
            Color::Black => f.write_str("Black"),
        }
    }
}

/// 棋子的稳定标识（在实体表中的下标）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PieceId(pub u8);

impl PieceId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PieceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// 棋子实体
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Piece {
    pub id: PieceId,
    pub piece_type: PieceType,
    pub color: Color,
    /// 当前所在格；被吃后保留最后所在格
    pub cell: Cell,
    pub has_moved: bool,
    pub is_captured: bool,
}

impl Piece {
    /// 创建新棋子
    pub fn new(id: PieceId, piece_type: PieceType, color: Color, cell: Cell) -> Self {
        Self {
            id,
            piece_type,
            color,
            cell,
            has_moved: false,
            is_captured: false,
        }
    }

    /// 是否仍在棋盘上
    pub fn is_active(&self) -> bool {
        !self.is_captured
    }

    /// 获取 FEN 字符
    pub fn to_fen_char(&self) -> char {
        self.piece_type.to_fen_char(self.color)
    }
}

/// 棋盘格子，file 为纵线 a-h，rank 为横线 1-8（内部均从 0 开始）
///
/// 反序列化时检查边界，越界的格子无法从网络进入。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawCell")]
pub struct Cell {
    pub file: u8,
    pub rank: u8,
}

/// 未经检查的格子，仅用于反序列化
#[derive(Deserialize)]
struct RawCell {
    file: u8,
    rank: u8,
}

impl TryFrom<RawCell> for Cell {
    type Error = ChessError;

    fn try_from(raw: RawCell) -> Result<Self, Self::Error> {
        Cell::new(raw.file, raw.rank).ok_or_else(|| ChessError::InvalidCell {
            text: format!("({}, {})", raw.file, raw.rank),
        })
    }
}

impl Cell {
    /// 创建格子（越界返回 None）
    pub fn new(file: u8, rank: u8) -> Option<Self> {
        if (file as usize) < BOARD_SIZE && (rank as usize) < BOARD_SIZE {
            Some(Self { file, rank })
        } else {
            None
        }
    }

    /// 创建格子（不检查边界，内部使用）
    pub const fn new_unchecked(file: u8, rank: u8) -> Self {
        Self { file, rank }
    }

    /// 是否在棋盘范围内
    pub fn is_on_board(&self) -> bool {
        (self.file as usize) < BOARD_SIZE && (self.rank as usize) < BOARD_SIZE
    }

    /// 获取偏移后的格子
    pub fn offset(&self, df: i8, dr: i8) -> Option<Cell> {
        let file = self.file as i8 + df;
        let rank = self.rank as i8 + dr;
        if (0..BOARD_SIZE as i8).contains(&file) && (0..BOARD_SIZE as i8).contains(&rank) {
            Some(Cell {
                file: file as u8,
                rank: rank as u8,
            })
        } else {
            None
        }
    }

    /// 转换为数组索引
    pub fn to_index(&self) -> usize {
        self.rank as usize * BOARD_SIZE + self.file as usize
    }

    /// 从数组索引转换
    pub fn from_index(index: usize) -> Option<Self> {
        if index < BOARD_SIZE * BOARD_SIZE {
            Some(Cell {
                file: (index % BOARD_SIZE) as u8,
                rank: (index / BOARD_SIZE) as u8,
            })
        } else {
            None
        }
    }

    /// 遍历全部 64 个格子
    pub fn all() -> impl Iterator<Item = Cell> {
        (0..BOARD_SIZE * BOARD_SIZE).filter_map(Cell::from_index)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_on_board() {
            return write!(f, "({}, {})", self.file, self.rank);
        }
        write!(f, "{}{}", (b'a' + self.file) as char, self.rank + 1)
    }
}

impl FromStr for Cell {
    type Err = ChessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ChessError::InvalidCell { text: s.to_string() };
        let bytes = s.trim().as_bytes();
        if bytes.len() != 2 {
            return Err(invalid());
        }
        let file = bytes[0].to_ascii_lowercase().wrapping_sub(b'a');
        let rank = bytes[1].wrapping_sub(b'1');
        Cell::new(file, rank).ok_or_else(invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_parse_and_display() {
        let cell: Cell = "e4".parse().unwrap();
        assert_eq!(cell, Cell::new_unchecked(4, 3));
        assert_eq!(cell.to_string(), "e4");

        assert_eq!("A1".parse::<Cell>().unwrap(), Cell::new_unchecked(0, 0));
        assert!("i1".parse::<Cell>().is_err());
        assert!("a9".parse::<Cell>().is_err());
        assert!("e".parse::<Cell>().is_err());
    }

    #[test]
    fn test_cell_deserialize_checks_bounds() {
        let bytes = bincode::serialize(&(4u8, 3u8)).unwrap();
        assert_eq!(bincode::deserialize::<Cell>(&bytes).unwrap(), Cell::new_unchecked(4, 3));

        for raw in [(8u8, 0u8), (0, 8), (9, 0), (255, 255)] {
            let bytes = bincode::serialize(&raw).unwrap();
            assert!(bincode::deserialize::<Cell>(&bytes).is_err());
        }

        assert!(!Cell::new_unchecked(9, 0).is_on_board());
        assert_eq!(Cell::new_unchecked(9, 0).to_string(), "(9, 0)");
    }

    #[test]
    fn test_cell_offset_bounds() {
        let corner = Cell::new_unchecked(0, 0);
        assert_eq!(corner.offset(-1, 0), None);
        assert_eq!(corner.offset(1, 2), Some(Cell::new_unchecked(1, 2)));
        assert_eq!(Cell::new_unchecked(7, 7).offset(0, 1), None);
    }

    #[test]
    fn test_cell_index_roundtrip() {
        assert_eq!(Cell::all().count(), 64);
        for cell in Cell::all() {
            assert_eq!(Cell::from_index(cell.to_index()), Some(cell));
        }
    }

    #[test]
    fn test_fen_char() {
        assert_eq!(PieceType::King.to_fen_char(Color::White), 'K');
        assert_eq!(PieceType::Knight.to_fen_char(Color::Black), 'n');
        assert_eq!(
            PieceType::from_fen_char('Q'),
            Some((PieceType::Queen, Color::White))
        );
        assert_eq!(PieceType::from_fen_char('x'), None);
    }

    #[test]
    fn test_color_mirror() {
        assert_eq!(Color::White.opponent(), Color::Black);
        assert_eq!(Color::White.forward(), -Color::Black.forward());
    }
}
