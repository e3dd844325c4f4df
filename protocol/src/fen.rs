//! FEN 格式解析和生成
//!
//! 只使用前两个字段：`<棋盘> <走子方>`，其余字段（易位权、吃过路兵、步数）
//! 可以存在但会被忽略。
//!
//! 示例：
//! `rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w - - 0 1`

use crate::board::Board;
use crate::constants::BOARD_SIZE;
use crate::error::ChessError;
use crate::piece::{Cell, Color, PieceType};

/// 初始局面 FEN
pub const INITIAL_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w - - 0 1";

/// FEN 格式处理
pub struct Fen;

impl Fen {
    /// 解析 FEN 字符串为棋盘和走子方（缺省为白方）
    pub fn parse(fen: &str) -> Result<(Board, Color), ChessError> {
        let mut parts = fen.split_whitespace();
        let placement = parts.next().ok_or_else(|| invalid("Empty FEN string"))?;

        let board = Self::parse_board(placement)?;

        let active = match parts.next() {
            None => Color::White,
            Some(field) => {
                let mut chars = field.chars();
                match (chars.next().and_then(Color::from_fen_char), chars.next()) {
                    (Some(color), None) => color,
                    _ => return Err(invalid(format!("Invalid active color: {}", field))),
                }
            }
        };

        Ok((board, active))
    }

    /// 解析棋盘部分
    fn parse_board(placement: &str) -> Result<Board, ChessError> {
        let rows: Vec<&str> = placement.split('/').collect();
        if rows.len() != BOARD_SIZE {
            return Err(invalid(format!(
                "Expected {} rows, got {}",
                BOARD_SIZE,
                rows.len()
            )));
        }

        let mut board = Board::empty();
        let mut kings = [0usize; 2];

        // FEN 从上到下是第 8 横线到第 1 横线
        for (row_idx, row) in rows.iter().enumerate() {
            let rank = (BOARD_SIZE - 1 - row_idx) as u8;
            let mut file = 0u8;

            for c in row.chars() {
                if file as usize >= BOARD_SIZE {
                    return Err(invalid(format!("Row {} has too many columns", row_idx)));
                }

                if let Some(empty) = c.to_digit(10) {
                    if empty == 0 {
                        return Err(invalid("Zero-length gap"));
                    }
                    file += empty as u8;
                } else if let Some((piece_type, color)) = PieceType::from_fen_char(c) {
                    let cell = Cell::new_unchecked(file, rank);
                    let id = board.add_piece(piece_type, color, cell)?;
                    // 离开初始横线的兵视为已经走过
                    if piece_type == PieceType::Pawn && rank != color.pawn_rank() {
                        board.set_has_moved(id, true)?;
                    }
                    if piece_type == PieceType::King {
                        kings[color as usize] += 1;
                    }
                    file += 1;
                } else {
                    return Err(invalid(format!("Invalid piece character: {}", c)));
                }
            }

            if file as usize != BOARD_SIZE {
                return Err(invalid(format!(
                    "Row {} has {} columns, expected {}",
                    row_idx, file, BOARD_SIZE
                )));
            }
        }

        if kings.iter().any(|&n| n > 1) {
            return Err(invalid("More than one king per side"));
        }

        Ok(board)
    }

    /// 将棋盘和走子方转换为 FEN 字符串
    pub fn to_string(board: &Board, active: Color) -> String {
        format!("{} {}", Self::board_to_string(board), active.to_fen_char())
    }

    /// 将棋盘转换为 FEN 棋盘部分
    pub fn board_to_string(board: &Board) -> String {
        let mut rows = Vec::with_capacity(BOARD_SIZE);

        for rank in (0..BOARD_SIZE as u8).rev() {
            let mut row = String::new();
            let mut empty_count = 0;

            for file in 0..BOARD_SIZE as u8 {
                if let Some(piece) = board.occupant_at(Cell::new_unchecked(file, rank)) {
                    if empty_count > 0 {
                        row.push_str(&empty_count.to_string());
                        empty_count = 0;
                    }
                    row.push(piece.to_fen_char());
                } else {
                    empty_count += 1;
                }
            }

            if empty_count > 0 {
                row.push_str(&empty_count.to_string());
            }

            rows.push(row);
        }

        rows.join("/")
    }
}

fn invalid(reason: impl Into<String>) -> ChessError {
    ChessError::InvalidFen {
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(s: &str) -> Cell {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_initial_fen() {
        let (board, active) = Fen::parse(INITIAL_FEN).unwrap();

        assert_eq!(active, Color::White);
        assert_eq!(board.pieces().len(), 32);

        let king = board.occupant_at(cell("e1")).unwrap();
        assert_eq!(king.piece_type, PieceType::King);
        assert_eq!(king.color, Color::White);

        let knight = board.occupant_at(cell("g8")).unwrap();
        assert_eq!(knight.piece_type, PieceType::Knight);
        assert_eq!(knight.color, Color::Black);

        assert!(board.pieces().iter().all(|p| !p.has_moved));
    }

    #[test]
    fn test_initial_fen_matches_initial_board() {
        assert_eq!(
            Fen::board_to_string(&Board::initial()),
            INITIAL_FEN.split(' ').next().unwrap()
        );
    }

    #[test]
    fn test_fen_roundtrip() {
        let fen = "r1bqkb1r/pppp1ppp/2n2n2/4p3/2B1P3/5N2/PPPP1PPP/RNBQK2R b";
        let (board, active) = Fen::parse(fen).unwrap();
        assert_eq!(Fen::to_string(&board, active), fen);
    }

    #[test]
    fn test_advanced_pawn_has_moved() {
        let (board, _) = Fen::parse("4k3/3p4/8/8/4P3/8/8/4K3 w").unwrap();

        assert!(board.occupant_at(cell("e4")).unwrap().has_moved);
        assert!(!board.occupant_at(cell("d7")).unwrap().has_moved);
    }

    #[test]
    fn test_active_color_defaults_to_white() {
        let (_, active) = Fen::parse("4k3/8/8/8/8/8/8/4K3").unwrap();
        assert_eq!(active, Color::White);

        let (_, active) = Fen::parse("4k3/8/8/8/8/8/8/4K3 b - - 12 40").unwrap();
        assert_eq!(active, Color::Black);
    }

    #[test]
    fn test_invalid_fen() {
        // 空串
        assert!(Fen::parse("").is_err());

        // 行数不对
        assert!(Fen::parse("4k3/8/8").is_err());

        // 列数不对
        assert!(Fen::parse("4k4/8/8/8/8/8/8/4K3 w").is_err());
        assert!(Fen::parse("4k2/8/8/8/8/8/8/4K3 w").is_err());

        // 无效字符
        assert!(Fen::parse("4x3/8/8/8/8/8/8/4K3 w").is_err());

        // 无效走子方
        assert!(Fen::parse("4k3/8/8/8/8/8/8/4K3 r").is_err());

        // 两个王
        assert!(Fen::parse("4k2k/8/8/8/8/8/8/4K3 w").is_err());
    }
}
