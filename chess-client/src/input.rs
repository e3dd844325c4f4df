//! 文本输入
//!
//! 每行一条命令，例如 `e2 e4`、`moves g1`、`create black`、`join 3`。

use protocol::{Cell, Color, RoomId};
use thiserror::Error;

/// 输入命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// 走棋
    Move { from: Cell, to: Cell },
    /// 查看某个棋子可以走到哪里
    Moves { from: Cell },
    /// 打印棋盘
    Board,
    /// 房间列表
    List,
    /// 创建房间，可选执哪一方
    Create { color: Option<Color> },
    /// 加入房间
    Join { room_id: RoomId },
    /// 离开房间
    Leave,
    /// 认输
    Resign,
    Help,
    Quit,
}

/// 输入错误
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("空命令")]
    Empty,

    #[error("未知命令: {0}")]
    Unknown(String),

    #[error("无效的格子: {0}")]
    InvalidCell(String),

    #[error("无效的阵营: {0}（应为 white 或 black）")]
    InvalidColor(String),

    #[error("无效的房间号: {0}")]
    InvalidRoom(String),

    #[error("用法: {0}")]
    Usage(&'static str),
}

impl Command {
    pub fn parse(line: &str) -> Result<Command, InputError> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&head, args)) = words.split_first() else {
            return Err(InputError::Empty);
        };

        match (head.to_ascii_lowercase().as_str(), args) {
            ("board" | "b", []) => Ok(Command::Board),
            ("list" | "ls", []) => Ok(Command::List),
            ("leave", []) => Ok(Command::Leave),
            ("resign", []) => Ok(Command::Resign),
            ("help" | "?", []) => Ok(Command::Help),
            ("quit" | "exit" | "q", []) => Ok(Command::Quit),
            ("moves" | "m", [from]) => Ok(Command::Moves {
                from: parse_cell(from)?,
            }),
            ("moves" | "m", _) => Err(InputError::Usage("moves <格子>")),
            ("create", []) => Ok(Command::Create { color: None }),
            ("create", [color]) => Ok(Command::Create {
                color: Some(parse_color(color)?),
            }),
            ("create", _) => Err(InputError::Usage("create [white|black]")),
            ("join", [room]) => room
                .parse()
                .map(|room_id| Command::Join { room_id })
                .map_err(|_| InputError::InvalidRoom(room.to_string())),
            ("join", _) => Err(InputError::Usage("join <房间号>")),
            (_, [to]) if is_cell_like(head) => Ok(Command::Move {
                from: parse_cell(head)?,
                to: parse_cell(to)?,
            }),
            // "e2e4" 写法
            (word, []) if word.len() == 4 && word.is_ascii() => Ok(Command::Move {
                from: parse_cell(&word[..2])?,
                to: parse_cell(&word[2..])?,
            }),
            _ => Err(InputError::Unknown(line.trim().to_string())),
        }
    }

    /// 帮助文本
    pub fn help() -> &'static str {
        "命令:
  e2 e4 / e2e4        走棋
  moves <格子>        查看可走位置
  board               打印棋盘
  list                房间列表
  create [white|black] 创建房间
  join <房间号>       加入房间
  leave               离开房间
  resign              认输
  quit                退出"
    }
}

fn is_cell_like(word: &str) -> bool {
    let bytes = word.as_bytes();
    bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1].is_ascii_digit()
}

fn parse_cell(text: &str) -> Result<Cell, InputError> {
    text.to_ascii_lowercase()
        .parse()
        .map_err(|_| InputError::InvalidCell(text.to_string()))
}

fn parse_color(text: &str) -> Result<Color, InputError> {
    match text.to_ascii_lowercase().as_str() {
        "white" | "w" => Ok(Color::White),
        "black" | "b" => Ok(Color::Black),
        _ => Err(InputError::InvalidColor(text.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(s: &str) -> Cell {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_move() {
        let expected = Command::Move {
            from: cell("e2"),
            to: cell("e4"),
        };
        assert_eq!(Command::parse("e2 e4"), Ok(expected));
        assert_eq!(Command::parse("  E2   E4 "), Ok(expected));
        assert_eq!(Command::parse("e2e4"), Ok(expected));
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("board"), Ok(Command::Board));
        assert_eq!(Command::parse("list"), Ok(Command::List));
        assert_eq!(
            Command::parse("moves g1"),
            Ok(Command::Moves { from: cell("g1") })
        );
        assert_eq!(
            Command::parse("create black"),
            Ok(Command::Create {
                color: Some(Color::Black)
            })
        );
        assert_eq!(Command::parse("create"), Ok(Command::Create { color: None }));
        assert_eq!(Command::parse("join 12"), Ok(Command::Join { room_id: 12 }));
        assert_eq!(Command::parse("q"), Ok(Command::Quit));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Command::parse("   "), Err(InputError::Empty));
        assert_eq!(
            Command::parse("e2 i9"),
            Err(InputError::InvalidCell("i9".to_string()))
        );
        assert_eq!(
            Command::parse("create red"),
            Err(InputError::InvalidColor("red".to_string()))
        );
        assert_eq!(
            Command::parse("join abc"),
            Err(InputError::InvalidRoom("abc".to_string()))
        );
        assert!(matches!(Command::parse("moves"), Err(InputError::Usage(_))));
        assert!(matches!(Command::parse("dance"), Err(InputError::Unknown(_))));
    }
}
