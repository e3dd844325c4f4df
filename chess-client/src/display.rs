//! 终端显示

use std::io::Write;

use protocol::{Board, Cell, Color, GameObserver, PieceId, Replica, BOARD_SIZE};

use crate::peer::{color_name, Presenter};

/// 把事件和提示写到终端（或任意输出）
pub struct TextPresenter<W: Write> {
    out: W,
}

impl<W: Write> TextPresenter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: &str) {
        // 终端写入失败时没有更好的去处
        let _ = writeln!(self.out, "{}", text);
    }
}

impl<W: Write> GameObserver for TextPresenter<W> {
    fn on_captured(&mut self, piece: PieceId, cell: Cell) {
        self.line(&format!("{} 上的棋子 {} 被吃", cell, piece));
    }

    fn on_moved(&mut self, piece: PieceId, from: Cell, to: Cell) {
        self.line(&format!("{} {} -> {}", piece, from, to));
    }

    fn on_turn_changed(&mut self, active: Color) {
        self.line(&format!("轮到{}", color_name(active)));
    }

    fn on_check(&mut self, king_color: Color) {
        self.line(&format!("{}被将军！", color_name(king_color)));
    }

    fn on_checkmate(&mut self, winner: Color) {
        self.line(&format!("将死，{}获胜", color_name(winner)));
    }

    fn on_abandoned(&mut self, by: Color) {
        self.line(&format!("{}放弃，{}获胜", color_name(by), color_name(by.opponent())));
    }
}

impl<W: Write> Presenter for TextPresenter<W> {
    fn notice(&mut self, text: &str) {
        self.line(text);
    }

    fn refresh(&mut self, replica: &Replica, perspective: Color) {
        let text = render(replica.board(), perspective);
        self.line(&text);
    }
}

/// 按执棋方视角渲染棋盘，己方在下
pub fn render(board: &Board, perspective: Color) -> String {
    let size = BOARD_SIZE as u8;
    let ranks: Vec<u8> = match perspective {
        Color::White => (0..size).rev().collect(),
        Color::Black => (0..size).collect(),
    };
    let files: Vec<u8> = match perspective {
        Color::White => (0..size).collect(),
        Color::Black => (0..size).rev().collect(),
    };

    let mut text = String::new();
    for &rank in &ranks {
        text.push_str(&format!("{} ", rank + 1));
        for &file in &files {
            let c = Cell::new(file, rank)
                .and_then(|cell| board.occupant_at(cell))
                .map(|p| p.to_fen_char())
                .unwrap_or('.');
            text.push(' ');
            text.push(c);
        }
        text.push('\n');
    }
    text.push_str("  ");
    for &file in &files {
        text.push(' ');
        text.push((b'a' + file) as char);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::Peer;
    use protocol::ServerMessage;

    #[test]
    fn test_render_perspective() {
        let board = Board::initial();

        let white = render(&board, Color::White);
        assert!(white.starts_with("8  r n b q k b n r"));
        assert!(white.ends_with("   a b c d e f g h"));

        let black = render(&board, Color::Black);
        assert!(black.starts_with("1  R N B K Q B N R"));
        assert!(black.ends_with("   h g f e d c b a"));
    }

    #[test]
    fn test_presenter_writes_notices() {
        let mut presenter = TextPresenter::new(Vec::new());
        let mut peer = Peer::new();

        peer.handle(ServerMessage::OpponentReconnected, &mut presenter);
        presenter.on_checkmate(Color::White);

        let output = String::from_utf8(presenter.into_inner()).unwrap();
        assert_eq!(output, "对手已重连\n将死，白方获胜\n");
    }
}
