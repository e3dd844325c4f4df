//! 对局参与方
//!
//! 把服务器消息应用到本地副本，并决定需要回送的确认或快照请求。
//! 副本只用于显示和本地预检查，最终以服务器裁决为准。

use thiserror::Error;
use tracing::{debug, warn};

use crate::input::Command;
use protocol::{
    Cell, ChessError, ClientMessage, Color, GameEvent, GameObserver, PlayerId, Replica, RoomId,
    SequencedEvent, ServerMessage,
};

/// 表现层
pub trait Presenter: GameObserver {
    /// 提示信息
    fn notice(&mut self, text: &str);

    /// 局面变化后刷新显示
    fn refresh(&mut self, _replica: &Replica, _perspective: Color) {}
}

/// 本地预检查失败
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeerError {
    #[error("尚未开始对局")]
    NoGame,

    #[error("对局已结束")]
    GameOver,

    #[error("还没轮到你")]
    NotYourTurn,

    #[error("{0} 上没有棋子")]
    EmptyCell(Cell),

    #[error("{0} 上不是你的棋子")]
    NotYourPiece(Cell),

    #[error("{from} 不能走到 {to}")]
    Unreachable { from: Cell, to: Cell },

    #[error(transparent)]
    Chess(#[from] ChessError),
}

/// 参与方状态
#[derive(Debug, Default)]
pub struct Peer {
    player_id: Option<PlayerId>,
    room_id: Option<RoomId>,
    color: Option<Color>,
    replica: Option<Replica>,
    /// 已请求快照，等待期间丢弃事件
    resyncing: bool,
}

impl Peer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 处理一条服务器消息，返回需要回送的请求
    pub fn handle<P>(&mut self, msg: ServerMessage, presenter: &mut P) -> Vec<ClientMessage>
    where
        P: Presenter + ?Sized,
    {
        match msg {
            ServerMessage::LoginSuccess { player_id } => {
                self.player_id = Some(player_id);
                presenter.notice(&format!("登录成功，玩家 ID: {}", player_id));
                Vec::new()
            }
            ServerMessage::ReconnectSuccess {
                room_id,
                your_color,
                snapshot,
            } => {
                self.room_id = Some(room_id);
                self.color = Some(your_color);
                presenter.notice(&format!("已重连到房间 {}", room_id));
                self.reset(Replica::from_snapshot(snapshot), presenter)
            }
            ServerMessage::RoomCreated {
                room_id,
                your_color,
            } => {
                self.room_id = Some(room_id);
                self.color = Some(your_color);
                presenter.notice(&format!(
                    "已创建房间 {}，执{}，等待对手加入",
                    room_id,
                    color_name(your_color)
                ));
                Vec::new()
            }
            ServerMessage::RoomJoined {
                room_id,
                your_color,
            } => {
                self.room_id = Some(room_id);
                self.color = Some(your_color);
                presenter.notice(&format!(
                    "已加入房间 {}，执{}",
                    room_id,
                    color_name(your_color)
                ));
                Vec::new()
            }
            ServerMessage::RoomList { rooms } => {
                if rooms.is_empty() {
                    presenter.notice("暂无可加入的房间");
                }
                for room in rooms {
                    presenter.notice(&format!(
                        "房间 {}: 白方 {} / 黑方 {}",
                        room.id,
                        room.white_player.as_deref().unwrap_or("-"),
                        room.black_player.as_deref().unwrap_or("-"),
                    ));
                }
                Vec::new()
            }
            ServerMessage::OpponentJoined { nickname } => {
                presenter.notice(&format!("{} 加入了房间", nickname));
                Vec::new()
            }
            ServerMessage::GameStarted {
                snapshot,
                your_color,
                white_player,
                black_player,
            } => {
                self.color = Some(your_color);
                presenter.notice(&format!(
                    "对局开始: {}（白）对 {}（黑），你执{}",
                    white_player,
                    black_player,
                    color_name(your_color)
                ));
                self.reset(Replica::from_snapshot(snapshot), presenter)
            }
            ServerMessage::Event(event) => self.apply_event(event, presenter),
            ServerMessage::Snapshot(snapshot) => {
                debug!("收到快照，序号 {}", snapshot.seq);
                self.reset(Replica::from_snapshot(snapshot), presenter)
            }
            ServerMessage::OpponentDisconnected { timeout_secs } => {
                presenter.notice(&format!("对手断线，{} 秒内未重连判负", timeout_secs));
                Vec::new()
            }
            ServerMessage::OpponentReconnected => {
                presenter.notice("对手已重连");
                Vec::new()
            }
            ServerMessage::Pong => Vec::new(),
            ServerMessage::Error { code, message } => {
                presenter.notice(&format!("错误 [{}]: {}", code, message));
                Vec::new()
            }
        }
    }

    /// 用快照替换副本并确认
    fn reset<P>(&mut self, replica: Replica, presenter: &mut P) -> Vec<ClientMessage>
    where
        P: Presenter + ?Sized,
    {
        let seq = replica.last_seq();
        presenter.refresh(&replica, self.perspective());
        self.replica = Some(replica);
        self.resyncing = false;
        vec![ClientMessage::Ack { seq }]
    }

    fn apply_event<P>(&mut self, event: SequencedEvent, presenter: &mut P) -> Vec<ClientMessage>
    where
        P: Presenter + ?Sized,
    {
        let perspective = self.perspective();
        let Some(replica) = self.replica.as_mut() else {
            debug!("不在对局中，忽略事件 {}", event.seq);
            return Vec::new();
        };
        if self.resyncing {
            debug!("等待快照，丢弃事件 {}", event.seq);
            return Vec::new();
        }

        if let Err(err) = replica.receive(&event) {
            warn!("无法应用事件 {}: {}，请求快照", event.seq, err);
            self.resyncing = true;
            return vec![ClientMessage::RequestSnapshot];
        }

        event.event.dispatch(presenter);
        match event.event {
            // 一步棋的中间事件不单独确认
            GameEvent::Captured { .. } | GameEvent::Moved { .. } => Vec::new(),
            GameEvent::TurnChanged { .. } => {
                presenter.refresh(replica, perspective);
                vec![ClientMessage::Ack { seq: event.seq }]
            }
            _ => vec![ClientMessage::Ack { seq: event.seq }],
        }
    }

    /// 执行一条输入命令，返回需要发给服务器的请求
    pub fn command<P>(&mut self, command: Command, presenter: &mut P) -> Vec<ClientMessage>
    where
        P: Presenter + ?Sized,
    {
        match command {
            Command::Move { from, to } => match self.move_request(from, to) {
                Ok(request) => vec![request],
                Err(err) => {
                    presenter.notice(&err.to_string());
                    Vec::new()
                }
            },
            Command::Moves { from } => {
                match self.targets(from) {
                    Ok(cells) if cells.is_empty() => presenter.notice(&format!("{} 无处可走", from)),
                    Ok(cells) => {
                        let cells: Vec<String> = cells.iter().map(|c| c.to_string()).collect();
                        presenter.notice(&format!("{} 可走: {}", from, cells.join(" ")));
                    }
                    Err(err) => presenter.notice(&err.to_string()),
                }
                Vec::new()
            }
            Command::Board => {
                match self.replica.as_ref() {
                    Some(replica) => presenter.refresh(replica, self.perspective()),
                    None => presenter.notice(&PeerError::NoGame.to_string()),
                }
                Vec::new()
            }
            Command::List => vec![ClientMessage::ListRooms],
            Command::Create { color } => vec![ClientMessage::CreateRoom {
                preferred_color: color,
            }],
            Command::Join { room_id } => vec![ClientMessage::JoinRoom { room_id }],
            Command::Leave => {
                self.leave_room();
                vec![ClientMessage::LeaveRoom]
            }
            Command::Resign => vec![ClientMessage::Resign],
            Command::Help => {
                presenter.notice(Command::help());
                Vec::new()
            }
            Command::Quit => Vec::new(),
        }
    }

    /// 构造走棋请求，先在副本上做一次预检查
    pub fn move_request(&self, from: Cell, to: Cell) -> Result<ClientMessage, PeerError> {
        let (replica, color) = self.game()?;
        if replica.result().is_some() {
            return Err(PeerError::GameOver);
        }
        if !replica.is_turn_of(color) {
            return Err(PeerError::NotYourTurn);
        }

        let piece = replica
            .board()
            .occupant_at(from)
            .ok_or(PeerError::EmptyCell(from))?;
        if piece.color != color {
            return Err(PeerError::NotYourPiece(from));
        }
        if !replica.move_set(piece.id)?.allows(replica.board(), to) {
            return Err(PeerError::Unreachable { from, to });
        }

        Ok(ClientMessage::MakeMove {
            piece: piece.id,
            target: to,
        })
    }

    /// 某个棋子的可走位置
    pub fn targets(&self, from: Cell) -> Result<Vec<Cell>, PeerError> {
        let (replica, _) = self.game()?;
        let piece = replica
            .board()
            .occupant_at(from)
            .ok_or(PeerError::EmptyCell(from))?;
        let set = replica.move_set(piece.id)?;
        Ok(set.destinations(replica.board()).into_iter().collect())
    }

    /// 断线后用于恢复座位的请求（对局仍在进行时）
    pub fn reconnect_request(&self) -> Option<ClientMessage> {
        let replica = self.replica.as_ref()?;
        if replica.result().is_some() {
            return None;
        }
        Some(ClientMessage::Reconnect {
            player_id: self.player_id?,
            room_id: self.room_id?,
        })
    }

    /// 离开房间后清空对局状态
    pub fn leave_room(&mut self) {
        self.room_id = None;
        self.color = None;
        self.replica = None;
        self.resyncing = false;
    }

    pub fn player_id(&self) -> Option<PlayerId> {
        self.player_id
    }

    pub fn room_id(&self) -> Option<RoomId> {
        self.room_id
    }

    pub fn color(&self) -> Option<Color> {
        self.color
    }

    pub fn replica(&self) -> Option<&Replica> {
        self.replica.as_ref()
    }

    pub fn perspective(&self) -> Color {
        self.color.unwrap_or(Color::White)
    }

    fn game(&self) -> Result<(&Replica, Color), PeerError> {
        match (self.replica.as_ref(), self.color) {
            (Some(replica), Some(color)) => Ok((replica, color)),
            _ => Err(PeerError::NoGame),
        }
    }
}

pub fn color_name(color: Color) -> &'static str {
    match color {
        Color::White => "白方",
        Color::Black => "黑方",
    }
}
