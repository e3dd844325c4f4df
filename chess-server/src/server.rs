//! 服务器主逻辑

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};

use protocol::{
    Cell, ClientMessage, Color, Connection, ErrorCode, Listener, MoveRequest, PieceId, PlayerId,
    ProtocolError, RoomId, RoomInfo, RoomState, ServerMessage, TcpConnection, TcpListener,
};

use crate::config::ServerConfig;
use crate::player::{PlayerManager, PlayerStatus};
use crate::relay::RoomRelay;
use crate::room::RoomManager;

/// 服务器状态
pub struct ServerState {
    pub config: ServerConfig,
    pub players: PlayerManager,
    pub rooms: RoomManager,
    /// 玩家 ID -> 消息发送通道
    pub connections: HashMap<PlayerId, mpsc::Sender<ServerMessage>>,
    /// 断线玩家的超时时间
    pub disconnect_timeouts: HashMap<PlayerId, Instant>,
    /// 当前 TCP 连接数（含未登录的）
    pub active_connections: usize,
}

impl ServerState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            players: PlayerManager::new(),
            rooms: RoomManager::new(),
            connections: HashMap::new(),
            disconnect_timeouts: HashMap::new(),
            active_connections: 0,
        }
    }

    /// 发送消息给玩家，不等待队列空位
    pub fn send_to_player(&self, player_id: PlayerId, msg: ServerMessage) {
        if let Some(tx) = self.connections.get(&player_id) {
            if tx.try_send(msg).is_err() {
                warn!("无法发送消息给玩家 {}", player_id);
            }
        }
    }

    /// 广播消息给房间内所有玩家
    pub fn broadcast_to_room(&self, room_id: RoomId, msg: ServerMessage) {
        if let Some(room) = self.rooms.get(room_id) {
            for player_id in room.players() {
                self.send_to_player(player_id, msg.clone());
            }
        }
    }

    /// 房间内在线玩家组成的中继
    pub fn relay_for(&self, room_id: RoomId) -> RoomRelay {
        let peers = self
            .rooms
            .get(room_id)
            .map(|room| {
                room.players()
                    .filter_map(|id| self.connections.get(&id).map(|tx| (id, tx.clone())))
                    .collect()
            })
            .unwrap_or_default();
        RoomRelay::new(peers)
    }

    fn nickname_or_default(&self, player_id: Option<PlayerId>) -> String {
        player_id
            .and_then(|id| self.players.nickname(id))
            .unwrap_or("玩家")
            .to_string()
    }
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}

/// 一个连接的上下文
pub struct ClientContext {
    /// 登录或重连后才有
    pub player_id: Option<PlayerId>,
    pub tx: mpsc::Sender<ServerMessage>,
}

impl ClientContext {
    pub fn new(tx: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            player_id: None,
            tx,
        }
    }
}

/// 待发送的消息
struct PendingMessages {
    messages: Vec<(PlayerId, ServerMessage)>,
    broadcasts: Vec<(RoomId, ServerMessage)>,
}

impl PendingMessages {
    fn new() -> Self {
        Self {
            messages: Vec::new(),
            broadcasts: Vec::new(),
        }
    }

    fn send(&mut self, player_id: PlayerId, msg: ServerMessage) {
        self.messages.push((player_id, msg));
    }

    fn broadcast(&mut self, room_id: RoomId, msg: ServerMessage) {
        self.broadcasts.push((room_id, msg));
    }

    fn flush(self, state: &ServerState) {
        for (player_id, msg) in self.messages {
            state.send_to_player(player_id, msg);
        }
        for (room_id, msg) in self.broadcasts {
            state.broadcast_to_room(room_id, msg);
        }
    }
}

/// 消息处理器
pub struct MessageHandler;

impl MessageHandler {
    /// 处理客户端消息，返回值只发给请求方
    pub async fn handle(
        state: &mut ServerState,
        ctx: &mut ClientContext,
        msg: ClientMessage,
    ) -> Option<ServerMessage> {
        let mut pending = PendingMessages::new();

        let result = match msg {
            ClientMessage::Login { nickname } => Self::handle_login(state, ctx, nickname),
            ClientMessage::Reconnect { player_id, room_id } => {
                Self::handle_reconnect(state, ctx, &mut pending, player_id, room_id)
            }
            ClientMessage::Ping => Some(ServerMessage::Pong),
            msg => match ctx.player_id {
                None => Some(ServerMessage::error(ErrorCode::NotLoggedIn, "尚未登录")),
                Some(player_id) => {
                    Self::handle_in_lobby(state, &mut pending, player_id, msg).await
                }
            },
        };

        // 发送待发送的消息
        pending.flush(state);

        result
    }

    /// 登录后才能处理的消息
    async fn handle_in_lobby(
        state: &mut ServerState,
        pending: &mut PendingMessages,
        player_id: PlayerId,
        msg: ClientMessage,
    ) -> Option<ServerMessage> {
        match msg {
            ClientMessage::CreateRoom { preferred_color } => {
                Self::handle_create_room(state, player_id, preferred_color)
            }
            ClientMessage::JoinRoom { room_id } => {
                Self::handle_join_room(state, pending, player_id, room_id)
            }
            ClientMessage::LeaveRoom => Self::handle_leave_room(state, player_id).await,
            ClientMessage::ListRooms => Self::handle_list_rooms(state),
            ClientMessage::MakeMove { piece, target } => {
                Self::handle_make_move(state, pending, player_id, piece, target).await
            }
            ClientMessage::Ack { seq } => Self::handle_ack(state, player_id, seq),
            ClientMessage::RequestSnapshot => Self::handle_request_snapshot(state, player_id),
            ClientMessage::Resign => Self::handle_resign(state, player_id).await,
            ClientMessage::Login { .. } | ClientMessage::Reconnect { .. } => Some(
                ServerMessage::error(ErrorCode::AlreadyLoggedIn, "当前连接已登录"),
            ),
            ClientMessage::Ping => Some(ServerMessage::Pong),
        }
    }

    /// 处理登录
    fn handle_login(
        state: &mut ServerState,
        ctx: &mut ClientContext,
        nickname: String,
    ) -> Option<ServerMessage> {
        if ctx.player_id.is_some() {
            return Some(ServerMessage::error(
                ErrorCode::AlreadyLoggedIn,
                "当前连接已登录",
            ));
        }

        match state.players.login(&nickname) {
            Ok(player_id) => {
                info!("玩家 {} 登录: {}", player_id, nickname.trim());
                ctx.player_id = Some(player_id);
                state.connections.insert(player_id, ctx.tx.clone());
                Some(ServerMessage::LoginSuccess { player_id })
            }
            Err(err) => {
                let code = match err {
                    ProtocolError::NicknameOccupied => ErrorCode::NicknameOccupied,
                    _ => ErrorCode::InvalidNickname,
                };
                Some(ServerMessage::error(code, err.to_string()))
            }
        }
    }

    /// 处理重连
    fn handle_reconnect(
        state: &mut ServerState,
        ctx: &mut ClientContext,
        pending: &mut PendingMessages,
        player_id: PlayerId,
        room_id: RoomId,
    ) -> Option<ServerMessage> {
        if ctx.player_id.is_some() {
            return Some(ServerMessage::error(
                ErrorCode::AlreadyLoggedIn,
                "当前连接已登录",
            ));
        }

        // 只有断线保留座位的玩家可以重连
        match state.players.status(player_id) {
            None => {
                return Some(ServerMessage::error(
                    ErrorCode::PlayerNotFound,
                    "玩家不存在",
                ))
            }
            Some(PlayerStatus::Disconnected(r)) if r == room_id => {}
            Some(_) => {
                return Some(ServerMessage::error(
                    ErrorCode::NotInRoom,
                    "没有可恢复的对局",
                ))
            }
        }

        let Some(room) = state.rooms.get(room_id) else {
            return Some(ServerMessage::error(ErrorCode::RoomNotFound, "房间不存在"));
        };
        let Some(your_color) = room.color_of(player_id) else {
            return Some(ServerMessage::error(ErrorCode::NotInRoom, "不在该房间中"));
        };
        let snapshot = room
            .session
            .as_ref()
            .map(|s| s.snapshot())
            .unwrap_or_default();
        let opponent_id = room.opponent_of(player_id);

        // 恢复玩家状态
        state.players.reconnect(player_id);
        state.disconnect_timeouts.remove(&player_id);
        state.connections.insert(player_id, ctx.tx.clone());
        ctx.player_id = Some(player_id);
        info!("玩家 {} 重连到房间 {}", player_id, room_id);

        // 通知对手
        if let Some(opponent_id) = opponent_id {
            pending.send(opponent_id, ServerMessage::OpponentReconnected);
        }

        Some(ServerMessage::ReconnectSuccess {
            room_id,
            your_color,
            snapshot,
        })
    }

    /// 处理创建房间
    fn handle_create_room(
        state: &mut ServerState,
        player_id: PlayerId,
        preferred_color: Option<Color>,
    ) -> Option<ServerMessage> {
        // 检查玩家是否已在房间中
        if !matches!(state.players.status(player_id), Some(PlayerStatus::Online)) {
            return Some(ServerMessage::error(ErrorCode::AlreadyInRoom, "已在房间中"));
        }

        let room_id = state.rooms.create();
        let room = state.rooms.get_mut(room_id)?;
        let your_color = room.add_player(player_id, preferred_color)?;
        state
            .players
            .set_status(player_id, PlayerStatus::InRoom(room_id));
        info!("玩家 {} 创建房间 {}，执{:?}", player_id, room_id, your_color);

        Some(ServerMessage::RoomCreated {
            room_id,
            your_color,
        })
    }

    /// 处理加入房间
    fn handle_join_room(
        state: &mut ServerState,
        pending: &mut PendingMessages,
        player_id: PlayerId,
        room_id: RoomId,
    ) -> Option<ServerMessage> {
        // 检查玩家是否已在房间中
        if !matches!(state.players.status(player_id), Some(PlayerStatus::Online)) {
            return Some(ServerMessage::error(ErrorCode::AlreadyInRoom, "已在房间中"));
        }

        // 检查房间是否存在
        let Some(room) = state.rooms.get(room_id) else {
            return Some(ServerMessage::error(ErrorCode::RoomNotFound, "房间不存在"));
        };

        // 检查房间状态
        if room.state != RoomState::Waiting {
            return Some(ServerMessage::error(ErrorCode::RoomClosed, "房间不可加入"));
        }

        // 检查房间是否已满
        if room.is_full() {
            return Some(ServerMessage::error(ErrorCode::RoomFull, "房间已满"));
        }

        let host_id = room.white_player.or(room.black_player);
        let joiner_nickname = state.nickname_or_default(Some(player_id));
        let white_name = state.nickname_or_default(room.white_player.or(Some(player_id)));
        let black_name = state.nickname_or_default(room.black_player.or(Some(player_id)));

        let king_guard = state.config.king_guard;

        // 加入房间
        let room = state.rooms.get_mut(room_id)?;
        let your_color = room.add_player(player_id, None)?;
        state
            .players
            .set_status(player_id, PlayerStatus::InRoom(room_id));
        pending.send(
            player_id,
            ServerMessage::RoomJoined {
                room_id,
                your_color,
            },
        );

        // 通知房主有人加入
        if let Some(host_id) = host_id {
            pending.send(
                host_id,
                ServerMessage::OpponentJoined {
                    nickname: joiner_nickname,
                },
            );
        }

        // 坐满即开始
        if room.is_full() {
            room.start_game(king_guard);
            let snapshot = room.session.as_ref()?.snapshot();
            info!("房间 {} 开始对局: {} 对 {}", room_id, white_name, black_name);

            for color in [Color::White, Color::Black] {
                if let Some(id) = room.player_of(color) {
                    pending.send(
                        id,
                        ServerMessage::GameStarted {
                            snapshot: snapshot.clone(),
                            your_color: color,
                            white_player: white_name.clone(),
                            black_player: black_name.clone(),
                        },
                    );
                }
            }
        }

        None
    }

    /// 处理离开房间
    async fn handle_leave_room(
        state: &mut ServerState,
        player_id: PlayerId,
    ) -> Option<ServerMessage> {
        let room_id = match Self::current_room(state, player_id) {
            Ok(room_id) => room_id,
            Err(reply) => return Some(reply),
        };

        // 游戏进行中离开视为放弃
        if state.rooms.get(room_id)?.state == RoomState::Playing {
            if let Err(err) = Self::abandon(state, room_id, player_id).await {
                warn!("房间 {} 放弃对局失败: {}", room_id, err);
            }
        }

        Self::vacate_seat(state, room_id, player_id);
        state.players.set_status(player_id, PlayerStatus::Online);
        info!("玩家 {} 离开房间 {}", player_id, room_id);

        None
    }

    /// 处理房间列表
    fn handle_list_rooms(state: &ServerState) -> Option<ServerMessage> {
        let rooms: Vec<RoomInfo> = state
            .rooms
            .list_joinable()
            .iter()
            .map(|r| {
                let white_name = r
                    .white_player
                    .and_then(|id| state.players.nickname(id).map(|s| s.to_string()));
                let black_name = r
                    .black_player
                    .and_then(|id| state.players.nickname(id).map(|s| s.to_string()));
                r.info(white_name, black_name)
            })
            .collect();

        Some(ServerMessage::RoomList { rooms })
    }

    /// 处理走棋：经会话校验后，事件由中继发给双方，拒绝只回给请求方
    async fn handle_make_move(
        state: &mut ServerState,
        pending: &mut PendingMessages,
        player_id: PlayerId,
        piece: PieceId,
        target: Cell,
    ) -> Option<ServerMessage> {
        let room_id = match Self::current_room(state, player_id) {
            Ok(room_id) => room_id,
            Err(reply) => return Some(reply),
        };
        let mut relay = state.relay_for(room_id);
        let room = state.rooms.get_mut(room_id)?;
        let Some(requester) = room.color_of(player_id) else {
            return Some(Self::not_seated(room_id, player_id));
        };
        if room.state != RoomState::Playing {
            return Some(Self::not_playing(room.state));
        }
        let Some(session) = room.session.as_mut() else {
            return Some(Self::not_playing(RoomState::Waiting));
        };

        session.enqueue(MoveRequest {
            requester,
            piece,
            target,
        });
        let processed = session.process_next(&mut relay).await?;

        match processed.outcome {
            Ok(events) => {
                debug!("房间 {} 提交 {} 个事件", room_id, events.len());
                if events.last().is_some_and(|e| e.event.is_terminal()) {
                    info!("房间 {} 对局结束: {:?}", room_id, session.coordinator().result());
                    room.finish();
                }
                None
            }
            Err(ProtocolError::Chess(err)) if err.is_fatal() => {
                error!("房间 {} 棋盘状态损坏，终止对局: {}", room_id, err);
                let snapshot = session.snapshot();
                room.finish();
                pending.broadcast(room_id, ServerMessage::Snapshot(snapshot));
                Some(ServerMessage::rejection(&err))
            }
            Err(ProtocolError::Chess(err)) => {
                debug!("玩家 {} 的走法被拒绝: {}", player_id, err);
                Some(ServerMessage::rejection(&err))
            }
            Err(ProtocolError::Undelivered { seq }) => {
                // 走法已提交，等待任意一方确认到 seq
                warn!("房间 {} 的事件未送达任何玩家，等待确认到 {}", room_id, seq);
                if session.coordinator().is_over() {
                    room.finish();
                }
                room.session
                    .as_ref()
                    .map(|s| ServerMessage::Snapshot(s.snapshot()))
            }
            Err(err) => {
                warn!("房间 {} 中继失败: {}", room_id, err);
                Some(ServerMessage::error(ErrorCode::InternalError, err.to_string()))
            }
        }
    }

    /// 处理事件确认，超出已发出序号的确认说明客户端状态不一致，回送快照
    fn handle_ack(state: &mut ServerState, player_id: PlayerId, seq: u64) -> Option<ServerMessage> {
        let room_id = match Self::current_room(state, player_id) {
            Ok(room_id) => room_id,
            Err(reply) => return Some(reply),
        };
        let room = state.rooms.get_mut(room_id)?;
        let Some(color) = room.color_of(player_id) else {
            return Some(Self::not_seated(room_id, player_id));
        };
        if room.session.is_none() {
            return Some(Self::not_playing(RoomState::Waiting));
        }

        if room.record_ack(color, seq) {
            None
        } else {
            warn!("玩家 {} 确认了未发出的序号 {}", player_id, seq);
            room.session
                .as_ref()
                .map(|s| ServerMessage::Snapshot(s.snapshot()))
        }
    }

    /// 处理快照请求
    fn handle_request_snapshot(state: &ServerState, player_id: PlayerId) -> Option<ServerMessage> {
        let room_id = match Self::current_room(state, player_id) {
            Ok(room_id) => room_id,
            Err(reply) => return Some(reply),
        };
        let reply = state
            .rooms
            .get(room_id)?
            .session
            .as_ref()
            .map(|s| ServerMessage::Snapshot(s.snapshot()))
            .unwrap_or_else(|| Self::not_playing(RoomState::Waiting));
        Some(reply)
    }

    /// 处理认输
    async fn handle_resign(state: &mut ServerState, player_id: PlayerId) -> Option<ServerMessage> {
        let room_id = match Self::current_room(state, player_id) {
            Ok(room_id) => room_id,
            Err(reply) => return Some(reply),
        };
        let room_state = state.rooms.get(room_id)?.state;
        if room_state != RoomState::Playing {
            return Some(Self::not_playing(room_state));
        }

        match Self::abandon(state, room_id, player_id).await {
            Ok(()) => None,
            Err(ProtocolError::Chess(err)) => Some(ServerMessage::rejection(&err)),
            Err(err) => Some(ServerMessage::error(ErrorCode::InternalError, err.to_string())),
        }
    }

    /// 处理玩家断线
    pub fn handle_disconnect(state: &mut ServerState, ctx: &ClientContext) {
        let Some(player_id) = ctx.player_id else {
            return;
        };

        // 已被新连接接管
        let same_channel = state
            .connections
            .get(&player_id)
            .map(|tx| tx.same_channel(&ctx.tx));
        match same_channel {
            Some(true) => {
                state.connections.remove(&player_id);
            }
            Some(false) => return,
            None => {}
        }

        let mut pending = PendingMessages::new();

        match state.players.status(player_id) {
            Some(PlayerStatus::InRoom(room_id))
                if state
                    .rooms
                    .get(room_id)
                    .is_some_and(|r| r.state == RoomState::Playing) =>
            {
                // 对局中断线保留座位
                state.players.disconnect(player_id);
                let disconnect_timeout = state.config.disconnect_timeout();
                state
                    .disconnect_timeouts
                    .insert(player_id, Instant::now() + disconnect_timeout);
                info!("玩家 {} 断线，保留座位 {:?}", player_id, disconnect_timeout);

                if let Some(opponent_id) = state.rooms.get(room_id).and_then(|r| r.opponent_of(player_id)) {
                    pending.send(
                        opponent_id,
                        ServerMessage::OpponentDisconnected {
                            timeout_secs: disconnect_timeout.as_secs() as u32,
                        },
                    );
                }
            }
            Some(PlayerStatus::InRoom(room_id)) => {
                Self::vacate_seat(state, room_id, player_id);
                state.players.remove(player_id);
                info!("玩家 {} 离线", player_id);
            }
            _ => {
                state.players.remove(player_id);
                info!("玩家 {} 离线", player_id);
            }
        }

        pending.flush(state);
    }

    /// 检查断线超时，超时者判负并移除
    pub async fn check_disconnect_timeouts(state: &mut ServerState) {
        let now = Instant::now();
        let timed_out: Vec<PlayerId> = state
            .disconnect_timeouts
            .iter()
            .filter(|(_, deadline)| now >= **deadline)
            .map(|(&player_id, _)| player_id)
            .collect();

        for player_id in timed_out {
            state.disconnect_timeouts.remove(&player_id);
            info!("玩家 {} 断线超时", player_id);

            if let Some(PlayerStatus::Disconnected(room_id)) = state.players.status(player_id) {
                let playing = state
                    .rooms
                    .get(room_id)
                    .is_some_and(|r| r.state == RoomState::Playing);
                if playing {
                    if let Err(err) = Self::abandon(state, room_id, player_id).await {
                        warn!("房间 {} 超时判负失败: {}", room_id, err);
                    }
                }
                Self::vacate_seat(state, room_id, player_id);
            }

            state.players.remove(player_id);
        }
    }

    /// `player_id` 放弃当前对局：广播终局事件并结束房间
    async fn abandon(
        state: &mut ServerState,
        room_id: RoomId,
        player_id: PlayerId,
    ) -> Result<(), ProtocolError> {
        let mut relay = state.relay_for(room_id);
        let Some(room) = state.rooms.get_mut(room_id) else {
            return Ok(());
        };
        let (Some(color), Some(session)) = (room.color_of(player_id), room.session.as_mut()) else {
            return Ok(());
        };

        session.abandon(color, &mut relay).await?;
        room.finish();
        info!("房间 {} 对局结束，{:?} 放弃", room_id, color);
        Ok(())
    }

    /// 让出座位，空房间随即销毁
    fn vacate_seat(state: &mut ServerState, room_id: RoomId, player_id: PlayerId) {
        if let Some(room) = state.rooms.get_mut(room_id) {
            room.remove_player(player_id);
            if room.is_empty() {
                state.rooms.remove(room_id);
                debug!("房间 {} 已销毁", room_id);
            }
        }
    }

    fn current_room(state: &ServerState, player_id: PlayerId) -> Result<RoomId, ServerMessage> {
        match state.players.status(player_id) {
            Some(PlayerStatus::InRoom(room_id)) => Ok(room_id),
            _ => Err(ServerMessage::error(ErrorCode::NotInRoom, "不在房间中")),
        }
    }

    /// 玩家状态指向房间，但房间里没有他的座位
    fn not_seated(room_id: RoomId, player_id: PlayerId) -> ServerMessage {
        warn!("玩家 {} 不在房间 {} 的座位上", player_id, room_id);
        ServerMessage::error(ErrorCode::NotInRoom, "不在房间中")
    }

    fn not_playing(room_state: RoomState) -> ServerMessage {
        match room_state {
            RoomState::Finished => ServerMessage::error(ErrorCode::GameAlreadyOver, "游戏已结束"),
            _ => ServerMessage::error(ErrorCode::GameNotStarted, "游戏未开始"),
        }
    }
}

/// 共享的服务器状态
pub type SharedState = Arc<Mutex<ServerState>>;

/// 中继服务器
pub struct Server {
    listener: TcpListener,
    state: SharedState,
}

impl Server {
    /// 绑定监听地址
    pub async fn bind(config: ServerConfig) -> anyhow::Result<Self> {
        let addr = config.network.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("无法监听 {}", addr))?;
        info!(
            "服务端监听于 {}",
            listener.local_addr().unwrap_or_else(|| addr.clone())
        );

        Ok(Self {
            listener,
            state: Arc::new(Mutex::new(ServerState::new(config))),
        })
    }

    pub fn local_addr(&self) -> Option<String> {
        self.listener.local_addr()
    }

    pub fn state(&self) -> SharedState {
        self.state.clone()
    }

    /// 接受连接，直到进程退出
    pub async fn run(mut self) -> anyhow::Result<()> {
        tokio::spawn(sweep_disconnects(self.state.clone()));

        loop {
            let conn = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!("接受连接失败: {}", e);
                    continue;
                }
            };
            let peer = conn.peer_addr().unwrap_or_else(|| "未知地址".to_string());

            let admitted = {
                let mut state = self.state.lock().await;
                if state.active_connections >= state.config.max_connections {
                    false
                } else {
                    state.active_connections += 1;
                    true
                }
            };

            if !admitted {
                warn!("连接数已满，拒绝 {}", peer);
                tokio::spawn(async move {
                    let mut conn = conn;
                    let _ = conn
                        .send(&ServerMessage::error(ErrorCode::ServerFull, "服务器已满"))
                        .await;
                });
                continue;
            }

            info!("新连接: {}", peer);
            tokio::spawn(serve_connection(conn, peer, self.state.clone()));
        }
    }
}

/// 每秒检查一次断线超时
async fn sweep_disconnects(state: SharedState) {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        ticker.tick().await;
        let mut state = state.lock().await;
        MessageHandler::check_disconnect_timeouts(&mut state).await;
    }
}

/// 单个连接：写任务发送队列中的消息，当前任务读取请求
async fn serve_connection(conn: TcpConnection, peer: String, state: SharedState) {
    let (relay_buffer, heartbeat_timeout) = {
        let state = state.lock().await;
        (state.config.relay_buffer, state.config.heartbeat_timeout())
    };

    let (mut reader, mut writer) = conn.split();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(relay_buffer);

    let writer_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = writer.write_frame(&msg).await {
                debug!("写入失败: {}", e);
                break;
            }
        }
    });

    let mut ctx = ClientContext::new(tx);
    loop {
        let msg = match timeout(heartbeat_timeout, reader.read_frame::<ClientMessage>()).await {
            Err(_) => {
                info!("{} 心跳超时", peer);
                break;
            }
            Ok(Err(ProtocolError::ConnectionClosed)) => {
                info!("{} 断开连接", peer);
                break;
            }
            Ok(Err(e)) => {
                warn!("{} 读取失败: {}", peer, e);
                break;
            }
            Ok(Ok(msg)) => msg,
        };

        let reply = {
            let mut state = state.lock().await;
            MessageHandler::handle(&mut state, &mut ctx, msg).await
        };
        if let Some(reply) = reply {
            if ctx.tx.send(reply).await.is_err() {
                break;
            }
        }
    }

    {
        let mut state = state.lock().await;
        MessageHandler::handle_disconnect(&mut state, &ctx);
        state.active_connections = state.active_connections.saturating_sub(1);
    }

    drop(ctx);
    let _ = writer_task.await;
}
