//! 同步通道与对局会话
//!
//! `SyncChannel` 是权威端把已校验事件中继给所有参与方的最小接口；
//! `GameSession` 在协调器前面加一个命令队列，逐个处理请求，
//! 广播成功后用中继返回的序号确认。

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::coordinator::{GameSnapshot, MoveRequest, TurnCoordinator};
use crate::error::{ProtocolError, Result};
use crate::event::SequencedEvent;
use crate::piece::Color;

/// 同步通道
#[async_trait]
pub trait SyncChannel: Send {
    /// 广播一批事件，返回中继已确认的最后一个序号
    async fn broadcast(&mut self, batch: &[SequencedEvent]) -> Result<u64>;
}

#[async_trait]
impl SyncChannel for mpsc::Sender<SequencedEvent> {
    async fn broadcast(&mut self, batch: &[SequencedEvent]) -> Result<u64> {
        let mut last = 0;
        for event in batch {
            self.send(event.clone())
                .await
                .map_err(|_| ProtocolError::ChannelClosed)?;
            last = event.seq;
        }
        Ok(last)
    }
}

/// 队列中请求的编号
pub type Ticket = u64;

/// 一次请求的处理结果
#[derive(Debug)]
pub struct Processed {
    pub ticket: Ticket,
    pub request: MoveRequest,
    /// 成功时为已广播并确认的事件；被拒绝的请求不会广播
    pub outcome: Result<Vec<SequencedEvent>>,
}

/// 对局会话：协调器 + 命令队列
#[derive(Debug)]
pub struct GameSession {
    coordinator: TurnCoordinator,
    queue: VecDeque<(Ticket, MoveRequest)>,
    next_ticket: Ticket,
}

impl GameSession {
    pub fn new(coordinator: TurnCoordinator) -> Self {
        Self {
            coordinator,
            queue: VecDeque::new(),
            next_ticket: 1,
        }
    }

    /// 请求入队，返回可用于撤回的编号
    pub fn enqueue(&mut self, request: MoveRequest) -> Ticket {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.queue.push_back((ticket, request));
        ticket
    }

    /// 撤回尚未开始校验的请求
    pub fn withdraw(&mut self, ticket: Ticket) -> bool {
        let before = self.queue.len();
        self.queue.retain(|(t, _)| *t != ticket);
        self.queue.len() != before
    }

    /// 撤回某一方的全部排队请求
    pub fn withdraw_all(&mut self, requester: Color) -> usize {
        let before = self.queue.len();
        self.queue.retain(|(_, r)| r.requester != requester);
        before - self.queue.len()
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// 处理队首请求：校验、应用、广播，然后用中继的确认推进协调器
    ///
    /// 队列为空时返回 `None`。
    pub async fn process_next<C>(&mut self, channel: &mut C) -> Option<Processed>
    where
        C: SyncChannel + ?Sized,
    {
        let (ticket, request) = self.queue.pop_front()?;
        let outcome = self.commit(request, channel).await;
        Some(Processed {
            ticket,
            request,
            outcome,
        })
    }

    async fn commit<C>(&mut self, request: MoveRequest, channel: &mut C) -> Result<Vec<SequencedEvent>>
    where
        C: SyncChannel + ?Sized,
    {
        let events = self.coordinator.request_move(request)?;
        let acked = channel.broadcast(&events).await?;
        self.coordinator.acknowledge(acked)?;
        debug!("中继已确认到序号 {}", acked);
        Ok(events)
    }

    /// 重新确认滞留在 `AwaitingAck` 的提交（上次广播失败后使用）
    pub fn acknowledge(&mut self, seq: u64) -> Result<()> {
        Ok(self.coordinator.acknowledge(seq)?)
    }

    /// `by` 一方放弃，清空队列并广播终局事件
    pub async fn abandon<C>(&mut self, by: Color, channel: &mut C) -> Result<Vec<SequencedEvent>>
    where
        C: SyncChannel + ?Sized,
    {
        self.queue.clear();
        let events = self.coordinator.abandon(by)?;
        if let Err(err) = channel.broadcast(&events).await {
            // 终局不需要确认，结果已经记录
            warn!("终局事件中继失败: {}", err);
        }
        Ok(events)
    }

    /// 用于重连或序号断档后的重新同步
    pub fn snapshot(&self) -> GameSnapshot {
        self.coordinator.snapshot()
    }

    pub fn coordinator(&self) -> &TurnCoordinator {
        &self.coordinator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::{GameResult, Phase, WinReason};
    use crate::error::ChessError;
    use crate::event::GameEvent;
    use crate::piece::Cell;

    fn cell(s: &str) -> Cell {
        s.parse().unwrap()
    }

    fn request(session: &GameSession, requester: Color, from: &str, to: &str) -> MoveRequest {
        MoveRequest {
            requester,
            piece: session.coordinator().board().occupant_at(cell(from)).unwrap().id,
            target: cell(to),
        }
    }

    /// 永远确认错误序号的通道
    struct LyingChannel;

    #[async_trait]
    impl SyncChannel for LyingChannel {
        async fn broadcast(&mut self, _batch: &[SequencedEvent]) -> Result<u64> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_process_broadcasts_and_acknowledges() {
        let mut session = GameSession::new(TurnCoordinator::new());
        let (mut tx, mut rx) = mpsc::channel(16);

        let req = request(&session, Color::White, "e2", "e4");
        let ticket = session.enqueue(req);
        let processed = session.process_next(&mut tx).await.unwrap();

        assert_eq!(processed.ticket, ticket);
        let events = processed.outcome.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(rx.recv().await.unwrap(), events[0]);
        assert_eq!(rx.recv().await.unwrap(), events[1]);
        assert_eq!(
            session.coordinator().phase(),
            Phase::WaitingForMove(Color::Black)
        );
    }

    #[tokio::test]
    async fn test_rejection_is_not_broadcast() {
        let mut session = GameSession::new(TurnCoordinator::new());
        let (mut tx, mut rx) = mpsc::channel(16);

        let req = request(&session, Color::Black, "e7", "e5");
        session.enqueue(req);
        let processed = session.process_next(&mut tx).await.unwrap();

        assert!(matches!(
            processed.outcome,
            Err(ProtocolError::Chess(ChessError::NotYourTurn))
        ));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_queue_is_processed_in_order() {
        let mut session = GameSession::new(TurnCoordinator::new());
        let (mut tx, _rx) = mpsc::channel(16);

        session.enqueue(request(&session, Color::White, "e2", "e4"));
        session.enqueue(request(&session, Color::Black, "e7", "e5"));
        assert_eq!(session.pending(), 2);

        assert!(session.process_next(&mut tx).await.unwrap().outcome.is_ok());
        assert!(session.process_next(&mut tx).await.unwrap().outcome.is_ok());
        assert!(session.process_next(&mut tx).await.is_none());
        assert_eq!(session.coordinator().seq(), 4);
    }

    #[tokio::test]
    async fn test_withdraw_before_validation() {
        let mut session = GameSession::new(TurnCoordinator::new());
        let (mut tx, _rx) = mpsc::channel(16);

        let first = session.enqueue(request(&session, Color::White, "e2", "e4"));
        let second = session.enqueue(request(&session, Color::White, "d2", "d4"));
        assert!(session.withdraw(second));
        assert!(!session.withdraw(second));

        session.process_next(&mut tx).await.unwrap();
        // 已处理的请求不能再撤回
        assert!(!session.withdraw(first));
        assert_eq!(session.pending(), 0);
    }

    #[tokio::test]
    async fn test_closed_channel_keeps_move_in_flight() {
        let mut session = GameSession::new(TurnCoordinator::new());
        let (mut tx, rx) = mpsc::channel(16);
        drop(rx);

        session.enqueue(request(&session, Color::White, "e2", "e4"));
        let processed = session.process_next(&mut tx).await.unwrap();
        assert!(matches!(processed.outcome, Err(ProtocolError::ChannelClosed)));
        assert_eq!(
            session.coordinator().phase(),
            Phase::AwaitingAck { through: 2 }
        );

        session.acknowledge(2).unwrap();
        assert_eq!(
            session.coordinator().phase(),
            Phase::WaitingForMove(Color::Black)
        );
    }

    #[tokio::test]
    async fn test_wrong_acknowledgment() {
        let mut session = GameSession::new(TurnCoordinator::new());

        session.enqueue(request(&session, Color::White, "e2", "e4"));
        let processed = session.process_next(&mut LyingChannel).await.unwrap();
        assert!(matches!(
            processed.outcome,
            Err(ProtocolError::Chess(ChessError::AckMismatch { expected: 2, actual: 0 }))
        ));
    }

    #[tokio::test]
    async fn test_abandon_clears_queue() {
        let mut session = GameSession::new(TurnCoordinator::new());
        let (mut tx, mut rx) = mpsc::channel(16);

        session.enqueue(request(&session, Color::White, "e2", "e4"));
        let events = session.abandon(Color::White, &mut tx).await.unwrap();

        assert_eq!(session.pending(), 0);
        assert_eq!(events[0].event, GameEvent::Abandoned { by: Color::White });
        assert_eq!(rx.recv().await.unwrap().seq, 1);
        assert_eq!(
            session.snapshot().result,
            Some(GameResult::BlackWin(WinReason::Abandoned))
        );
    }
}
