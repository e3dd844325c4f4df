//! 房间中继
//!
//! 把会话提交的事件包装成 `ServerMessage::Event` 推给房间内在线的玩家。
//! 发送不等待：队列满或已关闭的连接会被跳过，对方之后会因序号断档而请求快照。
//! 只要有一方完整收到这批事件就确认；没有任何一方收到时返回 `Undelivered`，
//! 提交留在待确认状态，直到有玩家确认到该序号。

use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;

use protocol::{PlayerId, ProtocolError, Result, SequencedEvent, ServerMessage, SyncChannel};

/// 一个房间的中继
pub struct RoomRelay {
    peers: Vec<(PlayerId, mpsc::Sender<ServerMessage>)>,
}

impl RoomRelay {
    pub fn new(peers: Vec<(PlayerId, mpsc::Sender<ServerMessage>)>) -> Self {
        Self { peers }
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}

#[async_trait]
impl SyncChannel for RoomRelay {
    async fn broadcast(&mut self, batch: &[SequencedEvent]) -> Result<u64> {
        let last = batch.last().map_or(0, |e| e.seq);
        let mut delivered = 0;
        for (player_id, tx) in &self.peers {
            let mut complete = true;
            for event in batch {
                match tx.try_send(ServerMessage::Event(event.clone())) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        warn!("玩家 {} 发送队列已满，丢弃事件 {} 起", player_id, event.seq);
                        complete = false;
                        break;
                    }
                    Err(TrySendError::Closed(_)) => {
                        warn!("玩家 {} 连接已关闭，丢弃事件 {} 起", player_id, event.seq);
                        complete = false;
                        break;
                    }
                }
            }
            if complete {
                delivered += 1;
            }
        }

        if delivered == 0 {
            return Err(ProtocolError::Undelivered { seq: last });
        }
        Ok(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{Color, GameEvent};

    fn turn_changed(seq: u64) -> SequencedEvent {
        SequencedEvent {
            seq,
            event: GameEvent::TurnChanged {
                active: Color::Black,
            },
        }
    }

    #[tokio::test]
    async fn test_relay_to_all_peers() {
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        let mut relay = RoomRelay::new(vec![(1, tx1), (2, tx2)]);

        let acked = relay
            .broadcast(&[turn_changed(1), turn_changed(2)])
            .await
            .unwrap();

        assert_eq!(acked, 2);
        for rx in [&mut rx1, &mut rx2] {
            assert_eq!(rx.recv().await.unwrap(), ServerMessage::Event(turn_changed(1)));
            assert_eq!(rx.recv().await.unwrap(), ServerMessage::Event(turn_changed(2)));
        }
    }

    #[tokio::test]
    async fn test_slow_peer_does_not_block() {
        let (tx, mut rx) = mpsc::channel(8);
        let (slow_tx, mut slow_rx) = mpsc::channel(1);
        let (closed_tx, closed_rx) = mpsc::channel(8);
        drop(closed_rx);
        let mut relay = RoomRelay::new(vec![(1, slow_tx), (2, closed_tx), (3, tx)]);

        let acked = relay
            .broadcast(&[turn_changed(1), turn_changed(2), turn_changed(3)])
            .await
            .unwrap();

        assert_eq!(acked, 3);
        assert_eq!(slow_rx.recv().await.unwrap(), ServerMessage::Event(turn_changed(1)));
        assert!(slow_rx.try_recv().is_err());
        for seq in 1..=3 {
            assert_eq!(rx.recv().await.unwrap(), ServerMessage::Event(turn_changed(seq)));
        }
    }

    #[tokio::test]
    async fn test_undelivered_batch_is_not_acknowledged() {
        let (slow_tx, _slow_rx) = mpsc::channel(1);
        let (closed_tx, closed_rx) = mpsc::channel(8);
        drop(closed_rx);
        let mut relay = RoomRelay::new(vec![(1, slow_tx), (2, closed_tx)]);

        let err = relay
            .broadcast(&[turn_changed(1), turn_changed(2)])
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Undelivered { seq: 2 }));

        let mut empty = RoomRelay::new(Vec::new());
        assert!(matches!(
            empty.broadcast(&[turn_changed(1)]).await,
            Err(ProtocolError::Undelivered { seq: 1 })
        ));
    }
}
