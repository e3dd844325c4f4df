//! 与服务器的连接
//!
//! 读任务把收到的消息放进队列，写任务发送请求，空闲时按心跳间隔发送 `Ping`。

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use protocol::{
    ClientMessage, Connector, ProtocolError, Result, ServerMessage, TcpConnector, HEARTBEAT_INTERVAL,
};

/// 队列长度
const QUEUE_SIZE: usize = 64;

/// 服务器连接
pub struct ServerLink {
    outbound: mpsc::Sender<ClientMessage>,
    inbound: mpsc::Receiver<ServerMessage>,
    tasks: [JoinHandle<()>; 2],
}

impl ServerLink {
    /// 连接服务器
    pub async fn connect(addr: &str) -> Result<Self> {
        Self::connect_with_heartbeat(addr, HEARTBEAT_INTERVAL).await
    }

    pub async fn connect_with_heartbeat(addr: &str, heartbeat: Duration) -> Result<Self> {
        let conn = TcpConnector.connect(addr).await?;
        let (mut reader, mut writer) = conn.split();
        info!("已连接服务器: {}", addr);

        let (inbound_tx, inbound) = mpsc::channel(QUEUE_SIZE);
        let (outbound, mut outbound_rx) = mpsc::channel::<ClientMessage>(QUEUE_SIZE);

        let read_task = tokio::spawn(async move {
            loop {
                match reader.read_frame::<ServerMessage>().await {
                    Ok(msg) => {
                        if inbound_tx.send(msg).await.is_err() {
                            break;
                        }
                    }
                    Err(ProtocolError::ConnectionClosed) => {
                        info!("服务器关闭了连接");
                        break;
                    }
                    Err(e) => {
                        warn!("接收失败: {}", e);
                        break;
                    }
                }
            }
        });

        let write_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(heartbeat);
            // 第一次 tick 立即完成
            ticker.tick().await;
            loop {
                let msg = tokio::select! {
                    msg = outbound_rx.recv() => match msg {
                        Some(msg) => msg,
                        None => break,
                    },
                    _ = ticker.tick() => ClientMessage::Ping,
                };
                if let Err(e) = writer.write_frame(&msg).await {
                    warn!("发送失败: {}", e);
                    break;
                }
                debug!("已发送 {:?}", msg);
            }
        });

        Ok(Self {
            outbound,
            inbound,
            tasks: [read_task, write_task],
        })
    }

    /// 发送请求
    pub async fn send(&self, msg: ClientMessage) -> Result<()> {
        self.outbound
            .send(msg)
            .await
            .map_err(|_| ProtocolError::ChannelClosed)
    }

    /// 接收下一条消息，连接断开后返回 `None`
    pub async fn recv(&mut self) -> Option<ServerMessage> {
        self.inbound.recv().await
    }
}

impl Drop for ServerLink {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
