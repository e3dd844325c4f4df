//! 国际象棋中继服务端
//!
//! 包含:
//! - 服务端配置
//! - 玩家管理
//! - 房间系统
//! - 房间中继（权威事件广播）
//! - 连接处理与断线超时

pub mod config;
pub mod player;
pub mod relay;
pub mod room;
pub mod server;

pub use config::ServerConfig;
pub use player::{Player, PlayerManager, PlayerStatus};
pub use relay::RoomRelay;
pub use room::{Room, RoomManager};
pub use server::{ClientContext, MessageHandler, Server, ServerState, SharedState};
