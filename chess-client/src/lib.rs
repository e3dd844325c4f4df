//! 国际象棋终端客户端
//!
//! 非权威参与方：连接中继服务器，按服务器广播的事件维护本地副本，
//! 从标准输入读取命令。

pub mod display;
pub mod input;
pub mod network;
pub mod peer;
pub mod settings;

pub use display::TextPresenter;
pub use input::{Command, InputError};
pub use network::ServerLink;
pub use peer::{Peer, PeerError, Presenter};
pub use settings::ClientSettings;
