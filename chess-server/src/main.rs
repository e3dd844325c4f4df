use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chess_server::{Server, ServerConfig};

/// 国际象棋中继服务端
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// 配置文件路径（JSON）
    #[arg(short, long, default_value = "chess-server.json")]
    config: PathBuf,

    /// 覆盖监听地址，例如 0.0.0.0:9527
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("chess_server=debug".parse()?))
        .init();

    let cli = Cli::parse();

    let mut config = ServerConfig::load(&cli.config)?;
    if let Some(bind) = &cli.bind {
        config.override_bind(bind)?;
    }

    info!("国际象棋服务端启动中...");

    Server::bind(config).await?.run().await
}
