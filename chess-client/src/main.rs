use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chess_client::{ClientSettings, Command, InputError, Peer, Presenter, ServerLink, TextPresenter};
use protocol::ClientMessage;

/// 断线后的重连次数
const RECONNECT_ATTEMPTS: u32 = 5;

/// 两次重连之间的间隔
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// 国际象棋终端客户端
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// 服务器地址，例如 127.0.0.1:9527
    #[arg(short, long)]
    server: Option<String>,

    /// 昵称
    #[arg(short, long)]
    nickname: Option<String>,

    /// 把本次使用的地址和昵称写回设置文件
    #[arg(long)]
    save: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 日志写到 stderr，不打断棋盘输出
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("chess_client=warn".parse()?))
        .init();

    let cli = Cli::parse();

    let mut settings = ClientSettings::load();
    if let Some(server) = cli.server {
        settings.server_address = server;
    }
    if let Some(nickname) = cli.nickname {
        settings.nickname = nickname;
    }
    if cli.save {
        settings.save()?;
    }

    let mut link = ServerLink::connect(&settings.server_address)
        .await
        .with_context(|| format!("无法连接服务器 {}", settings.server_address))?;
    link.send(ClientMessage::Login {
        nickname: settings.nickname.clone(),
    })
    .await?;

    let mut peer = Peer::new();
    let mut presenter = TextPresenter::new(std::io::stdout());
    presenter.notice(Command::help());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match Command::parse(&line) {
                    Ok(Command::Quit) => break,
                    Ok(command) => {
                        for request in peer.command(command, &mut presenter) {
                            link.send(request).await?;
                        }
                    }
                    Err(InputError::Empty) => {}
                    Err(err) => presenter.notice(&err.to_string()),
                }
            }
            msg = link.recv() => match msg {
                Some(msg) => {
                    for reply in peer.handle(msg, &mut presenter) {
                        link.send(reply).await?;
                    }
                }
                None => {
                    presenter.notice("与服务器的连接已断开");
                    let Some(request) = peer.reconnect_request() else {
                        break;
                    };
                    link = reconnect(&settings.server_address, request).await?;
                }
            },
        }
    }

    Ok(())
}

/// 对局中断线时尝试恢复座位
async fn reconnect(addr: &str, request: ClientMessage) -> Result<ServerLink> {
    for attempt in 1..=RECONNECT_ATTEMPTS {
        tokio::time::sleep(RECONNECT_DELAY).await;
        match ServerLink::connect(addr).await {
            Ok(link) => {
                link.send(request.clone()).await?;
                return Ok(link);
            }
            Err(e) => warn!("第 {} 次重连失败: {}", attempt, e),
        }
    }
    bail!("重连失败，已尝试 {} 次", RECONNECT_ATTEMPTS)
}
