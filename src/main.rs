//! Concierge 命令行入口
//!
//! 带参数时处理一条消息后退出；否则进入交互模式，逐行读取 stdin。Ctrl-C 取消当前请求并退出。

use anyhow::Context;
use concierge::config::{load_config, AppConfig};
use concierge::memory::ConversationMemory;
use concierge::{
    create_agent_components, observability, process_message, AgentComponents, AgentError,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let loaded = load_config(None);
    let level = loaded
        .as_ref()
        .map(|c| c.app.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());
    observability::init(&level);

    let cfg = loaded.unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let components = create_agent_components(&cfg);
    let mut conversation = ConversationMemory::new(components.max_context_turns);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let args: Vec<String> = std::env::args().skip(1).collect();
    if !args.is_empty() {
        return answer(&components, &mut conversation, &args.join(" "), &cancel).await;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = cancel.cancelled() => None,
        };
        let Some(line) = line else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input, "exit" | "quit") {
            break;
        }

        match answer(&components, &mut conversation, input, &cancel).await {
            Ok(()) => {}
            Err(e) if cancel.is_cancelled() => {
                tracing::info!("{}", e);
                break;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

async fn answer(
    components: &AgentComponents,
    conversation: &mut ConversationMemory,
    input: &str,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    match process_message(components, conversation, input, cancel).await {
        Ok(reply) => {
            tracing::debug!(history = ?reply.history, "reply ready");
            println!("{}", reply.text());
            Ok(())
        }
        Err(AgentError::Cancelled) => anyhow::bail!("Request cancelled"),
        Err(e) => Err(e).context("Request failed"),
    }
}
