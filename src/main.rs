//! Coach - 教练型对话智能体
//!
//! 入口：初始化日志、创建编排器，在终端里跑一个单会话的对话循环。
//! 身份可通过环境变量 COACH_USER_ID / COACH_ACCESS_TOKEN 提供，否则只能使用无身份工具。

use anyhow::Context;
use coach::core::{create_orchestrator, Credential, TurnRequest};
use coach::observability;
use coach::pipeline::TurnEvent;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

const HELP: &str = "Commands: /history, /clear, /quit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(std::path::PathBuf::from);
    let orchestrator = create_orchestrator(config_path)
        .await
        .context("Failed to create orchestrator")?;

    let session_id = std::env::var("COACH_SESSION_ID")
        .unwrap_or_else(|_| format!("cli-{}", uuid::Uuid::new_v4()));
    let identity = match (
        std::env::var("COACH_USER_ID"),
        std::env::var("COACH_ACCESS_TOKEN"),
    ) {
        (Ok(user_id), Ok(token)) => Some((user_id, Credential::new(token))),
        _ => None,
    };
    tracing::info!(session_id = %session_id, has_identity = identity.is_some(), "session started");

    let mut stdout = tokio::io::stdout();
    stdout.write_all(format!("{}\n", HELP).as_bytes()).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "/quit" | "/exit" => break,
            "/clear" => {
                orchestrator.clear_history(&session_id).await?;
                stdout.write_all(b"(history cleared)\n").await?;
                continue;
            }
            "/history" => {
                for m in orchestrator.history(&session_id).await? {
                    stdout
                        .write_all(format!("[{:?}] {}\n", m.role, m.content).as_bytes())
                        .await?;
                }
                continue;
            }
            _ => {}
        }

        let mut request = TurnRequest::user(&session_id, input);
        if let Some((user_id, token)) = &identity {
            request = request.with_identity(user_id.clone(), token.clone());
        }

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let turn = orchestrator.respond_stream(request, tx, cancel);
        tokio::pin!(turn);

        let result = loop {
            tokio::select! {
                result = &mut turn => break result,
                Some(ev) = rx.recv() => print_event(&mut stdout, ev).await?,
            }
        };
        while let Ok(ev) = rx.try_recv() {
            print_event(&mut stdout, ev).await?;
        }

        match result {
            Ok(outcome) => {
                if let Some(payload) = outcome.payload {
                    let json = serde_json::to_string_pretty(&payload)?;
                    stdout
                        .write_all(format!("\n[notification payload]\n{}\n", json).as_bytes())
                        .await?;
                }
            }
            Err(failure) => {
                stdout
                    .write_all(format!("{}\n", failure.user_message()).as_bytes())
                    .await?;
            }
        }
    }

    Ok(())
}

async fn print_event(stdout: &mut tokio::io::Stdout, ev: TurnEvent) -> anyhow::Result<()> {
    match ev {
        TurnEvent::ToolCall { tool, .. } => {
            stdout.write_all(format!("  · {}\n", tool).as_bytes()).await?
        }
        TurnEvent::Token { text } => stdout.write_all(text.as_bytes()).await?,
        TurnEvent::Done { .. } => stdout.write_all(b"\n").await?,
        TurnEvent::StageEntered { .. } | TurnEvent::Observation { .. } | TurnEvent::Error { .. } => {}
    }
    stdout.flush().await?;
    Ok(())
}
