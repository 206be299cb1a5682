//! 终端对话循环
//!
//! 每行一条用户输入；主回复边生成边输出，赞助推荐作为最后一段追加。
//! 输入退出指令（默认 quit）、EOF 或 Ctrl+C 结束会话。

use anyhow::Context;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::core::{DialogueOrchestrator, Session, TurnEvent};

/// 把一个回合的事件写到终端
async fn print_events<W>(
    mut rx: mpsc::UnboundedReceiver<TurnEvent>,
    output: &mut W,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(event) = rx.recv().await {
        match event {
            TurnEvent::ReplyChunk { text } | TurnEvent::Sponsored { text } => {
                output.write_all(text.as_bytes()).await?;
                output.flush().await?;
            }
            TurnEvent::ReplyDone => {}
            TurnEvent::TurnDone => output.write_all(b"\n").await?,
        }
    }
    output.flush().await
}

/// 运行一次会话，直到退出；返回结束时的会话（便于统计）
pub async fn run_repl<R, W>(
    orchestrator: &DialogueOrchestrator,
    quit_command: &str,
    input: R,
    output: &mut W,
) -> anyhow::Result<Session>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut session = orchestrator.new_session();
    let mut lines = input.lines();
    tracing::info!(session = %session.id(), "session started");

    output
        .write_all(format!("Dynamic Ad Chat – type '{quit_command}' to exit.\n").as_bytes())
        .await?;

    loop {
        output.write_all(b"\nYou: ").await?;
        output.flush().await?;

        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read input")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        let user_input = line.trim();
        if user_input.is_empty() {
            continue;
        }
        if user_input.eq_ignore_ascii_case(quit_command) {
            break;
        }

        output.write_all(b"\nAI: ").await?;
        let (tx, rx) = mpsc::unbounded_channel();
        let session_ref = &mut session;
        let turn = async move {
            let result = orchestrator
                .process_turn(session_ref, user_input, Some(&tx))
                .await;
            drop(tx);
            result
        };
        let (result, printed) = tokio::join!(turn, print_events(rx, &mut *output));
        printed?;

        if let Err(e) = result {
            output
                .write_all(format!("\n[error] {e}\n").as_bytes())
                .await?;
        }
    }

    output.write_all(b"\n").await?;
    output.flush().await?;
    tracing::info!(session = %session.id(), turns = session.buffer().len(), "session ended");
    Ok(session)
}
