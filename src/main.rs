//! adchat - 穿插赞助商品推荐的对话 Agent
//!
//! 入口：加载 .env、初始化日志与配置、创建编排器，并运行终端对话循环。

use anyhow::Context;
use adchat::{config::load_config, core::DialogueOrchestrator, observability, ui::run_repl};
use tokio::io::BufReader;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 可选：OPENAI_API_KEY / DEEPSEEK_API_KEY / SERPAPI_KEY
    let _ = dotenv::dotenv();

    observability::init();

    let cfg = load_config(None).context("Failed to load config")?;
    let orchestrator =
        DialogueOrchestrator::from_config(&cfg).context("Failed to create orchestrator")?;

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    run_repl(&orchestrator, &cfg.app.quit_command, stdin, &mut stdout)
        .await
        .context("Session failed")?;

    let (prompt, completion, total) = orchestrator.llm().token_usage();
    tracing::info!(prompt, completion, total, "token usage");

    Ok(())
}
