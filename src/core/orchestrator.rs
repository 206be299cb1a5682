//! 对话编排器：单回合主控流程
//!
//! 负责：根据配置创建 LLM / 搜索后端，并对每条用户输入依次执行
//! 流式生成主回复 → 成对缓冲 user/assistant Turn → 计数 → （触发时）判定 → 搜索 → 格式化 → 重置计数。
//! 广告子流程尽力而为：任何失败只记录日志，主回复照常交付。

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::ads::{
    AdComposer, CoherenceJudge, Judgment, ProductResolver, AD_SEPARATOR, DEFAULT_JUDGE_PROMPT,
};
use crate::config::AppConfig;
use crate::core::{
    AdPipelineError, AgentError, CycleOutcome, DialoguePhase, Session, TurnEvent, TurnOutcome,
};
use crate::llm::{create_deepseek_client, CompletionOptions, LlmClient, LlmError, OpenAiClient};
use crate::memory::{Message, Turn};
use crate::search::{NoopSearch, ProductSearch, SerpApiSearch};

/// 主回复的默认 system prompt
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant. Format responses using markdown: \
**bold** for emphasis, *italic* for subtle emphasis, `code` for terms, and lists. \
Preserve any links exactly as provided.";

/// 可选的 LLM 后端
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LlmBackend {
    DeepSeek,
    OpenAi,
    Mock,
}

/// provider 与可用 Key 决定后端；未知 provider 不会静默落到 OpenAI
fn select_llm_backend(provider: &str, has_deepseek_key: bool, has_openai_key: bool) -> LlmBackend {
    match provider {
        "deepseek" if has_deepseek_key || has_openai_key => LlmBackend::DeepSeek,
        "openai" if has_openai_key => LlmBackend::OpenAi,
        "deepseek" | "openai" => {
            tracing::warn!("No API key set for provider '{}', using Mock LLM", provider);
            LlmBackend::Mock
        }
        "mock" => LlmBackend::Mock,
        other => {
            tracing::warn!(
                "Unknown LLM provider '{}' (expected openai, deepseek or mock), using Mock LLM",
                other
            );
            LlmBackend::Mock
        }
    }
}

/// 根据配置与环境变量选择 LLM 后端（DeepSeek / OpenAI 兼容 / Mock）
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.trim().to_lowercase();
    let request_timeout = Duration::from_secs(cfg.llm.timeouts.request);
    let openai_key = std::env::var("OPENAI_API_KEY").ok();
    let backend = select_llm_backend(
        &provider,
        std::env::var("DEEPSEEK_API_KEY").is_ok(),
        openai_key.is_some(),
    );

    match backend {
        LlmBackend::DeepSeek => {
            tracing::info!("Using DeepSeek LLM ({})", cfg.llm.model);
            Arc::new(
                create_deepseek_client(Some(&cfg.llm.model)).with_request_timeout(request_timeout),
            )
        }
        LlmBackend::OpenAi => {
            tracing::info!("Using OpenAI LLM ({})", cfg.llm.model);
            Arc::new(
                OpenAiClient::new(cfg.llm.base_url.as_deref(), &cfg.llm.model, openai_key.as_deref())
                    .with_request_timeout(request_timeout),
            )
        }
        LlmBackend::Mock => Arc::new(crate::llm::MockLlmClient::new()),
    }
}

/// 根据配置选择搜索后端；缺少 SerpApi Key 时退化为永远无结果
pub fn create_search_from_config(cfg: &AppConfig) -> Arc<dyn ProductSearch> {
    match SerpApiSearch::from_config(&cfg.search) {
        Ok(search) => {
            tracing::info!("Using SerpApi product search ({})", cfg.search.engine);
            Arc::new(search)
        }
        Err(e) => {
            tracing::warn!("{}; sponsored suggestions disabled", e);
            Arc::new(NoopSearch)
        }
    }
}

/// 依次尝试读取 Prompt 文件，都不存在时用默认值
fn load_prompt(name: &str, default: &str) -> String {
    [format!("config/prompts/{name}"), format!("../config/prompts/{name}")]
        .into_iter()
        .find_map(|p| std::fs::read_to_string(p).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// 对话编排器：无会话状态，可被多个会话共享；会话状态由调用方以 &mut Session 传入
pub struct DialogueOrchestrator {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    reply_options: CompletionOptions,
    stream_timeout: Duration,
    buffer_capacity: usize,
    snapshot_size: usize,
    trigger_threshold: usize,
    ads_enabled: bool,
    judge: CoherenceJudge,
    resolver: ProductResolver,
    composer: AdComposer,
}

impl DialogueOrchestrator {
    pub fn new(llm: Arc<dyn LlmClient>, search: Arc<dyn ProductSearch>, cfg: &AppConfig) -> Self {
        let judge = CoherenceJudge::new(
            llm.clone(),
            CompletionOptions::new(cfg.ads.judge_max_tokens, cfg.ads.judge_temperature),
            cfg.ads.judge_timeout(),
        );
        let resolver = ProductResolver::new(search, cfg.search.timeout(), cfg.ads.description_chars);
        Self {
            llm,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            reply_options: CompletionOptions::new(cfg.llm.max_tokens, cfg.llm.temperature),
            stream_timeout: Duration::from_secs(cfg.llm.timeouts.stream),
            buffer_capacity: cfg.ads.buffer_capacity,
            snapshot_size: cfg.ads.snapshot_size,
            trigger_threshold: cfg.ads.trigger_threshold,
            ads_enabled: cfg.ads.enabled,
            judge,
            resolver,
            composer: AdComposer::default(),
        }
    }

    /// 从配置创建：LLM、搜索后端，以及 config/prompts 下的 system.txt / judge.txt
    pub fn from_config(cfg: &AppConfig) -> Result<Self, AgentError> {
        cfg.validate()
            .map_err(|e| AgentError::ConfigError(e.to_string()))?;
        let llm = create_llm_from_config(cfg);
        let search = create_search_from_config(cfg);
        Ok(Self::new(llm, search, cfg)
            .with_system_prompt(load_prompt("system.txt", DEFAULT_SYSTEM_PROMPT))
            .with_judge_prompt(load_prompt("judge.txt", DEFAULT_JUDGE_PROMPT)))
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_judge_prompt(mut self, template: impl Into<String>) -> Self {
        self.judge = self.judge.with_prompt_template(template);
        self
    }

    /// 新会话：独立的缓冲与计数器
    pub fn new_session(&self) -> Session {
        Session::new(self.buffer_capacity, self.trigger_threshold)
    }

    pub fn llm(&self) -> &Arc<dyn LlmClient> {
        &self.llm
    }

    /// 处理一条用户输入
    ///
    /// 主回复生成失败时返回 AgentError（缓冲与计数器均不变）；
    /// 广告子流程的任何失败都不会使本函数返回错误。
    pub async fn process_turn(
        &self,
        session: &mut Session,
        user_input: &str,
        events: Option<&mpsc::UnboundedSender<TurnEvent>>,
    ) -> Result<TurnOutcome, AgentError> {
        session.transition(DialoguePhase::AwaitingReply);
        let user_turn = Turn::user(user_input);

        let mut messages = Vec::with_capacity(session.buffer.len() + 2);
        messages.push(Message::system(self.system_prompt.clone()));
        messages.extend(session.buffer.to_messages_with(&user_turn));

        let reply = match self.stream_reply(&messages, events).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(
                    session = %session.id(),
                    error = %e,
                    transient = e.is_transient(),
                    "primary reply failed"
                );
                session.transition(DialoguePhase::Idle);
                return Err(e.into());
            }
        };
        if let Some(tx) = events {
            let _ = tx.send(TurnEvent::ReplyDone);
        }

        // 回复完整后才修改缓冲与计数器，user/assistant 成对写入
        session.buffer.append(user_turn);
        session.buffer.append(Turn::assistant(reply.clone()));
        session.transition(DialoguePhase::CycleCheck);

        let cycle = if session.trigger.record_user_turn() {
            let outcome = self.run_ad_cycle(session).await;
            session.trigger.reset();
            tracing::info!(session = %session.id(), outcome = ?outcome, "ad cycle finished");
            outcome
        } else {
            CycleOutcome::NotDue
        };
        session.transition(DialoguePhase::Idle);

        if let Some(tx) = events {
            if let Some(snippet) = cycle.snippet() {
                let _ = tx.send(TurnEvent::Sponsored {
                    text: format!("{AD_SEPARATOR}{snippet}"),
                });
            }
            let _ = tx.send(TurnEvent::TurnDone);
        }

        Ok(TurnOutcome { reply, cycle })
    }

    /// 消费 Token 流直到结束，整体受 stream_timeout 约束
    async fn stream_reply(
        &self,
        messages: &[Message],
        events: Option<&mpsc::UnboundedSender<TurnEvent>>,
    ) -> Result<String, LlmError> {
        let deadline = Instant::now() + self.stream_timeout;
        let mut stream = tokio::time::timeout_at(
            deadline,
            self.llm.complete_stream(messages, &self.reply_options),
        )
        .await
        .map_err(|_| LlmError::Timeout)??;

        let mut reply = String::new();
        loop {
            let next = tokio::time::timeout_at(deadline, stream.next())
                .await
                .map_err(|_| LlmError::Timeout)?;
            match next {
                Some(Ok(chunk)) => {
                    if let Some(tx) = events {
                        let _ = tx.send(TurnEvent::ReplyChunk {
                            text: chunk.clone(),
                        });
                    }
                    reply.push_str(&chunk);
                }
                Some(Err(e)) => return Err(e),
                None => break,
            }
        }

        Ok(reply.trim().to_string())
    }

    /// 触发后的广告周期：判定 → 搜索 → 格式化；调用方负责重置计数器
    async fn run_ad_cycle(&self, session: &mut Session) -> CycleOutcome {
        if !self.ads_enabled {
            return CycleOutcome::Disabled;
        }

        session.transition(DialoguePhase::JudgingCoherence);
        let judgment = {
            let snapshot = session.buffer.snapshot(self.snapshot_size);
            self.judge.evaluate(&snapshot).await
        };

        let verdict = match judgment {
            Judgment::Parsed(verdict) => verdict,
            Judgment::Unparseable { raw } => {
                let err = AdPipelineError::MalformedJudgment(raw);
                tracing::warn!(session = %session.id(), error = %err, "skipping ad");
                return CycleOutcome::Unparseable;
            }
            Judgment::Failed(err) => {
                tracing::warn!(
                    session = %session.id(),
                    error = %err,
                    transient = err.is_transient(),
                    "skipping ad"
                );
                return CycleOutcome::JudgeFailed;
            }
        };

        if !verdict.is_related() {
            tracing::debug!(session = %session.id(), "conversation not coherent, no ad");
            return CycleOutcome::NotRelated;
        }
        let Some(product) = verdict.actionable_product() else {
            tracing::debug!(session = %session.id(), "related but no product named, no ad");
            return CycleOutcome::NoProduct;
        };

        session.transition(DialoguePhase::ResolvingProduct);
        tracing::debug!(session = %session.id(), product = %product, "resolving product");
        let resolved = match self.resolver.resolve(product).await {
            Ok(Some(resolved)) => resolved,
            Ok(None) => {
                let err = AdPipelineError::NoProductResult;
                tracing::warn!(session = %session.id(), error = %err, "skipping ad");
                return CycleOutcome::NoResult;
            }
            Err(e) => {
                let retrievable = e.is_retrievable();
                let err = AdPipelineError::from(e);
                tracing::warn!(session = %session.id(), error = %err, retrievable, "skipping ad");
                return CycleOutcome::SearchFailed { retrievable };
            }
        };

        session.transition(DialoguePhase::ComposingAd);
        match self.composer.compose(&resolved, verdict.topic()) {
            Some(snippet) => CycleOutcome::Injected { snippet },
            None => CycleOutcome::NoResult,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::memory::TurnRole;
    use crate::search::{SearchError, SearchHit, StaticSearch};

    fn config(threshold: usize) -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.ads.trigger_threshold = threshold;
        cfg.ads.judge_timeout_secs = 1;
        cfg.search.timeout_secs = 1;
        cfg
    }

    fn boots_search() -> Arc<StaticSearch> {
        Arc::new(StaticSearch::with_hits(vec![SearchHit::new(
            "TrailGrip Pro Boots",
            "https://shop.example/trailgrip",
        )
        .with_description("Waterproof leather boots")]))
    }

    #[tokio::test]
    async fn test_turn_streams_and_buffers_reply() {
        let llm = Arc::new(MockLlmClient::new().with_reply("Sure, here you go."));
        let orch = DialogueOrchestrator::new(llm, boots_search(), &config(4));
        let mut session = orch.new_session();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = orch.process_turn(&mut session, "hello", Some(&tx)).await.unwrap();
        assert_eq!(outcome.reply, "Sure, here you go.");
        assert_eq!(outcome.cycle, CycleOutcome::NotDue);
        assert_eq!(session.buffer().len(), 2);
        assert_eq!(session.phase(), DialoguePhase::Idle);

        let mut streamed = String::new();
        let mut saw_done = false;
        while let Ok(ev) = rx.try_recv() {
            match ev {
                TurnEvent::ReplyChunk { text } => streamed.push_str(&text),
                TurnEvent::TurnDone => saw_done = true,
                _ => {}
            }
        }
        assert_eq!(streamed, "Sure, here you go.");
        assert!(saw_done);
    }

    #[tokio::test]
    async fn test_primary_failure_propagates_without_counting() {
        let llm = Arc::new(MockLlmClient::new().failing_stream());
        let orch = DialogueOrchestrator::new(llm.clone(), boots_search(), &config(1));
        let mut session = orch.new_session();

        let err = orch.process_turn(&mut session, "hello", None).await.unwrap_err();
        assert!(matches!(err, AgentError::Llm(_)));
        assert_eq!(session.phase(), DialoguePhase::Idle);
        // 主回复失败不进入广告周期
        assert_eq!(llm.judge_calls(), 0);
        assert_eq!(session.buffer().len(), 0);
    }

    #[tokio::test]
    async fn test_failed_reply_keeps_buffer_alternating() {
        let llm = Arc::new(MockLlmClient::new().failing_stream());
        let orch = DialogueOrchestrator::new(llm, boots_search(), &config(4));
        let mut session = orch.new_session();
        assert!(orch.process_turn(&mut session, "one", None).await.is_err());

        let ok_llm = Arc::new(MockLlmClient::new().with_reply("fine"));
        let ok_orch = DialogueOrchestrator::new(ok_llm, boots_search(), &config(4));
        ok_orch.process_turn(&mut session, "two", None).await.unwrap();

        let roles: Vec<TurnRole> = session.buffer().iter().map(|t| t.role()).collect();
        assert_eq!(roles, vec![TurnRole::User, TurnRole::Assistant]);
        let texts: Vec<&str> = session.buffer().iter().map(|t| t.text()).collect();
        assert_eq!(texts, vec!["two", "fine"]);
    }

    #[tokio::test]
    async fn test_disabled_ads_still_reset_counter() {
        let llm = Arc::new(MockLlmClient::new().with_reply("ok"));
        let mut cfg = config(1);
        cfg.ads.enabled = false;
        let search = boots_search();
        let orch = DialogueOrchestrator::new(llm.clone(), search.clone(), &cfg);
        let mut session = orch.new_session();

        for _ in 0..2 {
            let outcome = orch.process_turn(&mut session, "q", None).await.unwrap();
            assert_eq!(outcome.cycle, CycleOutcome::Disabled);
        }
        assert_eq!(llm.judge_calls(), 0);
        assert_eq!(search.calls(), 0);
    }

    #[tokio::test]
    async fn test_search_error_reports_retrievability() {
        let llm = Arc::new(
            MockLlmClient::new()
                .with_reply("ok")
                .with_judge_response("RELATED: yes\nTOPIC: coffee\nP/S: burr grinder"),
        );
        let search = Arc::new(StaticSearch::failing(SearchError::Http { status: 503 }));
        let orch = DialogueOrchestrator::new(llm, search, &config(1));
        let mut session = orch.new_session();

        let outcome = orch.process_turn(&mut session, "coffee?", None).await.unwrap();
        assert_eq!(outcome.cycle, CycleOutcome::SearchFailed { retrievable: true });
        assert_eq!(outcome.delivered_text(), "ok");
    }

    #[test]
    fn test_from_config_rejects_invalid_config() {
        let mut cfg = AppConfig::default();
        cfg.ads.snapshot_size = 0;
        let err = DialogueOrchestrator::from_config(&cfg).err().unwrap();
        assert!(matches!(err, AgentError::ConfigError(ref m) if m.contains("snapshot_size")));
    }

    #[test]
    fn test_unknown_provider_never_uses_openai() {
        assert_eq!(select_llm_backend("anthropic", false, true), LlmBackend::Mock);
        assert_eq!(select_llm_backend("openai", false, true), LlmBackend::OpenAi);
        assert_eq!(select_llm_backend("openai", true, false), LlmBackend::Mock);
        assert_eq!(select_llm_backend("deepseek", false, true), LlmBackend::DeepSeek);
        assert_eq!(select_llm_backend("mock", true, true), LlmBackend::Mock);
    }

    #[test]
    fn test_load_prompt_falls_back_to_default() {
        assert_eq!(load_prompt("does-not-exist.txt", "fallback"), "fallback");
    }
}
