//! CoherenceJudge：话题连贯性判定
//!
//! 把最近若干 Turn 渲染为 `Q: …` / `A: …` 文本，要求 LLM 按固定格式回答：
//!
//! ```text
//! RELATED: yes
//! TOPIC: <topic>
//! P/S: <product>
//! ```
//!
//! 解析严格且 fail-closed：缺少 `RELATED:` 行、取值不是 yes/no、调用失败或超时，都视为不相关；
//! related=yes 但提取不到商品，同样不会产生广告。

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;

use crate::core::AdPipelineError;
use crate::llm::{CompletionOptions, LlmClient};
use crate::memory::{Message, Snapshot, TurnRole};

/// 默认判定 Prompt；`{pairs}` 替换为快照中的问答组数
pub const DEFAULT_JUDGE_PROMPT: &str = "Determine whether the last {pairs} Q&A pairs share one topic and suggest a product or service.\n\n\
If yes, respond exactly:\n\
RELATED: yes\nTOPIC: <topic>\nP/S: <product>\n\n\
Else respond exactly:\n\
RELATED: no\nTOPIC: None\nP/S: None";

/// 判定结论；related=false 时 topic / product 恒为 None
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    related: bool,
    topic: Option<String>,
    product: Option<String>,
}

impl Verdict {
    pub fn unrelated() -> Self {
        Self {
            related: false,
            topic: None,
            product: None,
        }
    }

    pub fn related(topic: Option<String>, product: Option<String>) -> Self {
        Self {
            related: true,
            topic,
            product,
        }
    }

    pub fn is_related(&self) -> bool {
        self.related
    }

    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    pub fn product(&self) -> Option<&str> {
        self.product.as_deref()
    }

    /// 可用于投放的商品查询：必须 related 且带商品
    pub fn actionable_product(&self) -> Option<&str> {
        if self.related {
            self.product()
        } else {
            None
        }
    }
}

/// 一次判定的结果（带标签，不抛错）
#[derive(Debug, Clone)]
pub enum Judgment {
    /// 格式合法
    Parsed(Verdict),
    /// 格式不合法，保留原文便于排查
    Unparseable { raw: String },
    /// 调用 LLM 失败或超时
    Failed(AdPipelineError),
}

impl Judgment {
    /// fail-closed：只有 Parsed 能带出 related=true
    pub fn verdict(&self) -> Verdict {
        match self {
            Judgment::Parsed(v) => v.clone(),
            Judgment::Unparseable { .. } | Judgment::Failed(_) => Verdict::unrelated(),
        }
    }
}

fn related_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?im)^[ \t]*RELATED[ \t]*:[ \t]*(\S*)[ \t]*$").expect("valid RELATED regex")
    })
}

fn topic_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?im)^[ \t]*TOPIC[ \t]*:[ \t]*(.*?)[ \t]*(?:,[ \t]*(?:P/S|PRODUCT)[ \t]*:.*)?$",
        )
        .expect("valid TOPIC regex")
    })
}

fn product_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?im)(?:^|,)[ \t]*(?:P/S|PRODUCT)[ \t]*:[ \t]*(.*?)[ \t]*$")
            .expect("valid P/S regex")
    })
}

/// 去掉包裹符号；`None` / `N/A` / `-` / 空串视为缺失
fn field_value(raw: &str) -> Option<String> {
    let value = raw.trim().trim_matches(|c: char| c == '"' || c == '*' || c == '`').trim();
    let lower = value.to_lowercase();
    match lower.trim_end_matches('.') {
        "" | "none" | "n/a" | "na" | "null" | "-" => None,
        _ => Some(value.to_string()),
    }
}

/// 解析判定原文
pub fn parse_judgment(raw: &str) -> Judgment {
    let text = raw.replace("\r\n", "\n");

    let Some(caps) = related_re().captures(&text) else {
        return Judgment::Unparseable {
            raw: raw.to_string(),
        };
    };
    let answer = caps
        .get(1)
        .map(|m| m.as_str().trim_end_matches(['.', '!']).to_lowercase())
        .unwrap_or_default();

    match answer.as_str() {
        "no" => Judgment::Parsed(Verdict::unrelated()),
        "yes" => {
            let topic = topic_re()
                .captures(&text)
                .and_then(|c| c.get(1))
                .and_then(|m| field_value(m.as_str()));
            let product = product_re()
                .captures(&text)
                .and_then(|c| c.get(1))
                .and_then(|m| field_value(m.as_str()));
            Judgment::Parsed(Verdict::related(topic, product))
        }
        _ => Judgment::Unparseable {
            raw: raw.to_string(),
        },
    }
}

/// 判定器：持有 LLM、Prompt 模板、调用参数与超时
pub struct CoherenceJudge {
    llm: Arc<dyn LlmClient>,
    prompt_template: String,
    options: CompletionOptions,
    timeout: Duration,
}

impl CoherenceJudge {
    pub fn new(llm: Arc<dyn LlmClient>, options: CompletionOptions, timeout: Duration) -> Self {
        Self {
            llm,
            prompt_template: DEFAULT_JUDGE_PROMPT.to_string(),
            options,
            timeout,
        }
    }

    pub fn with_prompt_template(mut self, template: impl Into<String>) -> Self {
        self.prompt_template = template.into();
        self
    }

    /// 构造判定请求：system 为指令，user 为快照文本
    pub fn build_request(&self, snapshot: &Snapshot<'_>) -> Vec<Message> {
        let pairs = snapshot
            .iter()
            .filter(|t| t.role() == TurnRole::User)
            .count()
            .max(1);
        let transcript = snapshot
            .iter()
            .map(|t| t.transcript_line())
            .collect::<Vec<_>>()
            .join("\n");
        vec![
            Message::system(self.prompt_template.replace("{pairs}", &pairs.to_string())),
            Message::user(transcript),
        ]
    }

    /// 非流式调用 LLM 并解析；任何失败都折叠进 Judgment，不向外传播
    pub async fn evaluate(&self, snapshot: &Snapshot<'_>) -> Judgment {
        if snapshot.is_empty() {
            return Judgment::Parsed(Verdict::unrelated());
        }

        let messages = self.build_request(snapshot);
        let raw = match tokio::time::timeout(self.timeout, self.llm.complete(&messages, &self.options)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => return Judgment::Failed(e.into()),
            Err(_) => {
                return Judgment::Failed(AdPipelineError::CollaboratorUnavailable(
                    "judge call timed out".to_string(),
                ))
            }
        };
        tracing::debug!(raw = %raw, "judge raw response");

        parse_judgment(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, MockLlmClient};
    use crate::memory::{ConversationBuffer, Turn};

    fn verdict(raw: &str) -> Verdict {
        parse_judgment(raw).verdict()
    }

    #[test]
    fn test_parse_separate_lines() {
        let v = verdict("RELATED: yes\nTOPIC: hiking\nP/S: waterproof hiking boots");
        assert!(v.is_related());
        assert_eq!(v.topic(), Some("hiking"));
        assert_eq!(v.actionable_product(), Some("waterproof hiking boots"));
    }

    #[test]
    fn test_parse_inline_delimiter() {
        let v = verdict("RELATED: yes\nTOPIC: hiking boots, P/S: waterproof hiking boots");
        assert_eq!(v.topic(), Some("hiking boots"));
        assert_eq!(v.product(), Some("waterproof hiking boots"));
    }

    #[test]
    fn test_related_token_case_insensitive() {
        let v = verdict("related: YES\r\ntopic: coffee\r\np/s: burr grinder\r\n");
        assert!(v.is_related());
        assert_eq!(v.product(), Some("burr grinder"));
    }

    #[test]
    fn test_no_clears_topic_and_product() {
        let v = verdict("RELATED: no\nTOPIC: hiking\nP/S: boots");
        assert_eq!(v, Verdict::unrelated());
        assert_eq!(v.topic(), None);
    }

    #[test]
    fn test_malformed_fails_closed() {
        assert!(matches!(
            parse_judgment("TOPIC: hiking\nP/S: boots"),
            Judgment::Unparseable { .. }
        ));
        assert!(matches!(
            parse_judgment("RELATED: maybe\nTOPIC: hiking\nP/S: boots"),
            Judgment::Unparseable { .. }
        ));
        assert!(matches!(parse_judgment(""), Judgment::Unparseable { .. }));
        assert!(!verdict("RELATED: maybe").is_related());
        // 前缀被吞掉的回答（只剩 "yes"）同样不可解析
        assert!(!verdict("yes\nTOPIC: a\nP/S: b").is_related());
    }

    #[test]
    fn test_related_without_product_is_not_actionable() {
        let v = verdict("RELATED: yes\nTOPIC: hiking");
        assert!(v.is_related());
        assert_eq!(v.actionable_product(), None);

        let v = verdict("RELATED: yes\nTOPIC: hiking\nP/S: None");
        assert_eq!(v.actionable_product(), None);
    }

    fn sample_buffer() -> ConversationBuffer {
        let mut buf = ConversationBuffer::new(10);
        buf.append(Turn::user("best trails near Denver?"));
        buf.append(Turn::assistant("Try Mount Falcon."));
        buf.append(Turn::user("what boots should I wear?"));
        buf.append(Turn::assistant("Waterproof ones."));
        buf
    }

    #[test]
    fn test_build_request_shape() {
        let judge = CoherenceJudge::new(
            Arc::new(MockLlmClient::new()),
            CompletionOptions::new(256, 0.2),
            Duration::from_secs(1),
        );
        let buf = sample_buffer();
        let messages = judge.build_request(&buf.snapshot(8));
        assert_eq!(messages.len(), 2);
        assert!(messages[0].content.contains("last 2 Q&A pairs"));
        assert!(messages[0].content.contains("RELATED: yes"));
        assert_eq!(
            messages[1].content,
            "Q: best trails near Denver?\nA: Try Mount Falcon.\nQ: what boots should I wear?\nA: Waterproof ones."
        );
    }

    #[tokio::test]
    async fn test_evaluate_llm_error_is_not_related() {
        let llm = Arc::new(MockLlmClient::new().with_judge_error(LlmError::Timeout));
        let judge = CoherenceJudge::new(llm, CompletionOptions::default(), Duration::from_secs(1));
        let buf = sample_buffer();
        let judgment = judge.evaluate(&buf.snapshot(8)).await;
        assert!(matches!(judgment, Judgment::Failed(_)));
        assert!(!judgment.verdict().is_related());
    }

    #[tokio::test]
    async fn test_evaluate_timeout_is_not_related() {
        let llm = Arc::new(
            MockLlmClient::new()
                .with_judge_response("RELATED: yes\nTOPIC: a\nP/S: b")
                .with_judge_delay(Duration::from_secs(5)),
        );
        let judge = CoherenceJudge::new(llm, CompletionOptions::default(), Duration::from_millis(20));
        let buf = sample_buffer();
        let judgment = judge.evaluate(&buf.snapshot(8)).await;
        assert!(matches!(
            judgment,
            Judgment::Failed(AdPipelineError::CollaboratorUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_evaluate_empty_snapshot_skips_call() {
        let llm = Arc::new(MockLlmClient::new());
        let judge = CoherenceJudge::new(llm.clone(), CompletionOptions::default(), Duration::from_secs(1));
        let judgment = judge.evaluate(&Vec::new()).await;
        assert!(!judgment.verdict().is_related());
        assert_eq!(llm.judge_calls(), 0);
    }
}
