//! Mock LLM 客户端（用于测试与无 API Key 时的本地运行）
//!
//! 流式：回显最后一条 User 消息（或预设回复），按词切块输出；
//! 非流式：依次弹出预设的判定结果，用尽后返回 `RELATED: no`。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;

use crate::llm::{CompletionOptions, LlmClient, LlmError, TokenStream};
use crate::memory::{Message, Role};

const NOT_RELATED: &str = "RELATED: no\nTOPIC: None\nP/S: None";

/// Mock 客户端：可脚本化主回复与判定结果
#[derive(Debug, Default)]
pub struct MockLlmClient {
    reply: Option<String>,
    fail_stream: bool,
    judge_responses: Mutex<VecDeque<Result<String, LlmError>>>,
    judge_delay: Option<Duration>,
    judge_calls: AtomicUsize,
    last_judge_messages: Mutex<Vec<Message>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 固定主回复文本（否则回显用户输入）
    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = Some(reply.into());
        self
    }

    /// 追加一条判定返回
    pub fn with_judge_response(self, raw: impl Into<String>) -> Self {
        self.push_judge(Ok(raw.into()));
        self
    }

    /// 追加一次判定失败
    pub fn with_judge_error(self, err: LlmError) -> Self {
        self.push_judge(Err(err));
        self
    }

    /// 每次判定调用前先等待
    pub fn with_judge_delay(mut self, delay: Duration) -> Self {
        self.judge_delay = Some(delay);
        self
    }

    /// 主回复直接失败
    pub fn failing_stream(mut self) -> Self {
        self.fail_stream = true;
        self
    }

    pub fn judge_calls(&self) -> usize {
        self.judge_calls.load(Ordering::SeqCst)
    }

    /// 最近一次判定请求的消息（检查 Prompt 构造）
    pub fn last_judge_messages(&self) -> Vec<Message> {
        self.last_judge_messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    fn push_judge(&self, item: Result<String, LlmError>) {
        if let Ok(mut queue) = self.judge_responses.lock() {
            queue.push_back(item);
        }
    }

    fn next_judge(&self) -> Result<String, LlmError> {
        self.judge_responses
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or_else(|| Ok(NOT_RELATED.to_string()))
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(
        &self,
        messages: &[Message],
        _options: &CompletionOptions,
    ) -> Result<String, LlmError> {
        self.judge_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_judge_messages.lock() {
            *last = messages.to_vec();
        }
        if let Some(delay) = self.judge_delay {
            tokio::time::sleep(delay).await;
        }
        self.next_judge()
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        _options: &CompletionOptions,
    ) -> Result<TokenStream, LlmError> {
        if self.fail_stream {
            return Err(LlmError::Api("mock stream unavailable".to_string()));
        }

        let content = match &self.reply {
            Some(reply) => reply.clone(),
            None => {
                let last_user = messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::User)
                    .map(|m| m.content.as_str())
                    .unwrap_or("(no input)");
                format!("Echo from Mock: {}", last_user)
            }
        };

        // 按空格切块，模拟逐段到达
        let chunks: Vec<Result<String, LlmError>> = content
            .split_inclusive(' ')
            .map(|s| Ok(s.to_string()))
            .collect();
        Ok(Box::pin(stream::iter(chunks)))
    }
}
