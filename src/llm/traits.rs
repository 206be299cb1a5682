//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 LlmClient：complete（非流式，供话题判定）、
//! complete_stream（流式 Token，供主回复）。

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use thiserror::Error;

use crate::memory::Message;

/// 文本生成后端的错误
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("LLM request timed out")]
    Timeout,

    #[error("Rate limited, retry after {retry_after_ms} ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("LLM API error: {0}")]
    Api(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("LLM returned an empty response")]
    EmptyResponse,
}

impl LlmError {
    /// 超时与限流属于暂时性错误
    pub fn is_transient(&self) -> bool {
        matches!(self, LlmError::Timeout | LlmError::RateLimited { .. })
    }
}

/// 单次调用参数：token 上限与温度
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionOptions {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionOptions {
    pub fn new(max_tokens: u32, temperature: f32) -> Self {
        Self {
            max_tokens,
            temperature,
        }
    }
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self::new(800, 0.7)
    }
}

/// 主回复的 Token 流：有限、惰性，每回合重新创建
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// LLM 客户端 trait：非流式完成与流式完成（返回 Token 流）
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成
    async fn complete(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<String, LlmError>;

    /// 流式完成，返回 Token 流
    async fn complete_stream(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<TokenStream, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
