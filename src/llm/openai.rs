//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；支持 OpenAI、DeepSeek、自建代理等。
//! 主回复走真正的 SSE 流式接口；话题判定走非流式接口并统计 token。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use futures_util::StreamExt;

use crate::llm::{CompletionOptions, LlmClient, LlmError, TokenStream};
use crate::memory::{Message, Role};

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

impl From<OpenAIError> for LlmError {
    fn from(err: OpenAIError) -> Self {
        match err {
            OpenAIError::InvalidArgument(msg) => LlmError::InvalidRequest(msg),
            other => {
                let msg = other.to_string();
                if msg.contains("rate_limit") || msg.to_lowercase().contains("rate limit") {
                    LlmError::RateLimited {
                        retry_after_ms: 1000,
                    }
                } else {
                    LlmError::Api(msg)
                }
            }
        }
    }
}

/// 无 choice 或内容为空白时视为空响应
fn non_empty(content: Option<String>) -> Result<String, LlmError> {
    match content {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(LlmError::EmptyResponse),
    }
}

/// OpenAI 兼容客户端：持有 Client、model 名与请求超时
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    request_timeout: Duration,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new().with_api_base(url).with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            request_timeout: Duration::from_secs(60),
            usage: TokenUsage::new(),
        }
    }

    /// 设置建立请求（非流式整次调用 / 流式首包）的超时
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn to_openai_messages(
        &self,
        messages: &[Message],
    ) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
        messages
            .iter()
            .map(|m| {
                let msg = match m.role {
                    Role::System => ChatCompletionRequestSystemMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map(ChatCompletionRequestMessage::System),
                    Role::User => ChatCompletionRequestUserMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map(ChatCompletionRequestMessage::User),
                    Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map(ChatCompletionRequestMessage::Assistant),
                };
                msg.map_err(LlmError::from)
            })
            .collect()
    }

    fn build_request(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
        stream: bool,
    ) -> Result<CreateChatCompletionRequest, LlmError> {
        CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(self.to_openai_messages(messages)?)
            .max_completion_tokens(options.max_tokens)
            .temperature(options.temperature)
            .stream(stream)
            .build()
            .map_err(LlmError::from)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn complete(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<String, LlmError> {
        let request = self.build_request(messages, options, false)?;

        let response = tokio::time::timeout(self.request_timeout, self.client.chat().create(request))
            .await
            .map_err(|_| LlmError::Timeout)??;

        // 提取 token 使用统计
        if let Some(usage) = &response.usage {
            self.usage
                .add(usage.prompt_tokens as u64, usage.completion_tokens as u64);
        }

        non_empty(
            response
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content),
        )
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<TokenStream, LlmError> {
        let request = self.build_request(messages, options, true)?;

        let stream = tokio::time::timeout(
            self.request_timeout,
            self.client.chat().create_stream(request),
        )
        .await
        .map_err(|_| LlmError::Timeout)??;

        let tokens = stream.filter_map(|item| async move {
            match item {
                Ok(chunk) => {
                    let text: String = chunk
                        .choices
                        .into_iter()
                        .filter_map(|c| c.delta.content)
                        .collect();
                    if text.is_empty() {
                        None
                    } else {
                        Some(Ok(text))
                    }
                }
                Err(e) => Some(Err(LlmError::from(e))),
            }
        });

        Ok(Box::pin(tokens))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_usage_accumulates() {
        let usage = TokenUsage::new();
        usage.add(10, 5);
        usage.add(1, 2);
        assert_eq!(usage.get(), (11, 7, 18));
    }

    #[test]
    fn test_build_request_carries_options() {
        let client = OpenAiClient::new(None, "gpt-4o-mini", Some("sk-test"));
        let messages = vec![Message::system("sys"), Message::user("hi")];
        let request = client
            .build_request(&messages, &CompletionOptions::new(256, 0.2), false)
            .unwrap();
        assert_eq!(request.model, "gpt-4o-mini");
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.max_completion_tokens, Some(256));
    }

    #[test]
    fn test_missing_content_is_empty_response() {
        assert!(matches!(non_empty(None), Err(LlmError::EmptyResponse)));
        assert!(matches!(
            non_empty(Some("  \n".to_string())),
            Err(LlmError::EmptyResponse)
        ));
        assert_eq!(non_empty(Some("RELATED: no".to_string())).unwrap(), "RELATED: no");
    }

    #[test]
    fn test_invalid_argument_maps_to_invalid_request() {
        let err = LlmError::from(OpenAIError::InvalidArgument("bad".to_string()));
        assert!(matches!(err, LlmError::InvalidRequest(ref m) if m == "bad"));
        assert!(!err.is_transient());
    }
}
