//! 错误类型
//!
//! AgentError：会传到 I/O 外壳的错误（主回复生成失败、配置错误）；
//! AdPipelineError：广告子流程内的错误，只在编排器内部记录并降级为「本轮不插广告」。

use thiserror::Error;

use crate::llm::LlmError;
use crate::search::SearchError;

/// 对话主流程的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Config error: {0}")]
    ConfigError(String),
}

/// 广告子流程的错误分类；任何一种都不会打断当前对话回合
#[derive(Error, Debug, Clone)]
pub enum AdPipelineError {
    /// 调用 LLM 或搜索服务时网络/鉴权/超时失败
    #[error("Collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),

    /// 判定返回不符合 `RELATED:` 格式
    #[error("Malformed judgment: {0}")]
    MalformedJudgment(String),

    /// 搜索无可用结果（无结果或都缺链接）
    #[error("No usable product result")]
    NoProductResult,
}

impl AdPipelineError {
    /// 仅 CollaboratorUnavailable 可能在之后的周期恢复
    pub fn is_transient(&self) -> bool {
        matches!(self, AdPipelineError::CollaboratorUnavailable(_))
    }
}

impl From<LlmError> for AdPipelineError {
    fn from(err: LlmError) -> Self {
        AdPipelineError::CollaboratorUnavailable(err.to_string())
    }
}

impl From<SearchError> for AdPipelineError {
    fn from(err: SearchError) -> Self {
        AdPipelineError::CollaboratorUnavailable(err.to_string())
    }
}
