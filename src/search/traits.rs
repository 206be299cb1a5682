//! 商品搜索抽象
//!
//! ProductSearch：输入自由文本查询，返回零或多条结果，每条的标题、链接、描述都可能缺失。

use async_trait::async_trait;
use thiserror::Error;

/// 搜索后端返回的单条原始结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchHit {
    pub title: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
}

impl SearchHit {
    pub fn new(title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            link: Some(link.into()),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// 搜索后端调用失败（网络、鉴权、限流、解析）
#[derive(Error, Debug, Clone)]
pub enum SearchError {
    #[error("Search request timed out")]
    Timeout,

    #[error("Search HTTP {status}")]
    Http { status: u16 },

    #[error("Search transport error: {0}")]
    Transport(String),

    #[error("Search API error: {0}")]
    Api(String),

    #[error("Search response decode error: {0}")]
    Decode(String),

    #[error("Search API key not configured")]
    MissingApiKey,
}

impl SearchError {
    /// 稍后重试可能成功（超时、网络、限流、5xx）；鉴权/配置/解析错误不可恢复
    pub fn is_retrievable(&self) -> bool {
        match self {
            SearchError::Timeout | SearchError::Transport(_) => true,
            SearchError::Http { status } => *status == 429 || *status >= 500,
            SearchError::Api(_) | SearchError::Decode(_) | SearchError::MissingApiKey => false,
        }
    }
}

/// 商品搜索后端
#[async_trait]
pub trait ProductSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, SearchError>;
}
