//! SerpApi Google Shopping 搜索
//!
//! GET search.json（engine=google_shopping，直接商品链接、列表视图）；带超时与 User-Agent。
//! 从 shopping_results 中取 title / link（缺失时退回 product_link）/ snippet（或 description）。

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::SearchSection;
use crate::search::{ProductSearch, SearchError, SearchHit};

/// SerpApi 响应中用到的部分
#[derive(Debug, Default, Deserialize)]
struct ShoppingResponse {
    #[serde(default)]
    shopping_results: Vec<ShoppingItem>,
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ShoppingItem {
    title: Option<String>,
    link: Option<String>,
    product_link: Option<String>,
    snippet: Option<String>,
    description: Option<String>,
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl From<ShoppingItem> for SearchHit {
    fn from(item: ShoppingItem) -> Self {
        SearchHit {
            title: non_empty(item.title),
            link: non_empty(item.link).or_else(|| non_empty(item.product_link)),
            description: non_empty(item.snippet).or_else(|| non_empty(item.description)),
        }
    }
}

/// SerpApi 客户端：请求参数来自 [search] 配置
pub struct SerpApiSearch {
    client: Client,
    endpoint: String,
    api_key: String,
    engine: String,
    gl: String,
    hl: String,
    num: u32,
}

impl SerpApiSearch {
    pub fn new(section: &SearchSection, api_key: impl Into<String>) -> Self {
        const USER_AGENT: &str = concat!("adchat/", env!("CARGO_PKG_VERSION"));
        let client = Client::builder()
            .timeout(section.timeout())
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "search client builder failed, using default client without timeout or user agent");
                Client::new()
            });
        Self {
            client,
            endpoint: section.endpoint.clone(),
            api_key: api_key.into(),
            engine: section.engine.clone(),
            gl: section.gl.clone(),
            hl: section.hl.clone(),
            num: section.num,
        }
    }

    /// 按 [search] 配置创建；未配置 API Key 时返回 MissingApiKey
    pub fn from_config(section: &SearchSection) -> Result<Self, SearchError> {
        let key = section.resolve_api_key().ok_or(SearchError::MissingApiKey)?;
        Ok(Self::new(section, key))
    }

    fn query_params(&self, query: &str) -> Vec<(&'static str, String)> {
        vec![
            ("engine", self.engine.clone()),
            ("q", query.to_string()),
            ("gl", self.gl.clone()),
            ("hl", self.hl.clone()),
            ("num", self.num.to_string()),
            ("direct_link", "1".to_string()),
            ("tbs", "vw:l".to_string()),
            ("api_key", self.api_key.clone()),
        ]
    }
}

fn parse_response(body: &str) -> Result<Vec<SearchHit>, SearchError> {
    let parsed: ShoppingResponse =
        serde_json::from_str(body).map_err(|e| SearchError::Decode(e.to_string()))?;
    if let Some(err) = parsed.error {
        // 「无结果」在 SerpApi 中也以 error 字段返回，按空结果处理
        if err.contains("hasn't returned any results") {
            return Ok(Vec::new());
        }
        return Err(SearchError::Api(err));
    }
    Ok(parsed.shopping_results.into_iter().map(SearchHit::from).collect())
}

#[async_trait]
impl ProductSearch for SerpApiSearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, SearchError> {
        tracing::debug!(query = %query, engine = %self.engine, "serpapi search");
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&self.query_params(query))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SearchError::Timeout
                } else {
                    SearchError::Transport(e.to_string())
                }
            })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| {
            if e.is_timeout() {
                SearchError::Timeout
            } else {
                SearchError::Transport(e.to_string())
            }
        })?;

        // SerpApi 对鉴权失败等会返回非 2xx 且 body 带 error，优先取 error 文本
        if !status.is_success() {
            return match parse_response(&body) {
                Err(SearchError::Api(msg)) => Err(SearchError::Api(msg)),
                _ => Err(SearchError::Http {
                    status: status.as_u16(),
                }),
            };
        }

        parse_response(&body)
    }
}
