//! ProductResolver：把商品查询解析为一条可投放的搜索结果
//!
//! 取第一条同时带标题与可访问链接（http/https）的结果；无结果或全部缺链接返回 Ok(None)。
//! 搜索调用失败时返回 SearchError（可据 is_retrievable 区分），调用方一律按「本轮无广告」处理。

use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;

use crate::search::{ProductSearch, SearchError, SearchHit};

/// 可投放的商品；link 为 None 表示不可用，不会生成广告
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductResult {
    pub title: String,
    pub link: Option<String>,
    pub description: Option<String>,
}

/// 按字符截断，超长时追加省略号
fn truncate_description(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let mut out: String = text.chars().take(max_chars).collect();
        out.push('…');
        out
    } else {
        text.to_string()
    }
}

fn usable_link(link: &str) -> Option<String> {
    let url = Url::parse(link.trim()).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}

pub struct ProductResolver {
    search: Arc<dyn ProductSearch>,
    timeout: Duration,
    description_chars: usize,
}

impl ProductResolver {
    pub fn new(search: Arc<dyn ProductSearch>, timeout: Duration, description_chars: usize) -> Self {
        Self {
            search,
            timeout,
            description_chars,
        }
    }

    fn to_result(&self, hit: SearchHit) -> Option<ProductResult> {
        let title = hit.title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())?;
        let link = usable_link(hit.link.as_deref()?)?;
        let description = hit
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .map(|d| truncate_description(&d, self.description_chars));
        Some(ProductResult {
            title,
            link: Some(link),
            description,
        })
    }

    /// 单次搜索，不重试
    pub async fn resolve(&self, product_query: &str) -> Result<Option<ProductResult>, SearchError> {
        let query = product_query.trim();
        if query.is_empty() {
            return Ok(None);
        }

        let hits = tokio::time::timeout(self.timeout, self.search.search(query))
            .await
            .map_err(|_| SearchError::Timeout)??;
        tracing::debug!(query = %query, hits = hits.len(), "product search returned");

        Ok(hits.into_iter().find_map(|hit| self.to_result(hit)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::StaticSearch;

    fn resolver(search: StaticSearch) -> ProductResolver {
        ProductResolver::new(Arc::new(search), Duration::from_secs(1), 160)
    }

    #[tokio::test]
    async fn test_first_hit_with_title_and_link_wins() {
        let hits = vec![
            SearchHit {
                title: Some("No link".into()),
                link: None,
                description: None,
            },
            SearchHit {
                title: None,
                link: Some("https://example.com/untitled".into()),
                description: None,
            },
            SearchHit::new("TrailGrip Pro Boots", "https://shop.example/trailgrip")
                .with_description("Waterproof leather boots"),
            SearchHit::new("Second", "https://shop.example/second"),
        ];
        let result = resolver(StaticSearch::with_hits(hits))
            .resolve("waterproof hiking boots")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.title, "TrailGrip Pro Boots");
        assert_eq!(result.link.as_deref(), Some("https://shop.example/trailgrip"));
        assert_eq!(result.description.as_deref(), Some("Waterproof leather boots"));
    }

    #[tokio::test]
    async fn test_no_results_is_none_not_error() {
        let result = resolver(StaticSearch::with_hits(vec![])).resolve("boots").await;
        assert!(matches!(result, Ok(None)));
    }

    #[tokio::test]
    async fn test_all_hits_without_usable_link_is_none() {
        let hits = vec![
            SearchHit {
                title: Some("A".into()),
                link: None,
                description: None,
            },
            SearchHit::new("B", "not a url"),
            SearchHit::new("C", "ftp://files.example/c"),
        ];
        let result = resolver(StaticSearch::with_hits(hits)).resolve("boots").await;
        assert!(matches!(result, Ok(None)));
    }

    #[tokio::test]
    async fn test_search_failure_surfaces_error() {
        let result = resolver(StaticSearch::failing(SearchError::Http { status: 401 }))
            .resolve("boots")
            .await;
        let err = result.unwrap_err();
        assert!(!err.is_retrievable());
    }

    #[tokio::test]
    async fn test_slow_search_times_out() {
        let search = StaticSearch::with_hits(vec![SearchHit::new("A", "https://a.example")])
            .with_delay(Duration::from_secs(5));
        let resolver = ProductResolver::new(Arc::new(search), Duration::from_millis(20), 160);
        let err = resolver.resolve("boots").await.unwrap_err();
        assert!(matches!(err, SearchError::Timeout));
        assert!(err.is_retrievable());
    }

    #[test]
    fn test_description_truncated_with_ellipsis() {
        assert_eq!(truncate_description("abcdef", 3), "abc…");
        assert_eq!(truncate_description("abc", 3), "abc");
    }
}
