//! 静态搜索后端：测试用的固定结果 / 固定错误，以及未配置 Key 时的空实现

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::search::{ProductSearch, SearchError, SearchHit};

/// 固定返回同一结果（可带延迟），并记录调用次数与最后一次查询
#[derive(Debug)]
pub struct StaticSearch {
    result: Result<Vec<SearchHit>, SearchError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    last_query: Mutex<Option<String>>,
}

impl StaticSearch {
    pub fn with_hits(hits: Vec<SearchHit>) -> Self {
        Self::from_result(Ok(hits))
    }

    pub fn failing(err: SearchError) -> Self {
        Self::from_result(Err(err))
    }

    fn from_result(result: Result<Vec<SearchHit>, SearchError>) -> Self {
        Self {
            result,
            delay: None,
            calls: AtomicUsize::new(0),
            last_query: Mutex::new(None),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_query(&self) -> Option<String> {
        self.last_query.lock().ok().and_then(|q| q.clone())
    }
}

#[async_trait]
impl ProductSearch for StaticSearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_query.lock() {
            *last = Some(query.to_string());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.result.clone()
    }
}

/// 未配置搜索 Key 时使用：永远无结果，相当于关闭广告
#[derive(Debug, Default)]
pub struct NoopSearch;

#[async_trait]
impl ProductSearch for NoopSearch {
    async fn search(&self, _query: &str) -> Result<Vec<SearchHit>, SearchError> {
        Ok(Vec::new())
    }
}
