//! 商品搜索层：抽象与实现（SerpApi / 静态 / 空）

pub mod mock;
pub mod serpapi;
pub mod traits;

pub use mock::{NoopSearch, StaticSearch};
pub use serpapi::SerpApiSearch;
pub use traits::{ProductSearch, SearchError, SearchHit};
