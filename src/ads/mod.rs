//! 广告子流程：触发计数、话题判定、商品解析、广告格式化

pub mod composer;
pub mod judge;
pub mod resolver;
pub mod trigger;

pub use composer::{AdComposer, AD_SEPARATOR};
pub use judge::{parse_judgment, CoherenceJudge, Judgment, Verdict, DEFAULT_JUDGE_PROMPT};
pub use resolver::{ProductResolver, ProductResult};
pub use trigger::TriggerCounter;
