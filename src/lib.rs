//! adchat - 穿插赞助商品推荐的对话 Agent
//!
//! 模块划分：
//! - **ads**: 触发计数、话题连贯性判定、商品解析、广告格式化
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类、回合阶段、会话状态、对话编排器
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **memory**: 会话内对话缓冲
//! - **observability**: 日志初始化
//! - **search**: 商品搜索抽象与实现（SerpApi / 静态 / 空）
//! - **ui**: 终端对话循环

pub mod ads;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod search;
pub mod ui;

pub use crate::core::{DialogueOrchestrator, Session, TurnOutcome};
