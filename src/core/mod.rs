//! 核心编排层：错误分类、回合阶段、输出事件、会话状态、主控流程

pub mod error;
pub mod events;
pub mod orchestrator;
pub mod session;
pub mod state;

pub use error::{AdPipelineError, AgentError};
pub use events::TurnEvent;
pub use orchestrator::{
    create_llm_from_config, create_search_from_config, DialogueOrchestrator, DEFAULT_SYSTEM_PROMPT,
};
pub use session::Session;
pub use state::{CycleOutcome, DialoguePhase, TurnOutcome};
