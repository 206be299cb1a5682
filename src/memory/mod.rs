//! 记忆层：会话内的短期对话缓冲（不跨进程持久化）

pub mod conversation;

pub use conversation::{ConversationBuffer, Message, Role, Snapshot, Turn, TurnRole};
