//! 回合过程事件：用于流式展示主回复与末尾广告

use serde::Serialize;

/// 单回合输出事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// 主回复的一段文本
    ReplyChunk { text: String },
    /// 主回复已完整输出
    ReplyDone,
    /// 追加在主回复之后的赞助推荐（含前导分隔）
    Sponsored { text: String },
    /// 本回合结束
    TurnDone,
}
