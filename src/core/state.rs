//! 状态定义：对话回合的阶段与广告周期结果
//!
//! Idle → AwaitingReply → CycleCheck → [JudgingCoherence → ResolvingProduct → ComposingAd] → Idle。
//! 每条经过 CycleCheck 且触发的路径都恰好重置一次计数器。

use serde::Serialize;

/// 回合所处阶段
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum DialoguePhase {
    #[default]
    Idle,
    AwaitingReply,
    CycleCheck,
    JudgingCoherence,
    ResolvingProduct,
    ComposingAd,
}

/// 本回合广告周期的结果
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// 计数未到阈值
    NotDue,
    /// 已触发但广告开关关闭
    Disabled,
    /// 判定为话题不连贯
    NotRelated,
    /// 判定原文格式不合法
    Unparseable,
    /// 判定调用失败或超时
    JudgeFailed,
    /// 连贯但没给出商品
    NoProduct,
    /// 搜索无可用结果
    NoResult,
    /// 搜索调用失败
    SearchFailed { retrievable: bool },
    /// 已追加广告
    Injected { snippet: String },
}

impl CycleOutcome {
    /// 是否经历了一次触发（除 NotDue 外都会重置计数器）
    pub fn fired(&self) -> bool {
        !matches!(self, CycleOutcome::NotDue)
    }

    pub fn snippet(&self) -> Option<&str> {
        match self {
            CycleOutcome::Injected { snippet } => Some(snippet),
            _ => None,
        }
    }
}

/// 单回合结果：完整主回复、周期结果
#[derive(Clone, Debug, Serialize)]
pub struct TurnOutcome {
    /// 主回复（不含广告）
    pub reply: String,
    pub cycle: CycleOutcome,
}

impl TurnOutcome {
    /// 用户最终看到的全文（主回复 + 可选广告）
    pub fn delivered_text(&self) -> String {
        match self.cycle.snippet() {
            Some(snippet) => crate::ads::AdComposer::append_to(&self.reply, snippet),
            None => self.reply.clone(),
        }
    }
}
