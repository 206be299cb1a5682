//! 短期记忆：对话缓冲
//!
//! 按插入顺序保存 user/assistant Turn，超出容量时从头部（最旧）逐条淘汰；
//! snapshot(n) 取最近 n 条供话题判定使用，只读、不修改缓冲。

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 发往 LLM 的单条消息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 对话中的发言方（缓冲里只有用户与助手，system 不入缓冲）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnRole {
    User,
    Assistant,
}

/// 一条对话记录；创建后不可变，字段只读
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    role: TurnRole,
    text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            text: text.into(),
        }
    }

    pub fn role(&self) -> TurnRole {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// 判定 Prompt 中使用的单行形式：`Q: …` / `A: …`
    pub fn transcript_line(&self) -> String {
        match self.role {
            TurnRole::User => format!("Q: {}", self.text),
            TurnRole::Assistant => format!("A: {}", self.text),
        }
    }
}

impl From<&Turn> for Message {
    fn from(turn: &Turn) -> Self {
        match turn.role {
            TurnRole::User => Message::user(turn.text.clone()),
            TurnRole::Assistant => Message::assistant(turn.text.clone()),
        }
    }
}

/// 最近若干 Turn 的只读视图，按需生成、不存储
pub type Snapshot<'a> = Vec<&'a Turn>;

/// 对话缓冲：FIFO 淘汰，任意一次修改后 len() <= capacity
#[derive(Clone, Debug)]
pub struct ConversationBuffer {
    turns: VecDeque<Turn>,
    capacity: usize,
}

impl ConversationBuffer {
    /// capacity 为 0 时按 1 处理，保证至少能容纳当前回合
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            turns: VecDeque::with_capacity(capacity.min(256)),
            capacity,
        }
    }

    pub fn append(&mut self, turn: Turn) {
        self.turns.push_back(turn);
        while self.turns.len() > self.capacity {
            self.turns.pop_front();
        }
    }

    /// 最近 min(n, len) 条，保持原顺序；n 为 0 时返回空
    pub fn snapshot(&self, n: usize) -> Snapshot<'_> {
        let take = n.min(self.turns.len());
        self.turns.iter().skip(self.turns.len() - take).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    /// 转为 LLM 消息序列（主回复的上下文）
    pub fn to_messages(&self) -> Vec<Message> {
        self.turns.iter().map(Message::from).collect()
    }

    /// 假设 pending 已追加（同样按容量淘汰）时的消息序列；不修改缓冲
    ///
    /// 主回复成功前用户 Turn 不入缓冲，失败时缓冲保持 user/assistant 交替。
    pub fn to_messages_with(&self, pending: &Turn) -> Vec<Message> {
        let skip = (self.turns.len() + 1).saturating_sub(self.capacity);
        self.turns
            .iter()
            .skip(skip)
            .chain(std::iter::once(pending))
            .map(Message::from)
            .collect()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
