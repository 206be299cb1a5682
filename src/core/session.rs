//! 会话状态：对话缓冲、触发计数器与当前阶段
//!
//! 每个会话独占一份，会话开始时创建、结束时丢弃；多个会话之间不共享任何状态，
//! 所有修改都发生在 DialogueOrchestrator::process_turn 的顺序流程里。

use uuid::Uuid;

use crate::ads::TriggerCounter;
use crate::core::DialoguePhase;
use crate::memory::ConversationBuffer;

#[derive(Debug)]
pub struct Session {
    id: Uuid,
    pub(crate) buffer: ConversationBuffer,
    pub(crate) trigger: TriggerCounter,
    phase: DialoguePhase,
}

impl Session {
    pub fn new(buffer_capacity: usize, trigger_threshold: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            buffer: ConversationBuffer::new(buffer_capacity),
            trigger: TriggerCounter::new(trigger_threshold),
            phase: DialoguePhase::Idle,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn buffer(&self) -> &ConversationBuffer {
        &self.buffer
    }

    pub fn phase(&self) -> DialoguePhase {
        self.phase
    }

    pub(crate) fn transition(&mut self, next: DialoguePhase) {
        tracing::trace!(session = %self.id, from = ?self.phase, to = ?next, "phase transition");
        self.phase = next;
    }
}
