//! 触发计数器
//!
//! 统计自上次广告周期以来完成的用户回合数；计数恰好等于阈值时触发。
//! 调用方在每次触发后必须 reset，因此阈值为 4 时在第 4、8、12… 回合触发。

/// 用户回合计数器（会话内状态，只能通过 record_user_turn / reset 读写）
#[derive(Debug, Clone)]
pub struct TriggerCounter {
    count: usize,
    threshold: usize,
}

impl TriggerCounter {
    /// threshold 为 0 时按 1 处理（配置校验已拒绝 0）
    pub fn new(threshold: usize) -> Self {
        Self {
            count: 0,
            threshold: threshold.max(1),
        }
    }

    /// 计数加一，返回新值是否恰好等于阈值
    pub fn record_user_turn(&mut self) -> bool {
        self.count += 1;
        self.count == self.threshold
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }
}
