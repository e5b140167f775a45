//! 默认调度器实现
//!
//! 协作式单线程调度循环的最小形态：宿主每个周期调用一次 `advance`，
//! 或用 `drive` 交给 tokio 定时驱动。到期任务在锁外执行，执行时刻
//! 严格晚于注册所在的周期。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::debug;

use crate::traits::{DeferredTask, Scheduler};

struct PendingTask {
    due_cycle: u64,
    task: DeferredTask,
}

/// 周期计数调度器
pub struct TickScheduler {
    current_cycle: AtomicU64,
    pending: Mutex<Vec<PendingTask>>,
}

impl Default for TickScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TickScheduler {
    pub fn new() -> Self {
        Self {
            current_cycle: AtomicU64::new(0),
            pending: Mutex::new(Vec::new()),
        }
    }

    fn pending(&self) -> MutexGuard<'_, Vec<PendingTask>> {
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// 当前周期号
    pub fn cycle(&self) -> u64 {
        self.current_cycle.load(Ordering::SeqCst)
    }

    /// 待执行任务数
    pub fn pending_tasks(&self) -> usize {
        self.pending().len()
    }

    /// 推进一个周期并执行全部到期任务
    pub fn advance(&self) {
        let cycle = self.current_cycle.fetch_add(1, Ordering::SeqCst) + 1;

        let due = {
            let mut pending = self.pending();
            let mut due = Vec::new();
            let mut index = 0;
            while index < pending.len() {
                if pending[index].due_cycle <= cycle {
                    due.push(pending.swap_remove(index).task);
                } else {
                    index += 1;
                }
            }
            due
        };

        if !due.is_empty() {
            debug!(cycle, tasks = due.len(), "running deferred tasks");
        }
        for task in due {
            task();
        }
    }

    /// 用 tokio 定时器按固定间隔驱动调度循环
    pub async fn drive(self: Arc<Self>, tick: Duration) {
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.advance();
        }
    }
}

impl Scheduler for TickScheduler {
    fn schedule(&self, delay_cycles: u32, task: DeferredTask) {
        // 至少推迟到下一个周期，保证不在注册所在周期内执行
        let delay = u64::from(delay_cycles.max(1));
        let due_cycle = self.current_cycle.load(Ordering::SeqCst) + delay;
        self.pending().push(PendingTask { due_cycle, task });
    }
}
