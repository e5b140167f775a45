//! 安装后健康检查
//!
//! 绑定完成后安排一次延迟检查：到期时若会话记录的连接已不是当初安装
//! 的对象，说明挂钩被其他组件替换，触发关键失败通知。检查不可取消；
//! 会话已消失则静默跳过。

use std::sync::Arc;

use tracing::error;

use crate::connection::Connection;
use crate::metrics::InterceptMetrics;
use crate::registry::ConnectionRegistry;
use crate::session::SessionId;
use crate::traits::{CriticalFailureHandler, Scheduler};

/// 健康监视器
pub struct HealthMonitor {
    registry: Arc<ConnectionRegistry>,
    scheduler: Arc<dyn Scheduler>,
    failures: Arc<dyn CriticalFailureHandler>,
    metrics: Arc<InterceptMetrics>,
    delay_cycles: u32,
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        scheduler: Arc<dyn Scheduler>,
        failures: Arc<dyn CriticalFailureHandler>,
        metrics: Arc<InterceptMetrics>,
        delay_cycles: u32,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            scheduler,
            failures,
            metrics,
            delay_cycles,
        })
    }

    /// 安排一次针对 `session` 的移位检查
    ///
    /// 到期时重新校验现场：记录消失→无事；对象不再指针相等→移位，
    /// 记录错误并通知关键失败；未变→无事
    pub fn schedule_check(&self, session: SessionId, expected: Arc<dyn Connection>) {
        let registry = Arc::clone(&self.registry);
        let failures = Arc::clone(&self.failures);
        let metrics = Arc::clone(&self.metrics);

        self.scheduler.schedule(
            self.delay_cycles,
            Box::new(move || {
                let Some(active) = registry.lookup(&session) else {
                    // 会话已断开，检查过期作废
                    return;
                };
                if !Arc::ptr_eq(&active, &expected) {
                    metrics.displacements.inc();
                    error!(
                        session = %session,
                        found = active.type_label(),
                        "installed hook displaced after bind"
                    );
                    failures.on_critical_failure();
                }
            }),
        );
    }
}
