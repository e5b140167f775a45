//! 挂钩安装器
//!
//! 按会话创建/销毁包装连接：幂等绑定、显式状态迁移、经注册表发布、
//! 安排安装后健康检查。遇到异类挂钩只中止当前会话并通知关键失败，
//! 绝不破坏现有连接对象。

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::conflict::ConflictDetector;
use crate::connection::Connection;
use crate::error::{InterceptError, Result};
use crate::hooked::HookedConnection;
use crate::interceptor::MessageInterceptor;
use crate::metrics::InterceptMetrics;
use crate::monitor::HealthMonitor;
use crate::registry::ConnectionRegistry;
use crate::session::SessionId;
use crate::traits::{CriticalFailureHandler, Scheduler};

/// 绑定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// 新装了包装器
    Bound,
    /// 该会话已是本系统的包装器，幂等跳过
    AlreadyBound,
}

/// 解绑结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnbindOutcome {
    /// 还原了被替换的连接对象
    Restored,
    /// 当前连接不是本系统的包装器，无事可做
    NotHooked,
}

/// 挂钩安装器
pub struct HookInstaller {
    registry: Arc<ConnectionRegistry>,
    detector: Arc<ConflictDetector>,
    interceptor: Arc<MessageInterceptor>,
    monitor: Arc<HealthMonitor>,
    scheduler: Arc<dyn Scheduler>,
    failures: Arc<dyn CriticalFailureHandler>,
    metrics: Arc<InterceptMetrics>,
}

impl HookInstaller {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        detector: Arc<ConflictDetector>,
        interceptor: Arc<MessageInterceptor>,
        monitor: Arc<HealthMonitor>,
        scheduler: Arc<dyn Scheduler>,
        failures: Arc<dyn CriticalFailureHandler>,
        metrics: Arc<InterceptMetrics>,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            detector,
            interceptor,
            monitor,
            scheduler,
            failures,
            metrics,
        })
    }

    /// 为会话安装包装器
    ///
    /// 幂等：已装则跳过；异类挂钩按会话中止；记录缺失视作注册竞争
    pub fn bind(&self, session: &SessionId) -> Result<BindOutcome> {
        let current = match self.registry.lookup(session) {
            Some(connection) => connection,
            None => {
                self.metrics.bind_failures.inc();
                warn!(session = %session, "bind requested but connection record missing");
                return Err(InterceptError::RegistryRace {
                    session: session.clone(),
                });
            }
        };

        if current.as_any().is::<HookedConnection>() {
            return Ok(BindOutcome::AlreadyBound);
        }

        if self.detector.is_foreign(current.as_ref()) {
            return Err(self.report_foreign(session, current.type_label()));
        }

        let hooked = HookedConnection::install(
            session.clone(),
            Arc::clone(&current),
            Arc::clone(&self.interceptor),
        );
        // 显式状态迁移：旧对象自此惰性
        hooked.restore_state(current.take_state());

        let replacement: Arc<dyn Connection> = hooked;
        self.registry
            .register(session, Arc::clone(&replacement), true, &self.scheduler);
        self.monitor
            .schedule_check(session.clone(), Arc::clone(&replacement));
        self.metrics.active_hooks.inc();
        debug!(session = %session, "connection hook installed");
        Ok(BindOutcome::Bound)
    }

    /// 卸下会话的包装器，还原被替换的连接对象
    pub fn unbind(&self, session: &SessionId) -> Result<UnbindOutcome> {
        let current = match self.registry.lookup(session) {
            Some(connection) => connection,
            None => {
                debug!(session = %session, "unbind requested but session already gone");
                return Ok(UnbindOutcome::NotHooked);
            }
        };

        let restore = match current.as_any().downcast_ref::<HookedConnection>() {
            Some(hooked) => hooked.restore_target(),
            None => {
                if self.detector.is_foreign(current.as_ref()) {
                    return Err(self.report_foreign(session, current.type_label()));
                }
                return Ok(UnbindOutcome::NotHooked);
            }
        };

        // 反向状态迁移
        restore.restore_state(current.take_state());
        self.registry
            .register(session, restore, true, &self.scheduler);
        self.metrics.active_hooks.dec();
        debug!(session = %session, "connection hook removed");
        Ok(UnbindOutcome::Restored)
    }

    fn report_foreign(&self, session: &SessionId, type_label: &str) -> InterceptError {
        self.metrics.bind_failures.inc();
        error!(
            session = %session,
            found = type_label,
            "failed to hook up the session connection to listen for received and sent messages"
        );
        error!(
            session = %session,
            "this was caused by a component conflict: another component already replaced the connection"
        );
        self.failures.on_critical_failure();
        InterceptError::ForeignHook {
            session: session.clone(),
            type_label: type_label.to_string(),
        }
    }
}
