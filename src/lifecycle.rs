//! 绑定生命周期编排
//!
//! - `install_all`：先同步预检冲突，命中则零会话触碰直接失败；
//!   放行后运行覆盖自检并逐会话绑定（顺序无关、各自幂等）
//! - `uninstall_all`：停机时逐会话解绑
//! - `on_session_join`：新会话加入时立即绑定

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::InterceptConfig;
use crate::conflict::{ConflictDetector, Preflight};
use crate::error::{InterceptError, Result};
use crate::installer::HookInstaller;
use crate::interceptor::{DispatchTable, MessageInterceptor};
use crate::message::InterceptPolicy;
use crate::metrics::InterceptMetrics;
use crate::monitor::HealthMonitor;
use crate::registry::ConnectionRegistry;
use crate::session::SessionId;
use crate::traits::{
    ComponentDirectory, CriticalFailureHandler, ProtocolCatalog, Scheduler, SessionDirectory,
};

/// 绑定生命周期
pub struct BindingLifecycle {
    detector: Arc<ConflictDetector>,
    installer: Arc<HookInstaller>,
    interceptor: Arc<MessageInterceptor>,
    registry: Arc<ConnectionRegistry>,
    sessions: Arc<dyn SessionDirectory>,
    catalog: Arc<dyn ProtocolCatalog>,
}

impl BindingLifecycle {
    pub fn builder() -> LifecycleBuilder {
        LifecycleBuilder::default()
    }

    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn interceptor(&self) -> Arc<MessageInterceptor> {
        Arc::clone(&self.interceptor)
    }

    pub fn installer(&self) -> Arc<HookInstaller> {
        Arc::clone(&self.installer)
    }

    /// 为所有已连接会话安装挂钩
    ///
    /// 预检完全同步且先于任何会话改动：检出冲突即保证零会话被触碰
    pub fn install_all(&self) -> bool {
        if let Preflight::Conflict { identity } = self.detector.preflight() {
            error!(
                component = %identity,
                "failed to install connection hooks for message interception"
            );
            error!(
                component = %identity,
                "an incompatible component is active, interception stays disabled"
            );
            error!(
                component = %identity,
                "disable the conflicting component and reinstall to restore interception"
            );
            return false;
        }

        self.interceptor
            .verify_coverage(&self.catalog.inbound_kinds());

        let sessions = self.sessions.connected_sessions();
        let mut bound = 0usize;
        for session in &sessions {
            match self.installer.bind(session) {
                Ok(_) => bound += 1,
                Err(err) => {
                    warn!(session = %session, error = %err, "failed to bind session");
                }
            }
        }
        info!(total = sessions.len(), bound, "connection hooks installed");
        true
    }

    /// 卸下所有已连接会话的挂钩（停机路径）
    pub fn uninstall_all(&self) -> bool {
        for session in self.sessions.connected_sessions() {
            if let Err(err) = self.installer.unbind(&session) {
                warn!(session = %session, error = %err, "failed to unbind session");
            }
        }
        info!("connection hooks removed");
        true
    }

    /// 新会话加入：立即绑定
    ///
    /// 加入通知晚于记录创建，记录缺失按注册竞争记录
    pub fn on_session_join(&self, session: &SessionId) {
        if let Err(err) = self.installer.bind(session) {
            warn!(session = %session, error = %err, "failed to bind joining session");
        }
    }
}

/// 生命周期装配器
#[derive(Default)]
pub struct LifecycleBuilder {
    config: InterceptConfig,
    table: Option<DispatchTable>,
    policy: Option<Arc<dyn InterceptPolicy>>,
    scheduler: Option<Arc<dyn Scheduler>>,
    sessions: Option<Arc<dyn SessionDirectory>>,
    components: Option<Arc<dyn ComponentDirectory>>,
    failures: Option<Arc<dyn CriticalFailureHandler>>,
    catalog: Option<Arc<dyn ProtocolCatalog>>,
    metrics: Option<Arc<InterceptMetrics>>,
}

impl LifecycleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: InterceptConfig) -> Self {
        self.config = config;
        self
    }

    /// 覆盖由配置生成的调度表
    pub fn with_dispatch_table(mut self, table: DispatchTable) -> Self {
        self.table = Some(table);
        self
    }

    pub fn with_policy(mut self, policy: Arc<dyn InterceptPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn with_sessions(mut self, sessions: Arc<dyn SessionDirectory>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn with_components(mut self, components: Arc<dyn ComponentDirectory>) -> Self {
        self.components = Some(components);
        self
    }

    pub fn with_failure_handler(mut self, failures: Arc<dyn CriticalFailureHandler>) -> Self {
        self.failures = Some(failures);
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn ProtocolCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<InterceptMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Result<BindingLifecycle> {
        let policy = self.policy.ok_or_else(|| missing("policy"))?;
        let scheduler = self.scheduler.ok_or_else(|| missing("scheduler"))?;
        let sessions = self.sessions.ok_or_else(|| missing("session directory"))?;
        let components = self.components.ok_or_else(|| missing("component directory"))?;
        let failures = self.failures.ok_or_else(|| missing("failure handler"))?;
        let catalog = self.catalog.ok_or_else(|| missing("protocol catalog"))?;

        let metrics = match self.metrics {
            Some(metrics) => metrics,
            None => Arc::new(
                InterceptMetrics::new(&prometheus::Registry::new())
                    .map_err(|err| InterceptError::Configuration(err.to_string()))?,
            ),
        };

        let registry = ConnectionRegistry::new(
            self.config.registry_retry_delay_cycles,
            Arc::clone(&metrics),
        );
        let table = self
            .table
            .unwrap_or_else(|| DispatchTable::from_config(&self.config.dispatch));
        let interceptor = MessageInterceptor::new(
            policy,
            table,
            Arc::clone(&registry),
            Arc::clone(&metrics),
        );
        let detector = Arc::new(ConflictDetector::new(
            self.config.incompatible.clone(),
            components,
        ));
        let monitor = HealthMonitor::new(
            Arc::clone(&registry),
            Arc::clone(&scheduler),
            Arc::clone(&failures),
            Arc::clone(&metrics),
            self.config.health_check_delay_cycles,
        );
        let installer = HookInstaller::new(
            Arc::clone(&registry),
            Arc::clone(&detector),
            Arc::clone(&interceptor),
            monitor,
            scheduler,
            failures,
            metrics,
        );

        Ok(BindingLifecycle {
            detector,
            installer,
            interceptor,
            registry,
            sessions,
            catalog,
        })
    }
}

fn missing(what: &str) -> InterceptError {
    InterceptError::Configuration(format!("lifecycle builder missing {what}"))
}
