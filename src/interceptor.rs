//! 消息拦截调度
//!
//! - 一张按消息类型标识索引的调度表取代逐类型的覆写方法
//! - 入站按表决定是否进入策略；出站除静默帧外一律进入策略
//! - 覆盖自检只在启动期运行，缺口记告警不记错误

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashSet;
use tracing::{debug, warn};

use crate::config::DispatchTableConfig;
use crate::error::{InterceptError, Result};
use crate::message::{Direction, InterceptPolicy, MessageKind, OutboundFrame, ProtocolMessage, Verdict};
use crate::metrics::InterceptMetrics;
use crate::registry::ConnectionRegistry;
use crate::session::SessionId;

/// 单个消息类型的调度方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// 进入策略判定
    Intercept,
    /// 显式透传，不消耗策略调用
    Bypass,
}

/// 入站调度表
#[derive(Debug, Default, Clone)]
pub struct DispatchTable {
    entries: HashMap<MessageKind, DispatchMode>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &DispatchTableConfig) -> Self {
        let mut table = Self::new();
        for id in &config.intercept {
            table.insert(MessageKind(*id), DispatchMode::Intercept);
        }
        for id in &config.bypass {
            table.insert(MessageKind(*id), DispatchMode::Bypass);
        }
        table
    }

    pub fn insert(&mut self, kind: MessageKind, mode: DispatchMode) {
        self.entries.insert(kind, mode);
    }

    pub fn mode_for(&self, kind: MessageKind) -> Option<DispatchMode> {
        self.entries.get(&kind).copied()
    }

    pub fn contains(&self, kind: MessageKind) -> bool {
        self.entries.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 消息拦截调度器
///
/// 被包装连接在每条消息上调用；策略在投递消息的上下文执行，
/// 期间不持有任何注册表锁
pub struct MessageInterceptor {
    policy: Arc<dyn InterceptPolicy>,
    table: DispatchTable,
    registry: Arc<ConnectionRegistry>,
    metrics: Arc<InterceptMetrics>,
    warned_gaps: DashSet<MessageKind>,
}

impl MessageInterceptor {
    pub fn new(
        policy: Arc<dyn InterceptPolicy>,
        table: DispatchTable,
        registry: Arc<ConnectionRegistry>,
        metrics: Arc<InterceptMetrics>,
    ) -> Arc<Self> {
        Arc::new(Self {
            policy,
            table,
            registry,
            metrics,
            warned_gaps: DashSet::new(),
        })
    }

    pub fn table(&self) -> &DispatchTable {
        &self.table
    }

    /// 入站调度：否决即丢弃，放行则由包装器转发给默认处理
    pub async fn dispatch_inbound(
        &self,
        session: &SessionId,
        message: &ProtocolMessage,
    ) -> Verdict {
        match self.table.mode_for(message.kind) {
            Some(DispatchMode::Intercept) => {
                let verdict = self
                    .policy
                    .decide(session, message, Direction::Inbound)
                    .await;
                match verdict {
                    Verdict::Allow => self.metrics.inbound_allowed.inc(),
                    Verdict::Deny => {
                        self.metrics.inbound_denied.inc();
                        debug!(session = %session, kind = %message.kind, "inbound message vetoed");
                    }
                }
                verdict
            }
            Some(DispatchMode::Bypass) => {
                self.metrics.inbound_bypassed.inc();
                Verdict::Allow
            }
            None => {
                self.metrics.dispatch_gaps.inc();
                if self.warned_gaps.insert(message.kind) {
                    warn!(
                        kind = %message.kind,
                        "no dispatch entry for inbound kind, forwarding without interception"
                    );
                }
                Verdict::Allow
            }
        }
    }

    /// 出站调度：静默帧在包装器中短路，不会到达这里
    pub async fn dispatch_outbound(
        &self,
        session: &SessionId,
        message: &ProtocolMessage,
    ) -> Verdict {
        let verdict = self
            .policy
            .decide(session, message, Direction::Outbound)
            .await;
        match verdict {
            Verdict::Allow => self.metrics.outbound_allowed.inc(),
            Verdict::Deny => {
                self.metrics.outbound_denied.inc();
                debug!(session = %session, kind = %message.kind, "outbound message vetoed");
            }
        }
        verdict
    }

    pub(crate) fn note_silent_send(&self) {
        self.metrics.silent_sends.inc();
    }

    /// 拥有组件的静默发送入口
    ///
    /// 按调用时刻的活跃连接发送，帧携带静默标记，恰好转发一次且
    /// 不触发出站策略
    pub async fn send_silent(&self, session: &SessionId, message: ProtocolMessage) -> Result<()> {
        let connection = self
            .registry
            .lookup(session)
            .ok_or_else(|| InterceptError::RegistryRace {
                session: session.clone(),
            })?;
        connection.send(OutboundFrame::silent(message)).await
    }

    /// 启动期覆盖自检：对声明的入站类型逐个核对调度表
    ///
    /// 缺口只告警，覆盖是尽力而为
    pub fn verify_coverage(&self, declared: &[MessageKind]) {
        for kind in declared {
            if !self.table.contains(*kind) {
                warn!(
                    kind = %kind,
                    "inbound kind declared by the transport has no dispatch entry"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use prometheus::Registry;

    struct DenyAll;

    #[async_trait]
    impl InterceptPolicy for DenyAll {
        async fn decide(
            &self,
            _session: &SessionId,
            _message: &ProtocolMessage,
            _direction: Direction,
        ) -> Verdict {
            Verdict::Deny
        }
    }

    fn interceptor(table: DispatchTable) -> Arc<MessageInterceptor> {
        let metrics = Arc::new(InterceptMetrics::new(&Registry::new()).unwrap());
        let registry = ConnectionRegistry::new(1, Arc::clone(&metrics));
        MessageInterceptor::new(Arc::new(DenyAll), table, registry, metrics)
    }

    /// 测试：表内类型进入策略，否决计数
    #[tokio::test]
    async fn test_intercept_entry_consults_policy() {
        let mut table = DispatchTable::new();
        table.insert(MessageKind(7), DispatchMode::Intercept);
        let interceptor = interceptor(table);

        let msg = ProtocolMessage::new(7u16, bytes::Bytes::new());
        let verdict = interceptor.dispatch_inbound(&SessionId::new(), &msg).await;
        assert_eq!(verdict, Verdict::Deny);
        assert_eq!(interceptor.metrics.inbound_denied.get(), 1);
    }

    /// 测试：缺口类型透传且只告警一次
    #[tokio::test]
    async fn test_dispatch_gap_bypasses_policy() {
        let interceptor = interceptor(DispatchTable::new());

        let msg = ProtocolMessage::new(42u16, bytes::Bytes::new());
        let session = SessionId::new();
        assert_eq!(
            interceptor.dispatch_inbound(&session, &msg).await,
            Verdict::Allow,
            "unknown kind must bypass the policy"
        );
        interceptor.dispatch_inbound(&session, &msg).await;

        assert_eq!(interceptor.metrics.dispatch_gaps.get(), 2);
        assert_eq!(interceptor.metrics.inbound_denied.get(), 0);
        assert_eq!(interceptor.warned_gaps.len(), 1, "warn-once per kind");
    }

    /// 测试：显式透传不消耗策略调用
    #[tokio::test]
    async fn test_explicit_bypass() {
        let mut table = DispatchTable::new();
        table.insert(MessageKind(9), DispatchMode::Bypass);
        let interceptor = interceptor(table);

        let msg = ProtocolMessage::new(9u16, bytes::Bytes::new());
        assert_eq!(
            interceptor.dispatch_inbound(&SessionId::new(), &msg).await,
            Verdict::Allow
        );
        assert_eq!(interceptor.metrics.inbound_bypassed.get(), 1);
    }

    /// 测试：静默发送在无记录时报注册竞争
    #[tokio::test]
    async fn test_send_silent_without_record() {
        let interceptor = interceptor(DispatchTable::new());
        let result = interceptor
            .send_silent(&SessionId::new(), ProtocolMessage::new(1u16, bytes::Bytes::new()))
            .await;
        assert!(matches!(result, Err(InterceptError::RegistryRace { .. })));
    }
}
