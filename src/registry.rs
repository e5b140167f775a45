//! 连接注册表
//!
//! - 会话到活跃连接对象的唯一映射，所有安装/移除经由此处
//! - 单把互斥锁保护的顺序扫描替换，与宿主侧列表语义一致
//! - 记录缺失时重试恰好一次，再失败则告警放弃：有界的数据丢失窗口

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{error, warn};

use crate::connection::Connection;
use crate::metrics::InterceptMetrics;
use crate::session::SessionId;
use crate::traits::Scheduler;

/// 注册结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// 找到记录并替换了连接引用
    Replaced,
    /// 记录缺失，已安排下个周期重试一次
    Retried,
    /// 重试后仍缺失，放弃
    Abandoned,
}

struct ConnectionRecord {
    session: SessionId,
    connection: Arc<dyn Connection>,
}

/// 连接注册表
pub struct ConnectionRegistry {
    records: Mutex<Vec<ConnectionRecord>>,
    retry_delay_cycles: u32,
    metrics: Arc<InterceptMetrics>,
}

impl ConnectionRegistry {
    pub fn new(retry_delay_cycles: u32, metrics: Arc<InterceptMetrics>) -> Arc<Self> {
        Arc::new(Self {
            records: Mutex::new(Vec::new()),
            retry_delay_cycles,
            metrics,
        })
    }

    fn records(&self) -> MutexGuard<'_, Vec<ConnectionRecord>> {
        match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// 宿主在会话加入时建立记录；已存在则替换
    pub fn attach(&self, session: SessionId, connection: Arc<dyn Connection>) {
        let mut records = self.records();
        for record in records.iter_mut() {
            if record.session == session {
                record.connection = connection;
                return;
            }
        }
        records.push(ConnectionRecord {
            session,
            connection,
        });
    }

    /// 宿主在会话断开时移除记录
    pub fn detach(&self, session: &SessionId) {
        self.records().retain(|record| record.session != *session);
    }

    /// 查找会话的活跃连接
    pub fn lookup(&self, session: &SessionId) -> Option<Arc<dyn Connection>> {
        self.records()
            .iter()
            .find(|record| record.session == *session)
            .map(|record| Arc::clone(&record.connection))
    }

    /// 覆盖会话记录中的连接引用
    ///
    /// 记录缺失且 `allow_retry` 时在下个调度周期重试一次（重试不再允许
    /// 二次重试）；仍缺失则按严重级别记录并放弃
    pub fn register(
        self: &Arc<Self>,
        session: &SessionId,
        connection: Arc<dyn Connection>,
        allow_retry: bool,
        scheduler: &Arc<dyn Scheduler>,
    ) -> RegisterOutcome {
        {
            let mut records = self.records();
            for record in records.iter_mut() {
                if record.session == *session {
                    record.connection = connection;
                    return RegisterOutcome::Replaced;
                }
            }
        }

        if allow_retry {
            self.metrics.registry_retries.inc();
            warn!(
                session = %session,
                "connection record missing, retrying registration on next cycle"
            );
            let registry = Arc::clone(self);
            let retry_session = session.clone();
            let retry_scheduler = Arc::clone(scheduler);
            scheduler.schedule(
                self.retry_delay_cycles,
                Box::new(move || {
                    registry.register(&retry_session, connection, false, &retry_scheduler);
                }),
            );
            RegisterOutcome::Retried
        } else {
            self.metrics.registry_abandons.inc();
            error!(
                session = %session,
                "failed to (un)register connection proxy, interception state may be inconsistent"
            );
            RegisterOutcome::Abandoned
        }
    }

    /// 当前记录数
    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }

    /// 当前记录的快照
    pub fn snapshot(&self) -> Vec<(SessionId, Arc<dyn Connection>)> {
        self.records()
            .iter()
            .map(|record| (record.session.clone(), Arc::clone(&record.connection)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::NativeConnection;
    use crate::error::Result;
    use crate::message::ProtocolMessage;
    use crate::scheduler::TickScheduler;
    use crate::traits::{InboundProcessor, Transport};
    use async_trait::async_trait;
    use prometheus::Registry;

    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        async fn transmit(&self, _message: &ProtocolMessage) -> Result<()> {
            Ok(())
        }
    }

    struct NullProcessor;

    #[async_trait]
    impl InboundProcessor for NullProcessor {
        async fn process(&self, _session: &SessionId, _message: &ProtocolMessage) -> Result<()> {
            Ok(())
        }
    }

    fn native(session: &SessionId) -> Arc<dyn Connection> {
        NativeConnection::new(
            session.clone(),
            Arc::new(NullTransport),
            Arc::new(NullProcessor),
        )
    }

    fn registry() -> Arc<ConnectionRegistry> {
        let metrics = Arc::new(InterceptMetrics::new(&Registry::new()).unwrap());
        ConnectionRegistry::new(1, metrics)
    }

    /// 测试：注册替换已有记录
    #[test]
    fn test_register_replaces_existing_record() {
        let registry = registry();
        let scheduler: Arc<dyn Scheduler> = Arc::new(TickScheduler::new());
        let session = SessionId::new();

        let first = native(&session);
        registry.attach(session.clone(), Arc::clone(&first));

        let second = native(&session);
        let outcome = registry.register(&session, Arc::clone(&second), true, &scheduler);
        assert_eq!(outcome, RegisterOutcome::Replaced);

        let found = registry.lookup(&session).unwrap();
        assert!(Arc::ptr_eq(&found, &second));
        assert_eq!(registry.len(), 1, "at most one record per session");
    }

    /// 测试：记录缺失时恰好重试一次，再失败则放弃
    #[test]
    fn test_register_retries_exactly_once() {
        let registry = registry();
        let tick = Arc::new(TickScheduler::new());
        let scheduler: Arc<dyn Scheduler> = tick.clone();
        let session = SessionId::new();

        let outcome = registry.register(&session, native(&session), true, &scheduler);
        assert_eq!(outcome, RegisterOutcome::Retried);
        assert!(registry.is_empty());

        // 重试周期到来，记录仍缺失：放弃，不再排第二次重试
        tick.advance();
        assert!(registry.is_empty());
        assert_eq!(tick.pending_tasks(), 0, "no second retry scheduled");
        assert_eq!(registry.metrics.registry_abandons.get(), 1);
    }

    /// 测试：重试周期内记录出现则补登成功
    #[test]
    fn test_retry_succeeds_when_record_appears() {
        let registry = registry();
        let tick = Arc::new(TickScheduler::new());
        let scheduler: Arc<dyn Scheduler> = tick.clone();
        let session = SessionId::new();

        let replacement = native(&session);
        registry.register(&session, Arc::clone(&replacement), true, &scheduler);

        // 宿主在下个周期前补上了记录
        registry.attach(session.clone(), native(&session));
        tick.advance();

        let found = registry.lookup(&session).unwrap();
        assert!(Arc::ptr_eq(&found, &replacement));
        assert_eq!(registry.metrics.registry_abandons.get(), 0);
    }

    /// 测试：detach 移除记录
    #[test]
    fn test_detach_removes_record() {
        let registry = registry();
        let session = SessionId::new();
        registry.attach(session.clone(), native(&session));
        registry.detach(&session);
        assert!(registry.lookup(&session).is_none());
    }
}
