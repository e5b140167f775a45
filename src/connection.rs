//! 连接对象模型与状态迁移
//!
//! - `Connection` 是注册表记录的对象形态：原生连接、本系统包装器，
//!   以及任何第三方挂钩（异类）都以该 trait 对象出现
//! - `TransferState` 把需要迁移的瞬态字段显式列出，取代对连接内部
//!   布局的反射式拷贝

use std::any::Any;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::message::{OutboundFrame, ProtocolMessage};
use crate::session::SessionId;
use crate::traits::{InboundProcessor, Transport};

/// 原生连接的类型标签
pub const NATIVE_LABEL: &str = "native";

/// 连接间迁移的瞬态状态
///
/// 字段即迁移清单：出站队列、序号与保活计数、计时窗口。
/// `take` 之后源对象归于惰性
#[derive(Debug, Default)]
pub struct TransferState {
    /// 尚未确认送出的出站消息
    pub outbound_queue: VecDeque<ProtocolMessage>,
    /// 出站序号计数
    pub sequence: u64,
    /// 入站保活计数
    pub keepalive: u64,
    /// 计时窗口起点
    pub window_opened_at: Option<DateTime<Utc>>,
    /// 最近一次活动时刻
    pub last_activity_at: Option<DateTime<Utc>>,
}

impl TransferState {
    pub fn opened_now() -> Self {
        Self {
            window_opened_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    pub(crate) fn mark_inbound(&mut self) {
        self.keepalive = self.keepalive.wrapping_add(1);
        self.last_activity_at = Some(Utc::now());
    }

    pub(crate) fn mark_outbound(&mut self, message: &ProtocolMessage) {
        self.sequence = self.sequence.wrapping_add(1);
        self.outbound_queue.push_back(message.clone());
        self.last_activity_at = Some(Utc::now());
    }

    pub(crate) fn confirm_outbound(&mut self) {
        self.outbound_queue.pop_front();
    }
}

/// 会话的活跃连接对象
#[async_trait]
pub trait Connection: Send + Sync {
    fn session_id(&self) -> &SessionId;

    /// 类型标签，用于异类识别与冲突日志
    fn type_label(&self) -> &'static str;

    /// 该连接绑定的传输通道（归宿主所有）
    fn transport(&self) -> Arc<dyn Transport>;

    /// 宿主的默认入站处理入口
    fn processor(&self) -> Arc<dyn InboundProcessor>;

    /// 投递一条入站消息
    async fn handle_inbound(&self, message: &ProtocolMessage) -> Result<()>;

    /// 发送一条出站帧
    async fn send(&self, frame: OutboundFrame) -> Result<()>;

    /// 取走瞬态状态，源对象随即惰性
    fn take_state(&self) -> TransferState;

    /// 写入迁移来的瞬态状态
    fn restore_state(&self, state: TransferState);

    fn as_any(&self) -> &dyn Any;
}

/// 互斥锁中毒时恢复内部值；临界区内不会留下破坏性中间态
pub(crate) fn lock_state(state: &Mutex<TransferState>) -> MutexGuard<'_, TransferState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// 原生连接：宿主默认连接类型的模型
///
/// 入站直通默认处理，出站直达传输，同时维护瞬态状态
pub struct NativeConnection {
    session: SessionId,
    transport: Arc<dyn Transport>,
    processor: Arc<dyn InboundProcessor>,
    state: Mutex<TransferState>,
}

impl NativeConnection {
    pub fn new(
        session: SessionId,
        transport: Arc<dyn Transport>,
        processor: Arc<dyn InboundProcessor>,
    ) -> Arc<Self> {
        Arc::new(Self {
            session,
            transport,
            processor,
            state: Mutex::new(TransferState::opened_now()),
        })
    }
}

#[async_trait]
impl Connection for NativeConnection {
    fn session_id(&self) -> &SessionId {
        &self.session
    }

    fn type_label(&self) -> &'static str {
        NATIVE_LABEL
    }

    fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    fn processor(&self) -> Arc<dyn InboundProcessor> {
        Arc::clone(&self.processor)
    }

    async fn handle_inbound(&self, message: &ProtocolMessage) -> Result<()> {
        lock_state(&self.state).mark_inbound();
        self.processor.process(&self.session, message).await
    }

    async fn send(&self, frame: OutboundFrame) -> Result<()> {
        lock_state(&self.state).mark_outbound(&frame.message);
        self.transport.transmit(&frame.message).await?;
        lock_state(&self.state).confirm_outbound();
        Ok(())
    }

    fn take_state(&self) -> TransferState {
        std::mem::take(&mut *lock_state(&self.state))
    }

    fn restore_state(&self, state: TransferState) {
        *lock_state(&self.state) = state;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

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

    /// 测试：take_state 之后源连接归于惰性
    #[tokio::test]
    async fn test_take_state_leaves_source_inert() {
        let conn = NativeConnection::new(
            SessionId::new(),
            Arc::new(NullTransport),
            Arc::new(NullProcessor),
        );
        let msg = ProtocolMessage::new(1u16, Bytes::from_static(b"hi"));
        conn.handle_inbound(&msg).await.unwrap();

        let state = conn.take_state();
        assert_eq!(state.keepalive, 1);

        let drained = conn.take_state();
        assert_eq!(drained.keepalive, 0, "source should be inert after take");
        assert!(drained.window_opened_at.is_none());
    }

    /// 测试：出站发送推进序号并清空队列
    #[tokio::test]
    async fn test_send_advances_sequence() {
        let conn = NativeConnection::new(
            SessionId::new(),
            Arc::new(NullTransport),
            Arc::new(NullProcessor),
        );
        let msg = ProtocolMessage::new(2u16, Bytes::from_static(b"out"));
        conn.send(OutboundFrame::new(msg)).await.unwrap();

        let state = conn.take_state();
        assert_eq!(state.sequence, 1);
        assert!(state.outbound_queue.is_empty(), "queue drained on confirm");
    }
}
