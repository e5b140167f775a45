//! 挂钩连接包装器
//!
//! 取代会话原有连接对象的包装器：入站经拦截调度后转发宿主默认处理，
//! 出站经策略闸门后落到同一条传输通道。捕获被替换的连接作为还原目标。

use std::any::Any;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;

use crate::connection::{lock_state, Connection, TransferState};
use crate::error::Result;
use crate::interceptor::MessageInterceptor;
use crate::message::{OutboundFrame, ProtocolMessage, Verdict};
use crate::session::SessionId;
use crate::traits::{InboundProcessor, Transport};

/// 包装器的类型标签
pub const HOOKED_LABEL: &str = "intercept-hook";

/// 已安装的包装连接
pub struct HookedConnection {
    session: SessionId,
    restore: Arc<dyn Connection>,
    transport: Arc<dyn Transport>,
    processor: Arc<dyn InboundProcessor>,
    interceptor: Arc<MessageInterceptor>,
    state: Mutex<TransferState>,
}

impl HookedConnection {
    /// 在 `restore` 之上构建包装器，复用其传输绑定与默认处理入口
    ///
    /// 瞬态状态由安装器随后通过 `restore_state` 迁入
    pub fn install(
        session: SessionId,
        restore: Arc<dyn Connection>,
        interceptor: Arc<MessageInterceptor>,
    ) -> Arc<Self> {
        let transport = restore.transport();
        let processor = restore.processor();
        Arc::new(Self {
            session,
            restore,
            transport,
            processor,
            interceptor,
            state: Mutex::new(TransferState::default()),
        })
    }

    /// 被替换的连接对象，解绑时还原
    pub fn restore_target(&self) -> Arc<dyn Connection> {
        Arc::clone(&self.restore)
    }

    async fn forward_outbound(&self, message: &ProtocolMessage) -> Result<()> {
        lock_state(&self.state).mark_outbound(message);
        self.transport.transmit(message).await?;
        lock_state(&self.state).confirm_outbound();
        Ok(())
    }
}

#[async_trait]
impl Connection for HookedConnection {
    fn session_id(&self) -> &SessionId {
        &self.session
    }

    fn type_label(&self) -> &'static str {
        HOOKED_LABEL
    }

    fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    fn processor(&self) -> Arc<dyn InboundProcessor> {
        Arc::clone(&self.processor)
    }

    async fn handle_inbound(&self, message: &ProtocolMessage) -> Result<()> {
        match self
            .interceptor
            .dispatch_inbound(&self.session, message)
            .await
        {
            Verdict::Allow => {
                lock_state(&self.state).mark_inbound();
                self.processor.process(&self.session, message).await
            }
            Verdict::Deny => {
                // 被否决的消息在此终止，不进入默认处理
                Ok(())
            }
        }
    }

    async fn send(&self, frame: OutboundFrame) -> Result<()> {
        if frame.is_silent() {
            // 静默帧短路：不再进入出站策略，保证恰好转发一次
            self.interceptor.note_silent_send();
            debug!(session = %self.session, kind = %frame.message.kind, "silent send");
            return self.forward_outbound(&frame.message).await;
        }

        match self
            .interceptor
            .dispatch_outbound(&self.session, &frame.message)
            .await
        {
            Verdict::Allow => self.forward_outbound(&frame.message).await,
            Verdict::Deny => Ok(()),
        }
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
