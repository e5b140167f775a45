//! 协议消息与拦截策略模型
//!
//! - 核心不解析消息载荷，只关心方向与类型标识
//! - 静默标记使用显式的出站帧字段，调度识别后直接放行，避免二次拦截

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::session::SessionId;

/// 消息类型标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageKind(pub u16);

impl MessageKind {
    pub fn id(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}

impl From<u16> for MessageKind {
    fn from(id: u16) -> Self {
        Self(id)
    }
}

/// 消息方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => write!(f, "inbound"),
            Direction::Outbound => write!(f, "outbound"),
        }
    }
}

/// 协议消息
///
/// 载荷对核心不透明，原样转发或丢弃
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolMessage {
    pub kind: MessageKind,
    pub payload: Bytes,
    pub metadata: HashMap<String, String>,
}

impl ProtocolMessage {
    pub fn new<K: Into<MessageKind>>(kind: K, payload: Bytes) -> Self {
        Self {
            kind: kind.into(),
            payload,
            metadata: HashMap::new(),
        }
    }

    pub fn metadata<T: Into<String>, U: Into<String>>(mut self, key: T, value: U) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// 出站消息帧
///
/// `silent` 为静默标记：携带该标记的帧越过出站策略，保证恰好转发一次
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    pub message: ProtocolMessage,
    silent: bool,
}

impl OutboundFrame {
    pub fn new(message: ProtocolMessage) -> Self {
        Self {
            message,
            silent: false,
        }
    }

    /// 构造静默帧，绕过出站策略的二次拦截
    pub fn silent(message: ProtocolMessage) -> Self {
        Self {
            message,
            silent: true,
        }
    }

    pub fn is_silent(&self) -> bool {
        self.silent
    }
}

/// 拦截判定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny,
}

impl Verdict {
    pub fn is_allow(&self) -> bool {
        matches!(self, Verdict::Allow)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Allow => write!(f, "allow"),
            Verdict::Deny => write!(f, "deny"),
        }
    }
}

/// 拦截策略
///
/// 由拥有组件提供的纯判定函数；在投递消息的任意上下文并发调用，
/// 必须无阻塞，且对静默发送可重入
#[async_trait]
pub trait InterceptPolicy: Send + Sync {
    async fn decide(
        &self,
        session: &SessionId,
        message: &ProtocolMessage,
        direction: Direction,
    ) -> Verdict;
}

#[async_trait]
impl<T> InterceptPolicy for Arc<T>
where
    T: InterceptPolicy + ?Sized,
{
    async fn decide(
        &self,
        session: &SessionId,
        message: &ProtocolMessage,
        direction: Direction,
    ) -> Verdict {
        (**self).decide(session, message, direction).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_marker() {
        let msg = ProtocolMessage::new(3u16, Bytes::from_static(b"ping"));
        assert!(!OutboundFrame::new(msg.clone()).is_silent());
        assert!(OutboundFrame::silent(msg).is_silent());
    }

    #[test]
    fn test_message_kind_display() {
        assert_eq!(MessageKind(255).to_string(), "0xff");
    }
}
