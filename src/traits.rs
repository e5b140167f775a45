//! 宿主协作接口
//!
//! 核心只依赖这些契约，具体实现（调度循环、会话枚举、组件目录、
//! 传输通道、默认入站处理）全部由宿主提供

use async_trait::async_trait;

use crate::error::Result;
use crate::message::{MessageKind, ProtocolMessage};
use crate::session::SessionId;

/// 延迟任务：一次性闭包，不可取消，在协作调度循环上执行
pub type DeferredTask = Box<dyn FnOnce() + Send + 'static>;

/// 延迟调度器
///
/// `schedule` 注册一个在 N 个调度周期后执行一次的任务，
/// 执行严格晚于注册所在的周期
pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay_cycles: u32, task: DeferredTask);
}

/// 会话枚举，由宿主维护
pub trait SessionDirectory: Send + Sync {
    /// 当前已连接会话的有序序列
    fn connected_sessions(&self) -> Vec<SessionId>;
}

/// 组件目录：已安装组件的查询入口
///
/// 对应冲突检测所需的"某组件当前是否活跃"与身份解析
pub trait ComponentDirectory: Send + Sync {
    fn is_active(&self, name: &str) -> bool;

    /// 解析组件的可展示身份；无法解析时返回 None
    fn resolve(&self, name: &str) -> Option<String>;
}

/// 自愈不可能时对拥有组件的关键失败通知
pub trait CriticalFailureHandler: Send + Sync {
    fn on_critical_failure(&self);
}

/// 传输通道绑定；套接字归宿主所有
#[async_trait]
pub trait Transport: Send + Sync {
    async fn transmit(&self, message: &ProtocolMessage) -> Result<()>;
}

/// 宿主的默认入站处理
///
/// 被放行的入站消息原样进入该处理；被否决的消息永远到不了这里
#[async_trait]
pub trait InboundProcessor: Send + Sync {
    async fn process(&self, session: &SessionId, message: &ProtocolMessage) -> Result<()>;
}

/// 协议目录：基础传输声明可接收的全部入站消息类型
///
/// 仅用于启动期的调度表覆盖自检
pub trait ProtocolCatalog: Send + Sync {
    fn inbound_kinds(&self) -> Vec<MessageKind>;
}
