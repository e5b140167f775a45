//! 会话连接挂钩与消息拦截引擎
//!
//! 以包装器取代每个会话的活跃连接对象，观察并否决进出该会话的每条
//! 协议消息。核心包括：连接注册表、冲突检测、挂钩安装器、按表调度
//! 的消息拦截、安装后健康自检，以及编排它们的绑定生命周期。
//! 消息载荷对核心不透明；放行/否决交由外部策略决定。

pub mod config;
pub mod conflict;
pub mod connection;
pub mod error;
pub mod hooked;
pub mod installer;
pub mod interceptor;
pub mod lifecycle;
pub mod message;
pub mod metrics;
pub mod monitor;
pub mod registry;
pub mod scheduler;
pub mod session;
pub mod telemetry;
pub mod traits;

pub use config::{DispatchTableConfig, InterceptConfig, InterceptConfigLoader};
pub use conflict::{ConflictDetector, Preflight};
pub use connection::{Connection, NativeConnection, TransferState, NATIVE_LABEL};
pub use error::{InterceptError, Result};
pub use hooked::{HookedConnection, HOOKED_LABEL};
pub use installer::{BindOutcome, HookInstaller, UnbindOutcome};
pub use interceptor::{DispatchMode, DispatchTable, MessageInterceptor};
pub use lifecycle::{BindingLifecycle, LifecycleBuilder};
pub use message::{
    Direction, InterceptPolicy, MessageKind, OutboundFrame, ProtocolMessage, Verdict,
};
pub use metrics::InterceptMetrics;
pub use monitor::HealthMonitor;
pub use registry::{ConnectionRegistry, RegisterOutcome};
pub use scheduler::TickScheduler;
pub use session::SessionId;
pub use traits::{
    ComponentDirectory, CriticalFailureHandler, DeferredTask, InboundProcessor, ProtocolCatalog,
    Scheduler, SessionDirectory, Transport,
};
