//! 拦截引擎错误模块
//!
//! - 每个错误对应一种受控降级路径，不向宿主进程抛出硬失败
//! - 安装/卸载入口最终只暴露布尔结果，细节通过日志与指标观察

use thiserror::Error;

use crate::session::SessionId;

/// 拦截引擎错误
#[derive(Debug, Error)]
pub enum InterceptError {
    /// 安装前检测到已知不兼容组件，未触碰任何会话
    #[error("incompatible component active: {identity}")]
    PreInstallConflict { identity: String },

    /// 绑定/解绑时发现非本系统、非原生类型的连接对象
    #[error("foreign connection hook on session {session}: {type_label}")]
    ForeignHook {
        session: SessionId,
        type_label: String,
    },

    /// 注册时连接记录缺失（与会话创建/销毁竞争）
    #[error("connection record missing for session {session}")]
    RegistryRace { session: SessionId },

    /// 安装后的健康检查发现挂钩被其他组件替换
    #[error("installed hook displaced for session {session}")]
    Displaced { session: SessionId },

    /// 底层传输失败
    #[error("transport failure: {0}")]
    Transport(String),

    /// 配置加载或装配失败
    #[error("configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, InterceptError>;

#[cfg(test)]
mod tests {
    use super::*;

    /// 测试：错误信息包含会话标识
    #[test]
    fn test_error_display_includes_session() {
        let session = SessionId::new();
        let err = InterceptError::RegistryRace {
            session: session.clone(),
        };
        assert!(
            err.to_string().contains(session.as_str()),
            "error message should name the session"
        );
    }
}
