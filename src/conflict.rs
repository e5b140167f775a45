//! 冲突检测
//!
//! - 安装前：对照可配置的不兼容组件清单，命中即拒绝安装，零会话触碰
//! - 运行期：识别绑定/解绑时遇到的连接对象是否属于本系统或原生类型，
//!   其余一律视为异类挂钩

use std::collections::HashSet;
use std::sync::Arc;

use crate::connection::{Connection, NativeConnection};
use crate::hooked::HookedConnection;
use crate::traits::ComponentDirectory;

/// 安装前检查结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preflight {
    Clear,
    Conflict { identity: String },
}

/// 冲突检测器
pub struct ConflictDetector {
    incompatible: HashSet<String>,
    directory: Arc<dyn ComponentDirectory>,
}

impl ConflictDetector {
    pub fn new<I, T>(incompatible: I, directory: Arc<dyn ComponentDirectory>) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            incompatible: incompatible.into_iter().map(Into::into).collect(),
            directory,
        }
    }

    /// 安装前检查：任一不兼容组件活跃即冲突，不改动任何状态
    ///
    /// 身份无法解析时回退为 "unknown"
    pub fn preflight(&self) -> Preflight {
        let mut names: Vec<&String> = self.incompatible.iter().collect();
        names.sort();
        for name in names {
            if self.directory.is_active(name) {
                let identity = self
                    .directory
                    .resolve(name)
                    .unwrap_or_else(|| "unknown".to_string());
                return Preflight::Conflict { identity };
            }
        }
        Preflight::Clear
    }

    /// 运行期异类识别：既非原生类型也非本系统包装器即为异类
    pub fn is_foreign(&self, connection: &dyn Connection) -> bool {
        let any = connection.as_any();
        !(any.is::<NativeConnection>() || any.is::<HookedConnection>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct StaticComponents {
        active: HashMap<String, Option<String>>,
    }

    impl ComponentDirectory for StaticComponents {
        fn is_active(&self, name: &str) -> bool {
            self.active.contains_key(name)
        }

        fn resolve(&self, name: &str) -> Option<String> {
            self.active.get(name).and_then(|identity| identity.clone())
        }
    }

    /// 测试：不兼容组件活跃时报告其身份
    #[test]
    fn test_preflight_reports_identity() {
        let mut active = HashMap::new();
        active.insert("spout".to_string(), Some("Spout v1.2".to_string()));
        let detector = ConflictDetector::new(
            ["spout"],
            Arc::new(StaticComponents { active }) as Arc<dyn ComponentDirectory>,
        );
        assert_eq!(
            detector.preflight(),
            Preflight::Conflict {
                identity: "Spout v1.2".to_string()
            }
        );
    }

    /// 测试：身份无法解析时回退为 unknown
    #[test]
    fn test_preflight_unknown_identity() {
        let mut active = HashMap::new();
        active.insert("spout".to_string(), None);
        let detector = ConflictDetector::new(
            ["spout"],
            Arc::new(StaticComponents { active }) as Arc<dyn ComponentDirectory>,
        );
        assert_eq!(
            detector.preflight(),
            Preflight::Conflict {
                identity: "unknown".to_string()
            }
        );
    }

    /// 测试：无命中即放行
    #[test]
    fn test_preflight_clear() {
        let detector = ConflictDetector::new(
            ["spout"],
            Arc::new(StaticComponents {
                active: HashMap::new(),
            }) as Arc<dyn ComponentDirectory>,
        );
        assert_eq!(detector.preflight(), Preflight::Clear);
    }
}
