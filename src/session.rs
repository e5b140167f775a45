//! SessionId 值对象
//!
//! 会话ID的强类型封装；会话本身由宿主创建和销毁，核心只持有其标识

use serde::{Deserialize, Serialize};
use std::fmt;

/// 会话ID值对象
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// 创建新的会话ID（使用UUID v4）
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// 从宿主分配的字符串创建会话ID（带验证）
    ///
    /// 宿主可能使用自有的ID方案，这里只要求非空
    pub fn from_string(id: String) -> Result<Self, String> {
        if id.is_empty() {
            return Err("SessionId cannot be empty".to_string());
        }
        Ok(Self(id))
    }

    /// 获取内部值的引用
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 消费自身，返回内部值
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
