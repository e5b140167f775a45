//! 拦截引擎配置
//!
//! - TOML 加载，支持单文件或 `.d` 目录合并
//! - 不兼容组件清单即冲突检测的可配置注册表

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{InterceptError, Result};

/// 拦截引擎配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InterceptConfig {
    /// 已知不兼容的组件身份
    pub incompatible: Vec<String>,
    /// 安装后健康检查的延迟周期数
    pub health_check_delay_cycles: u32,
    /// 注册表重试的延迟周期数
    pub registry_retry_delay_cycles: u32,
    /// 入站调度表
    pub dispatch: DispatchTableConfig,
}

impl Default for InterceptConfig {
    fn default() -> Self {
        Self {
            incompatible: Vec::new(),
            health_check_delay_cycles: 10,
            registry_retry_delay_cycles: 1,
            dispatch: DispatchTableConfig::default(),
        }
    }
}

/// 入站调度表配置
///
/// 未出现在任一清单中的类型视为缺口：透传并告警一次
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct DispatchTableConfig {
    /// 进入策略判定的消息类型
    pub intercept: Vec<u16>,
    /// 显式透传的消息类型
    pub bypass: Vec<u16>,
}

impl InterceptConfig {
    fn merge(&mut self, other: InterceptConfig) {
        self.incompatible.extend(other.incompatible);
        self.dispatch.intercept.extend(other.dispatch.intercept);
        self.dispatch.bypass.extend(other.dispatch.bypass);
        self.health_check_delay_cycles = other.health_check_delay_cycles;
        self.registry_retry_delay_cycles = other.registry_retry_delay_cycles;
    }
}

/// 配置加载器，按候选路径顺序查找
pub struct InterceptConfigLoader {
    candidate_paths: Vec<PathBuf>,
}

impl Default for InterceptConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl InterceptConfigLoader {
    pub fn new() -> Self {
        Self {
            candidate_paths: vec![
                PathBuf::from("config/intercept.toml"),
                PathBuf::from("config/intercept.d"),
            ],
        }
    }

    pub fn add_candidate<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.candidate_paths.push(path.into());
        self
    }

    pub fn load(&self) -> Result<InterceptConfig> {
        for path in &self.candidate_paths {
            if path.is_dir() {
                if let Ok(cfg) = self.load_from_directory(path) {
                    return Ok(cfg);
                }
            } else if path.is_file() {
                if let Ok(cfg) = self.load_from_file(path) {
                    return Ok(cfg);
                }
            }
        }
        Ok(InterceptConfig::default())
    }

    fn load_from_file(&self, path: &Path) -> Result<InterceptConfig> {
        let content = fs::read_to_string(path).map_err(|err| {
            InterceptError::Configuration(format!(
                "failed to read intercept config: path={}, err={err}",
                path.display()
            ))
        })?;
        toml::from_str(&content).map_err(|err| {
            InterceptError::Configuration(format!(
                "invalid intercept config format: path={}, err={err}",
                path.display()
            ))
        })
    }

    fn load_from_directory(&self, dir: &Path) -> Result<InterceptConfig> {
        let mut merged = InterceptConfig::default();
        if !dir.exists() {
            return Ok(merged);
        }

        let mut entries = fs::read_dir(dir)
            .map_err(|err| {
                InterceptError::Configuration(format!(
                    "failed to read intercept config dir: path={}, err={err}",
                    dir.display()
                ))
            })?
            .filter_map(|entry| entry.ok())
            .collect::<Vec<_>>();
        entries.sort_by_key(|entry| entry.path());

        for entry in entries {
            if entry
                .path()
                .extension()
                .map(|ext| ext == "toml")
                .unwrap_or(false)
            {
                let cfg = self.load_from_file(&entry.path())?;
                merged.merge(cfg);
            }
        }

        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = InterceptConfig::default();
        assert_eq!(cfg.health_check_delay_cycles, 10);
        assert_eq!(cfg.registry_retry_delay_cycles, 1);
        assert!(cfg.incompatible.is_empty());
    }

    #[test]
    fn test_parse_toml() {
        let cfg: InterceptConfig = toml::from_str(
            r#"
            incompatible = ["spout"]
            health_check_delay_cycles = 5

            [dispatch]
            intercept = [0, 3, 10]
            bypass = [255]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.incompatible, vec!["spout".to_string()]);
        assert_eq!(cfg.health_check_delay_cycles, 5);
        assert_eq!(cfg.dispatch.intercept, vec![0, 3, 10]);
        assert_eq!(cfg.dispatch.bypass, vec![255]);
    }

    #[test]
    fn test_missing_paths_fall_back_to_default() {
        let loader = InterceptConfigLoader::new().add_candidate("does/not/exist.toml");
        let cfg = loader.load().unwrap();
        assert_eq!(cfg.registry_retry_delay_cycles, 1);
    }
}
