//! 运行时配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__RUNTIME__OFFLOAD_WORKERS=8`）。

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::context::{Context, ContextBuilder, DetachPolicy, HistoryScope, Integration, WorkerPool};

/// 配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub runtime: RuntimeSection,
    pub log: LogSection,
    /// [integrations.<name>] 段：连接名 -> 集成配置
    pub integrations: HashMap<String, Integration>,
}

/// [runtime] 段：卸载线程数、分离上下文携带的历史范围
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeSection {
    pub offload_workers: usize,
    pub detach_history: HistoryScope,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            offload_workers: 4,
            detach_history: HistoryScope::Full,
        }
    }
}

/// [log] 段：tracing 过滤表达式（RUST_LOG 优先）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSection {
    pub filter: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// 预置线程池、分离策略与集成配置的上下文构建器
    pub fn context_builder(&self) -> ContextBuilder {
        Context::builder()
            .workers(WorkerPool::new(self.runtime.offload_workers))
            .detach_policy(DetachPolicy {
                history: self.runtime.detach_history,
            })
            .integrations(self.integrations.clone())
    }
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
