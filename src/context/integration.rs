//! 集成配置：连接名 -> 该连接的运行时配置（凭据、base url、允许的远程工具）
//!
//! 对调度器不透明，仅由 remote 模块按名查找。

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Integration {
    /// 覆盖连接默认配置的键值
    #[serde(default)]
    pub config: Map<String, Value>,
    /// 为空表示不额外限制
    #[serde(default)]
    pub allowed_tools: BTreeSet<String>,
}

impl Integration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    pub fn allow_tool(mut self, tool: impl Into<String>) -> Self {
        self.allowed_tools.insert(tool.into());
        self
    }
}
