//! 远程工具连接声明
//!
//! 连接默认配置与同名 Integration 的 config 浅合并（嵌套对象再合并一层）；
//! 允许的工具取两边的交集，只有一边声明时以该边为准。

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::Integration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub name: String,
    /// 没有同名 Integration 时跳过该连接
    #[serde(default)]
    pub require_integration: bool,
    /// 连接或列举失败时让整个 Action 失败，而不是静默丢弃
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub allowed_tools: BTreeSet<String>,
    #[serde(default)]
    pub config: Map<String, Value>,
}

impl Connection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            require_integration: false,
            required: false,
            allowed_tools: BTreeSet::new(),
            config: Map::new(),
        }
    }

    pub fn require_integration(mut self, enabled: bool) -> Self {
        self.require_integration = enabled;
        self
    }

    pub fn required(mut self, enabled: bool) -> Self {
        self.required = enabled;
        self
    }

    pub fn allow_tool(mut self, tool: impl Into<String>) -> Self {
        self.allowed_tools.insert(tool.into());
        self
    }

    pub fn with_config(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    pub fn effective_config(&self, integration: Option<&Integration>) -> Map<String, Value> {
        let mut merged = self.config.clone();
        let Some(integration) = integration else {
            return merged;
        };
        for (key, value) in &integration.config {
            match (merged.get_mut(key), value) {
                (Some(Value::Object(base)), Value::Object(extra)) => {
                    base.extend(extra.clone());
                }
                _ => {
                    merged.insert(key.clone(), value.clone());
                }
            }
        }
        merged
    }

    /// 空集合表示不限制
    pub fn effective_allowed_tools(&self, integration: Option<&Integration>) -> BTreeSet<String> {
        let from_integration = integration
            .map(|i| i.allowed_tools.clone())
            .unwrap_or_default();
        match (self.allowed_tools.is_empty(), from_integration.is_empty()) {
            (true, _) => from_integration,
            (false, true) => self.allowed_tools.clone(),
            (false, false) => self
                .allowed_tools
                .intersection(&from_integration)
                .cloned()
                .collect(),
        }
    }
}
