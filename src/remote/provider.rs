//! 远程工具提供方抽象（具体传输由调用方实现）

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::ActionResult;
use crate::remote::Connection;

/// 对端列出的一个工具
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteTool {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// 参数 JSON Schema
    #[serde(default)]
    pub input_schema: Value,
}

/// 一个已建立的远程会话
#[async_trait]
pub trait ToolProvider: Send + Sync {
    async fn list_tools(&self) -> ActionResult<Vec<RemoteTool>>;

    async fn call_tool(&self, tool: &str, args: &Map<String, Value>) -> ActionResult<String>;
}

/// 按连接声明与合并后的配置建立会话
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        connection: &Connection,
        config: &Map<String, Value>,
    ) -> ActionResult<Arc<dyn ToolProvider>>;
}
