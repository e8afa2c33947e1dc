//! 面向传输层的三个操作：列举分组下的 Action、运行指定 Action、获取依赖图
//!
//! HTTP / gRPC / MCP / A2A 适配器只需包一层这里的方法。

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::action::ActionRegistry;
use crate::context::{Context, ContextBuilder, Integration, UsageMap};
use crate::core::{ActionError, ActionResult, Signal};
use crate::dispatcher::{ActionTrace, Dispatcher};
use crate::graph::{self, ActionGraph};
use crate::remote::Connector;
use crate::selector::{Selector, ToolSpec};

/// 一次运行的结果
#[derive(Debug, Clone, Serialize)]
pub struct RunOutput {
    /// 历史中最后一条消息的内容
    pub response: String,
    pub signal: Signal,
    pub trace: ActionTrace,
    pub usage: UsageMap,
}

impl RunOutput {
    pub fn trace_json(&self) -> ActionResult<String> {
        serde_json::to_string(&self.trace).map_err(|e| ActionError::Other(e.into()))
    }
}

pub struct ActionService {
    dispatcher: Dispatcher,
}

impl ActionService {
    pub fn new(registry: Arc<ActionRegistry>, selector: Arc<dyn Selector>) -> Self {
        Self {
            dispatcher: Dispatcher::new(registry, selector),
        }
    }

    pub fn with_connector(self, connector: Arc<dyn Connector>) -> Self {
        Self {
            dispatcher: self.dispatcher.with_connector(connector),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// 某传输层分组下的 Action，以类型 id 作工具名
    pub fn list_group(&self, transport: &str, group: &str) -> Vec<ToolSpec> {
        self.dispatcher
            .registry()
            .in_group(transport, group)
            .iter()
            .map(|spec| spec.tool_spec(&spec.id))
            .collect()
    }

    /// 可作为独立 agent 调用的 Action
    pub fn list_agents(&self) -> Vec<ToolSpec> {
        self.dispatcher
            .registry()
            .agents()
            .iter()
            .map(|spec| spec.tool_spec(&spec.id))
            .collect()
    }

    pub async fn run(&self, action: &str, args: Value) -> ActionResult<RunOutput> {
        self.run_with(action, args, Context::builder()).await
    }

    /// 用调用方的构建器创建新上下文，首条消息为该 Action 的描述（没有时用 system prompt）
    pub async fn run_with(
        &self,
        action: &str,
        args: Value,
        builder: ContextBuilder,
    ) -> ActionResult<RunOutput> {
        let spec = self.dispatcher.registry().resolve(action)?;
        let system = if spec.description.is_empty() {
            spec.settings.system_prompt.clone().unwrap_or_default()
        } else {
            spec.description.clone()
        };
        let context = builder.system_message(system).build();

        let report = self.dispatcher.start(&context, action, args).await?;
        let response = context
            .last_message()
            .await
            .map(|m| m.content)
            .unwrap_or_default();
        Ok(RunOutput {
            response,
            signal: report.signal,
            trace: report.trace,
            usage: context.usage().await,
        })
    }

    pub async fn graph(
        &self,
        action: &str,
        allowed: Option<&HashMap<String, bool>>,
        integrations: &HashMap<String, Integration>,
        bypass: bool,
    ) -> ActionResult<ActionGraph> {
        graph::graph(
            self.dispatcher.registry(),
            self.dispatcher.connector().map(|c| c.as_ref()),
            action,
            allowed,
            integrations,
            bypass,
        )
        .await
    }
}
