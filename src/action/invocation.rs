//! 单次 Action 调用：类型描述符 + 已校验参数 + 本次调用的上下文
//!
//! 每次调用都是新的 Invocation，钩子通过它读参数、写响应、记录用量。

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::action::ActionSpec;
use crate::context::{Context, Metadata, ToolCall, UsageMetadata, UsageRecord};
use crate::core::{ActionError, ActionResult};
use crate::selector::{CompletionRequest, Selector};

pub struct Invocation {
    name: String,
    spec: Arc<ActionSpec>,
    call: ToolCall,
    args: Map<String, Value>,
    context: Arc<Context>,
    selector: Arc<dyn Selector>,
    usage: Mutex<Vec<UsageRecord>>,
}

impl Invocation {
    pub(crate) fn new(
        name: impl Into<String>,
        spec: Arc<ActionSpec>,
        call: ToolCall,
        args: Map<String, Value>,
        context: Arc<Context>,
        selector: Arc<dyn Selector>,
    ) -> Self {
        Self {
            name: name.into(),
            spec,
            call,
            args,
            context,
            selector,
            usage: Mutex::new(Vec::new()),
        }
    }

    /// 父 Action 子表中的别名
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spec(&self) -> &Arc<ActionSpec> {
        &self.spec
    }

    pub fn call(&self) -> &ToolCall {
        &self.call
    }

    pub fn args(&self) -> &Map<String, Value> {
        &self.args
    }

    /// 反序列化单个参数；缺失或类型不符均报校验错误
    pub fn arg<T: DeserializeOwned>(&self, name: &str) -> ActionResult<T> {
        let value = self
            .args
            .get(name)
            .cloned()
            .ok_or_else(|| ActionError::validation(&self.spec.id, format!("missing `{name}`")))?;
        serde_json::from_value(value)
            .map_err(|e| ActionError::validation(&self.spec.id, format!("`{name}`: {e}")))
    }

    /// 把全部参数反序列化为一个结构体
    pub fn args_as<T: DeserializeOwned>(&self) -> ActionResult<T> {
        serde_json::from_value(Value::Object(self.args.clone()))
            .map_err(|e| ActionError::validation(&self.spec.id, e.to_string()))
    }

    /// 本次调用所在的上下文（分离时为隔离副本）
    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// 写入本次调用的工具响应槽
    pub async fn add_response(&self, content: impl Into<String>) {
        self.context.add_response(&self.call, content, None).await;
    }

    pub async fn add_response_with(&self, content: impl Into<String>, metadata: Metadata) {
        self.context
            .add_response(&self.call, content, Some(metadata))
            .await;
    }

    /// 累加用量到上下文并记入本次调用的轨迹
    pub async fn add_usage(&self, model: &str, usage: UsageMetadata, tag: Option<&str>) {
        self.context.merge_usage(model, usage, tag).await;
        self.usage.lock().await.push(UsageRecord {
            model: model.to_string(),
            tag: tag.map(str::to_string),
            usage,
        });
    }

    /// 按本 Action 的 system prompt / temperature 覆盖做一次纯文本补全
    pub async fn complete(&self) -> ActionResult<String> {
        let messages = self.context.history().await;
        let settings = &self.spec.settings;
        let completion = self
            .selector
            .complete(CompletionRequest {
                action: &self.spec.id,
                messages: &messages,
                system_prompt: settings.system_prompt.as_deref(),
                temperature: settings.temperature,
            })
            .await?;
        if let Some(report) = completion.usage {
            self.add_usage(&report.model, report.usage, None).await;
        }
        Ok(completion.content)
    }

    pub(crate) async fn take_usage(&self) -> Vec<UsageRecord> {
        std::mem::take(&mut *self.usage.lock().await)
    }
}
