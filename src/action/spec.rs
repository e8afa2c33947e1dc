//! Action 类型描述符与构建器
//!
//! 一个 Action 类型 = 字段 + 设置 + 有序子表 + 钩子实现。子表只存子类型 id，
//! 由 ActionRegistry 统一解析，静态边集合同时供调度器与图遍历使用。

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::action::{ActionSettings, FieldSet, FieldSpec, Invocation};
use crate::context::ChatRole;
use crate::core::{ActionError, ActionResult, Signal};
use crate::remote::Connection;
use crate::selector::ToolSpec;

/// Action 类型的唯一标识
pub type ActionId = String;

/// 生命周期钩子
///
/// 所有方法都有默认实现：`pre`/`post` 直接继续；默认 fallback 把内容作为 assistant 消息写入并 Break；
/// `on_error` 返回 None 表示未处理。
#[async_trait]
pub trait Behavior: Send + Sync {
    async fn pre(&self, _inv: &Invocation) -> ActionResult<Signal> {
        Ok(Signal::CONTINUE)
    }

    async fn post(&self, _inv: &Invocation) -> ActionResult<Signal> {
        Ok(Signal::CONTINUE)
    }

    /// 是否自定义了 fallback；叶子 Action 仅在为 true 时才调用选择器生成文本
    fn has_fallback(&self) -> bool {
        false
    }

    /// 选择器选择回退时调用。叶子 Action 上只有 `has_fallback` 返回 true 才会走到这里，
    /// 覆盖本方法时需同时覆盖 `has_fallback`
    async fn fallback(&self, inv: &Invocation, content: &str) -> ActionResult<Signal> {
        if !content.is_empty() {
            inv.context()
                .add_message(ChatRole::Assistant, content, None)
                .await;
        }
        Ok(Signal::BREAK)
    }

    /// 错误钩子：`Some(Ok(_))` 表示已恢复，`Some(Err(_))` 表示换一个错误继续上抛
    async fn on_error(
        &self,
        _inv: &Invocation,
        _error: &ActionError,
    ) -> Option<ActionResult<Signal>> {
        None
    }
}

/// 什么都不做的钩子实现
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl Behavior for Passthrough {}

/// Action 来源
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Origin {
    Local,
    /// 由远程连接在运行时注入
    Remote { connection: String },
}

#[derive(Clone)]
pub struct ActionSpec {
    pub id: ActionId,
    pub description: String,
    pub fields: FieldSet,
    pub settings: ActionSettings,
    /// 别名 -> 子类型 id（保持声明顺序）
    pub children: IndexMap<String, ActionId>,
    pub behavior: Arc<dyn Behavior>,
    pub connections: Vec<Connection>,
    pub origin: Origin,
}

impl ActionSpec {
    pub fn builder(id: impl Into<ActionId>) -> ActionBuilder {
        ActionBuilder::new(id)
    }

    /// 无静态子 Action 且无远程连接
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty() && self.connections.is_empty()
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.origin, Origin::Remote { .. })
    }

    /// 参数 JSON Schema
    pub fn input_schema(&self) -> Value {
        self.fields.to_json_schema(&self.id, &self.description)
    }

    /// 以别名暴露给选择器的工具描述
    pub fn tool_spec(&self, alias: &str) -> ToolSpec {
        ToolSpec {
            name: alias.to_string(),
            description: self.description.clone(),
            parameters: self.fields.to_json_schema(alias, &self.description),
        }
    }
}

impl fmt::Debug for ActionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionSpec")
            .field("id", &self.id)
            .field("description", &self.description)
            .field("fields", &self.fields)
            .field("settings", &self.settings)
            .field("children", &self.children)
            .field("connections", &self.connections)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

/// Action 构建器（在注册表中登记之前完成全部声明）
pub struct ActionBuilder {
    spec: ActionSpec,
}

impl ActionBuilder {
    pub fn new(id: impl Into<ActionId>) -> Self {
        Self {
            spec: ActionSpec {
                id: id.into(),
                description: String::new(),
                fields: FieldSet::new(),
                settings: ActionSettings::default(),
                children: IndexMap::new(),
                behavior: Arc::new(Passthrough),
                connections: Vec::new(),
                origin: Origin::Local,
            },
        }
    }

    /// 以 base 为父类型派生：复制描述、字段、钩子、子表、连接与可继承设置
    pub fn extends(id: impl Into<ActionId>, base: &ActionSpec) -> Self {
        let mut spec = base.clone();
        spec.id = id.into();
        spec.settings = base.settings.inherit();
        spec.origin = Origin::Local;
        Self { spec }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.spec.description = description.into();
        self
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.spec.fields.push(field);
        self
    }

    pub fn fields(mut self, fields: FieldSet) -> Self {
        for field in fields.iter() {
            self.spec.fields.push(field.clone());
        }
        self
    }

    /// 从 schemars 类型推导字段
    pub fn fields_from<T: JsonSchema>(self) -> Self {
        self.fields(FieldSet::from_type::<T>())
    }

    pub fn behavior(self, behavior: impl Behavior + 'static) -> Self {
        self.behavior_arc(Arc::new(behavior))
    }

    pub fn behavior_arc(mut self, behavior: Arc<dyn Behavior>) -> Self {
        self.spec.behavior = behavior;
        self
    }

    /// 以子类型 id 作别名
    pub fn child(self, id: impl Into<ActionId>) -> Self {
        let id = id.into();
        self.child_as(id.clone(), id)
    }

    pub fn child_as(mut self, alias: impl Into<String>, id: impl Into<ActionId>) -> Self {
        self.spec.children.insert(alias.into(), id.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.spec.settings.system_prompt = Some(prompt.into());
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.spec.settings.temperature = Some(temperature);
        self
    }

    pub fn default_tool(mut self, name: impl Into<String>) -> Self {
        self.spec.settings.default_tool = name.into();
        self
    }

    pub fn first_tool_only(mut self, enabled: bool) -> Self {
        self.spec.settings.first_tool_only = enabled;
        self
    }

    pub fn concurrent(mut self, enabled: bool) -> Self {
        self.spec.settings.concurrent = enabled;
        self
    }

    pub fn max_child_iteration(mut self, rounds: usize) -> Self {
        self.spec.settings.max_child_iteration = rounds;
        self
    }

    pub fn detached(mut self, enabled: bool) -> Self {
        self.spec.settings.detached = enabled;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.spec.settings.enabled = enabled;
        self
    }

    pub fn agent(mut self, enabled: bool) -> Self {
        self.spec.settings.agent = enabled;
        self
    }

    pub fn group(mut self, transport: impl Into<String>, group: impl Into<String>) -> Self {
        self.spec
            .settings
            .groups
            .entry(transport.into())
            .or_default()
            .insert(group.into());
        self
    }

    pub fn connection(mut self, connection: Connection) -> Self {
        self.spec.connections.push(connection);
        self
    }

    pub(crate) fn origin(mut self, origin: Origin) -> Self {
        self.spec.origin = origin;
        self
    }

    pub fn id(&self) -> &str {
        &self.spec.id
    }

    pub fn build(self) -> ActionSpec {
        self.spec
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::FieldKind;

    #[test]
    fn test_builder_keeps_child_order() {
        let spec = ActionBuilder::new("Root")
            .child("MathProblem")
            .child_as("translate", "Translation")
            .build();
        let aliases: Vec<&String> = spec.children.keys().collect();
        assert_eq!(aliases, ["MathProblem", "translate"]);
        assert_eq!(spec.children["translate"], "Translation");
        assert!(!spec.is_leaf());
    }

    #[test]
    fn test_extends_copies_settings_except_agent() {
        let base = ActionBuilder::new("Base")
            .description("base action")
            .field(FieldSpec::new("count", FieldKind::Integer))
            .concurrent(true)
            .agent(true)
            .child("Leaf")
            .build();
        let derived = ActionBuilder::extends("Derived", &base)
            .field(FieldSpec::string("extra").optional())
            .build();

        assert_eq!(derived.id, "Derived");
        assert_eq!(derived.description, "base action");
        assert!(derived.settings.concurrent);
        assert!(!derived.settings.agent);
        assert_eq!(derived.fields.len(), 2);
        assert_eq!(derived.children.len(), 1);
        assert_eq!(base.fields.len(), 1);
    }

    #[test]
    fn test_passthrough_has_no_fallback() {
        assert!(!Passthrough.has_fallback());
    }

    #[test]
    fn test_tool_spec_uses_alias() {
        let spec = ActionBuilder::new("MathProblem")
            .description("Solve math problems")
            .field(FieldSpec::string("answer"))
            .build();
        let tool = spec.tool_spec("math");
        assert_eq!(tool.name, "math");
        assert_eq!(tool.parameters["title"], "math");
        assert_eq!(tool.parameters["required"][0], "answer");
        assert_eq!(spec.input_schema()["title"], "MathProblem");
    }
}
