//! 选择器契约：输入为当前上下文 + 现存子 Action 的工具菜单，输出为调用决定或回退文本
//!
//! 核心不关心决定如何做出（模型、规则引擎、人工），只约束输入输出形状。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::{ChatRole, Message, UsageMetadata};
use crate::core::ActionResult;

/// 暴露给选择器的工具
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// 参数 JSON Schema
    pub parameters: Value,
}

/// 选中的工具及其参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolChoice {
    #[serde(alias = "tool")]
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

impl ToolChoice {
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// 按给出的顺序调用这些工具
    Invoke(Vec<ToolChoice>),
    /// 不调用工具，把文本交给 fallback
    Fallback(String),
    /// 什么都不选
    Nothing,
}

/// 某次模型调用的用量
#[derive(Debug, Clone, PartialEq)]
pub struct UsageReport {
    pub model: String,
    pub usage: UsageMetadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub decision: Decision,
    pub usage: Option<UsageReport>,
}

impl Selection {
    pub fn invoke(choices: Vec<ToolChoice>) -> Self {
        Self {
            decision: Decision::Invoke(choices),
            usage: None,
        }
    }

    pub fn fallback(content: impl Into<String>) -> Self {
        Self {
            decision: Decision::Fallback(content.into()),
            usage: None,
        }
    }

    pub fn nothing() -> Self {
        Self {
            decision: Decision::Nothing,
            usage: None,
        }
    }

    pub fn with_usage(mut self, model: impl Into<String>, usage: UsageMetadata) -> Self {
        self.usage = Some(UsageReport {
            model: model.into(),
            usage,
        });
        self
    }
}

/// 选择请求
#[derive(Debug, Clone, Copy)]
pub struct SelectionRequest<'a> {
    /// 发起选择的 Action id
    pub action: &'a str,
    pub tools: &'a [ToolSpec],
    pub messages: &'a [Message],
    pub system_prompt: Option<&'a str>,
    pub temperature: Option<f32>,
    pub first_tool_only: bool,
    pub default_tool: &'a str,
}

impl SelectionRequest<'_> {
    /// 应用 system prompt 覆盖后的消息列表
    pub fn prompt_messages(&self) -> Vec<Message> {
        with_system_prompt(self.messages, self.system_prompt)
    }

    pub fn tool(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.iter().find(|t| t.name == name)
    }
}

/// 纯文本补全请求（叶子 fallback 与 `Invocation::complete`）
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub action: &'a str,
    pub messages: &'a [Message],
    pub system_prompt: Option<&'a str>,
    pub temperature: Option<f32>,
}

impl CompletionRequest<'_> {
    pub fn prompt_messages(&self) -> Vec<Message> {
        with_system_prompt(self.messages, self.system_prompt)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub usage: Option<UsageReport>,
}

impl Completion {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            usage: None,
        }
    }
}

#[async_trait]
pub trait Selector: Send + Sync {
    async fn select(&self, request: SelectionRequest<'_>) -> ActionResult<Selection>;

    async fn complete(&self, request: CompletionRequest<'_>) -> ActionResult<Completion>;
}

/// 替换首条 system 消息；没有则插到最前
fn with_system_prompt(messages: &[Message], system_prompt: Option<&str>) -> Vec<Message> {
    let mut messages = messages.to_vec();
    if let Some(prompt) = system_prompt {
        match messages.iter_mut().find(|m| m.role == ChatRole::System) {
            Some(system) => system.content = prompt.to_string(),
            None => messages.insert(0, Message::system(prompt)),
        }
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_messages_override() {
        let history = vec![Message::system("base"), Message::user("hi")];
        let request = CompletionRequest {
            action: "Root",
            messages: &history,
            system_prompt: Some("override"),
            temperature: None,
        };
        let messages = request.prompt_messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "override");

        let bare = [Message::user("hi")];
        let request = CompletionRequest {
            messages: &bare,
            ..request
        };
        let messages = request.prompt_messages();
        assert_eq!(messages[0].role, ChatRole::System);
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn test_tool_choice_accepts_tool_alias() {
        let raw = serde_json::json!({"tool": "MathProblem", "args": {"answer": "16"}});
        let choice: ToolChoice = serde_json::from_value(raw).unwrap();
        assert_eq!(choice.name, "MathProblem");
        assert_eq!(choice.args["answer"], "16");
    }
}
