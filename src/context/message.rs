//! 对话记录：消息、角色与工具调用
//!
//! 工具响应以带 ToolCall 的 Tool 消息记录，保证选择过程可完整回放。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::ActionError;

/// 消息附加信息
pub type Metadata = Map<String, Value>;

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatRole {
    type Err = ActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "tool" => Ok(Self::Tool),
            other => Err(ActionError::validation(
                "message",
                format!("unknown role `{other}`"),
            )),
        }
    }
}

/// 一次 Action 调用的序列化形式：名称 + 参数；结果落在对应 Tool 消息的 content
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: format!("call_{}", uuid::Uuid::new_v4().simple()),
            name: name.into(),
            arguments,
        }
    }
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: ChatRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,
}

impl Message {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            metadata: None,
            tool_call: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ChatRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }

    /// 某次 Action 调用的工具响应
    pub fn tool_response(call: &ToolCall, content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Tool,
            content: content.into(),
            metadata: None,
            tool_call: Some(call.clone()),
        }
    }

    pub fn with_metadata(mut self, metadata: Option<Metadata>) -> Self {
        self.metadata = metadata;
        self
    }

    /// 是否为指定调用的工具响应
    pub fn is_response_to(&self, call_id: &str) -> bool {
        self.role == ChatRole::Tool
            && self
                .tool_call
                .as_ref()
                .is_some_and(|call| call.id == call_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse() {
        assert_eq!("Assistant".parse::<ChatRole>().unwrap(), ChatRole::Assistant);
        assert_eq!(" tool ".parse::<ChatRole>().unwrap(), ChatRole::Tool);
        assert!("robot".parse::<ChatRole>().is_err());
    }

    #[test]
    fn test_tool_response_links_call() {
        let call = ToolCall::new("MathProblem", serde_json::json!({"answer": "16"}));
        let msg = Message::tool_response(&call, "16");
        assert!(msg.is_response_to(&call.id));
        assert!(!msg.is_response_to("call_other"));

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "tool");
        assert_eq!(json["tool_call"]["name"], "MathProblem");
        assert!(json.get("metadata").is_none());
    }

    #[test]
    fn test_call_ids_are_unique() {
        let a = ToolCall::new("A", Value::Null);
        let b = ToolCall::new("A", Value::Null);
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("call_"));
    }
}
