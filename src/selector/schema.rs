//! 工具调用 JSON Schema 与工具菜单渲染
//!
//! 把「合法 tool call」的结构注入 system prompt，减少模型输出格式错误。

use schemars::{schema_for, JsonSchema};
use serde_json::{Map, Value};

use crate::selector::ToolSpec;

/// `{"tool": "...", "args": {...}}`（仅用于生成 Schema）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ToolCallFormat {
    /// 工具名，必须是菜单中列出的名称之一
    pub tool: String,
    /// 工具参数，结构见各工具的 parameters
    pub args: Map<String, Value>,
}

/// 工具调用的 JSON Schema 字符串
pub fn tool_call_schema_json() -> String {
    let schema = schema_for!(ToolCallFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

/// 渲染工具菜单：每个工具一行名称与描述，后跟参数 Schema
pub fn render_tool_menu(tools: &[ToolSpec]) -> String {
    tools
        .iter()
        .map(|tool| {
            let params = serde_json::to_string(&tool.parameters["properties"])
                .unwrap_or_else(|_| "{}".to_string());
            format!("- {}: {}\n  args: {}", tool.name, tool.description, params)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_call_schema_json() {
        let schema = tool_call_schema_json();
        assert!(schema.contains("\"tool\""));
        assert!(schema.contains("\"args\""));
    }

    #[test]
    fn test_render_tool_menu() {
        let tools = [ToolSpec {
            name: "MathProblem".into(),
            description: "Solve math problems".into(),
            parameters: json!({"properties": {"answer": {"type": "string"}}}),
        }];
        let menu = render_tool_menu(&tools);
        assert!(menu.starts_with("- MathProblem: Solve math problems"));
        assert!(menu.contains("\"answer\""));
    }
}
