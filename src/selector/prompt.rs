//! 基于文本模型的选择器：把工具菜单与调用格式写进 system prompt，再解析模型输出
//!
//! 输出为 `{"tool": .., "args": ..}` 对象或其数组（可包在 ```json 代码块中）时视为调用，
//! 其余文本一律作为 fallback 内容。

use async_trait::async_trait;
use serde::Deserialize;

use crate::context::{ChatRole, Message, UsageMetadata};
use crate::core::{ActionError, ActionResult};
use crate::selector::schema::{render_tool_menu, tool_call_schema_json};
use crate::selector::{
    Completion, CompletionRequest, Decision, Selection, SelectionRequest, Selector, ToolChoice,
    UsageReport,
};

/// 一次文本生成的结果
#[derive(Debug, Clone, Default)]
pub struct Generation {
    pub content: String,
    pub usage: Option<UsageMetadata>,
}

/// 文本模型抽象（具体客户端由调用方提供）
#[async_trait]
pub trait TextModel: Send + Sync {
    /// 用于用量统计的模型标识
    fn model_id(&self) -> &str;

    async fn generate(
        &self,
        messages: &[Message],
        temperature: Option<f32>,
    ) -> Result<Generation, String>;
}

pub struct PromptSelector<M> {
    model: M,
}

impl<M: TextModel> PromptSelector<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    async fn generate(
        &self,
        messages: &[Message],
        temperature: Option<f32>,
    ) -> ActionResult<(String, Option<UsageReport>)> {
        let generation = self
            .model
            .generate(messages, temperature)
            .await
            .map_err(ActionError::Selector)?;
        let usage = generation.usage.map(|usage| UsageReport {
            model: self.model.model_id().to_string(),
            usage,
        });
        Ok((generation.content, usage))
    }
}

#[async_trait]
impl<M: TextModel> Selector for PromptSelector<M> {
    async fn select(&self, request: SelectionRequest<'_>) -> ActionResult<Selection> {
        let mut messages = request.prompt_messages();
        let instructions = selection_instructions(&request);
        match messages.iter_mut().find(|m| m.role == ChatRole::System) {
            Some(system) => {
                system.content.push_str("\n\n");
                system.content.push_str(&instructions);
            }
            None => messages.insert(0, Message::system(instructions)),
        }

        let (output, usage) = self.generate(&messages, request.temperature).await?;
        tracing::debug!(action = %request.action, output = %output, "selector output");
        Ok(Selection {
            decision: parse_selection(&output),
            usage,
        })
    }

    async fn complete(&self, request: CompletionRequest<'_>) -> ActionResult<Completion> {
        let messages = request.prompt_messages();
        let (content, usage) = self.generate(&messages, request.temperature).await?;
        Ok(Completion { content, usage })
    }
}

fn selection_instructions(request: &SelectionRequest<'_>) -> String {
    let count = if request.first_tool_only {
        "Call exactly one tool."
    } else {
        "You may call several tools by replying with a JSON array of calls."
    };
    format!(
        "Available tools:\n{}\n\n{}\nTool call format (JSON Schema):\n{}\n\n\
         To answer directly without a tool, reply in plain text or call `{}` with a `content` argument.",
        render_tool_menu(request.tools),
        count,
        tool_call_schema_json(),
        request.default_tool,
    )
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCalls {
    Many(Vec<ToolChoice>),
    One(ToolChoice),
}

/// 解析模型输出为选择决定
pub fn parse_selection(output: &str) -> Decision {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Decision::Nothing;
    }

    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or(rest.trim())
    } else {
        match (trimmed.find(['{', '[']), trimmed.rfind(['}', ']'])) {
            (Some(start), Some(end)) if start < end => &trimmed[start..=end],
            _ => return Decision::Fallback(trimmed.to_string()),
        }
    };

    let choices = match serde_json::from_str::<RawCalls>(json_str) {
        Ok(RawCalls::Many(choices)) => choices,
        Ok(RawCalls::One(choice)) => vec![choice],
        Err(_) => return Decision::Fallback(trimmed.to_string()),
    };
    let choices: Vec<ToolChoice> = choices
        .into_iter()
        .filter(|c| !c.name.trim().is_empty())
        .collect();
    if choices.is_empty() {
        Decision::Fallback(trimmed.to_string())
    } else {
        Decision::Invoke(choices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::ToolSpec;
    use serde_json::json;
    use std::sync::Mutex;

    struct CannedModel {
        output: String,
        seen: Mutex<Vec<Vec<Message>>>,
    }

    impl CannedModel {
        fn new(output: &str) -> Self {
            Self {
                output: output.to_string(),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TextModel for CannedModel {
        fn model_id(&self) -> &str {
            "canned"
        }

        async fn generate(
            &self,
            messages: &[Message],
            _temperature: Option<f32>,
        ) -> Result<Generation, String> {
            self.seen.lock().unwrap().push(messages.to_vec());
            Ok(Generation {
                content: self.output.clone(),
                usage: Some(UsageMetadata::new(3, 2)),
            })
        }
    }

    #[test]
    fn test_parse_single_call() {
        let decision = parse_selection(r#"{"tool": "MathProblem", "args": {"answer": "16"}}"#);
        assert_eq!(
            decision,
            Decision::Invoke(vec![ToolChoice::new("MathProblem", json!({"answer": "16"}))])
        );
    }

    #[test]
    fn test_parse_fenced_array() {
        let output = "Sure.\n```json\n[{\"tool\": \"A\", \"args\": {}}, {\"tool\": \"B\"}]\n```";
        match parse_selection(output) {
            Decision::Invoke(choices) => {
                assert_eq!(choices.len(), 2);
                assert_eq!(choices[1].name, "B");
                assert!(choices[1].args.is_null());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_plain_text_is_fallback() {
        assert_eq!(
            parse_selection("  4 x 4 is 16  "),
            Decision::Fallback("4 x 4 is 16".into())
        );
        assert_eq!(
            parse_selection("use {curly} words"),
            Decision::Fallback("use {curly} words".into())
        );
        assert_eq!(parse_selection(""), Decision::Nothing);
    }

    #[tokio::test]
    async fn test_select_injects_menu_and_reports_usage() {
        let selector = PromptSelector::new(CannedModel::new(r#"{"tool": "Joke", "args": {}}"#));
        let tools = [ToolSpec {
            name: "Joke".into(),
            description: "Tell a joke".into(),
            parameters: json!({"properties": {}}),
        }];
        let history = [Message::system("base"), Message::user("make me laugh")];
        let selection = selector
            .select(SelectionRequest {
                action: "Root",
                tools: &tools,
                messages: &history,
                system_prompt: None,
                temperature: Some(0.0),
                first_tool_only: true,
                default_tool: "DefaultAction",
            })
            .await
            .unwrap();

        assert!(matches!(selection.decision, Decision::Invoke(ref c) if c[0].name == "Joke"));
        let usage = selection.usage.unwrap();
        assert_eq!(usage.model, "canned");
        assert_eq!(usage.usage.total_tokens, 5);

        let seen = selector.model().seen.lock().unwrap();
        assert!(seen[0][0].content.starts_with("base\n\nAvailable tools:"));
        assert!(seen[0][0].content.contains("Call exactly one tool."));
    }
}
