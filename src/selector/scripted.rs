//! 脚本化选择器：按 Action id 预置决定，用于测试与离线运行
//!
//! 每个 Action 先消费自己的队列，队列耗尽后返回 `always` 设定的决定，都没有则什么都不选。

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use crate::core::ActionResult;
use crate::selector::{
    Completion, CompletionRequest, Selection, SelectionRequest, Selector, ToolChoice,
};

/// 一次 select 调用的记录
#[derive(Debug, Clone, PartialEq)]
pub struct SelectCall {
    pub action: String,
    /// 当时提供的工具名（按菜单顺序）
    pub tools: Vec<String>,
    pub first_tool_only: bool,
}

#[derive(Default)]
struct Script {
    queues: HashMap<String, VecDeque<Selection>>,
    repeat: HashMap<String, Selection>,
    completions: VecDeque<Completion>,
    selects: Vec<SelectCall>,
    completes: Vec<String>,
}

#[derive(Default)]
pub struct ScriptedSelector {
    script: Mutex<Script>,
}

impl ScriptedSelector {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 为 action 追加一个一次性决定
    pub fn on(self, action: impl Into<String>, selection: Selection) -> Self {
        self.script()
            .queues
            .entry(action.into())
            .or_default()
            .push_back(selection);
        self
    }

    /// 选中单个工具的简写
    pub fn pick(self, action: impl Into<String>, tool: impl Into<String>, args: Value) -> Self {
        self.on(action, Selection::invoke(vec![ToolChoice::new(tool, args)]))
    }

    /// 队列耗尽后每次都返回的决定
    pub fn always(self, action: impl Into<String>, selection: Selection) -> Self {
        self.script().repeat.insert(action.into(), selection);
        self
    }

    pub fn completion(self, completion: Completion) -> Self {
        self.script().completions.push_back(completion);
        self
    }

    pub fn select_calls(&self) -> Vec<SelectCall> {
        self.script().selects.clone()
    }

    pub fn select_count(&self, action: &str) -> usize {
        self.script()
            .selects
            .iter()
            .filter(|c| c.action == action)
            .count()
    }

    /// 调用过 complete 的 Action id
    pub fn complete_calls(&self) -> Vec<String> {
        self.script().completes.clone()
    }
}

#[async_trait]
impl Selector for ScriptedSelector {
    async fn select(&self, request: SelectionRequest<'_>) -> ActionResult<Selection> {
        let mut script = self.script();
        script.selects.push(SelectCall {
            action: request.action.to_string(),
            tools: request.tools.iter().map(|t| t.name.clone()).collect(),
            first_tool_only: request.first_tool_only,
        });
        let next = script
            .queues
            .get_mut(request.action)
            .and_then(VecDeque::pop_front);
        Ok(next
            .or_else(|| script.repeat.get(request.action).cloned())
            .unwrap_or_else(Selection::nothing))
    }

    async fn complete(&self, request: CompletionRequest<'_>) -> ActionResult<Completion> {
        let mut script = self.script();
        script.completes.push(request.action.to_string());
        Ok(script
            .completions
            .pop_front()
            .unwrap_or_else(|| Completion::text("")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::Decision;
    use serde_json::json;

    fn request<'a>(action: &'a str) -> SelectionRequest<'a> {
        SelectionRequest {
            action,
            tools: &[],
            messages: &[],
            system_prompt: None,
            temperature: None,
            first_tool_only: false,
            default_tool: "DefaultAction",
        }
    }

    #[tokio::test]
    async fn test_queue_then_repeat_then_nothing() {
        let selector = ScriptedSelector::new()
            .pick("Root", "MathProblem", json!({"answer": "16"}))
            .always("Loop", Selection::fallback("again"));

        let first = selector.select(request("Root")).await.unwrap();
        assert!(matches!(first.decision, Decision::Invoke(_)));
        let second = selector.select(request("Root")).await.unwrap();
        assert_eq!(second.decision, Decision::Nothing);

        for _ in 0..2 {
            let looped = selector.select(request("Loop")).await.unwrap();
            assert_eq!(looped.decision, Decision::Fallback("again".into()));
        }
        assert_eq!(selector.select_count("Root"), 2);
        assert_eq!(selector.select_count("Loop"), 2);
    }

    #[tokio::test]
    async fn test_completions() {
        let selector = ScriptedSelector::new().completion(Completion::text("hello"));
        let req = CompletionRequest {
            action: "Leaf",
            messages: &[],
            system_prompt: None,
            temperature: None,
        };
        assert_eq!(selector.complete(req).await.unwrap().content, "hello");
        assert_eq!(selector.complete(req).await.unwrap().content, "");
        assert_eq!(selector.complete_calls(), ["Leaf", "Leaf"]);
    }
}
