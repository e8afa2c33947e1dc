//! 执行轨迹：每次 Action 调用一个节点，子调用按选择顺序挂在下面

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::UsageRecord;
use crate::core::Signal;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionTrace {
    /// 父 Action 子表中的别名
    pub name: String,
    /// 类型 id
    pub action: String,
    pub tool_call_id: String,
    pub args: Value,
    /// 出错且未恢复时为 None
    pub signal: Option<Signal>,
    pub rounds: usize,
    /// 被递归守卫拦下
    pub blocked: bool,
    pub detached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub usage: Vec<UsageRecord>,
    /// Unix 毫秒时间戳
    pub started_at: i64,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ActionTrace>,
}

impl ActionTrace {
    pub(crate) fn start(name: &str, action: &str, tool_call_id: &str, args: Value) -> Self {
        Self {
            name: name.to_string(),
            action: action.to_string(),
            tool_call_id: tool_call_id.to_string(),
            args,
            signal: None,
            rounds: 0,
            blocked: false,
            detached: false,
            error: None,
            usage: Vec::new(),
            started_at: chrono::Utc::now().timestamp_millis(),
            duration_ms: 0,
            children: Vec::new(),
        }
    }

    /// 深度优先查找第一个别名匹配的节点
    pub fn find(&self, name: &str) -> Option<&ActionTrace> {
        if self.name == name {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(name))
    }

    /// 子树中别名匹配的节点数（含自身）
    pub fn count(&self, name: &str) -> usize {
        let own = usize::from(self.name == name);
        own + self.children.iter().map(|c| c.count(name)).sum::<usize>()
    }

    /// 最深的调用层数（自身为 1）
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(ActionTrace::depth).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tree_queries() {
        let mut root = ActionTrace::start("Root", "Root", "call_1", Value::Null);
        let mut child = ActionTrace::start("Joke", "Joke", "call_2", json!({}));
        child
            .children
            .push(ActionTrace::start("Joke", "Joke", "call_3", json!({})));
        root.children.push(child);
        root.children
            .push(ActionTrace::start("Story", "Story", "call_4", json!({})));

        assert_eq!(root.depth(), 3);
        assert_eq!(root.count("Joke"), 2);
        assert_eq!(root.find("Story").unwrap().tool_call_id, "call_4");
        assert!(root.find("Missing").is_none());
    }

    #[test]
    fn test_serialization_skips_empty() {
        let trace = ActionTrace::start("Root", "Root", "call_1", Value::Null);
        let value = serde_json::to_value(&trace).unwrap();
        assert!(value.get("children").is_none());
        assert!(value.get("error").is_none());
        assert_eq!(value["rounds"], 0);
    }
}
