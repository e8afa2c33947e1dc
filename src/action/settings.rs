//! Action 类型级配置
//!
//! 继承规则：`ActionBuilder::extends` 复制父类型的全部设置，唯独 `agent` 回到基线值。

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// 默认回退工具名
pub const DEFAULT_ACTION: &str = "DefaultAction";

/// 传输层 -> 分组名集合
pub type Groups = BTreeMap<String, BTreeSet<String>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSettings {
    /// 覆盖选择器的 system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// 选择器给出此名称且它不是现存子 Action 时，视为回退
    pub default_tool: String,
    /// 每轮最多执行一个子 Action
    pub first_tool_only: bool,
    /// 作为子 Action 时与兄弟并发执行
    pub concurrent: bool,
    /// 0 表示只跑一轮
    pub max_child_iteration: usize,
    /// 在分离上下文中执行子树
    pub detached: bool,
    pub groups: Groups,
    pub enabled: bool,
    /// 是否作为独立 agent 对外列出（不可继承，基线为 false）
    pub agent: bool,
}

impl Default for ActionSettings {
    fn default() -> Self {
        Self {
            system_prompt: None,
            temperature: None,
            default_tool: DEFAULT_ACTION.to_string(),
            first_tool_only: false,
            concurrent: false,
            max_child_iteration: 0,
            detached: false,
            groups: Groups::new(),
            enabled: true,
            agent: false,
        }
    }
}

impl ActionSettings {
    /// 子类型继承到的设置
    pub fn inherit(&self) -> Self {
        Self {
            agent: Self::default().agent,
            ..self.clone()
        }
    }

    pub fn in_group(&self, transport: &str, group: &str) -> bool {
        self.groups
            .get(transport)
            .is_some_and(|groups| groups.contains(group))
    }
}
