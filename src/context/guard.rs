//! 递归守卫：记录当前线性分支上仍在执行的 Action 标识
//!
//! 每个执行帧持有自己的一份（进入子 Action 时复制并追加），
//! 并发兄弟分支之间互不影响。

use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecursionGuard {
    active: Vec<String>,
}

impl RecursionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, action_id: &str) -> bool {
        self.active.iter().any(|id| id == action_id)
    }

    /// 返回追加了 action_id 的新守卫，自身不变
    pub fn enter(&self, action_id: &str) -> Self {
        let mut active = self.active.clone();
        active.push(action_id.to_string());
        Self { active }
    }

    pub fn depth(&self) -> usize {
        self.active.len()
    }

    pub fn path(&self) -> &[String] {
        &self.active
    }
}
