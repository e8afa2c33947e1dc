//! Action 类型注册表：按 id 索引的描述符 arena
//!
//! 登记时校验子类型必须已登记（或为自身）；之后只能通过 `add_child` 修改子表。

use std::sync::Arc;

use indexmap::IndexMap;

use crate::action::{ActionBuilder, ActionId, ActionSpec};
use crate::core::{ActionError, ActionResult};

#[derive(Debug, Default, Clone)]
pub struct ActionRegistry {
    actions: IndexMap<ActionId, Arc<ActionSpec>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, builder: ActionBuilder) -> ActionResult<Arc<ActionSpec>> {
        self.register_spec(builder.build())
    }

    pub fn register_spec(&mut self, spec: ActionSpec) -> ActionResult<Arc<ActionSpec>> {
        if self.actions.contains_key(&spec.id) {
            return Err(ActionError::DuplicateAction(spec.id));
        }
        if let Some(missing) = spec
            .children
            .values()
            .find(|child| **child != spec.id && !self.actions.contains_key(*child))
        {
            return Err(ActionError::UnknownAction(missing.clone()));
        }

        tracing::debug!(
            action = %spec.id,
            children = spec.children.len(),
            "action registered"
        );
        let spec = Arc::new(spec);
        self.actions.insert(spec.id.clone(), Arc::clone(&spec));
        Ok(spec)
    }

    /// 为已登记的 parent 增加子 Action；alias 缺省为子类型 id，同名时仅在 replace 为 true 时覆盖
    pub fn add_child(
        &mut self,
        parent: &str,
        child: &str,
        alias: Option<&str>,
        replace: bool,
    ) -> ActionResult<()> {
        if !self.actions.contains_key(child) {
            return Err(ActionError::UnknownAction(child.to_string()));
        }
        let entry = self
            .actions
            .get_mut(parent)
            .ok_or_else(|| ActionError::UnknownAction(parent.to_string()))?;

        let alias = alias.unwrap_or(child).to_string();
        if !replace && entry.children.contains_key(&alias) {
            return Err(ActionError::DuplicateChild {
                parent: parent.to_string(),
                name: alias,
            });
        }
        Arc::make_mut(entry)
            .children
            .insert(alias, child.to_string());
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Arc<ActionSpec>> {
        self.actions.get(id).cloned()
    }

    pub fn resolve(&self, id: &str) -> ActionResult<Arc<ActionSpec>> {
        self.get(id)
            .ok_or_else(|| ActionError::UnknownAction(id.to_string()))
    }

    /// 按声明顺序解析静态子表：(别名, 子描述符)
    pub fn children_of(&self, spec: &ActionSpec) -> ActionResult<Vec<(String, Arc<ActionSpec>)>> {
        spec.children
            .iter()
            .map(|(alias, id)| Ok((alias.clone(), self.resolve(id)?)))
            .collect()
    }

    /// 某个传输层分组下的全部 Action
    pub fn in_group(&self, transport: &str, group: &str) -> Vec<Arc<ActionSpec>> {
        self.actions
            .values()
            .filter(|spec| spec.settings.in_group(transport, group))
            .cloned()
            .collect()
    }

    /// 标记为独立 agent 的 Action
    pub fn agents(&self) -> Vec<Arc<ActionSpec>> {
        self.actions
            .values()
            .filter(|spec| spec.settings.agent)
            .cloned()
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ActionSpec>> {
        self.actions.values()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
