//! 调度上下文：一次顶层调用共享的可变状态
//!
//! 对话历史只追加（唯一例外是修订最近一条同一调用的工具响应），用量按模型累加。
//! 分离（detach）得到隔离副本，子树结束后经 commit_context 合并回父上下文。

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::context::{
    merge_usage_maps, ChatRole, ContextEvent, ContextObserver, Integration, Message, Metadata,
    RecursionGuard, ToolCall, UsageMap, UsageMetadata, WorkerPool,
};

/// 分离上下文时携带的历史范围
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryScope {
    /// 复制完整历史
    #[default]
    Full,
    /// 只保留 system 消息
    SystemOnly,
    /// 从空历史开始
    Empty,
}

/// 分离策略（allow-list 与 integrations 总是深拷贝，用量总是从零开始）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetachPolicy {
    #[serde(default)]
    pub history: HistoryScope,
}

pub struct Context {
    history: RwLock<Vec<Message>>,
    usage: RwLock<UsageMap>,
    allowed_actions: HashMap<String, bool>,
    integrations: HashMap<String, Integration>,
    detach_policy: DetachPolicy,
    workers: WorkerPool,
    observer: Option<Arc<dyn ContextObserver>>,
    /// 分离时携带过来的历史条数；None 表示顶层上下文
    detached_at: Option<usize>,
}

impl Context {
    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    /// 以给定历史创建默认上下文
    pub fn with_messages(messages: Vec<Message>) -> Arc<Self> {
        Self::builder().messages(messages).build()
    }

    pub async fn add_message(
        &self,
        role: ChatRole,
        content: impl Into<String>,
        metadata: Option<Metadata>,
    ) {
        let content = content.into();
        self.history
            .write()
            .await
            .push(Message::new(role, content.clone()).with_metadata(metadata));
        self.emit(ContextEvent::Message { role, content }).await;
    }

    /// 记录某次调用的工具响应；最近一条恰为同一调用的响应时就地追加内容，否则新增一条
    pub async fn add_response(
        &self,
        call: &ToolCall,
        content: impl Into<String>,
        metadata: Option<Metadata>,
    ) {
        let content = content.into();
        let amended = {
            let mut history = self.history.write().await;
            match history.last_mut() {
                Some(last) if last.is_response_to(&call.id) => {
                    if !last.content.is_empty() && !content.is_empty() {
                        last.content.push_str("\n\n");
                    }
                    last.content.push_str(&content);
                    if let Some(extra) = metadata {
                        last.metadata.get_or_insert_with(Metadata::new).extend(extra);
                    }
                    true
                }
                _ => {
                    let message = Message::tool_response(call, content.clone());
                    history.push(message.with_metadata(metadata));
                    false
                }
            }
        };
        self.emit(ContextEvent::Response {
            tool_call: call.clone(),
            content,
            amended,
        })
        .await;
    }

    pub async fn merge_usage(&self, model: &str, delta: UsageMetadata, tag: Option<&str>) {
        self.usage
            .write()
            .await
            .entry(model.to_string())
            .or_default()
            .record(delta, tag);
    }

    pub async fn absorb_usage(&self, other: &UsageMap) {
        merge_usage_maps(&mut *self.usage.write().await, other);
    }

    /// 产生隔离副本：历史按分离策略截取，用量清零，其余配置深拷贝
    pub async fn detach_context(&self) -> Arc<Context> {
        let history: Vec<Message> = {
            let history = self.history.read().await;
            match self.detach_policy.history {
                HistoryScope::Full => history.clone(),
                HistoryScope::SystemOnly => history
                    .iter()
                    .filter(|m| m.role == ChatRole::System)
                    .cloned()
                    .collect(),
                HistoryScope::Empty => Vec::new(),
            }
        };
        let carried = history.len();
        Arc::new(Context {
            history: RwLock::new(history),
            usage: RwLock::new(UsageMap::new()),
            allowed_actions: self.allowed_actions.clone(),
            integrations: self.integrations.clone(),
            detach_policy: self.detach_policy,
            workers: self.workers.clone(),
            observer: self.observer.clone(),
            detached_at: Some(carried),
        })
    }

    /// 把分离子上下文合并回父上下文：最新一条新增消息写入父上下文中该调用的响应槽，用量累加
    pub async fn commit_context(parent: &Context, child: &Context, call: &ToolCall) {
        let newest = {
            let history = child.history.read().await;
            let start = child.detached_at.unwrap_or(0).min(history.len());
            history[start..].last().cloned()
        };
        if let Some(message) = newest {
            parent
                .add_response(call, message.content, message.metadata)
                .await;
        }
        let usage = child.usage.read().await.clone();
        parent.absorb_usage(&usage).await;
        parent
            .emit(ContextEvent::Commit {
                action: call.name.clone(),
                tool_call_id: call.id.clone(),
            })
            .await;
    }

    /// 进入 pre 之前调用：action_id 已在当前分支上执行则返回 true
    pub fn check_self_recursion(&self, guard: &RecursionGuard, action_id: &str) -> bool {
        let blocked = guard.contains(action_id);
        if blocked {
            tracing::warn!(
                action = %action_id,
                depth = guard.depth(),
                "self recursion blocked"
            );
        }
        blocked
    }

    /// 向观察者发送自定义通知
    pub async fn notify(&self, payload: Value) {
        self.emit(ContextEvent::Notification { payload }).await;
    }

    async fn emit(&self, event: ContextEvent) {
        if let Some(observer) = &self.observer {
            observer.on_event(event).await;
        }
    }

    pub async fn history(&self) -> Vec<Message> {
        self.history.read().await.clone()
    }

    pub async fn history_len(&self) -> usize {
        self.history.read().await.len()
    }

    pub async fn last_message(&self) -> Option<Message> {
        self.history.read().await.last().cloned()
    }

    pub async fn usage(&self) -> UsageMap {
        self.usage.read().await.clone()
    }

    pub fn allowed_actions(&self) -> &HashMap<String, bool> {
        &self.allowed_actions
    }

    /// allow-list 中有显式覆盖时以覆盖为准，否则用 Action 自身的 enabled
    pub fn is_action_allowed(&self, name: &str, enabled: bool) -> bool {
        self.allowed_actions.get(name).copied().unwrap_or(enabled)
    }

    pub fn integrations(&self) -> &HashMap<String, Integration> {
        &self.integrations
    }

    pub fn integration(&self, name: &str) -> Option<&Integration> {
        self.integrations.get(name)
    }

    pub fn workers(&self) -> &WorkerPool {
        &self.workers
    }

    pub fn is_detached(&self) -> bool {
        self.detached_at.is_some()
    }
}

/// 上下文构建器
#[derive(Default)]
pub struct ContextBuilder {
    messages: Vec<Message>,
    allowed_actions: HashMap<String, bool>,
    integrations: HashMap<String, Integration>,
    detach_policy: DetachPolicy,
    workers: Option<WorkerPool>,
    observer: Option<Arc<dyn ContextObserver>>,
}

impl ContextBuilder {
    pub fn message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// 在历史最前面插入 system 消息
    pub fn system_message(mut self, content: impl Into<String>) -> Self {
        self.messages.insert(0, Message::system(content));
        self
    }

    pub fn messages(mut self, messages: impl IntoIterator<Item = Message>) -> Self {
        self.messages.extend(messages);
        self
    }

    /// 显式启用或禁用某个子 Action（按子名称）
    pub fn allow(mut self, name: impl Into<String>, enabled: bool) -> Self {
        self.allowed_actions.insert(name.into(), enabled);
        self
    }

    pub fn allowed_actions(mut self, allowed: HashMap<String, bool>) -> Self {
        self.allowed_actions.extend(allowed);
        self
    }

    pub fn integration(mut self, name: impl Into<String>, integration: Integration) -> Self {
        self.integrations.insert(name.into(), integration);
        self
    }

    pub fn integrations(mut self, integrations: HashMap<String, Integration>) -> Self {
        self.integrations.extend(integrations);
        self
    }

    pub fn detach_policy(mut self, policy: DetachPolicy) -> Self {
        self.detach_policy = policy;
        self
    }

    pub fn workers(mut self, workers: WorkerPool) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn ContextObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn build(self) -> Arc<Context> {
        Arc::new(Context {
            history: RwLock::new(self.messages),
            usage: RwLock::new(UsageMap::new()),
            allowed_actions: self.allowed_actions,
            integrations: self.integrations,
            detach_policy: self.detach_policy,
            workers: self.workers.unwrap_or_default(),
            observer: self.observer,
            detached_at: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ChannelObserver;

    fn seeded() -> Arc<Context> {
        Context::with_messages(vec![Message::system("sys"), Message::user("4 x 4")])
    }

    #[tokio::test]
    async fn test_add_response_amends_latest_slot() {
        let ctx = seeded();
        let call = ToolCall::new("MathProblem", Value::Null);
        ctx.add_response(&call, "16", None).await;
        ctx.add_response(&call, "because 4 * 4", None).await;

        let history = ctx.history().await;
        assert_eq!(history.len(), 3);
        assert_eq!(history[2].content, "16\n\nbecause 4 * 4");
    }

    #[tokio::test]
    async fn test_add_response_appends_after_other_message() {
        let ctx = seeded();
        let call = ToolCall::new("MathProblem", Value::Null);
        ctx.add_response(&call, "16", None).await;
        ctx.add_message(ChatRole::Assistant, "thinking", None).await;
        ctx.add_response(&call, "again", None).await;
        assert_eq!(ctx.history_len().await, 5);
    }

    #[tokio::test]
    async fn test_detach_and_commit() {
        let parent = seeded();
        let child = parent.detach_context().await;
        assert!(child.is_detached());
        assert_eq!(child.history_len().await, 2);

        child.add_message(ChatRole::Assistant, "draft", None).await;
        child.add_message(ChatRole::Assistant, "final", None).await;
        child
            .merge_usage("gpt", UsageMetadata::new(5, 5), None)
            .await;
        assert_eq!(parent.history_len().await, 2);

        let call = ToolCall::new("Joke", Value::Null);
        Context::commit_context(&parent, &child, &call).await;

        let history = parent.history().await;
        assert_eq!(history.len(), 3);
        assert_eq!(history[2].content, "final");
        assert!(history[2].is_response_to(&call.id));
        assert_eq!(parent.usage().await["gpt"].total.total_tokens, 10);
    }

    #[tokio::test]
    async fn test_commit_without_new_messages_adds_nothing() {
        let parent = seeded();
        let child = parent.detach_context().await;
        let call = ToolCall::new("Quiet", Value::Null);
        Context::commit_context(&parent, &child, &call).await;
        assert_eq!(parent.history_len().await, 2);
    }

    #[tokio::test]
    async fn test_detach_policy_system_only() {
        let parent = Context::builder()
            .messages(vec![Message::system("sys"), Message::user("hi")])
            .detach_policy(DetachPolicy {
                history: HistoryScope::SystemOnly,
            })
            .allow("Joke", false)
            .build();
        let child = parent.detach_context().await;
        let history = child.history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, ChatRole::System);
        assert!(!child.is_action_allowed("Joke", true));
    }

    #[tokio::test]
    async fn test_observer_sees_events() {
        let (observer, mut rx) = ChannelObserver::new();
        let ctx = Context::builder().observer(Arc::new(observer)).build();
        ctx.add_message(ChatRole::User, "hello", None).await;
        ctx.notify(serde_json::json!({"progress": 50})).await;

        assert!(matches!(rx.recv().await, Some(ContextEvent::Message { .. })));
        assert!(matches!(
            rx.recv().await,
            Some(ContextEvent::Notification { .. })
        ));
    }

    #[test]
    fn test_recursion_check() {
        let ctx = Context::builder().build();
        let guard = RecursionGuard::new().enter("Loop");
        assert!(ctx.check_self_recursion(&guard, "Loop"));
        assert!(!ctx.check_self_recursion(&guard, "Other"));
    }
}
