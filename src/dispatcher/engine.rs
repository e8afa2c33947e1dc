//! 调度引擎：递归执行 Action 树
//!
//! 单次调用：校验参数 -> 递归检查 -> （可选）分离上下文 -> pre -> 若干轮「选择 + 执行子 Action」-> post，
//! 出错时交给错误钩子，最后按提交策略把分离上下文合并回父上下文。
//!
//! 并发子 Action 与当前任务上的其他子 Action 协作式交替推进（`FuturesUnordered`），
//! 本轮结束前必须等全部并发子 Action 结束，不因某个兄弟返回 End 而取消。

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use futures_util::future::BoxFuture;
use futures_util::stream::{FuturesUnordered, StreamExt};
use futures_util::FutureExt;
use indexmap::IndexMap;
use serde_json::Value;

use crate::action::{ActionRegistry, ActionSpec, Invocation};
use crate::context::{Context, RecursionGuard, ToolCall};
use crate::core::{ActionError, ActionResult, Signal};
use crate::dispatcher::ActionTrace;
use crate::remote::{self, Connector};
use crate::selector::{Decision, SelectionRequest, Selector, ToolSpec};

/// 一次顶层调度的结果
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub signal: Signal,
    pub trace: ActionTrace,
}

/// 单个执行帧的结果；出错时轨迹依然保留
struct Outcome {
    result: ActionResult<Signal>,
    trace: ActionTrace,
}

/// 本轮要执行的子 Action
struct Planned {
    alias: String,
    spec: Arc<ActionSpec>,
    args: Value,
}

pub struct Dispatcher {
    registry: Arc<ActionRegistry>,
    selector: Arc<dyn Selector>,
    connector: Option<Arc<dyn Connector>>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ActionRegistry>, selector: Arc<dyn Selector>) -> Self {
        Self {
            registry,
            selector,
            connector: None,
        }
    }

    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn registry(&self) -> &Arc<ActionRegistry> {
        &self.registry
    }

    pub fn connector(&self) -> Option<&Arc<dyn Connector>> {
        self.connector.as_ref()
    }

    /// 在给定上下文上以调用方参数执行一个已登记的 Action
    pub async fn start(
        &self,
        context: &Arc<Context>,
        action: &str,
        args: Value,
    ) -> ActionResult<DispatchReport> {
        let spec = self.registry.resolve(action)?;
        let call = ToolCall::new(action, args.clone());
        let outcome = self
            .execute(
                action.to_string(),
                spec,
                call,
                args,
                Arc::clone(context),
                RecursionGuard::new(),
            )
            .await;
        Ok(DispatchReport {
            signal: outcome.result?,
            trace: outcome.trace,
        })
    }

    fn execute(
        &self,
        name: String,
        spec: Arc<ActionSpec>,
        call: ToolCall,
        args: Value,
        parent: Arc<Context>,
        guard: RecursionGuard,
    ) -> BoxFuture<'_, Outcome> {
        async move {
            let started = Instant::now();
            let mut trace = ActionTrace::start(&name, &spec.id, &call.id, args.clone());

            let args = match spec.fields.validate(&spec.id, args) {
                Ok(args) => args,
                Err(e) => {
                    trace.error = Some(e.to_string());
                    return Outcome {
                        result: Err(e),
                        trace,
                    };
                }
            };
            trace.args = Value::Object(args.clone());

            if parent.check_self_recursion(&guard, &spec.id) {
                trace.blocked = true;
                trace.signal = Some(Signal::END);
                return Outcome {
                    result: Ok(Signal::END),
                    trace,
                };
            }

            let detached = spec.settings.detached;
            let context = if detached {
                parent.detach_context().await
            } else {
                Arc::clone(&parent)
            };
            trace.detached = detached;

            let inv = Invocation::new(
                name,
                Arc::clone(&spec),
                call,
                args,
                Arc::clone(&context),
                Arc::clone(&self.selector),
            );
            let guard = guard.enter(&spec.id);

            let (result, commit) = match self.lifecycle(&inv, &guard, &mut trace).await {
                Ok(signal) => (Ok(signal), true),
                Err(error) => {
                    trace.error = Some(error.to_string());
                    match spec.behavior.on_error(&inv, &error).await {
                        Some(Ok(signal)) => {
                            tracing::warn!(
                                action = %spec.id,
                                error = %error,
                                "error recovered by hook"
                            );
                            let signal = if signal.is_break() {
                                signal
                            } else {
                                Signal::CONTINUE
                            };
                            (Ok(signal), true)
                        }
                        Some(Err(raised)) => (Err(raised), false),
                        None => (Err(error), false),
                    }
                }
            };

            if detached {
                if commit {
                    Context::commit_context(&parent, &context, inv.call()).await;
                } else {
                    tracing::warn!(action = %spec.id, "detached commit suppressed");
                }
            }

            trace.usage = inv.take_usage().await;
            trace.signal = result.as_ref().ok().cloned();
            trace.duration_ms = started.elapsed().as_millis() as u64;

            let audit = serde_json::json!({
                "event": "action_audit",
                "action": spec.id,
                "name": inv.name(),
                "ok": result.is_ok(),
                "signal": trace.signal.as_ref().map(|s| s.kind),
                "rounds": trace.rounds,
                "duration_ms": trace.duration_ms,
                "args_preview": args_preview(&trace.args),
            });
            tracing::info!(audit = %audit.to_string(), "action");

            Outcome { result, trace }
        }
        .boxed()
    }

    async fn lifecycle(
        &self,
        inv: &Invocation,
        guard: &RecursionGuard,
        trace: &mut ActionTrace,
    ) -> ActionResult<Signal> {
        let spec = inv.spec();
        let behavior = &spec.behavior;

        let signal = behavior.pre(inv).await?;
        if signal.is_break() {
            return Ok(signal);
        }

        let remote_children = self.remote_children(inv).await?;

        let max_rounds = spec.settings.max_child_iteration;
        let mut rounds = 0;
        let last = loop {
            let signal = self.run_round(inv, guard, &remote_children, trace).await;
            rounds += 1;
            trace.rounds = rounds;
            let signal = signal?;
            if signal.is_break() || max_rounds == 0 || rounds > max_rounds {
                break signal;
            }
        };
        if last.is_end() {
            return Ok(last);
        }

        behavior.post(inv).await
    }

    /// 每次执行只连接、列举一次远程工具
    async fn remote_children(
        &self,
        inv: &Invocation,
    ) -> ActionResult<IndexMap<String, Arc<ActionSpec>>> {
        let mut children = IndexMap::new();
        let connections = &inv.spec().connections;
        if connections.is_empty() {
            return Ok(children);
        }
        let clients = remote::connect_all(
            self.connector.as_deref(),
            connections,
            inv.context().integrations(),
            false,
        )
        .await?;
        remote::patch_children(&clients, &mut children).await?;
        Ok(children)
    }

    /// 静态子表 + 远程工具，按 allow-list 与 enabled 过滤
    fn live_children(
        &self,
        inv: &Invocation,
        remote_children: &IndexMap<String, Arc<ActionSpec>>,
    ) -> ActionResult<IndexMap<String, Arc<ActionSpec>>> {
        let mut children: IndexMap<String, Arc<ActionSpec>> = self
            .registry
            .children_of(inv.spec())?
            .into_iter()
            .collect();
        for (alias, spec) in remote_children {
            children.insert(alias.clone(), Arc::clone(spec));
        }
        let context = inv.context();
        children.retain(|alias, child| context.is_action_allowed(alias, child.settings.enabled));
        Ok(children)
    }

    async fn run_round(
        &self,
        inv: &Invocation,
        guard: &RecursionGuard,
        remote_children: &IndexMap<String, Arc<ActionSpec>>,
        trace: &mut ActionTrace,
    ) -> ActionResult<Signal> {
        let spec = inv.spec();
        let settings = &spec.settings;
        let children = self.live_children(inv, remote_children)?;

        if children.is_empty() {
            if !spec.behavior.has_fallback() {
                return Ok(Signal::BREAK);
            }
            let content = inv.complete().await?;
            return spec.behavior.fallback(inv, &content).await;
        }

        let tools: Vec<ToolSpec> = children
            .iter()
            .map(|(alias, child)| child.tool_spec(alias))
            .collect();
        let messages = inv.context().history().await;
        let selection = self
            .selector
            .select(SelectionRequest {
                action: &spec.id,
                tools: &tools,
                messages: &messages,
                system_prompt: settings.system_prompt.as_deref(),
                temperature: settings.temperature,
                first_tool_only: settings.first_tool_only,
                default_tool: &settings.default_tool,
            })
            .await?;
        if let Some(report) = selection.usage {
            inv.add_usage(&report.model, report.usage, None).await;
        }

        let mut choices = match selection.decision {
            Decision::Nothing => return Ok(Signal::BREAK),
            Decision::Fallback(content) => return spec.behavior.fallback(inv, &content).await,
            Decision::Invoke(choices) => choices,
        };
        if settings.first_tool_only {
            choices.truncate(1);
        }

        // 默认工具不是现存子 Action 时表示回退；与其他工具混选时忽略它
        let (fallbacks, choices): (Vec<_>, Vec<_>) = choices
            .into_iter()
            .partition(|c| c.name == settings.default_tool && !children.contains_key(&c.name));
        if choices.is_empty() {
            let content = fallbacks
                .iter()
                .filter_map(|c| c.args.get("content").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n\n");
            return spec.behavior.fallback(inv, &content).await;
        }
        if !fallbacks.is_empty() {
            tracing::debug!(action = %spec.id, "default tool ignored alongside other tools");
        }

        let planned = choices
            .into_iter()
            .map(|choice| -> ActionResult<Planned> {
                let child = children
                    .get(&choice.name)
                    .ok_or_else(|| ActionError::HallucinatedTool(choice.name.clone()))?;
                Ok(Planned {
                    alias: choice.name,
                    spec: Arc::clone(child),
                    args: choice.args,
                })
            })
            .collect::<ActionResult<Vec<_>>>()?;

        self.run_children(inv, guard, planned, trace).await
    }

    /// 按选择顺序发起子 Action：顺序子 Action 逐个等待，并发子 Action 在后台交替推进；
    /// 顺序子 Action 返回 End 或出错后不再发起新的子 Action，但已发起的并发子 Action 一律等到结束
    async fn run_children(
        &self,
        inv: &Invocation,
        guard: &RecursionGuard,
        planned: Vec<Planned>,
        trace: &mut ActionTrace,
    ) -> ActionResult<Signal> {
        let mut in_flight = FuturesUnordered::new();
        let mut settled: Vec<(usize, Outcome)> = Vec::with_capacity(planned.len());

        for (index, child) in planned.into_iter().enumerate() {
            let call = ToolCall::new(&child.alias, child.args.clone());
            let concurrent = child.spec.settings.concurrent;
            let future = self
                .execute(
                    child.alias,
                    child.spec,
                    call,
                    child.args,
                    Arc::clone(inv.context()),
                    guard.clone(),
                )
                .map(move |outcome| (index, outcome));

            if concurrent {
                in_flight.push(future);
                continue;
            }
            let (index, outcome) = drive(future, &mut in_flight, &mut settled).await;
            let halt = outcome.result.as_ref().map_or(true, Signal::is_end);
            settled.push((index, outcome));
            if halt {
                break;
            }
        }

        while let Some(done) = in_flight.next().await {
            settled.push(done);
        }
        settled.sort_by_key(|(index, _)| *index);

        let mut signal = Signal::CONTINUE;
        let mut first_error = None;
        for (_, outcome) in settled {
            match outcome.result {
                Ok(s) if s.is_end() && !signal.is_end() => signal = s,
                Ok(_) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
            trace.children.push(outcome.trace);
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(signal),
        }
    }
}

/// 等待一个顺序子 Action，同时继续推进已发起的并发子 Action
async fn drive<F, S>(
    future: F,
    in_flight: &mut FuturesUnordered<S>,
    settled: &mut Vec<(usize, Outcome)>,
) -> (usize, Outcome)
where
    F: Future<Output = (usize, Outcome)>,
    S: Future<Output = (usize, Outcome)>,
{
    tokio::pin!(future);
    loop {
        tokio::select! {
            biased;
            done = &mut future => return done,
            Some(done) = in_flight.next(), if !in_flight.is_empty() => settled.push(done),
        }
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionBuilder;
    use crate::selector::ScriptedSelector;
    use serde_json::json;

    #[test]
    fn test_args_preview_truncates() {
        let long = json!({"text": "x".repeat(500)});
        let preview = args_preview(&long);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), 203);
        assert_eq!(args_preview(&json!({"a": 1})), r#"{"a":1}"#);

        let cjk = json!("中".repeat(100));
        assert_eq!(args_preview(&cjk), cjk.to_string());
    }

    #[tokio::test]
    async fn test_start_unknown_action() {
        let dispatcher = Dispatcher::new(
            Arc::new(ActionRegistry::new()),
            Arc::new(ScriptedSelector::new()),
        );
        let result = dispatcher
            .start(&Context::builder().build(), "Missing", Value::Null)
            .await;
        assert!(matches!(result, Err(ActionError::UnknownAction(_))));
    }

    #[tokio::test]
    async fn test_leaf_without_fallback_skips_selector() {
        let mut registry = ActionRegistry::new();
        registry.register(ActionBuilder::new("Leaf")).unwrap();
        let selector = Arc::new(ScriptedSelector::new());
        let dispatcher = Dispatcher::new(Arc::new(registry), selector.clone());

        let report = dispatcher
            .start(&Context::builder().build(), "Leaf", Value::Null)
            .await
            .unwrap();
        assert_eq!(report.signal, Signal::CONTINUE);
        assert_eq!(report.trace.rounds, 1);
        assert!(selector.select_calls().is_empty());
        assert!(selector.complete_calls().is_empty());
    }
}
