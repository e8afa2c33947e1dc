//! Hive - Action 树调度运行时
//!
//! 模块划分：
//! - **core**: 控制流信号与错误类型
//! - **context**: 对话历史、用量、allow-list、集成配置、递归守卫、同步工作卸载
//! - **action**: 字段、设置、生命周期钩子、类型描述符与注册表
//! - **selector**: 选择器契约、文本模型适配、脚本化选择器
//! - **dispatcher**: 递归执行引擎与执行轨迹
//! - **remote**: 远程工具连接与运行时子表补丁
//! - **graph**: 静态依赖图与 Mermaid 渲染
//! - **service**: 面向传输层的列举 / 运行 / 取图操作
//! - **config**: 配置加载（TOML + 环境变量）
//! - **observability**: tracing 初始化

pub mod action;
pub mod config;
pub mod context;
pub mod core;
pub mod dispatcher;
pub mod graph;
pub mod observability;
pub mod remote;
pub mod selector;
pub mod service;

pub use action::{ActionBuilder, ActionRegistry, ActionSpec, Behavior, FieldSpec, Invocation};
pub use context::{ChatRole, Context, Message, ToolCall};
pub use core::{ActionError, ActionResult, Signal, SignalKind};
pub use dispatcher::{ActionTrace, DispatchReport, Dispatcher};
pub use selector::{Decision, ScriptedSelector, Selection, Selector, ToolChoice};
pub use service::{ActionService, RunOutput};
