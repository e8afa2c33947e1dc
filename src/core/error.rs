//! 调度错误类型
//!
//! 校验错误、幻觉工具、钩子异常、集成不可用等统一为 ActionError；
//! 钩子作者可直接用 `?` 传播任意 anyhow 错误。

use thiserror::Error;

/// 调度过程中可能出现的错误（参数校验、子 Action 注册、钩子、选择器、远程集成等）
#[derive(Error, Debug)]
pub enum ActionError {
    /// 选择器或调用方给出的参数不符合 Action 声明的字段
    #[error("Validation failed for {action}: {reason}")]
    Validation { action: String, reason: String },

    /// 选择器选中了当前子集合中不存在的工具
    #[error("Hallucinated tool: {0}")]
    HallucinatedTool(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Action already registered: {0}")]
    DuplicateAction(String),

    #[error("Child {name} already exists on {parent}")]
    DuplicateChild { parent: String, name: String },

    /// pre / post / fallback 等钩子内部抛出的错误
    #[error("Hook of {action} failed: {message}")]
    Hook { action: String, message: String },

    #[error("Selector error: {0}")]
    Selector(String),

    /// 远程工具提供方连接失败或调用失败
    #[error("Integration {name} unavailable: {reason}")]
    Integration { name: String, reason: String },

    #[error("Offloaded work failed: {0}")]
    Offload(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ActionError {
    pub fn validation(action: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            action: action.into(),
            reason: reason.into(),
        }
    }

    pub fn hook(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Hook {
            action: action.into(),
            message: message.into(),
        }
    }

    pub fn integration(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Integration {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// 是否为参数校验类错误（不会污染上下文）
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::HallucinatedTool(_))
    }
}

pub type ActionResult<T> = Result<T, ActionError>;
