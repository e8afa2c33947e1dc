//! 生命周期钩子的控制流信号
//!
//! Continue：进入下一阶段；Break：结束当前 Action 剩余阶段，调用方继续；
//! End：向上传播并终止整条调度链。信号可携带可选的 JSON 值。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 信号类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Continue,
    Break,
    End,
}

/// 钩子返回值：信号类型 + 可选负载
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub kind: SignalKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Signal {
    pub const CONTINUE: Signal = Signal {
        kind: SignalKind::Continue,
        value: None,
    };

    pub const BREAK: Signal = Signal {
        kind: SignalKind::Break,
        value: None,
    };

    pub const END: Signal = Signal {
        kind: SignalKind::End,
        value: None,
    };

    pub fn continue_with(value: impl Into<Value>) -> Self {
        Self {
            kind: SignalKind::Continue,
            value: Some(value.into()),
        }
    }

    pub fn break_with(value: impl Into<Value>) -> Self {
        Self {
            kind: SignalKind::Break,
            value: Some(value.into()),
        }
    }

    pub fn end_with(value: impl Into<Value>) -> Self {
        Self {
            kind: SignalKind::End,
            value: Some(value.into()),
        }
    }

    /// Break 与 End 都会中断当前 Action 的后续阶段
    pub fn is_break(&self) -> bool {
        matches!(self.kind, SignalKind::Break | SignalKind::End)
    }

    pub fn is_end(&self) -> bool {
        self.kind == SignalKind::End
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::CONTINUE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_counts_as_break() {
        assert!(Signal::END.is_break());
        assert!(Signal::BREAK.is_break());
        assert!(!Signal::CONTINUE.is_break());
        assert!(!Signal::BREAK.is_end());
    }

    #[test]
    fn test_payload_serialization() {
        let signal = Signal::end_with("done");
        let json = serde_json::to_value(&signal).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "end", "value": "done"}));

        let plain = serde_json::to_value(Signal::CONTINUE).unwrap();
        assert_eq!(plain, serde_json::json!({"kind": "continue"}));
    }
}
