//! 核心类型：控制流信号与错误

pub mod error;
pub mod signal;

pub use error::{ActionError, ActionResult};
pub use signal::{Signal, SignalKind};
