//! 调度层：执行引擎与执行轨迹

pub mod engine;
pub mod trace;

pub use engine::{DispatchReport, Dispatcher};
pub use trace::ActionTrace;
