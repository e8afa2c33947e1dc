//! 上下文层：对话历史、用量、allow-list、集成配置、递归守卫与同步工作卸载

pub mod events;
pub mod guard;
pub mod integration;
pub mod message;
pub mod store;
pub mod usage;
pub mod worker;

pub use events::{ChannelObserver, ContextEvent, ContextObserver};
pub use guard::RecursionGuard;
pub use integration::Integration;
pub use message::{ChatRole, Message, Metadata, ToolCall};
pub use store::{Context, ContextBuilder, DetachPolicy, HistoryScope};
pub use usage::{merge_usage_maps, ModelUsage, UsageMap, UsageMetadata, UsageRecord};
pub use worker::WorkerPool;
