//! Action 数据模型：字段、设置、钩子、类型描述符、注册表与单次调用

pub mod fields;
pub mod invocation;
pub mod registry;
pub mod settings;
pub mod spec;

pub use fields::{FieldKind, FieldSet, FieldSpec};
pub use invocation::Invocation;
pub use registry::ActionRegistry;
pub use settings::{ActionSettings, Groups, DEFAULT_ACTION};
pub use spec::{ActionBuilder, ActionId, ActionSpec, Behavior, Origin, Passthrough};
