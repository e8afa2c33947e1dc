//! 选择器：把现存子 Action 变成工具菜单，交给外部决策方选出要调用的子 Action

pub mod prompt;
pub mod schema;
pub mod scripted;
pub mod traits;

pub use prompt::{parse_selection, Generation, PromptSelector, TextModel};
pub use schema::{render_tool_menu, tool_call_schema_json};
pub use scripted::{ScriptedSelector, SelectCall};
pub use traits::{
    Completion, CompletionRequest, Decision, Selection, SelectionRequest, Selector, ToolChoice,
    ToolSpec, UsageReport,
};
