//! 远程工具：连接声明、会话抽象与运行时子表补丁

pub mod client;
pub mod connection;
pub mod provider;

pub use client::{connect_all, patch_children, RemoteClient};
pub use connection::Connection;
pub use provider::{Connector, RemoteTool, ToolProvider};
