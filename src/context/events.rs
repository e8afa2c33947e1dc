//! 上下文事件：向外部观察者（WebSocket、gRPC 流等）推送历史变更与通知

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::context::{ChatRole, ToolCall};

/// 可序列化为 JSON 的上下文事件
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ContextEvent {
    /// 追加了一条普通消息
    Message { role: ChatRole, content: String },
    /// 追加或修订了某次调用的工具响应
    Response {
        tool_call: ToolCall,
        content: String,
        amended: bool,
    },
    /// 分离上下文提交回父上下文
    Commit { action: String, tool_call_id: String },
    /// Action 主动发出的通知
    Notification { payload: Value },
}

/// 上下文观察者
#[async_trait]
pub trait ContextObserver: Send + Sync {
    async fn on_event(&self, event: ContextEvent);
}

/// 把事件转发到无界通道
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<ContextEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ContextEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ContextObserver for ChannelObserver {
    async fn on_event(&self, event: ContextEvent) {
        // 接收端关闭时静默丢弃
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_observer_forwards() {
        let (observer, mut rx) = ChannelObserver::new();
        observer
            .on_event(ContextEvent::Notification {
                payload: serde_json::json!({"message": "hi"}),
            })
            .await;

        let event = rx.recv().await.unwrap();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "notification");
        assert_eq!(json["payload"]["message"], "hi");
    }

    #[tokio::test]
    async fn test_closed_receiver_is_ignored() {
        let (observer, rx) = ChannelObserver::new();
        drop(rx);
        observer
            .on_event(ContextEvent::Message {
                role: ChatRole::User,
                content: "lost".into(),
            })
            .await;
    }
}
