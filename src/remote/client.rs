//! 远程会话与子表打补丁
//!
//! 每次执行（pre 之后）建立一次会话并列举工具，按允许列表把工具变成 Remote 来源的 ActionSpec
//! 插入现存子表。连接失败视为该集成不存在，除非连接声明为 required。

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::json;

use crate::action::{ActionBuilder, ActionSpec, Behavior, FieldSet, Invocation, Origin};
use crate::context::Integration;
use crate::core::{ActionError, ActionResult, Signal};
use crate::remote::{Connection, Connector, RemoteTool, ToolProvider};

pub struct RemoteClient {
    connection: Connection,
    provider: Arc<dyn ToolProvider>,
    allowed_tools: BTreeSet<String>,
}

impl RemoteClient {
    pub fn new(
        connection: Connection,
        provider: Arc<dyn ToolProvider>,
        allowed_tools: BTreeSet<String>,
    ) -> Self {
        Self {
            connection,
            provider,
            allowed_tools,
        }
    }

    pub fn name(&self) -> &str {
        &self.connection.name
    }

    fn permits(&self, tool: &str) -> bool {
        self.allowed_tools.is_empty() || self.allowed_tools.contains(tool)
    }

    /// 列举并过滤后的工具
    pub async fn tools(&self) -> ActionResult<Vec<RemoteTool>> {
        let tools = self.provider.list_tools().await?;
        Ok(tools.into_iter().filter(|t| self.permits(&t.name)).collect())
    }

    /// 以工具名为别名插入子表；与本地子 Action 同名时远程工具覆盖之
    pub async fn patch(
        self: &Arc<Self>,
        children: &mut IndexMap<String, Arc<ActionSpec>>,
    ) -> ActionResult<()> {
        for tool in self.tools().await? {
            let alias = tool.name.clone();
            children.insert(alias, Arc::new(self.remote_action(tool)));
        }
        Ok(())
    }

    fn remote_action(self: &Arc<Self>, tool: RemoteTool) -> ActionSpec {
        ActionBuilder::new(format!("remote.{}.{}", self.connection.name, tool.name))
            .description(tool.description)
            .fields(FieldSet::from_json_schema(&tool.input_schema))
            .behavior(RemoteToolBehavior {
                client: Arc::clone(self),
                tool: tool.name,
            })
            .origin(Origin::Remote {
                connection: self.connection.name.clone(),
            })
            .build()
    }
}

struct RemoteToolBehavior {
    client: Arc<RemoteClient>,
    tool: String,
}

#[async_trait]
impl Behavior for RemoteToolBehavior {
    async fn pre(&self, inv: &Invocation) -> ActionResult<Signal> {
        let context = inv.context();
        let connection = self.client.name();
        context
            .notify(json!({
                "event": "remote-call",
                "connection": connection,
                "tool": self.tool,
                "status": "started",
                "data": inv.args(),
            }))
            .await;

        let content = self.client.provider.call_tool(&self.tool, inv.args()).await?;

        context
            .notify(json!({
                "event": "remote-call",
                "connection": connection,
                "tool": self.tool,
                "status": "completed",
                "data": content,
            }))
            .await;
        inv.add_response(content).await;
        Ok(Signal::CONTINUE)
    }
}

/// 为一组连接建立会话；bypass 为 true 时忽略 require_integration
pub async fn connect_all(
    connector: Option<&dyn Connector>,
    connections: &[Connection],
    integrations: &HashMap<String, Integration>,
    bypass: bool,
) -> ActionResult<Vec<Arc<RemoteClient>>> {
    let mut clients = Vec::with_capacity(connections.len());
    for connection in connections {
        let integration = integrations.get(&connection.name);
        if !bypass && connection.require_integration && integration.is_none() {
            tracing::debug!(connection = %connection.name, "no integration configured, skipped");
            continue;
        }

        let result = match connector {
            Some(connector) => {
                let config = connection.effective_config(integration);
                connector.connect(connection, &config).await
            }
            None => Err(ActionError::integration(
                &connection.name,
                "no connector configured",
            )),
        };
        match result {
            Ok(provider) => clients.push(Arc::new(RemoteClient::new(
                connection.clone(),
                provider,
                connection.effective_allowed_tools(integration),
            ))),
            Err(e) if connection.required => return Err(e),
            Err(e) => {
                tracing::warn!(connection = %connection.name, error = %e, "connection dropped");
            }
        }
    }
    Ok(clients)
}

/// 用全部会话给子表打补丁；列举失败的可选连接被丢弃
pub async fn patch_children(
    clients: &[Arc<RemoteClient>],
    children: &mut IndexMap<String, Arc<ActionSpec>>,
) -> ActionResult<()> {
    for client in clients {
        if let Err(e) = client.patch(children).await {
            if client.connection.required {
                return Err(e);
            }
            tracing::warn!(connection = %client.name(), error = %e, "tool listing failed, skipped");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, Value};

    struct StaticProvider;

    #[async_trait]
    impl ToolProvider for StaticProvider {
        async fn list_tools(&self) -> ActionResult<Vec<RemoteTool>> {
            Ok(vec![
                RemoteTool {
                    name: "search".into(),
                    description: "Search issues".into(),
                    input_schema: json!({
                        "type": "object",
                        "properties": {"query": {"type": "string"}},
                        "required": ["query"]
                    }),
                },
                RemoteTool {
                    name: "delete".into(),
                    description: "Delete issue".into(),
                    input_schema: Value::Null,
                },
            ])
        }

        async fn call_tool(&self, tool: &str, _args: &Map<String, Value>) -> ActionResult<String> {
            Ok(format!("{tool} ok"))
        }
    }

    struct StaticConnector;

    #[async_trait]
    impl Connector for StaticConnector {
        async fn connect(
            &self,
            connection: &Connection,
            _config: &Map<String, Value>,
        ) -> ActionResult<Arc<dyn ToolProvider>> {
            if connection.name == "down" {
                return Err(ActionError::integration(&connection.name, "refused"));
            }
            Ok(Arc::new(StaticProvider))
        }
    }

    #[tokio::test]
    async fn test_patch_respects_allowed_tools() {
        let client = Arc::new(RemoteClient::new(
            Connection::new("jira"),
            Arc::new(StaticProvider),
            BTreeSet::from(["search".to_string()]),
        ));
        let mut children = IndexMap::new();
        client.patch(&mut children).await.unwrap();

        assert_eq!(children.len(), 1);
        let search = &children["search"];
        assert_eq!(search.id, "remote.jira.search");
        assert!(search.is_remote());
        assert!(search.fields.get("query").unwrap().required);
    }

    #[tokio::test]
    async fn test_connect_all_skips_and_drops() {
        let connections = [
            Connection::new("jira"),
            Connection::new("gated").require_integration(true),
            Connection::new("down"),
        ];
        let clients = connect_all(Some(&StaticConnector), &connections, &HashMap::new(), false)
            .await
            .unwrap();
        let names: Vec<&str> = clients.iter().map(|c| c.name()).collect();
        assert_eq!(names, ["jira"]);

        let clients = connect_all(Some(&StaticConnector), &connections, &HashMap::new(), true)
            .await
            .unwrap();
        assert_eq!(clients.len(), 2);
    }

    #[tokio::test]
    async fn test_required_connection_fails() {
        let connections = [Connection::new("down").required(true)];
        let result =
            connect_all(Some(&StaticConnector), &connections, &HashMap::new(), false).await;
        assert!(matches!(result, Err(ActionError::Integration { .. })));

        let result = connect_all(None, &connections, &HashMap::new(), false).await;
        assert!(result.is_err());
        let optional = [Connection::new("jira")];
        assert!(connect_all(None, &optional, &HashMap::new(), false)
            .await
            .unwrap()
            .is_empty());
    }
}
