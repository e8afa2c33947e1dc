//! 静态依赖图：从根 Action 出发遍历子表闭包（含远程工具），不执行任何钩子
//!
//! 已访问的节点不再展开，但指向它的边照常记录，因此自引用或互相引用的树也能终止。

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::action::{ActionRegistry, ActionSpec};
use crate::context::Integration;
use crate::core::ActionResult;
use crate::remote::{self, Connector};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GraphEdge {
    pub parent: String,
    pub child: String,
    pub concurrent: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionGraph {
    pub nodes: BTreeSet<String>,
    pub edges: BTreeSet<GraphEdge>,
}

impl ActionGraph {
    /// Mermaid 流程图；并发边用虚线并标注
    pub fn flowchart(&self) -> String {
        let mut lines = vec!["flowchart TD".to_string()];
        for node in &self.nodes {
            lines.push(format!("    {}[\"{}\"]", node_id(node), node));
        }
        for edge in &self.edges {
            let arrow = if edge.concurrent {
                "-.->|concurrent|"
            } else {
                "-->"
            };
            lines.push(format!(
                "    {} {} {}",
                node_id(&edge.parent),
                arrow,
                node_id(&edge.child)
            ));
        }
        lines.join("\n")
    }
}

fn node_id(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// 遍历 root 的子表闭包
///
/// `allowed` 非空时按别名过滤（未列出的子 Action 取其自身 enabled）；为空或 None 时包含全部子 Action。
/// 远程连接在遍历到所属节点时连接一次并列举工具，`bypass` 为 true 时忽略 require_integration。
pub async fn graph(
    registry: &ActionRegistry,
    connector: Option<&dyn Connector>,
    root: &str,
    allowed: Option<&HashMap<String, bool>>,
    integrations: &HashMap<String, Integration>,
    bypass: bool,
) -> ActionResult<ActionGraph> {
    let root = registry.resolve(root)?;
    let allowed = allowed.filter(|a| !a.is_empty());
    let mut graph = ActionGraph::default();
    graph.nodes.insert(root.id.clone());

    let mut stack: Vec<Arc<ActionSpec>> = vec![root];
    while let Some(spec) = stack.pop() {
        let mut children: IndexMap<String, Arc<ActionSpec>> =
            registry.children_of(&spec)?.into_iter().collect();
        if !spec.connections.is_empty() {
            let clients =
                remote::connect_all(connector, &spec.connections, integrations, bypass).await?;
            remote::patch_children(&clients, &mut children).await?;
        }
        if let Some(allowed) = allowed {
            children.retain(|alias, child| {
                allowed.get(alias).copied().unwrap_or(child.settings.enabled)
            });
        }

        for child in children.into_values() {
            graph.edges.insert(GraphEdge {
                parent: spec.id.clone(),
                child: child.id.clone(),
                concurrent: child.settings.concurrent,
            });
            if graph.nodes.insert(child.id.clone()) {
                stack.push(child);
            }
        }
    }

    tracing::debug!(
        nodes = graph.nodes.len(),
        edges = graph.edges.len(),
        "action graph built"
    );
    Ok(graph)
}
