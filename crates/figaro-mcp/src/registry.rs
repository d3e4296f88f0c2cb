//! Tool registry: the union of every server's catalogue.

use crate::client::{McpClient, ToolDescriptor};
use figaro_types::ToolDefinition;
use std::sync::Arc;

/// Resolves tool names to their owning client. Built once at startup;
/// read-only afterwards, so lookups never need a lock.
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
    owners: Vec<Arc<McpClient>>,
}

impl ToolRegistry {
    /// Aggregate the catalogues of every client in registration order.
    /// A name already taken by an earlier server wins; the shadowed tool is
    /// dropped with a warning.
    pub fn build(clients: &[Arc<McpClient>]) -> Self {
        let entries = clients.iter().flat_map(|client| {
            client
                .tools()
                .iter()
                .map(move |tool| (Arc::clone(client), tool.clone()))
        });
        let (kept, shadowed) = first_registered_wins(entries, |(_, tool)| tool.name.as_str());
        for ((client, _), name) in shadowed {
            tracing::warn!(
                "tool '{name}' from server '{}' shadowed by an earlier registration",
                client.server_name()
            );
        }

        let mut tools = Vec::with_capacity(kept.len());
        let mut owners = Vec::with_capacity(kept.len());
        for (client, tool) in kept {
            owners.push(client);
            tools.push(tool);
        }
        Self { tools, owners }
    }

    /// Every registered tool, for building the LLM request.
    pub fn all_tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// The catalogue mapped to the LLM request shape.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(ToolDefinition::from).collect()
    }

    /// The client owning a tool. Linear search: a handful of servers with a
    /// few hundred tools at most.
    pub fn client_for(&self, tool_name: &str) -> Option<&Arc<McpClient>> {
        self.tools
            .iter()
            .position(|tool| tool.name == tool_name)
            .map(|index| &self.owners[index])
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Keep the first entry for each key, collecting the shadowed remainder.
fn first_registered_wins<T, F>(entries: impl Iterator<Item = T>, key: F) -> (Vec<T>, Vec<(T, String)>)
where
    F: Fn(&T) -> &str,
{
    let mut kept: Vec<T> = Vec::new();
    let mut shadowed = Vec::new();
    for entry in entries {
        let name = key(&entry).to_string();
        if kept.iter().any(|existing| key(existing) == name) {
            shadowed.push((entry, name));
        } else {
            kept.push(entry);
        }
    }
    (kept, shadowed)
}
