//! Indexes the tool catalog by name for the MCP surfaces. Generalizes the
//! teacher's public/internal name-mapping registry down to a 1:1 index —
//! this domain's tool names are already what callers should see, so there is
//! no alias or rename layer to maintain.

use crate::mcp::tooling::tool_catalog;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Clone, Debug)]
pub struct PublicToolSpec {
    pub public_name: String,
    pub public_title: String,
    pub public_description: String,
    pub public_input_schema: Value,
    pub icons: Vec<String>,
}

#[derive(Clone, Debug, Default)]
pub struct ToolRegistry {
    specs: HashMap<String, PublicToolSpec>,
}

impl ToolRegistry {
    pub fn load() -> Self {
        let mut specs = HashMap::new();
        for entry in tool_catalog() {
            specs.insert(
                entry.name.to_string(),
                PublicToolSpec {
                    public_name: entry.name.to_string(),
                    public_title: entry.title.to_string(),
                    public_description: entry.description.to_string(),
                    public_input_schema: entry.input_schema,
                    icons: entry.icons.into_iter().map(|s| s.to_string()).collect(),
                },
            );
        }
        Self { specs }
    }

    pub fn public_specs(&self) -> Vec<PublicToolSpec> {
        let mut tools: Vec<_> = self.specs.values().cloned().collect();
        tools.sort_by(|a, b| a.public_name.cmp(&b.public_name));
        tools
    }

    pub fn resolve_incoming_tool_name(&self, incoming: &str) -> Option<String> {
        self.specs.contains_key(incoming).then(|| incoming.to_string())
    }

    /// No-op: public and internal argument shapes are identical in this
    /// registry. Kept so call sites don't need to special-case the absence
    /// of an alias layer.
    pub fn map_public_arguments_to_internal(&self, _internal_tool_name: &str, public_arguments: Value) -> Value {
        public_arguments
    }

    pub fn public_tool_name_for_internal(&self, internal_tool_name: &str) -> Option<&str> {
        self.specs.get(internal_tool_name).map(|s| s.public_name.as_str())
    }

    pub fn public_description_for_internal(&self, internal_tool_name: &str) -> Option<&str> {
        self.specs.get(internal_tool_name).map(|s| s.public_description.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_tool_resolves_to_itself() {
        let registry = ToolRegistry::load();
        for spec in registry.public_specs() {
            assert_eq!(
                registry.resolve_incoming_tool_name(&spec.public_name),
                Some(spec.public_name.clone())
            );
        }
    }
}
