//! Static tool catalog
//!
//! The catalog is the table of tools the model may request: name,
//! description, argument schema, and classification hints. It is consulted
//! once at session creation to derive the per-tool rule table and never
//! mutated afterwards.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;

/// One tool's declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON-schema-like argument description, assumed validated upstream
    pub parameters: serde_json::Value,
    /// Whether execution goes through the sandbox collaborator
    #[serde(default)]
    pub sandboxed: bool,
}

impl ToolSpec {
    fn new(name: &str, description: &str, parameters: serde_json::Value, sandboxed: bool) -> Self {
        ToolSpec {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
            sandboxed,
        }
    }
}

/// The static tool table for a session
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    specs: HashMap<String, ToolSpec>,
}

impl ToolCatalog {
    pub fn new(specs: Vec<ToolSpec>) -> Self {
        ToolCatalog {
            specs: specs.into_iter().map(|s| (s.name.clone(), s)).collect(),
        }
    }

    /// The builtin tool set exposed to the model
    pub fn builtin() -> Self {
        let obj = |props: serde_json::Value| json!({ "type": "object", "properties": props });
        Self::new(vec![
            ToolSpec::new(
                "run_bash",
                "Run a shell command in the sandbox",
                obj(json!({ "cmd": { "type": "string" }, "timeout_sec": { "type": "integer" } })),
                true,
            ),
            ToolSpec::new(
                "run_python",
                "Run a Python snippet in the sandbox",
                obj(json!({ "code": { "type": "string" }, "timeout_sec": { "type": "integer" } })),
                true,
            ),
            ToolSpec::new(
                "read_file",
                "Read a file from the sandbox filesystem",
                obj(json!({ "path": { "type": "string" } })),
                true,
            ),
            ToolSpec::new(
                "write_file",
                "Write a file in the sandbox filesystem",
                obj(json!({ "path": { "type": "string" }, "content": { "type": "string" } })),
                true,
            ),
            ToolSpec::new(
                "list_files",
                "List a directory in the sandbox filesystem",
                obj(json!({ "path": { "type": "string" } })),
                true,
            ),
            ToolSpec::new(
                "move_file",
                "Move or rename a path in the sandbox filesystem",
                obj(json!({ "from": { "type": "string" }, "to": { "type": "string" } })),
                true,
            ),
            ToolSpec::new(
                "delete_path",
                "Delete a file or directory in the sandbox filesystem",
                obj(json!({ "path": { "type": "string" } })),
                true,
            ),
            ToolSpec::new(
                "edit_file",
                "Propose a full rewrite of a file; requires user approval before it is applied",
                obj(json!({ "path": { "type": "string" }, "new_content": { "type": "string" }, "description": { "type": "string" } })),
                true,
            ),
            ToolSpec::new(
                "fetch_url",
                "Fetch a URL and return its body",
                obj(json!({ "url": { "type": "string" }, "timeout_sec": { "type": "integer" }, "max_bytes": { "type": "integer" } })),
                false,
            ),
            ToolSpec::new(
                "search_web",
                "Search the web and return result snippets",
                obj(json!({ "query": { "type": "string" }, "max_results": { "type": "integer" } })),
                false,
            ),
            ToolSpec::new(
                "commit_memory",
                "Commit a fact to session memory",
                obj(json!({ "text": { "type": "string" } })),
                false,
            ),
            ToolSpec::new(
                "recall_memory",
                "Query session memory by keyword overlap",
                obj(json!({ "query": { "type": "string" }, "max_results": { "type": "integer" } })),
                false,
            ),
            ToolSpec::new(
                "delegate_task",
                "Hand a focused sub-task to a restricted sub-agent and return its answer",
                obj(json!({ "task": { "type": "string" } })),
                false,
            ),
        ])
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.specs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.specs.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(|s| s.as_str())
    }

    pub fn specs(&self) -> impl Iterator<Item = &ToolSpec> {
        self.specs.values()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog() {
        let catalog = ToolCatalog::builtin();
        assert!(catalog.contains("run_bash"));
        assert!(catalog.contains("fetch_url"));
        assert!(catalog.contains("delegate_task"));
        assert!(!catalog.contains("launch_missiles"));

        let spec = catalog.get("run_bash").unwrap();
        assert!(spec.sandboxed);
        assert!(spec.parameters["properties"]["cmd"].is_object());
    }
}
