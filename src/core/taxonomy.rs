//! Tool taxonomy: every tool belongs to exactly one category.

use crate::config::ToolsConfig;
use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Tool category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    /// Read-only and meta tools, exempt from admission gates.
    AlwaysAvailable,
    /// Tools that change the workspace.
    Mutating,
    /// Tools that start a sub-agent or skill.
    Spawn,
}

impl ToolCategory {
    pub const ALL: [Self; 3] = [Self::AlwaysAvailable, Self::Mutating, Self::Spawn];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AlwaysAvailable => "always_available",
            Self::Mutating => "mutating",
            Self::Spawn => "spawn",
        }
    }
}

impl fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated tool partition.
#[derive(Debug, Clone)]
pub struct ToolTaxonomy {
    categories: HashMap<String, ToolCategory>,
    shell: BTreeSet<String>,
    task_binding: BTreeSet<String>,
}

impl ToolTaxonomy {
    /// Build and validate the taxonomy.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if a tool appears in two categories,
    /// a tool name is empty, the mutating or spawn table is empty, or a shell
    /// or task-binding tool is not listed as mutating.
    pub fn from_config(tools: &ToolsConfig) -> Result<Self> {
        if tools.mutating.is_empty() {
            return Err(Error::Configuration(
                "tools.mutating must list at least one tool".to_string(),
            ));
        }
        if tools.spawn.is_empty() {
            return Err(Error::Configuration(
                "tools.spawn must list at least one tool".to_string(),
            ));
        }

        let mut categories = HashMap::new();
        let tables = [
            (ToolCategory::AlwaysAvailable, &tools.always_available),
            (ToolCategory::Mutating, &tools.mutating),
            (ToolCategory::Spawn, &tools.spawn),
        ];
        for (category, names) in tables {
            for name in names {
                let name = name.trim();
                if name.is_empty() {
                    return Err(Error::Configuration(format!(
                        "tools.{category} contains an empty tool name"
                    )));
                }
                if let Some(existing) = categories.insert(name.to_string(), category) {
                    if existing != category {
                        return Err(Error::Configuration(format!(
                            "tool {name:?} is listed as both {existing} and {category}"
                        )));
                    }
                }
            }
        }

        for (table, names) in [("shell", &tools.shell), ("task_binding", &tools.task_binding)] {
            for name in names {
                match categories.get(name.trim()) {
                    Some(ToolCategory::Mutating) => {}
                    Some(other) => {
                        return Err(Error::Configuration(format!(
                            "tools.{table} entry {name:?} is classified {other}, expected mutating"
                        )));
                    }
                    None => {
                        return Err(Error::Configuration(format!(
                            "tools.{table} entry {name:?} is missing from tools.mutating"
                        )));
                    }
                }
            }
        }

        Ok(Self {
            categories,
            shell: tools.shell.iter().map(|s| s.trim().to_string()).collect(),
            task_binding: tools
                .task_binding
                .iter()
                .map(|s| s.trim().to_string())
                .collect(),
        })
    }

    /// Category of a tool. Unknown tools are treated as mutating.
    #[must_use]
    pub fn classify(&self, tool_name: &str) -> ToolCategory {
        self.categories
            .get(tool_name)
            .copied()
            .unwrap_or(ToolCategory::Mutating)
    }

    /// Whether the tool appears in configuration.
    #[must_use]
    pub fn is_known(&self, tool_name: &str) -> bool {
        self.categories.contains_key(tool_name)
    }

    #[must_use]
    pub fn is_shell(&self, tool_name: &str) -> bool {
        self.shell.contains(tool_name)
    }

    #[must_use]
    pub fn is_task_binding(&self, tool_name: &str) -> bool {
        self.task_binding.contains(tool_name)
    }

    /// Tools in a category, sorted.
    #[must_use]
    pub fn tools_in(&self, category: ToolCategory) -> Vec<&str> {
        let mut tools: Vec<&str> = self
            .categories
            .iter()
            .filter(|(_, c)| **c == category)
            .map(|(name, _)| name.as_str())
            .collect();
        tools.sort_unstable();
        tools
    }
}
