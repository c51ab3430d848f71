use anyhow::{anyhow, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// A tool that can be used by a model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tool {
    /// The name of the tool
    pub name: String,
    /// A description of what the tool does
    pub description: String,
    /// JSON schema of the input the tool accepts
    pub input_schema: Value,
}

impl Tool {
    /// Create a new tool with the given name and description
    pub fn new<N, D>(name: N, description: D, input_schema: Value) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        Tool {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// The set of tools exposed to a backend when tool use is enabled
///
/// Names are unique and restricted to `[a-zA-Z0-9_-]`, the common subset every
/// backend accepts for function names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCatalogue {
    tools: Vec<Tool>,
}

impl ToolCatalogue {
    pub fn new(tools: Vec<Tool>) -> Result<Self> {
        let re = Regex::new(r"^[a-zA-Z0-9_-]+$")?;
        let mut tool_names = HashSet::new();

        for tool in &tools {
            if !re.is_match(&tool.name) {
                return Err(anyhow!(
                    "Invalid tool name '{}', it must match this regex [a-zA-Z0-9_-]+",
                    tool.name
                ));
            }
            if !tool_names.insert(tool.name.as_str()) {
                return Err(anyhow!("Duplicate tool name: {}", tool.name));
            }
        }

        Ok(Self { tools })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
