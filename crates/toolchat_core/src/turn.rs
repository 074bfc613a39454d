//! Provider-neutral view of a conversation transcript.
//!
//! Each adapter keeps its transcript in its own wire shape; `Turn` is the common
//! read-only projection handed out by `history()`.

use crate::tools::{ToolInvocation, ToolOutcome};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Turn {
    User {
        text: String,
    },
    Assistant {
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolInvocation>,
    },
    ToolResult {
        call_id: String,
        tool_name: String,
        outcome: ToolOutcome,
    },
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Turn::User { text: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Turn::Assistant {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Turn::User { .. })
    }

    pub fn tool_calls(&self) -> &[ToolInvocation] {
        match self {
            Turn::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }
}

/// Ids of tool calls that have no matching `ToolResult` turn.
///
/// A well-formed transcript resolves every call exactly once before the next send.
pub fn find_orphaned_calls(history: &[Turn]) -> Vec<String> {
    let resolved: HashSet<&str> = history
        .iter()
        .filter_map(|t| match t {
            Turn::ToolResult { call_id, .. } => Some(call_id.as_str()),
            _ => None,
        })
        .collect();

    history
        .iter()
        .flat_map(|t| t.tool_calls())
        .filter(|call| !resolved.contains(call.id.as_str()))
        .map(|call| call.id.clone())
        .collect()
}
