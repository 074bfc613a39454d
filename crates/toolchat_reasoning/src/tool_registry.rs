use std::sync::Arc;
use toolchat_core::ToolDescriptor;

// ============================================================================
// ToolRegistry
// ============================================================================

/// Immutable snapshot of the tools a provider currently exposes.
///
/// Cloning shares the underlying list; `update_tools` swaps in a new snapshot
/// rather than patching this one.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Arc<Vec<ToolDescriptor>>,
}

impl ToolRegistry {
    /// Build a registry. A repeated name keeps its first position but the last definition.
    pub fn new(descriptors: Vec<ToolDescriptor>) -> Self {
        let mut tools: Vec<ToolDescriptor> = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            match tools.iter_mut().find(|t| t.name == descriptor.name) {
                Some(existing) => {
                    tracing::debug!("Duplicate tool '{}' replaced", descriptor.name);
                    *existing = descriptor;
                }
                None => tools.push(descriptor),
            }
        }
        Self {
            tools: Arc::new(tools),
        }
    }

    pub fn descriptors(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl From<Vec<ToolDescriptor>> for ToolRegistry {
    fn from(descriptors: Vec<ToolDescriptor>) -> Self {
        Self::new(descriptors)
    }
}
