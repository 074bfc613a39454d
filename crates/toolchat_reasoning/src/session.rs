use crate::adapters::ProviderAdapter;
use anyhow::{Context, Result};
use toolchat_core::{ChatError, ProviderKind, ToolCatalog, ToolDescriptor, Turn};

/// Holds at most one active adapter and forwards the chat operations to it.
#[derive(Default)]
pub struct ChatSession {
    adapter: Option<Box<dyn ProviderAdapter>>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_adapter(adapter: Box<dyn ProviderAdapter>) -> Self {
        Self {
            adapter: Some(adapter),
        }
    }

    /// Send one user message and return the final assistant text.
    pub async fn send(&mut self, text: &str) -> Result<String, ChatError> {
        let adapter = self.adapter.as_mut().ok_or(ChatError::NotConfigured)?;
        adapter.send_message(text).await
    }

    /// Clear the active adapter's transcript. No-op when disconnected.
    pub fn reset(&mut self) {
        if let Some(adapter) = self.adapter.as_mut() {
            adapter.clear_history();
            tracing::info!("Conversation history cleared");
        }
    }

    /// Replace the active adapter. The old transcript is dropped, not migrated.
    pub fn swap_provider(&mut self, adapter: Box<dyn ProviderAdapter>) {
        if let Some(old) = self.adapter.take() {
            tracing::info!(
                "Switching provider {} ({}) -> {} ({})",
                old.provider(),
                old.model(),
                adapter.provider(),
                adapter.model()
            );
        }
        self.adapter = Some(adapter);
    }

    pub fn update_tools(&mut self, tools: Vec<ToolDescriptor>) {
        if let Some(adapter) = self.adapter.as_mut() {
            adapter.update_tools(tools);
        }
    }

    /// Re-list tools from `catalog` and hand the new snapshot to the adapter.
    pub async fn refresh_tools(&mut self, catalog: &dyn ToolCatalog) -> Result<usize> {
        let tools = catalog
            .list_tools()
            .await
            .context("Failed to list tools from the tool provider")?;
        let count = tools.len();
        self.update_tools(tools);
        tracing::info!("Refreshed tool list: {} tools", count);
        Ok(count)
    }

    /// Provider-neutral transcript; empty when disconnected.
    pub fn history(&self) -> Vec<Turn> {
        self.adapter
            .as_ref()
            .map(|a| a.history())
            .unwrap_or_default()
    }

    pub fn provider(&self) -> Option<ProviderKind> {
        self.adapter.as_ref().map(|a| a.provider())
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.adapter
            .as_ref()
            .map(|a| a.tools().names().into_iter().map(String::from).collect())
            .unwrap_or_default()
    }

    pub fn is_configured(&self) -> bool {
        self.adapter.is_some()
    }

    /// Drop the active adapter and its transcript.
    pub fn disconnect(&mut self) {
        if self.adapter.take().is_some() {
            tracing::info!("Provider disconnected");
        }
    }
}
