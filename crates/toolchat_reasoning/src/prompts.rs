use chrono::NaiveDate;
use toolchat_core::ToolDescriptor;

/// Builds the fixed text the adapters put in front of, or after, the conversation.
pub struct PromptAssembler;

impl PromptAssembler {
    /// System instruction for the inline function-call provider.
    ///
    /// The provider's own sense of "today" is stale; the date here is authoritative.
    pub fn dated_system_prompt(today: NaiveDate) -> String {
        format!(
            "Today's date is {}. Treat this date as ground truth, even if it differs from \
             what your training data suggests. When a tool returns information, prefer that \
             fresh tool output over any assumption or prior knowledge.",
            today.format("%Y-%m-%d")
        )
    }

    /// Tool catalogue and calling convention for models without native tool support.
    pub fn free_text_preamble(tools: &[ToolDescriptor]) -> String {
        if tools.is_empty() {
            return "You are a helpful assistant.".to_string();
        }

        let listing = tools
            .iter()
            .map(|tool| {
                let params = tool
                    .parameters
                    .property_types()
                    .into_iter()
                    .map(|(name, ty)| {
                        if tool.parameters.required.contains(&name) {
                            format!("{name}: {ty} (required)")
                        } else {
                            format!("{name}: {ty}")
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("- {}: {}\n  Parameters: {}", tool.name, tool.description, params)
            })
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "You are a helpful assistant with access to the following tools:\n{listing}\n\n\
             To call a tool, respond with ONLY a JSON object of the form \
             {{\"tool_name\": \"<name>\", \"parameters\": {{...}}}}. \
             Otherwise, respond normally."
        )
    }

    /// Second-pass prompt after the single free-text tool call.
    pub fn tool_followup(tool_name: &str, rendered_result: &str) -> String {
        format!(
            "Tool '{}' returned: {}. Provide a helpful response based on this.",
            tool_name, rendered_result
        )
    }
}
