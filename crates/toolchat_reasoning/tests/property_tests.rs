//! Property-based tests for the context budget manager and the free-text
//! tool-request scanner.

use proptest::prelude::*;
use std::collections::HashSet;
use toolchat_core::BudgetConfig;
use toolchat_reasoning::api_types::{ChatMessage, FunctionCall, ToolCall};
use toolchat_reasoning::text_tool_parser::{find_first_json_object, parse_tool_request};
use toolchat_reasoning::ContextBudget;

// ============================================================================
// Transcript generation
// ============================================================================

/// One exchange: a question, optionally a batch of tool calls with results,
/// then an answer.
#[derive(Debug, Clone)]
struct Exchange {
    question: String,
    tool_results: Vec<String>,
    answer: String,
}

fn exchange() -> impl Strategy<Value = Exchange> {
    (
        "[a-z ]{1,120}",
        prop::collection::vec("[a-z0-9 ]{0,300}", 0..3),
        "[a-z ]{1,200}",
    )
        .prop_map(|(question, tool_results, answer)| Exchange {
            question,
            tool_results,
            answer,
        })
}

/// Completed exchanges followed by a pending question, as the adapter sees it before a send.
fn build_transcript(exchanges: &[Exchange], pending: &str) -> Vec<ChatMessage> {
    let mut t = Vec::new();
    for (n, ex) in exchanges.iter().enumerate() {
        t.push(ChatMessage::user(ex.question.clone()));
        if !ex.tool_results.is_empty() {
            let ids: Vec<String> = (0..ex.tool_results.len())
                .map(|i| format!("call_{n}_{i}"))
                .collect();
            t.push(ChatMessage::Assistant {
                content: None,
                tool_calls: ids
                    .iter()
                    .map(|id| ToolCall {
                        id: id.clone(),
                        kind: "function".into(),
                        function: FunctionCall {
                            name: "lookup".into(),
                            arguments: "{}".into(),
                        },
                    })
                    .collect(),
            });
            for (id, body) in ids.iter().zip(&ex.tool_results) {
                t.push(ChatMessage::Tool {
                    tool_call_id: id.clone(),
                    content: body.clone(),
                });
            }
        }
        t.push(ChatMessage::assistant(ex.answer.clone()));
    }
    t.push(ChatMessage::user(pending.to_string()));
    t
}

/// Start of the last completed exchange (or the pending question if there is none).
fn protected_start(t: &[ChatMessage]) -> usize {
    let users: Vec<usize> = (0..t.len()).filter(|&i| t[i].is_user()).collect();
    if users.len() >= 2 {
        users[users.len() - 2]
    } else {
        users[0]
    }
}

fn is_subsequence(small: &[ChatMessage], big: &[ChatMessage]) -> bool {
    let mut it = big.iter();
    small.iter().all(|s| it.any(|b| b == s))
}

fn budget_config() -> impl Strategy<Value = BudgetConfig> {
    (1usize..8, 0.3f32..1.0, 1usize..4, 0usize..4).prop_map(
        |(keep_recent, narrow_threshold, narrow_recent, narrow_tool_turns)| BudgetConfig {
            keep_recent,
            narrow_threshold,
            narrow_recent,
            narrow_tool_turns,
            ..BudgetConfig::default()
        },
    )
}

// ============================================================================
// Budget Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// **Fits the budget** whenever the last complete exchange plus the pending
    /// question fit on their own.
    #[test]
    fn trimmed_transcript_fits_budget(
        exchanges in prop::collection::vec(exchange(), 0..12),
        pending in "[a-z ]{1,80}",
        slack in 0u32..2000,
        config in budget_config(),
    ) {
        let mut t = build_transcript(&exchanges, &pending);
        let budget = ContextBudget::new(100_000, 0, config);
        let tail = protected_start(&t);
        let tail_cost = budget.estimate_transcript(&t[tail..]);
        let available = tail_cost + slack;

        let report = budget.fit(&mut t, available);
        prop_assert!(!report.tail_over_budget);
        prop_assert!(budget.estimate_transcript(&t) <= available,
            "estimate {} > available {}", budget.estimate_transcript(&t), available);
        prop_assert_eq!(report.after, budget.estimate_transcript(&t));
    }

    /// **Most recent exchange survives** and survivors keep their order.
    #[test]
    fn tail_survives_and_order_preserved(
        exchanges in prop::collection::vec(exchange(), 1..10),
        pending in "[a-z ]{1,80}",
        available in 1u32..3000,
        config in budget_config(),
    ) {
        let original = build_transcript(&exchanges, &pending);
        let tail = original[protected_start(&original)..].to_vec();
        let mut t = original.clone();
        ContextBudget::new(100_000, 0, config).fit(&mut t, available);

        prop_assert!(t.ends_with(&tail), "protected tail lost");
        prop_assert!(is_subsequence(&t, &original), "order changed");
    }

    /// **No orphans**: every surviving tool result has its call, and every
    /// surviving call has all of its results.
    #[test]
    fn trimming_never_orphans_tool_messages(
        exchanges in prop::collection::vec(exchange(), 1..10),
        available in 1u32..3000,
        config in budget_config(),
    ) {
        let mut t = build_transcript(&exchanges, "next?");
        ContextBudget::new(100_000, 0, config).fit(&mut t, available);

        let calls: HashSet<String> = t.iter()
            .flat_map(|m| m.tool_calls().iter().map(|c| c.id.clone()))
            .collect();
        let results: HashSet<String> = t.iter()
            .filter_map(|m| match m {
                ChatMessage::Tool { tool_call_id, .. } => Some(tool_call_id.clone()),
                _ => None,
            })
            .collect();
        prop_assert_eq!(calls, results);
    }

    /// **Untouched when it fits**: nothing is removed from a transcript under budget.
    #[test]
    fn fitting_transcript_untouched(
        exchanges in prop::collection::vec(exchange(), 0..6),
    ) {
        let mut t = build_transcript(&exchanges, "q");
        let budget = ContextBudget::new(100_000, 0, BudgetConfig::default());
        let before = t.clone();
        let available = budget.estimate_transcript(&t);
        budget.fit(&mut t, available);
        prop_assert_eq!(t, before);
    }
}

// ============================================================================
// Scanner Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(2000))]

    /// **Never panics** on arbitrary Unicode input.
    #[test]
    fn scanner_never_panics(s in "\\PC{0,500}") {
        let _ = parse_tool_request(&s);
        if let Some(obj) = find_first_json_object(&s) {
            prop_assert!(obj.starts_with('{') && obj.ends_with('}'), "object not brace-delimited: {}", obj);
        }
    }

    /// **No false positives on prose**: text without braces is never a tool call.
    #[test]
    fn brace_free_prose_is_plain_text(s in "[^{}]{0,300}") {
        prop_assert!(parse_tool_request(&s).is_none());
    }

    /// **Embedded requests are found** regardless of surrounding brace-free prose.
    #[test]
    fn embedded_request_detected(
        before in "[^{}]{0,100}",
        after in "[^{}]{0,100}",
        name in "[a-z_]{1,20}",
        message in "\\PC{0,40}",
    ) {
        let call = serde_json::json!({"tool_name": name, "parameters": {"message": message}});
        let text = format!("{before}{call}{after}");
        let parsed = parse_tool_request(&text);
        prop_assert!(parsed.is_some(), "missed call in {:?}", text);
        let parsed = parsed.unwrap();
        prop_assert_eq!(parsed.name, name);
        prop_assert_eq!(parsed.arguments["message"].as_str(), Some(message.as_str()));
    }
}
