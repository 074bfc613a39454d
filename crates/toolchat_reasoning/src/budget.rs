//! Context budget manager for the token-limited chat transcript.
//!
//! Token counts are an estimate, not a tokenizer:
//!
//! - text cost = `ceil(len / 3)` over the serialized bytes
//! - message cost = text cost of its JSON + `per_turn_overhead`
//!   + `per_call_overhead` per tool call it carries
//! - available = `ceiling - max_tokens - tool cost - preamble cost`
//!
//! Trimming only ever removes messages; survivors keep their relative order.

use crate::api_types::ChatMessage;
use std::collections::HashSet;
use toolchat_core::{BudgetConfig, ChatError};

// ============================================================================
// Trim report
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TrimStage {
    /// Transcript already fit.
    None,
    /// Tool-bearing messages plus the recent window.
    KeepToolsAndRecent,
    /// Narrowed to the last few tool-bearing messages plus a shorter window.
    Narrow,
    /// Oldest unprotected groups dropped one at a time.
    DropOldest,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrimReport {
    pub stage: TrimStage,
    pub before: u32,
    pub after: u32,
    pub removed: usize,
    /// The protected tail alone is over budget; the request may still overflow.
    pub tail_over_budget: bool,
}

// ============================================================================
// ContextBudget
// ============================================================================

#[derive(Debug, Clone)]
pub struct ContextBudget {
    ceiling: u32,
    reserved_output: u32,
    config: BudgetConfig,
}

impl ContextBudget {
    pub fn new(ceiling: u32, reserved_output: u32, config: BudgetConfig) -> Self {
        Self {
            ceiling,
            reserved_output,
            config,
        }
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    pub fn estimate_text(text: &str) -> u32 {
        let len = text.len() as u64;
        len.div_ceil(3).min(u32::MAX as u64) as u32
    }

    pub fn estimate_turn(&self, message: &ChatMessage) -> u32 {
        let serialized = serde_json::to_string(message).unwrap_or_default();
        let calls = message.tool_calls().len() as u32;
        Self::estimate_text(&serialized)
            .saturating_add(self.config.per_turn_overhead)
            .saturating_add(self.config.per_call_overhead.saturating_mul(calls))
    }

    pub fn estimate_transcript(&self, transcript: &[ChatMessage]) -> u32 {
        transcript
            .iter()
            .fold(0u32, |acc, m| acc.saturating_add(self.estimate_turn(m)))
    }

    /// Tokens left for the transcript once output, tools and the preamble are reserved.
    pub fn available(&self, tool_cost: u32, preamble_cost: u32) -> Result<u32, ChatError> {
        let required = self
            .reserved_output
            .saturating_add(tool_cost)
            .saturating_add(preamble_cost);
        if required >= self.ceiling {
            return Err(ChatError::CeilingTooSmall {
                ceiling: self.ceiling,
                required,
            });
        }
        Ok(self.ceiling - required)
    }

    /// Trim `transcript` in place until its estimate fits `available`.
    pub fn fit(&self, transcript: &mut Vec<ChatMessage>, available: u32) -> TrimReport {
        let costs: Vec<u32> = transcript.iter().map(|m| self.estimate_turn(m)).collect();
        let before = sum_kept(&costs, None);
        if before <= available {
            return TrimReport {
                stage: TrimStage::None,
                before,
                after: before,
                removed: 0,
                tail_over_budget: false,
            };
        }

        let n = transcript.len();
        let tail = protected_start(transcript);
        let tool_bearing: Vec<bool> = transcript.iter().map(|m| m.is_tool_bearing()).collect();

        // Stage 1: every tool-bearing message plus the recent window.
        let recent_from = n.saturating_sub(self.config.keep_recent);
        let mut keep: Vec<bool> = (0..n)
            .map(|i| i >= tail || i >= recent_from || tool_bearing[i])
            .collect();
        repair_orphans(transcript, &mut keep, tail);
        let mut stage = TrimStage::KeepToolsAndRecent;
        let mut estimate = sum_kept(&costs, Some(&keep));

        // Stage 2: narrow when stage 1 still sits above the threshold.
        let threshold = (available as f64 * self.config.narrow_threshold as f64) as u32;
        if estimate > threshold {
            let narrow_from = n.saturating_sub(self.config.narrow_recent);
            let recent_tools: HashSet<usize> = (0..n)
                .rev()
                .filter(|&i| keep[i] && tool_bearing[i])
                .take(self.config.narrow_tool_turns)
                .collect();
            for i in 0..n {
                keep[i] = keep[i] && (i >= tail || i >= narrow_from || recent_tools.contains(&i));
            }
            repair_orphans(transcript, &mut keep, tail);
            stage = TrimStage::Narrow;
            estimate = sum_kept(&costs, Some(&keep));
        }

        // Stage 3: drop the oldest unprotected group until it fits.
        while estimate > available {
            let Some(oldest) = (0..tail.min(n)).find(|&i| keep[i]) else {
                break;
            };
            keep[oldest] = false;
            let dropped_calls: HashSet<&str> = transcript[oldest]
                .tool_calls()
                .iter()
                .map(|c| c.id.as_str())
                .collect();
            if !dropped_calls.is_empty() {
                for i in oldest + 1..tail.min(n) {
                    if let ChatMessage::Tool { tool_call_id, .. } = &transcript[i] {
                        if dropped_calls.contains(tool_call_id.as_str()) {
                            keep[i] = false;
                        }
                    }
                }
            }
            repair_orphans(transcript, &mut keep, tail);
            stage = TrimStage::DropOldest;
            estimate = sum_kept(&costs, Some(&keep));
        }

        let tail_over_budget = estimate > available;
        if tail_over_budget {
            tracing::warn!(
                "Most recent exchange alone needs ~{} tokens, over the {} available",
                estimate,
                available
            );
        }

        let removed = keep.iter().filter(|k| !**k).count();
        let mut idx = 0;
        transcript.retain(|_| {
            let k = keep[idx];
            idx += 1;
            k
        });

        tracing::warn!(
            "Trimmed transcript ({:?}): {} -> {} tokens, {} messages dropped",
            stage,
            before,
            estimate,
            removed
        );

        TrimReport {
            stage,
            before,
            after: estimate,
            removed,
            tail_over_budget,
        }
    }
}

fn sum_kept(costs: &[u32], keep: Option<&[bool]>) -> u32 {
    costs
        .iter()
        .enumerate()
        .filter(|(i, _)| keep.map_or(true, |k| k[*i]))
        .fold(0u32, |acc, (_, c)| acc.saturating_add(*c))
}

/// Index where the protected tail begins: the last user message, or the one
/// before it when the transcript ends on a pending user message.
fn protected_start(transcript: &[ChatMessage]) -> usize {
    let users: Vec<usize> = transcript
        .iter()
        .enumerate()
        .filter(|(_, m)| m.is_user())
        .map(|(i, _)| i)
        .collect();
    match users.as_slice() {
        [] => transcript.len(),
        [.., prev, last] if *last + 1 == transcript.len() => *prev,
        [.., last] => *last,
    }
}

/// Drop tool results whose call did not survive, and tool-call messages that
/// lost any of their results. Messages at or after `tail` are never touched.
fn repair_orphans(transcript: &[ChatMessage], keep: &mut [bool], tail: usize) {
    loop {
        let mut changed = false;

        let live_calls: HashSet<&str> = transcript
            .iter()
            .enumerate()
            .filter(|(i, _)| keep[*i])
            .flat_map(|(_, m)| m.tool_calls().iter().map(|c| c.id.as_str()))
            .collect();
        let live_results: HashSet<&str> = transcript
            .iter()
            .enumerate()
            .filter(|(i, _)| keep[*i])
            .filter_map(|(_, m)| match m {
                ChatMessage::Tool { tool_call_id, .. } => Some(tool_call_id.as_str()),
                _ => None,
            })
            .collect();

        for (i, message) in transcript.iter().enumerate().take(tail) {
            if !keep[i] {
                continue;
            }
            match message {
                ChatMessage::Tool { tool_call_id, .. } => {
                    if !live_calls.contains(tool_call_id.as_str()) {
                        keep[i] = false;
                        changed = true;
                    }
                }
                ChatMessage::Assistant { tool_calls, .. } if !tool_calls.is_empty() => {
                    if tool_calls.iter().any(|c| !live_results.contains(c.id.as_str())) {
                        keep[i] = false;
                        changed = true;
                    }
                }
                _ => {}
            }
        }

        if !changed {
            break;
        }
    }
}
