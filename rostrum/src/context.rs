//! Round context snapshots and transcript compression.
//!
//! After each round the orchestrator captures a compressed view of where
//! the debate stands: participant stances, active sub-issues, and momentum.
//! The round manager and post-debate analytics both consume these. The same
//! module owns the token-ceiling transcript compression used when composing
//! prompts.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::session::phase::Role;
use crate::session::{Round, Turn};

/// Rough token estimate: four characters per token.
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

/// Compressed post-round context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub round_index: u32,
    /// Each participant's current stance, one line per role.
    pub stances: HashMap<Role, String>,
    /// Recurring substantive terms across the round.
    pub active_issues: Vec<String>,
    /// Per-role strength delta against the previous round.
    pub momentum: HashMap<Role, f64>,
}

/// Build the snapshot for a completed round.
pub fn snapshot_round(round: &Round, previous: Option<&Round>) -> ContextSnapshot {
    let mut stances = HashMap::new();
    for turn in &round.turns {
        stances.insert(turn.role, stance_line(&turn.content));
    }

    let previous_strengths: HashMap<Role, f64> = previous
        .map(|r| r.role_strengths().into_iter().collect())
        .unwrap_or_default();
    let momentum = round
        .role_strengths()
        .into_iter()
        .map(|(role, strength)| {
            let delta = strength - previous_strengths.get(&role).copied().unwrap_or(strength);
            (role, delta)
        })
        .collect();

    ContextSnapshot {
        round_index: round.index,
        stances,
        active_issues: recurring_terms(round, 5),
        momentum,
    }
}

/// First sentence of a turn, bounded.
fn stance_line(content: &str) -> String {
    let first = content
        .split_terminator(['.', '!', '?'])
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or(content);
    let mut line: String = first.chars().take(160).collect();
    if first.chars().count() > 160 {
        line.push('…');
    }
    line
}

/// Substantive terms appearing in more than one turn of the round.
fn recurring_terms(round: &Round, limit: usize) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for turn in &round.turns {
        let mut seen = std::collections::HashSet::new();
        for word in turn
            .content
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() >= 5)
        {
            if seen.insert(word.to_string()) {
                *counts.entry(word.to_string()).or_insert(0) += 1;
            }
        }
    }
    let mut terms: Vec<(String, usize)> =
        counts.into_iter().filter(|(_, count)| *count >= 2).collect();
    terms.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    terms.into_iter().take(limit).map(|(term, _)| term).collect()
}

fn format_turn(turn: &Turn) -> String {
    format!("[{}] {} ({}): {}", turn.index, turn.role, turn.phase, turn.content)
}

fn format_turn_compressed(turn: &Turn) -> String {
    let brief: String = turn.content.chars().take(80).collect();
    format!("[{}] {}: {}…", turn.index, turn.role, brief)
}

/// Render the transcript for prompt composition, compressing the middle
/// when the full text would exceed `ceiling_tokens`.
///
/// Opening turns and the most recent turns survive verbatim; elided middle
/// turns are reduced to one bounded line each.
pub fn render_transcript(turns: &[Turn], ceiling_tokens: usize) -> String {
    let full: Vec<String> = turns.iter().map(format_turn).collect();
    let full_text = full.join("\n\n");
    if estimate_tokens(&full_text) <= ceiling_tokens || turns.len() <= 4 {
        return full_text;
    }

    // Keep the first two and last four turns verbatim.
    let head = 2.min(turns.len());
    let tail_start = turns.len().saturating_sub(4).max(head);

    let mut parts: Vec<String> = Vec::new();
    parts.extend(full[..head].iter().cloned());
    if tail_start > head {
        parts.push(format!(
            "(… {} earlier turns, compressed …)",
            tail_start - head
        ));
        parts.extend(turns[head..tail_start].iter().map(format_turn_compressed));
    }
    parts.extend(full[tail_start..].iter().cloned());
    parts.join("\n\n")
}
