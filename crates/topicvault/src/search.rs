//! Line search over topic documents.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    /// Path relative to the topic root, e.g. `arguments/cost.md`.
    pub file: String,
    /// One snippet per matching line: the line plus one line of context either side.
    pub matches: Vec<String>,
}

/// Case-insensitive substring match. An empty query matches every line.
pub fn find_matches(content: &str, query: &str) -> Vec<String> {
    let needle = query.to_lowercase();
    let lines: Vec<&str> = content.lines().collect();
    lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.to_lowercase().contains(&needle))
        .map(|(i, _)| {
            let start = i.saturating_sub(1);
            let end = (i + 2).min(lines.len());
            lines[start..end].join("\n")
        })
        .collect()
}
