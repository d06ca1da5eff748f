// SPDX-FileCopyrightText: 2026 Proofbench Project Team
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Tactic usage of candidate proofs

use crate::core::TacticStats;
use crate::extract::sentence;

/// Head tactics of every tactic sentence, in order.
///
/// Sentences starting with an uppercase keyword (`Proof`, `Qed`, ...) are
/// vernacular, not tactics. Bullets and braces are skipped. A candidate that
/// does not lex yields empty statistics.
pub fn collect(candidate: &str) -> TacticStats {
    let mut stats = TacticStats::default();
    let Ok((masked, sentences)) = sentence::sentences(candidate) else {
        return stats;
    };
    for s in sentences {
        let text = s.text(&masked).trim().trim_end_matches('.');
        let text = strip_selector(text);
        if text.starts_with(|c: char| c.is_ascii_uppercase()) {
            continue;
        }
        for part in split_top_level(text) {
            if let Some(head) = head_tactic(part) {
                stats.record(normalize(head));
            }
        }
    }
    stats
}

/// Drop a goal selector such as `all:`, `2:` or `1-3:`
fn strip_selector(text: &str) -> &str {
    let Some((selector, rest)) = text.split_once(':') else {
        return text;
    };
    let selector = selector.trim();
    let is_selector = selector == "all"
        || selector == "par"
        || (!selector.is_empty()
            && selector
                .chars()
                .all(|c| c.is_ascii_digit() || c == '-' || c == ',' || c == ' '));
    // `:=` belongs to the tactic, e.g. `set (x := 1)` never has a selector form
    if is_selector && !rest.starts_with('=') {
        rest.trim_start()
    } else {
        text
    }
}

/// Split on `;` outside parentheses and brackets
fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut last = 0;
    for (i, c) in text.char_indices() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            ';' if depth <= 0 => {
                parts.push(&text[last..i]);
                last = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[last..]);
    parts
}

fn head_tactic(part: &str) -> Option<&str> {
    let part = part.trim_start_matches(|c: char| c == '(' || c == '{' || c.is_whitespace());
    let end = part
        .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '\''))
        .unwrap_or(part.len());
    let head = &part[..end];
    (!head.is_empty() && head.starts_with(|c: char| c.is_alphabetic())).then_some(head)
}

fn normalize(head: &str) -> &str {
    match head {
        "intro" => "intros",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_and_counts() {
        let stats = collect(
            "Proof.\n  intros n m.\n  induction n as [|n IH]; simpl.\n  - reflexivity.\n  - rewrite <- IH. rewrite IH; auto.\nQed.",
        );
        assert_eq!(
            stats.sequence,
            vec!["intros", "induction", "simpl", "reflexivity", "rewrite", "rewrite", "auto"]
        );
        assert_eq!(stats.counts["rewrite"], 2);
        assert_eq!(stats.total(), 7);
    }

    #[test]
    fn test_normalisation_and_nesting() {
        let stats = collect("Proof. intro x. all: try (simpl; lia). 2: { destruct x. } Qed.");
        assert_eq!(stats.sequence, vec!["intros", "try", "destruct"]);
    }

    #[test]
    fn test_comments_and_unlexable_input() {
        let stats = collect("Proof. (* auto. *) simpl in H. Qed.");
        assert_eq!(stats.sequence, vec!["simpl"]);
        assert_eq!(collect("Proof. (* open").total(), 0);
    }
}
