// SPDX-FileCopyrightText: 2026 Proofbench Project Team
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Property-based testing generators for Coq sources and candidates

use proptest::prelude::*;

const KEYWORDS: &[&str] = &[
    "as", "at", "by", "end", "exists", "fix", "forall", "fun", "if", "in", "let", "match",
    "then", "with", "else", "return", "struct", "for", "is",
];

/// Strategy for lowercase identifiers that are not Gallina keywords
pub fn ident() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{1,8}"
        .prop_filter("keyword", |s| !KEYWORDS.contains(&s.as_str()))
        .prop_map(|s| s.to_string())
}

/// One lemma per entry. Entry `i` lists indices `< i` it uses in its
/// statement, so the generated file is always acyclic.
pub fn lemma_file(max: usize) -> impl Strategy<Value = (Vec<String>, Vec<Vec<usize>>)> {
    (1..=max).prop_flat_map(|n| {
        let uses: Vec<_> = (0..n)
            .map(|i| {
                if i == 0 {
                    Just(Vec::new()).boxed()
                } else {
                    prop::collection::btree_set(0..i, 0..=i.min(3))
                        .prop_map(|s| s.into_iter().collect::<Vec<_>>())
                        .boxed()
                }
            })
            .collect();
        (Just(n), uses)
    })
    .prop_map(|(n, uses)| {
        let names = (0..n).map(|i| format!("lemma_{}", i)).collect();
        (names, uses)
    })
}

/// Render a file from [`lemma_file`] output. Lemma `i` is preceded by a
/// definition `lemma_i_def`, and its statement mentions the definitions of
/// the lemmas it uses.
pub fn render_lemmas(names: &[String], uses: &[Vec<usize>]) -> String {
    let mut src = String::new();
    for (name, used) in names.iter().zip(uses) {
        let mut statement = String::from("True");
        for &u in used {
            statement.push_str(&format!(" /\\ ({0}_def = {0}_def)", names[u]));
        }
        src.push_str(&format!(
            "Definition {0}_def := 0.\n\nLemma {0} : {1}.\nProof.\n  repeat split.\nQed.\n\n",
            name, statement
        ));
    }
    src
}

/// Proof-like text that never contains an unterminated comment or string
pub fn candidate_text() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            Just("intros.".to_string()),
            Just("auto.".to_string()),
            Just("- simpl.".to_string()),
            Just("(* note *)".to_string()),
            ident().prop_map(|t| format!("{}.", t)),
            "[a-z]{1,4}".prop_map(|s| format!("destruct {} as [|x].", s)),
        ],
        1..8,
    )
    .prop_map(|lines| format!("Proof.\n  {}\nQed.", lines.join("\n  ")))
}
