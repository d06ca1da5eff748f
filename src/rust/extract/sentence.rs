// SPDX-FileCopyrightText: 2026 Proofbench Project Team
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Vernacular sentence splitting
//!
//! Comments nest and may themselves contain strings; strings escape a quote
//! by doubling it. Both are blanked out by [`mask`] so every later pass can
//! look at code only while keeping byte offsets intact.

use std::fmt;

/// Lexing failure with the 1-based line it started on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub line: usize,
    pub message: &'static str,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for LexError {}

/// Byte offsets of line starts, for offset to line lookups
#[derive(Debug, Clone)]
pub struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    /// 1-based line containing `offset`
    pub fn line_of(&self, offset: usize) -> usize {
        match self.starts.binary_search(&offset) {
            Ok(i) => i + 1,
            Err(i) => i,
        }
    }
}

/// Replace comment bodies and string contents with spaces.
///
/// Newlines are kept, string quotes are kept, and the result has exactly the
/// byte length of the input.
pub fn mask(src: &str) -> Result<String, LexError> {
    let bytes = src.as_bytes();
    let mut out = bytes.to_vec();
    let lines = LineIndex::new(src);
    let mut i = 0;

    let blank = |out: &mut Vec<u8>, at: usize| {
        if out[at] != b'\n' {
            out[at] = b' ';
        }
    };

    while i < bytes.len() {
        match bytes[i] {
            b'(' if bytes.get(i + 1) == Some(&b'*') => {
                let start = i;
                let mut depth = 0usize;
                let mut in_string = false;
                loop {
                    if i >= bytes.len() {
                        let message = if in_string {
                            "unterminated string in comment"
                        } else {
                            "unterminated comment"
                        };
                        return Err(LexError {
                            line: lines.line_of(start),
                            message,
                        });
                    }
                    if in_string {
                        if bytes[i] == b'"' {
                            in_string = false;
                        }
                        blank(&mut out, i);
                        i += 1;
                    } else if bytes[i] == b'"' {
                        in_string = true;
                        blank(&mut out, i);
                        i += 1;
                    } else if bytes[i] == b'(' && bytes.get(i + 1) == Some(&b'*') {
                        depth += 1;
                        blank(&mut out, i);
                        blank(&mut out, i + 1);
                        i += 2;
                    } else if bytes[i] == b'*' && bytes.get(i + 1) == Some(&b')') {
                        depth -= 1;
                        blank(&mut out, i);
                        blank(&mut out, i + 1);
                        i += 2;
                        if depth == 0 {
                            break;
                        }
                    } else {
                        blank(&mut out, i);
                        i += 1;
                    }
                }
            }
            b'"' => {
                let start = i;
                i += 1;
                loop {
                    if i >= bytes.len() {
                        return Err(LexError {
                            line: lines.line_of(start),
                            message: "unterminated string",
                        });
                    }
                    if bytes[i] == b'"' {
                        if bytes.get(i + 1) == Some(&b'"') {
                            blank(&mut out, i);
                            blank(&mut out, i + 1);
                            i += 2;
                            continue;
                        }
                        i += 1;
                        break;
                    }
                    blank(&mut out, i);
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }

    // Masked characters are blanked byte by byte, so the result is valid UTF-8.
    String::from_utf8(out).map_err(|_| LexError {
        line: 1,
        message: "invalid utf-8 after masking",
    })
}

/// One vernacular sentence, from its first code byte through its final `.`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sentence {
    pub start: usize,
    pub end: usize,
    pub start_line: usize,
    pub end_line: usize,
}

impl Sentence {
    pub fn text<'a>(&self, src: &'a str) -> &'a str {
        &src[self.start..self.end]
    }
}

fn is_space(b: u8) -> bool {
    b.is_ascii_whitespace()
}

/// Split masked source into sentences.
///
/// Bullets (`-`, `+`, `*` runs) and focusing braces at the start of a
/// sentence are sentences of their own. A `.` ends a sentence only when it
/// is followed by whitespace or the end of input and is not part of `..`.
/// Trailing code without a terminating `.` is an error.
pub fn split(masked: &str) -> Result<Vec<Sentence>, LexError> {
    let bytes = masked.as_bytes();
    let lines = LineIndex::new(masked);
    let mut sentences = Vec::new();
    let mut i = 0;

    let push = |start: usize, end: usize, sentences: &mut Vec<Sentence>| {
        sentences.push(Sentence {
            start,
            end,
            start_line: lines.line_of(start),
            end_line: lines.line_of(end.saturating_sub(1)),
        });
    };

    while i < bytes.len() {
        while i < bytes.len() && is_space(bytes[i]) {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }
        let start = i;

        match bytes[i] {
            b'-' | b'+' | b'*' => {
                let bullet = bytes[i];
                while i < bytes.len() && bytes[i] == bullet {
                    i += 1;
                }
                push(start, i, &mut sentences);
                continue;
            }
            b'{' | b'}' => {
                i += 1;
                push(start, i, &mut sentences);
                continue;
            }
            _ => {}
        }

        let mut end = None;
        while i < bytes.len() {
            if bytes[i] == b'.' {
                let prev_dot = i > start && bytes[i - 1] == b'.';
                let next = bytes.get(i + 1).copied();
                let next_ok = next.map_or(true, is_space);
                if next_ok && !prev_dot {
                    end = Some(i + 1);
                    i += 1;
                    break;
                }
            }
            i += 1;
        }
        match end {
            Some(end) => push(start, end, &mut sentences),
            None => {
                return Err(LexError {
                    line: lines.line_of(start),
                    message: "unterminated sentence",
                })
            }
        }
    }
    Ok(sentences)
}

/// Convenience: mask then split
pub fn sentences(src: &str) -> Result<(String, Vec<Sentence>), LexError> {
    let masked = mask(src)?;
    let sentences = split(&masked)?;
    Ok((masked, sentences))
}

/// Check `()`, `[]` and `{}` balance over masked text.
///
/// Returns the 1-based line of the first offending bracket.
pub fn unbalanced_bracket(masked: &str) -> Option<usize> {
    let lines = LineIndex::new(masked);
    let mut stack: Vec<(u8, usize)> = Vec::new();
    for (i, b) in masked.bytes().enumerate() {
        let expected = match b {
            b'(' | b'[' | b'{' => {
                stack.push((b, i));
                continue;
            }
            b')' => b'(',
            b']' => b'[',
            b'}' => b'{',
            _ => continue,
        };
        match stack.pop() {
            Some((open, _)) if open == expected => {}
            _ => return Some(lines.line_of(i)),
        }
    }
    stack.first().map(|&(_, at)| lines.line_of(at))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(src: &str) -> Vec<String> {
        let (_, sentences) = sentences(src).unwrap();
        sentences.iter().map(|s| s.text(src).to_string()).collect()
    }

    #[test]
    fn test_mask_preserves_length_and_lines() {
        let src = "Lemma a (* c (* nested *) \"*)\" *) : \"x\"\"y\" = 1.\n";
        let masked = mask(src).unwrap();
        assert_eq!(masked.len(), src.len());
        assert!(!masked.contains("nested"));
        assert!(masked.starts_with("Lemma a "));
        assert!(masked.contains('"'));
        assert!(!masked.contains('x'));
    }

    #[test]
    fn test_mask_multibyte_in_comment() {
        let src = "(* ∀ *) Lemma a : True.";
        let masked = mask(src).unwrap();
        assert_eq!(masked.len(), src.len());
        assert!(masked.trim_start().starts_with("Lemma"));
    }

    #[test]
    fn test_split_basic_proof() {
        let got = texts("Lemma a : forall n, n = n.\nProof.\n  intros n. reflexivity.\nQed.\n");
        assert_eq!(
            got,
            vec!["Lemma a : forall n, n = n.", "Proof.", "intros n.", "reflexivity.", "Qed."]
        );
    }

    #[test]
    fn test_split_ignores_dots_in_comments_strings_and_names() {
        let got = texts(
            "(* a. b. *) Definition x := Nat.add 1 2.\nNotation \"a . b\" := (a b).\nLemma l : [1..2] = nil.",
        );
        assert_eq!(got.len(), 3);
        assert!(got[0].starts_with("Definition x := Nat.add"));
        assert!(got[1].starts_with("Notation"));
    }

    #[test]
    fn test_split_bullets_and_braces() {
        let got = texts("Proof. split.\n- auto.\n- { simpl. auto. }\n++ now trivial.\nQed.");
        assert_eq!(
            got,
            vec![
                "Proof.", "split.", "-", "auto.", "-", "{", "simpl.", "auto.", "}", "++",
                "now trivial.", "Qed."
            ]
        );
    }

    #[test]
    fn test_unterminated_comment_reports_line() {
        let err = mask("Lemma a : True.\n(* open\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.message, "unterminated comment");
    }

    #[test]
    fn test_unterminated_sentence() {
        let err = sentences("Lemma a : True.\nProof. auto").unwrap_err();
        assert_eq!(err.message, "unterminated sentence");
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_sentence_lines() {
        let (_, s) = sentences("Lemma a :\n  True.\n\nProof. exact I. Qed.").unwrap();
        assert_eq!((s[0].start_line, s[0].end_line), (1, 2));
        assert_eq!((s[1].start_line, s[1].end_line), (4, 4));
    }

    #[test]
    fn test_unbalanced_brackets() {
        assert_eq!(unbalanced_bracket("apply (f (g x))."), None);
        assert_eq!(unbalanced_bracket("apply (f x.\n"), Some(1));
        assert_eq!(unbalanced_bracket("a.\nexact [x)."), Some(2));
        let masked = mask("exact \"(\". (* ( *)").unwrap();
        assert_eq!(unbalanced_bracket(&masked), None);
    }
}
