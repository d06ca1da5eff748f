// SPDX-FileCopyrightText: 2026 Proofbench Project Team
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Replace a proof span with a candidate proof

use thiserror::Error;

use crate::core::Span;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpliceError {
    #[error("span {start}..{end} is outside a source of {len} bytes")]
    OutOfBounds { start: usize, end: usize, len: usize },

    #[error("span {start}..{end} does not fall on character boundaries")]
    NotCharBoundary { start: usize, end: usize },
}

/// Source text with a candidate in place of the original proof
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spliced {
    pub text: String,
    /// 1-based, inclusive lines occupied by the candidate
    pub lines: (usize, usize),
}

/// Build `source[..start] + candidate + source[end..]`
pub fn splice(source: &str, span: &Span, candidate: &str) -> Result<Spliced, SpliceError> {
    let (start, end) = (span.start, span.end);
    if start > end || end > source.len() {
        return Err(SpliceError::OutOfBounds {
            start,
            end,
            len: source.len(),
        });
    }
    if !source.is_char_boundary(start) || !source.is_char_boundary(end) {
        return Err(SpliceError::NotCharBoundary { start, end });
    }

    let mut text = String::with_capacity(source.len() - span.len() + candidate.len());
    text.push_str(&source[..start]);
    text.push_str(candidate);
    text.push_str(&source[end..]);

    let first = source[..start].matches('\n').count() + 1;
    let last = first + candidate.trim_end_matches('\n').matches('\n').count();
    Ok(Spliced {
        text,
        lines: (first, last),
    })
}
