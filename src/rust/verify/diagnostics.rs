// SPDX-FileCopyrightText: 2026 Proofbench Project Team
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Compiler diagnostics
//!
//! `coqc` reports problems as a location header followed by a message:
//!
//! ```text
//! File "./Demo.v", line 12, characters 2-9:
//! Error: The reference foo was not found in the current environment.
//! ```
//!
//! Output is parsed once into [`Diagnostic`] values and classified into an
//! [`Outcome`] here; nothing downstream looks at raw compiler text again.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_until},
    character::complete::{digit1, space0},
    combinator::{map, map_res, opt},
    sequence::{preceded, separated_pair},
    IResult,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::core::Outcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

/// One located (or unlocated) compiler message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub file: Option<String>,
    /// 1-based first line
    pub line: Option<usize>,
    /// Last line when the compiler reports a line range
    pub line_end: Option<usize>,
    /// Character range on the first line
    pub chars: Option<(usize, usize)>,
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn unlocated(message: String) -> Self {
        Self {
            file: None,
            line: None,
            line_end: None,
            chars: None,
            severity: Severity::Error,
            message,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Lexer and parser failures, as opposed to failed proof steps
    pub fn is_syntax(&self) -> bool {
        const MARKERS: &[&str] = &[
            "Syntax error",
            "Lexer error",
            "Unterminated comment",
            "Unterminated string",
            "Undefined token",
            "Invalid character",
        ];
        MARKERS.iter().any(|m| self.message.contains(m))
    }

    /// Whether this diagnostic points into lines `first..=last` of `file_name`
    pub fn within(&self, file_name: &str, first: usize, last: usize) -> bool {
        let same_file = self.file.as_deref().is_some_and(|f| {
            Path::new(f).file_name().and_then(|n| n.to_str()) == Some(file_name)
        });
        let Some(line) = self.line else {
            return false;
        };
        let end = self.line_end.unwrap_or(line);
        same_file && line <= last && end >= first
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "line {}: {}", line, self.message),
            None => f.write_str(&self.message),
        }
    }
}

struct Header {
    file: String,
    line: usize,
    line_end: Option<usize>,
    chars: Option<(usize, usize)>,
}

fn number(input: &str) -> IResult<&str, usize> {
    map_res(digit1, str::parse)(input)
}

fn range(input: &str) -> IResult<&str, (usize, usize)> {
    separated_pair(number, tag("-"), number)(input)
}

/// `File "<path>", line L, characters A-B:` or `lines L-M`
fn header(input: &str) -> IResult<&str, Header> {
    let (input, _) = tag("File \"")(input)?;
    let (input, file) = take_until("\"")(input)?;
    let (input, _) = tag("\", ")(input)?;
    let (input, (line, line_end)) = alt((
        map(preceded(tag("lines "), range), |(a, b)| (a, Some(b))),
        map(preceded(tag("line "), number), |a| (a, None)),
    ))(input)?;
    let (input, chars) = opt(preceded(tag(", characters "), range))(input)?;
    let (input, _) = tag(":")(input)?;
    let (input, _) = space0(input)?;
    Ok((
        input,
        Header {
            file: file.to_string(),
            line,
            line_end,
            chars,
        },
    ))
}

fn finish(header: Option<Header>, body: &[&str], out: &mut Vec<Diagnostic>) {
    let text = body.join("\n");
    let text = text.trim();
    if header.is_none() && text.is_empty() {
        return;
    }
    let (severity, message) = if let Some(rest) = text.strip_prefix("Warning:") {
        (Severity::Warning, rest.trim())
    } else if let Some(rest) = text.strip_prefix("Error:") {
        (Severity::Error, rest.trim())
    } else {
        (Severity::Error, text)
    };
    let (file, line, line_end, chars) = match header {
        Some(h) => (Some(h.file), Some(h.line), h.line_end, h.chars),
        None => (None, None, None, None),
    };
    out.push(Diagnostic {
        file,
        line,
        line_end,
        chars,
        severity,
        message: message.to_string(),
    });
}

/// Parse everything the compiler printed
pub fn parse(output: &str) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    let mut header: Option<Header> = None;
    let mut body: Vec<&str> = Vec::new();
    let mut open = false;

    for line in output.lines() {
        if let Ok((rest, h)) = header_line(line) {
            if open {
                finish(header.take(), &body, &mut out);
            }
            body.clear();
            if !rest.trim().is_empty() {
                body.push(rest);
            }
            header = Some(h);
            open = true;
        } else if open {
            body.push(line);
        } else if line.starts_with("Error:") || line.starts_with("Syntax error") {
            // message without a location, e.g. a missing library
            body.clear();
            body.push(line);
            open = true;
        }
    }
    if open {
        finish(header, &body, &mut out);
    }
    out
}

fn header_line(line: &str) -> IResult<&str, Header> {
    header(line.trim_start())
}

/// Turn a finished compiler run into an outcome.
///
/// `candidate` is the inclusive line range of the spliced proof in the
/// compiled file named `file_name`.
pub fn classify(
    diagnostics: &[Diagnostic],
    file_name: &str,
    candidate: (usize, usize),
    exit_ok: bool,
) -> Outcome {
    let (first, last) = candidate;
    let errors: Vec<&Diagnostic> = diagnostics.iter().filter(|d| d.is_error()).collect();

    let inside: Vec<&&Diagnostic> = errors
        .iter()
        .filter(|d| d.within(file_name, first, last))
        .collect();
    if inside.iter().any(|d| d.is_syntax()) {
        return Outcome::SyntaxError;
    }
    if !inside.is_empty() {
        return Outcome::ProofFailed;
    }
    if !errors.is_empty() {
        return Outcome::EnvironmentError;
    }
    if !exit_ok {
        return Outcome::EnvironmentError;
    }
    Outcome::Verified
}
