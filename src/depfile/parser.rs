// src/depfile/parser.rs

//! Parser for make-style dependency-list files.
//!
//! ```text
//! out.o out.d: src/main.c \
//!   include/a.h include/b.h
//!
//! include/a.h:
//! ```
//!
//! One rule per logical line. A backslash at the very end of a physical line
//! joins it with the next one. Blank lines and lines starting with `#` are
//! ignored. Paths are ASCII, separated by spaces or tabs, and never quoted.

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    #[error("expected ':' after target list")]
    MissingColon,

    #[error("rule has no target before ':'")]
    MissingTarget,

    #[error("unexpected second ':' in rule")]
    UnexpectedColon,

    #[error("line continuation at end of file")]
    DanglingContinuation,

    #[error("non-ASCII character {0:?}")]
    NonAscii(char),
}

/// Parse failure with the 1-based line where the offending rule starts.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("line {line}: {kind}")]
pub struct ParseError {
    pub line: usize,
    pub kind: ParseErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub targets: Vec<String>,
    pub prerequisites: Vec<String>,
    /// 1-based line where the rule starts.
    pub line: usize,
}

/// Parse the whole file into its rules, in file order.
pub fn parse(text: &str) -> Result<Vec<Rule>, ParseError> {
    let mut rules = Vec::new();

    for (line, logical) in logical_lines(text)? {
        let trimmed = logical.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        rules.push(parse_rule(trimmed, line)?);
    }

    Ok(rules)
}

/// Join continuation lines, keeping the line number each rule starts on.
fn logical_lines(text: &str) -> Result<Vec<(usize, String)>, ParseError> {
    let mut out = Vec::new();
    let mut current: Option<(usize, String)> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let raw = raw.strip_suffix('\r').unwrap_or(raw);

        if let Some(c) = raw.chars().find(|c| !c.is_ascii()) {
            let line = current.as_ref().map(|(l, _)| *l).unwrap_or(line_no);
            return Err(ParseError {
                line,
                kind: ParseErrorKind::NonAscii(c),
            });
        }

        let (body, continues) = match raw.strip_suffix('\\') {
            Some(body) => (body, true),
            None => (raw, false),
        };

        let entry = current.get_or_insert_with(|| (line_no, String::new()));
        entry.1.push(' ');
        entry.1.push_str(body);

        if !continues {
            if let Some(done) = current.take() {
                out.push(done);
            }
        }
    }

    if let Some((line, _)) = current {
        return Err(ParseError {
            line,
            kind: ParseErrorKind::DanglingContinuation,
        });
    }

    Ok(out)
}

fn parse_rule(text: &str, line: usize) -> Result<Rule, ParseError> {
    let err = |kind| ParseError { line, kind };

    let (lhs, rhs) = text
        .split_once(':')
        .ok_or_else(|| err(ParseErrorKind::MissingColon))?;

    if rhs.contains(':') {
        return Err(err(ParseErrorKind::UnexpectedColon));
    }

    let targets: Vec<String> = lhs.split_ascii_whitespace().map(str::to_owned).collect();
    if targets.is_empty() {
        return Err(err(ParseErrorKind::MissingTarget));
    }

    let prerequisites = rhs.split_ascii_whitespace().map(str::to_owned).collect();

    Ok(Rule {
        targets,
        prerequisites,
        line,
    })
}
