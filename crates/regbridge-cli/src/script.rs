//! Text stimulus scripts.
//!
//! One item per line; `#` starts a comment:
//!
//! ```text
//! # read address 3
//! E7 13 00 00 00 03
//! idle 16
//! reset
//! ```
//!
//! Byte tokens are two-digit hex with an optional `0x` prefix. `idle <n>`
//! inserts `n` steps with no inbound byte and `reset` resets the bridge.

use std::path::Path;

use thiserror::Error;

/// Parse failure with its 1-indexed source line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    /// Token is not a byte in hex.
    #[error("line {line}: invalid byte `{token}`")]
    InvalidByte {
        /// Source line.
        line: usize,
        /// Offending token.
        token: String,
    },
    /// Directive is missing or has a malformed argument.
    #[error("line {line}: invalid argument for `{directive}`")]
    InvalidArgument {
        /// Source line.
        line: usize,
        /// Directive name.
        directive: &'static str,
    },
    /// Directive was followed by unexpected tokens.
    #[error("line {line}: unexpected trailing input after `{directive}`")]
    TrailingInput {
        /// Source line.
        line: usize,
        /// Directive name.
        directive: &'static str,
    },
    /// Script file could not be read.
    #[error("failed to read {path}: {message}")]
    Io {
        /// Script path.
        path: String,
        /// Underlying I/O error text.
        message: String,
    },
}

/// One scripted action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptItem {
    /// Bytes strobed in on consecutive steps.
    Bytes(Vec<u8>),
    /// Steps with no inbound byte.
    Idle(u32),
    /// Bridge reset.
    Reset,
}

/// Parsed item together with the line it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptLine {
    /// 1-indexed source line.
    pub line: usize,
    /// Parsed action.
    pub item: ScriptItem,
}

/// Parsed stimulus script.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Script {
    /// Items in source order.
    pub lines: Vec<ScriptLine>,
}

impl Script {
    /// Parses script text.
    ///
    /// # Errors
    ///
    /// Returns the first [`ScriptError`] encountered.
    pub fn parse(source: &str) -> Result<Self, ScriptError> {
        let mut lines = Vec::new();
        for (index, raw) in source.lines().enumerate() {
            let line = index + 1;
            let text = raw.split_once('#').map_or(raw, |(code, _)| code);
            let mut tokens = text.split_whitespace().peekable();
            let Some(first) = tokens.peek().copied() else {
                continue;
            };

            let item = match first.to_ascii_lowercase().as_str() {
                "idle" => {
                    tokens.next();
                    let steps = tokens
                        .next()
                        .and_then(parse_number)
                        .and_then(|value| u32::try_from(value).ok())
                        .ok_or(ScriptError::InvalidArgument {
                            line,
                            directive: "idle",
                        })?;
                    if tokens.next().is_some() {
                        return Err(ScriptError::TrailingInput {
                            line,
                            directive: "idle",
                        });
                    }
                    ScriptItem::Idle(steps)
                }
                "reset" => {
                    tokens.next();
                    if tokens.next().is_some() {
                        return Err(ScriptError::TrailingInput {
                            line,
                            directive: "reset",
                        });
                    }
                    ScriptItem::Reset
                }
                _ => ScriptItem::Bytes(
                    tokens
                        .map(|token| {
                            parse_byte(token).ok_or_else(|| ScriptError::InvalidByte {
                                line,
                                token: token.to_string(),
                            })
                        })
                        .collect::<Result<_, _>>()?,
                ),
            };
            lines.push(ScriptLine { line, item });
        }
        Ok(Self { lines })
    }

    /// Reads and parses a script file.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::Io`] when the file cannot be read, otherwise
    /// the first parse error.
    pub fn load(path: &Path) -> Result<Self, ScriptError> {
        let source = std::fs::read_to_string(path).map_err(|error| ScriptError::Io {
            path: path.display().to_string(),
            message: error.to_string(),
        })?;
        Self::parse(&source)
    }

    /// Total inbound bytes across all items.
    #[must_use]
    pub fn byte_count(&self) -> usize {
        self.lines
            .iter()
            .map(|line| match &line.item {
                ScriptItem::Bytes(bytes) => bytes.len(),
                ScriptItem::Idle(_) | ScriptItem::Reset => 0,
            })
            .sum()
    }
}

/// Parses a two-digit hex byte, with or without a `0x` prefix.
#[must_use]
pub fn parse_byte(token: &str) -> Option<u8> {
    let digits = strip_hex_prefix(token).unwrap_or(token);
    if digits.is_empty() || digits.len() > 2 {
        return None;
    }
    u8::from_str_radix(digits, 16).ok()
}

/// Parses a decimal number, or hex with a `0x` prefix.
#[must_use]
pub fn parse_number(token: &str) -> Option<u64> {
    strip_hex_prefix(token).map_or_else(
        || token.parse().ok(),
        |digits| u64::from_str_radix(digits, 16).ok(),
    )
}

fn strip_hex_prefix(token: &str) -> Option<&str> {
    token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
}
