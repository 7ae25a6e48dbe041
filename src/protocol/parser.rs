//! Streaming field parser for accumulating partial reads.
//!
//! Fragments are appended to an internal buffer until it forms one
//! `key: value` line terminated by CRLF. The value may contain bare `\n`
//! characters; only the final CRLF ends the line.
//!
//! # Example
//!
//! ```
//! use amiwire_client::protocol::BlockParser;
//!
//! let mut parser = BlockParser::new();
//! assert!(parser.feed("Response: Suc").is_none());
//!
//! let field = parser.feed("cess\r\n").unwrap();
//! assert_eq!(field.key, "response");
//! assert_eq!(field.value, "Success");
//! ```

use std::sync::LazyLock;

use regex::Regex;

use super::block::{UNKNOWN_FIELD, UNKNOWN_VALUE};
use super::LINE_TERMINATOR;

static FIELD_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\A([\w\s/-]*):\s*(.*)\r\n\z").expect("field line regex is valid")
});

/// One field extracted from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedField {
    /// Lowercased field name.
    pub key: String,
    pub value: String,
}

impl ParsedField {
    fn unknown() -> Self {
        Self {
            key: UNKNOWN_FIELD.to_string(),
            value: UNKNOWN_VALUE.to_string(),
        }
    }
}

/// Per-connection field parser.
#[derive(Debug, Default)]
pub struct BlockParser {
    buffer: String,
}

impl BlockParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a line or line fragment and return the field it completes, if any.
    ///
    /// Blank lines must not be fed here: the caller treats a bare CRLF as the
    /// end of the current block.
    pub fn feed(&mut self, fragment: &str) -> Option<ParsedField> {
        self.buffer.push_str(fragment);

        if let Some(caps) = FIELD_LINE.captures(&self.buffer) {
            let field = ParsedField {
                key: caps[1].to_lowercase(),
                value: caps[2].to_string(),
            };
            self.buffer.clear();
            return Some(field);
        }

        if self.buffer.ends_with(LINE_TERMINATOR) {
            tracing::debug!(line = %self.buffer.trim_end(), "unparseable line");
            self.buffer.clear();
            return Some(ParsedField::unknown());
        }

        None
    }

    /// Number of buffered bytes waiting for a line terminator.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partial input.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}
