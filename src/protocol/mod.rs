//! Protocol module - blocks, field parsing, and action encoding.
//!
//! This module implements the line-oriented wire format:
//! - CRLF-terminated `key: value` lines
//! - Blocks terminated by a blank line
//! - Actions with repeated multi-valued fields

mod action;
mod block;
mod parser;

pub use action::{encode_action, Action, FieldValue};
pub use block::{Block, BlockKind, UNKNOWN_FIELD, UNKNOWN_VALUE};
pub use parser::{BlockParser, ParsedField};

/// Line terminator used on the wire, both directions.
pub const LINE_TERMINATOR: &str = "\r\n";

/// Default manager port.
pub const DEFAULT_PORT: u16 = 5038;

/// Expected `response` of a successful login or action.
pub const RESPONSE_SUCCESS: &str = "Success";

/// Expected `response` of a `ping`.
pub const RESPONSE_PONG: &str = "Pong";

/// `response` sent by the server before closing after a logoff.
pub const RESPONSE_GOODBYE: &str = "Goodbye";

/// `response` value a correlated action must carry to count as successful.
pub fn expected_response(action_name: &str) -> &'static str {
    if action_name.eq_ignore_ascii_case("ping") {
        RESPONSE_PONG
    } else {
        RESPONSE_SUCCESS
    }
}
