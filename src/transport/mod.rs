//! Transport module - TCP socket and line framing.

mod tcp;

pub use tcp::{open_stream, LineReader, ManagerStream};
