//! Actions and their wire encoding.
//!
//! An action is an ordered list of fields, the first one always being
//! `action`. A field may carry a map instead of a scalar; each map entry is
//! written as its own repeated line (`variable: k=v`).
//!
//! ```text
//! Action: originate\r\n
//! Channel: SIP/5060\r\n
//! Variable: file_name=/path/to/file\r\n
//! Variable: format=ulaw\r\n
//! \r\n
//! ```

use std::collections::hash_map::DefaultHasher;
use std::fmt::Write as _;
use std::hash::{Hash, Hasher};

use bytes::{BufMut, Bytes, BytesMut};

use super::LINE_TERMINATOR;

/// Value of one action field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldValue {
    Scalar(String),
    /// Sub-key/sub-value pairs, one wire line each.
    Map(Vec<(String, String)>),
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Scalar(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Scalar(value)
    }
}

/// A command to send to the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Action {
    fields: Vec<(String, FieldValue)>,
}

impl Action {
    /// Create an action with the given name (`action: <name>`).
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            fields: vec![("action".to_string(), FieldValue::Scalar(name.into()))],
        }
    }

    /// Add (or replace) a scalar field. Builder style.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Add (or replace) a multi-valued field. Builder style.
    pub fn vars<I, K, V>(mut self, name: impl Into<String>, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let entries = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.set(name, FieldValue::Map(entries));
        self
    }

    /// Set a field in place. Names are case-insensitive; replacing keeps the
    /// original position.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        let name = name.into().to_lowercase();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Get a field.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    fn get_scalar(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(FieldValue::Scalar(v)) => Some(v),
            _ => None,
        }
    }

    /// Action name.
    pub fn name(&self) -> &str {
        self.get_scalar("action").unwrap_or_default()
    }

    /// Rename the action, keeping all other fields.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.set("action", name.into());
    }

    /// Caller-supplied action id.
    pub fn action_id(&self) -> Option<&str> {
        self.get_scalar("actionid")
    }

    /// Return the action id, generating `"<action>-<hash>"` if none is set.
    pub fn ensure_action_id(&mut self) -> String {
        if let Some(id) = self.action_id() {
            return id.to_string();
        }

        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        let id = format!("{}-{:x}", self.name(), hasher.finish());
        self.set("actionid", id.clone());
        id
    }

    /// Fields in send order.
    pub fn fields(&self) -> &[(String, FieldValue)] {
        &self.fields
    }
}

impl Default for Action {
    /// An action with an empty name, for field sets that are named later
    /// (see [`set_name`](Action::set_name)).
    fn default() -> Self {
        Self::new("")
    }
}

/// Encode an action into its wire representation, blank-line terminated.
pub fn encode_action(action: &Action) -> Bytes {
    let mut buf = BytesMut::with_capacity(64 * action.fields.len());

    for (name, value) in &action.fields {
        match value {
            FieldValue::Scalar(v) => {
                write_line(&mut buf, name, v);
            }
            FieldValue::Map(entries) => {
                for (k, v) in entries {
                    write_line(&mut buf, name, &format!("{k}={v}"));
                }
            }
        }
    }
    buf.put_slice(LINE_TERMINATOR.as_bytes());

    buf.freeze()
}

fn write_line(buf: &mut BytesMut, name: &str, value: &str) {
    let mut line = String::with_capacity(name.len() + value.len() + 4);
    let _ = write!(line, "{name}: {value}{LINE_TERMINATOR}");
    tracing::trace!(line = %line.trim_end(), "encode");
    buf.put_slice(line.as_bytes());
}
