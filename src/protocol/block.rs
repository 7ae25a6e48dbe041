//! Protocol blocks: the key/value units terminated by a blank line.
//!
//! A block carrying an `event` field is an event; anything else is the
//! response to an action. Classification is total, there is no third kind.

use std::collections::HashMap;

/// Field name of the synthetic entry produced for lines that do not parse.
pub const UNKNOWN_FIELD: &str = "unknown";

/// Value stored under [`UNKNOWN_FIELD`].
pub const UNKNOWN_VALUE: &str = "UNKNOWN";

/// Prefix of legacy (v1.0) user event names.
const USER_EVENT: &str = "UserEvent";

/// Kind of a completed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Asynchronous server notification (has an `event` field).
    Event,
    /// Response to an action (no `event` field).
    Response,
}

/// One protocol unit: lowercase field names mapped to their values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Block {
    fields: HashMap<String, String>,
}

impl Block {
    /// Create an empty block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify this block.
    pub fn kind(&self) -> BlockKind {
        if self.fields.contains_key("event") {
            BlockKind::Event
        } else {
            BlockKind::Response
        }
    }

    #[inline]
    pub fn is_event(&self) -> bool {
        self.kind() == BlockKind::Event
    }

    /// Get a field value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Set a field, replacing any previous value. Later lines win.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.fields.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn clear(&mut self) {
        self.fields.clear();
    }

    /// `event` field, if any.
    pub fn event(&self) -> Option<&str> {
        self.get("event")
    }

    /// `response` field, if any.
    pub fn response(&self) -> Option<&str> {
        self.get("response")
    }

    /// `actionid` field, if any.
    pub fn action_id(&self) -> Option<&str> {
        self.get("actionid")
    }

    /// `message` field, if any.
    pub fn message(&self) -> Option<&str> {
        self.get("message")
    }

    /// Iterate over all fields in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Rewrite a legacy (v1.0) user event into the current shape.
    ///
    /// `event: UserEventFoo` + `variables: A: 1|B: 2` becomes
    /// `event: UserEvent`, `userevent: Foo`, `a: 1`, `b: 2`, and the redundant
    /// `channel` field is dropped. Returns `true` if the block was rewritten.
    pub fn normalize_legacy_user_event(&mut self) -> bool {
        let name = match self
            .event()
            .and_then(|event| event.strip_prefix(USER_EVENT))
        {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => return false,
        };

        self.insert("userevent", name);
        self.insert("event", USER_EVENT);

        if let Some(vars) = self.remove("variables") {
            for pair in vars.split('|') {
                let (key, value) = match pair.split_once(':') {
                    Some((key, value)) => (key, value.trim_start_matches(' ')),
                    None => (pair, ""),
                };
                self.insert(key.to_lowercase(), value);
            }
        }

        self.remove("channel");
        true
    }
}

impl<K, V> FromIterator<(K, V)> for Block
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut block = Block::new();
        for (key, value) in iter {
            block.insert(key, value);
        }
        block
    }
}
