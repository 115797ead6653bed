//! Loosely typed per-context variable bag.
//!
//! Any collaborator may read or overwrite any key, including the ones the
//! typed accessors below rely on.

use std::collections::HashMap;
use std::ops::{Index, IndexMut};

use serde_json::Value;

static NO_VALUE: Value = Value::Null;

pub mod keys {
    pub const BOARD_ID: &str = "BoardID";
    pub const CATEGORY_ID: &str = "CategoryID";
    pub const FORUM_ID: &str = "ForumID";
    pub const TOPIC_ID: &str = "TopicID";
    pub const MESSAGE_ID: &str = "MessageID";
    pub const USER_ID: &str = "UserID";
    pub const IS_MOBILE_DEVICE: &str = "IsMobileDevice";
    pub const PAGE_TITLE: &str = "PageTitle";
}

#[derive(Debug, Default, Clone)]
pub struct VariableRepository {
    values: HashMap<String, Value>,
}

impl VariableRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Overwrites unconditionally.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Integer view of `key`. Numeric strings are accepted.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.values.get(key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Boolean view of `key`. Accepts `true`/`false`, `1`/`0` and their string forms.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.values.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_i64().map(|n| n != 0),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key)?.as_str()
    }

    fn set_opt_i64(&mut self, key: &str, value: Option<i64>) {
        match value {
            Some(v) => self.set(key, v),
            None => {
                self.values.remove(key);
            }
        }
    }

    pub fn board_id(&self) -> Option<i64> {
        self.get_i64(keys::BOARD_ID)
    }

    pub fn set_board_id(&mut self, id: i64) {
        self.set(keys::BOARD_ID, id);
    }

    pub fn category_id(&self) -> Option<i64> {
        self.get_i64(keys::CATEGORY_ID)
    }

    pub fn set_category_id(&mut self, id: Option<i64>) {
        self.set_opt_i64(keys::CATEGORY_ID, id);
    }

    pub fn forum_id(&self) -> Option<i64> {
        self.get_i64(keys::FORUM_ID)
    }

    pub fn set_forum_id(&mut self, id: Option<i64>) {
        self.set_opt_i64(keys::FORUM_ID, id);
    }

    pub fn topic_id(&self) -> Option<i64> {
        self.get_i64(keys::TOPIC_ID)
    }

    pub fn set_topic_id(&mut self, id: Option<i64>) {
        self.set_opt_i64(keys::TOPIC_ID, id);
    }

    pub fn message_id(&self) -> Option<i64> {
        self.get_i64(keys::MESSAGE_ID)
    }

    pub fn set_message_id(&mut self, id: Option<i64>) {
        self.set_opt_i64(keys::MESSAGE_ID, id);
    }

    pub fn user_id(&self) -> Option<i64> {
        self.get_i64(keys::USER_ID)
    }

    pub fn set_user_id(&mut self, id: Option<i64>) {
        self.set_opt_i64(keys::USER_ID, id);
    }

    pub fn is_mobile_device(&self) -> bool {
        self.get_bool(keys::IS_MOBILE_DEVICE).unwrap_or(false)
    }

    pub fn set_is_mobile_device(&mut self, value: bool) {
        self.set(keys::IS_MOBILE_DEVICE, value);
    }

    pub fn page_title(&self) -> Option<&str> {
        self.get_str(keys::PAGE_TITLE)
    }

    pub fn set_page_title(&mut self, title: impl Into<String>) {
        self.set(keys::PAGE_TITLE, title.into());
    }
}

/// Missing keys read as `Value::Null`.
impl Index<&str> for VariableRepository {
    type Output = Value;

    fn index(&self, key: &str) -> &Value {
        self.values.get(key).unwrap_or(&NO_VALUE)
    }
}

/// Writing through a missing key inserts it, as `serde_json::Value` does.
impl IndexMut<&str> for VariableRepository {
    fn index_mut(&mut self, key: &str) -> &mut Value {
        self.values.entry(key.to_string()).or_insert(Value::Null)
    }
}
