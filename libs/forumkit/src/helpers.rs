//! Small per-context helpers kept in the single-instance cache.

use std::collections::HashSet;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Messages queued for display when the page finishes loading.
#[derive(Debug, Default)]
pub struct LoadMessage {
    messages: Mutex<Vec<String>>,
}

impl LoadMessage {
    pub fn add(&self, message: impl Into<String>) {
        let message = message.into();
        if !message.trim().is_empty() {
            self.messages.lock().push(message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    /// All messages joined with newlines.
    pub fn as_text(&self) -> String {
        self.messages.lock().join("\n")
    }

    /// Same as [`as_text`](Self::as_text), escaped for a single-quoted JS string literal.
    pub fn as_javascript(&self) -> String {
        let mut out = String::new();
        for c in self.as_text().chars() {
            match c {
                '\\' => out.push_str("\\\\"),
                '\'' => out.push_str("\\'"),
                '"' => out.push_str("\\\""),
                '\n' => out.push_str("\\n"),
                '\r' => {}
                other => out.push(other),
            }
        }
        out
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Script,
    Style,
    Markup,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageElement {
    pub name: String,
    pub kind: ElementKind,
    pub content: String,
}

#[derive(Debug, Default)]
struct ElementState {
    order: Vec<PageElement>,
    names: HashSet<String>,
}

/// Named header elements for the page being rendered.
///
/// Each name is registered once; later registrations of the same name are ignored.
#[derive(Debug, Default)]
pub struct PageElementRegister {
    state: Mutex<ElementState>,
}

impl PageElementRegister {
    /// Returns `false` when an element with this name already exists.
    pub fn register(&self, name: impl Into<String>, kind: ElementKind, content: impl Into<String>) -> bool {
        let name = name.into();
        let mut state = self.state.lock();
        if !state.names.insert(name.clone()) {
            return false;
        }
        state.order.push(PageElement {
            name,
            kind,
            content: content.into(),
        });
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.state.lock().names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.state.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot in registration order.
    pub fn elements(&self) -> Vec<PageElement> {
        self.state.lock().order.clone()
    }
}
