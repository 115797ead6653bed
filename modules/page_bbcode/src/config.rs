use forumkit::ElementKind;
use serde::{Deserialize, Serialize};

/// Configuration for the page_bbcode_registration module
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PageBBCodeConfig {
    /// Custom BBCode page elements, registered in this order.
    #[serde(default)]
    pub elements: Vec<BBCodeElement>,
}

/// One script or style fragment backing a custom BBCode tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BBCodeElement {
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: ElementKind,
    pub content: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_kind() -> ElementKind {
    ElementKind::Script
}

fn default_enabled() -> bool {
    true
}

impl PageBBCodeConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        for (i, element) in self.elements.iter().enumerate() {
            if element.name.trim().is_empty() {
                anyhow::bail!("elements[{i}]: name must not be empty");
            }
        }
        Ok(())
    }

    pub fn enabled(&self) -> impl Iterator<Item = &BBCodeElement> {
        self.elements.iter().filter(|e| e.enabled)
    }
}
