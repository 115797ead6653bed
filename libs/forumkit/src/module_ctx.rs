//! Startup context handed to each module's `init`.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::scope::RootContainer;

/// Per-module configuration source.
pub trait ConfigProvider: Send + Sync {
    /// The raw `modules.<name>` entry, if any.
    fn get_module_config(&self, module_name: &str) -> Option<&serde_json::Value>;
}

/// Provider with no module configuration at all.
#[derive(Debug, Default)]
pub struct EmptyConfigProvider;

impl ConfigProvider for EmptyConfigProvider {
    fn get_module_config(&self, _module_name: &str) -> Option<&serde_json::Value> {
        None
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config for module '{module}'")]
    InvalidConfig {
        module: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Deserialize `modules.<name>.config`, or `T::default()` when it is absent.
pub fn module_config_typed<T: DeserializeOwned + Default>(
    provider: &dyn ConfigProvider,
    module_name: &str,
) -> Result<T, ConfigError> {
    let Some(section) = provider
        .get_module_config(module_name)
        .and_then(|entry| entry.get("config"))
    else {
        return Ok(T::default());
    };
    serde_json::from_value(section.clone()).map_err(|source| ConfigError::InvalidConfig {
        module: module_name.to_string(),
        source,
    })
}

#[derive(Clone)]
pub struct ModuleCtx {
    module_name: Arc<str>,
    config_provider: Arc<dyn ConfigProvider>,
    root: Option<Arc<RootContainer>>,
}

impl std::fmt::Debug for ModuleCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleCtx")
            .field("module_name", &self.module_name)
            .field("has_root", &self.root.is_some())
            .finish()
    }
}

impl ModuleCtx {
    pub fn new(
        module_name: impl Into<Arc<str>>,
        config_provider: Arc<dyn ConfigProvider>,
        root: Option<Arc<RootContainer>>,
    ) -> Self {
        Self {
            module_name: module_name.into(),
            config_provider,
            root,
        }
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    /// Typed module configuration; defaults when the module has no `config` section.
    pub fn config<T: DeserializeOwned + Default>(&self) -> Result<T, ConfigError> {
        module_config_typed(self.config_provider.as_ref(), &self.module_name)
    }

    pub fn raw_config(&self) -> Option<&serde_json::Value> {
        self.config_provider.get_module_config(&self.module_name)
    }

    /// Process-wide container, when the host has built one before module init.
    pub fn root(&self) -> Option<&Arc<RootContainer>> {
        self.root.as_ref()
    }
}
