use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;

use crate::contracts::PageModule;
use crate::lifecycle::Stage;
use crate::module_ctx::{ConfigProvider, ModuleCtx};
use crate::page::PageFilter;
use crate::scope::RootContainer;

/// Declarative module metadata, as written in `#[forumkit::module(...)]`.
#[derive(Debug, Clone, Copy)]
pub struct ModuleDescriptor {
    pub name: &'static str,
    /// Author or vendor tag, used in diagnostics only.
    pub group: &'static str,
    /// Lower runs first. Equal ordinals keep registration order.
    pub ordinal: i32,
    pub pages: PageFilter,
}

impl ModuleDescriptor {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            group: "",
            ordinal: 0,
            pages: PageFilter::All,
        }
    }

    pub const fn group(mut self, group: &'static str) -> Self {
        self.group = group;
        self
    }

    pub const fn ordinal(mut self, ordinal: i32) -> Self {
        self.ordinal = ordinal;
        self
    }

    pub const fn pages(mut self, pages: PageFilter) -> Self {
        self.pages = pages;
        self
    }
}

#[derive(Clone)]
pub struct ModuleEntry {
    pub name: &'static str,
    pub group: &'static str,
    pub ordinal: i32,
    pub pages: PageFilter,
    pub stages: &'static [Stage],
    pub module: Arc<dyn PageModule>,
}

impl std::fmt::Debug for ModuleEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleEntry")
            .field("name", &self.name)
            .field("group", &self.group)
            .field("ordinal", &self.ordinal)
            .field("pages", &self.pages)
            .field("stages", &self.stages)
            .finish()
    }
}

impl ModuleEntry {
    pub fn handles(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }
}

/// The function type submitted by the macro via `inventory::submit!`.
pub struct Registrator(pub fn(&mut RegistryBuilder));

inventory::collect!(Registrator);

/// Ordered, validated set of page modules.
pub struct ModuleRegistry {
    modules: Vec<ModuleEntry>,
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&'static str> = self.modules.iter().map(|m| m.name).collect();
        f.debug_struct("ModuleRegistry")
            .field("modules", &names)
            .finish()
    }
}

impl ModuleRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn modules(&self) -> &[ModuleEntry] {
        &self.modules
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Discover via inventory, have registrators fill the builder, then build.
    ///
    /// Link order decides inventory iteration order, so discovered modules are
    /// put in name order before the ordinal sort.
    pub fn discover_and_build() -> Result<Self, RegistryError> {
        let mut b = RegistryBuilder::default();
        for r in ::inventory::iter::<Registrator> {
            r.0(&mut b);
        }
        b.entries.sort_by(|a, z| a.name.cmp(z.name));
        b.build()
    }

    pub fn get_module(&self, name: &str) -> Option<Arc<dyn PageModule>> {
        self.modules
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.module.clone())
    }

    /// Run every module's `init` once, in dispatch order. The first failure aborts.
    pub fn init_all(
        &self,
        config: Arc<dyn ConfigProvider>,
        root: Option<Arc<RootContainer>>,
    ) -> Result<(), RegistryError> {
        tracing::info!("Phase: init");
        for entry in &self.modules {
            let ctx = ModuleCtx::new(entry.name, config.clone(), root.clone());
            entry
                .module
                .init(&ctx)
                .map_err(|source| RegistryError::Init {
                    module: entry.name,
                    source,
                })?;
            tracing::debug!(module = entry.name, group = entry.group, "module initialized");
        }
        Ok(())
    }
}

/// Collects module registrations. Keys are module **names**; uniqueness enforced at build time.
#[derive(Default)]
pub struct RegistryBuilder {
    entries: Vec<ModuleEntry>,
    names: HashSet<&'static str>,
    errors: Vec<String>,
}

impl RegistryBuilder {
    pub fn register(&mut self, descriptor: ModuleDescriptor, module: Arc<dyn PageModule>) {
        let name = descriptor.name;
        if !self.names.insert(name) {
            self.errors
                .push(format!("Module '{name}' is already registered"));
            return;
        }
        let stages = module.stages();
        if stages.is_empty() {
            self.errors
                .push(format!("Module '{name}' declares no lifecycle stage"));
            return;
        }
        self.entries.push(ModuleEntry {
            name,
            group: descriptor.group,
            ordinal: descriptor.ordinal,
            pages: descriptor.pages,
            stages,
            module,
        });
    }

    /// Validate and order by ordinal. The sort is stable.
    pub fn build(mut self) -> Result<ModuleRegistry, RegistryError> {
        if !self.errors.is_empty() {
            return Err(RegistryError::InvalidRegistryConfiguration {
                errors: self.errors,
            });
        }

        self.entries.sort_by_key(|e| e.ordinal);

        tracing::info!(
            modules = ?self.entries.iter().map(|e| e.name).collect::<Vec<_>>(),
            "Module dispatch order resolved"
        );

        Ok(ModuleRegistry {
            modules: self.entries,
        })
    }
}

/// Structured errors for the module registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("initialization failed for module '{module}'")]
    Init {
        module: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("invalid registry configuration:\n{errors:#?}")]
    InvalidRegistryConfiguration { errors: Vec<String> },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module_ctx::EmptyConfigProvider;
    use crate::request_context::RequestContext;

    struct Noop(&'static [Stage]);

    impl PageModule for Noop {
        fn stages(&self) -> &'static [Stage] {
            self.0
        }

        fn on_stage(&self, _stage: Stage, _ctx: &mut RequestContext) -> anyhow::Result<()> {
            Ok(())
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    struct FailingInit;

    impl PageModule for FailingInit {
        fn stages(&self) -> &'static [Stage] {
            &[Stage::PageLoad]
        }

        fn init(&self, _ctx: &ModuleCtx) -> anyhow::Result<()> {
            anyhow::bail!("missing template directory")
        }

        fn on_stage(&self, _stage: Stage, _ctx: &mut RequestContext) -> anyhow::Result<()> {
            Ok(())
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    const LOAD: &[Stage] = &[Stage::PageLoad];

    #[test]
    fn ordinal_sort_is_stable() {
        let mut b = RegistryBuilder::default();
        b.register(ModuleDescriptor::new("late").ordinal(5), Arc::new(Noop(LOAD)));
        b.register(ModuleDescriptor::new("first"), Arc::new(Noop(LOAD)));
        b.register(ModuleDescriptor::new("second"), Arc::new(Noop(LOAD)));
        b.register(ModuleDescriptor::new("early").ordinal(-1), Arc::new(Noop(LOAD)));

        let reg = b.build().unwrap();
        let order: Vec<_> = reg.modules().iter().map(|m| m.name).collect();
        assert_eq!(order, vec!["early", "first", "second", "late"]);
    }

    #[test]
    fn duplicate_module_reported_in_configuration_errors() {
        let mut b = RegistryBuilder::default();
        b.register(ModuleDescriptor::new("a"), Arc::new(Noop(LOAD)));
        b.register(ModuleDescriptor::new("a"), Arc::new(Noop(LOAD)));

        let err = b.build().unwrap_err();
        match err {
            RegistryError::InvalidRegistryConfiguration { errors } => {
                assert!(
                    errors.iter().any(|e| e.contains("already registered")),
                    "expected duplicate registration error, got {errors:?}"
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn module_without_stages_is_rejected() {
        let mut b = RegistryBuilder::default();
        b.register(ModuleDescriptor::new("idle"), Arc::new(Noop(&[])));
        assert!(matches!(
            b.build(),
            Err(RegistryError::InvalidRegistryConfiguration { .. })
        ));
    }

    #[test]
    fn init_failure_names_the_module() {
        let mut b = RegistryBuilder::default();
        b.register(ModuleDescriptor::new("ok"), Arc::new(Noop(LOAD)));
        b.register(ModuleDescriptor::new("broken").ordinal(1), Arc::new(FailingInit));
        let reg = b.build().unwrap();

        let err = reg.init_all(Arc::new(EmptyConfigProvider), None).unwrap_err();
        match err {
            RegistryError::Init { module, source } => {
                assert_eq!(module, "broken");
                assert!(source.to_string().contains("template"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn lookup_by_name() {
        let mut b = RegistryBuilder::default();
        b.register(ModuleDescriptor::new("a").group("Tests"), Arc::new(Noop(LOAD)));
        let reg = b.build().unwrap();
        assert!(reg.get_module("a").is_some());
        assert!(reg.get_module("b").is_none());
        assert_eq!(reg.modules()[0].group, "Tests");
    }
}
