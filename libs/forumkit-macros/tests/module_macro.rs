//! Tests for the #[module] attribute through inventory discovery

use std::sync::Arc;

use forumkit::{
    module, ForumPage, ModuleRegistry, PageFilter, PageModule, RequestContext, Stage,
};

// ---------- Test modules (must be at module scope for `inventory`) ----------

#[derive(Default)]
#[module(name = "basic")]
struct BasicModule;

impl PageModule for BasicModule {
    fn stages(&self) -> &'static [Stage] {
        &[Stage::PageLoad]
    }

    fn on_stage(&self, _stage: Stage, _ctx: &mut RequestContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[derive(Default)]
#[module(
    name = "page_scoped",
    group = "Tiny Gecko",
    ordinal = -3,
    pages = [cp_message, posts]
)]
struct PageScopedModule;

impl PageModule for PageScopedModule {
    fn stages(&self) -> &'static [Stage] {
        &[Stage::PageInit]
    }

    fn on_stage(&self, _stage: Stage, _ctx: &mut RequestContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

struct Configured {
    greeting: &'static str,
}

#[module(name = "custom_ctor", ordinal = 10, ctor = CustomCtor(Configured { greeting: "hi" }))]
struct CustomCtor(Configured);

impl PageModule for CustomCtor {
    fn stages(&self) -> &'static [Stage] {
        &[Stage::Unload]
    }

    fn on_stage(&self, _stage: Stage, _ctx: &mut RequestContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

// ---------- Tests ----------

#[test]
fn module_name_constant_is_generated() {
    assert_eq!(BasicModule::MODULE_NAME, "basic");
    assert_eq!(PageScopedModule::MODULE_NAME, "page_scoped");
}

#[test]
fn discovered_modules_are_ordered_by_ordinal() {
    let registry = ModuleRegistry::discover_and_build().expect("registry builds");
    let names: Vec<_> = registry.modules().iter().map(|m| m.name).collect();
    assert_eq!(names, ["page_scoped", "basic", "custom_ctor"]);
}

#[test]
fn metadata_is_carried_into_the_entry() {
    let registry = ModuleRegistry::discover_and_build().expect("registry builds");
    let entry = &registry.modules()[0];
    assert_eq!(entry.group, "Tiny Gecko");
    assert_eq!(entry.ordinal, -3);
    assert_eq!(entry.stages, &[Stage::PageInit]);
    assert_eq!(
        entry.pages,
        PageFilter::Only(&[ForumPage::CpMessage, ForumPage::Posts])
    );

    let basic = &registry.modules()[1];
    assert_eq!(basic.pages, PageFilter::All);
    assert_eq!(basic.group, "");
}

#[test]
fn ctor_expression_builds_the_instance() {
    let registry = ModuleRegistry::discover_and_build().expect("registry builds");
    let module: Arc<dyn PageModule> = registry.get_module("custom_ctor").expect("present");
    let custom = module
        .as_any()
        .downcast_ref::<CustomCtor>()
        .expect("custom_ctor downcasts");
    assert_eq!(custom.0.greeting, "hi");
}
