use std::sync::Arc;

use arc_swap::ArcSwapOption;
use forumkit::{ModuleCtx, PageModule, RequestContext, Stage};
use tracing::{debug, info};

use crate::config::PageBBCodeConfig;

/// Registers the custom BBCode script and style elements on pages that
/// render or edit posts.
#[forumkit::module(
    name = "page_bbcode_registration",
    group = "Tiny Gecko",
    ordinal = 1,
    pages = [cp_message, search, lastposts, posts, profile]
)]
pub struct PageBBCodeRegistration {
    // Set once by init, read by every request.
    config: ArcSwapOption<PageBBCodeConfig>,
}

impl Default for PageBBCodeRegistration {
    fn default() -> Self {
        Self {
            config: ArcSwapOption::from(None),
        }
    }
}

impl PageBBCodeRegistration {
    pub fn with_config(config: PageBBCodeConfig) -> Self {
        Self {
            config: ArcSwapOption::from(Some(Arc::new(config))),
        }
    }
}

impl PageModule for PageBBCodeRegistration {
    fn stages(&self) -> &'static [Stage] {
        &[Stage::PageInit]
    }

    fn init(&self, ctx: &ModuleCtx) -> anyhow::Result<()> {
        let cfg: PageBBCodeConfig = ctx.config()?;
        cfg.validate()?;
        info!(
            elements = cfg.elements.len(),
            "Initializing {}",
            ctx.module_name()
        );
        self.config.store(Some(Arc::new(cfg)));
        Ok(())
    }

    fn on_stage(&self, _stage: Stage, ctx: &mut RequestContext) -> anyhow::Result<()> {
        let cfg = self
            .config
            .load_full()
            .ok_or_else(|| anyhow::anyhow!("{} not initialized", Self::MODULE_NAME))?;

        let settings = ctx.board_settings()?;
        if !settings.allow_bbcode {
            debug!(board_id = settings.board_id, "BBCode disabled for board");
            return Ok(());
        }

        let register = ctx.page_elements();
        for element in cfg.enabled() {
            if !register.register(element.name.as_str(), element.kind, element.content.as_str()) {
                debug!(name = %element.name, "page element already registered");
            }
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BBCodeElement;
    use forumkit::{
        BoardSettings, BoardSettingsStore, ElementKind, EmptyConfigProvider, ConfigProvider,
        IdentityProviders, PageRequest, RootContainer,
    };
    use serde_json::json;

    struct JsonConfig(serde_json::Value);

    impl ConfigProvider for JsonConfig {
        fn get_module_config(&self, module_name: &str) -> Option<&serde_json::Value> {
            self.0.get(module_name)
        }
    }

    fn root() -> Arc<RootContainer> {
        RootContainer::builder()
            .instance(Arc::new(BoardSettingsStore::default()))
            .instance(Arc::new(IdentityProviders::with_defaults(Default::default())))
            .build()
            .unwrap()
    }

    fn element(name: &str, kind: ElementKind, enabled: bool) -> BBCodeElement {
        BBCodeElement {
            name: name.into(),
            kind,
            content: format!("/* {name} */"),
            enabled,
        }
    }

    #[test]
    fn init_reads_module_config() {
        let provider = Arc::new(JsonConfig(json!({
            "page_bbcode_registration": {
                "config": {
                    "elements": [
                        { "name": "spoiler", "content": "toggle()" },
                        { "name": "spoiler_css", "kind": "style", "content": ".s{}" }
                    ]
                }
            }
        })));
        let module = PageBBCodeRegistration::default();
        module
            .init(&ModuleCtx::new(
                PageBBCodeRegistration::MODULE_NAME,
                provider,
                None,
            ))
            .unwrap();

        let cfg = module.config.load_full().unwrap();
        assert_eq!(cfg.elements.len(), 2);
        assert_eq!(cfg.elements[0].kind, ElementKind::Script);
        assert_eq!(cfg.elements[1].kind, ElementKind::Style);
    }

    #[test]
    fn init_rejects_blank_names() {
        let provider = Arc::new(JsonConfig(json!({
            "page_bbcode_registration": { "config": { "elements": [ { "name": " ", "content": "" } ] } }
        })));
        let module = PageBBCodeRegistration::default();
        let ctx = ModuleCtx::new(PageBBCodeRegistration::MODULE_NAME, provider, None);
        assert!(module.init(&ctx).is_err());
    }

    #[test]
    fn missing_config_means_no_elements() {
        let module = PageBBCodeRegistration::default();
        let ctx = ModuleCtx::new(
            PageBBCodeRegistration::MODULE_NAME,
            Arc::new(EmptyConfigProvider),
            None,
        );
        module.init(&ctx).unwrap();

        let mut rc = RequestContext::builder(root()).build().unwrap();
        module.on_stage(Stage::PageInit, &mut rc).unwrap();
        assert!(rc.page_elements().is_empty());
    }

    #[test]
    fn registers_enabled_elements_once() {
        let module = PageBBCodeRegistration::with_config(PageBBCodeConfig {
            elements: vec![
                element("spoiler", ElementKind::Script, true),
                element("legacy", ElementKind::Script, false),
                element("quote_css", ElementKind::Style, true),
            ],
        });

        let mut rc = RequestContext::builder(root())
            .request(PageRequest::from_query("g=posts&t=3"))
            .build()
            .unwrap();
        module.on_stage(Stage::PageInit, &mut rc).unwrap();
        module.on_stage(Stage::PageInit, &mut rc).unwrap();

        let names: Vec<_> = rc.page_elements().elements().into_iter().map(|e| e.name).collect();
        assert_eq!(names, ["spoiler", "quote_css"]);
    }

    #[test]
    fn board_without_bbcode_gets_nothing() {
        let module = PageBBCodeRegistration::with_config(PageBBCodeConfig {
            elements: vec![element("spoiler", ElementKind::Script, true)],
        });

        let mut rc = RequestContext::builder(root()).build().unwrap();
        rc.set_board_settings(Some(BoardSettings {
            allow_bbcode: false,
            ..BoardSettings::default()
        }))
        .unwrap();
        module.on_stage(Stage::PageInit, &mut rc).unwrap();
        assert!(rc.page_elements().is_empty());
    }

    #[test]
    fn uninitialized_module_reports_an_error() {
        let module = PageBBCodeRegistration::default();
        let mut rc = RequestContext::builder(root()).build().unwrap();
        let err = module.on_stage(Stage::PageInit, &mut rc).unwrap_err();
        assert!(err.to_string().contains("not initialized"));
    }
}
