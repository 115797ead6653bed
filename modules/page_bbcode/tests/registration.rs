//! Discovery and page-filtered registration of BBCode elements.

use std::sync::Arc;

use forumkit::{
    BoardSettingsStore, ConfigProvider, ForumPage, IdentityProviders, LifecyclePage,
    ModuleDispatcher, ModuleRegistry, PageFilter, PageRequest, RequestContext, RootContainer,
    Stage,
};
use page_bbcode::PageBBCodeRegistration;
use serde_json::json;

struct JsonConfig(serde_json::Value);

impl ConfigProvider for JsonConfig {
    fn get_module_config(&self, module_name: &str) -> Option<&serde_json::Value> {
        self.0.get(module_name)
    }
}

struct Page;

impl LifecyclePage for Page {
    fn name(&self) -> &str {
        "page"
    }
}

fn dispatcher() -> ModuleDispatcher {
    let registry = ModuleRegistry::discover_and_build().expect("registry builds");
    let config = Arc::new(JsonConfig(json!({
        "page_bbcode_registration": {
            "config": {
                "elements": [
                    { "name": "spoiler", "content": "function toggleSpoiler() {}" },
                    { "name": "spoiler_css", "kind": "style", "content": ".spoiler { display: none; }" }
                ]
            }
        }
    })));
    registry.init_all(config, None).expect("init succeeds");
    ModuleDispatcher::new(Arc::new(registry))
}

fn render(query: &str, dispatcher: &ModuleDispatcher) -> Vec<String> {
    let root = RootContainer::builder()
        .instance(Arc::new(BoardSettingsStore::default()))
        .instance(Arc::new(IdentityProviders::with_defaults(Default::default())))
        .build()
        .unwrap();
    let mut ctx = RequestContext::builder(root)
        .request(PageRequest::from_query(query))
        .modules(dispatcher.clone())
        .build()
        .unwrap();
    ctx.attach_page(Box::new(Page)).unwrap();
    ctx.page_pre_load().unwrap();
    let report = ctx.page_init().unwrap();
    assert!(report.is_clean(), "{report:?}");
    ctx.page_load().unwrap();

    let names = ctx
        .page_elements()
        .elements()
        .into_iter()
        .map(|e| e.name)
        .collect();
    ctx.dispose().unwrap();
    names
}

#[test]
fn module_is_discovered_with_its_metadata() {
    let registry = ModuleRegistry::discover_and_build().unwrap();
    let entry = registry
        .modules()
        .iter()
        .find(|m| m.name == PageBBCodeRegistration::MODULE_NAME)
        .expect("discovered");

    assert_eq!(entry.group, "Tiny Gecko");
    assert_eq!(entry.ordinal, 1);
    assert_eq!(entry.stages, &[Stage::PageInit]);
    assert_eq!(
        entry.pages,
        PageFilter::Only(&[
            ForumPage::CpMessage,
            ForumPage::Search,
            ForumPage::Lastposts,
            ForumPage::Posts,
            ForumPage::Profile,
        ])
    );
}

#[test]
fn elements_are_registered_on_post_pages_only() {
    let dispatcher = dispatcher();

    for query in ["g=posts&t=12", "g=cp_message", "g=Search", "g=lastposts", "g=profile&u=2"] {
        assert_eq!(render(query, &dispatcher), ["spoiler", "spoiler_css"], "{query}");
    }
    for query in ["g=forum", "g=topics&f=1", "", "g=no_such_page"] {
        assert!(render(query, &dispatcher).is_empty(), "{query}");
    }
}
