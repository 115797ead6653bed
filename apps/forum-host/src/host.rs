use std::sync::Arc;

use anyhow::{Context, Result};
use forumkit::{
    BoardSettingsStore, ForumPage, IdentityProviders, LifecyclePage, ModuleDispatcher,
    ModuleRegistry, PageElement, PageRequest, QueryStringUrlBuilder, RequestContext,
    RootContainer, Stage, StageReport, UrlBuilder,
};
use forumkit_bootstrap::{AppConfig, AppConfigProvider, ForumConfig};
use tracing::{debug, info, warn};

/// Process-wide state shared by every request.
pub struct Host {
    root: Arc<RootContainer>,
    dispatcher: ModuleDispatcher,
    forum: ForumConfig,
}

/// What one rendered request produced.
#[derive(Debug)]
pub struct RenderSummary {
    pub request_id: String,
    pub page: ForumPage,
    pub board_id: i64,
    pub board_name: String,
    pub user: Option<String>,
    pub roles: Vec<String>,
    pub elements: Vec<PageElement>,
    pub load_messages: Vec<String>,
    pub page_url: String,
    pub failures: usize,
}

/// Page stand-in that follows the relayed load/unload events.
struct HostPage {
    page: ForumPage,
}

impl LifecyclePage for HostPage {
    fn name(&self) -> &str {
        self.page.as_str()
    }

    fn on_context_stage(&mut self, stage: Stage) {
        debug!(page = %self.page, %stage, "page notified");
    }
}

impl Host {
    /// Build the root container, discover modules and run their one-time init.
    pub fn build(config: &AppConfig) -> Result<Self> {
        info!("Phase: root container");
        let identity = IdentityProviders::with_defaults(config.forum.providers.clone());
        identity
            .validate()
            .context("identity providers are misconfigured")?;

        let urls = QueryStringUrlBuilder::new(
            config.forum.base_url.clone(),
            config.forum.page_param.clone(),
        );
        let root = RootContainer::builder()
            .instance(Arc::new(BoardSettingsStore::default()))
            .instance(Arc::new(identity))
            .instance::<dyn UrlBuilder>(Arc::new(urls))
            .require::<BoardSettingsStore>()
            .require::<IdentityProviders>()
            .build()?;

        let registry = ModuleRegistry::discover_and_build()?;
        let provider = Arc::new(AppConfigProvider::new(config.clone()));
        registry.init_all(provider, Some(root.clone()))?;
        info!(modules = registry.len(), "modules ready");

        Ok(Self {
            root,
            dispatcher: ModuleDispatcher::new(Arc::new(registry)),
            forum: config.forum.clone(),
        })
    }

    pub fn module_names(&self) -> Vec<&'static str> {
        self.dispatcher
            .registry()
            .modules()
            .iter()
            .map(|m| m.name)
            .collect()
    }

    /// Drive one request through the full lifecycle and dispose it.
    pub fn render(&self, request: PageRequest) -> Result<RenderSummary> {
        let mut ctx = RequestContext::builder(self.root.clone())
            .request(request)
            .page_param(self.forum.page_param.clone())
            .default_board_id(self.forum.board_id)
            .modules(self.dispatcher.clone())
            .subscribe(Stage::PageLoad, |ctx| {
                if ctx.user()?.is_none() {
                    ctx.add_load_message("You are browsing as a guest.");
                }
                Ok(())
            })
            .build()?;

        let mut reports: Vec<StageReport> = ctx.take_init_report().into_iter().collect();

        let page = ctx.current_page();
        ctx.attach_page(Box::new(HostPage { page }))?;
        reports.push(ctx.page_pre_load()?);
        reports.push(ctx.page_init()?);
        reports.push(ctx.page_load()?);

        let user = ctx.user()?;
        let roles = ctx.current_roles()?.roles_for(user.as_ref())?;
        let settings = ctx.board_settings()?;

        let mut ids: Vec<_> = ctx
            .query_ids()
            .as_params()
            .into_iter()
            .map(|(k, v)| (k, v.to_string()))
            .collect();
        ids.sort();
        let params: Vec<(&str, &str)> = ids.iter().map(|(k, v)| (*k, v.as_str())).collect();
        let page_url = ctx.url_builder()?.build_url(page, &params);

        let summary = RenderSummary {
            request_id: ctx.id().to_string(),
            page,
            board_id: ctx.board_id(),
            board_name: settings.name.clone(),
            user: user.map(|u| u.name),
            roles,
            elements: ctx.page_elements().elements(),
            load_messages: ctx.load_message().messages(),
            page_url,
            failures: 0,
        };

        reports.push(ctx.page_unload()?);
        reports.push(ctx.dispose()?);

        let failures = reports.iter().map(StageReport::failure_count).sum();
        if failures > 0 {
            warn!(failures, "request finished with lifecycle failures");
        }
        Ok(RenderSummary { failures, ..summary })
    }
}
