//! The per-request context: service scope, instance cache, variables and
//! lifecycle delivery for one forum page request.

use std::convert::Infallible;
use std::ops::{Index, IndexMut};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::cache::SingleInstanceCache;
use crate::dispatcher::ModuleDispatcher;
use crate::helpers::{LoadMessage, PageElementRegister};
use crate::lifecycle::{Stage, StageReport, SubscriberFailure, Subscribers};
use crate::page::ForumPage;
use crate::providers::{
    IdentityProviders, MembershipProvider, ProfileHandle, ProfileProvider, ProviderError,
    RoleProvider, UserHandle,
};
use crate::request::{PageRequest, QueryIds};
use crate::scope::{RootContainer, ScopeError, ServiceScope};
use crate::settings::{BoardSettings, BoardSettingsStore, SettingsError};
use crate::url::UrlBuilder;
use crate::variables::VariableRepository;

pub const DEFAULT_PAGE_PARAM: &str = "g";
pub const DEFAULT_BOARD_ID: i64 = 1;

/// Misuse of the context state machine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("page '{existing}' is already attached to this context")]
    PageAlreadyAttached { existing: String },
    #[error("cannot raise {stage}: no page is attached")]
    NoPageAttached { stage: Stage },
    #[error("cannot raise {stage}: the page has already unloaded")]
    PageUnloaded { stage: Stage },
    #[error("context is disposed")]
    Disposed,
    #[error("context was already disposed")]
    AlreadyDisposed,
}

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("service scope error")]
    Scope(#[from] ScopeError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

/// The page or controller object a context is wired to.
///
/// The host forwards the page's raw events through
/// [`RequestContext::page_pre_load`] and friends; the context hands
/// `PageLoad` and `PageUnload` back through [`on_context_stage`](Self::on_context_stage)
/// once its own subscribers and modules have run.
pub trait LifecyclePage {
    fn name(&self) -> &str;

    fn on_context_stage(&mut self, _stage: Stage) {}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Active,
    /// Unload is firing; page events are refused but services still resolve.
    Disposing,
    Disposed,
}

pub struct RequestContextBuilder {
    root: Arc<RootContainer>,
    request: PageRequest,
    page_param: String,
    default_board_id: i64,
    subscribers: Subscribers,
    dispatcher: Option<ModuleDispatcher>,
}

impl RequestContextBuilder {
    pub fn request(mut self, request: PageRequest) -> Self {
        self.request = request;
        self
    }

    pub fn page_param(mut self, name: impl Into<String>) -> Self {
        self.page_param = name.into();
        self
    }

    /// Board used when the request carries no `b` parameter.
    pub fn default_board_id(mut self, board_id: i64) -> Self {
        self.default_board_id = board_id;
        self
    }

    /// Subscribe before construction. This is the only way to observe `Init`.
    pub fn subscribe<F>(mut self, stage: Stage, subscriber: F) -> Self
    where
        F: FnMut(&mut RequestContext) -> anyhow::Result<()> + 'static,
    {
        self.subscribers.push(stage, subscriber);
        self
    }

    /// Modules run after the plain subscribers of each stage.
    pub fn modules(mut self, dispatcher: ModuleDispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Open the scope, seed request variables and fire `Init`.
    ///
    /// Fails only when the root container refuses a new scope.
    pub fn build(self) -> Result<RequestContext, ContextError> {
        let scope = self.root.open_scope()?;
        let id = Uuid::new_v4();
        let page = ForumPage::from_param(self.request.param(&self.page_param));
        let span = tracing::info_span!(
            "forum.request",
            request_id = %id,
            page = %page,
            path = self.request.path()
        );

        let mut ctx = RequestContext {
            id,
            span,
            scope,
            cache: SingleInstanceCache::new(),
            vars: VariableRepository::new(),
            request: self.request,
            page_param: self.page_param,
            default_board_id: self.default_board_id,
            subscribers: self.subscribers,
            dispatcher: self.dispatcher,
            page: None,
            user: None,
            page_unloaded: false,
            state: State::Active,
            init_report: None,
        };
        ctx.seed_variables();

        let report = ctx.fire(Stage::Init);
        ctx.init_report = Some(report);
        Ok(ctx)
    }
}

pub struct RequestContext {
    id: Uuid,
    span: tracing::Span,
    scope: ServiceScope,
    cache: SingleInstanceCache,
    vars: VariableRepository,
    request: PageRequest,
    page_param: String,
    /// Fallback when the `BoardID` variable is missing or unreadable.
    default_board_id: i64,
    subscribers: Subscribers,
    dispatcher: Option<ModuleDispatcher>,
    page: Option<Box<dyn LifecyclePage>>,
    /// `Some(None)` caches an anonymous user.
    user: Option<Option<UserHandle>>,
    page_unloaded: bool,
    state: State,
    init_report: Option<StageReport>,
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("id", &self.id)
            .field("page", &self.current_page())
            .field("attached", &self.page.as_ref().map(|p| p.name().to_string()))
            .field("state", &self.state)
            .field("subscribers", &self.subscribers)
            .finish()
    }
}

impl RequestContext {
    pub fn builder(root: Arc<RootContainer>) -> RequestContextBuilder {
        RequestContextBuilder {
            root,
            request: PageRequest::default(),
            page_param: DEFAULT_PAGE_PARAM.to_string(),
            default_board_id: DEFAULT_BOARD_ID,
            subscribers: Subscribers::new(),
            dispatcher: None,
        }
    }

    fn seed_variables(&mut self) {
        let ids = self.query_ids();
        self.vars
            .set_board_id(ids.board_id.unwrap_or(self.default_board_id));
        self.vars.set_category_id(ids.category_id);
        self.vars.set_forum_id(ids.forum_id);
        self.vars.set_topic_id(ids.topic_id);
        self.vars.set_message_id(ids.message_id);
        self.vars.set_user_id(ids.user_id);
        self.vars.set_is_mobile_device(self.request.is_mobile());
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    pub fn request(&self) -> &PageRequest {
        &self.request
    }

    pub fn is_disposed(&self) -> bool {
        self.state == State::Disposed
    }

    pub fn has_page(&self) -> bool {
        self.page.is_some()
    }

    /// Report of the `Init` stage fired during construction.
    pub fn take_init_report(&mut self) -> Option<StageReport> {
        self.init_report.take()
    }

    fn misuse(&self, err: LifecycleError) -> LifecycleError {
        tracing::error!(request_id = %self.id, error = %err, "request context misuse");
        err
    }

    fn ensure_active(&self) -> Result<(), LifecycleError> {
        match self.state {
            State::Active => Ok(()),
            State::Disposing | State::Disposed => Err(self.misuse(LifecycleError::Disposed)),
        }
    }

    /// Run every subscriber and then every module for `stage`.
    fn fire(&mut self, stage: Stage) -> StageReport {
        let span = self.span.clone();
        let _entered = span.enter();
        let mut report = StageReport::new(stage);

        let mut list = self.subscribers.take(stage);
        for (index, subscriber) in list.iter_mut().enumerate() {
            report.delivered += 1;
            let error = match catch_unwind(AssertUnwindSafe(|| subscriber(&mut *self))) {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => format!("{err:#}"),
                Err(_) => "subscriber panicked".to_string(),
            };
            tracing::warn!(%stage, index, error = %error, "lifecycle subscriber failed; continuing");
            report
                .subscriber_failures
                .push(SubscriberFailure { index, error });
        }
        self.subscribers.restore(stage, list);

        if let Some(dispatcher) = self.dispatcher.clone() {
            let dispatched = dispatcher.dispatch(stage, self);
            report.module_failures = dispatched.failures;
        }

        tracing::debug!(
            %stage,
            delivered = report.delivered,
            failures = report.failure_count(),
            "stage fired"
        );
        report
    }

    /// Add a subscriber after construction. It runs from the next firing of `stage`.
    pub fn subscribe<F>(&mut self, stage: Stage, subscriber: F) -> Result<(), LifecycleError>
    where
        F: FnMut(&mut RequestContext) -> anyhow::Result<()> + 'static,
    {
        self.ensure_active()?;
        self.subscribers.push(stage, subscriber);
        Ok(())
    }

    /// Bind the one page object for this request.
    pub fn attach_page(&mut self, page: Box<dyn LifecyclePage>) -> Result<(), LifecycleError> {
        self.ensure_active()?;
        if let Some(existing) = &self.page {
            let existing = existing.name().to_string();
            return Err(self.misuse(LifecycleError::PageAlreadyAttached { existing }));
        }
        tracing::debug!(request_id = %self.id, page = page.name(), "page attached");
        self.page = Some(page);
        Ok(())
    }

    fn raise_page_stage(&mut self, stage: Stage) -> Result<StageReport, LifecycleError> {
        self.ensure_active()?;
        if self.page.is_none() {
            return Err(self.misuse(LifecycleError::NoPageAttached { stage }));
        }
        if self.page_unloaded {
            return Err(self.misuse(LifecycleError::PageUnloaded { stage }));
        }
        if stage == Stage::PageUnload {
            self.page_unloaded = true;
        }

        let report = self.fire(stage);

        if matches!(stage, Stage::PageLoad | Stage::PageUnload) {
            if let Some(page) = self.page.as_mut() {
                page.on_context_stage(stage);
            }
        }
        Ok(report)
    }

    pub fn page_pre_load(&mut self) -> Result<StageReport, LifecycleError> {
        self.raise_page_stage(Stage::PagePreLoad)
    }

    pub fn page_init(&mut self) -> Result<StageReport, LifecycleError> {
        self.raise_page_stage(Stage::PageInit)
    }

    pub fn page_load(&mut self) -> Result<StageReport, LifecycleError> {
        self.raise_page_stage(Stage::PageLoad)
    }

    /// Fires at most once per context.
    pub fn page_unload(&mut self) -> Result<StageReport, LifecycleError> {
        self.raise_page_stage(Stage::PageUnload)
    }

    /// Fire `Unload`, then release the service scope. Terminal.
    pub fn dispose(&mut self) -> Result<StageReport, LifecycleError> {
        if self.state != State::Active {
            return Err(self.misuse(LifecycleError::AlreadyDisposed));
        }
        self.state = State::Disposing;
        let report = self.fire(Stage::Unload);

        if let Err(err) = self.scope.dispose() {
            tracing::warn!(request_id = %self.id, error = %err, "service scope already released");
        }
        self.subscribers.clear();
        self.cache.clear();
        self.state = State::Disposed;
        tracing::debug!(request_id = %self.id, "request context disposed");
        Ok(report)
    }

    /* ---------------- services ---------------- */

    /// Context-local single instance of `T`, built with `Default` on first use.
    pub fn get<T: Default + Send + Sync + 'static>(&self) -> Arc<T> {
        self.cache.get_instance::<T>()
    }

    pub fn try_get_or_init<T, E, F>(&self, init: F) -> Result<Arc<T>, E>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Result<T, E>,
    {
        self.cache.try_get_or_init(init)
    }

    pub fn set_instance<T: Send + Sync + 'static>(&self, value: T) -> Arc<T> {
        self.cache.set_instance(value)
    }

    /// Full resolution through the request's service scope.
    pub fn resolve<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, ScopeError> {
        self.scope.resolve::<T>()
    }

    /* ---------------- variables ---------------- */

    pub fn vars(&self) -> &VariableRepository {
        &self.vars
    }

    pub fn vars_mut(&mut self) -> &mut VariableRepository {
        &mut self.vars
    }

    pub fn var(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }

    pub fn set_var(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.vars.set(key, value);
    }

    /* ---------------- derived state ---------------- */

    /// Logical page from the page parameter. Unknown values read as `forum`.
    pub fn current_page(&self) -> ForumPage {
        ForumPage::from_param(self.request.param(&self.page_param))
    }

    pub fn query_ids(&self) -> Arc<QueryIds> {
        let request = &self.request;
        match self
            .cache
            .try_get_or_init(|| Ok::<_, Infallible>(QueryIds::from_request(request)))
        {
            Ok(ids) => ids,
            Err(never) => match never {},
        }
    }

    pub fn board_id(&self) -> i64 {
        self.vars.board_id().unwrap_or(self.default_board_id)
    }

    pub fn board_settings(&self) -> Result<Arc<BoardSettings>, ContextError> {
        let store = self.resolve::<BoardSettingsStore>()?;
        Ok(store.get(self.board_id())?)
    }

    /// Replace the current board's settings, or drop them when `None`.
    pub fn set_board_settings(&self, settings: Option<BoardSettings>) -> Result<(), ContextError> {
        let store = self.resolve::<BoardSettingsStore>()?;
        store.set(self.board_id(), settings);
        Ok(())
    }

    fn identity(&self) -> Result<Arc<IdentityProviders>, ContextError> {
        Ok(self.resolve::<IdentityProviders>()?)
    }

    pub fn current_membership(&self) -> Result<Arc<dyn MembershipProvider>, ContextError> {
        Ok(self.identity()?.current_membership()?)
    }

    pub fn current_profile(&self) -> Result<Arc<dyn ProfileProvider>, ContextError> {
        Ok(self.identity()?.current_profile()?)
    }

    pub fn current_roles(&self) -> Result<Arc<dyn RoleProvider>, ContextError> {
        Ok(self.identity()?.current_roles()?)
    }

    /// Current user, asked from the membership provider once per context.
    pub fn user(&mut self) -> Result<Option<UserHandle>, ContextError> {
        if let Some(cached) = &self.user {
            return Ok(cached.clone());
        }
        let membership = self.current_membership()?;
        let user = membership
            .current_user(&self.request)
            .map_err(|source| ProviderError::Provider {
                kind: "membership",
                name: membership.name().to_string(),
                source,
            })?;
        self.user = Some(user.clone());
        Ok(user)
    }

    pub fn set_user(&mut self, user: Option<UserHandle>) {
        self.user = Some(user);
    }

    pub fn profile(&mut self) -> Result<ProfileHandle, ContextError> {
        let user = self.user()?;
        let provider = self.current_profile()?;
        let profile = provider
            .profile(user.as_ref())
            .map_err(|source| ProviderError::Provider {
                kind: "profile",
                name: provider.name().to_string(),
                source,
            })?;
        Ok(profile)
    }

    /* ---------------- helpers ---------------- */

    pub fn load_message(&self) -> Arc<LoadMessage> {
        self.get::<LoadMessage>()
    }

    pub fn add_load_message(&self, message: impl Into<String>) {
        self.load_message().add(message);
    }

    pub fn page_elements(&self) -> Arc<PageElementRegister> {
        self.get::<PageElementRegister>()
    }

    pub fn url_builder(&self) -> Result<Arc<dyn UrlBuilder>, ScopeError> {
        self.resolve::<dyn UrlBuilder>()
    }
}

/// Missing keys read as `Value::Null`.
impl Index<&str> for RequestContext {
    type Output = Value;

    fn index(&self, key: &str) -> &Value {
        &self.vars[key]
    }
}

impl IndexMut<&str> for RequestContext {
    fn index_mut(&mut self, key: &str) -> &mut Value {
        &mut self.vars[key]
    }
}

impl Drop for RequestContext {
    fn drop(&mut self) {
        if self.state == State::Active {
            tracing::debug!(request_id = %self.id, "request context dropped without dispose");
            let _ = self.dispose();
        }
    }
}
