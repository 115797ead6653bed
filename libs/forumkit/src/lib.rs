//! # Forumkit - request context and page module runtime
//!
//! One [`RequestContext`] per forum page request. It owns a [`ServiceScope`]
//! opened from the process-wide [`RootContainer`], a [`SingleInstanceCache`]
//! for cheap per-request helpers, a [`VariableRepository`] of ambient values,
//! and ordered subscriber lists for each lifecycle [`Stage`].
//!
//! Page modules are declared with `#[forumkit::module(...)]`, discovered via
//! inventory and driven by the [`ModuleDispatcher`] at each stage.
//!
//! ```rust,ignore
//! use forumkit::{ForumPage, PageModule, RequestContext, Stage};
//!
//! #[derive(Default)]
//! #[forumkit::module(name = "greeting", group = "Demo", pages = [posts])]
//! pub struct Greeting;
//!
//! impl PageModule for Greeting {
//!     fn stages(&self) -> &'static [Stage] {
//!         &[Stage::PageLoad]
//!     }
//!
//!     fn on_stage(&self, _stage: Stage, ctx: &mut RequestContext) -> anyhow::Result<()> {
//!         ctx.add_load_message("Welcome back");
//!         Ok(())
//!     }
//!
//!     fn as_any(&self) -> &dyn std::any::Any {
//!         self
//!     }
//! }
//! ```

pub use anyhow::Result;

// Re-export inventory for macro-generated code
pub use inventory;

pub mod cache;
pub mod contracts;
pub mod dispatcher;
pub mod helpers;
pub mod lifecycle;
pub mod module_ctx;
pub mod page;
pub mod providers;
pub mod registry;
pub mod request;
pub mod request_context;
pub mod scope;
pub mod settings;
pub mod url;
pub mod variables;

pub use cache::SingleInstanceCache;
pub use contracts::PageModule;
pub use dispatcher::{DispatchReport, ModuleDispatcher, ModuleFailure};
pub use helpers::{ElementKind, LoadMessage, PageElement, PageElementRegister};
pub use lifecycle::{Stage, StageReport, Subscribers};
pub use module_ctx::{module_config_typed, ConfigError, ConfigProvider, EmptyConfigProvider, ModuleCtx};
pub use page::{ForumPage, PageFilter, UnknownPage};
pub use providers::{
    IdentityProviders, MembershipProvider, ProfileHandle, ProfileProvider, ProviderCatalog,
    ProviderError, ProviderNames, RoleProvider, UserHandle,
};
pub use registry::{ModuleDescriptor, ModuleEntry, ModuleRegistry, RegistryBuilder, RegistryError};
pub use request::{PageRequest, QueryIds};
pub use request_context::{
    ContextError, LifecycleError, LifecyclePage, RequestContext, RequestContextBuilder,
};
pub use scope::{Lifetime, RootContainer, RootContainerBuilder, ScopeError, ServiceScope};
pub use settings::{BoardSettings, BoardSettingsLoader, BoardSettingsStore, SettingsError};
pub use crate::url::{QueryStringUrlBuilder, UrlBuilder};
pub use variables::VariableRepository;

// Re-export the attribute macro from the proc-macro crate
pub use forumkit_macros::module;
