//! Attribute macros for forumkit page modules.

use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

mod module;
mod utils;

/// Declare a page module and register it for inventory discovery.
///
/// ```rust,ignore
/// #[derive(Default)]
/// #[forumkit::module(
///     name = "page_bbcode_registration",
///     group = "Tiny Gecko",
///     ordinal = 1,
///     pages = [cp_message, search, lastposts, posts, profile]
/// )]
/// pub struct PageBBCodeRegistration { /* ... */ }
/// ```
///
/// * `name` (required): unique module name, also the key of its config section.
/// * `group`: author or vendor tag.
/// * `ordinal`: dispatch priority, lower first. Defaults to 0.
/// * `pages`: page parameter values the module applies to. Omitted means every page.
/// * `ctor`: expression building the module. Defaults to `Default::default()`.
///
/// The type must implement `forumkit::PageModule`; this is checked at compile time.
#[proc_macro_attribute]
pub fn module(attr: TokenStream, item: TokenStream) -> TokenStream {
    let config = parse_macro_input!(attr as module::ModuleConfig);
    let input = parse_macro_input!(item as DeriveInput);
    module::expand(config, input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
