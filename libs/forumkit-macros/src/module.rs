use heck::{ToSnakeCase, ToUpperCamelCase};
use proc_macro2::{Span, TokenStream};
use quote::{format_ident, quote};
use syn::{
    parse::Parse, parse::ParseStream, punctuated::Punctuated, Data, DeriveInput, Expr, Meta,
    Token,
};

use crate::utils::{
    parse_i32_attribute, parse_ident_list_attribute, parse_string_attribute, suggest,
};

/// Page parameter values accepted in `pages = [...]`; mirrors `forumkit::ForumPage`.
const KNOWN_PAGES: &[&str] = &[
    "forum",
    "topics",
    "posts",
    "profile",
    "search",
    "lastposts",
    "postmessage",
    "printtopic",
    "mytopics",
    "members",
    "active",
    "moderate",
    "login",
    "logout",
    "register",
    "rules",
    "info",
    "error",
    "cp_profile",
    "cp_editprofile",
    "cp_message",
    "cp_pm",
    "cp_inbox",
    "admin_admin",
    "admin_boardsettings",
];

/// Configuration for #[module] attribute
pub struct ModuleConfig {
    pub name: String,
    pub group: Option<String>,
    pub ordinal: i32,
    pub pages: Option<Vec<syn::Ident>>,
    pub ctor: Option<Expr>,
}

impl Parse for ModuleConfig {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut name: Option<String> = None;
        let mut group: Option<String> = None;
        let mut ordinal: Option<i32> = None;
        let mut pages: Option<Vec<syn::Ident>> = None;
        let mut ctor: Option<Expr> = None;

        let punctuated: Punctuated<Meta, Token![,]> =
            input.parse_terminated(Meta::parse, Token![,])?;

        for meta in punctuated {
            if let Some(s) = parse_string_attribute("name", &meta)? {
                if name.is_some() {
                    return Err(syn::Error::new_spanned(meta, "duplicate `name` parameter"));
                }
                name = Some(s);
            } else if let Some(s) = parse_string_attribute("group", &meta)? {
                if group.is_some() {
                    return Err(syn::Error::new_spanned(meta, "duplicate `group` parameter"));
                }
                group = Some(s);
            } else if let Some(v) = parse_i32_attribute("ordinal", &meta)? {
                if ordinal.is_some() {
                    return Err(syn::Error::new_spanned(
                        meta,
                        "duplicate `ordinal` parameter",
                    ));
                }
                ordinal = Some(v);
            } else if let Some(list) = parse_ident_list_attribute("pages", &meta)? {
                if pages.is_some() {
                    return Err(syn::Error::new_spanned(meta, "duplicate `pages` parameter"));
                }
                pages = Some(list);
            } else if let Meta::NameValue(nv) = &meta {
                if nv.path.is_ident("ctor") {
                    if ctor.is_some() {
                        return Err(syn::Error::new_spanned(meta, "duplicate `ctor` parameter"));
                    }
                    ctor = Some(nv.value.clone());
                } else {
                    return Err(unknown_parameter(&meta));
                }
            } else {
                return Err(unknown_parameter(&meta));
            }
        }

        let name = name.ok_or_else(|| {
            syn::Error::new(
                Span::call_site(),
                "missing required parameter: name = \"module_name\"",
            )
        })?;
        if name.trim().is_empty() {
            return Err(syn::Error::new(Span::call_site(), "`name` must not be empty"));
        }

        Ok(ModuleConfig {
            name,
            group,
            ordinal: ordinal.unwrap_or(0),
            pages,
            ctor,
        })
    }
}

fn unknown_parameter(meta: &Meta) -> syn::Error {
    syn::Error::new_spanned(
        meta,
        "unknown parameter; expected `name`, `group`, `ordinal`, `pages`, or `ctor`",
    )
}

fn page_filter(pages: &Option<Vec<syn::Ident>>) -> syn::Result<TokenStream> {
    let Some(pages) = pages else {
        return Ok(quote! { ::forumkit::PageFilter::All });
    };

    let mut seen = Vec::new();
    let mut variants = Vec::new();
    for ident in pages {
        let raw = ident.to_string();
        if !KNOWN_PAGES.contains(&raw.as_str()) {
            let msg = match suggest(&raw, KNOWN_PAGES) {
                Some(s) => format!("unknown page `{raw}`; did you mean `{s}`?"),
                None => format!("unknown page `{raw}`"),
            };
            return Err(syn::Error::new_spanned(ident, msg));
        }
        if seen.contains(&raw) {
            return Err(syn::Error::new_spanned(
                ident,
                format!("page `{raw}` listed twice"),
            ));
        }
        let variant = format_ident!("{}", raw.to_upper_camel_case(), span = ident.span());
        variants.push(quote! { ::forumkit::ForumPage::#variant });
        seen.push(raw);
    }

    Ok(quote! { ::forumkit::PageFilter::Only(&[#(#variants),*]) })
}

pub fn expand(config: ModuleConfig, input: DeriveInput) -> syn::Result<TokenStream> {
    if !matches!(input.data, Data::Struct(_)) {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "#[forumkit::module] can only be applied to a struct",
        ));
    }
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "#[forumkit::module] does not support generic modules",
        ));
    }

    let ident = &input.ident;
    let name = &config.name;
    let group = config.group.as_deref().unwrap_or("");
    let ordinal = config.ordinal;
    let pages = page_filter(&config.pages)?;
    let ctor = match &config.ctor {
        Some(expr) => quote! { #expr },
        None => quote! { <#ident as ::core::default::Default>::default() },
    };

    let snake = ident.to_string().to_snake_case();
    let registrator = format_ident!("__forumkit_registrator_{}", snake);
    let require = format_ident!("__forumkit_require_page_module_{}", snake);

    Ok(quote! {
        #input

        impl #ident {
            pub const MODULE_NAME: &'static str = #name;
        }

        #[doc(hidden)]
        #[allow(dead_code)]
        const _: () = {
            fn #require()
            where
                #ident: ::forumkit::PageModule,
            {
            }
        };

        #[doc(hidden)]
        #[allow(non_snake_case)]
        fn #registrator(b: &mut ::forumkit::RegistryBuilder) {
            let module: ::std::sync::Arc<dyn ::forumkit::PageModule> =
                ::std::sync::Arc::new(#ctor);
            b.register(
                ::forumkit::ModuleDescriptor::new(#name)
                    .group(#group)
                    .ordinal(#ordinal)
                    .pages(#pages),
                module,
            );
        }

        ::forumkit::inventory::submit! {
            ::forumkit::registry::Registrator(#registrator)
        }
    })
}
