//! Identity providers (membership, profile, role) looked up by configured name.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::request::PageRequest;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("no {kind} provider named '{name}' and no default {kind} provider")]
    Unresolvable { kind: &'static str, name: String },
    #[error("{kind} provider '{name}' failed")]
    Provider {
        kind: &'static str,
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserHandle {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default = "default_true")]
    pub is_approved: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileHandle {
    pub display_name: Option<String>,
    pub location: Option<String>,
    pub homepage: Option<String>,
}

pub trait MembershipProvider: Send + Sync {
    fn name(&self) -> &str;
    /// `Ok(None)` means the request is anonymous.
    fn current_user(&self, request: &PageRequest) -> anyhow::Result<Option<UserHandle>>;
}

pub trait ProfileProvider: Send + Sync {
    fn name(&self) -> &str;
    fn profile(&self, user: Option<&UserHandle>) -> anyhow::Result<ProfileHandle>;
}

pub trait RoleProvider: Send + Sync {
    fn name(&self) -> &str;
    fn roles_for(&self, user: Option<&UserHandle>) -> anyhow::Result<Vec<String>>;

    fn is_user_in_role(&self, user: Option<&UserHandle>, role: &str) -> anyhow::Result<bool> {
        Ok(self
            .roles_for(user)?
            .iter()
            .any(|r| r.eq_ignore_ascii_case(role)))
    }
}

/// Named implementations of one provider kind plus a fallback.
pub struct ProviderCatalog<P: ?Sized> {
    kind: &'static str,
    named: HashMap<String, Arc<P>>,
    default: Option<Arc<P>>,
}

impl<P: ?Sized> std::fmt::Debug for ProviderCatalog<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.named.keys().collect();
        names.sort();
        f.debug_struct("ProviderCatalog")
            .field("kind", &self.kind)
            .field("named", &names)
            .field("has_default", &self.default.is_some())
            .finish()
    }
}

impl<P: ?Sized> ProviderCatalog<P> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            named: HashMap::new(),
            default: None,
        }
    }

    pub fn with_default(mut self, provider: Arc<P>) -> Self {
        self.default = Some(provider);
        self
    }

    pub fn register(mut self, name: impl Into<String>, provider: Arc<P>) -> Self {
        self.named.insert(name.into(), provider);
        self
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// The provider registered as `name`, else the default.
    pub fn resolve(&self, name: Option<&str>) -> Result<Arc<P>, ProviderError> {
        if let Some(name) = name {
            if let Some(p) = self.named.get(name) {
                return Ok(p.clone());
            }
            tracing::debug!(kind = self.kind, name, "named provider absent; using default");
        }
        self.default.clone().ok_or_else(|| ProviderError::Unresolvable {
            kind: self.kind,
            name: name.unwrap_or("<default>").to_string(),
        })
    }
}

/// Configured provider names; `None` selects the default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderNames {
    #[serde(default)]
    pub membership: Option<String>,
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// The three catalogs plus the names selected by configuration.
///
/// Registered once in the root container and shared by every request.
#[derive(Debug)]
pub struct IdentityProviders {
    pub membership: ProviderCatalog<dyn MembershipProvider>,
    pub profile: ProviderCatalog<dyn ProfileProvider>,
    pub role: ProviderCatalog<dyn RoleProvider>,
    pub names: ProviderNames,
}

impl IdentityProviders {
    /// Catalogs holding only the built-in anonymous providers.
    pub fn with_defaults(names: ProviderNames) -> Self {
        Self {
            membership: ProviderCatalog::<dyn MembershipProvider>::new("membership")
                .with_default(Arc::new(AnonymousMembership)),
            profile: ProviderCatalog::<dyn ProfileProvider>::new("profile")
                .with_default(Arc::new(EmptyProfile)),
            role: ProviderCatalog::<dyn RoleProvider>::new("role").with_default(Arc::new(GuestRoles)),
            names,
        }
    }

    pub fn current_membership(&self) -> Result<Arc<dyn MembershipProvider>, ProviderError> {
        self.membership.resolve(self.names.membership.as_deref())
    }

    pub fn current_profile(&self) -> Result<Arc<dyn ProfileProvider>, ProviderError> {
        self.profile.resolve(self.names.profile.as_deref())
    }

    pub fn current_roles(&self) -> Result<Arc<dyn RoleProvider>, ProviderError> {
        self.role.resolve(self.names.role.as_deref())
    }

    /// Fail fast at startup when a selected provider cannot be resolved.
    pub fn validate(&self) -> Result<(), ProviderError> {
        self.current_membership()?;
        self.current_profile()?;
        self.current_roles()?;
        Ok(())
    }
}

/// Treats every request as anonymous.
#[derive(Debug, Default)]
pub struct AnonymousMembership;

impl MembershipProvider for AnonymousMembership {
    fn name(&self) -> &str {
        "anonymous"
    }

    fn current_user(&self, _request: &PageRequest) -> anyhow::Result<Option<UserHandle>> {
        Ok(None)
    }
}

#[derive(Debug, Default)]
pub struct EmptyProfile;

impl ProfileProvider for EmptyProfile {
    fn name(&self) -> &str {
        "empty"
    }

    fn profile(&self, user: Option<&UserHandle>) -> anyhow::Result<ProfileHandle> {
        Ok(ProfileHandle {
            display_name: user.map(|u| u.name.clone()),
            ..ProfileHandle::default()
        })
    }
}

/// Anonymous users are guests; signed-in users are registered members.
#[derive(Debug, Default)]
pub struct GuestRoles;

impl RoleProvider for GuestRoles {
    fn name(&self) -> &str {
        "guest"
    }

    fn roles_for(&self, user: Option<&UserHandle>) -> anyhow::Result<Vec<String>> {
        Ok(match user {
            Some(_) => vec!["Registered".into()],
            None => vec!["Guests".into()],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str);

    impl MembershipProvider for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        fn current_user(&self, _request: &PageRequest) -> anyhow::Result<Option<UserHandle>> {
            Ok(Some(UserHandle {
                id: 7,
                name: self.0.to_string(),
                email: None,
                is_approved: true,
            }))
        }
    }

    #[test]
    fn named_provider_wins_over_default() {
        let catalog = ProviderCatalog::<dyn MembershipProvider>::new("membership")
            .with_default(Arc::new(AnonymousMembership))
            .register("ldap", Arc::new(Fixed("ldap")));
        assert_eq!(catalog.resolve(Some("ldap")).unwrap().name(), "ldap");
        assert_eq!(catalog.resolve(Some("missing")).unwrap().name(), "anonymous");
        assert_eq!(catalog.resolve(None).unwrap().name(), "anonymous");
    }

    #[test]
    fn missing_default_is_a_configuration_error() {
        let catalog = ProviderCatalog::<dyn RoleProvider>::new("role");
        let err = catalog.resolve(Some("sql")).err().unwrap();
        assert!(matches!(err, ProviderError::Unresolvable { kind: "role", .. }));
        assert!(err.to_string().contains("'sql'"));
    }

    #[test]
    fn guest_roles_depend_on_sign_in() {
        let roles = GuestRoles;
        assert!(roles.is_user_in_role(None, "guests").unwrap());
        let user = UserHandle {
            id: 1,
            name: "admin".into(),
            email: None,
            is_approved: true,
        };
        assert!(roles.is_user_in_role(Some(&user), "Registered").unwrap());
    }

    #[test]
    fn identity_providers_validate_with_defaults() {
        let providers = IdentityProviders::with_defaults(ProviderNames {
            membership: Some("not-installed".into()),
            ..ProviderNames::default()
        });
        providers.validate().unwrap();
    }
}
