//! Logical page identifiers and the page-applicability filter used by modules.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Closed set of logical forum pages addressed by the `g` request parameter.
///
/// Variant names are the UpperCamelCase form of the parameter value
/// (`cp_message` → `CpMessage`); `#[forumkit::module(pages = [...])]` relies on it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForumPage {
    #[default]
    Forum,
    Topics,
    Posts,
    Profile,
    Search,
    Lastposts,
    Postmessage,
    Printtopic,
    Mytopics,
    Members,
    Active,
    Moderate,
    Login,
    Logout,
    Register,
    Rules,
    Info,
    Error,
    CpProfile,
    CpEditprofile,
    CpMessage,
    CpPm,
    CpInbox,
    AdminAdmin,
    AdminBoardsettings,
}

impl ForumPage {
    pub const ALL: &'static [ForumPage] = &[
        ForumPage::Forum,
        ForumPage::Topics,
        ForumPage::Posts,
        ForumPage::Profile,
        ForumPage::Search,
        ForumPage::Lastposts,
        ForumPage::Postmessage,
        ForumPage::Printtopic,
        ForumPage::Mytopics,
        ForumPage::Members,
        ForumPage::Active,
        ForumPage::Moderate,
        ForumPage::Login,
        ForumPage::Logout,
        ForumPage::Register,
        ForumPage::Rules,
        ForumPage::Info,
        ForumPage::Error,
        ForumPage::CpProfile,
        ForumPage::CpEditprofile,
        ForumPage::CpMessage,
        ForumPage::CpPm,
        ForumPage::CpInbox,
        ForumPage::AdminAdmin,
        ForumPage::AdminBoardsettings,
    ];

    /// Value of the page parameter that selects this page.
    pub fn as_str(self) -> &'static str {
        match self {
            ForumPage::Forum => "forum",
            ForumPage::Topics => "topics",
            ForumPage::Posts => "posts",
            ForumPage::Profile => "profile",
            ForumPage::Search => "search",
            ForumPage::Lastposts => "lastposts",
            ForumPage::Postmessage => "postmessage",
            ForumPage::Printtopic => "printtopic",
            ForumPage::Mytopics => "mytopics",
            ForumPage::Members => "members",
            ForumPage::Active => "active",
            ForumPage::Moderate => "moderate",
            ForumPage::Login => "login",
            ForumPage::Logout => "logout",
            ForumPage::Register => "register",
            ForumPage::Rules => "rules",
            ForumPage::Info => "info",
            ForumPage::Error => "error",
            ForumPage::CpProfile => "cp_profile",
            ForumPage::CpEditprofile => "cp_editprofile",
            ForumPage::CpMessage => "cp_message",
            ForumPage::CpPm => "cp_pm",
            ForumPage::CpInbox => "cp_inbox",
            ForumPage::AdminAdmin => "admin_admin",
            ForumPage::AdminBoardsettings => "admin_boardsettings",
        }
    }

    /// Soft-failing resolution of the raw page parameter.
    ///
    /// Missing, empty and unrecognised values all resolve to [`ForumPage::Forum`],
    /// so a malformed link renders the board index instead of an error page.
    /// The caller cannot tell an invalid value apart from an explicit `forum`.
    pub fn from_param(raw: Option<&str>) -> ForumPage {
        match raw {
            None | Some("") => ForumPage::default(),
            Some(value) => value.parse().unwrap_or_default(),
        }
    }
}

impl fmt::Display for ForumPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown forum page '{0}'")]
pub struct UnknownPage(pub String);

impl FromStr for ForumPage {
    type Err = UnknownPage;

    /// Case-insensitive match against [`ForumPage::as_str`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ForumPage::ALL
            .iter()
            .copied()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownPage(s.to_string()))
    }
}

/// Which logical pages a module wants to be invoked on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PageFilter {
    #[default]
    All,
    Only(&'static [ForumPage]),
}

impl PageFilter {
    pub fn matches(&self, page: ForumPage) -> bool {
        match self {
            PageFilter::All => true,
            PageFilter::Only(pages) => pages.contains(&page),
        }
    }
}
