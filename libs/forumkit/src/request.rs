//! Request data the context reads: query parameters and a few headers.

use std::collections::HashMap;

use http::header::USER_AGENT;

/// The slice of an incoming request a context needs.
#[derive(Debug, Clone, Default)]
pub struct PageRequest {
    path: String,
    query: Vec<(String, String)>,
    user_agent: Option<String>,
}

impl PageRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Parse a raw query string, with or without the leading `?`.
    pub fn from_query(query: &str) -> Self {
        Self::new("/").with_query(query)
    }

    pub fn from_uri(uri: &http::Uri) -> Self {
        let req = Self::new(uri.path());
        match uri.query() {
            Some(q) => req.with_query(q),
            None => req,
        }
    }

    pub fn from_http<B>(req: &http::Request<B>) -> Self {
        let mut out = Self::from_uri(req.uri());
        out.user_agent = req
            .headers()
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        out
    }

    pub fn with_query(mut self, query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        self.query = ::url::form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// First value of `name`. Parameter names match case-insensitively.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
        self.query.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    pub fn is_mobile(&self) -> bool {
        const MARKERS: &[&str] = &["mobile", "android", "iphone", "ipad", "opera mini"];
        self.user_agent
            .as_deref()
            .map(|ua| {
                let ua = ua.to_ascii_lowercase();
                MARKERS.iter().any(|m| ua.contains(m))
            })
            .unwrap_or(false)
    }
}

/// Entity ids carried in the query string (`b`, `c`, `f`, `t`, `m`, `u`).
///
/// Parsed once per context and kept in its single-instance cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryIds {
    pub board_id: Option<i64>,
    pub category_id: Option<i64>,
    pub forum_id: Option<i64>,
    pub topic_id: Option<i64>,
    pub message_id: Option<i64>,
    pub user_id: Option<i64>,
}

impl QueryIds {
    pub fn from_request(req: &PageRequest) -> Self {
        let id = |name: &str| req.param(name).and_then(|v| v.trim().parse::<i64>().ok());
        Self {
            board_id: id("b"),
            category_id: id("c"),
            forum_id: id("f"),
            topic_id: id("t"),
            message_id: id("m"),
            user_id: id("u"),
        }
    }

    /// Non-empty ids keyed by their query parameter name.
    pub fn as_params(&self) -> HashMap<&'static str, i64> {
        [
            ("b", self.board_id),
            ("c", self.category_id),
            ("f", self.forum_id),
            ("t", self.topic_id),
            ("m", self.message_id),
            ("u", self.user_id),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k, v)))
        .collect()
    }
}
