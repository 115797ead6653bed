//! Swappable URL construction for logical pages.

use crate::page::ForumPage;

pub trait UrlBuilder: Send + Sync {
    /// Link to `page` with extra query parameters, in order.
    fn build_url(&self, page: ForumPage, params: &[(&str, &str)]) -> String;
}

/// `<base>?g=<page>&k=v`, every value percent-encoded.
#[derive(Debug, Clone)]
pub struct QueryStringUrlBuilder {
    base: String,
    page_param: String,
}

impl Default for QueryStringUrlBuilder {
    fn default() -> Self {
        Self::new("", "g")
    }
}

impl QueryStringUrlBuilder {
    pub fn new(base: impl Into<String>, page_param: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            page_param: page_param.into(),
        }
    }
}

impl UrlBuilder for QueryStringUrlBuilder {
    fn build_url(&self, page: ForumPage, params: &[(&str, &str)]) -> String {
        let mut url = format!("{}?{}={}", self.base, self.page_param, page.as_str());
        for (k, v) in params {
            url.push('&');
            url.push_str(&urlencoding::encode(k));
            url.push('=');
            url.push_str(&urlencoding::encode(v));
        }
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_page_link_with_encoded_params() {
        let b = QueryStringUrlBuilder::new("/forum/default.aspx", "g");
        assert_eq!(
            b.build_url(ForumPage::Posts, &[("t", "12"), ("q", "a b&c")]),
            "/forum/default.aspx?g=posts&t=12&q=a%20b%26c"
        );
    }

    #[test]
    fn honours_custom_page_param() {
        let b = QueryStringUrlBuilder::new("", "page");
        assert_eq!(b.build_url(ForumPage::CpMessage, &[]), "?page=cp_message");
    }
}
