use std::collections::HashMap;

use super::Principal;

/// Everything a component may read about the inbound request. Handlers build one
/// per request and pass it down; nothing reads request state from globals.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub principal: Option<Principal>,
    pub request_id: Option<String>,
    pub request_uri: String,
    /// Form body parameters; these win over query parameters of the same name.
    pub post_params: HashMap<String, String>,
    pub query_params: HashMap<String, String>,
}

impl RequestContext {
    pub fn new(request_uri: impl Into<String>) -> Self {
        Self { request_uri: request_uri.into(), ..Default::default() }
    }

    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn with_query(mut self, params: HashMap<String, String>) -> Self {
        self.query_params = params;
        self
    }

    pub fn with_post(mut self, params: HashMap<String, String>) -> Self {
        self.post_params = params;
        self
    }

    pub fn is_logged_in(&self) -> bool {
        self.principal.is_some()
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.post_params
            .get(name)
            .or_else(|| self.query_params.get(name))
            .map(String::as_str)
    }

    pub fn request_parameter(&self, name: &str, default: &str) -> String {
        self.parameter(name).unwrap_or(default).to_string()
    }

    /// The request URI with HTML special characters escaped, safe to echo into markup.
    pub fn request_url(&self) -> String {
        escape_html(&self.request_uri)
    }
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn post_wins_over_query() {
        let ctx = RequestContext::new("/x")
            .with_post(params(&[("postParam", "postValue")]))
            .with_query(params(&[("postParam", "getValue"), ("getParam", "getValue")]));
        assert_eq!(ctx.request_parameter("postParam", "default"), "postValue");
        assert_eq!(ctx.request_parameter("getParam", "default"), "getValue");
        assert_eq!(ctx.request_parameter("invalid", "default"), "default");
        assert!(ctx.parameter("invalid").is_none());
    }

    #[test]
    fn request_url_is_escaped() {
        let ctx = RequestContext::new("https://test.domain?id=<a href='evil'>evil</a>");
        assert_eq!(ctx.request_url(), "https://test.domain?id=&lt;a href='evil'&gt;evil&lt;/a&gt;");
    }
}
