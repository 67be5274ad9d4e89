//! Route matching for the resource-server middleware (`spec.md` §4.G step 1): literal
//! path segments plus `[param]` templates, matched against `(method, path)`.

use regex::Regex;
use x402_types::PaymentRequirements;

#[derive(Debug, Clone)]
pub struct RouteConfig {
    pub method: axum::http::Method,
    /// e.g. `/reports/[id]/download`.
    pub path_template: String,
    pub accepts: Vec<PaymentRequirements>,
    /// `upto` sessions: track automatically after a successful verify (`spec.md` §4.G
    /// step 5). Ignored for `exact` routes.
    pub auto_track: bool,
    /// `exact` routes: settle automatically after the handler runs (`spec.md` §4.G step
    /// 7). Ignored for `upto` routes, which never settle inline.
    pub auto_settle: bool,
    matcher: Regex,
}

impl RouteConfig {
    pub fn new(method: axum::http::Method, path_template: impl Into<String>, accepts: Vec<PaymentRequirements>) -> Self {
        let path_template = path_template.into();
        let matcher = compile_template(&path_template);
        Self { method, path_template, accepts, auto_track: true, auto_settle: true, matcher }
    }

    pub fn with_auto_track(mut self, auto_track: bool) -> Self {
        self.auto_track = auto_track;
        self
    }

    pub fn with_auto_settle(mut self, auto_settle: bool) -> Self {
        self.auto_settle = auto_settle;
        self
    }

    pub fn matches(&self, method: &axum::http::Method, path: &str) -> bool {
        &self.method == method && self.matcher.is_match(path)
    }
}

/// Compiles a `[param]`-templated path into an anchored regex. `[param]` matches one
/// non-`/` path segment; everything else is matched literally.
fn compile_template(template: &str) -> Regex {
    let mut pattern = String::from("^");
    for segment in template.split('/') {
        if segment.is_empty() {
            continue;
        }
        pattern.push('/');
        if segment.starts_with('[') && segment.ends_with(']') {
            pattern.push_str("[^/]+");
        } else {
            pattern.push_str(&regex::escape(segment));
        }
    }
    if pattern == "^" {
        pattern.push('/');
    }
    pattern.push('$');
    Regex::new(&pattern).expect("path template compiles to a valid regex")
}

#[derive(Default)]
pub struct RouteTable {
    routes: Vec<RouteConfig>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(mut self, route: RouteConfig) -> Self {
        self.routes.push(route);
        self
    }

    pub fn find(&self, method: &axum::http::Method, path: &str) -> Option<&RouteConfig> {
        self.routes.iter().find(|route| route.matches(method, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_literal_path() {
        let route = RouteConfig::new(axum::http::Method::GET, "/reports/download", vec![]);
        assert!(route.matches(&axum::http::Method::GET, "/reports/download"));
        assert!(!route.matches(&axum::http::Method::POST, "/reports/download"));
    }

    #[test]
    fn matches_param_template() {
        let route = RouteConfig::new(axum::http::Method::GET, "/reports/[id]/download", vec![]);
        assert!(route.matches(&axum::http::Method::GET, "/reports/42/download"));
        assert!(!route.matches(&axum::http::Method::GET, "/reports/42/download/extra"));
    }

    #[test]
    fn route_table_finds_first_match() {
        let table = RouteTable::new()
            .with_route(RouteConfig::new(axum::http::Method::GET, "/a", vec![]))
            .with_route(RouteConfig::new(axum::http::Method::GET, "/b", vec![]));
        assert!(table.find(&axum::http::Method::GET, "/b").is_some());
        assert!(table.find(&axum::http::Method::GET, "/c").is_none());
    }
}
