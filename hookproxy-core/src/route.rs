//! The route table: compiles each configured `(method, urlPattern)` into a
//! matcher, and groups webhook stages into ordered pre/post chains per route.
//!
//! `urlPattern` segments may be a literal, a bare named parameter `{name}`
//! (matches one path segment, any characters except `/`), or a named
//! parameter constrained by an inline regex `{name:regex}`. No existing
//! router crate in this workspace's dependency graph supports the latter, so
//! patterns are compiled by hand into a single anchored [`regex::Regex`] per
//! route, in the same spirit as the `${{kind.value}}` interpolation
//! substrings parsed elsewhere in this workspace.

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;

use crate::config::{HookConfiguration, HookConfigurationItem, HookStageType};
use crate::connector::WebhookConnector;

lazy_static! {
    /// Matches a `{name}` or `{name:regex}` path-pattern segment.
    static ref PARAM_RE: Regex = Regex::new(r#"\{(?P<name>[A-Za-z_][A-Za-z0-9_]*)(:(?P<pat>[^}]+))?\}"#).unwrap();
}

/// One `(method, pattern)` route: its compiled matcher and its ordered
/// pre-chain and post-chain of webhook connectors.
pub struct Route {
    pub method: String,
    pub pattern: String,
    matcher: Regex,
    pub pre_chain: Vec<std::sync::Arc<WebhookConnector>>,
    pub post_chain: Vec<std::sync::Arc<WebhookConnector>>,
}

impl Route {
    /// Does `path` match this route's pattern exactly?
    pub fn matches(&self, path: &str) -> bool {
        self.matcher.is_match(path)
    }
}

/// Compile a `urlPattern` into an anchored regex matching whole paths.
/// Named parameters are not captured for later use: routes only need to
/// decide whether a path matches, not to extract segment values.
fn compile_pattern(pattern: &str) -> Regex {
    try_compile_pattern(pattern)
        .unwrap_or_else(|e| panic!("invalid route pattern {pattern:?}: {e}"))
}

/// Same as [`compile_pattern`], but reporting a compile failure (e.g., an
/// invalid inline regex constraint) instead of panicking. Used by the
/// configuration loader to validate a pattern before it ever reaches a
/// running route table.
pub fn try_compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    let mut out = String::from("^");
    let mut last = 0;
    for cap in PARAM_RE.captures_iter(pattern) {
        let m = cap.get(0).unwrap();
        out.push_str(&regex::escape(&pattern[last..m.start()]));
        match cap.name("pat") {
            Some(p) => {
                out.push_str("(?:");
                out.push_str(p.as_str());
                out.push(')');
            }
            None => out.push_str("[^/]+"),
        }
        last = m.end();
    }
    out.push_str(&regex::escape(&pattern[last..]));
    out.push('$');
    Regex::new(&out)
}

/// The full set of routes built from configuration. Immutable once built.
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Build the route table, collapsing webhook stages that share a
    /// `(method, urlPattern)` key into one route, preserving the
    /// configuration order of webhooks within each chain.
    pub fn from_config(config: &HookConfiguration) -> Self {
        let mut order: Vec<(String, String)> = Vec::new();
        let mut pre: HashMap<(String, String), Vec<std::sync::Arc<WebhookConnector>>> =
            HashMap::new();
        let mut post: HashMap<(String, String), Vec<std::sync::Arc<WebhookConnector>>> =
            HashMap::new();

        for item in &config.web_hooks {
            let connector = std::sync::Arc::new(WebhookConnector::new(item));
            for stage in &item.stages {
                let key = (stage.method.to_uppercase(), stage.url_pattern.clone());
                if !pre.contains_key(&key) && !post.contains_key(&key) {
                    order.push(key.clone());
                }
                let chain = match stage.stage_type {
                    HookStageType::Pre => pre.entry(key).or_default(),
                    HookStageType::Post => post.entry(key).or_default(),
                };
                chain.push(connector.clone());
            }
        }

        let routes = order
            .into_iter()
            .map(|key @ (method, pattern)| Route {
                matcher: compile_pattern(&pattern),
                pre_chain: pre.remove(&key).unwrap_or_default(),
                post_chain: post.remove(&key).unwrap_or_default(),
                method,
                pattern,
            })
            .collect();

        Self { routes }
    }

    /// Find the route matching `(method, path)`, if any.
    pub fn find(&self, method: &str, path: &str) -> Option<&Route> {
        self.routes
            .iter()
            .find(|r| r.method.eq_ignore_ascii_case(method) && r.matches(path))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::literal("/container/create", "/container/create", true)]
    #[case::literal_mismatch("/container/create", "/container/other", false)]
    #[case::bare_param("/container/{id}/create", "/container/abc/create", true)]
    #[case::bare_param_no_slash("/container/{id}/create", "/container/a/b/create", false)]
    #[case::regex_param("/container/{id:[a-z0-9-]+}/create", "/container/abc-123/create", true)]
    #[case::regex_param_mismatch("/container/{id:[0-9]+}/create", "/container/abc/create", false)]
    fn test_compile_pattern(#[case] pattern: &str, #[case] path: &str, #[case] expect: bool) {
        let re = compile_pattern(pattern);
        assert_eq!(re.is_match(path), expect);
    }

    fn sample_config() -> HookConfiguration {
        serde_json::from_value(serde_json::json!({
            "listenAddress": "unix:///tmp/hookproxy.sock",
            "webHooks": [
                {
                    "name": "first",
                    "endpoint": "unix:///tmp/first.sock",
                    "stages": [
                        {"method": "POST", "urlPattern": "/container/{id}/create", "type": "pre"}
                    ]
                },
                {
                    "name": "second",
                    "endpoint": "unix:///tmp/second.sock",
                    "stages": [
                        {"method": "POST", "urlPattern": "/container/{id}/create", "type": "pre"},
                        {"method": "POST", "urlPattern": "/container/{id}/create", "type": "post"}
                    ]
                }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_from_config_collapses_and_orders() {
        let cfg = sample_config();
        let table = RouteTable::from_config(&cfg);
        assert_eq!(table.routes.len(), 1);
        let route = &table.routes[0];
        assert_eq!(route.pre_chain.len(), 2);
        assert_eq!(route.pre_chain[0].name(), "first");
        assert_eq!(route.pre_chain[1].name(), "second");
        assert_eq!(route.post_chain.len(), 1);
        assert_eq!(route.post_chain[0].name(), "second");
    }

    #[test]
    fn test_find_no_match_on_unknown_path() {
        let cfg = sample_config();
        let table = RouteTable::from_config(&cfg);
        assert!(table.find("POST", "/not/a/route").is_none());
        assert!(table.find("GET", "/container/abc/create").is_none());
        assert!(table.find("POST", "/container/abc/create").is_some());
    }
}
