//! Route table: maps request paths to upstream services.
//!
//! A route owns one or more path patterns. `"/api/orders/**"` matches
//! `/api/orders` and everything below it; a pattern without `/**` matches
//! only that exact path. When several routes match, the one with the
//! longest matching prefix wins.
//!
//! The default table models a four-service deployment. It can be replaced
//! wholesale by setting `GATEWAY_ROUTES` to a JSON array:
//!
//! ```json
//! [{"id": "order-service", "paths": ["/api/orders/**"],
//!   "upstream": "http://orders:8082", "auth_required": true,
//!   "fallback": "Order Service"}]
//! ```

use std::collections::HashSet;

use reqwest::Url;
use serde::Deserialize;

use crate::error::{GatewayError, GatewayResult};

const WILDCARD_SUFFIX: &str = "/**";

/// One route as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RouteConfig {
    pub id: String,
    pub paths: Vec<String>,
    pub upstream: String,
    #[serde(default)]
    pub auth_required: bool,
    /// Display name used in the 503 payload when the upstream is unreachable.
    #[serde(default)]
    pub fallback: Option<String>,
}

impl RouteConfig {
    fn new(
        id: &str,
        paths: &[&str],
        upstream: &str,
        auth_required: bool,
        fallback: &str,
    ) -> Self {
        Self {
            id: id.to_string(),
            paths: paths.iter().map(|p| p.to_string()).collect(),
            upstream: upstream.to_string(),
            auth_required,
            fallback: Some(fallback.to_string()),
        }
    }

    /// Built-in routes used when `GATEWAY_ROUTES` is unset.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new(
                "user-auth",
                &["/api/auth/**"],
                "http://localhost:8081",
                false,
                "User Service",
            ),
            Self::new(
                "user-service",
                &["/api/users/**"],
                "http://localhost:8081",
                true,
                "User Service",
            ),
            Self::new(
                "order-service",
                &["/api/orders/**"],
                "http://localhost:8082",
                true,
                "Order Service",
            ),
            Self::new(
                "payment-service",
                &["/api/payments/**"],
                "http://localhost:8083",
                true,
                "Payment Service",
            ),
            Self::new(
                "notification-service",
                &["/api/notifications/**"],
                "http://localhost:8084",
                true,
                "Notification Service",
            ),
        ]
    }

    /// Parse a JSON route list.
    pub fn parse_list(json: &str) -> GatewayResult<Vec<Self>> {
        serde_json::from_str(json)
            .map_err(|e| GatewayError::ConfigError(format!("Invalid GATEWAY_ROUTES: {e}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PathPattern {
    Exact(String),
    /// Stored without the trailing `/**`.
    Prefix(String),
}

impl PathPattern {
    fn parse(raw: &str) -> GatewayResult<Self> {
        if !raw.starts_with('/') {
            return Err(GatewayError::ConfigError(format!(
                "Route path '{raw}' must start with '/'"
            )));
        }
        match raw.strip_suffix(WILDCARD_SUFFIX) {
            Some(prefix) if prefix.contains('*') => Err(GatewayError::ConfigError(format!(
                "Route path '{raw}' may only use a trailing '/**'"
            ))),
            Some(prefix) => Ok(PathPattern::Prefix(prefix.to_string())),
            None if raw.contains('*') => Err(GatewayError::ConfigError(format!(
                "Route path '{raw}' may only use a trailing '/**'"
            ))),
            None => Ok(PathPattern::Exact(raw.to_string())),
        }
    }

    /// Length of the match, or `None` if the path does not match.
    fn matches(&self, path: &str) -> Option<usize> {
        match self {
            PathPattern::Exact(exact) => (path == exact).then_some(exact.len()),
            PathPattern::Prefix(prefix) => {
                let rest = path.strip_prefix(prefix.as_str())?;
                (rest.is_empty() || rest.starts_with('/')).then_some(prefix.len())
            }
        }
    }
}

/// A validated route.
#[derive(Debug, Clone)]
pub struct Route {
    pub id: String,
    pub upstream: Url,
    pub auth_required: bool,
    pub fallback: Option<String>,
    patterns: Vec<PathPattern>,
}

impl Route {
    fn from_config(config: &RouteConfig) -> GatewayResult<Self> {
        if config.id.trim().is_empty() {
            return Err(GatewayError::ConfigError(
                "Route id must not be empty".to_string(),
            ));
        }
        if config.paths.is_empty() {
            return Err(GatewayError::ConfigError(format!(
                "Route '{}' has no paths",
                config.id
            )));
        }

        let upstream = Url::parse(&config.upstream).map_err(|e| {
            GatewayError::ConfigError(format!(
                "Route '{}' has invalid upstream '{}': {e}",
                config.id, config.upstream
            ))
        })?;
        if !matches!(upstream.scheme(), "http" | "https") {
            return Err(GatewayError::ConfigError(format!(
                "Route '{}' upstream must be http or https",
                config.id
            )));
        }

        let patterns = config
            .paths
            .iter()
            .map(|p| PathPattern::parse(p))
            .collect::<GatewayResult<Vec<_>>>()?;

        Ok(Self {
            id: config.id.clone(),
            upstream,
            auth_required: config.auth_required,
            fallback: config.fallback.clone(),
            patterns,
        })
    }

    fn match_len(&self, path: &str) -> Option<usize> {
        self.patterns.iter().filter_map(|p| p.matches(path)).max()
    }
}

#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new(configs: &[RouteConfig]) -> GatewayResult<Self> {
        let mut seen = HashSet::new();
        let mut routes = Vec::with_capacity(configs.len());
        for config in configs {
            if !seen.insert(config.id.as_str()) {
                return Err(GatewayError::ConfigError(format!(
                    "Duplicate route id '{}'",
                    config.id
                )));
            }
            routes.push(Route::from_config(config)?);
        }
        Ok(Self { routes })
    }

    /// Route with the longest matching prefix; the first declared wins ties.
    pub fn resolve(&self, path: &str) -> Option<&Route> {
        let mut best: Option<(usize, &Route)> = None;
        for route in &self.routes {
            if let Some(len) = route.match_len(path)
                && best.is_none_or(|(best_len, _)| len > best_len)
            {
                best = Some((len, route));
            }
        }
        best.map(|(_, route)| route)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    pub fn any_auth_required(&self) -> bool {
        self.routes.iter().any(|r| r.auth_required)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn table() -> RouteTable {
        RouteTable::new(&RouteConfig::defaults()).unwrap()
    }

    #[test]
    fn test_default_routes() {
        let table = table();
        assert_eq!(table.len(), 5);
        assert!(table.any_auth_required());

        let login = table.resolve("/api/auth/login").unwrap();
        assert_eq!(login.id, "user-auth");
        assert!(!login.auth_required);

        let orders = table.resolve("/api/orders/42").unwrap();
        assert_eq!(orders.id, "order-service");
        assert!(orders.auth_required);
        assert_eq!(orders.upstream.as_str(), "http://localhost:8082/");
        assert_eq!(orders.fallback.as_deref(), Some("Order Service"));
    }

    #[test]
    fn test_wildcard_matches_base_path_but_not_siblings() {
        let table = table();
        assert_eq!(table.resolve("/api/orders").unwrap().id, "order-service");
        assert!(table.resolve("/api/ordersx").is_none());
        assert!(table.resolve("/health").is_none());
        assert!(table.resolve("/").is_none());
    }

    #[test]
    fn test_longest_prefix_wins() {
        let configs = vec![
            RouteConfig {
                id: "api".into(),
                paths: vec!["/api/**".into()],
                upstream: "http://localhost:9000".into(),
                auth_required: true,
                fallback: None,
            },
            RouteConfig {
                id: "public".into(),
                paths: vec!["/api/public/**".into(), "/status".into()],
                upstream: "http://localhost:9001".into(),
                auth_required: false,
                fallback: None,
            },
        ];
        let table = RouteTable::new(&configs).unwrap();

        assert_eq!(table.resolve("/api/public/docs").unwrap().id, "public");
        assert_eq!(table.resolve("/api/private").unwrap().id, "api");
        assert_eq!(table.resolve("/status").unwrap().id, "public");
        assert!(table.resolve("/status/deep").is_none());
    }

    #[test]
    fn test_parse_json_routes() {
        let json = r#"[{"id":"orders","paths":["/api/orders/**"],"upstream":"http://orders:8082"}]"#;
        let routes = RouteConfig::parse_list(json).unwrap();

        assert_eq!(routes.len(), 1);
        assert!(!routes[0].auth_required);
        assert!(routes[0].fallback.is_none());

        assert!(RouteConfig::parse_list("{not json").is_err());
    }

    #[test]
    fn test_invalid_routes_rejected() {
        let base = RouteConfig::defaults().remove(0);

        let bad_upstream = RouteConfig {
            upstream: "not a url".into(),
            ..base.clone()
        };
        assert!(RouteTable::new(&[bad_upstream]).is_err());

        let bad_scheme = RouteConfig {
            upstream: "ftp://localhost".into(),
            ..base.clone()
        };
        assert!(RouteTable::new(&[bad_scheme]).is_err());

        let bad_pattern = RouteConfig {
            paths: vec!["/api/*/orders".into()],
            ..base.clone()
        };
        assert!(RouteTable::new(&[bad_pattern]).is_err());

        let relative = RouteConfig {
            paths: vec!["api/orders".into()],
            ..base.clone()
        };
        assert!(RouteTable::new(&[relative]).is_err());

        assert!(RouteTable::new(&[base.clone(), base]).is_err());
    }
}
