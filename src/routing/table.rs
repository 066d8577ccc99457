//! In-memory route table.
//!
//! # Responsibilities
//! - Match request segments against declared patterns
//! - Bind `$name` segments as path parameters
//! - Return the declared middleware, fallback and controller modules
//!
//! # Design Decisions
//! - Immutable after construction
//! - First declared match wins
//! - A trailing `*` matches any remainder, including none
//! - Literal segments are case-sensitive

use std::collections::HashMap;

use crate::cache::ModuleId;
use crate::http::RequestContext;
use crate::routing::{ResolveError, RouteResolution, RouteResolver};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    Rest,
}

/// A parsed path pattern such as `/feats/cookies/get/$name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    source: String,
    segments: Vec<Segment>,
}

impl RoutePattern {
    pub fn parse(pattern: &str) -> Result<Self, ResolveError> {
        let invalid = |reason: &str| ResolveError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = pattern.trim_start_matches('/').trim_end_matches('/');
        let raw: Vec<&str> = if trimmed.is_empty() {
            Vec::new()
        } else {
            trimmed.split('/').collect()
        };

        let mut segments = Vec::with_capacity(raw.len());
        for (i, part) in raw.iter().enumerate() {
            let segment = match *part {
                "*" if i + 1 == raw.len() => Segment::Rest,
                "*" => return Err(invalid("`*` is only allowed as the last segment")),
                "" => return Err(invalid("empty segment")),
                p => match p.strip_prefix('$') {
                    Some("") => return Err(invalid("parameter without a name")),
                    Some(name) => Segment::Param(name.to_string()),
                    None => Segment::Literal(p.to_string()),
                },
            };
            segments.push(segment);
        }

        Ok(Self {
            source: pattern.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Bound parameters if the path matches.
    pub fn matches(&self, path: &[String]) -> Option<HashMap<String, String>> {
        let mut params = HashMap::new();

        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Rest => {
                    params.insert("*".to_string(), path.get(i..).unwrap_or(&[]).join("/"));
                    return Some(params);
                }
                Segment::Literal(literal) => {
                    if path.get(i) != Some(literal) {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let value = path.get(i).filter(|v| !v.is_empty())?;
                    params.insert(name.clone(), value.clone());
                }
            }
        }

        (path.len() == self.segments.len()).then_some(params)
    }
}

/// One declared route.
#[derive(Debug, Clone)]
pub struct RouteEntry {
    pattern: RoutePattern,
    middlewares: Vec<ModuleId>,
    fallbacks: Vec<ModuleId>,
    controller: ModuleId,
}

impl RouteEntry {
    pub fn new(pattern: &str, controller: impl Into<ModuleId>) -> Result<Self, ResolveError> {
        Ok(Self {
            pattern: RoutePattern::parse(pattern)?,
            middlewares: Vec::new(),
            fallbacks: Vec::new(),
            controller: controller.into(),
        })
    }

    pub fn middleware(mut self, id: impl Into<ModuleId>) -> Self {
        self.middlewares.push(id.into());
        self
    }

    pub fn fallback(mut self, id: impl Into<ModuleId>) -> Self {
        self.fallbacks.push(id.into());
        self
    }

    pub fn pattern(&self) -> &RoutePattern {
        &self.pattern
    }

    fn resolve(&self, path: &[String]) -> Option<RouteResolution> {
        let params = self.pattern.matches(path)?;
        Some(RouteResolution {
            middlewares: self.middlewares.clone(),
            fallbacks: self.fallbacks.clone(),
            controller: self.controller.clone(),
            params,
        })
    }
}

/// Ordered list of routes.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<RouteEntry>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(mut self, entry: RouteEntry) -> Self {
        self.routes.push(entry);
        self
    }

    pub fn push(&mut self, entry: RouteEntry) {
        self.routes.push(entry);
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn lookup(&self, path: &[String]) -> Option<RouteResolution> {
        self.routes.iter().find_map(|route| route.resolve(path))
    }
}

impl RouteResolver for RouteTable {
    fn resolve(&self, ctx: &RequestContext) -> Option<RouteResolution> {
        let resolution = self.lookup(ctx.segments());
        if resolution.is_none() {
            tracing::debug!(path = %ctx.pathname(), "No route matched");
        }
        resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(p: &str) -> Vec<String> {
        p.split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_literal_and_param() {
        let pattern = RoutePattern::parse("/feats/cookies/get/$name").unwrap();
        let params = pattern.matches(&path("/feats/cookies/get/session")).unwrap();
        assert_eq!(params["name"], "session");

        assert!(pattern.matches(&path("/feats/cookies/get")).is_none());
        assert!(pattern.matches(&path("/feats/cookies/get/a/b")).is_none());
        assert!(pattern.matches(&path("/Feats/cookies/get/a")).is_none());
    }

    #[test]
    fn test_root_pattern() {
        let pattern = RoutePattern::parse("/").unwrap();
        assert!(pattern.matches(&[]).is_some());
        assert!(pattern.matches(&path("/a")).is_none());
    }

    #[test]
    fn test_rest_segment() {
        let pattern = RoutePattern::parse("/convention/fallback/*").unwrap();
        assert_eq!(pattern.matches(&path("/convention/fallback")).unwrap()["*"], "");
        assert_eq!(
            pattern.matches(&path("/convention/fallback/x/y")).unwrap()["*"],
            "x/y"
        );
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(RoutePattern::parse("/a/*/b").is_err());
        assert!(RoutePattern::parse("/a/$").is_err());
        assert!(RoutePattern::parse("/a//b").is_err());
    }

    #[test]
    fn test_first_match_wins() {
        let table = RouteTable::new()
            .with_route(RouteEntry::new("/items/new", "/items/new.rs").unwrap())
            .with_route(
                RouteEntry::new("/items/$id", "/items/$id.rs")
                    .unwrap()
                    .middleware("/items/_middleware.rs"),
            );

        let fixed = table.lookup(&path("/items/new")).unwrap();
        assert_eq!(fixed.controller, ModuleId::from("/items/new.rs"));
        assert!(fixed.middlewares.is_empty());

        let dynamic = table.lookup(&path("/items/42")).unwrap();
        assert_eq!(dynamic.controller, ModuleId::from("/items/$id.rs"));
        assert_eq!(dynamic.params["id"], "42");
        assert_eq!(dynamic.middlewares, [ModuleId::from("/items/_middleware.rs")]);

        assert!(table.lookup(&path("/other")).is_none());
    }
}
