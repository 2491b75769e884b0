//! Method + path-pattern routing.
//!
//! A pattern is a `/`-separated path whose segments are either literals or
//! named parameters written with a leading `:` (for example
//! `/session/:sessionId/element/:id/click`). Matching is positional: the
//! request path must have the same number of segments, every literal must be
//! equal, and every parameter captures one non-empty segment.
//!
//! Routes are tried in registration order and the first match wins, so the
//! table order is authoritative when two patterns could both match.

use std::collections::HashMap;

use crate::http::Method;

/// Prefix marking a named parameter segment in a pattern.
pub const PARAM_MARKER: char = ':';

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A parsed path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Parses a pattern such as `/session/:sessionId/url`.
    pub fn parse(pattern: &str) -> Self {
        let segments = pattern
            .split('/')
            .map(|segment| match segment.strip_prefix(PARAM_MARKER) {
                Some(name) if !name.is_empty() => Segment::Param(name.to_string()),
                _ => Segment::Literal(segment.to_string()),
            })
            .collect();
        Self {
            raw: pattern.to_string(),
            segments,
        }
    }

    /// The pattern text as registered.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Matches `path` against this pattern, capturing parameters.
    pub fn matches(&self, path: &str) -> Option<PathParams> {
        let parts: Vec<&str> = path.split('/').collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = PathParams::default();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(_) if part.is_empty() => return None,
                Segment::Param(name) => {
                    params.0.insert(name.clone(), part.to_string());
                }
            }
        }
        Some(params)
    }
}

/// Parameters captured from the request path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams(HashMap<String, String>);

impl PathParams {
    /// Returns the captured value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

/// One registered binding.
#[derive(Debug, Clone)]
pub struct Route<H> {
    pub method: Method,
    pub pattern: PathPattern,
    pub handler: H,
}

/// Result of a successful lookup.
#[derive(Debug)]
pub struct RouteMatch<'a, H> {
    pub pattern: &'a PathPattern,
    pub handler: &'a H,
    pub params: PathParams,
}

/// An ordered table of `(method, pattern) -> handler` bindings.
#[derive(Debug, Clone)]
pub struct Router<H> {
    routes: Vec<Route<H>>,
}

impl<H> Default for Router<H> {
    fn default() -> Self {
        Self { routes: Vec::new() }
    }
}

impl<H> Router<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a route; earlier routes take precedence.
    pub fn add(&mut self, method: Method, pattern: &str, handler: H) {
        self.routes.push(Route {
            method,
            pattern: PathPattern::parse(pattern),
            handler,
        });
    }

    /// Builder form of [`add`](Self::add).
    pub fn route(mut self, method: Method, pattern: &str, handler: H) -> Self {
        self.add(method, pattern, handler);
        self
    }

    /// Finds the first route matching `method` and `path`.
    pub fn resolve(&self, method: Method, path: &str) -> Option<RouteMatch<'_, H>> {
        self.routes
            .iter()
            .filter(|route| route.method == method)
            .find_map(|route| {
                route.pattern.matches(path).map(|params| RouteMatch {
                    pattern: &route.pattern,
                    handler: &route.handler,
                    params,
                })
            })
    }

    #[cfg(test)]
    pub(crate) fn routes(&self) -> impl Iterator<Item = &Route<H>> {
        self.routes.iter()
    }
}
