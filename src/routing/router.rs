//! The route table (component B): stores routes, resolves `(method,
//! path)` to a handler chain, and tracks the per-path allowed-method set
//! needed for a correct 405 `Allow` header.
//!
//! Generalizes a flat `Vec<Route>` + linear scan (kept alive below as
//! `MethodTable`'s `dynamic_first` list, a short always-scanned fallback)
//! into a method-keyed table with a literal-first-segment index.

use std::collections::HashMap;
use std::sync::Arc;

use crate::method::Method;
use crate::middleware::{HandlerResult, Middleware, Next, Pipeline};
use crate::routing::matcher::{CompiledPattern, PatternError};

/// A registered route: its compiled pattern plus the route-local
/// middleware chain (handlers included, as the final element).
#[derive(Clone)]
pub struct Route {
    pub method: Method,
    pub pattern: CompiledPattern,
    pub handlers: Vec<Arc<dyn Middleware>>,
    /// Monotonic registration index, used to break ties when more than
    /// one pattern could match the same path: first registered, first
    /// matched.
    pub order: usize,
}

/// Failure from [`Router::register`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    Conflict { method: Method, pattern: String },
    Pattern(PatternError),
}

impl std::fmt::Display for RouterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouterError::Conflict { method, pattern } => {
                write!(f, "route already registered: {method} {pattern}")
            }
            RouterError::Pattern(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for RouterError {}

#[derive(Default)]
struct MethodTable {
    routes: Vec<Route>,
    /// first-literal-segment -> indices into `routes`, in ascending
    /// (= registration) order.
    literal_index: HashMap<String, Vec<usize>>,
    /// routes whose first segment is dynamic (named/optional/regex/
    /// wildcard); always scanned linearly, a documented fallback for the
    /// (expected-short) dynamic-first-segment list.
    dynamic_first: Vec<usize>,
}

impl MethodTable {
    /// `literal_index` is keyed by the pattern's first literal segment
    /// case-folded the same way `candidates` folds the incoming path's
    /// first segment, so the two agree under `case_sensitive: false`
    /// (the router default) instead of only the dynamic fallback and
    /// `CompiledPattern::matches`'s own case-insensitive compare ever
    /// seeing such a route.
    fn push(&mut self, route: Route, case_sensitive: bool) {
        let index = self.routes.len();
        match route.pattern.first_literal() {
            Some(lit) => {
                let key = index_key(lit, case_sensitive);
                self.literal_index.entry(key).or_default().push(index);
            }
            None => self.dynamic_first.push(index),
        }
        self.routes.push(route);
    }

    /// Candidate route indices for `path`, in registration order, without
    /// requiring every route to be tried: the literal bucket keyed by
    /// `path`'s own first segment, merged with the always-scanned dynamic
    /// bucket.
    fn candidates(&self, path: &str, case_sensitive: bool) -> Vec<usize> {
        let first_segment = path.trim_matches('/').split('/').next().unwrap_or("");
        let key = index_key(first_segment, case_sensitive);
        let mut candidates: Vec<usize> = self.literal_index.get(&key).cloned().unwrap_or_default();
        candidates.extend(self.dynamic_first.iter().copied());
        candidates.sort_unstable();
        candidates
    }

    fn resolve(&self, path: &str, case_sensitive: bool) -> Option<(&Route, HashMap<String, String>)> {
        for index in self.candidates(path, case_sensitive) {
            let route = &self.routes[index];
            if let Some(params) = route.pattern.matches(path) {
                return Some((route, params));
            }
        }
        None
    }
}

/// Case-folds `segment` for the literal-index key when routing is
/// case-insensitive, so registration-time and lookup-time keys agree.
fn index_key(segment: &str, case_sensitive: bool) -> String {
    if case_sensitive {
        segment.to_string()
    } else {
        segment.to_ascii_lowercase()
    }
}

/// The result of a successful [`Router::resolve`].
pub struct Resolved<'a> {
    pub route: &'a Route,
    pub params: HashMap<String, String>,
}

/// Outcome of resolving `(method, path)`.
pub enum Resolution<'a> {
    Matched(Resolved<'a>),
    MethodNotAllowed { allow: Vec<String> },
    NotFound,
}

/// The route collection. Owned by the [`crate::app::Application`] for the
/// lifetime of the process; read-only and lock-free once the application
/// starts accepting connections.
#[derive(Default)]
pub struct Router {
    tables: HashMap<Method, MethodTable>,
    registered: HashMap<(Method, String), ()>,
    case_sensitive: bool,
    strict: bool,
}

impl Router {
    pub fn new(case_sensitive: bool, strict: bool) -> Self {
        Router {
            tables: HashMap::new(),
            registered: HashMap::new(),
            case_sensitive,
            strict,
        }
    }

    /// Registers a route. Fails with [`RouterError::Conflict`] only when
    /// the identical `(method, pattern)` pair was already registered.
    pub fn register(
        &mut self,
        method: Method,
        pattern: &str,
        handlers: Vec<Arc<dyn Middleware>>,
    ) -> Result<(), RouterError> {
        let key = (method, pattern.to_string());
        if self.registered.contains_key(&key) {
            return Err(RouterError::Conflict {
                method,
                pattern: pattern.to_string(),
            });
        }
        let compiled = CompiledPattern::compile(pattern, self.case_sensitive, self.strict).map_err(RouterError::Pattern)?;
        let table = self.tables.entry(method).or_default();
        let order = self.registered.len();
        table.push(
            Route {
                method,
                pattern: compiled,
                handlers,
                order,
            },
            self.case_sensitive,
        );
        self.registered.insert(key, ());
        Ok(())
    }

    /// Resolves `(method, path)` into a matched route + params, a
    /// method-mismatch signal carrying the correct `Allow` set, or
    /// not-found.
    pub fn resolve(&self, method: Method, path: &str) -> Resolution<'_> {
        if let Some(table) = self.tables.get(&method) {
            if let Some((route, params)) = table.resolve(path, self.case_sensitive) {
                return Resolution::Matched(Resolved { route, params });
            }
        }

        let mut allow = Vec::new();
        for (candidate_method, table) in &self.tables {
            if *candidate_method == method {
                continue;
            }
            if table.resolve(path, self.case_sensitive).is_some() {
                allow.push(candidate_method.as_str().to_string());
            }
        }

        if allow.is_empty() {
            Resolution::NotFound
        } else {
            allow.sort();
            Resolution::MethodNotAllowed { allow }
        }
    }

    /// Copies every route of `sub_router` into `self` with `prefix`
    /// prepended to its pattern. A compile-time construct: after this
    /// call only the combined route table exists.
    pub fn mount(&mut self, prefix: &str, sub_router: &Router) -> Result<(), RouterError> {
        let prefix = prefix.trim_end_matches('/');
        for table in sub_router.tables.values() {
            let mut routes: Vec<&Route> = table.routes.iter().collect();
            routes.sort_by_key(|r| r.order);
            for route in routes {
                let mounted_pattern = format!("{prefix}{}", route.pattern.source);
                self.register(route.method, &mounted_pattern, route.handlers.clone())?;
            }
        }
        Ok(())
    }
}

/// The terminal step of the global middleware pipeline: resolves the
/// route, binds `params`, and runs the route's own handler chain as a
/// nested pipeline.
pub struct RouterDispatch {
    router: Arc<Router>,
}

impl RouterDispatch {
    pub fn new(router: Arc<Router>) -> Self {
        RouterDispatch { router }
    }
}

impl Middleware for RouterDispatch {
    fn handle<'a>(
        &'a self,
        ctx: &'a mut crate::context::Context,
        _next: Next<'a>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = HandlerResult> + Send + 'a>> {
        Box::pin(async move {
            match self.router.resolve(ctx.method, &ctx.path) {
                Resolution::Matched(resolved) => {
                    ctx.params = resolved.params;
                    let handlers = resolved.route.handlers.clone();
                    Pipeline::new(handlers).dispatch(ctx).await
                }
                Resolution::MethodNotAllowed { allow } => {
                    Err(crate::error::AppError::MethodNotAllowed { allow })
                }
                Resolution::NotFound => Err(crate::error::AppError::NotFound(ctx.path.clone())),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::handler_fn;

    fn noop_handler() -> Vec<Arc<dyn Middleware>> {
        vec![handler_fn(|ctx| {
            Box::pin(async move {
                ctx.response.text("ok").unwrap();
                Ok(())
            })
        })]
    }

    #[test]
    fn resolves_registered_route() {
        let mut router = Router::new(true, false);
        router.register(Method::Get, "/users/:id", noop_handler()).unwrap();

        match router.resolve(Method::Get, "/users/42") {
            Resolution::Matched(resolved) => {
                assert_eq!(resolved.params.get("id").unwrap(), "42");
            }
            _ => panic!("expected match"),
        }
    }

    #[test]
    fn case_insensitive_router_matches_through_the_literal_index() {
        // Regression test: the literal-segment index used to be keyed by
        // the pattern's original-case first segment while lookups used
        // the request path's own case, so a mixed-case literal segment
        // never even reached `CompiledPattern::matches`'s case-insensitive
        // compare under the case-insensitive default.
        let mut router = Router::new(false, false);
        router.register(Method::Get, "/Users/:id", noop_handler()).unwrap();

        match router.resolve(Method::Get, "/users/42") {
            Resolution::Matched(resolved) => assert_eq!(resolved.params.get("id").unwrap(), "42"),
            _ => panic!("expected case-insensitive match"),
        }

        match router.resolve(Method::Get, "/USERS/42") {
            Resolution::Matched(resolved) => assert_eq!(resolved.params.get("id").unwrap(), "42"),
            _ => panic!("expected case-insensitive match"),
        }
    }

    #[test]
    fn method_mismatch_reports_allow_set() {
        let mut router = Router::new(true, false);
        router.register(Method::Get, "/x", noop_handler()).unwrap();

        match router.resolve(Method::Post, "/x") {
            Resolution::MethodNotAllowed { allow } => assert_eq!(allow, vec!["GET".to_string()]),
            _ => panic!("expected method-not-allowed"),
        }
    }

    #[test]
    fn unmatched_path_is_not_found() {
        let router = Router::new(true, false);
        assert!(matches!(router.resolve(Method::Get, "/nope"), Resolution::NotFound));
    }

    #[test]
    fn duplicate_registration_conflicts() {
        let mut router = Router::new(true, false);
        router.register(Method::Get, "/dup", noop_handler()).unwrap();
        let err = router.register(Method::Get, "/dup", noop_handler()).unwrap_err();
        assert!(matches!(err, RouterError::Conflict { .. }));
    }

    #[test]
    fn first_registered_wins_on_overlap() {
        let mut router = Router::new(true, false);
        router.register(Method::Get, "/users/:id", noop_handler()).unwrap();
        router.register(Method::Get, "/users/active", noop_handler()).unwrap();

        // Both patterns could match "/users/active"; registration order
        // says the ":id" route (registered first) wins.
        match router.resolve(Method::Get, "/users/active") {
            Resolution::Matched(resolved) => {
                assert_eq!(resolved.params.get("id").unwrap(), "active");
            }
            _ => panic!("expected match"),
        }
    }

    #[test]
    fn resolution_is_independent_of_unrelated_route_volume() {
        let mut router = Router::new(true, false);
        for i in 0..500 {
            router
                .register(Method::Get, &format!("/noise/{i}"), noop_handler())
                .unwrap();
        }
        router.register(Method::Get, "/target/:id", noop_handler()).unwrap();

        match router.resolve(Method::Get, "/target/7") {
            Resolution::Matched(resolved) => assert_eq!(resolved.params.get("id").unwrap(), "7"),
            _ => panic!("expected match regardless of unrelated route volume"),
        }
    }

    #[test]
    fn mount_prepends_prefix() {
        let mut sub = Router::new(true, false);
        sub.register(Method::Get, "/ping", noop_handler()).unwrap();

        let mut root = Router::new(true, false);
        root.mount("/api", &sub).unwrap();

        assert!(matches!(root.resolve(Method::Get, "/api/ping"), Resolution::Matched(_)));
    }
}
