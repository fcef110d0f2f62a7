//! The onion-model middleware pipeline (component E).
//!
//! Generalizes two flat `Vec<Middleware>`/`Vec<PostMiddleware>` lists
//! (pre-handler guards, post-handler response rewriters) into a single
//! composed chain: middleware run in registration order, each wraps
//! everything after it via an owned `Next` continuation, and a
//! middleware may resume that continuation at most once.
//!
//! The "at most once" rule is enforced by Rust's ownership rules rather
//! than a runtime flag: [`Next::run`] consumes `self`, so a middleware
//! that tries to call it twice fails to compile, not to run.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::context::Context;
use crate::error::AppError;

pub type HandlerResult = Result<(), AppError>;
type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One link in the middleware chain. Implementors hold whatever state
/// they need (a logger, a rate limiter's bucket map, ...) and decide
/// whether/when to call `next.run(ctx)`.
pub trait Middleware: Send + Sync {
    fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, HandlerResult>;
}

/// The continuation handed to a middleware. Borrowed-not-cloned by
/// design: a middleware either consumes it by calling [`Next::run`], or
/// drops it (terminating the chain there).
pub struct Next<'a> {
    remaining: &'a [Arc<dyn Middleware>],
}

impl<'a> Next<'a> {
    pub fn new(remaining: &'a [Arc<dyn Middleware>]) -> Self {
        Next { remaining }
    }

    /// Runs the rest of the chain. Consumes `self`: there is no way to
    /// call this twice from safe code.
    pub async fn run(self, ctx: &mut Context) -> HandlerResult {
        match self.remaining.split_first() {
            Some((mw, rest)) => mw.handle(ctx, Next::new(rest)).await,
            // Chain exhausted with nothing terminal installed: treat as a
            // no-op success, the way an empty middleware list naturally
            // would. Applications always install the router dispatcher as
            // the last global middleware, so this arm only fires for
            // pipelines built without one (e.g. in tests).
            None => Ok(()),
        }
    }
}

/// An ordered, already-composed middleware chain ready to dispatch a
/// single request. Built once per request from
/// `global_middleware ++ route_middleware ++ terminal_handler`.
#[derive(Clone)]
pub struct Pipeline {
    middlewares: Arc<[Arc<dyn Middleware>]>,
}

impl Pipeline {
    pub fn new(middlewares: Vec<Arc<dyn Middleware>>) -> Self {
        Pipeline {
            middlewares: Arc::from(middlewares),
        }
    }

    pub fn chain(global: &[Arc<dyn Middleware>], route: &[Arc<dyn Middleware>]) -> Self {
        let mut combined = Vec::with_capacity(global.len() + route.len());
        combined.extend_from_slice(global);
        combined.extend_from_slice(route);
        Pipeline::new(combined)
    }

    pub async fn dispatch(&self, ctx: &mut Context) -> HandlerResult {
        Next::new(&self.middlewares).run(ctx).await
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }
}

/// Wraps a `Fn(&mut Context, Next) -> impl Future` closure as a
/// [`Middleware`], for ad-hoc middleware that does not warrant its own
/// named type.
pub fn from_fn<F>(f: F) -> Arc<dyn Middleware>
where
    F: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
{
    struct FromFn<F>(F);

    impl<F> Middleware for FromFn<F>
    where
        F: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        fn handle<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, HandlerResult> {
            (self.0)(ctx, next)
        }
    }

    Arc::new(FromFn(f))
}

/// Wraps a terminal handler (one that never calls `next`) as a
/// [`Middleware`]. Used for route handlers, which sit at the end of the
/// route-local chain.
pub fn handler_fn<F>(f: F) -> Arc<dyn Middleware>
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
{
    from_fn(move |ctx, _next| f(ctx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::Method;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    fn test_ctx() -> Context {
        Context::new(
            Method::Get,
            "/".to_string(),
            crate::context::HeaderMap::new(),
            "req-test".to_string(),
            crate::context::ConnectionInfo {
                peer_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 1),
                trust_proxy: false,
                secure: false,
            },
        )
    }

    fn append_header(tag: &'static str) -> Arc<dyn Middleware> {
        from_fn(move |ctx, next| {
            Box::pin(async move {
                let before = ctx.response.headers.get("X-Order").unwrap_or("").to_string();
                let joined = if before.is_empty() { tag.to_string() } else { format!("{before},{tag}") };
                ctx.response.set_header("X-Order", joined);
                let result = next.run(ctx).await;
                let after = ctx.response.headers.get("X-Order").unwrap_or("").to_string();
                ctx.response.set_header("X-Order", format!("{after},{tag}2"));
                result
            })
        })
    }

    #[tokio::test]
    async fn onion_order_wraps_inner_stages_in_registration_order() {
        // Register middleware A, then B, then a terminal handler H.
        // Expected final header: A,B,H,B2,A2.
        let handler = handler_fn(|ctx| {
            Box::pin(async move {
                let before = ctx.response.headers.get("X-Order").unwrap_or("").to_string();
                ctx.response.set_header("X-Order", format!("{before},H"));
                Ok(())
            })
        });

        let pipeline = Pipeline::new(vec![append_header("A"), append_header("B"), handler]);
        let mut ctx = test_ctx();
        pipeline.dispatch(&mut ctx).await.unwrap();

        assert_eq!(ctx.response.headers.get("X-Order").unwrap(), "A,B,H,B2,A2");
    }

    #[tokio::test]
    async fn middleware_that_skips_next_terminates_chain() {
        let gate = from_fn(|ctx, _next| {
            Box::pin(async move {
                ctx.response.text("blocked").unwrap();
                Ok(())
            })
        });
        let never_runs = handler_fn(|_ctx| Box::pin(async move { panic!("should not run") }));

        let pipeline = Pipeline::new(vec![gate, never_runs]);
        let mut ctx = test_ctx();
        pipeline.dispatch(&mut ctx).await.unwrap();
        assert_eq!(ctx.response.status_code, 200);
    }

    #[tokio::test]
    async fn error_from_inner_middleware_propagates_to_caller() {
        let failing = handler_fn(|_ctx| {
            Box::pin(async move { Err(AppError::Internal("boom".to_string())) })
        });
        let pipeline = Pipeline::new(vec![failing]);
        let mut ctx = test_ctx();
        let result = pipeline.dispatch(&mut ctx).await;
        assert!(result.is_err());
    }
}
