//! Core middleware trait.
//!
//! A middleware is one named unit of work in a chain. It receives the shared
//! [`ExecutionContext`], may read request attributes and write attributes or
//! extensions for later middleware, and reports success or a
//! [`MiddlewareError`].
//!
//! # Example
//!
//! ```
//! use relay_core::{ExecutionContext, MiddlewareError};
//! use relay_middleware::{BoxFuture, Middleware};
//!
//! struct TenantResolver;
//!
//! impl Middleware for TenantResolver {
//!     fn execute<'a>(
//!         &'a self,
//!         ctx: &'a ExecutionContext,
//!     ) -> BoxFuture<'a, Result<(), MiddlewareError>> {
//!         Box::pin(async move {
//!             let tenant = ctx
//!                 .header("x-tenant")
//!                 .ok_or_else(|| MiddlewareError::execution("missing x-tenant header"))?;
//!             ctx.set_attribute("tenant", tenant);
//!             Ok(())
//!         })
//!     }
//! }
//! ```

use relay_core::{ExecutionContext, MiddlewareError};
use std::future::Future;
use std::pin::Pin;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What the chain should do after a middleware attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Recovery {
    /// Apply the normal retry and `continue_on_error` rules.
    #[default]
    Continue,
    /// Stop retrying and stop the chain, even with `continue_on_error` set.
    Halt,
}

/// The core middleware trait.
///
/// Only [`execute`](Middleware::execute) is required. The hooks default to
/// "always run" and "let the chain decide".
///
/// # Invariants
///
/// - `execute` may be called more than once per chain invocation when
///   retries are enabled
/// - `execute` may run concurrently with other middleware of the same
///   parallel group; all shared state goes through the context's locks
pub trait Middleware: Send + Sync + 'static {
    /// Runs the middleware against the context.
    fn execute<'a>(&'a self, ctx: &'a ExecutionContext)
        -> BoxFuture<'a, Result<(), MiddlewareError>>;

    /// Decides whether the middleware runs for this context.
    ///
    /// Consulted after the enabled flag and before declarative conditions.
    fn should_execute(&self, _ctx: &ExecutionContext) -> bool {
        true
    }

    /// Called after every failed attempt.
    fn on_error(&self, _error: &MiddlewareError, _ctx: &ExecutionContext) -> Recovery {
        Recovery::Continue
    }
}

/// A middleware built from an async closure.
///
/// # Example
///
/// ```
/// use relay_middleware::FnMiddleware;
///
/// let stamp = FnMiddleware::new(|ctx| {
///     Box::pin(async move {
///         ctx.set_attribute("stamped", "yes");
///         Ok(())
///     })
/// });
/// # let _ = stamp;
/// ```
pub struct FnMiddleware<F> {
    func: F,
}

impl<F> FnMiddleware<F>
where
    F: for<'a> Fn(&'a ExecutionContext) -> BoxFuture<'a, Result<(), MiddlewareError>>
        + Send
        + Sync
        + 'static,
{
    /// Creates a new closure-based middleware.
    pub const fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(&'a ExecutionContext) -> BoxFuture<'a, Result<(), MiddlewareError>>
        + Send
        + Sync
        + 'static,
{
    fn execute<'a>(
        &'a self,
        ctx: &'a ExecutionContext,
    ) -> BoxFuture<'a, Result<(), MiddlewareError>> {
        (self.func)(ctx)
    }
}

impl<F> std::fmt::Debug for FnMiddleware<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnMiddleware").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    struct Rejecting;

    impl Middleware for Rejecting {
        fn execute<'a>(
            &'a self,
            _ctx: &'a ExecutionContext,
        ) -> BoxFuture<'a, Result<(), MiddlewareError>> {
            Box::pin(async { Err(MiddlewareError::execution("rejected")) })
        }

        fn should_execute(&self, ctx: &ExecutionContext) -> bool {
            ctx.path().starts_with("/api")
        }

        fn on_error(&self, _error: &MiddlewareError, _ctx: &ExecutionContext) -> Recovery {
            Recovery::Halt
        }
    }

    #[tokio::test]
    async fn test_fn_middleware_writes_context() {
        let mw = FnMiddleware::new(|ctx| {
            Box::pin(async move {
                ctx.set_attribute("visited", "fn");
                Ok(())
            })
        });
        let ctx = ExecutionContext::new(Method::GET, "/");

        mw.execute(&ctx).await.unwrap();
        assert_eq!(ctx.attribute("visited").as_deref(), Some("fn"));
    }

    #[tokio::test]
    async fn test_default_hooks() {
        let mw = FnMiddleware::new(|_ctx| Box::pin(async { Ok(()) }));
        let ctx = ExecutionContext::new(Method::GET, "/");

        assert!(mw.should_execute(&ctx));
        assert_eq!(
            mw.on_error(&MiddlewareError::execution("x"), &ctx),
            Recovery::Continue
        );
    }

    fn load_session(ctx: &ExecutionContext) -> anyhow::Result<String> {
        ctx.attribute("session")
            .ok_or_else(|| anyhow::anyhow!("no session"))
    }

    #[tokio::test]
    async fn test_anyhow_errors_convert_with_question_mark() {
        let mw = FnMiddleware::new(|ctx| {
            Box::pin(async move {
                let session = load_session(ctx)?;
                ctx.set_attribute("user", session);
                Ok::<(), MiddlewareError>(())
            })
        });
        let ctx = ExecutionContext::new(Method::GET, "/");

        assert_eq!(
            mw.execute(&ctx).await,
            Err(MiddlewareError::execution("no session"))
        );

        ctx.set_attribute("session", "s-1");
        mw.execute(&ctx).await.unwrap();
        assert_eq!(ctx.attribute("user").as_deref(), Some("s-1"));
    }

    #[tokio::test]
    async fn test_custom_hooks() {
        let ctx = ExecutionContext::new(Method::GET, "/health");
        assert!(!Rejecting.should_execute(&ctx));

        let err = Rejecting.execute(&ctx).await.unwrap_err();
        assert_eq!(Rejecting.on_error(&err, &ctx), Recovery::Halt);
    }
}
