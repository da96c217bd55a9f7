//! # Relay Middleware
//!
//! Dependency-ordered middleware chain execution engine.
//!
//! Middleware are registered with a priority, dependencies, conditions and
//! an optional timeout. The chain computes a deterministic execution order
//! and runs it sequentially, or runs caller-defined parallel groups, with
//! per-middleware timeouts, retries, conditional skipping and cooperative
//! cancellation.
//!
//! ## Components
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`registry`] | Unique names, dependency existence, safe removal |
//! | [`validator`] | Cycles, missing dependencies, size limit, priority conflicts |
//! | [`order`] | Priority-respecting topological sort |
//! | [`condition`] | Declarative execution conditions |
//! | [`executor`] | Sequential and parallel execution with retries |
//! | [`result`] | Per-middleware results and performance summary |
//! | [`policy`] | Policy Enforcement Point boundary |
//! | [`chain`] | Facade tying the above together |
//!
//! ## Example
//!
//! ```
//! use http::Method;
//! use relay_core::{ChainState, ExecutionContext};
//! use relay_middleware::{FnMiddleware, MiddlewareChain, MiddlewareDescriptor};
//!
//! # tokio_test::block_on(async {
//! let chain = MiddlewareChain::new();
//!
//! chain.register(
//!     MiddlewareDescriptor::new("auth", FnMiddleware::new(|ctx| {
//!         Box::pin(async move {
//!             ctx.set_attribute("user", "u-1");
//!             Ok(())
//!         })
//!     }))
//!     .with_priority(100),
//! )?;
//!
//! chain.register(
//!     MiddlewareDescriptor::new("audit", FnMiddleware::new(|ctx| {
//!         Box::pin(async move {
//!             assert_eq!(ctx.attribute("user").as_deref(), Some("u-1"));
//!             Ok(())
//!         })
//!     }))
//!     .with_dependency("auth"),
//! )?;
//!
//! assert!(chain.validate().valid);
//! assert_eq!(chain.execution_order(), vec!["auth", "audit"]);
//!
//! let result = chain.execute(ExecutionContext::new(Method::GET, "/"), None).await?;
//! assert_eq!(result.state(), ChainState::Completed);
//! # Ok::<(), relay_core::ChainError>(())
//! # }).unwrap();
//! ```

#![doc(html_root_url = "https://docs.rs/relay-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod chain;
pub mod condition;
pub mod descriptor;
pub mod executor;
pub mod middleware;
pub mod options;
pub mod order;
pub mod policy;
pub mod registry;
pub mod result;
pub mod validator;

pub use chain::{ChainInfo, MiddlewareChain, MiddlewareSummary};
pub use condition::{Condition, ConditionOperator, ConditionType};
pub use descriptor::MiddlewareDescriptor;
pub use executor::ChainExecutor;
pub use middleware::{BoxFuture, FnMiddleware, Middleware, Recovery};
pub use options::{ExecutionOptions, ParallelGroup};
pub use order::execution_order;
pub use policy::{
    PolicyDecision, PolicyEnforcementPoint, PolicyEnforcer, PolicyError, PolicyMiddleware,
    PolicyOutcome, PolicyRequest, RbacPolicyPoint,
};
pub use registry::MiddlewareRegistry;
pub use result::{ChainMetadata, ChainResult, ExecutionResult, PerformanceSummary};
pub use validator::{ChainValidator, ValidationReport, ValidationWarning, ValidatorConfig};
