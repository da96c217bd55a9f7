//! # Relay Core
//!
//! Core types shared by every Relay crate.
//!
//! This crate provides the foundational types used by the middleware chain
//! engine:
//!
//! - [`ExecutionContext`] - Per-invocation record threaded through the chain
//! - [`RequestId`] / [`ExecutionId`] - UUID v7 identifiers
//! - [`SecurityContext`] - Authenticated principal consulted by policies
//! - [`AbortSignal`] - Cooperative cancellation flag
//! - [`ChainError`] / [`MiddlewareError`] - Build-time and runtime errors

#![doc(html_root_url = "https://docs.rs/relay-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
mod error;
mod identity;

pub use context::{
    AbortSignal, ChainProgress, ChainState, ExecutionContext, ExecutionId, RequestId,
};
pub use error::{ChainError, BuildResult, MiddlewareError};
pub use identity::{PrincipalKind, SecurityContext};
