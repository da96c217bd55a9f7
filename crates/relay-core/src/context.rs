//! Execution context types.
//!
//! An [`ExecutionContext`] is created fresh for every chain invocation and
//! discarded once the chain result has been returned. It carries:
//!
//! - request attributes supplied by the HTTP layer (path, method, headers,
//!   optional security context)
//! - chain-scoped progress (state, executed and failed names, durations)
//! - an [`AbortSignal`] for cooperative cancellation
//! - typed extensions and string attributes that middleware use to hand
//!   data to later middleware
//!
//! The context is shared behind an `Arc` so that members of a parallel group
//! can run concurrently. Every mutable field sits behind a lock; middleware
//! running in the same parallel group still observe each other's writes in
//! an unspecified order.

use crate::identity::SecurityContext;
use chrono::{DateTime, Utc};
use http::header::IntoHeaderName;
use http::{HeaderMap, HeaderValue, Method};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// A unique identifier for each request, using UUID v7.
///
/// UUID v7 is time-ordered, which makes it ideal for request tracking
/// and log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new unique request ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `RequestId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Identifies one chain invocation.
///
/// The abort signal of an in-flight execution can be looked up by this ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(Uuid);

impl ExecutionId {
    /// Generate a new unique execution ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cooperative cancellation flag.
///
/// Cloning yields a handle to the same flag. Setting it never interrupts a
/// running middleware; the executor checks it before dispatching each step.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(Arc<AtomicBool>);

impl AbortSignal {
    /// Creates an unset signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn abort(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns true once cancellation has been requested.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Lifecycle state of a chain execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChainState {
    /// Created but not started.
    #[default]
    Pending,
    /// Dispatching middleware.
    Running,
    /// Every step ran (failures tolerated by `continue_on_error` included).
    Completed,
    /// Stopped early because of a failure.
    Failed,
    /// Stopped early because the abort signal was observed.
    Cancelled,
}

impl ChainState {
    /// Check if the chain has finished.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for ChainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Chain-scoped fields readable while the chain is in flight.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChainProgress {
    /// Current state.
    pub state: ChainState,
    /// Middleware most recently dispatched.
    pub current: Option<String>,
    /// Names of middleware that finished successfully, in completion order.
    pub executed: Vec<String>,
    /// Names of middleware that failed, in completion order.
    pub failed: Vec<String>,
    /// Measured duration per finished middleware.
    pub durations: HashMap<String, Duration>,
    /// Set when a middleware demanded that the chain stop.
    pub terminated: bool,
}

/// Per-invocation context threaded through the middleware chain.
///
/// # Example
///
/// ```
/// use relay_core::{ExecutionContext, SecurityContext};
/// use http::{HeaderValue, Method};
///
/// let ctx = ExecutionContext::new(Method::GET, "/api/media/42")
///     .with_header("x-tenant", HeaderValue::from_static("acme"))
///     .with_security(SecurityContext::user("u-1"));
///
/// ctx.set_attribute("locale", "en-GB");
///
/// assert_eq!(ctx.path(), "/api/media/42");
/// assert_eq!(ctx.header("x-tenant"), Some("acme"));
/// assert_eq!(ctx.attribute("locale").as_deref(), Some("en-GB"));
/// ```
#[derive(Debug)]
pub struct ExecutionContext {
    execution_id: ExecutionId,
    request_id: RequestId,
    path: String,
    method: Method,
    headers: HeaderMap,
    security: Option<SecurityContext>,
    started_at: Instant,
    started_at_utc: DateTime<Utc>,
    abort: AbortSignal,

    /// String attributes, consulted by context-value conditions.
    attributes: RwLock<HashMap<String, String>>,

    /// Type-erased extension data.
    extensions: RwLock<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,

    progress: Mutex<ChainProgress>,
}

impl ExecutionContext {
    /// Creates a context for a request with a fresh request ID.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            execution_id: ExecutionId::new(),
            request_id: RequestId::new(),
            path: path.into(),
            method,
            headers: HeaderMap::new(),
            security: None,
            started_at: Instant::now(),
            started_at_utc: Utc::now(),
            abort: AbortSignal::new(),
            attributes: RwLock::new(HashMap::new()),
            extensions: RwLock::new(HashMap::new()),
            progress: Mutex::new(ChainProgress::default()),
        }
    }

    /// Uses the given request ID, e.g. one propagated by an upstream service.
    #[must_use]
    pub fn with_request_id(mut self, request_id: RequestId) -> Self {
        self.request_id = request_id;
        self
    }

    /// Replaces the header map.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Adds a single header.
    #[must_use]
    pub fn with_header<K: IntoHeaderName>(mut self, name: K, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Attaches the authenticated principal.
    #[must_use]
    pub fn with_security(mut self, security: SecurityContext) -> Self {
        self.security = Some(security);
        self
    }

    /// Shares an existing abort signal, so the caller can cancel the chain.
    #[must_use]
    pub fn with_abort_signal(mut self, abort: AbortSignal) -> Self {
        self.abort = abort;
        self
    }

    /// Returns the execution ID.
    #[must_use]
    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    /// Returns the request ID.
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns the request path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a header value if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the security context, if the caller was authenticated.
    #[must_use]
    pub fn security(&self) -> Option<&SecurityContext> {
        self.security.as_ref()
    }

    /// Returns when the chain invocation started.
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Returns the wall-clock start time.
    #[must_use]
    pub fn started_at_utc(&self) -> DateTime<Utc> {
        self.started_at_utc
    }

    /// Returns the elapsed time since the invocation started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Returns a handle to the abort signal.
    #[must_use]
    pub fn abort_signal(&self) -> AbortSignal {
        self.abort.clone()
    }

    /// Returns true once cancellation has been requested.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.abort.is_aborted()
    }

    /// Returns a string attribute.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<String> {
        self.attributes.read().get(key).cloned()
    }

    /// Sets a string attribute.
    pub fn set_attribute(&self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.write().insert(key.into(), value.into());
    }

    /// Stores a typed extension value, replacing any previous value of `T`.
    ///
    /// # Example
    ///
    /// ```
    /// use relay_core::ExecutionContext;
    /// use http::Method;
    ///
    /// #[derive(Clone)]
    /// struct RateLimitInfo {
    ///     remaining: u32,
    /// }
    ///
    /// let ctx = ExecutionContext::new(Method::GET, "/");
    /// ctx.set_extension(RateLimitInfo { remaining: 100 });
    ///
    /// let info = ctx.get_extension::<RateLimitInfo>().unwrap();
    /// assert_eq!(info.remaining, 100);
    /// ```
    pub fn set_extension<T: Send + Sync + 'static>(&self, value: T) {
        self.extensions
            .write()
            .insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Returns a clone of a typed extension value.
    #[must_use]
    pub fn get_extension<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.extensions
            .read()
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    }

    /// Removes and returns a typed extension value.
    pub fn remove_extension<T: Send + Sync + 'static>(&self) -> Option<T> {
        self.extensions
            .write()
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast().ok())
            .map(|b| *b)
    }

    /// Checks if an extension of the given type exists.
    #[must_use]
    pub fn has_extension<T: Send + Sync + 'static>(&self) -> bool {
        self.extensions.read().contains_key(&TypeId::of::<T>())
    }

    /// Returns a snapshot of the chain-scoped progress.
    #[must_use]
    pub fn progress(&self) -> ChainProgress {
        self.progress.lock().clone()
    }

    /// Returns the current chain state.
    #[must_use]
    pub fn state(&self) -> ChainState {
        self.progress.lock().state
    }

    /// Sets the chain state. Called by the executor.
    pub fn set_state(&self, state: ChainState) {
        self.progress.lock().state = state;
    }

    /// Records that a middleware is being dispatched. Called by the executor.
    pub fn begin_middleware(&self, name: &str) {
        self.progress.lock().current = Some(name.to_string());
    }

    /// Records a successful middleware. Called by the executor.
    pub fn record_executed(&self, name: &str, duration: Duration) {
        let mut progress = self.progress.lock();
        progress.executed.push(name.to_string());
        progress.durations.insert(name.to_string(), duration);
    }

    /// Records a failed middleware. Called by the executor.
    pub fn record_failed(&self, name: &str, duration: Duration) {
        let mut progress = self.progress.lock();
        progress.failed.push(name.to_string());
        progress.durations.insert(name.to_string(), duration);
    }

    /// Marks the chain as terminated by a middleware's error hook.
    pub fn terminate(&self) {
        self.progress.lock().terminated = true;
    }

    /// Returns true if a middleware demanded that the chain stop.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.progress.lock().terminated
    }
}
