//! Per-execution options.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default per-attempt timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of attempts per middleware, first attempt included.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// A set of middleware dispatched concurrently in parallel mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelGroup {
    /// Group name, used in logs and errors.
    pub name: String,
    /// Member middleware names.
    pub middleware: Vec<String>,
    /// When false the group is dispatched without blocking the next group.
    #[serde(default = "default_wait_for_all")]
    pub wait_for_all: bool,
}

const fn default_wait_for_all() -> bool {
    true
}

impl ParallelGroup {
    /// Creates a blocking group.
    pub fn new<I, S>(name: impl Into<String>, middleware: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            middleware: middleware.into_iter().map(Into::into).collect(),
            wait_for_all: true,
        }
    }

    /// Makes the group fire-and-forget.
    ///
    /// Its members still finish before the chain result is assembled.
    #[must_use]
    pub fn detached(mut self) -> Self {
        self.wait_for_all = false;
        self
    }
}

/// Options controlling one chain execution.
///
/// # Example
///
/// ```
/// use relay_middleware::{ExecutionOptions, ParallelGroup};
/// use std::time::Duration;
///
/// let options = ExecutionOptions::default()
///     .with_continue_on_error(true)
///     .with_timeout(Duration::from_secs(5))
///     .with_parallel_groups(vec![
///         ParallelGroup::new("identity", ["auth"]),
///         ParallelGroup::new("enrichment", ["geo", "quota"]),
///     ]);
///
/// assert!(options.parallel_execution);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOptions {
    /// Keep going after a middleware fails.
    pub continue_on_error: bool,
    /// Retry failed attempts.
    pub enable_retries: bool,
    /// Attempts per middleware, first attempt included.
    pub max_retries: u32,
    /// Delay between attempts.
    pub retry_delay: Duration,
    /// Per-attempt timeout unless the descriptor overrides it.
    pub timeout: Duration,
    /// Run the parallel groups instead of the sequential order.
    pub parallel_execution: bool,
    /// Groups for parallel mode, in dispatch order.
    pub parallel_groups: Vec<ParallelGroup>,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            continue_on_error: false,
            enable_retries: true,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            timeout: DEFAULT_TIMEOUT,
            parallel_execution: false,
            parallel_groups: Vec::new(),
        }
    }
}

impl ExecutionOptions {
    /// Sets `continue_on_error`.
    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Sets `enable_retries`.
    pub fn with_retries(mut self, enable_retries: bool) -> Self {
        self.enable_retries = enable_retries;
        self
    }

    /// Sets the attempt count. Values below one are treated as one.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the delay between attempts.
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Sets the default per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Switches to parallel mode with the given groups.
    pub fn with_parallel_groups(mut self, groups: Vec<ParallelGroup>) -> Self {
        self.parallel_execution = true;
        self.parallel_groups = groups;
        self
    }

    /// Number of attempts each middleware gets.
    pub fn attempts(&self) -> u32 {
        if self.enable_retries {
            self.max_retries.max(1)
        } else {
            1
        }
    }
}
