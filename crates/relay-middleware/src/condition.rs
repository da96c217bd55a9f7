//! Declarative execution conditions.
//!
//! A middleware with conditions runs only when every condition holds. Each
//! condition reads one target value from the context and applies an
//! operator:
//!
//! | Type | Target |
//! |---|---|
//! | `path` | request path |
//! | `method` | request method (case-insensitive for `equals`) |
//! | `header` | value of the header named by `field` |
//! | `context_value` | context attribute named by `field` |
//! | `custom` | none, always holds |
//!
//! A missing target fails every operator except `exists`. `negate` inverts
//! the final result.

use relay_core::ExecutionContext;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::warn;

/// What a condition inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionType {
    /// The request path.
    Path,
    /// The request method.
    Method,
    /// A request header.
    Header,
    /// A context attribute.
    ContextValue,
    /// Evaluated by the middleware's own `should_execute` hook.
    Custom,
}

/// How the target is compared with the condition value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    /// Exact match.
    Equals,
    /// Substring match.
    Contains,
    /// Prefix match.
    StartsWith,
    /// Suffix match.
    EndsWith,
    /// Regular expression match.
    Regex,
    /// The target is present.
    Exists,
}

/// A single execution condition.
///
/// # Example
///
/// ```
/// use relay_core::ExecutionContext;
/// use relay_middleware::{Condition, ConditionOperator};
/// use http::{HeaderValue, Method};
///
/// let ctx = ExecutionContext::new(Method::POST, "/api/upload")
///     .with_header("content-type", HeaderValue::from_static("image/png"));
///
/// assert!(Condition::path_starts_with("/api").matches(&ctx));
/// assert!(Condition::header("content-type", ConditionOperator::StartsWith, "image/").matches(&ctx));
/// assert!(Condition::method("GET").negated().matches(&ctx));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    /// What the condition inspects.
    #[serde(rename = "type")]
    pub kind: ConditionType,
    /// Comparison operator.
    pub operator: ConditionOperator,
    /// Header name or attribute key for `header` and `context_value`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Comparison operand. Ignored by `exists`.
    #[serde(default)]
    pub value: String,
    /// Inverts the result.
    #[serde(default)]
    pub negate: bool,
    #[serde(skip)]
    compiled: OnceLock<Option<Regex>>,
}

impl Condition {
    /// Creates a condition.
    pub fn new(kind: ConditionType, operator: ConditionOperator, value: impl Into<String>) -> Self {
        Self {
            kind,
            operator,
            field: None,
            value: value.into(),
            negate: false,
            compiled: OnceLock::new(),
        }
    }

    /// Matches paths against `operator`.
    pub fn path(operator: ConditionOperator, value: impl Into<String>) -> Self {
        Self::new(ConditionType::Path, operator, value)
    }

    /// Matches paths starting with `prefix`.
    pub fn path_starts_with(prefix: impl Into<String>) -> Self {
        Self::path(ConditionOperator::StartsWith, prefix)
    }

    /// Matches the request method.
    pub fn method(method: impl Into<String>) -> Self {
        Self::new(ConditionType::Method, ConditionOperator::Equals, method)
    }

    /// Matches the named header against `operator`.
    pub fn header(
        name: impl Into<String>,
        operator: ConditionOperator,
        value: impl Into<String>,
    ) -> Self {
        Self::new(ConditionType::Header, operator, value).with_field(name)
    }

    /// Holds when the named header is present.
    pub fn header_exists(name: impl Into<String>) -> Self {
        Self::header(name, ConditionOperator::Exists, "")
    }

    /// Matches the named context attribute against `operator`.
    pub fn context_value(
        key: impl Into<String>,
        operator: ConditionOperator,
        value: impl Into<String>,
    ) -> Self {
        Self::new(ConditionType::ContextValue, operator, value).with_field(key)
    }

    /// A condition left to the middleware's `should_execute` hook.
    pub fn custom(label: impl Into<String>) -> Self {
        Self::new(ConditionType::Custom, ConditionOperator::Equals, label)
    }

    /// Sets the header name or attribute key.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Inverts the condition.
    #[must_use]
    pub fn negated(mut self) -> Self {
        self.negate = !self.negate;
        self
    }

    /// Evaluates the condition against a context.
    pub fn matches(&self, ctx: &ExecutionContext) -> bool {
        self.evaluate(ctx) != self.negate
    }

    fn evaluate(&self, ctx: &ExecutionContext) -> bool {
        let target = match self.kind {
            ConditionType::Custom => return true,
            ConditionType::Path => Some(ctx.path().to_string()),
            ConditionType::Method => Some(ctx.method().as_str().to_string()),
            ConditionType::Header => self
                .field
                .as_deref()
                .and_then(|name| ctx.header(name))
                .map(str::to_string),
            ConditionType::ContextValue => {
                self.field.as_deref().and_then(|key| ctx.attribute(key))
            }
        };

        let Some(target) = target else {
            return false;
        };

        match self.operator {
            ConditionOperator::Exists => true,
            ConditionOperator::Equals if self.kind == ConditionType::Method => {
                target.eq_ignore_ascii_case(&self.value)
            }
            ConditionOperator::Equals => target == self.value,
            ConditionOperator::Contains => target.contains(&self.value),
            ConditionOperator::StartsWith => target.starts_with(&self.value),
            ConditionOperator::EndsWith => target.ends_with(&self.value),
            ConditionOperator::Regex => self
                .regex()
                .is_some_and(|regex| regex.is_match(&target)),
        }
    }

    fn regex(&self) -> Option<&Regex> {
        self.compiled
            .get_or_init(|| match Regex::new(&self.value) {
                Ok(regex) => Some(regex),
                Err(e) => {
                    warn!(pattern = %self.value, error = %e, "invalid condition regex");
                    None
                }
            })
            .as_ref()
    }
}

impl PartialEq for Condition {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.operator == other.operator
            && self.field == other.field
            && self.value == other.value
            && self.negate == other.negate
    }
}

impl Eq for Condition {}

/// Evaluates a condition list. An empty list always holds.
pub fn evaluate(conditions: &[Condition], ctx: &ExecutionContext) -> bool {
    conditions.iter().all(|condition| condition.matches(ctx))
}
