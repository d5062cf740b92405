//! Parameter validators: the executor's per-parameter validation collaborator.

use std::sync::Arc;

use mast_model::ModelValue;

use crate::error::OperationError;

/// Validates a single parameter value against its declared contract.
pub trait ParamValidator: Send + Sync {
    /// Check `value` for parameter `param`; the executor fails the operation
    /// on the first violation.
    fn validate(&self, param: &str, value: &ModelValue) -> Result<(), OperationError>;
}

/// Declaration of one operation parameter.
#[derive(Clone)]
pub struct ParamSpec {
    /// Parameter name.
    pub name: String,

    /// Whether the operation fails when the parameter is absent.
    pub required: bool,

    /// The value contract.
    pub validator: Arc<dyn ParamValidator>,
}

impl ParamSpec {
    /// A parameter that must be present.
    pub fn required(name: impl Into<String>, validator: impl ParamValidator + 'static) -> Self {
        Self {
            name: name.into(),
            required: true,
            validator: Arc::new(validator),
        }
    }

    /// A parameter that may be absent.
    pub fn optional(name: impl Into<String>, validator: impl ParamValidator + 'static) -> Self {
        Self {
            name: name.into(),
            required: false,
            validator: Arc::new(validator),
        }
    }
}

impl std::fmt::Debug for ParamSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParamSpec")
            .field("name", &self.name)
            .field("required", &self.required)
            .finish_non_exhaustive()
    }
}

/// Accepts any value. For parameters whose contract is structural only.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyValue;

impl ParamValidator for AnyValue {
    fn validate(&self, _param: &str, _value: &ModelValue) -> Result<(), OperationError> {
        Ok(())
    }
}

/// A string whose length falls within `[min, max]`.
#[derive(Debug, Clone, Copy)]
pub struct StringLength {
    min: usize,
    max: usize,
}

impl StringLength {
    /// Length bounds, inclusive.
    pub fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }

    /// Any non-empty string.
    pub fn non_empty() -> Self {
        Self {
            min: 1,
            max: usize::MAX,
        }
    }
}

impl ParamValidator for StringLength {
    fn validate(&self, param: &str, value: &ModelValue) -> Result<(), OperationError> {
        let Some(s) = value.as_str() else {
            return Err(OperationError::validation(
                param,
                format!("expected string, got {}", value.kind()),
            ));
        };
        if s.len() < self.min || s.len() > self.max {
            return Err(OperationError::validation(
                param,
                format!(
                    "string length {} outside [{}, {}]",
                    s.len(),
                    self.min,
                    self.max
                ),
            ));
        }
        Ok(())
    }
}

/// An integer within `[min, max]`.
#[derive(Debug, Clone, Copy)]
pub struct IntRange {
    min: i64,
    max: i64,
}

impl IntRange {
    /// Value bounds, inclusive.
    pub fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }

    /// A TCP/UDP port number.
    pub fn port() -> Self {
        Self { min: 0, max: 65535 }
    }
}

impl ParamValidator for IntRange {
    fn validate(&self, param: &str, value: &ModelValue) -> Result<(), OperationError> {
        let Some(i) = value.as_int() else {
            return Err(OperationError::validation(
                param,
                format!("expected int, got {}", value.kind()),
            ));
        };
        if i < self.min || i > self.max {
            return Err(OperationError::validation(
                param,
                format!("value {i} outside [{}, {}]", self.min, self.max),
            ));
        }
        Ok(())
    }
}

/// A string drawn from a fixed set of choices.
#[derive(Debug, Clone)]
pub struct OneOf {
    choices: Vec<String>,
}

impl OneOf {
    /// Allowed values.
    pub fn new<S: Into<String>>(choices: impl IntoIterator<Item = S>) -> Self {
        Self {
            choices: choices.into_iter().map(Into::into).collect(),
        }
    }
}

impl ParamValidator for OneOf {
    fn validate(&self, param: &str, value: &ModelValue) -> Result<(), OperationError> {
        let Some(s) = value.as_str() else {
            return Err(OperationError::validation(
                param,
                format!("expected string, got {}", value.kind()),
            ));
        };
        if !self.choices.iter().any(|c| c == s) {
            return Err(OperationError::validation(
                param,
                format!("{s:?} is not one of {:?}", self.choices),
            ));
        }
        Ok(())
    }
}
