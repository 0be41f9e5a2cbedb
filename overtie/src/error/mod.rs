//! Errors raised by the overload and tie dispatchers

use crate::class::ClassId;
use thiserror::Error;

/// Result type for dispatch operations
pub type MagicResult<T> = std::result::Result<T, MagicError>;

/// Error raised while dispatching an overloaded operator or a tied access.
///
/// Every variant carries the operator key or method name and the class
/// involved so the calling layer can report it. A recursion-guard hit is not
/// an error and never shows up here.
#[derive(Debug, Clone, Error)]
pub enum MagicError {
    /// A handler class lacks a method the operation cannot do without
    #[error("Can't locate object method \"{method}\" via package \"{class}\"")]
    MissingRequiredMethod { class: String, method: String },

    /// No handler, no autogeneration and no usable default for an operator
    #[error("Operation \"{op}\": no method found for class \"{class}\"")]
    UnsupportedOperator { op: String, class: String },

    /// A handler returned a value of the wrong shape
    #[error("Overloaded \"{op}\" in package \"{class}\": {reason}")]
    InvalidHandlerReturn {
        op: String,
        class: String,
        reason: String,
    },

    /// Dereference or tie of something that is not the right kind of container
    #[error("Not {expected} reference (got {got})")]
    NotAReference { expected: String, got: String },

    /// Store below element 0 of an array after negative index normalization
    #[error("Modification of non-creatable array value attempted, subscript {index}")]
    NonCreatableElement { index: i64 },

    /// `set_parents` would make a class its own ancestor
    #[error("Recursive inheritance detected in package \"{class}\"")]
    InheritanceCycle { class: String },

    /// Nested handler calls exceeded the configured depth
    #[error("Deep recursion: handler nesting exceeded {depth} calls")]
    DeepRecursion { depth: usize },

    /// Plain arithmetic division or modulus by zero
    #[error("Illegal {op} zero")]
    DivisionByZero { op: String },

    /// A size taken from the caller needs more memory than can be allocated
    #[error("Out of memory during {what}")]
    OutOfMemory { what: String },

    /// A handler died
    #[error("{0}")]
    Handler(String),

    /// Runtime configuration could not be read
    #[error("Configuration error: {0}")]
    Config(String),
}

impl MagicError {
    pub fn missing_method(class: &ClassId, method: &str) -> Self {
        Self::MissingRequiredMethod {
            class: class.to_string(),
            method: method.to_string(),
        }
    }

    pub fn unsupported_operator(op: &str, class: impl ToString) -> Self {
        Self::UnsupportedOperator {
            op: op.to_string(),
            class: class.to_string(),
        }
    }

    pub fn invalid_return(op: &str, class: &ClassId, reason: impl Into<String>) -> Self {
        Self::InvalidHandlerReturn {
            op: op.to_string(),
            class: class.to_string(),
            reason: reason.into(),
        }
    }

    pub fn not_a_reference(expected: &str, got: &str) -> Self {
        let article = if expected.starts_with(['A', 'E', 'I', 'O', 'U']) {
            "an"
        } else {
            "a"
        };
        Self::NotAReference {
            expected: format!("{article} {expected}"),
            got: got.to_string(),
        }
    }

    pub fn non_creatable(index: i64) -> Self {
        Self::NonCreatableElement { index }
    }

    pub fn inheritance_cycle(class: &ClassId) -> Self {
        Self::InheritanceCycle {
            class: class.to_string(),
        }
    }

    pub fn deep_recursion(depth: usize) -> Self {
        Self::DeepRecursion { depth }
    }

    pub fn division_by_zero(op: &str) -> Self {
        Self::DivisionByZero { op: op.to_string() }
    }

    pub fn out_of_memory(what: &str) -> Self {
        Self::OutOfMemory {
            what: what.to_string(),
        }
    }

    /// Error raised from inside a native handler, the equivalent of `die`
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Class named by the error, if any
    pub fn class(&self) -> Option<&str> {
        match self {
            Self::MissingRequiredMethod { class, .. }
            | Self::UnsupportedOperator { class, .. }
            | Self::InvalidHandlerReturn { class, .. }
            | Self::InheritanceCycle { class } => Some(class),
            _ => None,
        }
    }
}
