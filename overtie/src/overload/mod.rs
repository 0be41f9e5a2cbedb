//! Operator overloading
//!
//! Operator keys are the operator text behind an opening parenthesis:
//! `(+`, `(""`, `(0+`, `(bool`, `(@{}`. Two entries are reserved: the
//! per-class `fallback` declaration and the `(nomethod` handler.

pub mod context;
pub mod dispatch;

use crate::value::{Code, RefKind};

pub const STRINGIFY: &str = "(\"\"";
pub const NUMIFY: &str = "(0+";
pub const BOOLIFY: &str = "(bool";
pub const NOMETHOD: &str = "(nomethod";

pub const DEREF_SCALAR: &str = "(${}";
pub const DEREF_ARRAY: &str = "(@{}";
pub const DEREF_HASH: &str = "(%{}";
pub const DEREF_CODE: &str = "(&{}";
pub const DEREF_GLOB: &str = "(*{}";

/// Key for an operator: `+` becomes `(+`; keys pass through unchanged
pub fn op_key(op: &str) -> String {
    if op.starts_with('(') {
        op.to_string()
    } else {
        format!("({op}")
    }
}

/// Operator name as handed to handlers: the key without its parenthesis
pub fn op_name(key: &str) -> &str {
    key.strip_prefix('(').unwrap_or(key)
}

/// Dereference key for a container kind
pub fn deref_key(kind: RefKind) -> &'static str {
    match kind {
        RefKind::Scalar => DEREF_SCALAR,
        RefKind::Array => DEREF_ARRAY,
        RefKind::Hash => DEREF_HASH,
        RefKind::Code => DEREF_CODE,
        RefKind::Handle => DEREF_GLOB,
    }
}

/// A value in an operator table
#[derive(Debug, Clone)]
pub enum OverloadHandler {
    Code(Code),
    /// Method name, resolved on the invocant's class when called
    Method(String),
}

impl From<Code> for OverloadHandler {
    fn from(code: Code) -> Self {
        OverloadHandler::Code(code)
    }
}

impl OverloadHandler {
    pub fn method(name: &str) -> Self {
        OverloadHandler::Method(name.to_string())
    }
}

/// The three conversion operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    Stringify,
    Numify,
    Boolify,
}

impl Conversion {
    pub fn key(self) -> &'static str {
        match self {
            Conversion::Stringify => STRINGIFY,
            Conversion::Numify => NUMIFY,
            Conversion::Boolify => BOOLIFY,
        }
    }

    /// Keys tried, in order, when this conversion has no handler of its own
    pub fn fallback_keys(self) -> [&'static str; 2] {
        match self {
            Conversion::Stringify => [NUMIFY, BOOLIFY],
            Conversion::Numify => [STRINGIFY, BOOLIFY],
            Conversion::Boolify => [NUMIFY, STRINGIFY],
        }
    }
}
