//! Variable tying
//!
//! A tied container delegates every access to methods on a handler object.
//! The binding lives in the container's slot; the handler object is an
//! ordinary blessed reference created by the class's constructor:
//!
//! | Container | Constructor  | Required                               | Optional |
//! |-----------|--------------|----------------------------------------|----------|
//! | scalar    | `TIESCALAR`  | FETCH STORE                            | DESTROY UNTIE |
//! | array     | `TIEARRAY`   | FETCH STORE FETCHSIZE STORESIZE, and each of PUSH POP SHIFT UNSHIFT when used | EXISTS DELETE CLEAR EXTEND DESTROY UNTIE |
//! | hash      | `TIEHASH`    | FETCH STORE FIRSTKEY NEXTKEY           | EXISTS DELETE CLEAR SCALAR DESTROY UNTIE |
//! | handle    | `TIEHANDLE`  | PRINT PRINTF READLINE GETC READ WRITE, each when used | SEEK TELL EOF CLOSE BINMODE FILENO DESTROY UNTIE |

pub mod array;
pub mod handle;
pub mod hash;
pub mod proxy;
pub mod scalar;

use crate::class::ClassId;
use crate::error::{MagicError, MagicResult};
use crate::runtime::Runtime;
use crate::value::{RefKind, Referent, Value};
use std::rc::Rc;
use tracing::{debug, trace};

/// Kind of tied container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TieKind {
    Scalar,
    Array,
    Hash,
    Handle,
}

impl TieKind {
    pub fn of(kind: RefKind) -> Option<Self> {
        match kind {
            RefKind::Scalar => Some(TieKind::Scalar),
            RefKind::Array => Some(TieKind::Array),
            RefKind::Hash => Some(TieKind::Hash),
            RefKind::Handle => Some(TieKind::Handle),
            RefKind::Code => None,
        }
    }

    /// Construction method name
    pub fn constructor(self) -> &'static str {
        match self {
            TieKind::Scalar => "TIESCALAR",
            TieKind::Array => "TIEARRAY",
            TieKind::Hash => "TIEHASH",
            TieKind::Handle => "TIEHANDLE",
        }
    }

    /// Variable kind marker passed to the constructor after the class name
    pub fn marker(self) -> &'static str {
        match self {
            TieKind::Scalar => "SCALAR",
            TieKind::Array => "ARRAY",
            TieKind::Hash => "HASH",
            TieKind::Handle => "HANDLE",
        }
    }
}

/// The record pairing a tied container with its handler object
#[derive(Debug, Clone)]
pub struct TieBinding {
    kind: TieKind,
    handler: Value,
    class: ClassId,
}

impl TieBinding {
    pub fn kind(&self) -> TieKind {
        self.kind
    }

    /// The object returned by the constructor
    pub fn handler(&self) -> &Value {
        &self.handler
    }

    /// Class the tie methods are resolved on
    pub fn class(&self) -> &ClassId {
        &self.class
    }

    /// References to the handler object held outside this binding
    fn handler_refs(&self) -> usize {
        self.handler.as_referent().map(Rc::strong_count).unwrap_or(0)
    }
}

impl Runtime {
    /// Bind `var` to a new handler object of `class`.
    ///
    /// The constructor gets `(class, kind marker, args...)` and must return a
    /// blessed reference. A tied variable is untied before rebinding.
    pub fn tie(&self, var: &Rc<Referent>, class: impl Into<ClassId>, args: &[Value]) -> MagicResult<Value> {
        let class = class.into();
        let Some(kind) = TieKind::of(var.kind()) else {
            return Err(MagicError::not_a_reference("SCALAR, ARRAY, HASH or GLOB", var.kind().as_str()));
        };
        let constructor = kind.constructor();
        let mut ctor_args = Vec::with_capacity(args.len() + 2);
        ctor_args.push(Value::str(class.as_str()));
        ctor_args.push(Value::str(kind.marker()));
        ctor_args.extend_from_slice(args);
        let handler = self
            .call_method(&class, constructor, &ctor_args)?
            .ok_or_else(|| MagicError::missing_method(&class, constructor))?;
        let handler = self.resolve(&handler)?;
        let Some(handler_class) = handler.blessed() else {
            return Err(MagicError::invalid_return(
                constructor,
                &class,
                format!("constructor returned {} instead of an object", handler.type_name()),
            ));
        };
        if var.is_tied() {
            self.untie(var)?;
        }
        debug!(class = %handler_class, kind = kind.marker(), "tie");
        var.set_tie(Some(TieBinding {
            kind,
            handler: handler.clone(),
            class: handler_class,
        }));
        Ok(handler)
    }

    /// Remove the binding from `var`.
    ///
    /// Calls `UNTIE(obj, extra_refs)` when defined, where `extra_refs`
    /// counts references to the handler object held outside the binding.
    /// Native storage restarts empty. `DESTROY` runs when the binding held
    /// the last reference. Untying an untied variable does nothing.
    pub fn untie(&self, var: &Rc<Referent>) -> MagicResult<()> {
        let Some(binding) = var.tie_binding() else {
            return Ok(());
        };
        // One reference in the slot, one in `binding`
        let extra = binding.handler_refs().saturating_sub(2);
        self.call_optional(&binding, "UNTIE", &[Value::Int(extra as i64)])?;
        var.set_tie(None);
        var.reset_storage();
        debug!(class = %binding.class(), kind = binding.kind().marker(), extra, "untie");
        if binding.handler_refs() == 1 {
            self.call_optional(&binding, "DESTROY", &[])?;
        }
        Ok(())
    }

    /// Handler object of a tied variable
    pub fn tied(&self, var: &Rc<Referent>) -> Option<Value> {
        var.tie_binding().map(|b| b.handler)
    }

    /// Call a tie method the operation cannot do without
    pub(crate) fn call_required(&self, binding: &TieBinding, method: &str, rest: &[Value]) -> MagicResult<Value> {
        self.call_optional(binding, method, rest)?
            .ok_or_else(|| MagicError::missing_method(binding.class(), method))
    }

    /// Call a tie method if the handler class has it
    pub(crate) fn call_optional(&self, binding: &TieBinding, method: &str, rest: &[Value]) -> MagicResult<Option<Value>> {
        let mut args = Vec::with_capacity(rest.len() + 1);
        args.push(binding.handler.clone());
        args.extend_from_slice(rest);
        let out = self.call_method(binding.class(), method, &args)?;
        trace!(class = %binding.class(), method, found = out.is_some(), "tie method");
        Ok(out)
    }
}
