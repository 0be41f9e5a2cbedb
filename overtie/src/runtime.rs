//! The runtime instance: class hierarchy, overload cache and handler calls
//!
//! One `Runtime` per interpreter thread. It is `!Send` (everything inside is
//! `Rc`/`RefCell`), so ties and caches are never shared between threads.
//! Entry points take `&self`; handlers receive the same `&Runtime` and may
//! re-enter any of them. No `RefCell` borrow is held across a handler call.

use crate::class::{ClassHierarchy, ClassId};
use crate::config::RuntimeConfig;
use crate::error::{MagicError, MagicResult};
use crate::overload::context::OverloadCache;
use crate::value::{Code, Referent, Value};
use std::cell::Cell;
use std::rc::Rc;
use tracing::trace;

pub struct Runtime {
    classes: ClassHierarchy,
    overloads: OverloadCache,
    config: RuntimeConfig,
    /// Current handler nesting
    depth: Cell<usize>,
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Runtime {
            classes: ClassHierarchy::new(),
            overloads: OverloadCache::default(),
            config,
            depth: Cell::new(0),
        }
    }

    pub fn classes(&self) -> &ClassHierarchy {
        &self.classes
    }

    pub(crate) fn overload_cache(&self) -> &OverloadCache {
        &self.overloads
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Current handler nesting depth
    pub fn depth(&self) -> usize {
        self.depth.get()
    }

    /// Tag `referent` with `class` and return a reference to it
    pub fn bless(&self, referent: &Rc<Referent>, class: impl Into<ClassId>) -> Value {
        let class = self.classes.define_class(class);
        referent.bless(class);
        Value::Ref(Rc::clone(referent))
    }

    /// Invoke native handler code.
    ///
    /// Nesting is bounded by `max_call_depth`; the native stack is grown on
    /// demand so legal nesting never overflows it.
    pub fn call(&self, code: &Code, args: &[Value]) -> MagicResult<Value> {
        let depth = self.depth.get();
        if depth >= self.config.max_call_depth {
            return Err(MagicError::deep_recursion(depth));
        }
        trace!(handler = code.name(), depth, "call");
        self.depth.set(depth + 1);
        let result = stacker::maybe_grow(self.config.stack_red_zone, self.config.stack_grow_size, || {
            (code.func())(self, args)
        });
        self.depth.set(depth);
        result
    }

    /// Resolve `name` on `class` and call it; `None` when there is no such method
    pub fn call_method(&self, class: &ClassId, name: &str, args: &[Value]) -> MagicResult<Option<Value>> {
        match self.classes.lookup_method(class, name) {
            Some(code) => self.call(&code, args).map(Some),
            None => Ok(None),
        }
    }

    /// Method call on a blessed invocant, `args[0]`
    pub fn invoke(&self, invocant: &Value, name: &str, rest: &[Value]) -> MagicResult<Value> {
        let class = invocant
            .blessed()
            .ok_or_else(|| MagicError::handler(format!("Can't call method \"{name}\" on unblessed value")))?;
        let mut args = Vec::with_capacity(rest.len() + 1);
        args.push(invocant.clone());
        args.extend_from_slice(rest);
        self.call_method(&class, name, &args)?
            .ok_or_else(|| MagicError::missing_method(&class, name))
    }

    /// Explicit invalidation entry point for whatever mutates method tables
    /// behind the hierarchy's back. The overload cache follows through the
    /// hierarchy generation.
    pub fn invalidate(&self, class: &ClassId) {
        self.classes.invalidate(class);
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_passes_args() {
        let rt = Runtime::new();
        let code = Code::new("second", |_, args| Ok(args[1].clone()));
        let out = rt.call(&code, &[Value::Int(1), Value::Int(2)]).unwrap();
        assert_eq!(out, Value::Int(2));
        assert_eq!(rt.depth(), 0);
    }

    #[test]
    fn test_deep_recursion_is_an_error() {
        let rt = Runtime::with_config(RuntimeConfig {
            max_call_depth: 8,
            ..RuntimeConfig::default()
        });
        rt.classes().define_method(
            "Loop",
            "again",
            Code::new("again", |rt, args| rt.invoke(&args[0], "again", &[])),
        );
        let obj = rt.bless(&Referent::empty_hash(), "Loop");
        let err = rt.invoke(&obj, "again", &[]).unwrap_err();
        assert!(matches!(err, MagicError::DeepRecursion { depth: 8 }));
        assert_eq!(rt.depth(), 0);
    }

    #[test]
    fn test_call_method_absent() {
        let rt = Runtime::new();
        rt.classes().define_class("Empty");
        let out = rt.call_method(&ClassId::new("Empty"), "nope", &[]).unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn test_invoke_unblessed_fails() {
        let rt = Runtime::new();
        let plain = Value::Ref(Referent::empty_hash());
        assert!(rt.invoke(&plain, "anything", &[]).is_err());
    }

    #[test]
    fn test_handler_error_propagates() {
        let rt = Runtime::new();
        let code = Code::new("die", |_, _| Err(MagicError::handler("boom")));
        let err = rt.call(&code, &[]).unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert_eq!(rt.depth(), 0);
    }
}
