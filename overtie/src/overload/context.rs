//! Per-class overload context: flattened operator table plus fallback policy

use super::{BOOLIFY, NUMIFY, OverloadHandler, STRINGIFY, op_name};
use crate::class::{ClassHierarchy, ClassId};
use crate::error::{MagicError, MagicResult};
use crate::runtime::Runtime;
use crate::value::Value;
use serde::Serialize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, trace};

/// Resolved operator table of one class.
///
/// Entries from the whole MRO, nearer classes winning. Only exists for
/// classes with at least one operator entry somewhere in their ancestry.
#[derive(Debug)]
pub struct OverloadContext {
    class: ClassId,
    table: HashMap<String, OverloadHandler>,
    fallback: Option<bool>,
}

impl OverloadContext {
    pub fn class(&self) -> &ClassId {
        &self.class
    }

    /// `Some(false)` forbids autogeneration, `Some(true)` also permits plain
    /// semantics, `None` is the default chain
    pub fn fallback(&self) -> Option<bool> {
        self.fallback
    }

    pub fn handler(&self, key: &str) -> Option<&OverloadHandler> {
        self.table.get(key)
    }

    pub fn defines(&self, key: &str) -> bool {
        self.table.contains_key(key)
    }

    /// Whether any conversion operator is available
    pub fn has_conversion(&self) -> bool {
        [STRINGIFY, NUMIFY, BOOLIFY].iter().any(|k| self.defines(k))
    }

    /// Operator keys, sorted
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.table.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn summary(&self) -> ContextSummary {
        ContextSummary {
            class: self.class.to_string(),
            fallback: self.fallback,
            operators: self
                .keys()
                .into_iter()
                .map(|key| {
                    let handler = match &self.table[key] {
                        OverloadHandler::Code(code) => code.name().to_string(),
                        OverloadHandler::Method(name) => format!("method {name}"),
                    };
                    (op_name(key).to_string(), handler)
                })
                .collect(),
        }
    }
}

/// Serializable view of a context for dumps
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextSummary {
    pub class: String,
    pub fallback: Option<bool>,
    pub operators: Vec<(String, String)>,
}

/// Context cache keyed by concrete class, stamped with the hierarchy
/// generation it was built against
#[derive(Debug, Default)]
pub struct OverloadCache {
    entries: RefCell<HashMap<ClassId, (u64, Option<Rc<OverloadContext>>)>>,
}

impl OverloadCache {
    /// Context for `class`, built on first use and after any mutation
    pub fn prepare(&self, classes: &ClassHierarchy, class: &ClassId) -> Option<Rc<OverloadContext>> {
        let generation = classes.generation();
        if let Some((built, ctx)) = self.entries.borrow().get(class)
            && *built == generation
        {
            return ctx.clone();
        }
        let ctx = Self::build(classes, class).map(Rc::new);
        self.entries
            .borrow_mut()
            .insert(class.clone(), (generation, ctx.clone()));
        ctx
    }

    fn build(classes: &ClassHierarchy, class: &ClassId) -> Option<OverloadContext> {
        let mro = classes.mro(class);
        let mut table = HashMap::new();
        for ancestor in mro.iter().rev() {
            table.extend(classes.declared_overloads(ancestor));
        }
        if table.is_empty() {
            trace!(class = %class, "no overloading in hierarchy");
            return None;
        }
        let fallback = mro.iter().find_map(|c| classes.declared_fallback(c));
        debug!(class = %class, operators = table.len(), ?fallback, "overload context built");
        Some(OverloadContext {
            class: class.clone(),
            table,
            fallback,
        })
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

impl Runtime {
    /// `prepare`: context for a class, `None` when nothing in its ancestry overloads
    pub fn overload_context(&self, class: &ClassId) -> Option<Rc<OverloadContext>> {
        self.overload_cache().prepare(self.classes(), class)
    }

    /// Context of a blessed reference
    pub fn context_of(&self, value: &Value) -> Option<Rc<OverloadContext>> {
        value.blessed().and_then(|class| self.overload_context(&class))
    }

    /// Call the handler for `key` with `args` verbatim; `None` when no class
    /// in the hierarchy defines it
    pub fn try_operator(&self, ctx: &OverloadContext, key: &str, args: &[Value]) -> MagicResult<Option<Value>> {
        let Some(handler) = ctx.handler(key) else {
            return Ok(None);
        };
        trace!(class = %ctx.class(), key, "overload handler");
        match handler {
            OverloadHandler::Code(code) => self.call(code, args).map(Some),
            OverloadHandler::Method(name) => {
                let class = args
                    .first()
                    .and_then(Value::blessed)
                    .unwrap_or_else(|| ctx.class().clone());
                self.call_method(&class, name, args)?
                    .map(Some)
                    .ok_or_else(|| MagicError::missing_method(&class, name))
            }
        }
    }

    /// First success among `keys`, tried in order
    pub fn try_fallback(&self, ctx: &OverloadContext, keys: &[&str], args: &[Value]) -> MagicResult<Option<Value>> {
        for key in keys {
            if let Some(out) = self.try_operator(ctx, key, args)? {
                trace!(class = %ctx.class(), key, "fallback key used");
                return Ok(Some(out));
            }
        }
        Ok(None)
    }
}
