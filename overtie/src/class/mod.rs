//! Class hierarchy and method resolution
//!
//! Owns the class -> parents graph, the per-class method and operator
//! tables, and two memo tables: the linearized method resolution order per
//! class and the resolved method per (class, name). Every mutation goes
//! through a method here that calls [`ClassHierarchy::invalidate`], which
//! drops both memo tables and bumps a generation counter that the overload
//! cache compares against.
//!
//! Linearization is depth-first, left-to-right, each class kept at its first
//! occurrence. In a diamond (`D: B, C` with `B: A`, `C: A`) this yields
//! `D B A C`, so a method defined in both `A` and `C` resolves to `A`.

use crate::error::{MagicError, MagicResult};
use crate::overload::OverloadHandler;
use crate::value::Code;
use std::borrow::Borrow;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, trace};

/// Class identity: an interned package name
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(Rc<str>);

impl ClassId {
    pub fn new(name: &str) -> Self {
        ClassId(Rc::from(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassId({})", self.0)
    }
}

impl From<&str> for ClassId {
    fn from(name: &str) -> Self {
        ClassId::new(name)
    }
}

impl From<&ClassId> for ClassId {
    fn from(id: &ClassId) -> Self {
        id.clone()
    }
}

impl Borrow<str> for ClassId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Declarations made directly on one class
#[derive(Debug, Default)]
struct ClassDef {
    parents: Vec<ClassId>,
    methods: HashMap<String, Code>,
    /// Operator table keyed by operator key (`(+`, `(""`, `(nomethod`)
    overloads: HashMap<String, OverloadHandler>,
    /// `fallback` as declared here; `None` when undeclared or undef
    fallback: Option<bool>,
}

/// The class graph plus memoized method resolution
#[derive(Debug, Default)]
pub struct ClassHierarchy {
    classes: RefCell<HashMap<ClassId, ClassDef>>,
    mro_cache: RefCell<HashMap<ClassId, Rc<[ClassId]>>>,
    method_cache: RefCell<HashMap<(ClassId, String), Option<Code>>>,
    generation: Cell<u64>,
}

impl ClassHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current generation; changes on every mutation
    pub fn generation(&self) -> u64 {
        self.generation.get()
    }

    /// Make sure a class exists (classes also spring into existence on first mutation)
    pub fn define_class(&self, class: impl Into<ClassId>) -> ClassId {
        let class = class.into();
        let created = {
            let mut classes = self.classes.borrow_mut();
            if classes.contains_key(&class) {
                false
            } else {
                classes.insert(class.clone(), ClassDef::default());
                true
            }
        };
        if created {
            self.invalidate(&class);
        }
        class
    }

    pub fn is_defined(&self, class: &str) -> bool {
        self.classes.borrow().contains_key(class)
    }

    /// Replace the parent list of `class`
    pub fn set_parents<I, P>(&self, class: impl Into<ClassId>, parents: I) -> MagicResult<()>
    where
        I: IntoIterator<Item = P>,
        P: Into<ClassId>,
    {
        let class = class.into();
        let parents: Vec<ClassId> = parents.into_iter().map(Into::into).collect();
        for parent in &parents {
            if *parent == class || self.isa(parent, &class) {
                return Err(MagicError::inheritance_cycle(&class));
            }
        }
        self.with_class(&class, |def| def.parents = parents);
        self.invalidate(&class);
        Ok(())
    }

    pub fn parents(&self, class: &str) -> Vec<ClassId> {
        self.classes
            .borrow()
            .get(class)
            .map(|def| def.parents.clone())
            .unwrap_or_default()
    }

    /// Define (or redefine) a method
    pub fn define_method(&self, class: impl Into<ClassId>, name: &str, code: Code) {
        let class = class.into();
        self.with_class(&class, |def| {
            def.methods.insert(name.to_string(), code);
        });
        self.invalidate(&class);
    }

    /// Remove a method; returns whether it was there
    pub fn remove_method(&self, class: &ClassId, name: &str) -> bool {
        let removed = self
            .classes
            .borrow_mut()
            .get_mut(class)
            .is_some_and(|def| def.methods.remove(name).is_some());
        if removed {
            self.invalidate(class);
        }
        removed
    }

    /// Install an operator handler. `op` is the operator text (`+`, `""`,
    /// `@{}`, `nomethod`) or an already formed key (`(+`).
    pub fn overload(&self, class: impl Into<ClassId>, op: &str, handler: impl Into<OverloadHandler>) {
        let class = class.into();
        let key = crate::overload::op_key(op);
        let handler = handler.into();
        self.with_class(&class, |def| {
            def.overloads.insert(key, handler);
        });
        self.invalidate(&class);
    }

    pub fn remove_overload(&self, class: &ClassId, op: &str) -> bool {
        let key = crate::overload::op_key(op);
        let removed = self
            .classes
            .borrow_mut()
            .get_mut(class)
            .is_some_and(|def| def.overloads.remove(&key).is_some());
        if removed {
            self.invalidate(class);
        }
        removed
    }

    /// Declare `fallback` for a class; `None` means undef
    pub fn set_fallback(&self, class: impl Into<ClassId>, fallback: Option<bool>) {
        let class = class.into();
        self.with_class(&class, |def| def.fallback = fallback);
        self.invalidate(&class);
    }

    /// Linearized ancestry of `class`, itself first
    pub fn mro(&self, class: &ClassId) -> Rc<[ClassId]> {
        if let Some(mro) = self.mro_cache.borrow().get(class) {
            return Rc::clone(mro);
        }
        let mut order = Vec::new();
        self.linearize(class, &mut order);
        let mro: Rc<[ClassId]> = order.into();
        self.mro_cache
            .borrow_mut()
            .insert(class.clone(), Rc::clone(&mro));
        mro
    }

    fn linearize(&self, class: &ClassId, order: &mut Vec<ClassId>) {
        if order.contains(class) {
            return;
        }
        order.push(class.clone());
        for parent in self.parents(class.as_str()) {
            self.linearize(&parent, order);
        }
    }

    /// Whether `ancestor` appears in the linearization of `class`
    pub fn isa(&self, class: &ClassId, ancestor: &ClassId) -> bool {
        self.mro(class).iter().any(|c| c == ancestor)
    }

    /// Resolve a method through the MRO. Absence is `None`, never an error.
    pub fn lookup_method(&self, class: &ClassId, name: &str) -> Option<Code> {
        let key = (class.clone(), name.to_string());
        if let Some(hit) = self.method_cache.borrow().get(&key) {
            return hit.clone();
        }
        let found = {
            let classes = self.classes.borrow();
            self.mro(class).iter().find_map(|c| {
                classes
                    .get(c)
                    .and_then(|def| def.methods.get(name))
                    .cloned()
            })
        };
        trace!(class = %class, method = name, found = found.is_some(), "method lookup");
        self.method_cache.borrow_mut().insert(key, found.clone());
        found
    }

    pub fn can(&self, class: &ClassId, name: &str) -> bool {
        self.lookup_method(class, name).is_some()
    }

    /// Operator entries declared directly on `class`
    pub(crate) fn declared_overloads(&self, class: &ClassId) -> Vec<(String, OverloadHandler)> {
        self.classes
            .borrow()
            .get(class)
            .map(|def| {
                def.overloads
                    .iter()
                    .map(|(k, h)| (k.clone(), h.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// `fallback` declared directly on `class`
    pub(crate) fn declared_fallback(&self, class: &ClassId) -> Option<bool> {
        self.classes.borrow().get(class).and_then(|def| def.fallback)
    }

    /// Drop every memoized resolution that a change to `class` could affect.
    ///
    /// Subclasses inherit through the MRO memo, so this clears all of it
    /// rather than tracking dependents.
    pub fn invalidate(&self, class: &ClassId) {
        self.mro_cache.borrow_mut().clear();
        self.method_cache.borrow_mut().clear();
        self.generation.set(self.generation.get() + 1);
        debug!(class = %class, generation = self.generation.get(), "method caches invalidated");
    }

    fn with_class(&self, class: &ClassId, f: impl FnOnce(&mut ClassDef)) {
        let mut classes = self.classes.borrow_mut();
        f(classes.entry(class.clone()).or_default());
    }
}
