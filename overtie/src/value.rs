//! Runtime values and the containers they refer to

use crate::class::ClassId;
use crate::error::{MagicError, MagicResult};
use crate::runtime::Runtime;
use crate::tie::TieBinding;
use crate::tie::handle::MemStream;
use crate::tie::proxy::Proxy;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Signature of native handler code
pub type NativeFn = dyn Fn(&Runtime, &[Value]) -> MagicResult<Value>;

/// A callable: operator handlers, tie methods and plain methods are all `Code`
#[derive(Clone)]
pub struct Code {
    name: Rc<str>,
    func: Rc<NativeFn>,
}

impl Code {
    pub fn new<F>(name: &str, func: F) -> Self
    where
        F: Fn(&Runtime, &[Value]) -> MagicResult<Value> + 'static,
    {
        Code {
            name: Rc::from(name),
            func: Rc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn func(&self) -> &NativeFn {
        &*self.func
    }

}

impl fmt::Debug for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Code({})", self.name)
    }
}

/// Resize `items` to `len`, reporting an allocation failure instead of aborting
pub(crate) fn try_resize<T: Clone>(items: &mut Vec<T>, len: usize, fill: T, what: &str) -> MagicResult<()> {
    if let Some(extra) = len.checked_sub(items.len()) {
        items
            .try_reserve(extra)
            .map_err(|_| MagicError::out_of_memory(what))?;
    }
    items.resize(len, fill);
    Ok(())
}

/// Runtime value
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Undefined
    #[default]
    Undef,
    /// Integer
    Int(i64),
    /// Floating point
    Float(f64),
    /// String
    Str(Rc<str>),
    /// Reference to a container, possibly blessed
    Ref(Rc<Referent>),
    /// Deferred element of a tied array or hash
    Proxy(Proxy),
}

impl Value {
    pub fn str(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }

    /// Boolean as the runtime spells it: `1` or the empty string
    pub fn from_bool(b: bool) -> Self {
        if b { Value::Int(1) } else { Value::str("") }
    }

    pub fn is_undef(&self) -> bool {
        matches!(self, Value::Undef)
    }

    /// Get type name for error messages
    pub fn type_name(&self) -> &str {
        match self {
            Value::Undef => "undef",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Ref(r) => r.kind().as_str(),
            Value::Proxy(_) => "element proxy",
        }
    }

    pub fn as_referent(&self) -> Option<&Rc<Referent>> {
        match self {
            Value::Ref(r) => Some(r),
            _ => None,
        }
    }

    /// Class tag of a blessed reference
    pub fn blessed(&self) -> Option<ClassId> {
        self.as_referent().and_then(|r| r.class())
    }

    /// Reference identity: both values point at the same container
    pub fn same_referent(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Ref(a), Value::Ref(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<Rc<Referent>> for Value {
    fn from(r: Rc<Referent>) -> Self {
        Value::Ref(r)
    }
}

/// Plain (non-overloaded) rendering
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undef => Ok(()),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => f.write_str(&crate::ops::format_number(*x)),
            Value::Str(s) => f.write_str(s),
            Value::Ref(r) => write!(f, "{r}"),
            Value::Proxy(p) => write!(f, "{p}"),
        }
    }
}

/// Scalars compare by value, references by identity; proxies never compare equal
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undef, Value::Undef) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Ref(a), Value::Ref(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// What a reference points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Scalar,
    Array,
    Hash,
    Code,
    Handle,
}

impl RefKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RefKind::Scalar => "SCALAR",
            RefKind::Array => "ARRAY",
            RefKind::Hash => "HASH",
            RefKind::Code => "CODE",
            RefKind::Handle => "GLOB",
        }
    }
}

/// Native storage of a scalar variable
#[derive(Debug, Default)]
pub struct ScalarSlot {
    pub value: Value,
    pub tie: Option<TieBinding>,
}

/// Native storage of an array variable
#[derive(Debug, Default)]
pub struct ArraySlot {
    pub items: Vec<Value>,
    pub tie: Option<TieBinding>,
}

/// Native storage of a hash variable
#[derive(Debug, Default)]
pub struct HashSlot {
    pub entries: IndexMap<String, Value>,
    pub tie: Option<TieBinding>,
}

/// Native storage of an I/O handle
#[derive(Debug, Default)]
pub struct HandleSlot {
    pub stream: MemStream,
    pub tie: Option<TieBinding>,
}

#[derive(Debug)]
pub enum Body {
    Scalar(RefCell<ScalarSlot>),
    Array(RefCell<ArraySlot>),
    Hash(RefCell<HashSlot>),
    Code(Code),
    Handle(RefCell<HandleSlot>),
}

/// A container: the thing variables name and references point at.
///
/// Blessing tags the container, so every reference to it sees the class.
#[derive(Debug)]
pub struct Referent {
    class: RefCell<Option<ClassId>>,
    body: Body,
}

impl Referent {
    fn with_body(body: Body) -> Rc<Self> {
        Rc::new(Referent {
            class: RefCell::new(None),
            body,
        })
    }

    pub fn scalar(value: Value) -> Rc<Self> {
        Self::with_body(Body::Scalar(RefCell::new(ScalarSlot { value, tie: None })))
    }

    pub fn array(items: Vec<Value>) -> Rc<Self> {
        Self::with_body(Body::Array(RefCell::new(ArraySlot { items, tie: None })))
    }

    pub fn hash<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Rc<Self> {
        let entries = entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self::with_body(Body::Hash(RefCell::new(HashSlot { entries, tie: None })))
    }

    pub fn empty_hash() -> Rc<Self> {
        Self::hash(Vec::<(String, Value)>::new())
    }

    pub fn code(code: Code) -> Rc<Self> {
        Self::with_body(Body::Code(code))
    }

    pub fn handle() -> Rc<Self> {
        Self::with_body(Body::Handle(RefCell::default()))
    }

    /// Handle whose native stream starts out holding `input`
    pub fn handle_with_input(input: &str) -> Rc<Self> {
        let slot = HandleSlot {
            stream: MemStream::with_input(input.as_bytes()),
            tie: None,
        };
        Self::with_body(Body::Handle(RefCell::new(slot)))
    }

    pub fn kind(&self) -> RefKind {
        match self.body {
            Body::Scalar(_) => RefKind::Scalar,
            Body::Array(_) => RefKind::Array,
            Body::Hash(_) => RefKind::Hash,
            Body::Code(_) => RefKind::Code,
            Body::Handle(_) => RefKind::Handle,
        }
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn class(&self) -> Option<ClassId> {
        self.class.borrow().clone()
    }

    /// Tag the container with a class; reblessing replaces the tag
    pub fn bless(&self, class: ClassId) {
        *self.class.borrow_mut() = Some(class);
    }

    pub fn addr(&self) -> usize {
        self as *const Referent as usize
    }

    pub fn as_scalar(&self) -> Option<&RefCell<ScalarSlot>> {
        match &self.body {
            Body::Scalar(slot) => Some(slot),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&RefCell<ArraySlot>> {
        match &self.body {
            Body::Array(slot) => Some(slot),
            _ => None,
        }
    }

    pub fn as_hash(&self) -> Option<&RefCell<HashSlot>> {
        match &self.body {
            Body::Hash(slot) => Some(slot),
            _ => None,
        }
    }

    pub fn as_code(&self) -> Option<&Code> {
        match &self.body {
            Body::Code(code) => Some(code),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<&RefCell<HandleSlot>> {
        match &self.body {
            Body::Handle(slot) => Some(slot),
            _ => None,
        }
    }

    /// Current tie binding, cloned out so no borrow outlives the call
    pub fn tie_binding(&self) -> Option<TieBinding> {
        match &self.body {
            Body::Scalar(slot) => slot.borrow().tie.clone(),
            Body::Array(slot) => slot.borrow().tie.clone(),
            Body::Hash(slot) => slot.borrow().tie.clone(),
            Body::Handle(slot) => slot.borrow().tie.clone(),
            Body::Code(_) => None,
        }
    }

    pub fn is_tied(&self) -> bool {
        self.tie_binding().is_some()
    }

    pub(crate) fn set_tie(&self, binding: Option<TieBinding>) -> Option<TieBinding> {
        match &self.body {
            Body::Scalar(slot) => std::mem::replace(&mut slot.borrow_mut().tie, binding),
            Body::Array(slot) => std::mem::replace(&mut slot.borrow_mut().tie, binding),
            Body::Hash(slot) => std::mem::replace(&mut slot.borrow_mut().tie, binding),
            Body::Handle(slot) => std::mem::replace(&mut slot.borrow_mut().tie, binding),
            Body::Code(_) => None,
        }
    }

    /// Empty the native storage
    pub(crate) fn reset_storage(&self) {
        match &self.body {
            Body::Scalar(slot) => slot.borrow_mut().value = Value::Undef,
            Body::Array(slot) => slot.borrow_mut().items.clear(),
            Body::Hash(slot) => slot.borrow_mut().entries.clear(),
            Body::Handle(slot) => slot.borrow_mut().stream = MemStream::default(),
            Body::Code(_) => {}
        }
    }
}

/// Default reference rendering: `Class=HASH(0x...)` or `HASH(0x...)`
impl fmt::Display for Referent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(class) = self.class.borrow().as_ref() {
            write!(f, "{class}=")?;
        }
        write!(f, "{}(0x{:x})", self.kind().as_str(), self.addr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_display() {
        assert_eq!(format!("{}", Value::Int(42)), "42");
        assert_eq!(format!("{}", Value::Float(0.5)), "0.5");
        assert_eq!(format!("{}", Value::str("hi")), "hi");
        assert_eq!(format!("{}", Value::Undef), "");
    }

    #[test]
    fn test_from_bool() {
        assert_eq!(Value::from_bool(true), Value::Int(1));
        assert_eq!(Value::from_bool(false), Value::str(""));
    }

    #[test]
    fn test_reference_identity() {
        let a = Referent::array(vec![]);
        let v1 = Value::Ref(Rc::clone(&a));
        let v2 = Value::Ref(Rc::clone(&a));
        let other = Value::Ref(Referent::array(vec![]));
        assert!(v1.same_referent(&v2));
        assert_eq!(v1, v2);
        assert!(!v1.same_referent(&other));
        assert_ne!(v1, other);
    }

    #[test]
    fn test_bless_is_visible_through_every_reference() {
        let h = Referent::empty_hash();
        let v = Value::Ref(Rc::clone(&h));
        assert!(v.blessed().is_none());
        h.bless(ClassId::new("Point"));
        assert_eq!(v.blessed(), Some(ClassId::new("Point")));
    }

    #[test]
    fn test_referent_display() {
        let h = Referent::empty_hash();
        let plain = h.to_string();
        assert!(plain.starts_with("HASH(0x"));
        h.bless(ClassId::new("Point"));
        let blessed = h.to_string();
        assert!(blessed.starts_with("Point=HASH(0x"));
        assert!(blessed.ends_with(')'));
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(Referent::scalar(Value::Undef).kind().as_str(), "SCALAR");
        assert_eq!(Referent::handle().kind().as_str(), "GLOB");
        assert_eq!(Value::Ref(Referent::array(vec![])).type_name(), "ARRAY");
    }

    #[test]
    fn test_reset_storage() {
        let a = Referent::array(vec![Value::Int(1), Value::Int(2)]);
        a.reset_storage();
        assert!(a.as_array().unwrap().borrow().items.is_empty());
    }

    #[test]
    fn test_try_resize() {
        let mut items = vec![1u8];
        try_resize(&mut items, 3, 0, "test").unwrap();
        assert_eq!(items, vec![1, 0, 0]);
        try_resize(&mut items, 1, 0, "test").unwrap();
        assert_eq!(items, vec![1]);
        let err = try_resize(&mut items, usize::MAX, 0, "test").unwrap_err();
        assert!(matches!(err, MagicError::OutOfMemory { .. }));
        assert_eq!(items, vec![1]);
    }
}
