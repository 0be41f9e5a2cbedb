//! Lazy element references into tied containers
//!
//! Indexing a tied array or hash yields a [`Proxy`] instead of calling
//! `FETCH`. Reading the proxy fetches; assigning to it stores. A proxy that
//! is only passed around never reaches the handler.

use crate::error::{MagicError, MagicResult};
use crate::runtime::Runtime;
use crate::value::{RefKind, Referent, Value};
use std::fmt;
use std::rc::Rc;

/// Which element a proxy stands for
#[derive(Debug, Clone, PartialEq)]
pub enum ProxyKey {
    Index(i64),
    Key(Rc<str>),
}

#[derive(Debug, Clone)]
pub struct Proxy {
    container: Rc<Referent>,
    key: ProxyKey,
}

impl Proxy {
    pub(crate) fn for_index(container: &Rc<Referent>, index: i64) -> Self {
        Proxy {
            container: Rc::clone(container),
            key: ProxyKey::Index(index),
        }
    }

    pub(crate) fn for_key(container: &Rc<Referent>, key: &str) -> Self {
        Proxy {
            container: Rc::clone(container),
            key: ProxyKey::Key(Rc::from(key)),
        }
    }

    pub fn container(&self) -> &Rc<Referent> {
        &self.container
    }

    pub fn key(&self) -> &ProxyKey {
        &self.key
    }

    pub fn fetch(&self, rt: &Runtime) -> MagicResult<Value> {
        match &self.key {
            ProxyKey::Index(i) => rt.array_fetch(&self.container, *i),
            ProxyKey::Key(k) => rt.hash_fetch(&self.container, k),
        }
    }

    pub fn store(&self, rt: &Runtime, value: Value) -> MagicResult<()> {
        match &self.key {
            ProxyKey::Index(i) => rt.array_store(&self.container, *i, value),
            ProxyKey::Key(k) => rt.hash_store(&self.container, k, value),
        }
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            ProxyKey::Index(i) => write!(f, "{}[{i}]", self.container),
            ProxyKey::Key(k) => write!(f, "{}{{{k}}}", self.container),
        }
    }
}

impl Runtime {
    /// Value with any proxies fetched
    pub fn resolve(&self, value: &Value) -> MagicResult<Value> {
        let mut current = value.clone();
        while let Value::Proxy(proxy) = &current {
            current = proxy.fetch(self)?;
        }
        Ok(current)
    }

    /// Assign through an lvalue: an element proxy or a scalar reference
    pub fn assign(&self, target: &Value, value: Value) -> MagicResult<()> {
        match target {
            Value::Proxy(proxy) => proxy.store(self, value),
            Value::Ref(r) if r.kind() == RefKind::Scalar => self.store_scalar(r, value),
            other => Err(MagicError::not_a_reference("SCALAR", other.type_name())),
        }
    }
}
