//! Hash access and iteration, tied or plain

use super::TieBinding;
use super::proxy::Proxy;
use crate::error::{MagicError, MagicResult};
use crate::runtime::Runtime;
use crate::value::{HashSlot, Referent, Value};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::trace;

fn hash_slot(var: &Referent) -> MagicResult<&RefCell<HashSlot>> {
    var.as_hash()
        .ok_or_else(|| MagicError::not_a_reference("HASH", var.kind().as_str()))
}

fn binding(slot: &RefCell<HashSlot>) -> Option<TieBinding> {
    slot.borrow().tie.clone()
}

impl Runtime {
    /// `FETCH(obj, key)` when tied
    pub fn hash_fetch(&self, var: &Rc<Referent>, key: &str) -> MagicResult<Value> {
        let slot = hash_slot(var)?;
        match binding(slot) {
            Some(binding) => self.call_required(&binding, "FETCH", &[Value::str(key)]),
            None => Ok(slot.borrow().entries.get(key).cloned().unwrap_or_default()),
        }
    }

    /// `STORE(obj, key, value)` when tied
    pub fn hash_store(&self, var: &Rc<Referent>, key: &str, value: Value) -> MagicResult<()> {
        let slot = hash_slot(var)?;
        let value = self.resolve(&value)?;
        match binding(slot) {
            Some(binding) => {
                self.call_required(&binding, "STORE", &[Value::str(key), value])?;
            }
            None => {
                slot.borrow_mut().entries.insert(key.to_string(), value);
            }
        }
        Ok(())
    }

    /// Element for later reading or assignment: a [`Proxy`] when tied
    pub fn hash_elem(&self, var: &Rc<Referent>, key: &str) -> MagicResult<Value> {
        let slot = hash_slot(var)?;
        if slot.borrow().tie.is_some() {
            return Ok(Value::Proxy(Proxy::for_key(var, key)));
        }
        self.hash_fetch(var, key)
    }

    /// `EXISTS(obj, key)`, false when the handler has none
    pub fn hash_exists(&self, var: &Rc<Referent>, key: &str) -> MagicResult<bool> {
        let slot = hash_slot(var)?;
        match binding(slot) {
            Some(binding) => match self.call_optional(&binding, "EXISTS", &[Value::str(key)])? {
                Some(out) => self.boolify(&out),
                None => Ok(false),
            },
            None => Ok(slot.borrow().entries.contains_key(key)),
        }
    }

    /// `DELETE(obj, key)`, undef when the handler has none
    pub fn hash_delete(&self, var: &Rc<Referent>, key: &str) -> MagicResult<Value> {
        let slot = hash_slot(var)?;
        match binding(slot) {
            Some(binding) => Ok(self
                .call_optional(&binding, "DELETE", &[Value::str(key)])?
                .unwrap_or_default()),
            None => Ok(slot.borrow_mut().entries.shift_remove(key).unwrap_or_default()),
        }
    }

    /// `CLEAR(obj)`, skipped when the handler has none
    pub fn hash_clear(&self, var: &Rc<Referent>) -> MagicResult<()> {
        let slot = hash_slot(var)?;
        match binding(slot) {
            Some(binding) => {
                self.call_optional(&binding, "CLEAR", &[])?;
            }
            None => slot.borrow_mut().entries.clear(),
        }
        Ok(())
    }

    /// Hash in scalar context. `SCALAR(obj)` when tied; without it, whether
    /// `FIRSTKEY` finds anything. A plain hash gives its key count.
    pub fn hash_scalar(&self, var: &Rc<Referent>) -> MagicResult<Value> {
        let slot = hash_slot(var)?;
        let Some(binding) = binding(slot) else {
            return Ok(Value::Int(slot.borrow().entries.len() as i64));
        };
        if let Some(out) = self.call_optional(&binding, "SCALAR", &[])? {
            return Ok(out);
        }
        trace!(class = %binding.class(), "SCALAR derived from FIRSTKEY");
        let first = self.call_required(&binding, "FIRSTKEY", &[])?;
        Ok(Value::Int(i64::from(!first.is_undef())))
    }

    /// Start an iteration over `var`
    pub fn hash_cursor(&self, var: &Rc<Referent>) -> MagicResult<HashCursor> {
        hash_slot(var)?;
        Ok(HashCursor {
            hash: Rc::clone(var),
            state: CursorState::Start,
        })
    }

    /// All keys in iteration order
    pub fn hash_keys(&self, var: &Rc<Referent>) -> MagicResult<Vec<String>> {
        let mut cursor = self.hash_cursor(var)?;
        let mut keys = Vec::new();
        while let Some(key) = cursor.next_key(self)? {
            keys.push(key);
        }
        Ok(keys)
    }
}

#[derive(Debug)]
enum CursorState {
    Start,
    /// Last key the handler returned, handed back to `NEXTKEY`
    Tied(Value),
    /// Keys of a plain hash captured when iteration started
    Snapshot { keys: Vec<String>, next: usize },
    Done,
}

/// Iteration state kept outside the hash.
///
/// A tied hash is walked with `FIRSTKEY` then `NEXTKEY(last)` until the
/// handler returns undef; order and behavior under mutation are up to the
/// handler. Independent cursors over one hash do not see each other.
#[derive(Debug)]
pub struct HashCursor {
    hash: Rc<Referent>,
    state: CursorState,
}

impl HashCursor {
    pub fn next_key(&mut self, rt: &Runtime) -> MagicResult<Option<String>> {
        let next = match &mut self.state {
            CursorState::Done => return Ok(None),
            CursorState::Snapshot { keys, next } => {
                let key = keys.get(*next).cloned();
                *next += 1;
                if key.is_none() {
                    self.state = CursorState::Done;
                }
                return Ok(key);
            }
            CursorState::Start => {
                let slot = hash_slot(&self.hash)?;
                match binding(slot) {
                    Some(binding) => rt.call_required(&binding, "FIRSTKEY", &[])?,
                    None => {
                        let keys = slot.borrow().entries.keys().cloned().collect();
                        self.state = CursorState::Snapshot { keys, next: 0 };
                        return self.next_key(rt);
                    }
                }
            }
            CursorState::Tied(last) => {
                let last = last.clone();
                let slot = hash_slot(&self.hash)?;
                let binding = binding(slot)
                    .ok_or_else(|| MagicError::handler("hash was untied during iteration"))?;
                rt.call_required(&binding, "NEXTKEY", &[last])?
            }
        };
        let next = rt.resolve(&next)?;
        if next.is_undef() {
            self.state = CursorState::Done;
            return Ok(None);
        }
        let key = rt.stringify(&next)?;
        self.state = CursorState::Tied(next);
        Ok(Some(key))
    }

    /// Next key with its value
    pub fn next_entry(&mut self, rt: &Runtime) -> MagicResult<Option<(String, Value)>> {
        match self.next_key(rt)? {
            Some(key) => {
                let value = rt.hash_fetch(&self.hash, &key)?;
                Ok(Some((key, value)))
            }
            None => Ok(None),
        }
    }

    /// Start over from the first key
    pub fn reset(&mut self) {
        self.state = CursorState::Start;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tie::fixtures::{self, calls};
    use crate::value::Code;
    use std::collections::BTreeSet;

    fn tied(rt: &Runtime) -> (Rc<Referent>, fixtures::CallLog) {
        let log = fixtures::hash_class(rt, "Store");
        let hash = Referent::empty_hash();
        rt.tie(&hash, "Store", &[]).unwrap();
        (hash, log)
    }

    #[test]
    fn test_plain_hash() {
        let rt = Runtime::new();
        let h = Referent::hash([("a", Value::Int(1))]);
        rt.hash_store(&h, "b", Value::Int(2)).unwrap();
        assert_eq!(rt.hash_fetch(&h, "b").unwrap(), Value::Int(2));
        assert_eq!(rt.hash_elem(&h, "a").unwrap(), Value::Int(1));
        assert!(rt.hash_exists(&h, "a").unwrap());
        assert_eq!(rt.hash_scalar(&h).unwrap(), Value::Int(2));
        assert_eq!(rt.hash_keys(&h).unwrap(), vec!["a", "b"]);
        assert_eq!(rt.hash_delete(&h, "a").unwrap(), Value::Int(1));
        assert!(!rt.hash_exists(&h, "a").unwrap());
        rt.hash_clear(&h).unwrap();
        assert!(rt.hash_keys(&h).unwrap().is_empty());
    }

    #[test]
    fn test_tied_iteration_visits_each_key_once() {
        let rt = Runtime::new();
        let (h, log) = tied(&rt);
        for (k, v) in [("a", 1), ("b", 2), ("c", 3)] {
            rt.hash_store(&h, k, Value::Int(v)).unwrap();
        }
        let mut cursor = rt.hash_cursor(&h).unwrap();
        let mut seen = Vec::new();
        while let Some((key, value)) = cursor.next_entry(&rt).unwrap() {
            // Unrelated accesses between steps do not disturb the walk
            rt.hash_exists(&h, "zzz").unwrap();
            rt.hash_fetch(&h, "a").unwrap();
            seen.push((key, value));
        }
        assert_eq!(
            seen,
            vec![
                ("a".to_string(), Value::Int(1)),
                ("b".to_string(), Value::Int(2)),
                ("c".to_string(), Value::Int(3)),
            ]
        );
        assert_eq!(calls(&log, "FIRSTKEY"), 1);
        assert_eq!(calls(&log, "NEXTKEY"), 3);
        assert_eq!(cursor.next_key(&rt).unwrap(), None);
        cursor.reset();
        assert_eq!(cursor.next_key(&rt).unwrap(), Some("a".to_string()));
    }

    #[test]
    fn test_independent_cursors() {
        let rt = Runtime::new();
        let (h, _) = tied(&rt);
        rt.hash_store(&h, "x", Value::Int(1)).unwrap();
        rt.hash_store(&h, "y", Value::Int(2)).unwrap();
        let mut one = rt.hash_cursor(&h).unwrap();
        let mut two = rt.hash_cursor(&h).unwrap();
        assert_eq!(one.next_key(&rt).unwrap().as_deref(), Some("x"));
        assert_eq!(two.next_key(&rt).unwrap().as_deref(), Some("x"));
        assert_eq!(one.next_key(&rt).unwrap().as_deref(), Some("y"));
        let keys: BTreeSet<String> = rt.hash_keys(&h).unwrap().into_iter().collect();
        assert_eq!(keys, BTreeSet::from(["x".to_string(), "y".to_string()]));
    }

    #[test]
    fn test_plain_iteration_uses_snapshot() {
        let rt = Runtime::new();
        let h = Referent::hash([("a", Value::Int(1)), ("b", Value::Int(2))]);
        let mut cursor = rt.hash_cursor(&h).unwrap();
        assert_eq!(cursor.next_key(&rt).unwrap().as_deref(), Some("a"));
        rt.hash_store(&h, "c", Value::Int(3)).unwrap();
        assert_eq!(cursor.next_key(&rt).unwrap().as_deref(), Some("b"));
        assert_eq!(cursor.next_key(&rt).unwrap(), None);
    }

    #[test]
    fn test_scalar_derived_from_firstkey() {
        let rt = Runtime::new();
        let (h, log) = tied(&rt);
        assert_eq!(rt.hash_scalar(&h).unwrap(), Value::Int(0));
        rt.hash_store(&h, "k", Value::Int(1)).unwrap();
        assert_eq!(rt.hash_scalar(&h).unwrap(), Value::Int(1));
        assert_eq!(calls(&log, "FIRSTKEY"), 2);

        rt.classes().define_method("Store", "SCALAR", Code::new("SCALAR", |_, _| Ok(Value::str("3/8"))));
        assert_eq!(rt.hash_scalar(&h).unwrap(), Value::str("3/8"));
        assert_eq!(calls(&log, "FIRSTKEY"), 2);
    }

    #[test]
    fn test_optional_methods() {
        let rt = Runtime::new();
        let (h, log) = tied(&rt);
        rt.hash_store(&h, "k", Value::Int(1)).unwrap();
        assert!(rt.hash_exists(&h, "k").unwrap());
        assert_eq!(rt.hash_delete(&h, "k").unwrap(), Value::Int(1));
        assert!(!rt.hash_exists(&h, "k").unwrap());
        // No CLEAR defined
        rt.hash_clear(&h).unwrap();
        assert_eq!(calls(&log, "CLEAR"), 0);
    }

    #[test]
    fn test_missing_nextkey() {
        let rt = Runtime::new();
        let (h, _) = tied(&rt);
        rt.hash_store(&h, "k", Value::Int(1)).unwrap();
        rt.classes().remove_method(&"Store".into(), "NEXTKEY");
        let err = rt.hash_keys(&h).unwrap_err();
        assert!(matches!(err, MagicError::MissingRequiredMethod { ref method, .. } if method == "NEXTKEY"));
    }
}
