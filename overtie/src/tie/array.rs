//! Array access, tied or plain
//!
//! Negative indices count from the end. On a tied array that takes a
//! `FETCHSIZE`; an index still negative afterwards reads as undef and
//! cannot be stored to.

use super::TieBinding;
use super::proxy::Proxy;
use crate::error::{MagicError, MagicResult};
use crate::runtime::Runtime;
use crate::value::{ArraySlot, Referent, Value, try_resize};
use std::cell::RefCell;
use std::rc::Rc;

fn array_slot(var: &Referent) -> MagicResult<&RefCell<ArraySlot>> {
    var.as_array()
        .ok_or_else(|| MagicError::not_a_reference("ARRAY", var.kind().as_str()))
}

fn binding(slot: &RefCell<ArraySlot>) -> Option<TieBinding> {
    slot.borrow().tie.clone()
}

impl Runtime {
    fn tied_len(&self, binding: &TieBinding) -> MagicResult<i64> {
        let size = self.call_required(binding, "FETCHSIZE", &[])?;
        Ok(match self.numify(&size)? {
            Value::Int(n) => n,
            Value::Float(x) => x as i64,
            _ => 0,
        })
    }

    /// Index counted from the front, `None` when it falls before element 0
    fn normalize_index(&self, var: &Rc<Referent>, index: i64) -> MagicResult<Option<i64>> {
        if index >= 0 {
            return Ok(Some(index));
        }
        let at = self.array_len(var)? + index;
        Ok((at >= 0).then_some(at))
    }

    /// Element count; `FETCHSIZE(obj)` when tied
    pub fn array_len(&self, var: &Rc<Referent>) -> MagicResult<i64> {
        let slot = array_slot(var)?;
        match binding(slot) {
            Some(binding) => self.tied_len(&binding),
            None => Ok(slot.borrow().items.len() as i64),
        }
    }

    /// Grow or truncate; `STORESIZE(obj, len)` when tied
    pub fn array_set_len(&self, var: &Rc<Referent>, len: i64) -> MagicResult<()> {
        let slot = array_slot(var)?;
        match binding(slot) {
            Some(binding) => {
                self.call_required(&binding, "STORESIZE", &[Value::Int(len)])?;
            }
            None => try_resize(&mut slot.borrow_mut().items, len.max(0) as usize, Value::Undef, "array resize")?,
        }
        Ok(())
    }

    /// Read one element; `FETCH(obj, index)` when tied
    pub fn array_fetch(&self, var: &Rc<Referent>, index: i64) -> MagicResult<Value> {
        let slot = array_slot(var)?;
        let Some(index) = self.normalize_index(var, index)? else {
            return Ok(Value::Undef);
        };
        match binding(slot) {
            Some(binding) => self.call_required(&binding, "FETCH", &[Value::Int(index)]),
            None => Ok(slot
                .borrow()
                .items
                .get(index as usize)
                .cloned()
                .unwrap_or_default()),
        }
    }

    /// Write one element, extending a plain array with undef as needed;
    /// `STORE(obj, index, value)` when tied
    pub fn array_store(&self, var: &Rc<Referent>, index: i64, value: Value) -> MagicResult<()> {
        let slot = array_slot(var)?;
        let Some(at) = self.normalize_index(var, index)? else {
            return Err(MagicError::non_creatable(index));
        };
        let value = self.resolve(&value)?;
        match binding(slot) {
            Some(binding) => {
                self.call_required(&binding, "STORE", &[Value::Int(at), value])?;
            }
            None => {
                let mut slot = slot.borrow_mut();
                let at = at as usize;
                if at >= slot.items.len() {
                    try_resize(&mut slot.items, at + 1, Value::Undef, "array store")?;
                }
                slot.items[at] = value;
            }
        }
        Ok(())
    }

    /// Element for later reading or assignment: a [`Proxy`] when tied, the
    /// value itself otherwise
    pub fn array_elem(&self, var: &Rc<Referent>, index: i64) -> MagicResult<Value> {
        let slot = array_slot(var)?;
        if slot.borrow().tie.is_some() {
            return Ok(Value::Proxy(Proxy::for_index(var, index)));
        }
        self.array_fetch(var, index)
    }

    /// `EXISTS(obj, index)`, false when the handler has none
    pub fn array_exists(&self, var: &Rc<Referent>, index: i64) -> MagicResult<bool> {
        let slot = array_slot(var)?;
        let Some(index) = self.normalize_index(var, index)? else {
            return Ok(false);
        };
        match binding(slot) {
            Some(binding) => match self.call_optional(&binding, "EXISTS", &[Value::Int(index)])? {
                Some(out) => self.boolify(&out),
                None => Ok(false),
            },
            None => Ok((index as usize) < slot.borrow().items.len()),
        }
    }

    /// `DELETE(obj, index)`, undef when the handler has none. A plain
    /// element becomes undef; deleting the last one shortens the array.
    pub fn array_delete(&self, var: &Rc<Referent>, index: i64) -> MagicResult<Value> {
        let slot = array_slot(var)?;
        let Some(index) = self.normalize_index(var, index)? else {
            return Ok(Value::Undef);
        };
        match binding(slot) {
            Some(binding) => Ok(self
                .call_optional(&binding, "DELETE", &[Value::Int(index)])?
                .unwrap_or_default()),
            None => {
                let mut slot = slot.borrow_mut();
                let at = index as usize;
                if at >= slot.items.len() {
                    return Ok(Value::Undef);
                }
                if at + 1 == slot.items.len() {
                    return Ok(slot.items.pop().unwrap_or_default());
                }
                Ok(std::mem::take(&mut slot.items[at]))
            }
        }
    }

    /// `CLEAR(obj)`, skipped when the handler has none
    pub fn array_clear(&self, var: &Rc<Referent>) -> MagicResult<()> {
        let slot = array_slot(var)?;
        match binding(slot) {
            Some(binding) => {
                self.call_optional(&binding, "CLEAR", &[])?;
            }
            None => slot.borrow_mut().items.clear(),
        }
        Ok(())
    }

    /// `EXTEND(obj, count)`, a capacity hint
    pub fn array_extend(&self, var: &Rc<Referent>, count: i64) -> MagicResult<()> {
        let slot = array_slot(var)?;
        match binding(slot) {
            Some(binding) => {
                self.call_optional(&binding, "EXTEND", &[Value::Int(count)])?;
            }
            None => {
                let mut slot = slot.borrow_mut();
                let extra = (count.max(0) as usize).saturating_sub(slot.items.len());
                slot.items
                    .try_reserve(extra)
                    .map_err(|_| MagicError::out_of_memory("array extend"))?;
            }
        }
        Ok(())
    }

    /// Append; returns the new length. `PUSH(obj, values...)` when tied
    pub fn array_push(&self, var: &Rc<Referent>, values: &[Value]) -> MagicResult<i64> {
        let slot = array_slot(var)?;
        let values = values.iter().map(|v| self.resolve(v)).collect::<MagicResult<Vec<_>>>()?;
        match binding(slot) {
            Some(binding) => {
                self.call_required(&binding, "PUSH", &values)?;
                self.tied_len(&binding)
            }
            None => {
                let mut slot = slot.borrow_mut();
                slot.items.extend(values);
                Ok(slot.items.len() as i64)
            }
        }
    }

    /// Remove and return the last element. `POP(obj)` when tied
    pub fn array_pop(&self, var: &Rc<Referent>) -> MagicResult<Value> {
        let slot = array_slot(var)?;
        match binding(slot) {
            Some(binding) => self.call_required(&binding, "POP", &[]),
            None => Ok(slot.borrow_mut().items.pop().unwrap_or_default()),
        }
    }

    /// Remove and return the first element. `SHIFT(obj)` when tied
    pub fn array_shift(&self, var: &Rc<Referent>) -> MagicResult<Value> {
        let slot = array_slot(var)?;
        match binding(slot) {
            Some(binding) => self.call_required(&binding, "SHIFT", &[]),
            None => {
                let mut slot = slot.borrow_mut();
                if slot.items.is_empty() {
                    Ok(Value::Undef)
                } else {
                    Ok(slot.items.remove(0))
                }
            }
        }
    }

    /// Prepend, keeping `values` in order; returns the new length.
    /// `UNSHIFT(obj, values...)` when tied
    pub fn array_unshift(&self, var: &Rc<Referent>, values: &[Value]) -> MagicResult<i64> {
        let slot = array_slot(var)?;
        let values = values.iter().map(|v| self.resolve(v)).collect::<MagicResult<Vec<_>>>()?;
        match binding(slot) {
            Some(binding) => {
                self.call_required(&binding, "UNSHIFT", &values)?;
                self.tied_len(&binding)
            }
            None => {
                let mut slot = slot.borrow_mut();
                slot.items.splice(0..0, values);
                Ok(slot.items.len() as i64)
            }
        }
    }
}
