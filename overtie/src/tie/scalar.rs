//! Scalar access, tied or plain

use crate::error::{MagicError, MagicResult};
use crate::runtime::Runtime;
use crate::value::{Referent, ScalarSlot, Value};
use std::cell::RefCell;
use std::rc::Rc;

fn scalar_slot(var: &Referent) -> MagicResult<&RefCell<ScalarSlot>> {
    var.as_scalar()
        .ok_or_else(|| MagicError::not_a_reference("SCALAR", var.kind().as_str()))
}

impl Runtime {
    /// Read a scalar variable; `FETCH(obj)` when tied
    pub fn fetch_scalar(&self, var: &Rc<Referent>) -> MagicResult<Value> {
        let slot = scalar_slot(var)?;
        let binding = slot.borrow().tie.clone();
        match binding {
            Some(binding) => self.call_required(&binding, "FETCH", &[]),
            None => Ok(slot.borrow().value.clone()),
        }
    }

    /// Write a scalar variable; `STORE(obj, value)` when tied
    pub fn store_scalar(&self, var: &Rc<Referent>, value: Value) -> MagicResult<()> {
        let slot = scalar_slot(var)?;
        let value = self.resolve(&value)?;
        let binding = slot.borrow().tie.clone();
        match binding {
            Some(binding) => {
                self.call_required(&binding, "STORE", &[value])?;
            }
            None => slot.borrow_mut().value = value,
        }
        Ok(())
    }
}
