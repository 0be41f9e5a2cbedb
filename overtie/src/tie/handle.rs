//! I/O handle access, tied or plain
//!
//! An untied handle reads and writes a [`MemStream`]. A tied one hands each
//! operation to the handler; `READ` gets the caller's buffer as a scalar
//! reference so the handler can fill it in place.

use super::TieBinding;
use crate::error::{MagicError, MagicResult};
use crate::runtime::Runtime;
use crate::value::{HandleSlot, RefKind, Referent, Value, try_resize};
use std::cell::RefCell;
use std::rc::Rc;

/// In-memory byte stream with a read/write position
#[derive(Debug, Default, Clone)]
pub struct MemStream {
    data: Vec<u8>,
    pos: usize,
    closed: bool,
}

impl MemStream {
    pub fn with_input(input: &[u8]) -> Self {
        MemStream {
            data: input.to_vec(),
            ..Self::default()
        }
    }

    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Write at the current position, overwriting then extending.
    /// `None` when closed.
    pub fn write(&mut self, bytes: &[u8]) -> MagicResult<Option<usize>> {
        if self.closed {
            return Ok(None);
        }
        let end = self
            .pos
            .checked_add(bytes.len())
            .ok_or_else(|| MagicError::out_of_memory("handle write"))?;
        if end > self.data.len() {
            try_resize(&mut self.data, end, 0, "handle write")?;
        }
        self.data[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
        Ok(Some(bytes.len()))
    }

    /// Up to `len` bytes from the current position
    pub fn read(&mut self, len: usize) -> Vec<u8> {
        if self.closed {
            return Vec::new();
        }
        let start = self.pos.min(self.data.len());
        let end = start.saturating_add(len).min(self.data.len());
        self.pos = end;
        self.data[start..end].to_vec()
    }

    /// Next line including its newline; `None` at end of stream
    pub fn read_line(&mut self) -> Option<Vec<u8>> {
        if self.closed || self.pos >= self.data.len() {
            return None;
        }
        let rest = &self.data[self.pos..];
        let len = rest.iter().position(|&b| b == b'\n').map_or(rest.len(), |i| i + 1);
        Some(self.read(len))
    }

    pub fn getc(&mut self) -> Option<u8> {
        self.read(1).first().copied()
    }

    /// Reposition; `whence` is 0 (start), 1 (current) or 2 (end)
    pub fn seek(&mut self, offset: i64, whence: i64) -> bool {
        let base = match whence {
            0 => 0,
            1 => self.pos as i64,
            2 => self.data.len() as i64,
            _ => return false,
        };
        let Some(target) = base.checked_add(offset) else {
            return false;
        };
        if self.closed || target < 0 {
            return false;
        }
        self.pos = target as usize;
        true
    }

    pub fn tell(&self) -> i64 {
        if self.closed { -1 } else { self.pos as i64 }
    }

    pub fn eof(&self) -> bool {
        self.closed || self.pos >= self.data.len()
    }

    /// False when already closed
    pub fn close(&mut self) -> bool {
        !std::mem::replace(&mut self.closed, true)
    }
}

fn handle_slot(var: &Referent) -> MagicResult<&RefCell<HandleSlot>> {
    var.as_handle()
        .ok_or_else(|| MagicError::not_a_reference("GLOB", var.kind().as_str()))
}

fn binding(slot: &RefCell<HandleSlot>) -> Option<TieBinding> {
    slot.borrow().tie.clone()
}

fn text(bytes: Vec<u8>) -> Value {
    Value::from(String::from_utf8_lossy(&bytes).into_owned())
}

/// Start of a slice after counting a negative offset from the end
fn byte_offset(len: usize, offset: i64) -> MagicResult<usize> {
    let at = if offset < 0 { len as i64 + offset } else { offset };
    usize::try_from(at).map_err(|_| MagicError::handler("Offset outside string"))
}

impl Runtime {
    /// `PRINT(obj, items...)` when tied
    pub fn handle_print(&self, fh: &Rc<Referent>, items: &[Value]) -> MagicResult<bool> {
        let slot = handle_slot(fh)?;
        if let Some(binding) = binding(slot) {
            let out = self.call_required(&binding, "PRINT", items)?;
            return self.boolify(&out);
        }
        let mut line = String::new();
        for item in items {
            line.push_str(&self.stringify(item)?);
        }
        Ok(slot.borrow_mut().stream.write(line.as_bytes())?.is_some())
    }

    /// `PRINTF(obj, format, items...)` when tied
    pub fn handle_printf(&self, fh: &Rc<Referent>, format: &str, items: &[Value]) -> MagicResult<bool> {
        let slot = handle_slot(fh)?;
        if let Some(binding) = binding(slot) {
            let mut args = Vec::with_capacity(items.len() + 1);
            args.push(Value::str(format));
            args.extend_from_slice(items);
            let out = self.call_required(&binding, "PRINTF", &args)?;
            return self.boolify(&out);
        }
        let line = self.sprintf(format, items)?;
        Ok(slot.borrow_mut().stream.write(line.as_bytes())?.is_some())
    }

    /// One line, undef at end of input. `READLINE(obj)` when tied
    pub fn handle_readline(&self, fh: &Rc<Referent>) -> MagicResult<Value> {
        let slot = handle_slot(fh)?;
        match binding(slot) {
            Some(binding) => self.call_required(&binding, "READLINE", &[]),
            None => Ok(slot.borrow_mut().stream.read_line().map(text).unwrap_or_default()),
        }
    }

    /// Every remaining line
    pub fn handle_readlines(&self, fh: &Rc<Referent>) -> MagicResult<Vec<Value>> {
        let mut lines = Vec::new();
        loop {
            let line = self.resolve(&self.handle_readline(fh)?)?;
            if line.is_undef() {
                return Ok(lines);
            }
            lines.push(line);
        }
    }

    /// One character, undef at end of input. `GETC(obj)` when tied
    pub fn handle_getc(&self, fh: &Rc<Referent>) -> MagicResult<Value> {
        let slot = handle_slot(fh)?;
        match binding(slot) {
            Some(binding) => self.call_required(&binding, "GETC", &[]),
            None => Ok(slot
                .borrow_mut()
                .stream
                .getc()
                .map(|b| text(vec![b]))
                .unwrap_or_default()),
        }
    }

    /// Read up to `len` bytes into the scalar `buf` refers to, starting at
    /// `offset` in it (negative counts from the end). Returns the byte count.
    /// `READ(obj, buf, len, offset)` when tied, `buf` still a reference.
    pub fn handle_read(&self, fh: &Rc<Referent>, buf: &Value, len: i64, offset: i64) -> MagicResult<Value> {
        let slot = handle_slot(fh)?;
        let target = match buf {
            Value::Ref(r) if r.kind() == RefKind::Scalar => Rc::clone(r),
            other => return Err(MagicError::not_a_reference("SCALAR", other.type_name())),
        };
        if let Some(binding) = binding(slot) {
            return self.call_required(
                &binding,
                "READ",
                &[buf.clone(), Value::Int(len), Value::Int(offset)],
            );
        }
        let data = slot.borrow_mut().stream.read(len.max(0) as usize);
        let current = self.fetch_scalar(&target)?;
        let mut bytes = if current.is_undef() {
            Vec::new()
        } else {
            self.stringify(&current)?.into_bytes()
        };
        let at = byte_offset(bytes.len(), offset)?;
        try_resize(&mut bytes, at, 0, "handle read")?;
        bytes.extend_from_slice(&data);
        self.store_scalar(&target, text(bytes))?;
        Ok(Value::Int(data.len() as i64))
    }

    /// Write `len` bytes of `buf` from `offset` (default: the rest).
    /// Returns the byte count, undef on a closed handle.
    /// `WRITE(obj, buf, len, offset)` when tied.
    pub fn handle_write(&self, fh: &Rc<Referent>, buf: &Value, len: Option<i64>, offset: i64) -> MagicResult<Value> {
        let slot = handle_slot(fh)?;
        let buf = self.resolve(buf)?;
        let bytes = self.stringify(&buf)?.into_bytes();
        let start = byte_offset(bytes.len(), offset)?.min(bytes.len());
        let len = len.map_or(bytes.len() - start, |n| n.max(0) as usize);
        if let Some(binding) = binding(slot) {
            return self.call_required(
                &binding,
                "WRITE",
                &[buf, Value::Int(len as i64), Value::Int(offset)],
            );
        }
        let end = start.saturating_add(len).min(bytes.len());
        let written = slot.borrow_mut().stream.write(&bytes[start..end])?;
        Ok(written.map(|n| Value::Int(n as i64)).unwrap_or_default())
    }

    /// `SEEK(obj, pos, whence)`, false when the handler has none
    pub fn handle_seek(&self, fh: &Rc<Referent>, pos: i64, whence: i64) -> MagicResult<bool> {
        let slot = handle_slot(fh)?;
        match binding(slot) {
            Some(binding) => match self.call_optional(&binding, "SEEK", &[Value::Int(pos), Value::Int(whence)])? {
                Some(out) => self.boolify(&out),
                None => Ok(false),
            },
            None => Ok(slot.borrow_mut().stream.seek(pos, whence)),
        }
    }

    /// `TELL(obj)`, -1 when the handler has none
    pub fn handle_tell(&self, fh: &Rc<Referent>) -> MagicResult<i64> {
        let slot = handle_slot(fh)?;
        match binding(slot) {
            Some(binding) => match self.call_optional(&binding, "TELL", &[])? {
                Some(out) => Ok(match self.numify(&out)? {
                    Value::Int(n) => n,
                    Value::Float(x) => x as i64,
                    _ => -1,
                }),
                None => Ok(-1),
            },
            None => Ok(slot.borrow().stream.tell()),
        }
    }

    /// `EOF(obj)`, true when the handler has none
    pub fn handle_eof(&self, fh: &Rc<Referent>) -> MagicResult<bool> {
        let slot = handle_slot(fh)?;
        match binding(slot) {
            Some(binding) => match self.call_optional(&binding, "EOF", &[])? {
                Some(out) => self.boolify(&out),
                None => Ok(true),
            },
            None => Ok(slot.borrow().stream.eof()),
        }
    }

    /// `CLOSE(obj)`, true when the handler has none
    pub fn handle_close(&self, fh: &Rc<Referent>) -> MagicResult<bool> {
        let slot = handle_slot(fh)?;
        match binding(slot) {
            Some(binding) => match self.call_optional(&binding, "CLOSE", &[])? {
                Some(out) => self.boolify(&out),
                None => Ok(true),
            },
            None => Ok(slot.borrow_mut().stream.close()),
        }
    }

    /// `BINMODE(obj[, layer])`, true when the handler has none
    pub fn handle_binmode(&self, fh: &Rc<Referent>, layer: Option<&str>) -> MagicResult<bool> {
        let slot = handle_slot(fh)?;
        match binding(slot) {
            Some(binding) => {
                let args: Vec<Value> = layer.map(Value::str).into_iter().collect();
                match self.call_optional(&binding, "BINMODE", &args)? {
                    Some(out) => self.boolify(&out),
                    None => Ok(true),
                }
            }
            None => Ok(!slot.borrow().stream.is_closed()),
        }
    }

    /// `FILENO(obj)`, undef when the handler has none. In-memory streams
    /// report -1 while open.
    pub fn handle_fileno(&self, fh: &Rc<Referent>) -> MagicResult<Value> {
        let slot = handle_slot(fh)?;
        match binding(slot) {
            Some(binding) => Ok(self.call_optional(&binding, "FILENO", &[])?.unwrap_or_default()),
            None if slot.borrow().stream.is_closed() => Ok(Value::Undef),
            None => Ok(Value::Int(-1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tie::fixtures::this;
    use crate::value::Code;

    /// Handle class collecting output in an array and serving canned lines
    fn capture_class(rt: &Runtime) {
        let h = rt.classes();
        h.define_method("Capture", "TIEHANDLE", Code::new("TIEHANDLE", |rt, args| {
            let lines: Vec<Value> = args[2..].to_vec();
            Ok(rt.bless(&Referent::array(lines), "Capture"))
        }));
        h.define_method("Capture", "PRINT", Code::new("PRINT", |rt, args| {
            let mut line = String::new();
            for item in &args[1..] {
                line.push_str(&rt.stringify(item)?);
            }
            rt.array_push(&this(args)?, &[Value::from(line)])?;
            Ok(Value::Int(1))
        }));
        h.define_method("Capture", "PRINTF", Code::new("PRINTF", |rt, args| {
            let format = rt.stringify(&args[1])?;
            let line = rt.sprintf(&format, &args[2..])?;
            rt.array_push(&this(args)?, &[Value::from(line)])?;
            Ok(Value::Int(1))
        }));
        h.define_method("Capture", "READLINE", Code::new("READLINE", |rt, args| rt.array_shift(&this(args)?)));
        h.define_method("Capture", "READ", Code::new("READ", |rt, args| {
            // Fill the caller's buffer through the reference
            rt.assign(&args[1], Value::str("filled"))?;
            Ok(Value::Int(6))
        }));
    }

    #[test]
    fn test_mem_stream() {
        let mut s = MemStream::with_input(b"ab\ncd");
        assert_eq!(s.read_line(), Some(b"ab\n".to_vec()));
        assert_eq!(s.getc(), Some(b'c'));
        assert_eq!(s.tell(), 4);
        assert!(!s.eof());
        assert_eq!(s.read_line(), Some(b"d".to_vec()));
        assert!(s.eof());
        assert!(s.seek(0, 0));
        assert_eq!(s.write(b"XY").unwrap(), Some(2));
        assert_eq!(s.contents(), b"XY\ncd");
        assert!(s.seek(-1, 2));
        assert_eq!(s.read(10), b"d".to_vec());
        assert!(!s.seek(-10, 1));
        assert!(s.close());
        assert!(!s.close());
        assert_eq!(s.write(b"z").unwrap(), None);
    }

    #[test]
    fn test_mem_stream_far_positions() {
        let mut s = MemStream::with_input(b"abc");
        assert!(s.seek(i64::MAX, 0));
        assert!(!s.seek(i64::MAX, 1));
        assert_eq!(s.tell(), i64::MAX);
        let err = s.write(b"x").unwrap_err();
        assert!(matches!(err, MagicError::OutOfMemory { .. }));
        assert!(s.read(usize::MAX).is_empty());
        assert_eq!(s.contents(), b"abc");
        assert!(s.seek(1, 0));
        assert_eq!(s.read(usize::MAX), b"bc".to_vec());
    }

    #[test]
    fn test_plain_handle() {
        let rt = Runtime::new();
        let fh = Referent::handle();
        assert!(rt.handle_print(&fh, &[Value::str("n="), Value::Int(3), Value::str("\n")]).unwrap());
        assert!(rt.handle_printf(&fh, "%03d|%s\n", &[Value::Int(7), Value::str("x")]).unwrap());
        assert!(rt.handle_seek(&fh, 0, 0).unwrap());
        let lines = rt.handle_readlines(&fh).unwrap();
        assert_eq!(lines, vec![Value::str("n=3\n"), Value::str("007|x\n")]);
        assert!(rt.handle_eof(&fh).unwrap());
        assert_eq!(rt.handle_fileno(&fh).unwrap(), Value::Int(-1));
        assert!(rt.handle_close(&fh).unwrap());
        assert_eq!(rt.handle_tell(&fh).unwrap(), -1);
        assert_eq!(rt.handle_fileno(&fh).unwrap(), Value::Undef);
    }

    #[test]
    fn test_plain_read_into_buffer() {
        let rt = Runtime::new();
        let fh = Referent::handle_with_input("hello world");
        let buf = Referent::scalar(Value::str("0123"));
        let n = rt.handle_read(&fh, &Value::Ref(Rc::clone(&buf)), 5, 2).unwrap();
        assert_eq!(n, Value::Int(5));
        assert_eq!(rt.fetch_scalar(&buf).unwrap(), Value::str("01hello"));
        assert_eq!(rt.handle_getc(&fh).unwrap(), Value::str(" "));
        let n = rt.handle_read(&fh, &Value::Ref(Rc::clone(&buf)), 100, -1).unwrap();
        assert_eq!(n, Value::Int(5));
        assert_eq!(rt.fetch_scalar(&buf).unwrap(), Value::str("01hellworld"));
        assert!(rt.handle_read(&fh, &Value::Int(0), 1, 0).is_err());
    }

    #[test]
    fn test_plain_handle_out_of_range() {
        let rt = Runtime::new();
        let fh = Referent::handle();
        assert!(rt.handle_seek(&fh, i64::MAX, 0).unwrap());
        assert!(!rt.handle_seek(&fh, i64::MAX, 1).unwrap());
        let err = rt.handle_write(&fh, &Value::str("x"), None, 0).unwrap_err();
        assert!(matches!(err, MagicError::OutOfMemory { .. }));
        assert!(rt.handle_print(&fh, &[Value::str("x")]).is_err());

        let input = Referent::handle_with_input("data");
        let buf = Referent::scalar(Value::Undef);
        let err = rt.handle_read(&input, &Value::Ref(Rc::clone(&buf)), 4, i64::MAX).unwrap_err();
        assert!(matches!(err, MagicError::OutOfMemory { .. }));
        assert_eq!(rt.fetch_scalar(&buf).unwrap(), Value::Undef);
    }

    #[test]
    fn test_plain_write_slices() {
        let rt = Runtime::new();
        let fh = Referent::handle();
        let out = rt.handle_write(&fh, &Value::str("abcdef"), Some(3), 1).unwrap();
        assert_eq!(out, Value::Int(3));
        let out = rt.handle_write(&fh, &Value::str("xyz"), None, -1).unwrap();
        assert_eq!(out, Value::Int(1));
        let stream = fh.as_handle().unwrap().borrow().stream.clone();
        assert_eq!(stream.contents(), b"bcdz");
    }

    #[test]
    fn test_tied_handle() {
        let rt = Runtime::new();
        capture_class(&rt);
        let fh = Referent::handle();
        let obj = rt.tie(&fh, "Capture", &[Value::str("first\n"), Value::str("second\n")]).unwrap();
        assert!(rt.handle_print(&fh, &[Value::str("a"), Value::Int(1)]).unwrap());
        assert!(rt.handle_printf(&fh, "%s-%d", &[Value::str("b"), Value::Int(2)]).unwrap());
        assert_eq!(rt.handle_readline(&fh).unwrap(), Value::str("first\n"));
        let inner = obj.as_referent().unwrap();
        assert_eq!(rt.array_fetch(inner, -2).unwrap(), Value::str("a1"));
        assert_eq!(rt.array_fetch(inner, -1).unwrap(), Value::str("b-2"));
        // Nothing written to native storage
        assert!(fh.as_handle().unwrap().borrow().stream.contents().is_empty());
    }

    #[test]
    fn test_tied_read_fills_callers_buffer() {
        let rt = Runtime::new();
        capture_class(&rt);
        let fh = Referent::handle();
        rt.tie(&fh, "Capture", &[]).unwrap();
        let buf = Referent::scalar(Value::Undef);
        let n = rt.handle_read(&fh, &Value::Ref(Rc::clone(&buf)), 6, 0).unwrap();
        assert_eq!(n, Value::Int(6));
        assert_eq!(rt.fetch_scalar(&buf).unwrap(), Value::str("filled"));
    }

    #[test]
    fn test_tied_optional_defaults_and_required() {
        let rt = Runtime::new();
        capture_class(&rt);
        let fh = Referent::handle();
        rt.tie(&fh, "Capture", &[]).unwrap();
        assert!(!rt.handle_seek(&fh, 0, 0).unwrap());
        assert_eq!(rt.handle_tell(&fh).unwrap(), -1);
        assert!(rt.handle_eof(&fh).unwrap());
        assert!(rt.handle_close(&fh).unwrap());
        assert!(rt.handle_binmode(&fh, Some(":raw")).unwrap());
        assert_eq!(rt.handle_fileno(&fh).unwrap(), Value::Undef);
        let err = rt.handle_getc(&fh).unwrap_err();
        assert!(matches!(err, MagicError::MissingRequiredMethod { ref method, .. } if method == "GETC"));
        let err = rt.handle_write(&fh, &Value::str("x"), None, 0).unwrap_err();
        assert!(matches!(err, MagicError::MissingRequiredMethod { ref method, .. } if method == "WRITE"));
    }
}
