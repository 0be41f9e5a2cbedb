//! Overload dispatch: conversions, dereference, unary and binary operators
//!
//! Handlers are called as `(object, other, swapped, operator)` where
//! `swapped` is true when the object was the right-hand operand.
//!
//! Conversion order for a blessed value with a context:
//!
//! 1. the conversion's own key (`(""`, `(0+`, `(bool`);
//! 2. unless `fallback` is false, the other two keys (stringify tries
//!    `(0+` then `(bool`, numify `(""` then `(bool`, boolify `(0+` then `(""`);
//! 3. the built-in default for the reference itself.
//!
//! A handler that hands back its own invocant ends the chain: the result is
//! used as is, with the default meaning, instead of being dispatched again.

use super::context::OverloadContext;
use super::{Conversion, NOMETHOD, deref_key, op_key, op_name};
use crate::error::{MagicError, MagicResult};
use crate::ops::{self, BinaryOp, Operands};
use crate::runtime::Runtime;
use crate::value::{RefKind, Referent, Value};
use std::rc::Rc;
use tracing::trace;

/// Unary operators that can be overloaded
pub const UNARY_OPS: [&str; 5] = ["neg", "!", "abs", "++", "--"];

fn handler_args(object: &Value, other: &Value, swapped: bool, op: &str) -> [Value; 4] {
    [
        object.clone(),
        other.clone(),
        Value::from_bool(swapped),
        Value::str(op),
    ]
}

impl Runtime {
    /// Value of a proxy, anything else unchanged
    fn plain_operand(&self, value: &Value) -> MagicResult<Value> {
        self.resolve(value)
    }

    /// Apply the conversion chain and return a plain scalar or a reference
    /// that should get the default treatment
    fn convert(&self, value: &Value, conv: Conversion) -> MagicResult<Value> {
        let mut current = self.plain_operand(value)?;
        let mut seen: Vec<usize> = Vec::new();
        loop {
            let Some(ctx) = self.context_of(&current) else {
                return Ok(current);
            };
            let args = handler_args(&current, &Value::Undef, false, op_name(conv.key()));
            let mut result = self.try_operator(&ctx, conv.key(), &args)?;
            if result.is_none() && ctx.fallback() != Some(false) {
                result = self.try_fallback(&ctx, &conv.fallback_keys(), &args)?;
            }
            let Some(out) = result else {
                trace!(class = %ctx.class(), key = conv.key(), "conversion falls back to default");
                return Ok(current);
            };
            let out = self.plain_operand(&out)?;
            let Value::Ref(next) = &out else {
                return Ok(out);
            };
            if out.same_referent(&current) || seen.contains(&next.addr()) {
                trace!(class = %ctx.class(), key = conv.key(), "conversion returned its invocant");
                return Ok(out);
            }
            if next.class().is_none() {
                return Err(MagicError::invalid_return(
                    op_name(conv.key()),
                    ctx.class(),
                    format!("conversion returned an unblessed {} reference", next.kind().as_str()),
                ));
            }
            if let Value::Ref(r) = &current {
                seen.push(r.addr());
            }
            current = out;
        }
    }

    /// String value, through `(""` and its fallbacks
    pub fn stringify(&self, value: &Value) -> MagicResult<String> {
        Ok(self.convert(value, Conversion::Stringify)?.to_string())
    }

    /// Numeric value (`Int` or `Float`), through `(0+` and its fallbacks
    pub fn numify(&self, value: &Value) -> MagicResult<Value> {
        Ok(ops::plain_number(&self.convert(value, Conversion::Numify)?))
    }

    /// Truth, through `(bool` and its fallbacks
    pub fn boolify(&self, value: &Value) -> MagicResult<bool> {
        Ok(ops::plain_truth(&self.convert(value, Conversion::Boolify)?))
    }

    /// Dereference `value` as a `kind` container, honouring `(@{}`, `(%{}`,
    /// `(${}`, `(&{}` and `(*{}`.
    ///
    /// The handler result is dereferenced again while it is a different
    /// overloaded object; returning the invocant (or any object already
    /// visited) stops the chain and uses that object's own storage.
    pub fn deref(&self, value: &Value, kind: RefKind) -> MagicResult<Rc<Referent>> {
        let key = deref_key(kind);
        let mut current = match self.plain_operand(value)? {
            Value::Ref(r) => r,
            other => return Err(MagicError::not_a_reference(kind.as_str(), other.type_name())),
        };
        let mut seen = vec![current.addr()];
        let mut last_class = None;
        while let Some(ctx) = current.class().and_then(|c| self.overload_context(&c)) {
            let args = handler_args(&Value::Ref(Rc::clone(&current)), &Value::Undef, false, op_name(key));
            let Some(out) = self.try_operator(&ctx, key, &args)? else {
                break;
            };
            let out = self.plain_operand(&out)?;
            let Value::Ref(next) = out else {
                return Err(MagicError::invalid_return(
                    op_name(key),
                    ctx.class(),
                    "dereference did not return a reference",
                ));
            };
            last_class = Some(ctx.class().clone());
            if seen.contains(&next.addr()) {
                trace!(class = %ctx.class(), key, "dereference returned a visited object");
                current = next;
                break;
            }
            seen.push(next.addr());
            current = next;
        }
        if current.kind() != kind {
            return Err(match last_class {
                Some(class) => MagicError::invalid_return(
                    op_name(key),
                    &class,
                    format!("dereference returned a {} reference", current.kind().as_str()),
                ),
                None => MagicError::not_a_reference(kind.as_str(), current.kind().as_str()),
            });
        }
        Ok(current)
    }

    /// Binary operator dispatch.
    ///
    /// Left operand's handler, then the right operand's with `swapped` set,
    /// then autogeneration (assignment forms from the plain operator,
    /// relational operators from `<=>` / `cmp`) unless `fallback` is false,
    /// then `nomethod` on either side. `None` means nothing applies.
    pub fn try_binary(&self, left: &Value, right: &Value, op: &str) -> MagicResult<Option<Value>> {
        let left = self.plain_operand(left)?;
        let right = self.plain_operand(right)?;
        let key = op_key(op);
        let name = op_name(&key);
        let sides = [
            (self.context_of(&left), &left, &right, false),
            (self.context_of(&right), &right, &left, true),
        ];

        for (ctx, object, other, swapped) in &sides {
            if let Some(ctx) = ctx
                && ctx.defines(&key)
            {
                let args = handler_args(object, other, *swapped, name);
                return self.try_operator(ctx, &key, &args);
            }
        }

        for (ctx, object, other, swapped) in &sides {
            if let Some(ctx) = ctx
                && ctx.fallback() != Some(false)
                && let Some(out) = self.autogenerate_binary(ctx, object, other, *swapped, name)?
            {
                return Ok(Some(out));
            }
        }

        for (ctx, object, other, swapped) in &sides {
            if let Some(ctx) = ctx
                && ctx.defines(NOMETHOD)
            {
                trace!(class = %ctx.class(), op = name, "nomethod");
                let args = handler_args(object, other, *swapped, name);
                return self.try_operator(ctx, NOMETHOD, &args);
            }
        }

        Ok(None)
    }

    fn autogenerate_binary(
        &self,
        ctx: &OverloadContext,
        object: &Value,
        other: &Value,
        swapped: bool,
        op: &str,
    ) -> MagicResult<Option<Value>> {
        if let Some(base) = ops::assignment_base(op) {
            let base_key = op_key(base);
            if ctx.defines(&base_key) {
                trace!(class = %ctx.class(), op, base, "assignment form autogenerated");
                let args = handler_args(object, other, swapped, base);
                return self.try_operator(ctx, &base_key, &args);
            }
            return Ok(None);
        }
        let Some((three_way, holds)) = BinaryOp::from_symbol(op).and_then(BinaryOp::three_way) else {
            return Ok(None);
        };
        let cmp_key = op_key(three_way);
        if !ctx.defines(&cmp_key) {
            return Ok(None);
        }
        trace!(class = %ctx.class(), op, via = three_way, "comparison autogenerated");
        let args = handler_args(object, other, swapped, three_way);
        let Some(order) = self.try_operator(ctx, &cmp_key, &args)? else {
            return Ok(None);
        };
        let order = match self.numify(&order)? {
            Value::Int(n) => n.signum(),
            Value::Float(x) if x.is_nan() => return Ok(Some(Value::from_bool(false))),
            Value::Float(x) => x.signum() as i64,
            _ => 0,
        };
        let ord = order.cmp(&0);
        Ok(Some(Value::from_bool(holds.contains(&ord))))
    }

    /// Unary operator dispatch for `neg`, `!`, `abs`, `++` and `--`.
    ///
    /// Own handler first, then (unless `fallback` is false) `neg` as
    /// `0 - x`, `!` from the truth conversions, `abs` from `<` and `neg`,
    /// `++`/`--` from `+`/`-`, then `nomethod`.
    pub fn try_unary(&self, operand: &Value, op: &str) -> MagicResult<Option<Value>> {
        let operand = self.plain_operand(operand)?;
        if !UNARY_OPS.contains(&op) {
            let class = operand.blessed().map(|c| c.to_string()).unwrap_or_default();
            return Err(MagicError::unsupported_operator(op, class));
        }
        let Some(ctx) = self.context_of(&operand) else {
            return Ok(None);
        };
        let key = op_key(op);
        let name = op_name(&key);
        if ctx.defines(&key) {
            let args = handler_args(&operand, &Value::Undef, false, name);
            return self.try_operator(&ctx, &key, &args);
        }
        if ctx.fallback() != Some(false)
            && let Some(out) = self.autogenerate_unary(&ctx, &operand, name)?
        {
            return Ok(Some(out));
        }
        if ctx.defines(NOMETHOD) {
            let args = handler_args(&operand, &Value::Undef, false, name);
            return self.try_operator(&ctx, NOMETHOD, &args);
        }
        Ok(None)
    }

    fn autogenerate_unary(&self, ctx: &OverloadContext, operand: &Value, op: &str) -> MagicResult<Option<Value>> {
        match op {
            "neg" if ctx.defines("(-") => {
                let args = handler_args(operand, &Value::Int(0), true, "-");
                self.try_operator(ctx, "(-", &args)
            }
            "!" if ctx.has_conversion() => Ok(Some(Value::from_bool(!self.boolify(operand)?))),
            "abs" if ctx.defines("(-") && (ctx.defines("(<") || ctx.defines("(<=>")) => {
                let negative = match self.try_binary(operand, &Value::Int(0), "<")? {
                    Some(flag) => self.boolify(&flag)?,
                    None => return Ok(None),
                };
                if negative {
                    self.try_unary(operand, "neg")
                } else {
                    Ok(Some(operand.clone()))
                }
            }
            "++" if ctx.defines("(+") => {
                let args = handler_args(operand, &Value::Int(1), false, "+");
                self.try_operator(ctx, "(+", &args)
            }
            "--" if ctx.defines("(-") => {
                let args = handler_args(operand, &Value::Int(1), false, "-");
                self.try_operator(ctx, "(-", &args)
            }
            _ => Ok(None),
        }
    }

    /// Whether plain semantics may stand in for a missing handler on `value`
    fn plain_fallback_allowed(&self, value: &Value, op: &str) -> MagicResult<()> {
        let Some(ctx) = self.context_of(value) else {
            return Ok(());
        };
        let allowed = match ctx.fallback() {
            Some(true) => true,
            Some(false) => false,
            None => ctx.has_conversion(),
        };
        if allowed {
            Ok(())
        } else {
            Err(MagicError::unsupported_operator(op, ctx.class()))
        }
    }

    /// Binary operator as the calling layer sees it: overloaded result, or
    /// plain semantics on converted operands where the fallback policy
    /// permits, or `UnsupportedOperator`
    pub fn binary_op(&self, left: &Value, right: &Value, op: &str) -> MagicResult<Value> {
        if let Some(out) = self.try_binary(left, right, op)? {
            return Ok(out);
        }
        let left = self.plain_operand(left)?;
        let right = self.plain_operand(right)?;
        self.plain_fallback_allowed(&left, op)?;
        self.plain_fallback_allowed(&right, op)?;
        let symbol = ops::assignment_base(op).unwrap_or(op);
        let Some(bin) = BinaryOp::from_symbol(symbol) else {
            let class = left.blessed().or_else(|| right.blessed());
            return Err(MagicError::unsupported_operator(
                op,
                class.map(|c| c.to_string()).unwrap_or_default(),
            ));
        };
        match bin.operands() {
            Operands::Numeric => ops::numeric(bin, &self.numify(&left)?, &self.numify(&right)?),
            Operands::Stringy => Ok(ops::stringy(bin, &self.stringify(&left)?, &self.stringify(&right)?)),
            Operands::Repeat => ops::repeat(&self.stringify(&left)?, &self.numify(&right)?),
        }
    }

    /// Unary operator with the same fallback policy as [`Runtime::binary_op`]
    pub fn unary_op(&self, operand: &Value, op: &str) -> MagicResult<Value> {
        if let Some(out) = self.try_unary(operand, op)? {
            return Ok(out);
        }
        let operand = self.plain_operand(operand)?;
        self.plain_fallback_allowed(&operand, op)?;
        match op {
            "!" => Ok(Value::from_bool(!self.boolify(&operand)?)),
            "neg" => ops::numeric(BinaryOp::Sub, &Value::Int(0), &self.numify(&operand)?),
            "abs" => match self.numify(&operand)? {
                Value::Int(n) => Ok(n.checked_abs().map(Value::Int).unwrap_or(Value::Float((n as f64).abs()))),
                Value::Float(x) => Ok(Value::Float(x.abs())),
                _ => Ok(Value::Int(0)),
            },
            "++" => ops::numeric(BinaryOp::Add, &self.numify(&operand)?, &Value::Int(1)),
            "--" => ops::numeric(BinaryOp::Sub, &self.numify(&operand)?, &Value::Int(1)),
            _ => Err(MagicError::unsupported_operator(
                op,
                operand.blessed().map(|c| c.to_string()).unwrap_or_default(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overload::OverloadHandler;
    use crate::value::Code;
    use std::cell::RefCell;

    fn constant(text: &'static str) -> Code {
        Code::new(text, move |_, _| Ok(Value::str(text)))
    }

    fn object(rt: &Runtime, class: &str) -> Value {
        rt.bless(&Referent::empty_hash(), class)
    }

    #[test]
    fn test_stringify_direct() {
        let rt = Runtime::new();
        rt.classes().overload("S", "\"\"", constant("X"));
        assert_eq!(rt.stringify(&object(&rt, "S")).unwrap(), "X");
    }

    #[test]
    fn test_plain_values_use_defaults() {
        let rt = Runtime::new();
        assert_eq!(rt.stringify(&Value::Int(3)).unwrap(), "3");
        assert_eq!(rt.numify(&Value::str("2.5x")).unwrap(), Value::Float(2.5));
        assert!(!rt.boolify(&Value::str("0")).unwrap());
        let r = Referent::array(vec![]);
        assert!(rt.stringify(&Value::Ref(Rc::clone(&r))).unwrap().starts_with("ARRAY(0x"));
        assert_eq!(rt.numify(&Value::Ref(Rc::clone(&r))).unwrap(), Value::Int(r.addr() as i64));
        assert!(rt.boolify(&Value::Ref(r)).unwrap());
    }

    #[test]
    fn test_numify_falls_back_to_string_handler() {
        let rt = Runtime::new();
        rt.classes().overload("S", "\"\"", Code::new("str", |_, _| Ok(Value::str("12abc"))));
        assert_eq!(rt.numify(&object(&rt, "S")).unwrap(), Value::Int(12));
    }

    #[test]
    fn test_boolify_prefers_numify_over_stringify() {
        let rt = Runtime::new();
        rt.classes().overload("B", "\"\"", constant("text"));
        rt.classes().overload("B", "0+", Code::new("zero", |_, _| Ok(Value::Int(0))));
        assert!(!rt.boolify(&object(&rt, "B")).unwrap());
    }

    #[test]
    fn test_fallback_false_skips_alternates() {
        let rt = Runtime::new();
        let calls = Rc::new(RefCell::new(0));
        let seen = Rc::clone(&calls);
        rt.classes().overload(
            "N",
            "0+",
            Code::new("num", move |_, _| {
                *seen.borrow_mut() += 1;
                Ok(Value::Int(7))
            }),
        );
        rt.classes().set_fallback("N", Some(false));
        let obj = object(&rt, "N");
        assert!(rt.stringify(&obj).unwrap().starts_with("N=HASH(0x"));
        assert_eq!(*calls.borrow(), 0);
        assert_eq!(rt.numify(&obj).unwrap(), Value::Int(7));
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn test_conversion_returning_self_uses_default() {
        let rt = Runtime::new();
        rt.classes().overload("Me", "\"\"", Code::new("me", |_, args| Ok(args[0].clone())));
        let obj = object(&rt, "Me");
        assert!(rt.stringify(&obj).unwrap().starts_with("Me=HASH(0x"));
    }

    #[test]
    fn test_conversion_chains_through_other_objects() {
        let rt = Runtime::new();
        rt.classes().overload("Inner", "\"\"", constant("inner"));
        let inner = object(&rt, "Inner");
        let held = inner.clone();
        rt.classes().overload("Outer", "\"\"", Code::new("outer", move |_, _| Ok(held.clone())));
        assert_eq!(rt.stringify(&object(&rt, "Outer")).unwrap(), "inner");
    }

    #[test]
    fn test_conversion_cycle_between_objects_terminates() {
        let rt = Runtime::new();
        let a = object(&rt, "Ping");
        let b = object(&rt, "Pong");
        let to_b = b.clone();
        let to_a = a.clone();
        rt.classes().overload("Ping", "\"\"", Code::new("ping", move |_, _| Ok(to_b.clone())));
        rt.classes().overload("Pong", "\"\"", Code::new("pong", move |_, _| Ok(to_a.clone())));
        assert!(rt.stringify(&a).unwrap().starts_with("Ping=HASH(0x"));
    }

    #[test]
    fn test_unblessed_reference_from_conversion_is_invalid() {
        let rt = Runtime::new();
        rt.classes().overload(
            "Bad",
            "\"\"",
            Code::new("bad", |_, _| Ok(Value::Ref(Referent::array(vec![])))),
        );
        let err = rt.stringify(&object(&rt, "Bad")).unwrap_err();
        assert!(matches!(err, MagicError::InvalidHandlerReturn { .. }));
    }

    #[test]
    fn test_deref_to_other_container() {
        let rt = Runtime::new();
        let backing = Referent::array(vec![Value::Int(1)]);
        let held = Rc::clone(&backing);
        rt.classes().overload("Wrap", "@{}", Code::new("arr", move |_, _| Ok(Value::Ref(Rc::clone(&held)))));
        let got = rt.deref(&object(&rt, "Wrap"), RefKind::Array).unwrap();
        assert!(Rc::ptr_eq(&got, &backing));
    }

    #[test]
    fn test_deref_without_handler_uses_own_storage() {
        let rt = Runtime::new();
        rt.classes().overload("Str", "\"\"", constant("s"));
        let obj = object(&rt, "Str");
        let got = rt.deref(&obj, RefKind::Hash).unwrap();
        assert!(Value::Ref(got).same_referent(&obj));
        let err = rt.deref(&obj, RefKind::Array).unwrap_err();
        assert!(matches!(err, MagicError::NotAReference { .. }));
    }

    #[test]
    fn test_deref_non_reference() {
        let rt = Runtime::new();
        let err = rt.deref(&Value::Int(3), RefKind::Array).unwrap_err();
        assert!(matches!(err, MagicError::NotAReference { .. }));
    }

    #[test]
    fn test_deref_wrong_shape_is_invalid_return() {
        let rt = Runtime::new();
        rt.classes().overload("W", "%{}", Code::new("scalar", |_, _| Ok(Value::Int(1))));
        let err = rt.deref(&object(&rt, "W"), RefKind::Hash).unwrap_err();
        assert!(matches!(err, MagicError::InvalidHandlerReturn { .. }));

        rt.classes().overload("W", "%{}", Code::new("array", |_, _| Ok(Value::Ref(Referent::array(vec![])))));
        let err = rt.deref(&object(&rt, "W"), RefKind::Hash).unwrap_err();
        assert!(matches!(err, MagicError::InvalidHandlerReturn { .. }));
    }

    #[test]
    fn test_binary_left_handler() {
        let rt = Runtime::new();
        rt.classes().overload("A", "-", Code::new("sub", |_, args| {
            let swapped = crate::ops::plain_truth(&args[2]);
            Ok(Value::str(if swapped { "swapped" } else { "straight" }))
        }));
        let a = object(&rt, "A");
        assert_eq!(rt.binary_op(&a, &Value::Int(1), "-").unwrap(), Value::str("straight"));
        assert_eq!(rt.binary_op(&Value::Int(1), &a, "-").unwrap(), Value::str("swapped"));
    }

    #[test]
    fn test_left_operand_wins_when_both_overload() {
        let rt = Runtime::new();
        rt.classes().overload("L", "+", constant("left"));
        rt.classes().overload("R", "+", constant("right"));
        let out = rt.try_binary(&object(&rt, "L"), &object(&rt, "R"), "+").unwrap();
        assert_eq!(out, Some(Value::str("left")));
        let out = rt.try_binary(&object(&rt, "R"), &object(&rt, "L"), "+").unwrap();
        assert_eq!(out, Some(Value::str("right")));
    }

    #[test]
    fn test_assignment_form_autogenerated() {
        let rt = Runtime::new();
        rt.classes().overload("A", "+", Code::new("add", |_, args| Ok(args[3].clone())));
        let out = rt.try_binary(&object(&rt, "A"), &Value::Int(1), "+=").unwrap();
        assert_eq!(out, Some(Value::str("+")));
    }

    #[test]
    fn test_comparison_autogenerated_from_spaceship() {
        let rt = Runtime::new();
        // Objects compare by the number stored under "n"
        rt.classes().overload("Num", "<=>", Code::new("cmp", |rt, args| {
            let own = rt.hash_fetch(&rt.deref(&args[0], RefKind::Hash)?, "n")?;
            let (a, b) = if crate::ops::plain_truth(&args[2]) {
                (args[1].clone(), own)
            } else {
                (own, args[1].clone())
            };
            rt.binary_op(&a, &b, "<=>")
        }));
        let three = rt.bless(&Referent::hash([("n", Value::Int(3))]), "Num");
        assert_eq!(rt.binary_op(&three, &Value::Int(5), "<").unwrap(), Value::Int(1));
        assert_eq!(rt.binary_op(&Value::Int(5), &three, "<").unwrap(), Value::str(""));
        assert_eq!(rt.binary_op(&three, &Value::Int(3), "==").unwrap(), Value::Int(1));
        assert_eq!(rt.binary_op(&three, &Value::Int(3), "!=").unwrap(), Value::str(""));
    }

    #[test]
    fn test_fallback_false_blocks_autogeneration() {
        let rt = Runtime::new();
        rt.classes().overload("A", "+", constant("add"));
        rt.classes().set_fallback("A", Some(false));
        assert_eq!(rt.try_binary(&object(&rt, "A"), &Value::Int(1), "+=").unwrap(), None);
        let err = rt.binary_op(&object(&rt, "A"), &Value::Int(1), "+=").unwrap_err();
        assert!(matches!(err, MagicError::UnsupportedOperator { .. }));
    }

    #[test]
    fn test_nomethod_receives_operator_name() {
        let rt = Runtime::new();
        rt.classes().overload("Any", "nomethod", Code::new("nm", |_, args| {
            Ok(Value::from(format!("{}:{}", args[3], crate::ops::plain_truth(&args[2]))))
        }));
        let obj = object(&rt, "Any");
        assert_eq!(rt.binary_op(&obj, &Value::Int(2), "*").unwrap(), Value::str("*:false"));
        assert_eq!(rt.binary_op(&Value::Int(2), &obj, "*").unwrap(), Value::str("*:true"));
    }

    #[test]
    fn test_no_overload_found() {
        let rt = Runtime::new();
        rt.classes().overload("Only", "-", constant("sub"));
        assert_eq!(rt.try_binary(&object(&rt, "Only"), &Value::Int(1), "*").unwrap(), None);
        let err = rt.binary_op(&object(&rt, "Only"), &Value::Int(1), "*").unwrap_err();
        assert!(matches!(err, MagicError::UnsupportedOperator { ref class, .. } if class == "Only"));
    }

    #[test]
    fn test_plain_semantics_through_conversion() {
        let rt = Runtime::new();
        rt.classes().overload("Ten", "0+", Code::new("ten", |_, _| Ok(Value::Int(10))));
        let ten = object(&rt, "Ten");
        assert_eq!(rt.binary_op(&ten, &Value::Int(5), "+").unwrap(), Value::Int(15));
        assert_eq!(rt.binary_op(&ten, &Value::str("x"), ".").unwrap(), Value::str("10x"));
        assert_eq!(rt.binary_op(&Value::Int(2), &Value::Int(3), "*").unwrap(), Value::Int(6));
    }

    #[test]
    fn test_fallback_true_allows_plain_semantics_without_conversion() {
        let rt = Runtime::new();
        rt.classes().overload("F", "-", constant("sub"));
        rt.classes().set_fallback("F", Some(true));
        let obj = object(&rt, "F");
        let out = rt.binary_op(&obj, &Value::str("!"), ".").unwrap();
        assert!(out.to_string().starts_with("F=HASH(0x"));
    }

    #[test]
    fn test_unary_neg_from_subtraction() {
        let rt = Runtime::new();
        rt.classes().overload("A", "-", Code::new("sub", |_, args| {
            Ok(Value::from(format!("{}-{}", args[1], crate::ops::plain_truth(&args[2]))))
        }));
        let out = rt.unary_op(&object(&rt, "A"), "neg").unwrap();
        assert_eq!(out, Value::str("0-true"));
    }

    #[test]
    fn test_unary_not_from_bool() {
        let rt = Runtime::new();
        rt.classes().overload("T", "bool", Code::new("t", |_, _| Ok(Value::Int(1))));
        assert_eq!(rt.unary_op(&object(&rt, "T"), "!").unwrap(), Value::str(""));
    }

    #[test]
    fn test_unary_direct_and_plain() {
        let rt = Runtime::new();
        rt.classes().overload("A", "abs", constant("absolute"));
        assert_eq!(rt.unary_op(&object(&rt, "A"), "abs").unwrap(), Value::str("absolute"));
        assert_eq!(rt.unary_op(&Value::Int(-4), "abs").unwrap(), Value::Int(4));
        assert_eq!(rt.unary_op(&Value::Int(4), "neg").unwrap(), Value::Int(-4));
        assert_eq!(rt.unary_op(&Value::Int(4), "++").unwrap(), Value::Int(5));
    }

    #[test]
    fn test_unknown_unary_rejected() {
        let rt = Runtime::new();
        let calls = Rc::new(RefCell::new(0));
        let seen = Rc::clone(&calls);
        rt.classes().overload(
            "N",
            "nomethod",
            Code::new("nm", move |_, _| {
                *seen.borrow_mut() += 1;
                Ok(Value::Undef)
            }),
        );
        let err = rt.unary_op(&object(&rt, "N"), "~~").unwrap_err();
        assert!(matches!(err, MagicError::UnsupportedOperator { ref op, ref class } if op == "~~" && class == "N"));
        assert_eq!(*calls.borrow(), 0);
        assert!(rt.try_unary(&Value::Int(1), "sqrt").is_err());
    }

    #[test]
    fn test_method_handler_in_binary() {
        let rt = Runtime::new();
        rt.classes().overload("M", "+", OverloadHandler::method("plus"));
        rt.classes().define_method("M", "plus", constant("plus-called"));
        let out = rt.binary_op(&Value::Int(1), &object(&rt, "M"), "+").unwrap();
        assert_eq!(out, Value::str("plus-called"));
    }
}
