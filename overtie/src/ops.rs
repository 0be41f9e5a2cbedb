//! Plain (non-overloaded) scalar semantics
//!
//! What the dispatchers fall back to once every operand has been reduced to
//! a plain scalar: numeric parsing of strings, number formatting, truth,
//! arithmetic, comparison and a small `sprintf`.

use crate::error::{MagicError, MagicResult};
use crate::runtime::Runtime;
use crate::value::Value;
use std::cmp::Ordering;

/// Binary operators with a plain meaning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Concat,
    Repeat,
    NumCmp,
    StrCmp,
    NumLt,
    NumLe,
    NumGt,
    NumGe,
    NumEq,
    NumNe,
    StrLt,
    StrLe,
    StrGt,
    StrGe,
    StrEq,
    StrNe,
}

/// How a binary operator reads its operands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operands {
    Numeric,
    Stringy,
    /// `x`: string on the left, count on the right
    Repeat,
}

impl BinaryOp {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        use BinaryOp::*;
        Some(match symbol {
            "+" => Add,
            "-" => Sub,
            "*" => Mul,
            "/" => Div,
            "%" => Mod,
            "**" => Pow,
            "." => Concat,
            "x" => Repeat,
            "<=>" => NumCmp,
            "cmp" => StrCmp,
            "<" => NumLt,
            "<=" => NumLe,
            ">" => NumGt,
            ">=" => NumGe,
            "==" => NumEq,
            "!=" => NumNe,
            "lt" => StrLt,
            "le" => StrLe,
            "gt" => StrGt,
            "ge" => StrGe,
            "eq" => StrEq,
            "ne" => StrNe,
            _ => return None,
        })
    }

    pub fn operands(self) -> Operands {
        use BinaryOp::*;
        match self {
            Concat | StrCmp | StrLt | StrLe | StrGt | StrGe | StrEq | StrNe => Operands::Stringy,
            Repeat => Operands::Repeat,
            _ => Operands::Numeric,
        }
    }

    /// Which three-way comparison a relational operator derives from, and
    /// the orderings for which it holds
    pub fn three_way(self) -> Option<(&'static str, &'static [Ordering])> {
        use BinaryOp::*;
        const LT: &[Ordering] = &[Ordering::Less];
        const LE: &[Ordering] = &[Ordering::Less, Ordering::Equal];
        const GT: &[Ordering] = &[Ordering::Greater];
        const GE: &[Ordering] = &[Ordering::Greater, Ordering::Equal];
        const EQ: &[Ordering] = &[Ordering::Equal];
        const NE: &[Ordering] = &[Ordering::Less, Ordering::Greater];
        Some(match self {
            NumLt => ("<=>", LT),
            NumLe => ("<=>", LE),
            NumGt => ("<=>", GT),
            NumGe => ("<=>", GE),
            NumEq => ("<=>", EQ),
            NumNe => ("<=>", NE),
            StrLt => ("cmp", LT),
            StrLe => ("cmp", LE),
            StrGt => ("cmp", GT),
            StrGe => ("cmp", GE),
            StrEq => ("cmp", EQ),
            StrNe => ("cmp", NE),
            _ => return None,
        })
    }
}

/// Base operator of an assignment form (`+=` -> `+`); `None` for comparisons
pub fn assignment_base(op: &str) -> Option<&str> {
    if matches!(op, "==" | "!=" | "<=" | ">=" | "<=>") {
        return None;
    }
    op.strip_suffix('=').filter(|base| !base.is_empty())
}

/// Leading numeric prefix of a string, whitespace skipped
pub fn parse_number(s: &str) -> Value {
    let t = s.trim_start();
    let bytes = t.as_bytes();
    let mut end = 0;
    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;
    let mut is_float = false;
    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        if digits > 0 || frac_end > frac_start {
            digits += frac_end - frac_start;
            is_float = true;
            end = frac_end;
        }
    }
    if digits == 0 {
        return Value::Int(0);
    }
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            is_float = true;
            end = exp_end;
        }
    }
    let text = &t[..end];
    if !is_float && let Ok(n) = text.parse::<i64>() {
        return Value::Int(n);
    }
    text.parse::<f64>().map(Value::Float).unwrap_or(Value::Int(0))
}

/// Render a float the way `%.15g` does
pub fn format_number(x: f64) -> String {
    if x.is_nan() {
        return "NaN".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "Inf" } else { "-Inf" }.to_string();
    }
    format_g(x, 15, false)
}

fn format_g(x: f64, precision: usize, alternate: bool) -> String {
    if x == 0.0 {
        return "0".to_string();
    }
    let precision = precision.max(1);
    let sci = format!("{:.*e}", precision - 1, x);
    let (mantissa, exp) = sci.split_once('e').unwrap_or((&sci, "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    if exp < -4 || exp >= precision as i32 {
        let mantissa = if alternate {
            mantissa.to_string()
        } else {
            trim_fraction(mantissa)
        };
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exp.abs())
    } else {
        let decimals = (precision as i32 - 1 - exp).max(0) as usize;
        let fixed = format!("{x:.decimals$}");
        if alternate { fixed } else { trim_fraction(&fixed) }
    }
}

fn trim_fraction(s: &str) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s.to_string()
    }
}

/// Truth of a plain value: undef, `0`, `0.0`, `""` and `"0"` are false
pub fn plain_truth(v: &Value) -> bool {
    match v {
        Value::Undef => false,
        Value::Int(n) => *n != 0,
        Value::Float(x) => *x != 0.0,
        Value::Str(s) => !(s.is_empty() || &**s == "0"),
        Value::Ref(_) | Value::Proxy(_) => true,
    }
}

/// Numeric value of a plain value; references numify to their address
pub fn plain_number(v: &Value) -> Value {
    match v {
        Value::Undef | Value::Proxy(_) => Value::Int(0),
        Value::Int(n) => Value::Int(*n),
        Value::Float(x) => Value::Float(*x),
        Value::Str(s) => parse_number(s),
        Value::Ref(r) => Value::Int(r.addr() as i64),
    }
}

fn as_f64(v: &Value) -> f64 {
    match v {
        Value::Int(n) => *n as f64,
        Value::Float(x) => *x,
        other => as_f64(&plain_number(other)),
    }
}

fn float_or_int(x: f64) -> Value {
    if x.fract() == 0.0 && x.abs() < 9.0e15 {
        Value::Int(x as i64)
    } else {
        Value::Float(x)
    }
}

/// Numeric binary operator on already numified operands
pub fn numeric(op: BinaryOp, a: &Value, b: &Value) -> MagicResult<Value> {
    use BinaryOp::*;
    let ints = match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some((*x, *y)),
        _ => None,
    };
    let (x, y) = (as_f64(a), as_f64(b));
    Ok(match op {
        Add => ints
            .and_then(|(p, q)| p.checked_add(q))
            .map(Value::Int)
            .unwrap_or(Value::Float(x + y)),
        Sub => ints
            .and_then(|(p, q)| p.checked_sub(q))
            .map(Value::Int)
            .unwrap_or(Value::Float(x - y)),
        Mul => ints
            .and_then(|(p, q)| p.checked_mul(q))
            .map(Value::Int)
            .unwrap_or(Value::Float(x * y)),
        Div => {
            if y == 0.0 {
                return Err(MagicError::division_by_zero("division by"));
            }
            match ints {
                Some((p, q)) if p.checked_rem(q) == Some(0) => p
                    .checked_div(q)
                    .map(Value::Int)
                    .unwrap_or(Value::Float(x / y)),
                _ => Value::Float(x / y),
            }
        }
        Mod => {
            let (p, q) = ints.unwrap_or((x.trunc() as i64, y.trunc() as i64));
            if q == 0 {
                return Err(MagicError::division_by_zero("modulus"));
            }
            // Result takes the sign of the right operand; MIN % -1 is 0
            let r = p.checked_rem(q).unwrap_or(0);
            Value::Int(if r != 0 && (r < 0) != (q < 0) { r + q } else { r })
        }
        Pow => match ints {
            Some((p, q)) if (0..=u32::MAX as i64).contains(&q) => p
                .checked_pow(q as u32)
                .map(Value::Int)
                .unwrap_or(Value::Float(x.powf(y))),
            _ => Value::Float(x.powf(y)),
        },
        NumCmp => match x.partial_cmp(&y) {
            Some(ord) => Value::Int(ord as i64),
            None => Value::Undef,
        },
        _ => match op.three_way() {
            Some((_, holds)) => {
                Value::from_bool(x.partial_cmp(&y).is_some_and(|ord| holds.contains(&ord)))
            }
            None => float_or_int(x),
        },
    })
}

/// String binary operator on already stringified operands
pub fn stringy(op: BinaryOp, a: &str, b: &str) -> Value {
    match op {
        BinaryOp::Concat => Value::from(format!("{a}{b}")),
        BinaryOp::StrCmp => Value::Int(a.cmp(b) as i64),
        _ => match op.three_way() {
            Some((_, holds)) => Value::from_bool(holds.contains(&a.cmp(b))),
            None => Value::str(a),
        },
    }
}

/// `x` on an already stringified left side and numified count
pub fn repeat(a: &str, count: &Value) -> MagicResult<Value> {
    let n = as_f64(count);
    if a.is_empty() || n.is_nan() || n < 1.0 {
        return Ok(Value::str(""));
    }
    let n = n as usize;
    let mut out = String::new();
    a.len()
        .checked_mul(n)
        .and_then(|total| out.try_reserve_exact(total).ok())
        .ok_or_else(|| MagicError::out_of_memory("string repeat"))?;
    for _ in 0..n {
        out.push_str(a);
    }
    Ok(Value::from(out))
}

impl Runtime {
    /// `sprintf` with overloaded conversions applied to the arguments.
    ///
    /// Supports `%s %d %i %u %f %e %g %x %X %o %c %%` with `-`, `0`, `+`,
    /// space and `#` flags, width and precision (either may be `*`).
    pub fn sprintf(&self, format: &str, args: &[Value]) -> MagicResult<String> {
        let mut out = String::new();
        let mut args = args.iter();
        let mut next_arg = || args.next().cloned().unwrap_or(Value::Undef);
        let mut chars = format.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '%' {
                out.push(c);
                continue;
            }
            let mut spec = FormatSpec::default();
            while let Some(&flag) = chars.peek() {
                match flag {
                    '-' => spec.left = true,
                    '0' => spec.zero = true,
                    '+' => spec.plus = true,
                    ' ' => spec.space = true,
                    '#' => spec.alternate = true,
                    _ => break,
                }
                chars.next();
            }
            if chars.peek() == Some(&'*') {
                chars.next();
                let w = as_f64(&self.numify(&next_arg())?) as i64;
                spec.left |= w < 0;
                spec.width = format_size(w.unsigned_abs())?;
            } else {
                spec.width = take_digits(&mut chars)?.unwrap_or(0);
            }
            if chars.peek() == Some(&'.') {
                chars.next();
                if chars.peek() == Some(&'*') {
                    chars.next();
                    let p = as_f64(&self.numify(&next_arg())?).max(0.0) as u64;
                    spec.precision = Some(format_size(p)?);
                } else {
                    spec.precision = Some(take_digits(&mut chars)?.unwrap_or(0));
                }
            }
            let Some(conv) = chars.next() else {
                out.push('%');
                break;
            };
            let body = match conv {
                '%' => {
                    out.push('%');
                    continue;
                }
                's' => {
                    let mut s = self.stringify(&next_arg())?;
                    if let Some(p) = spec.precision {
                        s = s.chars().take(p).collect();
                    }
                    s
                }
                'c' => {
                    let n = as_f64(&self.numify(&next_arg())?) as u32;
                    char::from_u32(n).map(String::from).unwrap_or_default()
                }
                'd' | 'i' | 'u' => {
                    let n = as_f64(&self.numify(&next_arg())?).trunc() as i64;
                    spec.signed(n < 0, n.unsigned_abs().to_string())
                }
                'x' | 'X' | 'o' => {
                    let n = as_f64(&self.numify(&next_arg())?).trunc() as i64 as u64;
                    let (digits, prefix) = match conv {
                        'x' => (format!("{n:x}"), "0x"),
                        'X' => (format!("{n:X}"), "0X"),
                        _ => (format!("{n:o}"), "0"),
                    };
                    if spec.alternate && n != 0 {
                        format!("{prefix}{digits}")
                    } else {
                        digits
                    }
                }
                'f' | 'F' | 'e' | 'E' | 'g' | 'G' => {
                    let x = as_f64(&self.numify(&next_arg())?);
                    let p = spec.precision.unwrap_or(6);
                    let text = match conv {
                        'f' | 'F' => format!("{:.*}", p, x.abs()),
                        'e' | 'E' => exponent_form(x.abs(), p),
                        _ => format_g(x.abs(), if p == 0 { 1 } else { p }, spec.alternate),
                    };
                    let text = if conv.is_ascii_uppercase() {
                        text.to_uppercase()
                    } else {
                        text
                    };
                    spec.signed(x.is_sign_negative() && x != 0.0, text)
                }
                other => {
                    // Unknown conversions are copied through
                    out.push('%');
                    out.push(other);
                    continue;
                }
            };
            out.push_str(&spec.pad(body, conv)?);
        }
        Ok(out)
    }
}

fn exponent_form(x: f64, precision: usize) -> String {
    let sci = format!("{x:.precision$e}");
    let (mantissa, exp) = sci.split_once('e').unwrap_or((&sci, "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let sign = if exp < 0 { '-' } else { '+' };
    format!("{mantissa}e{sign}{:02}", exp.abs())
}

/// Largest width or precision a format may ask for
const MAX_FORMAT_SIZE: usize = i32::MAX as usize;

fn format_size(n: u64) -> MagicResult<usize> {
    usize::try_from(n)
        .ok()
        .filter(|&n| n <= MAX_FORMAT_SIZE)
        .ok_or_else(|| MagicError::handler("Integer overflow in format string for sprintf"))
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> MagicResult<Option<usize>> {
    let mut n: Option<u64> = None;
    while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
        let next = n
            .unwrap_or(0)
            .checked_mul(10)
            .and_then(|v| v.checked_add(u64::from(d)))
            .unwrap_or(u64::MAX);
        n = Some(next);
        chars.next();
    }
    n.map(format_size).transpose()
}

#[derive(Debug, Default)]
struct FormatSpec {
    left: bool,
    zero: bool,
    plus: bool,
    space: bool,
    alternate: bool,
    width: usize,
    precision: Option<usize>,
}

impl FormatSpec {
    fn signed(&self, negative: bool, digits: String) -> String {
        let sign = if negative {
            "-"
        } else if self.plus {
            "+"
        } else if self.space {
            " "
        } else {
            ""
        };
        format!("{sign}{digits}")
    }

    fn pad(&self, body: String, conv: char) -> MagicResult<String> {
        let len = body.chars().count();
        if len >= self.width {
            return Ok(body);
        }
        let fill = self.width - len;
        let mut padded = String::new();
        padded
            .try_reserve_exact(body.len() + fill)
            .map_err(|_| MagicError::out_of_memory("sprintf"))?;
        let fill_with = |out: &mut String, c: char| out.extend(std::iter::repeat_n(c, fill));
        if self.left {
            padded.push_str(&body);
            fill_with(&mut padded, ' ');
        } else if self.zero && conv != 's' && conv != 'c' {
            let split = body
                .find(|c: char| c.is_ascii_alphanumeric())
                .unwrap_or(0);
            let (sign, digits) = body.split_at(split);
            padded.push_str(sign);
            fill_with(&mut padded, '0');
            padded.push_str(digits);
        } else {
            fill_with(&mut padded, ' ');
            padded.push_str(&body);
        }
        Ok(padded)
    }
}
