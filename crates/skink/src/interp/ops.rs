//! Operator semantics and the coercion helpers they lean on.
//!
//! Numeric behavior rides on the host's `f64` plus `num-bigint`; the string
//! side of `ToString`/`ToNumber` follows the ES rules for primitives and a
//! non-reentrant approximation for objects (arrays join, plain objects read
//! as `[object Object]`), which is the level the operator surface needs.

use std::rc::Rc;

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};

use crate::{
    ast::{BinaryOp, Span, UnaryOp},
    builtins::NativeFn,
    error::{RunError, RunResult},
    heap::{Heap, ObjectData, PropValue},
    value::{Value, bignum_to_f64, number_to_string, string_to_number, to_int32, to_uint32},
};

/// Non-reentrant `ToString`: primitives follow ES exactly; objects use their
/// default string forms without invoking user `toString`.
pub(crate) fn to_string_simple(heap: &Heap, value: &Value) -> String {
    to_string_depth(heap, value, 0)
}

fn to_string_depth(heap: &Heap, value: &Value, depth: u32) -> String {
    match value {
        Value::Undefined => "undefined".to_owned(),
        Value::Null => "null".to_owned(),
        Value::Bool(b) => b.to_string(),
        Value::Num(n) => number_to_string(*n),
        Value::BigNum(n) => n.to_string(),
        Value::Str(s) => s.to_string(),
        Value::Sym(_) => "Symbol()".to_owned(),
        Value::Native(f) => format!("function {}() {{ [native code] }}", f.display_name()),
        Value::Ref(id) => {
            if depth > 16 {
                return String::new();
            }
            match heap.get(*id) {
                ObjectData::Array(arr) => {
                    let parts: Vec<String> = arr
                        .to_dense()
                        .iter()
                        .map(|v| match v {
                            Value::Undefined | Value::Null => String::new(),
                            other => to_string_depth(heap, other, depth + 1),
                        })
                        .collect();
                    parts.join(",")
                }
                ObjectData::Plain(_) => "[object Object]".to_owned(),
                ObjectData::Function(f) => {
                    format!("function {}() {{ … }}", f.name.as_deref().unwrap_or(""))
                }
                ObjectData::BoundFunction(_) => "function () { … }".to_owned(),
                ObjectData::Class(c) => format!("class {} {{ … }}", c.name.as_deref().unwrap_or("")),
                ObjectData::BoundHost(hv) => hv.to_string(),
                ObjectData::Generator(_) => "[object Generator]".to_owned(),
                ObjectData::Promise(_) => "[object Promise]".to_owned(),
                ObjectData::Regex(re) => format!("/{}/{}", re.source, re.flags),
                ObjectData::NativeIterator(_) => "[object Iterator]".to_owned(),
            }
        }
    }
}

/// ES `ToNumber` over the same non-reentrant object conversion.
pub(crate) fn to_number(heap: &Heap, value: &Value) -> f64 {
    match value {
        Value::Undefined => f64::NAN,
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Num(n) => *n,
        Value::BigNum(_) | Value::Sym(_) | Value::Native(_) => f64::NAN,
        Value::Str(s) => string_to_number(s),
        Value::Ref(_) => string_to_number(&to_string_simple(heap, value)),
    }
}

/// Either side of a numeric operation.
pub(crate) enum Numeric {
    Num(f64),
    Big(Rc<BigInt>),
}

fn to_numeric(heap: &Heap, value: &Value) -> Numeric {
    match value {
        Value::BigNum(n) => Numeric::Big(n.clone()),
        other => Numeric::Num(to_number(heap, other)),
    }
}

/// ES abstract loose equality (`==`).
pub(crate) fn loose_eq(heap: &Heap, a: &Value, b: &Value) -> bool {
    if a.strict_eq(b) {
        return true;
    }
    match (a, b) {
        (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
        (Value::Num(_), Value::Str(_) | Value::Bool(_)) | (Value::Str(_) | Value::Bool(_), Value::Num(_))
        | (Value::Str(_), Value::Bool(_)) | (Value::Bool(_), Value::Str(_)) => {
            to_number(heap, a) == to_number(heap, b)
        }
        (Value::BigNum(n), other) | (other, Value::BigNum(n)) if !matches!(other, Value::Ref(_) | Value::Sym(_)) => {
            if other.is_nullish() {
                return false;
            }
            let rhs = to_number(heap, other);
            rhs.fract() == 0.0 && rhs.is_finite() && bignum_to_f64(n) == rhs
        }
        // Distinct objects are never loosely equal; identity was handled by
        // the strict check above.
        (Value::Ref(_), Value::Ref(_)) => false,
        (Value::Ref(_), _) => {
            let prim = Value::str(to_string_simple(heap, a));
            loose_eq(heap, &prim, b)
        }
        (_, Value::Ref(_)) => {
            let prim = Value::str(to_string_simple(heap, b));
            loose_eq(heap, a, &prim)
        }
        _ => false,
    }
}

impl crate::interp::Interp {
    /// Applies a binary operator (everything except `&&`/`||`/`??`, which
    /// short-circuit in the expression walker, and `in`/`instanceof`).
    pub(crate) fn binary_op(&self, op: BinaryOp, left: &Value, right: &Value, span: Span) -> RunResult<Value> {
        let st = self.st();
        let heap = &st.heap;
        match op {
            BinaryOp::Add => add_values(heap, left, right, span),
            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem | BinaryOp::Exp => {
                arithmetic(heap, op, left, right, span)
            }
            BinaryOp::Eq => Ok(Value::Bool(loose_eq(heap, left, right))),
            BinaryOp::NotEq => Ok(Value::Bool(!loose_eq(heap, left, right))),
            BinaryOp::StrictEq => Ok(Value::Bool(left.strict_eq(right))),
            BinaryOp::StrictNotEq => Ok(Value::Bool(!left.strict_eq(right))),
            BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => Ok(relational(heap, op, left, right)),
            BinaryOp::Shl | BinaryOp::Shr | BinaryOp::UShr | BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor => {
                bitwise(heap, op, left, right, span)
            }
            BinaryOp::In | BinaryOp::InstanceOf => unreachable!("handled by the expression walker"),
        }
    }

    /// `value instanceof ctor`: walks the receiver's implicit prototype
    /// chain against the constructor's prototype object. The intrinsic
    /// constructors (`Array`, `Object`, `Symbol`) compare against the heap's
    /// built-in prototype identities.
    pub(crate) fn instance_of(&self, value: &Value, ctor: &Value, span: Span) -> RunResult<bool> {
        let st = self.st();
        let heap = &st.heap;

        let not_callable =
            || RunError::type_error("Right-hand side of 'instanceof' is not callable", Some(span));
        let mut ctor = ctor.clone();
        let mut hops = 0;
        let target_proto = loop {
            hops += 1;
            if hops > 8 {
                break None;
            }
            let next = match &ctor {
                Value::Ref(ctor_id) => match heap.get(*ctor_id) {
                    ObjectData::Class(class) => break Some(class.prototype),
                    ObjectData::Function(func) => break func.prototype_prop,
                    // Bound functions test against their target.
                    ObjectData::BoundFunction(bound) => bound.target.clone(),
                    _ => return Err(not_callable()),
                },
                Value::Native(NativeFn::ArrayCtor) => break Some(heap.array_proto),
                Value::Native(NativeFn::ObjectCtor) => break Some(heap.object_proto),
                // Symbols stay primitives here, so the check is well-formed
                // and always false.
                Value::Native(NativeFn::SymbolCtor) => break None,
                _ => return Err(not_callable()),
            };
            ctor = next;
        };
        let Some(target_proto) = target_proto else { return Ok(false) };
        let Value::Ref(mut current) = value.clone() else { return Ok(false) };
        for _ in 0..64 {
            match heap.prototype_of_entry(current) {
                Some(p) if p == target_proto => return Ok(true),
                Some(p) => current = p,
                None => return Ok(false),
            }
        }
        Ok(false)
    }

    /// Unary operators that need no environment access.
    pub(crate) fn unary_op(&self, op: UnaryOp, value: &Value, span: Span) -> RunResult<Value> {
        let st = self.st();
        let heap = &st.heap;
        Ok(match op {
            UnaryOp::Minus => match value {
                Value::BigNum(n) => Value::BigNum(Rc::new(-(**n).clone())),
                other => Value::Num(-to_number(heap, other)),
            },
            UnaryOp::Plus => {
                if matches!(value, Value::BigNum(_)) {
                    return Err(RunError::type_error("Cannot convert a BigInt to a number", Some(span)));
                }
                Value::Num(to_number(heap, value))
            }
            UnaryOp::Not => Value::Bool(!value.truthy()),
            UnaryOp::BitNot => match value {
                Value::BigNum(n) => Value::BigNum(Rc::new(!&**n)),
                other => Value::Num(f64::from(!to_int32(to_number(heap, other)))),
            },
            UnaryOp::TypeOf => Value::str(type_of(heap, value)),
            UnaryOp::Void => Value::Undefined,
            UnaryOp::Delete => unreachable!("handled by the expression walker"),
        })
    }
}

/// `typeof` result for a value.
pub(crate) fn type_of(heap: &Heap, value: &Value) -> &'static str {
    match value {
        Value::Undefined => "undefined",
        Value::Null => "object",
        Value::Bool(_) => "boolean",
        Value::Num(_) => "number",
        Value::BigNum(_) => "bigint",
        Value::Str(_) => "string",
        Value::Sym(_) => "symbol",
        Value::Native(_) => "function",
        Value::Ref(id) => match heap.get(*id) {
            ObjectData::Function(_) | ObjectData::BoundFunction(_) | ObjectData::Class(_) => "function",
            ObjectData::BoundHost(crate::host::HostValue::Function(_)) => "function",
            _ => "object",
        },
    }
}

fn add_values(heap: &Heap, left: &Value, right: &Value, span: Span) -> RunResult<Value> {
    // Objects convert to their string primitive here, so any string or
    // object operand makes `+` a concatenation (`[2] + 2` is "22").
    if matches!(left, Value::Str(_) | Value::Ref(_)) || matches!(right, Value::Str(_) | Value::Ref(_)) {
        let mut out = to_string_simple(heap, left);
        out.push_str(&to_string_simple(heap, right));
        return Ok(Value::str(out));
    }
    match (to_numeric(heap, left), to_numeric(heap, right)) {
        (Numeric::Num(a), Numeric::Num(b)) => Ok(Value::Num(a + b)),
        (Numeric::Big(a), Numeric::Big(b)) => Ok(Value::BigNum(Rc::new(&*a + &*b))),
        _ => Err(RunError::type_error("Cannot mix BigInt and other types", Some(span))),
    }
}

fn arithmetic(heap: &Heap, op: BinaryOp, left: &Value, right: &Value, span: Span) -> RunResult<Value> {
    match (to_numeric(heap, left), to_numeric(heap, right)) {
        (Numeric::Num(a), Numeric::Num(b)) => Ok(Value::Num(match op {
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Rem => {
                // JS `%` truncates toward zero (unlike Euclidean).
                if b == 0.0 { f64::NAN } else { a % b }
            }
            BinaryOp::Exp => a.powf(b),
            _ => unreachable!(),
        })),
        (Numeric::Big(a), Numeric::Big(b)) => {
            let result = match op {
                BinaryOp::Sub => &*a - &*b,
                BinaryOp::Mul => &*a * &*b,
                BinaryOp::Div => {
                    if b.is_zero() {
                        return Err(RunError::range_error("Division by zero", Some(span)));
                    }
                    &*a / &*b
                }
                BinaryOp::Rem => {
                    if b.is_zero() {
                        return Err(RunError::range_error("Division by zero", Some(span)));
                    }
                    &*a % &*b
                }
                BinaryOp::Exp => {
                    if b.is_negative() {
                        return Err(RunError::range_error("Exponent must be non-negative", Some(span)));
                    }
                    let Some(exp) = b.to_u32() else {
                        return Err(RunError::range_error("BigInt exponent is too large", Some(span)));
                    };
                    num_traits::Pow::pow(&*a, exp)
                }
                _ => unreachable!(),
            };
            Ok(Value::BigNum(Rc::new(result)))
        }
        _ => Err(RunError::type_error("Cannot mix BigInt and other types", Some(span))),
    }
}

fn relational(heap: &Heap, op: BinaryOp, left: &Value, right: &Value) -> Value {
    // String/string comparison is lexicographic by code unit.
    if let (Value::Str(a), Value::Str(b)) = (left, right) {
        let ord = a.cmp(b);
        return Value::Bool(match op {
            BinaryOp::Lt => ord.is_lt(),
            BinaryOp::LtEq => ord.is_le(),
            BinaryOp::Gt => ord.is_gt(),
            BinaryOp::GtEq => ord.is_ge(),
            _ => unreachable!(),
        });
    }
    let a = match to_numeric(heap, left) {
        Numeric::Num(n) => n,
        Numeric::Big(n) => bignum_to_f64(&n),
    };
    let b = match to_numeric(heap, right) {
        Numeric::Num(n) => n,
        Numeric::Big(n) => bignum_to_f64(&n),
    };
    if a.is_nan() || b.is_nan() {
        return Value::Bool(false);
    }
    Value::Bool(match op {
        BinaryOp::Lt => a < b,
        BinaryOp::LtEq => a <= b,
        BinaryOp::Gt => a > b,
        BinaryOp::GtEq => a >= b,
        _ => unreachable!(),
    })
}

fn bitwise(heap: &Heap, op: BinaryOp, left: &Value, right: &Value, span: Span) -> RunResult<Value> {
    if let (Value::BigNum(a), Value::BigNum(b)) = (left, right) {
        let result = match op {
            BinaryOp::BitAnd => &**a & &**b,
            BinaryOp::BitOr => &**a | &**b,
            BinaryOp::BitXor => &**a ^ &**b,
            BinaryOp::Shl => {
                let Some(shift) = b.to_u32() else {
                    return Err(RunError::range_error("BigInt shift is too large", Some(span)));
                };
                &**a << shift
            }
            BinaryOp::Shr => {
                let Some(shift) = b.to_u32() else {
                    return Err(RunError::range_error("BigInt shift is too large", Some(span)));
                };
                &**a >> shift
            }
            BinaryOp::UShr => {
                return Err(RunError::type_error("BigInts have no unsigned right shift", Some(span)));
            }
            _ => unreachable!(),
        };
        return Ok(Value::BigNum(Rc::new(result)));
    }
    if matches!(left, Value::BigNum(_)) || matches!(right, Value::BigNum(_)) {
        return Err(RunError::type_error("Cannot mix BigInt and other types", Some(span)));
    }
    let a = to_number(heap, left);
    let b = to_number(heap, right);
    Ok(Value::Num(match op {
        BinaryOp::BitAnd => f64::from(to_int32(a) & to_int32(b)),
        BinaryOp::BitOr => f64::from(to_int32(a) | to_int32(b)),
        BinaryOp::BitXor => f64::from(to_int32(a) ^ to_int32(b)),
        BinaryOp::Shl => f64::from(to_int32(a) << (to_uint32(b) & 31)),
        BinaryOp::Shr => f64::from(to_int32(a) >> (to_uint32(b) & 31)),
        BinaryOp::UShr => f64::from(to_uint32(a) >> (to_uint32(b) & 31)),
        _ => unreachable!(),
    }))
}

/// Reads a data property during object-spread/rest copying (accessors are
/// resolved by the caller before this point).
pub(crate) fn own_enumerable_data(obj_props: &indexmap::IndexMap<crate::heap::PropKey, crate::heap::Property>) -> Vec<(crate::heap::PropKey, Option<Value>)> {
    obj_props
        .iter()
        .filter(|(_, p)| p.enumerable)
        .map(|(k, p)| {
            let value = match &p.value {
                PropValue::Data(v) => Some(v.clone()),
                PropValue::Accessor { .. } => None,
            };
            (k.clone(), value)
        })
        .collect()
}
