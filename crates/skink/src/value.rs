//! Runtime value representation.
//!
//! [`Value`] is a small tagged union: primitives are stored inline, heap
//! values indirect through [`crate::heap::HeapId`] into the slab arena.
//! Strings are shared `Rc<str>` (UTF-8 storage; index-based accessors count
//! UTF-16 code units to match host JavaScript expectations).

use std::rc::Rc;

use ahash::AHashMap;
use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::{builtins::NativeFn, heap::HeapId};

/// Identity of an allocated symbol; indexes the run's [`SymbolRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct SymbolId(pub(crate) u32);

/// `Symbol.iterator`.
pub(crate) const SYMBOL_ITERATOR: SymbolId = SymbolId(0);
/// `Symbol.asyncIterator`.
pub(crate) const SYMBOL_ASYNC_ITERATOR: SymbolId = SymbolId(1);

#[derive(Debug, Clone)]
pub(crate) struct SymbolData {
    pub description: Option<Rc<str>>,
    /// Set for symbols minted through the global registry (`Symbol.for`).
    pub global_key: Option<Rc<str>>,
}

/// Allocates symbol identities and maintains the global-key registry.
#[derive(Debug)]
pub(crate) struct SymbolRegistry {
    table: Vec<SymbolData>,
    global: AHashMap<Rc<str>, SymbolId>,
}

impl SymbolRegistry {
    pub(crate) fn new() -> Self {
        let table = vec![
            SymbolData {
                description: Some("Symbol.iterator".into()),
                global_key: None,
            },
            SymbolData {
                description: Some("Symbol.asyncIterator".into()),
                global_key: None,
            },
        ];
        Self {
            table,
            global: AHashMap::new(),
        }
    }

    pub(crate) fn create(&mut self, description: Option<Rc<str>>) -> SymbolId {
        let id = SymbolId(self.table.len() as u32);
        self.table.push(SymbolData {
            description,
            global_key: None,
        });
        id
    }

    /// `Symbol.for(key)`: one identity per key for the engine lifetime.
    pub(crate) fn for_key(&mut self, key: Rc<str>) -> SymbolId {
        if let Some(id) = self.global.get(&key) {
            return *id;
        }
        let id = SymbolId(self.table.len() as u32);
        self.table.push(SymbolData {
            description: Some(key.clone()),
            global_key: Some(key.clone()),
        });
        self.global.insert(key, id);
        id
    }

    pub(crate) fn get(&self, id: SymbolId) -> &SymbolData {
        &self.table[id.0 as usize]
    }
}

/// Primary runtime value.
///
/// Cloning is cheap: heap values copy their index, strings and big integers
/// copy an `Rc`. Object identity lives in the heap index, so equality of two
/// `Ref`s is id equality.
#[derive(Debug, Clone)]
pub(crate) enum Value {
    Undefined,
    Null,
    Bool(bool),
    Num(f64),
    BigNum(Rc<BigInt>),
    Str(Rc<str>),
    Sym(SymbolId),
    /// Built-in function identity; receiver is bound at the call site.
    Native(NativeFn),
    /// Heap-allocated object (plain, array, function, class, bound host,
    /// generator handle, promise handle).
    Ref(HeapId),
}

impl Value {
    pub(crate) fn str(s: impl Into<Rc<str>>) -> Self {
        Self::Str(s.into())
    }

    pub(crate) fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    /// ES `ToBoolean`. Heap values are always truthy, so no heap is needed.
    pub(crate) fn truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(b) => *b,
            Self::Num(n) => !(*n == 0.0 || n.is_nan()),
            Self::BigNum(n) => !num_traits::Zero::is_zero(&**n),
            Self::Str(s) => !s.is_empty(),
            Self::Sym(_) | Self::Native(_) | Self::Ref(_) => true,
        }
    }

    /// ES strict equality for values whose comparison needs no heap access.
    ///
    /// `Ref` values compare by heap identity, which is exactly the `===`
    /// object rule.
    pub(crate) fn strict_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Num(a), Self::Num(b)) => a == b,
            (Self::BigNum(a), Self::BigNum(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Sym(a), Self::Sym(b)) => a == b,
            (Self::Native(a), Self::Native(b)) => a == b,
            (Self::Ref(a), Self::Ref(b)) => a == b,
            _ => false,
        }
    }

    /// ES `SameValue` (`Object.is`): like strict equality but `NaN` equals
    /// `NaN` and `+0` differs from `-0`.
    pub(crate) fn same_value(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Num(a), Self::Num(b)) => {
                if a.is_nan() && b.is_nan() {
                    true
                } else if *a == 0.0 && *b == 0.0 {
                    a.is_sign_positive() == b.is_sign_positive()
                } else {
                    a == b
                }
            }
            _ => self.strict_eq(other),
        }
    }

    /// ES `SameValueZero`: `NaN` equals `NaN`, `+0` equals `-0`.
    pub(crate) fn same_value_zero(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Num(a), Self::Num(b)) => (a.is_nan() && b.is_nan()) || a == b,
            _ => self.strict_eq(other),
        }
    }
}

/// ES `Number::toString` for radix 10.
///
/// Mid-range values use shortest round-trip formatting (ryu); values at or
/// beyond `1e21` (or below `1e-6`) switch to JS exponential notation.
pub(crate) fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_owned();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_owned();
    }
    if n == 0.0 {
        return "0".to_owned();
    }
    let abs = n.abs();
    if abs >= 1e21 || abs < 1e-6 {
        // JS exponential form writes an explicit sign on the exponent.
        let mut s = format!("{n:e}");
        if let Some(pos) = s.find('e')
            && s.as_bytes().get(pos + 1) != Some(&b'-')
        {
            s.insert(pos + 1, '+');
        }
        return s;
    }
    let mut buf = ryu::Buffer::new();
    let formatted = buf.format_finite(n);
    if formatted.contains('e') || formatted.contains('E') {
        // ryu picked scientific notation for a mid-range value; std Display
        // always produces plain decimal.
        return format!("{n}");
    }
    formatted.strip_suffix(".0").unwrap_or(formatted).to_owned()
}

/// ES `ToNumber` applied to a string.
pub(crate) fn string_to_number(s: &str) -> f64 {
    let t = s.trim();
    if t.is_empty() {
        return 0.0;
    }
    match t {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        return u128::from_str_radix(hex, 16).map_or(f64::NAN, |v| v as f64);
    }
    if let Some(oct) = t.strip_prefix("0o").or_else(|| t.strip_prefix("0O")) {
        return u128::from_str_radix(oct, 8).map_or(f64::NAN, |v| v as f64);
    }
    if let Some(bin) = t.strip_prefix("0b").or_else(|| t.strip_prefix("0B")) {
        return u128::from_str_radix(bin, 2).map_or(f64::NAN, |v| v as f64);
    }
    t.parse::<f64>().unwrap_or(f64::NAN)
}

/// ES `ToInt32` (used by the bitwise operators).
pub(crate) fn to_int32(n: f64) -> i32 {
    if !n.is_finite() || n == 0.0 {
        return 0;
    }
    let m = n.trunc();
    let modulus = m.rem_euclid(4_294_967_296.0);
    let unsigned = modulus as u32;
    unsigned as i32
}

/// ES `ToUint32` (used by `>>>` and array-length coercion).
pub(crate) fn to_uint32(n: f64) -> u32 {
    if !n.is_finite() || n == 0.0 {
        return 0;
    }
    n.trunc().rem_euclid(4_294_967_296.0) as u32
}

/// Converts a `BigInt` to `f64` for mixed-type relational comparison.
pub(crate) fn bignum_to_f64(n: &BigInt) -> f64 {
    n.to_f64().unwrap_or(f64::NAN)
}

/// Number of UTF-16 code units in `s`: the JS `length` of a string.
pub(crate) fn utf16_len(s: &str) -> usize {
    s.encode_utf16().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_formatting_matches_js() {
        assert_eq!(number_to_string(3.0), "3");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(0.1), "0.1");
        assert_eq!(number_to_string(1.5), "1.5");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::INFINITY), "Infinity");
        assert_eq!(number_to_string(1e21), "1e+21");
        assert_eq!(number_to_string(1e-7), "1e-7");
    }

    #[test]
    fn string_to_number_follows_js_coercion() {
        assert_eq!(string_to_number(""), 0.0);
        assert_eq!(string_to_number("  42  "), 42.0);
        assert_eq!(string_to_number("0x10"), 16.0);
        assert_eq!(string_to_number("0b101"), 5.0);
        assert!(string_to_number("12abc").is_nan());
        assert_eq!(string_to_number("-Infinity"), f64::NEG_INFINITY);
    }

    #[test]
    fn int32_wrapping() {
        assert_eq!(to_int32(4_294_967_296.0), 0);
        assert_eq!(to_int32(-1.0), -1);
        assert_eq!(to_int32(2_147_483_648.0), -2_147_483_648);
        assert_eq!(to_uint32(-1.0), 4_294_967_295);
    }

    #[test]
    fn same_value_distinguishes_zero_signs() {
        assert!(!Value::Num(0.0).same_value(&Value::Num(-0.0)));
        assert!(Value::Num(0.0).same_value_zero(&Value::Num(-0.0)));
        assert!(Value::Num(f64::NAN).same_value(&Value::Num(f64::NAN)));
        assert!(!Value::Num(f64::NAN).strict_eq(&Value::Num(f64::NAN)));
    }

    #[test]
    fn global_symbol_registry_shares_identity_by_key() {
        let mut reg = SymbolRegistry::new();
        let a = reg.for_key("app.token".into());
        let b = reg.for_key("app.token".into());
        let c = reg.create(Some("app.token".into()));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
