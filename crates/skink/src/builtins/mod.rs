//! Built-in method surfaces of internal values.
//!
//! Natives are identity-bearing enum values ([`NativeFn`]); member access on
//! strings, arrays, objects and the pre-bound intrinsic globals resolves to
//! one of these, and the call site binds the receiver. One dispatch function
//! routes every native call, in the style of a single opcode table.

pub(crate) mod array;
pub(crate) mod function;
pub(crate) mod object;
pub(crate) mod string;

use std::rc::Rc;

use strum::IntoStaticStr;

use crate::{
    ast::Span,
    bridge,
    error::{RunError, RunResult},
    heap::{NativeIterator, ObjectData, PropKey},
    interp::{Interp, coroutine::ResumeMode, iter::native_iter_next, ops},
    value::{SYMBOL_ASYNC_ITERATOR, SYMBOL_ITERATOR, Value},
};

/// Identity of a built-in function. The receiver binds at the call site;
/// an unbound extraction (`const f = arr.push`) stays callable and sees
/// whatever `this` the call provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
pub(crate) enum NativeFn {
    // Array.prototype
    ArrayPush,
    ArrayPop,
    ArrayShift,
    ArrayUnshift,
    ArraySlice,
    ArraySplice,
    ArrayConcat,
    ArrayJoin,
    ArrayIndexOf,
    ArrayIncludes,
    ArrayMap,
    ArrayFilter,
    ArrayForEach,
    ArrayReduce,
    ArrayFind,
    ArrayFindIndex,
    ArraySome,
    ArrayEvery,
    ArrayReverse,
    ArrayFlat,
    ArrayKeys,
    ArrayValues,
    ArrayEntries,
    // Array statics
    ArrayCtor,
    ArrayIsArray,
    ArrayFrom,
    ArrayOf,
    // String.prototype
    StringCharAt,
    StringCharCodeAt,
    StringAt,
    StringSlice,
    StringSubstring,
    StringIndexOf,
    StringIncludes,
    StringStartsWith,
    StringEndsWith,
    StringToUpperCase,
    StringToLowerCase,
    StringTrim,
    StringSplit,
    StringRepeat,
    StringPadStart,
    StringPadEnd,
    StringConcat,
    StringReplace,
    StringReplaceAll,
    StringMatch,
    StringMatchAll,
    StringSearch,
    StringToString,
    // Object statics & prototype
    ObjectCtor,
    ObjectKeys,
    ObjectValues,
    ObjectEntries,
    ObjectAssign,
    ObjectFreeze,
    ObjectIsFrozen,
    ObjectSeal,
    ObjectIsSealed,
    ObjectCreate,
    ObjectGetPrototypeOf,
    ObjectSetPrototypeOf,
    ObjectDefineProperty,
    ObjectFromEntries,
    ObjectIs,
    ObjectHasOwnProperty,
    ObjectToString,
    // Function.prototype
    FunctionCall,
    FunctionApply,
    FunctionBind,
    // Number.prototype
    NumberToString,
    NumberToFixed,
    // Symbol
    SymbolCtor,
    SymbolFor,
    // Generator handles
    GeneratorNext,
    GeneratorReturn,
    GeneratorThrow,
    // Built-in iterators
    NativeIteratorNext,
    // Regex (host-proxied engine)
    RegexTest,
    RegexExec,
    // Host-array convenience
    HostArrayPush,
}

impl NativeFn {
    /// JS-visible name (diagnostics, `Function.prototype.name`).
    pub(crate) fn display_name(self) -> &'static str {
        use NativeFn::*;
        match self {
            ArrayPush | HostArrayPush => "push",
            ArrayPop => "pop",
            ArrayShift => "shift",
            ArrayUnshift => "unshift",
            ArraySlice | StringSlice => "slice",
            ArraySplice => "splice",
            ArrayConcat | StringConcat => "concat",
            ArrayJoin => "join",
            ArrayIndexOf | StringIndexOf => "indexOf",
            ArrayIncludes | StringIncludes => "includes",
            ArrayMap => "map",
            ArrayFilter => "filter",
            ArrayForEach => "forEach",
            ArrayReduce => "reduce",
            ArrayFind => "find",
            ArrayFindIndex => "findIndex",
            ArraySome => "some",
            ArrayEvery => "every",
            ArrayReverse => "reverse",
            ArrayFlat => "flat",
            ArrayKeys | ObjectKeys => "keys",
            ArrayValues | ObjectValues => "values",
            ArrayEntries | ObjectEntries => "entries",
            ArrayCtor => "Array",
            ArrayIsArray => "isArray",
            ArrayFrom => "from",
            ArrayOf => "of",
            StringCharAt => "charAt",
            StringCharCodeAt => "charCodeAt",
            StringAt => "at",
            StringSubstring => "substring",
            StringStartsWith => "startsWith",
            StringEndsWith => "endsWith",
            StringToUpperCase => "toUpperCase",
            StringToLowerCase => "toLowerCase",
            StringTrim => "trim",
            StringSplit => "split",
            StringRepeat => "repeat",
            StringPadStart => "padStart",
            StringPadEnd => "padEnd",
            StringReplace => "replace",
            StringReplaceAll => "replaceAll",
            StringMatch => "match",
            StringMatchAll => "matchAll",
            StringSearch => "search",
            StringToString | NumberToString | ObjectToString => "toString",
            ObjectCtor => "Object",
            ObjectAssign => "assign",
            ObjectFreeze => "freeze",
            ObjectIsFrozen => "isFrozen",
            ObjectSeal => "seal",
            ObjectIsSealed => "isSealed",
            ObjectCreate => "create",
            ObjectGetPrototypeOf => "getPrototypeOf",
            ObjectSetPrototypeOf => "setPrototypeOf",
            ObjectDefineProperty => "defineProperty",
            ObjectFromEntries => "fromEntries",
            ObjectIs => "is",
            ObjectHasOwnProperty => "hasOwnProperty",
            FunctionCall => "call",
            FunctionApply => "apply",
            FunctionBind => "bind",
            NumberToFixed => "toFixed",
            SymbolCtor => "Symbol",
            SymbolFor => "for",
            GeneratorNext => "next",
            GeneratorReturn => "return",
            GeneratorThrow => "throw",
            NativeIteratorNext => "next",
            RegexTest => "test",
            RegexExec => "exec",
        }
    }
}

/// Member lookup on numeric/boolean primitives.
pub(crate) fn number_member(key: &PropKey) -> Value {
    match key.as_str() {
        Some("toString") => Value::Native(NativeFn::NumberToString),
        Some("toFixed") => Value::Native(NativeFn::NumberToFixed),
        _ => Value::Undefined,
    }
}

/// Fallback members shared by every ordinary object.
pub(crate) fn object_proto_member(key: &PropKey) -> Option<Value> {
    match key.as_str() {
        Some("hasOwnProperty") => Some(Value::Native(NativeFn::ObjectHasOwnProperty)),
        Some("toString") => Some(Value::Native(NativeFn::ObjectToString)),
        _ => None,
    }
}

/// Members of closure values (`Function.prototype`).
pub(crate) fn function_member(key: &PropKey) -> Option<Value> {
    match key.as_str() {
        Some("call") => Some(Value::Native(NativeFn::FunctionCall)),
        Some("apply") => Some(Value::Native(NativeFn::FunctionApply)),
        Some("bind") => Some(Value::Native(NativeFn::FunctionBind)),
        _ => None,
    }
}

/// Members of generator handles.
pub(crate) fn generator_member(key: &PropKey) -> Option<Value> {
    match key {
        PropKey::Str(name) => match &**name {
            "next" => Some(Value::Native(NativeFn::GeneratorNext)),
            "return" => Some(Value::Native(NativeFn::GeneratorReturn)),
            "throw" => Some(Value::Native(NativeFn::GeneratorThrow)),
            _ => None,
        },
        PropKey::Sym(_) => None,
    }
}

/// Static members of the callable intrinsics (`Object.keys`, `Array.from`,
/// `Symbol.iterator`, …).
pub(crate) fn native_static_member(interp: &Interp, f: NativeFn, key: &PropKey) -> RunResult<Value> {
    let _ = interp;
    let value = match (f, key.as_str()) {
        (NativeFn::ObjectCtor, Some("keys")) => Value::Native(NativeFn::ObjectKeys),
        (NativeFn::ObjectCtor, Some("values")) => Value::Native(NativeFn::ObjectValues),
        (NativeFn::ObjectCtor, Some("entries")) => Value::Native(NativeFn::ObjectEntries),
        (NativeFn::ObjectCtor, Some("assign")) => Value::Native(NativeFn::ObjectAssign),
        (NativeFn::ObjectCtor, Some("freeze")) => Value::Native(NativeFn::ObjectFreeze),
        (NativeFn::ObjectCtor, Some("isFrozen")) => Value::Native(NativeFn::ObjectIsFrozen),
        (NativeFn::ObjectCtor, Some("seal")) => Value::Native(NativeFn::ObjectSeal),
        (NativeFn::ObjectCtor, Some("isSealed")) => Value::Native(NativeFn::ObjectIsSealed),
        (NativeFn::ObjectCtor, Some("create")) => Value::Native(NativeFn::ObjectCreate),
        (NativeFn::ObjectCtor, Some("getPrototypeOf")) => Value::Native(NativeFn::ObjectGetPrototypeOf),
        (NativeFn::ObjectCtor, Some("setPrototypeOf")) => Value::Native(NativeFn::ObjectSetPrototypeOf),
        (NativeFn::ObjectCtor, Some("defineProperty")) => Value::Native(NativeFn::ObjectDefineProperty),
        (NativeFn::ObjectCtor, Some("fromEntries")) => Value::Native(NativeFn::ObjectFromEntries),
        (NativeFn::ObjectCtor, Some("is")) => Value::Native(NativeFn::ObjectIs),
        (NativeFn::ArrayCtor, Some("isArray")) => Value::Native(NativeFn::ArrayIsArray),
        (NativeFn::ArrayCtor, Some("from")) => Value::Native(NativeFn::ArrayFrom),
        (NativeFn::ArrayCtor, Some("of")) => Value::Native(NativeFn::ArrayOf),
        (NativeFn::SymbolCtor, Some("for")) => Value::Native(NativeFn::SymbolFor),
        (NativeFn::SymbolCtor, Some("iterator")) => Value::Sym(SYMBOL_ITERATOR),
        (NativeFn::SymbolCtor, Some("asyncIterator")) => Value::Sym(SYMBOL_ASYNC_ITERATOR),
        (_, Some("name")) => Value::str(f.display_name()),
        _ => Value::Undefined,
    };
    Ok(value)
}

/// Routes one native call.
pub(crate) async fn call_native(interp: &Interp, f: NativeFn, this: Value, args: Vec<Value>, span: Span) -> RunResult<Value> {
    use NativeFn::*;
    match f {
        // Arrays
        ArrayPush | ArrayPop | ArrayShift | ArrayUnshift | ArraySlice | ArraySplice | ArrayConcat | ArrayJoin
        | ArrayIndexOf | ArrayIncludes | ArrayMap | ArrayFilter | ArrayForEach | ArrayReduce | ArrayFind
        | ArrayFindIndex | ArraySome | ArrayEvery | ArrayReverse | ArrayFlat | ArrayKeys | ArrayValues
        | ArrayEntries | ArrayCtor | ArrayIsArray | ArrayFrom | ArrayOf => {
            array::call(interp, f, this, args, span).await
        }
        // Strings
        StringCharAt | StringCharCodeAt | StringAt | StringSlice | StringSubstring | StringIndexOf
        | StringIncludes | StringStartsWith | StringEndsWith | StringToUpperCase | StringToLowerCase | StringTrim
        | StringSplit | StringRepeat | StringPadStart | StringPadEnd | StringConcat | StringReplace
        | StringReplaceAll | StringMatch | StringMatchAll | StringSearch | StringToString | RegexTest | RegexExec => {
            string::call(interp, f, this, args, span).await
        }
        // Objects
        ObjectCtor | ObjectKeys | ObjectValues | ObjectEntries | ObjectAssign | ObjectFreeze | ObjectIsFrozen
        | ObjectSeal | ObjectIsSealed | ObjectCreate | ObjectGetPrototypeOf | ObjectSetPrototypeOf
        | ObjectDefineProperty | ObjectFromEntries | ObjectIs | ObjectHasOwnProperty | ObjectToString => {
            object::call(interp, f, this, args, span).await
        }
        // Functions
        FunctionCall | FunctionApply | FunctionBind => function::call(interp, f, this, args, span).await,
        // Numbers
        NumberToString => {
            let radix = args.first().map(|v| {
                let st = interp.st();
                ops::to_number(&st.heap, v)
            });
            match (&this, radix) {
                (Value::Num(n), Some(radix)) if radix.is_finite() && radix != 10.0 => {
                    let radix = radix as u32;
                    if !(2..=36).contains(&radix) {
                        return Err(RunError::range_error("toString() radix must be between 2 and 36", Some(span)));
                    }
                    Ok(Value::str(format_radix(*n, radix)))
                }
                _ => {
                    let st = interp.st();
                    Ok(Value::str(ops::to_string_simple(&st.heap, &this)))
                }
            }
        }
        NumberToFixed => {
            let digits = {
                let st = interp.st();
                args.first().map_or(0.0, |v| ops::to_number(&st.heap, v))
            };
            if !(0.0..=100.0).contains(&digits) {
                return Err(RunError::range_error("toFixed() digits must be between 0 and 100", Some(span)));
            }
            let n = {
                let st = interp.st();
                ops::to_number(&st.heap, &this)
            };
            Ok(Value::str(format!("{:.*}", digits as usize, n)))
        }
        // Symbols
        SymbolCtor => {
            let description = match args.first() {
                Some(Value::Str(s)) => Some(s.clone()),
                Some(Value::Undefined) | None => None,
                Some(other) => {
                    let st = interp.st();
                    Some(ops::to_string_simple(&st.heap, other).into())
                }
            };
            let mut st = interp.st();
            let id = st.symbols.create(description);
            Ok(Value::Sym(id))
        }
        SymbolFor => {
            let key: Rc<str> = match args.first() {
                Some(Value::Str(s)) => s.clone(),
                Some(other) => {
                    let st = interp.st();
                    ops::to_string_simple(&st.heap, other).into()
                }
                None => "undefined".into(),
            };
            let mut st = interp.st();
            Ok(Value::Sym(st.symbols.for_key(key)))
        }
        // Generators
        GeneratorNext | GeneratorReturn | GeneratorThrow => {
            let Value::Ref(id) = this else {
                return Err(RunError::type_error("Generator method called on a non-generator", Some(span)));
            };
            let arg = args.into_iter().next().unwrap_or(Value::Undefined);
            let mode = match f {
                GeneratorNext => ResumeMode::Next(arg),
                GeneratorReturn => ResumeMode::Return(arg),
                _ => ResumeMode::Throw(arg),
            };
            let is_async = {
                let st = interp.st();
                matches!(st.heap.get(id), ObjectData::Generator(g) if g.is_async)
            };
            if is_async {
                // Async generator steps settle through a promise.
                let result = interp.generator_resume(id, mode, span).await;
                let state = match result {
                    Ok(value) => crate::heap::PromiseState::Fulfilled(value),
                    Err(RunError::Throw(thrown)) => {
                        crate::heap::PromiseState::Rejected(interp.thrown_to_value(*thrown))
                    }
                    Err(fatal) => return Err(fatal),
                };
                let mut st = interp.st();
                Ok(Value::Ref(st.heap.alloc(ObjectData::Promise(crate::heap::PromiseObject { state }))))
            } else {
                interp.generator_resume(id, mode, span).await
            }
        }
        NativeIteratorNext => {
            let Value::Ref(id) = this else {
                return Err(RunError::type_error("Iterator method called on a non-iterator", Some(span)));
            };
            let mut st = interp.st();
            let (value, done) = native_iter_next(&mut st.heap, id);
            Ok(bridge::alloc_iter_result(&mut st.heap, value, done))
        }
        HostArrayPush => {
            let pushed = {
                let st = interp.st();
                let Value::Ref(id) = &this else {
                    return Err(RunError::type_error("push called on a non-array", Some(span)));
                };
                let ObjectData::BoundHost(crate::host::HostValue::Array(arr)) = st.heap.get(*id) else {
                    return Err(RunError::type_error("push called on a non-array", Some(span)));
                };
                for arg in &args {
                    arr.push(bridge::value_to_host(&st.heap, &st.symbols, arg));
                }
                arr.len()
            };
            Ok(Value::Num(pushed as f64))
        }
    }
}

/// Integer radix formatting for `Number.prototype.toString(radix)`.
fn format_radix(n: f64, radix: u32) -> String {
    if n.is_nan() {
        return "NaN".to_owned();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_owned();
    }
    if n.fract() != 0.0 {
        // Fractional radix conversion is approximated by truncation.
        return format_radix(n.trunc(), radix);
    }
    let negative = n < 0.0;
    let mut value = n.abs() as u128;
    if value == 0 {
        return "0".to_owned();
    }
    let digits = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut out = Vec::new();
    while value > 0 {
        out.push(digits[(value % u128::from(radix)) as usize]);
        value /= u128::from(radix);
    }
    if negative {
        out.push(b'-');
    }
    out.reverse();
    String::from_utf8(out).expect("radix digits are ASCII")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radix_formatting() {
        assert_eq!(format_radix(255.0, 16), "ff");
        assert_eq!(format_radix(-8.0, 2), "-1000");
        assert_eq!(format_radix(0.0, 36), "0");
    }

    #[test]
    fn display_names_are_js_visible() {
        assert_eq!(NativeFn::ArrayPush.display_name(), "push");
        assert_eq!(NativeFn::ObjectGetPrototypeOf.display_name(), "getPrototypeOf");
        assert_eq!(NativeFn::GeneratorNext.display_name(), "next");
    }
}
