//! `Array.prototype` methods and the `Array` statics.

use crate::{
    ast::Span,
    builtins::NativeFn,
    error::{RunError, RunResult},
    heap::{HeapId, NativeIterator, ObjectData, PropKey},
    interp::{Interp, ops},
    value::{SYMBOL_ITERATOR, Value},
};

/// Member lookup on array receivers (index and `length` reads are handled by
/// the access layer before this).
pub(crate) fn member(key: &PropKey) -> Option<Value> {
    let f = match key {
        PropKey::Sym(sym) if *sym == SYMBOL_ITERATOR => NativeFn::ArrayValues,
        PropKey::Sym(_) => return None,
        PropKey::Str(name) => match &**name {
            "push" => NativeFn::ArrayPush,
            "pop" => NativeFn::ArrayPop,
            "shift" => NativeFn::ArrayShift,
            "unshift" => NativeFn::ArrayUnshift,
            "slice" => NativeFn::ArraySlice,
            "splice" => NativeFn::ArraySplice,
            "concat" => NativeFn::ArrayConcat,
            "join" => NativeFn::ArrayJoin,
            "indexOf" => NativeFn::ArrayIndexOf,
            "includes" => NativeFn::ArrayIncludes,
            "map" => NativeFn::ArrayMap,
            "filter" => NativeFn::ArrayFilter,
            "forEach" => NativeFn::ArrayForEach,
            "reduce" => NativeFn::ArrayReduce,
            "find" => NativeFn::ArrayFind,
            "findIndex" => NativeFn::ArrayFindIndex,
            "some" => NativeFn::ArraySome,
            "every" => NativeFn::ArrayEvery,
            "reverse" => NativeFn::ArrayReverse,
            "flat" => NativeFn::ArrayFlat,
            "keys" => NativeFn::ArrayKeys,
            "values" => NativeFn::ArrayValues,
            "entries" => NativeFn::ArrayEntries,
            _ => return None,
        },
    };
    Some(Value::Native(f))
}

fn receiver_array(interp: &Interp, this: &Value, span: Span) -> RunResult<HeapId> {
    if let Value::Ref(id) = this {
        let st = interp.st();
        if matches!(st.heap.get(*id), ObjectData::Array(_)) {
            return Ok(*id);
        }
    }
    Err(RunError::type_error("Array method called on a non-array", Some(span)))
}

fn elements(interp: &Interp, id: HeapId) -> Vec<Value> {
    let st = interp.st();
    match st.heap.get(id) {
        ObjectData::Array(arr) => arr.to_dense(),
        _ => Vec::new(),
    }
}

fn frozen_check(interp: &Interp, id: HeapId, span: Span) -> RunResult<()> {
    let st = interp.st();
    if let ObjectData::Array(arr) = st.heap.get(id)
        && arr.integrity != crate::heap::Integrity::None
    {
        return Err(RunError::type_error("Cannot mutate a frozen array", Some(span)));
    }
    Ok(())
}

/// Normalizes a possibly-negative index against `len`.
fn rel_index(n: f64, len: usize) -> usize {
    if n.is_nan() {
        return 0;
    }
    if n < 0.0 {
        let back = (-n) as usize;
        len.saturating_sub(back)
    } else {
        (n as usize).min(len)
    }
}

pub(crate) async fn call(interp: &Interp, f: NativeFn, this: Value, args: Vec<Value>, span: Span) -> RunResult<Value> {
    use NativeFn::*;
    match f {
        ArrayCtor => {
            // `Array(n)` presizes; any other arity lists the elements.
            if args.len() == 1
                && let Some(Value::Num(n)) = args.first()
            {
                let n = *n;
                let len = crate::value::to_uint32(n);
                if f64::from(len) != n {
                    return Err(RunError::range_error("Invalid array length", Some(span)));
                }
                let mut st = interp.st();
                let id = st.heap.alloc_array(Vec::new());
                if let ObjectData::Array(arr) = st.heap.get_mut(id) {
                    arr.set_length(len);
                }
                return Ok(Value::Ref(id));
            }
            let mut st = interp.st();
            Ok(Value::Ref(st.heap.alloc_array(args)))
        }
        ArrayIsArray => {
            let is_array = match args.first() {
                Some(Value::Ref(id)) => {
                    let st = interp.st();
                    matches!(st.heap.get(*id), ObjectData::Array(_))
                }
                _ => false,
            };
            Ok(Value::Bool(is_array))
        }
        ArrayOf => {
            let mut st = interp.st();
            Ok(Value::Ref(st.heap.alloc_array(args)))
        }
        ArrayFrom => {
            let source = args.first().cloned().unwrap_or(Value::Undefined);
            let mut items = interp.iter_collect(&source, span).await?;
            if let Some(mapper) = args.get(1).filter(|m| !m.is_nullish()) {
                let mut mapped = Vec::with_capacity(items.len());
                for (index, item) in items.into_iter().enumerate() {
                    let value = interp
                        .call_value(mapper.clone(), Value::Undefined, vec![item, Value::Num(index as f64)], span)
                        .await?;
                    mapped.push(value);
                }
                items = mapped;
            }
            let mut st = interp.st();
            Ok(Value::Ref(st.heap.alloc_array(items)))
        }

        ArrayPush => {
            let id = receiver_array(interp, &this, span)?;
            frozen_check(interp, id, span)?;
            let mut st = interp.st();
            if let ObjectData::Array(arr) = st.heap.get_mut(id) {
                for arg in args {
                    arr.push(arg);
                }
                Ok(Value::Num(f64::from(arr.length())))
            } else {
                Ok(Value::Num(0.0))
            }
        }
        ArrayPop => {
            let id = receiver_array(interp, &this, span)?;
            frozen_check(interp, id, span)?;
            let mut st = interp.st();
            if let ObjectData::Array(arr) = st.heap.get_mut(id) {
                Ok(arr.pop().unwrap_or(Value::Undefined))
            } else {
                Ok(Value::Undefined)
            }
        }
        ArrayShift => {
            let id = receiver_array(interp, &this, span)?;
            frozen_check(interp, id, span)?;
            let mut items = elements(interp, id);
            if items.is_empty() {
                return Ok(Value::Undefined);
            }
            let first = items.remove(0);
            write_back(interp, id, items);
            Ok(first)
        }
        ArrayUnshift => {
            let id = receiver_array(interp, &this, span)?;
            frozen_check(interp, id, span)?;
            let mut items = elements(interp, id);
            for (offset, arg) in args.into_iter().enumerate() {
                items.insert(offset, arg);
            }
            let len = items.len();
            write_back(interp, id, items);
            Ok(Value::Num(len as f64))
        }
        ArraySlice => {
            let id = receiver_array(interp, &this, span)?;
            let items = elements(interp, id);
            let (start, end) = slice_bounds(interp, &args, items.len());
            let out: Vec<Value> = items.get(start..end.max(start)).unwrap_or(&[]).to_vec();
            let mut st = interp.st();
            Ok(Value::Ref(st.heap.alloc_array(out)))
        }
        ArraySplice => {
            let id = receiver_array(interp, &this, span)?;
            frozen_check(interp, id, span)?;
            let mut items = elements(interp, id);
            let len = items.len();
            let (start, delete_count) = {
                let st = interp.st();
                let start = rel_index(args.first().map_or(0.0, |v| ops::to_number(&st.heap, v)), len);
                let delete_count = match args.get(1) {
                    Some(v) => (ops::to_number(&st.heap, v).max(0.0) as usize).min(len - start),
                    None => len - start,
                };
                (start, delete_count)
            };
            let removed: Vec<Value> = items.splice(start..start + delete_count, args.into_iter().skip(2)).collect();
            write_back(interp, id, items);
            let mut st = interp.st();
            Ok(Value::Ref(st.heap.alloc_array(removed)))
        }
        ArrayConcat => {
            let id = receiver_array(interp, &this, span)?;
            let mut items = elements(interp, id);
            for arg in args {
                let is_array = matches!(&arg, Value::Ref(aid) if {
                    let st = interp.st();
                    matches!(st.heap.get(*aid), ObjectData::Array(_))
                });
                if is_array {
                    let Value::Ref(aid) = arg else { unreachable!() };
                    items.extend(elements(interp, aid));
                } else {
                    items.push(arg);
                }
            }
            let mut st = interp.st();
            Ok(Value::Ref(st.heap.alloc_array(items)))
        }
        ArrayJoin => {
            let id = receiver_array(interp, &this, span)?;
            let items = elements(interp, id);
            let st = interp.st();
            let separator = match args.first() {
                Some(Value::Undefined) | None => ",".to_owned(),
                Some(v) => ops::to_string_simple(&st.heap, v),
            };
            let parts: Vec<String> = items
                .iter()
                .map(|v| match v {
                    Value::Undefined | Value::Null => String::new(),
                    other => ops::to_string_simple(&st.heap, other),
                })
                .collect();
            Ok(Value::str(parts.join(&separator)))
        }
        ArrayIndexOf => {
            let id = receiver_array(interp, &this, span)?;
            let needle = args.first().cloned().unwrap_or(Value::Undefined);
            let index = elements(interp, id).iter().position(|v| v.strict_eq(&needle));
            Ok(Value::Num(index.map_or(-1.0, |i| i as f64)))
        }
        ArrayIncludes => {
            let id = receiver_array(interp, &this, span)?;
            let needle = args.first().cloned().unwrap_or(Value::Undefined);
            // `includes` uses SameValueZero, so NaN is findable.
            let found = elements(interp, id).iter().any(|v| v.same_value_zero(&needle));
            Ok(Value::Bool(found))
        }
        ArrayMap | ArrayFilter | ArrayForEach | ArrayFind | ArrayFindIndex | ArraySome | ArrayEvery => {
            let id = receiver_array(interp, &this, span)?;
            let callback = args.first().cloned().unwrap_or(Value::Undefined);
            let this_arg = args.get(1).cloned().unwrap_or(Value::Undefined);
            let items = elements(interp, id);
            let mut out = Vec::new();
            for (index, item) in items.into_iter().enumerate() {
                interp.on_loop_back_edge()?;
                let cb_args = vec![item.clone(), Value::Num(index as f64), this.clone()];
                let result = interp.call_value(callback.clone(), this_arg.clone(), cb_args, span).await?;
                match f {
                    ArrayMap => out.push(result),
                    ArrayFilter => {
                        if result.truthy() {
                            out.push(item);
                        }
                    }
                    ArrayForEach => {}
                    ArrayFind => {
                        if result.truthy() {
                            return Ok(item);
                        }
                    }
                    ArrayFindIndex => {
                        if result.truthy() {
                            return Ok(Value::Num(index as f64));
                        }
                    }
                    ArraySome => {
                        if result.truthy() {
                            return Ok(Value::Bool(true));
                        }
                    }
                    ArrayEvery => {
                        if !result.truthy() {
                            return Ok(Value::Bool(false));
                        }
                    }
                    _ => unreachable!(),
                }
            }
            match f {
                ArrayMap | ArrayFilter => {
                    let mut st = interp.st();
                    Ok(Value::Ref(st.heap.alloc_array(out)))
                }
                ArrayForEach => Ok(Value::Undefined),
                ArrayFind => Ok(Value::Undefined),
                ArrayFindIndex => Ok(Value::Num(-1.0)),
                ArraySome => Ok(Value::Bool(false)),
                ArrayEvery => Ok(Value::Bool(true)),
                _ => unreachable!(),
            }
        }
        ArrayReduce => {
            let id = receiver_array(interp, &this, span)?;
            let callback = args.first().cloned().unwrap_or(Value::Undefined);
            let items = elements(interp, id);
            let mut iter = items.into_iter().enumerate();
            let mut acc = match args.get(1) {
                Some(initial) => initial.clone(),
                None => match iter.next() {
                    Some((_, first)) => first,
                    None => {
                        return Err(RunError::type_error("Reduce of empty array with no initial value", Some(span)));
                    }
                },
            };
            for (index, item) in iter {
                interp.on_loop_back_edge()?;
                acc = interp
                    .call_value(
                        callback.clone(),
                        Value::Undefined,
                        vec![acc, item, Value::Num(index as f64), this.clone()],
                        span,
                    )
                    .await?;
            }
            Ok(acc)
        }
        ArrayReverse => {
            let id = receiver_array(interp, &this, span)?;
            frozen_check(interp, id, span)?;
            let mut items = elements(interp, id);
            items.reverse();
            write_back(interp, id, items);
            Ok(this)
        }
        ArrayFlat => {
            let id = receiver_array(interp, &this, span)?;
            let depth = {
                let st = interp.st();
                args.first().map_or(1.0, |v| ops::to_number(&st.heap, v))
            };
            let mut out = Vec::new();
            flatten(interp, id, depth as i64, &mut out);
            let mut st = interp.st();
            Ok(Value::Ref(st.heap.alloc_array(out)))
        }
        ArrayKeys | ArrayValues | ArrayEntries => {
            let id = receiver_array(interp, &this, span)?;
            let items = elements(interp, id);
            let mut st = interp.st();
            let values = match f {
                ArrayKeys => (0..items.len()).map(|i| Value::Num(i as f64)).collect(),
                ArrayValues => items,
                ArrayEntries => items
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| Value::Ref(st.heap.alloc_array(vec![Value::Num(i as f64), v])))
                    .collect(),
                _ => unreachable!(),
            };
            Ok(Value::Ref(st.heap.alloc(ObjectData::NativeIterator(NativeIterator::Values {
                values,
                index: 0,
            }))))
        }
        _ => unreachable!("non-array native routed to array::call"),
    }
}

fn write_back(interp: &Interp, id: HeapId, items: Vec<Value>) {
    let mut st = interp.st();
    if let ObjectData::Array(arr) = st.heap.get_mut(id) {
        *arr = crate::heap::ArrayObject::from_vec(items);
    }
}

fn slice_bounds(interp: &Interp, args: &[Value], len: usize) -> (usize, usize) {
    let st = interp.st();
    let start = match args.first() {
        Some(Value::Undefined) | None => 0,
        Some(v) => rel_index(ops::to_number(&st.heap, v), len),
    };
    let end = match args.get(1) {
        Some(Value::Undefined) | None => len,
        Some(v) => rel_index(ops::to_number(&st.heap, v), len),
    };
    (start, end)
}

fn flatten(interp: &Interp, id: HeapId, depth: i64, out: &mut Vec<Value>) {
    let items = elements(interp, id);
    for item in items {
        let nested = match (&item, depth > 0) {
            (Value::Ref(nid), true) => {
                let st = interp.st();
                matches!(st.heap.get(*nid), ObjectData::Array(_)).then_some(*nid)
            }
            _ => None,
        };
        match nested {
            Some(nid) => flatten(interp, nid, depth - 1, out),
            None => out.push(item),
        }
    }
}
