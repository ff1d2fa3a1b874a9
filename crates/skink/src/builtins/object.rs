//! `Object` statics and the shared ordinary-object prototype methods.

use crate::{
    ast::Span,
    bridge,
    builtins::NativeFn,
    error::{Error, RunError, RunResult, codes},
    heap::{Integrity, ObjectData, PlainObject, PropKey, Property, PropValue},
    host::HostValue,
    interp::{Interp, ops},
    value::Value,
};

/// Own enumerable string-keyed entries of a value, in insertion order.
/// Host snapshots are taken under an immutable borrow, then wrapped.
fn own_entries(interp: &Interp, value: &Value) -> Vec<(String, Value)> {
    enum Plan {
        Direct(Vec<(String, Value)>),
        Host(Vec<(String, HostValue)>),
    }
    let plan = {
        let st = interp.st();
        match value {
            Value::Ref(id) => match st.heap.get(*id) {
                ObjectData::Plain(obj) => Plan::Direct(
                    ops::own_enumerable_data(&obj.props)
                        .into_iter()
                        .filter_map(|(k, v)| Some((k.as_str()?.to_owned(), v?)))
                        .collect(),
                ),
                ObjectData::Array(arr) => Plan::Direct(
                    arr.to_dense()
                        .into_iter()
                        .enumerate()
                        .map(|(i, v)| (i.to_string(), v))
                        .collect(),
                ),
                ObjectData::BoundHost(HostValue::Object(obj)) => Plan::Host(
                    obj.keys()
                        .into_iter()
                        .map(|key| {
                            let item = obj.get(&key).unwrap_or_default();
                            (key, item)
                        })
                        .collect(),
                ),
                ObjectData::BoundHost(HostValue::Array(arr)) => Plan::Host(
                    arr.to_vec()
                        .into_iter()
                        .enumerate()
                        .map(|(i, item)| (i.to_string(), item))
                        .collect(),
                ),
                _ => Plan::Direct(Vec::new()),
            },
            Value::Str(s) => Plan::Direct(
                s.chars()
                    .enumerate()
                    .map(|(i, c)| (i.to_string(), Value::str(c.to_string())))
                    .collect(),
            ),
            _ => Plan::Direct(Vec::new()),
        }
    };
    match plan {
        Plan::Direct(entries) => entries,
        Plan::Host(items) => {
            let mut st = interp.st();
            items
                .into_iter()
                .map(|(key, item)| {
                    let converted = bridge::host_to_value(&mut st.heap, &item);
                    (key, converted)
                })
                .collect()
        }
    }
}

pub(crate) async fn call(interp: &Interp, f: NativeFn, this: Value, args: Vec<Value>, span: Span) -> RunResult<Value> {
    use NativeFn::*;
    match f {
        ObjectCtor => {
            // `Object()` / `Object(value)`: fresh object, or identity for refs.
            match args.first() {
                Some(value @ Value::Ref(_)) => Ok(value.clone()),
                _ => {
                    let mut st = interp.st();
                    Ok(Value::Ref(st.heap.alloc_plain()))
                }
            }
        }
        ObjectKeys => {
            let target = args.first().cloned().unwrap_or(Value::Undefined);
            let keys: Vec<Value> = own_entries(interp, &target)
                .into_iter()
                .map(|(k, _)| Value::str(k))
                .collect();
            let mut st = interp.st();
            Ok(Value::Ref(st.heap.alloc_array(keys)))
        }
        ObjectValues => {
            let target = args.first().cloned().unwrap_or(Value::Undefined);
            let values: Vec<Value> = own_entries(interp, &target).into_iter().map(|(_, v)| v).collect();
            let mut st = interp.st();
            Ok(Value::Ref(st.heap.alloc_array(values)))
        }
        ObjectEntries => {
            let target = args.first().cloned().unwrap_or(Value::Undefined);
            let entries = own_entries(interp, &target);
            let mut st = interp.st();
            let items: Vec<Value> = entries
                .into_iter()
                .map(|(k, v)| Value::Ref(st.heap.alloc_array(vec![Value::str(k), v])))
                .collect();
            Ok(Value::Ref(st.heap.alloc_array(items)))
        }
        ObjectAssign => {
            let mut iter = args.into_iter();
            let target = iter.next().unwrap_or(Value::Undefined);
            let Value::Ref(_) = &target else {
                return Err(RunError::type_error("Object.assign target must be an object", Some(span)));
            };
            for source in iter {
                if source.is_nullish() {
                    continue;
                }
                for (key, value) in own_entries(interp, &source) {
                    if key == "__proto__" {
                        return Err(RunError::fatal(Error::security(
                            codes::SECURITY_PROTO_POLLUTION,
                            "assigning a '__proto__' key is not allowed",
                        )));
                    }
                    interp.set_member(&target, &PropKey::str(key), value, true, span).await?;
                }
            }
            Ok(target)
        }
        ObjectFreeze | ObjectSeal => {
            if let Some(Value::Ref(id)) = args.first() {
                let mut st = interp.st();
                if f == ObjectFreeze {
                    bridge::freeze_object(&mut st.heap, *id);
                } else {
                    match st.heap.get_mut(*id) {
                        ObjectData::Plain(obj) => {
                            obj.integrity = Integrity::Sealed;
                            for prop in obj.props.values_mut() {
                                prop.configurable = false;
                            }
                        }
                        ObjectData::Array(arr) => arr.integrity = Integrity::Sealed,
                        _ => {}
                    }
                }
            }
            Ok(args.into_iter().next().unwrap_or(Value::Undefined))
        }
        ObjectIsFrozen | ObjectIsSealed => {
            let integrity = match args.first() {
                Some(Value::Ref(id)) => {
                    let st = interp.st();
                    match st.heap.get(*id) {
                        ObjectData::Plain(obj) => obj.integrity,
                        ObjectData::Array(arr) => arr.integrity,
                        _ => Integrity::Frozen,
                    }
                }
                // Primitives are vacuously frozen.
                _ => Integrity::Frozen,
            };
            Ok(Value::Bool(match f {
                ObjectIsFrozen => integrity == Integrity::Frozen,
                _ => integrity != Integrity::None,
            }))
        }
        ObjectCreate => {
            let proto = match args.first() {
                Some(Value::Null) => None,
                Some(Value::Ref(id)) => Some(*id),
                _ => {
                    return Err(RunError::type_error(
                        "Object prototype may only be an object or null",
                        Some(span),
                    ));
                }
            };
            let mut st = interp.st();
            Ok(Value::Ref(st.heap.alloc(ObjectData::Plain(PlainObject::with_proto(proto)))))
        }
        ObjectGetPrototypeOf => {
            // Arrays, functions and classes report their implicit prototype
            // identities, same view as the `instanceof` walk.
            let proto = match args.first() {
                Some(Value::Ref(id)) => {
                    let st = interp.st();
                    st.heap.prototype_of_entry(*id)
                }
                _ => None,
            };
            Ok(proto.map_or(Value::Null, Value::Ref))
        }
        ObjectSetPrototypeOf => {
            // Prototype mutation is a pollution vector; the gate rejects it
            // outright for ordinary objects.
            Err(RunError::fatal(Error::security(
                codes::SECURITY_PROTO_POLLUTION,
                "Object.setPrototypeOf is not allowed",
            )))
        }
        ObjectDefineProperty => {
            let target = args.first().cloned().unwrap_or(Value::Undefined);
            let Value::Ref(id) = &target else {
                return Err(RunError::type_error("Object.defineProperty called on non-object", Some(span)));
            };
            {
                let st = interp.st();
                if st.heap.is_intrinsic_proto(*id) {
                    return Err(RunError::fatal(Error::security(
                        codes::SECURITY_PROTO_POLLUTION,
                        "mutating an intrinsic prototype is not allowed",
                    )));
                }
            }
            let key_value = args.get(1).cloned().unwrap_or(Value::Undefined);
            let key = interp.value_to_prop_key(&key_value);
            if matches!(key.as_str(), Some("__proto__" | "constructor")) {
                return Err(RunError::fatal(Error::security(
                    codes::SECURITY_PROTO_POLLUTION,
                    "defining '__proto__' or 'constructor' is not allowed",
                )));
            }
            let descriptor = args.get(2).cloned().unwrap_or(Value::Undefined);
            let value = interp.get_member(&descriptor, &PropKey::str("value"), false, span).await?;
            let get = interp.get_member(&descriptor, &PropKey::str("get"), false, span).await?;
            let set = interp.get_member(&descriptor, &PropKey::str("set"), false, span).await?;
            let writable = interp.get_member(&descriptor, &PropKey::str("writable"), false, span).await?;
            let enumerable = interp.get_member(&descriptor, &PropKey::str("enumerable"), false, span).await?;
            let configurable = interp
                .get_member(&descriptor, &PropKey::str("configurable"), false, span)
                .await?;
            let prop = if !get.is_nullish() || !set.is_nullish() {
                Property {
                    value: PropValue::Accessor {
                        get: (!get.is_nullish()).then_some(get),
                        set: (!set.is_nullish()).then_some(set),
                    },
                    writable: false,
                    enumerable: enumerable.truthy(),
                    configurable: configurable.truthy(),
                }
            } else {
                Property {
                    value: PropValue::Data(value),
                    writable: writable.truthy(),
                    enumerable: enumerable.truthy(),
                    configurable: configurable.truthy(),
                }
            };
            let mut st = interp.st();
            match st.heap.get_mut(*id) {
                ObjectData::Plain(obj) => {
                    if obj.integrity != Integrity::None && !obj.props.contains_key(&key) {
                        return Err(RunError::type_error("Cannot define property, object is not extensible", Some(span)));
                    }
                    obj.props.insert(key, prop);
                }
                _ => {
                    return Err(RunError::type_error(
                        "Object.defineProperty target must be an ordinary object",
                        Some(span),
                    ));
                }
            }
            drop(st);
            Ok(target)
        }
        ObjectFromEntries => {
            let source = args.first().cloned().unwrap_or(Value::Undefined);
            let pairs = interp.iter_collect(&source, span).await?;
            let id = {
                let mut st = interp.st();
                st.heap.alloc_plain()
            };
            for pair in pairs {
                let key_value = interp.get_member(&pair, &PropKey::str("0"), true, span).await?;
                let value = interp.get_member(&pair, &PropKey::str("1"), true, span).await?;
                let key = interp.value_to_prop_key(&key_value);
                if key.as_str() == Some("__proto__") {
                    return Err(RunError::fatal(Error::security(
                        codes::SECURITY_PROTO_POLLUTION,
                        "a '__proto__' entry is not allowed",
                    )));
                }
                let mut st = interp.st();
                if let ObjectData::Plain(obj) = st.heap.get_mut(id) {
                    obj.props.insert(key, Property::data(value));
                }
            }
            Ok(Value::Ref(id))
        }
        ObjectIs => {
            let a = args.first().cloned().unwrap_or(Value::Undefined);
            let b = args.get(1).cloned().unwrap_or(Value::Undefined);
            Ok(Value::Bool(a.same_value(&b)))
        }
        ObjectHasOwnProperty => {
            let key_value = args.first().cloned().unwrap_or(Value::Undefined);
            let key = interp.value_to_prop_key(&key_value);
            let st = interp.st();
            let has = match &this {
                Value::Ref(id) => match st.heap.get(*id) {
                    ObjectData::Plain(obj) => obj.props.contains_key(&key),
                    ObjectData::Array(arr) => key
                        .as_str()
                        .and_then(|name| name.parse::<u32>().ok())
                        .is_some_and(|i| arr.get(i).is_some()),
                    _ => false,
                },
                _ => false,
            };
            Ok(Value::Bool(has))
        }
        ObjectToString => {
            let st = interp.st();
            Ok(Value::str(ops::to_string_simple(&st.heap, &this)))
        }
        _ => unreachable!("non-object native routed to object::call"),
    }
}
