//! Property access: reads, writes, deletes, existence checks.
//!
//! All forbidden-name and prototype-pollution checks live at this layer, at
//! evaluation time, because computed keys only reveal their identity at
//! runtime. Accessor properties re-enter the evaluator through `call_value`.

use crate::{
    ast::Span,
    bridge,
    builtins,
    error::{Error, RunError, RunResult, codes},
    heap::{Heap, Integrity, ObjectData, PropKey, PropValue, Property},
    host::HostValue,
    interp::Interp,
    value::{SYMBOL_ITERATOR, Value, number_to_string},
};

/// Outcome of an in-borrow property inspection, acted on after the heap
/// borrow is released.
enum GetPlan {
    Value(Value),
    CallGetter(Value),
    HostGet(HostValue),
    Missing,
}

enum SetPlan {
    Done,
    CallSetter(Value),
    HostSet(HostValue),
    Fail(RunError),
}

impl Interp {
    /// Security gate for property keys on sandbox-internal objects.
    ///
    /// `__proto__` is blocked in every form; a computed key equal to
    /// `constructor` is blocked against any object on the ordinary prototype
    /// chain (pollution defense); a static `constructor` read stays legal.
    fn gate_internal_key(&self, target: &Value, key: &PropKey, computed: bool, is_write: bool) -> RunResult<()> {
        let PropKey::Str(name) = key else { return Ok(()) };
        if &**name == "__proto__" {
            let code = if is_write {
                codes::SECURITY_PROTO_POLLUTION
            } else {
                codes::SECURITY_PROTO_ACCESS
            };
            return Err(RunError::fatal(Error::security(
                code,
                "access to '__proto__' is not allowed",
            )));
        }
        if &**name == "constructor" && (computed || is_write) {
            let on_ordinary_chain = {
                let st = self.st();
                match target {
                    Value::Ref(id) => st.heap.chain_includes_object_proto(*id),
                    _ => false,
                }
            };
            if on_ordinary_chain {
                return Err(RunError::fatal(Error::security(
                    codes::SECURITY_PROTO_POLLUTION,
                    "dynamic access to 'constructor' is not allowed",
                )));
            }
        }
        Ok(())
    }

    pub(crate) async fn get_member(&self, target: &Value, key: &PropKey, computed: bool, span: Span) -> RunResult<Value> {
        if target.is_nullish() {
            let what = if matches!(target, Value::Null) { "null" } else { "undefined" };
            let name = key.as_str().unwrap_or("<symbol>");
            return Err(RunError::type_error(
                format!("Cannot read properties of {what} (reading '{name}')"),
                Some(span),
            ));
        }
        self.gate_internal_key(target, key, computed, false)?;

        // Primitive receivers dispatch straight to the builtin tables.
        match target {
            Value::Str(s) => return builtins::string::member(self, s, key),
            Value::Num(_) | Value::BigNum(_) | Value::Bool(_) => return Ok(builtins::number_member(key)),
            Value::Sym(id) => {
                if key.as_str() == Some("description") {
                    let st = self.st();
                    let data = st.symbols.get(*id);
                    return Ok(data.description.clone().map_or(Value::Undefined, Value::Str));
                }
                return Ok(Value::Undefined);
            }
            Value::Native(f) => return builtins::native_static_member(self, *f, key),
            _ => {}
        }

        let plan = {
            let st = self.st();
            let Value::Ref(id) = target else { unreachable!("primitives handled above") };
            match st.heap.get(*id) {
                ObjectData::BoundHost(hv) => GetPlan::HostGet(hv.clone()),
                ObjectData::Plain(_) => plan_plain_get(&st.heap, *id, key),
                ObjectData::Array(arr) => match key {
                    PropKey::Str(name) if &**name == "length" => GetPlan::Value(Value::Num(f64::from(arr.length()))),
                    PropKey::Str(name) if &**name == "raw" && arr.raw.is_some() => {
                        GetPlan::Value(Value::Ref(arr.raw.expect("checked above")))
                    }
                    PropKey::Str(name) => {
                        if let Ok(index) = name.parse::<u32>() {
                            GetPlan::Value(arr.get(index).cloned().unwrap_or(Value::Undefined))
                        } else {
                            builtins::array::member(key).map_or(GetPlan::Missing, GetPlan::Value)
                        }
                    }
                    PropKey::Sym(_) => builtins::array::member(key).map_or(GetPlan::Missing, GetPlan::Value),
                },
                ObjectData::Function(func) => match key.as_str() {
                    Some("name") => GetPlan::Value(func.name.clone().map_or_else(|| Value::str(""), Value::Str)),
                    Some("length") => GetPlan::Value(Value::Num(func.def.params.iter().filter(|p| !p.rest && p.default.is_none()).count() as f64)),
                    Some("prototype") => match func.prototype_prop {
                        Some(proto) => GetPlan::Value(Value::Ref(proto)),
                        None => GetPlan::Value(Value::Undefined),
                    },
                    _ => match func.props.get(key) {
                        Some(Property {
                            value: PropValue::Data(v),
                            ..
                        }) => GetPlan::Value(v.clone()),
                        _ => builtins::function_member(key).map_or(GetPlan::Missing, GetPlan::Value),
                    },
                },
                ObjectData::BoundFunction(func) => match key.as_str() {
                    Some("name") => GetPlan::Value(
                        func.name
                            .clone()
                            .map_or_else(|| Value::str("bound"), Value::Str),
                    ),
                    _ => builtins::function_member(key).map_or(GetPlan::Missing, GetPlan::Value),
                },
                ObjectData::Class(_) => plan_class_get(&st.heap, *id, key),
                ObjectData::Generator(_) => match key {
                    // A generator handle is its own (async) iterator.
                    PropKey::Sym(sym) if *sym == SYMBOL_ITERATOR || *sym == crate::value::SYMBOL_ASYNC_ITERATOR => {
                        GetPlan::Value(target.clone())
                    }
                    _ => builtins::generator_member(key).map_or(GetPlan::Missing, GetPlan::Value),
                },
                ObjectData::Promise(_) => GetPlan::Missing,
                ObjectData::Regex(re) => match key.as_str() {
                    Some("source") => GetPlan::Value(Value::Str(re.source.clone())),
                    Some("flags") => GetPlan::Value(Value::Str(re.flags.clone())),
                    Some("global") => GetPlan::Value(Value::Bool(re.is_global())),
                    Some("test") => GetPlan::Value(Value::Native(builtins::NativeFn::RegexTest)),
                    Some("exec") => GetPlan::Value(Value::Native(builtins::NativeFn::RegexExec)),
                    _ => GetPlan::Missing,
                },
                ObjectData::NativeIterator(_) => match key {
                    PropKey::Str(name) if &**name == "next" => {
                        GetPlan::Value(Value::Native(builtins::NativeFn::NativeIteratorNext))
                    }
                    PropKey::Sym(sym) if *sym == SYMBOL_ITERATOR => GetPlan::Value(target.clone()),
                    _ => GetPlan::Missing,
                },
            }
        };

        match plan {
            GetPlan::Value(value) => Ok(value),
            GetPlan::Missing => Ok(Value::Undefined),
            GetPlan::CallGetter(getter) => self.call_value(getter, target.clone(), Vec::new(), span).await,
            GetPlan::HostGet(hv) => {
                let mut st = self.st();
                let st = &mut *st;
                bridge::host_get(&st.policy, &mut st.heap, &hv, key)
            }
        }
    }

    pub(crate) async fn set_member(
        &self,
        target: &Value,
        key: &PropKey,
        value: Value,
        computed: bool,
        span: Span,
    ) -> RunResult<()> {
        if target.is_nullish() {
            let name = key.as_str().unwrap_or("<symbol>");
            return Err(RunError::type_error(
                format!("Cannot set properties of undefined (setting '{name}')"),
                Some(span),
            ));
        }
        self.gate_internal_key(target, key, computed, true)?;

        let Value::Ref(id) = target else {
            let name = key.as_str().unwrap_or("<symbol>");
            return Err(RunError::type_error(
                format!("Cannot create property '{name}' on a primitive value"),
                Some(span),
            ));
        };
        {
            let st = self.st();
            if st.heap.is_intrinsic_proto(*id) {
                return Err(RunError::fatal(Error::security(
                    codes::SECURITY_PROTO_POLLUTION,
                    "mutating an intrinsic prototype is not allowed",
                )));
            }
        }

        let plan = {
            let mut st = self.st();
            let st = &mut *st;
            let id = *id;
            enum TargetKind {
                Host(HostValue),
                Plain,
                Array,
                Function,
                Class,
                Other,
            }
            let kind = match st.heap.get(id) {
                ObjectData::BoundHost(hv) => TargetKind::Host(hv.clone()),
                ObjectData::Plain(_) => TargetKind::Plain,
                ObjectData::Array(_) => TargetKind::Array,
                ObjectData::Function(_) => TargetKind::Function,
                ObjectData::Class(_) => TargetKind::Class,
                _ => TargetKind::Other,
            };
            match kind {
                TargetKind::Host(hv) => SetPlan::HostSet(hv),
                TargetKind::Plain => plan_plain_set(&mut st.heap, id, key, value.clone(), span),
                TargetKind::Array => plan_array_set(&mut st.heap, id, key, value.clone(), span),
                TargetKind::Function => {
                    if let ObjectData::Function(func) = st.heap.get_mut(id) {
                        if key.as_str() == Some("prototype") {
                            func.prototype_prop = match &value {
                                Value::Ref(proto) => Some(*proto),
                                _ => None,
                            };
                        }
                        func.props.insert(key.clone(), Property::data(value.clone()));
                    }
                    SetPlan::Done
                }
                TargetKind::Class => {
                    if let ObjectData::Class(class) = st.heap.get_mut(id) {
                        class.props.insert(key.clone(), Property::data(value.clone()));
                    }
                    SetPlan::Done
                }
                // Writes onto coroutine handles and regexes are dropped.
                TargetKind::Other => SetPlan::Done,
            }
        };

        match plan {
            SetPlan::Done => Ok(()),
            SetPlan::Fail(err) => Err(err),
            SetPlan::CallSetter(setter) => {
                self.call_value(setter, target.clone(), vec![value], span).await.map(|_| ())
            }
            SetPlan::HostSet(_) => {
                let st = self.st();
                let result = bridge::host_set(&st.policy, key);
                result
            }
        }
    }

    pub(crate) async fn delete_member(&self, target: &Value, key: &PropKey, span: Span) -> RunResult<bool> {
        let Value::Ref(id) = target else { return Ok(true) };
        let mut st = self.st();
        let st = &mut *st;
        let id = *id;
        if st.heap.is_intrinsic_proto(id) {
            return Err(RunError::fatal(Error::security(
                codes::SECURITY_PROTO_POLLUTION,
                "mutating an intrinsic prototype is not allowed",
            )));
        }
        match st.heap.get_mut(id) {
            ObjectData::BoundHost(_) => bridge::host_set(&st.policy, key).map(|()| false),
            ObjectData::Plain(obj) => {
                if let Some(prop) = obj.props.get(key) {
                    if !prop.configurable {
                        return Err(RunError::type_error(
                            format!("Cannot delete property '{}'", key.as_str().unwrap_or("<symbol>")),
                            Some(span),
                        ));
                    }
                    obj.props.shift_remove(key);
                }
                Ok(true)
            }
            ObjectData::Array(arr) => {
                if let Some(name) = key.as_str()
                    && let Ok(index) = name.parse::<u32>()
                {
                    arr.delete(index);
                }
                Ok(true)
            }
            _ => Ok(true),
        }
    }

    /// `key in target` (own plus prototype chain).
    pub(crate) fn has_property(&self, target: &Value, key: &PropKey, span: Span) -> RunResult<bool> {
        let Value::Ref(id) = target else {
            return Err(RunError::type_error(
                "Cannot use 'in' operator on a non-object",
                Some(span),
            ));
        };
        let st = self.st();
        Ok(has_key(&st.heap, *id, key))
    }

    /// Converts an arbitrary value into an own-property key.
    pub(crate) fn value_to_prop_key(&self, value: &Value) -> PropKey {
        match value {
            Value::Str(s) => PropKey::Str(s.clone()),
            Value::Sym(id) => PropKey::Sym(*id),
            Value::Num(n) => PropKey::str(number_to_string(*n)),
            Value::Bool(b) => PropKey::str(if *b { "true" } else { "false" }),
            Value::Undefined => PropKey::str("undefined"),
            Value::Null => PropKey::str("null"),
            Value::BigNum(n) => PropKey::str(n.to_string()),
            Value::Native(_) | Value::Ref(_) => {
                let st = self.st();
                PropKey::Str(super::ops::to_string_simple(&st.heap, value).into())
            }
        }
    }
}

fn plan_plain_get(heap: &Heap, id: crate::heap::HeapId, key: &PropKey) -> GetPlan {
    let mut current = Some(id);
    while let Some(cur) = current {
        let ObjectData::Plain(obj) = heap.get(cur) else { break };
        if let Some(prop) = obj.props.get(key) {
            return match &prop.value {
                PropValue::Data(v) => GetPlan::Value(v.clone()),
                PropValue::Accessor { get: Some(getter), .. } => GetPlan::CallGetter(getter.clone()),
                PropValue::Accessor { get: None, .. } => GetPlan::Value(Value::Undefined),
            };
        }
        current = obj.proto;
    }
    builtins::object_proto_member(key).map_or(GetPlan::Missing, GetPlan::Value)
}

fn plan_class_get(heap: &Heap, id: crate::heap::HeapId, key: &PropKey) -> GetPlan {
    // Statics inherit through the parent class chain.
    let mut current = Some(id);
    while let Some(cur) = current {
        let ObjectData::Class(class) = heap.get(cur) else { break };
        if let Some(prop) = class.props.get(key) {
            return match &prop.value {
                PropValue::Data(v) => GetPlan::Value(v.clone()),
                PropValue::Accessor { get: Some(getter), .. } => GetPlan::CallGetter(getter.clone()),
                PropValue::Accessor { get: None, .. } => GetPlan::Value(Value::Undefined),
            };
        }
        match key.as_str() {
            Some("name") => {
                return GetPlan::Value(class.name.clone().map_or_else(|| Value::str(""), Value::Str));
            }
            Some("prototype") => return GetPlan::Value(Value::Ref(class.prototype)),
            _ => {}
        }
        current = class.parent;
    }
    GetPlan::Missing
}

fn plan_plain_set(heap: &mut Heap, id: crate::heap::HeapId, key: &PropKey, value: Value, span: Span) -> SetPlan {
    // Accessor lookup walks the prototype chain before creating own keys.
    let mut current = Some(id);
    let mut own = true;
    while let Some(cur) = current {
        let ObjectData::Plain(obj) = heap.get(cur) else { break };
        if let Some(prop) = obj.props.get(key) {
            match &prop.value {
                PropValue::Accessor { set: Some(setter), .. } => return SetPlan::CallSetter(setter.clone()),
                PropValue::Accessor { set: None, .. } => {
                    return SetPlan::Fail(RunError::type_error(
                        format!(
                            "Cannot set property '{}' which has only a getter",
                            key.as_str().unwrap_or("<symbol>")
                        ),
                        Some(span),
                    ));
                }
                PropValue::Data(_) => {
                    if !prop.writable || obj.integrity == Integrity::Frozen {
                        return SetPlan::Fail(RunError::type_error(
                            format!(
                                "Cannot assign to read only property '{}'",
                                key.as_str().unwrap_or("<symbol>")
                            ),
                            Some(span),
                        ));
                    }
                    if own {
                        if let ObjectData::Plain(obj) = heap.get_mut(cur)
                            && let Some(prop) = obj.props.get_mut(key)
                        {
                            prop.value = PropValue::Data(value);
                        }
                        return SetPlan::Done;
                    }
                    // Writable data on the chain: shadow with an own key.
                    break;
                }
            }
        }
        current = obj.proto;
        own = false;
    }

    let ObjectData::Plain(obj) = heap.get_mut(id) else { return SetPlan::Done };
    if obj.integrity != Integrity::None {
        return SetPlan::Fail(RunError::type_error(
            format!(
                "Cannot add property '{}', object is not extensible",
                key.as_str().unwrap_or("<symbol>")
            ),
            Some(span),
        ));
    }
    obj.props.insert(key.clone(), Property::data(value));
    SetPlan::Done
}

fn plan_array_set(heap: &mut Heap, id: crate::heap::HeapId, key: &PropKey, value: Value, span: Span) -> SetPlan {
    let ObjectData::Array(arr) = heap.get_mut(id) else { return SetPlan::Done };
    if let Some(name) = key.as_str() {
        if name == "length" {
            if arr.integrity != Integrity::None {
                return SetPlan::Fail(RunError::type_error("Cannot assign to read only property 'length'", Some(span)));
            }
            let Value::Num(n) = value else {
                return SetPlan::Fail(RunError::range_error("Invalid array length", Some(span)));
            };
            let len = crate::value::to_uint32(n);
            if f64::from(len) != n {
                return SetPlan::Fail(RunError::range_error("Invalid array length", Some(span)));
            }
            arr.set_length(len);
            return SetPlan::Done;
        }
        if let Ok(index) = name.parse::<u32>() {
            match arr.integrity {
                Integrity::Frozen => {
                    return SetPlan::Fail(RunError::type_error(
                        format!("Cannot assign to read only property '{index}'"),
                        Some(span),
                    ));
                }
                Integrity::Sealed if index >= arr.length() => {
                    return SetPlan::Fail(RunError::type_error(
                        format!("Cannot add property '{index}', object is not extensible"),
                        Some(span),
                    ));
                }
                _ => {
                    arr.set(index, value);
                    return SetPlan::Done;
                }
            }
        }
    }
    // Non-index expandos on arrays are dropped.
    SetPlan::Done
}

/// Own-plus-chain key existence (for the `in` operator and `with` lookup).
pub(crate) fn has_key(heap: &Heap, id: crate::heap::HeapId, key: &PropKey) -> bool {
    match heap.get(id) {
        ObjectData::Plain(obj) => {
            if obj.props.contains_key(key) {
                return true;
            }
            obj.proto.is_some_and(|proto| has_key(heap, proto, key))
        }
        ObjectData::Array(arr) => {
            if let Some(name) = key.as_str() {
                if name == "length" {
                    return true;
                }
                if let Ok(index) = name.parse::<u32>() {
                    return arr.get(index).is_some();
                }
            }
            false
        }
        ObjectData::Class(class) => {
            class.props.contains_key(key) || class.parent.is_some_and(|p| has_key(heap, p, key))
        }
        ObjectData::Function(func) => func.props.contains_key(key),
        ObjectData::BoundHost(hv) => match (hv, key.as_str()) {
            (HostValue::Object(obj), Some(name)) => obj.get(name).is_some(),
            (HostValue::Array(arr), Some(name)) => {
                name == "length" || name.parse::<usize>().is_ok_and(|i| i < arr.len())
            }
            _ => false,
        },
        _ => false,
    }
}

/// Sync existence probe used by `with`-scope identifier lookup.
pub(crate) fn has_property_shallow(heap: &Heap, target: &Value, name: &str) -> bool {
    match target {
        Value::Ref(id) => has_key(heap, *id, &PropKey::str(name)),
        _ => false,
    }
}
