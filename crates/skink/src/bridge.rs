//! Host bridge and security gate.
//!
//! Everything crossing the sandbox boundary passes through here. Inbound host
//! values wrap as read-only [`ObjectData::BoundHost`] proxies; outbound run
//! results deep-convert into owned [`HostValue`]s (with a `Repr` stand-in for
//! sandbox-only values). Property names in the forbidden set are rejected
//! with security errors on every host access, and host-thrown errors re-enter
//! the sandbox with their messages subject to the sanitization policy.

use std::rc::Rc;

use ahash::AHashSet;
use serde::{Deserialize, Serialize};

use crate::{
    builtins::NativeFn,
    error::{Error, JsErrorKind, RunError, RunResult, codes},
    heap::{Heap, HeapId, Integrity, ObjectData, PropKey, PropValue},
    host::{HostError, HostValue},
    value::{SymbolRegistry, Value, number_to_string, utf16_len},
};

/// Property names every host access rejects, regardless of configuration.
pub const DEFAULT_FORBIDDEN_NAMES: &[&str] = &[
    "__proto__",
    "prototype",
    "constructor",
    "__defineGetter__",
    "__defineSetter__",
    "__lookupGetter__",
    "__lookupSetter__",
];

/// Host-facing security configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityOptions {
    /// Replace sandbox-crossing error details with sanitized forms.
    pub sanitize_errors: bool,
    /// Mask messages of errors thrown by host callbacks.
    pub hide_host_error_messages: bool,
    /// Extra property names to forbid on top of the default set.
    pub blocked_property_names: Vec<String>,
    /// `true`: writes through the host proxy throw a security error;
    /// `false`: they are silently ignored. The host object is never mutated
    /// either way.
    pub throw_on_host_write: bool,
}

impl Default for SecurityOptions {
    fn default() -> Self {
        Self {
            sanitize_errors: true,
            hide_host_error_messages: false,
            blocked_property_names: Vec::new(),
            throw_on_host_write: true,
        }
    }
}

/// Resolved policy consulted on every boundary crossing.
#[derive(Debug)]
pub(crate) struct SecurityPolicy {
    pub sanitize_errors: bool,
    pub hide_host_error_messages: bool,
    pub throw_on_host_write: bool,
    forbidden: AHashSet<Rc<str>>,
}

impl SecurityPolicy {
    pub(crate) fn from_options(options: &SecurityOptions) -> Self {
        let mut forbidden: AHashSet<Rc<str>> = DEFAULT_FORBIDDEN_NAMES.iter().map(|n| Rc::from(*n)).collect();
        for name in &options.blocked_property_names {
            forbidden.insert(Rc::from(name.as_str()));
        }
        Self {
            sanitize_errors: options.sanitize_errors,
            hide_host_error_messages: options.hide_host_error_messages,
            throw_on_host_write: options.throw_on_host_write,
            forbidden,
        }
    }

    pub(crate) fn is_forbidden(&self, name: &str) -> bool {
        self.forbidden.contains(name)
    }

    /// Gate applied to every property access on a bound host value.
    pub(crate) fn check_host_name(&self, name: &str) -> RunResult<()> {
        if self.is_forbidden(name) {
            let code = if name == "prototype" || name == "__proto__" {
                codes::SECURITY_PROTO_ACCESS
            } else {
                codes::SECURITY_FORBIDDEN_PROPERTY
            };
            return Err(RunError::fatal(Error::security(
                code,
                format!("access to property '{name}' on a host object is forbidden"),
            )));
        }
        Ok(())
    }
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self::from_options(&SecurityOptions::default())
    }
}

/// Wraps a host value entering the sandbox. Primitives pass by value;
/// containers and functions become read-only proxies.
pub(crate) fn host_to_value(heap: &mut Heap, value: &HostValue) -> Value {
    match value {
        HostValue::Undefined => Value::Undefined,
        HostValue::Null => Value::Null,
        HostValue::Bool(b) => Value::Bool(*b),
        HostValue::Number(n) => Value::Num(*n),
        HostValue::BigInt(n) => Value::BigNum(Rc::new(n.clone())),
        HostValue::String(s) => Value::str(s.as_str()),
        HostValue::Repr(s) => Value::str(s.as_str()),
        HostValue::Array(_) | HostValue::Object(_) | HostValue::Function(_) => {
            Value::Ref(heap.alloc(ObjectData::BoundHost(value.clone())))
        }
    }
}

/// Depth cap for outbound conversion; cyclic sandbox structures degrade to a
/// `Repr` marker instead of recursing forever.
const MAX_OUTBOUND_DEPTH: u32 = 32;

/// Converts a sandbox value for the host. Containers deep-copy; values with
/// no host mapping become [`HostValue::Repr`].
pub(crate) fn value_to_host(heap: &Heap, symbols: &SymbolRegistry, value: &Value) -> HostValue {
    value_to_host_inner(heap, symbols, value, 0)
}

fn value_to_host_inner(heap: &Heap, symbols: &SymbolRegistry, value: &Value, depth: u32) -> HostValue {
    if depth > MAX_OUTBOUND_DEPTH {
        return HostValue::Repr("[Circular]".to_owned());
    }
    match value {
        Value::Undefined => HostValue::Undefined,
        Value::Null => HostValue::Null,
        Value::Bool(b) => HostValue::Bool(*b),
        Value::Num(n) => HostValue::Number(*n),
        Value::BigNum(n) => HostValue::BigInt((**n).clone()),
        Value::Str(s) => HostValue::String(s.to_string()),
        Value::Sym(id) => {
            let data = symbols.get(*id);
            HostValue::Repr(format!("Symbol({})", data.description.as_deref().unwrap_or("")))
        }
        Value::Native(f) => HostValue::Repr(format!("[Function: {}]", f.display_name())),
        Value::Ref(id) => match heap.get(*id) {
            ObjectData::Plain(obj) => {
                let entries = obj.props.iter().filter(|(_, p)| p.enumerable).filter_map(|(key, prop)| {
                    let name = key.as_str()?.to_owned();
                    let value = match &prop.value {
                        PropValue::Data(v) => value_to_host_inner(heap, symbols, v, depth + 1),
                        PropValue::Accessor { .. } => HostValue::Repr("[Getter/Setter]".to_owned()),
                    };
                    Some((name, value))
                });
                HostValue::object(entries.collect::<Vec<_>>())
            }
            ObjectData::Array(arr) => HostValue::array(
                arr.to_dense()
                    .iter()
                    .map(|v| value_to_host_inner(heap, symbols, v, depth + 1))
                    .collect(),
            ),
            ObjectData::Function(func) => {
                HostValue::Repr(format!("[Function: {}]", func.name.as_deref().unwrap_or("anonymous")))
            }
            ObjectData::BoundFunction(func) => {
                HostValue::Repr(format!("[Function: bound {}]", func.name.as_deref().unwrap_or("")))
            }
            ObjectData::Class(class) => {
                HostValue::Repr(format!("[class {}]", class.name.as_deref().unwrap_or("(anonymous)")))
            }
            ObjectData::BoundHost(hv) => hv.clone(),
            ObjectData::Generator(_) => HostValue::Repr("[object Generator]".to_owned()),
            ObjectData::Promise(_) => HostValue::Repr("[object Promise]".to_owned()),
            ObjectData::Regex(re) => HostValue::Repr(format!("/{}/{}", re.source, re.flags)),
            ObjectData::NativeIterator(_) => HostValue::Repr("[object Iterator]".to_owned()),
        },
    }
}

/// Reads one property of a bound host value, applying the forbidden-name
/// gate first.
pub(crate) fn host_get(
    policy: &SecurityPolicy,
    heap: &mut Heap,
    host: &HostValue,
    key: &PropKey,
) -> RunResult<Value> {
    let PropKey::Str(name) = key else {
        // Symbols never resolve on host objects.
        return Ok(Value::Undefined);
    };
    policy.check_host_name(name)?;
    match host {
        HostValue::Array(arr) => {
            if &**name == "length" {
                return Ok(Value::Num(arr.len() as f64));
            }
            if &**name == "push" {
                return Ok(Value::Native(NativeFn::HostArrayPush));
            }
            if let Ok(index) = name.parse::<usize>() {
                return Ok(arr.get(index).map_or(Value::Undefined, |v| host_to_value(heap, &v)));
            }
            Ok(Value::Undefined)
        }
        HostValue::Object(obj) => Ok(obj.get(name).map_or(Value::Undefined, |v| host_to_value(heap, &v))),
        HostValue::Function(func) => match &**name {
            "name" => Ok(func.name().map_or(Value::Undefined, Value::str)),
            _ => Ok(Value::Undefined),
        },
        // Wrapped primitives never reach here; reads fall back to undefined.
        _ => Ok(Value::Undefined),
    }
}

/// Rejects (or silently ignores) a write through the host proxy.
pub(crate) fn host_set(policy: &SecurityPolicy, key: &PropKey) -> RunResult<()> {
    if let PropKey::Str(name) = key
        && policy.is_forbidden(name)
    {
        return Err(RunError::fatal(Error::security(
            codes::SECURITY_FORBIDDEN_PROPERTY,
            format!("access to property '{name}' on a host object is forbidden"),
        )));
    }
    if policy.throw_on_host_write {
        let name = key.as_str().unwrap_or("<symbol>");
        return Err(RunError::fatal(Error::security(
            codes::SECURITY_HOST_WRITE,
            format!("cannot assign to property '{name}' of a read-only host object"),
        )));
    }
    Ok(())
}

/// Translates a host-callback failure into the sandbox's runtime error,
/// applying the message policy. The stack attached later is the sandbox's
/// own call trace, never the host's.
pub(crate) fn host_error_to_run_error(policy: &SecurityPolicy, err: &HostError) -> RunError {
    let message = if policy.hide_host_error_messages {
        "error details hidden".to_owned()
    } else {
        err.message.clone()
    };
    RunError::raised(JsErrorKind::Generic, message, None)
}

/// Builds the frozen `{value, done}` pair used by iterator results.
pub(crate) fn alloc_iter_result(heap: &mut Heap, value: Value, done: bool) -> Value {
    let id = heap.alloc_plain();
    if let ObjectData::Plain(obj) = heap.get_mut(id) {
        obj.props
            .insert(PropKey::str("value"), crate::heap::Property::data(value));
        obj.props
            .insert(PropKey::str("done"), crate::heap::Property::data(Value::Bool(done)));
    }
    Value::Ref(id)
}

/// Freezes a heap object in place (`Object.freeze` and namespace sealing).
pub(crate) fn freeze_object(heap: &mut Heap, id: HeapId) {
    match heap.get_mut(id) {
        ObjectData::Plain(obj) => {
            obj.integrity = Integrity::Frozen;
            for prop in obj.props.values_mut() {
                prop.writable = false;
                prop.configurable = false;
            }
        }
        ObjectData::Array(arr) => arr.integrity = Integrity::Frozen,
        _ => {}
    }
}

/// Short printable description of a sandbox value for diagnostics.
pub(crate) fn describe_value(heap: &Heap, value: &Value) -> String {
    match value {
        Value::Undefined => "undefined".to_owned(),
        Value::Null => "null".to_owned(),
        Value::Bool(b) => b.to_string(),
        Value::Num(n) => number_to_string(*n),
        Value::BigNum(n) => format!("{n}n"),
        Value::Str(s) => {
            if utf16_len(s) > 64 {
                format!("'{}…'", &s[..s.len().min(64)])
            } else {
                format!("'{s}'")
            }
        }
        Value::Sym(_) => "Symbol(…)".to_owned(),
        Value::Native(f) => format!("[Function: {}]", f.display_name()),
        Value::Ref(id) => match heap.get(*id) {
            ObjectData::Plain(_) => "[object Object]".to_owned(),
            ObjectData::Array(arr) => format!("[Array({})]", arr.length()),
            ObjectData::Function(f) => format!("[Function: {}]", f.name.as_deref().unwrap_or("anonymous")),
            ObjectData::BoundFunction(_) => "[Function: bound]".to_owned(),
            ObjectData::Class(c) => format!("[class {}]", c.name.as_deref().unwrap_or("(anonymous)")),
            ObjectData::BoundHost(hv) => format!("[host {hv}]"),
            ObjectData::Generator(_) => "[object Generator]".to_owned(),
            ObjectData::Promise(_) => "[object Promise]".to_owned(),
            ObjectData::Regex(re) => format!("/{}/{}", re.source, re.flags),
            ObjectData::NativeIterator(_) => "[object Iterator]".to_owned(),
        },
    }
}
