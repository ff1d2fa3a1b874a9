//! Host-facing values: what crosses the sandbox boundary in either direction.
//!
//! [`HostValue`] is the public value type. It owns its data; container
//! variants are shared handles (`Rc<RefCell<…>>`) so that a host callback
//! mutating its own object is observed by later host reads, while the sandbox
//! itself can only read through the bridge's read-only proxy.
//!
//! Values with no host mapping (closures, generator handles) surface as
//! [`HostValue::Repr`], a display-only stand-in.

use std::{cell::RefCell, fmt, rc::Rc};

use futures::future::LocalBoxFuture;
use indexmap::IndexMap;
use num_bigint::BigInt;

/// Error raised by a host callback. The message crosses into the sandbox
/// subject to the engine's sanitization policy.
#[derive(Debug, Clone)]
pub struct HostError {
    pub message: String,
}

impl HostError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HostError {}

/// Synchronous host callback.
pub type HostFn = Rc<dyn Fn(Vec<HostValue>) -> Result<HostValue, HostError>>;

/// Asynchronous host callback; calling it from script produces a promise the
/// sandbox can `await`.
pub type HostAsyncFn = Rc<dyn Fn(Vec<HostValue>) -> LocalBoxFuture<'static, Result<HostValue, HostError>>>;

#[derive(Clone)]
enum HostCallable {
    Sync(HostFn),
    Async(HostAsyncFn),
}

/// A host function bound into the sandbox as a callable global or member.
#[derive(Clone)]
pub struct HostFunction {
    name: Option<Rc<str>>,
    callable: HostCallable,
}

impl HostFunction {
    #[must_use]
    pub fn new(name: impl Into<Rc<str>>, f: impl Fn(Vec<HostValue>) -> Result<HostValue, HostError> + 'static) -> Self {
        Self {
            name: Some(name.into()),
            callable: HostCallable::Sync(Rc::new(f)),
        }
    }

    #[must_use]
    pub fn new_async(
        name: impl Into<Rc<str>>,
        f: impl Fn(Vec<HostValue>) -> LocalBoxFuture<'static, Result<HostValue, HostError>> + 'static,
    ) -> Self {
        Self {
            name: Some(name.into()),
            callable: HostCallable::Async(Rc::new(f)),
        }
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// True when calling this function yields a promise rather than a value.
    #[must_use]
    pub fn is_async(&self) -> bool {
        matches!(self.callable, HostCallable::Async(_))
    }

    /// Invokes a synchronous host function.
    ///
    /// # Panics
    /// Panics if called on an async host function; the bridge routes those
    /// through [`Self::call_async`].
    pub(crate) fn call_sync(&self, args: Vec<HostValue>) -> Result<HostValue, HostError> {
        match &self.callable {
            HostCallable::Sync(f) => f(args),
            HostCallable::Async(_) => panic!("async host function invoked synchronously"),
        }
    }

    pub(crate) fn call_async(&self, args: Vec<HostValue>) -> LocalBoxFuture<'static, Result<HostValue, HostError>> {
        match &self.callable {
            HostCallable::Sync(f) => {
                let result = f(args);
                Box::pin(async move { result })
            }
            HostCallable::Async(f) => f(args),
        }
    }

    fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.callable, &other.callable) {
            (HostCallable::Sync(a), HostCallable::Sync(b)) => Rc::ptr_eq(a, b),
            (HostCallable::Async(a), HostCallable::Async(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostFunction({})", self.name.as_deref().unwrap_or("<anonymous>"))
    }
}

/// Shared, host-owned array handle.
#[derive(Debug, Clone, Default)]
pub struct HostArray(Rc<RefCell<Vec<HostValue>>>);

impl HostArray {
    #[must_use]
    pub fn new(items: Vec<HostValue>) -> Self {
        Self(Rc::new(RefCell::new(items)))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<HostValue> {
        self.0.borrow().get(index).cloned()
    }

    pub fn push(&self, value: HostValue) {
        self.0.borrow_mut().push(value);
    }

    /// Snapshot of the current contents.
    #[must_use]
    pub fn to_vec(&self) -> Vec<HostValue> {
        self.0.borrow().clone()
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// Shared, host-owned object handle with insertion-ordered keys.
#[derive(Debug, Clone, Default)]
pub struct HostObject(Rc<RefCell<IndexMap<String, HostValue>>>);

impl HostObject {
    #[must_use]
    pub fn new(entries: impl IntoIterator<Item = (String, HostValue)>) -> Self {
        Self(Rc::new(RefCell::new(entries.into_iter().collect())))
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<HostValue> {
        self.0.borrow().get(key).cloned()
    }

    pub fn insert(&self, key: impl Into<String>, value: HostValue) {
        self.0.borrow_mut().insert(key.into(), value);
    }

    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.0.borrow().keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

/// A JavaScript value crossing the host boundary.
#[derive(Debug, Clone, Default)]
pub enum HostValue {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    BigInt(BigInt),
    String(String),
    Array(HostArray),
    Object(HostObject),
    Function(HostFunction),
    /// Display-only stand-in for sandbox values with no host mapping.
    Repr(String),
}

impl HostValue {
    #[must_use]
    pub fn function(name: impl Into<Rc<str>>, f: impl Fn(Vec<HostValue>) -> Result<HostValue, HostError> + 'static) -> Self {
        Self::Function(HostFunction::new(name, f))
    }

    #[must_use]
    pub fn async_function(
        name: impl Into<Rc<str>>,
        f: impl Fn(Vec<HostValue>) -> LocalBoxFuture<'static, Result<HostValue, HostError>> + 'static,
    ) -> Self {
        Self::Function(HostFunction::new_async(name, f))
    }

    #[must_use]
    pub fn array(items: Vec<HostValue>) -> Self {
        Self::Array(HostArray::new(items))
    }

    #[must_use]
    pub fn object(entries: impl IntoIterator<Item = (String, HostValue)>) -> Self {
        Self::Object(HostObject::new(entries))
    }

    /// Extracts an `f64` when the value is a number.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Extracts a string slice when the value is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::BigInt(a), Self::BigInt(b)) => a == b,
            (Self::String(a), Self::String(b)) | (Self::Repr(a), Self::Repr(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a.ptr_eq(b) || a.to_vec() == b.to_vec(),
            (Self::Object(a), Self::Object(b)) => {
                a.ptr_eq(b) || {
                    let (a, b) = (a.0.borrow(), b.0.borrow());
                    a.len() == b.len() && a.iter().all(|(k, v)| b.get(k) == Some(v))
                }
            }
            (Self::Function(a), Self::Function(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<bool> for HostValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for HostValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<i32> for HostValue {
    fn from(v: i32) -> Self {
        Self::Number(f64::from(v))
    }
}

impl From<&str> for HostValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<String> for HostValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl fmt::Display for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined"),
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => f.write_str(&crate::value::number_to_string(*n)),
            Self::BigInt(n) => write!(f, "{n}n"),
            Self::String(s) | Self::Repr(s) => f.write_str(s),
            Self::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.to_vec().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Object(obj) => {
                f.write_str("{")?;
                for (i, key) in obj.keys().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {}", obj.get(key).unwrap_or_default())?;
                }
                f.write_str("}")
            }
            Self::Function(func) => write!(f, "[Function: {}]", func.name().unwrap_or("anonymous")),
        }
    }
}
