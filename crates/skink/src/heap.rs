//! Slab heap: all object state lives here, addressed by stable [`HeapId`]
//! indices.
//!
//! References are indices rather than pointers, so cycles among objects,
//! classes and environments are harmless. Reclamation is deferred: the arena
//! is dropped wholesale with the engine, and coroutine futures are cleared
//! explicitly first to break the `Rc` cycles they create back to the engine
//! state.

use std::{collections::BTreeMap, fmt, rc::Rc};

use ahash::{AHashMap, AHashSet};
use futures::future::LocalBoxFuture;
use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::{
    ast,
    error::RunResult,
    host::{HostError, HostValue},
    interp::coroutine::CoroutineChannel,
    scope::ScopeId,
    value::{SymbolId, Value},
};

/// Stable index of a heap entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct HeapId(u32);

impl HeapId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Class-identity token written into each instance's brand list at
/// construction; the runtime check for private-name access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct BrandId(u32);

/// Own-property key: a string or a symbol identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum PropKey {
    Str(Rc<str>),
    Sym(SymbolId),
}

impl PropKey {
    pub(crate) fn str(s: impl Into<Rc<str>>) -> Self {
        Self::Str(s.into())
    }

    pub(crate) fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            Self::Sym(_) => None,
        }
    }
}

/// Data slot or accessor pair of a property.
#[derive(Debug, Clone)]
pub(crate) enum PropValue {
    Data(Value),
    Accessor { get: Option<Value>, set: Option<Value> },
}

#[derive(Debug, Clone)]
pub(crate) struct Property {
    pub value: PropValue,
    pub writable: bool,
    pub enumerable: bool,
    pub configurable: bool,
}

impl Property {
    pub(crate) fn data(value: Value) -> Self {
        Self {
            value: PropValue::Data(value),
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }

    /// Non-enumerable data property (method-table entries).
    pub(crate) fn method(value: Value) -> Self {
        Self {
            value: PropValue::Data(value),
            writable: true,
            enumerable: false,
            configurable: true,
        }
    }

    pub(crate) fn accessor(get: Option<Value>, set: Option<Value>) -> Self {
        Self {
            value: PropValue::Accessor { get, set },
            writable: false,
            enumerable: true,
            configurable: true,
        }
    }
}

/// Object integrity level set by `Object.seal` / `Object.freeze`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Integrity {
    #[default]
    None,
    /// No new keys; existing writable properties stay writable.
    Sealed,
    /// No new keys, no writes.
    Frozen,
}

/// Ordinary object: ordered own properties plus a nullable prototype link.
#[derive(Debug, Default)]
pub(crate) struct PlainObject {
    pub props: IndexMap<PropKey, Property>,
    pub proto: Option<HeapId>,
    pub integrity: Integrity,
    /// Class brands stamped on this object at construction.
    pub brands: SmallVec<[BrandId; 2]>,
    /// Private fields keyed by brand identity and name.
    pub private: AHashMap<(BrandId, Rc<str>), Value>,
}

impl PlainObject {
    pub(crate) fn with_proto(proto: Option<HeapId>) -> Self {
        Self {
            proto,
            ..Self::default()
        }
    }
}

/// Array object: dense prefix, sparse tail, `length` invariant
/// (`length` is one past the highest occupied index).
#[derive(Debug, Default)]
pub(crate) struct ArrayObject {
    dense: Vec<Value>,
    sparse: BTreeMap<u32, Value>,
    length: u32,
    pub integrity: Integrity,
    /// `raw` companion of a tagged-template strings array.
    pub raw: Option<HeapId>,
}

impl ArrayObject {
    pub(crate) fn from_vec(items: Vec<Value>) -> Self {
        let length = items.len() as u32;
        Self {
            dense: items,
            sparse: BTreeMap::new(),
            length,
            integrity: Integrity::None,
            raw: None,
        }
    }

    pub(crate) fn length(&self) -> u32 {
        self.length
    }

    pub(crate) fn get(&self, index: u32) -> Option<&Value> {
        if (index as usize) < self.dense.len() {
            return Some(&self.dense[index as usize]);
        }
        self.sparse.get(&index)
    }

    /// Writes one element, growing `length` when the index extends the array.
    pub(crate) fn set(&mut self, index: u32, value: Value) {
        let idx = index as usize;
        if idx < self.dense.len() {
            self.dense[idx] = value;
        } else if idx == self.dense.len() && self.sparse.is_empty() {
            self.dense.push(value);
        } else {
            self.sparse.insert(index, value);
        }
        if index >= self.length {
            self.length = index + 1;
        }
    }

    pub(crate) fn push(&mut self, value: Value) {
        let index = self.length;
        self.set(index, value);
    }

    pub(crate) fn pop(&mut self) -> Option<Value> {
        if self.length == 0 {
            return None;
        }
        let index = self.length - 1;
        let value = if (index as usize) < self.dense.len() {
            self.dense.pop()
        } else {
            self.sparse.remove(&index)
        };
        self.length = index;
        Some(value.unwrap_or(Value::Undefined))
    }

    /// Truncates or extends to `length`, dropping elements past the end.
    pub(crate) fn set_length(&mut self, length: u32) {
        if length < self.length {
            self.dense.truncate(length as usize);
            self.sparse.retain(|k, _| *k < length);
        }
        self.length = length;
    }

    pub(crate) fn delete(&mut self, index: u32) {
        if (index as usize) < self.dense.len() {
            self.dense[index as usize] = Value::Undefined;
        } else {
            self.sparse.remove(&index);
        }
    }

    /// Snapshot of elements `0..length`, with holes read as undefined.
    pub(crate) fn to_dense(&self) -> Vec<Value> {
        (0..self.length)
            .map(|i| self.get(i).cloned().unwrap_or(Value::Undefined))
            .collect()
    }
}

/// Private-name environment of one class body, chained lexically so nested
/// classes can still see outer private names.
#[derive(Debug)]
pub(crate) struct PrivateEnv {
    pub parent: Option<Rc<PrivateEnv>>,
    pub brand: BrandId,
    /// Names declared by this class body.
    pub names: AHashSet<Rc<str>>,
}

impl PrivateEnv {
    /// Resolves a private name to the brand of the declaring class body.
    pub(crate) fn resolve(&self, name: &str) -> Option<BrandId> {
        if self.names.contains(name) {
            return Some(self.brand);
        }
        self.parent.as_ref().and_then(|p| p.resolve(name))
    }
}

/// Private member defined by a class body (methods and accessors; fields are
/// per-instance and live on the instance).
#[derive(Debug, Default, Clone)]
pub(crate) struct PrivateMember {
    pub method: Option<Value>,
    pub getter: Option<Value>,
    pub setter: Option<Value>,
}

/// Closure: a function definition plus its captured environment.
#[derive(Debug)]
pub(crate) struct FunctionObject {
    pub def: Rc<ast::Function>,
    pub scope: ScopeId,
    pub name: Option<Rc<str>>,
    /// Method home object, for `super` member lookup.
    pub home_object: Option<HeapId>,
    /// Private-name environment captured from the enclosing class body.
    pub private_env: Option<Rc<PrivateEnv>>,
    /// `.prototype` object, allocated for constructable functions.
    pub prototype_prop: Option<HeapId>,
    /// Expando properties assigned onto the function value.
    pub props: IndexMap<PropKey, Property>,
}

/// Product of `Function.prototype.bind`.
#[derive(Debug)]
pub(crate) struct BoundFunctionObject {
    pub target: Value,
    pub this: Value,
    pub partial_args: Vec<Value>,
    pub name: Option<Rc<str>>,
}

/// Instance-field key, resolved at class-definition time (computed keys
/// evaluate once, when the class is defined).
#[derive(Debug, Clone)]
pub(crate) enum FieldKey {
    Prop(PropKey),
    Private(Rc<str>),
}

/// One instance field: its resolved key and the index of its defining member
/// in the class body (for the initializer expression).
#[derive(Debug, Clone)]
pub(crate) struct InstanceField {
    pub key: FieldKey,
    pub member_index: usize,
}

/// Class constructor object: callable with `new`, carries statics, links the
/// prototype object and the private-name registry.
#[derive(Debug)]
pub(crate) struct ClassObject {
    pub def: Rc<ast::ClassDef>,
    pub name: Option<Rc<str>>,
    pub scope: ScopeId,
    /// Parent class for `extends` (instance and static inheritance).
    pub parent: Option<HeapId>,
    /// Prototype object holding instance methods and accessors.
    pub prototype: HeapId,
    pub brand: BrandId,
    pub private_env: Rc<PrivateEnv>,
    /// Static members live directly on the class object.
    pub props: IndexMap<PropKey, Property>,
    /// Explicit constructor definition, when the class declared one.
    pub ctor: Option<Rc<ast::Function>>,
    pub derived: bool,
    /// Instance fields in source order.
    pub instance_fields: Vec<InstanceField>,
    /// Brands stamped on the class object itself (static private access).
    pub brands: SmallVec<[BrandId; 2]>,
    /// Static private fields.
    pub private: AHashMap<(BrandId, Rc<str>), Value>,
}

/// Lifecycle of a generator handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GeneratorState {
    SuspendedStart,
    SuspendedYield,
    Running,
    Done,
}

/// Suspended coroutine: the handle owns the body future and the resume cell
/// the evaluator communicates through.
pub(crate) struct GeneratorObject {
    pub state: GeneratorState,
    pub body: Option<LocalBoxFuture<'static, RunResult<Value>>>,
    pub channel: Rc<CoroutineChannel>,
    pub is_async: bool,
}

impl fmt::Debug for GeneratorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratorObject")
            .field("state", &self.state)
            .field("is_async", &self.is_async)
            .finish_non_exhaustive()
    }
}

/// Internal promise record, or a handle to a pending host future.
pub(crate) enum PromiseState {
    Fulfilled(Value),
    Rejected(Value),
    /// Pending internal async-function body; driven by its awaiter.
    PendingBody(Option<LocalBoxFuture<'static, RunResult<Value>>>),
    /// Pending host call; settled when the host future resolves.
    PendingHost(Option<LocalBoxFuture<'static, Result<HostValue, HostError>>>),
}

pub(crate) struct PromiseObject {
    pub state: PromiseState,
}

impl fmt::Debug for PromiseObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            PromiseState::Fulfilled(_) => "fulfilled",
            PromiseState::Rejected(_) => "rejected",
            PromiseState::PendingBody(_) => "pending-body",
            PromiseState::PendingHost(_) => "pending-host",
        };
        f.debug_struct("PromiseObject").field("state", &state).finish()
    }
}

/// Regex value backed by the host regex library (`fancy-regex`), per the
/// proxied-numerics-and-regex policy.
#[derive(Debug)]
pub(crate) struct RegexObject {
    pub source: Rc<str>,
    pub flags: Rc<str>,
    pub compiled: fancy_regex::Regex,
}

impl RegexObject {
    pub(crate) fn is_global(&self) -> bool {
        self.flags.contains('g')
    }
}

/// State of a built-in iterator (arrays, strings, keys/values/entries views,
/// host arrays). User iterables go through the symbol protocol instead.
#[derive(Debug)]
pub(crate) enum NativeIterator {
    Array { array: HeapId, index: u32 },
    /// Iterates UTF-16-aligned character strings.
    String { chars: Vec<Rc<str>>, index: usize },
    Values { values: Vec<Value>, index: usize },
    HostArray { array: crate::host::HostArray, index: usize },
}

/// One heap entry.
#[derive(Debug)]
pub(crate) enum ObjectData {
    Plain(PlainObject),
    Array(ArrayObject),
    Function(FunctionObject),
    BoundFunction(BoundFunctionObject),
    Class(ClassObject),
    /// Live host value behind the read-only proxy.
    BoundHost(HostValue),
    Generator(GeneratorObject),
    Promise(PromiseObject),
    Regex(RegexObject),
    NativeIterator(NativeIterator),
}

/// The slab arena.
#[derive(Debug)]
pub(crate) struct Heap {
    entries: Vec<ObjectData>,
    /// The engine's `Object.prototype`; pollution checks compare against this
    /// identity and every ordinary chain terminates here.
    pub object_proto: HeapId,
    /// `Array.prototype`: the implicit prototype of every array object.
    pub array_proto: HeapId,
    /// `Function.prototype`: the implicit prototype of closures, bound
    /// functions, and (at the end of the static chain) classes.
    pub function_proto: HeapId,
    next_brand: u32,
}

impl Heap {
    pub(crate) fn new() -> Self {
        let mut heap = Self {
            entries: Vec::with_capacity(64),
            object_proto: HeapId(0),
            array_proto: HeapId(0),
            function_proto: HeapId(0),
            next_brand: 0,
        };
        heap.object_proto = heap.alloc(ObjectData::Plain(PlainObject::default()));
        heap.array_proto = heap.alloc(ObjectData::Plain(PlainObject::with_proto(Some(heap.object_proto))));
        heap.function_proto = heap.alloc(ObjectData::Plain(PlainObject::with_proto(Some(heap.object_proto))));
        heap
    }

    /// True for the engine's intrinsic prototype objects, which reject every
    /// mutation (pollution gate).
    pub(crate) fn is_intrinsic_proto(&self, id: HeapId) -> bool {
        id == self.object_proto || id == self.array_proto || id == self.function_proto
    }

    /// Implicit prototype link of a heap entry: explicit for ordinary
    /// objects, the built-in prototype identities for everything else. The
    /// chain walks behind `instanceof` and `Object.getPrototypeOf` share
    /// this view.
    pub(crate) fn prototype_of_entry(&self, id: HeapId) -> Option<HeapId> {
        match self.get(id) {
            ObjectData::Plain(obj) => obj.proto,
            ObjectData::Array(_) => Some(self.array_proto),
            ObjectData::Function(_) | ObjectData::BoundFunction(_) => Some(self.function_proto),
            // Static inheritance runs through the parent class first.
            ObjectData::Class(class) => class.parent.or(Some(self.function_proto)),
            ObjectData::BoundHost(_) => None,
            ObjectData::Generator(_) | ObjectData::Promise(_) | ObjectData::Regex(_) | ObjectData::NativeIterator(_) => {
                Some(self.object_proto)
            }
        }
    }

    pub(crate) fn alloc(&mut self, data: ObjectData) -> HeapId {
        let id = HeapId(self.entries.len() as u32);
        self.entries.push(data);
        id
    }

    pub(crate) fn get(&self, id: HeapId) -> &ObjectData {
        &self.entries[id.index()]
    }

    pub(crate) fn get_mut(&mut self, id: HeapId) -> &mut ObjectData {
        &mut self.entries[id.index()]
    }

    pub(crate) fn new_brand(&mut self) -> BrandId {
        let brand = BrandId(self.next_brand);
        self.next_brand += 1;
        brand
    }

    /// Allocates an empty ordinary object chained to `Object.prototype`.
    pub(crate) fn alloc_plain(&mut self) -> HeapId {
        let proto = self.object_proto;
        self.alloc(ObjectData::Plain(PlainObject::with_proto(Some(proto))))
    }

    pub(crate) fn alloc_array(&mut self, items: Vec<Value>) -> HeapId {
        self.alloc(ObjectData::Array(ArrayObject::from_vec(items)))
    }

    /// Walks the prototype chain of `id` looking for `Object.prototype`.
    ///
    /// Used by the pollution gate: computed `__proto__` / `constructor` keys
    /// are rejected against any object on the ordinary chain.
    pub(crate) fn chain_includes_object_proto(&self, id: HeapId) -> bool {
        let mut current = Some(id);
        let mut hops = 0;
        while let Some(cur) = current {
            if cur == self.object_proto {
                return true;
            }
            hops += 1;
            if hops > 64 {
                return false;
            }
            current = self.prototype_of_entry(cur);
        }
        false
    }

    /// Drops coroutine bodies and pending promise futures.
    ///
    /// The futures hold `Rc` handles back to the engine state; clearing them
    /// lets the arena drop cleanly when the engine is dropped.
    pub(crate) fn clear_coroutines(&mut self) {
        for entry in &mut self.entries {
            match entry {
                ObjectData::Generator(generator) => {
                    generator.body = None;
                }
                ObjectData::Promise(promise) => {
                    if let PromiseState::PendingBody(fut) = &mut promise.state {
                        *fut = None;
                    }
                }
                _ => {}
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_length_tracks_highest_index() {
        let mut arr = ArrayObject::from_vec(vec![Value::Num(1.0), Value::Num(2.0)]);
        assert_eq!(arr.length(), 2);
        arr.set(5, Value::Num(6.0));
        assert_eq!(arr.length(), 6);
        assert!(arr.get(3).is_none());
        assert_eq!(arr.to_dense().len(), 6);
        arr.set_length(2);
        assert_eq!(arr.length(), 2);
        assert!(arr.get(5).is_none());
    }

    #[test]
    fn prototype_chain_probe_detects_ordinary_objects() {
        let mut heap = Heap::new();
        let obj = heap.alloc_plain();
        assert!(heap.chain_includes_object_proto(obj));
        let bare = heap.alloc(ObjectData::Plain(PlainObject::with_proto(None)));
        assert!(!heap.chain_includes_object_proto(bare));
    }

    #[test]
    fn implicit_prototype_links() {
        let mut heap = Heap::new();
        let arr = heap.alloc_array(Vec::new());
        assert_eq!(heap.prototype_of_entry(arr), Some(heap.array_proto));
        assert_eq!(heap.prototype_of_entry(heap.array_proto), Some(heap.object_proto));
        assert_eq!(heap.prototype_of_entry(heap.object_proto), None);
        assert!(heap.chain_includes_object_proto(arr));
        assert!(heap.is_intrinsic_proto(heap.function_proto));
    }
}
