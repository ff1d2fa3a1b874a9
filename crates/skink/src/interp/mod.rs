//! The tree-walking evaluator.
//!
//! One evaluator serves both entry modes: every walker is an `async fn` (or
//! returns a `LocalBoxFuture`), so suspension points (`await`, `yield`) are
//! ordinary `.await`s. The synchronous entry point polls the run future once
//! with a noop waker and turns any `Pending` into a hard error; the async
//! entry point drives it on the host's executor. Generator handles own their
//! body futures, which is what makes resumable coroutines fall out of the
//! same walker.
//!
//! State is shared behind `Rc<RefCell<…>>`; borrows are short and never held
//! across an `.await`.

pub(crate) mod access;
pub(crate) mod class;
pub(crate) mod coroutine;
pub(crate) mod expr;
pub(crate) mod func;
pub(crate) mod iter;
pub(crate) mod ops;
pub(crate) mod pattern;
pub(crate) mod stmt;

use std::{
    cell::{RefCell, RefMut},
    rc::Rc,
};

use ahash::AHashMap;

use crate::{
    ast::Span,
    bridge::SecurityPolicy,
    error::{Error, RunError, RunResult, StackFrame, ThrowPayload, Thrown},
    features::{FeatureSet, FeatureTag},
    heap::{BrandId, Heap, ObjectData, PrivateMember, PropKey, Property},
    modules::ModuleRegistry,
    resource::{Governor, TotalCounters},
    scope::{Binding, BindingKind, BindingSlot, ScopeId, ScopeKind, Scopes},
    value::{SymbolRegistry, Value},
};

/// Outcome of evaluating a statement.
#[derive(Debug)]
pub(crate) enum Completion {
    /// Normal completion; carries the statement value (expression statements)
    /// so the program result is the last evaluated expression.
    Normal(Option<Value>),
    Break(Option<Rc<str>>),
    Continue(Option<Rc<str>>),
    Return(Value),
}

/// Per-run context installed by the scheduler for exactly one run.
#[derive(Debug)]
pub(crate) struct RunCtx {
    pub governor: Governor,
    pub features: FeatureSet,
    /// Suspension points are permitted (async entry) or a hard error (sync).
    pub async_mode: bool,
    /// Growing call trace used to reconstruct stacks on errors.
    pub call_trace: Vec<StackFrame>,
}

/// Engine-lifetime state: heap, environments, module cache, symbol registry.
pub(crate) struct EngineState {
    pub heap: Heap,
    pub scopes: Scopes,
    pub symbols: SymbolRegistry,
    pub global_scope: ScopeId,
    pub policy: SecurityPolicy,
    pub modules: ModuleRegistry,
    pub totals: TotalCounters,
    /// Private methods/accessors of every class, keyed by brand identity.
    pub private_methods: AHashMap<(BrandId, Rc<str>), PrivateMember>,
    pub run: Option<RunCtx>,
}

impl EngineState {
    pub(crate) fn new(policy: SecurityPolicy, modules: ModuleRegistry) -> Self {
        let heap = Heap::new();
        let mut scopes = Scopes::new();
        let global_scope = scopes.push(None, ScopeKind::Global);
        Self {
            heap,
            scopes,
            symbols: SymbolRegistry::new(),
            global_scope,
            policy,
            modules,
            totals: TotalCounters::default(),
            private_methods: AHashMap::new(),
            run: None,
        }
    }

    pub(crate) fn run_ctx(&mut self) -> &mut RunCtx {
        self.run.as_mut().expect("evaluation outside of an installed run")
    }
}

/// Cloneable handle on the engine state; every walker hangs off this.
#[derive(Clone)]
pub(crate) struct Interp {
    pub(crate) state: Rc<RefCell<EngineState>>,
}

impl Interp {
    pub(crate) fn new(state: Rc<RefCell<EngineState>>) -> Self {
        Self { state }
    }

    pub(crate) fn st(&self) -> RefMut<'_, EngineState> {
        self.state.borrow_mut()
    }

    // --- gating & accounting ---

    pub(crate) fn check_feature(&self, tag: FeatureTag, span: Span) -> RunResult<()> {
        let st = self.st();
        let enabled = st.run.as_ref().is_none_or(|run| run.features.enabled(tag));
        if enabled {
            Ok(())
        } else {
            Err(RunError::fatal(Error::feature(tag, span)))
        }
    }

    pub(crate) fn on_statement(&self) -> RunResult<()> {
        let mut st = self.st();
        let st = &mut *st;
        let totals = &mut st.totals;
        if let Some(run) = st.run.as_mut() {
            run.governor.on_statement()?;
            *totals = run.governor.totals;
        }
        Ok(())
    }

    pub(crate) fn on_loop_back_edge(&self) -> RunResult<()> {
        let mut st = self.st();
        let st = &mut *st;
        let totals = &mut st.totals;
        if let Some(run) = st.run.as_mut() {
            run.governor.on_loop_back_edge()?;
            *totals = run.governor.totals;
        }
        Ok(())
    }

    /// Abort/deadline check on coroutine resumption.
    pub(crate) fn check_interrupt(&self) -> RunResult<()> {
        let mut st = self.st();
        if let Some(run) = st.run.as_mut() {
            run.governor.check_interrupt()?;
        }
        Ok(())
    }

    pub(crate) fn require_async(&self, what: &str, span: Span) -> RunResult<()> {
        let st = self.st();
        let async_mode = st.run.as_ref().is_some_and(|run| run.async_mode);
        if async_mode {
            Ok(())
        } else {
            Err(RunError::fatal(
                Error::runtime(
                    crate::error::codes::RUNTIME_SYNC_SUSPEND,
                    format!("{what} requires an asynchronous run"),
                )
                .with_span(span),
            ))
        }
    }

    // --- identifier resolution ---

    /// Looks `name` up through the environment chain, honoring `with` shadow
    /// objects and live import indirections. Returns `None` when unresolved.
    pub(crate) async fn lookup_ident(&self, env: ScopeId, name: &str, span: Span) -> RunResult<Option<Value>> {
        let mut scope = env;
        loop {
            enum Step {
                WithObject(Value),
                Found(RunResult<Value>),
                Parent(ScopeId),
                Missing,
            }
            let step = {
                let st = self.st();
                let record = st.scopes.record(scope);
                if record.kind == ScopeKind::With
                    && let Some(with_obj) = &record.with_object
                    && access::has_property_shallow(&st.heap, with_obj, name)
                {
                    Step::WithObject(with_obj.clone())
                } else if record.bindings.contains_key(name) {
                    Step::Found(self.read_binding(&st, scope, name, span))
                } else {
                    match record.parent {
                        Some(parent) => Step::Parent(parent),
                        None => Step::Missing,
                    }
                }
            };
            match step {
                Step::WithObject(obj) => {
                    let key = PropKey::str(name);
                    return self.get_member(&obj, &key, false, span).await.map(Some);
                }
                Step::Found(result) => return result.map(Some),
                Step::Parent(parent) => scope = parent,
                Step::Missing => return Ok(None),
            }
        }
    }

    /// Reads a binding in `scope`, following indirections and applying TDZ.
    fn read_binding(&self, st: &RefMut<'_, EngineState>, scope: ScopeId, name: &str, span: Span) -> RunResult<Value> {
        let mut scope = scope;
        let mut name: Rc<str> = name.into();
        let mut hops = 0;
        loop {
            let Some(binding) = st.scopes.record(scope).bindings.get(&*name) else {
                return Err(RunError::reference_error(
                    format!("export '{name}' is not defined"),
                    Some(span),
                ));
            };
            if !binding.initialized && binding.kind.has_tdz() {
                return Err(RunError::reference_error(
                    format!("Cannot access '{name}' before initialization"),
                    Some(span),
                ));
            }
            match &binding.slot {
                BindingSlot::Value(value) => return Ok(value.clone()),
                BindingSlot::Indirect { scope: target, name: target_name } => {
                    hops += 1;
                    if hops > 64 {
                        return Err(RunError::reference_error("circular re-export chain", Some(span)));
                    }
                    scope = *target;
                    name = target_name.clone();
                }
            }
        }
    }

    pub(crate) async fn load_ident(&self, env: ScopeId, name: &str, span: Span) -> RunResult<Value> {
        match self.lookup_ident(env, name, span).await? {
            Some(value) => Ok(value),
            None => Err(RunError::reference_error(format!("Undefined variable '{name}'"), Some(span))),
        }
    }

    /// Assigns to an existing binding (const and TDZ respected); unresolved
    /// names are reference errors, never implicit globals.
    pub(crate) async fn store_ident(&self, env: ScopeId, name: &str, value: Value, span: Span) -> RunResult<()> {
        let mut scope = env;
        loop {
            enum Step {
                WithObject(Value),
                Stored(RunResult<()>),
                Parent(ScopeId),
                Missing,
            }
            let step = {
                let mut st = self.st();
                let record = st.scopes.record(scope);
                if record.kind == ScopeKind::With
                    && let Some(with_obj) = &record.with_object
                    && access::has_property_shallow(&st.heap, with_obj, name)
                {
                    Step::WithObject(with_obj.clone())
                } else if record.bindings.contains_key(name) {
                    let record = st.scopes.record_mut(scope);
                    let binding = record.bindings.get_mut(name).expect("binding just observed");
                    if !binding.initialized && binding.kind.has_tdz() {
                        Step::Stored(Err(RunError::reference_error(
                            format!("Cannot access '{name}' before initialization"),
                            Some(span),
                        )))
                    } else if matches!(binding.kind, BindingKind::Const) {
                        Step::Stored(Err(RunError::type_error("Assignment to constant variable", Some(span))))
                    } else if matches!(binding.kind, BindingKind::Import) {
                        Step::Stored(Err(RunError::type_error("Assignment to import binding", Some(span))))
                    } else {
                        binding.slot = BindingSlot::Value(value.clone());
                        Step::Stored(Ok(()))
                    }
                } else {
                    match record.parent {
                        Some(parent) => Step::Parent(parent),
                        None => Step::Missing,
                    }
                }
            };
            match step {
                Step::WithObject(obj) => {
                    let key = PropKey::str(name);
                    return self.set_member(&obj, &key, value, false, span).await;
                }
                Step::Stored(result) => return result,
                Step::Parent(parent) => scope = parent,
                Step::Missing => {
                    return Err(RunError::reference_error(format!("Undefined variable '{name}'"), Some(span)));
                }
            }
        }
    }

    /// Declares and initializes a binding in `env`.
    pub(crate) fn declare_ident(&self, env: ScopeId, name: Rc<str>, kind: BindingKind, value: Value) {
        let mut st = self.st();
        st.scopes.declare(env, name, Binding::initialized(kind, value));
    }

    /// Initializes an already-declared (TDZ) binding in `env`.
    pub(crate) fn initialize_binding(&self, env: ScopeId, name: &str, value: Value) {
        let mut st = self.st();
        if let Some(binding) = st.scopes.record_mut(env).bindings.get_mut(name) {
            binding.initialized = true;
            binding.slot = BindingSlot::Value(value);
        }
    }

    // --- thrown values ---

    /// Materializes an in-flight throw as the sandbox value a `catch` binds.
    pub(crate) fn thrown_to_value(&self, thrown: Thrown) -> Value {
        match thrown.payload {
            ThrowPayload::Value(value) => value,
            ThrowPayload::Raised { kind, message } => {
                let mut st = self.st();
                let id = st.heap.alloc_plain();
                if let ObjectData::Plain(obj) = st.heap.get_mut(id) {
                    obj.props
                        .insert(PropKey::str("name"), Property::data(Value::str(kind.name())));
                    obj.props
                        .insert(PropKey::str("message"), Property::data(Value::str(message.as_str())));
                }
                Value::Ref(id)
            }
        }
    }

    /// Current call trace, innermost last.
    pub(crate) fn capture_stack(&self) -> Vec<StackFrame> {
        let st = self.st();
        st.run.as_ref().map(|run| run.call_trace.clone()).unwrap_or_default()
    }
}
