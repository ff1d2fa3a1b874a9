//! Engine construction and the run entry points.
//!
//! An [`Engine`] owns the persistent sandbox state (heap, environments,
//! module cache, counters) and serializes runs through its scheduler gate.
//! `evaluate` is the synchronous entry: it polls the run future exactly once
//! against a noop waker, so any suspension point (await, async generators,
//! `for await..of`, host promises) surfaces as a hard error instead of a
//! hang. `evaluate_async` drives the same future on the host executor.

use std::{cell::RefCell, fmt, rc::Rc};

use indexmap::IndexMap;

use crate::{
    ast::{Program, SourceKind},
    bridge::{self, SecurityOptions, SecurityPolicy},
    builtins::NativeFn,
    error::{Error, ErrorCategory, RunError, ThrowPayload, codes},
    features::{FeatureControl, FeatureSet},
    host::HostValue,
    interp::{EngineState, Interp, RunCtx, func::poll_once},
    modules::{ModuleOptions, ModuleRegistry},
    resource::{AbortSignal, Governor, Limits, RunLimits, RunStats, TotalCounters},
    scheduler::{RunCtxGuard, RunGate},
    scope::{Binding, BindingKind, ScopeId, ScopeKind, ThisState},
    value::Value,
};

/// Host-supplied AST predicate run before execution.
pub type Validator = Rc<dyn Fn(&Program) -> Result<(), String>>;

/// Engine-level configuration.
#[derive(Default)]
pub struct InterpreterOptions {
    /// Feature whitelist/blacklist; absent means everything is enabled.
    pub feature_control: Option<FeatureControl>,
    /// Globals available to every run (overridable per run).
    pub globals: IndexMap<String, HostValue>,
    pub modules: ModuleOptions,
    pub security: Option<SecurityOptions>,
    pub limits: Limits,
    pub validator: Option<Validator>,
}

impl fmt::Debug for InterpreterOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterpreterOptions")
            .field("feature_control", &self.feature_control)
            .field("globals", &self.globals.keys().collect::<Vec<_>>())
            .field("modules", &self.modules)
            .field("security", &self.security)
            .field("limits", &self.limits)
            .field("validator", &self.validator.is_some())
            .finish()
    }
}

/// Per-run overrides; everything is optional.
#[derive(Default)]
pub struct RunOptions {
    /// Overlay globals, visible for exactly this run.
    pub globals: IndexMap<String, HostValue>,
    /// Overlay feature control, merged with the engine's under the
    /// whitelist-wins rule.
    pub features: Option<FeatureControl>,
    pub validator: Option<Validator>,
    /// Per-run counter limits replacing the engine's per-run set.
    pub limits: Option<RunLimits>,
    /// Deadline for asynchronous runs; synchronous runs reject it.
    pub timeout_ms: Option<u64>,
    /// Cooperative cancellation handle.
    pub abort: Option<AbortSignal>,
}

impl fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOptions")
            .field("globals", &self.globals.keys().collect::<Vec<_>>())
            .field("features", &self.features)
            .field("limits", &self.limits)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

/// Result of a `*_full` run: the value plus this run's resource counters.
#[derive(Debug, Clone, PartialEq)]
pub struct FullOutput {
    pub value: HostValue,
    pub stats: RunStats,
    pub totals: TotalCounters,
}

/// Input to a run: source text (parsed by the bundled front end) or a
/// pre-parsed tree.
pub enum ProgramInput {
    Source(String),
    Ast(Rc<Program>),
}

impl From<&str> for ProgramInput {
    fn from(source: &str) -> Self {
        Self::Source(source.to_owned())
    }
}

impl From<String> for ProgramInput {
    fn from(source: String) -> Self {
        Self::Source(source)
    }
}

impl From<Rc<Program>> for ProgramInput {
    fn from(ast: Rc<Program>) -> Self {
        Self::Ast(ast)
    }
}

/// A sandboxed interpreter instance.
pub struct Engine {
    state: Rc<RefCell<EngineState>>,
    gate: RunGate,
    base_features: Option<FeatureControl>,
    base_limits: Limits,
    validator: Option<Validator>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("features", &self.base_features)
            .field("limits", &self.base_limits)
            .finish()
    }
}

impl Engine {
    #[must_use]
    pub fn new(options: InterpreterOptions) -> Self {
        let policy = SecurityPolicy::from_options(&options.security.clone().unwrap_or_default());
        let registry = ModuleRegistry::from_options(&options.modules);
        let mut state = EngineState::new(policy, registry);

        // Language intrinsics first, host globals on top (hosts may shadow).
        let global = state.global_scope;
        let intrinsics: [(&str, Value); 6] = [
            ("undefined", Value::Undefined),
            ("NaN", Value::Num(f64::NAN)),
            ("Infinity", Value::Num(f64::INFINITY)),
            ("Object", Value::Native(NativeFn::ObjectCtor)),
            ("Array", Value::Native(NativeFn::ArrayCtor)),
            ("Symbol", Value::Native(NativeFn::SymbolCtor)),
        ];
        for (name, value) in intrinsics {
            state
                .scopes
                .declare(global, name.into(), Binding::initialized(BindingKind::Const, value));
        }
        for (name, value) in &options.globals {
            let wrapped = bridge::host_to_value(&mut state.heap, value);
            state
                .scopes
                .declare(global, name.as_str().into(), Binding::initialized(BindingKind::Const, wrapped));
        }

        Self {
            state: Rc::new(RefCell::new(state)),
            gate: RunGate::new(),
            base_features: options.feature_control,
            base_limits: options.limits,
            validator: options.validator,
        }
    }

    // --- run entry points ---

    /// Synchronous evaluation. Rejects timeouts and any construct that
    /// requires suspension, and fails fast when the engine is mid-async-run.
    pub fn evaluate(&self, input: impl Into<ProgramInput>, options: RunOptions) -> Result<HostValue, Error> {
        self.evaluate_full(input, options).map(|out| out.value)
    }

    /// Synchronous evaluation returning the value plus resource counters.
    pub fn evaluate_full(&self, input: impl Into<ProgramInput>, options: RunOptions) -> Result<FullOutput, Error> {
        if options.timeout_ms.is_some() {
            return Err(Error::runtime(
                codes::RUNTIME_SYNC_SUSPEND,
                "synchronous runs cannot set a timeout; use evaluate_async",
            ));
        }
        let (program, source) = self.prepare(input.into(), SourceKind::Script)?;
        self.validate(&program, &options)?;
        let Some(_lock) = self.gate.try_acquire() else {
            return Err(Error::runtime(
                codes::RUNTIME_ENGINE_BUSY,
                "the engine is busy with an asynchronous run",
            ));
        };
        let (mut guard, scope) = self.install_run(&options, false);
        let interp = Interp::new(self.state.clone());
        let mut fut = futures::FutureExt::boxed_local(async { interp.run_program(&program, scope).await });
        let result = match poll_once(&mut fut) {
            std::task::Poll::Ready(result) => result,
            std::task::Poll::Pending => Err(RunError::fatal(Error::runtime(
                codes::RUNTIME_SYNC_SUSPEND,
                "the program suspended during a synchronous run",
            ))),
        };
        drop(fut);
        let stats = guard.finish();
        let totals = self.totals();
        let value = result.map_err(|err| self.to_public_error(err, source.as_deref()))?;
        let value = {
            let st = self.state.borrow();
            bridge::value_to_host(&st.heap, &st.symbols, &value)
        };
        Ok(FullOutput { value, stats, totals })
    }

    /// Asynchronous evaluation: suspension points drive on the host executor
    /// and the optional deadline is honored at every boundary check.
    pub async fn evaluate_async(&self, input: impl Into<ProgramInput>, options: RunOptions) -> Result<HostValue, Error> {
        self.evaluate_async_full(input, options).await.map(|out| out.value)
    }

    pub async fn evaluate_async_full(
        &self,
        input: impl Into<ProgramInput>,
        options: RunOptions,
    ) -> Result<FullOutput, Error> {
        let (program, source) = self.prepare(input.into(), SourceKind::Script)?;
        self.validate(&program, &options)?;
        let _lock = self.gate.acquire().await;
        let (mut guard, scope) = self.install_run(&options, true);
        let interp = Interp::new(self.state.clone());
        let result = interp.run_program(&program, scope).await;
        let stats = guard.finish();
        let totals = self.totals();
        let value = result.map_err(|err| self.to_public_error(err, source.as_deref()))?;
        let value = {
            let st = self.state.borrow();
            bridge::value_to_host(&st.heap, &st.symbols, &value)
        };
        Ok(FullOutput { value, stats, totals })
    }

    /// Evaluates a module and resolves to its frozen namespace object.
    /// Top-level `await` is permitted here (and only here).
    pub async fn evaluate_module(
        &self,
        input: impl Into<ProgramInput>,
        path: &str,
        options: RunOptions,
    ) -> Result<HostValue, Error> {
        if !self.is_module_system_enabled() {
            return Err(Error::runtime(
                codes::RUNTIME_MODULES_DISABLED,
                "the module system is not enabled",
            ));
        }
        let (program, source) = self.prepare(input.into(), SourceKind::Module)?;
        self.validate(&program, &options)?;
        let _lock = self.gate.acquire().await;
        let (mut guard, _scope) = self.install_run(&options, true);
        let interp = Interp::new(self.state.clone());
        let result = interp.load_entry_module(program, path.into(), crate::ast::Span::default()).await;
        guard.finish();
        let cache_enabled = {
            let st = self.state.borrow();
            st.modules.cache_enabled
        };
        if !cache_enabled {
            // Keep only this entry's namespace; retire the graph.
            let value = result.map_err(|err| self.to_public_error(err, source.as_deref()))?;
            let host = {
                let st = self.state.borrow();
                bridge::value_to_host(&st.heap, &st.symbols, &value)
            };
            self.state.borrow_mut().modules.clear();
            return Ok(host);
        }
        let value = result.map_err(|err| self.to_public_error(err, source.as_deref()))?;
        let st = self.state.borrow();
        Ok(bridge::value_to_host(&st.heap, &st.symbols, &value))
    }

    // --- module surface ---

    pub fn clear_module_cache(&self) {
        self.state.borrow_mut().modules.clear();
    }

    /// Namespace of an already-evaluated module, converted for the host.
    #[must_use]
    pub fn get_module_exports(&self, path: &str) -> Option<HostValue> {
        let st = self.state.borrow();
        let namespace = st.modules.cache.get(path)?.namespace.clone()?;
        Some(bridge::value_to_host(&st.heap, &st.symbols, &namespace))
    }

    #[must_use]
    pub fn is_module_system_enabled(&self) -> bool {
        self.state.borrow().modules.enabled
    }

    /// Engine-lifetime counter totals.
    #[must_use]
    pub fn totals(&self) -> TotalCounters {
        self.state.borrow().totals
    }

    // --- internals ---

    fn prepare(&self, input: ProgramInput, kind: SourceKind) -> Result<(Rc<Program>, Option<String>), Error> {
        match input {
            ProgramInput::Source(source) => {
                let program = crate::parser::parse(&source, kind).map_err(|mut err| {
                    err.attach_excerpt(&source);
                    err
                })?;
                Ok((Rc::new(program), Some(source)))
            }
            ProgramInput::Ast(ast) => {
                if ast.kind != kind {
                    return Err(Error::new(
                        ErrorCategory::Parse,
                        codes::PARSE_BAD_AST,
                        format!("expected a {kind:?} tree, got a {:?} tree", ast.kind),
                    ));
                }
                Ok((ast, None))
            }
        }
    }

    fn validate(&self, program: &Program, options: &RunOptions) -> Result<(), Error> {
        for validator in [self.validator.as_ref(), options.validator.as_ref()].into_iter().flatten() {
            validator(program).map_err(|message| {
                Error::runtime(codes::RUNTIME_VALIDATION, format!("program rejected by validator: {message}"))
            })?;
        }
        Ok(())
    }

    /// Installs the per-run context: governor, effective features, and the
    /// overlay scope carrying this run's globals.
    fn install_run(&self, options: &RunOptions, async_mode: bool) -> (RunCtxGuard, ScopeId) {
        let mut st = self.state.borrow_mut();

        let features = match (&self.base_features, &options.features) {
            (Some(base), Some(overlay)) => FeatureSet::from_control(&base.merge(overlay)),
            (Some(base), None) => FeatureSet::from_control(base),
            (None, Some(overlay)) => FeatureSet::from_control(overlay),
            (None, None) => FeatureSet::AllEnabled,
        };

        let per_run = options.limits.clone().unwrap_or_else(|| self.base_limits.per_run.clone());
        let abort = options.abort.clone().unwrap_or_default();
        let mut governor = Governor::new(per_run, self.base_limits.total.clone(), st.totals, abort);
        if let Some(timeout_ms) = options.timeout_ms {
            governor.set_deadline(std::time::Duration::from_millis(timeout_ms));
        }

        // Overlay scope: per-run globals shadow engine globals for exactly
        // this run.
        let global = st.global_scope;
        let overlay = st.scopes.push(Some(global), ScopeKind::Global);
        for (name, value) in &options.globals {
            let wrapped = bridge::host_to_value(&mut st.heap, value);
            st.scopes
                .declare(overlay, name.as_str().into(), Binding::initialized(BindingKind::Const, wrapped));
        }
        // Program scope: the run's function-level environment (`var` target).
        let program_scope = st.scopes.push(Some(overlay), ScopeKind::Function);
        let record = st.scopes.record_mut(program_scope);
        record.function_boundary = true;
        record.this = ThisState::Bound(Value::Undefined);

        let ctx = RunCtx {
            governor,
            features,
            async_mode,
            call_trace: Vec::new(),
        };
        drop(st);
        (RunCtxGuard::new(self.state.clone(), ctx), program_scope)
    }

    /// Maps an internal run error onto the public error surface, attaching
    /// the source excerpt and reconstructed stack.
    fn to_public_error(&self, err: RunError, source: Option<&str>) -> Error {
        let mut public = match err {
            RunError::Fatal(error) => *error,
            RunError::ForcedReturn(_) => Error::runtime(codes::RUNTIME_ERROR, "unexpected forced return"),
            RunError::Throw(thrown) => {
                let stack = thrown.stack.clone().unwrap_or_default();
                let span = thrown.span;
                let mut error = match &thrown.payload {
                    ThrowPayload::Raised { kind, message } => {
                        Error::runtime(kind.code(), format!("{}: {message}", kind.name()))
                    }
                    ThrowPayload::Value(value) => {
                        let st = self.state.borrow();
                        // Sanitized rendering keeps structure out of the
                        // message; the full value still rides in `thrown`.
                        let rendered = if st.policy.sanitize_errors {
                            bridge::describe_value(&st.heap, value)
                        } else {
                            crate::interp::ops::to_string_simple(&st.heap, value)
                        };
                        Error::runtime(codes::RUNTIME_THROWN, format!("Uncaught {rendered}"))
                    }
                };
                // The thrown value is preserved so the host can unwrap it.
                if let ThrowPayload::Value(value) = &thrown.payload {
                    let st = self.state.borrow();
                    error.thrown = Some(bridge::value_to_host(&st.heap, &st.symbols, value));
                }
                error.stack = stack;
                if let Some(span) = span {
                    error.span = Some(span);
                }
                error
            }
        };
        if let Some(source) = source {
            public.attach_excerpt(source);
        }
        public
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // Coroutine bodies hold Rc handles back into the engine state; clear
        // them so the arena drops instead of leaking through the cycle.
        self.state.borrow_mut().heap.clear_coroutines();
    }
}
