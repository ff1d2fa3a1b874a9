//! Function calls: activations, parameter binding, `this` modes, generator
//! and async-function instantiation, promise awaiting, and host calls.
//!
//! Calls are the recursion knot of the walker, so `call_value` returns a
//! boxed future; everything else can stay plain `async fn`.

use std::{
    rc::Rc,
    task::{Context, Poll},
};

use futures::{FutureExt, future::LocalBoxFuture, task::noop_waker};

use crate::{
    ast::{Function, FunctionBody, FunctionKind, Span},
    bridge::{self, describe_value},
    builtins,
    error::{RunError, RunResult, StackFrame},
    features::FeatureTag,
    heap::{
        FunctionObject, GeneratorObject, GeneratorState, HeapId, ObjectData, PrivateEnv, PromiseObject, PromiseState,
    },
    host::HostFunction,
    interp::{
        Completion, Interp,
        coroutine::{CoroutineChannel, ResumeMode},
    },
    scope::{ScopeId, ScopeKind, ThisState},
    value::Value,
};

/// Ingredients of a closure call, snapshotted out of the heap so no borrow is
/// held while the body runs.
pub(crate) struct ClosureParts {
    pub def: Rc<Function>,
    pub scope: ScopeId,
    pub name: Option<Rc<str>>,
    pub home_object: Option<HeapId>,
    pub private_env: Option<Rc<PrivateEnv>>,
}

impl Interp {
    pub(crate) fn call_value<'a>(
        &'a self,
        callee: Value,
        this: Value,
        args: Vec<Value>,
        span: Span,
    ) -> LocalBoxFuture<'a, RunResult<Value>> {
        async move {
            match callee {
                Value::Native(f) => builtins::call_native(self, f, this, args, span).await,
                Value::Ref(id) => {
                    enum Kind {
                        Closure(ClosureParts),
                        Bound { target: Value, this: Value, pre: Vec<Value> },
                        Class(Option<Rc<str>>),
                        Host(HostFunction),
                        NotCallable,
                    }
                    let kind = {
                        let st = self.st();
                        match st.heap.get(id) {
                            ObjectData::Function(func) => Kind::Closure(ClosureParts {
                                def: func.def.clone(),
                                scope: func.scope,
                                name: func.name.clone(),
                                home_object: func.home_object,
                                private_env: func.private_env.clone(),
                            }),
                            ObjectData::BoundFunction(func) => Kind::Bound {
                                target: func.target.clone(),
                                this: func.this.clone(),
                                pre: func.partial_args.clone(),
                            },
                            ObjectData::Class(class) => Kind::Class(class.name.clone()),
                            ObjectData::BoundHost(crate::host::HostValue::Function(hf)) => Kind::Host(hf.clone()),
                            _ => Kind::NotCallable,
                        }
                    };
                    match kind {
                        Kind::Closure(parts) => self.call_closure(parts, this, args, span).await,
                        Kind::Bound { target, this, pre } => {
                            let mut all = pre;
                            all.extend(args);
                            self.call_value(target, this, all, span).await
                        }
                        Kind::Class(name) => Err(RunError::type_error(
                            format!(
                                "Class constructor {} cannot be invoked without 'new'",
                                name.as_deref().unwrap_or("(anonymous)")
                            ),
                            Some(span),
                        )),
                        Kind::Host(hf) => self.call_host(&hf, args, span).await,
                        Kind::NotCallable => {
                            let desc = {
                                let st = self.st();
                                describe_value(&st.heap, &Value::Ref(id))
                            };
                            Err(RunError::type_error(format!("{desc} is not a function"), Some(span)))
                        }
                    }
                }
                other => {
                    let desc = {
                        let st = self.st();
                        describe_value(&st.heap, &other)
                    };
                    Err(RunError::type_error(format!("{desc} is not a function"), Some(span)))
                }
            }
        }
        .boxed_local()
    }

    pub(crate) async fn call_closure(
        &self,
        parts: ClosureParts,
        this: Value,
        args: Vec<Value>,
        span: Span,
    ) -> RunResult<Value> {
        match parts.def.kind {
            FunctionKind::Generator | FunctionKind::AsyncGenerator => {
                self.instantiate_generator(parts, this, args, span).await
            }
            FunctionKind::Async | FunctionKind::AsyncArrow => self.call_async_function(parts, this, args, span).await,
            _ => {
                let scope = self.make_activation(&parts, this, None);
                self.bind_params(&parts.def, args, scope, span).await?;
                self.enter_frame(parts.name.clone(), span)?;
                let result = self.run_function_body(parts.def.clone(), scope).await;
                self.exit_frame(result)
            }
        }
    }

    /// Creates the activation environment for one call.
    pub(crate) fn make_activation(
        &self,
        parts: &ClosureParts,
        this: Value,
        channel: Option<Rc<CoroutineChannel>>,
    ) -> ScopeId {
        let mut st = self.st();
        let scope = st.scopes.push(Some(parts.scope), ScopeKind::Function);
        let record = st.scopes.record_mut(scope);
        if parts.def.kind.is_arrow() {
            record.this = ThisState::NotBound;
        } else {
            record.this = ThisState::Bound(this);
            record.function_boundary = true;
            record.home_object = parts.home_object;
        }
        record.channel = channel;
        if record.private_env.is_none() {
            record.private_env = parts.private_env.clone();
        }
        scope
    }

    /// Binds parameters left to right: positional, defaults (evaluated in the
    /// activation scope as they bind), then the rest array.
    pub(crate) async fn bind_params(
        &self,
        def: &Rc<Function>,
        mut args: Vec<Value>,
        scope: ScopeId,
        span: Span,
    ) -> RunResult<()> {
        for (index, param) in def.params.iter().enumerate() {
            if param.rest {
                self.check_feature(FeatureTag::RestParameters, span)?;
                let rest: Vec<Value> = if index < args.len() { args.split_off(index) } else { Vec::new() };
                let rest_value = {
                    let mut st = self.st();
                    Value::Ref(st.heap.alloc_array(rest))
                };
                self.bind_pattern_declare(&param.pattern, rest_value, scope, crate::scope::BindingKind::Param)
                    .await?;
                return Ok(());
            }
            let mut value = args.get(index).cloned().unwrap_or(Value::Undefined);
            if let Some(default) = &param.default {
                self.check_feature(FeatureTag::DefaultParameters, span)?;
                if matches!(value, Value::Undefined) {
                    value = self.eval_expr(default, scope).await?;
                }
            }
            self.bind_pattern_declare(&param.pattern, value, scope, crate::scope::BindingKind::Param)
                .await?;
        }
        Ok(())
    }

    /// Evaluates a function body to its return value.
    pub(crate) async fn run_function_body(&self, def: Rc<Function>, scope: ScopeId) -> RunResult<Value> {
        match &def.body {
            FunctionBody::Expr(expr) => self.eval_expr(expr, scope).await,
            FunctionBody::Block(stmts) => {
                self.hoist_declarations(stmts, scope)?;
                match self.eval_stmts(stmts, scope).await? {
                    Completion::Return(value) => Ok(value),
                    Completion::Normal(_) => Ok(Value::Undefined),
                    Completion::Break(_) | Completion::Continue(_) => {
                        Err(RunError::raised(
                            crate::error::JsErrorKind::Generic,
                            "Illegal break/continue at function top level",
                            Some(def.span),
                        ))
                    }
                }
            }
        }
    }

    pub(crate) fn enter_frame(&self, name: Option<Rc<str>>, span: Span) -> RunResult<()> {
        let mut st = self.st();
        if let Some(run) = st.run.as_mut() {
            run.governor.enter_call()?;
            run.call_trace.push(StackFrame {
                function: name.map(|n| n.to_string()),
                span,
            });
        }
        Ok(())
    }

    /// Pops the trace frame, capturing the stack into an escaping throw once
    /// (at its innermost frame).
    pub(crate) fn exit_frame(&self, mut result: RunResult<Value>) -> RunResult<Value> {
        let mut st = self.st();
        if let Some(run) = st.run.as_mut() {
            if let Err(RunError::Throw(thrown)) = &mut result
                && thrown.stack.is_none()
            {
                thrown.stack = Some(run.call_trace.clone());
            }
            run.call_trace.pop();
            run.governor.exit_call();
        }
        result
    }

    // --- generators ---

    async fn instantiate_generator(
        &self,
        parts: ClosureParts,
        this: Value,
        args: Vec<Value>,
        span: Span,
    ) -> RunResult<Value> {
        let is_async = parts.def.kind == FunctionKind::AsyncGenerator;
        if is_async {
            self.require_async("instantiating an async generator", span)?;
        }
        let channel = CoroutineChannel::new();
        let scope = self.make_activation(&parts, this, Some(channel.clone()));
        // Parameters (including defaults) bind at call time; the body waits
        // for the first `next()`.
        self.bind_params(&parts.def, args, scope, span).await?;
        let body = function_body_future(self.clone(), parts.def, scope);
        let mut st = self.st();
        let id = st.heap.alloc(ObjectData::Generator(GeneratorObject {
            state: GeneratorState::SuspendedStart,
            body: Some(body),
            channel,
            is_async,
        }));
        Ok(Value::Ref(id))
    }

    /// Drives a generator with one `next`/`return`/`throw` resumption and
    /// returns the `{value, done}` result object.
    pub(crate) async fn generator_resume(&self, id: HeapId, mode: ResumeMode, span: Span) -> RunResult<Value> {
        self.check_interrupt()?;

        enum Plan {
            Result(Value, bool),
            Raise(RunError),
            Drive(LocalBoxFuture<'static, RunResult<Value>>),
        }
        let plan = {
            let mut st = self.st();
            let ObjectData::Generator(generator) = st.heap.get_mut(id) else {
                return Err(RunError::type_error("not a generator", Some(span)));
            };
            match generator.state {
                GeneratorState::Done => match mode {
                    ResumeMode::Next(_) => Plan::Result(Value::Undefined, true),
                    ResumeMode::Return(value) => Plan::Result(value, true),
                    ResumeMode::Throw(value) => Plan::Raise(RunError::throw(value, Some(span))),
                },
                GeneratorState::Running => {
                    Plan::Raise(RunError::type_error("Generator is already running", Some(span)))
                }
                GeneratorState::SuspendedStart => match mode {
                    ResumeMode::Return(value) => {
                        generator.state = GeneratorState::Done;
                        generator.body = None;
                        Plan::Result(value, true)
                    }
                    ResumeMode::Throw(value) => {
                        generator.state = GeneratorState::Done;
                        generator.body = None;
                        Plan::Raise(RunError::throw(value, Some(span)))
                    }
                    ResumeMode::Next(_) => match generator.body.take() {
                        Some(body) => {
                            generator.state = GeneratorState::Running;
                            Plan::Drive(body)
                        }
                        None => Plan::Result(Value::Undefined, true),
                    },
                },
                GeneratorState::SuspendedYield => match generator.body.take() {
                    Some(body) => {
                        generator.channel.set_resume(mode);
                        generator.state = GeneratorState::Running;
                        Plan::Drive(body)
                    }
                    None => Plan::Result(Value::Undefined, true),
                },
            }
        };

        let mut body = match plan {
            Plan::Result(value, done) => {
                let mut st = self.st();
                return Ok(bridge::alloc_iter_result(&mut st.heap, value, done));
            }
            Plan::Raise(err) => return Err(err),
            Plan::Drive(body) => body,
        };

        self.enter_frame(Some("<generator>".into()), span)?;

        enum Outcome {
            Finished(RunResult<Value>),
            Yielded(Value),
        }
        let channel = {
            let st = self.st();
            let ObjectData::Generator(generator) = st.heap.get(id) else { unreachable!() };
            generator.channel.clone()
        };
        let outcome = futures::future::poll_fn(|cx| match body.as_mut().poll(cx) {
            Poll::Ready(result) => Poll::Ready(Outcome::Finished(result)),
            Poll::Pending => match channel.take_yielded() {
                Some(value) => Poll::Ready(Outcome::Yielded(value)),
                // A genuine await inside an async generator body: propagate
                // with the caller's context.
                None => Poll::Pending,
            },
        })
        .await;

        match outcome {
            Outcome::Yielded(value) => {
                let _ = self.exit_frame(Ok(Value::Undefined));
                let mut st = self.st();
                if let ObjectData::Generator(generator) = st.heap.get_mut(id) {
                    generator.body = Some(body);
                    generator.state = GeneratorState::SuspendedYield;
                }
                Ok(bridge::alloc_iter_result(&mut st.heap, value, false))
            }
            Outcome::Finished(result) => {
                {
                    let mut st = self.st();
                    if let ObjectData::Generator(generator) = st.heap.get_mut(id) {
                        generator.state = GeneratorState::Done;
                        generator.body = None;
                    }
                }
                let result = match result {
                    Err(RunError::ForcedReturn(value)) => Ok(value),
                    other => other,
                };
                let result = self.exit_frame(result);
                let value = result?;
                let mut st = self.st();
                Ok(bridge::alloc_iter_result(&mut st.heap, value, true))
            }
        }
    }

    // --- async functions & promises ---

    async fn call_async_function(
        &self,
        parts: ClosureParts,
        this: Value,
        args: Vec<Value>,
        span: Span,
    ) -> RunResult<Value> {
        let scope = self.make_activation(&parts, this, None);
        self.bind_params(&parts.def, args, scope, span).await?;
        let mut body = function_body_future(self.clone(), parts.def, scope);
        // The synchronous prefix runs eagerly, like a JS async call.
        let state = match poll_once(&mut body) {
            Poll::Ready(Ok(value)) => PromiseState::Fulfilled(value),
            Poll::Ready(Err(RunError::Throw(thrown))) => PromiseState::Rejected(self.thrown_to_value(*thrown)),
            Poll::Ready(Err(RunError::ForcedReturn(_))) => {
                return Err(RunError::raised(
                    crate::error::JsErrorKind::Generic,
                    "unexpected forced return from async function",
                    Some(span),
                ));
            }
            Poll::Ready(Err(fatal)) => return Err(fatal),
            Poll::Pending => {
                self.require_async("calling an async function that suspends", span)?;
                PromiseState::PendingBody(Some(body))
            }
        };
        let mut st = self.st();
        Ok(Value::Ref(st.heap.alloc(ObjectData::Promise(PromiseObject { state }))))
    }

    /// `await` semantics: promises are driven to settlement, everything else
    /// passes through unchanged.
    pub(crate) async fn await_value(&self, value: Value, span: Span) -> RunResult<Value> {
        self.require_async("'await'", span)?;
        let Value::Ref(id) = &value else { return Ok(value) };
        let id = *id;

        enum Plan {
            NotPromise,
            Ready(RunResult<Value>),
            DriveBody(LocalBoxFuture<'static, RunResult<Value>>),
            DriveHost(LocalBoxFuture<'static, Result<crate::host::HostValue, crate::host::HostError>>),
        }
        let plan = {
            let mut st = self.st();
            match st.heap.get_mut(id) {
                ObjectData::Promise(promise) => match &mut promise.state {
                    PromiseState::Fulfilled(v) => Plan::Ready(Ok(v.clone())),
                    PromiseState::Rejected(v) => Plan::Ready(Err(RunError::throw(v.clone(), Some(span)))),
                    PromiseState::PendingBody(slot) => match slot.take() {
                        Some(fut) => Plan::DriveBody(fut),
                        None => Plan::Ready(Err(RunError::type_error(
                            "Promise is already being awaited",
                            Some(span),
                        ))),
                    },
                    PromiseState::PendingHost(slot) => match slot.take() {
                        Some(fut) => Plan::DriveHost(fut),
                        None => Plan::Ready(Err(RunError::type_error(
                            "Promise is already being awaited",
                            Some(span),
                        ))),
                    },
                },
                _ => Plan::NotPromise,
            }
        };

        match plan {
            Plan::NotPromise => Ok(value),
            Plan::Ready(result) => result,
            Plan::DriveBody(fut) => {
                let result = fut.await;
                self.check_interrupt()?;
                match result {
                    Ok(v) => {
                        self.settle_promise(id, PromiseState::Fulfilled(v.clone()));
                        Ok(v)
                    }
                    Err(RunError::Throw(thrown)) => {
                        let v = self.thrown_to_value(*thrown);
                        self.settle_promise(id, PromiseState::Rejected(v.clone()));
                        Err(RunError::throw(v, Some(span)))
                    }
                    Err(fatal) => Err(fatal),
                }
            }
            Plan::DriveHost(fut) => {
                let result = fut.await;
                self.check_interrupt()?;
                match result {
                    Ok(hv) => {
                        let v = {
                            let mut st = self.st();
                            bridge::host_to_value(&mut st.heap, &hv)
                        };
                        self.settle_promise(id, PromiseState::Fulfilled(v.clone()));
                        Ok(v)
                    }
                    Err(host_err) => {
                        let err = {
                            let st = self.st();
                            bridge::host_error_to_run_error(&st.policy, &host_err)
                        };
                        let RunError::Throw(thrown) = err else { return Err(err) };
                        let v = self.thrown_to_value(*thrown);
                        self.settle_promise(id, PromiseState::Rejected(v.clone()));
                        Err(RunError::throw(v, Some(span)))
                    }
                }
            }
        }
    }

    fn settle_promise(&self, id: HeapId, state: PromiseState) {
        let mut st = self.st();
        if let ObjectData::Promise(promise) = st.heap.get_mut(id) {
            promise.state = state;
        }
    }

    // --- host calls ---

    pub(crate) async fn call_host(&self, hf: &HostFunction, args: Vec<Value>, span: Span) -> RunResult<Value> {
        let host_args: Vec<crate::host::HostValue> = {
            let st = self.st();
            args.iter().map(|v| bridge::value_to_host(&st.heap, &st.symbols, v)).collect()
        };
        if hf.is_async() {
            let fut = hf.call_async(host_args);
            let mut st = self.st();
            return Ok(Value::Ref(st.heap.alloc(ObjectData::Promise(PromiseObject {
                state: PromiseState::PendingHost(Some(fut)),
            }))));
        }
        let result = hf.call_sync(host_args);
        match result {
            Ok(hv) => {
                let mut st = self.st();
                Ok(bridge::host_to_value(&mut st.heap, &hv))
            }
            Err(host_err) => {
                let st = self.st();
                let mut err = bridge::host_error_to_run_error(&st.policy, &host_err);
                drop(st);
                if let RunError::Throw(thrown) = &mut err {
                    thrown.span = Some(span);
                }
                Err(err)
            }
        }
    }
}

/// Detached body future for coroutines and async calls; owns its state so the
/// handle can outlive the creating call frame.
pub(crate) fn function_body_future(
    interp: Interp,
    def: Rc<Function>,
    scope: ScopeId,
) -> LocalBoxFuture<'static, RunResult<Value>> {
    async move { interp.run_function_body(def, scope).await }.boxed_local()
}

/// Single poll against a noop waker (eager async prefix, sync entry point).
pub(crate) fn poll_once<T>(fut: &mut LocalBoxFuture<'_, T>) -> Poll<T> {
    let waker = noop_waker();
    let mut cx = Context::from_waker(&waker);
    fut.as_mut().poll(&mut cx)
}

impl Interp {
    /// Allocates a fresh closure for a function literal or declaration.
    pub(crate) fn instantiate_function(&self, def: &Rc<Function>, scope: ScopeId, name_hint: Option<Rc<str>>) -> Value {
        let mut st = self.st();
        let private_env = st.scopes.private_env_of(scope);
        let name = def.name.clone().or(name_hint);
        let prototype_prop = if matches!(def.kind, FunctionKind::Normal) {
            let proto = st.heap.alloc_plain();
            Some(proto)
        } else {
            None
        };
        let id = st.heap.alloc(ObjectData::Function(FunctionObject {
            def: def.clone(),
            scope,
            name,
            home_object: None,
            private_env,
            prototype_prop,
            props: indexmap::IndexMap::new(),
        }));
        Value::Ref(id)
    }
}
