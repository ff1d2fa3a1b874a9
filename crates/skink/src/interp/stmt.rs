//! Statement evaluation: completion records, hoisting, loops with labels,
//! try/catch/finally, switch, and the program driver.

use std::rc::Rc;

use futures::{FutureExt, future::LocalBoxFuture};

use crate::{
    ast::{
        CatchClause, DeclKind, Declarator, ExportDecl, Expr, ExprKind, ForInit, ForTarget, Pattern, Program, Stmt,
        StmtKind, SwitchCase,
    },
    error::{RunError, RunResult},
    features::stmt_feature,
    heap::{ObjectData, PropKey},
    interp::{Completion, Interp, pattern::pattern_names},
    scope::{Binding, BindingKind, ScopeId, ScopeKind},
    value::Value,
};

impl Interp {
    /// Runs a whole program body and yields its completion value (the value
    /// of the last evaluated expression statement).
    pub(crate) async fn run_program(&self, program: &Program, env: ScopeId) -> RunResult<Value> {
        for (tag, span) in &program.lexical_features {
            self.check_feature(*tag, *span)?;
        }
        self.hoist_declarations(&program.body, env)?;
        match self.eval_stmts(&program.body, env).await? {
            Completion::Normal(value) => Ok(value.unwrap_or(Value::Undefined)),
            Completion::Return(value) => Ok(value),
            Completion::Break(_) | Completion::Continue(_) => Err(RunError::raised(
                crate::error::JsErrorKind::Generic,
                "Illegal break/continue at top level",
                None,
            )),
        }
    }

    /// Sequential statement evaluation with completion-value threading.
    pub(crate) async fn eval_stmts(&self, stmts: &[Stmt], env: ScopeId) -> RunResult<Completion> {
        let mut last = None;
        for stmt in stmts {
            match self.eval_stmt(stmt, env).await? {
                Completion::Normal(Some(value)) => last = Some(value),
                Completion::Normal(None) => {}
                abrupt => return Ok(abrupt),
            }
        }
        Ok(Completion::Normal(last))
    }

    pub(crate) fn eval_stmt<'a>(&'a self, stmt: &'a Stmt, env: ScopeId) -> LocalBoxFuture<'a, RunResult<Completion>> {
        self.eval_stmt_labeled(stmt, env, None)
    }

    fn eval_stmt_labeled<'a>(
        &'a self,
        stmt: &'a Stmt,
        env: ScopeId,
        label: Option<Rc<str>>,
    ) -> LocalBoxFuture<'a, RunResult<Completion>> {
        async move {
            self.on_statement().map_err(|err| self.with_span(err, stmt.span))?;
            if let Some(tag) = stmt_feature(&stmt.kind) {
                self.check_feature(tag, stmt.span)?;
            }
            match &stmt.kind {
                StmtKind::Empty | StmtKind::Debugger | StmtKind::FunctionDecl(_) => Ok(Completion::Normal(None)),
                StmtKind::Expr(expr) => {
                    let value = self.eval_expr(expr, env).await?;
                    Ok(Completion::Normal(Some(value)))
                }
                StmtKind::VarDecl { kind, declarators } => {
                    self.eval_var_decl(*kind, declarators, env).await?;
                    Ok(Completion::Normal(None))
                }
                StmtKind::ClassDecl(def) => {
                    let value = self.eval_class(def, env, stmt.span).await?;
                    let name = def.name.clone().expect("class declarations are named");
                    self.declare_or_initialize(env, name, BindingKind::Class, value);
                    Ok(Completion::Normal(None))
                }
                StmtKind::Block(stmts) => {
                    let scope = self.push_scope(env, ScopeKind::Block);
                    self.hoist_block(stmts, scope)?;
                    self.eval_stmts(stmts, scope).await
                }
                StmtKind::If {
                    test,
                    consequent,
                    alternate,
                } => {
                    let test = self.eval_expr(test, env).await?;
                    if test.truthy() {
                        self.eval_stmt(consequent, env).await
                    } else if let Some(alternate) = alternate {
                        self.eval_stmt(alternate, env).await
                    } else {
                        Ok(Completion::Normal(None))
                    }
                }
                StmtKind::While { test, body } => self.eval_while(test, body, env, label, false).await,
                StmtKind::DoWhile { body, test } => self.eval_while(test, body, env, label, true).await,
                StmtKind::For {
                    init,
                    test,
                    update,
                    body,
                } => self.eval_for(init.as_deref(), test.as_ref(), update.as_ref(), body, env, label).await,
                StmtKind::ForIn { target, object, body } => {
                    self.eval_for_in(target, object, body, env, label).await
                }
                StmtKind::ForOf {
                    target,
                    iterable,
                    body,
                    is_await,
                } => self.eval_for_of(target, iterable, body, env, label, *is_await).await,
                StmtKind::Break(target) => Ok(Completion::Break(target.clone())),
                StmtKind::Continue(target) => Ok(Completion::Continue(target.clone())),
                StmtKind::Return(arg) => {
                    let value = match arg {
                        Some(expr) => self.eval_expr(expr, env).await?,
                        None => Value::Undefined,
                    };
                    Ok(Completion::Return(value))
                }
                StmtKind::Throw(expr) => {
                    let value = self.eval_expr(expr, env).await?;
                    Err(RunError::throw(value, Some(stmt.span)))
                }
                StmtKind::Try {
                    block,
                    handler,
                    finalizer,
                } => self.eval_try(block, handler.as_ref(), finalizer.as_deref(), env).await,
                StmtKind::Switch { discriminant, cases } => self.eval_switch(discriminant, cases, env).await,
                StmtKind::Labeled { label, body } => {
                    let result = self.eval_stmt_labeled(body, env, Some(label.clone())).await?;
                    match result {
                        Completion::Break(Some(target)) if target == *label => Ok(Completion::Normal(None)),
                        other => Ok(other),
                    }
                }
                StmtKind::With { object, body } => {
                    let object = self.eval_expr(object, env).await?;
                    if !matches!(object, Value::Ref(_)) {
                        return Err(RunError::type_error("'with' requires an object", Some(stmt.span)));
                    }
                    let scope = self.push_scope(env, ScopeKind::With);
                    {
                        let mut st = self.st();
                        st.scopes.record_mut(scope).with_object = Some(object);
                    }
                    self.eval_stmt(body, scope).await
                }
                StmtKind::Import(_) => Ok(Completion::Normal(None)),
                StmtKind::Export(decl) => self.eval_export(decl, env).await,
            }
        }
        .boxed_local()
    }

    fn with_span(&self, mut err: RunError, span: crate::ast::Span) -> RunError {
        if let RunError::Throw(thrown) = &mut err
            && thrown.span.is_none()
        {
            thrown.span = Some(span);
        }
        err
    }

    pub(crate) fn push_scope(&self, parent: ScopeId, kind: ScopeKind) -> ScopeId {
        let mut st = self.st();
        st.scopes.push(Some(parent), kind)
    }

    // --- declarations & hoisting ---

    async fn eval_var_decl(&self, kind: DeclKind, declarators: &[Declarator], env: ScopeId) -> RunResult<()> {
        for declarator in declarators {
            let name_hint = match &declarator.pattern {
                Pattern::Ident(name, _) => Some(name.clone()),
                _ => None,
            };
            let value = match &declarator.init {
                Some(Expr {
                    kind: ExprKind::Function(def),
                    span,
                }) if def.name.is_none() => {
                    if let Some(tag) = crate::features::expr_feature(&ExprKind::Function(def.clone())) {
                        self.check_feature(tag, *span)?;
                    }
                    self.instantiate_function(def, env, name_hint)
                }
                Some(expr) => self.eval_expr(expr, env).await?,
                None => Value::Undefined,
            };
            let binding_kind = match kind {
                DeclKind::Var => BindingKind::Var,
                DeclKind::Let => BindingKind::Let,
                DeclKind::Const => BindingKind::Const,
            };
            self.bind_pattern_declare(&declarator.pattern, value, env, binding_kind).await?;
        }
        Ok(())
    }

    /// Function-scope hoisting: `var` names from the whole body (function
    /// declarations excluded) plus this level's lexical declarations.
    pub(crate) fn hoist_declarations(&self, stmts: &[Stmt], env: ScopeId) -> RunResult<()> {
        let mut vars = Vec::new();
        for stmt in stmts {
            collect_var_names(stmt, &mut vars);
        }
        {
            let mut st = self.st();
            for name in vars {
                if !st.scopes.record(env).bindings.contains_key(&name) {
                    st.scopes
                        .declare(env, name, Binding::initialized(BindingKind::Var, Value::Undefined));
                }
            }
        }
        self.hoist_level(stmts, env)
    }

    /// Block-scope hoisting: lexical declarations enter their TDZ, function
    /// declarations bind immediately.
    pub(crate) fn hoist_block(&self, stmts: &[Stmt], env: ScopeId) -> RunResult<()> {
        self.hoist_level(stmts, env)
    }

    fn hoist_level(&self, stmts: &[Stmt], env: ScopeId) -> RunResult<()> {
        for stmt in stmts {
            self.hoist_one(&stmt.kind, env)?;
        }
        Ok(())
    }

    fn hoist_one(&self, kind: &StmtKind, env: ScopeId) -> RunResult<()> {
        match kind {
            StmtKind::FunctionDecl(def) => {
                let value = self.instantiate_function(def, env, None);
                let name = def.name.clone().expect("function declarations are named");
                let mut st = self.st();
                st.scopes.declare(env, name, Binding::initialized(BindingKind::Function, value));
            }
            StmtKind::VarDecl {
                kind: DeclKind::Let | DeclKind::Const,
                declarators,
            } => {
                let binding_kind = if matches!(kind, StmtKind::VarDecl { kind: DeclKind::Let, .. }) {
                    BindingKind::Let
                } else {
                    BindingKind::Const
                };
                let mut names = Vec::new();
                for declarator in declarators {
                    pattern_names(&declarator.pattern, &mut names);
                }
                let mut st = self.st();
                for name in names {
                    st.scopes.declare(env, name, Binding::uninitialized(binding_kind));
                }
            }
            StmtKind::ClassDecl(def) => {
                if let Some(name) = &def.name {
                    let mut st = self.st();
                    st.scopes.declare(env, name.clone(), Binding::uninitialized(BindingKind::Class));
                }
            }
            StmtKind::Export(ExportDecl::Decl(inner)) => self.hoist_one(&inner.kind, env)?,
            StmtKind::Export(ExportDecl::Default(_)) => {
                let mut st = self.st();
                st.scopes
                    .declare(env, "*default*".into(), Binding::uninitialized(BindingKind::Let));
            }
            _ => {}
        }
        Ok(())
    }

    // --- loops ---

    fn loop_step(completion: Completion, label: Option<&Rc<str>>) -> LoopStep {
        match completion {
            Completion::Normal(_) => LoopStep::Continue,
            Completion::Continue(None) => LoopStep::Continue,
            Completion::Continue(Some(target)) if Some(&target) == label => LoopStep::Continue,
            Completion::Break(None) => LoopStep::Exit,
            Completion::Break(Some(target)) if Some(&target) == label => LoopStep::Exit,
            other => LoopStep::Propagate(other),
        }
    }

    async fn eval_while(
        &self,
        test: &Expr,
        body: &Stmt,
        env: ScopeId,
        label: Option<Rc<str>>,
        do_while: bool,
    ) -> RunResult<Completion> {
        let mut first = true;
        loop {
            if !(do_while && first) {
                let test_value = self.eval_expr(test, env).await?;
                if !test_value.truthy() {
                    return Ok(Completion::Normal(None));
                }
            }
            first = false;
            match Self::loop_step(self.eval_stmt(body, env).await?, label.as_ref()) {
                LoopStep::Continue => {}
                LoopStep::Exit => return Ok(Completion::Normal(None)),
                LoopStep::Propagate(completion) => return Ok(completion),
            }
            if do_while {
                let test_value = self.eval_expr(test, env).await?;
                if !test_value.truthy() {
                    return Ok(Completion::Normal(None));
                }
            }
            self.on_loop_back_edge()?;
        }
    }

    #[expect(clippy::too_many_arguments, reason = "loop pieces travel together")]
    async fn eval_for(
        &self,
        init: Option<&ForInit>,
        test: Option<&Expr>,
        update: Option<&Expr>,
        body: &Stmt,
        env: ScopeId,
        label: Option<Rc<str>>,
    ) -> RunResult<Completion> {
        let head = self.push_scope(env, ScopeKind::Block);
        let mut lexical_names: Vec<Rc<str>> = Vec::new();
        match init {
            Some(ForInit::Decl(kind, declarators)) => {
                if matches!(kind, DeclKind::Let | DeclKind::Const) {
                    self.check_feature(crate::features::FeatureTag::LetConst, body.span)?;
                    for declarator in declarators {
                        pattern_names(&declarator.pattern, &mut lexical_names);
                    }
                }
                self.eval_var_decl(*kind, declarators, head).await?;
            }
            Some(ForInit::Expr(expr)) => {
                self.eval_expr(expr, head).await?;
            }
            None => {}
        }

        // Per-iteration copies of `let` bindings, so closures created in the
        // body capture that iteration's values.
        let per_iteration = !lexical_names.is_empty();
        let mut iter_scope = if per_iteration {
            self.copy_iteration_scope(head, env, &lexical_names)
        } else {
            head
        };

        loop {
            if let Some(test) = test {
                let test_value = self.eval_expr(test, iter_scope).await?;
                if !test_value.truthy() {
                    return Ok(Completion::Normal(None));
                }
            }
            match Self::loop_step(self.eval_stmt(body, iter_scope).await?, label.as_ref()) {
                LoopStep::Continue => {}
                LoopStep::Exit => return Ok(Completion::Normal(None)),
                LoopStep::Propagate(completion) => return Ok(completion),
            }
            if per_iteration {
                iter_scope = self.copy_iteration_scope(iter_scope, env, &lexical_names);
            }
            if let Some(update) = update {
                self.eval_expr(update, iter_scope).await?;
            }
            self.on_loop_back_edge()?;
        }
    }

    /// Fresh scope holding copies of the loop's lexical bindings.
    fn copy_iteration_scope(&self, from: ScopeId, parent: ScopeId, names: &[Rc<str>]) -> ScopeId {
        let mut st = self.st();
        let scope = st.scopes.push(Some(parent), ScopeKind::Block);
        for name in names {
            if let Some((_, binding)) = st.scopes.resolve(from, name) {
                let binding = Binding {
                    kind: BindingKind::Let,
                    initialized: binding.initialized,
                    slot: binding.slot.clone(),
                };
                st.scopes.declare(scope, name.clone(), binding);
            }
        }
        scope
    }

    async fn bind_for_target(&self, target: &ForTarget, value: Value, scope: ScopeId) -> RunResult<()> {
        match target {
            ForTarget::Decl(kind, pattern) => {
                let binding_kind = match kind {
                    DeclKind::Var => BindingKind::Var,
                    DeclKind::Let => BindingKind::Let,
                    DeclKind::Const => BindingKind::Const,
                };
                self.bind_pattern_declare(pattern, value, scope, binding_kind).await
            }
            ForTarget::Assign(pattern) => self.bind_pattern_assign(pattern, value, scope).await,
        }
    }

    async fn eval_for_in(
        &self,
        target: &ForTarget,
        object: &Expr,
        body: &Stmt,
        env: ScopeId,
        label: Option<Rc<str>>,
    ) -> RunResult<Completion> {
        let object_value = self.eval_expr(object, env).await?;
        if object_value.is_nullish() {
            return Ok(Completion::Normal(None));
        }
        let keys: Vec<Rc<str>> = {
            let st = self.st();
            match &object_value {
                Value::Ref(id) => match st.heap.get(*id) {
                    ObjectData::Plain(obj) => obj
                        .props
                        .iter()
                        .filter(|(_, p)| p.enumerable)
                        .filter_map(|(k, _)| match k {
                            PropKey::Str(s) => Some(s.clone()),
                            PropKey::Sym(_) => None,
                        })
                        .collect(),
                    ObjectData::Array(arr) => (0..arr.length()).map(|i| Rc::from(i.to_string())).collect(),
                    ObjectData::BoundHost(crate::host::HostValue::Object(obj)) => {
                        obj.keys().into_iter().map(Rc::from).collect()
                    }
                    ObjectData::BoundHost(crate::host::HostValue::Array(arr)) => {
                        (0..arr.len()).map(|i| Rc::from(i.to_string())).collect()
                    }
                    _ => Vec::new(),
                },
                Value::Str(s) => (0..crate::value::utf16_len(s)).map(|i| Rc::from(i.to_string())).collect(),
                _ => Vec::new(),
            }
        };
        for key in keys {
            let scope = self.push_scope(env, ScopeKind::Block);
            self.bind_for_target(target, Value::Str(key), scope).await?;
            match Self::loop_step(self.eval_stmt(body, scope).await?, label.as_ref()) {
                LoopStep::Continue => {}
                LoopStep::Exit => return Ok(Completion::Normal(None)),
                LoopStep::Propagate(completion) => return Ok(completion),
            }
            self.on_loop_back_edge()?;
        }
        Ok(Completion::Normal(None))
    }

    #[expect(clippy::too_many_arguments, reason = "loop pieces travel together")]
    async fn eval_for_of(
        &self,
        target: &ForTarget,
        iterable: &Expr,
        body: &Stmt,
        env: ScopeId,
        label: Option<Rc<str>>,
        is_await: bool,
    ) -> RunResult<Completion> {
        if is_await {
            self.require_async("'for await..of'", body.span)?;
        }
        let iterable_value = self.eval_expr(iterable, env).await?;
        let handle = if is_await {
            self.get_async_iterator(&iterable_value, iterable.span).await?
        } else {
            self.get_iterator(&iterable_value, iterable.span).await?
        };
        loop {
            let (item, done) = self.iter_next(&handle, None, iterable.span).await?;
            if done {
                return Ok(Completion::Normal(None));
            }
            // The sync-iterator fallback of `for await` awaits each value.
            let item = if is_await { self.await_value(item, iterable.span).await? } else { item };
            let scope = self.push_scope(env, ScopeKind::Block);
            if let Err(err) = self.bind_for_target(target, item, scope).await {
                self.iter_close(&handle, iterable.span).await?;
                return Err(err);
            }
            match self.eval_stmt(body, scope).await {
                Ok(completion) => match Self::loop_step(completion, label.as_ref()) {
                    LoopStep::Continue => {}
                    LoopStep::Exit => {
                        self.iter_close(&handle, iterable.span).await?;
                        return Ok(Completion::Normal(None));
                    }
                    LoopStep::Propagate(completion) => {
                        self.iter_close(&handle, iterable.span).await?;
                        return Ok(completion);
                    }
                },
                Err(err) => {
                    self.iter_close(&handle, iterable.span).await?;
                    return Err(err);
                }
            }
            self.on_loop_back_edge()?;
        }
    }

    // --- try / switch / export ---

    async fn eval_try(
        &self,
        block: &[Stmt],
        handler: Option<&CatchClause>,
        finalizer: Option<&[Stmt]>,
        env: ScopeId,
    ) -> RunResult<Completion> {
        let mut result = {
            let scope = self.push_scope(env, ScopeKind::Block);
            match self.hoist_block(block, scope) {
                Ok(()) => self.eval_stmts(block, scope).await,
                Err(err) => Err(err),
            }
        };

        if let Err(err) = &result
            && err.is_catchable()
            && let Some(clause) = handler
        {
            let Err(RunError::Throw(thrown)) = std::mem::replace(&mut result, Ok(Completion::Normal(None))) else {
                unreachable!("catchable errors are throws");
            };
            let caught = self.thrown_to_value(*thrown);
            let scope = self.push_scope(env, ScopeKind::Block);
            result = async {
                if let Some(param) = &clause.param {
                    self.bind_pattern_declare(param, caught, scope, BindingKind::Let).await?;
                }
                self.hoist_block(&clause.body, scope)?;
                self.eval_stmts(&clause.body, scope).await
            }
            .await;
        }

        if let Some(finalizer) = finalizer {
            let scope = self.push_scope(env, ScopeKind::Block);
            let fin = match self.hoist_block(finalizer, scope) {
                Ok(()) => self.eval_stmts(finalizer, scope).await,
                Err(err) => Err(err),
            };
            match fin {
                // A normal finally preserves the try/catch outcome.
                Ok(Completion::Normal(_)) => {}
                // An abrupt finally overrides it.
                Ok(abrupt) => result = Ok(abrupt),
                Err(err) => result = Err(err),
            }
        }
        result
    }

    async fn eval_switch(&self, discriminant: &Expr, cases: &[SwitchCase], env: ScopeId) -> RunResult<Completion> {
        let value = self.eval_expr(discriminant, env).await?;
        let scope = self.push_scope(env, ScopeKind::Block);
        for case in cases {
            self.hoist_block(&case.body, scope)?;
        }

        let mut start = None;
        for (index, case) in cases.iter().enumerate() {
            if let Some(test) = &case.test {
                let test_value = self.eval_expr(test, scope).await?;
                if value.strict_eq(&test_value) {
                    start = Some(index);
                    break;
                }
            }
        }
        let start = match start {
            Some(index) => index,
            None => match cases.iter().position(|c| c.test.is_none()) {
                Some(index) => index,
                None => return Ok(Completion::Normal(None)),
            },
        };

        let mut last = None;
        for case in &cases[start..] {
            match self.eval_stmts(&case.body, scope).await? {
                Completion::Normal(value) => {
                    if value.is_some() {
                        last = value;
                    }
                }
                Completion::Break(None) => return Ok(Completion::Normal(last)),
                abrupt => return Ok(abrupt),
            }
        }
        Ok(Completion::Normal(last))
    }

    async fn eval_export(&self, decl: &ExportDecl, env: ScopeId) -> RunResult<Completion> {
        match decl {
            ExportDecl::Decl(inner) => self.eval_stmt(inner, env).await,
            ExportDecl::Default(expr) => {
                let value = match &expr.kind {
                    ExprKind::Function(def) if def.name.is_none() => {
                        self.instantiate_function(def, env, Some("default".into()))
                    }
                    _ => self.eval_expr(expr, env).await?,
                };
                self.initialize_binding(env, "*default*", value);
                Ok(Completion::Normal(None))
            }
            // Named/star re-exports are wired during linking.
            ExportDecl::Named { .. } | ExportDecl::All { .. } => Ok(Completion::Normal(None)),
        }
    }
}

enum LoopStep {
    Continue,
    Exit,
    Propagate(Completion),
}

/// Collects `var`-declared names recursively (stopping at nested functions).
fn collect_var_names(stmt: &Stmt, out: &mut Vec<Rc<str>>) {
    match &stmt.kind {
        StmtKind::VarDecl {
            kind: DeclKind::Var,
            declarators,
        } => {
            for declarator in declarators {
                pattern_names(&declarator.pattern, out);
            }
        }
        StmtKind::Block(stmts) => {
            for stmt in stmts {
                collect_var_names(stmt, out);
            }
        }
        StmtKind::If {
            consequent, alternate, ..
        } => {
            collect_var_names(consequent, out);
            if let Some(alternate) = alternate {
                collect_var_names(alternate, out);
            }
        }
        StmtKind::While { body, .. } | StmtKind::DoWhile { body, .. } | StmtKind::Labeled { body, .. } | StmtKind::With { body, .. } => {
            collect_var_names(body, out);
        }
        StmtKind::For { init, body, .. } => {
            if let Some(init) = init
                && let ForInit::Decl(DeclKind::Var, declarators) = &**init
            {
                for declarator in declarators {
                    pattern_names(&declarator.pattern, out);
                }
            }
            collect_var_names(body, out);
        }
        StmtKind::ForIn { target, body, .. } | StmtKind::ForOf { target, body, .. } => {
            if let ForTarget::Decl(DeclKind::Var, pattern) = &**target {
                pattern_names(pattern, out);
            }
            collect_var_names(body, out);
        }
        StmtKind::Try {
            block,
            handler,
            finalizer,
        } => {
            for stmt in block {
                collect_var_names(stmt, out);
            }
            if let Some(handler) = handler {
                for stmt in &handler.body {
                    collect_var_names(stmt, out);
                }
            }
            if let Some(finalizer) = finalizer {
                for stmt in finalizer {
                    collect_var_names(stmt, out);
                }
            }
        }
        StmtKind::Switch { cases, .. } => {
            for case in cases {
                for stmt in &case.body {
                    collect_var_names(stmt, out);
                }
            }
        }
        StmtKind::Export(ExportDecl::Decl(inner)) => collect_var_names(inner, out),
        _ => {}
    }
}

impl Interp {
    /// Exposed for module evaluation, which shares the statement driver but
    /// performs its own linking first.
    pub(crate) async fn eval_module_body(&self, program: &Program, scope: ScopeId) -> RunResult<()> {
        for (tag, span) in &program.lexical_features {
            self.check_feature(*tag, *span)?;
        }
        match self.eval_stmts(&program.body, scope).await? {
            Completion::Normal(_) => Ok(()),
            Completion::Return(_) | Completion::Break(_) | Completion::Continue(_) => Err(RunError::raised(
                crate::error::JsErrorKind::Generic,
                "Illegal completion at module top level",
                None,
            )),
        }
    }
}
