//! Expression evaluation.
//!
//! Optional chains evaluate through [`ChainEval`], which distinguishes a
//! short-circuited chain from a produced value and keeps the receiver of the
//! last member access available for method calls. The feature gate runs at
//! node entry, before any sub-expression can produce a side effect.

use std::rc::Rc;

use futures::{FutureExt, future::LocalBoxFuture};

use crate::{
    ast::{Arg, AssignOp, BinaryOp, Expr, ExprKind, LogicalOp, MemberProp, ObjectProp, Pattern, Span, TemplateLiteral, UnaryOp, UpdateOp},
    bridge,
    error::{RunError, RunResult},
    features::{FeatureTag, expr_feature},
    heap::{ObjectData, PropKey, Property, PropValue, RegexObject},
    interp::{
        Interp,
        coroutine::{CoroutineChannel, ResumeMode, YieldPoint, resume_to_result},
        ops,
    },
    scope::{ScopeId, ThisState},
    value::Value,
};

/// Result of evaluating one optional-chain segment.
enum ChainEval {
    /// `?.` hit null/undefined: the whole chain yields undefined and the
    /// remaining segments are skipped.
    Short,
    Value(Value),
    /// Member access: the produced value plus its receiver, so a following
    /// call binds `this` correctly.
    Member { value: Value, this: Value },
}

impl ChainEval {
    fn value(self) -> Value {
        match self {
            Self::Short => Value::Undefined,
            Self::Value(value) | Self::Member { value, .. } => value,
        }
    }
}

impl Interp {
    pub(crate) fn eval_expr<'a>(&'a self, expr: &'a Expr, env: ScopeId) -> LocalBoxFuture<'a, RunResult<Value>> {
        async move {
            if let Some(tag) = expr_feature(&expr.kind) {
                self.check_feature(tag, expr.span)?;
            }
            match &expr.kind {
                ExprKind::Null => Ok(Value::Null),
                ExprKind::Bool(b) => Ok(Value::Bool(*b)),
                ExprKind::Num(n) => Ok(Value::Num(*n)),
                ExprKind::BigInt(n) => Ok(Value::BigNum(Rc::new(n.clone()))),
                ExprKind::Str(s) => Ok(Value::Str(s.clone())),
                ExprKind::Ident(name) => self.load_ident(env, name, expr.span).await,
                ExprKind::This => self.eval_this(env, expr.span),
                ExprKind::Template(template) => self.eval_template(template, env).await,
                ExprKind::TaggedTemplate { tag, quasi } => self.eval_tagged_template(tag, quasi, env, expr.span).await,
                ExprKind::Regex { pattern, flags } => self.eval_regex(pattern, flags, expr.span),
                ExprKind::Array(elements) => self.eval_array_literal(elements, env, expr.span).await,
                ExprKind::Object(props) => self.eval_object_literal(props, env, expr.span).await,
                ExprKind::Function(def) => Ok(self.instantiate_function(def, env, None)),
                ExprKind::Class(def) => self.eval_class(def, env, expr.span).await,
                ExprKind::Member { .. } | ExprKind::Call { .. } | ExprKind::SuperMember { .. } => {
                    Ok(self.eval_chain(expr, env).await?.value())
                }
                ExprKind::SuperCall(args) => self.eval_super_call(args, env, expr.span).await,
                ExprKind::New { callee, args } => {
                    let ctor = self.eval_expr(callee, env).await?;
                    let args = self.eval_args(args, env).await?;
                    self.construct_value(ctor, args, expr.span).await
                }
                ExprKind::Unary { op, expr: inner } => self.eval_unary(*op, inner, env, expr.span).await,
                ExprKind::Update { op, prefix, target } => self.eval_update(*op, *prefix, target, env, expr.span).await,
                ExprKind::Binary { op, left, right } => match op {
                    BinaryOp::In => {
                        let key_value = self.eval_expr(left, env).await?;
                        let object = self.eval_expr(right, env).await?;
                        let key = self.value_to_prop_key(&key_value);
                        self.has_property(&object, &key, expr.span).map(Value::Bool)
                    }
                    BinaryOp::InstanceOf => {
                        let value = self.eval_expr(left, env).await?;
                        let ctor = self.eval_expr(right, env).await?;
                        self.instance_of(&value, &ctor, expr.span).map(Value::Bool)
                    }
                    _ => {
                        let left = self.eval_expr(left, env).await?;
                        let right = self.eval_expr(right, env).await?;
                        self.binary_op(*op, &left, &right, expr.span)
                    }
                },
                ExprKind::Logical { op, left, right } => {
                    let left_value = self.eval_expr(left, env).await?;
                    let take_right = match op {
                        LogicalOp::And => left_value.truthy(),
                        LogicalOp::Or => !left_value.truthy(),
                        LogicalOp::Nullish => left_value.is_nullish(),
                    };
                    if take_right {
                        self.eval_expr(right, env).await
                    } else {
                        Ok(left_value)
                    }
                }
                ExprKind::Conditional {
                    test,
                    consequent,
                    alternate,
                } => {
                    let test = self.eval_expr(test, env).await?;
                    if test.truthy() {
                        self.eval_expr(consequent, env).await
                    } else {
                        self.eval_expr(alternate, env).await
                    }
                }
                ExprKind::Assign { op, target, value } => self.eval_assign(*op, target, value, env, expr.span).await,
                ExprKind::Sequence(exprs) => {
                    let mut last = Value::Undefined;
                    for item in exprs {
                        last = self.eval_expr(item, env).await?;
                    }
                    Ok(last)
                }
                ExprKind::Yield { arg, delegate } => self.eval_yield(arg.as_deref(), *delegate, env, expr.span).await,
                ExprKind::Await(inner) => {
                    let value = self.eval_expr(inner, env).await?;
                    self.await_value(value, expr.span).await
                }
                ExprKind::DynamicImport(specifier) => {
                    self.require_async("'import()'", expr.span)?;
                    let spec = self.eval_expr(specifier, env).await?;
                    let spec = {
                        let st = self.st();
                        ops::to_string_simple(&st.heap, &spec)
                    };
                    let namespace = self.load_module_for_import(&spec, None, expr.span).await?;
                    let mut st = self.st();
                    Ok(Value::Ref(st.heap.alloc(ObjectData::Promise(crate::heap::PromiseObject {
                        state: crate::heap::PromiseState::Fulfilled(namespace),
                    }))))
                }
                ExprKind::PrivateIn { name, object } => {
                    let object = self.eval_expr(object, env).await?;
                    let brand = self.private_brand(env, name, expr.span)?;
                    Ok(Value::Bool(self.has_brand(&object, brand)))
                }
            }
        }
        .boxed_local()
    }

    // --- chains ---

    fn eval_chain<'a>(&'a self, expr: &'a Expr, env: ScopeId) -> LocalBoxFuture<'a, RunResult<ChainEval>> {
        async move {
            match &expr.kind {
                ExprKind::Member { object, property, optional } => {
                    if *optional {
                        self.check_feature(FeatureTag::OptionalChaining, expr.span)?;
                    }
                    let base = self.eval_chain(object, env).await?;
                    if matches!(base, ChainEval::Short) {
                        return Ok(ChainEval::Short);
                    }
                    let this = base.value();
                    if *optional && this.is_nullish() {
                        return Ok(ChainEval::Short);
                    }
                    let value = match property {
                        MemberProp::Private(name) => self.private_get(&this, name, env, expr.span).await?,
                        _ => {
                            let (key, computed) = self.member_key(property, env).await?;
                            self.get_member(&this, &key, computed, expr.span).await?
                        }
                    };
                    Ok(ChainEval::Member { value, this })
                }
                ExprKind::SuperMember { property } => {
                    let (method, this) = self.eval_super_member(property, env, expr.span).await?;
                    Ok(ChainEval::Member { value: method, this })
                }
                ExprKind::Call { callee, args, optional } => {
                    if *optional {
                        self.check_feature(FeatureTag::OptionalChaining, expr.span)?;
                    }
                    let target = self.eval_chain(callee, env).await?;
                    if matches!(target, ChainEval::Short) {
                        return Ok(ChainEval::Short);
                    }
                    let (func, this) = match target {
                        ChainEval::Member { value, this } => (value, this),
                        other => (other.value(), Value::Undefined),
                    };
                    if *optional && func.is_nullish() {
                        return Ok(ChainEval::Short);
                    }
                    let args = self.eval_args(args, env).await?;
                    let value = self.call_value(func, this, args, expr.span).await?;
                    Ok(ChainEval::Value(value))
                }
                _ => Ok(ChainEval::Value(self.eval_expr(expr, env).await?)),
            }
        }
        .boxed_local()
    }

    pub(crate) async fn member_key(&self, property: &MemberProp, env: ScopeId) -> RunResult<(PropKey, bool)> {
        match property {
            MemberProp::Ident(name) => Ok((PropKey::Str(name.clone()), false)),
            MemberProp::Private(name) => Ok((PropKey::str(format!("#{name}")), false)),
            MemberProp::Computed(expr) => {
                let value = self.eval_expr(expr, env).await?;
                Ok((self.value_to_prop_key(&value), true))
            }
        }
    }

    pub(crate) async fn eval_args(&self, args: &[Arg], env: ScopeId) -> RunResult<Vec<Value>> {
        let mut out = Vec::with_capacity(args.len());
        for arg in args {
            match arg {
                Arg::Item(expr) => out.push(self.eval_expr(expr, env).await?),
                Arg::Spread(expr) => {
                    self.check_feature(FeatureTag::Spread, expr.span)?;
                    let value = self.eval_expr(expr, env).await?;
                    out.extend(self.iter_collect(&value, expr.span).await?);
                }
            }
        }
        Ok(out)
    }

    // --- literals ---

    async fn eval_template(&self, template: &TemplateLiteral, env: ScopeId) -> RunResult<Value> {
        let mut out = String::new();
        for (index, quasi) in template.quasis.iter().enumerate() {
            let Some(cooked) = &quasi.cooked else {
                return Err(RunError::raised(
                    crate::error::JsErrorKind::Generic,
                    "Invalid escape sequence in template literal",
                    None,
                ));
            };
            out.push_str(cooked);
            if let Some(expr) = template.exprs.get(index) {
                let value = self.eval_expr(expr, env).await?;
                let st = self.st();
                out.push_str(&ops::to_string_simple(&st.heap, &value));
            }
        }
        Ok(Value::str(out))
    }

    async fn eval_tagged_template(
        &self,
        tag: &Expr,
        quasi: &TemplateLiteral,
        env: ScopeId,
        span: Span,
    ) -> RunResult<Value> {
        let target = self.eval_chain(tag, env).await?;
        let (func, this) = match target {
            ChainEval::Member { value, this } => (value, this),
            other => (other.value(), Value::Undefined),
        };

        // Build the frozen strings array with its frozen `raw` twin.
        let strings = {
            let mut st = self.st();
            let cooked: Vec<Value> = quasi
                .quasis
                .iter()
                .map(|q| q.cooked.clone().map_or(Value::Undefined, Value::Str))
                .collect();
            let raw: Vec<Value> = quasi.quasis.iter().map(|q| Value::Str(q.raw.clone())).collect();
            let raw_id = st.heap.alloc_array(raw);
            bridge::freeze_object(&mut st.heap, raw_id);
            let strings_id = st.heap.alloc_array(cooked);
            if let ObjectData::Array(arr) = st.heap.get_mut(strings_id) {
                arr.raw = Some(raw_id);
            }
            bridge::freeze_object(&mut st.heap, strings_id);
            Value::Ref(strings_id)
        };
        let mut args = vec![strings];
        for expr in &quasi.exprs {
            args.push(self.eval_expr(expr, env).await?);
        }
        self.call_value(func, this, args, span).await
    }

    fn eval_regex(&self, pattern: &Rc<str>, flags: &Rc<str>, span: Span) -> RunResult<Value> {
        let mut inline_flags = String::new();
        if flags.contains('m') {
            inline_flags.push('m');
        }
        if flags.contains('s') {
            inline_flags.push('s');
        }
        let pattern_with_flags = if inline_flags.is_empty() { pattern.to_string() } else { format!("(?{inline_flags}){pattern}") };
        let mut builder = fancy_regex::RegexBuilder::new(&pattern_with_flags);
        if flags.contains('i') {
            builder.case_insensitive(true);
        }
        let compiled = builder
            .build()
            .map_err(|e| RunError::raised(crate::error::JsErrorKind::Generic, format!("Invalid regular expression: {e}"), Some(span)))?;
        let mut st = self.st();
        Ok(Value::Ref(st.heap.alloc(ObjectData::Regex(RegexObject {
            source: pattern.clone(),
            flags: flags.clone(),
            compiled,
        }))))
    }

    async fn eval_array_literal(&self, elements: &[Option<crate::ast::ArrayElement>], env: ScopeId, span: Span) -> RunResult<Value> {
        let mut items = Vec::with_capacity(elements.len());
        for element in elements {
            match element {
                None => items.push(Value::Undefined),
                Some(crate::ast::ArrayElement::Item(expr)) => items.push(self.eval_expr(expr, env).await?),
                Some(crate::ast::ArrayElement::Spread(expr)) => {
                    self.check_feature(FeatureTag::Spread, span)?;
                    let value = self.eval_expr(expr, env).await?;
                    items.extend(self.iter_collect(&value, expr.span).await?);
                }
            }
        }
        let mut st = self.st();
        Ok(Value::Ref(st.heap.alloc_array(items)))
    }

    async fn eval_object_literal(&self, props: &[ObjectProp], env: ScopeId, span: Span) -> RunResult<Value> {
        let id = {
            let mut st = self.st();
            st.heap.alloc_plain()
        };
        for prop in props {
            match prop {
                ObjectProp::KeyValue { key, value } => {
                    let (key, computed) = self.prop_name_key(key, env).await?;
                    let name_hint = key.as_str().map(Rc::from);
                    let item = match &value.kind {
                        // Function values pick up the property name.
                        ExprKind::Function(def) if def.name.is_none() => {
                            if let Some(tag) = expr_feature(&value.kind) {
                                self.check_feature(tag, value.span)?;
                            }
                            self.instantiate_function(def, env, name_hint)
                        }
                        _ => self.eval_expr(value, env).await?,
                    };
                    self.define_literal_prop(id, key, computed, Property::data(item), span)?;
                }
                ObjectProp::Shorthand(name) => {
                    self.check_feature(FeatureTag::Shorthand, span)?;
                    let value = self.load_ident(env, name, span).await?;
                    self.define_literal_prop(id, PropKey::Str(name.clone()), false, Property::data(value), span)?;
                }
                ObjectProp::Method { kind, key, func } => {
                    if !matches!(kind, crate::ast::MethodKind::Method) {
                        self.check_feature(FeatureTag::GetterSetter, span)?;
                    }
                    let (key, computed) = self.prop_name_key(key, env).await?;
                    let name_hint = key.as_str().map(Rc::from);
                    let method = self.instantiate_function(func, env, name_hint);
                    if let Value::Ref(mid) = &method {
                        let mut st = self.st();
                        if let ObjectData::Function(f) = st.heap.get_mut(*mid) {
                            f.home_object = Some(id);
                        }
                    }
                    let prop = match kind {
                        crate::ast::MethodKind::Method => Property::method(method),
                        crate::ast::MethodKind::Getter => self.merge_accessor(id, &key, Some(method), None),
                        crate::ast::MethodKind::Setter => self.merge_accessor(id, &key, None, Some(method)),
                    };
                    self.define_literal_prop(id, key, computed, prop, span)?;
                }
                ObjectProp::Spread(expr) => {
                    self.check_feature(FeatureTag::ObjectRestSpread, span)?;
                    let source = self.eval_expr(expr, env).await?;
                    self.spread_into_object(id, &source, expr.span).await?;
                }
            }
        }
        Ok(Value::Ref(id))
    }

    /// Rejects `__proto__` keys in literals (a pollution vector) and stores
    /// the property.
    fn define_literal_prop(&self, id: crate::heap::HeapId, key: PropKey, computed: bool, prop: Property, _span: Span) -> RunResult<()> {
        if let Some(name) = key.as_str()
            && (name == "__proto__" || (computed && name == "constructor"))
        {
            return Err(RunError::fatal(crate::error::Error::security(
                crate::error::codes::SECURITY_PROTO_POLLUTION,
                format!("object literal key '{name}' is not allowed"),
            )));
        }
        let mut st = self.st();
        if let ObjectData::Plain(obj) = st.heap.get_mut(id) {
            obj.props.insert(key, prop);
        }
        Ok(())
    }

    /// Pairs a getter with a previously-defined setter (or vice versa).
    fn merge_accessor(&self, id: crate::heap::HeapId, key: &PropKey, get: Option<Value>, set: Option<Value>) -> Property {
        let st = self.st();
        if let ObjectData::Plain(obj) = st.heap.get(id)
            && let Some(Property {
                value: PropValue::Accessor { get: old_get, set: old_set },
                ..
            }) = obj.props.get(key)
        {
            return Property::accessor(get.or_else(|| old_get.clone()), set.or_else(|| old_set.clone()));
        }
        Property::accessor(get, set)
    }

    /// Copies own enumerable properties of `source` into the object literal.
    async fn spread_into_object(&self, id: crate::heap::HeapId, source: &Value, span: Span) -> RunResult<()> {
        if source.is_nullish() {
            return Ok(());
        }
        enum Plan {
            Direct(Vec<(PropKey, Option<Value>)>),
            Host(Vec<(PropKey, crate::host::HostValue)>),
        }
        let plan = {
            let st = self.st();
            match source {
                Value::Str(s) => Plan::Direct(
                    s.chars()
                        .enumerate()
                        .map(|(i, c)| (PropKey::str(i.to_string()), Some(Value::str(c.to_string()))))
                        .collect(),
                ),
                Value::Ref(rid) => match st.heap.get(*rid) {
                    ObjectData::Plain(obj) => Plan::Direct(ops::own_enumerable_data(&obj.props)),
                    ObjectData::Array(arr) => Plan::Direct(
                        arr.to_dense()
                            .into_iter()
                            .enumerate()
                            .map(|(i, v)| (PropKey::str(i.to_string()), Some(v)))
                            .collect(),
                    ),
                    ObjectData::BoundHost(crate::host::HostValue::Object(obj)) => Plan::Host(
                        obj.keys()
                            .into_iter()
                            .map(|key| {
                                let item = obj.get(&key).unwrap_or_default();
                                (PropKey::str(key), item)
                            })
                            .collect(),
                    ),
                    ObjectData::BoundHost(crate::host::HostValue::Array(arr)) => Plan::Host(
                        arr.to_vec()
                            .into_iter()
                            .enumerate()
                            .map(|(i, item)| (PropKey::str(i.to_string()), item))
                            .collect(),
                    ),
                    _ => Plan::Direct(Vec::new()),
                },
                _ => Plan::Direct(Vec::new()),
            }
        };
        let entries: Vec<(PropKey, Option<Value>)> = match plan {
            Plan::Direct(entries) => entries,
            Plan::Host(items) => {
                let mut st = self.st();
                items
                    .into_iter()
                    .map(|(key, item)| {
                        let converted = bridge::host_to_value(&mut st.heap, &item);
                        (key, Some(converted))
                    })
                    .collect()
            }
        };
        for (key, value) in entries {
            let value = match value {
                Some(v) => v,
                // Accessor on the source: read it through the getter.
                None => self.get_member(source, &key, true, span).await?,
            };
            if key.as_str() == Some("__proto__") {
                return Err(RunError::fatal(crate::error::Error::security(
                    crate::error::codes::SECURITY_PROTO_POLLUTION,
                    "spreading a '__proto__' key is not allowed",
                )));
            }
            let mut st = self.st();
            if let ObjectData::Plain(obj) = st.heap.get_mut(id) {
                obj.props.insert(key, Property::data(value));
            }
        }
        Ok(())
    }

    // --- operators with targets ---

    async fn eval_unary(&self, op: UnaryOp, inner: &Expr, env: ScopeId, span: Span) -> RunResult<Value> {
        match op {
            UnaryOp::TypeOf => {
                // `typeof missing` is "undefined", not a reference error.
                if let ExprKind::Ident(name) = &inner.kind {
                    let value = self.lookup_ident(env, name, inner.span).await?;
                    let st = self.st();
                    return Ok(Value::str(match value {
                        Some(v) => ops::type_of(&st.heap, &v),
                        None => "undefined",
                    }));
                }
                let value = self.eval_expr(inner, env).await?;
                let st = self.st();
                Ok(Value::str(ops::type_of(&st.heap, &value)))
            }
            UnaryOp::Delete => {
                if let ExprKind::Member { object, property, .. } = &inner.kind {
                    let target = self.eval_expr(object, env).await?;
                    let (key, _) = self.member_key(property, env).await?;
                    return self.delete_member(&target, &key, span).await.map(Value::Bool);
                }
                Ok(Value::Bool(true))
            }
            _ => {
                let value = self.eval_expr(inner, env).await?;
                self.unary_op(op, &value, span)
            }
        }
    }

    async fn eval_update(&self, op: UpdateOp, prefix: bool, target: &Expr, env: ScopeId, span: Span) -> RunResult<Value> {
        let old = self.eval_expr(target, env).await?;
        let (old_value, new_value) = {
            let st = self.st();
            match &old {
                Value::BigNum(n) => {
                    let one = num_bigint::BigInt::from(1);
                    let new = match op {
                        UpdateOp::Increment => &**n + one,
                        UpdateOp::Decrement => &**n - one,
                    };
                    (old.clone(), Value::BigNum(Rc::new(new)))
                }
                other => {
                    let n = ops::to_number(&st.heap, other);
                    let new = match op {
                        UpdateOp::Increment => n + 1.0,
                        UpdateOp::Decrement => n - 1.0,
                    };
                    (Value::Num(n), Value::Num(new))
                }
            }
        };
        self.write_target(target, new_value.clone(), env, span).await?;
        Ok(if prefix { new_value } else { old_value })
    }

    async fn write_target(&self, target: &Expr, value: Value, env: ScopeId, span: Span) -> RunResult<()> {
        match &target.kind {
            ExprKind::Ident(name) => self.store_ident(env, name, value, span).await,
            ExprKind::Member { object, property, .. } => {
                let obj = self.eval_expr(object, env).await?;
                match property {
                    MemberProp::Private(name) => self.private_set(&obj, name, value, env, span).await,
                    _ => {
                        let (key, computed) = self.member_key(property, env).await?;
                        self.set_member(&obj, &key, value, computed, span).await
                    }
                }
            }
            _ => Err(RunError::type_error("invalid assignment target", Some(span))),
        }
    }

    async fn eval_assign(&self, op: AssignOp, target: &Pattern, value: &Expr, env: ScopeId, span: Span) -> RunResult<Value> {
        if op == AssignOp::Assign {
            // Function values adopt a simple-ident target's name.
            let result = match (&*target, &value.kind) {
                (Pattern::Ident(name, _), ExprKind::Function(def)) if def.name.is_none() => {
                    if let Some(tag) = expr_feature(&value.kind) {
                        self.check_feature(tag, value.span)?;
                    }
                    self.instantiate_function(def, env, Some(name.clone()))
                }
                _ => self.eval_expr(value, env).await?,
            };
            self.bind_pattern_assign(target, result.clone(), env).await?;
            return Ok(result);
        }

        // Logical assignment short-circuits both evaluation and the write.
        if matches!(op, AssignOp::AndAssign | AssignOp::OrAssign | AssignOp::NullishAssign) {
            let current = self.read_simple_target(target, env, span).await?;
            let proceed = match op {
                AssignOp::AndAssign => current.truthy(),
                AssignOp::OrAssign => !current.truthy(),
                AssignOp::NullishAssign => current.is_nullish(),
                _ => unreachable!(),
            };
            if !proceed {
                return Ok(current);
            }
            let result = self.eval_expr(value, env).await?;
            self.write_simple_target(target, result.clone(), env, span).await?;
            return Ok(result);
        }

        let current = self.read_simple_target(target, env, span).await?;
        let rhs = self.eval_expr(value, env).await?;
        let binary = match op {
            AssignOp::Add => BinaryOp::Add,
            AssignOp::Sub => BinaryOp::Sub,
            AssignOp::Mul => BinaryOp::Mul,
            AssignOp::Div => BinaryOp::Div,
            AssignOp::Rem => BinaryOp::Rem,
            AssignOp::Exp => BinaryOp::Exp,
            AssignOp::Shl => BinaryOp::Shl,
            AssignOp::Shr => BinaryOp::Shr,
            AssignOp::UShr => BinaryOp::UShr,
            AssignOp::BitAnd => BinaryOp::BitAnd,
            AssignOp::BitOr => BinaryOp::BitOr,
            AssignOp::BitXor => BinaryOp::BitXor,
            _ => unreachable!("handled above"),
        };
        let result = self.binary_op(binary, &current, &rhs, span)?;
        self.write_simple_target(target, result.clone(), env, span).await?;
        Ok(result)
    }

    async fn read_simple_target(&self, target: &Pattern, env: ScopeId, span: Span) -> RunResult<Value> {
        match target {
            Pattern::Ident(name, span) => self.load_ident(env, name, *span).await,
            Pattern::Member(expr) => Ok(self.eval_chain(expr, env).await?.value()),
            _ => Err(RunError::type_error("invalid compound assignment target", Some(span))),
        }
    }

    async fn write_simple_target(&self, target: &Pattern, value: Value, env: ScopeId, span: Span) -> RunResult<()> {
        match target {
            Pattern::Ident(name, span) => self.store_ident(env, name, value, *span).await,
            Pattern::Member(expr) => self.write_target(expr, value, env, span).await,
            _ => Err(RunError::type_error("invalid compound assignment target", Some(span))),
        }
    }

    // --- this / super ---

    fn eval_this(&self, env: ScopeId, span: Span) -> RunResult<Value> {
        let st = self.st();
        match st.scopes.this_of(env) {
            ThisState::Bound(value) => Ok(value),
            ThisState::NotBound => Ok(Value::Undefined),
            ThisState::Uninitialized => Err(RunError::reference_error(
                "Must call super constructor before accessing 'this'",
                Some(span),
            )),
        }
    }

    async fn eval_super_member(&self, property: &MemberProp, env: ScopeId, span: Span) -> RunResult<(Value, Value)> {
        let (home_proto, this) = {
            let st = self.st();
            let Some(home) = st.scopes.home_object_of(env) else {
                return Err(RunError::type_error("'super' is only valid inside methods", Some(span)));
            };
            let proto = match st.heap.get(home) {
                ObjectData::Plain(obj) => obj.proto,
                ObjectData::Class(class) => class.parent,
                _ => None,
            };
            let this = match st.scopes.this_of(env) {
                ThisState::Bound(value) => value,
                _ => Value::Undefined,
            };
            (proto, this)
        };
        let Some(home_proto) = home_proto else {
            return Ok((Value::Undefined, this));
        };
        let (key, computed) = self.member_key(property, env).await?;
        let value = self.get_member(&Value::Ref(home_proto), &key, computed, span).await?;
        Ok((value, this))
    }

    // --- yield ---

    async fn eval_yield(&self, arg: Option<&Expr>, delegate: bool, env: ScopeId, span: Span) -> RunResult<Value> {
        let channel = {
            let st = self.st();
            st.scopes.channel_of(env)
        };
        let Some(channel) = channel else {
            return Err(RunError::raised(
                crate::error::JsErrorKind::Generic,
                "'yield' outside of a generator",
                Some(span),
            ));
        };
        if delegate {
            let arg = arg.expect("parser requires an operand for yield*");
            let iterable = self.eval_expr(arg, env).await?;
            return self.yield_delegate(iterable, channel, env, span).await;
        }
        let value = match arg {
            Some(expr) => self.eval_expr(expr, env).await?,
            None => Value::Undefined,
        };
        let mode = YieldPoint::new(channel, value).await;
        self.check_interrupt()?;
        resume_to_result(mode)
    }

    /// `yield*`: forwards next/throw/return between the outer driver and the
    /// delegated iterator; its final value becomes the expression value.
    async fn yield_delegate(
        &self,
        iterable: Value,
        channel: Rc<CoroutineChannel>,
        _env: ScopeId,
        span: Span,
    ) -> RunResult<Value> {
        let handle = self.get_iterator(&iterable, span).await?;
        let mut instruction = ResumeMode::Next(Value::Undefined);
        loop {
            self.on_loop_back_edge()?;
            let (value, done) = match instruction {
                ResumeMode::Next(v) => self.iter_next(&handle, Some(v), span).await?,
                ResumeMode::Throw(e) => {
                    let throw_method = self.get_member(&handle.iterator, &PropKey::str("throw"), false, span).await;
                    match throw_method {
                        Ok(method) if !method.is_nullish() => {
                            let result = self.call_value(method, handle.iterator.clone(), vec![e], span).await?;
                            self.unpack_iter_result(&result, span).await?
                        }
                        _ => {
                            self.iter_close(&handle, span).await?;
                            return Err(RunError::throw(e, Some(span)));
                        }
                    }
                }
                ResumeMode::Return(v) => {
                    let return_method = self.get_member(&handle.iterator, &PropKey::str("return"), false, span).await;
                    match return_method {
                        Ok(method) if !method.is_nullish() => {
                            let result = self.call_value(method, handle.iterator.clone(), vec![v], span).await?;
                            let (value, done) = self.unpack_iter_result(&result, span).await?;
                            if done {
                                return Err(RunError::ForcedReturn(value));
                            }
                            (value, done)
                        }
                        _ => return Err(RunError::ForcedReturn(v)),
                    }
                }
            };
            if done {
                return Ok(value);
            }
            let mode = YieldPoint::new(channel.clone(), value).await;
            self.check_interrupt()?;
            instruction = mode;
        }
    }
}
