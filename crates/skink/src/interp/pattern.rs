//! Destructuring and binding patterns: declarations, assignments, parameters
//! and catch clauses all funnel through here.

use std::rc::Rc;

use crate::{
    ast::{Pattern, PropName},
    error::{RunError, RunResult},
    features::FeatureTag,
    heap::{ObjectData, PropKey},
    host::HostValue,
    interp::{Interp, ops},
    scope::{Binding, BindingKind, ScopeId},
    value::Value,
};

/// How a pattern consumes its value.
#[derive(Clone, Copy)]
pub(crate) enum BindMode {
    /// Fresh (or hoist-declared) bindings of this kind.
    Declare(BindingKind),
    /// Assignment to existing targets (destructuring assignment).
    Assign,
}

impl Interp {
    pub(crate) async fn bind_pattern_declare(
        &self,
        pattern: &Pattern,
        value: Value,
        env: ScopeId,
        kind: BindingKind,
    ) -> RunResult<()> {
        self.bind_pattern(pattern, value, env, BindMode::Declare(kind)).await
    }

    pub(crate) async fn bind_pattern_assign(&self, pattern: &Pattern, value: Value, env: ScopeId) -> RunResult<()> {
        self.bind_pattern(pattern, value, env, BindMode::Assign).await
    }

    pub(crate) fn bind_pattern<'a>(
        &'a self,
        pattern: &'a Pattern,
        value: Value,
        env: ScopeId,
        mode: BindMode,
    ) -> futures::future::LocalBoxFuture<'a, RunResult<()>> {
        use futures::FutureExt;
        async move {
            match pattern {
                Pattern::Ident(name, span) => match mode {
                    BindMode::Declare(kind) => {
                        self.declare_or_initialize(env, name.clone(), kind, value);
                        Ok(())
                    }
                    BindMode::Assign => self.store_ident(env, name, value, *span).await,
                },
                Pattern::Default { pattern, default } => {
                    let value = if matches!(value, Value::Undefined) {
                        self.eval_expr(default, env).await?
                    } else {
                        value
                    };
                    self.bind_pattern(pattern, value, env, mode).await
                }
                Pattern::Member(expr) => {
                    let crate::ast::ExprKind::Member { object, property, .. } = &expr.kind else {
                        return Err(RunError::type_error("invalid assignment target", Some(expr.span)));
                    };
                    let target = self.eval_expr(object, env).await?;
                    let (key, computed) = self.member_key(property, env).await?;
                    self.set_member(&target, &key, value, computed, expr.span).await
                }
                Pattern::Array { elements, rest, span } => {
                    self.check_feature(FeatureTag::Destructuring, *span)?;
                    let handle = self.get_iterator(&value, *span).await?;
                    let mut exhausted = false;
                    let mut result = Ok(());
                    'elements: {
                        for element in elements {
                            let item = if exhausted {
                                Value::Undefined
                            } else {
                                match self.iter_next(&handle, None, *span).await {
                                    Ok((item, done)) => {
                                        exhausted = done;
                                        if done { Value::Undefined } else { item }
                                    }
                                    Err(err) => {
                                        result = Err(err);
                                        break 'elements;
                                    }
                                }
                            };
                            if let Some(element) = element
                                && let Err(err) = self.bind_pattern(element, item, env, mode).await
                            {
                                result = Err(err);
                                break 'elements;
                            }
                        }
                        if let Some(rest) = rest {
                            let mut collected = Vec::new();
                            while !exhausted {
                                self.on_loop_back_edge()?;
                                match self.iter_next(&handle, None, *span).await {
                                    Ok((item, done)) => {
                                        exhausted = done;
                                        if !done {
                                            collected.push(item);
                                        }
                                    }
                                    Err(err) => {
                                        result = Err(err);
                                        break 'elements;
                                    }
                                }
                            }
                            let rest_value = {
                                let mut st = self.st();
                                Value::Ref(st.heap.alloc_array(collected))
                            };
                            if let Err(err) = self.bind_pattern(rest, rest_value, env, mode).await {
                                result = Err(err);
                            }
                        }
                    }
                    // The iterator closes when the pattern stopped early.
                    if !exhausted {
                        self.iter_close(&handle, *span).await?;
                    }
                    result
                }
                Pattern::Object { props, rest, span } => {
                    self.check_feature(FeatureTag::Destructuring, *span)?;
                    if rest.is_some() {
                        self.check_feature(FeatureTag::ObjectRestSpread, *span)?;
                    }
                    if value.is_nullish() {
                        return Err(RunError::type_error(
                            "Cannot destructure a nullish value",
                            Some(*span),
                        ));
                    }
                    let mut matched: Vec<PropKey> = Vec::with_capacity(props.len());
                    for prop in props {
                        let (key, computed) = self.prop_name_key(&prop.key, env).await?;
                        let item = self.get_member(&value, &key, computed, *span).await?;
                        matched.push(key);
                        self.bind_pattern(&prop.value, item, env, mode).await?;
                    }
                    if let Some(rest) = rest {
                        let rest_value = self.collect_unmatched(&value, &matched)?;
                        self.bind_pattern(rest, rest_value, env, mode).await?;
                    }
                    Ok(())
                }
            }
        }
        .boxed_local()
    }

    /// Declares a fresh binding, or initializes the hoist-declared one.
    ///
    /// `var` writes through to the binding hoisted into the function scope.
    pub(crate) fn declare_or_initialize(&self, env: ScopeId, name: Rc<str>, kind: BindingKind, value: Value) {
        let mut st = self.st();
        match kind {
            BindingKind::Var => {
                // The hoist pass created the slot; find and fill it.
                if let Some((scope, _)) = st.scopes.resolve(env, &name) {
                    let record = st.scopes.record_mut(scope);
                    if let Some(binding) = record.bindings.get_mut(&name)
                        && matches!(binding.kind, BindingKind::Var | BindingKind::Function | BindingKind::Param)
                    {
                        binding.initialized = true;
                        binding.slot = crate::scope::BindingSlot::Value(value);
                        return;
                    }
                }
                st.scopes.declare(env, name, Binding::initialized(BindingKind::Var, value));
            }
            _ => {
                let record = st.scopes.record_mut(env);
                if let Some(binding) = record.bindings.get_mut(&name) {
                    binding.kind = kind;
                    binding.initialized = true;
                    binding.slot = crate::scope::BindingSlot::Value(value);
                } else {
                    st.scopes.declare(env, name, Binding::initialized(kind, value));
                }
            }
        }
    }

    /// Resolves an object-pattern (or object-literal) key to a property key.
    pub(crate) async fn prop_name_key(&self, name: &PropName, env: ScopeId) -> RunResult<(PropKey, bool)> {
        match name {
            PropName::Ident(s) | PropName::Str(s) => Ok((PropKey::Str(s.clone()), false)),
            PropName::Num(n) => Ok((PropKey::str(crate::value::number_to_string(*n)), false)),
            PropName::Computed(expr) => {
                self.check_feature(FeatureTag::ComputedProperties, expr.span)?;
                let value = self.eval_expr(expr, env).await?;
                Ok((self.value_to_prop_key(&value), true))
            }
            PropName::Private(name) => Ok((PropKey::str(format!("#{name}")), false)),
        }
    }

    /// Object-rest: own enumerable keys not matched by earlier pattern
    /// properties, copied into a fresh object.
    fn collect_unmatched(&self, value: &Value, matched: &[PropKey]) -> RunResult<Value> {
        enum Plan {
            Direct(Vec<(PropKey, Value)>),
            Host(Vec<(PropKey, HostValue)>),
        }
        let plan = {
            let st = self.st();
            match value {
                Value::Ref(id) => match st.heap.get(*id) {
                    ObjectData::Plain(obj) => Plan::Direct(
                        ops::own_enumerable_data(&obj.props)
                            .into_iter()
                            .filter_map(|(k, v)| v.map(|v| (k, v)))
                            .collect(),
                    ),
                    ObjectData::Array(arr) => Plan::Direct(
                        arr.to_dense()
                            .into_iter()
                            .enumerate()
                            .map(|(i, v)| (PropKey::str(i.to_string()), v))
                            .collect(),
                    ),
                    ObjectData::BoundHost(HostValue::Object(obj)) => Plan::Host(
                        obj.keys()
                            .into_iter()
                            .map(|key| {
                                let item = obj.get(&key).unwrap_or_default();
                                (PropKey::str(key), item)
                            })
                            .collect(),
                    ),
                    _ => Plan::Direct(Vec::new()),
                },
                _ => Plan::Direct(Vec::new()),
            }
        };
        let mut st = self.st();
        let st = &mut *st;
        let entries: Vec<(PropKey, Value)> = match plan {
            Plan::Direct(entries) => entries,
            Plan::Host(items) => items
                .into_iter()
                .map(|(key, item)| {
                    let converted = crate::bridge::host_to_value(&mut st.heap, &item);
                    (key, converted)
                })
                .collect(),
        };
        let id = st.heap.alloc_plain();
        if let ObjectData::Plain(obj) = st.heap.get_mut(id) {
            for (key, item) in entries {
                if !matched.contains(&key) {
                    obj.props.insert(key, crate::heap::Property::data(item));
                }
            }
        }
        Ok(Value::Ref(id))
    }
}

/// Collects the names a pattern binds (hoisting support).
pub(crate) fn pattern_names(pattern: &Pattern, out: &mut Vec<Rc<str>>) {
    match pattern {
        Pattern::Ident(name, _) => out.push(name.clone()),
        Pattern::Array { elements, rest, .. } => {
            for element in elements.iter().flatten() {
                pattern_names(element, out);
            }
            if let Some(rest) = rest {
                pattern_names(rest, out);
            }
        }
        Pattern::Object { props, rest, .. } => {
            for prop in props {
                pattern_names(&prop.value, out);
            }
            if let Some(rest) = rest {
                pattern_names(rest, out);
            }
        }
        Pattern::Default { pattern, .. } => pattern_names(pattern, out),
        Pattern::Member(_) => {}
    }
}
