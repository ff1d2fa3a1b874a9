//! Class semantics: definition evaluation, construction, `super`, private
//! names with brand checks, and static initialization.
//!
//! A class evaluates to a callable-with-`new` [`ClassObject`]. Private names
//! resolve lexically through the class body's [`PrivateEnv`]; each instance
//! (and the class object itself, for statics) carries the brands of the
//! classes that constructed it, and every private access verifies the brand
//! at the access site before touching anything else.

use std::rc::Rc;

use ahash::AHashSet;
use futures::{FutureExt, future::LocalBoxFuture};
use smallvec::smallvec;

use crate::{
    ast::{Arg, ClassDef, ClassMember, ClassMemberKind, Function, PropName, Span},
    error::{Error, RunError, RunResult, codes},
    heap::{
        ClassObject, FieldKey, HeapId, InstanceField, ObjectData, PlainObject, PrivateEnv, PrivateMember, PropKey,
        Property, PropValue,
    },
    interp::{Completion, Interp, func::ClosureParts},
    scope::{ScopeId, ScopeKind, ThisState},
    value::Value,
};

/// Method names rejected on class bodies. `constructor` is absent: as the
/// class's constructor keyword it is the one legal spelling (path-sensitive).
const FORBIDDEN_METHOD_NAMES: &[&str] = &[
    "__proto__",
    "__defineGetter__",
    "__defineSetter__",
    "__lookupGetter__",
    "__lookupSetter__",
];

impl Interp {
    pub(crate) async fn eval_class(&self, def: &Rc<ClassDef>, env: ScopeId, span: Span) -> RunResult<Value> {
        // Parent resolution.
        let parent = match &def.parent {
            Some(parent_expr) => {
                let value = self.eval_expr(parent_expr, env).await?;
                let Value::Ref(id) = value else {
                    return Err(RunError::type_error("Class extends value is not a constructor", Some(span)));
                };
                {
                    let st = self.st();
                    if !matches!(st.heap.get(id), ObjectData::Class(_)) {
                        return Err(RunError::type_error(
                            "Class extends value is not a constructor",
                            Some(span),
                        ));
                    }
                }
                Some(id)
            }
            None => None,
        };

        // Class-body scope and the private-name environment.
        let (class_scope, brand, private_env, prototype) = {
            let mut st = self.st();
            let class_scope = st.scopes.push(Some(env), ScopeKind::ClassBody);
            let brand = st.heap.new_brand();
            let mut names: AHashSet<Rc<str>> = AHashSet::new();
            for member in &def.members {
                if let Some(PropName::Private(name)) = &member.key {
                    names.insert(name.clone());
                }
            }
            let private_env = Rc::new(PrivateEnv {
                parent: st.scopes.private_env_of(env),
                brand,
                names,
            });
            st.scopes.record_mut(class_scope).private_env = Some(private_env.clone());
            let parent_proto = parent.map(|p| match st.heap.get(p) {
                ObjectData::Class(parent_class) => parent_class.prototype,
                _ => unreachable!("parent checked above"),
            });
            let proto_link = parent_proto.or(Some(st.heap.object_proto));
            let prototype = st.heap.alloc(ObjectData::Plain(PlainObject::with_proto(proto_link)));
            (class_scope, brand, private_env, prototype)
        };

        let class_id = {
            let mut st = self.st();
            st.heap.alloc(ObjectData::Class(ClassObject {
                def: def.clone(),
                name: def.name.clone(),
                scope: class_scope,
                parent,
                prototype,
                brand,
                private_env: private_env.clone(),
                props: indexmap::IndexMap::new(),
                ctor: None,
                derived: parent.is_some(),
                instance_fields: Vec::new(),
                brands: smallvec![brand],
                private: ahash::AHashMap::new(),
            }))
        };

        // The class binding is visible inside its own body.
        if let Some(name) = &def.name {
            self.declare_ident(class_scope, name.clone(), crate::scope::BindingKind::Class, Value::Ref(class_id));
        }

        // Members evaluate in source order; statics (fields and blocks)
        // interleave exactly as written.
        for (index, member) in def.members.iter().enumerate() {
            self.eval_class_member(member, index, class_id, prototype, class_scope, brand).await?;
        }

        Ok(Value::Ref(class_id))
    }

    #[expect(clippy::too_many_arguments, reason = "class wiring travels together")]
    async fn eval_class_member(
        &self,
        member: &ClassMember,
        index: usize,
        class_id: HeapId,
        prototype: HeapId,
        class_scope: ScopeId,
        brand: crate::heap::BrandId,
    ) -> RunResult<()> {
        match member.kind {
            ClassMemberKind::StaticBlock => {
                self.check_feature(crate::features::FeatureTag::StaticBlocks, member.span)?;
                let block = member.block.as_ref().expect("static block has a body");
                let scope = {
                    let mut st = self.st();
                    let scope = st.scopes.push(Some(class_scope), ScopeKind::Block);
                    let record = st.scopes.record_mut(scope);
                    record.this = ThisState::Bound(Value::Ref(class_id));
                    record.home_object = Some(class_id);
                    scope
                };
                self.hoist_declarations(block, scope)?;
                match self.eval_stmts(block, scope).await? {
                    Completion::Normal(_) => Ok(()),
                    _ => Err(RunError::raised(
                        crate::error::JsErrorKind::Generic,
                        "Illegal completion in static initialization block",
                        Some(member.span),
                    )),
                }
            }
            ClassMemberKind::Field => {
                self.check_feature(crate::features::FeatureTag::ClassFields, member.span)?;
                let key = member.key.as_ref().expect("fields are keyed");
                let field_key = match key {
                    PropName::Private(name) => {
                        self.check_feature(crate::features::FeatureTag::PrivateFields, member.span)?;
                        FieldKey::Private(name.clone())
                    }
                    other => {
                        let (prop_key, _) = self.prop_name_key(other, class_scope).await?;
                        self.validate_member_name(&prop_key, member.span)?;
                        FieldKey::Prop(prop_key)
                    }
                };
                if member.is_static {
                    // Static fields initialize now, in source order.
                    let value = match &member.value {
                        Some(expr) => {
                            let scope = self.field_init_scope(class_scope, Value::Ref(class_id), class_id);
                            self.eval_expr(expr, scope).await?
                        }
                        None => Value::Undefined,
                    };
                    let mut st = self.st();
                    match field_key {
                        FieldKey::Prop(key) => {
                            if let ObjectData::Class(class) = st.heap.get_mut(class_id) {
                                class.props.insert(key, Property::data(value));
                            }
                        }
                        FieldKey::Private(name) => {
                            if let ObjectData::Class(class) = st.heap.get_mut(class_id) {
                                class.private.insert((brand, name), value);
                            }
                        }
                    }
                } else {
                    let mut st = self.st();
                    if let ObjectData::Class(class) = st.heap.get_mut(class_id) {
                        class.instance_fields.push(InstanceField {
                            key: field_key,
                            member_index: index,
                        });
                    }
                }
                Ok(())
            }
            ClassMemberKind::Method | ClassMemberKind::Getter | ClassMemberKind::Setter => {
                let key = member.key.as_ref().expect("methods are keyed");
                let func = member.func.as_ref().expect("methods have bodies");
                let home = if member.is_static { class_id } else { prototype };

                if let PropName::Private(name) = key {
                    self.check_feature(crate::features::FeatureTag::PrivateFields, member.span)?;
                    let method = self.instantiate_method(func, class_scope, home, Some(name.clone()));
                    let mut st = self.st();
                    let entry = st.private_methods.entry((brand, name.clone())).or_insert_with(PrivateMember::default);
                    match member.kind {
                        ClassMemberKind::Method => entry.method = Some(method),
                        ClassMemberKind::Getter => entry.getter = Some(method),
                        ClassMemberKind::Setter => entry.setter = Some(method),
                        _ => unreachable!(),
                    }
                    return Ok(());
                }

                // The literal `constructor` method is the real constructor.
                if !member.is_static
                    && member.kind == ClassMemberKind::Method
                    && matches!(key, PropName::Ident(name) | PropName::Str(name) if &**name == "constructor")
                {
                    let mut st = self.st();
                    if let ObjectData::Class(class) = st.heap.get_mut(class_id) {
                        class.ctor = Some(func.clone());
                    }
                    return Ok(());
                }

                let (prop_key, _) = self.prop_name_key(key, class_scope).await?;
                self.validate_member_name(&prop_key, member.span)?;
                if member.is_static && prop_key.as_str() == Some("prototype") {
                    return Err(RunError::type_error(
                        "Classes may not have a static property named 'prototype'",
                        Some(member.span),
                    ));
                }
                if !matches!(member.kind, ClassMemberKind::Method) {
                    self.check_feature(crate::features::FeatureTag::GetterSetter, member.span)?;
                }

                let name_hint = prop_key.as_str().map(Rc::from);
                let method = self.instantiate_method(func, class_scope, home, name_hint);
                let mut st = self.st();
                let table_id = if member.is_static { class_id } else { prototype };
                let existing_accessor = {
                    let props = match st.heap.get(table_id) {
                        ObjectData::Class(class) => &class.props,
                        ObjectData::Plain(obj) => &obj.props,
                        _ => unreachable!(),
                    };
                    match props.get(&prop_key) {
                        Some(Property {
                            value: PropValue::Accessor { get, set },
                            ..
                        }) => Some((get.clone(), set.clone())),
                        _ => None,
                    }
                };
                let prop = match member.kind {
                    ClassMemberKind::Method => Property::method(method),
                    ClassMemberKind::Getter => {
                        let set = existing_accessor.and_then(|(_, s)| s);
                        Property {
                            enumerable: false,
                            ..Property::accessor(Some(method), set)
                        }
                    }
                    ClassMemberKind::Setter => {
                        let get = existing_accessor.and_then(|(g, _)| g);
                        Property {
                            enumerable: false,
                            ..Property::accessor(get, Some(method))
                        }
                    }
                    _ => unreachable!(),
                };
                match st.heap.get_mut(table_id) {
                    ObjectData::Class(class) => {
                        class.props.insert(prop_key, prop);
                    }
                    ObjectData::Plain(obj) => {
                        obj.props.insert(prop_key, prop);
                    }
                    _ => unreachable!(),
                }
                Ok(())
            }
        }
    }

    fn validate_member_name(&self, key: &PropKey, span: Span) -> RunResult<()> {
        if let Some(name) = key.as_str()
            && FORBIDDEN_METHOD_NAMES.contains(&name)
        {
            return Err(RunError::fatal(
                Error::security(
                    codes::SECURITY_FORBIDDEN_PROPERTY,
                    format!("class member name '{name}' is not allowed"),
                )
                .with_span(span),
            ));
        }
        Ok(())
    }

    fn instantiate_method(&self, def: &Rc<Function>, scope: ScopeId, home: HeapId, name: Option<Rc<str>>) -> Value {
        let value = self.instantiate_function(def, scope, name);
        if let Value::Ref(id) = &value {
            let mut st = self.st();
            if let ObjectData::Function(func) = st.heap.get_mut(*id) {
                func.home_object = Some(home);
            }
        }
        value
    }

    /// Scope for one field initializer: `this` is the receiver, `super`
    /// resolves through the home object.
    fn field_init_scope(&self, class_scope: ScopeId, this: Value, home: HeapId) -> ScopeId {
        let mut st = self.st();
        let scope = st.scopes.push(Some(class_scope), ScopeKind::Block);
        let record = st.scopes.record_mut(scope);
        record.this = ThisState::Bound(this);
        record.home_object = Some(home);
        scope
    }

    // --- construction ---

    pub(crate) fn construct_value<'a>(
        &'a self,
        ctor: Value,
        args: Vec<Value>,
        span: Span,
    ) -> LocalBoxFuture<'a, RunResult<Value>> {
        async move {
            // Intrinsic constructors: `new Array(…)` / `new Object(…)` route
            // through the same native logic as a bare call.
            if let Value::Native(f) = ctor {
                return match f {
                    crate::builtins::NativeFn::ArrayCtor | crate::builtins::NativeFn::ObjectCtor => {
                        crate::builtins::call_native(self, f, Value::Undefined, args, span).await
                    }
                    crate::builtins::NativeFn::SymbolCtor => {
                        Err(RunError::type_error("Symbol is not a constructor", Some(span)))
                    }
                    other => Err(RunError::type_error(
                        format!("{} is not a constructor", other.display_name()),
                        Some(span),
                    )),
                };
            }
            let Value::Ref(id) = ctor else {
                return Err(RunError::type_error("not a constructor", Some(span)));
            };
            enum Plan {
                Class,
                Ordinary(ClosureParts, Option<HeapId>),
                Bound(Value),
                NotConstructable,
            }
            let plan = {
                let st = self.st();
                match st.heap.get(id) {
                    ObjectData::Class(_) => Plan::Class,
                    ObjectData::Function(func) => {
                        if matches!(func.def.kind, crate::ast::FunctionKind::Normal) {
                            Plan::Ordinary(
                                ClosureParts {
                                    def: func.def.clone(),
                                    scope: func.scope,
                                    name: func.name.clone(),
                                    home_object: func.home_object,
                                    private_env: func.private_env.clone(),
                                },
                                func.prototype_prop,
                            )
                        } else {
                            Plan::NotConstructable
                        }
                    }
                    ObjectData::BoundFunction(func) => Plan::Bound(func.target.clone()),
                    _ => Plan::NotConstructable,
                }
            };
            match plan {
                Plan::Class => self.construct_class(id, args, span).await,
                Plan::Bound(target) => self.construct_value(target, args, span).await,
                Plan::Ordinary(parts, prototype) => {
                    let instance = {
                        let mut st = self.st();
                        let proto = prototype.or(Some(st.heap.object_proto));
                        Value::Ref(st.heap.alloc(ObjectData::Plain(PlainObject::with_proto(proto))))
                    };
                    let result = self.call_closure(parts, instance.clone(), args, span).await?;
                    // A constructor returning an object replaces `this`.
                    Ok(match result {
                        Value::Ref(_) => result,
                        _ => instance,
                    })
                }
                Plan::NotConstructable => {
                    let desc = {
                        let st = self.st();
                        crate::bridge::describe_value(&st.heap, &Value::Ref(id))
                    };
                    Err(RunError::type_error(format!("{desc} is not a constructor"), Some(span)))
                }
            }
        }
        .boxed_local()
    }

    pub(crate) async fn construct_class(&self, class_id: HeapId, args: Vec<Value>, span: Span) -> RunResult<Value> {
        let (derived, parent, prototype, brand, ctor, class_scope, name, private_env) = {
            let st = self.st();
            let ObjectData::Class(class) = st.heap.get(class_id) else {
                return Err(RunError::type_error("not a constructor", Some(span)));
            };
            (
                class.derived,
                class.parent,
                class.prototype,
                class.brand,
                class.ctor.clone(),
                class.scope,
                class.name.clone(),
                class.private_env.clone(),
            )
        };

        if !derived {
            // Base class: allocate, brand, run fields, then the body.
            let instance = {
                let mut st = self.st();
                let id = st.heap.alloc(ObjectData::Plain(PlainObject::with_proto(Some(prototype))));
                if let ObjectData::Plain(obj) = st.heap.get_mut(id) {
                    obj.brands.push(brand);
                }
                Value::Ref(id)
            };
            self.run_instance_field_initializers(class_id, instance.clone()).await?;
            if let Some(ctor_def) = ctor {
                let result = self
                    .invoke_constructor(
                        &ctor_def,
                        class_scope,
                        prototype,
                        private_env,
                        ThisState::Bound(instance.clone()),
                        class_id,
                        args,
                        name,
                        span,
                    )
                    .await?;
                // Base constructors may return a replacement object.
                if let Value::Ref(_) = result {
                    return Ok(result);
                }
            }
            return Ok(instance);
        }

        // Derived class.
        if let Some(ctor_def) = ctor {
            let this_after = self
                .invoke_constructor_derived(
                    &ctor_def,
                    class_scope,
                    prototype,
                    private_env,
                    class_id,
                    args,
                    name,
                    span,
                )
                .await?;
            Ok(this_after)
        } else {
            // Implicit constructor: forward the arguments to the parent.
            let parent = parent.expect("derived class has a parent");
            let instance = self.construct_value(Value::Ref(parent), args, span).await?;
            if let Value::Ref(id) = &instance {
                let mut st = self.st();
                if let ObjectData::Plain(obj) = st.heap.get_mut(*id) {
                    obj.brands.push(brand);
                }
            }
            self.run_instance_field_initializers(class_id, instance.clone()).await?;
            Ok(instance)
        }
    }

    #[expect(clippy::too_many_arguments, reason = "constructor wiring travels together")]
    async fn invoke_constructor(
        &self,
        def: &Rc<Function>,
        class_scope: ScopeId,
        prototype: HeapId,
        private_env: Rc<PrivateEnv>,
        this: ThisState,
        class_id: HeapId,
        args: Vec<Value>,
        name: Option<Rc<str>>,
        span: Span,
    ) -> RunResult<Value> {
        let scope = {
            let mut st = self.st();
            let scope = st.scopes.push(Some(class_scope), ScopeKind::Function);
            let record = st.scopes.record_mut(scope);
            record.this = this;
            record.function_boundary = true;
            record.home_object = Some(prototype);
            record.private_env = Some(private_env);
            record.ctor_class = Some(class_id);
            scope
        };
        self.bind_params(def, args, scope, span).await?;
        self.enter_frame(name.or_else(|| Some("constructor".into())), span)?;
        let result = self.run_function_body(def.clone(), scope).await;
        self.exit_frame(result)
    }

    #[expect(clippy::too_many_arguments, reason = "constructor wiring travels together")]
    async fn invoke_constructor_derived(
        &self,
        def: &Rc<Function>,
        class_scope: ScopeId,
        prototype: HeapId,
        private_env: Rc<PrivateEnv>,
        class_id: HeapId,
        args: Vec<Value>,
        name: Option<Rc<str>>,
        span: Span,
    ) -> RunResult<Value> {
        let scope = {
            let mut st = self.st();
            let scope = st.scopes.push(Some(class_scope), ScopeKind::Function);
            let record = st.scopes.record_mut(scope);
            record.this = ThisState::Uninitialized;
            record.function_boundary = true;
            record.home_object = Some(prototype);
            record.private_env = Some(private_env);
            record.ctor_class = Some(class_id);
            scope
        };
        self.bind_params(def, args, scope, span).await?;
        self.enter_frame(name.or_else(|| Some("constructor".into())), span)?;
        let result = self.run_function_body(def.clone(), scope).await;
        let result = self.exit_frame(result)?;

        // Explicit object return replaces `this`; otherwise `super()` must
        // have bound it.
        if let Value::Ref(_) = result {
            return Ok(result);
        }
        if !matches!(result, Value::Undefined) {
            return Err(RunError::type_error(
                "Derived constructors may only return an object or undefined",
                Some(span),
            ));
        }
        let st = self.st();
        match &st.scopes.record(scope).this {
            ThisState::Bound(value) => Ok(value.clone()),
            _ => Err(RunError::reference_error(
                "Must call super constructor in derived class before returning",
                Some(span),
            )),
        }
    }

    /// `super(…)`: constructs the parent, binds `this`, stamps the brand and
    /// runs this class's instance field initializers on the result.
    pub(crate) async fn eval_super_call(&self, args: &[Arg], env: ScopeId, span: Span) -> RunResult<Value> {
        let (ctor_scope, class_id) = {
            let st = self.st();
            let mut scope = env;
            loop {
                let record = st.scopes.record(scope);
                if let Some(class_id) = record.ctor_class {
                    if matches!(record.this, ThisState::Bound(_)) {
                        return Err(RunError::reference_error(
                            "Super constructor may only be called once",
                            Some(span),
                        ));
                    }
                    break (scope, class_id);
                }
                match record.parent {
                    Some(parent) => scope = parent,
                    None => {
                        return Err(RunError::type_error(
                            "'super' keyword unexpected here",
                            Some(span),
                        ));
                    }
                }
            }
        };
        let (parent, brand) = {
            let st = self.st();
            let ObjectData::Class(class) = st.heap.get(class_id) else {
                unreachable!("ctor_class points at a class");
            };
            (class.parent, class.brand)
        };
        let Some(parent) = parent else {
            return Err(RunError::type_error("'super' is only valid in derived classes", Some(span)));
        };
        let args = self.eval_args(args, env).await?;
        let instance = self.construct_value(Value::Ref(parent), args, span).await?;
        if let Value::Ref(id) = &instance {
            let mut st = self.st();
            if let ObjectData::Plain(obj) = st.heap.get_mut(*id) {
                obj.brands.push(brand);
            }
        }
        {
            let mut st = self.st();
            st.scopes.record_mut(ctor_scope).this = ThisState::Bound(instance.clone());
        }
        self.run_instance_field_initializers(class_id, instance.clone()).await?;
        Ok(instance)
    }

    /// Applies instance field initializers in source order to `instance`.
    async fn run_instance_field_initializers(&self, class_id: HeapId, instance: Value) -> RunResult<()> {
        let (fields, def, class_scope, prototype, brand) = {
            let st = self.st();
            let ObjectData::Class(class) = st.heap.get(class_id) else {
                return Ok(());
            };
            (
                class.instance_fields.clone(),
                class.def.clone(),
                class.scope,
                class.prototype,
                class.brand,
            )
        };
        for field in fields {
            let member = &def.members[field.member_index];
            let value = match &member.value {
                Some(expr) => {
                    let scope = self.field_init_scope(class_scope, instance.clone(), prototype);
                    self.eval_expr(expr, scope).await?
                }
                None => Value::Undefined,
            };
            let mut st = self.st();
            match (&field.key, &instance) {
                (FieldKey::Prop(key), _) => {
                    drop(st);
                    self.set_member(&instance, key, value, false, member.span).await?;
                }
                (FieldKey::Private(name), Value::Ref(id)) => {
                    if let ObjectData::Plain(obj) = st.heap.get_mut(*id) {
                        obj.private.insert((brand, name.clone()), value);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    // --- private names ---

    pub(crate) fn private_brand(&self, env: ScopeId, name: &str, span: Span) -> RunResult<crate::heap::BrandId> {
        let st = self.st();
        let Some(private_env) = st.scopes.private_env_of(env) else {
            return Err(RunError::raised(
                crate::error::JsErrorKind::Generic,
                format!("Private name '#{name}' is not defined"),
                Some(span),
            ));
        };
        private_env.resolve(name).ok_or_else(|| {
            RunError::raised(
                crate::error::JsErrorKind::Generic,
                format!("Private name '#{name}' is not defined"),
                Some(span),
            )
        })
    }

    pub(crate) fn has_brand(&self, value: &Value, brand: crate::heap::BrandId) -> bool {
        let st = self.st();
        match value {
            Value::Ref(id) => match st.heap.get(*id) {
                ObjectData::Plain(obj) => obj.brands.contains(&brand),
                ObjectData::Class(class) => class.brands.contains(&brand),
                _ => false,
            },
            _ => false,
        }
    }

    pub(crate) async fn private_get(&self, receiver: &Value, name: &str, env: ScopeId, span: Span) -> RunResult<Value> {
        let brand = self.private_brand(env, name, span)?;
        if !self.has_brand(receiver, brand) {
            return Err(RunError::type_error(
                format!("Cannot read private member #{name} from an object whose class did not declare it"),
                Some(span),
            ));
        }
        enum Plan {
            Value(Value),
            Getter(Value),
            Fail,
        }
        let plan = {
            let st = self.st();
            let field = match receiver {
                Value::Ref(id) => match st.heap.get(*id) {
                    ObjectData::Plain(obj) => obj.private.get(&(brand, name.into())).cloned(),
                    ObjectData::Class(class) => class.private.get(&(brand, name.into())).cloned(),
                    _ => None,
                },
                _ => None,
            };
            match field {
                Some(value) => Plan::Value(value),
                None => match st.private_methods.get(&(brand, name.into())) {
                    Some(PrivateMember { method: Some(m), .. }) => Plan::Value(m.clone()),
                    Some(PrivateMember { getter: Some(g), .. }) => Plan::Getter(g.clone()),
                    _ => Plan::Fail,
                },
            }
        };
        match plan {
            Plan::Value(value) => Ok(value),
            Plan::Getter(getter) => self.call_value(getter, receiver.clone(), Vec::new(), span).await,
            Plan::Fail => Err(RunError::type_error(
                format!("Private member #{name} is not readable"),
                Some(span),
            )),
        }
    }

    pub(crate) async fn private_set(
        &self,
        receiver: &Value,
        name: &str,
        value: Value,
        env: ScopeId,
        span: Span,
    ) -> RunResult<()> {
        let brand = self.private_brand(env, name, span)?;
        if !self.has_brand(receiver, brand) {
            return Err(RunError::type_error(
                format!("Cannot write private member #{name} to an object whose class did not declare it"),
                Some(span),
            ));
        }
        enum Plan {
            Stored,
            Setter(Value),
            Fail(&'static str),
        }
        let plan = {
            let mut st = self.st();
            let st = &mut *st;
            let stored = match receiver {
                Value::Ref(id) => match st.heap.get_mut(*id) {
                    ObjectData::Plain(obj) => {
                        if obj.private.contains_key(&(brand, name.into())) {
                            obj.private.insert((brand, name.into()), value.clone());
                            true
                        } else {
                            false
                        }
                    }
                    ObjectData::Class(class) => {
                        if class.private.contains_key(&(brand, name.into())) {
                            class.private.insert((brand, name.into()), value.clone());
                            true
                        } else {
                            false
                        }
                    }
                    _ => false,
                },
                _ => false,
            };
            if stored {
                Plan::Stored
            } else {
                match st.private_methods.get(&(brand, name.into())) {
                    Some(PrivateMember { setter: Some(s), .. }) => Plan::Setter(s.clone()),
                    Some(PrivateMember { method: Some(_), .. }) => Plan::Fail("Private method is not writable"),
                    _ => Plan::Fail("Private field must be declared in an enclosing class"),
                }
            }
        };
        match plan {
            Plan::Stored => Ok(()),
            Plan::Setter(setter) => self.call_value(setter, receiver.clone(), vec![value], span).await.map(|_| ()),
            Plan::Fail(message) => Err(RunError::type_error(message, Some(span))),
        }
    }
}
