//! Lexical environment chains.
//!
//! Environment records live in a central arena addressed by [`ScopeId`], the
//! same index-over-pointer design the heap uses, so closures and modules can
//! hold onto environments without lifetime ties. Each record maps names to
//! [`Binding`]s; lookup walks parent links until the chain terminates.
//!
//! TDZ: `let` / `const` / `class` / `import` bindings are declared
//! uninitialized when their scope is entered and flip to initialized when the
//! declaration executes; access in between is a reference error. `var` and
//! function declarations hoist to the nearest function or module scope and
//! are pre-initialized.

use std::rc::Rc;

use ahash::AHashMap;

use crate::{heap::HeapId, value::Value};

/// Index of an environment record in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ScopeId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScopeKind {
    /// Engine globals and the per-run overlay.
    Global,
    Module,
    Function,
    Block,
    ClassBody,
    /// `with (obj)` shadow scope; lookup consults the object first.
    With,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BindingKind {
    Var,
    Let,
    Const,
    Function,
    Class,
    Param,
    Import,
}

impl BindingKind {
    /// Bindings subject to the temporal dead zone.
    pub(crate) fn has_tdz(self) -> bool {
        matches!(self, Self::Let | Self::Const | Self::Class | Self::Import)
    }
}

/// Storage slot of a binding: a direct value, or a live indirection into
/// another module's environment (import/re-export bindings).
#[derive(Debug, Clone)]
pub(crate) enum BindingSlot {
    Value(Value),
    Indirect { scope: ScopeId, name: Rc<str> },
}

#[derive(Debug, Clone)]
pub(crate) struct Binding {
    pub kind: BindingKind,
    pub initialized: bool,
    pub slot: BindingSlot,
}

impl Binding {
    pub(crate) fn initialized(kind: BindingKind, value: Value) -> Self {
        Self {
            kind,
            initialized: true,
            slot: BindingSlot::Value(value),
        }
    }

    pub(crate) fn uninitialized(kind: BindingKind) -> Self {
        Self {
            kind,
            initialized: false,
            slot: BindingSlot::Value(Value::Undefined),
        }
    }
}

/// `this` state of a function activation.
#[derive(Debug, Clone)]
pub(crate) enum ThisState {
    /// Record does not bind `this`; lookup continues outward (blocks, arrows).
    NotBound,
    /// Derived constructor before `super()` has returned.
    Uninitialized,
    Bound(Value),
}

#[derive(Debug)]
pub(crate) struct ScopeRecord {
    pub parent: Option<ScopeId>,
    pub kind: ScopeKind,
    pub bindings: AHashMap<Rc<str>, Binding>,
    pub this: ThisState,
    /// Method home object, consulted by `super` member lookup.
    pub home_object: Option<HeapId>,
    /// Shadow object of a `with` scope.
    pub with_object: Option<Value>,
    /// True on non-arrow function activations; `yield` resolution stops here.
    pub function_boundary: bool,
    /// Resume cell of the generator activation this record belongs to.
    pub channel: Option<Rc<crate::interp::coroutine::CoroutineChannel>>,
    /// Private-name environment of the enclosing class body.
    pub private_env: Option<Rc<crate::heap::PrivateEnv>>,
    /// Set on constructor activations; `super(…)` resolves through it.
    pub ctor_class: Option<HeapId>,
}

/// Arena of environment records.
#[derive(Debug, Default)]
pub(crate) struct Scopes {
    records: Vec<ScopeRecord>,
}

impl Scopes {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, parent: Option<ScopeId>, kind: ScopeKind) -> ScopeId {
        let id = ScopeId(self.records.len() as u32);
        self.records.push(ScopeRecord {
            parent,
            kind,
            bindings: AHashMap::new(),
            this: ThisState::NotBound,
            home_object: None,
            with_object: None,
            function_boundary: false,
            channel: None,
            private_env: None,
            ctor_class: None,
        });
        id
    }

    pub(crate) fn record(&self, id: ScopeId) -> &ScopeRecord {
        &self.records[id.0 as usize]
    }

    pub(crate) fn record_mut(&mut self, id: ScopeId) -> &mut ScopeRecord {
        &mut self.records[id.0 as usize]
    }

    /// Declares (or redeclares) a binding in `scope`.
    pub(crate) fn declare(&mut self, scope: ScopeId, name: Rc<str>, binding: Binding) {
        self.record_mut(scope).bindings.insert(name, binding);
    }

    /// Finds the scope that holds `name`, walking parent links.
    ///
    /// `with` shadow objects are handled by the evaluator (they need heap
    /// access); this walk only consults declared bindings.
    pub(crate) fn resolve(&self, mut scope: ScopeId, name: &str) -> Option<(ScopeId, &Binding)> {
        loop {
            let record = self.record(scope);
            if let Some(binding) = record.bindings.get(name) {
                return Some((scope, binding));
            }
            scope = record.parent?;
        }
    }

    /// Nearest bound `this`, walking outward past records that don't bind it.
    pub(crate) fn this_of(&self, mut scope: ScopeId) -> ThisState {
        loop {
            let record = self.record(scope);
            match &record.this {
                ThisState::NotBound => {}
                bound => return bound.clone(),
            }
            match record.parent {
                Some(parent) => scope = parent,
                None => return ThisState::NotBound,
            }
        }
    }

    /// Rebinds `this` on the nearest record that binds it (used when a
    /// derived constructor's `super()` completes).
    pub(crate) fn bind_this(&mut self, mut scope: ScopeId, value: Value) {
        loop {
            let record = self.record_mut(scope);
            match record.this {
                ThisState::NotBound => match record.parent {
                    Some(parent) => scope = parent,
                    None => return,
                },
                _ => {
                    record.this = ThisState::Bound(value);
                    return;
                }
            }
        }
    }

    /// Nearest method home object, for `super` lookup.
    pub(crate) fn home_object_of(&self, mut scope: ScopeId) -> Option<HeapId> {
        loop {
            let record = self.record(scope);
            if let Some(home) = record.home_object {
                return Some(home);
            }
            scope = record.parent?;
        }
    }

    /// Resume cell of the nearest enclosing non-arrow function activation.
    ///
    /// `None` either when there is no enclosing function or when the nearest
    /// one is not a generator.
    pub(crate) fn channel_of(&self, mut scope: ScopeId) -> Option<Rc<crate::interp::coroutine::CoroutineChannel>> {
        loop {
            let record = self.record(scope);
            if record.function_boundary {
                return record.channel.clone();
            }
            scope = record.parent?;
        }
    }

    /// Nearest lexical private-name environment.
    pub(crate) fn private_env_of(&self, mut scope: ScopeId) -> Option<Rc<crate::heap::PrivateEnv>> {
        loop {
            let record = self.record(scope);
            if let Some(env) = &record.private_env {
                return Some(env.clone());
            }
            scope = record.parent?;
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_parents_and_respects_shadowing() {
        let mut scopes = Scopes::new();
        let global = scopes.push(None, ScopeKind::Global);
        let inner = scopes.push(Some(global), ScopeKind::Block);
        scopes.declare(global, "x".into(), Binding::initialized(BindingKind::Var, Value::Num(1.0)));

        let (found, _) = scopes.resolve(inner, "x").unwrap();
        assert_eq!(found, global);

        scopes.declare(inner, "x".into(), Binding::initialized(BindingKind::Let, Value::Num(2.0)));
        let (found, binding) = scopes.resolve(inner, "x").unwrap();
        assert_eq!(found, inner);
        assert!(matches!(binding.slot, BindingSlot::Value(Value::Num(n)) if n == 2.0));
    }

    #[test]
    fn this_lookup_skips_unbound_records() {
        let mut scopes = Scopes::new();
        let global = scopes.push(None, ScopeKind::Global);
        let func = scopes.push(Some(global), ScopeKind::Function);
        scopes.record_mut(func).this = ThisState::Bound(Value::Num(7.0));
        let arrow = scopes.push(Some(func), ScopeKind::Function);
        let block = scopes.push(Some(arrow), ScopeKind::Block);

        match scopes.this_of(block) {
            ThisState::Bound(Value::Num(n)) => assert_eq!(n, 7.0),
            other => panic!("unexpected this: {other:?}"),
        }
    }
}
