//! Module graph loader: resolver-driven, cached, depth-bounded,
//! link-then-evaluate with cycle tolerance.
//!
//! Loading is depth-first: a module registers its exports and import
//! indirections (the link phase) before its body runs, so a cyclic import
//! finds the exporter's bindings already declared, still in their TDZ until
//! the cycle's evaluation order initializes them. Bodies run exactly once
//! per cache lifetime; namespace objects are built after evaluation and
//! frozen.

use std::rc::Rc;

use futures::{FutureExt, future::LocalBoxFuture};
use indexmap::IndexMap;

use crate::{
    ast::{ExportDecl, ImportSpecifier, Program, SourceKind, Span, StmtKind},
    bridge,
    error::{Error, RunError, RunResult, codes},
    heap::{ObjectData, PropKey, Property},
    host::HostValue,
    interp::Interp,
    scope::{Binding, BindingKind, BindingSlot, ScopeId, ScopeKind},
    value::Value,
};

/// What the host resolver returns for one specifier.
pub enum ResolvedModule {
    /// Source text to parse as a module.
    Source { source: String, path: String },
    /// Pre-parsed module tree.
    Ast { ast: Rc<Program>, path: String },
    /// Host-provided namespace, exposed as-is behind the bridge.
    Namespace { value: HostValue, path: String },
}

/// Host-supplied specifier resolver: `(specifier, importer) → resolution`.
/// `None` means "not found".
pub type ModuleResolver = Rc<dyn Fn(&str, Option<&str>) -> Option<ResolvedModule>>;

/// Module system configuration.
#[derive(Clone, Default)]
pub struct ModuleOptions {
    pub enabled: bool,
    pub resolver: Option<ModuleResolver>,
    /// Cache evaluated modules across runs (default on).
    pub cache: Option<bool>,
    /// Maximum import depth (default 32).
    pub max_depth: Option<usize>,
}

impl std::fmt::Debug for ModuleOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleOptions")
            .field("enabled", &self.enabled)
            .field("resolver", &self.resolver.is_some())
            .field("cache", &self.cache)
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

const DEFAULT_MAX_DEPTH: usize = 32;

/// Where an export's current value lives.
#[derive(Debug, Clone)]
pub(crate) enum ExportTarget {
    /// A binding in this module's own scope.
    Local(Rc<str>),
    /// A re-export into another module's scope.
    Indirect { scope: ScopeId, name: Rc<str> },
    /// `export * as ns from "m"`: the dependency's namespace object.
    Namespace(Rc<str>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ModuleState {
    Evaluating,
    Evaluated,
}

#[derive(Debug)]
pub(crate) struct ModuleEntry {
    pub state: ModuleState,
    pub scope: ScopeId,
    pub exports: IndexMap<Rc<str>, ExportTarget>,
    pub namespace: Option<Value>,
}

/// Engine-lifetime module registry.
pub(crate) struct ModuleRegistry {
    pub enabled: bool,
    pub cache_enabled: bool,
    pub max_depth: usize,
    pub resolver: Option<ModuleResolver>,
    pub cache: IndexMap<Rc<str>, ModuleEntry>,
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("enabled", &self.enabled)
            .field("cache_enabled", &self.cache_enabled)
            .field("max_depth", &self.max_depth)
            .field("cached", &self.cache.len())
            .finish()
    }
}

impl ModuleRegistry {
    pub(crate) fn from_options(options: &ModuleOptions) -> Self {
        Self {
            enabled: options.enabled,
            cache_enabled: options.cache.unwrap_or(true),
            max_depth: options.max_depth.unwrap_or(DEFAULT_MAX_DEPTH),
            resolver: options.resolver.clone(),
            cache: IndexMap::new(),
        }
    }

    pub(crate) fn clear(&mut self) {
        self.cache.clear();
    }
}

impl Interp {
    /// Dynamic-import entry: resolves, loads, and returns the namespace.
    pub(crate) async fn load_module_for_import(
        &self,
        specifier: &str,
        importer: Option<&str>,
        span: Span,
    ) -> RunResult<Value> {
        let path = self.load_module(specifier, importer, 0, span).await?;
        self.module_namespace(&path, span)
    }

    /// Loads (and evaluates, once) the module named by `specifier`.
    /// Returns the resolved path keying the cache entry.
    pub(crate) fn load_module<'a>(
        &'a self,
        specifier: &'a str,
        importer: Option<&'a str>,
        depth: usize,
        span: Span,
    ) -> LocalBoxFuture<'a, RunResult<Rc<str>>> {
        async move {
            let resolver = {
                let st = self.st();
                if !st.modules.enabled {
                    return Err(RunError::fatal(Error::runtime(
                        codes::RUNTIME_MODULES_DISABLED,
                        "the module system is not enabled",
                    )));
                }
                if depth > st.modules.max_depth {
                    return Err(RunError::fatal(Error::runtime(
                        codes::RUNTIME_MODULE_DEPTH,
                        format!("module graph exceeds the maximum depth of {}", st.modules.max_depth),
                    )));
                }
                st.modules.resolver.clone()
            };
            let Some(resolver) = resolver else {
                return Err(RunError::fatal(Error::runtime(
                    codes::RUNTIME_MODULES_DISABLED,
                    "no module resolver is configured",
                )));
            };
            let Some(resolved) = resolver(specifier, importer) else {
                return Err(RunError::fatal(
                    Error::runtime(codes::RUNTIME_MODULE_NOT_FOUND, format!("Cannot find module '{specifier}'"))
                        .with_span(span),
                ));
            };

            // Cache hit: done, or mid-cycle (the caller links against the
            // already-registered exports). Checked before parsing so cached
            // modules cost one resolver call, nothing more.
            let resolved_path: Rc<str> = match &resolved {
                ResolvedModule::Source { path, .. }
                | ResolvedModule::Ast { path, .. }
                | ResolvedModule::Namespace { path, .. } => path.as_str().into(),
            };
            {
                let st = self.st();
                if st.modules.cache.contains_key(&resolved_path) {
                    return Ok(resolved_path);
                }
            }

            let (path, program, namespace): (Rc<str>, Option<Rc<Program>>, Option<HostValue>) = match resolved {
                ResolvedModule::Source { source, path } => {
                    let program = crate::parser::parse(&source, SourceKind::Module)
                        .map_err(RunError::fatal)?;
                    (path.into(), Some(Rc::new(program)), None)
                }
                ResolvedModule::Ast { ast, path } => (path.into(), Some(ast), None),
                ResolvedModule::Namespace { value, path } => (path.into(), None, Some(value)),
            };

            if let Some(host_namespace) = namespace {
                let mut st = self.st();
                let wrapped = bridge::host_to_value(&mut st.heap, &host_namespace);
                let global_scope = st.global_scope;
                let scope = st.scopes.push(Some(global_scope), ScopeKind::Module);
                st.modules.cache.insert(
                    path.clone(),
                    ModuleEntry {
                        state: ModuleState::Evaluated,
                        scope,
                        exports: IndexMap::new(),
                        namespace: Some(wrapped),
                    },
                );
                return Ok(path);
            }

            let program = program.expect("source and ast resolutions carry a program");
            self.instantiate_and_evaluate(program, path.clone(), depth, span).await?;
            Ok(path)
        }
        .boxed_local()
    }

    /// Entry-point variant used by `evaluate_module`: the host hands the
    /// program and its path directly.
    pub(crate) async fn load_entry_module(&self, program: Rc<Program>, path: Rc<str>, span: Span) -> RunResult<Value> {
        let already = {
            let st = self.st();
            st.modules.cache.get(&path).map(|e| e.state)
        };
        if already != Some(ModuleState::Evaluated) {
            self.instantiate_and_evaluate(program, path.clone(), 0, span).await?;
        }
        self.module_namespace(&path, span)
    }

    /// Link-then-evaluate for one parsed module.
    async fn instantiate_and_evaluate(&self, program: Rc<Program>, path: Rc<str>, depth: usize, span: Span) -> RunResult<()> {
        // Create the module environment and register the entry before any
        // dependency loads, so cycles see it.
        let scope = {
            let mut st = self.st();
            let global = st.global_scope;
            let scope = st.scopes.push(Some(global), ScopeKind::Module);
            st.modules.cache.insert(
                path.clone(),
                ModuleEntry {
                    state: ModuleState::Evaluating,
                    scope,
                    exports: IndexMap::new(),
                    namespace: None,
                },
            );
            scope
        };

        let result = self.link_and_run(&program, &path, scope, depth, span).await;
        match result {
            Ok(()) => {
                self.build_namespace(&path, span)?;
                let mut st = self.st();
                if let Some(entry) = st.modules.cache.get_mut(&path) {
                    entry.state = ModuleState::Evaluated;
                }
                Ok(())
            }
            Err(err) => {
                // Failed modules leave the cache so a later run can retry.
                let mut st = self.st();
                st.modules.cache.shift_remove(&path);
                Err(err)
            }
        }
    }

    async fn link_and_run(&self, program: &Program, path: &Rc<str>, scope: ScopeId, depth: usize, span: Span) -> RunResult<()> {
        // Hoist local declarations (vars, functions, lexical TDZ slots).
        self.hoist_declarations(&program.body, scope)?;

        // Register this module's exports before touching dependencies.
        for stmt in &program.body {
            let StmtKind::Export(decl) = &stmt.kind else { continue };
            match decl {
                ExportDecl::Decl(inner) => {
                    let mut names = Vec::new();
                    collect_decl_names(&inner.kind, &mut names);
                    let mut st = self.st();
                    if let Some(entry) = st.modules.cache.get_mut(path) {
                        for name in names {
                            entry.exports.insert(name.clone(), ExportTarget::Local(name));
                        }
                    }
                }
                ExportDecl::Default(_) => {
                    let mut st = self.st();
                    if let Some(entry) = st.modules.cache.get_mut(path) {
                        entry.exports.insert("default".into(), ExportTarget::Local("*default*".into()));
                    }
                }
                ExportDecl::Named { specifiers, source: None } => {
                    let mut st = self.st();
                    if let Some(entry) = st.modules.cache.get_mut(path) {
                        for spec in specifiers {
                            entry
                                .exports
                                .insert(spec.exported.clone(), ExportTarget::Local(spec.local.clone()));
                        }
                    }
                }
                // Source-carrying forms register below, after the dep loads.
                ExportDecl::Named { source: Some(_), .. } | ExportDecl::All { .. } => {}
            }
        }

        // Load dependencies and wire import/re-export bindings.
        for stmt in &program.body {
            match &stmt.kind {
                StmtKind::Import(import) => {
                    let dep_path = self.load_module(&import.source, Some(path.as_ref()), depth + 1, stmt.span).await?;
                    self.link_import(&dep_path, &import.specifiers, scope, stmt.span)?;
                }
                StmtKind::Export(ExportDecl::Named {
                    specifiers,
                    source: Some(source),
                }) => {
                    let dep_path = self.load_module(source, Some(path.as_ref()), depth + 1, stmt.span).await?;
                    let mut st = self.st();
                    let dep_scope = st.modules.cache.get(&dep_path).map(|e| e.scope);
                    let targets: Vec<(Rc<str>, ExportTarget)> = specifiers
                        .iter()
                        .map(|spec| {
                            let target = st
                                .modules
                                .cache
                                .get(&dep_path)
                                .and_then(|dep| dep.exports.get(&spec.local).cloned())
                                .unwrap_or_else(|| ExportTarget::Indirect {
                                    scope: dep_scope.expect("dependency entry exists"),
                                    name: spec.local.clone(),
                                });
                            let target = match target {
                                ExportTarget::Local(name) => ExportTarget::Indirect {
                                    scope: dep_scope.expect("dependency entry exists"),
                                    name,
                                },
                                other => other,
                            };
                            (spec.exported.clone(), target)
                        })
                        .collect();
                    if let Some(entry) = st.modules.cache.get_mut(path) {
                        for (exported, target) in targets {
                            entry.exports.insert(exported, target);
                        }
                    }
                }
                StmtKind::Export(ExportDecl::All { exported, source }) => {
                    let dep_path = self.load_module(source, Some(path.as_ref()), depth + 1, stmt.span).await?;
                    let mut st = self.st();
                    if let Some(ns_name) = exported {
                        if let Some(entry) = st.modules.cache.get_mut(path) {
                            entry.exports.insert(ns_name.clone(), ExportTarget::Namespace(dep_path));
                        }
                    } else {
                        let dep = st.modules.cache.get(&dep_path);
                        let dep_scope = dep.map(|e| e.scope);
                        let reexports: Vec<(Rc<str>, ExportTarget)> = dep
                            .map(|e| {
                                e.exports
                                    .iter()
                                    .filter(|(name, _)| &***name != "default")
                                    .map(|(name, target)| {
                                        let target = match target {
                                            ExportTarget::Local(local) => ExportTarget::Indirect {
                                                scope: dep_scope.expect("dependency entry exists"),
                                                name: local.clone(),
                                            },
                                            other => other.clone(),
                                        };
                                        (name.clone(), target)
                                    })
                                    .collect()
                            })
                            .unwrap_or_default();
                        if let Some(entry) = st.modules.cache.get_mut(path) {
                            for (name, target) in reexports {
                                entry.exports.entry(name).or_insert(target);
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        // Evaluate the body exactly once.
        self.eval_module_body(program, scope).await
    }

    fn link_import(&self, dep_path: &Rc<str>, specifiers: &[ImportSpecifier], scope: ScopeId, span: Span) -> RunResult<()> {
        let mut st = self.st();
        let st = &mut *st;
        let (dep_scope, dep_namespace, dep_exports) = match st.modules.cache.get(dep_path) {
            Some(dep) => (dep.scope, dep.namespace.clone(), dep.exports.clone()),
            None => {
                return Err(RunError::fatal(Error::runtime(
                    codes::RUNTIME_MODULE_NOT_FOUND,
                    format!("module '{dep_path}' vanished during linking"),
                )));
            }
        };
        let dep_is_host = dep_namespace.as_ref().is_some_and(|ns| {
            matches!(ns, Value::Ref(id) if matches!(st.heap.get(*id), ObjectData::BoundHost(_)))
        });

        for spec in specifiers {
            match spec {
                ImportSpecifier::Default(local) => {
                    let slot = if dep_is_host {
                        let ns = dep_namespace.clone().expect("host namespace present");
                        BindingSlot::Value(self.host_namespace_member(st, &ns, "default")?)
                    } else {
                        match dep_exports.get("default") {
                            Some(ExportTarget::Local(name)) => BindingSlot::Indirect {
                                scope: dep_scope,
                                name: name.clone(),
                            },
                            Some(ExportTarget::Indirect { scope, name }) => BindingSlot::Indirect {
                                scope: *scope,
                                name: name.clone(),
                            },
                            _ => {
                                return Err(RunError::fatal(
                                    Error::runtime(
                                        codes::RUNTIME_MODULE_NOT_FOUND,
                                        format!("module '{dep_path}' has no default export"),
                                    )
                                    .with_span(span),
                                ));
                            }
                        }
                    };
                    st.scopes.declare(
                        scope,
                        local.clone(),
                        Binding {
                            kind: BindingKind::Import,
                            initialized: true,
                            slot,
                        },
                    );
                }
                ImportSpecifier::Named { imported, local } => {
                    let slot = if dep_is_host {
                        let ns = dep_namespace.clone().expect("host namespace present");
                        BindingSlot::Value(self.host_namespace_member(st, &ns, imported)?)
                    } else {
                        match dep_exports.get(imported) {
                            Some(ExportTarget::Local(name)) => BindingSlot::Indirect {
                                scope: dep_scope,
                                name: name.clone(),
                            },
                            Some(ExportTarget::Indirect { scope, name }) => BindingSlot::Indirect {
                                scope: *scope,
                                name: name.clone(),
                            },
                            Some(ExportTarget::Namespace(path)) => {
                                let ns = st
                                    .modules
                                    .cache
                                    .get(path)
                                    .and_then(|e| e.namespace.clone())
                                    .unwrap_or(Value::Undefined);
                                BindingSlot::Value(ns)
                            }
                            None => {
                                return Err(RunError::fatal(
                                    Error::runtime(
                                        codes::RUNTIME_MODULE_NOT_FOUND,
                                        format!("module '{dep_path}' does not export '{imported}'"),
                                    )
                                    .with_span(span),
                                ));
                            }
                        }
                    };
                    st.scopes.declare(
                        scope,
                        local.clone(),
                        Binding {
                            kind: BindingKind::Import,
                            initialized: true,
                            slot,
                        },
                    );
                }
                ImportSpecifier::Namespace(local) => {
                    let binding = match &dep_namespace {
                        Some(ns) => Binding::initialized(BindingKind::Import, ns.clone()),
                        // Mid-cycle: the namespace is not built yet; accesses
                        // before the cycle completes hit the TDZ.
                        None => Binding::uninitialized(BindingKind::Import),
                    };
                    st.scopes.declare(scope, local.clone(), binding);
                }
            }
        }
        Ok(())
    }

    fn host_namespace_member(&self, st: &mut crate::interp::EngineState, ns: &Value, key: &str) -> RunResult<Value> {
        let Value::Ref(id) = ns else { return Ok(Value::Undefined) };
        let host = match st.heap.get(*id) {
            ObjectData::BoundHost(hv) => hv.clone(),
            _ => return Ok(Value::Undefined),
        };
        bridge::host_get(&st.policy, &mut st.heap, &host, &PropKey::str(key))
    }

    /// Builds and freezes the namespace object from the export table.
    fn build_namespace(&self, path: &Rc<str>, span: Span) -> RunResult<()> {
        let mut st = self.st();
        let st = &mut *st;
        let Some(entry) = st.modules.cache.get(path) else { return Ok(()) };
        if entry.namespace.is_some() {
            return Ok(());
        }
        let scope = entry.scope;
        let exports: Vec<(Rc<str>, ExportTarget)> = entry.exports.iter().map(|(k, v)| (k.clone(), v.clone())).collect();

        let ns_id = st.heap.alloc_plain();
        for (name, target) in exports {
            let value = match target {
                ExportTarget::Local(local) => read_module_binding(st, scope, &local),
                ExportTarget::Indirect { scope, name } => read_module_binding(st, scope, &name),
                ExportTarget::Namespace(dep) => st
                    .modules
                    .cache
                    .get(&dep)
                    .and_then(|e| e.namespace.clone())
                    .unwrap_or(Value::Undefined),
            };
            if let ObjectData::Plain(obj) = st.heap.get_mut(ns_id) {
                obj.props.insert(PropKey::Str(name), Property::data(value));
            }
        }
        bridge::freeze_object(&mut st.heap, ns_id);
        if let Some(entry) = st.modules.cache.get_mut(path) {
            entry.namespace = Some(Value::Ref(ns_id));
        }
        let _ = span;
        Ok(())
    }

    pub(crate) fn module_namespace(&self, path: &Rc<str>, span: Span) -> RunResult<Value> {
        let st = self.st();
        st.modules
            .cache
            .get(path)
            .and_then(|e| e.namespace.clone())
            .ok_or_else(|| {
                RunError::fatal(
                    Error::runtime(codes::RUNTIME_MODULE_NOT_FOUND, format!("module '{path}' is not loaded"))
                        .with_span(span),
                )
            })
    }
}

/// Follows indirections to a binding's current value (namespace building runs
/// after evaluation, so TDZ holes read as undefined rather than erroring).
fn read_module_binding(st: &crate::interp::EngineState, mut scope: ScopeId, name: &str) -> Value {
    let mut name: Rc<str> = name.into();
    for _ in 0..64 {
        let Some(binding) = st.scopes.record(scope).bindings.get(&*name) else {
            return Value::Undefined;
        };
        match &binding.slot {
            BindingSlot::Value(value) => {
                return if binding.initialized { value.clone() } else { Value::Undefined };
            }
            BindingSlot::Indirect { scope: target, name: target_name } => {
                scope = *target;
                name = target_name.clone();
            }
        }
    }
    Value::Undefined
}

/// Names declared by an exported declaration.
fn collect_decl_names(kind: &StmtKind, out: &mut Vec<Rc<str>>) {
    match kind {
        StmtKind::VarDecl { declarators, .. } => {
            for declarator in declarators {
                crate::interp::pattern::pattern_names(&declarator.pattern, out);
            }
        }
        StmtKind::FunctionDecl(func) => {
            if let Some(name) = &func.name {
                out.push(name.clone());
            }
        }
        StmtKind::ClassDecl(class) => {
            if let Some(name) = &class.name {
                out.push(name.clone());
            }
        }
        _ => {}
    }
}
