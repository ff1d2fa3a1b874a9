#![doc = include_str!("../../../README.md")]
#![expect(dead_code, reason = "compat shims keep some currently-unused APIs")]
#![expect(clippy::cast_possible_truncation, reason = "numeric narrowing is checked")]
#![expect(clippy::cast_sign_loss, reason = "sign-changing casts are intentional")]
#![expect(clippy::enum_glob_use, reason = "dispatch tables import their variants")]
#![expect(clippy::module_name_repetitions, reason = "public names stay descriptive")]

mod ast;
mod bridge;
mod builtins;
mod engine;
mod error;
mod features;
mod heap;
mod host;
mod interp;
mod lexer;
mod modules;
mod parser;
mod presets;
mod resource;
mod scheduler;
mod scope;
mod value;

pub use crate::{
    ast::{Program, SourceKind, Span},
    bridge::{DEFAULT_FORBIDDEN_NAMES, SecurityOptions},
    engine::{Engine, FullOutput, InterpreterOptions, ProgramInput, RunOptions, Validator},
    error::{Error, ErrorCategory, StackFrame, codes},
    features::{FeatureControl, FeatureMode, FeatureTag},
    host::{HostArray, HostError, HostFunction, HostObject, HostValue},
    modules::{ModuleOptions, ModuleResolver, ResolvedModule},
    presets::{Era, era_features, era_preset, merge_presets},
    resource::{AbortSignal, DEFAULT_MAX_CALL_DEPTH, Limits, RunLimits, RunStats, TotalCounters},
};

/// Parses source text without evaluating it, for hosts that cache trees or
/// run validators ahead of time.
pub fn parse_program(source: &str, kind: SourceKind) -> Result<std::rc::Rc<Program>, Error> {
    let mut result = parser::parse(source, kind);
    if let Err(err) = &mut result {
        err.attach_excerpt(source);
    }
    result.map(std::rc::Rc::new)
}
