//! Error model: categorized, stable-coded errors with source-pointed
//! diagnostics and reconstructed call stacks.
//!
//! Four categories exist, each owning a stable code range:
//!
//! - **parse** `E0001`-`E0099`: malformed input, never catchable in-sandbox.
//! - **runtime** `E0100`-`E0199`: thrown values, reference/type/range errors;
//!   catchable by sandbox `try/catch`.
//! - **security** `E1001`-`E1999`: forbidden property names, prototype
//!   pollution, blocked host writes; uncatchable, they surface to the host.
//! - **feature** `E2001`+: a disabled feature tag was used; raised before any
//!   side effect and uncatchable.
//!
//! The formatted diagnostic is `Category[code]: message`, optionally followed
//! by a source excerpt with a caret and a reconstructed call stack.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

use crate::{ast::Span, host::HostValue, value::Value};

/// Top-level error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, Serialize, Deserialize)]
pub enum ErrorCategory {
    Parse,
    Runtime,
    Security,
    Feature,
}

/// Stable error codes. The numeric value is part of the public contract.
pub mod codes {
    /// Generic malformed input.
    pub const PARSE_ERROR: u16 = 1;
    /// Unexpected token (diagnostic carries an expected-token hint).
    pub const PARSE_UNEXPECTED_TOKEN: u16 = 2;
    /// Source ended mid-construct.
    pub const PARSE_UNEXPECTED_EOF: u16 = 3;
    /// Nesting exceeded the parser depth guard.
    pub const PARSE_DEPTH: u16 = 4;
    /// A pre-parsed tree was structurally unusable.
    pub const PARSE_BAD_AST: u16 = 10;

    /// Generic runtime failure.
    pub const RUNTIME_ERROR: u16 = 100;
    /// Unresolved identifier or TDZ access.
    pub const RUNTIME_REFERENCE: u16 = 101;
    /// Type error (bad callee, null member access, frozen write, …).
    pub const RUNTIME_TYPE: u16 = 102;
    /// Range error (invalid length, bad repeat count, …).
    pub const RUNTIME_RANGE: u16 = 103;
    /// A sandbox `throw` that escaped uncaught; the thrown value is preserved.
    pub const RUNTIME_THROWN: u16 = 104;
    /// A per-run or total resource limit tripped.
    pub const RUNTIME_LIMIT: u16 = 105;
    /// Async deadline reached.
    pub const RUNTIME_TIMEOUT: u16 = 110;
    /// The run's abort signal fired.
    pub const RUNTIME_ABORTED: u16 = 111;
    /// A suspension point was reached during a synchronous run.
    pub const RUNTIME_SYNC_SUSPEND: u16 = 112;
    /// A synchronous run was submitted while the engine held an async run.
    pub const RUNTIME_ENGINE_BUSY: u16 = 113;
    /// Module specifier did not resolve.
    pub const RUNTIME_MODULE_NOT_FOUND: u16 = 120;
    /// Module graph exceeded the configured depth.
    pub const RUNTIME_MODULE_DEPTH: u16 = 121;
    /// Module entry point used while the module system is disabled.
    pub const RUNTIME_MODULES_DISABLED: u16 = 122;
    /// The host-supplied AST validator rejected the program.
    pub const RUNTIME_VALIDATION: u16 = 130;

    /// Access to a forbidden property name.
    pub const SECURITY_FORBIDDEN_PROPERTY: u16 = 1001;
    /// Prototype-pollution attempt (`__proto__`/`constructor` write paths).
    pub const SECURITY_PROTO_POLLUTION: u16 = 1002;
    /// Write attempted through the read-only host proxy.
    pub const SECURITY_HOST_WRITE: u16 = 1003;
    /// Prototype access blocked on a bound host object.
    pub const SECURITY_PROTO_ACCESS: u16 = 1004;

    /// A disabled feature tag was used.
    pub const FEATURE_DISABLED: u16 = 2001;
}

/// One reconstructed call-stack entry: the function name (or `<anonymous>`)
/// and the call-site span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub function: Option<String>,
    pub span: Span,
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.function.as_deref().unwrap_or("<anonymous>");
        write!(f, "at {name} (line {}, col {})", self.span.start_line, self.span.start_col)
    }
}

/// Structured error returned from every engine entry point.
#[derive(Debug, Clone)]
pub struct Error {
    pub category: ErrorCategory,
    pub code: u16,
    pub message: String,
    pub span: Option<Span>,
    /// Pre-rendered source line with a caret, when source text was available.
    pub excerpt: Option<String>,
    /// Innermost-first reconstructed sandbox call stack.
    pub stack: Vec<StackFrame>,
    /// For uncaught sandbox `throw`s: the thrown value, converted for the
    /// host, so embedding code can recover the original payload.
    pub thrown: Option<HostValue>,
}

impl Error {
    pub(crate) fn new(category: ErrorCategory, code: u16, message: impl Into<String>) -> Self {
        Self {
            category,
            code,
            message: message.into(),
            span: None,
            excerpt: None,
            stack: Vec::new(),
            thrown: None,
        }
    }

    #[must_use]
    pub(crate) fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub(crate) fn parse(code: u16, message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorCategory::Parse, code, message).with_span(span)
    }

    pub(crate) fn security(code: u16, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Security, code, message)
    }

    pub(crate) fn feature(tag: crate::features::FeatureTag, span: Span) -> Self {
        Self::new(
            ErrorCategory::Feature,
            codes::FEATURE_DISABLED,
            format!("Feature '{tag}' is not enabled"),
        )
        .with_span(span)
    }

    pub(crate) fn runtime(code: u16, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Runtime, code, message)
    }

    /// Attaches the caret excerpt for `span` rendered from `source`.
    pub(crate) fn attach_excerpt(&mut self, source: &str) {
        if self.excerpt.is_none()
            && let Some(span) = self.span
        {
            self.excerpt = source_excerpt(source, span);
        }
    }

    /// Formats the one-line header: `Category[E0102]: message`.
    #[must_use]
    pub fn header(&self) -> String {
        format!("{}[E{:04}]: {}", self.category, self.code, self.message)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.header())?;
        if let Some(excerpt) = &self.excerpt {
            write!(f, "\n{excerpt}")?;
        }
        for frame in &self.stack {
            write!(f, "\n    {frame}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

/// Renders the source line covered by `span` with a caret underneath.
pub(crate) fn source_excerpt(source: &str, span: Span) -> Option<String> {
    let line_idx = span.start_line.checked_sub(1)? as usize;
    let line = source.lines().nth(line_idx)?;
    let gutter = format!("{:>4} | ", span.start_line);
    let caret_pad = " ".repeat(gutter.len() + span.start_col as usize);
    let caret_len = if span.end_line == span.start_line {
        (span.end_col.saturating_sub(span.start_col)).max(1) as usize
    } else {
        1
    };
    Some(format!("{gutter}{line}\n{caret_pad}{}", "^".repeat(caret_len)))
}

/// Kinds of engine-raised (as opposed to script-thrown) runtime errors.
///
/// These materialize as error objects with `name`/`message` properties when a
/// sandbox `catch` binds them, and map onto stable codes when they escape to
/// the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JsErrorKind {
    Type,
    Reference,
    Range,
    /// A resource-counter limit tripped; named `RangeError` in-sandbox, keyed
    /// to the limit code for the host.
    Limit,
    Generic,
}

impl JsErrorKind {
    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::Type => "TypeError",
            Self::Reference => "ReferenceError",
            Self::Range | Self::Limit => "RangeError",
            Self::Generic => "Error",
        }
    }

    pub(crate) fn code(self) -> u16 {
        match self {
            Self::Type => codes::RUNTIME_TYPE,
            Self::Reference => codes::RUNTIME_REFERENCE,
            Self::Range => codes::RUNTIME_RANGE,
            Self::Limit => codes::RUNTIME_LIMIT,
            Self::Generic => codes::RUNTIME_ERROR,
        }
    }
}

/// Payload of an in-flight throw completion.
#[derive(Debug)]
pub(crate) enum ThrowPayload {
    /// `throw expr` from script: an arbitrary sandbox value.
    Value(Value),
    /// Engine-raised error, materialized as an error object at catch time.
    Raised { kind: JsErrorKind, message: String },
}

/// An in-flight catchable throw.
#[derive(Debug)]
pub(crate) struct Thrown {
    pub payload: ThrowPayload,
    pub span: Option<Span>,
    /// Captured once, at the innermost function boundary the throw crosses.
    pub stack: Option<Vec<StackFrame>>,
}

/// Internal control-flow error threaded through `?` in the evaluator.
#[derive(Debug)]
pub(crate) enum RunError {
    /// Catchable sandbox throw.
    Throw(Box<Thrown>),
    /// Uncatchable failure: security, feature, abort, timeout, validation.
    Fatal(Box<Error>),
    /// Forced generator return: unwinds `finally` blocks, skips `catch`.
    ForcedReturn(Value),
}

pub(crate) type RunResult<T> = Result<T, RunError>;

impl RunError {
    pub(crate) fn throw(value: Value, span: Option<Span>) -> Self {
        Self::Throw(Box::new(Thrown {
            payload: ThrowPayload::Value(value),
            span,
            stack: None,
        }))
    }

    pub(crate) fn raised(kind: JsErrorKind, message: impl Into<String>, span: Option<Span>) -> Self {
        Self::Throw(Box::new(Thrown {
            payload: ThrowPayload::Raised {
                kind,
                message: message.into(),
            },
            span,
            stack: None,
        }))
    }

    pub(crate) fn type_error(message: impl Into<String>, span: Option<Span>) -> Self {
        Self::raised(JsErrorKind::Type, message, span)
    }

    pub(crate) fn reference_error(message: impl Into<String>, span: Option<Span>) -> Self {
        Self::raised(JsErrorKind::Reference, message, span)
    }

    pub(crate) fn range_error(message: impl Into<String>, span: Option<Span>) -> Self {
        Self::raised(JsErrorKind::Range, message, span)
    }

    pub(crate) fn fatal(error: Error) -> Self {
        Self::Fatal(Box::new(error))
    }

    /// True for errors a sandbox `catch` may bind.
    pub(crate) fn is_catchable(&self) -> bool {
        matches!(self, Self::Throw(_))
    }
}

impl From<Error> for RunError {
    fn from(error: Error) -> Self {
        Self::fatal(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_format_is_stable() {
        let err = Error::runtime(codes::RUNTIME_TYPE, "x is not a function");
        assert_eq!(err.header(), "Runtime[E0102]: x is not a function");

        let err = Error::security(codes::SECURITY_FORBIDDEN_PROPERTY, "access to '__proto__' is forbidden");
        assert_eq!(err.header(), "Security[E1001]: access to '__proto__' is forbidden");
    }

    #[test]
    fn excerpt_points_caret_at_column() {
        let source = "let x = 1;\nlet y = oops;\n";
        let span = Span::new(2, 8, 2, 12);
        let excerpt = source_excerpt(source, span).unwrap();
        assert_eq!(excerpt, "   2 | let y = oops;\n               ^^^^");
    }
}
