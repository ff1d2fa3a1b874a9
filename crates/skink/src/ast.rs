//! Syntax tree model for the gated JavaScript subset.
//!
//! Every node carries a [`Span`] so diagnostics can point at source. The tree
//! is produced by the bundled parser ([`crate::parse`]) or supplied pre-parsed
//! by the host; the evaluator assumes structural well-formedness and reports
//! anything else as a parse-category error at the offending span.

use std::rc::Rc;

use num_bigint::BigInt;

/// Source region covered by a node, in 1-based lines and 0-based columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

impl Span {
    pub(crate) fn new(start_line: u32, start_col: u32, end_line: u32, end_col: u32) -> Self {
        Self {
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    /// Returns the smallest span covering both `self` and `other`.
    #[must_use]
    pub(crate) fn to(self, other: Self) -> Self {
        Self {
            start_line: self.start_line,
            start_col: self.start_col,
            end_line: other.end_line,
            end_col: other.end_col,
        }
    }
}

/// Whether a tree was parsed as a classic script or as a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Script,
    Module,
}

/// A parsed program: the unit accepted by the engine entry points.
#[derive(Debug)]
pub struct Program {
    pub kind: SourceKind,
    pub body: Vec<Stmt>,
    /// Set when the source began with a `#!` line.
    pub hashbang: bool,
    /// Purely lexical gated features (hashbang, numeric separators) observed
    /// while parsing; the gate checks these before the first statement runs.
    pub lexical_features: Vec<(crate::features::FeatureTag, Span)>,
}

/// A statement together with its source span.
#[derive(Debug)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

/// `var` / `let` / `const` declaration kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Var,
    Let,
    Const,
}

/// One `name = init` entry of a declaration statement.
#[derive(Debug)]
pub struct Declarator {
    pub pattern: Pattern,
    pub init: Option<Expr>,
}

/// Loop initializer: either a declaration or a bare expression.
#[derive(Debug)]
pub enum ForInit {
    Decl(DeclKind, Vec<Declarator>),
    Expr(Expr),
}

/// Left-hand side of `for..in` / `for..of`.
#[derive(Debug)]
pub enum ForTarget {
    /// `for (let x of …)` - fresh binding per iteration.
    Decl(DeclKind, Pattern),
    /// `for (x of …)` - assignment to an existing target.
    Assign(Pattern),
}

#[derive(Debug)]
pub struct CatchClause {
    /// `None` for the optional-catch-binding form `catch { … }`.
    pub param: Option<Pattern>,
    pub body: Vec<Stmt>,
}

#[derive(Debug)]
pub struct SwitchCase {
    /// `None` marks the `default:` clause.
    pub test: Option<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug)]
pub enum StmtKind {
    Expr(Expr),
    VarDecl {
        kind: DeclKind,
        declarators: Vec<Declarator>,
    },
    FunctionDecl(Rc<Function>),
    ClassDecl(Rc<ClassDef>),
    Block(Vec<Stmt>),
    Empty,
    Debugger,
    If {
        test: Expr,
        consequent: Box<Stmt>,
        alternate: Option<Box<Stmt>>,
    },
    While {
        test: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        test: Expr,
    },
    For {
        init: Option<Box<ForInit>>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    ForIn {
        target: Box<ForTarget>,
        object: Expr,
        body: Box<Stmt>,
    },
    ForOf {
        target: Box<ForTarget>,
        iterable: Expr,
        body: Box<Stmt>,
        /// `for await (… of …)`.
        is_await: bool,
    },
    Break(Option<Rc<str>>),
    Continue(Option<Rc<str>>),
    Return(Option<Expr>),
    Throw(Expr),
    Try {
        block: Vec<Stmt>,
        handler: Option<CatchClause>,
        finalizer: Option<Vec<Stmt>>,
    },
    Switch {
        discriminant: Expr,
        cases: Vec<SwitchCase>,
    },
    Labeled {
        label: Rc<str>,
        body: Box<Stmt>,
    },
    With {
        object: Expr,
        body: Box<Stmt>,
    },
    Import(ImportDecl),
    Export(ExportDecl),
}

/// An expression together with its source span.
#[derive(Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

/// Property key in object literals and class bodies.
#[derive(Debug)]
pub enum PropName {
    Ident(Rc<str>),
    Str(Rc<str>),
    Num(f64),
    Computed(Box<Expr>),
    /// `#name` - only valid inside class bodies.
    Private(Rc<str>),
}

/// One element of an object literal.
#[derive(Debug)]
pub enum ObjectProp {
    KeyValue {
        key: PropName,
        value: Expr,
    },
    /// `{ x }` shorthand.
    Shorthand(Rc<str>),
    /// `get k() {}` / `set k(v) {}` / `k() {}`.
    Method {
        kind: MethodKind,
        key: PropName,
        func: Rc<Function>,
    },
    Spread(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Method,
    Getter,
    Setter,
}

/// One element of an array literal; `None` is an elision hole.
#[derive(Debug)]
pub enum ArrayElement {
    Item(Expr),
    Spread(Expr),
}

/// A call / `new` argument.
#[derive(Debug)]
pub enum Arg {
    Item(Expr),
    Spread(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Minus,
    Plus,
    Not,
    BitNot,
    TypeOf,
    Void,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    Increment,
    Decrement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Exp,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Shl,
    Shr,
    UShr,
    BitAnd,
    BitOr,
    BitXor,
    In,
    InstanceOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

/// Assignment operators, including the logical-assignment family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Exp,
    Shl,
    Shr,
    UShr,
    BitAnd,
    BitOr,
    BitXor,
    AndAssign,
    OrAssign,
    NullishAssign,
}

/// Member access selector.
#[derive(Debug)]
pub enum MemberProp {
    Ident(Rc<str>),
    Private(Rc<str>),
    Computed(Box<Expr>),
}

/// Cooked/raw pair for one template chunk. `cooked` is `None` when the chunk
/// contains an invalid escape (legal only in tagged templates).
#[derive(Debug)]
pub struct TemplateElement {
    pub cooked: Option<Rc<str>>,
    pub raw: Rc<str>,
}

#[derive(Debug)]
pub struct TemplateLiteral {
    pub quasis: Vec<TemplateElement>,
    pub exprs: Vec<Expr>,
}

#[derive(Debug)]
pub enum ExprKind {
    Ident(Rc<str>),
    Null,
    Bool(bool),
    Num(f64),
    BigInt(BigInt),
    Str(Rc<str>),
    Regex {
        pattern: Rc<str>,
        flags: Rc<str>,
    },
    Template(TemplateLiteral),
    TaggedTemplate {
        tag: Box<Expr>,
        quasi: TemplateLiteral,
    },
    Array(Vec<Option<ArrayElement>>),
    Object(Vec<ObjectProp>),
    Function(Rc<Function>),
    Class(Rc<ClassDef>),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Update {
        op: UpdateOp,
        prefix: bool,
        target: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Assign {
        op: AssignOp,
        target: Box<Pattern>,
        value: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Arg>,
        /// `f?.(…)`.
        optional: bool,
    },
    New {
        callee: Box<Expr>,
        args: Vec<Arg>,
    },
    Member {
        object: Box<Expr>,
        property: MemberProp,
        /// `a?.b` / `a?.[k]`.
        optional: bool,
    },
    Sequence(Vec<Expr>),
    This,
    /// `super.x` / `super[k]` - only valid inside methods.
    SuperMember {
        property: Box<MemberProp>,
    },
    /// `super(…)` - only valid inside derived constructors.
    SuperCall(Vec<Arg>),
    Yield {
        arg: Option<Box<Expr>>,
        delegate: bool,
    },
    Await(Box<Expr>),
    /// `import(specifier)`.
    DynamicImport(Box<Expr>),
    /// `#name in obj` brand test.
    PrivateIn {
        name: Rc<str>,
        object: Box<Expr>,
    },
}

/// Binding / assignment pattern.
#[derive(Debug)]
pub enum Pattern {
    Ident(Rc<str>, Span),
    Array {
        elements: Vec<Option<Pattern>>,
        rest: Option<Box<Pattern>>,
        span: Span,
    },
    Object {
        props: Vec<ObjectPatternProp>,
        rest: Option<Box<Pattern>>,
        span: Span,
    },
    /// Pattern with a default: `x = 1` inside a larger pattern.
    Default {
        pattern: Box<Pattern>,
        default: Box<Expr>,
    },
    /// Member-expression target; legal in assignment position only.
    Member(Box<Expr>),
}

impl Pattern {
    pub(crate) fn span(&self) -> Span {
        match self {
            Self::Ident(_, span) | Self::Array { span, .. } | Self::Object { span, .. } => *span,
            Self::Default { pattern, .. } => pattern.span(),
            Self::Member(expr) => expr.span,
        }
    }
}

#[derive(Debug)]
pub struct ObjectPatternProp {
    pub key: PropName,
    pub value: Pattern,
}

/// Function parameter: a pattern, an optional default, and a rest marker.
#[derive(Debug)]
pub struct Param {
    pub pattern: Pattern,
    pub default: Option<Expr>,
    pub rest: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Normal,
    Arrow,
    Method,
    Getter,
    Setter,
    Generator,
    Async,
    AsyncGenerator,
    AsyncArrow,
}

impl FunctionKind {
    pub(crate) fn is_async(self) -> bool {
        matches!(self, Self::Async | Self::AsyncGenerator | Self::AsyncArrow)
    }

    pub(crate) fn is_generator(self) -> bool {
        matches!(self, Self::Generator | Self::AsyncGenerator)
    }

    pub(crate) fn is_arrow(self) -> bool {
        matches!(self, Self::Arrow | Self::AsyncArrow)
    }
}

/// Body of a function: a block, or a bare expression for concise arrows.
#[derive(Debug)]
pub enum FunctionBody {
    Block(Vec<Stmt>),
    Expr(Box<Expr>),
}

#[derive(Debug)]
pub struct Function {
    pub name: Option<Rc<str>>,
    pub params: Vec<Param>,
    pub body: FunctionBody,
    pub kind: FunctionKind,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassMemberKind {
    Method,
    Getter,
    Setter,
    Field,
    StaticBlock,
}

#[derive(Debug)]
pub struct ClassMember {
    pub kind: ClassMemberKind,
    pub is_static: bool,
    /// Absent for static blocks.
    pub key: Option<PropName>,
    /// Method / accessor body.
    pub func: Option<Rc<Function>>,
    /// Field initializer expression.
    pub value: Option<Expr>,
    /// Static-block body.
    pub block: Option<Vec<Stmt>>,
    pub span: Span,
}

#[derive(Debug)]
pub struct ClassDef {
    pub name: Option<Rc<str>>,
    pub parent: Option<Box<Expr>>,
    pub members: Vec<ClassMember>,
    pub span: Span,
}

#[derive(Debug)]
pub enum ImportSpecifier {
    /// `import x from "m"`.
    Default(Rc<str>),
    /// `import * as ns from "m"`.
    Namespace(Rc<str>),
    /// `import { a as b } from "m"`.
    Named { imported: Rc<str>, local: Rc<str> },
}

#[derive(Debug)]
pub struct ImportDecl {
    pub specifiers: Vec<ImportSpecifier>,
    pub source: Rc<str>,
}

#[derive(Debug)]
pub struct ExportSpecifier {
    pub local: Rc<str>,
    pub exported: Rc<str>,
}

#[derive(Debug)]
pub enum ExportDecl {
    /// `export { a, b as c }` / `export { a } from "m"`.
    Named {
        specifiers: Vec<ExportSpecifier>,
        source: Option<Rc<str>>,
    },
    /// `export default <expr>`.
    Default(Box<Expr>),
    /// `export <declaration>`.
    Decl(Box<Stmt>),
    /// `export * from "m"` / `export * as ns from "m"`.
    All {
        exported: Option<Rc<str>>,
        source: Rc<str>,
    },
}
