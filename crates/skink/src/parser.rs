//! Bundled recursive-descent parser producing the [`crate::ast`] model.
//!
//! The engine treats this front end as a black box: hosts may bypass it
//! entirely by submitting pre-parsed trees. Precedence climbing drives binary
//! expressions; arrow-function and destructuring ambiguities are resolved by
//! snapshot backtracking over the re-positionable lexer. Nesting depth is
//! bounded so adversarial input cannot exhaust the host stack while parsing.

use std::rc::Rc;

use crate::{
    ast::{
        Arg, ArrayElement, AssignOp, BinaryOp, CatchClause, ClassDef, ClassMember, ClassMemberKind, DeclKind,
        Declarator, ExportDecl, ExportSpecifier, Expr, ExprKind, ForInit, ForTarget, Function, FunctionBody,
        FunctionKind, ImportDecl, ImportSpecifier, LogicalOp, MemberProp, MethodKind, ObjectPatternProp, ObjectProp,
        Param, Pattern, Program, PropName, SourceKind, Span, Stmt, StmtKind, SwitchCase, TemplateElement,
        TemplateLiteral, UnaryOp, UpdateOp,
    },
    error::{Error, codes},
    features::FeatureTag,
    lexer::{Keyword, Lexer, Token, TokenKind},
};

/// Maximum grammar nesting depth accepted by the parser.
const MAX_PARSE_DEPTH: u32 = if cfg!(debug_assertions) { 120 } else { 400 };

/// Parses `source` as a script or module.
pub(crate) fn parse(source: &str, kind: SourceKind) -> Result<Program, Error> {
    let mut parser = Parser::new(source, kind)?;
    parser.parse_program()
}

struct Parser<'src> {
    lexer: Lexer<'src>,
    current: Token,
    prev_span: Span,
    depth: u32,
    kind: SourceKind,
    /// Set while parsing a `for (…)` head, where a bare `in` belongs to the
    /// loop rather than the relational operator.
    no_in: bool,
}

impl<'src> Parser<'src> {
    fn new(source: &'src str, kind: SourceKind) -> Result<Self, Error> {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token()?;
        Ok(Self {
            lexer,
            current,
            prev_span: Span::default(),
            depth: 0,
            kind,
            no_in: false,
        })
    }

    fn parse_program(&mut self) -> Result<Program, Error> {
        let mut body = Vec::new();
        while self.current.kind != TokenKind::Eof {
            body.push(self.parse_stmt()?);
        }
        let mut lexical_features = Vec::new();
        if let Some(span) = self.lexer.saw_hashbang {
            lexical_features.push((FeatureTag::Hashbang, span));
        }
        if let Some(span) = self.lexer.saw_numeric_separator {
            lexical_features.push((FeatureTag::NumericSeparators, span));
        }
        Ok(Program {
            kind: self.kind,
            body,
            hashbang: self.lexer.saw_hashbang.is_some(),
            lexical_features,
        })
    }

    // --- token plumbing ---

    fn advance(&mut self) -> Result<Token, Error> {
        let next = self.lexer.next_token()?;
        self.prev_span = self.current.span;
        Ok(std::mem::replace(&mut self.current, next))
    }

    fn eat(&mut self, kind: &TokenKind) -> Result<bool, Error> {
        if &self.current.kind == kind {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn eat_keyword(&mut self, kw: Keyword) -> Result<bool, Error> {
        if self.current.kind == TokenKind::Keyword(kw) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<Token, Error> {
        if &self.current.kind == kind {
            self.advance()
        } else {
            Err(self.unexpected(what))
        }
    }

    fn unexpected(&self, expected: &str) -> Error {
        let found = match &self.current.kind {
            TokenKind::Eof => "end of input".to_owned(),
            other => format!("{other:?}"),
        };
        let code = if self.current.kind == TokenKind::Eof {
            codes::PARSE_UNEXPECTED_EOF
        } else {
            codes::PARSE_UNEXPECTED_TOKEN
        };
        Error::parse(code, format!("expected {expected}, found {found}"), self.current.span)
    }

    /// Consumes a statement terminator under automatic semicolon insertion.
    fn consume_semicolon(&mut self) -> Result<(), Error> {
        if self.eat(&TokenKind::Semicolon)? {
            return Ok(());
        }
        if matches!(self.current.kind, TokenKind::RBrace | TokenKind::Eof) || self.current.newline_before {
            return Ok(());
        }
        Err(self.unexpected("';'"))
    }

    /// Takes an identifier, accepting the contextual keywords.
    fn expect_ident(&mut self, what: &str) -> Result<Rc<str>, Error> {
        match &self.current.kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance()?;
                Ok(name)
            }
            TokenKind::Keyword(kw) => {
                if let Some(name) = kw.as_ident() {
                    let name: Rc<str> = name.into();
                    self.advance()?;
                    Ok(name)
                } else {
                    Err(self.unexpected(what))
                }
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn enter(&mut self) -> Result<DepthGuard, Error> {
        self.depth += 1;
        if self.depth > MAX_PARSE_DEPTH {
            return Err(Error::parse(
                codes::PARSE_DEPTH,
                "program nesting is too deep",
                self.current.span,
            ));
        }
        Ok(DepthGuard)
    }

    fn leave(&mut self, _guard: DepthGuard) {
        self.depth -= 1;
    }

    fn snapshot(&self) -> (Lexer<'src>, Token, Span) {
        (self.lexer.clone(), self.current.clone(), self.prev_span)
    }

    fn restore(&mut self, state: (Lexer<'src>, Token, Span)) {
        self.lexer = state.0;
        self.current = state.1;
        self.prev_span = state.2;
    }

    // --- statements ---

    fn parse_stmt(&mut self) -> Result<Stmt, Error> {
        let guard = self.enter()?;
        let result = self.parse_stmt_inner();
        self.leave(guard);
        result
    }

    fn parse_stmt_inner(&mut self) -> Result<Stmt, Error> {
        let start = self.current.span;
        // Lookahead checks need `&mut self`, so they run before the match
        // borrows the current token.
        let async_function_decl =
            self.current.kind == TokenKind::Keyword(Keyword::Async) && self.is_async_function_decl();
        let import_expression =
            self.current.kind == TokenKind::Keyword(Keyword::Import) && self.import_is_expression();
        let kind = match &self.current.kind {
            TokenKind::Semicolon => {
                self.advance()?;
                StmtKind::Empty
            }
            TokenKind::LBrace => {
                self.advance()?;
                let body = self.parse_block_body()?;
                StmtKind::Block(body)
            }
            TokenKind::Keyword(kw) => match kw {
                Keyword::Var => self.parse_var_decl(DeclKind::Var)?,
                Keyword::Const => self.parse_var_decl(DeclKind::Const)?,
                Keyword::Let => {
                    // `let` is only a declaration when followed by a binding
                    // form; otherwise it is an ordinary identifier.
                    let state = self.snapshot();
                    self.advance()?;
                    let is_decl = matches!(
                        self.current.kind,
                        TokenKind::Ident(_) | TokenKind::LBracket | TokenKind::LBrace
                    );
                    self.restore(state);
                    if is_decl {
                        self.advance()?;
                        self.parse_var_decl_body(DeclKind::Let)?
                    } else {
                        let expr = self.parse_expr()?;
                        self.consume_semicolon()?;
                        StmtKind::Expr(expr)
                    }
                }
                Keyword::Function => {
                    self.advance()?;
                    let func = self.parse_function_tail(FunctionKind::Normal, true)?;
                    StmtKind::FunctionDecl(Rc::new(func))
                }
                Keyword::Async if async_function_decl => {
                    self.advance()?;
                    self.advance()?; // `function`
                    let func = self.parse_function_tail(FunctionKind::Async, true)?;
                    StmtKind::FunctionDecl(Rc::new(func))
                }
                Keyword::Class => {
                    self.advance()?;
                    let class = self.parse_class_tail(true)?;
                    StmtKind::ClassDecl(Rc::new(class))
                }
                Keyword::If => self.parse_if()?,
                Keyword::While => {
                    self.advance()?;
                    self.expect(&TokenKind::LParen, "'('")?;
                    let test = self.parse_expr()?;
                    self.expect(&TokenKind::RParen, "')'")?;
                    let body = Box::new(self.parse_stmt()?);
                    StmtKind::While { test, body }
                }
                Keyword::Do => {
                    self.advance()?;
                    let body = Box::new(self.parse_stmt()?);
                    if !self.eat_keyword(Keyword::While)? {
                        return Err(self.unexpected("'while'"));
                    }
                    self.expect(&TokenKind::LParen, "'('")?;
                    let test = self.parse_expr()?;
                    self.expect(&TokenKind::RParen, "')'")?;
                    self.eat(&TokenKind::Semicolon)?;
                    StmtKind::DoWhile { body, test }
                }
                Keyword::For => self.parse_for()?,
                Keyword::Break | Keyword::Continue => {
                    let is_break = *kw == Keyword::Break;
                    self.advance()?;
                    let label = if !self.current.newline_before
                        && let TokenKind::Ident(name) = &self.current.kind
                    {
                        let name = name.clone();
                        self.advance()?;
                        Some(name)
                    } else {
                        None
                    };
                    self.consume_semicolon()?;
                    if is_break {
                        StmtKind::Break(label)
                    } else {
                        StmtKind::Continue(label)
                    }
                }
                Keyword::Return => {
                    self.advance()?;
                    let arg = if matches!(self.current.kind, TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof)
                        || self.current.newline_before
                    {
                        None
                    } else {
                        Some(self.parse_expr()?)
                    };
                    self.consume_semicolon()?;
                    StmtKind::Return(arg)
                }
                Keyword::Throw => {
                    self.advance()?;
                    if self.current.newline_before {
                        return Err(Error::parse(
                            codes::PARSE_ERROR,
                            "newline is not allowed after 'throw'",
                            self.current.span,
                        ));
                    }
                    let arg = self.parse_expr()?;
                    self.consume_semicolon()?;
                    StmtKind::Throw(arg)
                }
                Keyword::Try => self.parse_try()?,
                Keyword::Switch => self.parse_switch()?,
                Keyword::With => {
                    self.advance()?;
                    self.expect(&TokenKind::LParen, "'('")?;
                    let object = self.parse_expr()?;
                    self.expect(&TokenKind::RParen, "')'")?;
                    let body = Box::new(self.parse_stmt()?);
                    StmtKind::With { object, body }
                }
                Keyword::Debugger => {
                    self.advance()?;
                    self.consume_semicolon()?;
                    StmtKind::Debugger
                }
                Keyword::Import if self.kind == SourceKind::Module && !import_expression => self.parse_import()?,
                Keyword::Export if self.kind == SourceKind::Module => self.parse_export()?,
                _ => {
                    let expr = self.parse_expr()?;
                    self.consume_semicolon()?;
                    StmtKind::Expr(expr)
                }
            },
            TokenKind::Ident(name) => {
                // Label: `name : stmt`.
                let name = name.clone();
                let state = self.snapshot();
                self.advance()?;
                if self.eat(&TokenKind::Colon)? {
                    let body = Box::new(self.parse_stmt()?);
                    StmtKind::Labeled { label: name, body }
                } else {
                    self.restore(state);
                    let expr = self.parse_expr()?;
                    self.consume_semicolon()?;
                    StmtKind::Expr(expr)
                }
            }
            _ => {
                let expr = self.parse_expr()?;
                self.consume_semicolon()?;
                StmtKind::Expr(expr)
            }
        };
        Ok(Stmt {
            kind,
            span: start.to(self.prev_span),
        })
    }

    fn is_async_function_decl(&mut self) -> bool {
        let state = self.snapshot();
        let result = (|| -> Result<bool, Error> {
            self.advance()?;
            Ok(self.current.kind == TokenKind::Keyword(Keyword::Function) && !self.current.newline_before)
        })();
        self.restore(state);
        result.unwrap_or(false)
    }

    /// Distinguishes `import(...)` / `import.meta` expressions from import
    /// declarations.
    fn import_is_expression(&mut self) -> bool {
        let state = self.snapshot();
        let result = (|| -> Result<bool, Error> {
            self.advance()?;
            Ok(matches!(self.current.kind, TokenKind::LParen | TokenKind::Dot))
        })();
        self.restore(state);
        result.unwrap_or(false)
    }

    fn parse_block_body(&mut self) -> Result<Vec<Stmt>, Error> {
        let mut body = Vec::new();
        while !matches!(self.current.kind, TokenKind::RBrace | TokenKind::Eof) {
            body.push(self.parse_stmt()?);
        }
        self.expect(&TokenKind::RBrace, "'}'")?;
        Ok(body)
    }

    fn parse_var_decl(&mut self, kind: DeclKind) -> Result<StmtKind, Error> {
        self.advance()?;
        self.parse_var_decl_body(kind)
    }

    fn parse_var_decl_body(&mut self, kind: DeclKind) -> Result<StmtKind, Error> {
        let declarators = self.parse_declarator_list()?;
        self.consume_semicolon()?;
        Ok(StmtKind::VarDecl { kind, declarators })
    }

    fn parse_declarator_list(&mut self) -> Result<Vec<Declarator>, Error> {
        let mut declarators = Vec::new();
        loop {
            let pattern = self.parse_binding_pattern()?;
            let init = if self.eat(&TokenKind::Eq)? {
                Some(self.parse_assignment_expr()?)
            } else {
                None
            };
            declarators.push(Declarator { pattern, init });
            if !self.eat(&TokenKind::Comma)? {
                break;
            }
        }
        Ok(declarators)
    }

    fn parse_if(&mut self) -> Result<StmtKind, Error> {
        self.advance()?;
        self.expect(&TokenKind::LParen, "'('")?;
        let test = self.parse_expr()?;
        self.expect(&TokenKind::RParen, "')'")?;
        let consequent = Box::new(self.parse_stmt()?);
        let alternate = if self.eat_keyword(Keyword::Else)? {
            Some(Box::new(self.parse_stmt()?))
        } else {
            None
        };
        Ok(StmtKind::If {
            test,
            consequent,
            alternate,
        })
    }

    fn parse_for(&mut self) -> Result<StmtKind, Error> {
        self.advance()?;
        let is_await = self.eat_keyword(Keyword::Await)?;
        self.expect(&TokenKind::LParen, "'('")?;

        // Empty init: `for (;;)`.
        if self.eat(&TokenKind::Semicolon)? {
            return self.parse_c_style_for(None, is_await);
        }

        let decl_kind = match self.current.kind {
            TokenKind::Keyword(Keyword::Var) => Some(DeclKind::Var),
            TokenKind::Keyword(Keyword::Let) => Some(DeclKind::Let),
            TokenKind::Keyword(Keyword::Const) => Some(DeclKind::Const),
            _ => None,
        };

        if let Some(kind) = decl_kind {
            self.advance()?;
            let pattern = self.parse_binding_pattern()?;
            if self.eat_keyword(Keyword::Of)? {
                let iterable = self.parse_assignment_expr()?;
                self.expect(&TokenKind::RParen, "')'")?;
                let body = Box::new(self.parse_stmt()?);
                return Ok(StmtKind::ForOf {
                    target: Box::new(ForTarget::Decl(kind, pattern)),
                    iterable,
                    body,
                    is_await,
                });
            }
            if self.eat_keyword(Keyword::In)? {
                let object = self.parse_expr()?;
                self.expect(&TokenKind::RParen, "')'")?;
                let body = Box::new(self.parse_stmt()?);
                return Ok(StmtKind::ForIn {
                    target: Box::new(ForTarget::Decl(kind, pattern)),
                    object,
                    body,
                });
            }
            // C-style with declaration init.
            let init = if self.eat(&TokenKind::Eq)? {
                Some(self.parse_assignment_expr()?)
            } else {
                None
            };
            let mut declarators = vec![Declarator { pattern, init }];
            while self.eat(&TokenKind::Comma)? {
                let pattern = self.parse_binding_pattern()?;
                let init = if self.eat(&TokenKind::Eq)? {
                    Some(self.parse_assignment_expr()?)
                } else {
                    None
                };
                declarators.push(Declarator { pattern, init });
            }
            self.expect(&TokenKind::Semicolon, "';'")?;
            return self.parse_c_style_for(Some(Box::new(ForInit::Decl(kind, declarators))), is_await);
        }

        // Expression init or assignment-target for-in/of.
        self.no_in = true;
        let expr = self.parse_expr();
        self.no_in = false;
        let expr = expr?;
        if self.eat_keyword(Keyword::Of)? {
            let pattern = self.expr_to_pattern(expr)?;
            let iterable = self.parse_assignment_expr()?;
            self.expect(&TokenKind::RParen, "')'")?;
            let body = Box::new(self.parse_stmt()?);
            return Ok(StmtKind::ForOf {
                target: Box::new(ForTarget::Assign(pattern)),
                iterable,
                body,
                is_await,
            });
        }
        if self.eat_keyword(Keyword::In)? {
            let pattern = self.expr_to_pattern(expr)?;
            let object = self.parse_expr()?;
            self.expect(&TokenKind::RParen, "')'")?;
            let body = Box::new(self.parse_stmt()?);
            return Ok(StmtKind::ForIn {
                target: Box::new(ForTarget::Assign(pattern)),
                object,
                body,
            });
        }
        self.expect(&TokenKind::Semicolon, "';'")?;
        self.parse_c_style_for(Some(Box::new(ForInit::Expr(expr))), is_await)
    }

    fn parse_c_style_for(&mut self, init: Option<Box<ForInit>>, is_await: bool) -> Result<StmtKind, Error> {
        if is_await {
            return Err(Error::parse(
                codes::PARSE_ERROR,
                "'for await' is only valid with 'of'",
                self.current.span,
            ));
        }
        let test = if self.current.kind == TokenKind::Semicolon {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(&TokenKind::Semicolon, "';'")?;
        let update = if self.current.kind == TokenKind::RParen {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(&TokenKind::RParen, "')'")?;
        let body = Box::new(self.parse_stmt()?);
        Ok(StmtKind::For {
            init,
            test,
            update,
            body,
        })
    }

    fn parse_try(&mut self) -> Result<StmtKind, Error> {
        self.advance()?;
        self.expect(&TokenKind::LBrace, "'{'")?;
        let block = self.parse_block_body()?;
        let handler = if self.eat_keyword(Keyword::Catch)? {
            let param = if self.eat(&TokenKind::LParen)? {
                let pattern = self.parse_binding_pattern()?;
                self.expect(&TokenKind::RParen, "')'")?;
                Some(pattern)
            } else {
                None
            };
            self.expect(&TokenKind::LBrace, "'{'")?;
            let body = self.parse_block_body()?;
            Some(CatchClause { param, body })
        } else {
            None
        };
        let finalizer = if self.eat_keyword(Keyword::Finally)? {
            self.expect(&TokenKind::LBrace, "'{'")?;
            Some(self.parse_block_body()?)
        } else {
            None
        };
        if handler.is_none() && finalizer.is_none() {
            return Err(Error::parse(
                codes::PARSE_ERROR,
                "'try' requires 'catch' or 'finally'",
                self.current.span,
            ));
        }
        Ok(StmtKind::Try {
            block,
            handler,
            finalizer,
        })
    }

    fn parse_switch(&mut self) -> Result<StmtKind, Error> {
        self.advance()?;
        self.expect(&TokenKind::LParen, "'('")?;
        let discriminant = self.parse_expr()?;
        self.expect(&TokenKind::RParen, "')'")?;
        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut cases = Vec::new();
        while !matches!(self.current.kind, TokenKind::RBrace | TokenKind::Eof) {
            let test = if self.eat_keyword(Keyword::Case)? {
                let test = self.parse_expr()?;
                Some(test)
            } else if self.eat_keyword(Keyword::Default)? {
                None
            } else {
                return Err(self.unexpected("'case' or 'default'"));
            };
            self.expect(&TokenKind::Colon, "':'")?;
            let mut body = Vec::new();
            while !matches!(
                self.current.kind,
                TokenKind::RBrace | TokenKind::Eof | TokenKind::Keyword(Keyword::Case) | TokenKind::Keyword(Keyword::Default)
            ) {
                body.push(self.parse_stmt()?);
            }
            cases.push(SwitchCase { test, body });
        }
        self.expect(&TokenKind::RBrace, "'}'")?;
        Ok(StmtKind::Switch { discriminant, cases })
    }

    // --- modules ---

    fn parse_import(&mut self) -> Result<StmtKind, Error> {
        self.advance()?;
        let mut specifiers = Vec::new();

        if let TokenKind::Str(source) = &self.current.kind {
            // Bare `import "m"` for side effects.
            let source = source.clone();
            self.advance()?;
            self.consume_semicolon()?;
            return Ok(StmtKind::Import(ImportDecl { specifiers, source }));
        }

        let mut expect_more = true;
        if let TokenKind::Ident(_) = &self.current.kind {
            let local = self.expect_ident("import binding")?;
            specifiers.push(ImportSpecifier::Default(local));
            expect_more = self.eat(&TokenKind::Comma)?;
        }
        if expect_more {
            if self.eat(&TokenKind::Star)? {
                if !self.eat_keyword(Keyword::As)? {
                    return Err(self.unexpected("'as'"));
                }
                let local = self.expect_ident("namespace binding")?;
                specifiers.push(ImportSpecifier::Namespace(local));
            } else if self.eat(&TokenKind::LBrace)? {
                while self.current.kind != TokenKind::RBrace {
                    let imported = self.parse_module_export_name()?;
                    let local = if self.eat_keyword(Keyword::As)? {
                        self.expect_ident("import binding")?
                    } else {
                        imported.clone()
                    };
                    specifiers.push(ImportSpecifier::Named { imported, local });
                    if !self.eat(&TokenKind::Comma)? {
                        break;
                    }
                }
                self.expect(&TokenKind::RBrace, "'}'")?;
            }
        }

        if !self.eat_keyword(Keyword::From)? {
            return Err(self.unexpected("'from'"));
        }
        let TokenKind::Str(source) = &self.current.kind else {
            return Err(self.unexpected("module specifier string"));
        };
        let source = source.clone();
        self.advance()?;
        self.consume_semicolon()?;
        Ok(StmtKind::Import(ImportDecl { specifiers, source }))
    }

    /// Export names may be identifiers, contextual keywords, or `default`.
    fn parse_module_export_name(&mut self) -> Result<Rc<str>, Error> {
        match &self.current.kind {
            TokenKind::Keyword(Keyword::Default) => {
                self.advance()?;
                Ok("default".into())
            }
            TokenKind::Str(name) => {
                let name = name.clone();
                self.advance()?;
                Ok(name)
            }
            _ => self.expect_ident("export name"),
        }
    }

    fn parse_export(&mut self) -> Result<StmtKind, Error> {
        self.advance()?;

        if self.eat(&TokenKind::Star)? {
            let exported = if self.eat_keyword(Keyword::As)? {
                Some(self.parse_module_export_name()?)
            } else {
                None
            };
            if !self.eat_keyword(Keyword::From)? {
                return Err(self.unexpected("'from'"));
            }
            let TokenKind::Str(source) = &self.current.kind else {
                return Err(self.unexpected("module specifier string"));
            };
            let source = source.clone();
            self.advance()?;
            self.consume_semicolon()?;
            return Ok(StmtKind::Export(ExportDecl::All { exported, source }));
        }

        if self.eat_keyword(Keyword::Default)? {
            let expr = self.parse_assignment_expr()?;
            self.consume_semicolon()?;
            return Ok(StmtKind::Export(ExportDecl::Default(Box::new(expr))));
        }

        if self.eat(&TokenKind::LBrace)? {
            let mut specifiers = Vec::new();
            while self.current.kind != TokenKind::RBrace {
                let local = self.parse_module_export_name()?;
                let exported = if self.eat_keyword(Keyword::As)? {
                    self.parse_module_export_name()?
                } else {
                    local.clone()
                };
                specifiers.push(ExportSpecifier { local, exported });
                if !self.eat(&TokenKind::Comma)? {
                    break;
                }
            }
            self.expect(&TokenKind::RBrace, "'}'")?;
            let source = if self.eat_keyword(Keyword::From)? {
                let TokenKind::Str(source) = &self.current.kind else {
                    return Err(self.unexpected("module specifier string"));
                };
                let source = source.clone();
                self.advance()?;
                Some(source)
            } else {
                None
            };
            self.consume_semicolon()?;
            return Ok(StmtKind::Export(ExportDecl::Named { specifiers, source }));
        }

        // `export <declaration>`.
        let decl = self.parse_stmt()?;
        if !matches!(
            decl.kind,
            StmtKind::VarDecl { .. } | StmtKind::FunctionDecl(_) | StmtKind::ClassDecl(_)
        ) {
            return Err(Error::parse(codes::PARSE_ERROR, "expected declaration after 'export'", decl.span));
        }
        Ok(StmtKind::Export(ExportDecl::Decl(Box::new(decl))))
    }

    // --- patterns ---

    fn parse_binding_pattern(&mut self) -> Result<Pattern, Error> {
        let pattern = self.parse_binding_pattern_core()?;
        if self.eat(&TokenKind::Eq)? {
            let default = self.parse_assignment_expr()?;
            return Ok(Pattern::Default {
                pattern: Box::new(pattern),
                default: Box::new(default),
            });
        }
        Ok(pattern)
    }

    fn parse_binding_pattern_core(&mut self) -> Result<Pattern, Error> {
        let start = self.current.span;
        match &self.current.kind {
            TokenKind::LBracket => {
                self.advance()?;
                let mut elements = Vec::new();
                let mut rest = None;
                while self.current.kind != TokenKind::RBracket {
                    if self.eat(&TokenKind::Comma)? {
                        elements.push(None);
                        continue;
                    }
                    if self.eat(&TokenKind::DotDotDot)? {
                        rest = Some(Box::new(self.parse_binding_pattern_core()?));
                        break;
                    }
                    elements.push(Some(self.parse_binding_pattern()?));
                    if self.current.kind != TokenKind::RBracket && !self.eat(&TokenKind::Comma)? {
                        return Err(self.unexpected("','"));
                    }
                }
                self.expect(&TokenKind::RBracket, "']'")?;
                Ok(Pattern::Array {
                    elements,
                    rest,
                    span: start.to(self.prev_span),
                })
            }
            TokenKind::LBrace => {
                self.advance()?;
                let mut props = Vec::new();
                let mut rest = None;
                while self.current.kind != TokenKind::RBrace {
                    if self.eat(&TokenKind::DotDotDot)? {
                        rest = Some(Box::new(self.parse_binding_pattern_core()?));
                        break;
                    }
                    let key = self.parse_prop_name(false)?;
                    let value = if self.eat(&TokenKind::Colon)? {
                        self.parse_binding_pattern()?
                    } else {
                        // Shorthand (optionally with default).
                        let name = match &key {
                            PropName::Ident(name) => name.clone(),
                            _ => return Err(self.unexpected("':'")),
                        };
                        let ident = Pattern::Ident(name, self.prev_span);
                        if self.eat(&TokenKind::Eq)? {
                            let default = self.parse_assignment_expr()?;
                            Pattern::Default {
                                pattern: Box::new(ident),
                                default: Box::new(default),
                            }
                        } else {
                            ident
                        }
                    };
                    props.push(ObjectPatternProp { key, value });
                    if !self.eat(&TokenKind::Comma)? {
                        break;
                    }
                }
                self.expect(&TokenKind::RBrace, "'}'")?;
                Ok(Pattern::Object {
                    props,
                    rest,
                    span: start.to(self.prev_span),
                })
            }
            _ => {
                let name = self.expect_ident("binding name")?;
                Ok(Pattern::Ident(name, start))
            }
        }
    }

    /// Converts an already-parsed expression into an assignment-target
    /// pattern (the cover-grammar resolution for destructuring assignment).
    fn expr_to_pattern(&mut self, expr: Expr) -> Result<Pattern, Error> {
        let span = expr.span;
        match expr.kind {
            ExprKind::Ident(name) => Ok(Pattern::Ident(name, span)),
            ExprKind::Member { .. } => Ok(Pattern::Member(Box::new(Expr {
                kind: expr.kind,
                span,
            }))),
            ExprKind::Assign {
                op: AssignOp::Assign,
                target,
                value,
            } => Ok(Pattern::Default {
                pattern: target,
                default: value,
            }),
            ExprKind::Array(elements) => {
                let mut out = Vec::new();
                let mut rest = None;
                let count = elements.len();
                for (index, element) in elements.into_iter().enumerate() {
                    match element {
                        None => out.push(None),
                        Some(ArrayElement::Item(item)) => out.push(Some(self.expr_to_pattern(item)?)),
                        Some(ArrayElement::Spread(inner)) => {
                            if index + 1 != count {
                                return Err(Error::parse(codes::PARSE_ERROR, "rest element must be last", span));
                            }
                            rest = Some(Box::new(self.expr_to_pattern(inner)?));
                        }
                    }
                }
                Ok(Pattern::Array {
                    elements: out,
                    rest,
                    span,
                })
            }
            ExprKind::Object(props) => {
                let mut out = Vec::new();
                let mut rest = None;
                let count = props.len();
                for (index, prop) in props.into_iter().enumerate() {
                    match prop {
                        ObjectProp::KeyValue { key, value } => out.push(ObjectPatternProp {
                            key,
                            value: self.expr_to_pattern(value)?,
                        }),
                        ObjectProp::Shorthand(name) => out.push(ObjectPatternProp {
                            key: PropName::Ident(name.clone()),
                            value: Pattern::Ident(name, span),
                        }),
                        ObjectProp::Spread(inner) => {
                            if index + 1 != count {
                                return Err(Error::parse(codes::PARSE_ERROR, "rest element must be last", span));
                            }
                            rest = Some(Box::new(self.expr_to_pattern(inner)?));
                        }
                        ObjectProp::Method { .. } => {
                            return Err(Error::parse(codes::PARSE_ERROR, "invalid destructuring target", span));
                        }
                    }
                }
                Ok(Pattern::Object {
                    props: out,
                    rest,
                    span,
                })
            }
            _ => Err(Error::parse(codes::PARSE_ERROR, "invalid assignment target", span)),
        }
    }

    // --- expressions ---

    fn parse_expr(&mut self) -> Result<Expr, Error> {
        let guard = self.enter()?;
        let result = self.parse_expr_inner();
        self.leave(guard);
        result
    }

    fn parse_expr_inner(&mut self) -> Result<Expr, Error> {
        let start = self.current.span;
        let first = self.parse_assignment_expr()?;
        if self.current.kind != TokenKind::Comma {
            return Ok(first);
        }
        let mut exprs = vec![first];
        while self.eat(&TokenKind::Comma)? {
            exprs.push(self.parse_assignment_expr()?);
        }
        Ok(Expr {
            kind: ExprKind::Sequence(exprs),
            span: start.to(self.prev_span),
        })
    }

    fn parse_assignment_expr(&mut self) -> Result<Expr, Error> {
        let guard = self.enter()?;
        let result = self.parse_assignment_inner();
        self.leave(guard);
        result
    }

    fn parse_assignment_inner(&mut self) -> Result<Expr, Error> {
        let start = self.current.span;

        // Arrow functions need lookahead before ordinary expression parsing.
        if let Some(expr) = self.try_parse_arrow()? {
            return Ok(expr);
        }

        if self.current.kind == TokenKind::Keyword(Keyword::Yield) {
            return self.parse_yield();
        }

        let left = self.parse_conditional()?;

        let op = match self.current.kind {
            TokenKind::Eq => AssignOp::Assign,
            TokenKind::PlusAssign => AssignOp::Add,
            TokenKind::MinusAssign => AssignOp::Sub,
            TokenKind::StarAssign => AssignOp::Mul,
            TokenKind::SlashAssign => AssignOp::Div,
            TokenKind::PercentAssign => AssignOp::Rem,
            TokenKind::StarStarAssign => AssignOp::Exp,
            TokenKind::ShlAssign => AssignOp::Shl,
            TokenKind::ShrAssign => AssignOp::Shr,
            TokenKind::UShrAssign => AssignOp::UShr,
            TokenKind::AmpAssign => AssignOp::BitAnd,
            TokenKind::PipeAssign => AssignOp::BitOr,
            TokenKind::CaretAssign => AssignOp::BitXor,
            TokenKind::AmpAmpAssign => AssignOp::AndAssign,
            TokenKind::PipePipeAssign => AssignOp::OrAssign,
            TokenKind::QuestionQuestionAssign => AssignOp::NullishAssign,
            _ => return Ok(left),
        };
        self.advance()?;
        let target = if op == AssignOp::Assign {
            self.expr_to_pattern(left)?
        } else {
            // Compound assignment requires a simple target.
            match left.kind {
                ExprKind::Ident(_) | ExprKind::Member { .. } => self.expr_to_pattern(left)?,
                _ => return Err(Error::parse(codes::PARSE_ERROR, "invalid assignment target", left.span)),
            }
        };
        let value = self.parse_assignment_expr()?;
        Ok(Expr {
            kind: ExprKind::Assign {
                op,
                target: Box::new(target),
                value: Box::new(value),
            },
            span: start.to(self.prev_span),
        })
    }

    fn parse_yield(&mut self) -> Result<Expr, Error> {
        let start = self.current.span;
        self.advance()?;
        let delegate = self.eat(&TokenKind::Star)?;
        let has_arg = delegate
            || !(self.current.newline_before
                || matches!(
                    self.current.kind,
                    TokenKind::Semicolon
                        | TokenKind::RParen
                        | TokenKind::RBrace
                        | TokenKind::RBracket
                        | TokenKind::Comma
                        | TokenKind::Colon
                        | TokenKind::Eof
                ));
        let arg = if has_arg {
            Some(Box::new(self.parse_assignment_expr()?))
        } else {
            None
        };
        Ok(Expr {
            kind: ExprKind::Yield { arg, delegate },
            span: start.to(self.prev_span),
        })
    }

    /// Attempts to parse an arrow function at the current position, restoring
    /// the parser state when the lookahead says otherwise.
    fn try_parse_arrow(&mut self) -> Result<Option<Expr>, Error> {
        enum Lead {
            Async,
            Plain,
        }
        let lead = match &self.current.kind {
            TokenKind::Keyword(Keyword::Async) => Lead::Async,
            TokenKind::Ident(_) | TokenKind::LParen => Lead::Plain,
            _ => return Ok(None),
        };
        let is_async = match lead {
            Lead::Async => {
                let state = self.snapshot();
                self.advance()?;
                let candidate = !self.current.newline_before
                    && matches!(self.current.kind, TokenKind::Ident(_) | TokenKind::LParen);
                if !candidate || !self.arrow_follows()? {
                    self.restore(state);
                    return Ok(None);
                }
                // `async` stays consumed; the params follow.
                true
            }
            Lead::Plain => {
                if !self.arrow_follows()? {
                    return Ok(None);
                }
                false
            }
        };

        let start = self.current.span;
        let params = if let TokenKind::Ident(_) = &self.current.kind {
            let name = self.expect_ident("parameter")?;
            vec![Param {
                pattern: Pattern::Ident(name, start),
                default: None,
                rest: false,
            }]
        } else {
            self.expect(&TokenKind::LParen, "'('")?;
            self.parse_params()?
        };
        self.expect(&TokenKind::Arrow, "'=>'")?;

        let kind = if is_async { FunctionKind::AsyncArrow } else { FunctionKind::Arrow };
        let body = if self.current.kind == TokenKind::LBrace {
            self.advance()?;
            FunctionBody::Block(self.parse_block_body()?)
        } else {
            FunctionBody::Expr(Box::new(self.parse_assignment_expr()?))
        };
        let span = start.to(self.prev_span);
        Ok(Some(Expr {
            kind: ExprKind::Function(Rc::new(Function {
                name: None,
                params,
                body,
                kind,
                span,
            })),
            span,
        }))
    }

    /// Lookahead: does the token run starting here form `params =>`?
    fn arrow_follows(&mut self) -> Result<bool, Error> {
        let state = self.snapshot();
        let result = (|| -> Result<bool, Error> {
            match &self.current.kind {
                TokenKind::Ident(_) => {
                    self.advance()?;
                    Ok(self.current.kind == TokenKind::Arrow && !self.current.newline_before)
                }
                TokenKind::LParen => {
                    self.advance()?;
                    let mut depth = 1u32;
                    while depth > 0 {
                        match self.current.kind {
                            TokenKind::LParen => depth += 1,
                            TokenKind::RParen => depth -= 1,
                            TokenKind::Eof => return Ok(false),
                            _ => {}
                        }
                        self.advance()?;
                    }
                    Ok(self.current.kind == TokenKind::Arrow && !self.current.newline_before)
                }
                _ => Ok(false),
            }
        })();
        self.restore(state);
        result
    }

    fn parse_conditional(&mut self) -> Result<Expr, Error> {
        let start = self.current.span;
        let test = self.parse_nullish()?;
        if !self.eat(&TokenKind::Question)? {
            return Ok(test);
        }
        let consequent = self.parse_assignment_expr()?;
        self.expect(&TokenKind::Colon, "':'")?;
        let alternate = self.parse_assignment_expr()?;
        Ok(Expr {
            kind: ExprKind::Conditional {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            },
            span: start.to(self.prev_span),
        })
    }

    fn parse_nullish(&mut self) -> Result<Expr, Error> {
        let start = self.current.span;
        let mut left = self.parse_logical_or()?;
        while self.eat(&TokenKind::QuestionQuestion)? {
            let right = self.parse_logical_or()?;
            left = Expr {
                kind: ExprKind::Logical {
                    op: LogicalOp::Nullish,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span: start.to(self.prev_span),
            };
        }
        Ok(left)
    }

    fn parse_logical_or(&mut self) -> Result<Expr, Error> {
        let start = self.current.span;
        let mut left = self.parse_logical_and()?;
        while self.eat(&TokenKind::PipePipe)? {
            let right = self.parse_logical_and()?;
            left = Expr {
                kind: ExprKind::Logical {
                    op: LogicalOp::Or,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span: start.to(self.prev_span),
            };
        }
        Ok(left)
    }

    fn parse_logical_and(&mut self) -> Result<Expr, Error> {
        let start = self.current.span;
        let mut left = self.parse_binary(0)?;
        while self.eat(&TokenKind::AmpAmp)? {
            let right = self.parse_binary(0)?;
            left = Expr {
                kind: ExprKind::Logical {
                    op: LogicalOp::And,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span: start.to(self.prev_span),
            };
        }
        Ok(left)
    }

    fn binary_op_of(&self) -> Option<(BinaryOp, u8, bool)> {
        // (operator, precedence, right-associative)
        let op = match self.current.kind {
            TokenKind::Pipe => (BinaryOp::BitOr, 1, false),
            TokenKind::Caret => (BinaryOp::BitXor, 2, false),
            TokenKind::Amp => (BinaryOp::BitAnd, 3, false),
            TokenKind::EqEq => (BinaryOp::Eq, 4, false),
            TokenKind::NotEq => (BinaryOp::NotEq, 4, false),
            TokenKind::EqEqEq => (BinaryOp::StrictEq, 4, false),
            TokenKind::NotEqEq => (BinaryOp::StrictNotEq, 4, false),
            TokenKind::Lt => (BinaryOp::Lt, 5, false),
            TokenKind::LtEq => (BinaryOp::LtEq, 5, false),
            TokenKind::Gt => (BinaryOp::Gt, 5, false),
            TokenKind::GtEq => (BinaryOp::GtEq, 5, false),
            TokenKind::Keyword(Keyword::In) if !self.no_in => (BinaryOp::In, 5, false),
            TokenKind::Keyword(Keyword::InstanceOf) => (BinaryOp::InstanceOf, 5, false),
            TokenKind::Shl => (BinaryOp::Shl, 6, false),
            TokenKind::Shr => (BinaryOp::Shr, 6, false),
            TokenKind::UShr => (BinaryOp::UShr, 6, false),
            TokenKind::Plus => (BinaryOp::Add, 7, false),
            TokenKind::Minus => (BinaryOp::Sub, 7, false),
            TokenKind::Star => (BinaryOp::Mul, 8, false),
            TokenKind::Slash => (BinaryOp::Div, 8, false),
            TokenKind::Percent => (BinaryOp::Rem, 8, false),
            TokenKind::StarStar => (BinaryOp::Exp, 9, true),
            _ => return None,
        };
        Some(op)
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr, Error> {
        let start = self.current.span;
        let mut left = self.parse_unary()?;
        while let Some((op, prec, right_assoc)) = self.binary_op_of() {
            if prec < min_prec {
                break;
            }
            self.advance()?;
            let next_min = if right_assoc { prec } else { prec + 1 };
            let right = self.parse_binary(next_min)?;
            left = Expr {
                kind: ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span: start.to(self.prev_span),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, Error> {
        let start = self.current.span;
        let op = match &self.current.kind {
            TokenKind::Minus => Some(UnaryOp::Minus),
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            TokenKind::Keyword(Keyword::TypeOf) => Some(UnaryOp::TypeOf),
            TokenKind::Keyword(Keyword::Void) => Some(UnaryOp::Void),
            TokenKind::Keyword(Keyword::Delete) => Some(UnaryOp::Delete),
            _ => None,
        };
        if let Some(op) = op {
            self.advance()?;
            let expr = self.parse_unary()?;
            return Ok(Expr {
                kind: ExprKind::Unary {
                    op,
                    expr: Box::new(expr),
                },
                span: start.to(self.prev_span),
            });
        }
        if self.current.kind == TokenKind::Keyword(Keyword::Await) {
            self.advance()?;
            let expr = self.parse_unary()?;
            return Ok(Expr {
                kind: ExprKind::Await(Box::new(expr)),
                span: start.to(self.prev_span),
            });
        }
        if matches!(self.current.kind, TokenKind::PlusPlus | TokenKind::MinusMinus) {
            let op = if self.current.kind == TokenKind::PlusPlus {
                UpdateOp::Increment
            } else {
                UpdateOp::Decrement
            };
            self.advance()?;
            let target = self.parse_unary()?;
            return Ok(Expr {
                kind: ExprKind::Update {
                    op,
                    prefix: true,
                    target: Box::new(target),
                },
                span: start.to(self.prev_span),
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, Error> {
        let start = self.current.span;
        let expr = self.parse_call_member()?;
        if !self.current.newline_before
            && matches!(self.current.kind, TokenKind::PlusPlus | TokenKind::MinusMinus)
        {
            let op = if self.current.kind == TokenKind::PlusPlus {
                UpdateOp::Increment
            } else {
                UpdateOp::Decrement
            };
            self.advance()?;
            return Ok(Expr {
                kind: ExprKind::Update {
                    op,
                    prefix: false,
                    target: Box::new(expr),
                },
                span: start.to(self.prev_span),
            });
        }
        Ok(expr)
    }

    fn parse_call_member(&mut self) -> Result<Expr, Error> {
        let start = self.current.span;
        let mut expr = if self.current.kind == TokenKind::Keyword(Keyword::New) {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };
        loop {
            match &self.current.kind {
                TokenKind::Dot => {
                    self.advance()?;
                    let property = self.parse_member_prop()?;
                    expr = Expr {
                        kind: ExprKind::Member {
                            object: Box::new(expr),
                            property,
                            optional: false,
                        },
                        span: start.to(self.prev_span),
                    };
                }
                TokenKind::QuestionDot => {
                    self.advance()?;
                    match &self.current.kind {
                        TokenKind::LParen => {
                            let args = self.parse_args()?;
                            expr = Expr {
                                kind: ExprKind::Call {
                                    callee: Box::new(expr),
                                    args,
                                    optional: true,
                                },
                                span: start.to(self.prev_span),
                            };
                        }
                        TokenKind::LBracket => {
                            self.advance()?;
                            let key = self.parse_expr()?;
                            self.expect(&TokenKind::RBracket, "']'")?;
                            expr = Expr {
                                kind: ExprKind::Member {
                                    object: Box::new(expr),
                                    property: MemberProp::Computed(Box::new(key)),
                                    optional: true,
                                },
                                span: start.to(self.prev_span),
                            };
                        }
                        _ => {
                            let property = self.parse_member_prop()?;
                            expr = Expr {
                                kind: ExprKind::Member {
                                    object: Box::new(expr),
                                    property,
                                    optional: true,
                                },
                                span: start.to(self.prev_span),
                            };
                        }
                    }
                }
                TokenKind::LBracket => {
                    self.advance()?;
                    let key = self.parse_expr()?;
                    self.expect(&TokenKind::RBracket, "']'")?;
                    expr = Expr {
                        kind: ExprKind::Member {
                            object: Box::new(expr),
                            property: MemberProp::Computed(Box::new(key)),
                            optional: false,
                        },
                        span: start.to(self.prev_span),
                    };
                }
                TokenKind::LParen => {
                    let args = self.parse_args()?;
                    expr = Expr {
                        kind: ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                            optional: false,
                        },
                        span: start.to(self.prev_span),
                    };
                }
                TokenKind::TemplateChunk { head: true, .. } => {
                    let quasi = self.parse_template()?;
                    expr = Expr {
                        kind: ExprKind::TaggedTemplate {
                            tag: Box::new(expr),
                            quasi,
                        },
                        span: start.to(self.prev_span),
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_member_prop(&mut self) -> Result<MemberProp, Error> {
        match &self.current.kind {
            TokenKind::PrivateIdent(name) => {
                let name = name.clone();
                self.advance()?;
                Ok(MemberProp::Private(name))
            }
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance()?;
                Ok(MemberProp::Ident(name))
            }
            // Keywords are valid member names: `obj.default`, `a.class`.
            TokenKind::Keyword(kw) => {
                let name: Rc<str> = kw.spelling().into();
                self.advance()?;
                Ok(MemberProp::Ident(name))
            }
            _ => Err(self.unexpected("property name")),
        }
    }

    fn parse_new(&mut self) -> Result<Expr, Error> {
        let start = self.current.span;
        self.advance()?; // `new`
        let mut callee = if self.current.kind == TokenKind::Keyword(Keyword::New) {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };
        // Member accesses bind tighter than the `new` arguments.
        loop {
            match &self.current.kind {
                TokenKind::Dot => {
                    self.advance()?;
                    let property = self.parse_member_prop()?;
                    callee = Expr {
                        kind: ExprKind::Member {
                            object: Box::new(callee),
                            property,
                            optional: false,
                        },
                        span: start.to(self.prev_span),
                    };
                }
                TokenKind::LBracket => {
                    self.advance()?;
                    let key = self.parse_expr()?;
                    self.expect(&TokenKind::RBracket, "']'")?;
                    callee = Expr {
                        kind: ExprKind::Member {
                            object: Box::new(callee),
                            property: MemberProp::Computed(Box::new(key)),
                            optional: false,
                        },
                        span: start.to(self.prev_span),
                    };
                }
                _ => break,
            }
        }
        let args = if self.current.kind == TokenKind::LParen {
            self.parse_args()?
        } else {
            Vec::new()
        };
        Ok(Expr {
            kind: ExprKind::New {
                callee: Box::new(callee),
                args,
            },
            span: start.to(self.prev_span),
        })
    }

    fn parse_args(&mut self) -> Result<Vec<Arg>, Error> {
        self.expect(&TokenKind::LParen, "'('")?;
        let mut args = Vec::new();
        while self.current.kind != TokenKind::RParen {
            if self.eat(&TokenKind::DotDotDot)? {
                args.push(Arg::Spread(self.parse_assignment_expr()?));
            } else {
                args.push(Arg::Item(self.parse_assignment_expr()?));
            }
            if !self.eat(&TokenKind::Comma)? {
                break;
            }
        }
        self.expect(&TokenKind::RParen, "')'")?;
        Ok(args)
    }

    fn parse_template(&mut self) -> Result<TemplateLiteral, Error> {
        let mut quasis = Vec::new();
        let mut exprs = Vec::new();
        loop {
            let TokenKind::TemplateChunk { cooked, raw, tail, .. } = &self.current.kind else {
                return Err(self.unexpected("template continuation"));
            };
            let tail = *tail;
            quasis.push(TemplateElement {
                cooked: cooked.clone(),
                raw: raw.clone(),
            });
            self.advance()?;
            if tail {
                break;
            }
            exprs.push(self.parse_expr()?);
            // The matching `}` resumes template lexing, so the next token is
            // the continuation chunk.
            if !matches!(self.current.kind, TokenKind::TemplateChunk { .. }) {
                return Err(self.unexpected("template continuation"));
            }
        }
        Ok(TemplateLiteral { quasis, exprs })
    }

    fn parse_primary(&mut self) -> Result<Expr, Error> {
        let guard = self.enter()?;
        let result = self.parse_primary_inner();
        self.leave(guard);
        result
    }

    fn parse_primary_inner(&mut self) -> Result<Expr, Error> {
        let start = self.current.span;

        // `/` at operand position starts a regex literal.
        if matches!(self.current.kind, TokenKind::Slash | TokenKind::SlashAssign) {
            self.current = self.lexer.relex_regex(&self.current)?;
        }

        let async_function_expr =
            self.current.kind == TokenKind::Keyword(Keyword::Async) && self.is_async_function_decl();
        let kind = match &self.current.kind {
            TokenKind::Num { value, .. } => {
                let value = *value;
                self.advance()?;
                ExprKind::Num(value)
            }
            TokenKind::BigInt(value) => {
                let value = value.clone();
                self.advance()?;
                ExprKind::BigInt(value)
            }
            TokenKind::Str(value) => {
                let value = value.clone();
                self.advance()?;
                ExprKind::Str(value)
            }
            TokenKind::Regex { pattern, flags } => {
                let (pattern, flags) = (pattern.clone(), flags.clone());
                self.advance()?;
                ExprKind::Regex { pattern, flags }
            }
            TokenKind::TemplateChunk { head: true, .. } => {
                let template = self.parse_template()?;
                ExprKind::Template(template)
            }
            TokenKind::LParen => {
                self.advance()?;
                // Parentheses reset the for-head `in` restriction.
                let saved_no_in = std::mem::replace(&mut self.no_in, false);
                let expr = self.parse_expr();
                self.no_in = saved_no_in;
                let expr = expr?;
                self.expect(&TokenKind::RParen, "')'")?;
                return Ok(expr);
            }
            TokenKind::LBracket => return self.parse_array_literal(),
            TokenKind::LBrace => return self.parse_object_literal(),
            TokenKind::PrivateIdent(name) => {
                // Only valid as `#x in obj`.
                let name = name.clone();
                self.advance()?;
                if !self.eat_keyword(Keyword::In)? {
                    return Err(self.unexpected("'in' after private name"));
                }
                let object = self.parse_unary()?;
                ExprKind::PrivateIn {
                    name,
                    object: Box::new(object),
                }
            }
            TokenKind::Keyword(kw) => match kw {
                Keyword::Null => {
                    self.advance()?;
                    ExprKind::Null
                }
                Keyword::True => {
                    self.advance()?;
                    ExprKind::Bool(true)
                }
                Keyword::False => {
                    self.advance()?;
                    ExprKind::Bool(false)
                }
                Keyword::This => {
                    self.advance()?;
                    ExprKind::This
                }
                Keyword::Function => {
                    self.advance()?;
                    let func = self.parse_function_tail(FunctionKind::Normal, false)?;
                    ExprKind::Function(Rc::new(func))
                }
                Keyword::Async if async_function_expr => {
                    self.advance()?;
                    self.advance()?;
                    let func = self.parse_function_tail(FunctionKind::Async, false)?;
                    ExprKind::Function(Rc::new(func))
                }
                Keyword::Class => {
                    self.advance()?;
                    let class = self.parse_class_tail(false)?;
                    ExprKind::Class(Rc::new(class))
                }
                Keyword::Super => {
                    self.advance()?;
                    match &self.current.kind {
                        TokenKind::LParen => {
                            let args = self.parse_args()?;
                            ExprKind::SuperCall(args)
                        }
                        TokenKind::Dot => {
                            self.advance()?;
                            let property = self.parse_member_prop()?;
                            ExprKind::SuperMember {
                                property: Box::new(property),
                            }
                        }
                        TokenKind::LBracket => {
                            self.advance()?;
                            let key = self.parse_expr()?;
                            self.expect(&TokenKind::RBracket, "']'")?;
                            ExprKind::SuperMember {
                                property: Box::new(MemberProp::Computed(Box::new(key))),
                            }
                        }
                        _ => return Err(self.unexpected("'(' or member access after 'super'")),
                    }
                }
                Keyword::Import => {
                    self.advance()?;
                    self.expect(&TokenKind::LParen, "'('")?;
                    let specifier = self.parse_assignment_expr()?;
                    self.expect(&TokenKind::RParen, "')'")?;
                    ExprKind::DynamicImport(Box::new(specifier))
                }
                _ => {
                    if let Some(name) = kw.as_ident() {
                        let name: Rc<str> = name.into();
                        self.advance()?;
                        ExprKind::Ident(name)
                    } else {
                        return Err(self.unexpected("an expression"));
                    }
                }
            },
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance()?;
                ExprKind::Ident(name)
            }
            _ => return Err(self.unexpected("an expression")),
        };
        Ok(Expr {
            kind,
            span: start.to(self.prev_span),
        })
    }

    fn parse_array_literal(&mut self) -> Result<Expr, Error> {
        let start = self.current.span;
        self.advance()?;
        let mut elements = Vec::new();
        while self.current.kind != TokenKind::RBracket {
            if self.current.kind == TokenKind::Comma {
                self.advance()?;
                elements.push(None);
                continue;
            }
            if self.eat(&TokenKind::DotDotDot)? {
                elements.push(Some(ArrayElement::Spread(self.parse_assignment_expr()?)));
            } else {
                elements.push(Some(ArrayElement::Item(self.parse_assignment_expr()?)));
            }
            if self.current.kind != TokenKind::RBracket && !self.eat(&TokenKind::Comma)? {
                return Err(self.unexpected("','"));
            }
        }
        self.expect(&TokenKind::RBracket, "']'")?;
        Ok(Expr {
            kind: ExprKind::Array(elements),
            span: start.to(self.prev_span),
        })
    }

    fn parse_object_literal(&mut self) -> Result<Expr, Error> {
        let start = self.current.span;
        self.advance()?;
        let mut props = Vec::new();
        while self.current.kind != TokenKind::RBrace {
            if self.eat(&TokenKind::DotDotDot)? {
                props.push(ObjectProp::Spread(self.parse_assignment_expr()?));
            } else {
                props.push(self.parse_object_prop()?);
            }
            if !self.eat(&TokenKind::Comma)? {
                break;
            }
        }
        self.expect(&TokenKind::RBrace, "'}'")?;
        Ok(Expr {
            kind: ExprKind::Object(props),
            span: start.to(self.prev_span),
        })
    }

    fn parse_object_prop(&mut self) -> Result<ObjectProp, Error> {
        // Accessor or async/generator method prefixes.
        for (kw, kind) in [(Keyword::Get, MethodKind::Getter), (Keyword::Set, MethodKind::Setter)] {
            if self.current.kind == TokenKind::Keyword(kw) {
                let state = self.snapshot();
                self.advance()?;
                if self.prop_name_follows() {
                    let key = self.parse_prop_name(true)?;
                    let func = self.parse_function_tail(
                        if kind == MethodKind::Getter { FunctionKind::Getter } else { FunctionKind::Setter },
                        false,
                    )?;
                    return Ok(ObjectProp::Method {
                        kind,
                        key,
                        func: Rc::new(func),
                    });
                }
                self.restore(state);
            }
        }

        let mut func_kind = None;
        if self.current.kind == TokenKind::Keyword(Keyword::Async) {
            let state = self.snapshot();
            self.advance()?;
            if !self.current.newline_before && (self.prop_name_follows() || self.current.kind == TokenKind::Star) {
                let is_generator = self.eat(&TokenKind::Star)?;
                func_kind = Some(if is_generator { FunctionKind::AsyncGenerator } else { FunctionKind::Async });
            } else {
                self.restore(state);
            }
        } else if self.eat(&TokenKind::Star)? {
            func_kind = Some(FunctionKind::Generator);
        }

        let key = self.parse_prop_name(true)?;
        if self.current.kind == TokenKind::LParen {
            let func = self.parse_function_tail(func_kind.unwrap_or(FunctionKind::Method), false)?;
            return Ok(ObjectProp::Method {
                kind: MethodKind::Method,
                key,
                func: Rc::new(func),
            });
        }
        if let Some(kind) = func_kind {
            let _ = kind;
            return Err(self.unexpected("'(' after method name"));
        }
        if self.eat(&TokenKind::Colon)? {
            let value = self.parse_assignment_expr()?;
            return Ok(ObjectProp::KeyValue { key, value });
        }
        match key {
            PropName::Ident(name) => Ok(ObjectProp::Shorthand(name)),
            _ => Err(self.unexpected("':'")),
        }
    }

    fn prop_name_follows(&self) -> bool {
        matches!(
            self.current.kind,
            TokenKind::Ident(_)
                | TokenKind::Keyword(_)
                | TokenKind::Str(_)
                | TokenKind::Num { .. }
                | TokenKind::LBracket
                | TokenKind::PrivateIdent(_)
        )
    }

    fn parse_prop_name(&mut self, allow_private: bool) -> Result<PropName, Error> {
        match &self.current.kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance()?;
                Ok(PropName::Ident(name))
            }
            TokenKind::Keyword(kw) => {
                let name: Rc<str> = kw.spelling().into();
                self.advance()?;
                Ok(PropName::Ident(name))
            }
            TokenKind::Str(value) => {
                let value = value.clone();
                self.advance()?;
                Ok(PropName::Str(value))
            }
            TokenKind::Num { value, .. } => {
                let value = *value;
                self.advance()?;
                Ok(PropName::Num(value))
            }
            TokenKind::LBracket => {
                self.advance()?;
                let expr = self.parse_assignment_expr()?;
                self.expect(&TokenKind::RBracket, "']'")?;
                Ok(PropName::Computed(Box::new(expr)))
            }
            TokenKind::PrivateIdent(name) if allow_private => {
                let name = name.clone();
                self.advance()?;
                Ok(PropName::Private(name))
            }
            _ => Err(self.unexpected("property name")),
        }
    }

    // --- functions & classes ---

    fn parse_params(&mut self) -> Result<Vec<Param>, Error> {
        let mut params = Vec::new();
        while self.current.kind != TokenKind::RParen {
            if self.eat(&TokenKind::DotDotDot)? {
                let pattern = self.parse_binding_pattern_core()?;
                params.push(Param {
                    pattern,
                    default: None,
                    rest: true,
                });
                break;
            }
            let pattern = self.parse_binding_pattern_core()?;
            let default = if self.eat(&TokenKind::Eq)? {
                Some(self.parse_assignment_expr()?)
            } else {
                None
            };
            params.push(Param {
                pattern,
                default,
                rest: false,
            });
            if !self.eat(&TokenKind::Comma)? {
                break;
            }
        }
        self.expect(&TokenKind::RParen, "')'")?;
        Ok(params)
    }

    /// Parses a function from (optionally) its name onward; the keyword(s)
    /// have already been consumed.
    fn parse_function_tail(&mut self, mut kind: FunctionKind, named_decl: bool) -> Result<Function, Error> {
        let start = self.current.span;
        if self.eat(&TokenKind::Star)? {
            kind = match kind {
                FunctionKind::Async => FunctionKind::AsyncGenerator,
                _ => FunctionKind::Generator,
            };
        }
        let name = if let TokenKind::Ident(name) = &self.current.kind {
            let name = name.clone();
            self.advance()?;
            Some(name)
        } else if named_decl {
            return Err(self.unexpected("function name"));
        } else {
            None
        };
        self.expect(&TokenKind::LParen, "'('")?;
        let params = self.parse_params()?;
        self.expect(&TokenKind::LBrace, "'{'")?;
        let body = FunctionBody::Block(self.parse_block_body()?);
        Ok(Function {
            name,
            params,
            body,
            kind,
            span: start.to(self.prev_span),
        })
    }

    fn parse_class_tail(&mut self, named_decl: bool) -> Result<ClassDef, Error> {
        let start = self.current.span;
        let name = if let TokenKind::Ident(name) = &self.current.kind {
            let name = name.clone();
            self.advance()?;
            Some(name)
        } else if named_decl {
            return Err(self.unexpected("class name"));
        } else {
            None
        };
        let parent = if self.eat_keyword(Keyword::Extends)? {
            Some(Box::new(self.parse_call_member()?))
        } else {
            None
        };
        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut members = Vec::new();
        while !matches!(self.current.kind, TokenKind::RBrace | TokenKind::Eof) {
            if self.eat(&TokenKind::Semicolon)? {
                continue;
            }
            members.push(self.parse_class_member()?);
        }
        self.expect(&TokenKind::RBrace, "'}'")?;
        Ok(ClassDef {
            name,
            parent,
            members,
            span: start.to(self.prev_span),
        })
    }

    fn parse_class_member(&mut self) -> Result<ClassMember, Error> {
        let start = self.current.span;

        let mut is_static = false;
        if self.current.kind == TokenKind::Keyword(Keyword::Static) {
            let state = self.snapshot();
            self.advance()?;
            if self.current.kind == TokenKind::LBrace {
                // Static initialization block.
                self.advance()?;
                let block = self.parse_block_body()?;
                return Ok(ClassMember {
                    kind: ClassMemberKind::StaticBlock,
                    is_static: true,
                    key: None,
                    func: None,
                    value: None,
                    block: Some(block),
                    span: start.to(self.prev_span),
                });
            }
            if self.prop_name_follows() || self.current.kind == TokenKind::Star {
                is_static = true;
            } else {
                self.restore(state);
            }
        }

        // Accessors.
        for (kw, member_kind, fk) in [
            (Keyword::Get, ClassMemberKind::Getter, FunctionKind::Getter),
            (Keyword::Set, ClassMemberKind::Setter, FunctionKind::Setter),
        ] {
            if self.current.kind == TokenKind::Keyword(kw) {
                let state = self.snapshot();
                self.advance()?;
                if self.prop_name_follows() {
                    let key = self.parse_prop_name(true)?;
                    let func = self.parse_function_tail(fk, false)?;
                    return Ok(ClassMember {
                        kind: member_kind,
                        is_static,
                        key: Some(key),
                        func: Some(Rc::new(func)),
                        value: None,
                        block: None,
                        span: start.to(self.prev_span),
                    });
                }
                self.restore(state);
            }
        }

        let mut func_kind = None;
        if self.current.kind == TokenKind::Keyword(Keyword::Async) {
            let state = self.snapshot();
            self.advance()?;
            if !self.current.newline_before && (self.prop_name_follows() || self.current.kind == TokenKind::Star) {
                let is_generator = self.eat(&TokenKind::Star)?;
                func_kind = Some(if is_generator { FunctionKind::AsyncGenerator } else { FunctionKind::Async });
            } else {
                self.restore(state);
            }
        } else if self.eat(&TokenKind::Star)? {
            func_kind = Some(FunctionKind::Generator);
        }

        let key = self.parse_prop_name(true)?;

        if self.current.kind == TokenKind::LParen {
            let func = self.parse_function_tail(func_kind.unwrap_or(FunctionKind::Method), false)?;
            return Ok(ClassMember {
                kind: ClassMemberKind::Method,
                is_static,
                key: Some(key),
                func: Some(Rc::new(func)),
                value: None,
                block: None,
                span: start.to(self.prev_span),
            });
        }
        if func_kind.is_some() {
            return Err(self.unexpected("'(' after method name"));
        }

        // Field, with or without initializer.
        let value = if self.eat(&TokenKind::Eq)? {
            Some(self.parse_assignment_expr()?)
        } else {
            None
        };
        self.consume_semicolon()?;
        Ok(ClassMember {
            kind: ClassMemberKind::Field,
            is_static,
            key: Some(key),
            func: None,
            value,
            block: None,
            span: start.to(self.prev_span),
        })
    }
}

struct DepthGuard;

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_script(src: &str) -> Program {
        parse(src, SourceKind::Script).unwrap()
    }

    #[test]
    fn parses_let_declaration() {
        let program = parse_script("let x = 1;");
        assert_eq!(program.body.len(), 1);
        assert!(matches!(
            &program.body[0].kind,
            StmtKind::VarDecl { kind: DeclKind::Let, .. }
        ));
    }

    #[test]
    fn parses_arrow_with_lookahead() {
        let program = parse_script("const f = (a, b) => a + b;");
        let StmtKind::VarDecl { declarators, .. } = &program.body[0].kind else {
            panic!("expected declaration");
        };
        let Some(Expr {
            kind: ExprKind::Function(func),
            ..
        }) = &declarators[0].init
        else {
            panic!("expected arrow function initializer");
        };
        assert_eq!(func.kind, FunctionKind::Arrow);
        assert_eq!(func.params.len(), 2);
    }

    #[test]
    fn parenthesized_expression_is_not_an_arrow() {
        let program = parse_script("(a, b);");
        assert!(matches!(
            &program.body[0].kind,
            StmtKind::Expr(Expr {
                kind: ExprKind::Sequence(_),
                ..
            })
        ));
    }

    #[test]
    fn optional_chain_segments() {
        let program = parse_script("a?.b.c?.(1)?.[k];");
        let StmtKind::Expr(expr) = &program.body[0].kind else {
            panic!("expected expression");
        };
        assert!(matches!(
            expr.kind,
            ExprKind::Member { optional: true, .. }
        ));
    }

    #[test]
    fn for_of_with_destructuring() {
        let program = parse_script("for (const [a, b] of pairs) {}");
        let StmtKind::ForOf { target, .. } = &program.body[0].kind else {
            panic!("expected for..of");
        };
        assert!(matches!(**target, ForTarget::Decl(DeclKind::Const, Pattern::Array { .. })));
    }

    #[test]
    fn class_with_private_and_static_members() {
        let program = parse_script(
            "class C extends B { #x = 1; static #count; constructor() { super(); } get x() { return this.#x; } static { C.ready = true; } }",
        );
        let StmtKind::ClassDecl(class) = &program.body[0].kind else {
            panic!("expected class");
        };
        assert_eq!(class.members.len(), 5);
        assert!(matches!(class.members[4].kind, ClassMemberKind::StaticBlock));
    }

    #[test]
    fn regex_at_operand_position() {
        let program = parse_script("const re = /a+b/gi; x / 2;");
        let StmtKind::VarDecl { declarators, .. } = &program.body[0].kind else {
            panic!("expected declaration");
        };
        assert!(matches!(
            declarators[0].init.as_ref().unwrap().kind,
            ExprKind::Regex { .. }
        ));
        assert!(matches!(
            &program.body[1].kind,
            StmtKind::Expr(Expr {
                kind: ExprKind::Binary { op: BinaryOp::Div, .. },
                ..
            })
        ));
    }

    #[test]
    fn asi_inserts_semicolons_at_newlines() {
        let program = parse_script("let a = 1\nlet b = 2\nreturn_like()");
        assert_eq!(program.body.len(), 3);
    }

    #[test]
    fn template_literal_parses_holes() {
        let program = parse_script("`sum: ${1 + 2}!`;");
        let StmtKind::Expr(Expr {
            kind: ExprKind::Template(template),
            ..
        }) = &program.body[0].kind
        else {
            panic!("expected template");
        };
        assert_eq!(template.quasis.len(), 2);
        assert_eq!(template.exprs.len(), 1);
    }

    #[test]
    fn module_import_export_forms() {
        let program = parse(
            "import d, { a as b } from \"m\";\nimport * as ns from \"n\";\nexport { x } from \"k\";\nexport default 5;\nexport const y = 1;",
            SourceKind::Module,
        )
        .unwrap();
        assert_eq!(program.body.len(), 5);
        assert!(matches!(&program.body[3].kind, StmtKind::Export(ExportDecl::Default(_))));
    }

    #[test]
    fn for_in_with_assignment_target() {
        let program = parse_script("var k; for (k in {a: 1}) {}");
        assert!(matches!(&program.body[1].kind, StmtKind::ForIn { .. }));
        // Outside a for-head, `in` stays a relational operator.
        let program = parse_script("'a' in obj;");
        assert!(matches!(
            &program.body[0].kind,
            StmtKind::Expr(Expr {
                kind: ExprKind::Binary { op: BinaryOp::In, .. },
                ..
            })
        ));
    }

    #[test]
    fn depth_guard_rejects_pathological_nesting() {
        let source = format!("{}1{}", "(".repeat(600), ")".repeat(600));
        let err = parse(&source, SourceKind::Script).unwrap_err();
        assert_eq!(err.code, codes::PARSE_DEPTH);
    }

    #[test]
    fn destructuring_assignment_via_cover_grammar() {
        let program = parse_script("[a, ...rest] = xs; ({x: {y}} = o);");
        assert!(matches!(
            &program.body[0].kind,
            StmtKind::Expr(Expr {
                kind: ExprKind::Assign { .. },
                ..
            })
        ));
    }
}
