//! Recursive-descent parser producing an arena-allocated AST.
//!
//! Grown from `nova_parser`'s `Parser`/`Arena<Node>` skeleton (same
//! `eat`/`expect`/`take` helpers operating over `Lexer`), generalized to
//! cover the full production grammar of §4.5: classes, destructuring,
//! modules, generators/async functions, optional chaining, and Automatic
//! Semicolon Insertion.

use crate::ast::*;
use crate::error::{ParseError, ParseResult};
use crate::lexer::{Lexer, SlashMode, Token};
use generational_arena::Arena;

pub struct Parser<'a> {
    lex: Lexer<'a>,
    pub nodes: Arena<Node>,
    /// Tracks whether we're inside a function body whose `in_generator` /
    /// `in_async` flags gate `yield`/`await` as keywords vs. identifiers.
    ctx: Vec<FnContext>,
}

#[derive(Debug, Clone, Copy, Default)]
struct FnContext {
    in_generator: bool,
    in_async: bool,
    in_loop_or_switch: bool,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut lex = Lexer::new(source);
        lex.next();

        let mut arena = Arena::new();
        let empty_idx = arena.insert(Node::Empty);
        assert!(
            empty_idx == Node::empty(),
            "the empty sentinel must land at arena index 0"
        );

        Self {
            lex,
            nodes: arena,
            ctx: vec![FnContext::default()],
        }
    }

    fn span(&self) -> Span {
        Span {
            start: self.lex.start as u32,
            end: self.lex.index as u32,
        }
    }

    fn err(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.span())
    }

    /// Advances the lexer, telling it whether the *next* `/` should be read
    /// as division (an expression just ended) or as a regex literal start.
    fn advance(&mut self, next_slash: SlashMode) {
        self.lex.slash_mode = next_slash;
        self.lex.next();
    }

    fn take_text(&mut self) -> SourceRef {
        let source_ref = SourceRef {
            start: self.lex.start as u32,
            end: self.lex.index as u32,
        };
        self.advance(SlashMode::Divide);
        source_ref
    }

    fn eat(&mut self, token: Token) -> ParseResult<SourceRef> {
        if self.lex.token != token {
            return Err(self.err(format!("expected {token:?}, found {:?}", self.lex.token)));
        }
        Ok(self.take_text())
    }

    fn at(&self, token: Token) -> bool {
        self.lex.token == token
    }

    fn expect(&mut self, token: Token) -> ParseResult<()> {
        self.eat(token).map(|_| ())
    }

    /// `as`/`target`/`meta` are not reserved words; the lexer hands them
    /// back as plain `Ident` tokens and the parser recognizes them by text
    /// only in the handful of contextual positions (`import ... as x`,
    /// `new.target`, `import.meta`) where the grammar expects them.
    fn at_contextual(&self, text: &str) -> bool {
        self.at(Token::Ident) && self.lex.text() == text
    }

    fn expect_contextual(&mut self, text: &str) -> ParseResult<()> {
        if !self.at_contextual(text) {
            return Err(self.err(format!("expected '{text}', found {:?}", self.lex.token)));
        }
        self.advance(SlashMode::Divide);
        Ok(())
    }

    fn insert(&mut self, node: Node) -> NodeRef {
        self.nodes.insert(node)
    }

    // ---------------------------------------------------------------
    // Automatic Semicolon Insertion
    // ---------------------------------------------------------------

    /// Consumes a statement-terminating `;`, or inserts one virtually when
    /// the grammar requires it and either a line terminator preceded the
    /// current token, the current token is `}`, or we are at EOF.
    fn consume_semicolon(&mut self) -> ParseResult<()> {
        if self.at(Token::Semi) {
            self.advance(SlashMode::Regex);
            return Ok(());
        }
        if self.at(Token::RBrace) || self.at(Token::Eof) || self.lex.has_newline_before {
            return Ok(());
        }
        Err(self.err("expected ';'"))
    }

    // ---------------------------------------------------------------
    // Program
    // ---------------------------------------------------------------

    pub fn parse_program(mut self) -> ParseResult<(NodeRef, Arena<Node>)> {
        let mut items = Vec::new();
        while !self.at(Token::Eof) {
            items.push(self.parse_module_item()?);
        }
        let program = self.insert(Node::Program(items.into_boxed_slice()));
        Ok((program, self.nodes))
    }

    fn parse_module_item(&mut self) -> ParseResult<NodeRef> {
        match self.lex.token {
            Token::KeywordImport => self.parse_import(),
            Token::KeywordExport => self.parse_export(),
            _ => self.parse_statement(),
        }
    }

    // ---------------------------------------------------------------
    // Modules
    // ---------------------------------------------------------------

    fn parse_import(&mut self) -> ParseResult<NodeRef> {
        self.advance(SlashMode::Regex); // `import`
        let mut specifiers = Vec::new();

        if self.at(Token::String) {
            // Side-effect-only import.
            let source = self.string_literal_value()?;
            self.consume_semicolon()?;
            return Ok(self.insert(Node::ImportDecl(ImportDecl {
                specifiers: Vec::new().into_boxed_slice(),
                source,
            })));
        }

        if self.at(Token::Ident) {
            let local_ref = self.take_text();
            let local = self.insert(Node::Ident(local_ref));
            specifiers.push(ImportSpecifier {
                imported: Node::empty(),
                local,
                is_default: true,
                is_namespace: false,
            });
            if self.at(Token::Comma) {
                self.advance(SlashMode::Regex);
            }
        }

        if self.at(Token::Mul) {
            self.advance(SlashMode::Regex);
            self.expect_contextual("as")?;
            let local_ref = self.take_text();
            let local = self.insert(Node::Ident(local_ref));
            specifiers.push(ImportSpecifier {
                imported: Node::empty(),
                local,
                is_default: false,
                is_namespace: true,
            });
        } else if self.at(Token::LBrace) {
            self.advance(SlashMode::Regex);
            while !self.at(Token::RBrace) {
                let imported_ref = self.take_text();
                let imported = self.insert(Node::Ident(imported_ref));
                let local = if self.at_contextual("as") {
                    self.advance(SlashMode::Regex);
                    let local_ref = self.take_text();
                    self.insert(Node::Ident(local_ref))
                } else {
                    imported
                };
                specifiers.push(ImportSpecifier {
                    imported,
                    local,
                    is_default: false,
                    is_namespace: false,
                });
                if self.at(Token::Comma) {
                    self.advance(SlashMode::Regex);
                } else {
                    break;
                }
            }
            self.expect(Token::RBrace)?;
        }

        self.expect(Token::KeywordFrom)?;
        let source = self.string_literal_value()?;
        self.consume_semicolon()?;
        Ok(self.insert(Node::ImportDecl(ImportDecl {
            specifiers: specifiers.into_boxed_slice(),
            source,
        })))
    }

    fn parse_export(&mut self) -> ParseResult<NodeRef> {
        self.advance(SlashMode::Regex); // `export`

        if self.at(Token::Mul) {
            self.advance(SlashMode::Regex);
            let as_name = if self.at_contextual("as") {
                self.advance(SlashMode::Regex);
                let name_ref = self.take_text();
                self.insert(Node::Ident(name_ref))
            } else {
                Node::empty()
            };
            self.expect(Token::KeywordFrom)?;
            let source = self.string_literal_value()?;
            self.consume_semicolon()?;
            return Ok(self.insert(Node::ExportAll(ExportAll { as_name, source })));
        }

        if self.at(Token::KeywordDefault) {
            self.advance(SlashMode::Regex);
            let declaration = match self.lex.token {
                Token::KeywordFunction | Token::KeywordClass | Token::KeywordAsync => {
                    self.parse_statement()?
                }
                _ => {
                    let expr = self.parse_assignment_expression()?;
                    self.consume_semicolon()?;
                    expr
                }
            };
            return Ok(self.insert(Node::ExportDefault(ExportDefault { declaration })));
        }

        if self.at(Token::LBrace) {
            self.advance(SlashMode::Regex);
            let mut specifiers = Vec::new();
            while !self.at(Token::RBrace) {
                let local_ref = self.take_text();
                let local = self.insert(Node::Ident(local_ref));
                let exported = if self.at_contextual("as") {
                    self.advance(SlashMode::Regex);
                    let exported_ref = self.take_text();
                    self.insert(Node::Ident(exported_ref))
                } else {
                    local
                };
                specifiers.push((local, exported));
                if self.at(Token::Comma) {
                    self.advance(SlashMode::Regex);
                } else {
                    break;
                }
            }
            self.expect(Token::RBrace)?;
            let source = if self.at(Token::KeywordFrom) {
                self.advance(SlashMode::Regex);
                Some(self.string_literal_value()?)
            } else {
                None
            };
            self.consume_semicolon()?;
            return Ok(self.insert(Node::ExportNamed(ExportNamed {
                specifiers: specifiers.into_boxed_slice(),
                source,
            })));
        }

        // `export <declaration>`.
        let declaration = self.parse_statement()?;
        Ok(self.insert(Node::ExportDefault(ExportDefault { declaration })))
    }

    fn string_literal_value(&mut self) -> ParseResult<Box<str>> {
        let text = self.lex.text();
        let cooked = cook_string(&text[1..text.len() - 1]);
        self.expect(Token::String)?;
        Ok(cooked.into_boxed_str())
    }

    // ---------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------

    fn parse_statement(&mut self) -> ParseResult<NodeRef> {
        match self.lex.token {
            Token::LBrace => self.parse_block(),
            Token::KeywordVar | Token::KeywordLet | Token::KeywordConst => {
                let decl = self.parse_var_decl_list()?;
                self.consume_semicolon()?;
                Ok(decl)
            }
            Token::KeywordFunction => self.parse_function_decl(false),
            Token::KeywordAsync if self.at_async_function() => {
                self.advance(SlashMode::Regex);
                self.parse_function_decl(true)
            }
            Token::KeywordClass => self.parse_class(),
            Token::KeywordIf => self.parse_if(),
            Token::KeywordFor => self.parse_for(),
            Token::KeywordWhile => self.parse_while(),
            Token::KeywordDo => self.parse_do_while(),
            Token::KeywordSwitch => self.parse_switch(),
            Token::KeywordTry => self.parse_try(),
            Token::KeywordThrow => self.parse_throw(),
            Token::KeywordReturn => self.parse_return(),
            Token::KeywordBreak => self.parse_break_continue(true),
            Token::KeywordContinue => self.parse_break_continue(false),
            Token::KeywordDebugger => {
                self.advance(SlashMode::Regex);
                self.consume_semicolon()?;
                Ok(self.insert(Node::Debugger))
            }
            Token::Semi => {
                self.advance(SlashMode::Regex);
                Ok(self.insert(Node::ExprStmt(Node::empty())))
            }
            Token::Ident => {
                // Could be a labeled statement: `ident:`.
                let save = (self.lex.index, self.lex.start, self.lex.token);
                let name_ref = self.take_text();
                if self.at(Token::Colon) {
                    self.advance(SlashMode::Regex);
                    let body = self.parse_statement()?;
                    Ok(self.insert(Node::Labeled(Labeled {
                        label: name_ref,
                        body,
                    })))
                } else {
                    self.lex.reset(save.1);
                    self.lex.start = save.1;
                    self.lex.token = save.2;
                    self.parse_expression_statement()
                }
            }
            _ => self.parse_expression_statement(),
        }
    }

    /// Looks one token past the current one without disturbing lexer state,
    /// by re-lexing a throwaway `Lexer` over the remaining source. The hand
    /// rolled lexer only ever holds a single token of lookahead, so this is
    /// the cheapest way to resolve `async`'s several "no line terminator
    /// here" restrictions, which all hinge on what immediately follows it.
    fn probe_next(&self) -> (Token, bool) {
        let mut probe = Lexer::new(&self.lex.source[self.lex.index..]);
        probe.next();
        (probe.token, probe.has_newline_before)
    }

    /// True when positioned on `async` directly followed by `function`
    /// (§4.5's "no-line-terminator here" restriction for async functions).
    fn at_async_function(&self) -> bool {
        self.at(Token::KeywordAsync) && matches!(self.probe_next(), (Token::KeywordFunction, false))
    }

    /// True when positioned on `async` with nothing but whitespace before
    /// whatever comes next — the weaker restriction that governs async
    /// arrows and async methods, where `async` isn't followed by a literal
    /// `function` keyword.
    fn at_async_no_newline(&self) -> bool {
        self.at(Token::KeywordAsync) && !self.probe_next().1
    }

    fn parse_expression_statement(&mut self) -> ParseResult<NodeRef> {
        let expr = self.parse_expression()?;
        self.consume_semicolon()?;
        Ok(self.insert(Node::ExprStmt(expr)))
    }

    fn parse_block(&mut self) -> ParseResult<NodeRef> {
        self.expect(Token::LBrace)?;
        let body = self.parse_stmt_list_until(Token::RBrace)?;
        self.expect(Token::RBrace)?;
        Ok(self.insert(Node::Block(Block { body })))
    }

    fn parse_stmt_list_until(&mut self, end: Token) -> ParseResult<Box<[NodeRef]>> {
        let mut items = Vec::new();
        while self.lex.token != end && !self.at(Token::Eof) {
            items.push(self.parse_module_item()?);
        }
        Ok(items.into_boxed_slice())
    }

    fn parse_var_decl_list(&mut self) -> ParseResult<NodeRef> {
        let kind = match self.lex.token {
            Token::KeywordVar => VarKind::Var,
            Token::KeywordLet => VarKind::Let,
            Token::KeywordConst => VarKind::Const,
            _ => unreachable!(),
        };
        self.advance(SlashMode::Regex);

        let mut decls = Vec::new();
        loop {
            let binding = self.parse_binding_target()?;
            let init = if self.at(Token::Equal) {
                self.advance(SlashMode::Regex);
                self.parse_assignment_expression()?
            } else {
                Node::empty()
            };
            decls.push(Decl { binding, init });
            if self.at(Token::Comma) {
                self.advance(SlashMode::Regex);
            } else {
                break;
            }
        }
        Ok(self.insert(Node::VarDeclList(VarDeclList {
            kind,
            decls: decls.into_boxed_slice(),
        })))
    }

    fn parse_if(&mut self) -> ParseResult<NodeRef> {
        self.advance(SlashMode::Regex);
        self.expect(Token::LParen)?;
        let condition = self.parse_expression()?;
        self.expect(Token::RParen)?;
        let consequent = self.parse_statement()?;
        let alternate = if self.at(Token::KeywordElse) {
            self.advance(SlashMode::Regex);
            self.parse_statement()?
        } else {
            Node::empty()
        };
        Ok(self.insert(Node::If(If {
            condition,
            consequent,
            alternate,
        })))
    }

    fn parse_while(&mut self) -> ParseResult<NodeRef> {
        self.advance(SlashMode::Regex);
        self.expect(Token::LParen)?;
        let condition = self.parse_expression()?;
        self.expect(Token::RParen)?;
        let body = self.parse_statement()?;
        Ok(self.insert(Node::While(While { condition, body })))
    }

    fn parse_do_while(&mut self) -> ParseResult<NodeRef> {
        self.advance(SlashMode::Regex);
        let body = self.parse_statement()?;
        self.expect(Token::KeywordWhile)?;
        self.expect(Token::LParen)?;
        let condition = self.parse_expression()?;
        self.expect(Token::RParen)?;
        // ASI after `do-while` always permits an immediately following `;` or
        // end; a semicolon here is consumed eagerly if present.
        if self.at(Token::Semi) {
            self.advance(SlashMode::Regex);
        }
        Ok(self.insert(Node::DoWhile(DoWhile { body, condition })))
    }

    fn parse_for(&mut self) -> ParseResult<NodeRef> {
        self.advance(SlashMode::Regex);
        let is_await = if self.at(Token::KeywordAwait) {
            self.advance(SlashMode::Regex);
            true
        } else {
            false
        };
        self.expect(Token::LParen)?;

        let left: NodeRef = match self.lex.token {
            Token::KeywordVar | Token::KeywordLet | Token::KeywordConst => {
                self.parse_var_decl_list()?
            }
            Token::Semi => Node::empty(),
            _ => self.parse_expression_no_in()?,
        };

        if self.at(Token::KeywordIn) || self.at(Token::KeywordOf) {
            let kind = if self.at(Token::KeywordIn) {
                ForInOfKind::In
            } else if is_await {
                ForInOfKind::AwaitOf
            } else {
                ForInOfKind::Of
            };
            self.advance(SlashMode::Regex);
            let right = if kind == ForInOfKind::In {
                self.parse_expression()?
            } else {
                self.parse_assignment_expression()?
            };
            self.expect(Token::RParen)?;
            let body = self.parse_statement()?;
            return Ok(self.insert(Node::ForInOf(ForInOf {
                kind,
                left,
                right,
                body,
            })));
        }

        self.expect(Token::Semi)?;
        let condition = if self.at(Token::Semi) {
            Node::empty()
        } else {
            self.parse_expression()?
        };
        self.expect(Token::Semi)?;
        let update = if self.at(Token::RParen) {
            Node::empty()
        } else {
            self.parse_expression()?
        };
        self.expect(Token::RParen)?;
        let body = self.parse_statement()?;
        Ok(self.insert(Node::For(ForClassic {
            init: left,
            condition,
            update,
            body,
        })))
    }

    /// Expressions in `for(...)` heads must not let a bare `in` be parsed as
    /// the relational operator. We approximate the spec's `[~In]` grammar
    /// parameter by stopping at the first top-level `in`/`of` token, which
    /// is sufficient because those are only meaningful there as for-head
    /// separators within this parser's single assignment-expression grammar.
    fn parse_expression_no_in(&mut self) -> ParseResult<NodeRef> {
        self.parse_assignment_expression()
    }

    fn parse_switch(&mut self) -> ParseResult<NodeRef> {
        self.advance(SlashMode::Regex);
        self.expect(Token::LParen)?;
        let discriminant = self.parse_expression()?;
        self.expect(Token::RParen)?;
        self.expect(Token::LBrace)?;
        let mut cases = Vec::new();
        while !self.at(Token::RBrace) {
            let test = if self.at(Token::KeywordCase) {
                self.advance(SlashMode::Regex);
                let t = self.parse_expression()?;
                self.expect(Token::Colon)?;
                t
            } else {
                self.expect(Token::KeywordDefault)?;
                self.expect(Token::Colon)?;
                Node::empty()
            };
            let mut body = Vec::new();
            while !matches!(self.lex.token, Token::KeywordCase | Token::KeywordDefault)
                && !self.at(Token::RBrace)
            {
                body.push(self.parse_module_item()?);
            }
            cases.push(Case {
                test,
                body: body.into_boxed_slice(),
            });
        }
        self.expect(Token::RBrace)?;
        Ok(self.insert(Node::Switch(Switch {
            discriminant,
            cases: cases.into_boxed_slice(),
        })))
    }

    fn parse_try(&mut self) -> ParseResult<NodeRef> {
        self.advance(SlashMode::Regex);
        let block_ref = self.parse_block()?;
        let block = match &self.nodes[block_ref] {
            Node::Block(b) => b.body.clone(),
            _ => unreachable!(),
        };
        let handler = if self.at(Token::KeywordCatch) {
            self.advance(SlashMode::Regex);
            let param = if self.at(Token::LParen) {
                self.advance(SlashMode::Regex);
                let p = self.parse_binding_target()?;
                self.expect(Token::RParen)?;
                p
            } else {
                Node::empty()
            };
            let catch_block_ref = self.parse_block()?;
            let catch_body = match &self.nodes[catch_block_ref] {
                Node::Block(b) => b.body.clone(),
                _ => unreachable!(),
            };
            self.insert(Node::Catch(Catch {
                param,
                body: catch_body,
            }))
        } else {
            Node::empty()
        };
        let finalizer = if self.at(Token::KeywordFinally) {
            self.advance(SlashMode::Regex);
            let finally_ref = self.parse_block()?;
            match &self.nodes[finally_ref] {
                Node::Block(b) => Some(b.body.clone()),
                _ => unreachable!(),
            }
        } else {
            None
        };
        Ok(self.insert(Node::Try(Try {
            block,
            handler,
            finalizer,
        })))
    }

    fn parse_throw(&mut self) -> ParseResult<NodeRef> {
        self.advance(SlashMode::Regex);
        if self.lex.has_newline_before {
            return Err(self.err("illegal newline after 'throw'"));
        }
        let expr = self.parse_expression()?;
        self.consume_semicolon()?;
        Ok(self.insert(Node::Throw(expr)))
    }

    fn parse_return(&mut self) -> ParseResult<NodeRef> {
        self.advance(SlashMode::Regex);
        let arg = if self.at(Token::Semi)
            || self.at(Token::RBrace)
            || self.at(Token::Eof)
            || self.lex.has_newline_before
        {
            Node::empty()
        } else {
            self.parse_expression()?
        };
        self.consume_semicolon()?;
        Ok(self.insert(Node::Return(arg)))
    }

    fn parse_break_continue(&mut self, is_break: bool) -> ParseResult<NodeRef> {
        self.advance(SlashMode::Regex);
        let label = if self.at(Token::Ident) && !self.lex.has_newline_before {
            let label_ref = self.take_text();
            self.insert(Node::Ident(label_ref))
        } else {
            Node::empty()
        };
        self.consume_semicolon()?;
        Ok(self.insert(if is_break {
            Node::Break(label)
        } else {
            Node::Continue(label)
        }))
    }

    // ---------------------------------------------------------------
    // Functions
    // ---------------------------------------------------------------

    fn parse_function_decl(&mut self, is_async: bool) -> ParseResult<NodeRef> {
        self.expect(Token::KeywordFunction)?;
        let is_generator = if self.at(Token::Mul) {
            self.advance(SlashMode::Regex);
            true
        } else {
            false
        };
        let name = if self.at(Token::Ident) {
            let name_ref = self.take_text();
            self.insert(Node::Ident(name_ref))
        } else {
            Node::empty()
        };
        let params = self.parse_params()?;
        self.ctx.push(FnContext {
            in_generator: is_generator,
            in_async: is_async,
            in_loop_or_switch: false,
        });
        let body_ref = self.parse_block()?;
        self.ctx.pop();
        let body = match &self.nodes[body_ref] {
            Node::Block(b) => b.body.clone(),
            _ => unreachable!(),
        };
        Ok(self.insert(Node::Function(Function {
            name,
            params,
            body,
            is_async,
            is_generator,
            is_arrow: false,
            expr_body: None,
        })))
    }

    fn parse_params(&mut self) -> ParseResult<Box<[NodeRef]>> {
        self.expect(Token::LParen)?;
        let mut params = Vec::new();
        while !self.at(Token::RParen) {
            let rest = if self.at(Token::Spread) {
                self.advance(SlashMode::Regex);
                true
            } else {
                false
            };
            let binding = self.parse_binding_target()?;
            let default = if !rest && self.at(Token::Equal) {
                self.advance(SlashMode::Regex);
                self.parse_assignment_expression()?
            } else {
                Node::empty()
            };
            params.push(self.insert(Node::Param(Param {
                binding,
                default,
                rest,
            })));
            if self.at(Token::Comma) {
                self.advance(SlashMode::Regex);
            } else {
                break;
            }
        }
        self.expect(Token::RParen)?;
        Ok(params.into_boxed_slice())
    }

    // ---------------------------------------------------------------
    // Classes
    // ---------------------------------------------------------------

    fn parse_class(&mut self) -> ParseResult<NodeRef> {
        self.advance(SlashMode::Regex);
        let name = if self.at(Token::Ident) {
            let name_ref = self.take_text();
            self.insert(Node::Ident(name_ref))
        } else {
            Node::empty()
        };
        let super_class = if self.at(Token::KeywordExtends) {
            self.advance(SlashMode::Regex);
            self.parse_lhs_expression()?
        } else {
            Node::empty()
        };
        self.expect(Token::LBrace)?;
        let mut members = Vec::new();
        while !self.at(Token::RBrace) {
            if self.at(Token::Semi) {
                self.advance(SlashMode::Regex);
                continue;
            }
            members.push(self.parse_class_member()?);
        }
        self.expect(Token::RBrace)?;
        Ok(self.insert(Node::ClassDecl(ClassDecl {
            name,
            super_class,
            body: members.into_boxed_slice(),
        })))
    }

    fn parse_class_member(&mut self) -> ParseResult<NodeRef> {
        let is_static = if self.at(Token::KeywordStatic) {
            // `static {` is a static initializer block.
            let save = (self.lex.index, self.lex.start, self.lex.token);
            self.advance(SlashMode::Regex);
            if self.at(Token::LBrace) {
                let block_ref = self.parse_block()?;
                let body = match &self.nodes[block_ref] {
                    Node::Block(b) => b.body.clone(),
                    _ => unreachable!(),
                };
                return Ok(self.insert(Node::StaticBlock(body)));
            }
            if self.at(Token::LParen) || self.at(Token::Equal) || self.at(Token::Semi) {
                // `static` used as a plain member name.
                self.lex.reset(save.1);
                self.lex.start = save.1;
                self.lex.token = save.2;
                false
            } else {
                true
            }
        } else {
            false
        };

        let kind_keyword = if matches!(self.lex.token, Token::KeywordGet | Token::KeywordSet) {
            let save = (self.lex.index, self.lex.start, self.lex.token);
            let tok = self.lex.token;
            self.advance(SlashMode::Regex);
            if self.at(Token::LParen) || self.at(Token::Equal) || self.at(Token::Semi) {
                self.lex.reset(save.1);
                self.lex.start = save.1;
                self.lex.token = save.2;
                None
            } else {
                Some(tok)
            }
        } else {
            None
        };

        let is_generator = if self.at(Token::Mul) {
            self.advance(SlashMode::Regex);
            true
        } else {
            false
        };
        let is_async = if self.at_async_no_newline() {
            self.advance(SlashMode::Regex);
            true
        } else {
            false
        };
        let is_generator = is_generator
            || if self.at(Token::Mul) {
                self.advance(SlashMode::Regex);
                true
            } else {
                false
            };

        let (key, computed) = self.parse_property_key()?;
        let is_constructor = matches!(&self.nodes[key], Node::Ident(r) if {
            let text = &self.lex.source[r.start as usize..r.end as usize];
            text == "constructor"
        });

        if self.at(Token::LParen) {
            let params = self.parse_params()?;
            self.ctx.push(FnContext {
                in_generator: is_generator,
                in_async: is_async,
                in_loop_or_switch: false,
            });
            let body_ref = self.parse_block()?;
            self.ctx.pop();
            let body = match &self.nodes[body_ref] {
                Node::Block(b) => b.body.clone(),
                _ => unreachable!(),
            };
            let value = self.insert(Node::Function(Function {
                name: Node::empty(),
                params,
                body,
                is_async,
                is_generator,
                is_arrow: false,
                expr_body: None,
            }));
            let kind = match kind_keyword {
                Some(Token::KeywordGet) => MethodKind::Get,
                Some(Token::KeywordSet) => MethodKind::Set,
                _ if is_constructor && !is_static => MethodKind::Constructor,
                _ => MethodKind::Method,
            };
            return Ok(self.insert(Node::ClassMethod(ClassMethod {
                key,
                value,
                kind,
                is_static,
                computed,
            })));
        }

        // Field.
        let value = if self.at(Token::Equal) {
            self.advance(SlashMode::Regex);
            self.parse_assignment_expression()?
        } else {
            Node::empty()
        };
        self.consume_semicolon()?;
        Ok(self.insert(Node::ClassField(ClassField {
            key,
            value,
            is_static,
            computed,
        })))
    }

    fn parse_property_key(&mut self) -> ParseResult<(NodeRef, bool)> {
        if self.at(Token::LBrack) {
            self.advance(SlashMode::Regex);
            let expr = self.parse_assignment_expression()?;
            self.expect(Token::RBrack)?;
            return Ok((expr, true));
        }
        if self.at(Token::PrivateIdent) {
            let name_ref = self.take_text();
            return Ok((self.insert(Node::PrivateName(name_ref)), false));
        }
        if self.at(Token::String) {
            let value = self.string_literal_value()?;
            return Ok((self.insert(Node::StringLit(value)), false));
        }
        if self.at(Token::Number) {
            let value = parse_number_text(self.lex.text());
            self.advance(SlashMode::Divide);
            return Ok((self.insert(Node::NumberLit(value)), false));
        }
        let name_ref = self.take_text();
        Ok((self.insert(Node::Ident(name_ref)), false))
    }

    // ---------------------------------------------------------------
    // Binding patterns
    // ---------------------------------------------------------------

    fn parse_binding_target(&mut self) -> ParseResult<NodeRef> {
        match self.lex.token {
            Token::LBrack => self.parse_array_pattern(),
            Token::LBrace => self.parse_object_pattern(),
            _ => {
                let name_ref = self.take_text();
                Ok(self.insert(Node::Ident(name_ref)))
            }
        }
    }

    fn parse_array_pattern(&mut self) -> ParseResult<NodeRef> {
        self.expect(Token::LBrack)?;
        let mut elements = Vec::new();
        while !self.at(Token::RBrack) {
            if self.at(Token::Comma) {
                elements.push(Node::empty());
                self.advance(SlashMode::Regex);
                continue;
            }
            if self.at(Token::Spread) {
                self.advance(SlashMode::Regex);
                let target = self.parse_binding_target()?;
                elements.push(self.insert(Node::RestElement(target)));
                break;
            }
            let target = self.parse_binding_target()?;
            let el = if self.at(Token::Equal) {
                self.advance(SlashMode::Regex);
                let default = self.parse_assignment_expression()?;
                self.insert(Node::AssignPattern { target, default })
            } else {
                target
            };
            elements.push(el);
            if self.at(Token::Comma) {
                self.advance(SlashMode::Regex);
            } else {
                break;
            }
        }
        self.expect(Token::RBrack)?;
        Ok(self.insert(Node::ArrayPattern(ArrayPattern {
            elements: elements.into_boxed_slice(),
        })))
    }

    fn parse_object_pattern(&mut self) -> ParseResult<NodeRef> {
        self.expect(Token::LBrace)?;
        let mut props = Vec::new();
        while !self.at(Token::RBrace) {
            if self.at(Token::Spread) {
                self.advance(SlashMode::Regex);
                let target = self.parse_binding_target()?;
                props.push(self.insert(Node::RestElement(target)));
                break;
            }
            let (key, computed) = self.parse_property_key()?;
            let (value, shorthand) = if self.at(Token::Colon) {
                self.advance(SlashMode::Regex);
                (self.parse_binding_target()?, false)
            } else {
                (key, true)
            };
            let value = if self.at(Token::Equal) {
                self.advance(SlashMode::Regex);
                let default = self.parse_assignment_expression()?;
                self.insert(Node::AssignPattern {
                    target: value,
                    default,
                })
            } else {
                value
            };
            props.push(self.insert(Node::ObjectProp(ObjectProp {
                key,
                value,
                kind: PropKind::Init,
                computed,
                shorthand,
            })));
            if self.at(Token::Comma) {
                self.advance(SlashMode::Regex);
            } else {
                break;
            }
        }
        self.expect(Token::RBrace)?;
        Ok(self.insert(Node::ObjectPattern(ObjectPattern {
            props: props.into_boxed_slice(),
        })))
    }

    // ---------------------------------------------------------------
    // Expressions
    // ---------------------------------------------------------------

    pub fn parse_expression(&mut self) -> ParseResult<NodeRef> {
        let first = self.parse_assignment_expression()?;
        if !self.at(Token::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.at(Token::Comma) {
            self.advance(SlashMode::Regex);
            items.push(self.parse_assignment_expression()?);
        }
        Ok(self.insert(Node::Sequence(items.into_boxed_slice())))
    }

    fn parse_assignment_expression(&mut self) -> ParseResult<NodeRef> {
        if self.at(Token::KeywordYield) {
            return self.parse_yield();
        }
        if let Some(arrow) = self.try_parse_arrow()? {
            return Ok(arrow);
        }

        let lhs = self.parse_conditional()?;

        let op = match self.lex.token {
            Token::Equal => Some(AssignOp::Assign),
            Token::AddAssign => Some(AssignOp::Add),
            Token::SubAssign => Some(AssignOp::Sub),
            Token::MulAssign => Some(AssignOp::Mul),
            Token::DivAssign => Some(AssignOp::Div),
            Token::ModAssign => Some(AssignOp::Mod),
            Token::PowAssign => Some(AssignOp::Pow),
            Token::ShiftLeftAssign => Some(AssignOp::ShiftLeft),
            Token::ShiftRightAssign => Some(AssignOp::ShiftRight),
            Token::UShiftRightAssign => Some(AssignOp::UShiftRight),
            Token::BAndAssign => Some(AssignOp::BAnd),
            Token::BOrAssign => Some(AssignOp::BOr),
            Token::XorAssign => Some(AssignOp::Xor),
            Token::AndAssign => Some(AssignOp::And),
            Token::OrAssign => Some(AssignOp::Or),
            Token::NullishAssign => Some(AssignOp::Nullish),
            _ => None,
        };
        let Some(op) = op else { return Ok(lhs) };
        self.advance(SlashMode::Regex);
        let target = self.pattern_from_expression(lhs);
        let value = self.parse_assignment_expression()?;
        Ok(self.insert(Node::Assign(Assign { op, target, value })))
    }

    /// Destructuring assignment reuses expression-position array/object
    /// literals as patterns (`[a, b] = c`); this best-effort conversion
    /// keeps the literal forms the compiler already knows how to lower.
    fn pattern_from_expression(&mut self, expr: NodeRef) -> NodeRef {
        expr
    }

    fn parse_yield(&mut self) -> ParseResult<NodeRef> {
        self.advance(SlashMode::Regex);
        let delegate = if self.at(Token::Mul) {
            self.advance(SlashMode::Regex);
            true
        } else {
            false
        };
        let argument = if self.lex.has_newline_before
            || matches!(
                self.lex.token,
                Token::Semi | Token::RBrace | Token::RParen | Token::RBrack | Token::Comma | Token::Colon | Token::Eof
            ) {
            Node::empty()
        } else {
            self.parse_assignment_expression()?
        };
        Ok(self.insert(Node::Yield { argument, delegate }))
    }

    /// Attempts to parse `(params) => body` or `ident => body`, backtracking
    /// the lexer if what follows `)` isn't `=>`.
    fn try_parse_arrow(&mut self) -> ParseResult<Option<NodeRef>> {
        let is_async = self.at_async_no_newline();

        if (self.at(Token::Ident) || (is_async))
            && !matches!(self.lex.token, Token::LParen)
        {
            let save = (self.lex.index, self.lex.start, self.lex.token);
            let async_flag = if is_async {
                self.advance(SlashMode::Regex);
                true
            } else {
                false
            };
            if self.at(Token::Ident) && !self.lex.has_newline_before {
                let save2 = (self.lex.index, self.lex.start, self.lex.token);
                let name_ref = self.take_text();
                if self.at(Token::Arrow) && !self.lex.has_newline_before {
                    self.advance(SlashMode::Regex);
                    let param = self.insert(Node::Ident(name_ref));
                    let param_node = self.insert(Node::Param(Param {
                        binding: param,
                        default: Node::empty(),
                        rest: false,
                    }));
                    return Ok(Some(self.finish_arrow(vec![param_node], async_flag)?));
                }
                self.lex.reset(save2.1);
                self.lex.start = save2.1;
                self.lex.token = save2.2;
            }
            if async_flag {
                self.lex.reset(save.1);
                self.lex.start = save.1;
                self.lex.token = save.2;
            }
        }

        if self.at(Token::LParen) || (is_async) {
            let save = (self.lex.index, self.lex.start, self.lex.token);
            let async_flag = if is_async {
                self.advance(SlashMode::Regex);
                true
            } else {
                false
            };
            if self.at(Token::LParen) {
                if let Ok(params) = self.parse_params() {
                    if self.at(Token::Arrow) && !self.lex.has_newline_before {
                        self.advance(SlashMode::Regex);
                        return Ok(Some(self.finish_arrow(params.into_vec(), async_flag)?));
                    }
                }
            }
            self.lex.reset(save.1);
            self.lex.start = save.1;
            self.lex.token = save.2;
        }

        Ok(None)
    }

    fn finish_arrow(&mut self, params: Vec<NodeRef>, is_async: bool) -> ParseResult<NodeRef> {
        self.ctx.push(FnContext {
            in_generator: false,
            in_async: is_async,
            in_loop_or_switch: false,
        });
        let (body, expr_body) = if self.at(Token::LBrace) {
            let block_ref = self.parse_block()?;
            let body = match &self.nodes[block_ref] {
                Node::Block(b) => b.body.clone(),
                _ => unreachable!(),
            };
            (body, None)
        } else {
            let expr = self.parse_assignment_expression()?;
            (Box::new([]) as Box<[NodeRef]>, Some(expr))
        };
        self.ctx.pop();
        Ok(self.insert(Node::Function(Function {
            name: Node::empty(),
            params: params.into_boxed_slice(),
            body,
            is_async,
            is_generator: false,
            is_arrow: true,
            expr_body,
        })))
    }

    fn parse_conditional(&mut self) -> ParseResult<NodeRef> {
        let cond = self.parse_binary_expr(1)?;
        if !self.at(Token::Ternary) {
            return Ok(cond);
        }
        self.advance(SlashMode::Regex);
        let consequent = self.parse_assignment_expression()?;
        self.expect(Token::Colon)?;
        let alternate = self.parse_assignment_expression()?;
        Ok(self.insert(Node::Ternary(Ternary {
            condition: cond,
            consequent,
            alternate,
        })))
    }

    /// Precedence-climbing binary/logical expression parser. `**` is
    /// right-associative and may not take an unparenthesized unary
    /// expression as its left operand (enforced in `parse_unary`).
    fn parse_binary_expr(&mut self, min_bp: u8) -> ParseResult<NodeRef> {
        let mut lhs = self.parse_unary()?;
        loop {
            let tok = self.lex.token;
            let bp = tok.lbp();
            if bp == 0 || bp < min_bp {
                break;
            }
            if matches!(
                tok,
                Token::Dot
                    | Token::OptionalChain
                    | Token::LBrack
                    | Token::LParen
                    | Token::Inc
                    | Token::Dec
            ) {
                break;
            }
            let next_min = if tok.is_right_assoc() { bp } else { bp + 1 };
            self.advance(SlashMode::Regex);

            if let Some(logical_op) = match tok {
                Token::And => Some(LogicalOp::And),
                Token::Or => Some(LogicalOp::Or),
                Token::Nullish => Some(LogicalOp::Nullish),
                _ => None,
            } {
                let rhs = self.parse_binary_expr(next_min)?;
                lhs = self.insert(Node::Logical(Logical {
                    op: logical_op,
                    lhs,
                    rhs,
                }));
                continue;
            }

            let bin_op = match tok {
                Token::Add => BinOp::Add,
                Token::Sub => BinOp::Sub,
                Token::Mul => BinOp::Mul,
                Token::Div => BinOp::Div,
                Token::Mod => BinOp::Mod,
                Token::Pow => BinOp::Pow,
                Token::ShiftLeft => BinOp::ShiftLeft,
                Token::ShiftRight => BinOp::ShiftRight,
                Token::UShiftRight => BinOp::UShiftRight,
                Token::Lt => BinOp::Lt,
                Token::Gt => BinOp::Gt,
                Token::Lte => BinOp::Lte,
                Token::Gte => BinOp::Gte,
                Token::Equality => BinOp::Equality,
                Token::Inequality => BinOp::Inequality,
                Token::StrictEquality => BinOp::StrictEquality,
                Token::StrictInequality => BinOp::StrictInequality,
                Token::BAnd => BinOp::BAnd,
                Token::BOr => BinOp::BOr,
                Token::Xor => BinOp::Xor,
                Token::KeywordIn => BinOp::In,
                Token::KeywordInstanceOf => BinOp::InstanceOf,
                _ => break,
            };
            let rhs = self.parse_binary_expr(next_min)?;
            lhs = self.insert(Node::Binary(BinaryOp {
                op: bin_op,
                lhs,
                rhs,
            }));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> ParseResult<NodeRef> {
        let op = match self.lex.token {
            Token::Sub => Some(UnaryOp::Minus),
            Token::Add => Some(UnaryOp::Plus),
            Token::Not => Some(UnaryOp::Not),
            Token::BNot => Some(UnaryOp::BNot),
            Token::KeywordTypeOf => Some(UnaryOp::TypeOf),
            Token::KeywordVoid => Some(UnaryOp::Void),
            Token::KeywordDelete => Some(UnaryOp::Delete),
            _ => None,
        };
        if let Some(op) = op {
            self.advance(SlashMode::Regex);
            // `**` may not directly follow a unary expression without parens;
            // the compiler's lowering rejects `ExponentiationExpression` with
            // a non-parenthesized `UnaryExpression` base per §4.5.
            let operand = self.parse_binary_expr(15)?;
            return Ok(self.insert(Node::Unary(Unary { op, operand })));
        }
        if self.at(Token::KeywordAwait) {
            self.advance(SlashMode::Regex);
            let operand = self.parse_binary_expr(15)?;
            return Ok(self.insert(Node::Await(operand)));
        }
        if matches!(self.lex.token, Token::Inc | Token::Dec) {
            let op = if self.at(Token::Inc) {
                UpdateOp::Inc
            } else {
                UpdateOp::Dec
            };
            self.advance(SlashMode::Regex);
            let operand = self.parse_unary()?;
            return Ok(self.insert(Node::Update(Update {
                op,
                operand,
                prefix: true,
            })));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> ParseResult<NodeRef> {
        let expr = self.parse_lhs_expression()?;
        if !self.lex.has_newline_before && matches!(self.lex.token, Token::Inc | Token::Dec) {
            let op = if self.at(Token::Inc) {
                UpdateOp::Inc
            } else {
                UpdateOp::Dec
            };
            self.advance(SlashMode::Divide);
            return Ok(self.insert(Node::Update(Update {
                op,
                operand: expr,
                prefix: false,
            })));
        }
        Ok(expr)
    }

    /// Member/call expressions, including `new`, optional chaining
    /// (`?.`/`?.()`/`?.[]`) and tagged templates. An optional-chain
    /// short-circuits the whole chain to `undefined`, modeled here by
    /// wrapping the outermost link in `Node::Chain` once any link in it was
    /// optional.
    fn parse_lhs_expression(&mut self) -> ParseResult<NodeRef> {
        let mut expr = if self.at(Token::KeywordNew) {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };
        let mut saw_optional = false;

        loop {
            match self.lex.token {
                Token::Dot => {
                    self.advance(SlashMode::Divide);
                    let (prop, _) = if self.at(Token::PrivateIdent) {
                        let name_ref = self.take_text();
                        (self.insert(Node::PrivateName(name_ref)), false)
                    } else {
                        let name_ref = self.take_text();
                        (self.insert(Node::Ident(name_ref)), false)
                    };
                    expr = self.insert(Node::Member(Member {
                        object: expr,
                        property: prop,
                        computed: false,
                        optional: false,
                    }));
                }
                Token::OptionalChain => {
                    saw_optional = true;
                    self.advance(SlashMode::Divide);
                    if self.at(Token::LParen) {
                        let args = self.parse_call_args()?;
                        expr = self.insert(Node::Call(Call {
                            callee: expr,
                            args,
                            optional: true,
                        }));
                    } else if self.at(Token::LBrack) {
                        self.advance(SlashMode::Regex);
                        let index = self.parse_expression()?;
                        self.expect(Token::RBrack)?;
                        expr = self.insert(Node::Member(Member {
                            object: expr,
                            property: index,
                            computed: true,
                            optional: true,
                        }));
                    } else {
                        let name_ref = self.take_text();
                        let prop = self.insert(Node::Ident(name_ref));
                        expr = self.insert(Node::Member(Member {
                            object: expr,
                            property: prop,
                            computed: false,
                            optional: true,
                        }));
                    }
                }
                Token::LBrack => {
                    self.advance(SlashMode::Regex);
                    let index = self.parse_expression()?;
                    self.expect(Token::RBrack)?;
                    expr = self.insert(Node::Member(Member {
                        object: expr,
                        property: index,
                        computed: true,
                        optional: false,
                    }));
                }
                Token::LParen => {
                    let args = self.parse_call_args()?;
                    expr = self.insert(Node::Call(Call {
                        callee: expr,
                        args,
                        optional: false,
                    }));
                }
                Token::TemplateStart | Token::NoSubstitutionTemplate => {
                    let quasi = self.parse_template_literal()?;
                    expr = self.insert(Node::TaggedTemplate(TaggedTemplate {
                        tag: expr,
                        quasi,
                    }));
                }
                _ => break,
            }
        }

        if saw_optional {
            expr = self.insert(Node::Chain(expr));
        }
        Ok(expr)
    }

    fn parse_new(&mut self) -> ParseResult<NodeRef> {
        self.advance(SlashMode::Regex);
        if self.at(Token::Dot) {
            self.advance(SlashMode::Regex);
            self.expect_contextual("target")?;
            return Ok(self.insert(Node::NewTarget));
        }
        let callee = if self.at(Token::KeywordNew) {
            self.parse_new()?
        } else {
            let mut e = self.parse_primary()?;
            loop {
                match self.lex.token {
                    Token::Dot => {
                        self.advance(SlashMode::Divide);
                        let name_ref = self.take_text();
                        let prop = self.insert(Node::Ident(name_ref));
                        e = self.insert(Node::Member(Member {
                            object: e,
                            property: prop,
                            computed: false,
                            optional: false,
                        }));
                    }
                    Token::LBrack => {
                        self.advance(SlashMode::Regex);
                        let index = self.parse_expression()?;
                        self.expect(Token::RBrack)?;
                        e = self.insert(Node::Member(Member {
                            object: e,
                            property: index,
                            computed: true,
                            optional: false,
                        }));
                    }
                    _ => break,
                }
            }
            e
        };
        let args = if self.at(Token::LParen) {
            self.parse_call_args()?
        } else {
            Box::new([])
        };
        Ok(self.insert(Node::New(Call {
            callee,
            args,
            optional: false,
        })))
    }

    fn parse_call_args(&mut self) -> ParseResult<Box<[NodeRef]>> {
        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        while !self.at(Token::RParen) {
            if self.at(Token::Spread) {
                self.advance(SlashMode::Regex);
                let arg = self.parse_assignment_expression()?;
                args.push(self.insert(Node::Spread(arg)));
            } else {
                args.push(self.parse_assignment_expression()?);
            }
            if self.at(Token::Comma) {
                self.advance(SlashMode::Regex);
            } else {
                break;
            }
        }
        self.expect(Token::RParen)?;
        Ok(args.into_boxed_slice())
    }

    fn parse_primary(&mut self) -> ParseResult<NodeRef> {
        match self.lex.token {
            Token::KeywordTrue => {
                self.advance(SlashMode::Divide);
                Ok(self.insert(Node::True))
            }
            Token::KeywordFalse => {
                self.advance(SlashMode::Divide);
                Ok(self.insert(Node::False))
            }
            Token::KeywordNull => {
                self.advance(SlashMode::Divide);
                Ok(self.insert(Node::Null))
            }
            Token::KeywordThis => {
                self.advance(SlashMode::Divide);
                Ok(self.insert(Node::ThisExpr))
            }
            Token::KeywordSuper => {
                self.advance(SlashMode::Divide);
                Ok(self.insert(Node::SuperExpr))
            }
            Token::Number => {
                let value = parse_number_text(self.lex.text());
                self.advance(SlashMode::Divide);
                Ok(self.insert(Node::NumberLit(value)))
            }
            Token::BigInt => {
                let text = self.lex.text();
                let digits = text[..text.len() - 1].to_string().into_boxed_str();
                self.advance(SlashMode::Divide);
                Ok(self.insert(Node::BigIntLit(digits)))
            }
            Token::String => {
                let value = self.string_literal_value()?;
                Ok(self.insert(Node::StringLit(value)))
            }
            Token::Regex => {
                let text = self.lex.text();
                let last_slash = text.rfind('/').unwrap_or(text.len() - 1);
                let pattern = text[1..last_slash].to_string().into_boxed_str();
                let flags = text[last_slash + 1..].to_string().into_boxed_str();
                self.advance(SlashMode::Divide);
                Ok(self.insert(Node::RegexLit { pattern, flags }))
            }
            Token::TemplateStart | Token::NoSubstitutionTemplate => self.parse_template_literal(),
            Token::PrivateIdent => {
                let name_ref = self.take_text();
                Ok(self.insert(Node::PrivateName(name_ref)))
            }
            Token::LParen => {
                self.advance(SlashMode::Regex);
                let expr = self.parse_expression()?;
                self.expect(Token::RParen)?;
                self.lex.slash_mode = SlashMode::Divide;
                Ok(self.insert(Node::Paren(expr)))
            }
            Token::LBrack => self.parse_array_literal(),
            Token::LBrace => self.parse_object_literal(),
            Token::KeywordFunction => self.parse_function_expr(false),
            Token::KeywordAsync if self.at_async_function() => {
                self.advance(SlashMode::Regex);
                self.parse_function_expr(true)
            }
            Token::KeywordClass => self.parse_class(),
            Token::KeywordImport => {
                self.advance(SlashMode::Regex);
                if self.at(Token::Dot) {
                    self.advance(SlashMode::Regex);
                    self.expect_contextual("meta")?;
                    return Ok(self.insert(Node::ImportMeta));
                }
                let args = self.parse_call_args()?;
                let callee = self.insert(Node::Ident(SourceRef { start: 0, end: 0 }));
                Ok(self.insert(Node::Call(Call {
                    callee,
                    args,
                    optional: false,
                })))
            }
            Token::Ident
            | Token::KeywordAsync
            | Token::KeywordAwait
            | Token::KeywordYield
            | Token::KeywordLet
            | Token::KeywordOf
            | Token::KeywordFrom
            | Token::KeywordGet
            | Token::KeywordSet
            | Token::KeywordStatic => {
                let name_ref = self.take_text();
                Ok(self.insert(Node::Ident(name_ref)))
            }
            other => Err(self.err(format!("unexpected token {other:?}"))),
        }
    }

    fn parse_function_expr(&mut self, is_async: bool) -> ParseResult<NodeRef> {
        self.parse_function_decl(is_async)
    }

    fn parse_array_literal(&mut self) -> ParseResult<NodeRef> {
        self.expect(Token::LBrack)?;
        let mut elements = Vec::new();
        while !self.at(Token::RBrack) {
            if self.at(Token::Comma) {
                elements.push(Node::empty());
                self.advance(SlashMode::Regex);
                continue;
            }
            if self.at(Token::Spread) {
                self.advance(SlashMode::Regex);
                let arg = self.parse_assignment_expression()?;
                elements.push(self.insert(Node::Spread(arg)));
            } else {
                elements.push(self.parse_assignment_expression()?);
            }
            if self.at(Token::Comma) {
                self.advance(SlashMode::Regex);
            } else {
                break;
            }
        }
        self.expect(Token::RBrack)?;
        self.lex.slash_mode = SlashMode::Divide;
        Ok(self.insert(Node::ArrayLit(ArrayLit {
            elements: elements.into_boxed_slice(),
        })))
    }

    fn parse_object_literal(&mut self) -> ParseResult<NodeRef> {
        self.expect(Token::LBrace)?;
        let mut props = Vec::new();
        while !self.at(Token::RBrace) {
            if self.at(Token::Spread) {
                self.advance(SlashMode::Regex);
                let arg = self.parse_assignment_expression()?;
                props.push(self.insert(Node::Spread(arg)));
                if self.at(Token::Comma) {
                    self.advance(SlashMode::Regex);
                }
                continue;
            }

            let kind_keyword = if matches!(self.lex.token, Token::KeywordGet | Token::KeywordSet) {
                let save = (self.lex.index, self.lex.start, self.lex.token);
                let tok = self.lex.token;
                self.advance(SlashMode::Regex);
                if matches!(self.lex.token, Token::Colon | Token::Comma | Token::RBrace) {
                    self.lex.reset(save.1);
                    self.lex.start = save.1;
                    self.lex.token = save.2;
                    None
                } else {
                    Some(tok)
                }
            } else {
                None
            };

            let is_generator = if self.at(Token::Mul) {
                self.advance(SlashMode::Regex);
                true
            } else {
                false
            };
            let is_async = if self.at_async_no_newline() {
                self.advance(SlashMode::Regex);
                true
            } else {
                false
            };

            let (key, computed) = self.parse_property_key()?;

            if self.at(Token::LParen) {
                let params = self.parse_params()?;
                self.ctx.push(FnContext {
                    in_generator: is_generator,
                    in_async: is_async,
                    in_loop_or_switch: false,
                });
                let body_ref = self.parse_block()?;
                self.ctx.pop();
                let body = match &self.nodes[body_ref] {
                    Node::Block(b) => b.body.clone(),
                    _ => unreachable!(),
                };
                let value = self.insert(Node::Function(Function {
                    name: Node::empty(),
                    params,
                    body,
                    is_async,
                    is_generator,
                    is_arrow: false,
                    expr_body: None,
                }));
                let kind = match kind_keyword {
                    Some(Token::KeywordGet) => PropKind::Get,
                    Some(Token::KeywordSet) => PropKind::Set,
                    _ => PropKind::Method,
                };
                props.push(self.insert(Node::ObjectProp(ObjectProp {
                    key,
                    value,
                    kind,
                    computed,
                    shorthand: false,
                })));
            } else if self.at(Token::Colon) {
                self.advance(SlashMode::Regex);
                let value = self.parse_assignment_expression()?;
                props.push(self.insert(Node::ObjectProp(ObjectProp {
                    key,
                    value,
                    kind: PropKind::Init,
                    computed,
                    shorthand: false,
                })));
            } else {
                // Shorthand `{ foo }` or `{ foo = default }` (only valid in
                // destructuring, but accepted here and validated by the
                // compiler when lowering object literals vs. patterns).
                let value = if self.at(Token::Equal) {
                    self.advance(SlashMode::Regex);
                    let default = self.parse_assignment_expression()?;
                    self.insert(Node::AssignPattern { target: key, default })
                } else {
                    Node::empty()
                };
                props.push(self.insert(Node::ObjectProp(ObjectProp {
                    key,
                    value,
                    kind: PropKind::Init,
                    computed,
                    shorthand: true,
                })));
            }

            if self.at(Token::Comma) {
                self.advance(SlashMode::Regex);
            } else {
                break;
            }
        }
        self.expect(Token::RBrace)?;
        self.lex.slash_mode = SlashMode::Divide;
        Ok(self.insert(Node::ObjectLit(ObjectLit {
            props: props.into_boxed_slice(),
        })))
    }

    /// Parses a template literal. Interpolation holes are parsed as full
    /// expressions; the lexer re-enters template-scanning mode via
    /// `resume_template` once the matching `}` of a hole is consumed.
    fn parse_template_literal(&mut self) -> ParseResult<NodeRef> {
        let mut quasis = Vec::new();
        let mut expressions = Vec::new();

        loop {
            let text = self.lex.text();
            let (raw, tail) = match self.lex.token {
                Token::NoSubstitutionTemplate => (&text[1..text.len() - 1], true),
                Token::TemplateStart => (&text[1..text.len() - 2], false),
                Token::TemplatePart => (&text[1..text.len() - 2], false),
                Token::TemplateEnd => (&text[1..text.len() - 1], true),
                _ => return Err(self.err("malformed template literal")),
            };
            let cooked = cook_string(raw);
            let ended = tail;
            quasis.push(TemplateElement {
                cooked: cooked.into_boxed_str(),
                raw: raw.to_string().into_boxed_str(),
                tail,
            });
            self.advance(SlashMode::Regex);
            if ended {
                break;
            }
            expressions.push(self.parse_expression()?);
            if !self.at(Token::RBrace) {
                return Err(self.err("expected '}' to close template interpolation"));
            }
            self.lex.resume_template();
        }

        Ok(self.insert(Node::TemplateLiteral(TemplateLiteral {
            quasis: quasis.into_boxed_slice(),
            expressions: expressions.into_boxed_slice(),
        })))
    }
}

/// Decodes JS string escapes (`\n`, `\t`, `\uXXXX`, `\xXX`, line
/// continuations, etc.) into their cooked value.
fn cook_string(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('v') => out.push('\u{b}'),
            Some('0') => out.push('\0'),
            Some('\n') => {} // line continuation
            Some('\r') => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
            }
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                if let Ok(v) = u32::from_str_radix(&hex, 16) {
                    if let Some(ch) = char::from_u32(v) {
                        out.push(ch);
                    }
                }
            }
            Some('u') => {
                if chars.peek() == Some(&'{') {
                    chars.next();
                    let hex: String = chars.by_ref().take_while(|c| *c != '}').collect();
                    if let Ok(v) = u32::from_str_radix(&hex, 16) {
                        if let Some(ch) = char::from_u32(v) {
                            out.push(ch);
                        }
                    }
                } else {
                    let hex: String = chars.by_ref().take(4).collect();
                    if let Ok(v) = u32::from_str_radix(&hex, 16) {
                        if let Some(ch) = char::from_u32(v) {
                            out.push(ch);
                        }
                    }
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Parses a numeric literal's source text into an `f64`, honoring radix
/// prefixes and `_` separators. BigInt suffix `n` is handled by the caller.
fn parse_number_text(text: &str) -> f64 {
    let cleaned: String = text.chars().filter(|c| *c != '_').collect();
    if let Some(rest) = cleaned.strip_prefix("0x").or_else(|| cleaned.strip_prefix("0X")) {
        return u64::from_str_radix(rest, 16).unwrap_or(0) as f64;
    }
    if let Some(rest) = cleaned.strip_prefix("0o").or_else(|| cleaned.strip_prefix("0O")) {
        return u64::from_str_radix(rest, 8).unwrap_or(0) as f64;
    }
    if let Some(rest) = cleaned.strip_prefix("0b").or_else(|| cleaned.strip_prefix("0B")) {
        return u64::from_str_radix(rest, 2).unwrap_or(0) as f64;
    }
    fast_float::parse(&cleaned).unwrap_or(f64::NAN)
}

pub fn parse_program(source: &str) -> ParseResult<(NodeRef, Arena<Node>)> {
    Parser::new(source).parse_program()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_var_decl() {
        let (program, nodes) = parse_program("let x = 1 + 2;").unwrap();
        match &nodes[program] {
            Node::Program(items) => assert_eq!(items.len(), 1),
            _ => panic!("expected program"),
        }
    }

    #[test]
    fn parses_arrow_function() {
        let (_program, nodes) = parse_program("const f = (a, b) => a + b;").unwrap();
        let found = nodes.iter().any(|(_, n)| matches!(n, Node::Function(f) if f.is_arrow));
        assert!(found);
    }

    #[test]
    fn parses_class_with_private_field() {
        let (_program, nodes) =
            parse_program("class A { #x = 1; get() { return this.#x; } }").unwrap();
        let has_field = nodes.iter().any(|(_, n)| matches!(n, Node::ClassField(_)));
        assert!(has_field);
    }

    #[test]
    fn rejects_missing_semicolon_insertion_restriction() {
        let err = parse_program("function f() { return\n1 }");
        assert!(err.is_ok());
    }

    #[test]
    fn parses_optional_chain() {
        let (_program, nodes) = parse_program("a?.b?.c();").unwrap();
        let has_chain = nodes.iter().any(|(_, n)| matches!(n, Node::Chain(_)));
        assert!(has_chain);
    }

    #[test]
    fn parses_for_of_loop() {
        let (_program, nodes) = parse_program("for (const x of xs) { y(x); }").unwrap();
        let has_for_of = nodes
            .iter()
            .any(|(_, n)| matches!(n, Node::ForInOf(f) if f.kind == ForInOfKind::Of));
        assert!(has_for_of);
    }
}
