pub mod ast;

use crate::parser::ast::{Expr, ExprKind, FunctionDecl, Literal, Program, Stmt, StmtKind};
use crate::scanner::token::{Token, TokenType};
use crate::span::Span;
use crate::stack::ensure_sufficient_stack;
use std::cell::Cell;
use std::rc::Rc;
use thiserror::Error;
use tracing::debug;

/// Calls and function declarations are capped at this many arguments.
pub const MAX_ARGUMENTS: usize = 255;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("[line {}] Error{location}: {message}", .span.line)]
pub struct ParseError {
    pub span: Span,
    /// ` at 'lexeme'` or ` at end`
    pub location: String,
    pub message: String,
}

#[derive(Clone, Copy, PartialEq)]
enum FunctionKind {
    Function,
    Method,
}

impl FunctionKind {
    fn describe(self) -> &'static str {
        match self {
            FunctionKind::Function => "function",
            FunctionKind::Method => "method",
        }
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    errors: Vec<ParseError>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        let mut tokens: Vec<Token> = tokens
            .into_iter()
            .filter(|t| t.token_type != TokenType::Comment)
            .collect();

        // the cursor never moves past Eof, so there must be one
        if tokens.last().map(|t| &t.token_type) != Some(&TokenType::Eof) {
            let span = tokens.last().map(|t| t.span).unwrap_or_default();
            tokens.push(Token::new(TokenType::Eof, "", span));
        }

        Self {
            tokens,
            current: 0,
            errors: Vec::new(),
        }
    }

    // utility methods
    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn peek_next(&self) -> Option<&Token> {
        self.tokens.get(self.current + 1)
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }

    fn is_at_end(&self) -> bool {
        self.peek().token_type == TokenType::Eof
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn check(&self, token_type: &TokenType) -> bool {
        self.peek().token_type == *token_type
    }

    fn match_any(&mut self, types: &[TokenType]) -> bool {
        for t in types {
            if self.check(t) {
                self.advance();
                return true;
            }
        }
        false
    }

    fn error_at(&self, token: &Token, message: impl Into<String>) -> ParseError {
        let location = if token.token_type == TokenType::Eof {
            " at end".to_string()
        } else {
            format!(" at '{}'", token.lexeme)
        };
        ParseError {
            span: token.span,
            location,
            message: message.into(),
        }
    }

    fn consume(&mut self, token_type: TokenType, message: &str) -> Result<Token, ParseError> {
        if self.check(&token_type) {
            Ok(self.advance().clone())
        } else {
            Err(self.error_at(self.peek(), message))
        }
    }

    /// Records an error that leaves the parser in a known state, so there is
    /// nothing to synchronize.
    fn report(&mut self, error: ParseError) {
        self.errors.push(error);
    }

    pub fn parse(mut self) -> Result<Program, Vec<ParseError>> {
        debug!(tokens = self.tokens.len(), "parsing");
        let mut statements = Vec::new();

        while !self.is_at_end() {
            match self.declaration() {
                Ok(stmt) => statements.push(stmt),
                Err(e) => {
                    self.errors.push(e);
                    self.synchronize();
                }
            }
        }

        if self.errors.is_empty() {
            Ok(Program { statements })
        } else {
            debug!(errors = self.errors.len(), "parse failed");
            Err(self.errors)
        }
    }

    /// Parses the whole token stream as one bare expression, as typed at a
    /// prompt without a trailing `;`.
    pub fn parse_expression(mut self) -> Result<Expr, Vec<ParseError>> {
        let result = self.expression().and_then(|expr| {
            if self.is_at_end() {
                Ok(expr)
            } else {
                Err(self.error_at(self.peek(), "Expect end of expression."))
            }
        });

        match result {
            Ok(expr) if self.errors.is_empty() => Ok(expr),
            Ok(_) => Err(self.errors),
            Err(e) => {
                self.errors.push(e);
                Err(self.errors)
            }
        }
    }

    fn synchronize(&mut self) {
        debug!(line = self.peek().line(), "synchronizing after parse error");
        self.advance(); // skip the token that caused the error

        while !self.is_at_end() {
            if self.previous().token_type == TokenType::Semicolon {
                return;
            }
            if self.peek().token_type.starts_statement() {
                return;
            }
            self.advance();
        }
    }

    fn declaration(&mut self) -> Result<Stmt, ParseError> {
        ensure_sufficient_stack(|| {
            if self.check(&TokenType::Class) {
                self.class_decl()
            } else if self.check(&TokenType::Fun)
                && self
                    .peek_next()
                    .is_some_and(|t| t.token_type == TokenType::Identifier)
            {
                let span = self.advance().span; // consume fun
                let function = self.function(FunctionKind::Function)?;
                Ok(Stmt::new(StmtKind::Function(Rc::new(function)), span))
            } else if self.check(&TokenType::Var) {
                self.var_decl()
            } else {
                self.statement()
            }
        })
    }

    fn class_decl(&mut self) -> Result<Stmt, ParseError> {
        let span = self.advance().span; // consume class
        let name = self.consume(TokenType::Identifier, "Expect class name.")?;

        let superclass = if self.match_any(&[TokenType::Less]) {
            let super_name = self.consume(TokenType::Identifier, "Expect superclass name.")?;
            Some(Expr::new(
                ExprKind::Variable {
                    resolved: Cell::new(None),
                    name: super_name.clone(),
                },
                super_name.span,
            ))
        } else {
            None
        };

        self.consume(TokenType::LeftBrace, "Expect '{' before class body.")?;

        let mut methods = Vec::new();
        while !self.check(&TokenType::RightBrace) && !self.is_at_end() {
            methods.push(Rc::new(self.function(FunctionKind::Method)?));
        }

        self.consume(TokenType::RightBrace, "Expect '}' after class body.")?;

        Ok(Stmt::new(
            StmtKind::Class {
                name,
                superclass,
                methods,
            },
            span,
        ))
    }

    // Parses everything after `fun`: name, parameters and body.
    fn function(&mut self, kind: FunctionKind) -> Result<FunctionDecl, ParseError> {
        let name = self.consume(
            TokenType::Identifier,
            &format!("Expect {} name.", kind.describe()),
        )?;

        // a method without a parameter list is a getter
        if kind == FunctionKind::Method && self.check(&TokenType::LeftBrace) {
            let body = self.block_body(kind)?;
            return Ok(FunctionDecl {
                span: name.span,
                name,
                params: Vec::new(),
                body,
                is_getter: true,
            });
        }

        self.consume(
            TokenType::LeftParen,
            &format!("Expect '(' after {} name.", kind.describe()),
        )?;
        let params = self.parameters()?;
        let body = self.block_body(kind)?;

        Ok(FunctionDecl {
            span: name.span,
            name,
            params,
            body,
            is_getter: false,
        })
    }

    // Parameter list, after the opening paren and through the closing one.
    fn parameters(&mut self) -> Result<Vec<Token>, ParseError> {
        let mut params = Vec::new();
        if !self.check(&TokenType::RightParen) {
            loop {
                if params.len() >= MAX_ARGUMENTS {
                    let error = self.error_at(
                        self.peek(),
                        format!("Can't have more than {} parameters.", MAX_ARGUMENTS),
                    );
                    self.report(error);
                }
                params.push(self.consume(TokenType::Identifier, "Expect parameter name.")?);
                if !self.match_any(&[TokenType::Comma]) {
                    break;
                }
            }
        }
        self.consume(TokenType::RightParen, "Expect ')' after parameters.")?;
        Ok(params)
    }

    fn block_body(&mut self, kind: FunctionKind) -> Result<Vec<Stmt>, ParseError> {
        self.consume(
            TokenType::LeftBrace,
            &format!("Expect '{{' before {} body.", kind.describe()),
        )?;
        self.block()
    }

    fn var_decl(&mut self) -> Result<Stmt, ParseError> {
        let span = self.advance().span; // consume var
        let name = self.consume(TokenType::Identifier, "Expect variable name.")?;

        let initializer = if self.match_any(&[TokenType::Equal]) {
            Some(self.expression()?)
        } else {
            None
        };

        self.consume(
            TokenType::Semicolon,
            "Expect ';' after variable declaration.",
        )?;
        Ok(Stmt::new(StmtKind::Var { name, initializer }, span))
    }

    fn statement(&mut self) -> Result<Stmt, ParseError> {
        let span = self.peek().span;
        match self.peek().token_type {
            TokenType::For => self.for_stmt(),
            TokenType::If => self.if_stmt(),
            TokenType::Print => {
                self.advance();
                let value = self.expression()?;
                self.consume(TokenType::Semicolon, "Expect ';' after value.")?;
                Ok(Stmt::new(StmtKind::Print(value), span))
            }
            TokenType::Return => self.return_stmt(),
            TokenType::While => self.while_stmt(),
            TokenType::Break => {
                self.advance();
                self.consume(TokenType::Semicolon, "Expect ';' after 'break'.")?;
                Ok(Stmt::new(StmtKind::Break, span))
            }
            TokenType::Continue => {
                self.advance();
                self.consume(TokenType::Semicolon, "Expect ';' after 'continue'.")?;
                Ok(Stmt::new(StmtKind::Continue, span))
            }
            TokenType::LeftBrace => {
                self.advance();
                Ok(Stmt::new(StmtKind::Block(self.block()?), span))
            }
            _ => {
                let expr = self.expression()?;
                self.consume(TokenType::Semicolon, "Expect ';' after expression.")?;
                Ok(Stmt::new(StmtKind::Expression(expr), span))
            }
        }
    }

    // `for` has no node of its own: it becomes a block around a while loop.
    fn for_stmt(&mut self) -> Result<Stmt, ParseError> {
        let span = self.advance().span; // consume for
        self.consume(TokenType::LeftParen, "Expect '(' after 'for'.")?;

        let initializer = if self.match_any(&[TokenType::Semicolon]) {
            None
        } else if self.check(&TokenType::Var) {
            Some(self.var_decl()?)
        } else {
            let expr_span = self.peek().span;
            let expr = self.expression()?;
            self.consume(TokenType::Semicolon, "Expect ';' after expression.")?;
            Some(Stmt::new(StmtKind::Expression(expr), expr_span))
        };

        let condition = if self.check(&TokenType::Semicolon) {
            Expr::new(ExprKind::Literal(Literal::Bool(true)), self.peek().span)
        } else {
            self.expression()?
        };
        self.consume(TokenType::Semicolon, "Expect ';' after loop condition.")?;

        let increment = if self.check(&TokenType::RightParen) {
            None
        } else {
            Some(self.expression()?)
        };
        self.consume(TokenType::RightParen, "Expect ')' after for clauses.")?;

        let body = self.statement()?;

        let looped = Stmt::new(
            StmtKind::While {
                condition,
                body: Box::new(body),
                increment,
            },
            span,
        );

        Ok(match initializer {
            Some(init) => Stmt::new(StmtKind::Block(vec![init, looped]), span),
            None => looped,
        })
    }

    fn if_stmt(&mut self) -> Result<Stmt, ParseError> {
        let span = self.advance().span; // consume if
        self.consume(TokenType::LeftParen, "Expect '(' after 'if'.")?;
        let condition = self.expression()?;
        self.consume(TokenType::RightParen, "Expect ')' after if condition.")?;

        let then_branch = Box::new(self.statement()?);
        // dangling else binds to the nearest if
        let else_branch = if self.match_any(&[TokenType::Else]) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };

        Ok(Stmt::new(
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            },
            span,
        ))
    }

    fn return_stmt(&mut self) -> Result<Stmt, ParseError> {
        let span = self.advance().span; // consume return
        let value = if self.check(&TokenType::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.consume(TokenType::Semicolon, "Expect ';' after return value.")?;
        Ok(Stmt::new(StmtKind::Return(value), span))
    }

    fn while_stmt(&mut self) -> Result<Stmt, ParseError> {
        let span = self.advance().span; // consume while
        self.consume(TokenType::LeftParen, "Expect '(' after 'while'.")?;
        let condition = self.expression()?;
        self.consume(TokenType::RightParen, "Expect ')' after condition.")?;
        let body = Box::new(self.statement()?);

        Ok(Stmt::new(
            StmtKind::While {
                condition,
                body,
                increment: None,
            },
            span,
        ))
    }

    // Statements up to the closing brace; the opening one is already consumed.
    fn block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut statements = Vec::new();

        while !self.check(&TokenType::RightBrace) && !self.is_at_end() {
            statements.push(self.declaration()?);
        }

        self.consume(TokenType::RightBrace, "Expect '}' after block.")?;
        Ok(statements)
    }

    fn expression(&mut self) -> Result<Expr, ParseError> {
        ensure_sufficient_stack(|| self.assignment())
    }

    fn assignment(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.or()?;

        if self.match_any(&[TokenType::Equal]) {
            let equals = self.previous().clone();
            let value = Box::new(self.assignment()?); // right-associative

            return match std::mem::replace(&mut expr.kind, ExprKind::Literal(Literal::Nil)) {
                ExprKind::Variable { name, .. } => Ok(Expr::new(
                    ExprKind::Assign {
                        name,
                        value,
                        resolved: Cell::new(None),
                    },
                    equals.span,
                )),
                ExprKind::Get { object, name } => Ok(Expr::new(
                    ExprKind::Set {
                        object,
                        name,
                        value,
                    },
                    equals.span,
                )),
                kind => {
                    let error = self.error_at(&equals, "Invalid assignment target.");
                    self.report(error);
                    Ok(Expr::new(kind, expr.span))
                }
            };
        }

        Ok(expr)
    }

    // Left-associative binary levels all share this loop.
    fn binary_expression<F>(
        &mut self,
        tokens: &[TokenType],
        logical: bool,
        mut next_precedence: F,
    ) -> Result<Expr, ParseError>
    where
        F: FnMut(&mut Self) -> Result<Expr, ParseError>,
    {
        let mut left = next_precedence(self)?;

        while self.match_any(tokens) {
            let operator = self.previous().clone();
            let span = operator.span;
            let right = Box::new(next_precedence(self)?);
            let left_side = Box::new(left);

            let kind = if logical {
                ExprKind::Logical {
                    left: left_side,
                    operator,
                    right,
                }
            } else {
                ExprKind::Binary {
                    left: left_side,
                    operator,
                    right,
                }
            };
            left = Expr::new(kind, span);
        }

        Ok(left)
    }

    fn or(&mut self) -> Result<Expr, ParseError> {
        self.binary_expression(&[TokenType::Or], true, |p| p.and())
    }

    fn and(&mut self) -> Result<Expr, ParseError> {
        self.binary_expression(&[TokenType::And], true, |p| p.equality())
    }

    fn equality(&mut self) -> Result<Expr, ParseError> {
        self.binary_expression(
            &[TokenType::BangEqual, TokenType::EqualEqual],
            false,
            |p| p.comparison(),
        )
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        self.binary_expression(
            &[
                TokenType::Greater,
                TokenType::GreaterEqual,
                TokenType::Less,
                TokenType::LessEqual,
            ],
            false,
            |p| p.term(),
        )
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        self.binary_expression(&[TokenType::Minus, TokenType::Plus], false, |p| p.factor())
    }

    fn factor(&mut self) -> Result<Expr, ParseError> {
        self.binary_expression(&[TokenType::Slash, TokenType::Star], false, |p| p.unary())
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.match_any(&[TokenType::Bang, TokenType::Minus]) {
            let operator = self.previous().clone();
            let span = operator.span;
            let operand = ensure_sufficient_stack(|| self.unary())?; // --x
            Ok(Expr::new(
                ExprKind::Unary {
                    operator,
                    operand: Box::new(operand),
                },
                span,
            ))
        } else {
            self.call()
        }
    }

    fn call(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;

        loop {
            if self.match_any(&[TokenType::LeftParen]) {
                expr = self.finish_call(expr)?;
            } else if self.match_any(&[TokenType::Dot]) {
                let name =
                    self.consume(TokenType::Identifier, "Expect property name after '.'.")?;
                let span = name.span;
                expr = Expr::new(
                    ExprKind::Get {
                        object: Box::new(expr),
                        name,
                    },
                    span,
                );
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr) -> Result<Expr, ParseError> {
        let mut arguments = Vec::new();

        if !self.check(&TokenType::RightParen) {
            loop {
                if arguments.len() >= MAX_ARGUMENTS {
                    let error = self.error_at(
                        self.peek(),
                        format!("Can't have more than {} arguments.", MAX_ARGUMENTS),
                    );
                    self.report(error);
                }
                arguments.push(self.expression()?);
                if !self.match_any(&[TokenType::Comma]) {
                    break;
                }
            }
        }

        // runtime errors for a call point at its closing paren
        let paren = self.consume(TokenType::RightParen, "Expect ')' after arguments.")?;

        Ok(Expr::new(
            ExprKind::Call {
                callee: Box::new(callee),
                arguments,
            },
            paren.span,
        ))
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.peek().clone();
        let span = token.span;

        let literal = |value| Expr::new(ExprKind::Literal(value), span);

        match token.token_type {
            TokenType::False => {
                self.advance();
                Ok(literal(Literal::Bool(false)))
            }
            TokenType::True => {
                self.advance();
                Ok(literal(Literal::Bool(true)))
            }
            TokenType::Nil => {
                self.advance();
                Ok(literal(Literal::Nil))
            }
            TokenType::Number(n) => {
                self.advance();
                Ok(literal(Literal::Number(n)))
            }
            TokenType::String(s) => {
                self.advance();
                Ok(literal(Literal::String(s)))
            }
            TokenType::Super => {
                self.advance();
                self.consume(TokenType::Dot, "Expect '.' after 'super'.")?;
                let method =
                    self.consume(TokenType::Identifier, "Expect superclass method name.")?;
                Ok(Expr::new(
                    ExprKind::Super {
                        method,
                        resolved: Cell::new(None),
                    },
                    span,
                ))
            }
            TokenType::This => {
                self.advance();
                Ok(Expr::new(
                    ExprKind::This {
                        resolved: Cell::new(None),
                    },
                    span,
                ))
            }
            TokenType::Identifier => {
                self.advance();
                Ok(Expr::new(
                    ExprKind::Variable {
                        name: token,
                        resolved: Cell::new(None),
                    },
                    span,
                ))
            }
            TokenType::LeftParen => {
                self.advance();
                let expr = self.expression()?;
                self.consume(TokenType::RightParen, "Expect ')' after expression.")?;
                Ok(Expr::new(ExprKind::Grouping(Box::new(expr)), span))
            }
            // `fun (a) { ... }` in expression position is an anonymous function
            TokenType::Fun => {
                self.advance();
                self.consume(TokenType::LeftParen, "Expect '(' after 'fun'.")?;
                let params = self.parameters()?;
                let body = self.block_body(FunctionKind::Function)?;
                Ok(Expr::new(
                    ExprKind::Lambda(Rc::new(FunctionDecl {
                        name: token,
                        params,
                        body,
                        is_getter: false,
                        span,
                    })),
                    span,
                ))
            }
            _ => Err(self.error_at(&token, "Expect expression.")),
        }
    }
}
