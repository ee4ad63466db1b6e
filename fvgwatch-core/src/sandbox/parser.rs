//! Recursive-descent parser.
//!
//! Grammar (lowest to highest precedence):
//! `or` < `and` < `not` < comparison < `+ -` < `* / %` < unary `-` < postfix
//! (call, index, field).

use super::ast::{BinaryOp, Expr, Function, Param, Program, Stmt, StmtKind, UnaryOp};
use super::builtins::is_builtin;
use super::lexer::{tokenize, Token, TokenKind};
use super::ExecutionError;

/// Nesting bound for expressions and blocks, so hostile input cannot blow the
/// parser's stack.
const MAX_NESTING: usize = 64;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

type ParseResult<T> = Result<T, ExecutionError>;

impl Parser {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> &Token {
        let idx = self.pos;
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        &self.tokens[idx]
    }

    fn check(&self, kind: &TokenKind) -> bool {
        self.peek() == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error_here(&self, message: impl Into<String>) -> ExecutionError {
        let token = self.current();
        ExecutionError::Syntax {
            line: token.line,
            column: token.column,
            message: message.into(),
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> ParseResult<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.error_here(format!("expected {what}, found {}", describe(self.peek()))))
        }
    }

    fn ident(&mut self, what: &str) -> ParseResult<String> {
        match self.peek().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            other => Err(self.error_here(format!("expected {what}, found {}", describe(&other)))),
        }
    }

    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> ParseResult<T>) -> ParseResult<T> {
        if self.depth >= MAX_NESTING {
            return Err(self.error_here("nesting too deep"));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    // ─── Items ───────────────────────────────────────────────────────

    fn program(&mut self) -> ParseResult<Program> {
        let mut program = Program::default();
        while !self.check(&TokenKind::Eof) {
            if !self.check(&TokenKind::Fn) {
                return Err(self.error_here(format!(
                    "only function definitions are allowed at top level, found {}",
                    describe(self.peek())
                )));
            }
            let line = self.current().line;
            let function = self.function()?;
            if is_builtin(&function.name) {
                return Err(ExecutionError::Syntax {
                    line,
                    column: 1,
                    message: format!("cannot redefine built-in '{}'", function.name),
                });
            }
            if program.function(&function.name).is_some() {
                return Err(ExecutionError::Syntax {
                    line,
                    column: 1,
                    message: format!("function '{}' is defined twice", function.name),
                });
            }
            program.functions.push(function);
        }
        Ok(program)
    }

    fn function(&mut self) -> ParseResult<Function> {
        let line = self.current().line;
        self.expect(&TokenKind::Fn, "'fn'")?;
        let name = self.ident("function name")?;
        self.expect(&TokenKind::LParen, "'('")?;

        let mut params: Vec<Param> = Vec::new();
        while !self.check(&TokenKind::RParen) {
            let pname = self.ident("parameter name")?;
            if params.iter().any(|p| p.name == pname) {
                return Err(self.error_here(format!("duplicate parameter '{pname}'")));
            }
            let default = if self.eat(&TokenKind::Assign) {
                Some(self.expr()?)
            } else {
                None
            };
            params.push(Param {
                name: pname,
                default,
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen, "')'")?;
        let body = self.block()?;

        Ok(Function {
            name,
            params,
            body,
            line,
        })
    }

    fn block(&mut self) -> ParseResult<Vec<Stmt>> {
        self.expect(&TokenKind::LBrace, "'{'")?;
        self.nested(|p| {
            let mut stmts = Vec::new();
            while !p.check(&TokenKind::RBrace) {
                if p.check(&TokenKind::Eof) {
                    return Err(p.error_here("unexpected end of input, missing '}'"));
                }
                stmts.push(p.statement()?);
            }
            p.advance();
            Ok(stmts)
        })
    }

    // ─── Statements ──────────────────────────────────────────────────

    fn statement(&mut self) -> ParseResult<Stmt> {
        let line = self.current().line;
        let kind = match self.peek() {
            TokenKind::Let => {
                self.advance();
                let name = self.ident("variable name")?;
                self.expect(&TokenKind::Assign, "'='")?;
                let value = self.expr()?;
                self.expect(&TokenKind::Semi, "';'")?;
                StmtKind::Let(name, value)
            }
            TokenKind::If => self.if_statement()?,
            TokenKind::For => {
                self.advance();
                let var = self.ident("loop variable")?;
                self.expect(&TokenKind::In, "'in'")?;
                match self.ident("'range'")?.as_str() {
                    "range" => {}
                    other => {
                        return Err(self.error_here(format!(
                            "for loops iterate over range(...), found '{other}'"
                        )))
                    }
                }
                self.expect(&TokenKind::LParen, "'('")?;
                let mut bounds = self.arguments()?;
                let (start, end, step) = match bounds.len() {
                    1 => (Expr::Number(0.0), bounds.remove(0), None),
                    2 => {
                        let end = bounds.remove(1);
                        (bounds.remove(0), end, None)
                    }
                    3 => {
                        let step = bounds.remove(2);
                        let end = bounds.remove(1);
                        (bounds.remove(0), end, Some(step))
                    }
                    n => {
                        return Err(self.error_here(format!(
                            "range takes 1 to 3 arguments, got {n}"
                        )))
                    }
                };
                let body = self.block()?;
                StmtKind::For {
                    var,
                    start,
                    end,
                    step,
                    body,
                }
            }
            TokenKind::While => {
                self.advance();
                let cond = self.expr()?;
                let body = self.block()?;
                StmtKind::While(cond, body)
            }
            TokenKind::Return => {
                self.advance();
                let value = if self.check(&TokenKind::Semi) {
                    None
                } else {
                    Some(self.expr()?)
                };
                self.expect(&TokenKind::Semi, "';'")?;
                StmtKind::Return(value)
            }
            TokenKind::Ident(name) if self.peek_at(1) == &TokenKind::Assign => {
                let name = name.clone();
                self.advance();
                self.advance();
                let value = self.expr()?;
                self.expect(&TokenKind::Semi, "';'")?;
                StmtKind::Assign(name, value)
            }
            _ => {
                let expr = self.expr()?;
                if self.eat(&TokenKind::Assign) {
                    let (name, index) = match expr {
                        Expr::Index(target, index) => match *target {
                            Expr::Var(name) => (name, *index),
                            _ => return Err(self.error_here("only `name[index] = value` can be assigned")),
                        },
                        _ => return Err(self.error_here("invalid assignment target")),
                    };
                    let value = self.expr()?;
                    self.expect(&TokenKind::Semi, "';'")?;
                    StmtKind::IndexAssign(name, index, value)
                } else {
                    self.expect(&TokenKind::Semi, "';'")?;
                    StmtKind::Expr(expr)
                }
            }
        };
        Ok(Stmt { kind, line })
    }

    fn if_statement(&mut self) -> ParseResult<StmtKind> {
        self.expect(&TokenKind::If, "'if'")?;
        let cond = self.expr()?;
        let then = self.block()?;
        let otherwise = if self.eat(&TokenKind::Else) {
            if self.check(&TokenKind::If) {
                let line = self.current().line;
                let nested = self.nested(|p| p.if_statement())?;
                vec![Stmt { kind: nested, line }]
            } else {
                self.block()?
            }
        } else {
            Vec::new()
        };
        Ok(StmtKind::If(cond, then, otherwise))
    }

    // ─── Expressions ─────────────────────────────────────────────────

    fn expr(&mut self) -> ParseResult<Expr> {
        self.nested(|p| p.or_expr())
    }

    fn or_expr(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.and_expr()?;
        while self.eat(&TokenKind::Or) {
            let rhs = self.and_expr()?;
            lhs = Expr::Binary(BinaryOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.not_expr()?;
        while self.eat(&TokenKind::And) {
            let rhs = self.not_expr()?;
            lhs = Expr::Binary(BinaryOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn not_expr(&mut self) -> ParseResult<Expr> {
        if self.eat(&TokenKind::Not) {
            let inner = self.nested(|p| p.not_expr())?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(inner)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> ParseResult<Expr> {
        let lhs = self.additive()?;
        let op = match self.peek() {
            TokenKind::Eq => BinaryOp::Eq,
            TokenKind::Ne => BinaryOp::Ne,
            TokenKind::Lt => BinaryOp::Lt,
            TokenKind::Le => BinaryOp::Le,
            TokenKind::Gt => BinaryOp::Gt,
            TokenKind::Ge => BinaryOp::Ge,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.additive()?;
        Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
    }

    fn additive(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn multiplicative(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Rem,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        if self.eat(&TokenKind::Minus) {
            let inner = self.nested(|p| p.unary())?;
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(inner)));
        }
        if self.eat(&TokenKind::Plus) {
            return self.nested(|p| p.unary());
        }
        self.postfix()
    }

    fn postfix(&mut self) -> ParseResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&TokenKind::LBracket) {
                let index = self.expr()?;
                self.expect(&TokenKind::RBracket, "']'")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else if self.eat(&TokenKind::Dot) {
                let field = self.ident("field name")?;
                expr = Expr::Field(Box::new(expr), field);
            } else {
                return Ok(expr);
            }
        }
    }

    fn arguments(&mut self) -> ParseResult<Vec<Expr>> {
        let mut args = Vec::new();
        while !self.check(&TokenKind::RParen) {
            args.push(self.expr()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen, "')'")?;
        Ok(args)
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        match self.peek().clone() {
            TokenKind::Number(n) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::Bool(true))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::Bool(false))
            }
            TokenKind::Ident(name) => {
                self.advance();
                if self.eat(&TokenKind::LParen) {
                    Ok(Expr::Call(name, self.arguments()?))
                } else {
                    Ok(Expr::Var(name))
                }
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.expr()?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::LBrace => {
                self.advance();
                self.map_literal()
            }
            other => Err(self.error_here(format!("expected an expression, found {}", describe(&other)))),
        }
    }

    fn map_literal(&mut self) -> ParseResult<Expr> {
        let mut entries: Vec<(String, Expr)> = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            let key = match self.peek().clone() {
                TokenKind::Ident(k) | TokenKind::Str(k) => {
                    self.advance();
                    k
                }
                other => {
                    return Err(self.error_here(format!(
                        "expected a series name, found {}",
                        describe(&other)
                    )))
                }
            };
            if entries.iter().any(|(k, _)| *k == key) {
                return Err(self.error_here(format!("duplicate key '{key}'")));
            }
            self.expect(&TokenKind::Colon, "':'")?;
            entries.push((key, self.expr()?));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace, "'}'")?;
        Ok(Expr::Map(entries))
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Number(n) => format!("number {n}"),
        TokenKind::Ident(name) => format!("'{name}'"),
        TokenKind::Str(s) => format!("string \"{s}\""),
        TokenKind::Eof => "end of input".to_string(),
        other => format!("{other:?}").to_lowercase(),
    }
}

/// Parse a whole script.
pub fn parse(source: &str) -> Result<Program, ExecutionError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    parser.program()
}
