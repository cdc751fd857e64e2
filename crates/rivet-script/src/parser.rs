//! Recursive-descent parser for the embedded script language.
//!
//! Binary expressions use precedence climbing; function definitions are
//! hoisted into the program's function table and are only permitted at
//! the top level.

use std::sync::Arc;

use crate::ast::{BinaryOp, Expr, FnDef, Program, Stmt, UnaryOp};
use crate::error::ScriptError;
use crate::token::{self, Span, Token};

/// Parse a source string into a program.
pub fn parse(src: &str) -> Result<Program, ScriptError> {
    let tokens = token::lex(src)?;
    let mut parser = Parser {
        src,
        tokens,
        pos: 0,
    };
    parser.parse_program()
}

struct Parser<'a> {
    src: &'a str,
    tokens: Vec<(Token, Span)>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, tok: &Token) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn current_line(&self) -> usize {
        let offset = self
            .tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|(_, s)| s.start)
            .unwrap_or(self.src.len());
        token::line_at(self.src, offset)
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::Parse {
            line: self.current_line(),
            message: message.into(),
        }
    }

    fn expect(&mut self, tok: Token, what: &str) -> Result<(), ScriptError> {
        if self.eat(&tok) {
            Ok(())
        } else {
            Err(self.error(format!("expected {what}, found {:?}", self.peek())))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, ScriptError> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(name),
            other => Err(self.error(format!("expected {what}, found {other:?}"))),
        }
    }

    fn parse_program(&mut self) -> Result<Program, ScriptError> {
        let mut program = Program::default();
        while self.peek().is_some() {
            if self.peek() == Some(&Token::Fn) {
                let def = self.parse_fn_def()?;
                program.functions.insert(def.name.clone(), Arc::new(def));
            } else {
                program.stmts.push(self.parse_stmt()?);
            }
        }
        Ok(program)
    }

    fn parse_fn_def(&mut self) -> Result<FnDef, ScriptError> {
        self.expect(Token::Fn, "'fn'")?;
        let name = self.expect_ident("function name")?;
        self.expect(Token::LParen, "'('")?;
        let mut params = Vec::new();
        if self.peek() != Some(&Token::RParen) {
            loop {
                params.push(self.expect_ident("parameter name")?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(Token::RParen, "')'")?;
        let body = self.parse_block()?;
        Ok(FnDef { name, params, body })
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        self.expect(Token::LBrace, "'{'")?;
        let mut stmts = Vec::new();
        while self.peek() != Some(&Token::RBrace) {
            if self.peek().is_none() {
                return Err(self.error("unterminated block"));
            }
            if self.peek() == Some(&Token::Fn) {
                return Err(self.error("function definitions are only allowed at the top level"));
            }
            stmts.push(self.parse_stmt()?);
        }
        self.expect(Token::RBrace, "'}'")?;
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> Result<Stmt, ScriptError> {
        match self.peek() {
            Some(Token::Let) => {
                self.pos += 1;
                let name = self.expect_ident("variable name")?;
                self.expect(Token::Eq, "'='")?;
                let value = self.parse_expr(0)?;
                self.expect(Token::Semi, "';'")?;
                Ok(Stmt::Let { name, value })
            }
            Some(Token::Return) => {
                self.pos += 1;
                if self.eat(&Token::Semi) {
                    return Ok(Stmt::Return(None));
                }
                let value = self.parse_expr(0)?;
                self.expect(Token::Semi, "';'")?;
                Ok(Stmt::Return(Some(value)))
            }
            Some(Token::If) => {
                self.pos += 1;
                let cond = self.parse_expr(0)?;
                let then_body = self.parse_block()?;
                let else_body = if self.eat(&Token::Else) {
                    self.parse_block()?
                } else {
                    Vec::new()
                };
                Ok(Stmt::If {
                    cond,
                    then_body,
                    else_body,
                })
            }
            _ => {
                let expr = self.parse_expr(0)?;
                if self.eat(&Token::Eq) {
                    if !matches!(expr, Expr::Ident(_) | Expr::Member { .. }) {
                        return Err(self.error("invalid assignment target"));
                    }
                    let value = self.parse_expr(0)?;
                    self.expect(Token::Semi, "';'")?;
                    return Ok(Stmt::Assign {
                        target: expr,
                        value,
                    });
                }
                self.expect(Token::Semi, "';'")?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    /// Binding power of a binary operator token, if it is one.
    fn binary_op(tok: &Token) -> Option<(BinaryOp, u8)> {
        Some(match tok {
            Token::OrOr => (BinaryOp::Or, 1),
            Token::AndAnd => (BinaryOp::And, 2),
            Token::EqEq => (BinaryOp::Eq, 3),
            Token::BangEq => (BinaryOp::Ne, 3),
            Token::Lt => (BinaryOp::Lt, 4),
            Token::LtEq => (BinaryOp::Le, 4),
            Token::Gt => (BinaryOp::Gt, 4),
            Token::GtEq => (BinaryOp::Ge, 4),
            Token::Plus => (BinaryOp::Add, 5),
            Token::Minus => (BinaryOp::Sub, 5),
            Token::Star => (BinaryOp::Mul, 6),
            Token::Slash => (BinaryOp::Div, 6),
            Token::Percent => (BinaryOp::Rem, 6),
            _ => return None,
        })
    }

    fn parse_expr(&mut self, min_bp: u8) -> Result<Expr, ScriptError> {
        let mut lhs = self.parse_unary()?;
        while let Some((op, bp)) = self.peek().and_then(Self::binary_op) {
            if bp <= min_bp {
                break;
            }
            self.pos += 1;
            let rhs = self.parse_expr(bp)?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ScriptError> {
        if self.eat(&Token::Minus) {
            let expr = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                expr: Box::new(expr),
            });
        }
        if self.eat(&Token::Bang) {
            let expr = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                expr: Box::new(expr),
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ScriptError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat(&Token::Dot) {
                let name = self.expect_ident("member name")?;
                expr = Expr::Member {
                    base: Box::new(expr),
                    name,
                };
            } else if self.eat(&Token::LParen) {
                let mut args = Vec::new();
                if self.peek() != Some(&Token::RParen) {
                    loop {
                        args.push(self.parse_expr(0)?);
                        if !self.eat(&Token::Comma) {
                            break;
                        }
                    }
                }
                self.expect(Token::RParen, "')'")?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ScriptError> {
        match self.next() {
            Some(Token::Nil) => Ok(Expr::Nil),
            Some(Token::True) => Ok(Expr::Bool(true)),
            Some(Token::False) => Ok(Expr::Bool(false)),
            Some(Token::Int(i)) => Ok(Expr::Int(i)),
            Some(Token::Float(f)) => Ok(Expr::Float(f)),
            Some(Token::Str(s)) => Ok(Expr::Str(s)),
            Some(Token::Ident(name)) => Ok(Expr::Ident(name)),
            Some(Token::LParen) => {
                let expr = self.parse_expr(0)?;
                self.expect(Token::RParen, "')'")?;
                Ok(expr)
            }
            other => Err(self.error(format!("unexpected token {other:?}"))),
        }
    }
}
