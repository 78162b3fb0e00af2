//! Recursive-descent parser for Geode.
//!
//! The parser owns a cursor over an immutable token slice. Ambiguous
//! productions are tried on a fork of the parser (a copy of the cursor
//! index) and only committed back with `join` when they succeed, so a
//! failed attempt never consumes tokens.

mod chain;
mod expr;
mod item;
mod precedence;
mod stmt;
mod ty;

use std::collections::HashSet;
use std::rc::Rc;

use tracing::debug;

pub use chain::{Component, ComponentKind};
pub use precedence::{DEFAULT_PRECEDENCE, PrecedenceTable};

use crate::ast::{Node, Unit};
use crate::builtins;
use crate::error::CoreError;
use crate::lexer::{Token, TokenKind, lex};
use crate::span::{FileId, Span};

/// Lex and parse one compilation unit.
pub fn parse(file: FileId, source: &str, default_package: &str) -> Result<Unit, CoreError> {
    let tokens = lex(file, source).into_tokens()?;
    let mut parser = Parser::new(source, &tokens);
    let unit = parser.parse_unit(default_package)?;
    debug!(
        package = %unit.package,
        items = unit.items.len(),
        "parsed compilation unit"
    );
    Ok(unit)
}

/// Parse a single expression; the whole input must be consumed.
pub fn parse_expression(source: &str) -> Result<Node, CoreError> {
    let tokens = lex(FileId::default(), source).into_tokens()?;
    let mut parser = Parser::new(source, &tokens);
    let node = parser.parse_expression()?;
    parser.expect_eof()?;
    Ok(node)
}

/// Saved cursor position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot(usize);

#[derive(Debug, Clone)]
pub struct Parser<'a> {
    source: &'a str,
    tokens: &'a [Token],
    cursor: usize,
    precedence: PrecedenceTable,
    /// Names that start a pointer declaration such as `T* x`.
    type_names: Rc<HashSet<String>>,
}

impl<'a> Parser<'a> {
    /// `tokens` must end with an `Eof` token, as produced by `lex`.
    pub fn new(source: &'a str, tokens: &'a [Token]) -> Self {
        let mut type_names: HashSet<String> = builtins::PRIMITIVES
            .iter()
            .map(|p| p.name.to_string())
            .collect();
        type_names.insert(builtins::TYPE_INFO_CLASS.to_string());
        for pair in tokens.windows(2) {
            if pair[0].kind == TokenKind::Class && pair[1].kind == TokenKind::Ident {
                type_names.insert(pair[1].text(source).to_string());
            }
        }
        Parser {
            source,
            tokens,
            cursor: 0,
            precedence: PrecedenceTable::default(),
            type_names: Rc::new(type_names),
        }
    }

    // -----------------------------------------------------------------
    // Cursor
    // -----------------------------------------------------------------

    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Token `offset` positions ahead. Past the end this is the `Eof` token.
    pub fn peek(&self, offset: usize) -> &'a Token {
        let tokens: &'a [Token] = self.tokens;
        let last = tokens.len().saturating_sub(1);
        &tokens[(self.cursor + offset).min(last)]
    }

    pub fn advance(&mut self) -> &'a Token {
        let token = self.peek(0);
        if token.kind != TokenKind::Eof {
            self.cursor += 1;
        }
        token
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot(self.cursor)
    }

    pub fn restore(&mut self, snapshot: Snapshot) {
        self.cursor = snapshot.0;
    }

    /// A parser sharing this one's tokens, positioned at the same token.
    pub fn fork(&self) -> Parser<'a> {
        self.clone()
    }

    /// Commit a successful fork's position.
    pub fn join(&mut self, fork: Parser<'a>) {
        self.cursor = fork.cursor;
    }

    /// Run `production` on a fork and commit it only if it succeeds.
    pub fn speculate<T>(
        &mut self,
        production: impl FnOnce(&mut Parser<'a>) -> Result<T, CoreError>,
    ) -> Result<T, CoreError> {
        let mut fork = self.fork();
        let value = production(&mut fork)?;
        self.join(fork);
        Ok(value)
    }

    /// Try each alternative in order; the first success wins. When all of
    /// them fail the error of the last one is reported.
    pub fn first_of<T>(
        &mut self,
        production: &'static str,
        alternatives: &[fn(&mut Parser<'a>) -> Result<T, CoreError>],
    ) -> Result<T, CoreError> {
        let span = self.peek(0).span;
        let mut last = None;
        for alternative in alternatives {
            match self.speculate(*alternative) {
                Ok(value) => return Ok(value),
                Err(err) => last = Some(err),
            }
        }
        let last = last
            .unwrap_or_else(|| CoreError::syntax(production, self.describe(self.peek(0)), span));
        Err(CoreError::AmbiguityExhausted {
            production,
            last: Box::new(last),
            span,
        })
    }

    // -----------------------------------------------------------------
    // Token helpers
    // -----------------------------------------------------------------

    pub fn text(&self, token: &Token) -> &'a str {
        token.text(self.source)
    }

    pub fn at(&self, kind: TokenKind) -> bool {
        self.peek(0).kind == kind
    }

    pub fn at_op(&self, op: &str) -> bool {
        let token = self.peek(0);
        token.kind == TokenKind::Operator && self.text(token) == op
    }

    pub fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub fn eat_op(&mut self, op: &str) -> bool {
        if self.at_op(op) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub fn expect(&mut self, kind: TokenKind) -> Result<&'a Token, CoreError> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(kind.describe()))
        }
    }

    /// Expect the delimiter closing `construct`. Running out of input is
    /// reported as an unterminated construct.
    pub fn expect_closing(
        &mut self,
        kind: TokenKind,
        construct: &'static str,
        delimiter: &'static str,
        opened_at: Span,
    ) -> Result<(), CoreError> {
        if self.eat(kind) {
            return Ok(());
        }
        if self.at(TokenKind::Eof) {
            return Err(CoreError::Unterminated {
                construct,
                delimiter,
                span: opened_at,
            });
        }
        Err(self.unexpected(kind.describe()))
    }

    pub fn expect_ident(&mut self) -> Result<(String, Span), CoreError> {
        let token = self.expect(TokenKind::Ident)?;
        Ok((self.text(token).to_string(), token.span))
    }

    pub fn expect_eof(&self) -> Result<(), CoreError> {
        if self.at(TokenKind::Eof) {
            Ok(())
        } else {
            Err(self.unexpected("end of input"))
        }
    }

    pub fn unexpected(&self, expected: &str) -> CoreError {
        let token = self.peek(0);
        CoreError::syntax(expected, self.describe(token), token.span)
    }

    fn describe(&self, token: &Token) -> String {
        match token.kind {
            TokenKind::Ident | TokenKind::Operator | TokenKind::IntLiteral | TokenKind::FloatLiteral => {
                format!("{} `{}`", token.kind.describe(), self.text(token))
            }
            kind => kind.describe().to_string(),
        }
    }

    pub fn is_type_name(&self, name: &str) -> bool {
        self.type_names.contains(name)
    }

    /// Operator precedence of the current token, if it is a binary operator.
    pub fn binary_precedence(&self) -> Option<u8> {
        let token = self.peek(0);
        if token.kind != TokenKind::Operator {
            return None;
        }
        self.precedence.get(self.text(token))
    }
}
