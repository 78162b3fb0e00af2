//! Type references: `int`, `io:File`, `byte**`, `?`.

use crate::ast::TypeRef;
use crate::error::CoreError;
use crate::lexer::TokenKind;
use crate::span::Span;

use super::Parser;

impl<'a> Parser<'a> {
    /// Parse a type, taking every following `*` as a pointer level.
    pub fn parse_type(&mut self) -> Result<TypeRef, CoreError> {
        let mut ty = self.parse_type_name()?;
        while self.at_op("*") {
            self.advance();
            ty = ty.pointer_to();
        }
        Ok(ty)
    }

    /// Parse the target type of an `as` cast. A `*` directly followed by
    /// an operand is a multiplication, not a pointer level.
    pub fn parse_cast_type(&mut self) -> Result<TypeRef, CoreError> {
        let mut ty = self.parse_type_name()?;
        while self.at_op("*") && !self.starts_operand(1) {
            self.advance();
            ty = ty.pointer_to();
        }
        Ok(ty)
    }

    fn parse_type_name(&mut self) -> Result<TypeRef, CoreError> {
        if self.at(TokenKind::Question) {
            let span = self.advance().span;
            return Ok(TypeRef::unknown(span));
        }
        if !self.at(TokenKind::Ident) {
            return Err(self.unexpected("type"));
        }
        let (name, span) = self.parse_qualified_name()?;
        Ok(TypeRef::named(name, span))
    }

    /// `name` or `namespace:name`.
    pub fn parse_qualified_name(&mut self) -> Result<(String, Span), CoreError> {
        let (mut name, span) = self.expect_ident()?;
        if self.at(TokenKind::Colon) && self.peek(1).kind == TokenKind::Ident {
            self.advance();
            let (member, member_span) = self.expect_ident()?;
            name.push(':');
            name.push_str(&member);
            return Ok((name, span.to(member_span)));
        }
        Ok((name, span))
    }

    /// Whether the token `offset` ahead can begin an operand.
    fn starts_operand(&self, offset: usize) -> bool {
        matches!(
            self.peek(offset).kind,
            TokenKind::Ident
                | TokenKind::IntLiteral
                | TokenKind::FloatLiteral
                | TokenKind::StringLiteral
                | TokenKind::CharLiteral
                | TokenKind::BoolLiteral
                | TokenKind::LParen
                | TokenKind::LBracket
                | TokenKind::Nil
                | TokenKind::Sizeof
                | TokenKind::Info
        )
    }
}
