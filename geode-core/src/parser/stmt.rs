//! Statements and blocks.

use crate::ast::{Node, NodeKind};
use crate::error::CoreError;
use crate::lexer::TokenKind;

use super::Parser;

impl<'a> Parser<'a> {
    pub fn parse_block(&mut self) -> Result<Node, CoreError> {
        let open = self.expect(TokenKind::LBrace)?.span;
        let mut stmts = Vec::new();
        loop {
            while self.eat(TokenKind::Semi) {}
            if self.at(TokenKind::RBrace) || self.at(TokenKind::Eof) {
                break;
            }
            stmts.push(self.parse_statement()?);
        }
        let close = self.peek(0).span;
        self.expect_closing(TokenKind::RBrace, "block", "}", open)?;
        Ok(Node::new(NodeKind::Block(stmts), open.to(close)))
    }

    pub fn parse_statement(&mut self) -> Result<Node, CoreError> {
        match self.peek(0).kind {
            TokenKind::Return => self.parse_return(),
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::LBrace => self.parse_block(),
            _ => self.parse_statement_expression(),
        }
    }

    fn parse_return(&mut self) -> Result<Node, CoreError> {
        let span = self.expect(TokenKind::Return)?.span;
        if matches!(
            self.peek(0).kind,
            TokenKind::Semi | TokenKind::RBrace | TokenKind::Eof
        ) {
            return Ok(Node::new(NodeKind::Return(None), span));
        }
        let value = self.parse_expression()?;
        let whole = span.to(value.span);
        Ok(Node::new(NodeKind::Return(Some(Box::new(value))), whole))
    }

    fn parse_if(&mut self) -> Result<Node, CoreError> {
        let span = self.expect(TokenKind::If)?.span;
        let cond = self.parse_expression()?;
        let then = self.parse_block()?;
        let otherwise = if self.eat(TokenKind::Else) {
            if self.at(TokenKind::If) {
                Some(Box::new(self.parse_if()?))
            } else {
                Some(Box::new(self.parse_block()?))
            }
        } else {
            None
        };
        let end = otherwise.as_ref().map_or(then.span, |node| node.span);
        Ok(Node::new(
            NodeKind::If {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise,
            },
            span.to(end),
        ))
    }

    fn parse_while(&mut self) -> Result<Node, CoreError> {
        let span = self.expect(TokenKind::While)?.span;
        let cond = self.parse_expression()?;
        let body = self.parse_block()?;
        let whole = span.to(body.span);
        Ok(Node::new(
            NodeKind::While {
                cond: Box::new(cond),
                body: Box::new(body),
            },
            whole,
        ))
    }

    /// `for init; cond; step { body }`
    fn parse_for(&mut self) -> Result<Node, CoreError> {
        let span = self.expect(TokenKind::For)?.span;
        let init = self.parse_statement_expression()?;
        self.expect(TokenKind::Semi)?;
        let cond = self.parse_expression()?;
        self.expect(TokenKind::Semi)?;
        let step = self.parse_expression()?;
        let body = self.parse_block()?;
        let whole = span.to(body.span);
        Ok(Node::new(
            NodeKind::For {
                init: Box::new(init),
                cond: Box::new(cond),
                step: Box::new(step),
                body: Box::new(body),
            },
            whole,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::span::FileId;

    fn statement(source: &str) -> Result<Node, CoreError> {
        let tokens = lex(FileId(0), source).into_tokens().expect("lex");
        let mut parser = Parser::new(source, &tokens);
        let node = parser.parse_statement()?;
        parser.expect_eof()?;
        Ok(node)
    }

    #[test]
    fn parses_if_else_chain() {
        let node = statement("if n == 0 { return 1; } else if n < 0 { return 0 } else { n }")
            .expect("parse");
        assert_eq!(
            node.to_string(),
            "(if (== n 0) (block (return 1)) (if (< n 0) (block (return 0)) (block n)))"
        );
    }

    #[test]
    fn parses_for_loop_with_declaration() {
        let node = statement("for int i := 0; i < 10; i += 1 { sum += i; }").expect("parse");
        assert_eq!(
            node.to_string(),
            "(for (= (decl int i) 0) (< i 10) (+= i 1) (block (+= sum i)))"
        );
    }

    #[test]
    fn parses_while_and_bare_return() {
        let node = statement("while running { tick(); return }").expect("parse");
        assert_eq!(node.to_string(), "(while running (block (call tick) (return)))");
    }

    #[test]
    fn unterminated_block_is_reported() {
        let err = statement("{ x := 1").unwrap_err();
        assert!(matches!(
            err,
            CoreError::Unterminated {
                construct: "block",
                ..
            }
        ));
    }

    #[test]
    fn for_requires_separators() {
        let err = statement("for i := 0 i < 3; i += 1 {}").unwrap_err();
        assert!(matches!(err, CoreError::Syntax { .. }));
    }
}
