//! Expressions: precedence climbing over unary operands, and the
//! component-chain builder for primaries and their suffixes.

use crate::ast::{AssignOp, BinaryOp, Capability, Node, NodeKind, UnaryOp};
use crate::error::CoreError;
use crate::lexer::{TokenKind, unescape};
use crate::span::Span;

use super::Parser;
use super::chain::{Component, ComponentKind};

impl<'a> Parser<'a> {
    pub fn parse_expression(&mut self) -> Result<Node, CoreError> {
        let lhs = self.parse_unary()?;
        self.parse_binary_rhs(0, lhs)
    }

    /// An expression in statement position, where `int x` / `let x`
    /// declarations are allowed as the leading operand.
    pub fn parse_statement_expression(&mut self) -> Result<Node, CoreError> {
        let lhs = if self.at(TokenKind::Operator) {
            self.parse_unary()?
        } else {
            self.parse_chain(true)?
        };
        self.parse_binary_rhs(0, lhs)
    }

    /// Consume operators binding at least as tightly as `min_prec`.
    pub fn parse_binary_rhs(&mut self, min_prec: u8, mut lhs: Node) -> Result<Node, CoreError> {
        loop {
            let Some(prec) = self.binary_precedence() else {
                return Ok(lhs);
            };
            if prec < min_prec {
                return Ok(lhs);
            }
            let op_token = self.advance();
            let op = self.text(op_token);

            let mut rhs = self.parse_unary()?;
            if let Some(next_prec) = self.binary_precedence() {
                if prec < next_prec {
                    rhs = self.parse_binary_rhs(prec + 1, rhs)?;
                }
            }

            lhs = build_binary(op, lhs, rhs, op_token.span)?;
        }
    }

    fn parse_unary(&mut self) -> Result<Node, CoreError> {
        let token = self.peek(0);
        if token.kind == TokenKind::Operator {
            let Some(op) = UnaryOp::from_spelling(self.text(token)) else {
                return Err(self.unexpected("expression"));
            };
            self.advance();
            let operand = self.parse_unary()?;
            let span = token.span.to(operand.span);
            match op {
                UnaryOp::AddressOf => operand.require(Capability::Assignable)?,
                _ => operand.require(Capability::Accessible)?,
            }
            // Fold negative literals so they stay constant.
            let kind = match (op, operand.kind) {
                (UnaryOp::Neg, NodeKind::Int(value)) => NodeKind::Int(-value),
                (UnaryOp::Neg, NodeKind::Float(value)) => NodeKind::Float(-value),
                (op, kind) => NodeKind::Unary {
                    op,
                    operand: Box::new(Node::new(kind, operand.span)),
                },
            };
            return Ok(Node::new(kind, span));
        }
        self.parse_chain(false)
    }

    /// Build and fold the component chain of one operand. Where
    /// declarations are allowed, `type name` is tried before a plain
    /// operand chain.
    pub fn parse_chain(&mut self, allow_declaration: bool) -> Result<Node, CoreError> {
        if allow_declaration {
            return self.first_of(
                "statement operand",
                &[Parser::parse_declaration_chain, Parser::parse_operand_chain],
            );
        }
        self.parse_operand_chain()
    }

    fn parse_declaration_chain(&mut self) -> Result<Node, CoreError> {
        let mut chain = Component::base(self.peek(0).span);
        chain.add(self.parse_declaration()?);
        chain.fold(None)
    }

    fn parse_operand_chain(&mut self) -> Result<Node, CoreError> {
        let mut chain = Component::base(self.peek(0).span);
        chain.add(self.parse_primary()?);

        // Greedy: a suffix continues the chain until none follows.
        while let Some(suffix) = self.parse_suffix()? {
            chain.add(suffix);
        }

        chain.fold(None)
    }

    /// `type name` or `let name`.
    fn parse_declaration(&mut self) -> Result<Component, CoreError> {
        let start = self.peek(0).span;
        if self.eat(TokenKind::Let) {
            let (name, span) = self.expect_ident()?;
            return Ok(Component::new(
                ComponentKind::IdentDecl { ty: None, name },
                start.to(span),
            ));
        }
        let ty = self.parse_type()?;
        if ty.pointer_level > 0 && !ty.unknown && !self.is_type_name(&ty.name) {
            return Err(CoreError::syntax("type name", format!("`{}`", ty.name), ty.span));
        }
        let (name, span) = self.expect_ident()?;
        Ok(Component::new(
            ComponentKind::IdentDecl { ty: Some(ty), name },
            start.to(span),
        ))
    }

    fn parse_primary(&mut self) -> Result<Component, CoreError> {
        let token = self.peek(0);
        let span = token.span;
        let kind = match token.kind {
            TokenKind::Ident => {
                let text = self.text(token);
                if self.peek(1).kind != TokenKind::Colon && self.is_type_name(text) {
                    return Err(CoreError::syntax("expression", format!("type `{text}`"), span));
                }
                let (name, span) = self.parse_qualified_name()?;
                return Ok(Component::new(ComponentKind::Ident(name), span));
            }
            TokenKind::IntLiteral => {
                let text = self.text(token).replace('_', "");
                let value = text.parse::<i64>().map_err(|_| {
                    CoreError::syntax("integer in range", format!("`{text}`"), span)
                })?;
                self.advance();
                ComponentKind::Int(value)
            }
            TokenKind::FloatLiteral => {
                let text = self.text(token).replace('_', "");
                let value = text
                    .parse::<f64>()
                    .map_err(|_| CoreError::syntax("float literal", format!("`{text}`"), span))?;
                self.advance();
                ComponentKind::Float(value)
            }
            TokenKind::StringLiteral => {
                self.advance();
                ComponentKind::String(unescape(self.text(token)))
            }
            TokenKind::CharLiteral => {
                let value = unescape(self.text(token));
                let [byte] = value.as_bytes() else {
                    return Err(CoreError::syntax(
                        "single byte character",
                        format!("{value:?}"),
                        span,
                    ));
                };
                let byte = *byte;
                self.advance();
                ComponentKind::Char(byte)
            }
            TokenKind::BoolLiteral => {
                self.advance();
                ComponentKind::Bool(self.text(token) == "true")
            }
            TokenKind::Nil => {
                self.advance();
                ComponentKind::Nil
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect_closing(TokenKind::RParen, "parenthesized expression", ")", span)?;
                ComponentKind::Parenthesis(inner)
            }
            TokenKind::LBracket => {
                self.advance();
                let values = self.parse_list(TokenKind::RBracket, "array literal", "]", span)?;
                ComponentKind::Array(values)
            }
            TokenKind::Sizeof | TokenKind::Info => {
                self.advance();
                let open = self.expect(TokenKind::LParen)?.span;
                let ty = self.parse_type()?;
                self.expect_closing(TokenKind::RParen, "type query", ")", open)?;
                if token.kind == TokenKind::Sizeof {
                    ComponentKind::SizeOf(ty)
                } else {
                    ComponentKind::TypeInfo(ty)
                }
            }
            _ => return Err(self.unexpected("expression")),
        };
        let end = self.peek(0).span;
        Ok(Component::new(kind, span_until(span, end)))
    }

    /// A call, subscript, field access or cast following an operand, or
    /// `None` when the chain ends here.
    fn parse_suffix(&mut self) -> Result<Option<Component>, CoreError> {
        let token = self.peek(0);
        let span = token.span;
        let kind = match token.kind {
            TokenKind::LParen => {
                self.advance();
                ComponentKind::Call(self.parse_list(TokenKind::RParen, "argument list", ")", span)?)
            }
            TokenKind::LBracket => {
                self.advance();
                let index = self.parse_expression()?;
                self.expect_closing(TokenKind::RBracket, "subscript", "]", span)?;
                ComponentKind::Subscript(index)
            }
            TokenKind::Dot => {
                self.advance();
                let (field, _) = self.expect_ident()?;
                ComponentKind::Dot(field)
            }
            TokenKind::As => {
                self.advance();
                ComponentKind::Cast(self.parse_cast_type()?)
            }
            _ => return Ok(None),
        };
        Ok(Some(Component::new(kind, span)))
    }

    /// Comma separated expressions up to `close`; the opener is consumed.
    fn parse_list(
        &mut self,
        close: TokenKind,
        construct: &'static str,
        delimiter: &'static str,
        opened_at: Span,
    ) -> Result<Vec<Node>, CoreError> {
        let mut values = Vec::new();
        if self.eat(close) {
            return Ok(values);
        }
        loop {
            if self.at(TokenKind::Eof) {
                break;
            }
            values.push(self.parse_expression()?);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect_closing(close, construct, delimiter, opened_at)?;
        Ok(values)
    }
}

fn build_binary(op: &str, lhs: Node, rhs: Node, op_span: Span) -> Result<Node, CoreError> {
    let span = lhs.span.to(rhs.span);
    rhs.require(Capability::Accessible)?;
    if let Some(assign) = AssignOp::from_spelling(op) {
        lhs.require(Capability::Assignable)?;
        return Ok(Node::new(
            NodeKind::Assign {
                op: assign,
                target: Box::new(lhs),
                value: Box::new(rhs),
            },
            span,
        ));
    }
    let Some(binary) = BinaryOp::from_spelling(op) else {
        return Err(CoreError::syntax("binary operator", format!("`{op}`"), op_span));
    };
    lhs.require(Capability::Accessible)?;
    Ok(Node::new(
        NodeKind::Binary {
            op: binary,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        span,
    ))
}

fn span_until(start: Span, next: Span) -> Span {
    Span {
        end: next.start.max(start.end),
        ..start
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::parser::parse_expression;
    use crate::span::FileId;

    fn sexp(source: &str) -> String {
        parse_expression(source).expect("parse").to_string()
    }

    #[test]
    fn multiplication_nests_under_addition() {
        assert_eq!(sexp("a + b * c"), "(+ a (* b c))");
        assert_eq!(sexp("a * b + c"), "(+ (* a b) c)");
    }

    #[test]
    fn every_tighter_pair_nests_on_the_right() {
        let tiers: [&[&str]; 6] = [
            &["||", "&&", "^"],
            &["==", "!="],
            &["<", "<=", ">", ">="],
            &[">>", "<<"],
            &["+", "-"],
            &["*", "/", "%"],
        ];
        for (i, loose) in tiers.iter().enumerate() {
            for tight in tiers.iter().skip(i + 1) {
                for lo in loose.iter() {
                    for hi in tight.iter() {
                        let source = format!("a {lo} b {hi} c");
                        assert_eq!(sexp(&source), format!("({lo} a ({hi} b c))"), "{source}");
                    }
                }
            }
        }
    }

    #[test]
    fn same_precedence_is_left_associative() {
        assert_eq!(sexp("a - b - c"), "(- (- a b) c)");
        assert_eq!(sexp("a + b * c + d"), "(+ (+ a (* b c)) d)");
    }

    #[test]
    fn assignment_takes_the_whole_right_side() {
        assert_eq!(sexp("x = a + b"), "(= x (+ a b))");
        assert_eq!(sexp("x += 2 * y"), "(+= x (* 2 y))");
    }

    #[test]
    fn suffixes_chain_left_to_right() {
        assert_eq!(sexp("foo(1, 2)[0].bar"), "(dot (index (call foo 1 2) 0) bar)");
        assert_eq!(sexp("a.b.c"), "(dot (dot a b) c)");
    }

    #[test]
    fn method_call_chains_through_dot() {
        assert_eq!(sexp("p.len()"), "(call (dot p len))");
    }

    #[test]
    fn cast_suffix_binds_before_binary_operators() {
        assert_eq!(sexp("x as float * 2.0"), "(* (as x float) 2.0)");
        assert_eq!(sexp("p as byte*"), "(as p byte*)");
    }

    #[test]
    fn unary_operators_and_negative_literals() {
        assert_eq!(sexp("-5"), "-5");
        assert_eq!(sexp("-x * 2"), "(* (neg x) 2)");
        assert_eq!(sexp("*p + &q"), "(+ (deref p) (addr q))");
        assert_eq!(sexp("!done"), "(not done)");
    }

    #[test]
    fn primaries() {
        assert_eq!(sexp("[1, 2, 3]"), "[1 2 3]");
        assert_eq!(sexp("sizeof(long)"), "(sizeof long)");
        assert_eq!(sexp("info(int).size"), "(dot (info int) size)");
        assert_eq!(sexp("io:print(\"hi\")"), "(call io:print \"hi\")");
        assert_eq!(sexp("'a'"), "'a'");
        assert_eq!(sexp("(a + b) * c"), "(* (+ a b) c)");
        assert_eq!(sexp("\"n=%d\"(n + 1)"), "(format \"n=%d\" (+ n 1))");
    }

    #[test]
    fn unterminated_call_is_reported() {
        let err = parse_expression("f(1, 2").unwrap_err();
        assert!(matches!(
            err,
            CoreError::Unterminated {
                delimiter: ")",
                ..
            }
        ));
    }

    #[test]
    fn calling_a_literal_is_a_capability_mismatch() {
        let err = parse_expression("4(2)").unwrap_err();
        assert!(matches!(
            err,
            CoreError::CapabilityMismatch {
                expected: Capability::Callable,
                ..
            }
        ));
    }

    #[test]
    fn assigning_to_a_call_is_rejected() {
        let err = parse_expression("f() = 3").unwrap_err();
        assert!(matches!(
            err,
            CoreError::CapabilityMismatch {
                expected: Capability::Assignable,
                found: "function call",
                ..
            }
        ));
    }

    #[test]
    fn declarations_only_in_statement_position() {
        let source = "int x := 5";
        let tokens = lex(FileId(0), source).into_tokens().expect("lex");
        let mut parser = Parser::new(source, &tokens);
        let node = parser.parse_statement_expression().expect("parse");
        assert_eq!(node.to_string(), "(= (decl int x) 5)");

        assert!(parse_expression(source).is_err());
    }

    #[test]
    fn failed_declaration_fork_does_not_consume_tokens() {
        let source = "count + 1";
        let tokens = lex(FileId(0), source).into_tokens().expect("lex");

        let mut with_fork = Parser::new(source, &tokens);
        let node = with_fork.parse_statement_expression().expect("parse");

        let mut without_fork = Parser::new(source, &tokens);
        let plain = without_fork.parse_expression().expect("parse");

        assert_eq!(node, plain);
        assert_eq!(with_fork.position(), without_fork.position());
    }

    #[test]
    fn pointer_declaration_requires_a_known_type() {
        let source = "int* p := nil";
        let tokens = lex(FileId(0), source).into_tokens().expect("lex");
        let mut parser = Parser::new(source, &tokens);
        let node = parser.parse_statement_expression().expect("parse");
        assert_eq!(node.to_string(), "(= (decl int* p) nil)");

        let source = "a * b";
        let tokens = lex(FileId(0), source).into_tokens().expect("lex");
        let mut parser = Parser::new(source, &tokens);
        let node = parser.parse_statement_expression().expect("parse");
        assert_eq!(node.to_string(), "(* a b)");
    }

    #[test]
    fn type_name_without_declared_name_exhausts_both_readings() {
        let source = "int )";
        let tokens = lex(FileId(0), source).into_tokens().expect("lex");
        let mut parser = Parser::new(source, &tokens);
        let err = parser.parse_statement_expression().unwrap_err();
        match err {
            CoreError::AmbiguityExhausted { production, last, .. } => {
                assert_eq!(production, "statement operand");
                assert!(matches!(*last, CoreError::Syntax { ref expected, .. } if expected == "expression"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(parser.position(), 0);
    }

    #[test]
    fn type_names_are_not_values() {
        let err = parse_expression("int + 1").unwrap_err();
        assert!(matches!(err, CoreError::Syntax { .. }));
        assert_eq!(sexp("math:int"), "math:int");
    }

    #[test]
    fn error_inside_an_opened_suffix_is_reported_there() {
        let err = parse_expression("f(1,)").unwrap_err();
        assert!(matches!(err, CoreError::Syntax { ref expected, .. } if expected == "expression"));
        assert_eq!(err.span().map(|span| span.column), Some(5));

        let err = parse_expression("p.(x)").unwrap_err();
        assert_eq!(err.span().map(|span| span.column), Some(3));
    }
}
