//! Top-level declarations: namespace, include, link, functions, classes
//! and global variables.

use crate::ast::{ClassDef, Field, FunctionDef, GlobalDef, Item, Node, NodeKind, Param, TypeRef, Unit};
use crate::error::CoreError;
use crate::lexer::{TokenKind, unescape};
use crate::span::Span;

use super::Parser;

/// One parameter as written, before an untyped name borrows the type of
/// the parameter in front of it.
enum ParamForm {
    Typed(Param),
    Untyped(String, Span),
}

impl<'a> Parser<'a> {
    pub fn parse_unit(&mut self, default_package: &str) -> Result<Unit, CoreError> {
        let mut unit = Unit {
            package: default_package.to_string(),
            includes: Vec::new(),
            links: Vec::new(),
            items: Vec::new(),
        };

        loop {
            match self.peek(0).kind {
                TokenKind::Eof => break,
                TokenKind::Semi => {
                    self.advance();
                }
                TokenKind::Is => {
                    self.advance();
                    let (name, _) = self.expect_ident()?;
                    unit.package = name;
                }
                TokenKind::Include => {
                    self.advance();
                    loop {
                        unit.includes.push(self.parse_string()?);
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                TokenKind::Link => {
                    self.advance();
                    unit.links.push(self.parse_string()?);
                }
                TokenKind::Func | TokenKind::Pure => {
                    unit.items.push(Item::Function(self.parse_function()?))
                }
                TokenKind::Class => unit.items.push(Item::Class(self.parse_class()?)),
                TokenKind::Ident | TokenKind::Question => {
                    unit.items.push(Item::Global(self.parse_global()?))
                }
                _ => return Err(self.unexpected("declaration")),
            }
        }

        Ok(unit)
    }

    fn parse_string(&mut self) -> Result<String, CoreError> {
        let token = self.expect(TokenKind::StringLiteral)?;
        Ok(unescape(self.text(token)))
    }

    /// `func [nomangle] name(params) [type] body`. `pure` (or `λ`) in
    /// place of `func` requires an `=` or `->` body.
    pub fn parse_function(&mut self) -> Result<FunctionDef, CoreError> {
        let pure = self.at(TokenKind::Pure);
        let start = if pure {
            self.advance().span
        } else {
            self.expect(TokenKind::Func)?.span
        };

        let mut nomangle = false;
        if self.peek(1).kind == TokenKind::Ident && self.text(self.peek(0)) == "nomangle" {
            self.advance();
            nomangle = true;
        }

        let (name, _) = self.expect_ident()?;
        let open = self.expect(TokenKind::LParen)?.span;
        let (params, variadic) = self.parse_params()?;
        self.expect_closing(TokenKind::RParen, "parameter list", ")", open)?;

        let ret = if self.at(TokenKind::LBrace)
            || self.at(TokenKind::Arrow)
            || self.at(TokenKind::Ellipsis)
            || self.at_op("=")
        {
            TypeRef::named("void", self.peek(0).span)
        } else {
            self.parse_type()?
        };

        if pure && !self.at(TokenKind::Arrow) && !self.at_op("=") {
            return Err(self.unexpected("`=` or `->` body of a pure function"));
        }
        let body = if self.eat(TokenKind::Ellipsis) {
            None
        } else if self.eat(TokenKind::Arrow) || self.eat_op("=") {
            let value = self.parse_expression()?;
            let span = value.span;
            let ret_stmt = Node::new(NodeKind::Return(Some(Box::new(value))), span);
            Some(Node::new(NodeKind::Block(vec![ret_stmt]), span))
        } else {
            Some(self.parse_block()?)
        };

        let end = body.as_ref().map_or(start, |b| b.span);
        Ok(FunctionDef {
            name,
            params,
            ret,
            variadic,
            nomangle,
            pure,
            body,
            span: start.to(end),
        })
    }

    /// Parameters up to (not including) `)`. A parameter without a type
    /// reuses the type of the one before it: `(int a, b)`.
    fn parse_params(&mut self) -> Result<(Vec<Param>, bool), CoreError> {
        let mut params: Vec<Param> = Vec::new();
        let mut variadic = false;
        if self.at(TokenKind::RParen) {
            return Ok((params, variadic));
        }
        loop {
            if self.eat(TokenKind::Ellipsis) {
                variadic = true;
                break;
            }
            let param = match self.first_of(
                "parameter",
                &[Parser::parse_typed_param, Parser::parse_untyped_param],
            )? {
                ParamForm::Typed(param) => param,
                ParamForm::Untyped(name, span) => {
                    let Some(previous) = params.last() else {
                        return Err(CoreError::syntax("parameter type", format!("`{name}`"), span));
                    };
                    Param {
                        name,
                        ty: previous.ty.clone(),
                    }
                }
            };
            params.push(param);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        Ok((params, variadic))
    }

    fn parse_typed_param(&mut self) -> Result<ParamForm, CoreError> {
        let ty = self.parse_type()?;
        let (name, _) = self.expect_ident()?;
        Ok(ParamForm::Typed(Param { name, ty }))
    }

    /// A bare name, which must end the parameter.
    fn parse_untyped_param(&mut self) -> Result<ParamForm, CoreError> {
        let (name, span) = self.expect_ident()?;
        if !self.at(TokenKind::Comma) && !self.at(TokenKind::RParen) {
            return Err(self.unexpected("`,` or `)`"));
        }
        Ok(ParamForm::Untyped(name, span))
    }

    fn parse_class(&mut self) -> Result<ClassDef, CoreError> {
        let start = self.expect(TokenKind::Class)?.span;
        let (name, _) = self.expect_ident()?;
        let open = self.expect(TokenKind::LBrace)?.span;

        let mut fields = Vec::new();
        let mut methods = Vec::new();
        loop {
            while self.eat(TokenKind::Semi) {}
            match self.peek(0).kind {
                TokenKind::RBrace | TokenKind::Eof => break,
                TokenKind::Func | TokenKind::Pure => methods.push(self.parse_function()?),
                _ => {
                    let ty = self.parse_type()?;
                    let (name, _) = self.expect_ident()?;
                    fields.push(Field { name, ty });
                }
            }
        }
        let end = self.peek(0).span;
        self.expect_closing(TokenKind::RBrace, "class body", "}", open)?;

        Ok(ClassDef {
            name,
            fields,
            methods,
            span: start.to(end),
        })
    }

    /// `type name [= expr | ...]`
    fn parse_global(&mut self) -> Result<GlobalDef, CoreError> {
        let ty = self.parse_type()?;
        let (name, name_span) = self.expect_ident()?;
        let mut global = GlobalDef {
            name,
            span: ty.span.to(name_span),
            ty,
            init: None,
            external: false,
        };
        if self.eat(TokenKind::Ellipsis) {
            global.external = true;
        } else if self.eat_op("=") || self.eat_op(":=") {
            let init = self.parse_expression()?;
            global.span = global.span.to(init.span);
            global.init = Some(init);
        }
        Ok(global)
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::Item;
    use crate::error::CoreError;
    use crate::parser::parse;
    use crate::span::FileId;

    #[test]
    fn parses_namespace_includes_and_links() {
        let unit = parse(FileId(0), "is math\ninclude \"std:io\", \"std:mem\"\nlink \"m.c\"", "main")
            .expect("parse");
        assert_eq!(unit.package, "math");
        assert_eq!(unit.includes, vec!["std:io", "std:mem"]);
        assert_eq!(unit.links, vec!["m.c"]);
    }

    #[test]
    fn parses_functions_with_shared_parameter_types() {
        let unit = parse(FileId(0), "func add(int a, b, float c) int { return a + b }", "main")
            .expect("parse");
        let Item::Function(func) = &unit.items[0] else {
            panic!("expected function");
        };
        assert_eq!(func.name, "add");
        let types: Vec<String> = func.params.iter().map(|p| p.ty.to_string()).collect();
        assert_eq!(types, vec!["int", "int", "float"]);
        assert_eq!(func.ret.name, "int");
        assert!(!func.variadic);
    }

    #[test]
    fn parses_external_and_variadic_declarations() {
        let unit = parse(FileId(0), "func printf(string fmt, ...) int ...", "main").expect("parse");
        let Item::Function(func) = &unit.items[0] else {
            panic!("expected function");
        };
        assert!(func.variadic);
        assert!(func.is_external());
    }

    #[test]
    fn implicit_return_body() {
        let unit = parse(FileId(0), "func sq(? x) ? = x * x", "main").expect("parse");
        let Item::Function(func) = &unit.items[0] else {
            panic!("expected function");
        };
        assert!(func.is_generic());
        let body = func.body.as_ref().expect("body");
        assert_eq!(body.to_string(), "(block (return (* x x)))");
    }

    #[test]
    fn omitted_return_type_is_void() {
        let unit = parse(FileId(0), "func nomangle main() { }", "main").expect("parse");
        let Item::Function(func) = &unit.items[0] else {
            panic!("expected function");
        };
        assert!(func.nomangle);
        assert_eq!(func.ret.name, "void");
    }

    #[test]
    fn parses_classes() {
        let source = "class Point { int x; int y\n func len() int { return this.x } }";
        let unit = parse(FileId(0), source, "main").expect("parse");
        let Item::Class(class) = &unit.items[0] else {
            panic!("expected class");
        };
        assert_eq!(class.name, "Point");
        assert_eq!(class.fields.len(), 2);
        assert_eq!(class.methods[0].name, "len");
    }

    #[test]
    fn parses_globals() {
        let unit = parse(FileId(0), "int counter = 10\nlong errno ...", "main").expect("parse");
        let Item::Global(counter) = &unit.items[0] else {
            panic!("expected global");
        };
        assert_eq!(counter.init.as_ref().map(|n| n.to_string()), Some("10".to_string()));
        let Item::Global(errno) = &unit.items[1] else {
            panic!("expected global");
        };
        assert!(errno.external);
    }

    #[test]
    fn untyped_first_parameter_is_an_error() {
        let err = parse(FileId(0), "func f(a) {}", "main").unwrap_err();
        assert!(matches!(err, CoreError::Syntax { .. }));
    }

    #[test]
    fn stray_tokens_at_top_level_are_rejected() {
        let err = parse(FileId(0), "return 1", "main").unwrap_err();
        assert!(matches!(err, CoreError::Syntax { .. }));
    }

    #[test]
    fn pure_functions_take_an_expression_body() {
        let unit = parse(FileId(0), "pure sq(int x) int = x * x
λ half(double x) double -> x / 2.0", "main")
            .expect("parse");
        for item in &unit.items {
            let Item::Function(func) = item else {
                panic!("expected function");
            };
            assert!(func.pure);
        }
        assert!(unit.to_string().contains("(pure sq (int x) int"));

        let err = parse(FileId(0), "pure sq(int x) int { return x * x }", "main").unwrap_err();
        assert!(matches!(err, CoreError::Syntax { .. }));
        let err = parse(FileId(0), "pure abs(int x) int ...", "main").unwrap_err();
        assert!(matches!(err, CoreError::Syntax { .. }));
    }
}
