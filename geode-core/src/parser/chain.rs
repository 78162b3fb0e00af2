//! Expression component chains.
//!
//! A compound expression such as `foo(1)[0].bar` is collected as a
//! `Base` sentinel followed by one component per primary or suffix.
//! `fold` then walks the chain once, left to right, turning each
//! component plus the node built so far into the next node.

use crate::ast::{Capability, Node, NodeKind, TypeRef};
use crate::error::CoreError;
use crate::span::Span;

#[derive(Debug, Clone, PartialEq)]
pub enum ComponentKind {
    /// Chain root. Passes the incoming node through unchanged.
    Base,
    Ident(String),
    IdentDecl {
        ty: Option<TypeRef>,
        name: String,
    },
    Call(Vec<Node>),
    Subscript(Node),
    Dot(String),
    Array(Vec<Node>),
    Cast(TypeRef),
    TypeInfo(TypeRef),
    SizeOf(TypeRef),
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Char(u8),
    Nil,
    Parenthesis(Node),
}

impl ComponentKind {
    fn describe(&self) -> &'static str {
        match self {
            ComponentKind::Base => "chain base",
            ComponentKind::Ident(_) => "identifier",
            ComponentKind::IdentDecl { .. } => "declaration",
            ComponentKind::Call(_) => "call",
            ComponentKind::Subscript(_) => "subscript",
            ComponentKind::Dot(_) => "field access",
            ComponentKind::Array(_) => "array literal",
            ComponentKind::Cast(_) => "cast",
            ComponentKind::TypeInfo(_) => "type info",
            ComponentKind::SizeOf(_) => "sizeof",
            ComponentKind::Int(_) | ComponentKind::Float(_) => "number",
            ComponentKind::String(_) => "string literal",
            ComponentKind::Bool(_) => "boolean literal",
            ComponentKind::Char(_) => "character literal",
            ComponentKind::Nil => "nil",
            ComponentKind::Parenthesis(_) => "parenthesized expression",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub kind: ComponentKind,
    pub span: Span,
    pub next: Option<Box<Component>>,
}

impl Component {
    pub fn new(kind: ComponentKind, span: Span) -> Self {
        Component {
            kind,
            span,
            next: None,
        }
    }

    pub fn base(span: Span) -> Self {
        Component::new(ComponentKind::Base, span)
    }

    /// Append `component` after the current tail.
    pub fn add(&mut self, component: Component) {
        if let Some(next) = self.next.as_mut() {
            next.add(component);
        } else {
            self.next = Some(Box::new(component));
        }
    }

    pub fn len(&self) -> usize {
        1 + self.next.as_ref().map_or(0, |next| next.len())
    }

    /// Fold the chain into a single node, starting from `prev`.
    pub fn fold(self, prev: Option<Node>) -> Result<Node, CoreError> {
        let start = self.span;
        let mut prev = prev;
        let mut current = Some(Box::new(self));
        while let Some(component) = current {
            let Component { kind, span, next } = *component;
            prev = construct(kind, span, prev)?;
            current = next;
        }
        prev.ok_or_else(|| CoreError::syntax("expression", "empty expression", start))
    }
}

fn construct(kind: ComponentKind, span: Span, prev: Option<Node>) -> Result<Option<Node>, CoreError> {
    let node = match kind {
        ComponentKind::Base => return Ok(prev),
        ComponentKind::Call(args) => {
            if let Some(Node {
                kind: NodeKind::Str(template),
                span: start,
            }) = prev
            {
                return Ok(Some(Node::new(NodeKind::Format { template, args }, start.to(span))));
            }
            let callee = suffix_target(prev, "call", span, Capability::Callable)?;
            let whole = callee.span.to(span);
            Node::new(
                NodeKind::Call {
                    callee: Box::new(callee),
                    args,
                },
                whole,
            )
        }
        ComponentKind::Subscript(index) => {
            let base = suffix_target(prev, "subscript", span, Capability::Accessible)?;
            index.require(Capability::Accessible)?;
            let whole = base.span.to(span);
            Node::new(
                NodeKind::Subscript {
                    base: Box::new(base),
                    index: Box::new(index),
                },
                whole,
            )
        }
        ComponentKind::Dot(field) => {
            let base = suffix_target(prev, "field access", span, Capability::Reference)?;
            let whole = base.span.to(span);
            Node::new(
                NodeKind::Dot {
                    base: Box::new(base),
                    field,
                },
                whole,
            )
        }
        ComponentKind::Cast(ty) => {
            let value = suffix_target(prev, "cast", span, Capability::Accessible)?;
            let whole = value.span.to(span);
            Node::new(
                NodeKind::Cast {
                    value: Box::new(value),
                    ty,
                },
                whole,
            )
        }
        primary => {
            if let Some(prev) = prev {
                return Err(CoreError::syntax(
                    "operator",
                    primary.describe(),
                    prev.span.to(span),
                ));
            }
            match primary {
                ComponentKind::Ident(name) => Node::new(NodeKind::Ident(name), span),
                ComponentKind::IdentDecl { ty, name } => {
                    Node::new(NodeKind::VarDecl { ty, name }, span)
                }
                ComponentKind::Array(values) => {
                    for value in &values {
                        value.require(Capability::Accessible)?;
                    }
                    Node::new(NodeKind::Array(values), span)
                }
                ComponentKind::TypeInfo(ty) => Node::new(NodeKind::TypeInfo(ty), span),
                ComponentKind::SizeOf(ty) => Node::new(NodeKind::SizeOf(ty), span),
                ComponentKind::Int(value) => Node::new(NodeKind::Int(value), span),
                ComponentKind::Float(value) => Node::new(NodeKind::Float(value), span),
                ComponentKind::String(value) => Node::new(NodeKind::Str(value), span),
                ComponentKind::Bool(value) => Node::new(NodeKind::Bool(value), span),
                ComponentKind::Char(value) => Node::new(NodeKind::Char(value), span),
                ComponentKind::Nil => Node::new(NodeKind::Nil, span),
                ComponentKind::Parenthesis(inner) => inner,
                ComponentKind::Base
                | ComponentKind::Call(_)
                | ComponentKind::Subscript(_)
                | ComponentKind::Dot(_)
                | ComponentKind::Cast(_) => return Ok(None),
            }
        }
    };
    Ok(Some(node))
}

/// The node a suffix component applies to, checked for `capability`.
fn suffix_target(
    prev: Option<Node>,
    suffix: &'static str,
    span: Span,
    capability: Capability,
) -> Result<Node, CoreError> {
    let prev = prev.ok_or_else(|| CoreError::syntax("expression", suffix, span))?;
    prev.require(capability)?;
    Ok(prev)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comp(kind: ComponentKind) -> Component {
        Component::new(kind, Span::default())
    }

    fn int(value: i64) -> Node {
        Node::new(NodeKind::Int(value), Span::default())
    }

    #[test]
    fn add_appends_at_the_tail() {
        let mut chain = Component::base(Span::default());
        chain.add(comp(ComponentKind::Ident("a".into())));
        chain.add(comp(ComponentKind::Dot("b".into())));
        chain.add(comp(ComponentKind::Dot("c".into())));
        assert_eq!(chain.len(), 4);
        let node = chain.fold(None).expect("fold");
        assert_eq!(node.to_string(), "(dot (dot a b) c)");
    }

    #[test]
    fn folds_suffixes_left_to_right() {
        let mut chain = Component::base(Span::default());
        chain.add(comp(ComponentKind::Ident("foo".into())));
        chain.add(comp(ComponentKind::Call(vec![int(1), int(2)])));
        chain.add(comp(ComponentKind::Subscript(int(0))));
        chain.add(comp(ComponentKind::Dot("bar".into())));
        let node = chain.fold(None).expect("fold");
        assert_eq!(node.to_string(), "(dot (index (call foo 1 2) 0) bar)");
    }

    #[test]
    fn call_on_literal_is_a_capability_mismatch() {
        let mut chain = Component::base(Span::default());
        chain.add(comp(ComponentKind::Int(4)));
        chain.add(comp(ComponentKind::Call(vec![])));
        let err = chain.fold(None).unwrap_err();
        assert!(matches!(
            err,
            CoreError::CapabilityMismatch {
                expected: Capability::Callable,
                found: "integer literal",
                ..
            }
        ));
    }

    #[test]
    fn dot_after_call_requires_reference() {
        let mut chain = Component::base(Span::default());
        chain.add(comp(ComponentKind::Ident("f".into())));
        chain.add(comp(ComponentKind::Call(vec![])));
        chain.add(comp(ComponentKind::Dot("x".into())));
        let err = chain.fold(None).unwrap_err();
        assert!(matches!(
            err,
            CoreError::CapabilityMismatch {
                expected: Capability::Reference,
                found: "function call",
                ..
            }
        ));
    }

    #[test]
    fn base_passes_incoming_node_through() {
        let chain = Component::base(Span::default());
        let node = chain.fold(Some(int(9))).expect("fold");
        assert_eq!(node, int(9));
    }

    #[test]
    fn empty_chain_is_an_error() {
        let err = Component::base(Span::default()).fold(None).unwrap_err();
        assert!(matches!(err, CoreError::Syntax { .. }));
    }

    #[test]
    fn calling_a_string_literal_is_a_format_call() {
        let mut chain = Component::base(Span::default());
        chain.add(comp(ComponentKind::String("%d-%d".into())));
        chain.add(comp(ComponentKind::Call(vec![int(1), int(2)])));
        let node = chain.fold(None).expect("fold");
        assert_eq!(node.to_string(), "(format \"%d-%d\" 1 2)");
        assert!(!node.has(Capability::Assignable));
    }
}
