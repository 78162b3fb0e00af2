//! Surface AST produced by the parser.
//!
//! Nodes are built once by folding component chains and are read-only
//! afterwards. Top-level declarations are kept apart from expression and
//! statement nodes as `Item`s.

use core::fmt;

use crate::error::CoreError;
use crate::span::Span;

/// A type as written in source: base name, pointer depth and whether it
/// is the unknown type `?` that gets bound per call site.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeRef {
    pub name: String,
    pub pointer_level: u32,
    pub unknown: bool,
    pub span: Span,
}

impl TypeRef {
    pub fn named(name: impl Into<String>, span: Span) -> Self {
        TypeRef {
            name: name.into(),
            pointer_level: 0,
            unknown: false,
            span,
        }
    }

    pub fn unknown(span: Span) -> Self {
        TypeRef {
            name: "?".to_string(),
            pointer_level: 0,
            unknown: true,
            span,
        }
    }

    pub fn pointer_to(mut self) -> Self {
        self.pointer_level += 1;
        self
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for _ in 0..self.pointer_level {
            f.write_str("*")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    And,
    Or,
    Xor,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn from_spelling(op: &str) -> Option<Self> {
        Some(match op {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Rem,
            "<<" => BinaryOp::Shl,
            ">>" => BinaryOp::Shr,
            "&&" => BinaryOp::And,
            "||" => BinaryOp::Or,
            "^" => BinaryOp::Xor,
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::Ne,
            "<" => BinaryOp::Lt,
            "<=" => BinaryOp::Le,
            ">" => BinaryOp::Gt,
            ">=" => BinaryOp::Ge,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Xor => "^",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }
}

/// Assignment operators; all of them sit at precedence 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Add,
    Sub,
    Mul,
    Div,
}

impl AssignOp {
    pub fn from_spelling(op: &str) -> Option<Self> {
        Some(match op {
            "=" | ":=" => AssignOp::Set,
            "+=" => AssignOp::Add,
            "-=" => AssignOp::Sub,
            "*=" => AssignOp::Mul,
            "/=" => AssignOp::Div,
            _ => return None,
        })
    }

    /// The arithmetic a compound assignment performs before storing.
    pub fn binary(self) -> Option<BinaryOp> {
        match self {
            AssignOp::Set => None,
            AssignOp::Add => Some(BinaryOp::Add),
            AssignOp::Sub => Some(BinaryOp::Sub),
            AssignOp::Mul => Some(BinaryOp::Mul),
            AssignOp::Div => Some(BinaryOp::Div),
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            AssignOp::Set => "=",
            AssignOp::Add => "+=",
            AssignOp::Sub => "-=",
            AssignOp::Mul => "*=",
            AssignOp::Div => "/=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    AddressOf,
    Deref,
}

impl UnaryOp {
    pub fn from_spelling(op: &str) -> Option<Self> {
        Some(match op {
            "-" => UnaryOp::Neg,
            "!" => UnaryOp::Not,
            "&" => UnaryOp::AddressOf,
            "*" => UnaryOp::Deref,
            _ => return None,
        })
    }

    fn label(self) -> &'static str {
        match self {
            UnaryOp::Neg => "neg",
            UnaryOp::Not => "not",
            UnaryOp::AddressOf => "addr",
            UnaryOp::Deref => "deref",
        }
    }
}

/// What a node can be used for when a chain component or operator
/// consumes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Can be the target of a call suffix.
    Callable,
    /// Produces a value.
    Accessible,
    /// Can be stored to.
    Assignable,
    /// Names a memory location that fields can be taken from.
    Reference,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Capability::Callable => "callable",
            Capability::Accessible => "accessible",
            Capability::Assignable => "assignable",
            Capability::Reference => "reference",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Int(i64),
    Float(f64),
    Str(String),
    Char(u8),
    Bool(bool),
    Nil,
    Ident(String),
    /// `int x` or `let x`; `ty` is `None` for `let`.
    VarDecl {
        ty: Option<TypeRef>,
        name: String,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Node>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    Assign {
        op: AssignOp,
        target: Box<Node>,
        value: Box<Node>,
    },
    Call {
        callee: Box<Node>,
        args: Vec<Node>,
    },
    /// `"x = %d"(x)`: a string literal called like a function, formatted
    /// by the runtime.
    Format {
        template: String,
        args: Vec<Node>,
    },
    Dot {
        base: Box<Node>,
        field: String,
    },
    Subscript {
        base: Box<Node>,
        index: Box<Node>,
    },
    Cast {
        value: Box<Node>,
        ty: TypeRef,
    },
    Array(Vec<Node>),
    SizeOf(TypeRef),
    TypeInfo(TypeRef),
    Return(Option<Box<Node>>),
    If {
        cond: Box<Node>,
        then: Box<Node>,
        otherwise: Option<Box<Node>>,
    },
    While {
        cond: Box<Node>,
        body: Box<Node>,
    },
    For {
        init: Box<Node>,
        cond: Box<Node>,
        step: Box<Node>,
        body: Box<Node>,
    },
    Block(Vec<Node>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
}

impl Node {
    pub fn new(kind: NodeKind, span: Span) -> Self {
        Node { kind, span }
    }

    /// Name of the variant, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            NodeKind::Int(_) => "integer literal",
            NodeKind::Float(_) => "float literal",
            NodeKind::Str(_) => "string literal",
            NodeKind::Char(_) => "character literal",
            NodeKind::Bool(_) => "boolean literal",
            NodeKind::Nil => "nil",
            NodeKind::Ident(_) => "identifier",
            NodeKind::VarDecl { .. } => "variable declaration",
            NodeKind::Unary { .. } => "unary expression",
            NodeKind::Binary { .. } => "binary expression",
            NodeKind::Assign { .. } => "assignment",
            NodeKind::Call { .. } => "function call",
            NodeKind::Format { .. } => "format call",
            NodeKind::Dot { .. } => "dot reference",
            NodeKind::Subscript { .. } => "subscript",
            NodeKind::Cast { .. } => "cast",
            NodeKind::Array(_) => "array literal",
            NodeKind::SizeOf(_) => "sizeof",
            NodeKind::TypeInfo(_) => "type info",
            NodeKind::Return(_) => "return statement",
            NodeKind::If { .. } => "if statement",
            NodeKind::While { .. } => "while statement",
            NodeKind::For { .. } => "for statement",
            NodeKind::Block(_) => "block",
        }
    }

    pub fn has(&self, capability: Capability) -> bool {
        match capability {
            Capability::Callable => matches!(self.kind, NodeKind::Ident(_) | NodeKind::Dot { .. }),
            Capability::Accessible => !matches!(
                self.kind,
                NodeKind::VarDecl { .. }
                    | NodeKind::Return(_)
                    | NodeKind::If { .. }
                    | NodeKind::While { .. }
                    | NodeKind::For { .. }
                    | NodeKind::Block(_)
            ),
            Capability::Assignable => matches!(
                self.kind,
                NodeKind::Ident(_)
                    | NodeKind::VarDecl { .. }
                    | NodeKind::Dot { .. }
                    | NodeKind::Subscript { .. }
                    | NodeKind::Unary {
                        op: UnaryOp::Deref,
                        ..
                    }
            ),
            Capability::Reference => matches!(
                self.kind,
                NodeKind::Ident(_)
                    | NodeKind::Dot { .. }
                    | NodeKind::Subscript { .. }
                    | NodeKind::TypeInfo(_)
                    | NodeKind::Unary {
                        op: UnaryOp::Deref,
                        ..
                    }
            ),
        }
    }

    pub fn require(&self, capability: Capability) -> Result<(), CoreError> {
        if self.has(capability) {
            Ok(())
        } else {
            Err(CoreError::CapabilityMismatch {
                expected: capability,
                found: self.kind_name(),
                span: self.span,
            })
        }
    }
}

/// S-expression rendering, used by `--emit ast` and in tests.
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            NodeKind::Int(value) => write!(f, "{value}"),
            NodeKind::Float(value) => write!(f, "{value:?}"),
            NodeKind::Str(value) => write!(f, "{value:?}"),
            NodeKind::Char(value) => write!(f, "{:?}", *value as char),
            NodeKind::Bool(value) => write!(f, "{value}"),
            NodeKind::Nil => f.write_str("nil"),
            NodeKind::Ident(name) => f.write_str(name),
            NodeKind::VarDecl { ty: Some(ty), name } => write!(f, "(decl {ty} {name})"),
            NodeKind::VarDecl { ty: None, name } => write!(f, "(decl let {name})"),
            NodeKind::Unary { op, operand } => write!(f, "({} {operand})", op.label()),
            NodeKind::Binary { op, lhs, rhs } => write!(f, "({} {lhs} {rhs})", op.symbol()),
            NodeKind::Assign { op, target, value } => {
                write!(f, "({} {target} {value})", op.symbol())
            }
            NodeKind::Call { callee, args } => {
                write!(f, "(call {callee}")?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                f.write_str(")")
            }
            NodeKind::Format { template, args } => {
                write!(f, "(format {template:?}")?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                f.write_str(")")
            }
            NodeKind::Dot { base, field } => write!(f, "(dot {base} {field})"),
            NodeKind::Subscript { base, index } => write!(f, "(index {base} {index})"),
            NodeKind::Cast { value, ty } => write!(f, "(as {value} {ty})"),
            NodeKind::Array(values) => {
                f.write_str("[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str("]")
            }
            NodeKind::SizeOf(ty) => write!(f, "(sizeof {ty})"),
            NodeKind::TypeInfo(ty) => write!(f, "(info {ty})"),
            NodeKind::Return(Some(value)) => write!(f, "(return {value})"),
            NodeKind::Return(None) => f.write_str("(return)"),
            NodeKind::If {
                cond,
                then,
                otherwise,
            } => match otherwise {
                Some(otherwise) => write!(f, "(if {cond} {then} {otherwise})"),
                None => write!(f, "(if {cond} {then})"),
            },
            NodeKind::While { cond, body } => write!(f, "(while {cond} {body})"),
            NodeKind::For {
                init,
                cond,
                step,
                body,
            } => write!(f, "(for {init} {cond} {step} {body})"),
            NodeKind::Block(stmts) => {
                f.write_str("(block")?;
                for stmt in stmts {
                    write!(f, " {stmt}")?;
                }
                f.write_str(")")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: TypeRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<Param>,
    pub ret: TypeRef,
    pub variadic: bool,
    pub nomangle: bool,
    /// Declared with `pure` or `λ`.
    pub pure: bool,
    /// `None` for external declarations (`func puts(string s) int ...`).
    pub body: Option<Node>,
    pub span: Span,
}

impl FunctionDef {
    pub fn is_external(&self) -> bool {
        self.body.is_none()
    }

    pub fn is_generic(&self) -> bool {
        self.params.iter().any(|p| p.ty.unknown) || self.ret.unknown
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: TypeRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    pub name: String,
    pub fields: Vec<Field>,
    pub methods: Vec<FunctionDef>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalDef {
    pub name: String,
    pub ty: TypeRef,
    pub init: Option<Node>,
    pub external: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Function(FunctionDef),
    Class(ClassDef),
    Global(GlobalDef),
}

/// One parsed compilation unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    pub package: String,
    pub includes: Vec<String>,
    pub links: Vec<String>,
    pub items: Vec<Item>,
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "(package {})", self.package)?;
        for include in &self.includes {
            writeln!(f, "(include {include:?})")?;
        }
        for link in &self.links {
            writeln!(f, "(link {link:?})")?;
        }
        for item in &self.items {
            match item {
                Item::Function(func) => write_function(f, func)?,
                Item::Class(class) => {
                    writeln!(f, "(class {}", class.name)?;
                    for field in &class.fields {
                        writeln!(f, "  (field {} {})", field.ty, field.name)?;
                    }
                    for method in &class.methods {
                        f.write_str("  ")?;
                        write_function(f, method)?;
                    }
                    writeln!(f, ")")?;
                }
                Item::Global(global) => match (&global.init, global.external) {
                    (_, true) => writeln!(f, "(global {} {} external)", global.ty, global.name)?,
                    (Some(init), false) => {
                        writeln!(f, "(global {} {} {init})", global.ty, global.name)?
                    }
                    (None, false) => writeln!(f, "(global {} {})", global.ty, global.name)?,
                },
            }
        }
        Ok(())
    }
}

fn write_function(f: &mut fmt::Formatter<'_>, func: &FunctionDef) -> fmt::Result {
    let keyword = if func.pure { "pure" } else { "func" };
    write!(f, "({keyword} {} (", func.name)?;
    for (i, param) in func.params.iter().enumerate() {
        if i > 0 {
            f.write_str(" ")?;
        }
        write!(f, "{} {}", param.ty, param.name)?;
    }
    if func.variadic {
        f.write_str(" ...")?;
    }
    write!(f, ") {}", func.ret)?;
    match &func.body {
        Some(body) => writeln!(f, " {body})"),
        None => writeln!(f, " external)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> Node {
        Node::new(NodeKind::Ident(name.to_string()), Span::default())
    }

    #[test]
    fn identifiers_have_every_expression_capability() {
        let node = ident("x");
        for cap in [
            Capability::Callable,
            Capability::Accessible,
            Capability::Assignable,
            Capability::Reference,
        ] {
            assert!(node.has(cap), "identifier should be {cap}");
        }
    }

    #[test]
    fn literals_are_not_callable() {
        let node = Node::new(NodeKind::Int(3), Span::default());
        let err = node.require(Capability::Callable).unwrap_err();
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
    fn call_results_are_values_but_not_references() {
        let call = Node::new(
            NodeKind::Call {
                callee: Box::new(ident("f")),
                args: vec![],
            },
            Span::default(),
        );
        assert!(call.has(Capability::Accessible));
        assert!(!call.has(Capability::Reference));
        assert!(!call.has(Capability::Assignable));
    }

    #[test]
    fn renders_as_s_expression() {
        let node = Node::new(
            NodeKind::Binary {
                op: BinaryOp::Add,
                lhs: Box::new(ident("a")),
                rhs: Box::new(Node::new(NodeKind::Int(2), Span::default())),
            },
            Span::default(),
        );
        assert_eq!(node.to_string(), "(+ a 2)");
    }

    #[test]
    fn type_refs_render_pointer_depth() {
        let ty = TypeRef::named("int", Span::default()).pointer_to().pointer_to();
        assert_eq!(ty.to_string(), "int**");
    }
}
