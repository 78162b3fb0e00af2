//! Backend types.
//!
//! These are the concrete types values carry after lowering. Source-level
//! type spellings (`TypeRef`) are resolved to them through the scope tree.

use core::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    /// Integer of the given bit width. `Int(1)` is `bool`.
    Int(u32),
    Float,
    Double,
    Pointer(Box<Type>),
    /// Named struct, keyed by the qualified class name.
    Struct(String),
    Array(Box<Type>, u64),
}

impl Type {
    pub const BOOL: Type = Type::Int(1);
    pub const I8: Type = Type::Int(8);
    pub const I32: Type = Type::Int(32);
    pub const I64: Type = Type::Int(64);

    pub fn pointer_to(self) -> Type {
        Type::Pointer(Box::new(self))
    }

    /// `i8*`, the type of strings.
    pub fn string() -> Type {
        Type::I8.pointer_to()
    }

    pub fn pointee(&self) -> Option<&Type> {
        match self {
            Type::Pointer(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Type::Int(_))
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::Float | Type::Double)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer(_))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    pub fn struct_name(&self) -> Option<&str> {
        match self {
            Type::Struct(name) => Some(name),
            _ => None,
        }
    }

    /// Self-delimiting encoding used in mangled names. Only contains
    /// ASCII letters, digits and `_`.
    pub fn mangle_code(&self) -> String {
        match self {
            Type::Void => "v".to_string(),
            Type::Int(bits) => format!("i{bits}"),
            Type::Float => "f".to_string(),
            Type::Double => "d".to_string(),
            Type::Pointer(inner) => format!("P{}", inner.mangle_code()),
            Type::Struct(name) => {
                let mut code = String::from("S");
                for part in name.split([':', '.']) {
                    code.push_str(&part.len().to_string());
                    code.push_str(part);
                }
                code.push('E');
                code
            }
            Type::Array(inner, len) => format!("A{len}_{}", inner.mangle_code()),
        }
    }
}

/// LLVM spelling of the type.
impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => f.write_str("void"),
            Type::Int(bits) => write!(f, "i{bits}"),
            Type::Float => f.write_str("float"),
            Type::Double => f.write_str("double"),
            Type::Pointer(inner) => write!(f, "{inner}*"),
            Type::Struct(name) => write!(f, "%\"class.{name}\""),
            Type::Array(inner, len) => write!(f, "[{len} x {inner}]"),
        }
    }
}
