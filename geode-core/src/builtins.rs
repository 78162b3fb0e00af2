//! Built-in types visible at the Geode language level.
//!
//! The primitive table is injected into the root scope of every
//! compilation and also seeds the cast precedence table.

use crate::types::Type;

/// Shape of a primitive type, used to build its backend `Type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    Int(u32),
    Float,
    Double,
    /// `i8*`
    String,
    Void,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Primitive {
    /// Name at the Geode level (e.g., `int`).
    pub name: &'static str,
    pub kind: PrimitiveKind,
    /// Cast precedence. `None` for types that never take part in
    /// implicit numeric widening (pointers, void).
    pub precedence: Option<u8>,
}

impl Primitive {
    pub fn ty(&self) -> Type {
        match self.kind {
            PrimitiveKind::Int(bits) => Type::Int(bits),
            PrimitiveKind::Float => Type::Float,
            PrimitiveKind::Double => Type::Double,
            PrimitiveKind::String => Type::string(),
            PrimitiveKind::Void => Type::Void,
        }
    }
}

pub const PRIMITIVES: &[Primitive] = &[
    Primitive {
        name: "bool",
        kind: PrimitiveKind::Int(1),
        precedence: Some(1),
    },
    Primitive {
        name: "byte",
        kind: PrimitiveKind::Int(8),
        precedence: Some(2),
    },
    Primitive {
        name: "char",
        kind: PrimitiveKind::Int(8),
        precedence: Some(2),
    },
    Primitive {
        name: "short",
        kind: PrimitiveKind::Int(16),
        precedence: Some(3),
    },
    Primitive {
        name: "int",
        kind: PrimitiveKind::Int(32),
        precedence: Some(4),
    },
    Primitive {
        name: "long",
        kind: PrimitiveKind::Int(64),
        precedence: Some(5),
    },
    Primitive {
        name: "float",
        kind: PrimitiveKind::Float,
        precedence: Some(10),
    },
    Primitive {
        name: "double",
        kind: PrimitiveKind::Double,
        precedence: Some(11),
    },
    Primitive {
        name: "string",
        kind: PrimitiveKind::String,
        precedence: None,
    },
    Primitive {
        name: "void",
        kind: PrimitiveKind::Void,
        precedence: None,
    },
];

/// Class describing a type at runtime, produced by `info(T)`.
pub const TYPE_INFO_CLASS: &str = "TypeInfo";

/// Fields of `TypeInfo`, in layout order.
pub fn type_info_fields() -> Vec<(&'static str, Type)> {
    vec![("size", Type::I64), ("name", Type::string())]
}

pub fn find_primitive(name: &str) -> Option<&'static Primitive> {
    PRIMITIVES.iter().find(|p| p.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_primitives_by_name() {
        assert_eq!(find_primitive("long").map(Primitive::ty), Some(Type::I64));
        assert_eq!(find_primitive("string").map(Primitive::ty), Some(Type::string()));
        assert!(find_primitive("Point").is_none());
    }

    #[test]
    fn integer_precedence_grows_with_width() {
        let ints: Vec<(u32, u8)> = PRIMITIVES
            .iter()
            .filter_map(|p| match (p.kind, p.precedence) {
                (PrimitiveKind::Int(bits), Some(prec)) => Some((bits, prec)),
                _ => None,
            })
            .collect();
        for (bits_a, prec_a) in &ints {
            for (bits_b, prec_b) in &ints {
                assert_eq!(bits_a.cmp(bits_b), prec_a.cmp(prec_b));
            }
        }
    }
}
