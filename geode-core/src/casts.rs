//! Implicit and explicit conversions between backend types.
//!
//! Planning is pure: `unify_types` and `conversion` only look at types.
//! Lowering turns a plan into instructions through the IR builder.

use std::collections::HashMap;

use crate::builtins::PRIMITIVES;
use crate::error::CoreError;
use crate::ir::CastOp;
use crate::span::Span;
use crate::types::Type;

/// How to get a value of one type to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    Identity,
    /// Conversion to `void`: the value is dropped.
    Discard,
    Cast(CastOp),
}

/// Cast precedence of every primitive that takes part in numeric
/// widening. Higher precedence wins when two operands meet.
#[derive(Debug, Clone)]
pub struct CastTable {
    precedence: HashMap<Type, u8>,
}

impl Default for CastTable {
    fn default() -> Self {
        let precedence = PRIMITIVES
            .iter()
            .filter_map(|p| p.precedence.map(|prec| (p.ty(), prec)))
            .collect();
        CastTable { precedence }
    }
}

impl CastTable {
    pub fn precedence(&self, ty: &Type) -> Option<u8> {
        self.precedence.get(ty).copied()
    }

    /// Common type two operands are converted to before a binary
    /// operation. Pointers take part as `i64`.
    pub fn unify_types(&self, a: &Type, b: &Type) -> Result<Type, CoreError> {
        let a = if a.is_pointer() { Type::I64 } else { a.clone() };
        let b = if b.is_pointer() { Type::I64 } else { b.clone() };
        if a == b {
            return Ok(a);
        }
        match (self.precedence(&a), self.precedence(&b)) {
            (Some(pa), Some(pb)) if pb > pa => Ok(b),
            (Some(_), Some(_)) => Ok(a),
            _ => Err(CoreError::type_mismatch(
                format!("cannot combine `{a}` and `{b}`"),
                Span::default(),
            )),
        }
    }

    /// Plan the conversion of a `from` value to `to`.
    pub fn conversion(&self, from: &Type, to: &Type) -> Result<Conversion, CoreError> {
        if from == to {
            return Ok(Conversion::Identity);
        }
        let op = match (from, to) {
            (_, Type::Void) => return Ok(Conversion::Discard),
            (Type::Int(a), Type::Int(b)) if a < b => {
                if *a == 1 {
                    CastOp::ZExt
                } else {
                    CastOp::SExt
                }
            }
            (Type::Int(_), Type::Int(_)) => CastOp::Trunc,
            (Type::Int(1), Type::Float | Type::Double) => CastOp::UIToFP,
            (Type::Int(_), Type::Float | Type::Double) => CastOp::SIToFP,
            (Type::Float | Type::Double, Type::Int(1)) => CastOp::FPToUI,
            (Type::Float | Type::Double, Type::Int(_)) => CastOp::FPToSI,
            (Type::Float, Type::Double) => CastOp::FPExt,
            (Type::Double, Type::Float) => CastOp::FPTrunc,
            (Type::Pointer(_), Type::Int(_)) => CastOp::PtrToInt,
            (Type::Int(_), Type::Pointer(_)) => CastOp::IntToPtr,
            (Type::Pointer(_), Type::Pointer(_)) => CastOp::Bitcast,
            _ => {
                return Err(CoreError::type_mismatch(
                    format!("cannot convert `{from}` to `{to}`"),
                    Span::default(),
                ));
            }
        };
        Ok(Conversion::Cast(op))
    }

    pub fn is_convertible(&self, from: &Type, to: &Type) -> bool {
        self.conversion(from, to).is_ok()
    }
}

/// Promotion applied to arguments passed through `...`.
pub fn default_promotion(ty: &Type) -> Type {
    match ty {
        Type::Int(bits) if *bits < 32 => Type::I32,
        Type::Float => Type::Double,
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric_types() -> Vec<Type> {
        vec![
            Type::BOOL,
            Type::I8,
            Type::Int(16),
            Type::I32,
            Type::I64,
            Type::Float,
            Type::Double,
        ]
    }

    #[test]
    fn unify_is_symmetric() {
        let table = CastTable::default();
        for a in numeric_types() {
            for b in numeric_types() {
                assert_eq!(
                    table.unify_types(&a, &b).ok(),
                    table.unify_types(&b, &a).ok(),
                    "{a} vs {b}"
                );
            }
        }
    }

    #[test]
    fn unify_never_narrows() {
        let table = CastTable::default();
        for a in numeric_types() {
            for b in numeric_types() {
                let unified = table.unify_types(&a, &b).expect("numeric types unify");
                let prec = table.precedence(&unified).expect("unified type is numeric");
                assert!(prec >= table.precedence(&a).unwrap_or(0));
                assert!(prec >= table.precedence(&b).unwrap_or(0));
            }
        }
    }

    #[test]
    fn int_and_float_meet_at_float() {
        let table = CastTable::default();
        assert_eq!(table.unify_types(&Type::I32, &Type::Float).ok(), Some(Type::Float));
        assert_eq!(table.unify_types(&Type::I64, &Type::Double).ok(), Some(Type::Double));
    }

    #[test]
    fn pointers_take_part_as_i64() {
        let table = CastTable::default();
        let ptr = Type::I32.pointer_to();
        assert_eq!(table.unify_types(&ptr, &Type::I32).ok(), Some(Type::I64));
        assert_eq!(table.unify_types(&ptr, &Type::Double).ok(), Some(Type::Double));
    }

    #[test]
    fn structs_do_not_unify() {
        let table = CastTable::default();
        let err = table
            .unify_types(&Type::Struct("main:Point".into()), &Type::I32)
            .unwrap_err();
        assert!(matches!(err, CoreError::TypeMismatch { .. }));
    }

    #[test]
    fn plans_conversions() {
        let table = CastTable::default();
        let plan = |from: Type, to: Type| table.conversion(&from, &to).ok();
        assert_eq!(plan(Type::I32, Type::I32), Some(Conversion::Identity));
        assert_eq!(plan(Type::I32, Type::I64), Some(Conversion::Cast(CastOp::SExt)));
        assert_eq!(plan(Type::BOOL, Type::I32), Some(Conversion::Cast(CastOp::ZExt)));
        assert_eq!(plan(Type::I64, Type::I8), Some(Conversion::Cast(CastOp::Trunc)));
        assert_eq!(plan(Type::I32, Type::Double), Some(Conversion::Cast(CastOp::SIToFP)));
        assert_eq!(plan(Type::BOOL, Type::Double), Some(Conversion::Cast(CastOp::UIToFP)));
        assert_eq!(plan(Type::BOOL, Type::Float), Some(Conversion::Cast(CastOp::UIToFP)));
        assert_eq!(plan(Type::Double, Type::BOOL), Some(Conversion::Cast(CastOp::FPToUI)));
        assert_eq!(plan(Type::Double, Type::I32), Some(Conversion::Cast(CastOp::FPToSI)));
        assert_eq!(plan(Type::Float, Type::Double), Some(Conversion::Cast(CastOp::FPExt)));
        assert_eq!(plan(Type::string(), Type::I64), Some(Conversion::Cast(CastOp::PtrToInt)));
        assert_eq!(plan(Type::I32, Type::Void), Some(Conversion::Discard));
        assert_eq!(plan(Type::Struct("a".into()), Type::I32), None);
    }

    #[test]
    fn variadic_promotion() {
        assert_eq!(default_promotion(&Type::I8), Type::I32);
        assert_eq!(default_promotion(&Type::BOOL), Type::I32);
        assert_eq!(default_promotion(&Type::Float), Type::Double);
        assert_eq!(default_promotion(&Type::I64), Type::I64);
        assert_eq!(default_promotion(&Type::string()), Type::string());
    }
}
