//! Symbol mangling for function instantiations.
//!
//! `_V`, then the qualified name split on `:` and `.` (`M<len><part>` for
//! the first part, `N<len><part>` for the rest), then one
//! `T<len><code>` per parameter type.

use crate::types::Type;

pub fn mangle(qualified_name: &str, params: &[Type]) -> String {
    let mut out = String::from("_V");
    let parts = qualified_name.split([':', '.']).filter(|p| !p.is_empty());
    for (i, part) in parts.enumerate() {
        out.push(if i == 0 { 'M' } else { 'N' });
        out.push_str(&part.len().to_string());
        out.push_str(part);
    }
    for param in params {
        let code = param.mangle_code();
        out.push('T');
        out.push_str(&code.len().to_string());
        out.push_str(&code);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_name_and_parameters() {
        assert_eq!(mangle("main:add", &[Type::I32, Type::I32]), "_VM4mainN3addT3i32T3i32");
        assert_eq!(mangle("main:Point.len", &[]), "_VM4mainN5PointN3len");
    }

    #[test]
    fn identical_signatures_mangle_identically() {
        let a = mangle("main:sq", &[Type::I32]);
        let b = mangle("main:sq", &[Type::I32]);
        assert_eq!(a, b);
    }

    #[test]
    fn different_signatures_never_collide() {
        let signatures: Vec<(&str, Vec<Type>)> = vec![
            ("main:f", vec![]),
            ("main:f", vec![Type::I32]),
            ("main:f", vec![Type::Float]),
            ("main:f", vec![Type::I32, Type::I32]),
            ("main:f", vec![Type::I32.pointer_to()]),
            ("main:fi", vec![]),
            ("mai:nf", vec![]),
            ("main:f.g", vec![]),
            ("util:f", vec![Type::I32]),
        ];
        let mangled: Vec<String> = signatures.iter().map(|(n, p)| mangle(n, p)).collect();
        for (i, a) in mangled.iter().enumerate() {
            for b in mangled.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }
}
