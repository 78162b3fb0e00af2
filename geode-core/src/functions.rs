//! Function declarations and overload selection.
//!
//! Every declared function (free, method or external) becomes a
//! `FunctionDecl`. Its `variants` map is the instantiation cache: one IR
//! function per concrete signature, keyed by the mangled name. Entries
//! are only ever added.

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::ast::{FunctionDef, TypeRef};
use crate::casts::CastTable;
use crate::error::CoreError;
use crate::ir::FuncId;
use crate::span::Span;
use crate::types::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeclId(pub u32);

#[derive(Debug, Clone)]
pub struct FunctionDecl {
    /// `pkg:name` or `pkg:Class.method`.
    pub qualified_name: String,
    /// Package the body is resolved in.
    pub package: String,
    pub def: Rc<FunctionDef>,
    /// Receiver class for methods; its pointer is the implicit first
    /// parameter.
    pub receiver: Option<Type>,
    pub variants: BTreeMap<String, FuncId>,
}

impl FunctionDecl {
    pub fn new(qualified_name: String, package: String, def: Rc<FunctionDef>) -> Self {
        FunctionDecl {
            qualified_name,
            package,
            def,
            receiver: None,
            variants: BTreeMap::new(),
        }
    }

    /// Number of parameters including the receiver.
    pub fn arity(&self) -> usize {
        self.def.params.len() + usize::from(self.receiver.is_some())
    }

    /// Symbol used in the emitted module for an instantiation keyed by
    /// `key`.
    pub fn symbol(&self, key: &str) -> String {
        if self.def.name == "main" || self.def.nomangle || self.def.is_external() {
            self.def.name.clone()
        } else {
            key.to_string()
        }
    }
}

/// Result of matching one declaration against argument types.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub params: Vec<Type>,
    pub exact: bool,
}

#[derive(Debug, Default)]
pub struct FunctionTable {
    decls: Vec<FunctionDecl>,
}

impl FunctionTable {
    pub fn insert(&mut self, decl: FunctionDecl) -> DeclId {
        let id = DeclId(self.decls.len() as u32);
        self.decls.push(decl);
        id
    }

    pub fn get(&self, id: DeclId) -> &FunctionDecl {
        &self.decls[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: DeclId) -> &mut FunctionDecl {
        &mut self.decls[id.0 as usize]
    }

    pub fn ids(&self) -> impl Iterator<Item = DeclId> + '_ {
        (0..self.decls.len()).map(|i| DeclId(i as u32))
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    /// Concrete parameter types of `id` for a call with `args`, or `None`
    /// when the declaration does not accept them.
    ///
    /// `resolve` maps a declared parameter type, written in the given
    /// package, to a backend type.
    pub fn match_signature(
        &self,
        id: DeclId,
        args: &[Type],
        casts: &CastTable,
        resolve: &mut dyn FnMut(&str, &TypeRef) -> Result<Type, CoreError>,
    ) -> Result<Option<Signature>, CoreError> {
        let decl = self.get(id);
        let fixed = decl.arity();
        let arity_ok = if decl.def.variadic {
            args.len() >= fixed
        } else {
            args.len() == fixed
        };
        if !arity_ok {
            return Ok(None);
        }

        let mut params = Vec::with_capacity(fixed);
        let mut exact = true;
        if let Some(receiver) = &decl.receiver {
            params.push(receiver.clone().pointer_to());
        }
        let offset = params.len();
        for (i, param) in decl.def.params.iter().enumerate() {
            let arg = &args[offset + i];
            let ty = if param.ty.unknown {
                bind_unknown(&param.ty, arg)
            } else {
                resolve(&decl.package, &param.ty)?
            };
            if &ty != arg {
                exact = false;
                if !casts.is_convertible(arg, &ty) {
                    return Ok(None);
                }
            }
            params.push(ty);
        }
        if offset == 1 && params[0] != args[0] {
            return Ok(None);
        }
        Ok(Some(Signature { params, exact }))
    }

    /// Pick among `candidates` (all registered under one name) the first
    /// exact match, else the first convertible one.
    pub fn select(
        &self,
        candidates: &[DeclId],
        args: &[Type],
        casts: &CastTable,
        resolve: &mut dyn FnMut(&str, &TypeRef) -> Result<Type, CoreError>,
    ) -> Result<(DeclId, Signature), CoreError> {
        let mut fallback = None;
        for &id in candidates {
            let Some(signature) = self.match_signature(id, args, casts, resolve)? else {
                continue;
            };
            if signature.exact {
                return Ok((id, signature));
            }
            if fallback.is_none() {
                fallback = Some((id, signature));
            }
        }
        if let Some(found) = fallback {
            return Ok(found);
        }

        let given = describe_types(args);
        let message = match candidates {
            [only] => {
                let decl = self.get(*only);
                let mut expected: Vec<String> = Vec::new();
                if let Some(receiver) = &decl.receiver {
                    expected.push(format!("{receiver}*"));
                }
                expected.extend(decl.def.params.iter().map(|p| p.ty.to_string()));
                if decl.def.variadic {
                    expected.push("...".to_string());
                }
                format!(
                    "`{}` expects ({}) but was given ({given})",
                    decl.qualified_name,
                    expected.join(", ")
                )
            }
            _ => {
                let name = candidates
                    .first()
                    .map(|id| self.get(*id).qualified_name.as_str())
                    .unwrap_or("function");
                format!("no overload of `{name}` accepts ({given})")
            }
        };
        Err(CoreError::type_mismatch(message, Span::default()))
    }
}

/// Type an unknown parameter takes at a call site: the argument type,
/// pointer-wrapped when written as `?*`.
fn bind_unknown(param: &TypeRef, arg: &Type) -> Type {
    let mut ty = unknown_binding(param, arg);
    for _ in 0..param.pointer_level {
        ty = ty.pointer_to();
    }
    ty
}

/// What `?` itself stands for when `param` (e.g. `?*`) received `arg`.
pub fn unknown_binding(param: &TypeRef, arg: &Type) -> Type {
    let mut ty = arg.clone();
    for _ in 0..param.pointer_level {
        ty = match ty {
            Type::Pointer(inner) => *inner,
            other => other,
        };
    }
    ty
}

pub fn describe_types(types: &[Type]) -> String {
    types
        .iter()
        .map(Type::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::ast::Item;
    use crate::span::FileId;

    fn table(source: &str) -> FunctionTable {
        let unit = parse(FileId(0), source, "main").expect("parse");
        let mut table = FunctionTable::default();
        for item in unit.items {
            if let Item::Function(def) = item {
                let name = format!("main:{}", def.name);
                table.insert(FunctionDecl::new(name, "main".into(), Rc::new(def)));
            }
        }
        table
    }

    fn primitive(_package: &str, ty: &TypeRef) -> Result<Type, CoreError> {
        crate::builtins::find_primitive(&ty.name)
            .map(|p| p.ty())
            .ok_or_else(|| CoreError::type_mismatch("unknown", ty.span))
    }

    #[test]
    fn prefers_exact_matches() {
        let table = table("func f(float x) ...\nfunc f(int x) ...");
        let casts = CastTable::default();
        let candidates: Vec<DeclId> = table.ids().collect();
        let (id, sig) = table
            .select(&candidates, &[Type::I32], &casts, &mut primitive)
            .expect("select");
        assert_eq!(id, DeclId(1));
        assert!(sig.exact);

        let (id, sig) = table
            .select(&candidates, &[Type::I64], &casts, &mut primitive)
            .expect("select");
        assert_eq!(id, DeclId(0));
        assert!(!sig.exact);
    }

    #[test]
    fn unknown_parameters_bind_to_arguments() {
        let table = table("func sq(? x) ? = x * x");
        let casts = CastTable::default();
        let (_, sig) = table
            .select(&[DeclId(0)], &[Type::Float], &casts, &mut primitive)
            .expect("select");
        assert_eq!(sig.params, vec![Type::Float]);
        assert!(sig.exact);
    }

    #[test]
    fn arity_mismatch_names_expected_and_given() {
        let table = table("func add(int a, int b) int = a + b");
        let casts = CastTable::default();
        let err = table
            .select(&[DeclId(0)], &[Type::I32], &casts, &mut primitive)
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("(int, int)"), "{message}");
        assert!(message.contains("(i32)"), "{message}");
    }

    #[test]
    fn variadic_accepts_extra_arguments() {
        let table = table("func printf(string fmt, ...) int ...");
        let casts = CastTable::default();
        let args = [Type::string(), Type::I32, Type::Double];
        let (_, sig) = table
            .select(&[DeclId(0)], &args, &casts, &mut primitive)
            .expect("select");
        assert_eq!(sig.params, vec![Type::string()]);
    }

    #[test]
    fn main_and_external_keep_plain_symbols() {
        let table = table("func main() int = 0\nfunc puts(string s) int ...\nfunc helper() int = 1");
        assert_eq!(table.get(DeclId(0)).symbol("_VM4mainN4main"), "main");
        assert_eq!(table.get(DeclId(1)).symbol("_VM4mainN4putsT3Pi8"), "puts");
        assert_eq!(table.get(DeclId(2)).symbol("_VM4mainN6helper"), "_VM4mainN6helper");
    }
}
