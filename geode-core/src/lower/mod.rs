//! Lowering from AST to IR.
//!
//! `CompileContext` owns every piece of state a compilation run mutates:
//! the scope tree, the function table and its instantiation caches, the
//! class layouts and the IR builder. Lowering is a single pass driven by
//! function instantiation; nothing here is shared across threads.

mod expr;
mod item;
mod stmt;

use std::collections::HashMap;

use crate::ast::{Node, TypeRef};
use crate::builtins::{PRIMITIVES, TYPE_INFO_CLASS, type_info_fields};
use crate::casts::{CastTable, Conversion};
use crate::compiler::CompileOptions;
use crate::diagnostic::Diagnostic;
use crate::error::{CoreError, SymbolKind};
use crate::functions::FunctionTable;
use crate::ir::{CastOp, Constant, FloatPredicate, Global, IntPredicate, IrBuilder, Module, Value};
use crate::scope::{Binding, ScopeId, ScopeItem, ScopeTree, Variable, Visibility, search_names};
use crate::span::Span;
use crate::types::Type;

/// Field layout of a class, by qualified name.
#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub name: String,
    pub fields: Vec<(String, Type)>,
}

impl ClassInfo {
    pub fn field(&self, name: &str) -> Option<(usize, &Type)> {
        self.fields
            .iter()
            .enumerate()
            .find(|(_, (field, _))| field == name)
            .map(|(index, (_, ty))| (index, ty))
    }
}

/// The function currently being lowered.
#[derive(Debug, Clone)]
struct Frame {
    name: String,
    ret: Type,
    span: Span,
}

/// A global whose initializer has to run at the start of `main`.
#[derive(Debug, Clone)]
struct PendingInit {
    slot: Value,
    ty: Type,
    init: Node,
    package: String,
}

pub struct CompileContext {
    options: CompileOptions,
    builder: IrBuilder,
    scopes: ScopeTree,
    scope: ScopeId,
    package: String,
    casts: CastTable,
    functions: FunctionTable,
    classes: HashMap<String, ClassInfo>,
    frame: Option<Frame>,
    labels: u32,
    type_infos: HashMap<Type, Value>,
    pending_inits: Vec<PendingInit>,
    diagnostics: Vec<Diagnostic>,
}

const MAX_LAYOUT_DEPTH: usize = 64;

impl CompileContext {
    pub fn new(options: CompileOptions) -> Self {
        let builder = IrBuilder::new(options.module_name.clone(), options.target_triple.clone());
        let scopes = ScopeTree::new();
        let root = scopes.root();
        let mut ctx = CompileContext {
            package: options.default_package.clone(),
            options,
            builder,
            scopes,
            scope: root,
            casts: CastTable::default(),
            functions: FunctionTable::default(),
            classes: HashMap::new(),
            frame: None,
            labels: 0,
            type_infos: HashMap::new(),
            pending_inits: Vec::new(),
            diagnostics: Vec::new(),
        };
        ctx.inject_builtins();
        ctx
    }

    fn inject_builtins(&mut self) {
        let root = self.scopes.root();
        for primitive in PRIMITIVES {
            self.scopes.define(
                root,
                ScopeItem::new(primitive.name, Visibility::Public, Binding::Type(primitive.ty())),
            );
        }
        let fields: Vec<(String, Type)> = type_info_fields()
            .into_iter()
            .map(|(name, ty)| (name.to_string(), ty))
            .collect();
        self.builder
            .add_struct(TYPE_INFO_CLASS, fields.iter().map(|(_, ty)| ty.clone()).collect());
        self.classes.insert(
            TYPE_INFO_CLASS.to_string(),
            ClassInfo {
                name: TYPE_INFO_CLASS.to_string(),
                fields,
            },
        );
        self.scopes.define(
            root,
            ScopeItem::new(
                TYPE_INFO_CLASS,
                Visibility::Public,
                Binding::Type(Type::Struct(TYPE_INFO_CLASS.to_string())),
            ),
        );
    }

    pub fn module(&self) -> &Module {
        self.builder.module()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn finish(self) -> (Module, Vec<Diagnostic>) {
        (self.builder.finish(), self.diagnostics)
    }

    /// Open a child of the current scope; returns the scope to go back to.
    fn enter_scope(&mut self) -> ScopeId {
        let previous = self.scope;
        self.scope = self.scopes.child(previous);
        previous
    }

    fn exit_scope(&mut self, previous: ScopeId) {
        self.scopes.discard(self.scope);
        self.scope = previous;
    }

    fn next_label(&mut self) -> u32 {
        let label = self.labels;
        self.labels += 1;
        label
    }

    fn frame(&self, span: Span) -> Result<&Frame, CoreError> {
        self.frame
            .as_ref()
            .ok_or_else(|| CoreError::type_mismatch("statement outside of a function", span))
    }

    /// Resolve a written type from the current scope and package.
    fn resolve_type(&self, ty: &TypeRef) -> Result<Type, CoreError> {
        resolve_type_in(&self.scopes, self.scope, &self.package, ty)
    }

    fn lookup_variable(&self, name: &str, span: Span) -> Result<Variable, CoreError> {
        match self.scopes.lookup(self.scope, name, &self.package).map(|item| &item.binding) {
            Some(Binding::Variable(var)) => Ok(var.clone()),
            Some(Binding::Function(_)) => Err(CoreError::type_mismatch(
                format!("function `{name}` cannot be used as a value"),
                span,
            )),
            Some(Binding::Type(_)) | None => {
                Err(CoreError::unresolved(SymbolKind::Variable, name, span))
            }
        }
    }

    /// Allocate a stack slot for a new local and bind it in the current
    /// scope. Without an initializer the slot holds the zero value.
    fn declare_local(
        &mut self,
        ty: Option<&TypeRef>,
        name: &str,
        init: Option<Value>,
        span: Span,
    ) -> Result<(Variable, Value), CoreError> {
        let ty = match (ty, &init) {
            (Some(ty), _) => self.resolve_type(ty)?,
            (None, Some(value)) => value.ty(),
            (None, None) => {
                return Err(CoreError::type_mismatch(
                    format!("cannot infer the type of `{name}` without an initializer"),
                    span,
                ));
            }
        };
        if ty.is_void() {
            return Err(CoreError::type_mismatch(
                format!("variable `{name}` cannot have type `void`"),
                span,
            ));
        }
        let slot = self.builder.alloca(ty.clone());
        let value = match init {
            Some(value) => self.convert_to(value, &ty, span)?,
            None => Value::default_for(&ty),
        };
        self.builder.store(value.clone(), slot.clone());
        let var = Variable { slot, ty };
        self.scopes.define(
            self.scope,
            ScopeItem::new(name, Visibility::Private, Binding::Variable(var.clone())),
        );
        Ok((var, value))
    }

    /// Apply the conversion of `value` to `to`. `None` when converting to
    /// `void`.
    fn convert(&mut self, value: Value, to: &Type, span: Span) -> Result<Option<Value>, CoreError> {
        let conversion = self
            .casts
            .conversion(&value.ty(), to)
            .map_err(|err| err.or_span(span))?;
        Ok(match conversion {
            Conversion::Identity => Some(value),
            Conversion::Discard => None,
            Conversion::Cast(op) => Some(self.cast(op, value, to)),
        })
    }

    fn convert_to(&mut self, value: Value, to: &Type, span: Span) -> Result<Value, CoreError> {
        let from = value.ty();
        self.convert(value, to, span)?.ok_or_else(|| {
            CoreError::type_mismatch(format!("cannot use a `{from}` value as `void`"), span)
        })
    }

    /// Emit a cast, folding integer constants.
    fn cast(&mut self, op: CastOp, value: Value, to: &Type) -> Value {
        match (&value, op, to) {
            (Value::ConstInt { value, .. }, CastOp::SExt, _) => Value::int(*value, to.clone()),
            (
                Value::ConstInt {
                    value,
                    ty: Type::Int(from),
                },
                CastOp::ZExt,
                _,
            ) => Value::int(*value & low_bits(*from), to.clone()),
            (Value::ConstInt { value, .. }, CastOp::Trunc, Type::Int(bits)) => {
                Value::int(wrap_to_width(*value, *bits), to.clone())
            }
            (Value::ConstInt { value, .. }, CastOp::SIToFP, _) => Value::ConstFloat {
                value: *value as f64,
                ty: to.clone(),
            },
            (
                Value::ConstInt {
                    value,
                    ty: Type::Int(from),
                },
                CastOp::UIToFP,
                _,
            ) => Value::ConstFloat {
                value: (*value & low_bits(*from)) as f64,
                ty: to.clone(),
            },
            (Value::ConstFloat { value, .. }, CastOp::FPExt | CastOp::FPTrunc, _) => {
                Value::ConstFloat {
                    value: *value,
                    ty: to.clone(),
                }
            }
            (Value::Null(_), CastOp::Bitcast, _) => Value::Null(to.clone()),
            _ => self.builder.cast(op, value, to.clone()),
        }
    }

    /// Bring two operands to their common type.
    fn unify(&mut self, lhs: Value, rhs: Value, span: Span) -> Result<(Value, Value, Type), CoreError> {
        let ty = self
            .casts
            .unify_types(&lhs.ty(), &rhs.ty())
            .map_err(|err| err.or_span(span))?;
        let lhs = self.convert_to(lhs, &ty, span)?;
        let rhs = self.convert_to(rhs, &ty, span)?;
        Ok((lhs, rhs, ty))
    }

    /// `i1` truth value of a condition.
    fn coerce_condition(&mut self, value: Value, span: Span) -> Result<Value, CoreError> {
        let ty = value.ty();
        Ok(match &ty {
            Type::Int(1) => value,
            Type::Int(_) => self.builder.icmp(IntPredicate::Ne, value, Value::int(0, ty.clone())),
            Type::Float | Type::Double => self.builder.fcmp(
                FloatPredicate::One,
                value,
                Value::ConstFloat {
                    value: 0.0,
                    ty: ty.clone(),
                },
            ),
            Type::Pointer(_) => self.builder.icmp(IntPredicate::Ne, value, Value::Null(ty.clone())),
            Type::Void | Type::Struct(_) | Type::Array(..) => {
                return Err(CoreError::type_mismatch(
                    format!("`{ty}` cannot be used as a condition"),
                    span,
                ));
            }
        })
    }

    /// Size and alignment in bytes.
    fn layout(&self, ty: &Type, span: Span) -> Result<(u64, u64), CoreError> {
        self.layout_at(ty, span, 0)
    }

    fn layout_at(&self, ty: &Type, span: Span, depth: usize) -> Result<(u64, u64), CoreError> {
        if depth > MAX_LAYOUT_DEPTH {
            return Err(CoreError::type_mismatch(
                format!("`{ty}` contains itself by value"),
                span,
            ));
        }
        Ok(match ty {
            Type::Int(bits) => {
                let bytes = u64::from(bits.div_ceil(8));
                (bytes, bytes)
            }
            Type::Float => (4, 4),
            Type::Double | Type::Pointer(_) => (8, 8),
            Type::Array(inner, len) => {
                let (size, align) = self.layout_at(inner, span, depth + 1)?;
                (size * len, align)
            }
            Type::Struct(name) => {
                let class = self
                    .classes
                    .get(name)
                    .ok_or_else(|| CoreError::unresolved(SymbolKind::Type, name.as_str(), span))?;
                let mut offset: u64 = 0;
                let mut max_align: u64 = 1;
                for (_, field) in &class.fields {
                    let (size, align) = self.layout_at(field, span, depth + 1)?;
                    offset = offset.next_multiple_of(align) + size;
                    max_align = max_align.max(align);
                }
                (offset.next_multiple_of(max_align), max_align)
            }
            Type::Void => {
                return Err(CoreError::type_mismatch("`void` has no size", span));
            }
        })
    }

    /// Pointer to the `TypeInfo` global describing `ty`, created on first
    /// use.
    fn type_info(&mut self, written: &TypeRef) -> Result<Value, CoreError> {
        let ty = self.resolve_type(written)?;
        if let Some(existing) = self.type_infos.get(&ty) {
            return Ok(existing.clone());
        }
        let (size, _) = self.layout(&ty, written.span)?;
        let (name, len) = self.builder.string_constant(written.to_string().as_bytes());
        let id = self.builder.add_global(Global {
            name: format!("typeinfo.{}", ty.mangle_code()),
            ty: Type::Struct(TYPE_INFO_CLASS.to_string()),
            init: Some(Constant::Struct(vec![
                (Type::I64, Constant::Int(size as i64)),
                (Type::string(), Constant::StringPtr { id: name, len }),
            ])),
            constant: true,
        });
        let value = Value::Global {
            id,
            ty: Type::Struct(TYPE_INFO_CLASS.to_string()).pointer_to(),
        };
        self.type_infos.insert(ty, value.clone());
        Ok(value)
    }
}

/// Resolve `ty` as written in `package`, looking types up from `scope`.
fn resolve_type_in(
    scopes: &ScopeTree,
    scope: ScopeId,
    package: &str,
    ty: &TypeRef,
) -> Result<Type, CoreError> {
    if ty.unknown {
        return Err(CoreError::type_mismatch(
            "`?` is only allowed in function signatures",
            ty.span,
        ));
    }
    let names = search_names(&ty.name, package);
    let mut resolved = scopes
        .find_type_qualified(scope, &names)
        .cloned()
        .ok_or_else(|| CoreError::unresolved(SymbolKind::Type, ty.name.as_str(), ty.span))?;
    for _ in 0..ty.pointer_level {
        resolved = resolved.pointer_to();
    }
    Ok(resolved)
}

/// Two's complement truncation to `bits`, sign-extended back to `i64`.
/// `i1` stays 0 or 1.
fn wrap_to_width(value: i64, bits: u32) -> i64 {
    match bits {
        1 => value & 1,
        64.. => value,
        _ => {
            let shift = 64 - bits;
            (value << shift) >> shift
        }
    }
}

fn low_bits(bits: u32) -> i64 {
    if bits >= 64 { -1 } else { (1i64 << bits) - 1 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_constants() {
        assert_eq!(wrap_to_width(300, 8), 44);
        assert_eq!(wrap_to_width(200, 8), -56);
        assert_eq!(wrap_to_width(3, 1), 1);
        assert_eq!(low_bits(8), 0xff);
        assert_eq!(wrap_to_width(-5, 64), -5);
    }

    #[test]
    fn primitives_resolve_from_the_root() {
        let ctx = CompileContext::new(CompileOptions::default());
        let ty = TypeRef::named("int", Span::default()).pointer_to();
        assert_eq!(ctx.resolve_type(&ty).ok(), Some(Type::I32.pointer_to()));

        let err = ctx
            .resolve_type(&TypeRef::named("Point", Span::default()))
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::UnresolvedSymbol {
                kind: SymbolKind::Type,
                ..
            }
        ));
    }

    #[test]
    fn type_info_layout() {
        let ctx = CompileContext::new(CompileOptions::default());
        let info = Type::Struct(TYPE_INFO_CLASS.to_string());
        assert_eq!(ctx.layout(&info, Span::default()).ok(), Some((16, 8)));
        assert_eq!(ctx.layout(&Type::BOOL, Span::default()).ok(), Some((1, 1)));
    }
}
