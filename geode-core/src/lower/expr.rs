//! Expressions: values, addresses and calls.

use crate::ast::{AssignOp, BinaryOp, Capability, Node, NodeKind, UnaryOp};
use crate::casts::default_promotion;
use crate::error::{CoreError, SymbolKind};
use crate::functions::describe_types;
use crate::ir::{BinOp, FloatPredicate, FuncId, IntPredicate, Value};
use crate::scope::search_names;
use crate::span::Span;
use crate::types::Type;

use super::CompileContext;

/// Runtime function behind format calls.
const RUNTIME_STR_FORMAT: &str = "__runtime_str_format";

impl CompileContext {
    /// Lower an expression that must produce a value.
    pub(super) fn lower_value(&mut self, node: &Node) -> Result<Value, CoreError> {
        self.lower_expr(node)?.ok_or_else(|| {
            CoreError::type_mismatch(format!("{} produces no value", node.kind_name()), node.span)
        })
    }

    /// Lower an expression; `None` for expressions of type `void`.
    pub(super) fn lower_expr(&mut self, node: &Node) -> Result<Option<Value>, CoreError> {
        let value = match &node.kind {
            NodeKind::Int(value) => int_literal(*value),
            NodeKind::Float(value) => Value::ConstFloat {
                value: *value,
                ty: Type::Double,
            },
            NodeKind::Str(text) => self.builder.string_literal(text.as_bytes()),
            NodeKind::Char(byte) => Value::int(i64::from(*byte as i8), Type::I8),
            NodeKind::Bool(value) => Value::int(i64::from(*value), Type::BOOL),
            NodeKind::Nil => Value::Null(Type::string()),
            NodeKind::Ident(name) => {
                let var = self.lookup_variable(name, node.span)?;
                self.builder.load(var.slot)
            }
            NodeKind::VarDecl { ty, name } => {
                self.declare_local(ty.as_ref(), name, None, node.span)?;
                return Ok(None);
            }
            NodeKind::Unary { op, operand } => self.lower_unary(*op, operand, node.span)?,
            NodeKind::Binary { op, lhs, rhs } => self.lower_binary(*op, lhs, rhs, node.span)?,
            NodeKind::Assign { op, target, value } => {
                self.lower_assign(*op, target, value, node.span)?
            }
            NodeKind::Call { callee, args } => return self.lower_call(callee, args, node.span),
            NodeKind::Format { template, args } => {
                return self.lower_format(template, args, node.span);
            }
            NodeKind::Dot { .. } | NodeKind::Subscript { .. } => {
                let ptr = self.lower_address(node)?;
                self.builder.load(ptr)
            }
            NodeKind::Cast { value, ty } => {
                let value = self.lower_value(value)?;
                let target = self.resolve_type(ty)?;
                return self.convert(value, &target, node.span);
            }
            NodeKind::Array(values) => self.lower_array(values, node.span)?,
            NodeKind::SizeOf(ty) => {
                let resolved = self.resolve_type(ty)?;
                let (size, _) = self.layout(&resolved, ty.span)?;
                Value::int(size as i64, Type::I64)
            }
            NodeKind::TypeInfo(ty) => self.type_info(ty)?,
            NodeKind::Return(_)
            | NodeKind::If { .. }
            | NodeKind::While { .. }
            | NodeKind::For { .. }
            | NodeKind::Block(_) => {
                return Err(CoreError::CapabilityMismatch {
                    expected: Capability::Accessible,
                    found: node.kind_name(),
                    span: node.span,
                });
            }
        };
        Ok(Some(value))
    }

    /// Pointer to the storage a node names.
    pub(super) fn lower_address(&mut self, node: &Node) -> Result<Value, CoreError> {
        match &node.kind {
            NodeKind::Ident(name) => Ok(self.lookup_variable(name, node.span)?.slot),
            NodeKind::VarDecl { ty, name } => {
                let (var, _) = self.declare_local(ty.as_ref(), name, None, node.span)?;
                Ok(var.slot)
            }
            NodeKind::Dot { base, field } => {
                let object = self.lower_object(base)?;
                let Some(class_name) = object.ty().pointee().and_then(Type::struct_name).map(str::to_string)
                else {
                    return Err(CoreError::type_mismatch(
                        format!("`{}` has no fields", object.ty()),
                        base.span,
                    ));
                };
                let class = self
                    .classes
                    .get(&class_name)
                    .ok_or_else(|| CoreError::unresolved(SymbolKind::Type, class_name.as_str(), base.span))?;
                let (index, field_ty) = class.field(field).ok_or_else(|| {
                    CoreError::unresolved(SymbolKind::Field, format!("{class_name}.{field}"), node.span)
                })?;
                let result = field_ty.clone().pointer_to();
                let indices = vec![Value::int(0, Type::I32), Value::int(index as i64, Type::I32)];
                Ok(self.builder.gep(object, indices, result))
            }
            NodeKind::Subscript { base, index } => {
                let base_value = self.lower_value(base)?;
                let Some(element) = base_value.ty().pointee().cloned() else {
                    return Err(CoreError::type_mismatch(
                        format!("cannot index into `{}`", base_value.ty()),
                        base.span,
                    ));
                };
                let index_value = self.lower_value(index)?;
                if !index_value.ty().is_int() {
                    return Err(CoreError::type_mismatch(
                        format!("index must be an integer, found `{}`", index_value.ty()),
                        index.span,
                    ));
                }
                let index_value = self.convert_to(index_value, &Type::I64, index.span)?;
                Ok(self.builder.gep(base_value, vec![index_value], element.pointer_to()))
            }
            NodeKind::Unary {
                op: UnaryOp::Deref,
                operand,
            } => self.lower_pointer(operand),
            NodeKind::TypeInfo(ty) => self.type_info(ty),
            _ => Err(CoreError::CapabilityMismatch {
                expected: Capability::Reference,
                found: node.kind_name(),
                span: node.span,
            }),
        }
    }

    /// Pointer to the class instance `node` refers to, loading through
    /// one level of pointer if needed.
    fn lower_object(&mut self, node: &Node) -> Result<Value, CoreError> {
        let ptr = self.lower_address(node)?;
        let ty = ptr.ty();
        match ty.pointee() {
            Some(Type::Struct(_)) => Ok(ptr),
            Some(Type::Pointer(inner)) if matches!(**inner, Type::Struct(_)) => {
                Ok(self.builder.load(ptr))
            }
            _ => Err(CoreError::type_mismatch(
                format!("`{}` is not a class instance", ty.pointee().unwrap_or(&ty)),
                node.span,
            )),
        }
    }

    fn lower_unary(&mut self, op: UnaryOp, operand: &Node, span: Span) -> Result<Value, CoreError> {
        match op {
            UnaryOp::Neg => {
                let value = self.lower_value(operand)?;
                let ty = value.ty();
                if let Value::ConstInt { value: constant, .. } = &value {
                    return Ok(Value::int(constant.wrapping_neg(), ty));
                }
                if ty.is_int() {
                    return Ok(self.builder.binary(BinOp::Sub, Value::int(0, ty), value));
                }
                if ty.is_float() {
                    return Ok(self.builder.fneg(value));
                }
                Err(CoreError::type_mismatch(format!("cannot negate `{ty}`"), span))
            }
            UnaryOp::Not => {
                let value = self.lower_value(operand)?;
                let cond = self.coerce_condition(value, operand.span)?;
                Ok(self.builder.binary(BinOp::Xor, cond, Value::int(1, Type::BOOL)))
            }
            UnaryOp::AddressOf => self.lower_address(operand),
            UnaryOp::Deref => {
                let pointer = self.lower_pointer(operand)?;
                Ok(self.builder.load(pointer))
            }
        }
    }

    /// A pointer-typed operand of `*`.
    fn lower_pointer(&mut self, operand: &Node) -> Result<Value, CoreError> {
        let pointer = self.lower_value(operand)?;
        if !pointer.ty().is_pointer() {
            return Err(CoreError::type_mismatch(
                format!("cannot dereference `{}`", pointer.ty()),
                operand.span,
            ));
        }
        Ok(pointer)
    }

    fn lower_binary(&mut self, op: BinaryOp, lhs: &Node, rhs: &Node, span: Span) -> Result<Value, CoreError> {
        let lhs = self.lower_value(lhs)?;
        let rhs = self.lower_value(rhs)?;
        let (lhs, rhs, ty) = self.unify(lhs, rhs, span)?;
        if op.is_comparison() {
            return Ok(self.compare(op, lhs, rhs, &ty));
        }
        self.arithmetic(op, lhs, rhs, &ty, span)
    }

    /// Operands must already share `ty`.
    fn arithmetic(
        &mut self,
        op: BinaryOp,
        lhs: Value,
        rhs: Value,
        ty: &Type,
        span: Span,
    ) -> Result<Value, CoreError> {
        let float = ty.is_float();
        let inst = match (op, float) {
            (BinaryOp::Add, false) => BinOp::Add,
            (BinaryOp::Add, true) => BinOp::FAdd,
            (BinaryOp::Sub, false) => BinOp::Sub,
            (BinaryOp::Sub, true) => BinOp::FSub,
            (BinaryOp::Mul, false) => BinOp::Mul,
            (BinaryOp::Mul, true) => BinOp::FMul,
            (BinaryOp::Div, false) => BinOp::SDiv,
            (BinaryOp::Div, true) => BinOp::FDiv,
            (BinaryOp::Rem, false) => BinOp::SRem,
            (BinaryOp::Rem, true) => BinOp::FRem,
            (BinaryOp::Shl, false) => BinOp::Shl,
            (BinaryOp::Shr, false) => BinOp::AShr,
            (BinaryOp::And, false) => BinOp::And,
            (BinaryOp::Or, false) => BinOp::Or,
            (BinaryOp::Xor, false) => BinOp::Xor,
            _ => {
                return Err(CoreError::type_mismatch(
                    format!("operator `{}` is not defined for `{ty}`", op.symbol()),
                    span,
                ));
            }
        };
        Ok(self.builder.binary(inst, lhs, rhs))
    }

    fn compare(&mut self, op: BinaryOp, lhs: Value, rhs: Value, ty: &Type) -> Value {
        if ty.is_float() {
            let pred = match op {
                BinaryOp::Eq => FloatPredicate::Oeq,
                BinaryOp::Ne => FloatPredicate::One,
                BinaryOp::Lt => FloatPredicate::Olt,
                BinaryOp::Le => FloatPredicate::Ole,
                BinaryOp::Gt => FloatPredicate::Ogt,
                _ => FloatPredicate::Oge,
            };
            return self.builder.fcmp(pred, lhs, rhs);
        }
        // `bool` is an unsigned 0/1 value.
        let unsigned = *ty == Type::BOOL;
        let pred = match (op, unsigned) {
            (BinaryOp::Eq, _) => IntPredicate::Eq,
            (BinaryOp::Ne, _) => IntPredicate::Ne,
            (BinaryOp::Lt, false) => IntPredicate::Slt,
            (BinaryOp::Le, false) => IntPredicate::Sle,
            (BinaryOp::Gt, false) => IntPredicate::Sgt,
            (_, false) => IntPredicate::Sge,
            (BinaryOp::Lt, true) => IntPredicate::Ult,
            (BinaryOp::Le, true) => IntPredicate::Ule,
            (BinaryOp::Gt, true) => IntPredicate::Ugt,
            (_, true) => IntPredicate::Uge,
        };
        self.builder.icmp(pred, lhs, rhs)
    }

    /// Store into the target; the stored value is the result.
    fn lower_assign(
        &mut self,
        op: AssignOp,
        target: &Node,
        value: &Node,
        span: Span,
    ) -> Result<Value, CoreError> {
        if let NodeKind::VarDecl { ty, name } = &target.kind {
            if op != AssignOp::Set {
                return Err(CoreError::type_mismatch(
                    format!("`{}` needs an existing variable, `{name}` is new", op.symbol()),
                    span,
                ));
            }
            let init = self.lower_value(value)?;
            let (_, stored) = self.declare_local(ty.as_ref(), name, Some(init), target.span)?;
            return Ok(stored);
        }

        let ptr = self.lower_address(target)?;
        let element = ptr.ty().pointee().cloned().unwrap_or(Type::Void);
        let mut result = self.lower_value(value)?;
        if let Some(bin) = op.binary() {
            let current = self.builder.load(ptr.clone());
            let (lhs, rhs, ty) = self.unify(current, result, span)?;
            result = self.arithmetic(bin, lhs, rhs, &ty, span)?;
        }
        let result = self.convert_to(result, &element, span)?;
        self.builder.store(result.clone(), ptr);
        Ok(result)
    }

    fn lower_call(&mut self, callee: &Node, args: &[Node], span: Span) -> Result<Option<Value>, CoreError> {
        let mut values = Vec::with_capacity(args.len() + 1);
        let (written, names) = match &callee.kind {
            NodeKind::Ident(name) => (name.clone(), search_names(name, &self.package)),
            NodeKind::Dot { base, field } => {
                let this = self.lower_object(base)?;
                let class = this
                    .ty()
                    .pointee()
                    .and_then(Type::struct_name)
                    .map(str::to_string)
                    .unwrap_or_default();
                values.push(this);
                let method = format!("{class}.{field}");
                (method.clone(), vec![method])
            }
            _ => {
                return Err(CoreError::CapabilityMismatch {
                    expected: Capability::Callable,
                    found: callee.kind_name(),
                    span: callee.span,
                });
            }
        };
        for arg in args {
            values.push(self.lower_value(arg)?);
        }
        self.emit_call(&written, &names, values, span)
    }

    /// `"template"(args)` calls the runtime formatter with the template
    /// followed by the arguments.
    fn lower_format(&mut self, template: &str, args: &[Node], span: Span) -> Result<Option<Value>, CoreError> {
        let mut values = Vec::with_capacity(args.len() + 1);
        values.push(self.builder.string_literal(template.as_bytes()));
        for arg in args {
            values.push(self.lower_value(arg)?);
        }
        let names = search_names(RUNTIME_STR_FORMAT, &self.package);
        self.emit_call(RUNTIME_STR_FORMAT, &names, values, span)
    }

    fn emit_call(
        &mut self,
        callee: &str,
        names: &[String],
        values: Vec<Value>,
        span: Span,
    ) -> Result<Option<Value>, CoreError> {
        let arg_types: Vec<Type> = values.iter().map(Value::ty).collect();
        let func = self.resolve_function(callee, names, &arg_types, span)?;
        let values = self.convert_arguments(func, values, span)?;
        tracing::trace!(callee, args = %describe_types(&arg_types), "call");
        Ok(self.builder.call(func, values))
    }

    /// Convert arguments to the callee's parameter types; extra variadic
    /// arguments get the default promotion.
    fn convert_arguments(&mut self, func: FuncId, values: Vec<Value>, span: Span) -> Result<Vec<Value>, CoreError> {
        let params = self.builder.function(func).params.clone();
        values
            .into_iter()
            .enumerate()
            .map(|(i, value)| {
                let target = match params.get(i) {
                    Some(param) => param.clone(),
                    None => default_promotion(&value.ty()),
                };
                self.convert_to(value, &target, span)
            })
            .collect()
    }

    /// `[a, b, c]`: a stack array of the first element's type; the value
    /// is a pointer to its first element.
    fn lower_array(&mut self, values: &[Node], span: Span) -> Result<Value, CoreError> {
        let mut lowered = Vec::with_capacity(values.len());
        for value in values {
            lowered.push(self.lower_value(value)?);
        }
        let Some(element) = lowered.first().map(Value::ty) else {
            return Err(CoreError::type_mismatch("cannot infer the type of an empty array", span));
        };
        let array = Type::Array(Box::new(element.clone()), lowered.len() as u64);
        let slot = self.builder.alloca(array);
        let zero = Value::int(0, Type::I64);
        for (i, value) in lowered.into_iter().enumerate() {
            let value = self.convert_to(value, &element, span)?;
            let indices = vec![zero.clone(), Value::int(i as i64, Type::I64)];
            let ptr = self.builder.gep(slot.clone(), indices, element.clone().pointer_to());
            self.builder.store(value, ptr);
        }
        Ok(self
            .builder
            .gep(slot, vec![zero.clone(), zero], element.pointer_to()))
    }
}

/// Integer literals are `int` when they fit in 32 bits, `long` otherwise.
fn int_literal(value: i64) -> Value {
    if i32::try_from(value).is_ok() {
        Value::int(value, Type::I32)
    } else {
        Value::int(value, Type::I64)
    }
}
