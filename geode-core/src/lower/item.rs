//! Top-level declarations and function instantiation.
//!
//! Registration happens for every unit before any body is lowered, so
//! bodies can refer to classes, globals and functions declared later or
//! in other units. Bodies are lowered on demand, once per concrete
//! signature.

use std::rc::Rc;

use crate::ast::{ClassDef, FunctionDef, GlobalDef, Item, Node, NodeKind, TypeRef, Unit};
use crate::diagnostic::Diagnostic;
use crate::error::{CoreError, SymbolKind};
use crate::functions::{DeclId, FunctionDecl, unknown_binding};
use crate::ir::{BlockId, Constant, FuncId, Global, Value};
use crate::mangle::mangle;
use crate::scope::{Binding, ScopeItem, Variable, Visibility, qualify};
use crate::span::Span;
use crate::types::Type;

use super::{ClassInfo, CompileContext, Frame, PendingInit, resolve_type_in, wrap_to_width};

/// A pure function neither takes nor returns pointers. Checked per
/// instantiation, since `?` may bind to a pointer type.
fn check_pure(name: &str, params: &[Type], ret: &Type, span: Span) -> Result<(), CoreError> {
    if let Some(param) = params.iter().find(|ty| ty.is_pointer()) {
        return Err(CoreError::type_mismatch(
            format!("pure function `{name}` cannot take a pointer argument (`{param}`)"),
            span,
        ));
    }
    if ret.is_pointer() {
        return Err(CoreError::type_mismatch(
            format!("pure function `{name}` cannot return a pointer (`{ret}`)"),
            span,
        ));
    }
    Ok(())
}

/// Everything needed to lower one instantiation's body.
struct Instance {
    func: FuncId,
    name: String,
    package: String,
    params: Vec<(String, Type)>,
    ret: Type,
    span: Span,
    is_main: bool,
}

impl CompileContext {
    /// Register the classes, globals and functions of every unit.
    pub fn register_units(&mut self, units: Vec<Unit>) -> Result<(), CoreError> {
        for unit in &units {
            for item in &unit.items {
                if let Item::Class(class) = item {
                    self.register_class_name(&unit.package, class)?;
                }
            }
        }
        for unit in &units {
            for item in &unit.items {
                if let Item::Class(class) = item {
                    self.register_class_fields(&unit.package, class)?;
                }
            }
        }
        for unit in units {
            let package = unit.package;
            for item in unit.items {
                match item {
                    Item::Class(class) => {
                        let receiver = Type::Struct(qualify(&package, &class.name));
                        for method in class.methods {
                            self.register_function(&package, method, Some(receiver.clone()));
                        }
                    }
                    Item::Global(global) => self.register_global(&package, &global)?,
                    Item::Function(def) => {
                        self.register_function(&package, def, None);
                    }
                }
            }
        }
        Ok(())
    }

    fn register_class_name(&mut self, package: &str, class: &ClassDef) -> Result<(), CoreError> {
        let qualified = qualify(package, &class.name);
        if self.classes.contains_key(&qualified) {
            return Err(CoreError::type_mismatch(
                format!("class `{qualified}` is defined more than once"),
                class.span,
            ));
        }
        tracing::debug!(class = %qualified, "registering class");
        let root = self.scopes.root();
        self.scopes.define(
            root,
            ScopeItem::new(
                qualified.clone(),
                Visibility::Public,
                Binding::Type(Type::Struct(qualified.clone())),
            ),
        );
        self.classes.insert(
            qualified.clone(),
            ClassInfo {
                name: qualified,
                fields: Vec::new(),
            },
        );
        Ok(())
    }

    fn register_class_fields(&mut self, package: &str, class: &ClassDef) -> Result<(), CoreError> {
        let qualified = qualify(package, &class.name);
        let root = self.scopes.root();
        let mut fields = Vec::with_capacity(class.fields.len());
        for field in &class.fields {
            let ty = resolve_type_in(&self.scopes, root, package, &field.ty)?;
            if ty.is_void() {
                return Err(CoreError::type_mismatch(
                    format!("field `{}.{}` cannot have type `void`", class.name, field.name),
                    field.ty.span,
                ));
            }
            fields.push((field.name.clone(), ty));
        }
        self.builder
            .add_struct(qualified.clone(), fields.iter().map(|(_, ty)| ty.clone()).collect());
        if let Some(info) = self.classes.get_mut(&qualified) {
            info.fields = fields;
        }
        Ok(())
    }

    fn register_global(&mut self, package: &str, global: &GlobalDef) -> Result<(), CoreError> {
        let root = self.scopes.root();
        let ty = resolve_type_in(&self.scopes, root, package, &global.ty)?;
        if ty.is_void() {
            return Err(CoreError::type_mismatch(
                format!("global `{}` cannot have type `void`", global.name),
                global.span,
            ));
        }
        let qualified = qualify(package, &global.name);
        tracing::debug!(global = %qualified, external = global.external, "registering global");

        let mut startup_init = None;
        let (symbol, init) = if global.external {
            (global.name.clone(), None)
        } else {
            let constant = match &global.init {
                Some(node) => self.constant_initializer(node, &ty),
                None => None,
            };
            if constant.is_none() {
                startup_init = global.init.clone();
            }
            (qualified.clone(), Some(constant.unwrap_or(Constant::Zero)))
        };
        let id = self.builder.add_global(Global {
            name: symbol,
            ty: ty.clone(),
            init,
            constant: false,
        });
        let slot = Value::Global {
            id,
            ty: ty.clone().pointer_to(),
        };
        if let Some(init) = startup_init {
            self.pending_inits.push(PendingInit {
                slot: slot.clone(),
                ty: ty.clone(),
                init,
                package: package.to_string(),
            });
        }

        self.scopes.define(
            root,
            ScopeItem::new(qualified, Visibility::Public, Binding::Variable(Variable { slot, ty })),
        );
        Ok(())
    }

    /// Literal initializers become constant data; `None` means the value
    /// has to be computed at startup.
    fn constant_initializer(&mut self, node: &Node, ty: &Type) -> Option<Constant> {
        Some(match (&node.kind, ty) {
            (NodeKind::Int(value), Type::Int(bits)) => Constant::Int(wrap_to_width(*value, *bits)),
            (NodeKind::Int(value), Type::Float | Type::Double) => Constant::Float(*value as f64),
            (NodeKind::Float(value), Type::Float | Type::Double) => Constant::Float(*value),
            (NodeKind::Bool(value), Type::Int(bits)) => {
                Constant::Int(wrap_to_width(i64::from(*value), *bits))
            }
            (NodeKind::Char(byte), Type::Int(bits)) => {
                Constant::Int(wrap_to_width(i64::from(*byte as i8), *bits))
            }
            (NodeKind::Nil, Type::Pointer(_)) => Constant::Null,
            (NodeKind::Str(text), Type::Pointer(inner)) if **inner == Type::I8 => {
                let (id, len) = self.builder.string_constant(text.as_bytes());
                Constant::StringPtr { id, len }
            }
            _ => return None,
        })
    }

    fn register_function(&mut self, package: &str, def: FunctionDef, receiver: Option<Type>) -> DeclId {
        let qualified = match receiver.as_ref().and_then(Type::struct_name) {
            Some(class) => format!("{class}.{}", def.name),
            None => qualify(package, &def.name),
        };
        let bare = def.name.clone();
        let external = def.is_external() && receiver.is_none();
        tracing::debug!(function = %qualified, external, "registering function");

        let mut decl = FunctionDecl::new(qualified.clone(), package.to_string(), Rc::new(def));
        decl.receiver = receiver;
        let id = self.functions.insert(decl);

        let root = self.scopes.root();
        self.scopes
            .define(root, ScopeItem::new(qualified, Visibility::Public, Binding::Function(id)));
        if external {
            self.scopes
                .define(root, ScopeItem::new(bare, Visibility::Public, Binding::Function(id)));
        }
        id
    }

    /// Instantiate `main` and every function whose signature is fully
    /// known. Generic functions are only instantiated from call sites and
    /// externals are only declared when called.
    pub fn instantiate_entry_points(&mut self) -> Result<(), CoreError> {
        let mut ids: Vec<DeclId> = self.functions.ids().collect();
        ids.sort_by_key(|id| {
            let decl = self.functions.get(*id);
            !(decl.def.name == "main" && decl.receiver.is_none())
        });

        let mut has_main = false;
        for id in ids {
            let decl = self.functions.get(id);
            if decl.def.is_external() || decl.def.is_generic() {
                continue;
            }
            has_main |= decl.def.name == "main" && decl.receiver.is_none();
            let params = self.declared_params(id)?;
            self.instantiate(id, params)?;
        }

        if !has_main && !self.pending_inits.is_empty() {
            for pending in std::mem::take(&mut self.pending_inits) {
                self.diagnostics.push(Diagnostic::warning(
                    "global initializer is never run: there is no `main` function",
                    pending.init.span,
                ));
            }
        }
        Ok(())
    }

    /// Parameter types of a non-generic declaration.
    fn declared_params(&self, id: DeclId) -> Result<Vec<Type>, CoreError> {
        let decl = self.functions.get(id);
        let root = self.scopes.root();
        let mut params = Vec::with_capacity(decl.arity());
        if let Some(receiver) = &decl.receiver {
            params.push(receiver.clone().pointer_to());
        }
        for param in &decl.def.params {
            params.push(resolve_type_in(&self.scopes, root, &decl.package, &param.ty)?);
        }
        Ok(params)
    }

    /// Find the function a call to `callee` refers to, trying `names` in
    /// order, and return its instantiation for `arg_types`.
    pub(super) fn resolve_function(
        &mut self,
        callee: &str,
        names: &[String],
        arg_types: &[Type],
        span: Span,
    ) -> Result<FuncId, CoreError> {
        for name in names {
            let candidates = self.scopes.find_functions(self.scope, name);
            if candidates.is_empty() {
                continue;
            }
            let scopes = &self.scopes;
            let root = scopes.root();
            let (id, signature) = self
                .functions
                .select(&candidates, arg_types, &self.casts, &mut |package: &str, ty: &TypeRef| {
                    resolve_type_in(scopes, root, package, ty)
                })
                .map_err(|err| err.or_span(span))?;
            return self.instantiate(id, signature.params);
        }
        Err(CoreError::unresolved(SymbolKind::Function, callee, span))
    }

    fn return_type(&self, id: DeclId, params: &[Type]) -> Result<Type, CoreError> {
        let decl = self.functions.get(id);
        let def = &decl.def;
        if !def.ret.unknown {
            return resolve_type_in(&self.scopes, self.scopes.root(), &decl.package, &def.ret);
        }
        let offset = usize::from(decl.receiver.is_some());
        let Some((index, param)) = def.params.iter().enumerate().find(|(_, p)| p.ty.unknown) else {
            return Err(CoreError::type_mismatch(
                format!("`{}` returns `?` but has no `?` parameter to bind it", decl.qualified_name),
                def.ret.span,
            ));
        };
        let mut ty = unknown_binding(&param.ty, &params[offset + index]);
        for _ in 0..def.ret.pointer_level {
            ty = ty.pointer_to();
        }
        Ok(ty)
    }

    /// Look up or create the instantiation of `id` for `params`.
    ///
    /// The handle is cached before the body is lowered so recursive calls
    /// resolve to it.
    fn instantiate(&mut self, id: DeclId, params: Vec<Type>) -> Result<FuncId, CoreError> {
        let decl = self.functions.get(id);
        let key = mangle(&decl.qualified_name, &params);
        if let Some(&func) = decl.variants.get(&key) {
            tracing::debug!(%key, "instantiation cache hit");
            return Ok(func);
        }
        let symbol = decl.symbol(&key);
        let def = Rc::clone(&decl.def);
        let name = decl.qualified_name.clone();
        let package = decl.package.clone();
        let has_receiver = decl.receiver.is_some();
        let ret = self.return_type(id, &params)?;
        if def.pure {
            check_pure(&name, &params[usize::from(has_receiver)..], &ret, def.span)?;
        }

        let Some(body) = def.body.as_ref() else {
            let func = match self.builder.module().find_function(&symbol) {
                Some(existing) => existing,
                None => self.builder.declare_function(symbol, params, ret, def.variadic),
            };
            self.functions.get_mut(id).variants.insert(key, func);
            tracing::debug!(function = %name, "declared external function");
            return Ok(func);
        };

        let is_main = symbol == "main";
        let func = self
            .builder
            .declare_function(symbol, params.clone(), ret.clone(), def.variadic);
        self.functions.get_mut(id).variants.insert(key.clone(), func);
        tracing::debug!(%key, function = %name, "instantiating");

        let names = has_receiver
            .then(|| "this".to_string())
            .into_iter()
            .chain(def.params.iter().map(|p| p.name.clone()));
        let instance = Instance {
            func,
            name,
            package,
            params: names.zip(params).collect(),
            ret,
            span: def.span,
            is_main,
        };
        self.lower_function(instance, body)?;
        Ok(func)
    }

    /// Lower a body into its declared function, in a fresh child of the
    /// root scope. Restores the caller's insertion point afterwards.
    fn lower_function(&mut self, instance: Instance, body: &Node) -> Result<(), CoreError> {
        let saved_position = self.builder.position();
        let saved_scope = self.scope;
        let saved_package = std::mem::replace(&mut self.package, instance.package);
        let saved_frame = self.frame.replace(Frame {
            name: instance.name,
            ret: instance.ret,
            span: instance.span,
        });
        self.scope = self.scopes.child(self.scopes.root());
        let entry = self.builder.append_block(instance.func, "entry");
        self.builder.position_at_end(instance.func, entry);

        let result = self.lower_function_contents(instance.params, body, instance.is_main);

        self.scopes.discard(self.scope);
        self.scope = saved_scope;
        self.package = saved_package;
        self.frame = saved_frame;
        self.builder.set_position(saved_position);
        result
    }

    fn lower_function_contents(
        &mut self,
        params: Vec<(String, Type)>,
        body: &Node,
        is_main: bool,
    ) -> Result<(), CoreError> {
        for (index, (name, ty)) in params.into_iter().enumerate() {
            let slot = self.builder.alloca(ty.clone());
            self.builder.store(
                Value::Param {
                    index: index as u32,
                    ty: ty.clone(),
                },
                slot.clone(),
            );
            self.scopes.define(
                self.scope,
                ScopeItem::new(name, Visibility::Private, Binding::Variable(Variable { slot, ty })),
            );
        }
        if is_main {
            self.run_global_initializers()?;
        }
        self.lower_stmt(body)?;
        self.finish_function()
    }

    fn run_global_initializers(&mut self) -> Result<(), CoreError> {
        for pending in std::mem::take(&mut self.pending_inits) {
            let saved = std::mem::replace(&mut self.package, pending.package);
            let value = self.lower_value(&pending.init);
            self.package = saved;
            let value = self.convert_to(value?, &pending.ty, pending.init.span)?;
            self.builder.store(value, pending.slot);
        }
        Ok(())
    }

    /// Close a body that fell off its end.
    fn finish_function(&mut self) -> Result<(), CoreError> {
        if self.builder.has_terminator() {
            return Ok(());
        }
        let block = self.builder.position().block;
        if block != BlockId(0) && !self.builder.has_predecessors(block) {
            self.builder.unreachable();
            return Ok(());
        }

        let frame = self.frame(Span::default())?;
        let (name, ret, span) = (frame.name.clone(), frame.ret.clone(), frame.span);
        if ret.is_void() {
            self.builder.ret(None);
            return Ok(());
        }
        if self.options.strict_returns {
            return Err(CoreError::type_mismatch(
                format!("`{name}` can reach its end without returning a `{ret}`"),
                span,
            ));
        }
        tracing::warn!(function = %name, "missing return, returning the default value");
        self.diagnostics.push(
            Diagnostic::warning(
                format!("`{name}` can reach its end without returning; a default `{ret}` is returned"),
                span,
            )
            .with_code("W0400"),
        );
        self.builder.ret(Some(Value::default_for(&ret)));
        Ok(())
    }
}
