//! Lexical scope tree.
//!
//! Scopes live in an arena and refer to their parent by id. Values
//! (variables and functions) and types are kept in separate maps, so a
//! type and a variable with the same spelling do not collide.

use std::collections::HashMap;

use crate::functions::DeclId;
use crate::ir::Value;
use crate::types::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Package-level names.
    Public,
    /// Locals and parameters.
    Private,
}

/// A variable's storage: `slot` is a pointer to a value of type `ty`.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub slot: Value,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Variable(Variable),
    Function(DeclId),
    Type(Type),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScopeItem {
    pub name: String,
    pub visibility: Visibility,
    pub binding: Binding,
}

impl ScopeItem {
    pub fn new(name: impl Into<String>, visibility: Visibility, binding: Binding) -> Self {
        ScopeItem {
            name: name.into(),
            visibility,
            binding,
        }
    }
}

#[derive(Debug, Default)]
struct Scope {
    parent: Option<ScopeId>,
    children: Vec<ScopeId>,
    /// Same-named values stack up: the last variable shadows earlier
    /// ones, functions accumulate as overloads.
    values: HashMap<String, Vec<ScopeItem>>,
    types: HashMap<String, ScopeItem>,
}

#[derive(Debug)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
    /// Discarded slots, reused by `child`.
    free: Vec<ScopeId>,
}

impl Default for ScopeTree {
    fn default() -> Self {
        ScopeTree::new()
    }
}

impl ScopeTree {
    pub fn new() -> Self {
        ScopeTree {
            scopes: vec![Scope::default()],
            free: Vec::new(),
        }
    }

    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    pub fn child(&mut self, parent: ScopeId) -> ScopeId {
        let scope = Scope {
            parent: Some(parent),
            ..Scope::default()
        };
        let id = match self.free.pop() {
            Some(id) => {
                self.scopes[id.0 as usize] = scope;
                id
            }
            None => {
                self.scopes.push(scope);
                ScopeId(self.scopes.len() as u32 - 1)
            }
        };
        self.scopes[parent.0 as usize].children.push(id);
        id
    }

    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes[scope.0 as usize].parent
    }

    /// Drop a scope whose region has been lowered, with everything below
    /// it. Its slot is handed out again by the next `child`. The root is
    /// never discarded.
    pub fn discard(&mut self, scope: ScopeId) {
        let Some(parent) = self.scopes[scope.0 as usize].parent else {
            return;
        };
        self.scopes[parent.0 as usize].children.retain(|&child| child != scope);
        self.release(scope);
    }

    fn release(&mut self, scope: ScopeId) {
        let entry = std::mem::take(&mut self.scopes[scope.0 as usize]);
        for child in entry.children {
            self.release(child);
        }
        self.free.push(scope);
    }

    /// Insert into `scope` only.
    pub fn define(&mut self, scope: ScopeId, item: ScopeItem) {
        let entry = &mut self.scopes[scope.0 as usize];
        match item.binding {
            Binding::Type(_) => {
                entry.types.insert(item.name.clone(), item);
            }
            Binding::Variable(_) | Binding::Function(_) => {
                entry.values.entry(item.name.clone()).or_default().push(item);
            }
        }
    }

    fn ancestors(&self, scope: ScopeId) -> impl Iterator<Item = &Scope> + '_ {
        let mut next = Some(scope);
        std::iter::from_fn(move || {
            let id = next?;
            let entry = &self.scopes[id.0 as usize];
            next = entry.parent;
            Some(entry)
        })
    }

    /// Nearest value named `name`, walking upward from `scope`.
    pub fn find(&self, scope: ScopeId, name: &str) -> Option<&ScopeItem> {
        self.ancestors(scope)
            .find_map(|s| s.values.get(name).and_then(|items| items.last()))
    }

    pub fn find_type(&self, scope: ScopeId, name: &str) -> Option<&Type> {
        self.ancestors(scope)
            .find_map(|s| s.types.get(name))
            .and_then(|item| match &item.binding {
                Binding::Type(ty) => Some(ty),
                _ => None,
            })
    }

    /// All functions named `name` in the nearest scope that has any.
    pub fn find_functions(&self, scope: ScopeId, name: &str) -> Vec<DeclId> {
        for entry in self.ancestors(scope) {
            let decls: Vec<DeclId> = entry
                .values
                .get(name)
                .into_iter()
                .flatten()
                .filter_map(|item| match item.binding {
                    Binding::Function(id) => Some(id),
                    _ => None,
                })
                .collect();
            if !decls.is_empty() {
                return decls;
            }
        }
        Vec::new()
    }

    /// Nearest local or parameter named `name`. The root scope only holds
    /// package-level names, so it is skipped.
    pub fn find_local(&self, scope: ScopeId, name: &str) -> Option<&ScopeItem> {
        self.ancestors(scope)
            .filter(|s| s.parent.is_some())
            .find_map(|s| s.values.get(name).and_then(|items| items.last()))
    }

    /// First hit over `names`, in order.
    pub fn find_qualified(&self, scope: ScopeId, names: &[String]) -> Option<&ScopeItem> {
        names.iter().find_map(|name| self.find(scope, name))
    }

    /// Value lookup from code in `package`: locals shadow everything,
    /// then the candidates of [`search_names`] are tried in order.
    pub fn lookup(&self, scope: ScopeId, name: &str, package: &str) -> Option<&ScopeItem> {
        self.find_local(scope, name)
            .or_else(|| self.find_qualified(scope, &search_names(name, package)))
    }

    pub fn find_type_qualified(&self, scope: ScopeId, names: &[String]) -> Option<&Type> {
        names.iter().find_map(|name| self.find_type(scope, name))
    }
}

/// Package-level names tried, in order, when looking up `name` from code
/// in `package`. `ns:name` tries itself, then `package:name`, then the
/// bare `name`; an unqualified name tries `package:name` before `name`.
pub fn search_names(name: &str, package: &str) -> Vec<String> {
    let bare = name.rsplit_once(':').map_or(name, |(_, bare)| bare);
    let mut names = Vec::with_capacity(3);
    for candidate in [name.to_string(), qualify(package, bare), bare.to_string()] {
        if !names.contains(&candidate) {
            names.push(candidate);
        }
    }
    names
}

pub fn qualify(package: &str, name: &str) -> String {
    format!("{package}:{name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_var(slot: u32) -> Binding {
        Binding::Variable(Variable {
            slot: Value::Reg {
                id: slot,
                ty: Type::I32.pointer_to(),
            },
            ty: Type::I32,
        })
    }

    fn slot_of(item: Option<&ScopeItem>) -> Option<u32> {
        match item.map(|i| &i.binding) {
            Some(Binding::Variable(Variable {
                slot: Value::Reg { id, .. },
                ..
            })) => Some(*id),
            _ => None,
        }
    }

    #[test]
    fn inner_binding_shadows_until_scope_is_discarded() {
        let mut tree = ScopeTree::new();
        let outer = tree.child(tree.root());
        tree.define(outer, ScopeItem::new("x", Visibility::Private, int_var(1)));

        let inner = tree.child(outer);
        tree.define(inner, ScopeItem::new("x", Visibility::Private, int_var(2)));
        tree.define(inner, ScopeItem::new("y", Visibility::Private, int_var(3)));
        assert_eq!(slot_of(tree.find(inner, "x")), Some(2));

        tree.discard(inner);
        assert_eq!(slot_of(tree.find(outer, "x")), Some(1));
        assert_eq!(slot_of(tree.find(outer, "y")), None);
        assert_eq!(slot_of(tree.find(inner, "y")), None);
    }

    #[test]
    fn discarded_scopes_are_reused() {
        let mut tree = ScopeTree::new();
        let body = tree.child(tree.root());
        for _ in 0..100 {
            let block = tree.child(body);
            let inner = tree.child(block);
            tree.define(inner, ScopeItem::new("i", Visibility::Private, int_var(1)));
            tree.discard(block);
        }
        assert_eq!(tree.scopes.len(), 4);
        assert!(tree.scopes[body.0 as usize].children.is_empty());

        let fresh = tree.child(body);
        assert!(tree.find(fresh, "i").is_none());
        assert_eq!(tree.parent(fresh), Some(body));
    }

    #[test]
    fn define_never_touches_the_parent() {
        let mut tree = ScopeTree::new();
        let child = tree.child(tree.root());
        tree.define(child, ScopeItem::new("x", Visibility::Private, int_var(1)));
        assert!(tree.find(tree.root(), "x").is_none());
    }

    #[test]
    fn types_and_values_do_not_collide() {
        let mut tree = ScopeTree::new();
        let root = tree.root();
        tree.define(root, ScopeItem::new("Point", Visibility::Public, Binding::Type(Type::I32)));
        tree.define(root, ScopeItem::new("Point", Visibility::Public, int_var(7)));
        assert_eq!(tree.find_type(root, "Point"), Some(&Type::I32));
        assert_eq!(slot_of(tree.find(root, "Point")), Some(7));
    }

    #[test]
    fn functions_accumulate_as_overloads() {
        let mut tree = ScopeTree::new();
        let root = tree.root();
        tree.define(root, ScopeItem::new("main:f", Visibility::Public, Binding::Function(DeclId(0))));
        tree.define(root, ScopeItem::new("main:f", Visibility::Public, Binding::Function(DeclId(1))));
        let child = tree.child(root);
        assert_eq!(tree.find_functions(child, "main:f"), vec![DeclId(0), DeclId(1)]);
        assert!(tree.find_functions(child, "f").is_empty());
    }

    #[test]
    fn search_order() {
        assert_eq!(search_names("x", "main"), vec!["main:x", "x"]);
        assert_eq!(search_names("io:print", "main"), vec!["io:print", "main:print", "print"]);
        assert_eq!(search_names("main:f", "main"), vec!["main:f", "f"]);
    }

    #[test]
    fn locals_shadow_package_names() {
        let mut tree = ScopeTree::new();
        let root = tree.root();
        tree.define(root, ScopeItem::new("main:x", Visibility::Public, int_var(1)));
        let local = tree.child(root);
        tree.define(local, ScopeItem::new("x", Visibility::Private, int_var(2)));
        assert_eq!(slot_of(tree.lookup(local, "x", "main")), Some(2));
        assert_eq!(slot_of(tree.lookup(local, "main:x", "main")), Some(1));
        assert_eq!(slot_of(tree.lookup(root, "x", "main")), Some(1));
    }

    #[test]
    fn package_name_shadows_bare_name() {
        let mut tree = ScopeTree::new();
        let root = tree.root();
        tree.define(root, ScopeItem::new("puts", Visibility::Public, int_var(1)));
        tree.define(root, ScopeItem::new("io:puts", Visibility::Public, int_var(1)));
        tree.define(root, ScopeItem::new("main:puts", Visibility::Public, int_var(2)));
        let local = tree.child(root);
        assert_eq!(slot_of(tree.lookup(local, "puts", "main")), Some(2));
        assert_eq!(slot_of(tree.lookup(local, "puts", "net")), Some(1));
        assert_eq!(slot_of(tree.lookup(local, "io:puts", "main")), Some(1));
    }
}
