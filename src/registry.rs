//! Symbol Registry (C2)
//!
//! Named lookup for variables, functions, struct/enum definitions, and
//! builtin intrinsics, keyed by `(name, compile_suffix, effect_suffix)`
//! with lexical scope nesting (innermost wins). The registry itself does
//! not decide *which* suffix is active during resolution of a bare
//! identifier — that is the effect resolver's (C5) job — it only stores
//! and retrieves entities once the caller has settled on a key.

use crate::types::{Type, TypeId};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Variable(Type),
    Function {
        params: Vec<Type>,
        result: Type,
        is_extern: bool,
    },
    TypeDef(TypeId),
    BuiltinIntrinsic,
    EffectValue(Type),
}

/// The non-propagating/propagating suffix pair a symbol is keyed under.
/// Empty strings mean "no suffix" (the base compiled variant).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SymbolKey {
    pub name: String,
    pub compile_suffix: String,
    pub effect_suffix: String,
}

impl SymbolKey {
    pub fn base(name: impl Into<String>) -> Self {
        SymbolKey {
            name: name.into(),
            compile_suffix: String::new(),
            effect_suffix: String::new(),
        }
    }

    pub fn with_effect_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.effect_suffix = suffix.into();
        self
    }

    pub fn with_compile_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.compile_suffix = suffix.into();
        self
    }

    /// Render the mangled symbol name per §6: `{name}_{compile}_{effect}`,
    /// with empty components omitted.
    pub fn mangled(&self) -> String {
        let mut parts = vec![self.name.as_str()];
        if !self.compile_suffix.is_empty() {
            parts.push(self.compile_suffix.as_str());
        }
        if !self.effect_suffix.is_empty() {
            parts.push(self.effect_suffix.as_str());
        }
        parts.join("_")
    }
}

/// One lexical scope: a flat map from bare name to entity. Scopes nest in a
/// stack owned by [`Registry`]; only variable/type lookups consult the
/// scope stack, compiled-function lookups always go through `functions`
/// keyed by the full [`SymbolKey`].
#[derive(Debug, Clone, Default)]
struct Scope {
    bindings: HashMap<String, Entity>,
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    scopes: Vec<Scope>,
    functions: HashMap<SymbolKey, Entity>,
    type_defs: HashMap<String, TypeId>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            scopes: vec![Scope::default()],
            functions: HashMap::new(),
            type_defs: HashMap::new(),
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
        assert!(!self.scopes.is_empty(), "popped the function-root scope");
    }

    pub fn define_variable(&mut self, name: impl Into<String>, ty: Type) {
        self.scopes
            .last_mut()
            .expect("at least one scope")
            .bindings
            .insert(name.into(), Entity::Variable(ty));
    }

    pub fn lookup(&self, name: &str) -> Option<&Entity> {
        for scope in self.scopes.iter().rev() {
            if let Some(entity) = scope.bindings.get(name) {
                return Some(entity);
            }
        }
        None
    }

    pub fn define_type(&mut self, name: impl Into<String>, id: TypeId) {
        self.type_defs.insert(name.into(), id);
    }

    pub fn lookup_type(&self, name: &str) -> Option<TypeId> {
        self.type_defs.get(name).copied()
    }

    pub fn define_function(&mut self, key: SymbolKey, entity: Entity) {
        self.functions.insert(key, entity);
    }

    pub fn lookup_function(&self, key: &SymbolKey) -> Option<&Entity> {
        self.functions.get(key)
    }

    pub fn has_function(&self, key: &SymbolKey) -> bool {
        self.functions.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IntType;

    fn i32_ty() -> Type {
        Type::Int(IntType::new(true, 32).unwrap())
    }

    #[test]
    fn innermost_scope_shadows_outer() {
        let mut reg = Registry::new();
        reg.define_variable("x", i32_ty());
        reg.push_scope();
        reg.define_variable("x", Type::Bool);
        assert_eq!(reg.lookup("x"), Some(&Entity::Variable(Type::Bool)));
        reg.pop_scope();
        assert_eq!(reg.lookup("x"), Some(&Entity::Variable(i32_ty())));
    }

    #[test]
    fn mangled_name_omits_empty_suffixes() {
        let base = SymbolKey::base("f");
        assert_eq!(base.mangled(), "f");
        let with_effect = base.clone().with_effect_suffix("mock");
        assert_eq!(with_effect.mangled(), "f_mock");
        let with_both = base.with_compile_suffix("v2").with_effect_suffix("mock");
        assert_eq!(with_both.mangled(), "f_v2_mock");
    }

    #[test]
    fn function_lookup_is_keyed_by_full_triple() {
        let mut reg = Registry::new();
        let base = SymbolKey::base("g");
        let variant = SymbolKey::base("g").with_effect_suffix("mock");
        reg.define_function(
            base.clone(),
            Entity::Function {
                params: vec![],
                result: Type::Void,
                is_extern: false,
            },
        );
        assert!(reg.has_function(&base));
        assert!(!reg.has_function(&variant));
    }
}
