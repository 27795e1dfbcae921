//! The IR module: owns the arena every `Type`/`Field`/`Method` is allocated
//! from, plus the type cache the driver consults by managed full name and
//! by mangled name (invariant 1: both must be unique).

use std::cell::RefCell;

use bumpalo::Bump;
use fxhash::FxHashMap;

use crate::ir::{Field, Method, Type};

pub struct Module {
    bump: Bump,
    by_full_name: RefCell<FxHashMap<String, *const Type<'static>>>,
    by_mangled_name: RefCell<FxHashMap<String, *const Type<'static>>>,
    order: RefCell<Vec<*const Type<'static>>>,
}

impl Default for Module {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: every `*const Type<'static>` stored here actually points at data
// owned by `self.bump` and borrowed for exactly `self`'s lifetime; the
// `'static` is a self-referential-arena lie that never escapes this type's
// own API, which only ever hands back `&'ir Type<'ir>` tied to `&self`.
impl Module {
    pub fn new() -> Self {
        Self {
            bump: Bump::new(),
            by_full_name: RefCell::new(FxHashMap::default()),
            by_mangled_name: RefCell::new(FxHashMap::default()),
            order: RefCell::new(Vec::new()),
        }
    }

    pub fn alloc_type<'ir>(&'ir self, ty: Type<'ir>) -> &'ir Type<'ir> {
        self.bump.alloc(ty)
    }

    pub fn alloc_field<'ir>(&'ir self, field: Field<'ir>) -> &'ir Field<'ir> {
        self.bump.alloc(field)
    }

    pub fn alloc_method<'ir>(&'ir self, method: Method<'ir>) -> &'ir Method<'ir> {
        self.bump.alloc(method)
    }

    pub fn alloc_str<'ir>(&'ir self, s: &str) -> &'ir str {
        self.bump.alloc_str(s)
    }

    /// Registers a freshly-created type shell under both of its names.
    /// Returns `Err` if either name is already taken, per invariant 1.
    pub fn register_type<'ir>(&'ir self, ty: &'ir Type<'ir>) -> Result<(), String> {
        let mut by_full = self.by_full_name.borrow_mut();
        let mut by_mangled = self.by_mangled_name.borrow_mut();
        if by_full.contains_key(&ty.managed_full_name) {
            return Err(format!("duplicate managed full name: {}", ty.managed_full_name));
        }
        if by_mangled.contains_key(&ty.mangled_name) {
            return Err(format!("duplicate mangled name: {}", ty.mangled_name));
        }
        let erased = ty as *const Type<'ir> as *const Type<'static>;
        by_full.insert(ty.managed_full_name.clone(), erased);
        by_mangled.insert(ty.mangled_name.clone(), erased);
        self.order.borrow_mut().push(erased);
        Ok(())
    }

    pub fn get_by_full_name<'ir>(&'ir self, name: &str) -> Option<&'ir Type<'ir>> {
        let by_full = self.by_full_name.borrow();
        // SAFETY: see the impl-level comment; the pointer was produced from
        // a `&'ir Type<'ir>` borrowed from `self` and outlives this call.
        by_full.get(name).map(|ptr| unsafe { &*(*ptr as *const Type<'ir>) })
    }

    pub fn get_by_mangled_name<'ir>(&'ir self, name: &str) -> Option<&'ir Type<'ir>> {
        let by_mangled = self.by_mangled_name.borrow();
        by_mangled.get(name).map(|ptr| unsafe { &*(*ptr as *const Type<'ir>) })
    }

    pub fn types<'ir>(&'ir self) -> Vec<&'ir Type<'ir>> {
        self.order.borrow().iter().map(|ptr| unsafe { &*(*ptr as *const Type<'ir>) }).collect()
    }

    pub fn len(&self) -> usize {
        self.order.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_full_name_is_rejected() {
        let module = Module::new();
        let a = module.alloc_type(Type::new_shell("App.Foo".into(), "App_Foo".into(), "Foo", "App"));
        module.register_type(a).unwrap();

        let b = module.alloc_type(Type::new_shell("App.Foo".into(), "App_Foo2".into(), "Foo", "App"));
        assert!(module.register_type(b).is_err());
    }

    #[test]
    fn duplicate_mangled_name_is_rejected() {
        let module = Module::new();
        let a = module.alloc_type(Type::new_shell("App.Foo".into(), "App_Foo".into(), "Foo", "App"));
        module.register_type(a).unwrap();

        let b = module.alloc_type(Type::new_shell("App.Bar".into(), "App_Foo".into(), "Bar", "App"));
        assert!(module.register_type(b).is_err());
    }

    #[test]
    fn lookup_by_either_name_returns_same_type() {
        let module = Module::new();
        let a = module.alloc_type(Type::new_shell("App.Foo".into(), "App_Foo".into(), "Foo", "App"));
        module.register_type(a).unwrap();

        let by_full = module.get_by_full_name("App.Foo").unwrap();
        let by_mangled = module.get_by_mangled_name("App_Foo").unwrap();
        assert_eq!(by_full as *const _, by_mangled as *const _);
    }
}
