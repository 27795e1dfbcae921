//! The driver (§4.6): runs the fixed, non-reorderable pass sequence over a
//! set of declared types/methods/fields pulled from metadata, producing a
//! finished [`crate::ir::Module`]. Each pass is a method on [`IRBuilder`]
//! named after its number so the sequence in [`IRBuilder::build`] reads as
//! a table of contents.
//!
//! The "partial class spread across many files" source pattern (§9) is
//! represented here as the single `IRBuilder` type with one method per
//! pass — the file split was presentation-level in the source, so it is
//! not reproduced.

use std::cell::Cell;

use crate::config::BuildOptions;
use crate::error::{CoreError, Diagnostics, Site};
use crate::generics::{ActiveParameterMap, GenericEngine, InstantiationRef, SpecializationOrigin};
use crate::icall::IcallRegistry;
use crate::intercept::InterceptorChain;
use crate::ir::{BasicBlock, Field, Method, MethodFlags, Module, Type, TypeFlags, Visibility};
use crate::mangle::NameMangler;
use crate::raw::indices::metadata_token::{MetadataToken, MetadataTokenKind};
use crate::records::RecordSynthesizer;
use crate::translate::{BytecodeTranslator, ExceptionRegion, ResolvedField, ResolvedMethod, TokenResolver};

/// Where a type/method/field came from: the root assembly under
/// compilation, a referenced third-party assembly, or the base class
/// library. Carried on every `DeclaredType` for the metadata layer's own
/// bookkeeping (multi-assembly mode resolves references against it); the
/// core passes themselves treat every declared type uniformly regardless
/// of origin.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Origin {
    User,
    ThirdParty,
    BaseLibrary,
}

/// One declared type as read from metadata, the unit pass 1 consumes.
/// Generic parameters with no bound argument list are open and are skipped
/// by pass 1 per §4.6 ("skip open generics"); they still participate in
/// pass 0's scan as the source of concrete instantiation references found
/// elsewhere.
#[derive(Debug, Clone)]
pub struct DeclaredType {
    pub full_name: String,
    pub short_name: String,
    pub namespace: String,
    pub origin: Origin,
    pub is_value_type: bool,
    pub is_interface: bool,
    pub is_abstract: bool,
    pub is_sealed: bool,
    pub is_enum: bool,
    pub is_delegate: bool,
    pub is_record: bool,
    pub is_runtime_provided: bool,
    pub is_open_generic: bool,
    pub generic_argument_names: Vec<String>,
    pub base_type_full_name: Option<String>,
    pub interface_full_names: Vec<String>,
    pub fields: Vec<DeclaredField>,
    pub methods: Vec<DeclaredMethod>,
}

#[derive(Debug, Clone)]
pub struct DeclaredField {
    pub name: String,
    pub type_full_name: String,
    pub is_static: bool,
    pub visibility: Visibility,
    pub size: u32,
}

#[derive(Debug, Clone)]
pub struct DeclaredMethod {
    pub name: String,
    pub return_type_full_name: String,
    pub parameters: Vec<(String, String)>,
    pub is_static: bool,
    pub is_virtual: bool,
    pub is_abstract: bool,
    pub is_constructor: bool,
    pub is_class_constructor: bool,
    pub is_finalizer: bool,
    pub is_entry_point_candidate: bool,
    pub is_internal_call: bool,
    pub is_open_generic: bool,
    pub body: Option<MethodBody>,
}

#[derive(Debug, Clone, Default)]
pub struct MethodBody {
    pub bytecode: Vec<u8>,
    pub exception_regions: Vec<ExceptionRegion>,
}

/// Result of a finished build: the populated module plus the entry-point
/// mangled name, if one was found (only searched for in the root assembly
/// of a multi-assembly build).
pub struct BuildResult<'ir> {
    pub module: &'ir Module,
    pub entry_point: Option<String>,
}

pub struct IRBuilder<'input> {
    options: BuildOptions,
    mangler: NameMangler,
    generics: GenericEngine,
    icalls: IcallRegistry,
    interceptors: InterceptorChain,
    diagnostics: Diagnostics,
    declared_types: &'input [DeclaredType],
    is_root_assembly: bool,
}

impl<'input> IRBuilder<'input> {
    pub fn new(options: BuildOptions, icalls: IcallRegistry, declared_types: &'input [DeclaredType], is_root_assembly: bool) -> Self {
        let mut mangler = NameMangler::new();
        mangler.reset();
        Self {
            options,
            mangler,
            generics: GenericEngine::new(),
            icalls,
            interceptors: InterceptorChain::new(),
            diagnostics: Diagnostics::default(),
            declared_types,
            is_root_assembly,
        }
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Runs the full pass sequence and returns the finished module. The
    /// module is allocated by the caller (it must outlive the `'ir`
    /// references the build produces) and passed in empty.
    pub fn build<'ir>(&mut self, module: &'ir Module) -> BuildResult<'ir> {
        self.pass0_scan_generics();

        let mut type_map = self.pass1_create_type_shells(module);
        self.pass1_5_create_specializations(module, &mut type_map);
        self.pass2_populate_fields(module, &type_map);
        self.pass2_5_flag_class_constructors(&type_map);
        let entry_point = self.pass3_create_method_shells(module, &type_map);
        self.pass3_5_specialize_methods(module, &type_map);
        self.pass4_build_vtables(&type_map);
        self.pass5_build_interface_maps(&type_map);
        self.pass5_5_attach_custom_attributes(&type_map);
        let resolver = self.build_token_resolver(&type_map);
        self.pass6_convert_bodies(&type_map, &resolver);
        self.pass7_synthesize_records(&type_map);

        BuildResult { module, entry_point }
    }

    /// Pass 0: scan every declared type's fields, method signatures, and
    /// interface list for concrete generic-instance references.
    fn pass0_scan_generics(&mut self) {
        for declared in self.declared_types {
            for interface in &declared.interface_full_names {
                self.scan_reference(interface);
            }
            for field in &declared.fields {
                self.scan_reference(&field.type_full_name);
            }
            for method in &declared.methods {
                self.scan_reference(&method.return_type_full_name);
                for (_, type_name) in &method.parameters {
                    self.scan_reference(type_name);
                }
            }
        }
    }

    fn scan_reference(&mut self, full_name: &str) {
        if let Some((open, args)) = split_instantiation(full_name) {
            self.generics.record_instantiation(&open, args, is_unresolved_parameter);
        }
    }

    /// Pass 1: type shells for every non-open declared type, classified by
    /// origin. Open generics are skipped here; their closed forms are
    /// created in pass 1.5 from the scan results.
    fn pass1_create_type_shells<'ir>(&mut self, module: &'ir Module) -> FxTypeMap<'ir> {
        let mut map = FxTypeMap::default();
        for declared in self.declared_types {
            if declared.is_open_generic {
                continue;
            }
            let ty = self.alloc_type_shell(module, declared);
            if module.register_type(ty).is_ok() {
                map.insert(declared.full_name.clone(), ty);
            } else {
                self.diagnostics.report(
                    Site { type_name: declared.full_name.clone(), method_name: None },
                    &CoreError::UnresolvedReference(format!("duplicate type {}", declared.full_name)),
                );
            }
        }
        map
    }

    fn alloc_type_shell<'ir>(&mut self, module: &'ir Module, declared: &DeclaredType) -> &'ir Type<'ir> {
        let mangled = self.mangler.mangle_type_name(&declared.full_name);
        let short_name = module.alloc_str(&declared.short_name);
        let namespace = module.alloc_str(&declared.namespace);
        let mut ty = Type::new_shell(declared.full_name.clone(), mangled, short_name, namespace);
        ty.generic_argument_names = declared.generic_argument_names.clone();

        let mut flags = TypeFlags::empty();
        flags.set(TypeFlags::VALUE_TYPE, declared.is_value_type);
        flags.set(TypeFlags::INTERFACE, declared.is_interface);
        flags.set(TypeFlags::ABSTRACT, declared.is_abstract);
        flags.set(TypeFlags::SEALED, declared.is_sealed);
        flags.set(TypeFlags::ENUM, declared.is_enum);
        flags.set(TypeFlags::DELEGATE, declared.is_delegate);
        flags.set(TypeFlags::RECORD, declared.is_record);
        flags.set(TypeFlags::RUNTIME_PROVIDED, declared.is_runtime_provided);
        ty.flags.set(flags);

        if declared.is_value_type {
            self.mangler.register_value_type(&declared.full_name);
        }
        module.alloc_type(ty)
    }

    /// Pass 1.5: create synthetic types the runtime always needs (index,
    /// range, thread proxies are assumed pre-declared in `declared_types`
    /// by the metadata layer, same as any other BCL type) plus every
    /// generic specialization recorded in pass 0.
    fn pass1_5_create_specializations<'ir>(&mut self, module: &'ir Module, type_map: &mut FxTypeMap<'ir>) {
        let instantiations: Vec<InstantiationRef> = self.generics.instantiations().cloned().collect();
        for instantiation in &instantiations {
            let specialization = self.generics.classify(instantiation);
            let mangled = self.mangler.mangle_generic_instance(&instantiation.open_full_name, &instantiation.argument_full_names);
            if type_map.contains_key(&specialization.key) {
                continue;
            }
            let short_name = module.alloc_str(&mangled);
            let mut ty = Type::new_shell(specialization.key.clone(), mangled, short_name, "");
            ty.generic_argument_names = instantiation.argument_full_names.clone();
            let mut flags = TypeFlags::GENERIC_INSTANCE;
            if matches!(specialization.origin, SpecializationOrigin::SyntheticFixedLayout { .. }) {
                flags |= TypeFlags::RUNTIME_PROVIDED;
            }
            ty.flags.set(flags);
            let allocated = module.alloc_type(ty);
            if module.register_type(allocated).is_ok() {
                type_map.insert(specialization.key.clone(), allocated);
            }
        }
    }

    /// Pass 2: resolve declared field type names against the type map and
    /// append `Field`s in declaration order, ready for pass 2's layout call
    /// once every field has a resolved size. Runs a second sweep over the
    /// monomorphized specializations pass 1.5 created, substituting each
    /// open type's own fields/base/interfaces through its `ActiveParameterMap`
    /// instead of leaving the specialization shell permanently empty.
    fn pass2_populate_fields<'ir>(&mut self, module: &'ir Module, type_map: &FxTypeMap<'ir>) {
        let identity = ActiveParameterMap::default();
        for declared in self.declared_types {
            let Some(ty) = type_map.get(&declared.full_name) else { continue };

            if let Some(base_name) = &declared.base_type_full_name {
                ty.base_type.set(type_map.get(base_name).copied());
            }
            for interface_name in &declared.interface_full_names {
                if let Some(interface) = type_map.get(interface_name) {
                    ty.interfaces.borrow_mut().push(interface);
                }
            }

            self.populate_fields(module, ty, &declared.fields, &identity, type_map);
        }

        for (key, open, argument_full_names) in self.monomorphized_instantiations() {
            let Some(ty) = type_map.get(&key) else { continue };
            let map = ActiveParameterMap::new(&open.generic_argument_names, &argument_full_names);

            if let Some(base_name) = &open.base_type_full_name {
                ty.base_type.set(type_map.get(&map.substitute(base_name)).copied());
            }
            for interface_name in &open.interface_full_names {
                if let Some(interface) = type_map.get(&map.substitute(interface_name)) {
                    ty.interfaces.borrow_mut().push(interface);
                }
            }

            self.populate_fields(module, ty, &open.fields, &map, type_map);
        }
    }

    /// Appends one `Field` per `fields` entry to `ty`, substituting each
    /// declared type name through `map` (the identity map for an ordinary
    /// declared type, a real `ActiveParameterMap` for a specialization)
    /// before resolving it against `type_map`, then lays out the result.
    fn populate_fields<'ir>(&self, module: &'ir Module, ty: &'ir Type<'ir>, fields: &[DeclaredField], map: &ActiveParameterMap, type_map: &FxTypeMap<'ir>) {
        for field in fields {
            let substituted_type = map.substitute(&field.type_full_name);
            let mangled = self.mangler.mangle_field_name(&field.name);
            let name = module.alloc_str(&field.name);
            let type_name = module.alloc_str(&substituted_type);
            let allocated = module.alloc_field(Field {
                name,
                mangled_name: mangled,
                field_type_name: type_name,
                field_type: Cell::new(type_map.get(&substituted_type).copied()),
                is_static: field.is_static,
                visibility: field.visibility,
                attribute_bits: 0,
                offset: Cell::new(0),
                constant_value: None,
                owner: Cell::new(Some(ty)),
            });
            if field.is_static {
                ty.static_fields.borrow_mut().push(allocated);
            } else {
                ty.instance_fields.borrow_mut().push(allocated);
            }
        }

        ty.layout_fields(|field| fields.iter().find(|f| f.name == field.name).map(|f| f.size).unwrap_or(8));
    }

    /// Every recorded instantiation classified `Monomorphized` (synthetic
    /// fixed-layout specializations keep the bare shell pass 1.5 gave them —
    /// their field set is the runtime ABI, not a substitution of the open
    /// type's), paired with its open `DeclaredType` and argument list. The
    /// common input every specialization-aware pass below substitutes
    /// through.
    fn monomorphized_instantiations(&self) -> Vec<(String, &'input DeclaredType, Vec<String>)> {
        self.generics
            .instantiations()
            .cloned()
            .collect::<Vec<_>>()
            .into_iter()
            .filter_map(|instantiation| {
                let key = Type::instantiation_key(&instantiation.open_full_name, &instantiation.argument_full_names);
                let specialization = self.generics.specialization(&key)?;
                if !matches!(specialization.origin, SpecializationOrigin::Monomorphized) {
                    return None;
                }
                let open = self.declared_types.iter().find(|d| d.full_name == instantiation.open_full_name)?;
                Some((specialization.key.clone(), open, instantiation.argument_full_names))
            })
            .collect()
    }

    /// Pass 2.5: a type has a class constructor iff one of its declared
    /// methods is flagged as such — including a specialization, whose
    /// "declared methods" are the open type's.
    fn pass2_5_flag_class_constructors(&mut self, type_map: &FxTypeMap<'_>) {
        for declared in self.declared_types {
            let Some(ty) = type_map.get(&declared.full_name) else { continue };
            if declared.methods.iter().any(|m| m.is_class_constructor) {
                let mut flags = ty.flags.get();
                flags |= TypeFlags::HAS_CLASS_CONSTRUCTOR;
                ty.flags.set(flags);
            }
        }

        for (key, open, _) in self.monomorphized_instantiations() {
            let Some(ty) = type_map.get(&key) else { continue };
            if open.methods.iter().any(|m| m.is_class_constructor) {
                let mut flags = ty.flags.get();
                flags |= TypeFlags::HAS_CLASS_CONSTRUCTOR;
                ty.flags.set(flags);
            }
        }
    }

    /// Pass 3: method shells for every non-open-generic declared method.
    /// The entry point is only searched for in the root assembly.
    fn pass3_create_method_shells<'ir>(&mut self, module: &'ir Module, type_map: &FxTypeMap<'ir>) -> Option<String> {
        let mut entry_point = None;
        for declared in self.declared_types {
            let Some(ty) = type_map.get(&declared.full_name) else { continue };
            for method in &declared.methods {
                if method.is_open_generic {
                    continue;
                }
                let method_mangled = self.mangler.mangle_method_name(&ty.mangled_name, &method.name);
                let return_decl = self.mangler.get_cpp_type_for_declaration(&method.return_type_full_name);
                let name = module.alloc_str(&method.name);
                let allocated = module.alloc_method(Method::new_shell(name, method_mangled.clone(), return_decl));

                let mut flags = MethodFlags::empty();
                flags.set(MethodFlags::STATIC, method.is_static);
                flags.set(MethodFlags::VIRTUAL, method.is_virtual);
                flags.set(MethodFlags::ABSTRACT, method.is_abstract);
                flags.set(MethodFlags::CONSTRUCTOR, method.is_constructor);
                flags.set(MethodFlags::CLASS_CONSTRUCTOR, method.is_class_constructor);
                flags.set(MethodFlags::FINALIZER, method.is_finalizer);
                flags.set(MethodFlags::INTERNAL_CALL, method.is_internal_call);
                allocated.flags.set(flags);
                allocated.owner.set(Some(ty));

                if self.is_root_assembly && method.is_entry_point_candidate && entry_point.is_none() {
                    flags |= MethodFlags::ENTRY_POINT;
                    allocated.flags.set(flags);
                    entry_point = Some(method_mangled);
                }

                ty.methods.borrow_mut().push(allocated);
            }
        }
        entry_point
    }

    /// Pass 3.5: pass 3 only walks `self.declared_types`, so a
    /// specialization's shell (created directly in pass 1.5, not declared
    /// anywhere) still has no methods of its own by this point. For every
    /// monomorphized specialization, build one method shell per open-type
    /// method, substituting the return type through the same
    /// `ActiveParameterMap` pass 2 used for its fields.
    fn pass3_5_specialize_methods<'ir>(&mut self, module: &'ir Module, type_map: &FxTypeMap<'ir>) {
        for (key, open, argument_full_names) in self.monomorphized_instantiations() {
            let Some(ty) = type_map.get(&key) else { continue };
            let map = ActiveParameterMap::new(&open.generic_argument_names, &argument_full_names);

            for method in &open.methods {
                if method.is_open_generic {
                    continue;
                }
                let method_mangled = self.mangler.mangle_method_name(&ty.mangled_name, &method.name);
                let return_decl = self.mangler.get_cpp_type_for_declaration(&map.substitute(&method.return_type_full_name));
                let name = module.alloc_str(&method.name);
                let allocated = module.alloc_method(Method::new_shell(name, method_mangled, return_decl));

                let mut flags = MethodFlags::empty();
                flags.set(MethodFlags::STATIC, method.is_static);
                flags.set(MethodFlags::VIRTUAL, method.is_virtual);
                flags.set(MethodFlags::ABSTRACT, method.is_abstract);
                flags.set(MethodFlags::CONSTRUCTOR, method.is_constructor);
                flags.set(MethodFlags::CLASS_CONSTRUCTOR, method.is_class_constructor);
                flags.set(MethodFlags::FINALIZER, method.is_finalizer);
                flags.set(MethodFlags::INTERNAL_CALL, method.is_internal_call);
                flags |= MethodFlags::GENERIC_INSTANCE;
                allocated.flags.set(flags);
                allocated.owner.set(Some(ty));

                ty.methods.borrow_mut().push(allocated);
            }
        }
    }

    /// Pass 4: vtable construction. A type's vtable is its base's vtable
    /// (by value, so overrides can replace entries) with any declared
    /// virtual method appended as a new slot, or substituted into an
    /// existing slot when its name and parameter types match (invariant 2).
    /// Walks every type in `type_map`, declared or specialized alike —
    /// `build_vtable_for` already recurses onto an unbuilt base first, so
    /// iteration order doesn't matter.
    fn pass4_build_vtables(&mut self, type_map: &FxTypeMap<'_>) {
        for ty in type_map.values() {
            if !ty.vtable.borrow().is_empty() {
                continue;
            }
            self.build_vtable_for(ty, type_map);
        }
    }

    fn build_vtable_for<'ir>(&self, ty: &'ir Type<'ir>, type_map: &FxTypeMap<'ir>) {
        let mut slots: Vec<crate::ir::VtableSlot<'ir>> = Vec::new();
        if let Some(base) = ty.base_type.get() {
            if base.vtable.borrow().is_empty() {
                self.build_vtable_for(base, type_map);
            }
            for slot in base.vtable.borrow().iter() {
                slots.push(crate::ir::VtableSlot { name: slot.name, parameter_types: slot.parameter_types.clone(), method: Cell::new(slot.method.get()) });
            }
        }

        for method in ty.methods.borrow().iter() {
            if !method.flags.get().contains(MethodFlags::VIRTUAL) {
                continue;
            }
            let parameter_types: Vec<&str> = method.parameters.iter().map(|p| p.type_name).collect();
            if let Some(existing) = slots.iter().find(|s| method.matches_signature(s.name, &s.parameter_types)) {
                existing.method.set(Some(method));
                method.vtable_slot.set(slots.iter().position(|s| std::ptr::eq(s, existing)).unwrap() as i32);
            } else {
                method.vtable_slot.set(slots.len() as i32);
                slots.push(crate::ir::VtableSlot { name: method.name, parameter_types, method: Cell::new(Some(method)) });
            }
        }

        *ty.vtable.borrow_mut() = slots;
    }

    /// Pass 5: for each implemented interface, a slot list whose length
    /// always equals the interface's own method count (invariant 4), filled
    /// by matching name and parameter-type sequence against the
    /// implementing type's declared methods. Reads the interface list off
    /// `ty.interfaces` (pass 2 already resolved it, for declared types and
    /// specializations alike) rather than re-deriving it from
    /// `declared_types`, so this covers every type in `type_map` uniformly.
    fn pass5_build_interface_maps(&mut self, type_map: &FxTypeMap<'_>) {
        for ty in type_map.values() {
            for interface in ty.interfaces.borrow().iter() {
                let interface_methods = interface.methods.borrow();
                let slots: Vec<Cell<Option<&Method<'_>>>> = interface_methods
                    .iter()
                    .map(|im| {
                        let parameter_types: Vec<&str> = im.parameters.iter().map(|p| p.type_name).collect();
                        let implementation = ty.methods.borrow().iter().find(|m| m.matches_signature(im.name, &parameter_types)).copied();
                        Cell::new(implementation)
                    })
                    .collect();
                ty.interface_maps.borrow_mut().push(crate::ir::InterfaceImplMap { interface, slots });
            }
        }
    }

    /// Pass 5.5: custom-attribute attachment is metadata-sourced and
    /// outside the core's IR shape (the spec's closed instruction/type
    /// model carries no attribute-record type); this pass is a deliberate
    /// no-op placeholder, left named so the sequence stays visible.
    fn pass5_5_attach_custom_attributes(&mut self, _type_map: &FxTypeMap<'_>) {}

    /// Pass 6: convert every non-abstract method body, now that vtables
    /// exist and virtual dispatch can resolve. Each method runs through
    /// the interceptor chain first (constant per call site, not per
    /// method), falling back to bytecode translation, and finally to the
    /// icall registry when no managed body exists at all.
    fn pass6_convert_bodies<'ir>(&mut self, type_map: &FxTypeMap<'ir>, resolver: &dyn TokenResolver) {
        for declared in self.declared_types {
            let Some(ty) = type_map.get(&declared.full_name) else { continue };
            for (method, declared_method) in ty.methods.borrow().iter().zip(declared.methods.iter().filter(|m| !m.is_open_generic)) {
                if method.flags.get().contains(MethodFlags::ABSTRACT) {
                    continue;
                }
                let Some(body) = &declared_method.body else {
                    self.emit_icall_stub(method, declared, declared_method);
                    continue;
                };
                self.convert_method_body(method, body, resolver);
            }
        }

        for (key, open, _) in self.monomorphized_instantiations() {
            let Some(ty) = type_map.get(&key) else { continue };
            for (method, declared_method) in ty.methods.borrow().iter().zip(open.methods.iter().filter(|m| !m.is_open_generic)) {
                if method.flags.get().contains(MethodFlags::ABSTRACT) {
                    continue;
                }
                let Some(body) = &declared_method.body else {
                    self.emit_icall_stub(method, open, declared_method);
                    continue;
                };
                self.convert_method_body(method, body, resolver);
            }
        }
    }

    fn convert_method_body(&mut self, method: &Method<'_>, body: &MethodBody, resolver: &dyn TokenResolver) {
        let translator = BytecodeTranslator::new(method.name, || method.new_temp())
            .with_context(resolver, &self.interceptors, &self.icalls, self.options.prefer_managed_shortcuts);
        let block = translator.translate(&body.bytecode, &body.exception_regions, &self.diagnostics);
        method.basic_blocks.borrow_mut().push(block);
    }

    /// Builds the token resolver pass 6 translates against, straight out of
    /// the declared method/field tables and the vtable slots pass 4 just
    /// assigned — no `raw::heaps::table` reading needed, since every callee
    /// a single-assembly build can reach is just another `DeclaredMethod` in
    /// `self.declared_types`. Token indices follow declaration order, one
    /// counter per table, the same order a real metadata reader would hand
    /// out `MethodDef`/`Field`/`TypeDef` row numbers in.
    fn build_token_resolver(&self, type_map: &FxTypeMap<'_>) -> DeclaredTokenResolver {
        let mut methods = Vec::new();
        let mut fields = Vec::new();
        let mut types = Vec::new();

        for declared in self.declared_types {
            if declared.is_open_generic {
                continue;
            }
            types.push(declared.full_name.clone());
        }

        for declared in self.declared_types {
            let Some(ty) = type_map.get(&declared.full_name) else { continue };

            for field in &declared.fields {
                fields.push(ResolvedField {
                    declaring_type_mangled_name: ty.mangled_name.clone(),
                    mangled_name: self.mangler.mangle_field_name(&field.name),
                    is_static: field.is_static,
                });
            }

            for (method, declared_method) in ty.methods.borrow().iter().zip(declared.methods.iter().filter(|m| !m.is_open_generic)) {
                methods.push(ResolvedMethod {
                    declaring_type_full_name: declared.full_name.clone(),
                    declaring_type_mangled_name: ty.mangled_name.clone(),
                    method_name: declared_method.name.clone(),
                    mangled_name: method.mangled_name.clone(),
                    parameter_type_full_names: declared_method.parameters.iter().map(|(_, t)| t.clone()).collect(),
                    return_type_full_name: (declared_method.return_type_full_name != "System.Void").then(|| declared_method.return_type_full_name.clone()),
                    is_static: declared_method.is_static,
                    is_virtual: declared_method.is_virtual,
                    is_internal_call: declared_method.is_internal_call,
                    vtable_slot: (method.vtable_slot.get() >= 0).then(|| method.vtable_slot.get()),
                    generic_arguments: Vec::new(),
                });
            }
        }

        DeclaredTokenResolver { methods, fields, types }
    }

    fn emit_icall_stub(&mut self, method: &Method<'_>, declared_type: &DeclaredType, declared_method: &DeclaredMethod) {
        let prefer_managed_shortcuts = self.options.prefer_managed_shortcuts;
        let first_parameter_type = declared_method.parameters.first().map(|(_, t)| t.as_str());
        let hit = self.icalls.lookup(&declared_type.full_name, &method.name, declared_method.parameters.len(), first_parameter_type, !prefer_managed_shortcuts, false);
        let mut block = BasicBlock::new();
        match hit {
            Some(entry) => {
                block.push(
                    crate::ir::Instruction::Call { target: None, function: entry.symbol.clone(), arguments: Vec::new() },
                    None,
                );
            }
            None => {
                self.diagnostics.report(
                    Site { type_name: declared_type.full_name.clone(), method_name: Some(method.name.to_string()) },
                    &CoreError::UnresolvedReference(format!("no internal-call mapping for {}::{}", declared_type.full_name, method.name)),
                );
                block.push(crate::ir::Instruction::RawCpp { text: format!("// unresolved internal call: {}", method.name) }, None);
            }
        }
        method.basic_blocks.borrow_mut().push(block);
    }

    /// Pass 7: record types get their seven synthesized methods' bodies
    /// replacing whatever pass 6 produced for them (records have no real
    /// bytecode for these; the compiler emits them as compiler-generated
    /// stubs that the core must fill in itself).
    fn pass7_synthesize_records(&mut self, type_map: &FxTypeMap<'_>) {
        let synthesizer = RecordSynthesizer::new(&self.mangler);
        for declared in self.declared_types {
            if !declared.is_record {
                continue;
            }
            let Some(ty) = type_map.get(&declared.full_name) else { continue };
            synthesizer.synthesize(ty);
        }
    }
}

/// A [`TokenResolver`] backed by the declared tables themselves, indexed in
/// declaration order (see [`IRBuilder::build_token_resolver`]). `ldstr` is
/// never answered — no declared table carries the user-string heap, and
/// nothing downstream of pass 6 needs it yet.
struct DeclaredTokenResolver {
    methods: Vec<ResolvedMethod>,
    fields: Vec<ResolvedField>,
    types: Vec<String>,
}

impl TokenResolver for DeclaredTokenResolver {
    fn resolve_method(&self, token: MetadataToken) -> Option<ResolvedMethod> {
        if token.kind() != MetadataTokenKind::MethodDef {
            return None;
        }
        self.methods.get(token.index().checked_sub(1)?).cloned()
    }

    fn resolve_field(&self, token: MetadataToken) -> Option<ResolvedField> {
        if token.kind() != MetadataTokenKind::Field {
            return None;
        }
        self.fields.get(token.index().checked_sub(1)?).cloned()
    }

    fn resolve_type(&self, token: MetadataToken) -> Option<String> {
        if token.kind() != MetadataTokenKind::TypeDef {
            return None;
        }
        self.types.get(token.index().checked_sub(1)?).cloned()
    }

    fn resolve_string(&self, _token: MetadataToken) -> Option<String> {
        None
    }
}

type FxTypeMap<'ir> = fxhash::FxHashMap<String, &'ir Type<'ir>>;

fn is_unresolved_parameter(name: &str) -> bool {
    name.len() <= 2 && name.starts_with('T') && name[1..].chars().all(|c| c.is_ascii_digit())
}

fn split_instantiation(full_name: &str) -> Option<(String, Vec<String>)> {
    let start = full_name.find('<')?;
    let end = full_name.rfind('>')?;
    if end <= start {
        return None;
    }
    let open = full_name[..start].to_string();
    let args = full_name[start + 1..end].split(',').map(|s| s.trim().to_string()).collect();
    Some((open, args))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_type(full_name: &str) -> DeclaredType {
        DeclaredType {
            full_name: full_name.into(),
            short_name: full_name.rsplit('.').next().unwrap().into(),
            namespace: "App".into(),
            origin: Origin::User,
            is_value_type: false,
            is_interface: false,
            is_abstract: false,
            is_sealed: false,
            is_enum: false,
            is_delegate: false,
            is_record: false,
            is_runtime_provided: false,
            is_open_generic: false,
            generic_argument_names: Vec::new(),
            base_type_full_name: None,
            interface_full_names: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    #[test]
    fn builds_a_single_type_with_no_fields_or_methods() {
        let types = vec![leaf_type("App.Empty")];
        let options = BuildOptions::default();
        let mut builder = IRBuilder::new(options, IcallRegistry::new(), &types, true);
        let module = Module::new();
        let result = builder.build(&module);
        assert_eq!(result.module.len(), 1);
        assert!(result.entry_point.is_none());
    }

    #[test]
    fn split_instantiation_extracts_open_name_and_arguments() {
        let (open, args) = split_instantiation("List`1<System.Int32>").unwrap();
        assert_eq!(open, "List`1");
        assert_eq!(args, vec!["System.Int32".to_string()]);
    }

    #[test]
    fn non_generic_name_has_no_instantiation() {
        assert!(split_instantiation("System.Int32").is_none());
    }
}
