//! `CppEmitter` is explicitly unspecified beyond the constraints it places
//! on IR shape (§2: "not specified here except where its contract
//! constrains IR shape"). This module is the minimal consumer that walks a
//! finished [`Module`] and prints the declared-output artifact shape from
//! §6: one translation unit per type plus a driver file defining the entry
//! point — enough to exercise the IR end-to-end without claiming to be a
//! complete code generator.

use std::fmt::Write as _;

use crate::ir::{Instruction, Method, Module, Type};

pub struct TranslationUnit {
    pub file_name: String,
    pub source: String,
}

/// Walks the module in registration order and renders one header-less
/// translation unit per type: a struct declaration, its instance fields at
/// their computed offsets (as a comment; the real struct layout is the
/// compiler's own, this only documents the IR's view of it), and each
/// method's body rendered via `Instruction`'s `Debug` (pseudo-C++ text).
pub struct CppEmitter<'ir> {
    module: &'ir Module,
}

impl<'ir> CppEmitter<'ir> {
    pub fn new(module: &'ir Module) -> Self {
        Self { module }
    }

    pub fn emit(&self, entry_point: Option<&str>) -> Vec<TranslationUnit> {
        let mut units: Vec<TranslationUnit> = self.module.types().iter().map(|ty| self.emit_type(ty)).collect();
        if let Some(entry) = entry_point {
            units.push(self.emit_driver(entry));
        }
        units
    }

    fn emit_type(&self, ty: &Type<'_>) -> TranslationUnit {
        let mut source = String::new();
        let _ = writeln!(source, "// {}", ty.managed_full_name);
        let _ = writeln!(source, "struct {} {{", ty.mangled_name);
        for field in ty.instance_fields.borrow().iter() {
            let _ = writeln!(source, "    /* offset {} */ {} {};", field.offset.get(), field.field_type_name, field.mangled_name);
        }
        let _ = writeln!(source, "}};");
        let _ = writeln!(source);

        for method in ty.methods.borrow().iter() {
            self.emit_method(&mut source, method);
        }

        TranslationUnit { file_name: format!("{}.cpp", ty.mangled_name), source }
    }

    fn emit_method(&self, source: &mut String, method: &Method<'_>) {
        let _ = writeln!(source, "{} {}() {{", method.return_type_decl, method.mangled_name);
        for block in method.basic_blocks.borrow().iter() {
            for annotated in &block.instructions {
                self.emit_instruction(source, &annotated.instruction);
            }
        }
        let _ = writeln!(source, "}}");
        let _ = writeln!(source);
    }

    fn emit_instruction(&self, source: &mut String, instruction: &Instruction) {
        match instruction {
            Instruction::Label { name } => {
                let _ = writeln!(source, "{name}:");
            }
            other => {
                let _ = writeln!(source, "    {other:?};");
            }
        }
    }

    fn emit_driver(&self, entry_point: &str) -> TranslationUnit {
        let source = format!("int main(int argc, char** argv) {{\n    return {entry_point}();\n}}\n");
        TranslationUnit { file_name: "main.cpp".into(), source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Method, Type};

    #[test]
    fn emits_one_translation_unit_per_type_plus_a_driver() {
        let module = Module::new();
        let ty = module.alloc_type(Type::new_shell("App.Program".into(), "App_Program".into(), "Program", "App"));
        module.register_type(ty).unwrap();
        let method = module.alloc_method(Method::new_shell("Main", "App_Program__Main".into(), "int32_t".into()));
        ty.methods.borrow_mut().push(method);
        method.basic_blocks.borrow_mut().push(crate::ir::BasicBlock::new());

        let emitter = CppEmitter::new(&module);
        let units = emitter.emit(Some("App_Program__Main"));
        assert_eq!(units.len(), 2);
        assert!(units.iter().any(|u| u.file_name == "main.cpp"));
        assert!(units.iter().any(|u| u.file_name == "App_Program.cpp"));
    }

    #[test]
    fn no_driver_unit_when_there_is_no_entry_point() {
        let module = Module::new();
        let ty = module.alloc_type(Type::new_shell("App.Lib".into(), "App_Lib".into(), "Lib", "App"));
        module.register_type(ty).unwrap();

        let emitter = CppEmitter::new(&module);
        let units = emitter.emit(None);
        assert_eq!(units.len(), 1);
    }
}
