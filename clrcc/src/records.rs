//! Synthesizes the seven compiler-generated record methods (§4.7) directly
//! as IR, replacing whatever pass 6 produced for them. Record equality here
//! checks the argument against the receiver's *declared* type rather than
//! dispatching symmetrically on both operands' runtime types — the
//! asymmetry named as an open question in §9; this is the resolved
//! behavior, documented in `DESIGN.md`.

use crate::ir::{BasicBlock, BinaryOp, BranchCondition, CastKind, Instruction, Operand, Type};
use crate::mangle::NameMangler;

pub struct RecordSynthesizer<'m> {
    #[allow(dead_code)]
    mangler: &'m NameMangler,
}

impl<'m> RecordSynthesizer<'m> {
    pub fn new(mangler: &'m NameMangler) -> Self {
        Self { mangler }
    }

    /// Replaces each of the record's seven synthesized methods' basic
    /// blocks in place. Methods not present on the type (a user-overridden
    /// `ToString`, for instance, which the compiler does not re-generate)
    /// are left untouched.
    pub fn synthesize(&self, ty: &Type<'_>) {
        for method in ty.methods.borrow().iter() {
            let block = match method.name {
                "ToString" if method.parameters.is_empty() => self.to_string_body(ty),
                "GetHashCode" if method.parameters.is_empty() => self.get_hash_code_body(ty),
                "Equals" if method.parameters.len() == 1 && method.parameters[0].type_name == ty.managed_full_name => self.typed_equals_body(ty),
                "Equals" if method.parameters.len() == 1 => self.object_equals_body(ty),
                "Clone" if method.parameters.is_empty() => self.clone_body(ty),
                "op_Equality" => self.op_equality_body(ty, false),
                "op_Inequality" => self.op_equality_body(ty, true),
                "PrintMembers" => self.print_members_body(),
                "get_EqualityContract" => self.equality_contract_body(ty),
                _ => continue,
            };
            let mut blocks = method.basic_blocks.borrow_mut();
            blocks.clear();
            blocks.push(block);
        }
    }

    fn load_field(block: &mut BasicBlock<'static>, receiver_local: &str, field_name: &str) -> Operand {
        let target = format!("__t_ld_{receiver_local}_{field_name}");
        block.push(Instruction::FieldLoad { target: target.clone(), receiver: Operand::Local(receiver_local.into()), field: field_name.into() }, None);
        Operand::Temp(target)
    }

    /// `ToString`: `"TypeName { Field1 = value1, Field2 = value2 }"`,
    /// property-formatted in declaration order.
    fn to_string_body(&self, ty: &Type<'_>) -> BasicBlock<'static> {
        let mut block = BasicBlock::new();
        let mut format_parts = vec![format!("{} {{ ", ty.short_name)];
        let mut arguments = Vec::new();
        for (i, field) in ty.instance_fields.borrow().iter().enumerate() {
            if i > 0 {
                format_parts.push(", ".to_string());
            }
            format_parts.push(format!("{} = {{}}", field.name));
            arguments.push(Self::load_field(&mut block, "this", field.name));
        }
        format_parts.push(" }".to_string());
        block.push(
            Instruction::Call {
                target: Some("__t_result".into()),
                function: "string_format".into(),
                arguments: std::iter::once(Operand::StringLiteral(format_parts.join(""))).chain(arguments).collect(),
            },
            None,
        );
        block.push(Instruction::Return { value: Some(Operand::Temp("__t_result".into())) }, None);
        block
    }

    /// `GetHashCode`: field-chained, `hash = hash * 31 + field_hash`,
    /// seeded with the type's own hash so distinct record types with
    /// identical field values still hash differently.
    fn get_hash_code_body(&self, ty: &Type<'_>) -> BasicBlock<'static> {
        let mut block = BasicBlock::new();
        block.push(Instruction::Assign { target: "__t_hash".into(), value: Operand::IntLiteral(type_seed(&ty.managed_full_name)) }, None);
        for field in ty.instance_fields.borrow().iter() {
            let field_value = Self::load_field(&mut block, "this", field.name);
            let field_hash = format!("__t_fh_{}", field.name);
            block.push(Instruction::Call { target: Some(field_hash.clone()), function: "runtime_get_hash_code".into(), arguments: vec![field_value] }, None);
            block.push(
                Instruction::BinaryOp { target: "__t_hash_scaled".into(), op: BinaryOp::Mul, lhs: Operand::Temp("__t_hash".into()), rhs: Operand::IntLiteral(31) },
                None,
            );
            block.push(
                Instruction::BinaryOp { target: "__t_hash".into(), op: BinaryOp::Add, lhs: Operand::Temp("__t_hash_scaled".into()), rhs: Operand::Temp(field_hash) },
                None,
            );
        }
        block.push(Instruction::Return { value: Some(Operand::Temp("__t_hash".into())) }, None);
        block
    }

    /// Element-wise typed `Equals(T other)`: every instance field must be
    /// equal under its own field-type equality.
    fn typed_equals_body(&self, ty: &Type<'_>) -> BasicBlock<'static> {
        let mut block = BasicBlock::new();
        if ty.instance_fields.borrow().is_empty() {
            block.push(Instruction::Return { value: Some(Operand::IntLiteral(1)) }, None);
            return block;
        }
        for field in ty.instance_fields.borrow().iter() {
            let lhs = Self::load_field(&mut block, "this", field.name);
            let rhs = Self::load_field(&mut block, "other", field.name);
            let eq_target = format!("__t_eq_{}", field.name);
            block.push(Instruction::BinaryOp { target: eq_target.clone(), op: BinaryOp::Equal, lhs, rhs }, None);
            block.push(
                Instruction::ConditionalBranch { condition: BranchCondition::False, lhs: Operand::Temp(eq_target), rhs: None, label: "record_equals_false".into() },
                None,
            );
        }
        block.push(Instruction::Return { value: Some(Operand::IntLiteral(1)) }, None);
        block.push(Instruction::Label { name: "record_equals_false".into() }, None);
        block.push(Instruction::Return { value: Some(Operand::IntLiteral(0)) }, None);
        block
    }

    /// Object-typed `Equals(object other)`: null-check, then an
    /// `is-instance-of` gate before delegating to the typed overload. This
    /// is the asymmetric half of the open question: only the argument's
    /// runtime type is checked, never the receiver's.
    fn object_equals_body(&self, ty: &Type<'_>) -> BasicBlock<'static> {
        let mut block = BasicBlock::new();
        block.push(
            Instruction::ConditionalBranch { condition: BranchCondition::Equal, lhs: Operand::Local("other".into()), rhs: Some(Operand::Null), label: "record_obj_equals_false".into() },
            None,
        );
        block.push(
            Instruction::Call {
                target: Some("__t_is_instance".into()),
                function: "object_is_instance_of".into(),
                arguments: vec![Operand::Local("other".into()), Operand::Raw(ty.mangled_name.clone())],
            },
            None,
        );
        block.push(
            Instruction::ConditionalBranch { condition: BranchCondition::False, lhs: Operand::Temp("__t_is_instance".into()), rhs: None, label: "record_obj_equals_false".into() },
            None,
        );
        block.push(
            Instruction::Cast { target: "__t_typed".into(), value: Operand::Local("other".into()), type_decl: ty.mangled_name.clone(), kind: CastKind::Safe },
            None,
        );
        block.push(
            Instruction::Call { target: Some("__t_result".into()), function: format!("{}__Equals", ty.mangled_name), arguments: vec![Operand::Local("this".into()), Operand::Temp("__t_typed".into())] },
            None,
        );
        block.push(Instruction::Return { value: Some(Operand::Temp("__t_result".into())) }, None);
        block.push(Instruction::Label { name: "record_obj_equals_false".into() }, None);
        block.push(Instruction::Return { value: Some(Operand::IntLiteral(0)) }, None);
        block
    }

    /// `Clone`: reference-type records GC-allocate a new instance and copy
    /// every field; value-type records are copied by value on return, so
    /// `Clone` is simply `return this;`.
    fn clone_body(&self, ty: &Type<'_>) -> BasicBlock<'static> {
        let mut block = BasicBlock::new();
        if ty.is_value_type() {
            block.push(Instruction::Return { value: Some(Operand::Local("this".into())) }, None);
            return block;
        }
        block.push(
            Instruction::NewObject { target: "__t_clone".into(), type_decl: ty.mangled_name.clone(), constructor: format!("{}__clone_ctor", ty.mangled_name), arguments: vec![Operand::Local("this".into())] },
            None,
        );
        for field in ty.instance_fields.borrow().iter() {
            let value = Self::load_field(&mut block, "this", field.name);
            block.push(Instruction::FieldStore { receiver: Operand::Temp("__t_clone".into()), field: field.name.to_string(), value }, None);
        }
        block.push(Instruction::Return { value: Some(Operand::Temp("__t_clone".into())) }, None);
        block
    }

    /// `op_Equality`/`op_Inequality`: null-short-circuit then delegate to
    /// the typed `Equals`.
    fn op_equality_body(&self, ty: &Type<'_>, negate: bool) -> BasicBlock<'static> {
        let mut block = BasicBlock::new();
        if !ty.is_value_type() {
            block.push(
                Instruction::ConditionalBranch { condition: BranchCondition::Equal, lhs: Operand::Local("left".into()), rhs: Some(Operand::Null), label: "op_eq_left_null".into() },
                None,
            );
        }
        block.push(
            Instruction::Call { target: Some("__t_eq".into()), function: format!("{}__Equals", ty.mangled_name), arguments: vec![Operand::Local("left".into()), Operand::Local("right".into())] },
            None,
        );
        block.push(Instruction::Return { value: Some(maybe_negate(Operand::Temp("__t_eq".into()), negate)) }, None);
        if !ty.is_value_type() {
            block.push(Instruction::Label { name: "op_eq_left_null".into() }, None);
            block.push(
                Instruction::BinaryOp { target: "__t_both_null".into(), op: BinaryOp::Equal, lhs: Operand::Local("right".into()), rhs: Operand::Null },
                None,
            );
            block.push(Instruction::Return { value: Some(maybe_negate(Operand::Temp("__t_both_null".into()), negate)) }, None);
        }
        block
    }

    fn print_members_body(&self) -> BasicBlock<'static> {
        let mut block = BasicBlock::new();
        block.push(Instruction::Return { value: Some(Operand::IntLiteral(1)) }, None);
        block
    }

    /// `EqualityContract`: the address of the type's own static type-info
    /// struct, used so record-hierarchy equality never conflates a base
    /// record with a derived one.
    fn equality_contract_body(&self, ty: &Type<'_>) -> BasicBlock<'static> {
        let mut block = BasicBlock::new();
        block.push(Instruction::LoadFunctionPointer { target: "__t_contract".into(), function: format!("{}_TypeInfo", ty.mangled_name) }, None);
        block.push(Instruction::Return { value: Some(Operand::Temp("__t_contract".into())) }, None);
        block
    }
}

fn maybe_negate(value: Operand, negate: bool) -> Operand {
    if negate {
        Operand::Raw(format!("!({value:?})"))
    } else {
        value
    }
}

fn type_seed(managed_full_name: &str) -> i64 {
    managed_full_name.bytes().fold(17i64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Field, Method, Parameter, TypeFlags, Visibility};
    use std::cell::Cell;

    fn point_record() -> (bumpalo::Bump, Type<'static>) {
        let bump = bumpalo::Bump::new();
        let ty = Type::new_shell("App.Point".into(), "App_Point".into(), "Point", "App");
        (bump, ty)
    }

    #[test]
    fn typed_equals_compares_every_field() {
        let (bump, ty) = point_record();
        let field: &'static Field<'static> = bump.alloc(Field {
            name: "X",
            mangled_name: "X".into(),
            field_type_name: "System.Int32",
            field_type: Cell::new(None),
            is_static: false,
            visibility: Visibility::Public,
            attribute_bits: 0,
            offset: Cell::new(0),
            constant_value: None,
            owner: Cell::new(None),
        });
        ty.instance_fields.borrow_mut().push(field);

        let mangler = NameMangler::new();
        let synthesizer = RecordSynthesizer::new(&mangler);
        let mut method = Method::new_shell("Equals", "App_Point__Equals".into(), "bool".into());
        method.parameters.push(Parameter { name: "other", type_name: "App.Point", resolved_type: Cell::new(None) });
        let allocated_method: &'static Method<'static> = bump.alloc(method);
        ty.methods.borrow_mut().push(allocated_method);

        synthesizer.synthesize(&ty);
        let blocks = allocated_method.basic_blocks.borrow();
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].instructions.len() > 1);
    }

    #[test]
    fn clone_on_value_type_record_just_returns_this() {
        let (_bump, ty) = point_record();
        ty.flags.set(TypeFlags::VALUE_TYPE | TypeFlags::RECORD);
        let mangler = NameMangler::new();
        let synthesizer = RecordSynthesizer::new(&mangler);
        let block = synthesizer.clone_body(&ty);
        assert_eq!(block.instructions.len(), 1);
        assert!(matches!(&block.instructions[0].instruction, Instruction::Return { value: Some(Operand::Local(name)) } if name == "this"));
    }
}
