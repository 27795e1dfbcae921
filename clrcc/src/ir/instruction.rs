//! The closed instruction set from §3: every variant the translator,
//! interceptors and record synthesizer are allowed to emit. Kept as a
//! tagged enum matched exhaustively (no virtual dispatch), per the
//! design note in §9 preferring a tagged-variant match with a stack-arity
//! helper table over a trait-object instruction hierarchy.

use std::fmt::{Debug, Formatter};

/// Optional per-instruction source location, carried only in debug builds
/// (§3: "each instruction optionally carries a source-location record").
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub bytecode_offset: u64,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum BinaryOp {
    Add, Sub, Mul, Div, DivUnsigned, Rem, RemUnsigned,
    And, Or, Xor, Shl, Shr, ShrUnsigned,
    Equal, NotEqual, GreaterThan, GreaterThanOrEqual, LessThan, LessThanOrEqual,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum UnaryOp {
    Negate,
    BitwiseComplement,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum BranchCondition {
    True,
    False,
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThanUnsigned,
    GreaterThanOrEqualUnsigned,
    LessThanUnsigned,
    LessThanOrEqualUnsigned,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum CastKind {
    Checked,
    Safe,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum UnboxKind {
    AddressOf,
    CopyValue,
}

/// An expression operand: either a temporary, a literal, or a named local/
/// argument. Kept as plain pre-rendered strings (the mangler/translator's
/// job, not the IR's) so the IR stays emitter-agnostic.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Temp(String),
    Local(String),
    Argument(String),
    IntLiteral(i64),
    FloatLiteral(f64),
    StringLiteral(String),
    Null,
    Raw(String),
}

/// The closed, 30-variant instruction set named in §3.
#[derive(Clone, PartialEq)]
pub enum Instruction {
    Assign { target: String, value: Operand },
    DeclareLocal { name: String, type_decl: String },
    Return { value: Option<Operand> },
    Call { target: Option<String>, function: String, arguments: Vec<Operand> },
    NewObject { target: String, type_decl: String, constructor: String, arguments: Vec<Operand> },
    BinaryOp { target: String, op: BinaryOp, lhs: Operand, rhs: Operand },
    UnaryOp { target: String, op: UnaryOp, operand: Operand },
    Branch { label: String },
    ConditionalBranch { condition: BranchCondition, lhs: Operand, rhs: Option<Operand>, label: String },
    Label { name: String },
    Switch { value: Operand, labels: Vec<String>, default: String },
    FieldLoad { target: String, receiver: Operand, field: String },
    FieldStore { receiver: Operand, field: String, value: Operand },
    StaticFieldLoad { target: String, type_decl: String, field: String },
    StaticFieldStore { type_decl: String, field: String, value: Operand },
    ArrayLoad { target: String, array: Operand, index: Operand, element_type: String },
    ArrayStore { array: Operand, index: Operand, value: Operand, element_type: String },
    Cast { target: String, value: Operand, type_decl: String, kind: CastKind },
    Conversion { target: String, value: Operand, type_decl: String },
    NullCheck { value: Operand },
    InitValueType { target: Operand, type_decl: String },
    Box { target: String, value: Operand, type_decl: String },
    Unbox { target: String, value: Operand, type_decl: String, kind: UnboxKind },
    ClassConstructorGuard { type_decl: String },
    TryBegin { label: String },
    CatchBegin { label: String, exception_type: String },
    FinallyBegin { label: String },
    TryEnd { label: String },
    Throw { value: Option<Operand> },
    Rethrow,
    RawCpp { text: String },
    LoadFunctionPointer { target: String, function: String },
    DelegateCreate { target: String, delegate_type: String, target_object: Operand, function: String },
    DelegateInvoke { target: Option<String>, delegate: Operand, arguments: Vec<Operand> },
}

impl Debug for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Instruction::Assign { target, value } => write!(f, "{target} = {value:?}"),
            Instruction::DeclareLocal { name, type_decl } => write!(f, "{type_decl} {name};"),
            Instruction::Return { value } => write!(f, "return {value:?};"),
            Instruction::Call { target, function, arguments } => match target {
                Some(t) => write!(f, "{t} = {function}({arguments:?})"),
                None => write!(f, "{function}({arguments:?})"),
            },
            Instruction::NewObject { target, type_decl, constructor, arguments } => {
                write!(f, "{target} = new {type_decl}; {constructor}({target}, {arguments:?})")
            }
            Instruction::BinaryOp { target, op, lhs, rhs } => write!(f, "{target} = {lhs:?} {op:?} {rhs:?}"),
            Instruction::UnaryOp { target, op, operand } => write!(f, "{target} = {op:?} {operand:?}"),
            Instruction::Branch { label } => write!(f, "goto {label};"),
            Instruction::ConditionalBranch { condition, lhs, rhs, label } => {
                write!(f, "if ({lhs:?} {condition:?} {rhs:?}) goto {label};")
            }
            Instruction::Label { name } => write!(f, "{name}:"),
            Instruction::Switch { value, labels, default } => write!(f, "switch ({value:?}) {{ {labels:?}, default: {default} }}"),
            Instruction::FieldLoad { target, receiver, field } => write!(f, "{target} = {receiver:?}->{field}"),
            Instruction::FieldStore { receiver, field, value } => write!(f, "{receiver:?}->{field} = {value:?}"),
            Instruction::StaticFieldLoad { target, type_decl, field } => write!(f, "{target} = {type_decl}::{field}"),
            Instruction::StaticFieldStore { type_decl, field, value } => write!(f, "{type_decl}::{field} = {value:?}"),
            Instruction::ArrayLoad { target, array, index, .. } => write!(f, "{target} = {array:?}[{index:?}]"),
            Instruction::ArrayStore { array, index, value, .. } => write!(f, "{array:?}[{index:?}] = {value:?}"),
            Instruction::Cast { target, value, type_decl, kind } => write!(f, "{target} = ({type_decl}){value:?} /* {kind:?} */"),
            Instruction::Conversion { target, value, type_decl } => write!(f, "{target} = static_cast<{type_decl}>({value:?})"),
            Instruction::NullCheck { value } => write!(f, "null_check({value:?});"),
            Instruction::InitValueType { target, type_decl } => write!(f, "init({target:?} /* {type_decl} */);"),
            Instruction::Box { target, value, type_decl } => write!(f, "{target} = box<{type_decl}>({value:?})"),
            Instruction::Unbox { target, value, type_decl, kind } => write!(f, "{target} = unbox<{type_decl}>({value:?}) /* {kind:?} */"),
            Instruction::ClassConstructorGuard { type_decl } => write!(f, "ensure_class_constructor<{type_decl}>();"),
            Instruction::TryBegin { label } => write!(f, "try {{ // {label}"),
            Instruction::CatchBegin { label, exception_type } => write!(f, "}} catch ({exception_type}&) {{ // {label}"),
            Instruction::FinallyBegin { label } => write!(f, "}} finally {{ // {label}"),
            Instruction::TryEnd { label } => write!(f, "}} // {label}"),
            Instruction::Throw { value } => write!(f, "throw {value:?};"),
            Instruction::Rethrow => write!(f, "rethrow;"),
            Instruction::RawCpp { text } => f.write_str(text),
            Instruction::LoadFunctionPointer { target, function } => write!(f, "{target} = &{function}"),
            Instruction::DelegateCreate { target, delegate_type, target_object, function } => {
                write!(f, "{target} = delegate_create<{delegate_type}>({target_object:?}, {function})")
            }
            Instruction::DelegateInvoke { target, delegate, arguments } => match target {
                Some(t) => write!(f, "{t} = delegate_invoke({delegate:?}, {arguments:?})"),
                None => write!(f, "delegate_invoke({delegate:?}, {arguments:?})"),
            },
        }
    }
}

impl Instruction {
    /// Whether this instruction produces a named temporary (invariant 5).
    pub fn produced_temp(&self) -> Option<&str> {
        match self {
            Instruction::Assign { target, .. }
            | Instruction::Call { target: Some(target), .. }
            | Instruction::NewObject { target, .. }
            | Instruction::BinaryOp { target, .. }
            | Instruction::UnaryOp { target, .. }
            | Instruction::FieldLoad { target, .. }
            | Instruction::StaticFieldLoad { target, .. }
            | Instruction::ArrayLoad { target, .. }
            | Instruction::Cast { target, .. }
            | Instruction::Conversion { target, .. }
            | Instruction::Box { target, .. }
            | Instruction::Unbox { target, .. }
            | Instruction::LoadFunctionPointer { target, .. }
            | Instruction::DelegateCreate { target, .. }
            | Instruction::DelegateInvoke { target: Some(target), .. } => Some(target),
            _ => None,
        }
    }

    /// Whether this instruction clears the simulated evaluation stack
    /// (invariant 6: empty at method entry, exception-region boundaries,
    /// and after leave/return/throw).
    pub fn clears_stack(&self) -> bool {
        matches!(
            self,
            Instruction::Return { .. }
                | Instruction::Throw { .. }
                | Instruction::Rethrow
                | Instruction::TryBegin { .. }
                | Instruction::CatchBegin { .. }
                | Instruction::FinallyBegin { .. }
                | Instruction::TryEnd { .. }
        )
    }
}

/// A record carrying a [`Instruction`] plus its optional source location.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedInstruction {
    pub instruction: Instruction,
    pub location: Option<SourceLocation>,
}

/// A method body is a single ordered basic block; control flow is encoded
/// via branch/conditional-branch rather than block edges (§4.3).
#[derive(Debug, Clone, Default)]
pub struct BasicBlock<'ir> {
    pub instructions: Vec<AnnotatedInstruction>,
    _marker: std::marker::PhantomData<&'ir ()>,
}

impl<'ir> BasicBlock<'ir> {
    pub fn new() -> Self {
        Self { instructions: Vec::new(), _marker: std::marker::PhantomData }
    }

    pub fn push(&mut self, instruction: Instruction, location: Option<SourceLocation>) {
        self.instructions.push(AnnotatedInstruction { instruction, location });
    }

    /// Checks invariant 6 at method entry/exit points: the stack-depth
    /// tracking itself lives in the translator (it is transient, per-opcode
    /// state); this only verifies no stack-clearing instruction is
    /// immediately followed by a dangling value consumer, used by tests.
    pub fn ends_with_stack_clear(&self) -> bool {
        matches!(self.instructions.last(), Some(i) if i.instruction.clears_stack())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_temps_are_monotonic() {
        let target_for = |n: u32| format!("__t{n}");
        assert_ne!(target_for(0), target_for(1));
    }

    #[test]
    fn return_and_throw_clear_the_stack() {
        assert!(Instruction::Return { value: None }.clears_stack());
        assert!(Instruction::Throw { value: None }.clears_stack());
        assert!(!Instruction::Assign { target: "__t0".into(), value: Operand::Null }.clears_stack());
    }
}
