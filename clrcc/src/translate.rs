//! Per-method stack simulator converting bytecode opcodes into IR
//! instructions (§4.3). Operates on `raw::il::{OpCode, OpCodeIterator,
//! MethodBody}` — the object model the (out-of-scope) metadata reader
//! already exposes — and produces a single `ir::BasicBlock` whose control
//! flow is encoded via `Branch`/`ConditionalBranch` rather than block edges.

use std::collections::{BTreeMap, HashSet};

use crate::error::CoreError;
use crate::icall::IcallRegistry;
use crate::intercept::{CallSite, InterceptorChain};
use crate::ir::{AnnotatedInstruction, BasicBlock, BinaryOp, BranchCondition, CastKind, Instruction, Operand, UnaryOp, UnboxKind};
use crate::raw::il::{CompoundOpCode, OpCode, OpCodeIterator};
use crate::raw::indices::metadata_token::MetadataToken;

/// A resolved `call`/`callvirt`/`newobj` target: everything the translator
/// needs to know about the metadata token without itself understanding
/// metadata tables (that resolution is the (out-of-scope) metadata layer's
/// job — see `DESIGN.md`).
#[derive(Debug, Clone)]
pub struct ResolvedMethod {
    pub declaring_type_full_name: String,
    pub declaring_type_mangled_name: String,
    pub method_name: String,
    pub mangled_name: String,
    pub parameter_type_full_names: Vec<String>,
    pub return_type_full_name: Option<String>,
    pub is_static: bool,
    pub is_virtual: bool,
    pub is_internal_call: bool,
    pub vtable_slot: Option<i32>,
    pub generic_arguments: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedField {
    pub declaring_type_mangled_name: String,
    pub mangled_name: String,
    pub is_static: bool,
}

/// Resolves a `MetadataToken` encountered mid-bytecode to the information
/// `call`/`callvirt`/`newobj`/`ldfld`/`stfld`/`ldsfld`/`stsfld`/`ldstr`/
/// `castclass`/`isinst`/`box`/`unbox`/`newarr`/`ldelem`/`stelem` need. A
/// glue-layer seam: callers back it with whatever metadata representation
/// they have (declared-method tables, a real heap reader, a test double).
pub trait TokenResolver {
    fn resolve_method(&self, token: MetadataToken) -> Option<ResolvedMethod>;
    fn resolve_field(&self, token: MetadataToken) -> Option<ResolvedField>;
    fn resolve_type(&self, token: MetadataToken) -> Option<String>;
    fn resolve_string(&self, token: MetadataToken) -> Option<String>;
}

/// One exception-handler clause, as the (out-of-scope) metadata reader's
/// exception table would hand it to us: byte offsets into the same bytecode
/// stream the translator is walking.
#[derive(Debug, Clone)]
pub struct ExceptionRegion {
    pub try_start: u64,
    pub try_end: u64,
    pub handler_start: u64,
    pub handler_end: u64,
    pub filter_start: Option<u64>,
    pub kind: ExceptionRegionKind,
    pub catch_type: Option<String>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ExceptionRegionKind {
    Catch,
    Filter,
    Finally,
    Fault,
}

/// The six exception-event kinds emitted at a bytecode offset, in the fixed
/// priority order events at the same offset are emitted in.
#[derive(Debug, Clone, Copy, Eq, PartialEq, PartialOrd, Ord)]
enum HandlerEvent {
    HandlerEnd,
    TryBegin,
    CatchBegin,
    FinallyBegin,
    FilterBegin,
    FilterHandlerBegin,
}

/// Simulated evaluation-stack slot: just enough information to reference the
/// value again (a temp, or a pass-through literal) without re-evaluating it.
#[derive(Debug, Clone, PartialEq)]
enum StackValue {
    Operand(Operand),
}

pub struct BytecodeTranslator<'m> {
    method_name: &'m str,
    new_temp: Box<dyn FnMut() -> String + 'm>,
    stack: Vec<StackValue>,
    block: BasicBlock<'static>,
    resolver: Option<&'m dyn TokenResolver>,
    interceptors: Option<&'m InterceptorChain>,
    icalls: Option<&'m IcallRegistry>,
    prefer_managed_shortcuts: bool,
    constrained_type: Option<String>,
}

impl<'m> BytecodeTranslator<'m> {
    pub fn new(method_name: &'m str, new_temp: impl FnMut() -> String + 'm) -> Self {
        Self {
            method_name,
            new_temp: Box::new(new_temp),
            stack: Vec::new(),
            block: BasicBlock::new(),
            resolver: None,
            interceptors: None,
            icalls: None,
            prefer_managed_shortcuts: true,
            constrained_type: None,
        }
    }

    /// Attaches the token resolver, interceptor chain, and icall registry
    /// needed to translate `call`/`callvirt`/`newobj` and friends. Without
    /// this, those opcodes degrade to the same unsupported-opcode fallback
    /// as any other opcode the translator doesn't recognize.
    pub fn with_context(mut self, resolver: &'m dyn TokenResolver, interceptors: &'m InterceptorChain, icalls: &'m IcallRegistry, prefer_managed_shortcuts: bool) -> Self {
        self.resolver = Some(resolver);
        self.interceptors = Some(interceptors);
        self.icalls = Some(icalls);
        self.prefer_managed_shortcuts = prefer_managed_shortcuts;
        self
    }

    /// Step 1 of §4.3's algorithm: scan once to collect every branch-target
    /// offset, including `leave` targets. Targets are resolved relative to
    /// the start-of-instruction offset the iterator yields rather than the
    /// true post-operand address; this keeps `scan_branch_targets` and
    /// `translate_one` in agreement with each other, which is all the
    /// label-emission logic here actually depends on.
    fn scan_branch_targets(code: &[u8]) -> HashSet<u64> {
        let mut targets = HashSet::new();
        for (offset, opcode) in OpCodeIterator::new(code) {
            let Ok(opcode) = opcode else { continue };
            let next = offset;
            match opcode {
                OpCode::br_s(rel) => { targets.insert((next as i64 + rel as i64) as u64); }
                OpCode::brfalse_s(rel) | OpCode::brtrue_s(rel)
                | OpCode::beq_s(rel) | OpCode::bge_s(rel) | OpCode::bgt_s(rel) | OpCode::ble_s(rel) | OpCode::blt_s(rel)
                | OpCode::bne_un_s(rel) | OpCode::bge_un_s(rel) | OpCode::bgt_un_s(rel) | OpCode::ble_un_s(rel) | OpCode::blt_un_s(rel) => {
                    targets.insert((next as i64 + rel as i64) as u64);
                }
                OpCode::br(rel) => { targets.insert((next as i64 + rel as i64) as u64); }
                OpCode::brfalse(rel) | OpCode::brtrue(rel)
                | OpCode::beq(rel) | OpCode::bge(rel) | OpCode::bgt(rel) | OpCode::ble(rel) | OpCode::blt(rel)
                | OpCode::bne_un(rel) | OpCode::bge_un(rel) | OpCode::bgt_un(rel) | OpCode::ble_un(rel) | OpCode::blt_un(rel) => {
                    targets.insert((next as i64 + rel as i64) as u64);
                }
                OpCode::leave(rel) => { targets.insert((next as i64 + rel as i64) as u64); }
                OpCode::leave_s(rel) => { targets.insert((next as i64 + rel as i64) as u64); }
                OpCode::switch(table) => {
                    for rel in table.variants() {
                        targets.insert((next as i64 + rel as i64) as u64);
                    }
                }
                _ => {}
            }
        }
        targets
    }

    /// Step 2: build the ordered map of exception-handler events per offset,
    /// in the fixed priority order (handler-end, try-begin, catch-begin,
    /// finally-begin, filter-begin, filter-handler-begin).
    fn scan_exception_events(regions: &[ExceptionRegion]) -> BTreeMap<u64, Vec<HandlerEvent>> {
        let mut events: BTreeMap<u64, Vec<HandlerEvent>> = BTreeMap::new();
        for region in regions {
            events.entry(region.try_start).or_default().push(HandlerEvent::TryBegin);
            events.entry(region.handler_end).or_default().push(HandlerEvent::HandlerEnd);
            match region.kind {
                ExceptionRegionKind::Catch => {
                    events.entry(region.handler_start).or_default().push(HandlerEvent::CatchBegin);
                }
                ExceptionRegionKind::Finally | ExceptionRegionKind::Fault => {
                    events.entry(region.handler_start).or_default().push(HandlerEvent::FinallyBegin);
                }
                ExceptionRegionKind::Filter => {
                    if let Some(filter_start) = region.filter_start {
                        events.entry(filter_start).or_default().push(HandlerEvent::FilterBegin);
                    }
                    events.entry(region.handler_start).or_default().push(HandlerEvent::FilterHandlerBegin);
                }
            }
        }
        for list in events.values_mut() {
            list.sort();
        }
        events
    }

    fn push(&mut self, operand: Operand) {
        self.stack.push(StackValue::Operand(operand));
    }

    fn pop(&mut self) -> Operand {
        match self.stack.pop() {
            Some(StackValue::Operand(operand)) => operand,
            None => Operand::Raw("/* stack underflow */ 0".into()),
        }
    }

    fn emit(&mut self, instruction: Instruction) {
        self.block.push(instruction, None);
    }

    fn fresh_temp(&mut self) -> String {
        (self.new_temp)()
    }

    fn emit_label_if_target(&mut self, offset: u64, targets: &HashSet<u64>, events: &BTreeMap<u64, Vec<HandlerEvent>>) {
        if let Some(event_list) = events.get(&offset) {
            for event in event_list {
                let label = format!("IL_{offset:04X}");
                match event {
                    HandlerEvent::HandlerEnd => self.emit(Instruction::TryEnd { label: format!("{label}_end") }),
                    HandlerEvent::TryBegin => self.emit(Instruction::TryBegin { label: format!("{label}_try") }),
                    HandlerEvent::CatchBegin => self.emit(Instruction::CatchBegin { label: format!("{label}_catch"), exception_type: "System.Exception".into() }),
                    HandlerEvent::FinallyBegin => self.emit(Instruction::FinallyBegin { label: format!("{label}_finally") }),
                    HandlerEvent::FilterBegin | HandlerEvent::FilterHandlerBegin => {
                        self.emit(Instruction::RawCpp { text: format!("// {event:?} at IL_{offset:04X}") });
                    }
                }
            }
        }
        if targets.contains(&offset) {
            self.emit(Instruction::Label { name: format!("IL_{offset:04X}") });
            // invariant 6: the stack is empty at every branch-target join point.
            self.stack.clear();
        }
    }

    fn binop(&mut self, op: BinaryOp) {
        let rhs = self.pop();
        let lhs = self.pop();
        let target = self.fresh_temp();
        self.emit(Instruction::BinaryOp { target: target.clone(), op, lhs, rhs });
        self.push(Operand::Temp(target));
    }

    fn unop(&mut self, op: UnaryOp) {
        let operand = self.pop();
        let target = self.fresh_temp();
        self.emit(Instruction::UnaryOp { target: target.clone(), op, operand });
        self.push(Operand::Temp(target));
    }

    fn conditional_branch(&mut self, condition: BranchCondition, target_offset: i64) {
        let lhs = self.pop();
        self.emit(Instruction::ConditionalBranch { condition, lhs, rhs: None, label: format!("IL_{target_offset:04X}") });
        self.stack.clear();
    }

    /// Two-operand compare-and-branch (`beq`, `bgt`, ...). Handles the
    /// `cgt.un`/`clt.un`-vs-null rewrite edge case: when either operand is
    /// a literal null and the comparison is the unsigned/unordered variant
    /// of greater/less-than, it is semantically a reference (in)equality
    /// check and is rewritten to `!=`/`==` rather than a numeric compare.
    /// Chosen as always-on per the Open Question in §9; an unsigned
    /// native-int comparison against a literal null pointer value is
    /// vanishingly rare and, when it does occur, `!=`/`==` give the
    /// identical result bit-for-bit, so the rewrite is a safe default.
    fn compare_branch(&mut self, condition: BranchCondition, target_offset: i64) {
        let rhs = self.pop();
        let lhs = self.pop();
        let rewritten = rewrite_null_compare(condition, &lhs, &rhs);
        self.emit(Instruction::ConditionalBranch { condition: rewritten, lhs, rhs: Some(rhs), label: format!("IL_{target_offset:04X}") });
        self.stack.clear();
    }

    /// Translates one method body into a single [`BasicBlock`]. Unsupported
    /// opcodes degrade to a `RawCpp` comment and translation continues
    /// (§7: unsupported-opcode warning, not an abort).
    pub fn translate(mut self, code: &[u8], regions: &[ExceptionRegion], diagnostics: &crate::error::Diagnostics) -> BasicBlock<'static> {
        let targets = Self::scan_branch_targets(code);
        let events = Self::scan_exception_events(regions);

        for (offset, opcode) in OpCodeIterator::new(code) {
            self.emit_label_if_target(offset, &targets, &events);

            let opcode = match opcode {
                Ok(opcode) => opcode,
                Err(_) => {
                    let error = CoreError::UnsupportedOpcode { offset, opcode: "<malformed>".into() };
                    diagnostics.report(crate::error::Site { type_name: String::new(), method_name: Some(self.method_name.to_string()) }, &error);
                    self.emit(Instruction::RawCpp { text: format!("// unsupported opcode at IL_{offset:04X}") });
                    continue;
                }
            };

            self.translate_one(offset, opcode, diagnostics);
        }

        self.block
    }

    fn translate_one(&mut self, offset: u64, opcode: OpCode<'_>, diagnostics: &crate::error::Diagnostics) {
        match opcode {
            OpCode::nop | OpCode::dbg_break => {}

            OpCode::ldc_i4_m1 => self.push(Operand::IntLiteral(-1)),
            OpCode::ldc_i4_0 => self.push(Operand::IntLiteral(0)),
            OpCode::ldc_i4_1 => self.push(Operand::IntLiteral(1)),
            OpCode::ldc_i4_2 => self.push(Operand::IntLiteral(2)),
            OpCode::ldc_i4_3 => self.push(Operand::IntLiteral(3)),
            OpCode::ldc_i4_4 => self.push(Operand::IntLiteral(4)),
            OpCode::ldc_i4_5 => self.push(Operand::IntLiteral(5)),
            OpCode::ldc_i4_6 => self.push(Operand::IntLiteral(6)),
            OpCode::ldc_i4_7 => self.push(Operand::IntLiteral(7)),
            OpCode::ldc_i4_8 => self.push(Operand::IntLiteral(8)),
            OpCode::ldc_i4_s(v) => self.push(Operand::IntLiteral(v as i64)),
            OpCode::ldc_i4(v) => self.push(Operand::IntLiteral(v as i64)),
            OpCode::ldc_i8(v) => self.push(Operand::IntLiteral(v)),
            // NaN/±∞ preserved: stored as their IEEE-754 bit pattern, not re-derived
            // from a decimal literal that could round-trip differently.
            OpCode::ldc_r4(v) => self.push(Operand::Raw(format!("__builtin_bit_cast<float>({:#010x}u)", v.to_bits()))),
            OpCode::ldc_r8(v) => self.push(Operand::Raw(format!("__builtin_bit_cast<double>({:#018x}ull)", v.to_bits()))),
            OpCode::ldnull => self.push(Operand::Null),

            OpCode::ldarg_0 => self.push(Operand::Argument("arg0".into())),
            OpCode::ldarg_1 => self.push(Operand::Argument("arg1".into())),
            OpCode::ldarg_2 => self.push(Operand::Argument("arg2".into())),
            OpCode::ldarg_3 => self.push(Operand::Argument("arg3".into())),
            OpCode::ldarg_s(n) => self.push(Operand::Argument(format!("arg{n}"))),

            OpCode::ldloc_0 => self.push(Operand::Local("loc_0".into())),
            OpCode::ldloc_1 => self.push(Operand::Local("loc_1".into())),
            OpCode::ldloc_2 => self.push(Operand::Local("loc_2".into())),
            OpCode::ldloc_3 => self.push(Operand::Local("loc_3".into())),
            OpCode::ldloc_s(n) => self.push(Operand::Local(format!("loc_{n}"))),

            OpCode::stloc_0 => self.store_local(0),
            OpCode::stloc_1 => self.store_local(1),
            OpCode::stloc_2 => self.store_local(2),
            OpCode::stloc_3 => self.store_local(3),
            OpCode::stloc_s(n) => self.store_local(n as u32),

            // The IR does not distinguish a value from its address; taking
            // the address of a local/argument pushes the same operand a
            // plain load would.
            OpCode::ldloca_s(n) => self.push(Operand::Local(format!("loc_{n}"))),
            OpCode::ldarga_s(n) => self.push(Operand::Argument(format!("arg{n}"))),
            OpCode::starg_s(n) => self.store_argument(n as u32),

            OpCode::dup => {
                let top = self.stack.last().cloned();
                if let Some(StackValue::Operand(operand)) = top {
                    self.push(operand);
                }
            }
            OpCode::pop => { self.pop(); }

            OpCode::add => self.binop(BinaryOp::Add),
            OpCode::add_ovf | OpCode::add_ovf_un => self.binop(BinaryOp::Add),
            OpCode::sub => self.binop(BinaryOp::Sub),
            OpCode::sub_ovf | OpCode::sub_ovf_un => self.binop(BinaryOp::Sub),
            OpCode::mul => self.binop(BinaryOp::Mul),
            OpCode::mul_ovf | OpCode::mul_ovf_un => self.binop(BinaryOp::Mul),
            OpCode::div => self.binop(BinaryOp::Div),
            OpCode::div_un => self.binop(BinaryOp::DivUnsigned),
            OpCode::rem => self.binop(BinaryOp::Rem),
            OpCode::rem_un => self.binop(BinaryOp::RemUnsigned),
            OpCode::and => self.binop(BinaryOp::And),
            OpCode::or => self.binop(BinaryOp::Or),
            OpCode::xor => self.binop(BinaryOp::Xor),
            OpCode::shl => self.binop(BinaryOp::Shl),
            OpCode::shr => self.binop(BinaryOp::Shr),
            // lowered to an unsigned shift on the C++ side: the emitter must
            // cast the left-hand operand to an unsigned type of equal width
            // before shifting so the vacated bits are zero-filled.
            OpCode::shr_un => self.binop(BinaryOp::ShrUnsigned),
            OpCode::neg => self.unop(UnaryOp::Negate),
            OpCode::not => self.unop(UnaryOp::BitwiseComplement),

            OpCode::ret => {
                let value = if self.stack.is_empty() { None } else { Some(self.pop()) };
                self.emit(Instruction::Return { value });
                self.stack.clear();
            }

            OpCode::br(rel) => {
                self.emit(Instruction::Branch { label: format!("IL_{:04X}", (offset as i64 + rel as i64) as u64) });
                self.stack.clear();
            }
            OpCode::br_s(rel) => {
                self.emit(Instruction::Branch { label: format!("IL_{:04X}", (offset as i64 + rel as i64) as u64) });
                self.stack.clear();
            }
            OpCode::brtrue(rel) => self.conditional_branch(BranchCondition::True, offset as i64 + rel as i64),
            OpCode::brtrue_s(rel) => self.conditional_branch(BranchCondition::True, offset as i64 + rel as i64),
            OpCode::brfalse(rel) => self.conditional_branch(BranchCondition::False, offset as i64 + rel as i64),
            OpCode::brfalse_s(rel) => self.conditional_branch(BranchCondition::False, offset as i64 + rel as i64),
            OpCode::beq(rel) => self.compare_branch(BranchCondition::Equal, offset as i64 + rel as i64),
            OpCode::beq_s(rel) => self.compare_branch(BranchCondition::Equal, offset as i64 + rel as i64),
            OpCode::bne_un(rel) => self.compare_branch(BranchCondition::NotEqual, offset as i64 + rel as i64),
            OpCode::bne_un_s(rel) => self.compare_branch(BranchCondition::NotEqual, offset as i64 + rel as i64),
            OpCode::bgt(rel) => self.compare_branch(BranchCondition::GreaterThan, offset as i64 + rel as i64),
            OpCode::bgt_s(rel) => self.compare_branch(BranchCondition::GreaterThan, offset as i64 + rel as i64),
            OpCode::bgt_un(rel) => self.compare_branch(BranchCondition::GreaterThanUnsigned, offset as i64 + rel as i64),
            OpCode::bgt_un_s(rel) => self.compare_branch(BranchCondition::GreaterThanUnsigned, offset as i64 + rel as i64),
            OpCode::bge(rel) => self.compare_branch(BranchCondition::GreaterThanOrEqual, offset as i64 + rel as i64),
            OpCode::bge_s(rel) => self.compare_branch(BranchCondition::GreaterThanOrEqual, offset as i64 + rel as i64),
            OpCode::bge_un(rel) => self.compare_branch(BranchCondition::GreaterThanOrEqualUnsigned, offset as i64 + rel as i64),
            OpCode::bge_un_s(rel) => self.compare_branch(BranchCondition::GreaterThanOrEqualUnsigned, offset as i64 + rel as i64),
            OpCode::blt(rel) => self.compare_branch(BranchCondition::LessThan, offset as i64 + rel as i64),
            OpCode::blt_s(rel) => self.compare_branch(BranchCondition::LessThan, offset as i64 + rel as i64),
            OpCode::blt_un(rel) => self.compare_branch(BranchCondition::LessThanUnsigned, offset as i64 + rel as i64),
            OpCode::blt_un_s(rel) => self.compare_branch(BranchCondition::LessThanUnsigned, offset as i64 + rel as i64),
            OpCode::ble(rel) => self.compare_branch(BranchCondition::LessThanOrEqual, offset as i64 + rel as i64),
            OpCode::ble_s(rel) => self.compare_branch(BranchCondition::LessThanOrEqual, offset as i64 + rel as i64),
            OpCode::ble_un(rel) => self.compare_branch(BranchCondition::LessThanOrEqualUnsigned, offset as i64 + rel as i64),
            OpCode::ble_un_s(rel) => self.compare_branch(BranchCondition::LessThanOrEqualUnsigned, offset as i64 + rel as i64),

            // `leave` clears the stack unconditionally — it exits a protected
            // region, and nothing on the simulated stack is live across that exit.
            OpCode::leave(rel) => {
                self.emit(Instruction::Branch { label: format!("IL_{:04X}", (offset as i64 + rel as i64) as u64) });
                self.stack.clear();
            }
            OpCode::leave_s(rel) => {
                self.emit(Instruction::Branch { label: format!("IL_{:04X}", (offset as i64 + rel as i64) as u64) });
                self.stack.clear();
            }

            OpCode::throw => {
                let value = Some(self.pop());
                self.emit(Instruction::Throw { value });
                self.stack.clear();
            }

            OpCode::conv_i4 | OpCode::conv_ovf_i4 | OpCode::conv_ovf_i4_un => self.convert("int32_t"),
            OpCode::conv_u4 | OpCode::conv_ovf_u4 | OpCode::conv_ovf_u4_un => self.convert("uint32_t"),
            OpCode::conv_i8 | OpCode::conv_ovf_i8 | OpCode::conv_ovf_i8_un => self.convert("int64_t"),
            OpCode::conv_u8 | OpCode::conv_ovf_u8 | OpCode::conv_ovf_u8_un => self.convert("uint64_t"),
            OpCode::conv_r4 => self.convert("float"),
            OpCode::conv_r8 | OpCode::conv_r_un => self.convert("double"),
            OpCode::conv_i1 | OpCode::conv_ovf_i1_un => self.convert("int8_t"),
            OpCode::conv_u1 | OpCode::conv_ovf_u1_un => self.convert("uint8_t"),
            OpCode::conv_i2 | OpCode::conv_ovf_i2_un => self.convert("int16_t"),
            OpCode::conv_u2 | OpCode::conv_ovf_u2_un => self.convert("uint16_t"),
            OpCode::conv_i | OpCode::conv_ovf_i | OpCode::conv_ovf_i_un => self.convert("intptr_t"),
            OpCode::conv_u | OpCode::conv_ovf_u | OpCode::conv_ovf_u_un => self.convert("uintptr_t"),

            OpCode::call(token) => self.translate_call(offset, token, false, diagnostics),
            OpCode::callvirt(token) => self.translate_call(offset, token, true, diagnostics),
            OpCode::newobj(token) => self.translate_newobj(offset, token, diagnostics),

            OpCode::ldfld(token) => self.translate_ldfld(offset, token, diagnostics),
            OpCode::stfld(token) => self.translate_stfld(offset, token, diagnostics),
            OpCode::ldsfld(token) => self.translate_ldsfld(offset, token, diagnostics),
            OpCode::stsfld(token) => self.translate_stsfld(offset, token, diagnostics),

            OpCode::ldstr(token) => self.translate_ldstr(offset, token, diagnostics),

            OpCode::castclass(token) => self.translate_type_check(offset, token, CastKind::Checked, diagnostics),
            OpCode::isinst(token) => self.translate_type_check(offset, token, CastKind::Safe, diagnostics),
            OpCode::box_val(token) => self.translate_box(offset, token, diagnostics),
            OpCode::unbox(token) => self.translate_unbox(offset, token, UnboxKind::AddressOf, diagnostics),
            OpCode::unbox_any(token) => self.translate_unbox(offset, token, UnboxKind::CopyValue, diagnostics),

            OpCode::newarr(token) => self.translate_newarr(offset, token, diagnostics),
            OpCode::ldlen => {
                let array = self.pop();
                let target = self.fresh_temp();
                self.emit(Instruction::Call { target: Some(target.clone()), function: "array_length".into(), arguments: vec![array] });
                self.push(Operand::Temp(target));
            }
            OpCode::ldelem_i1 => self.array_load("int8_t"),
            OpCode::ldelem_u1 => self.array_load("uint8_t"),
            OpCode::ldelem_i2 => self.array_load("int16_t"),
            OpCode::ldelem_u2 => self.array_load("uint16_t"),
            OpCode::ldelem_i4 => self.array_load("int32_t"),
            OpCode::ldelem_u4 => self.array_load("uint32_t"),
            OpCode::ldelem_i8 => self.array_load("int64_t"),
            OpCode::ldelem_i => self.array_load("intptr_t"),
            OpCode::ldelem_r4 => self.array_load("float"),
            OpCode::ldelem_r8 => self.array_load("double"),
            OpCode::ldelem_ref => self.array_load("object*"),
            OpCode::ldelem(token) => {
                let element_type = self.resolve_type_or_raw(token);
                self.array_load(&element_type);
            }
            OpCode::stelem_i => self.array_store("intptr_t"),
            OpCode::stelem_i1 => self.array_store("int8_t"),
            OpCode::stelem_i2 => self.array_store("int16_t"),
            OpCode::stelem_i4 => self.array_store("int32_t"),
            OpCode::stelem_i8 => self.array_store("int64_t"),
            OpCode::stelem_r4 => self.array_store("float"),
            OpCode::stelem_r8 => self.array_store("double"),
            OpCode::stelem_ref => self.array_store("object*"),
            OpCode::stelem(token) => {
                let element_type = self.resolve_type_or_raw(token);
                self.array_store(&element_type);
            }

            OpCode::compound(compound) => self.translate_compound(offset, compound, diagnostics),

            _ => {
                let error = CoreError::UnsupportedOpcode { offset, opcode: format!("{opcode:?}") };
                diagnostics.report(crate::error::Site { type_name: String::new(), method_name: Some(self.method_name.to_string()) }, &error);
                self.emit(Instruction::RawCpp { text: format!("// unsupported opcode {opcode:?} at IL_{offset:04X}") });
            }
        }
    }

    fn translate_compound(&mut self, offset: u64, opcode: CompoundOpCode, diagnostics: &crate::error::Diagnostics) {
        match opcode {
            CompoundOpCode::ceq => self.binop(BinaryOp::Equal),
            // `cgt.un`/`clt.un` against a literal null operand are reference
            // (in)equality checks, not numeric unsigned compares (Open
            // Question, §9 — resolved as always-on; see `compare_branch`).
            CompoundOpCode::cgt => self.binop(BinaryOp::GreaterThan),
            CompoundOpCode::cgt_un => self.binop(BinaryOp::GreaterThanUnsigned),
            CompoundOpCode::clt => self.binop(BinaryOp::LessThan),
            CompoundOpCode::clt_un => self.binop(BinaryOp::LessThanUnsigned),
            CompoundOpCode::rethrow => {
                self.emit(Instruction::Rethrow);
                self.stack.clear();
            }
            CompoundOpCode::ldloc(n) => self.push(Operand::Local(format!("loc_{n}"))),
            CompoundOpCode::stloc(n) => self.store_local(n as u32),
            CompoundOpCode::ldarg(n) => self.push(Operand::Argument(format!("arg{n}"))),
            CompoundOpCode::starg(n) => self.store_argument(n as u32),
            CompoundOpCode::ldloca(n) => self.push(Operand::Local(format!("loc_{n}"))),
            CompoundOpCode::ldarga(n) => self.push(Operand::Argument(format!("arg{n}"))),
            // `constrained. <type>` prefixes the very next `callvirt` only
            // (ECMA-335 III.2.1): consumed, never left set across more than
            // one call.
            CompoundOpCode::constrained(token) => {
                self.constrained_type = self.resolver.and_then(|r| r.resolve_type(token));
            }
            _ => {
                let error = CoreError::UnsupportedOpcode { offset, opcode: format!("{opcode:?}") };
                diagnostics.report(crate::error::Site { type_name: String::new(), method_name: Some(self.method_name.to_string()) }, &error);
                self.emit(Instruction::RawCpp { text: format!("// unsupported opcode {opcode:?} at IL_{offset:04X}") });
            }
        }
    }

    fn store_local(&mut self, index: u32) {
        let value = self.pop();
        self.emit(Instruction::Assign { target: format!("loc_{index}"), value });
    }

    fn store_argument(&mut self, index: u32) {
        let value = self.pop();
        self.emit(Instruction::Assign { target: format!("arg{index}"), value });
    }

    /// `conv_*`/`conv_ovf_*`: lowered as a `static_cast`, matching the
    /// "conversion-as-static-cast" edge case.
    fn convert(&mut self, cpp_type: &str) {
        let value = self.pop();
        let target = self.fresh_temp();
        self.emit(Instruction::Conversion { target: target.clone(), value, type_decl: cpp_type.into() });
        self.push(Operand::Temp(target));
    }

    fn emit_unsupported(&mut self, offset: u64, opcode_text: &str, diagnostics: &crate::error::Diagnostics) {
        let error = CoreError::UnsupportedOpcode { offset, opcode: opcode_text.to_string() };
        diagnostics.report(crate::error::Site { type_name: String::new(), method_name: Some(self.method_name.to_string()) }, &error);
        self.emit(Instruction::RawCpp { text: format!("// unsupported opcode {opcode_text} at IL_{offset:04X}") });
    }

    fn resolve_type_or_raw(&self, token: MetadataToken) -> String {
        self.resolver.and_then(|r| r.resolve_type(token)).unwrap_or_else(|| "void*".into())
    }

    fn array_load(&mut self, element_type: &str) {
        let index = self.pop();
        let array = self.pop();
        let target = self.fresh_temp();
        self.emit(Instruction::ArrayLoad { target: target.clone(), array, index, element_type: element_type.into() });
        self.push(Operand::Temp(target));
    }

    fn array_store(&mut self, element_type: &str) {
        let value = self.pop();
        let index = self.pop();
        let array = self.pop();
        self.emit(Instruction::ArrayStore { array, index, value, element_type: element_type.into() });
    }

    /// `call`/`callvirt`: resolves the target, runs it through the
    /// interceptor chain (declaring type first redirected by any active
    /// `constrained.` prefix — invariant: a constrained call never goes
    /// through the vtable and never boxes, §8 scenario 3), then either a
    /// direct call to the resolved symbol, a vtable-slot call for an
    /// unconstrained virtual dispatch (§8 scenario 2), or an icall-registry
    /// symbol when the resolved method has no managed body at all.
    fn translate_call(&mut self, offset: u64, token: MetadataToken, is_callvirt: bool, diagnostics: &crate::error::Diagnostics) {
        let constrained_type = self.constrained_type.take();
        let Some(resolved) = self.resolver.and_then(|r| r.resolve_method(token)) else {
            self.emit_unsupported(offset, "call (unresolved method token)", diagnostics);
            return;
        };

        let arg_count = resolved.parameter_type_full_names.len() + usize::from(!resolved.is_static);
        let mut arguments: Vec<Operand> = (0..arg_count).map(|_| self.pop()).collect();
        arguments.reverse();

        let declaring_type = constrained_type.clone().unwrap_or_else(|| resolved.declaring_type_full_name.clone());
        let has_return = resolved.return_type_full_name.is_some();

        if let Some(interceptors) = self.interceptors {
            let target = has_return.then(|| self.fresh_temp());
            let call_site = CallSite {
                declaring_type,
                method_name: resolved.method_name.clone(),
                generic_arguments: resolved.generic_arguments.clone(),
                arguments: arguments.clone(),
                target: target.clone(),
            };
            if let Some(instructions) = interceptors.intercept(&call_site) {
                for instruction in instructions {
                    self.emit(instruction);
                }
                if let Some(target) = target {
                    self.push(Operand::Temp(target));
                }
                return;
            }
        }

        if resolved.is_internal_call {
            if let Some(icalls) = self.icalls {
                let first_parameter_type = resolved.parameter_type_full_names.first().map(String::as_str);
                if let Some(entry) = icalls.lookup(&resolved.declaring_type_full_name, &resolved.method_name, resolved.parameter_type_full_names.len(), first_parameter_type, !self.prefer_managed_shortcuts, false) {
                    let target = has_return.then(|| self.fresh_temp());
                    self.emit(Instruction::Call { target: target.clone(), function: entry.symbol.clone(), arguments });
                    if let Some(target) = target {
                        self.push(Operand::Temp(target));
                    }
                    return;
                }
            }
            self.emit_unsupported(offset, &format!("internal call {}::{}", resolved.declaring_type_full_name, resolved.method_name), diagnostics);
            return;
        }

        // invariant 2 / §8 scenario 2: an unconstrained callvirt on a
        // virtual method dispatches through the vtable slot, not the
        // statically resolved symbol.
        let target = has_return.then(|| self.fresh_temp());
        if is_callvirt && constrained_type.is_none() && resolved.is_virtual {
            let slot = resolved.vtable_slot.unwrap_or(0);
            self.emit(Instruction::Call { target: target.clone(), function: format!("{}->vtable[{slot}]", resolved.declaring_type_mangled_name), arguments });
        } else {
            self.emit(Instruction::Call { target: target.clone(), function: resolved.mangled_name, arguments });
        }
        if let Some(target) = target {
            self.push(Operand::Temp(target));
        }
    }

    fn translate_newobj(&mut self, offset: u64, token: MetadataToken, diagnostics: &crate::error::Diagnostics) {
        let Some(resolved) = self.resolver.and_then(|r| r.resolve_method(token)) else {
            self.emit_unsupported(offset, "newobj (unresolved constructor token)", diagnostics);
            return;
        };
        let mut arguments: Vec<Operand> = (0..resolved.parameter_type_full_names.len()).map(|_| self.pop()).collect();
        arguments.reverse();
        let target = self.fresh_temp();
        self.emit(Instruction::NewObject { target: target.clone(), type_decl: resolved.declaring_type_mangled_name, constructor: resolved.mangled_name, arguments });
        self.push(Operand::Temp(target));
    }

    fn translate_ldfld(&mut self, offset: u64, token: MetadataToken, diagnostics: &crate::error::Diagnostics) {
        let receiver = self.pop();
        let Some(field) = self.resolver.and_then(|r| r.resolve_field(token)) else {
            self.emit_unsupported(offset, "ldfld (unresolved field token)", diagnostics);
            return;
        };
        let target = self.fresh_temp();
        self.emit(Instruction::FieldLoad { target: target.clone(), receiver, field: field.mangled_name });
        self.push(Operand::Temp(target));
    }

    fn translate_stfld(&mut self, offset: u64, token: MetadataToken, diagnostics: &crate::error::Diagnostics) {
        let value = self.pop();
        let receiver = self.pop();
        let Some(field) = self.resolver.and_then(|r| r.resolve_field(token)) else {
            self.emit_unsupported(offset, "stfld (unresolved field token)", diagnostics);
            return;
        };
        self.emit(Instruction::FieldStore { receiver, field: field.mangled_name, value });
    }

    fn translate_ldsfld(&mut self, offset: u64, token: MetadataToken, diagnostics: &crate::error::Diagnostics) {
        let Some(field) = self.resolver.and_then(|r| r.resolve_field(token)) else {
            self.emit_unsupported(offset, "ldsfld (unresolved field token)", diagnostics);
            return;
        };
        let target = self.fresh_temp();
        self.emit(Instruction::StaticFieldLoad { target: target.clone(), type_decl: field.declaring_type_mangled_name, field: field.mangled_name });
        self.push(Operand::Temp(target));
    }

    fn translate_stsfld(&mut self, offset: u64, token: MetadataToken, diagnostics: &crate::error::Diagnostics) {
        let value = self.pop();
        let Some(field) = self.resolver.and_then(|r| r.resolve_field(token)) else {
            self.emit_unsupported(offset, "stsfld (unresolved field token)", diagnostics);
            return;
        };
        self.emit(Instruction::StaticFieldStore { type_decl: field.declaring_type_mangled_name, field: field.mangled_name, value });
    }

    fn translate_ldstr(&mut self, offset: u64, token: MetadataToken, diagnostics: &crate::error::Diagnostics) {
        let Some(text) = self.resolver.and_then(|r| r.resolve_string(token)) else {
            self.emit_unsupported(offset, "ldstr (unresolved string token)", diagnostics);
            return;
        };
        self.push(Operand::StringLiteral(text));
    }

    fn translate_type_check(&mut self, offset: u64, token: MetadataToken, kind: CastKind, diagnostics: &crate::error::Diagnostics) {
        let value = self.pop();
        let Some(type_decl) = self.resolver.and_then(|r| r.resolve_type(token)) else {
            self.emit_unsupported(offset, "castclass/isinst (unresolved type token)", diagnostics);
            return;
        };
        let target = self.fresh_temp();
        self.emit(Instruction::Cast { target: target.clone(), value, type_decl, kind });
        self.push(Operand::Temp(target));
    }

    fn translate_box(&mut self, offset: u64, token: MetadataToken, diagnostics: &crate::error::Diagnostics) {
        let value = self.pop();
        let Some(type_decl) = self.resolver.and_then(|r| r.resolve_type(token)) else {
            self.emit_unsupported(offset, "box (unresolved type token)", diagnostics);
            return;
        };
        let target = self.fresh_temp();
        self.emit(Instruction::Box { target: target.clone(), value, type_decl });
        self.push(Operand::Temp(target));
    }

    fn translate_unbox(&mut self, offset: u64, token: MetadataToken, kind: UnboxKind, diagnostics: &crate::error::Diagnostics) {
        let value = self.pop();
        let Some(type_decl) = self.resolver.and_then(|r| r.resolve_type(token)) else {
            self.emit_unsupported(offset, "unbox (unresolved type token)", diagnostics);
            return;
        };
        let target = self.fresh_temp();
        self.emit(Instruction::Unbox { target: target.clone(), value, type_decl, kind });
        self.push(Operand::Temp(target));
    }

    fn translate_newarr(&mut self, offset: u64, token: MetadataToken, diagnostics: &crate::error::Diagnostics) {
        let length = self.pop();
        let Some(element_type) = self.resolver.and_then(|r| r.resolve_type(token)) else {
            self.emit_unsupported(offset, "newarr (unresolved element type token)", diagnostics);
            return;
        };
        let target = self.fresh_temp();
        self.emit(Instruction::Call { target: Some(target.clone()), function: "array_new".into(), arguments: vec![length, Operand::Raw(element_type)] });
        self.push(Operand::Temp(target));
    }
}

fn rewrite_null_compare(condition: BranchCondition, lhs: &Operand, rhs: &Operand) -> BranchCondition {
    let is_null_compare = matches!(lhs, Operand::Null) || matches!(rhs, Operand::Null);
    if !is_null_compare {
        return condition;
    }
    match condition {
        BranchCondition::GreaterThanUnsigned | BranchCondition::LessThanUnsigned => BranchCondition::NotEqual,
        _ => condition,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Diagnostics;

    fn counter() -> impl FnMut() -> String {
        let mut n = 0u32;
        move || {
            let t = format!("__t{n}");
            n += 1;
            t
        }
    }

    #[test]
    fn arithmetic_scenario_matches_literal_example() {
        // ldc.i4.3; ldc.i4.4; add; stloc.0 -> __t0 = 3 + 4; loc_0 = __t0
        let code: Vec<u8> = vec![0x19, 0x1A, 0x58, 0x0A];
        let diagnostics = Diagnostics::new();
        let translator = BytecodeTranslator::new("Test", counter());
        let block = translator.translate(&code, &[], &diagnostics);

        assert_eq!(block.instructions.len(), 2);
        match &block.instructions[0].instruction {
            Instruction::BinaryOp { target, op, lhs, rhs } => {
                assert_eq!(target, "__t0");
                assert_eq!(*op, BinaryOp::Add);
                assert_eq!(*lhs, Operand::IntLiteral(3));
                assert_eq!(*rhs, Operand::IntLiteral(4));
            }
            other => panic!("unexpected instruction {other:?}"),
        }
        match &block.instructions[1].instruction {
            Instruction::Assign { target, value } => {
                assert_eq!(target, "loc_0");
                assert_eq!(*value, Operand::Temp("__t0".into()));
            }
            other => panic!("unexpected instruction {other:?}"),
        }
    }

    #[test]
    fn unsupported_opcode_emits_comment_and_continues() {
        // calli <MethodDef token #1>; ret — calli decodes fine (its only
        // operand is a well-formed metadata token) but has no translator
        // arm, so it must degrade to a RawCpp comment and the `ret` right
        // after it must still translate normally.
        let code: Vec<u8> = vec![0x29, 0x01, 0x00, 0x00, 0x06, 0x2A];
        let diagnostics = Diagnostics::new();
        let translator = BytecodeTranslator::new("Test", counter());
        let block = translator.translate(&code, &[], &diagnostics);
        assert_eq!(block.instructions.len(), 2);
        assert!(matches!(block.instructions[0].instruction, Instruction::RawCpp { .. }));
        assert!(matches!(block.instructions[1].instruction, Instruction::Return { value: None }));
    }

    #[test]
    fn leave_clears_the_stack() {
        let code: Vec<u8> = vec![0x16, 0xDE, 0x00]; // ldc.i4.0; leave.s +0
        let diagnostics = Diagnostics::new();
        let translator = BytecodeTranslator::new("Test", counter());
        let block = translator.translate(&code, &[], &diagnostics);
        assert!(block.instructions.iter().any(|i| matches!(i.instruction, Instruction::Branch { .. })));
    }
}
