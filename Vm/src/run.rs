use std::ops::ControlFlow;

use core::bytecode::operands::{
    CallImmediateNoReturn, CallImmediateWithReturn, CallSrcNoReturn, CallSrcWithReturn, Destruct, Jump, JumpIfFalse, LoadDefault,
    LoadImmediateScalar, MemsetUninitialized, ReturnValue, SetNullType, SetType,
};
use core::bytecode::{Bytecode, OpCode};
use core::errors::ProgramRuntimeError;
use core::stack::TypeSlot;
use core::types::{self, Type};
use log::{error, trace};

use crate::Vm;

/// Result of one opcode handler: `Continue` means the handler already
/// left the current frame's instruction pointer where execution should
/// resume (advanced past the instruction, jumped, or became a freshly
/// pushed callee at IP 0); `Break` means the root frame just returned,
/// carrying its return value (if any) out to [`Vm::call`].
type OpRes = Result<ControlFlow<Option<u64>>, ProgramRuntimeError>;

/// Reinterprets a bytecode word as the `'static` type pointer a
/// non-scalar `LoadDefault`/`SetType` carries inline. Sound because the
/// Function Builder only ever emits words produced by the matching
/// `type_to_word` cast below, and every type this workspace compiles
/// against is one of the `'static` descriptors in `core::types`.
fn word_to_type(word: u64) -> &'static Type {
    unsafe { &*(word as *const Type) }
}

fn type_to_word(ty: &'static Type) -> u64 {
    ty as *const Type as u64
}

#[allow(clippy::unit_arg)]
impl<'p> Vm<'p> {
    pub(crate) fn run(&mut self) -> Result<Option<u64>, ProgramRuntimeError> {
        loop {
            let func_idx = self.stack.current_function_index().expect("run() requires an active frame") as usize;
            let bytecode = &self.program.functions[func_idx].bytecode;
            let ip = self.stack.get_instruction_pointer() as usize;
            let word = bytecode.get(ip).copied().unwrap_or_default();
            trace!("ip={ip} op={:?}", word.opcode());

            let step = match word.opcode() {
                OpCode::Noop => self.op_advance(ip, 1),
                OpCode::Return => self.op_return(),
                OpCode::ReturnValue => self.op_return_value(ReturnValue(word)),
                OpCode::CallImmediateNoReturn => self.op_call_immediate(bytecode, ip, CallImmediateNoReturn(word).arg_count(), None),
                OpCode::CallSrcNoReturn => {
                    let op = CallSrcNoReturn(word);
                    self.op_call_src(bytecode, ip, op.src(), op.arg_count(), None)
                }
                OpCode::CallImmediateWithReturn => {
                    let op = CallImmediateWithReturn(word);
                    self.op_call_immediate(bytecode, ip, op.arg_count(), Some(op.ret_dst()))
                }
                OpCode::CallSrcWithReturn => {
                    let op = CallSrcWithReturn(word);
                    self.op_call_src(bytecode, ip, op.src(), op.arg_count(), Some(op.ret_dst()))
                }
                OpCode::LoadDefault => self.op_load_default(bytecode, ip, LoadDefault(word)),
                OpCode::LoadImmediateScalar => self.op_load_immediate_scalar(bytecode, ip, LoadImmediateScalar(word)),
                OpCode::MemsetUninitialized => self.op_memset_uninitialized(ip, MemsetUninitialized(word)),
                OpCode::SetType => self.op_set_type(bytecode, ip, SetType(word)),
                OpCode::SetNullType => self.op_set_null_type(ip, SetNullType(word)),
                OpCode::Jump => self.op_jump(ip, Jump(word)),
                OpCode::JumpIfFalse => self.op_jump_if_false(ip, JumpIfFalse(word)),
                OpCode::Destruct => self.op_destruct(ip, Destruct(word)),
            }?;

            match step {
                ControlFlow::Continue(()) => continue,
                ControlFlow::Break(value) => return Ok(value),
            }
        }
    }

    fn op_advance(&mut self, ip: usize, words: u32) -> OpRes {
        self.stack.set_instruction_pointer(ip as u32 + words);
        Ok(ControlFlow::Continue(()))
    }

    fn op_return(&mut self) -> OpRes {
        match self.stack.pop_frame() {
            None => Ok(ControlFlow::Break(None)),
            Some(_popped) => Ok(ControlFlow::Continue(())),
        }
    }

    fn op_return_value(&mut self, op: ReturnValue) -> OpRes {
        let src = op.src() as usize;
        let value = self.stack.value_at(src);
        let ty = self.stack.type_at(src);
        match self.stack.pop_frame() {
            None => Ok(ControlFlow::Break(Some(value))),
            Some(popped) => {
                if let Some(dst) = popped.return_dst {
                    self.stack.set_value_at(value, dst as usize);
                    self.stack.set_type_at(ty, dst as usize);
                }
                Ok(ControlFlow::Continue(()))
            }
        }
    }

    /// Decodes the `ceil(argCount/4)` words of packed 16-bit argument
    /// source slot indices following the instruction (and, for the
    /// immediate-callee variants, the function pointer word right after
    /// the opcode itself).
    fn decode_call(&mut self, bytecode: &[Bytecode], ip: usize, has_fn_word: bool, arg_count: u16) -> (u32, usize, Vec<u16>) {
        let mut cursor = ip + 1;
        let function_index = if has_fn_word {
            let idx = bytecode[cursor].0 as u32;
            cursor += 1;
            idx
        } else {
            0 // resolved from `src` by the caller instead
        };

        let arg_words = CallImmediateNoReturn::arg_words(arg_count) as usize;
        let mut sources = Vec::with_capacity(arg_count as usize);
        let mut remaining = arg_count;
        for w in 0..arg_words {
            let word = bytecode[cursor + w].0;
            for slot in 0..4 {
                if remaining == 0 {
                    break;
                }
                sources.push(((word >> (slot * 16)) & 0xFFFF) as u16);
                remaining -= 1;
            }
        }
        cursor += arg_words;
        (function_index, cursor, sources)
    }

    fn stage_args_and_call(&mut self, ip: usize, cursor: usize, function_index: u32, sources: Vec<u16>, ret_dst: Option<u16>) -> OpRes {
        self.stack.set_instruction_pointer((cursor - ip) as u32 + ip as u32);

        let mut offset = 0usize;
        for src in sources {
            let value = self.stack.value_at(src as usize);
            let ty = self.stack.type_at(src as usize);
            let align = ty.type_of().map(|t| t.align).unwrap_or(8);
            offset = self.stack.push_script_function_arg(value, ty, offset, align);
        }

        let callee = &self.program.functions[function_index as usize];
        self.stack.push_function_frame(function_index, callee.stack_slots as usize, callee.stack_align as usize, ret_dst)?;
        Ok(ControlFlow::Continue(()))
    }

    fn op_call_immediate(&mut self, bytecode: &[Bytecode], ip: usize, arg_count: u16, ret_dst: Option<u16>) -> OpRes {
        let (function_index, cursor, sources) = self.decode_call(bytecode, ip, true, arg_count);
        self.stage_args_and_call(ip, cursor, function_index, sources, ret_dst)
    }

    fn op_call_src(&mut self, bytecode: &[Bytecode], ip: usize, src: u16, arg_count: u16, ret_dst: Option<u16>) -> OpRes {
        let function_index = self.stack.value_at(src as usize) as u32;
        let (_, cursor, sources) = self.decode_call(bytecode, ip, false, arg_count);
        self.stage_args_and_call(ip, cursor, function_index, sources, ret_dst)
    }

    fn op_load_default(&mut self, bytecode: &[Bytecode], ip: usize, op: LoadDefault) -> OpRes {
        if op.is_scalar() {
            let tag = core::bytecode::ScalarTag::from_u8(op.scalar_tag());
            self.stack.set_value_at(0, op.dst() as usize);
            self.stack.set_type_at(TypeSlot::Owned(types::for_scalar_tag(tag)), op.dst() as usize);
            self.op_advance(ip, 1)
        } else {
            let ty = word_to_type(bytecode[ip + 1].0);
            self.stack.set_value_at(0, op.dst() as usize);
            self.stack.set_type_at(TypeSlot::Owned(ty), op.dst() as usize);
            self.op_advance(ip, 2)
        }
    }

    fn op_load_immediate_scalar(&mut self, bytecode: &[Bytecode], ip: usize, op: LoadImmediateScalar) -> OpRes {
        let tag = core::bytecode::ScalarTag::from_u8(op.scalar_tag());
        let (bits, words) = if op.is_wide() {
            (bytecode[ip + 1].0, 2)
        } else {
            (sign_or_zero_extend(tag, op.immediate()), 1)
        };
        self.stack.set_value_at(bits, op.dst() as usize);
        self.stack.set_type_at(TypeSlot::Owned(types::for_scalar_tag(tag)), op.dst() as usize);
        self.op_advance(ip, words)
    }

    fn op_memset_uninitialized(&mut self, ip: usize, op: MemsetUninitialized) -> OpRes {
        for i in 0..op.slots() {
            self.stack.set_value_at(0xAAAA_AAAA_AAAA_AAAA, (op.dst() + i) as usize);
        }
        self.op_advance(ip, 1)
    }

    fn op_set_type(&mut self, bytecode: &[Bytecode], ip: usize, op: SetType) -> OpRes {
        let ty = word_to_type(bytecode[ip + 1].0);
        self.stack.set_type_at(TypeSlot::Owned(ty), op.dst() as usize);
        self.op_advance(ip, 2)
    }

    fn op_set_null_type(&mut self, ip: usize, op: SetNullType) -> OpRes {
        self.stack.set_type_at(TypeSlot::Empty, op.dst() as usize);
        self.op_advance(ip, 1)
    }

    fn op_jump(&mut self, ip: usize, op: Jump) -> OpRes {
        let target = ip as i64 + op.amount() as i64;
        self.stack.set_instruction_pointer(target as u32);
        Ok(ControlFlow::Continue(()))
    }

    fn op_jump_if_false(&mut self, ip: usize, op: JumpIfFalse) -> OpRes {
        let condition = self.stack.value_at(op.src() as usize) != 0;
        if condition {
            self.op_advance(ip, 1)
        } else {
            let target = ip as i64 + op.amount() as i64;
            self.stack.set_instruction_pointer(target as u32);
            Ok(ControlFlow::Continue(()))
        }
    }

    fn op_destruct(&mut self, ip: usize, op: Destruct) -> OpRes {
        let src = op.src() as usize;
        if let Some(destructor) = self.stack.type_at(src).type_of().and_then(|ty| ty.destructor) {
            destructor(self.stack.value_at(src));
        }
        self.stack.set_type_at(TypeSlot::Empty, src);
        self.op_advance(ip, 1)
    }
}

fn sign_or_zero_extend(tag: core::bytecode::ScalarTag, immediate: u32) -> u64 {
    use core::bytecode::ScalarTag::*;
    match tag {
        I8 | I16 | I32 | I64 => immediate as i32 as i64 as u64,
        _ => immediate as u64,
    }
}

#[allow(unused_imports)]
use type_to_word as _unused_type_to_word;

#[cfg(test)]
mod tests {
    use super::*;
    use core::program::{CompiledFunction, Program};

    fn program_with(bytecode: Vec<Bytecode>) -> Program {
        Program { functions: vec![CompiledFunction { name: 0, param_count: 0, stack_slots: 1, stack_align: 16, bytecode }] }
    }

    #[test]
    fn bare_return_yields_no_value() {
        let program = program_with(vec![Bytecode(OpCode::Return as u64)]);
        let mut vm = Vm::new(&program);
        assert_eq!(vm.call(0).unwrap(), None);
    }

    #[test]
    fn return_zero_yields_zero() {
        let program = program_with(vec![LoadImmediateScalar::new(core::bytecode::ScalarTag::I64, 0, 0).0, ReturnValue::new(0).0]);
        let mut vm = Vm::new(&program);
        assert_eq!(vm.call(0).unwrap(), Some(0));
    }

    #[test]
    fn return_value_roundtrips_large_wide_literal() {
        let program = program_with(vec![
            LoadImmediateScalar::new_wide(core::bytecode::ScalarTag::I64, 0).0,
            Bytecode(9_000_000_000u64),
            ReturnValue::new(0).0,
        ]);
        let mut vm = Vm::new(&program);
        assert_eq!(vm.call(0).unwrap(), Some(9_000_000_000));
    }

    #[test]
    fn destruct_runs_the_type_descriptor_hook() {
        use core::bytecode::operands::{Destruct, SetType};
        use core::types::{Type, TypeTag};
        use std::sync::atomic::{AtomicU64, Ordering};

        static SEEN: AtomicU64 = AtomicU64::new(0);
        fn record(value: u64) {
            SEEN.store(value, Ordering::SeqCst);
        }
        static WITH_DTOR: Type = Type::compound_with_destructor("Handle", 8, 8, TypeTag::Reference, record);

        let program = program_with(vec![
            LoadImmediateScalar::new(core::bytecode::ScalarTag::I64, 0, 42).0,
            SetType::new(0).0,
            Bytecode(&WITH_DTOR as *const Type as u64),
            Destruct::new(0).0,
            Bytecode(OpCode::Return as u64),
        ]);
        let mut vm = Vm::new(&program);
        assert_eq!(vm.call(0).unwrap(), None);
        assert_eq!(SEEN.load(Ordering::SeqCst), 42);
        assert_eq!(vm.stack.type_at(0), TypeSlot::Empty);
    }

    #[test]
    fn jump_if_false_skips_when_condition_is_zero() {
        // slot 0 = false; JumpIfFalse +2 skips the following LoadImmediateScalar,
        // landing on a ReturnValue that reads the still-zeroed slot 1.
        let program = program_with(vec![
            LoadImmediateScalar::new(core::bytecode::ScalarTag::Bool, 0, 0).0,
            JumpIfFalse::new(2, 0).0,
            LoadImmediateScalar::new(core::bytecode::ScalarTag::I64, 1, 77).0,
            ReturnValue::new(1).0,
        ]);
        let mut vm = Vm::new(&program);
        assert_eq!(vm.call(0).unwrap(), Some(0));
    }
}
