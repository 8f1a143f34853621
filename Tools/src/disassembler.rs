//! Plain-text bytecode disassembler.
//!
//! Follows a column-aligned instruction dump convention (computed
//! column widths feeding a fixed-format `write!` per row), adapted from
//! a byte-indexed `Chunk` + constant-pool model to this workspace's
//! 64-bit tagged-operand words, where wide immediates are inlined right
//! after the instruction that consumes them rather than living in a
//! separate constant pool.

use std::fmt::Write as _;

use core::bytecode::operands::*;
use core::bytecode::{Bytecode, OpCode, ScalarTag};
use core::program::{CompiledFunction, Program};
use core::tokens::TokenStream;
use core::types::Type;

/// Renders every function in `program`, in declaration order.
pub fn disassemble_program(program: &Program, source: &str, tokens: &TokenStream) -> String {
    let mut out = String::new();
    for function in &program.functions {
        disassemble_function_into(&mut out, function, source, tokens);
        out.push('\n');
    }
    out
}

/// Renders one function: a header line naming it, then one line per
/// instruction (wide immediates print alongside the instruction that
/// consumes them, never as a row of their own).
pub fn disassemble_function(function: &CompiledFunction, source: &str, tokens: &TokenStream) -> String {
    let mut out = String::new();
    disassemble_function_into(&mut out, function, source, tokens);
    out
}

fn disassemble_function_into(out: &mut String, function: &CompiledFunction, source: &str, tokens: &TokenStream) {
    let name = tokens.lexeme(function.name, source);
    let _ = writeln!(out, "== {name} (params={} slots={} align={}) ==", function.param_count, function.stack_slots, function.stack_align);

    let max_ip_len = function.bytecode.len().max(1).to_string().len();
    let mut ip = 0usize;
    while ip < function.bytecode.len() {
        let word = function.bytecode[ip];
        let (mnemonic, width, operands) = describe(&function.bytecode, ip);
        let _ = writeln!(out, "{ip:>max_ip_len$}  {:#018x}  {mnemonic:<24}{operands}", word.0);
        ip += width;
    }
}

/// Decodes the instruction at `ip`, returning its mnemonic, the number
/// of words it (including any inline operand words) occupies, and a
/// human-readable rendering of its operands.
fn describe(bytecode: &[Bytecode], ip: usize) -> (&'static str, usize, String) {
    let word = bytecode[ip];
    match word.opcode() {
        OpCode::Noop => ("Noop", 1, String::new()),
        OpCode::Return => ("Return", 1, String::new()),
        OpCode::ReturnValue => {
            let op = ReturnValue(word);
            ("ReturnValue", 1, format!("src={}", op.src()))
        }
        OpCode::CallImmediateNoReturn => {
            let op = CallImmediateNoReturn(word);
            let arg_words = CallImmediateNoReturn::arg_words(op.arg_count()) as usize;
            ("CallImmediateNoReturn", 2 + arg_words, format!("fn=@{} argc={}", bytecode[ip + 1].0, op.arg_count()))
        }
        OpCode::CallSrcNoReturn => {
            let op = CallSrcNoReturn(word);
            let arg_words = CallImmediateNoReturn::arg_words(op.arg_count()) as usize;
            ("CallSrcNoReturn", 1 + arg_words, format!("src={} argc={}", op.src(), op.arg_count()))
        }
        OpCode::CallImmediateWithReturn => {
            let op = CallImmediateWithReturn(word);
            let arg_words = CallImmediateNoReturn::arg_words(op.arg_count()) as usize;
            (
                "CallImmediateWithReturn",
                2 + arg_words,
                format!("fn=@{} argc={} ret_dst={}", bytecode[ip + 1].0, op.arg_count(), op.ret_dst()),
            )
        }
        OpCode::CallSrcWithReturn => {
            let op = CallSrcWithReturn(word);
            let arg_words = CallImmediateNoReturn::arg_words(op.arg_count()) as usize;
            (
                "CallSrcWithReturn",
                1 + arg_words,
                format!("src={} argc={} ret_dst={}", op.src(), op.arg_count(), op.ret_dst()),
            )
        }
        OpCode::LoadDefault => {
            let op = LoadDefault(word);
            if op.is_scalar() {
                ("LoadDefault", 1, format!("dst={} scalar={}", op.dst(), scalar_name(op.scalar_tag())))
            } else {
                let ty = word_to_type(bytecode[ip + 1]);
                ("LoadDefault", 2, format!("dst={} type={}", op.dst(), ty.name))
            }
        }
        OpCode::LoadImmediateScalar => {
            let op = LoadImmediateScalar(word);
            if op.is_wide() {
                (
                    "LoadImmediateScalar",
                    2,
                    format!("dst={} scalar={} value=0x{:016x}", op.dst(), scalar_name(op.scalar_tag()), bytecode[ip + 1].0),
                )
            } else {
                ("LoadImmediateScalar", 1, format!("dst={} scalar={} value={}", op.dst(), scalar_name(op.scalar_tag()), op.immediate()))
            }
        }
        OpCode::MemsetUninitialized => {
            let op = MemsetUninitialized(word);
            ("MemsetUninitialized", 1, format!("dst={} slots={}", op.dst(), op.slots()))
        }
        OpCode::SetType => {
            let op = SetType(word);
            let ty = word_to_type(bytecode[ip + 1]);
            ("SetType", 2, format!("dst={} type={}", op.dst(), ty.name))
        }
        OpCode::SetNullType => {
            let op = SetNullType(word);
            ("SetNullType", 1, format!("dst={}", op.dst()))
        }
        OpCode::Jump => {
            let op = Jump(word);
            ("Jump", 1, format!("target={}", ip as i64 + op.amount() as i64))
        }
        OpCode::JumpIfFalse => {
            let op = JumpIfFalse(word);
            ("JumpIfFalse", 1, format!("src={} target={}", op.src(), ip as i64 + op.amount() as i64))
        }
        OpCode::Destruct => {
            let op = Destruct(word);
            ("Destruct", 1, format!("src={}", op.src()))
        }
    }
}

/// Reinterprets a bytecode word as the `'static` type pointer a
/// non-scalar instruction carries inline. Sound for the same reason
/// `vm::run::word_to_type` is: the Function Builder only ever emits
/// words produced from a `'static` descriptor in `core::types`.
fn word_to_type(word: Bytecode) -> &'static Type {
    unsafe { &*(word.0 as *const Type) }
}

fn scalar_name(tag: u8) -> &'static str {
    match ScalarTag::from_u8(tag) {
        ScalarTag::Bool => "bool",
        ScalarTag::I8 => "i8",
        ScalarTag::I16 => "i16",
        ScalarTag::I32 => "i32",
        ScalarTag::I64 => "i64",
        ScalarTag::U8 => "u8",
        ScalarTag::U16 => "u16",
        ScalarTag::U32 => "u32",
        ScalarTag::U64 => "u64",
        ScalarTag::USize => "usize",
        ScalarTag::F32 => "f32",
        ScalarTag::F64 => "f64",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compiler::compile_source;

    #[test]
    fn return_zero_disassembles_two_lines() {
        let program = compile_source("fn f() { return 0; }").unwrap();
        let tokens = lexer::Tokenizer::create("fn f() { return 0; }").unwrap();
        let text = disassemble_function(&program.functions[0], "fn f() { return 0; }", &tokens);
        assert!(text.contains("== f (params=0 slots=1 align=16) =="));
        assert!(text.contains("LoadImmediateScalar"));
        assert!(text.contains("ReturnValue"));
    }

    #[test]
    fn bare_return_disassembles_one_instruction() {
        let program = compile_source("fn f() { return; }").unwrap();
        let tokens = lexer::Tokenizer::create("fn f() { return; }").unwrap();
        let text = disassemble_function(&program.functions[0], "fn f() { return; }", &tokens);
        assert!(text.contains("Return"));
        assert!(!text.contains("ReturnValue"));
    }

    #[test]
    fn wide_immediate_renders_hex_value() {
        let src = "fn f() { return 9000000000; }";
        let program = compile_source(src).unwrap();
        let tokens = lexer::Tokenizer::create(src).unwrap();
        let text = disassemble_function(&program.functions[0], src, &tokens);
        assert!(text.contains("value=0x"));
    }

    #[test]
    fn program_level_dump_separates_functions_with_blank_line() {
        let src = "fn a() { return; } fn b() { return; }";
        let program = compile_source(src).unwrap();
        let tokens = lexer::Tokenizer::create(src).unwrap();
        let text = disassemble_program(&program, src, &tokens);
        assert!(text.contains("== a "));
        assert!(text.contains("== b "));
    }
}
