//! Lowers a parsed, symbol-resolved function body into a
//! [`core::program::CompiledFunction`]: the bytecode-emission pass the
//! workspace calls the Function Builder.
//!
//! Follows a conventional `Compiler::emit_*` helper ladder
//! (`emit_op_code`, `emit_raw_byte`, `emit_raw_short`, `emit_const`),
//! generalized here from byte/short operand widths to this workspace's
//! single 64-bit tagged-operand word, with wide immediates following
//! inline rather than living in a side constant pool.

use log::debug;

use analyzers::symbols::SymbolTable;
use core::ast::{Expression, FileAst, FunctionDefinition, Statement};
use core::bytecode::{operands, Bytecode, OpCode, ScalarTag};
use core::errors::CompileError;
use core::program::{CompiledFunction, Program};
use core::stack::MIN_ALIGNMENT;
use parser::Parser;

/// Tokenizes, parses, resolves symbols, and compiles an entire source
/// file in one call — the convenience entry point `nova run`/`nova
/// disassemble` and the integration tests use.
pub fn compile_source(source: &str) -> Result<Program, Vec<CompileError>> {
    let ast = Parser::parse_source(source)?;
    compile_file(&ast)
}

/// Compiles an already-parsed file. Every function is resolved and
/// compiled independently; errors from every function are collected
/// before returning, rather than stopping at the first failure.
pub fn compile_file(ast: &FileAst) -> Result<Program, Vec<CompileError>> {
    let mut functions = Vec::with_capacity(ast.functions.len());
    let mut errors = Vec::new();

    for function in &ast.functions {
        match SymbolTable::build(function) {
            Ok(symbols) => match FunctionBuilder::compile(function, &symbols) {
                Ok(compiled) => functions.push(compiled),
                Err(mut e) => errors.append(&mut e),
            },
            Err(mut e) => errors.append(&mut e),
        }
    }

    if errors.is_empty() {
        debug!("compiled {} function(s)", functions.len());
        Ok(Program { functions })
    } else {
        debug!("compilation failed with {} error(s)", errors.len());
        Err(errors)
    }
}

/// Per-function bytecode emission state. One `FunctionBuilder` compiles
/// exactly one [`FunctionDefinition`] into one [`CompiledFunction`].
pub struct FunctionBuilder<'a> {
    function: &'a FunctionDefinition,
    /// Unused by the current minimal grammar (no identifier
    /// expressions yet to resolve), but threaded through so a future
    /// `Expression::Identifier` variant's lowering has it in scope
    /// without reshaping this type.
    #[allow(dead_code)]
    symbols: &'a SymbolTable,
    bytecode: Vec<Bytecode>,
    errors: Vec<CompileError>,
}

impl<'a> FunctionBuilder<'a> {
    pub fn compile(function: &'a FunctionDefinition, symbols: &'a SymbolTable) -> Result<CompiledFunction, Vec<CompileError>> {
        let mut builder = FunctionBuilder { function, symbols, bytecode: Vec::new(), errors: Vec::new() };

        for stmt in &function.body {
            builder.compile_statement(stmt);
        }
        // A function body that falls off the end without an explicit
        // `return` still needs a frame pop; the source language requires
        // every path to return (checked elsewhere), this is just the
        // fallback so `FunctionBuilder::compile` never leaves a function
        // without a terminating instruction.
        if !matches!(function.body.last(), Some(Statement::Return { .. })) {
            builder.emit_op(OpCode::Return);
        }

        if !builder.errors.is_empty() {
            return Err(builder.errors);
        }

        Ok(CompiledFunction {
            name: function.name,
            param_count: function.params.len() as u16,
            stack_slots: function.locals.vars.len() as u16,
            stack_align: MIN_ALIGNMENT as u16,
            bytecode: builder.bytecode,
        })
    }

    fn compile_statement(&mut self, stmt: &Statement) {
        match stmt {
            Statement::Return { value: None } => self.emit_op(OpCode::Return),
            Statement::Return { value: Some(expr) } => {
                self.compile_expression(expr);
                self.emit_op_with_operands(operands::ReturnValue::new(expr.dst() as u16).0);
            }
            Statement::Expr(expr) => self.compile_expression(expr),
        }
    }

    fn compile_expression(&mut self, expr: &Expression) {
        match expr {
            Expression::BoolLiteral { value, dst, .. } => self.emit_scalar_immediate(ScalarTag::Bool, *dst as u16, *value as u64),
            Expression::IntLiteral { value, dst, .. } => self.emit_scalar_immediate(ScalarTag::I64, *dst as u16, *value as u64),
            Expression::FloatLiteral { value, dst, .. } => self.emit_scalar_immediate(ScalarTag::F64, *dst as u16, value.to_bits()),
            // `token` is a `TokenIdx`, not a byte offset — the builder has
            // no source text or token stream in scope to resolve it
            // properly. Good enough for a diagnostic until the string
            // object model lands and this path has real work to do.
            Expression::StringLiteral { token, .. } => self.errors.push(CompileError::StringLiteralUnsupported { at: *token }),
        }
    }

    /// Emits the single-word form when `bits` fits the inline 32-bit
    /// field, otherwise the wide form followed by a raw word carrying
    /// the full 64-bit pattern.
    fn emit_scalar_immediate(&mut self, tag: ScalarTag, dst: u16, bits: u64) {
        if tag.immediate_fits_inline(bits) {
            self.emit_op_with_operands(operands::LoadImmediateScalar::new(tag, dst, bits as u32).0);
        } else {
            self.emit_op_with_operands(operands::LoadImmediateScalar::new_wide(tag, dst).0);
            self.emit_wide(bits);
        }
    }

    fn emit_op(&mut self, op: OpCode) {
        self.bytecode.push(Bytecode(op as u64));
    }

    fn emit_op_with_operands(&mut self, word: Bytecode) {
        self.bytecode.push(word);
    }

    fn emit_wide(&mut self, word: u64) {
        self.bytecode.push(Bytecode(word));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::bytecode::operands::{LoadImmediateScalar, ReturnValue};

    fn compile_one(source: &str) -> CompiledFunction {
        let program = compile_source(source).unwrap();
        program.functions.into_iter().next().unwrap()
    }

    #[test]
    fn return_zero_compiles_to_load_then_return_value() {
        let f = compile_one("fn f() { return 0; }");
        assert_eq!(f.bytecode.len(), 2);

        let load = LoadImmediateScalar(f.bytecode[0]);
        assert_eq!(f.bytecode[0].opcode(), OpCode::LoadImmediateScalar);
        assert_eq!(load.scalar_tag(), ScalarTag::I64 as u8);
        assert_eq!(load.dst(), 0);
        assert_eq!(load.immediate(), 0);
        assert!(!load.is_wide());

        assert_eq!(f.bytecode[1].opcode(), OpCode::ReturnValue);
        assert_eq!(ReturnValue(f.bytecode[1]).src(), 0);
    }

    #[test]
    fn bare_return_compiles_to_single_op() {
        let f = compile_one("fn f() { return; }");
        assert_eq!(f.bytecode.len(), 1);
        assert_eq!(f.bytecode[0].opcode(), OpCode::Return);
    }

    #[test]
    fn large_int_literal_uses_wide_word() {
        let f = compile_one("fn f() { return 9000000000; }");
        assert_eq!(f.bytecode.len(), 3);
        let load = LoadImmediateScalar(f.bytecode[0]);
        assert!(load.is_wide());
        assert_eq!(f.bytecode[1].0, 9000000000i64 as u64);
        assert_eq!(f.bytecode[2].opcode(), OpCode::ReturnValue);
    }

    #[test]
    fn float_literal_always_uses_wide_word() {
        let f = compile_one("fn f() { return 1.5; }");
        let load = LoadImmediateScalar(f.bytecode[0]);
        assert!(load.is_wide());
        assert_eq!(f64::from_bits(f.bytecode[1].0), 1.5);
    }

    #[test]
    fn function_with_no_body_falls_through_to_return() {
        let f = compile_one("fn f() { }");
        assert_eq!(f.bytecode.len(), 1);
        assert_eq!(f.bytecode[0].opcode(), OpCode::Return);
    }

    #[test]
    fn string_literal_reports_unsupported() {
        let err = compile_source("fn f() { \"hi\"; }").unwrap_err();
        assert!(matches!(err[0], CompileError::StringLiteralUnsupported { .. }));
    }
}
