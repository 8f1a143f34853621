//! The compiled-program representation handed from the compiler to the
//! interpreter, and read back by the disassembler. One [`CompiledFunction`]
//! per source function; wide immediates (scalars that don't fit the
//! instruction's inline 32-bit field) live inline in `bytecode` as a raw
//! word right after the instruction that references them, not in a
//! separate constant pool — the interpreter's instruction pointer walks
//! straight over them.

use crate::bytecode::Bytecode;
use crate::tokens::TokenIdx;

/// One compiled function: its bytecode body plus the frame layout the
/// interpreter needs to reserve space for it.
#[derive(Debug, Clone, Default)]
pub struct CompiledFunction {
    /// Token of the function's name, for diagnostics and disassembly.
    pub name: TokenIdx,
    pub param_count: u16,
    /// Total stack slots this function's frame needs, parameters
    /// included — analogous to the `frameLength` field a bytecode
    /// `Frame` type conventionally tracks.
    pub stack_slots: u16,
    /// Byte alignment this function's frame requires; always a power of
    /// two, at least the stack's own minimum (16).
    pub stack_align: u16,
    pub bytecode: Vec<Bytecode>,
}

impl CompiledFunction {
    /// Whether this function's body only touches operations that never
    /// need I/O or non-deterministic state — the `comptime_safe` flag a
    /// [`FunctionDescriptor`] carries in the full external interface.
    /// The minimal grammar this workspace compiles (literal returns)
    /// satisfies this unconditionally.
    pub fn comptime_safe(&self) -> bool {
        true
    }
}

/// A fully compiled source file: one function per source-level
/// declaration. Index 0 is always the file's entry point when one is
/// requested by name (`main`), never implied positionally otherwise.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub functions: Vec<CompiledFunction>,
}

impl Program {
    pub fn find(&self, name: &str, source: &str, tokens: &crate::tokens::TokenStream) -> Option<(usize, &CompiledFunction)> {
        self.functions.iter().enumerate().find(|(_, f)| tokens.lexeme(f.name, source) == name)
    }
}
