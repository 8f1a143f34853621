//! The bytecode interpreter: a dispatch loop over [`core::program::Program`]
//! functions, driving a [`core::stack::Stack`].
//!
//! Built around a `VM` struct and its `run` dispatch loop, generalized
//! from a conventional byte-indexed `Chunk`/`Value`/`Object` model to
//! this workspace's 64-bit tagged-operand words and paged value+type
//! stack.

mod run;

use core::errors::ProgramRuntimeError;
use core::program::Program;
use core::stack::Stack;
use log::debug;

/// One interpreter instance executing against a single compiled
/// [`Program`]. Each call starts a fresh [`Stack`] — there is no
/// persistent global state between independent top-level calls: one
/// `Vm` per `interpret` lifecycle.
pub struct Vm<'p> {
    stack: Stack,
    program: &'p Program,
}

impl<'p> Vm<'p> {
    pub fn new(program: &'p Program) -> Self {
        Vm { stack: Stack::new(), program }
    }

    /// Runs `function_index` as the program's entry point (no arguments)
    /// to completion, returning the raw bit pattern of its return value,
    /// or `None` if it returned with a bare `return;`/fell off the end.
    pub fn call(&mut self, function_index: usize) -> Result<Option<u64>, ProgramRuntimeError> {
        let f = &self.program.functions[function_index];
        debug!("entering function_index={function_index} stack_slots={}", f.stack_slots);
        self.stack.push_function_frame(function_index as u32, f.stack_slots as usize, f.stack_align as usize, None)?;
        self.run()
    }
}
