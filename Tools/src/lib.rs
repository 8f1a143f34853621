//! Developer-facing tooling built on top of the compiled program
//! representation: currently just the bytecode disassembler the `nova`
//! binary exposes as `nova disassemble`.
//!
//! Plays the same role a `tools` crate conventionally does: a thin,
//! optional dependency of the VM/CLI layer for developer-facing
//! bytecode introspection.

mod disassembler;

pub use disassembler::{disassemble_function, disassemble_program};
