//! Symbol resolution: given a parsed file, build one symbol table per
//! function scope, resolving every identifier expression to a local
//! variable slot or a compile error.

pub mod symbols;

pub use symbols::SymbolTable;
