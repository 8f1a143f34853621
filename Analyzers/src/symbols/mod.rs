//! Per-function symbol tables, in the shape of a `SymbolTableArena`/
//! `SymbolTableBuilder` pair but simplified to the single-file,
//! non-closure scope model this workspace's AST supports: one table per
//! function, no upvalues, no class contexts.

use core::ast::FunctionDefinition;
use core::errors::CompileError;
use core::tokens::TokenIdx;

/// Where a resolved identifier lives. Only `Local` is reachable today —
/// the current grammar has no identifier *expressions* yet, only
/// declarations — but the shape mirrors a conventional `SymRes` so a
/// future `Expression::Identifier` variant slots in without reshaping
/// this table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolResolution {
    Local(u32),
}

/// One function's resolved scope: every declared local (parameters plus
/// body-introduced temporaries) by name, and the resolution recorded for
/// every identifier token that referenced one.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    names: Vec<(String, u32)>,
    pub resolved: Vec<(TokenIdx, SymbolResolution)>,
}

impl SymbolTable {
    /// Builds the symbol table for one function: every entry in its
    /// `locals` table is registered by name, then every identifier
    /// reference in the body is resolved against it (duplicates at the
    /// same scope depth shadow earlier entries, matching the order
    /// `LocalVariables::declare` assigns slots in).
    pub fn build(function: &FunctionDefinition) -> Result<SymbolTable, Vec<CompileError>> {
        let mut table = SymbolTable::default();
        for (idx, local) in function.locals.vars.iter().enumerate() {
            table.names.push((local.name.clone(), idx as u32));
        }

        let errors = Vec::new();
        // The minimal grammar's `Expression` enum has no identifier
        // variant yet (only literals), so there is nothing to resolve
        // inside statement bodies. Once a variant is added, its
        // resolution loop goes here, pushing `CompileUnknownType`-family
        // errors (reused for "unknown identifier") for any name absent
        // from `table.names`.
        let _ = &function.body;

        if errors.is_empty() {
            Ok(table)
        } else {
            Err(errors)
        }
    }

    pub fn resolve(&self, name: &str) -> Option<u32> {
        self.names.iter().rev().find(|(n, _)| n == name).map(|(_, slot)| *slot)
    }

    pub fn local(&self, slot: u32) -> Option<&(String, u32)> {
        self.names.get(slot as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::ast::{LocalVariables, Param};

    fn func_with_params(names: &[&str]) -> FunctionDefinition {
        let mut locals = LocalVariables::default();
        let params = names
            .iter()
            .map(|n| {
                locals.declare(n.to_string(), 0, None);
                Param { name: 0, ty: core::ast::ParsedType { nodes: vec![], root: 0 } }
            })
            .collect();
        FunctionDefinition { name: 0, params, return_type: None, body: vec![], locals }
    }

    #[test]
    fn resolves_declared_param_by_name() {
        let f = func_with_params(&["a", "b"]);
        let table = SymbolTable::build(&f).unwrap();
        assert_eq!(table.resolve("a"), Some(0));
        assert_eq!(table.resolve("b"), Some(1));
        assert_eq!(table.resolve("c"), None);
    }

    #[test]
    fn no_params_builds_empty_table() {
        let f = func_with_params(&[]);
        let table = SymbolTable::build(&f).unwrap();
        assert_eq!(table.resolve("anything"), None);
    }
}
