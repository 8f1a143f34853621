//! `parseStatement` — returns `None` when it encounters the closing `}`
//! of the enclosing block (consuming it), `Some(Statement)` otherwise.

use core::ast::{LocalVariables, Statement};
use core::errors::CompileError;
use core::tokens::TokenKind;

use crate::parse_expressions::parse_expression;
use crate::Parser;

impl<'a> Parser<'a> {
    pub fn parse_statement(&mut self, locals: &mut LocalVariables, scope_depth: u32) -> Result<Option<Statement>, CompileError> {
        if self.matches(TokenKind::RightBraceSymbol) {
            return Ok(None);
        }
        if self.current() == TokenKind::EndOfFile {
            return Err(CompileError::InvalidStatement { at: self.current_loc() });
        }

        if self.matches(TokenKind::ReturnKeyword) {
            return self.parse_return_statement(locals, scope_depth).map(Some);
        }

        let expr = parse_expression(self, locals, None, scope_depth)?;
        self.consume(TokenKind::SemicolonSymbol, |at| CompileError::InvalidStatement { at })?;
        Ok(Some(Statement::Expr(expr)))
    }

    fn parse_return_statement(&mut self, locals: &mut LocalVariables, scope_depth: u32) -> Result<Statement, CompileError> {
        if self.matches(TokenKind::SemicolonSymbol) {
            return Ok(Statement::Return { value: None });
        }
        let value = parse_expression(self, locals, None, scope_depth)?;
        // A value-carrying `return` must be terminated by `;` — left
        // ambiguous upstream, resolved here as a hard parse error.
        self.consume(TokenKind::SemicolonSymbol, |at| CompileError::InvalidStatement { at })?;
        Ok(Statement::Return { value: Some(value) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::tokens::TokenStream;
    use lexer::Tokenizer;

    #[test]
    fn bare_return_has_no_value() {
        let stream: TokenStream = Tokenizer::create("return;").unwrap();
        let mut p = Parser::new(&stream, "return;");
        let mut locals = LocalVariables::default();
        p.matches(TokenKind::ReturnKeyword);
        let stmt = p.parse_return_statement(&mut locals, 0).unwrap();
        assert!(matches!(stmt, Statement::Return { value: None }));
    }

    #[test]
    fn return_zero_compiles_int_literal() {
        let stream: TokenStream = Tokenizer::create("return 0;").unwrap();
        let mut p = Parser::new(&stream, "return 0;");
        let mut locals = LocalVariables::default();
        p.matches(TokenKind::ReturnKeyword);
        let stmt = p.parse_return_statement(&mut locals, 0).unwrap();
        match stmt {
            Statement::Return { value: Some(core::ast::Expression::IntLiteral { value, .. }) } => assert_eq!(value, 0),
            other => panic!("unexpected {other:?}"),
        }
    }
}
