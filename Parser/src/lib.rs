//! Recursive-descent parser producing a [`core::ast::FileAst`] from a
//! token stream. Single-pass: local variable slots are allocated as
//! statements/expressions are parsed, but symbol *resolution* (binding
//! identifier expressions to those slots) is left to the `analyzers`
//! crate, which runs over the finished AST.

use log::debug;

use core::ast::*;
use core::errors::CompileError;
use core::tokens::{TokenIdx, TokenKind, TokenStream};
use lexer::Tokenizer;

mod parse_expressions;
mod parse_statements;
mod parse_types;

pub use parse_types::parse_type;

/// A forward-only cursor over a [`TokenStream`], with one token of
/// lookahead. Parser methods read `current()`/`peek()` and call
/// `advance()` to consume, following the conventional token-index
/// bookkeeping but operating on this crate's packed token representation.
pub struct Parser<'a> {
    pub stream: &'a TokenStream,
    pub source: &'a str,
    pos: TokenIdx,
}

impl<'a> Parser<'a> {
    pub fn new(stream: &'a TokenStream, source: &'a str) -> Self {
        Parser { stream, source, pos: 0 }
    }

    /// Tokenizes `source` and parses it in one call; convenience entry
    /// point for callers that don't need the intermediate token stream
    /// (tests, the `nova` CLI's `ast` subcommand).
    pub fn parse_source(source: &'a str) -> Result<FileAst, Vec<CompileError>> {
        let stream = Tokenizer::create(source).map_err(|e| vec![e])?;
        // Leaking here would be wrong for a long-lived embedder, but every
        // caller of this convenience entry point is short-lived (tests,
        // one-shot CLI invocations), so tying the stream's lifetime to a
        // local is fine.
        let stream: &'a TokenStream = Box::leak(Box::new(stream));
        let mut parser = Parser::new(stream, source);
        parser.parse_file()
    }

    pub fn current(&self) -> TokenKind {
        self.stream.token(self.pos).kind()
    }

    pub fn current_idx(&self) -> TokenIdx {
        self.pos
    }

    pub fn current_loc(&self) -> u32 {
        self.stream.token(self.pos).location()
    }

    pub fn peek(&self) -> TokenKind {
        if self.pos + 1 >= self.stream.len() as TokenIdx {
            TokenKind::EndOfFile
        } else {
            self.stream.token(self.pos + 1).kind()
        }
    }

    pub fn advance(&mut self) -> TokenIdx {
        let idx = self.pos;
        if self.pos + 1 < self.stream.len() as TokenIdx {
            self.pos += 1;
        }
        idx
    }

    pub fn check(&self, kind: TokenKind) -> bool {
        self.current() == kind
    }

    pub fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub fn consume(&mut self, kind: TokenKind, err_at_current: fn(u32) -> CompileError) -> Result<TokenIdx, CompileError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(err_at_current(self.current_loc()))
        }
    }

    pub fn lexeme(&self, idx: TokenIdx) -> &'a str {
        self.stream.lexeme(idx, self.source)
    }

    /// `parseFile`: top-level declarations until `EndOfFile`.
    pub fn parse_file(&mut self) -> Result<FileAst, Vec<CompileError>> {
        let mut ast = FileAst::new();
        let mut errors = Vec::new();

        while self.current() != TokenKind::EndOfFile {
            match self.current() {
                TokenKind::FnKeyword => match self.parse_function() {
                    Ok(f) => ast.functions.push(f),
                    Err(e) => {
                        errors.push(e);
                        self.synchronize();
                    }
                },
                TokenKind::StructKeyword => match self.parse_struct() {
                    Ok(s) => ast.structs.push(s),
                    Err(e) => {
                        errors.push(e);
                        self.synchronize();
                    }
                },
                _ => {
                    errors.push(CompileError::InvalidStatement { at: self.current_loc() });
                    self.synchronize();
                }
            }
        }

        if errors.is_empty() {
            debug!("parsed {} function(s), {} struct(s)", ast.functions.len(), ast.structs.len());
            Ok(ast)
        } else {
            debug!("parse failed with {} error(s)", errors.len());
            Err(errors)
        }
    }

    /// Skips tokens until a likely declaration boundary, so a single
    /// malformed top-level item doesn't cascade into spurious errors for
    /// everything after it.
    fn synchronize(&mut self) {
        loop {
            match self.current() {
                TokenKind::EndOfFile | TokenKind::FnKeyword | TokenKind::StructKeyword => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn parse_struct(&mut self) -> Result<StructDefinition, CompileError> {
        self.advance(); // `struct`
        let name = self.consume(TokenKind::Identifier, |at| CompileError::InvalidStatement { at })?;
        self.consume(TokenKind::LeftBraceSymbol, |at| CompileError::InvalidStatement { at })?;

        let mut fields = Vec::new();
        while !self.check(TokenKind::RightBraceSymbol) && self.current() != TokenKind::EndOfFile {
            let field_name = self.consume(TokenKind::Identifier, |at| CompileError::InvalidStatement { at })?;
            self.consume(TokenKind::ColonSymbol, |at| CompileError::InvalidStatement { at })?;
            let ty = parse_type(self)?;
            fields.push(StructField { name: field_name, ty });
            if !self.matches(TokenKind::CommaSymbol) {
                break;
            }
        }
        self.consume(TokenKind::RightBraceSymbol, |at| CompileError::InvalidStatement { at })?;
        Ok(StructDefinition { name, fields })
    }

    fn parse_function(&mut self) -> Result<FunctionDefinition, CompileError> {
        self.advance(); // `fn`
        let name = self.consume(TokenKind::Identifier, |at| CompileError::InvalidFunctionSignature { at })?;
        self.consume(TokenKind::LeftParenthesesSymbol, |at| CompileError::InvalidFunctionSignature { at })?;

        let mut locals = LocalVariables::default();
        let mut params = Vec::new();
        while !self.check(TokenKind::RightParenthesesSymbol) {
            let pname = self.consume(TokenKind::Identifier, |at| CompileError::InvalidFunctionSignature { at })?;
            self.consume(TokenKind::ColonSymbol, |at| CompileError::InvalidFunctionSignature { at })?;
            let ty = parse_type(self)?;
            locals.declare(self.lexeme(pname).to_string(), 0, Some(ty.clone()));
            params.push(Param { name: pname, ty });
            if !self.matches(TokenKind::CommaSymbol) {
                break;
            }
        }
        self.consume(TokenKind::RightParenthesesSymbol, |at| CompileError::InvalidFunctionSignature { at })?;

        let return_type = if self.matches(TokenKind::ColonSymbol) { Some(parse_type(self)?) } else { None };

        self.consume(TokenKind::LeftBraceSymbol, |at| CompileError::InvalidFunctionSignature { at })?;
        let mut body = Vec::new();
        while let Some(stmt) = self.parse_statement(&mut locals, 1)? {
            body.push(stmt);
        }

        Ok(FunctionDefinition { name, params, return_type, body, locals })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_source_has_no_declarations() {
        let ast = Parser::parse_source("").unwrap();
        assert!(ast.functions.is_empty());
        assert!(ast.structs.is_empty());
    }

    #[test]
    fn function_with_bare_return_parses() {
        let ast = Parser::parse_source("fn f() { return; }").unwrap();
        assert_eq!(ast.functions.len(), 1);
        assert_eq!(ast.functions[0].body.len(), 1);
        assert!(matches!(ast.functions[0].body[0], Statement::Return { value: None }));
    }

    #[test]
    fn return_without_semicolon_is_invalid_statement() {
        let stream = Tokenizer::create("fn f() { return 0 }").unwrap();
        let src = "fn f() { return 0 }";
        let mut p = Parser::new(&stream, src);
        let err = p.parse_file().unwrap_err();
        assert!(matches!(err[0], CompileError::InvalidStatement { .. }));
    }
}
