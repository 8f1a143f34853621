//! The closed error taxonomy shared by every stage of the pipeline.
//!
//! Compile-time failures are reported as [`CompileError`]; anything raised
//! while bytecode is executing is a [`ProgramRuntimeError`]. Neither type
//! recovers on its own — callers propagate with `?` and decide what to do
//! at the boundary (CLI, test harness, embedder).

/// Absolute byte offset into the source text a [`CompileError`] refers to.
pub type SourceLoc = u32;

/// Every way compilation (tokenizing, parsing, symbol resolution, or
/// bytecode emission) can fail.
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum CompileError {
    #[error("out of memory")]
    OutOfMemory,

    #[error("source file is {size} bytes, exceeding the maximum of {max}")]
    FileTooBig { size: usize, max: usize },

    #[error("cannot represent a negative literal as an unsigned integer type")]
    NegativeToUnsignedInt { at: SourceLoc },

    #[error("literal value does not fit in the target signed integer type")]
    UnsignedOutsideIntRange { at: SourceLoc },

    #[error("literal value does not fit in the target integer type")]
    FloatOutsideIntRange { at: SourceLoc },

    #[error("invalid decimal number literal")]
    InvalidDecimalNumberLiteral { at: SourceLoc },

    #[error("invalid number literal in char position")]
    InvalidCharNumberLiteral { at: SourceLoc },

    #[error("too many characters in char literal")]
    TooManyCharsInCharLiteral { at: SourceLoc },

    #[error("unsupported character in source")]
    UnsupportedChar { at: SourceLoc },

    #[error("unterminated string literal")]
    UnterminatedStringLiteral { at: SourceLoc },

    #[error("unterminated char literal")]
    UnterminatedCharLiteral { at: SourceLoc },

    #[error("invalid escape sequence")]
    InvalidEscapeSequence { at: SourceLoc },

    #[error("invalid function signature")]
    InvalidFunctionSignature { at: SourceLoc },

    #[error("invalid statement inside a function body")]
    InvalidFunctionStatement { at: SourceLoc },

    #[error("invalid expression")]
    InvalidExpression { at: SourceLoc },

    #[error("invalid statement")]
    InvalidStatement { at: SourceLoc },

    #[error("unknown or malformed type")]
    CompileUnknownType { at: SourceLoc },

    #[error("string literal bytecode emission requires a heap string object model, which is out of scope here")]
    StringLiteralUnsupported { at: SourceLoc },
}

impl CompileError {
    /// The byte offset this error refers to, if it has one — `OutOfMemory`
    /// and `FileTooBig` aren't tied to a specific location in the source.
    /// Callers that need a line/column for display pass this to
    /// [`crate::utils::line_col`].
    pub fn location(&self) -> Option<SourceLoc> {
        use CompileError::*;
        match *self {
            OutOfMemory | FileTooBig { .. } => None,
            NegativeToUnsignedInt { at }
            | UnsignedOutsideIntRange { at }
            | FloatOutsideIntRange { at }
            | InvalidDecimalNumberLiteral { at }
            | InvalidCharNumberLiteral { at }
            | TooManyCharsInCharLiteral { at }
            | UnsupportedChar { at }
            | UnterminatedStringLiteral { at }
            | UnterminatedCharLiteral { at }
            | InvalidEscapeSequence { at }
            | InvalidFunctionSignature { at }
            | InvalidFunctionStatement { at }
            | InvalidExpression { at }
            | InvalidStatement { at }
            | CompileUnknownType { at }
            | StringLiteralUnsupported { at } => Some(at),
        }
    }
}

/// Failures raised while bytecode is executing. `Ok(())` stands in for the
/// source system's `ProgramRuntimeError::None` — there is no explicit "ok"
/// variant here because `Result` already carries that distinction.
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum ProgramRuntimeError {
    #[error("stack overflow")]
    StackOverflow,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_is_none_for_size_errors() {
        assert_eq!(CompileError::OutOfMemory.location(), None);
        assert_eq!(CompileError::FileTooBig { size: 1, max: 0 }.location(), None);
    }

    #[test]
    fn location_is_some_for_positioned_errors() {
        assert_eq!(CompileError::InvalidStatement { at: 7 }.location(), Some(7));
    }
}
