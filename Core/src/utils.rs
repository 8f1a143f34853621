//! Free-standing helpers shared across the pipeline: numeric literal
//! evaluation and line/column resolution for a [`crate::errors::SourceLoc`].

use crate::errors::CompileError;

/// The three shapes a scanned numeric literal can end up as. Computed by
/// [`evaluate_numeric_literal`] from the literal's raw text — the
/// tokenizer itself only records the literal's span, not its value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumericValue {
    Unsigned64(u64),
    Signed64(i64),
    Float64(f64),
}

impl NumericValue {
    pub fn as_unsigned(&self, at: u32) -> Result<u64, CompileError> {
        match *self {
            NumericValue::Unsigned64(v) => Ok(v),
            NumericValue::Signed64(v) if v >= 0 => Ok(v as u64),
            NumericValue::Signed64(_) => Err(CompileError::NegativeToUnsignedInt { at }),
            NumericValue::Float64(f) if f >= 0.0 && f <= u64::MAX as f64 => Ok(f as u64),
            NumericValue::Float64(_) => Err(CompileError::FloatOutsideIntRange { at }),
        }
    }

    pub fn as_signed(&self, at: u32) -> Result<i64, CompileError> {
        match *self {
            NumericValue::Signed64(v) => Ok(v),
            NumericValue::Unsigned64(v) if v <= i64::MAX as u64 => Ok(v as i64),
            NumericValue::Unsigned64(_) => Err(CompileError::UnsignedOutsideIntRange { at }),
            NumericValue::Float64(f) if f >= i64::MIN as f64 && f <= i64::MAX as f64 => Ok(f as i64),
            NumericValue::Float64(_) => Err(CompileError::FloatOutsideIntRange { at }),
        }
    }

    pub fn as_float(&self) -> f64 {
        match *self {
            NumericValue::Unsigned64(v) => v as f64,
            NumericValue::Signed64(v) => v as f64,
            NumericValue::Float64(f) => f,
        }
    }
}

/// Evaluates the byte range of a numeric literal (as scanned by the
/// tokenizer, including an optional leading `-`) into a [`NumericValue`].
///
/// ```bnf
/// NUMBER_LITERAL ::= "-"? (HEX_LITERAL | BIN_LITERAL | DEC_LITERAL)
/// HEX_LITERAL    ::= ("0x" | "0X") HEX_DIGIT+
/// BIN_LITERAL    ::= ("0b" | "0B") ("0" | "1")+
/// DEC_LITERAL    ::= DIGIT+ ("." DIGIT*)?
/// ```
///
/// Accumulates the integer part as `u64` until a multiply or add would
/// overflow, at which point the whole literal is re-parsed as `f64`. A
/// leading `-` forces a signed interpretation unless the magnitude
/// exceeds `i64::MIN`, in which case it's promoted to `f64` instead.
/// Underscores are not accepted inside a literal (the tokenizer's scanner
/// never includes one in the span it hands here).
pub fn evaluate_numeric_literal(lexeme: &str, at: u32) -> Result<NumericValue, CompileError> {
    let (negative, rest) = match lexeme.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, lexeme),
    };

    if let Some(hex) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
        let v = u64::from_str_radix(hex, 16).map_err(|_| CompileError::InvalidDecimalNumberLiteral { at })?;
        return finish_integer(v, negative, at);
    }
    if let Some(bin) = rest.strip_prefix("0b").or_else(|| rest.strip_prefix("0B")) {
        let v = u64::from_str_radix(bin, 2).map_err(|_| CompileError::InvalidDecimalNumberLiteral { at })?;
        return finish_integer(v, negative, at);
    }

    if rest.contains('.') {
        let f: f64 = rest.parse().map_err(|_| CompileError::InvalidDecimalNumberLiteral { at })?;
        return Ok(NumericValue::Float64(if negative { -f } else { f }));
    }

    let mut acc: u64 = 0;
    let mut overflowed = false;
    for c in rest.chars() {
        let digit = c.to_digit(10).ok_or(CompileError::InvalidDecimalNumberLiteral { at })? as u64;
        if !overflowed {
            match acc.checked_mul(10).and_then(|v| v.checked_add(digit)) {
                Some(v) => acc = v,
                None => overflowed = true,
            }
        }
    }

    if overflowed {
        let f: f64 = rest.parse().map_err(|_| CompileError::InvalidDecimalNumberLiteral { at })?;
        return Ok(NumericValue::Float64(if negative { -f } else { f }));
    }

    finish_integer(acc, negative, at)
}

fn finish_integer(magnitude: u64, negative: bool, _at: u32) -> Result<NumericValue, CompileError> {
    if !negative {
        return Ok(NumericValue::Unsigned64(magnitude));
    }
    // i64::MIN's magnitude is 2^63, which doesn't fit in an i64 itself;
    // compute the negation in i128 to avoid that edge overflowing.
    let signed = -(magnitude as i128);
    if signed >= i64::MIN as i128 {
        Ok(NumericValue::Signed64(signed as i64))
    } else {
        Ok(NumericValue::Float64(-(magnitude as f64)))
    }
}

/// A (1-based line, 0-based column) position, computed lazily by
/// scanning line breaks rather than tracked incrementally during lexing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineCol {
    pub line: u32,
    pub col: u32,
}

/// Resolves an absolute byte offset into a (line, column) pair by
/// scanning for newlines. Intended for error reporting, where the cost
/// of a linear scan per error is negligible compared to recomputing it
/// incrementally during every tokenizer step.
pub fn line_col(source: &str, offset: u32) -> LineCol {
    let offset = offset as usize;
    let mut line = 1u32;
    let mut line_start = 0usize;
    for (i, b) in source.as_bytes().iter().enumerate() {
        if i >= offset {
            break;
        }
        if *b == b'\n' {
            line += 1;
            line_start = i + 1;
        }
    }
    LineCol { line, col: (offset - line_start) as u32 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_decimal_is_unsigned() {
        assert_eq!(evaluate_numeric_literal("0", 0).unwrap(), NumericValue::Unsigned64(0));
        assert_eq!(evaluate_numeric_literal("42", 0).unwrap(), NumericValue::Unsigned64(42));
    }

    #[test]
    fn negative_decimal_is_signed() {
        assert_eq!(evaluate_numeric_literal("-9", 0).unwrap(), NumericValue::Signed64(-9));
    }

    #[test]
    fn negative_float_literal() {
        assert_eq!(evaluate_numeric_literal("-1.1", 0).unwrap(), NumericValue::Float64(-1.1));
    }

    #[test]
    fn overflowing_decimal_promotes_to_float() {
        let huge = "99999999999999999999999999";
        match evaluate_numeric_literal(huge, 0).unwrap() {
            NumericValue::Float64(_) => {}
            other => panic!("expected Float64, got {other:?}"),
        }
    }

    #[test]
    fn hex_and_binary_literals() {
        assert_eq!(evaluate_numeric_literal("0xFF", 0).unwrap(), NumericValue::Unsigned64(255));
        assert_eq!(evaluate_numeric_literal("0b101", 0).unwrap(), NumericValue::Unsigned64(5));
    }

    #[test]
    fn line_col_resolves_across_newlines() {
        let src = "abc\ndef\nghi";
        assert_eq!(line_col(src, 0), LineCol { line: 1, col: 0 });
        assert_eq!(line_col(src, 5), LineCol { line: 2, col: 1 });
        assert_eq!(line_col(src, 9), LineCol { line: 3, col: 1 });
    }
}
