//! `Expression::parse` — the current minimal grammar: boolean, integer,
//! float, and string literals, each writing into a destination variable
//! slot that is either caller-supplied or a freshly allocated temporary.

use core::ast::{Expression, LocalVariables};
use core::errors::CompileError;
use core::tokens::TokenKind;
use core::utils::{evaluate_numeric_literal, NumericValue};

use crate::Parser;

/// Parses one expression, writing its result into `dst_var` if supplied,
/// or a freshly appended temporary slot otherwise.
pub fn parse_expression(p: &mut Parser, locals: &mut LocalVariables, dst_var: Option<u32>, scope_depth: u32) -> Result<Expression, CompileError> {
    match p.current() {
        TokenKind::TrueKeyword => {
            let token = p.advance();
            let dst = dst_var.unwrap_or_else(|| locals.declare_temp("true", scope_depth));
            Ok(Expression::BoolLiteral { token, value: true, dst })
        }
        TokenKind::FalseKeyword => {
            let token = p.advance();
            let dst = dst_var.unwrap_or_else(|| locals.declare_temp("false", scope_depth));
            Ok(Expression::BoolLiteral { token, value: false, dst })
        }
        TokenKind::NumberLiteral => {
            let token = p.advance();
            let lexeme = p.lexeme(token);
            let value = evaluate_numeric_literal(lexeme, p.stream.token(token).location())?;
            match value {
                NumericValue::Float64(f) => {
                    let dst = dst_var.unwrap_or_else(|| locals.declare_temp("float", scope_depth));
                    Ok(Expression::FloatLiteral { token, value: f, dst })
                }
                other => {
                    let at = p.stream.token(token).location();
                    let dst = dst_var.unwrap_or_else(|| locals.declare_temp("int", scope_depth));
                    Ok(Expression::IntLiteral { token, value: other.as_signed(at)?, dst })
                }
            }
        }
        TokenKind::StringLiteral => {
            let token = p.advance();
            let dst = dst_var.unwrap_or_else(|| locals.declare_temp("str", scope_depth));
            Ok(Expression::StringLiteral { token, dst })
        }
        _ => Err(CompileError::InvalidExpression { at: p.current_loc() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::tokens::TokenStream;
    use lexer::Tokenizer;

    fn parse(src: &str) -> Expression {
        let stream: TokenStream = Tokenizer::create(src).unwrap();
        let mut p = Parser::new(&stream, src);
        let mut locals = LocalVariables::default();
        parse_expression(&mut p, &mut locals, None, 0).unwrap()
    }

    #[test]
    fn bool_literal_true() {
        assert!(matches!(parse("true"), Expression::BoolLiteral { value: true, .. }));
    }

    #[test]
    fn bool_literal_false() {
        assert!(matches!(parse("false"), Expression::BoolLiteral { value: false, .. }));
    }

    #[test]
    fn int_literal() {
        match parse("0") {
            Expression::IntLiteral { value, .. } => assert_eq!(value, 0),
            other => panic!("expected IntLiteral, got {other:?}"),
        }
    }

    #[test]
    fn float_literal() {
        assert!(matches!(parse("1.5"), Expression::FloatLiteral { .. }));
    }
}
