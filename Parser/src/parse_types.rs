//! The parsed-type sub-grammar: a four-state machine
//! (`CollectPrefixOrGetNamed → { CollectPostfix, DoneParse, GetNamedOnly }`)
//! building a [`ParsedType`] tree node-by-node. Prefix tokens push wrapper
//! nodes (`Nullable`, `Pointer`, `Slice`, `Dyn`, `Unique`, `Shared`,
//! `Weak`, `StaticArray`, `Tuple`); the named type (identifier or
//! primitive) seals the tree; postfix `!` chains `ErrorUnion` by
//! rerooting; `(...)` after a named type opens generic-argument mode.

use core::ast::{ParsedType, ParsedTypeNode, ParsedTypeTag};
use core::errors::CompileError;
use core::tokens::TokenKind;

use crate::Parser;

/// Generic-argument contexts nest at most this deep; beyond it the whole
/// type is rejected rather than growing the node vector unboundedly.
const MAX_GENERIC_DEPTH: usize = 32;

enum State {
    CollectPrefixOrGetNamed,
    CollectPostfix,
    DoneParse,
}

pub fn parse_type(p: &mut Parser) -> Result<ParsedType, CompileError> {
    parse_type_at_depth(p, 0)
}

/// `depth` is the generic-argument *nesting* depth this type is parsed
/// at — incremented once per recursive descent into a generic argument
/// or tuple element, not per `(...)` group on a single node, so
/// `Vec(Vec(Vec(...)))` is correctly bounded rather than only repeated
/// `T(...)  (...)  (...)` chains on the same named type.
fn parse_type_at_depth(p: &mut Parser, depth: usize) -> Result<ParsedType, CompileError> {
    if depth > MAX_GENERIC_DEPTH {
        return Err(CompileError::CompileUnknownType { at: p.current_loc() });
    }

    let mut nodes: Vec<ParsedTypeNode> = Vec::new();
    let mut root: Option<u32> = None;
    let mut pending_parent: Option<u32> = None;
    let mut state = State::CollectPrefixOrGetNamed;

    loop {
        match state {
            State::CollectPrefixOrGetNamed => {
                let tag = match p.current() {
                    TokenKind::OptionalSymbol => ParsedTypeTag::Nullable,
                    TokenKind::AsteriskSymbol => ParsedTypeTag::Pointer,
                    TokenKind::LeftBracketSymbol if p.peek() == TokenKind::RightBracketSymbol => ParsedTypeTag::Slice,
                    TokenKind::LeftBracketSymbol => {
                        // `[N]T` — static array; N is an integer literal read
                        // directly (not through the generic-argument stack).
                        p.advance();
                        let lit_idx = p.consume(TokenKind::NumberLiteral, |at| CompileError::CompileUnknownType { at })?;
                        p.consume(TokenKind::RightBracketSymbol, |at| CompileError::CompileUnknownType { at })?;
                        let span = p.stream.token(lit_idx).location()..p.stream.end(lit_idx);
                        let mut node = ParsedTypeNode::wrapper(ParsedTypeTag::StaticArray, false, None);
                        node.expression = Some(span);
                        let idx = push_node(&mut nodes, node, &mut root, &mut pending_parent);
                        pending_parent = Some(idx);
                        continue;
                    }
                    TokenKind::DynKeyword => ParsedTypeTag::Dyn,
                    TokenKind::UniqueKeyword => ParsedTypeTag::Unique,
                    TokenKind::SharedKeyword => ParsedTypeTag::Shared,
                    TokenKind::WeakKeyword => ParsedTypeTag::Weak,
                    TokenKind::LeftParenthesesSymbol => {
                        p.advance();
                        return parse_tuple(p, nodes, root, pending_parent, depth);
                    }
                    _ => {
                        let named = parse_named(p)?;
                        let idx = push_node(&mut nodes, named, &mut root, &mut pending_parent);
                        pending_parent = Some(idx);
                        state = State::CollectPostfix;
                        continue;
                    }
                };
                p.advance();
                let lifetime = parse_optional_lifetime(p);
                let mutable = p.matches(TokenKind::MutKeyword);
                let node = ParsedTypeNode::wrapper(tag, mutable, lifetime);
                let idx = push_node(&mut nodes, node, &mut root, &mut pending_parent);
                pending_parent = Some(idx);
            }
            State::CollectPostfix => {
                if p.matches(TokenKind::ExclamationSymbol) {
                    // Error-union reroot: the previous root becomes the
                    // left child of a fresh ErrorUnion node, whose right
                    // child is the type that follows `!`.
                    let mut node = ParsedTypeNode::wrapper(ParsedTypeTag::ErrorUnion, false, None);
                    let left = root.ok_or(CompileError::CompileUnknownType { at: p.current_loc() })?;
                    if nodes[left as usize].tag == ParsedTypeTag::ErrorUnion {
                        // `A!B!C` — repeated chaining on an already-rooted
                        // error union is rejected rather than nested.
                        return Err(CompileError::CompileUnknownType { at: p.current_loc() });
                    }
                    node.children.push(left);
                    let right = parse_named(p)?;
                    let ridx = nodes.len() as u32;
                    nodes.push(right);
                    node.children.push(ridx);
                    let idx = nodes.len() as u32;
                    nodes.push(node);
                    root = Some(idx);
                    pending_parent = Some(idx);
                } else if p.current() == TokenKind::LeftParenthesesSymbol {
                    p.advance();
                    let parent = pending_parent.ok_or(CompileError::CompileUnknownType { at: p.current_loc() })?;
                    parse_generic_args(p, &mut nodes, parent, depth)?;
                } else {
                    state = State::DoneParse;
                    continue;
                }
            }
            State::DoneParse => break,
        }
    }

    let root = root.ok_or(CompileError::CompileUnknownType { at: p.current_loc() })?;
    Ok(ParsedType { nodes, root })
}

fn push_node(nodes: &mut Vec<ParsedTypeNode>, node: ParsedTypeNode, root: &mut Option<u32>, pending_parent: &mut Option<u32>) -> u32 {
    let idx = nodes.len() as u32;
    nodes.push(node);
    if root.is_none() {
        *root = Some(idx);
    } else if let Some(parent) = *pending_parent {
        nodes[parent as usize].children.push(idx);
    }
    idx
}

fn parse_named(p: &mut Parser) -> Result<ParsedTypeNode, CompileError> {
    let is_named_start = matches!(
        p.current(),
        TokenKind::Identifier
            | TokenKind::BoolPrimitive
            | TokenKind::I8Primitive
            | TokenKind::I16Primitive
            | TokenKind::I32Primitive
            | TokenKind::I64Primitive
            | TokenKind::U8Primitive
            | TokenKind::U16Primitive
            | TokenKind::U32Primitive
            | TokenKind::U64Primitive
            | TokenKind::USizePrimitive
            | TokenKind::F32Primitive
            | TokenKind::F64Primitive
            | TokenKind::CharPrimitive
            | TokenKind::StrPrimitive
            | TokenKind::StringPrimitive
            | TokenKind::TypePrimitive
            | TokenKind::ListPrimitive
            | TokenKind::MapPrimitive
            | TokenKind::SetPrimitive
    );
    if !is_named_start {
        return Err(CompileError::CompileUnknownType { at: p.current_loc() });
    }
    let idx = p.advance();
    let span = p.stream.token(idx).location()..p.stream.end(idx);
    Ok(ParsedTypeNode::named(span))
}

fn parse_optional_lifetime(p: &mut Parser) -> Option<core::ast::SourceSpan> {
    if p.check(TokenKind::Lifetime) {
        let idx = p.advance();
        Some(p.stream.token(idx).location()..p.stream.end(idx))
    } else {
        None
    }
}

fn parse_tuple(
    p: &mut Parser,
    mut nodes: Vec<ParsedTypeNode>,
    mut root: Option<u32>,
    mut pending_parent: Option<u32>,
    depth: usize,
) -> Result<ParsedType, CompileError> {
    let tuple_idx = nodes.len() as u32;
    nodes.push(ParsedTypeNode::wrapper(ParsedTypeTag::Tuple, false, None));
    if root.is_none() {
        root = Some(tuple_idx);
    } else if let Some(parent) = pending_parent {
        nodes[parent as usize].children.push(tuple_idx);
    }
    pending_parent = Some(tuple_idx);

    if !p.check(TokenKind::RightParenthesesSymbol) {
        loop {
            if p.check(TokenKind::NumberLiteral) {
                return Err(CompileError::CompileUnknownType { at: p.current_loc() });
            }
            let child = parse_type_at_depth(p, depth + 1)?;
            let offset = nodes.len() as u32;
            for mut n in child.nodes {
                for c in n.children.iter_mut() {
                    *c += offset;
                }
                nodes.push(n);
            }
            nodes[tuple_idx as usize].children.push(offset + child.root);
            if !p.matches(TokenKind::CommaSymbol) {
                break;
            }
        }
    }
    p.consume(TokenKind::RightParenthesesSymbol, |at| CompileError::CompileUnknownType { at })?;

    Ok(ParsedType { nodes, root: root.unwrap() })
}

fn parse_generic_args(p: &mut Parser, nodes: &mut Vec<ParsedTypeNode>, parent: u32, depth: usize) -> Result<(), CompileError> {
    if depth + 1 > MAX_GENERIC_DEPTH {
        return Err(CompileError::CompileUnknownType { at: p.current_loc() });
    }

    if !p.check(TokenKind::RightParenthesesSymbol) {
        loop {
            if p.check(TokenKind::NumberLiteral) {
                let idx = p.advance();
                let span = p.stream.token(idx).location()..p.stream.end(idx);
                let node_idx = nodes.len() as u32;
                nodes.push(ParsedTypeNode::int_literal(span));
                nodes[parent as usize].children.push(node_idx);
            } else {
                let child = parse_type_at_depth(p, depth + 1)?;
                let offset = nodes.len() as u32;
                for mut n in child.nodes {
                    for c in n.children.iter_mut() {
                        *c += offset;
                    }
                    nodes.push(n);
                }
                nodes[parent as usize].children.push(offset + child.root);
            }
            if !p.matches(TokenKind::CommaSymbol) {
                break;
            }
        }
    }
    p.consume(TokenKind::RightParenthesesSymbol, |at| CompileError::CompileUnknownType { at })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::tokens::TokenStream;
    use lexer::Tokenizer;

    fn parse(src: &str) -> ParsedType {
        let stream: TokenStream = Tokenizer::create(src).unwrap();
        let mut p = Parser::new(&stream, src);
        parse_type(&mut p).unwrap()
    }

    #[test]
    fn bare_named_type() {
        let ty = parse("i32");
        assert_eq!(ty.root_node().tag, ParsedTypeTag::Named);
    }

    #[test]
    fn pointer_to_named() {
        let ty = parse("*i32");
        assert_eq!(ty.root_node().tag, ParsedTypeTag::Pointer);
        assert_eq!(ty.nodes[ty.root_node().children[0] as usize].tag, ParsedTypeTag::Named);
    }

    #[test]
    fn slice_of_named() {
        let ty = parse("[]i32");
        assert_eq!(ty.root_node().tag, ParsedTypeTag::Slice);
    }

    #[test]
    fn error_union_of_named() {
        let ty = parse("i32!i32");
        assert_eq!(ty.root_node().tag, ParsedTypeTag::ErrorUnion);
        assert_eq!(ty.root_node().children.len(), 2);
    }

    #[test]
    fn generic_with_int_literal_and_named() {
        let ty = parse("List(i32)");
        let root = ty.root_node();
        assert_eq!(root.tag, ParsedTypeTag::Named);
        assert_eq!(ty.nodes[root.children[0] as usize].tag, ParsedTypeTag::Named);
    }

    #[test]
    fn tuple_of_three_named() {
        let ty = parse("(u8, f32, i32)");
        assert_eq!(ty.root_node().tag, ParsedTypeTag::Tuple);
        assert_eq!(ty.root_node().children.len(), 3);
    }

    #[test]
    fn int_literal_inside_tuple_is_rejected() {
        let stream = Tokenizer::create("(3, i32)").unwrap();
        let mut p = Parser::new(&stream, "(3, i32)");
        assert!(matches!(parse_type(&mut p), Err(CompileError::CompileUnknownType { .. })));
    }

    #[test]
    fn repeated_error_union_chain_is_rejected() {
        let stream = Tokenizer::create("i32!i32!i32").unwrap();
        let mut p = Parser::new(&stream, "i32!i32!i32");
        assert!(matches!(parse_type(&mut p), Err(CompileError::CompileUnknownType { .. })));
    }

    #[test]
    fn nullable_pointer_with_lifetime_and_mut() {
        let ty = parse("?*'a mut i32");
        assert_eq!(ty.root_node().tag, ParsedTypeTag::Nullable);
        let ptr = &ty.nodes[ty.root_node().children[0] as usize];
        assert_eq!(ptr.tag, ParsedTypeTag::Pointer);
        assert!(ptr.mutable);
        assert!(ptr.lifetime.is_some());
        let named = &ty.nodes[ptr.children[0] as usize];
        assert_eq!(named.tag, ParsedTypeTag::Named);
    }

    #[test]
    fn slice_with_lifetime_and_mut() {
        let ty = parse("[]'a mut i32");
        assert_eq!(ty.root_node().tag, ParsedTypeTag::Slice);
        assert!(ty.root_node().mutable);
        assert!(ty.root_node().lifetime.is_some());
        let named = &ty.nodes[ty.root_node().children[0] as usize];
        assert_eq!(named.tag, ParsedTypeTag::Named);
    }

    #[test]
    fn generic_args_mix_int_literal_and_named() {
        let ty = parse("Vec(3, f32)");
        let root = ty.root_node();
        assert_eq!(root.tag, ParsedTypeTag::Named);
        assert_eq!(root.children.len(), 2);
        assert_eq!(ty.nodes[root.children[0] as usize].tag, ParsedTypeTag::IntLiteral);
        assert_eq!(ty.nodes[root.children[1] as usize].tag, ParsedTypeTag::Named);
    }

    #[test]
    fn generic_depth_over_max_is_rejected() {
        let mut src = String::new();
        for _ in 0..=MAX_GENERIC_DEPTH {
            src.push_str("Vec(");
        }
        src.push_str("i32");
        for _ in 0..=MAX_GENERIC_DEPTH {
            src.push(')');
        }
        let stream = Tokenizer::create(&src).unwrap();
        let mut p = Parser::new(&stream, &src);
        assert!(matches!(parse_type(&mut p), Err(CompileError::CompileUnknownType { .. })));
    }
}
