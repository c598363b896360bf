//! One function per precedence tier:
//!
//! ```text
//! expr  := expr op expr | unary expr | '(' expr ')' | num | Name | func
//! num   := (Integer | Double) units?
//! func  := fname '(' Name ')'
//! unary := '-' | '!'
//! ```
//!
//! Precedence, low to high: `?:`, `|| &&`, unary `!`, relational, `+ -`,
//! `* /`, unary `-`.

use std::sync::Arc;

use crate::ast::{Descriptor, NodeKind, Semantics, StaticNode, Units, ValueType};
use crate::error::{Error, ErrorKind};
use crate::lexer::TokenKind;

use super::{display_token, Parser};

pub(super) fn ternary(p: &mut Parser) -> Result<StaticNode, Error> {
    let start = p.loc();
    let cond = or_and(p)?;
    if matches!(p.peek(), TokenKind::Question) {
        p.bump();
        let then_branch =
            p.expect_operand("Arithmetic expression expected to follow ?", ternary)?;
        match p.peek() {
            TokenKind::Colon => {
                p.bump();
            }
            other => {
                return Err(Error::at(
                    ErrorKind::Syntax(format!("':' expected in ternary, found '{}'", display_token(other))),
                    p.loc(),
                ))
            }
        }
        let else_branch =
            p.expect_operand("Arithmetic expression expected to follow :", ternary)?;
        return Ok(StaticNode::ternary(cond, then_branch, else_branch, start));
    }
    Ok(cond)
}

fn or_and(p: &mut Parser) -> Result<StaticNode, Error> {
    let mut left = not_level(p)?;
    loop {
        let kind = match p.peek() {
            TokenKind::AndAnd => NodeKind::And,
            TokenKind::OrOr => NodeKind::Or,
            _ => break,
        };
        let op_loc = p.loc();
        let op_text = display_token(p.peek());
        p.bump();
        let right = p.expect_operand(
            format!("Boolean expression expected to follow {op_text}"),
            not_level,
        )?;
        left = StaticNode::binary(kind, left, right, op_loc);
    }
    Ok(left)
}

fn not_level(p: &mut Parser) -> Result<StaticNode, Error> {
    if matches!(p.peek(), TokenKind::Not) {
        let loc = p.loc();
        p.bump();
        let operand = p.expect_operand("Boolean expression expected to follow !", not_level)?;
        return Ok(StaticNode::unary(NodeKind::Not, operand, loc));
    }
    relational(p)
}

fn relational(p: &mut Parser) -> Result<StaticNode, Error> {
    let mut left = additive(p)?;
    loop {
        let kind = match p.peek() {
            TokenKind::Lt => NodeKind::Lt,
            TokenKind::Le => NodeKind::Le,
            TokenKind::EqEq => NodeKind::Eq,
            TokenKind::Ge => NodeKind::Ge,
            TokenKind::Gt => NodeKind::Gt,
            TokenKind::Ne => NodeKind::Ne,
            _ => break,
        };
        let op_loc = p.loc();
        let op_text = display_token(p.peek());
        p.bump();
        let right = p.expect_operand(
            format!("Arithmetic expression expected to follow {op_text}"),
            additive,
        )?;
        left = StaticNode::binary(kind, left, right, op_loc);
    }
    Ok(left)
}

fn additive(p: &mut Parser) -> Result<StaticNode, Error> {
    let mut left = multiplicative(p)?;
    loop {
        let kind = match p.peek() {
            TokenKind::Plus => NodeKind::Add,
            TokenKind::Minus => NodeKind::Sub,
            _ => break,
        };
        let op_loc = p.loc();
        let op_text = display_token(p.peek());
        p.bump();
        let right = p.expect_operand(
            format!("Arithmetic expression expected to follow {op_text}"),
            multiplicative,
        )?;
        left = StaticNode::binary(kind, left, right, op_loc);
    }
    Ok(left)
}

fn multiplicative(p: &mut Parser) -> Result<StaticNode, Error> {
    let mut left = unary_neg(p)?;
    loop {
        let kind = match p.peek() {
            TokenKind::Star => NodeKind::Mul,
            TokenKind::Slash => NodeKind::Div,
            _ => break,
        };
        let op_loc = p.loc();
        let op_text = display_token(p.peek());
        p.bump();
        let right = p.expect_operand(
            format!("Arithmetic expression expected to follow {op_text}"),
            unary_neg,
        )?;
        left = StaticNode::binary(kind, left, right, op_loc);
    }
    Ok(left)
}

fn unary_neg(p: &mut Parser) -> Result<StaticNode, Error> {
    if matches!(p.peek(), TokenKind::Minus) {
        let loc = p.loc();
        p.bump();
        let operand = p.expect_operand("Arithmetic expression expected to follow -", unary_neg)?;
        return Ok(StaticNode::unary(NodeKind::Neg, operand, loc));
    }
    primary(p)
}

fn primary(p: &mut Parser) -> Result<StaticNode, Error> {
    let start = p.loc();
    match p.peek().clone() {
        TokenKind::Integer(v) => {
            p.bump();
            let units = p.try_units();
            let descriptor = Descriptor {
                id: None,
                value_type: ValueType::U32,
                instance_domain: None,
                semantics: Semantics::Discrete,
                units,
            };
            Ok(StaticNode::literal(NodeKind::Integer, v.to_string(), descriptor, start))
        }
        TokenKind::Double(v) => {
            p.bump();
            let units = p.try_units();
            let descriptor = Descriptor {
                id: None,
                value_type: ValueType::F64,
                instance_domain: None,
                semantics: Semantics::Discrete,
                units,
            };
            Ok(StaticNode::literal(NodeKind::Double, v.to_string(), descriptor, start))
        }
        TokenKind::Name(name) => {
            p.bump();
            Ok(StaticNode::leaf(NodeKind::Name, name, start))
        }
        TokenKind::LParen => {
            p.bump();
            let inner = p.expect_operand("Arithmetic expression expected to follow (", ternary)?;
            match p.peek() {
                TokenKind::RParen => {
                    p.bump();
                    Ok(inner)
                }
                other => Err(Error::at(
                    ErrorKind::Syntax(format!("')' expected, found '{}'", display_token(other))),
                    p.loc(),
                )),
            }
        }
        TokenKind::Avg
        | TokenKind::Count
        | TokenKind::Delta
        | TokenKind::Max
        | TokenKind::Min
        | TokenKind::Sum
        | TokenKind::Rate
        | TokenKind::InstantKw => function_call(p),
        TokenKind::AnonKw => anon_call(p),
        other => Err(Error::at(
            ErrorKind::Syntax(format!("Unexpected initial {}", display_token(&other))),
            start,
        )),
    }
}

fn function_kind(kind: &TokenKind) -> NodeKind {
    match kind {
        TokenKind::Avg => NodeKind::Avg,
        TokenKind::Count => NodeKind::Count,
        TokenKind::Delta => NodeKind::Delta,
        TokenKind::Max => NodeKind::Max,
        TokenKind::Min => NodeKind::Min,
        TokenKind::Sum => NodeKind::Sum,
        TokenKind::Rate => NodeKind::Rate,
        TokenKind::InstantKw => NodeKind::Instant,
        _ => unreachable!("function_kind called with a non-function token"),
    }
}

/// `func := fname '(' Name ')'`.
fn function_call(p: &mut Parser) -> Result<StaticNode, Error> {
    let start = p.loc();
    let kind = function_kind(p.peek());
    let fname = display_token(p.peek());
    p.bump();
    expect_lparen(p, &fname)?;
    let name_tok = p.peek().clone();
    let arg = match name_tok {
        TokenKind::Name(n) => {
            let loc = p.loc();
            p.bump();
            StaticNode::leaf(NodeKind::Name, n, loc)
        }
        other => {
            return Err(Error::at(
                ErrorKind::Syntax(format!("Metric name expected to follow {fname}(, found '{}'", display_token(&other))),
                p.loc(),
            ))
        }
    };
    expect_rparen(p, &fname)?;
    Ok(StaticNode::unary(kind, arg, start))
}

/// `anon(T)`: the argument is a type tag, not a metric name.
fn anon_call(p: &mut Parser) -> Result<StaticNode, Error> {
    let start = p.loc();
    p.bump(); // consume `anon`
    expect_lparen(p, "anon")?;
    let value_type = match p.peek().clone() {
        TokenKind::Integer(32) => ValueType::I32,
        TokenKind::Integer(64) => ValueType::I64,
        TokenKind::Name(n) => match &*n {
            "U32" => ValueType::U32,
            "U64" => ValueType::U64,
            "FLOAT" => ValueType::F32,
            "DOUBLE" => ValueType::F64,
            _ => {
                return Err(Error::at(
                    ErrorKind::Syntax(format!(
                        "Invalid type tag '{n}' for anon(, expected one of 32, U32, 64, U64, FLOAT, DOUBLE"
                    )),
                    p.loc(),
                ))
            }
        },
        other => {
            return Err(Error::at(
                ErrorKind::Syntax(format!(
                    "Type tag expected to follow anon(, found '{}'",
                    display_token(&other)
                )),
                p.loc(),
            ))
        }
    };
    let tag_text: Arc<str> = Arc::from(format!("{value_type:?}"));
    let loc = p.loc();
    p.bump();
    expect_rparen(p, "anon")?;
    let descriptor = Descriptor {
        id: None,
        value_type,
        instance_domain: None,
        semantics: Semantics::Instant,
        units: Units::NONE,
    };
    let child = StaticNode::literal(NodeKind::Integer, tag_text, descriptor, loc);
    Ok(StaticNode::unary(NodeKind::Anon, child, start))
}

fn expect_lparen(p: &mut Parser, fname: &str) -> Result<(), Error> {
    match p.peek() {
        TokenKind::LParen => {
            p.bump();
            Ok(())
        }
        other => Err(Error::at(
            ErrorKind::Syntax(format!("'(' expected to follow {fname}, found '{}'", display_token(other))),
            p.loc(),
        )),
    }
}

fn expect_rparen(p: &mut Parser, fname: &str) -> Result<(), Error> {
    match p.peek() {
        TokenKind::RParen => {
            p.bump();
            Ok(())
        }
        other => Err(Error::at(
            ErrorKind::Syntax(format!("')' expected to close {fname}(, found '{}'", display_token(other))),
            p.loc(),
        )),
    }
}

impl<'a> Parser<'a> {
    fn try_units(&mut self) -> Units {
        self.lexer.try_scan_units().unwrap_or(Units::NONE)
    }
}
