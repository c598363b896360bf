//! Recursive-descent parser. A simple precedence-climbing implementation
//! in place of a generated LALR table — one function per precedence tier,
//! each production its own small module-level function.

mod grammar;

use crate::ast::StaticNode;
use crate::error::{Error, Location};
use crate::lexer::{Lexer, Token, TokenKind};

pub(crate) struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(source: &'a str) -> Self {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token();
        Parser { lexer, current }
    }

    /// Parse the entry production `expr EOS`.
    pub(crate) fn parse(mut self) -> Result<StaticNode, Error> {
        let node = grammar::ternary(&mut self)?;
        self.expect_eos()?;
        Ok(node)
    }

    fn bump(&mut self) -> Token {
        let next = self.lexer.next_token();
        std::mem::replace(&mut self.current, next)
    }

    fn peek(&self) -> &TokenKind {
        &self.current.kind
    }

    fn loc(&self) -> Location {
        self.current.location
    }

    fn expect_eos(&mut self) -> Result<(), Error> {
        if matches!(self.peek(), TokenKind::Eos) {
            Ok(())
        } else {
            Err(Error::at(
                crate::error::ErrorKind::Syntax(format!(
                    "Unexpected token '{}', expected end of expression",
                    display_token(self.peek())
                )),
                self.loc(),
            ))
        }
    }

    /// Whether the current token can begin a primary expression: a literal,
    /// a metric name, a function call, a parenthesised group, or unary
    /// `-`/`!`.
    fn can_start_expr(&self) -> bool {
        matches!(
            self.peek(),
            TokenKind::Integer(_)
                | TokenKind::Double(_)
                | TokenKind::Name(_)
                | TokenKind::LParen
                | TokenKind::Minus
                | TokenKind::Not
                | TokenKind::Avg
                | TokenKind::Count
                | TokenKind::Delta
                | TokenKind::Max
                | TokenKind::Min
                | TokenKind::Sum
                | TokenKind::Rate
                | TokenKind::InstantKw
                | TokenKind::AnonKw
        )
    }

    /// Parse an operand via `parse_fn`, but first check that the current
    /// token could actually start one; if not, fail with `message` at the
    /// current position instead of recursing into a confusing cascade of
    /// "unexpected token" errors. Every operator position gets its own
    /// explicit error production this way.
    fn expect_operand(
        &mut self,
        message: impl Into<String>,
        parse_fn: impl FnOnce(&mut Self) -> Result<StaticNode, Error>,
    ) -> Result<StaticNode, Error> {
        if !self.can_start_expr() {
            return Err(Error::at(crate::error::ErrorKind::Syntax(message.into()), self.loc()));
        }
        parse_fn(self)
    }
}

pub(crate) fn display_token(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Integer(v) => v.to_string(),
        TokenKind::Double(v) => v.to_string(),
        TokenKind::Name(n) => n.to_string(),
        TokenKind::Plus => "+".into(),
        TokenKind::Minus => "-".into(),
        TokenKind::Star => "*".into(),
        TokenKind::Slash => "/".into(),
        TokenKind::LParen => "(".into(),
        TokenKind::RParen => ")".into(),
        TokenKind::Question => "?".into(),
        TokenKind::Colon => ":".into(),
        TokenKind::Lt => "<".into(),
        TokenKind::Le => "<=".into(),
        TokenKind::EqEq => "==".into(),
        TokenKind::Ge => ">=".into(),
        TokenKind::Gt => ">".into(),
        TokenKind::Ne => "!=".into(),
        TokenKind::AndAnd => "&&".into(),
        TokenKind::OrOr => "||".into(),
        TokenKind::Not => "!".into(),
        TokenKind::Avg => "avg".into(),
        TokenKind::Count => "count".into(),
        TokenKind::Delta => "delta".into(),
        TokenKind::Max => "max".into(),
        TokenKind::Min => "min".into(),
        TokenKind::Sum => "sum".into(),
        TokenKind::Rate => "rate".into(),
        TokenKind::InstantKw => "instant".into(),
        TokenKind::AnonKw => "anon".into(),
        TokenKind::Eos => "end of expression".into(),
        TokenKind::Error => "<invalid token>".into(),
    }
}

/// Parse a single registration expression into a static AST.
pub(crate) fn parse(source: &str) -> Result<StaticNode, Error> {
    Parser::new(source).parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeKind;

    #[test]
    fn parses_simple_sum() {
        let ast = parse("kernel.all.cpu.user + kernel.all.cpu.sys").unwrap();
        assert_eq!(ast.kind, NodeKind::Add);
    }

    #[test]
    fn parses_rate_of_name() {
        let ast = parse("rate(disk.dev.total_bytes)").unwrap();
        assert_eq!(ast.kind, NodeKind::Rate);
        assert_eq!(ast.left.as_ref().unwrap().kind, NodeKind::Name);
        assert!(ast.left.as_ref().unwrap().save_last);
    }

    #[test]
    fn parses_ternary_as_quest_colon() {
        let ast = parse("a > 0 ? b : c").unwrap();
        assert_eq!(ast.kind, NodeKind::Quest);
        assert_eq!(ast.right.as_ref().unwrap().kind, NodeKind::Colon);
    }

    #[test]
    fn trailing_operator_reports_position() {
        let err = parse("1 + ").unwrap_err();
        assert!(matches!(err.kind, crate::error::ErrorKind::Syntax(_)));
    }

    #[test]
    fn leading_operator_reports_unexpected_initial() {
        let err = parse("* 2").unwrap_err();
        match err.kind {
            crate::error::ErrorKind::Syntax(msg) => assert!(msg.contains("Unexpected initial")),
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn precedence_binds_multiplication_tighter_than_addition() {
        let ast = parse("1 + 2 * 3").unwrap();
        assert_eq!(ast.kind, NodeKind::Add);
        assert_eq!(ast.right.as_ref().unwrap().kind, NodeKind::Mul);
    }
}
