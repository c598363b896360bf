//! Hand-written lexer. Tokens are produced on demand from a
//! [`Cursor`] over the registration's expression text; the units sub-lexer
//! (`units.rs`) is invoked directly by the parser right after a numeric
//! literal token, since unit keywords are only meaningful in that position.

mod cursor;
mod units;

use std::sync::Arc;

use crate::error::{ErrorKind, Location};

use cursor::Cursor;
pub(crate) use units::scan_units;

/// One lexical token. `Name`/function keywords carry the spelled text so
/// the binder can later resolve it against the host's metric dictionary.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Integer(u32),
    Double(f64),
    Name(Arc<str>),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Question,
    Colon,
    Lt,
    Le,
    EqEq,
    Ge,
    Gt,
    Ne,
    AndAnd,
    OrOr,
    Not,
    // function keywords; the `(` that must follow is left unconsumed.
    Avg,
    Count,
    Delta,
    Max,
    Min,
    Sum,
    Rate,
    InstantKw,
    AnonKw,
    Eos,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub location: Location,
}

fn function_keyword(word: &str) -> Option<TokenKind> {
    Some(match word {
        "avg" => TokenKind::Avg,
        "count" => TokenKind::Count,
        "delta" => TokenKind::Delta,
        "max" => TokenKind::Max,
        "min" => TokenKind::Min,
        "sum" => TokenKind::Sum,
        "rate" => TokenKind::Rate,
        "instant" => TokenKind::InstantKw,
        "anon" => TokenKind::AnonKw,
        _ => return None,
    })
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic()
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

pub(crate) struct Lexer<'a> {
    cursor: Cursor<'a>,
    pub(crate) last_error: Option<ErrorKind>,
}

impl<'a> Lexer<'a> {
    pub(crate) fn new(input: &'a str) -> Self {
        Lexer {
            cursor: Cursor::new(input),
            last_error: None,
        }
    }

    pub(crate) fn pos(&self) -> usize {
        self.cursor.pos()
    }

    /// Give the parser direct access to the units sub-lexer right after a
    /// numeric literal.
    pub(crate) fn try_scan_units(&mut self) -> Option<crate::ast::Units> {
        scan_units(&mut self.cursor)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.cursor.peek(), Some(c) if c.is_whitespace()) {
            self.cursor.bump();
        }
    }

    /// Produce the next token, or `Eos` at end of input.
    pub(crate) fn next_token(&mut self) -> Token {
        self.skip_whitespace();
        let start = self.cursor.pos();
        let Some(c) = self.cursor.bump() else {
            return Token {
                kind: TokenKind::Eos,
                location: Location::point(start),
            };
        };

        let kind = match c {
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '?' => TokenKind::Question,
            ':' => TokenKind::Colon,
            '<' => self.tentative(start, '=', TokenKind::Le, TokenKind::Lt),
            '>' => self.tentative(start, '=', TokenKind::Ge, TokenKind::Gt),
            '=' => {
                if self.cursor.peek() == Some('=') {
                    self.cursor.bump();
                    TokenKind::EqEq
                } else {
                    self.error(start, "'=' is not a valid operator, expected '=='")
                }
            }
            '!' => {
                if self.cursor.peek() == Some('=') {
                    self.cursor.bump();
                    TokenKind::Ne
                } else {
                    TokenKind::Not
                }
            }
            '&' => {
                if self.cursor.peek() == Some('&') {
                    self.cursor.bump();
                    TokenKind::AndAnd
                } else {
                    self.error(start, "'&' is not a valid operator, expected '&&'")
                }
            }
            '|' => {
                if self.cursor.peek() == Some('|') {
                    self.cursor.bump();
                    TokenKind::OrOr
                } else {
                    self.error(start, "'|' is not a valid operator, expected '||'")
                }
            }
            c if c.is_ascii_digit() => self.number(c, start),
            '.' if self.cursor.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) => {
                self.number(c, start)
            }
            c if is_ident_start(c) => self.ident_or_function(c, start),
            _ => self.error(start, format!("Illegal character '{c}'")),
        };

        let end = self.cursor.pos();
        Token {
            kind,
            location: Location::new(start, end),
        }
    }

    fn tentative(&mut self, _start: usize, second: char, wide: TokenKind, narrow: TokenKind) -> TokenKind {
        if self.cursor.peek() == Some(second) {
            self.cursor.bump();
            wide
        } else {
            narrow
        }
    }

    fn error(&mut self, start: usize, message: impl Into<String>) -> TokenKind {
        let message = message.into();
        self.last_error = Some(ErrorKind::IllegalCharacter);
        crate::error::set_error(crate::error::Error::at(
            ErrorKind::Lexical(message),
            Location::point(start),
        ));
        TokenKind::Error
    }

    fn number(&mut self, first: char, start: usize) -> TokenKind {
        let mut buf = String::new();
        buf.push(first);
        let mut has_dot = first == '.';
        while let Some(c) = self.cursor.peek() {
            if c.is_ascii_digit() {
                buf.push(c);
                self.cursor.bump();
            } else if c == '.' && !has_dot {
                has_dot = true;
                buf.push(c);
                self.cursor.bump();
            } else {
                break;
            }
        }
        if has_dot {
            TokenKind::Double(buf.parse().unwrap_or(0.0))
        } else {
            match buf.parse::<u32>() {
                Ok(v) => TokenKind::Integer(v),
                Err(_) => {
                    crate::error::set_error(crate::error::Error::at(
                        ErrorKind::ConstantTooLarge,
                        Location::new(start, self.cursor.pos()),
                    ));
                    TokenKind::Error
                }
            }
        }
    }

    fn ident_or_function(&mut self, first: char, start: usize) -> TokenKind {
        let mut buf = String::new();
        buf.push(first);
        while let Some(c) = self.cursor.peek() {
            if is_ident_continue(c) {
                buf.push(c);
                self.cursor.bump();
            } else {
                break;
            }
        }
        if self.cursor.peek() == Some('(') {
            if let Some(kw) = function_keyword(&buf) {
                return kw;
            }
        }
        TokenKind::Name(Arc::from(buf.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let mut lex = Lexer::new(src);
        let mut out = Vec::new();
        loop {
            let tok = lex.next_token();
            if tok.kind == TokenKind::Eos {
                break;
            }
            out.push(tok.kind);
        }
        out
    }

    #[test]
    fn lexes_simple_arithmetic() {
        let toks = kinds("1 + 2 * 3");
        assert_eq!(
            toks,
            vec![
                TokenKind::Integer(1),
                TokenKind::Plus,
                TokenKind::Integer(2),
                TokenKind::Star,
                TokenKind::Integer(3),
            ]
        );
    }

    #[test]
    fn lexes_dotted_name() {
        let toks = kinds("disk.dev.read");
        assert_eq!(toks, vec![TokenKind::Name(Arc::from("disk.dev.read"))]);
    }

    #[test]
    fn recognises_function_keyword_only_before_paren() {
        let toks = kinds("rate(disk.dev.read)");
        assert_eq!(
            toks,
            vec![
                TokenKind::Rate,
                TokenKind::LParen,
                TokenKind::Name(Arc::from("disk.dev.read")),
                TokenKind::RParen,
            ]
        );
        // `rate` without a following `(` is just a metric name.
        let toks = kinds("rate + 1");
        assert_eq!(
            toks,
            vec![TokenKind::Name(Arc::from("rate")), TokenKind::Plus, TokenKind::Integer(1)]
        );
    }

    #[test]
    fn multi_char_operators() {
        let toks = kinds("a <= b && c != d");
        assert_eq!(
            toks,
            vec![
                TokenKind::Name(Arc::from("a")),
                TokenKind::Le,
                TokenKind::Name(Arc::from("b")),
                TokenKind::AndAnd,
                TokenKind::Name(Arc::from("c")),
                TokenKind::Ne,
                TokenKind::Name(Arc::from("d")),
            ]
        );
    }

    #[test]
    fn constant_too_large_is_an_error_token() {
        let toks = kinds("99999999999999999999");
        assert_eq!(toks, vec![TokenKind::Error]);
    }

    #[test]
    fn lone_equals_is_illegal() {
        let toks = kinds("a = b");
        assert_eq!(toks[1], TokenKind::Error);
    }
}
