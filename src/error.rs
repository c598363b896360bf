//! Error types and the thread-local diagnostic channel.
//!
//! Every public entry point clears the thread-local slot on entry; lexer,
//! parser and analyser stages publish to it as they fail. Callers that want
//! the exact diagnostic string rather than matching on [`Error`]'s
//! structured variants can call [`last_error`] instead.

use std::cell::RefCell;
use std::fmt;

use ariadne::{Label, Report, ReportKind, Source};

/// A byte-offset span into the source text of a single registration's
/// expression. A byte offset into the caller-owned buffer is just as
/// useful as a raw pointer here, and safer to hand across an FFI boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub start: usize,
    pub end: usize,
}

impl Location {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(end >= start);
        Location { start, end }
    }

    pub fn point(at: usize) -> Self {
        Location { start: at, end: at }
    }
}

/// The stable, user-visible diagnostic strings a registration's binding can
/// fail with. Variants carry just enough structure to reconstruct those
/// strings and to let callers match on a specific failure kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SemanticError {
    #[error("Illegal operator for counters")]
    IllegalOperatorForCounters,
    #[error("Illegal operator for counter and non-counter")]
    IllegalOperatorForCounterAndNonCounter,
    #[error("Non-arithmetic type for {0} operand")]
    NonArithmeticOperand(Side),
    #[error("Dimensions are not the same")]
    DimensionsNotSame,
    #[error("Non-counter and not dimensionless for {0} operand")]
    NonCounterNotDimensionless(Side),
    #[error("Operands should have the same instance domain")]
    InstanceDomainMismatch,
    #[error("Different types for ternary operands")]
    TernaryTypeMismatch,
    #[error("Different instance domains for ternary operands")]
    TernaryInstanceDomainMismatch,
    #[error("Different semantics for ternary operands")]
    TernarySemanticsMismatch,
    #[error("Different units or scale ({0}) for ternary operands")]
    TernaryUnitsMismatch(Dimension),
    #[error("Non-arithmetic operand for ternary guard")]
    NonArithmeticGuard,
    #[error("Non-scalar ternary guard with scalar expressions")]
    NonScalarGuard,
    #[error("Non-arithmetic operand for {0}")]
    NonArithmeticFor(NonArithmeticContext),
    #[error("Incorrect time dimension for operand")]
    IncorrectTimeDimension,
}

/// Which side of a binary operator a [`SemanticError`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => write!(f, "left"),
            Side::Right => write!(f, "right"),
        }
    }
}

/// Which unit dimension a ternary mismatch was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Space,
    Time,
    Count,
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Space => write!(f, "space"),
            Dimension::Time => write!(f, "time"),
            Dimension::Count => write!(f, "count"),
        }
    }
}

/// Context for the "non-arithmetic operand" family of diagnostics: either a
/// named function or unary negation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NonArithmeticContext {
    Function(&'static str),
    UnaryNegation,
}

impl fmt::Display for NonArithmeticContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NonArithmeticContext::Function(name) => write!(f, "{name}"),
            NonArithmeticContext::UnaryNegation => write!(f, "unary negation"),
        }
    }
}

/// Top-level error kind, spanning every stage from lexing through binding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
    #[error("{0}")]
    Lexical(String),
    #[error("{0}")]
    Syntax(String),
    #[error("Constant value too large")]
    ConstantTooLarge,
    #[error("Illegal character")]
    IllegalCharacter,
    #[error(transparent)]
    Semantic(#[from] SemanticError),
    #[error("Duplicate derived metric name")]
    DuplicateName,
    #[error("invalid metric name syntax")]
    InvalidNameSyntax,
    #[error("unresolved metric name")]
    UnresolvedName,
    #[error("missing '=' in configuration line")]
    MissingEquals,
    #[error("configuration path not found: {0}")]
    PathNotFound(String),
}

/// An error produced while lexing, parsing, or analysing a single
/// registration's expression, with the position at which it was detected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}")]
pub struct Error {
    pub kind: ErrorKind,
    pub location: Option<Location>,
    /// The registration name this error was raised for, if any (used to
    /// build the header naming the registration in rendered reports).
    pub registration: Option<String>,
}

impl Error {
    pub fn new(kind: ErrorKind, location: Option<Location>) -> Self {
        Error {
            kind,
            location,
            registration: None,
        }
    }

    pub fn at(kind: ErrorKind, location: Location) -> Self {
        Error::new(kind, Some(location))
    }

    pub fn with_registration(mut self, name: impl Into<String>) -> Self {
        self.registration = Some(name.into());
        self
    }
}

thread_local! {
    static LAST_ERROR: RefCell<Option<Error>> = RefCell::new(None);
}

/// Clear the thread-local diagnostic slot. Called at the start of every
/// public registration-facing API.
pub(crate) fn clear_error() {
    LAST_ERROR.with(|cell| *cell.borrow_mut() = None);
}

/// Publish an error to the thread-local diagnostic slot, overwriting
/// whatever was there (only the first error of a registration should ever
/// be published — there is no error recovery inside a single expression).
pub(crate) fn set_error(err: Error) {
    LAST_ERROR.with(|cell| *cell.borrow_mut() = Some(err));
}

/// Inspect the last error published on this thread, if any.
pub fn last_error() -> Option<Error> {
    LAST_ERROR.with(|cell| cell.borrow().clone())
}

/// Render a four-part user-facing report: a header naming the registration,
/// a verbatim echo of the expression, a caret line aligned to the error
/// position, and the diagnostic string.
pub fn format_report(name: &str, expr: &str, err: &Error) -> String {
    let Some(loc) = err.location else {
        return format!("derived metric '{name}': {}", err.kind);
    };
    let span = loc.start..loc.end.max(loc.start + 1).min(expr.len().max(loc.start + 1));
    let mut buf = Vec::new();
    let id = name.to_string();
    let report = Report::build(ReportKind::Error, id.clone(), span.start)
        .with_message(format!("derived metric '{name}'"))
        .with_label(Label::new((id.clone(), span)).with_message(err.kind.to_string()))
        .finish();
    let cache = (id, Source::from(expr));
    if report.write(cache, &mut buf).is_ok() {
        String::from_utf8_lossy(&buf).into_owned()
    } else {
        format!("derived metric '{name}': {}\n{expr}", err.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_error_round_trips() {
        clear_error();
        assert!(last_error().is_none());
        set_error(Error::at(ErrorKind::ConstantTooLarge, Location::point(3)));
        let err = last_error().expect("error was set");
        assert_eq!(err.kind, ErrorKind::ConstantTooLarge);
        clear_error();
        assert!(last_error().is_none());
    }

    #[test]
    fn format_report_contains_message_and_echo() {
        let err = Error::at(ErrorKind::IllegalCharacter, Location::new(2, 3));
        let report = format_report("bad", "a&b", &err);
        assert!(report.contains("Illegal character"));
    }
}
