//! Thin `tracing` conventions shared by the registry.
//!
//! There is no dedicated subscriber here — embedders install their own
//! (`tracing_subscriber`, `tracing-appender`, etc.); this module only fixes
//! the span naming convention so log output is consistent regardless of
//! which registry instance produced it.

/// The span every public [`crate::registry::Registry`] operation should be
/// wrapped in, named after the operation (`"register"`, `"open_context"`,
/// `"traverse"`, ...). A thin wrapper rather than a macro, so call sites
/// stay ordinary function calls.
pub(crate) fn op_span(op: &'static str) -> tracing::Span {
    tracing::debug_span!("pmderive", op)
}
