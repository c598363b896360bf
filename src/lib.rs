//! A DSL front-end and semantic analyser for *derived metrics*: expressions
//! over existing performance-monitoring metric names (e.g.
//! `disk.dev.read`) that yield new virtual metrics. An embedding engine
//! accepts registrations of the form `name = expression`, and this crate
//! lexes, parses, type-checks and binds each one against a host-supplied
//! metric dictionary (see [`host::HostContext`]).
//!
//! The pipeline: [`parser`] turns source text into a [`ast::StaticNode`]
//! tree, owned forever by a [`registry::Registry`]; on [`registry::Registry::open_context`],
//! [`binder`] clones each static tree into a per-context [`ast::BoundNode`],
//! resolving names and running [`units_analysis`]'s type/unit checks
//! bottom-up.
//!
//! Out of scope: arbitrary-precision arithmetic, a general-purpose
//! expression language, and hot-reloading of definitions at runtime.

mod ast;
mod binder;
mod collections;
mod config;
mod error;
mod host;
mod id;
mod lexer;
mod logging;
mod parser;
mod registry;
mod units_analysis;

pub use ast::{BoundNode, Descriptor, Info, InstanceDomain, NodeKind, Semantics, SpaceScale, StaticNode, TimeScale, Units, ValueType};
pub use config::{resolve_path_spec_from_env, DERIVED_CONFIG_VAR};
pub use error::{format_report, last_error, Dimension, Error, ErrorKind, Location, NonArithmeticContext, SemanticError, Side};
pub use host::{HostContext, MapHost};
pub use id::{MetricId, DERIVED_DOMAIN};
pub use registry::{global, ContextId, DescribeError, Registry};

#[cfg(test)]
mod integration_smoke {
    use super::*;

    #[test]
    fn registers_binds_and_traverses_one_metric() {
        let registry = Registry::new();
        let id = MetricId::derived(1);
        let host = MapHost::new().with_metric(
            "kernel.all.cpu.user",
            id,
            Descriptor::scalar(ValueType::U64, Semantics::Counter),
        );
        registry
            .register("kernel.util", "kernel.all.cpu.user + kernel.all.cpu.user", false)
            .unwrap();
        let ctx = registry.open_context(&host);
        assert_eq!(registry.traverse(ctx, ""), vec!["kernel.util".to_string()]);
        registry.close_context(ctx);
    }
}
