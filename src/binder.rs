//! Binder: materialises a per-context [`BoundNode`] tree from
//! a registration's static AST, resolving `Name` leaves against the host's
//! metric dictionary and running the unit/type analyser bottom-up.
//!
//! One function per node category, called recursively, each returning
//! early on the first error rather than attempting recovery: errors never
//! propagate partway through one expression and stop short, they either
//! fully resolve or fully abort.

use crate::ast::{BoundNode, Descriptor, Info, NodeKind, StaticNode};
use crate::error::{Error, ErrorKind};
use crate::host::HostContext;
use crate::id::MetricId;
use crate::units_analysis::{check_ternary, map_desc, map_function, map_neg};

/// Bind a single registration's static AST under `host`, returning the root
/// bound node with the registration's id stamped onto it.
///
/// Returns `Ok(None)` for the two silently-disabling conditions: an
/// unresolved name, or a name-clash with a non-derived id. The caller, not
/// this function, decides whether that's worth logging. Any other semantic
/// or resolution failure propagates as an `Err`, which the caller publishes
/// to the error channel before recording the registration as disabled.
pub(crate) fn bind(
    registration_id: MetricId,
    registration_name: &str,
    root: &StaticNode,
    host: &dyn HostContext,
) -> Result<Option<BoundNode>, Error> {
    if let Some(existing) = host.lookup_name(registration_name) {
        if host.is_non_derived(existing) {
            return Ok(None);
        }
    }

    let mut bound = match bind_node(root, host)? {
        Some(node) => node,
        None => return Ok(None),
    };
    bound.descriptor.id = Some(registration_id);
    Ok(Some(bound))
}

/// Recursively bind one node. `Ok(None)` propagates an unresolved-name
/// disable up to the caller without allocating an `Error`.
fn bind_node(node: &StaticNode, host: &dyn HostContext) -> Result<Option<BoundNode>, Error> {
    let kind = node.kind;
    match kind {
        NodeKind::Integer | NodeKind::Double => Ok(Some(literal(node))),
        NodeKind::Name => bind_name(node, host),
        NodeKind::Neg => bind_unary(node, host, |operand| {
            map_neg(operand).map_err(|e| Error::at(ErrorKind::Semantic(e), node.location))
        }),
        NodeKind::Not => bind_unary(node, host, |operand| {
            map_not(operand).map_err(|e| Error::at(ErrorKind::Semantic(e), node.location))
        }),
        NodeKind::Avg
        | NodeKind::Count
        | NodeKind::Delta
        | NodeKind::Max
        | NodeKind::Min
        | NodeKind::Sum
        | NodeKind::Rate
        | NodeKind::Instant
        | NodeKind::Anon => bind_unary(node, host, |operand| {
            map_function(kind, operand).map_err(|e| Error::at(ErrorKind::Semantic(e), node.location))
        }),
        NodeKind::Quest => bind_ternary(node, host),
        NodeKind::Add
        | NodeKind::Sub
        | NodeKind::Mul
        | NodeKind::Div
        | NodeKind::Lt
        | NodeKind::Le
        | NodeKind::Eq
        | NodeKind::Ge
        | NodeKind::Gt
        | NodeKind::Ne
        | NodeKind::And
        | NodeKind::Or => bind_binary(node, host),
        NodeKind::Colon => unreachable!("Colon is only ever bound as part of its parent Quest"),
    }
}

fn literal(node: &StaticNode) -> BoundNode {
    let descriptor = node
        .descriptor
        .clone()
        .expect("parser always attaches a descriptor to literal nodes");
    BoundNode {
        kind: node.kind,
        left: None,
        right: None,
        value: node.value.clone(),
        descriptor,
        save_last: node.save_last,
        info: Info::new(None),
        location: node.location,
    }
}

fn bind_name(node: &StaticNode, host: &dyn HostContext) -> Result<Option<BoundNode>, Error> {
    let name = node.value.as_ref().expect("Name node always carries its text");
    let Some(id) = host.lookup_name(name) else {
        return Ok(None);
    };
    let Some(descriptor) = host.lookup_desc(id) else {
        return Ok(None);
    };
    Ok(Some(BoundNode {
        kind: NodeKind::Name,
        left: None,
        right: None,
        value: Some(name.clone()),
        descriptor,
        save_last: node.save_last,
        info: Info::new(Some(id)),
        location: node.location,
    }))
}

fn bind_unary(
    node: &StaticNode,
    host: &dyn HostContext,
    describe: impl FnOnce(&BoundNode) -> Result<Descriptor, Error>,
) -> Result<Option<BoundNode>, Error> {
    let child = node.left.as_ref().expect("unary node always has a left child");
    let Some(operand) = bind_node(child, host)? else {
        return Ok(None);
    };
    let descriptor = describe(&operand)?;
    Ok(Some(BoundNode {
        kind: node.kind,
        left: Some(Box::new(operand)),
        right: None,
        value: None,
        descriptor,
        save_last: node.save_last,
        info: Info::new(None),
        location: node.location,
    }))
}

fn bind_binary(node: &StaticNode, host: &dyn HostContext) -> Result<Option<BoundNode>, Error> {
    let left_static = node.left.as_ref().expect("binary node always has a left child");
    let right_static = node.right.as_ref().expect("binary node always has a right child");
    let Some(mut left) = bind_node(left_static, host)? else {
        return Ok(None);
    };
    let Some(mut right) = bind_node(right_static, host)? else {
        return Ok(None);
    };
    let descriptor =
        map_desc(node.kind, &mut left, &mut right).map_err(|e| Error::at(ErrorKind::Semantic(e), node.location))?;
    Ok(Some(BoundNode {
        kind: node.kind,
        left: Some(Box::new(left)),
        right: Some(Box::new(right)),
        value: None,
        descriptor,
        save_last: node.save_last,
        info: Info::new(None),
        location: node.location,
    }))
}

fn bind_ternary(node: &StaticNode, host: &dyn HostContext) -> Result<Option<BoundNode>, Error> {
    let cond_static = node.left.as_ref().expect("Quest always has a guard");
    let colon_static = node.right.as_ref().expect("Quest always has a Colon child");
    let then_static = colon_static.left.as_ref().expect("Colon always has a then branch");
    let else_static = colon_static.right.as_ref().expect("Colon always has an else branch");

    let Some(guard) = bind_node(cond_static, host)? else {
        return Ok(None);
    };
    let Some(then_) = bind_node(then_static, host)? else {
        return Ok(None);
    };
    let Some(else_) = bind_node(else_static, host)? else {
        return Ok(None);
    };

    let descriptor = check_ternary(&guard, &then_, &else_)
        .map_err(|e| Error::at(ErrorKind::Semantic(e), node.location))?;

    let colon = BoundNode {
        kind: NodeKind::Colon,
        left: Some(Box::new(then_)),
        right: Some(Box::new(else_)),
        value: None,
        descriptor: descriptor.clone(),
        save_last: false,
        info: Info::new(None),
        location: colon_static.location,
    };
    Ok(Some(BoundNode {
        kind: NodeKind::Quest,
        left: Some(Box::new(guard)),
        right: Some(Box::new(colon)),
        value: None,
        descriptor,
        save_last: false,
        info: Info::new(None),
        location: node.location,
    }))
}

/// Unary `!`: treated like the boolean binary operators it complements —
/// numeric, dimensionless operand, `U32`/`Instant` result.
fn map_not(operand: &BoundNode) -> Result<Descriptor, crate::error::SemanticError> {
    use crate::ast::{Semantics, ValueType};
    use crate::error::{NonArithmeticContext, SemanticError};

    if !operand.descriptor.value_type.is_numeric() {
        return Err(SemanticError::NonArithmeticFor(NonArithmeticContext::Function("!")));
    }
    if !operand.descriptor.units.is_dimensionless() {
        return Err(SemanticError::DimensionsNotSame);
    }
    Ok(Descriptor {
        id: None,
        value_type: ValueType::U32,
        instance_domain: operand.descriptor.instance_domain,
        semantics: Semantics::Instant,
        units: operand.descriptor.units,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Semantics, Units, ValueType};
    use crate::host::MapHost;
    use crate::parser;

    fn bind_source(src: &str, host: &MapHost) -> Option<BoundNode> {
        let ast = parser::parse(src).expect("parses");
        bind(MetricId::derived(1), "under_test", &ast, host).expect("binds without a hard error")
    }

    #[test]
    fn binds_simple_counter_sum() {
        let id_user = MetricId::derived(100);
        let id_sys = MetricId::derived(101);
        let host = MapHost::new()
            .with_metric(
                "kernel.all.cpu.user",
                id_user,
                Descriptor::scalar(ValueType::U64, Semantics::Counter),
            )
            .with_metric(
                "kernel.all.cpu.sys",
                id_sys,
                Descriptor::scalar(ValueType::U64, Semantics::Counter),
            );
        let bound = bind_source("kernel.all.cpu.user + kernel.all.cpu.sys", &host).unwrap();
        assert_eq!(bound.kind, NodeKind::Add);
        assert_eq!(bound.descriptor.id, Some(MetricId::derived(1)));
        assert_eq!(bound.descriptor.semantics, Semantics::Instant);
    }

    #[test]
    fn unresolved_name_disables_binding() {
        let host = MapHost::new();
        let ast = parser::parse("no.such.metric").unwrap();
        let bound = bind(MetricId::derived(1), "bad", &ast, &host).unwrap();
        assert!(bound.is_none());
    }

    #[test]
    fn name_clash_with_non_derived_disables_binding() {
        // MetricId::derived never produces a non-derived id, so the clash
        // condition is exercised by overriding `is_non_derived` directly.
        struct ClashHost;
        impl HostContext for ClashHost {
            fn lookup_name(&self, _name: &str) -> Option<MetricId> {
                Some(MetricId::derived(1))
            }
            fn lookup_desc(&self, _id: MetricId) -> Option<Descriptor> {
                Some(Descriptor::scalar(ValueType::U32, Semantics::Instant))
            }
            fn is_non_derived(&self, _id: MetricId) -> bool {
                true
            }
        }
        let ast = parser::parse("1 + 1").unwrap();
        let bound = bind(MetricId::derived(2), "kernel.util", &ast, &ClashHost).unwrap();
        assert!(bound.is_none());
    }

    #[test]
    fn rate_of_counter_binds_to_instant_f64() {
        let id = MetricId::derived(200);
        let mut desc = Descriptor::scalar(ValueType::U64, Semantics::Counter);
        desc.units.dim_time = 1;
        let host = MapHost::new().with_metric("disk.dev.total_bytes", id, desc);
        let bound = bind_source("rate(disk.dev.total_bytes)", &host).unwrap();
        assert_eq!(bound.kind, NodeKind::Rate);
        assert_eq!(bound.descriptor.value_type, ValueType::F64);
        assert_eq!(bound.descriptor.units.dim_time, 0);
        assert!(bound.left.unwrap().save_last);
    }

    #[test]
    fn ternary_requires_matching_units() {
        let id_a = MetricId::derived(10);
        let id_b = MetricId::derived(11);
        let id_c = MetricId::derived(12);
        let mut time_units = Units::NONE;
        time_units.dim_time = 1;
        let host = MapHost::new()
            .with_metric("a", id_a, Descriptor::scalar(ValueType::U32, Semantics::Discrete))
            .with_metric(
                "b",
                id_b,
                Descriptor {
                    units: time_units,
                    ..Descriptor::scalar(ValueType::U32, Semantics::Instant)
                },
            )
            .with_metric("c", id_c, Descriptor::scalar(ValueType::U32, Semantics::Instant));
        let ast = parser::parse("a > 0 ? b : c").unwrap();
        let err = bind(MetricId::derived(1), "q", &ast, &host).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Semantic(_)));
    }
}
