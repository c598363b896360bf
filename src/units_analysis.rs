//! Unit & type analyser. Runs bottom-up over a bound tree
//! during binding: [`map_units`] reconciles per-dimension scales and
//! accumulates rescale factors into each operand's [`Info`]; [`map_desc`]
//! derives the result descriptor for a binary operator node from its
//! operands' descriptors, enforcing operator legality against
//! counter/non-counter semantics.

use crate::ast::{BoundNode, Descriptor, NodeKind, Semantics, TimeScale, ValueType};
use crate::error::{Dimension, NonArithmeticContext, SemanticError, Side};

/// Whether a node is a bare numeric literal (no metric behind it) — used
/// both to pick the "candidate descriptor" in `map_desc` and to relax the
/// relational dimension-equality rule.
fn is_literal(node: &BoundNode) -> bool {
    matches!(node.kind, NodeKind::Integer | NodeKind::Double)
}

/// Reconcile scales for `+ - * /` and relational operators. Mutates
/// `left.info`/`right.info` in place and returns the output units plus
/// whether any rescale fired (forcing `F64` on the caller's result type).
pub(crate) fn map_units(kind: NodeKind, left: &mut BoundNode, right: &mut BoundNode) -> (crate::ast::Units, bool) {
    let mut out = crate::ast::Units::NONE;
    let mut rescaled = false;

    // space and count dimensions use a flat per-step factor; time walks an
    // irregular table. Both share the same "pick the coarser scale, rescale
    // the finer operand" shape.
    let (_, space_rescaled) = reconcile_space(kind, left, right, &mut out);
    let (_, time_rescaled) = reconcile_time(kind, left, right, &mut out);
    let (_, count_rescaled) = reconcile_count(kind, left, right, &mut out);
    rescaled |= space_rescaled || time_rescaled || count_rescaled;

    (out, rescaled)
}

fn combine_dim(kind: NodeKind, l: i8, r: i8) -> i8 {
    match kind {
        NodeKind::Mul => l + r,
        NodeKind::Div => l - r,
        _ => {
            // + - and relational/boolean require equal dimensions (checked
            // separately in map_desc); the output dimension is just that
            // common value.
            if l != 0 {
                l
            } else {
                r
            }
        }
    }
}

fn reconcile_space(
    kind: NodeKind,
    left: &mut BoundNode,
    right: &mut BoundNode,
    out: &mut crate::ast::Units,
) -> (i8, bool) {
    let ld = left.descriptor.units.dim_space;
    let rd = right.descriptor.units.dim_space;
    out.dim_space = combine_dim(kind, ld, rd);
    if ld == 0 || rd == 0 {
        out.scale_space = if ld != 0 {
            left.descriptor.units.scale_space
        } else {
            right.descriptor.units.scale_space
        };
        return (out.dim_space, false);
    }
    let ls = left.descriptor.units.scale_space;
    let rs = right.descriptor.units.scale_space;
    if ls == rs {
        out.scale_space = ls;
        return (out.dim_space, false);
    }
    let (coarser, finer, finer_is_left) = if ls > rs { (ls, rs, false) } else { (rs, ls, true) };
    let factor = coarser.factor_from(finer);
    out.scale_space = coarser;
    apply_factor(if finer_is_left { left } else { right }, ld, factor);
    (out.dim_space, true)
}

fn reconcile_time(
    kind: NodeKind,
    left: &mut BoundNode,
    right: &mut BoundNode,
    out: &mut crate::ast::Units,
) -> (i8, bool) {
    let ld = left.descriptor.units.dim_time;
    let rd = right.descriptor.units.dim_time;
    out.dim_time = combine_dim(kind, ld, rd);
    if ld == 0 || rd == 0 {
        out.scale_time = if ld != 0 {
            left.descriptor.units.scale_time
        } else {
            right.descriptor.units.scale_time
        };
        return (out.dim_time, false);
    }
    let ls = left.descriptor.units.scale_time;
    let rs = right.descriptor.units.scale_time;
    if ls == rs {
        out.scale_time = ls;
        return (out.dim_time, false);
    }
    let (coarser, finer, finer_is_left) = if ls > rs { (ls, rs, false) } else { (rs, ls, true) };
    let factor = coarser.factor_from(finer);
    out.scale_time = coarser;
    apply_factor(if finer_is_left { left } else { right }, ld, factor);
    (out.dim_time, true)
}

fn reconcile_count(
    kind: NodeKind,
    left: &mut BoundNode,
    right: &mut BoundNode,
    out: &mut crate::ast::Units,
) -> (i8, bool) {
    let ld = left.descriptor.units.dim_count;
    let rd = right.descriptor.units.dim_count;
    out.dim_count = combine_dim(kind, ld, rd);
    if ld == 0 || rd == 0 {
        out.scale_count = if ld != 0 {
            left.descriptor.units.scale_count
        } else {
            right.descriptor.units.scale_count
        };
        return (out.dim_count, false);
    }
    let ls = left.descriptor.units.scale_count;
    let rs = right.descriptor.units.scale_count;
    if ls == rs {
        out.scale_count = ls;
        return (out.dim_count, false);
    }
    let (coarser, finer, finer_is_left) = if ls > rs { (ls, rs, false) } else { (rs, ls, true) };
    let factor = 10i64.pow((coarser - finer) as u32);
    out.scale_count = coarser;
    apply_factor(if finer_is_left { left } else { right }, ld, factor);
    (out.dim_count, true)
}

/// A rescale factor lands in `mul_scale` when the dimension sits in a
/// numerator position (`dim >= 0`) or `div_scale` when it's in a
/// denominator position (`dim < 0`).
fn apply_factor(node: &mut BoundNode, dim: i8, factor: i64) {
    if dim < 0 {
        node.info.div_scale *= factor;
    } else {
        node.info.mul_scale *= factor;
    }
}

/// Result of [`map_desc`]: either a derived [`Descriptor`] or the semantic
/// error that killed this registration's binding.
pub(crate) type DescResult = Result<Descriptor, SemanticError>;

/// Derive the result descriptor for a binary, non-ternary operator node.
/// `left`/`right` are mutated in place by [`map_units`] as a side effect.
pub(crate) fn map_desc(kind: NodeKind, left: &mut BoundNode, right: &mut BoundNode) -> DescResult {
    check_operator_legality(kind, left.descriptor.semantics, right.descriptor.semantics)?;

    // Step 2 (spec): the non-literal operand is the natural descriptor base;
    // every field below is picked from left/right directly so there is
    // nothing further to thread through.
    let both_non_counter = left.descriptor.semantics != Semantics::Counter
        && right.descriptor.semantics != Semantics::Counter;
    let semantics = if both_non_counter {
        if left.descriptor.semantics == Semantics::Discrete
            && right.descriptor.semantics == Semantics::Discrete
        {
            Semantics::Discrete
        } else {
            Semantics::Instant
        }
    } else {
        Semantics::Instant
    };

    if !left.descriptor.value_type.is_numeric() {
        return Err(SemanticError::NonArithmeticOperand(Side::Left));
    }
    if !right.descriptor.value_type.is_numeric() {
        return Err(SemanticError::NonArithmeticOperand(Side::Right));
    }

    let value_type = if kind == NodeKind::Div {
        ValueType::F64
    } else if kind.is_relational() || kind.is_boolean() {
        ValueType::U32
    } else {
        ValueType::promote(left.descriptor.value_type, right.descriptor.value_type)
    };

    if matches!(kind, NodeKind::Add | NodeKind::Sub) {
        let literal_side = is_literal(left) || is_literal(right);
        if !literal_side && !left.descriptor.units.dims_equal(&right.descriptor.units) {
            return Err(SemanticError::DimensionsNotSame);
        }
    }
    if kind.is_relational() {
        let literal_side = is_literal(left) || is_literal(right);
        if !literal_side && !left.descriptor.units.dims_equal(&right.descriptor.units) {
            return Err(SemanticError::DimensionsNotSame);
        }
    }
    if kind.is_boolean() {
        if !left.descriptor.units.is_dimensionless() || !right.descriptor.units.is_dimensionless() {
            return Err(SemanticError::DimensionsNotSame);
        }
    }
    if matches!(kind, NodeKind::Mul | NodeKind::Div) || kind.is_relational() {
        let exactly_one_counter = (left.descriptor.semantics == Semantics::Counter)
            != (right.descriptor.semantics == Semantics::Counter);
        if exactly_one_counter {
            let (counter_is_left, non_counter) = if left.descriptor.semantics == Semantics::Counter {
                (true, &right.descriptor)
            } else {
                (false, &left.descriptor)
            };
            if !non_counter.units.is_dimensionless() {
                let side = if counter_is_left { Side::Right } else { Side::Left };
                return Err(SemanticError::NonCounterNotDimensionless(side));
            }
        }
    }

    let (units, rescaled) = map_units(kind, left, right);
    let value_type = if rescaled { ValueType::F64 } else { value_type };

    let instance_domain = match (left.descriptor.instance_domain, right.descriptor.instance_domain) {
        (Some(l), Some(r)) if l != r => return Err(SemanticError::InstanceDomainMismatch),
        (Some(l), _) => Some(l),
        (None, Some(r)) => Some(r),
        (None, None) => None,
    };

    Ok(Descriptor {
        id: None,
        value_type,
        instance_domain,
        semantics,
        units,
    })
}

fn check_operator_legality(kind: NodeKind, left: Semantics, right: Semantics) -> Result<(), SemanticError> {
    let additive_or_relbool = kind.is_relational() || kind.is_boolean() || kind == NodeKind::Add || kind == NodeKind::Sub;
    let multiplicative_or_relbool = kind.is_relational() || kind.is_boolean() || matches!(kind, NodeKind::Mul | NodeKind::Div);

    match (left == Semantics::Counter, right == Semantics::Counter) {
        (true, true) => {
            if !additive_or_relbool {
                return Err(SemanticError::IllegalOperatorForCounters);
            }
        }
        (true, false) | (false, true) => {
            if !multiplicative_or_relbool {
                return Err(SemanticError::IllegalOperatorForCounterAndNonCounter);
            }
        }
        (false, false) => {} // + - * / and relational/boolean all legal
    }
    Ok(())
}

/// Ternary compatibility check. `guard` is
/// the condition; `then_`/`else_` are the two branches already wrapped in
/// `Colon`'s left/right.
pub(crate) fn check_ternary(
    guard: &BoundNode,
    then_: &BoundNode,
    else_: &BoundNode,
) -> Result<Descriptor, SemanticError> {
    if !guard.descriptor.value_type.is_numeric() {
        return Err(SemanticError::NonArithmeticGuard);
    }
    let guard_scalar = guard.descriptor.instance_domain.is_none();
    let branches_scalar = then_.descriptor.instance_domain.is_none() && else_.descriptor.instance_domain.is_none();
    if !guard_scalar && branches_scalar {
        return Err(SemanticError::NonScalarGuard);
    }

    if then_.descriptor.value_type != else_.descriptor.value_type {
        return Err(SemanticError::TernaryTypeMismatch);
    }
    if then_.descriptor.semantics != else_.descriptor.semantics {
        return Err(SemanticError::TernarySemanticsMismatch);
    }
    let u1 = &then_.descriptor.units;
    let u2 = &else_.descriptor.units;
    if u1.dim_space != u2.dim_space || u1.scale_space != u2.scale_space {
        return Err(SemanticError::TernaryUnitsMismatch(Dimension::Space));
    }
    if u1.dim_time != u2.dim_time || u1.scale_time != u2.scale_time {
        return Err(SemanticError::TernaryUnitsMismatch(Dimension::Time));
    }
    if u1.dim_count != u2.dim_count || u1.scale_count != u2.scale_count {
        return Err(SemanticError::TernaryUnitsMismatch(Dimension::Count));
    }
    let instance_domain = match (then_.descriptor.instance_domain, else_.descriptor.instance_domain) {
        (Some(l), Some(r)) if l != r => return Err(SemanticError::TernaryInstanceDomainMismatch),
        (Some(l), _) => Some(l),
        (None, Some(r)) => Some(r),
        (None, None) => None,
    };

    Ok(Descriptor {
        id: None,
        value_type: then_.descriptor.value_type,
        instance_domain,
        semantics: then_.descriptor.semantics,
        units: *u1,
    })
}

/// Function-specific descriptor rules.
pub(crate) fn map_function(kind: NodeKind, operand: &BoundNode) -> Result<Descriptor, SemanticError> {
    match kind {
        NodeKind::Count => Ok(Descriptor {
            id: None,
            value_type: ValueType::U32,
            instance_domain: None,
            semantics: Semantics::Instant,
            units: crate::ast::Units {
                dim_count: 1,
                ..crate::ast::Units::NONE
            },
        }),
        NodeKind::Instant => {
            if !operand.descriptor.value_type.is_numeric() {
                return Err(SemanticError::NonArithmeticFor(NonArithmeticContext::Function("instant")));
            }
            let mut d = operand.descriptor.clone();
            d.semantics = Semantics::Instant;
            Ok(d)
        }
        NodeKind::Avg | NodeKind::Sum | NodeKind::Min | NodeKind::Max => {
            if !operand.descriptor.value_type.is_numeric() {
                let name = kind.function_name().unwrap();
                return Err(SemanticError::NonArithmeticFor(NonArithmeticContext::Function(name)));
            }
            let value_type = if kind == NodeKind::Avg {
                ValueType::F32
            } else {
                operand.descriptor.value_type
            };
            Ok(Descriptor {
                id: None,
                value_type,
                instance_domain: None,
                semantics: Semantics::Instant,
                units: operand.descriptor.units,
            })
        }
        NodeKind::Rate => {
            if !operand.descriptor.value_type.is_numeric() {
                return Err(SemanticError::NonArithmeticFor(NonArithmeticContext::Function("rate")));
            }
            let dim_time = operand.descriptor.units.dim_time;
            if !(0..=1).contains(&dim_time) {
                return Err(SemanticError::IncorrectTimeDimension);
            }
            let out_dim_time = dim_time - 1;
            let mut units = operand.descriptor.units;
            units.dim_time = out_dim_time;
            // dim 0 makes the scale irrelevant; dim -1 is expressed as "per
            // second".
            units.scale_time = TimeScale::Sec;
            Ok(Descriptor {
                id: None,
                value_type: ValueType::F64,
                instance_domain: operand.descriptor.instance_domain,
                semantics: Semantics::Instant,
                units,
            })
        }
        NodeKind::Delta => {
            if !operand.descriptor.value_type.is_numeric() {
                return Err(SemanticError::NonArithmeticFor(NonArithmeticContext::Function("delta")));
            }
            Ok(Descriptor {
                id: None,
                value_type: operand.descriptor.value_type,
                instance_domain: operand.descriptor.instance_domain,
                semantics: Semantics::Instant,
                units: operand.descriptor.units,
            })
        }
        NodeKind::Anon => {
            // Inherits the synthesised child descriptor verbatim; never fails
            //, preserved as specified).
            Ok(operand.descriptor.clone())
        }
        _ => unreachable!("map_function called with a non-function kind"),
    }
}

/// Unary `-`.
pub(crate) fn map_neg(operand: &BoundNode) -> Result<Descriptor, SemanticError> {
    if !operand.descriptor.value_type.is_numeric() {
        return Err(SemanticError::NonArithmeticFor(NonArithmeticContext::UnaryNegation));
    }
    let mut d = operand.descriptor.clone();
    d.value_type = d.value_type.negated();
    Ok(d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Info, Units};
    use pretty_assertions::assert_eq;

    fn node(kind: NodeKind, descriptor: Descriptor) -> BoundNode {
        BoundNode {
            kind,
            left: None,
            right: None,
            value: None,
            descriptor,
            save_last: false,
            info: Info::new(None),
            location: crate::error::Location::point(0),
        }
    }

    fn counter(units: Units) -> Descriptor {
        Descriptor {
            id: None,
            value_type: ValueType::U64,
            instance_domain: None,
            semantics: Semantics::Counter,
            units,
        }
    }

    #[test]
    fn counter_plus_counter_is_legal() {
        let mut l = node(NodeKind::Name, counter(Units::NONE));
        let mut r = node(NodeKind::Name, counter(Units::NONE));
        let d = map_desc(NodeKind::Add, &mut l, &mut r).unwrap();
        assert_eq!(d.semantics, Semantics::Instant);
    }

    #[test]
    fn counter_times_counter_is_illegal() {
        let mut l = node(NodeKind::Name, counter(Units::NONE));
        let mut r = node(NodeKind::Name, counter(Units::NONE));
        let err = map_desc(NodeKind::Mul, &mut l, &mut r).unwrap_err();
        assert_eq!(err, SemanticError::IllegalOperatorForCounters);
    }

    #[test]
    fn division_result_is_always_f64() {
        let mut l = node(
            NodeKind::Name,
            Descriptor::scalar(ValueType::I32, Semantics::Discrete),
        );
        let mut r = node(
            NodeKind::Name,
            Descriptor::scalar(ValueType::I32, Semantics::Discrete),
        );
        let d = map_desc(NodeKind::Div, &mut l, &mut r).unwrap();
        assert_eq!(d.value_type, ValueType::F64);
    }

    #[test]
    fn relational_result_is_u32() {
        let mut l = node(
            NodeKind::Name,
            Descriptor::scalar(ValueType::F64, Semantics::Discrete),
        );
        let mut r = node(
            NodeKind::Name,
            Descriptor::scalar(ValueType::F64, Semantics::Discrete),
        );
        let d = map_desc(NodeKind::Lt, &mut l, &mut r).unwrap();
        assert_eq!(d.value_type, ValueType::U32);
    }

    #[test]
    fn counter_mul_non_dimensionless_is_rejected() {
        let mut l = node(NodeKind::Name, counter(Units::NONE));
        let mut r = node(
            NodeKind::Name,
            Descriptor::scalar(
                ValueType::U64,
                Semantics::Instant,
            ),
        );
        r.descriptor.units.dim_time = 1;
        let err = map_desc(NodeKind::Mul, &mut l, &mut r).unwrap_err();
        assert_eq!(err, SemanticError::NonCounterNotDimensionless(Side::Right));
    }

    #[test]
    fn rate_subtracts_one_time_dimension() {
        let mut operand = node(
            NodeKind::Name,
            Descriptor::scalar(ValueType::U64, Semantics::Counter),
        );
        operand.descriptor.units.dim_time = 1;
        let d = map_function(NodeKind::Rate, &operand).unwrap();
        assert_eq!(d.units.dim_time, 0);
        assert_eq!(d.value_type, ValueType::F64);
        assert_eq!(d.semantics, Semantics::Instant);
    }

    #[test]
    fn rate_rejects_bad_time_dimension() {
        let mut operand = node(
            NodeKind::Name,
            Descriptor::scalar(ValueType::U64, Semantics::Counter),
        );
        operand.descriptor.units.dim_time = 2;
        let err = map_function(NodeKind::Rate, &operand).unwrap_err();
        assert_eq!(err, SemanticError::IncorrectTimeDimension);
    }

    #[test]
    fn ternary_rejects_mismatched_instance_domains() {
        let guard = node(
            NodeKind::Name,
            Descriptor::scalar(ValueType::U32, Semantics::Discrete),
        );
        let mut then_ = node(
            NodeKind::Name,
            Descriptor::scalar(ValueType::U32, Semantics::Instant),
        );
        let mut else_ = node(
            NodeKind::Name,
            Descriptor::scalar(ValueType::U32, Semantics::Instant),
        );
        then_.descriptor.instance_domain = Some(crate::ast::InstanceDomain(1));
        else_.descriptor.instance_domain = Some(crate::ast::InstanceDomain(2));
        let err = check_ternary(&guard, &then_, &else_).unwrap_err();
        assert_eq!(err, SemanticError::TernaryInstanceDomainMismatch);
    }

    #[test]
    fn dimensionless_literal_plus_timed_literal_keeps_dimension_without_rescale() {
        let mut l = node(
            NodeKind::Integer,
            Descriptor::scalar(ValueType::U32, Semantics::Discrete),
        );
        let mut r = node(
            NodeKind::Integer,
            Descriptor::scalar(ValueType::U32, Semantics::Discrete),
        );
        r.descriptor.units.dim_time = 1;
        let d = map_desc(NodeKind::Add, &mut l, &mut r).unwrap();
        assert_eq!(d.units.dim_time, 1);
        assert_eq!(d.value_type, ValueType::U32);
        assert_eq!(r.info.mul_scale, 1);
        assert_eq!(r.info.div_scale, 1);
    }

    #[test]
    fn instant_plus_discrete_literal_yields_instant() {
        let mut l = node(
            NodeKind::Name,
            Descriptor::scalar(ValueType::U32, Semantics::Instant),
        );
        let mut r = node(
            NodeKind::Integer,
            Descriptor::scalar(ValueType::U32, Semantics::Discrete),
        );
        let d = map_desc(NodeKind::Add, &mut l, &mut r).unwrap();
        assert_eq!(d.semantics, Semantics::Instant);
    }
}
