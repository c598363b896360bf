//! The AST node shape and descriptor metadata.
//!
//! Two concrete tree types share one [`NodeKind`]: [`StaticNode`], produced
//! by the parser and owned forever by the registry, and [`BoundNode`],
//! produced per-context by the binder. Literal text (`value`) is shared
//! between the two via `Arc<str>` rather than copied or borrowed with a
//! lifetime: the static tree mints the `Arc`, the bound clone just bumps its
//! refcount, which gives us the "bound tree never frees them" invariant for
//! free instead of threading a lifetime parameter through every binder and
//! analyser function.

use std::fmt;
use std::sync::Arc;

use crate::error::Location;
use crate::id::MetricId;

/// The tag identifying what a node computes. Nullary (`Integer`, `Double`,
/// `Name`) and unary (`Neg`, `Not`, every aggregate/time function) kinds
/// have `right == None`; everything else is binary or the `Quest`/`Colon`
/// ternary pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Integer,
    Double,
    Name,
    Neg,
    Not,
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
    Ne,
    And,
    Or,
    Quest,
    Colon,
    Avg,
    Count,
    Delta,
    Max,
    Min,
    Sum,
    Rate,
    Instant,
    Anon,
}

impl NodeKind {
    pub fn is_nullary(self) -> bool {
        matches!(self, NodeKind::Integer | NodeKind::Double | NodeKind::Name)
    }

    pub fn is_unary(self) -> bool {
        matches!(self, NodeKind::Neg | NodeKind::Not) || self.is_aggregate_function()
    }

    /// The aggregate/time-derivative functions that set `save_last` on
    /// their `Name` child.
    pub fn is_aggregate_function(self) -> bool {
        matches!(
            self,
            NodeKind::Avg
                | NodeKind::Count
                | NodeKind::Delta
                | NodeKind::Max
                | NodeKind::Min
                | NodeKind::Sum
                | NodeKind::Rate
                | NodeKind::Instant
                | NodeKind::Anon
        )
    }

    pub fn is_arithmetic(self) -> bool {
        matches!(self, NodeKind::Add | NodeKind::Sub | NodeKind::Mul | NodeKind::Div)
    }

    pub fn is_relational(self) -> bool {
        matches!(
            self,
            NodeKind::Lt | NodeKind::Le | NodeKind::Eq | NodeKind::Ge | NodeKind::Gt | NodeKind::Ne
        )
    }

    pub fn is_boolean(self) -> bool {
        matches!(self, NodeKind::And | NodeKind::Or)
    }

    pub fn function_name(self) -> Option<&'static str> {
        Some(match self {
            NodeKind::Avg => "avg",
            NodeKind::Count => "count",
            NodeKind::Delta => "delta",
            NodeKind::Max => "max",
            NodeKind::Min => "min",
            NodeKind::Sum => "sum",
            NodeKind::Rate => "rate",
            NodeKind::Instant => "instant",
            NodeKind::Anon => "anon",
            _ => return None,
        })
    }
}

/// Value type of the result produced at a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
}

impl ValueType {
    pub fn is_numeric(self) -> bool {
        true // every ValueType variant here is numeric; kept for call-site clarity
    }

    fn rank(self) -> u8 {
        match self {
            ValueType::I32 => 0,
            ValueType::U32 => 1,
            ValueType::I64 => 2,
            ValueType::U64 => 3,
            ValueType::F32 => 4,
            ValueType::F64 => 5,
        }
    }

    /// C-like promotion: any `F64` wins, else any `F32`, else the usual
    /// integer conversions. When the two operands have the same rank
    /// (width), unsign if either side is unsigned. When ranks differ, the
    /// wider operand's signedness wins outright, since a 64-bit type (signed
    /// or not) can represent every value of a 32-bit operand of either
    /// signedness — unsigning a mixed-rank pair would be wrong, e.g.
    /// `promote(I64, U32)` must stay `I64`, not widen to `U64`.
    pub fn promote(a: ValueType, b: ValueType) -> ValueType {
        use ValueType::*;
        if a == F64 || b == F64 {
            return F64;
        }
        if a == F32 || b == F32 {
            return F32;
        }
        let is_64 = |v: ValueType| matches!(v, I64 | U64);
        let is_unsigned = |v: ValueType| matches!(v, U32 | U64);
        let (a64, b64) = (is_64(a), is_64(b));
        let (result_is_64, unsigned) = if a64 != b64 {
            let wider = if a64 { a } else { b };
            (true, is_unsigned(wider))
        } else {
            (a64, is_unsigned(a) || is_unsigned(b))
        };
        match (result_is_64, unsigned) {
            (true, true) => U64,
            (true, false) => I64,
            (false, true) => U32,
            (false, false) => I32,
        }
    }

    /// `U32`/`U64` become `I32`/`I64` under unary negation; other types are
    /// unaffected.
    pub fn negated(self) -> ValueType {
        match self {
            ValueType::U32 => ValueType::I32,
            ValueType::U64 => ValueType::I64,
            other => other,
        }
    }

    /// Whether `self` is at least as wide/precise as `other` under
    /// [`ValueType::promote`]'s ordering; used only for readability at call
    /// sites, not by the promotion algorithm itself.
    pub fn at_least(self, other: ValueType) -> bool {
        self.rank() >= other.rank()
    }
}

/// Point-in-time vs. cumulative vs. step semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Semantics {
    Counter,
    Instant,
    Discrete,
}

/// A host-assigned identifier for a metric's multi-valued shape. `None` in
/// [`Descriptor::instance_domain`] means scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceDomain(pub u32);

/// Space-dimension scale, byte..exabyte, each step 1024x the last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SpaceScale {
    Byte,
    Kbyte,
    Mbyte,
    Gbyte,
    Tbyte,
    Pbyte,
    Ebyte,
}

impl SpaceScale {
    const STEP_FACTOR: f64 = 1024.0;

    fn step_index(self) -> i32 {
        match self {
            SpaceScale::Byte => 0,
            SpaceScale::Kbyte => 1,
            SpaceScale::Mbyte => 2,
            SpaceScale::Gbyte => 3,
            SpaceScale::Tbyte => 4,
            SpaceScale::Pbyte => 5,
            SpaceScale::Ebyte => 6,
        }
    }

    /// Integer factor to multiply a value in `smaller` by to get a value in
    /// `self`-scale units, when `self` is the coarser (larger) of the two.
    pub fn factor_from(self, smaller: SpaceScale) -> i64 {
        let steps = self.step_index() - smaller.step_index();
        debug_assert!(steps >= 0);
        (Self::STEP_FACTOR as i64).pow(steps as u32)
    }
}

impl fmt::Display for SpaceScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SpaceScale::Byte => "byte",
            SpaceScale::Kbyte => "Kbyte",
            SpaceScale::Mbyte => "Mbyte",
            SpaceScale::Gbyte => "Gbyte",
            SpaceScale::Tbyte => "Tbyte",
            SpaceScale::Pbyte => "Pbyte",
            SpaceScale::Ebyte => "Ebyte",
        };
        write!(f, "{s}")
    }
}

/// Time-dimension scale, nsec..hour. Step factors are irregular
/// (`{nsec→usec 1000, usec→msec 1000, msec→sec 1000, sec→min 60,
/// min→hour 60}`), so reconciliation walks the table rather than using a
/// single exponent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimeScale {
    Nsec,
    Usec,
    Msec,
    Sec,
    Min,
    Hour,
}

impl TimeScale {
    const STEPS: [i64; 5] = [1000, 1000, 1000, 60, 60];

    fn step_index(self) -> usize {
        match self {
            TimeScale::Nsec => 0,
            TimeScale::Usec => 1,
            TimeScale::Msec => 2,
            TimeScale::Sec => 3,
            TimeScale::Min => 4,
            TimeScale::Hour => 5,
        }
    }

    /// Integer factor to multiply a value in `smaller` by to get a value in
    /// `self`-scale units, when `self` is the coarser (larger) of the two.
    pub fn factor_from(self, smaller: TimeScale) -> i64 {
        let mut factor = 1i64;
        for step in smaller.step_index()..self.step_index() {
            factor *= Self::STEPS[step];
        }
        factor
    }
}

impl fmt::Display for TimeScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TimeScale::Nsec => "nsec",
            TimeScale::Usec => "usec",
            TimeScale::Msec => "msec",
            TimeScale::Sec => "sec",
            TimeScale::Min => "min",
            TimeScale::Hour => "hour",
        };
        write!(f, "{s}")
    }
}

/// The full units tuple: three dimensions plus their scales.
/// Count's scale is carried as a bare decimal exponent `n` (value is
/// `10^n`); each scale step changes `n` by 1, a factor of 10 per step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Units {
    pub dim_space: i8,
    pub dim_time: i8,
    pub dim_count: i8,
    pub scale_space: SpaceScale,
    pub scale_time: TimeScale,
    pub scale_count: i8,
}

impl Units {
    pub const NONE: Units = Units {
        dim_space: 0,
        dim_time: 0,
        dim_count: 0,
        scale_space: SpaceScale::Byte,
        scale_time: TimeScale::Sec,
        scale_count: 0,
    };

    pub fn is_dimensionless(&self) -> bool {
        self.dim_space == 0 && self.dim_time == 0 && self.dim_count == 0
    }

    pub fn dims_equal(&self, other: &Units) -> bool {
        self.dim_space == other.dim_space
            && self.dim_time == other.dim_time
            && self.dim_count == other.dim_count
    }

    pub fn dims_and_scales_equal(&self, other: &Units) -> bool {
        self.dims_equal(other)
            && self.scale_space == other.scale_space
            && self.scale_time == other.scale_time
            && self.scale_count == other.scale_count
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.dim_space != 0 {
            parts.push(format!("{}^{}", self.scale_space, self.dim_space));
        }
        if self.dim_time != 0 {
            parts.push(format!("{}^{}", self.scale_time, self.dim_time));
        }
        if self.dim_count != 0 {
            parts.push(format!("count(10^{})^{}", self.scale_count, self.dim_count));
        }
        if parts.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", parts.join(" "))
        }
    }
}

/// Metadata describing the value produced at a node.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    pub id: Option<MetricId>,
    pub value_type: ValueType,
    pub instance_domain: Option<InstanceDomain>,
    pub semantics: Semantics,
    pub units: Units,
}

impl Descriptor {
    pub fn scalar(value_type: ValueType, semantics: Semantics) -> Self {
        Descriptor {
            id: None,
            value_type,
            instance_domain: None,
            semantics,
            units: Units::NONE,
        }
    }
}

/// Evaluator scratch attached only to bound copies. The numeric fields are
/// opaque to this crate; the runtime evaluator that consumes a bound tree
/// is an external collaborator.
#[derive(Debug, Clone, Default)]
pub struct Info {
    pub resolved_id: Option<MetricId>,
    pub current_numval: f64,
    pub last_numval: f64,
    pub current_samples: u64,
    pub last_samples: u64,
    pub timestamp: Option<u64>,
    pub last_timestamp: Option<u64>,
    pub mul_scale: i64,
    pub div_scale: i64,
    pub time_scale: Option<TimeScale>,
}

impl Info {
    pub fn new(resolved_id: Option<MetricId>) -> Self {
        Info {
            resolved_id,
            mul_scale: 1,
            div_scale: 1,
            ..Default::default()
        }
    }
}

/// A parser-produced node. Owns its `value` text via a freshly-minted
/// `Arc<str>`; `descriptor` is only populated for literal nodes (`Integer`,
/// `Double`) whose type is known without consulting a host.
#[derive(Debug, Clone)]
pub struct StaticNode {
    pub kind: NodeKind,
    pub left: Option<Box<StaticNode>>,
    pub right: Option<Box<StaticNode>>,
    pub value: Option<Arc<str>>,
    pub descriptor: Option<Descriptor>,
    pub save_last: bool,
    pub location: Location,
}

impl StaticNode {
    pub fn leaf(kind: NodeKind, value: impl Into<Arc<str>>, location: Location) -> Self {
        StaticNode {
            kind,
            left: None,
            right: None,
            value: Some(value.into()),
            descriptor: None,
            save_last: false,
            location,
        }
    }

    pub fn literal(kind: NodeKind, value: impl Into<Arc<str>>, descriptor: Descriptor, location: Location) -> Self {
        StaticNode {
            kind,
            left: None,
            right: None,
            value: Some(value.into()),
            descriptor: Some(descriptor),
            save_last: false,
            location,
        }
    }

    pub fn unary(kind: NodeKind, left: StaticNode, location: Location) -> Self {
        let save_last = kind.is_aggregate_function();
        let mut left = left;
        if save_last {
            left.save_last = true;
        }
        StaticNode {
            kind,
            left: Some(Box::new(left)),
            right: None,
            value: None,
            descriptor: None,
            save_last: false,
            location,
        }
    }

    pub fn binary(kind: NodeKind, left: StaticNode, right: StaticNode, location: Location) -> Self {
        StaticNode {
            kind,
            left: Some(Box::new(left)),
            right: Some(Box::new(right)),
            value: None,
            descriptor: None,
            save_last: false,
            location,
        }
    }

    /// Builds the `Quest(cond, Colon(then, else))` shape.
    pub fn ternary(cond: StaticNode, then: StaticNode, else_: StaticNode, location: Location) -> Self {
        let colon = StaticNode::binary(NodeKind::Colon, then, else_, location);
        StaticNode::binary(NodeKind::Quest, cond, colon, location)
    }
}

/// A per-context clone of a [`StaticNode`]: shares `value` text, always
/// carries a [`Descriptor`] (computed bottom-up by the binder) and an
/// [`Info`] scratch block.
#[derive(Debug, Clone)]
pub struct BoundNode {
    pub kind: NodeKind,
    pub left: Option<Box<BoundNode>>,
    pub right: Option<Box<BoundNode>>,
    pub value: Option<Arc<str>>,
    pub descriptor: Descriptor,
    pub save_last: bool,
    pub info: Info,
    pub location: Location,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promote_is_symmetric() {
        use ValueType::*;
        let types = [I32, U32, I64, U64, F32, F64];
        for &a in &types {
            for &b in &types {
                assert_eq!(ValueType::promote(a, b), ValueType::promote(b, a));
            }
        }
    }

    #[test]
    fn promote_prefers_floats_then_width_then_sign() {
        use ValueType::*;
        assert_eq!(ValueType::promote(F64, I32), F64);
        assert_eq!(ValueType::promote(F32, F64), F64);
        assert_eq!(ValueType::promote(I32, F32), F32);
        assert_eq!(ValueType::promote(I64, U32), I64);
        assert_eq!(ValueType::promote(U64, I64), U64);
        assert_eq!(ValueType::promote(I32, U32), U32);
    }

    #[test]
    fn negation_unsigns_to_signed() {
        assert_eq!(ValueType::U32.negated(), ValueType::I32);
        assert_eq!(ValueType::U64.negated(), ValueType::I64);
        assert_eq!(ValueType::F64.negated(), ValueType::F64);
    }

    #[test]
    fn space_scale_factor() {
        assert_eq!(SpaceScale::Mbyte.factor_from(SpaceScale::Kbyte), 1024);
        assert_eq!(SpaceScale::Mbyte.factor_from(SpaceScale::Byte), 1024 * 1024);
    }

    #[test]
    fn time_scale_factor_walks_irregular_table() {
        assert_eq!(TimeScale::Usec.factor_from(TimeScale::Nsec), 1000);
        assert_eq!(TimeScale::Hour.factor_from(TimeScale::Min), 60);
        assert_eq!(TimeScale::Min.factor_from(TimeScale::Sec), 60);
        assert_eq!(TimeScale::Hour.factor_from(TimeScale::Sec), 3600);
    }
}
