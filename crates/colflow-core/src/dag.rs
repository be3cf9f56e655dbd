//! Logical plan DAG: immutable, reference-counted plan nodes.
//!
//! A `PlanNode` describes one transformation: a closed operator tag, literal
//! parameters, opaque runtime parameters and its ordered inputs. Nodes are
//! shared through `Arc` so common sub-plans stay shared; rewrites never mutate
//! a node, they build a new one and re-point the parents.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::infer::InferenceCache;
use crate::schema::DataType;
use crate::source::BatchSource;
use crate::types::Scalar;

/// Shared handle to a plan node.
pub type PNode = Arc<PlanNode>;

/// Per-row user function producing a single value.
pub type RowFn = Arc<dyn Fn(&[Scalar]) -> Result<Scalar, String> + Send + Sync>;

/// Per-row user function filling a fixed-width output row.
pub type GeneralizedFn = Arc<dyn Fn(&[Scalar], &mut [Scalar]) -> Result<(), String> + Send + Sync>;

/// Closed set of operator kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OperatorKind {
    Source,
    Range,
    Constant,
    Project,
    Union,
    Transform,
    BinaryTransform,
    GeneralizedTransform,
    Ternary,
    LogicalFilter,
    Append,
}

/// Static attributes of an operator kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatorAttributes {
    /// Required number of inputs.
    pub arity: usize,
    /// Exactly one output row per input row, order preserved.
    pub linear: bool,
    /// Leaf that produces rows on its own.
    pub source: bool,
}

impl OperatorKind {
    pub const ALL: [OperatorKind; 11] = [
        OperatorKind::Source,
        OperatorKind::Range,
        OperatorKind::Constant,
        OperatorKind::Project,
        OperatorKind::Union,
        OperatorKind::Transform,
        OperatorKind::BinaryTransform,
        OperatorKind::GeneralizedTransform,
        OperatorKind::Ternary,
        OperatorKind::LogicalFilter,
        OperatorKind::Append,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            OperatorKind::Source => "source",
            OperatorKind::Range => "range",
            OperatorKind::Constant => "constant",
            OperatorKind::Project => "project",
            OperatorKind::Union => "union",
            OperatorKind::Transform => "transform",
            OperatorKind::BinaryTransform => "binary_transform",
            OperatorKind::GeneralizedTransform => "generalized_transform",
            OperatorKind::Ternary => "ternary",
            OperatorKind::LogicalFilter => "logical_filter",
            OperatorKind::Append => "append",
        }
    }

    pub const fn attributes(self) -> OperatorAttributes {
        let (arity, linear, source) = match self {
            OperatorKind::Source | OperatorKind::Range | OperatorKind::Constant => (0, true, true),
            OperatorKind::Project
            | OperatorKind::Transform
            | OperatorKind::GeneralizedTransform => (1, true, false),
            OperatorKind::Union | OperatorKind::BinaryTransform => (2, true, false),
            OperatorKind::Ternary => (3, true, false),
            OperatorKind::LogicalFilter | OperatorKind::Append => (2, false, false),
        };
        OperatorAttributes {
            arity,
            linear,
            source,
        }
    }

    /// Scalar parameters that must be present for a node of this kind.
    pub const fn required_scalar_params(self) -> &'static [&'static str] {
        match self {
            OperatorKind::Source => &["columns", "begin", "end"],
            OperatorKind::Range => &["start", "end"],
            OperatorKind::Constant => &["value", "length"],
            OperatorKind::Project => &["indices"],
            OperatorKind::Transform => &["output_type"],
            OperatorKind::BinaryTransform => &["op"],
            OperatorKind::GeneralizedTransform => &["output_types"],
            OperatorKind::Union
            | OperatorKind::Ternary
            | OperatorKind::LogicalFilter
            | OperatorKind::Append => &[],
        }
    }

    /// Opaque parameters that must be present for a node of this kind.
    pub const fn required_opaque_params(self) -> &'static [&'static str] {
        match self {
            OperatorKind::Source => &["source"],
            OperatorKind::Transform | OperatorKind::GeneralizedTransform => &["function"],
            _ => &[],
        }
    }
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Small serializable literal used for scalar parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Literal>),
}

impl Literal {
    pub fn ints<I: IntoIterator<Item = usize>>(vals: I) -> Self {
        Literal::List(vals.into_iter().map(|v| Literal::Int(v as i64)).collect())
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Literal::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Literal]> {
        match self {
            Literal::List(items) => Some(items),
            _ => None,
        }
    }

    /// Runtime value of a literal. Lists have no scalar form.
    pub fn to_scalar(&self) -> Option<Scalar> {
        match self {
            Literal::Int(v) => Some(Scalar::I64(*v)),
            Literal::Float(v) => Some(Scalar::F64(*v)),
            Literal::Str(s) => Some(Scalar::Str(s.clone())),
            Literal::List(_) => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(v) => write!(f, "{v}"),
            Literal::Float(v) => write!(f, "{v:?}"),
            Literal::Str(s) => write!(f, "{s:?}"),
            Literal::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<i64> for Literal {
    fn from(v: i64) -> Self {
        Literal::Int(v)
    }
}

impl From<f64> for Literal {
    fn from(v: f64) -> Self {
        Literal::Float(v)
    }
}

impl From<&str> for Literal {
    fn from(v: &str) -> Self {
        Literal::Str(v.to_string())
    }
}

impl From<String> for Literal {
    fn from(v: String) -> Self {
        Literal::Str(v)
    }
}

/// Non-serializable runtime parameter, valid only inside this process.
#[derive(Clone)]
pub enum OpaqueValue {
    RowFn(RowFn),
    GeneralizedFn(GeneralizedFn),
    Source(Arc<dyn BatchSource>),
}

impl OpaqueValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            OpaqueValue::RowFn(_) => "row_fn",
            OpaqueValue::GeneralizedFn(_) => "generalized_fn",
            OpaqueValue::Source(_) => "batch_source",
        }
    }

    /// Identity of the shared value (address of the `Arc` target).
    pub fn addr(&self) -> usize {
        match self {
            OpaqueValue::RowFn(f) => Arc::as_ptr(f) as *const () as usize,
            OpaqueValue::GeneralizedFn(f) => Arc::as_ptr(f) as *const () as usize,
            OpaqueValue::Source(s) => Arc::as_ptr(s) as *const () as usize,
        }
    }

    pub fn same_as(&self, other: &OpaqueValue) -> bool {
        self.kind_name() == other.kind_name() && self.addr() == other.addr()
    }
}

impl fmt::Debug for OpaqueValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpaqueValue::Source(s) => write!(f, "<batch_source {s:?}>"),
            other => write!(f, "<{}>", other.kind_name()),
        }
    }
}

/// Element-wise operator for `BinaryTransform`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub const fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }

    pub fn is_comparison(self) -> bool {
        !matches!(self, BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul)
    }
}

impl FromStr for BinaryOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::Ne,
            "<" => BinaryOp::Lt,
            "<=" => BinaryOp::Le,
            ">" => BinaryOp::Gt,
            ">=" => BinaryOp::Ge,
            other => return Err(format!("unknown binary op '{other}'")),
        })
    }
}

/// One node of the logical plan.
///
/// Invariants (checked by [`make_plan_node`]): `inputs.len()` equals the
/// kind's arity, required parameters are present and well-formed, column
/// indices are in range, and aligned inputs have equal known lengths.
#[derive(Debug)]
pub struct PlanNode {
    kind: OperatorKind,
    scalar_params: BTreeMap<String, Literal>,
    opaque_params: BTreeMap<String, OpaqueValue>,
    inputs: Vec<PNode>,
}

impl PlanNode {
    pub fn kind(&self) -> OperatorKind {
        self.kind
    }

    pub fn attributes(&self) -> OperatorAttributes {
        self.kind.attributes()
    }

    pub fn scalar_params(&self) -> &BTreeMap<String, Literal> {
        &self.scalar_params
    }

    pub fn opaque_params(&self) -> &BTreeMap<String, OpaqueValue> {
        &self.opaque_params
    }

    pub fn inputs(&self) -> &[PNode] {
        &self.inputs
    }

    pub fn input(&self, idx: usize) -> &PNode {
        &self.inputs[idx]
    }

    pub fn scalar(&self, name: &str) -> Option<&Literal> {
        self.scalar_params.get(name)
    }

    pub fn opaque(&self, name: &str) -> Option<&OpaqueValue> {
        self.opaque_params.get(name)
    }

    /// Integer parameter that construction guaranteed to exist.
    pub fn int_param(&self, name: &str) -> i64 {
        self.scalar(name)
            .and_then(Literal::as_int)
            .unwrap_or_else(|| panic!("{} node has no integer parameter '{name}'", self.kind))
    }

    /// List-of-index parameter that construction guaranteed to exist.
    pub fn indices_param(&self, name: &str) -> Vec<usize> {
        self.scalar(name)
            .and_then(Literal::as_list)
            .unwrap_or_else(|| panic!("{} node has no list parameter '{name}'", self.kind))
            .iter()
            .map(|l| l.as_int().map(|v| v as usize).unwrap_or(usize::MAX))
            .collect()
    }

    pub fn str_param(&self, name: &str) -> &str {
        self.scalar(name)
            .and_then(Literal::as_str)
            .unwrap_or_else(|| panic!("{} node has no string parameter '{name}'", self.kind))
    }

    pub fn batch_source(&self) -> Option<&Arc<dyn BatchSource>> {
        match self.opaque("source") {
            Some(OpaqueValue::Source(s)) => Some(s),
            _ => None,
        }
    }

    pub fn row_fn(&self) -> Option<&RowFn> {
        match self.opaque("function") {
            Some(OpaqueValue::RowFn(f)) => Some(f),
            _ => None,
        }
    }

    pub fn generalized_fn(&self) -> Option<&GeneralizedFn> {
        match self.opaque("function") {
            Some(OpaqueValue::GeneralizedFn(f)) => Some(f),
            _ => None,
        }
    }

    pub fn binary_op(&self) -> BinaryOp {
        self.str_param("op")
            .parse()
            .unwrap_or_else(|e| panic!("binary_transform node: {e}"))
    }

    /// Tagged by the final optimizer stage as an unmodified view of source columns.
    pub fn is_direct_source(&self) -> bool {
        self.scalar("direct_source").and_then(Literal::as_int) == Some(1)
    }

    /// Same node with different inputs (validated like any new node).
    pub fn with_inputs(&self, inputs: Vec<PNode>) -> PNode {
        make_plan_node(
            self.kind,
            inputs,
            self.scalar_params.clone(),
            self.opaque_params.clone(),
        )
    }

    /// Same node with one scalar parameter added or replaced.
    pub fn with_scalar_param(&self, name: &str, value: Literal) -> PNode {
        let mut params = self.scalar_params.clone();
        params.insert(name.to_string(), value);
        make_plan_node(
            self.kind,
            self.inputs.clone(),
            params,
            self.opaque_params.clone(),
        )
    }
}

/// Address-based identity of a node (valid while the node is alive).
pub fn node_addr(node: &PNode) -> usize {
    Arc::as_ptr(node) as usize
}

/// Build and validate a plan node.
///
/// # Panics
///
/// A malformed node (wrong arity, missing or ill-typed parameter, index out
/// of range, misaligned inputs) is a programming error and panics.
pub fn make_plan_node(
    kind: OperatorKind,
    inputs: Vec<PNode>,
    scalar_params: BTreeMap<String, Literal>,
    opaque_params: BTreeMap<String, OpaqueValue>,
) -> PNode {
    let attrs = kind.attributes();
    assert_eq!(
        inputs.len(),
        attrs.arity,
        "malformed plan: {kind} expects {} inputs, got {}",
        attrs.arity,
        inputs.len()
    );
    for name in kind.required_scalar_params() {
        assert!(
            scalar_params.contains_key(*name),
            "malformed plan: {kind} is missing scalar parameter '{name}'"
        );
    }
    for name in kind.required_opaque_params() {
        assert!(
            opaque_params.contains_key(*name),
            "malformed plan: {kind} is missing opaque parameter '{name}'"
        );
    }

    let node = PlanNode {
        kind,
        scalar_params,
        opaque_params,
        inputs,
    };
    if let Err(msg) = validate(&node) {
        panic!("malformed plan: {kind}: {msg}");
    }
    Arc::new(node)
}

fn validate(node: &PlanNode) -> Result<(), String> {
    let mut cache = InferenceCache::default();
    let input_types: Vec<Vec<DataType>> =
        node.inputs.iter().map(|i| cache.output_types(i)).collect();
    let input_lengths: Vec<Option<u64>> =
        node.inputs.iter().map(|i| cache.output_length(i)).collect();

    let int = |name: &str| -> Result<i64, String> {
        node.scalar(name)
            .and_then(Literal::as_int)
            .ok_or_else(|| format!("parameter '{name}' must be an integer"))
    };
    let index_list = |name: &str| -> Result<Vec<i64>, String> {
        let items = node
            .scalar(name)
            .and_then(Literal::as_list)
            .ok_or_else(|| format!("parameter '{name}' must be a list"))?;
        if items.is_empty() {
            return Err(format!("parameter '{name}' must not be empty"));
        }
        items
            .iter()
            .map(|l| l.as_int().ok_or_else(|| format!("parameter '{name}' must hold integers")))
            .collect()
    };
    let single_column = |idx: usize, what: &str| -> Result<(), String> {
        if input_types[idx].len() != 1 {
            return Err(format!(
                "{what} input must have exactly one column, got {}",
                input_types[idx].len()
            ));
        }
        Ok(())
    };

    if let Some(tag) = node.scalar("direct_source") {
        if tag.as_int() != Some(1) {
            return Err("parameter 'direct_source' must be 1".into());
        }
    }

    match node.kind {
        OperatorKind::Source => {
            let src = node
                .batch_source()
                .ok_or("opaque parameter 'source' must be a batch source")?;
            let ncols = src.column_types().len() as i64;
            for c in index_list("columns")? {
                if c < 0 || c >= ncols {
                    return Err(format!("column {c} out of range ({ncols} columns)"));
                }
            }
            let (begin, end) = (int("begin")?, int("end")?);
            if begin < 0 || begin > end || end as u64 > src.num_rows() {
                return Err(format!(
                    "row range {begin}..{end} outside 0..{}",
                    src.num_rows()
                ));
            }
        }
        OperatorKind::Range => {
            if int("start")? > int("end")? {
                return Err("range start exceeds end".into());
            }
        }
        OperatorKind::Constant => {
            if node.scalar("value").and_then(Literal::to_scalar).is_none() {
                return Err("parameter 'value' must be a non-list literal".into());
            }
            if int("length")? < 0 {
                return Err("constant length must be non-negative".into());
            }
        }
        OperatorKind::Project => {
            let ncols = input_types[0].len() as i64;
            for idx in index_list("indices")? {
                if idx < 0 || idx >= ncols {
                    return Err(format!("index {idx} out of range ({ncols} columns)"));
                }
            }
        }
        OperatorKind::Union => {}
        OperatorKind::Transform => {
            parse_type(node.scalar("output_type"))?;
            if node.row_fn().is_none() {
                return Err("opaque parameter 'function' must be a row function".into());
            }
        }
        OperatorKind::BinaryTransform => {
            let op: BinaryOp = node
                .scalar("op")
                .and_then(Literal::as_str)
                .ok_or("parameter 'op' must be a string")?
                .parse()?;
            single_column(0, "left")?;
            single_column(1, "right")?;
            if !op.is_comparison()
                && !(input_types[0][0].is_numeric() && input_types[1][0].is_numeric())
            {
                return Err(format!("arithmetic '{}' needs numeric inputs", op.as_str()));
            }
        }
        OperatorKind::GeneralizedTransform => {
            let items = node
                .scalar("output_types")
                .and_then(Literal::as_list)
                .ok_or("parameter 'output_types' must be a list")?;
            if items.is_empty() {
                return Err("parameter 'output_types' must not be empty".into());
            }
            for item in items {
                parse_type(Some(item))?;
            }
            if node.generalized_fn().is_none() {
                return Err("opaque parameter 'function' must be a generalized function".into());
            }
        }
        OperatorKind::Ternary => {
            single_column(0, "condition")?;
            single_column(1, "is_true")?;
            single_column(2, "is_false")?;
            if input_types[1] != input_types[2] {
                return Err(format!(
                    "branch types differ: {:?} vs {:?}",
                    input_types[1], input_types[2]
                ));
            }
        }
        OperatorKind::LogicalFilter => {
            single_column(1, "mask")?;
        }
        OperatorKind::Append => {
            if input_types[0] != input_types[1] {
                return Err(format!(
                    "appended types differ: {:?} vs {:?}",
                    input_types[0], input_types[1]
                ));
            }
            // rows stack, lengths add up
            return Ok(());
        }
    }

    if node.kind.attributes().arity > 1 {
        let known: Vec<u64> = input_lengths.iter().flatten().copied().collect();
        if known.windows(2).any(|w| w[0] != w[1]) {
            return Err(format!("inputs have different lengths: {input_lengths:?}"));
        }
    }
    Ok(())
}

pub(crate) fn parse_type(lit: Option<&Literal>) -> Result<DataType, String> {
    lit.and_then(Literal::as_str)
        .ok_or_else(|| "type parameter must be a string".to_string())?
        .parse()
}
