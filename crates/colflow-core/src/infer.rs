//! Type and length inference over the plan DAG.
//!
//! Inference is derived from node parameters and the inferred schemas of the
//! inputs only; no data is touched. Results are memoised per node for the
//! lifetime of one [`InferenceCache`], so shared sub-plans are visited once.

use std::collections::HashMap;

use crate::dag::{node_addr, parse_type, Literal, OperatorKind, PNode};
use crate::schema::DataType;

/// Output column types of `node`.
pub fn infer_output_types(node: &PNode) -> Vec<DataType> {
    InferenceCache::default().output_types(node)
}

/// Output row count of `node`, or `None` when it depends on the data.
pub fn infer_output_length(node: &PNode) -> Option<u64> {
    InferenceCache::default().output_length(node)
}

/// Memo table keyed by node identity.
///
/// Entries hold a clone of the node handle so an address cannot be reused by
/// a different node while the cache is alive.
#[derive(Default)]
pub struct InferenceCache {
    types: HashMap<usize, (PNode, Vec<DataType>)>,
    lengths: HashMap<usize, (PNode, Option<u64>)>,
}

impl InferenceCache {
    pub fn output_types(&mut self, node: &PNode) -> Vec<DataType> {
        if let Some((_, types)) = self.types.get(&node_addr(node)) {
            return types.clone();
        }
        let types = match node.kind() {
            OperatorKind::Source => {
                let all = node
                    .batch_source()
                    .map(|s| s.column_types())
                    .unwrap_or_default();
                node.indices_param("columns")
                    .into_iter()
                    .map(|c| all[c])
                    .collect()
            }
            OperatorKind::Range => vec![DataType::Int64],
            OperatorKind::Constant => {
                let dt = node
                    .scalar("value")
                    .and_then(Literal::to_scalar)
                    .and_then(|s| s.data_type())
                    .unwrap_or(DataType::Int64);
                vec![dt]
            }
            OperatorKind::Project => {
                let input = self.output_types(node.input(0));
                node.indices_param("indices")
                    .into_iter()
                    .map(|i| input[i])
                    .collect()
            }
            OperatorKind::Union => {
                let mut out = self.output_types(node.input(0));
                out.extend(self.output_types(node.input(1)));
                out
            }
            OperatorKind::Transform => vec![declared_type(node.scalar("output_type"))],
            OperatorKind::BinaryTransform => {
                let op = node.binary_op();
                if op.is_comparison() {
                    vec![DataType::Int64]
                } else {
                    let l = self.output_types(node.input(0));
                    let r = self.output_types(node.input(1));
                    if l[0] == DataType::Float64 || r[0] == DataType::Float64 {
                        vec![DataType::Float64]
                    } else {
                        vec![DataType::Int64]
                    }
                }
            }
            OperatorKind::GeneralizedTransform => node
                .scalar("output_types")
                .and_then(Literal::as_list)
                .unwrap_or_default()
                .iter()
                .map(|l| declared_type(Some(l)))
                .collect(),
            OperatorKind::Ternary => self.output_types(node.input(1)),
            OperatorKind::LogicalFilter | OperatorKind::Append => {
                self.output_types(node.input(0))
            }
        };
        self.types
            .insert(node_addr(node), (node.clone(), types.clone()));
        types
    }

    pub fn output_length(&mut self, node: &PNode) -> Option<u64> {
        if let Some((_, len)) = self.lengths.get(&node_addr(node)) {
            return *len;
        }
        let len = match node.kind() {
            OperatorKind::Source => {
                Some(node.int_param("end").abs_diff(node.int_param("begin")))
            }
            OperatorKind::Range => Some(node.int_param("end").abs_diff(node.int_param("start"))),
            OperatorKind::Constant => Some(node.int_param("length") as u64),
            OperatorKind::Project
            | OperatorKind::Transform
            | OperatorKind::GeneralizedTransform => self.output_length(node.input(0)),
            OperatorKind::Union | OperatorKind::BinaryTransform | OperatorKind::Ternary => {
                // aligned inputs: any known length is the length
                let mut known = None;
                for input in node.inputs() {
                    if let Some(l) = self.output_length(input) {
                        known = Some(l);
                        break;
                    }
                }
                known
            }
            OperatorKind::LogicalFilter => None,
            OperatorKind::Append => {
                let left = self.output_length(node.input(0));
                let right = self.output_length(node.input(1));
                left.zip(right).map(|(l, r)| l + r)
            }
        };
        self.lengths.insert(node_addr(node), (node.clone(), len));
        len
    }
}

fn declared_type(lit: Option<&Literal>) -> DataType {
    parse_type(lit).unwrap_or_else(|e| panic!("node carries an invalid type parameter: {e}"))
}
