//! Graph rewrites that drop pass-through operations.

use std::sync::Arc;

use super::{Column, Node};
use crate::engine::UnaryOp;

/// Rewrites `column` bottom-up:
///
/// * `--x` and `!!x` collapse to `x`;
/// * chained unchecked takes `x[a][b]` compose their indices into `x[a[b]]`,
///   so the data column is selected once.
///
/// Untouched subgraphs keep their original nodes so shared indices stay shared.
pub(crate) fn simplify(column: &Column) -> Column {
    match column.node().as_ref() {
        Node::Unary { op, input } => {
            let input = simplify(input);
            if let Node::Unary {
                op: inner_op,
                input: inner,
            } = input.node().as_ref()
            {
                if op == inner_op && matches!(op, UnaryOp::Neg | UnaryOp::Not) {
                    return inner.with_name(column.name().map(str::to_owned));
                }
            }
            rebuild(column, &input, |input| Node::Unary { op: *op, input })
        }
        Node::Binary { op, lhs, rhs } => {
            let (l, r) = (simplify(lhs), simplify(rhs));
            if l.same_node(lhs) && r.same_node(rhs) {
                return column.clone();
            }
            with_node(
                column,
                Node::Binary {
                    op: *op,
                    lhs: l,
                    rhs: r,
                },
            )
        }
        Node::Take {
            input,
            idx,
            checked: false,
        } => {
            let input = simplify(input);
            if let Node::Take {
                input: inner,
                idx: inner_idx,
                checked: false,
            } = input.node().as_ref()
            {
                let composed = inner_idx.take_unchecked(idx);
                return with_node(
                    column,
                    Node::Take {
                        input: inner.clone(),
                        idx: composed,
                        checked: false,
                    },
                );
            }
            let idx = idx.clone();
            rebuild(column, &input, move |input| Node::Take {
                input,
                idx,
                checked: false,
            })
        }
        Node::Filter { input, mask } => {
            let input = simplify(input);
            let mask = mask.clone();
            rebuild(column, &input, move |input| Node::Filter { input, mask })
        }
        _ => column.clone(),
    }
}

fn rebuild(column: &Column, new_input: &Column, make: impl FnOnce(Column) -> Node) -> Column {
    let unchanged = match column.node().as_ref() {
        Node::Unary { input, .. } | Node::Take { input, .. } | Node::Filter { input, .. } => {
            input.same_node(new_input)
        }
        _ => false,
    };
    if unchanged {
        return column.clone();
    }
    with_node(column, make(new_input.clone()))
}

fn with_node(column: &Column, node: Node) -> Column {
    Column {
        name: column.name().map(str::to_owned),
        node: Arc::new(node),
    }
}
