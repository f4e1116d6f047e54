//! Graph evaluation against an [`ArrayEngine`].

use ahash::AHashMap;
use std::sync::Arc;
use tracing::{debug, trace};

use super::{Column, ContextKey, IndexNode, Node, WindowIndex};
use crate::engine::{Array, ArrayEngine, DType};
use crate::error::{Result, SheafError};

/// Result of evaluating one node.
#[derive(Debug, Clone, PartialEq)]
pub enum Data {
    /// Single array.
    Array(Array),
    /// Several arrays from a multi-output index node.
    Multi(Vec<Array>),
}

impl Data {
    /// The single array, or an error for multi-output data.
    pub fn array(&self) -> Result<&Array> {
        match self {
            Data::Array(arr) => Ok(arr),
            Data::Multi(parts) => Err(SheafError::eval(format!(
                "expected a single array, found {} outputs",
                parts.len()
            ))),
        }
    }
}

/// Columns of the active window, addressable by name or position.
#[derive(Debug, Clone)]
pub struct Context {
    names: Arc<[String]>,
    arrays: Vec<Array>,
}

impl Context {
    /// Binds `names[i]` to `arrays[i]`.
    pub fn new(names: Arc<[String]>, arrays: Vec<Array>) -> Self {
        Self { names, arrays }
    }

    /// Looks up a context column.
    pub fn get(&self, key: &ContextKey) -> Result<&Array> {
        let pos = match key {
            ContextKey::Position(pos) => *pos,
            ContextKey::Name(name) => self
                .names
                .iter()
                .position(|n| n == name)
                .ok_or_else(|| SheafError::ColumnNotFound(format!("{name} (window context)")))?,
        };
        self.arrays.get(pos).ok_or(SheafError::OutOfBounds {
            index: pos,
            len: self.arrays.len(),
        })
    }
}

enum Span<'a> {
    Range(usize, usize),
    Positions(&'a [usize]),
}

/// Evaluates column graphs, computing every shared node once per pass.
pub struct Evaluator<'a> {
    engine: &'a dyn ArrayEngine,
    context: Option<&'a Context>,
    cache: AHashMap<usize, (Arc<Node>, Arc<Data>)>,
}

impl<'a> Evaluator<'a> {
    /// Evaluator without window context.
    pub fn new(engine: &'a dyn ArrayEngine) -> Self {
        Self {
            engine,
            context: None,
            cache: AHashMap::new(),
        }
    }

    /// Evaluator that resolves context placeholders from `context`.
    pub fn with_context(engine: &'a dyn ArrayEngine, context: &'a Context) -> Self {
        Self {
            engine,
            context: Some(context),
            cache: AHashMap::new(),
        }
    }

    /// Evaluates `column` to a single array.
    pub fn eval_array(&mut self, column: &Column) -> Result<Array> {
        let data = self.eval(column)?;
        Ok(data.array()?.clone())
    }

    /// Evaluates `column`, reusing earlier results for shared nodes.
    pub fn eval(&mut self, column: &Column) -> Result<Arc<Data>> {
        let node = column.node();
        let key = Arc::as_ptr(node) as usize;
        if let Some((_, data)) = self.cache.get(&key) {
            return Ok(Arc::clone(data));
        }
        trace!(kind = node.kind(), name = ?column.name(), "evaluating node");
        let data = Arc::new(self.compute(node)?);
        self.cache
            .insert(key, (Arc::clone(node), Arc::clone(&data)));
        Ok(data)
    }

    fn compute(&mut self, node: &Node) -> Result<Data> {
        let engine = self.engine;
        let array = match node {
            Node::Source(arr) => arr.clone(),
            Node::Scalar(value) => Array::from_values(std::slice::from_ref(value), DType::Float)?,
            Node::Context(key) => {
                let ctx = self.context.ok_or_else(|| {
                    SheafError::eval(format!("{key} referenced outside of a window"))
                })?;
                ctx.get(key)?.clone()
            }
            Node::Unary { op, input } => {
                let input = self.eval(input)?;
                engine.unary(*op, input.array()?)?
            }
            Node::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                engine.binary(*op, lhs.array()?, rhs.array()?)?
            }
            Node::Reduce {
                method,
                input,
                other,
                opts,
            } => {
                let input = self.eval(input)?;
                let other = other.as_ref().map(|o| self.eval(o)).transpose()?;
                let other = other.as_deref().map(Data::array).transpose()?;
                let arr = input.array()?;
                let value = engine.reduce(*method, arr, other, opts)?;
                Array::from_values(&[value], method.output_dtype(arr.dtype()))?
            }
            Node::Horizontal {
                method,
                inputs,
                opts,
            } => {
                let arrays = self.eval_all(inputs)?;
                engine.horizontal(*method, &arrays, opts)?
            }
            Node::Take {
                input,
                idx,
                checked,
            } => {
                let input = self.eval(input)?;
                let idx = self.eval(idx)?;
                engine.take(input.array()?, idx.array()?, *checked)?
            }
            Node::Filter { input, mask } => {
                let input = self.eval(input)?;
                let mask = self.eval(mask)?;
                engine.filter(input.array()?, mask.array()?)?
            }
            Node::Slice { input, start, end } => self.eval(input)?.array()?.slice(*start, *end),
            Node::Index(index) => return self.compute_index(index),
            Node::Output { source, slot } => {
                let data = self.eval(source)?;
                match data.as_ref() {
                    Data::Multi(parts) => parts.get(*slot).cloned().ok_or(SheafError::OutOfBounds {
                        index: *slot,
                        len: parts.len(),
                    })?,
                    Data::Array(arr) if *slot == 0 => arr.clone(),
                    Data::Array(_) => {
                        return Err(SheafError::eval(format!(
                            "output slot {slot} requested from a single-output node"
                        )))
                    }
                }
            }
            Node::WindowAgg {
                method,
                input,
                other,
                index,
                opts,
            } => {
                let input = self.eval(input)?;
                let other = other.as_ref().map(|o| self.eval(o)).transpose()?;
                let other = other.as_deref().map(Data::array).transpose()?;
                let idx = self.eval(index.column())?;
                let arr = input.array()?;
                match index {
                    WindowIndex::Starts(_) => {
                        let starts = idx.array()?.to_positions()?;
                        engine.agg_by_starts(*method, arr, other, &starts, opts)?
                    }
                    WindowIndex::Idxs(_) => {
                        let lists = idx.array()?.as_position_lists()?;
                        engine.agg_by_idxs(*method, arr, other, lists, opts)?
                    }
                    WindowIndex::GroupStarts(_) => {
                        let starts = idx.array()?.to_positions()?;
                        engine.agg_by_group_starts(*method, arr, other, &starts, opts)?
                    }
                }
            }
            Node::WindowApply {
                body,
                inputs,
                names,
                index,
            } => self.window_apply(body, inputs, names, index)?,
        };
        Ok(Data::Array(array))
    }

    fn eval_all(&mut self, columns: &[Column]) -> Result<Vec<Array>> {
        columns.iter().map(|c| self.eval_array(c)).collect()
    }

    fn compute_index(&mut self, index: &IndexNode) -> Result<Data> {
        let engine = self.engine;
        let array = match index {
            IndexNode::FixWindow { len_of, window } => {
                let len = self.eval(len_of)?.array()?.len();
                engine.fix_window_starts(len, *window)?
            }
            IndexNode::TimeWindow {
                time,
                duration,
                start_by,
            } => {
                let time = self.eval(time)?;
                engine.time_window_starts(time.array()?, *duration, *start_by)?
            }
            IndexNode::TimeOffset {
                time,
                window,
                offset,
            } => {
                let time = self.eval(time)?;
                engine.time_offset_idxs(time.array()?, *window, *offset)?
            }
            IndexNode::Group { keys, sort, par } => {
                let keys = self.eval_all(keys)?;
                let refs: Vec<&Array> = keys.iter().collect();
                engine.group_idxs(&refs, *sort, *par)?
            }
            IndexNode::TimeGroup {
                time,
                duration,
                closed,
            } => {
                let time = self.eval(time)?;
                let time = time.array()?;
                let groups = engine.time_groups(time, *duration, *closed)?;
                let labels = match time.dtype() {
                    DType::Int => Array::from(groups.labels),
                    _ => Array::datetime(groups.labels),
                };
                return Ok(Data::Multi(vec![labels, Array::Usize(groups.starts)]));
            }
            IndexNode::LeftJoin { left, right } => {
                let left = self.eval_all(left)?;
                let right = self.eval_all(right)?;
                let left: Vec<&Array> = left.iter().collect();
                let right: Vec<&Array> = right.iter().collect();
                engine.left_join_idx(&left, &right)?
            }
            IndexNode::OuterJoin {
                left,
                right,
                sort,
                rev,
            } => {
                let left = self.eval_all(left)?;
                let right = self.eval_all(right)?;
                let left: Vec<&Array> = left.iter().collect();
                let right: Vec<&Array> = right.iter().collect();
                let joined = engine.outer_join_idx(&left, &right, *sort, *rev)?;
                let mut parts = joined.keys;
                parts.push(Array::OptUsize(joined.left_idx));
                parts.push(Array::OptUsize(joined.right_idx));
                return Ok(Data::Multi(parts));
            }
            IndexNode::Unique { keys, keep } => {
                let keys = self.eval_all(keys)?;
                let refs: Vec<&Array> = keys.iter().collect();
                engine.unique_idx(&refs, *keep)?
            }
            IndexNode::Sort { keys, rev } => {
                let keys = self.eval_all(keys)?;
                let refs: Vec<&Array> = keys.iter().collect();
                engine.sort_idx(&refs, *rev)?
            }
            IndexNode::MaskToIdx { mask } => {
                let mask = self.eval(mask)?;
                engine.mask_to_idx(mask.array()?)?
            }
            IndexNode::Arange { len_of } => Array::arange(self.eval(len_of)?.array()?.len()),
        };
        Ok(Data::Array(array))
    }

    fn window_apply(
        &mut self,
        body: &Column,
        inputs: &[Column],
        names: &[String],
        index: &WindowIndex,
    ) -> Result<Array> {
        let arrays = self.eval_all(inputs)?;
        let len = arrays.first().map(Array::len).unwrap_or(0);
        let idx = self.eval(index.column())?;
        let starts;
        let spans: Vec<Span<'_>> = match index {
            WindowIndex::Starts(_) => {
                starts = idx.array()?.to_positions()?;
                if starts.len() != len {
                    return Err(SheafError::invalid(format!(
                        "start positions ({}) must match input length ({len})",
                        starts.len()
                    )));
                }
                starts
                    .iter()
                    .enumerate()
                    .map(|(i, &s)| Span::Range(s.min(i), i + 1))
                    .collect()
            }
            WindowIndex::Idxs(_) => idx
                .array()?
                .as_position_lists()?
                .iter()
                .map(|p| Span::Positions(p))
                .collect(),
            WindowIndex::GroupStarts(_) => {
                starts = idx.array()?.to_positions()?;
                starts.windows(2).map(|w| Span::Range(w[0], w[1])).collect()
            }
        };
        debug!(windows = spans.len(), columns = arrays.len(), "applying window body");
        let names: Arc<[String]> = names.into();
        let mut parts = Vec::with_capacity(spans.len());
        for span in &spans {
            let window = arrays
                .iter()
                .map(|arr| match span {
                    Span::Range(lo, hi) => Ok(arr.slice(*lo, *hi)),
                    Span::Positions(p) => arr.take(p),
                })
                .collect::<Result<Vec<_>>>()?;
            let ctx = Context::new(Arc::clone(&names), window);
            let mut sub = Evaluator::with_context(self.engine, &ctx);
            parts.push(sub.eval_array(body)?);
        }
        Array::concat(&parts, DType::Float)
    }
}

/// Evaluates several columns in one pass so shared index nodes are computed once.
pub(crate) fn eval_columns(engine: &dyn ArrayEngine, columns: &[Column]) -> Result<Vec<Column>> {
    let mut evaluator = Evaluator::new(engine);
    columns
        .iter()
        .map(|c| {
            let array = evaluator.eval_array(c)?;
            Ok(Column::from(array).with_name(c.name().map(str::to_owned)))
        })
        .collect()
}
