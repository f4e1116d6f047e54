//! Group-by over key columns or time buckets.

use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::{name_inputs, window_agg, window_apply};
use crate::engine::{AggMethod, AggOptions, Closed, TimeDelta};
use crate::error::{Result, SheafError};
use crate::expr::registry::FunctionRegistry;
use crate::expr::{output, Column, IndexNode, Node, WindowIndex};
use crate::frame::{ColumnExpr, ColumnKey, Frame};

/// What defines the groups.
#[derive(Debug, Clone)]
pub enum GroupKeys {
    /// Distinct values of one or more key columns.
    Columns(Vec<ColumnExpr>),
    /// Fixed-width buckets of a time column.
    Duration(TimeDelta),
    /// Fixed row-count steps; recognized but not implemented.
    Step(usize),
}

/// Resolved group-by shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupByType {
    /// Key grouping; per-group position lists.
    Default,
    /// Time buckets; per-bucket start offsets.
    Time,
    /// Fixed-step grouping. Fails on first use.
    Unimplemented,
}

/// Group-by options. `by` and `idxs` are mutually exclusive and one of them
/// is required.
#[derive(Debug, Clone)]
pub struct GroupByOptions {
    /// Group definition.
    pub by: Option<GroupKeys>,
    /// Precomputed position lists (`Default`) or bucket starts (`Time`).
    pub idxs: Option<Column>,
    /// Type of precomputed `idxs`.
    pub kind: Option<GroupByType>,
    /// Sorted time column for duration buckets.
    pub time: Option<ColumnExpr>,
    /// Bucket boundary policy.
    pub closed: Closed,
    /// Sorted key order instead of first occurrence.
    pub sort: bool,
    /// Parallel hint for the engine.
    pub par: bool,
    /// Extra inputs, visible to group bodies and paired aggregations.
    pub others: Vec<ColumnExpr>,
    /// Append bucket labels to frame-level time aggregations.
    pub label: bool,
}

impl Default for GroupByOptions {
    fn default() -> Self {
        Self {
            by: None,
            idxs: None,
            kind: None,
            time: None,
            closed: Closed::Left,
            sort: true,
            par: false,
            others: Vec::new(),
            label: true,
        }
    }
}

impl GroupByOptions {
    /// Groups by the distinct values of `keys`.
    pub fn keys<E, I>(keys: I) -> Self
    where
        E: Into<ColumnExpr>,
        I: IntoIterator<Item = E>,
    {
        Self {
            by: Some(GroupKeys::Columns(keys.into_iter().map(Into::into).collect())),
            ..Self::default()
        }
    }

    /// Buckets `time` into `duration`-wide groups.
    pub fn duration(duration: TimeDelta, time: impl Into<ColumnExpr>) -> Self {
        Self {
            by: Some(GroupKeys::Duration(duration)),
            time: Some(time.into()),
            ..Self::default()
        }
    }

    /// Fixed `step`-row groups.
    pub fn step(step: usize) -> Self {
        Self {
            by: Some(GroupKeys::Step(step)),
            ..Self::default()
        }
    }

    /// Precomputed groups of type `kind`.
    pub fn with_idxs(idxs: Column, kind: GroupByType) -> Self {
        Self {
            idxs: Some(idxs),
            kind: Some(kind),
            ..Self::default()
        }
    }

    /// Sets key ordering.
    pub fn sort(mut self, sort: bool) -> Self {
        self.sort = sort;
        self
    }

    /// Sets the bucket boundary policy.
    pub fn closed(mut self, closed: Closed) -> Self {
        self.closed = closed;
        self
    }

    /// Sets the parallel hint.
    pub fn par(mut self, par: bool) -> Self {
        self.par = par;
        self
    }

    /// Controls the label column of frame-level time aggregations.
    pub fn label(mut self, label: bool) -> Self {
        self.label = label;
        self
    }

    /// Adds extra inputs.
    pub fn others<E, I>(mut self, others: I) -> Self
    where
        E: Into<ColumnExpr>,
        I: IntoIterator<Item = E>,
    {
        self.others.extend(others.into_iter().map(Into::into));
        self
    }

    fn resolve_kind(&self) -> Result<GroupByType> {
        match (&self.by, &self.idxs) {
            (Some(_), Some(_)) => Err(SheafError::config(
                "groupby `by` and `idxs` are mutually exclusive",
            )),
            (None, None) => Err(SheafError::config("groupby needs either `by` or `idxs`")),
            (None, Some(_)) => self.kind.ok_or_else(|| {
                SheafError::config("precomputed groupby `idxs` need an explicit type")
            }),
            (Some(GroupKeys::Columns(keys)), None) if keys.is_empty() => {
                Err(SheafError::config("groupby needs at least one key column"))
            }
            (Some(GroupKeys::Columns(_)), None) => Ok(GroupByType::Default),
            (Some(GroupKeys::Duration(_)), None) if self.time.is_none() => Err(
                SheafError::config("duration grouping needs a time column"),
            ),
            (Some(GroupKeys::Duration(_)), None) => Ok(GroupByType::Time),
            (Some(GroupKeys::Step(_)), None) => Ok(GroupByType::Unimplemented),
        }
    }
}

/// Index structure of a resolved group-by.
#[derive(Debug, Clone)]
pub enum GroupInfo {
    /// Position list per group.
    Idxs(Column),
    /// Bucket starts with a trailing end offset; labels unless precomputed.
    Time {
        /// Bucket labels.
        labels: Option<Column>,
        /// Bucket start offsets.
        starts: Column,
    },
    /// Fixed-step grouping.
    Unimplemented,
}

/// Group-by over one expression.
#[derive(Debug, Clone)]
pub struct GroupBy {
    expr: Column,
    others: Vec<Column>,
    kind: GroupByType,
    info: GroupInfo,
    registry: Arc<FunctionRegistry>,
}

impl GroupBy {
    /// Group-by over standalone columns. Keys need a frame to resolve; use
    /// [`Frame::groupby`] for those.
    pub fn new(
        expr: impl Into<ColumnExpr>,
        opts: GroupByOptions,
        registry: Arc<FunctionRegistry>,
    ) -> Result<Self> {
        let expr = expr.into().resolve_standalone(&registry)?;
        let keys = match &opts.by {
            Some(GroupKeys::Columns(keys)) => keys
                .iter()
                .map(|k| k.resolve_standalone(&registry))
                .collect::<Result<Vec<_>>>()?,
            _ => Vec::new(),
        };
        let time = opts
            .time
            .as_ref()
            .map(|t| t.resolve_standalone(&registry))
            .transpose()?;
        let others = opts
            .others
            .iter()
            .map(|o| o.resolve_standalone(&registry))
            .collect::<Result<Vec<_>>>()?;
        Self::build(expr, others, keys, time, &opts, registry, "column_")
    }

    pub(crate) fn build(
        expr: Column,
        others: Vec<Column>,
        keys: Vec<Column>,
        time: Option<Column>,
        opts: &GroupByOptions,
        registry: Arc<FunctionRegistry>,
        prefix: &str,
    ) -> Result<Self> {
        let kind = opts.resolve_kind()?;
        debug!(?kind, keys = keys.len(), sort = opts.sort, "resolved groupby type");
        let info = match (kind, &opts.idxs) {
            (GroupByType::Unimplemented, _) => GroupInfo::Unimplemented,
            (GroupByType::Default, Some(idxs)) => GroupInfo::Idxs(idxs.clone()),
            (GroupByType::Time, Some(starts)) => GroupInfo::Time {
                labels: None,
                starts: starts.clone(),
            },
            (GroupByType::Default, None) => GroupInfo::Idxs(Column::from_node(Node::Index(
                IndexNode::Group {
                    keys,
                    sort: opts.sort,
                    par: opts.par,
                },
            ))),
            (GroupByType::Time, None) => {
                let (Some(GroupKeys::Duration(duration)), Some(time)) = (&opts.by, time) else {
                    return Err(SheafError::config("duration grouping needs a time column"));
                };
                let groups = Column::from_node(Node::Index(IndexNode::TimeGroup {
                    time: time.clone(),
                    duration: *duration,
                    closed: opts.closed,
                }));
                GroupInfo::Time {
                    labels: Some(output(&groups, 0).with_name(time.name().map(str::to_owned))),
                    starts: output(&groups, 1),
                }
            }
        };
        let mut inputs = name_inputs(std::iter::once(expr).chain(others).collect(), prefix);
        let expr = inputs.remove(0);
        Ok(Self {
            expr,
            others: inputs,
            kind,
            info,
            registry,
        })
    }

    /// Resolved type.
    pub fn kind(&self) -> GroupByType {
        self.kind
    }

    /// Index structure.
    pub fn info(&self) -> &GroupInfo {
        &self.info
    }

    fn index(&self) -> Result<WindowIndex> {
        match &self.info {
            GroupInfo::Idxs(idxs) => Ok(WindowIndex::Idxs(idxs.clone())),
            GroupInfo::Time { starts, .. } => Ok(WindowIndex::GroupStarts(starts.clone())),
            GroupInfo::Unimplemented => Err(SheafError::NotImplemented(
                "groupby with a fixed row step".to_owned(),
            )),
        }
    }

    /// Bucket labels of a time grouping computed from a time column.
    pub fn labels(&self) -> Result<Option<Column>> {
        match &self.info {
            GroupInfo::Time { labels, .. } => Ok(labels.clone()),
            GroupInfo::Idxs(_) => Ok(None),
            GroupInfo::Unimplemented => Err(SheafError::NotImplemented(
                "groupby with a fixed row step".to_owned(),
            )),
        }
    }

    /// Built-in group reduction with default options.
    pub fn agg(&self, method: AggMethod) -> Result<Column> {
        self.agg_with(method, AggOptions::default())
    }

    /// Built-in group reduction. Key groups reduce position lists, time
    /// groups reduce bucket ranges.
    pub fn agg_with(&self, method: AggMethod, opts: AggOptions) -> Result<Column> {
        self.agg_on(&self.expr, method, opts)
    }

    fn agg_on(&self, input: &Column, method: AggMethod, opts: AggOptions) -> Result<Column> {
        window_agg(method, input, &self.others, self.index()?, opts)
    }

    /// Reduction of another column over the same groups.
    pub fn on(&self, input: &Column, method: AggMethod) -> Result<Column> {
        self.agg_on(input, method, AggOptions::default())
    }

    /// Method-style aggregation by name.
    pub fn call(&self, name: &str) -> Result<Column> {
        self.agg(name.parse()?)
    }

    /// Evaluates `body` once per group.
    pub fn apply(&self, body: impl Into<ColumnExpr>) -> Result<Vec<Column>> {
        let mut inputs = Vec::with_capacity(self.others.len() + 1);
        inputs.push(self.expr.clone());
        inputs.extend(self.others.iter().cloned());
        window_apply(&body.into(), &inputs, self.index()?, &self.registry)
    }

    /// [`GroupBy::apply`] for several bodies, results in order.
    pub fn apply_many<E, I>(&self, bodies: I) -> Result<Vec<Column>>
    where
        E: Into<ColumnExpr>,
        I: IntoIterator<Item = E>,
    {
        let mut out = Vec::new();
        for body in bodies {
            out.extend(self.apply(body)?);
        }
        Ok(out)
    }
}

/// Typed aggregation shorthand: `method(target[, arg])`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggSpec {
    /// Aggregated column.
    pub target: ColumnKey,
    /// Reduction.
    pub method: AggMethod,
    /// Second column for paired reductions.
    pub arg: Option<ColumnKey>,
}

impl AggSpec {
    /// `method` over `target`.
    pub fn new(target: impl Into<ColumnKey>, method: AggMethod) -> Self {
        Self {
            target: target.into(),
            method,
            arg: None,
        }
    }

    /// Sets the second column.
    pub fn with_arg(mut self, arg: impl Into<ColumnKey>) -> Self {
        self.arg = Some(arg.into());
        self
    }

    /// Parses `"method"` or `"method(column)"`.
    pub fn parse(target: impl Into<ColumnKey>, text: &str) -> Result<Self> {
        let text = text.trim();
        let (method, arg) = match text.split_once('(') {
            None => (text, None),
            Some((method, rest)) => {
                let inner = rest.strip_suffix(')').ok_or_else(|| {
                    SheafError::invalid(format!("unbalanced aggregation shorthand `{text}`"))
                })?;
                let inner = inner.trim();
                if inner.contains(['(', ')', ',']) {
                    return Err(SheafError::invalid(format!(
                        "aggregation shorthand takes at most one column: `{text}`"
                    )));
                }
                (method.trim(), (!inner.is_empty()).then_some(inner))
            }
        };
        let method: AggMethod = method
            .parse()
            .map_err(|_| SheafError::invalid(format!("unknown aggregation `{method}`")))?;
        let spec = Self::new(target, method);
        Ok(match arg {
            Some(arg) => spec.with_arg(arg),
            None => spec,
        })
    }
}

impl fmt::Display for AggSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.arg {
            Some(arg) => write!(f, "{}: {}({arg})", self.target, self.method),
            None => write!(f, "{}: {}", self.target, self.method),
        }
    }
}

/// Group-by over the columns of a frame.
#[derive(Debug, Clone)]
pub struct FrameGroupBy {
    frame: Frame,
    opts: GroupByOptions,
}

impl FrameGroupBy {
    pub(crate) fn new(frame: Frame, opts: GroupByOptions) -> Result<Self> {
        opts.resolve_kind()?;
        Ok(Self { frame, opts })
    }

    fn keys(&self) -> Result<Vec<Column>> {
        match &self.opts.by {
            Some(GroupKeys::Columns(keys)) => self.frame.resolve_exprs(keys.iter().cloned()),
            _ => Ok(Vec::new()),
        }
    }

    fn build(&self, expr: Column, others: Vec<Column>) -> Result<GroupBy> {
        let time = self
            .opts
            .time
            .as_ref()
            .map(|t| t.resolve_one(&self.frame))
            .transpose()?;
        GroupBy::build(
            expr,
            others,
            self.keys()?,
            time,
            &self.opts,
            Arc::clone(self.frame.session().registry()),
            &self.frame.session().config().naming.auto_prefix,
        )
    }

    /// Group-by over one expression of the frame.
    pub fn on(&self, expr: impl Into<ColumnExpr>) -> Result<GroupBy> {
        let expr = expr.into().resolve_one(&self.frame)?;
        let others = self.frame.resolve_exprs(self.opts.others.iter().cloned())?;
        self.build(expr, others)
    }

    /// Aggregates the frame.
    ///
    /// Output columns, in order: `exprs` evaluated per group with the first
    /// frame column as primary and the rest as context; `specs`; for key
    /// grouping, each key's first value (replacing a same-named output); for
    /// time grouping with labels on, the bucket labels.
    pub fn agg<E, I>(&self, exprs: I, specs: &[AggSpec]) -> Result<Frame>
    where
        E: Into<ColumnExpr>,
        I: IntoIterator<Item = E>,
    {
        let mut columns = self.frame.columns().to_vec();
        if columns.is_empty() {
            return Err(SheafError::invalid("groupby on an empty frame"));
        }
        let primary = columns.remove(0);
        let group = self.build(primary, columns)?;
        let mut out = group.apply_many(exprs)?;
        for spec in specs {
            let target = self.frame.column(spec.target.clone())?;
            let mut others = Vec::new();
            if let Some(arg) = &spec.arg {
                others.push(self.frame.column(arg.clone())?);
            }
            let index = group.index()?;
            out.push(window_agg(spec.method, &target, &others, index, AggOptions::default())?);
        }
        match group.kind() {
            GroupByType::Default => {
                for key in self.keys()? {
                    let first = group.on(&key, AggMethod::First)?;
                    let slot = first
                        .name()
                        .and_then(|name| out.iter().position(|c| c.name() == Some(name)));
                    match slot {
                        Some(pos) => out[pos] = first,
                        None => out.push(first),
                    }
                }
            }
            GroupByType::Time if self.opts.label => {
                if let Some(labels) = group.labels()? {
                    out.push(labels);
                }
            }
            _ => {}
        }
        Ok(self.frame.derived(out))
    }
}
