//! Rolling windows.

use std::sync::Arc;
use tracing::debug;

use super::{name_inputs, window_agg, window_apply, Window};
use crate::engine::{AggMethod, AggOptions, StartBy, TimeDelta};
use crate::error::{Result, SheafError};
use crate::expr::registry::FunctionRegistry;
use crate::expr::{Column, IndexNode, Node, WindowIndex};
use crate::frame::{ColumnExpr, Frame};

/// Resolved shape of a rolling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RollingType {
    /// Fixed row count; row `i` covers `[i + 1 - w, i]`.
    Fix,
    /// Start positions; row `i` covers `[start[i], i]`.
    Start,
    /// One position list per row.
    Offset,
    /// Start positions computed from a time column.
    TimeStart,
    /// Position lists computed from a time column.
    TimeOffset,
}

impl RollingType {
    fn uses_starts(self) -> bool {
        matches!(
            self,
            RollingType::Fix | RollingType::Start | RollingType::TimeStart
        )
    }
}

/// Rolling window options. `window` and `idx` are mutually exclusive and one
/// of them is required.
#[derive(Debug, Clone, Default)]
pub struct RollingOptions {
    /// Row count or duration.
    pub window: Option<Window>,
    /// Step between the rows of an offset window.
    pub offset: Option<TimeDelta>,
    /// Precomputed start positions or position lists.
    pub idx: Option<Column>,
    /// Sorted time column for duration windows.
    pub time: Option<ColumnExpr>,
    /// Anchor policy for duration windows.
    pub start_by: StartBy,
    /// Explicit type for precomputed `idx`.
    pub kind: Option<RollingType>,
    /// Extra inputs, visible to window bodies and paired aggregations.
    pub others: Vec<ColumnExpr>,
}

impl RollingOptions {
    /// Fixed window over the last `window` rows.
    pub fn fixed(window: usize) -> Self {
        Self {
            window: Some(Window::Count(window)),
            ..Self::default()
        }
    }

    /// Duration window over `time`.
    pub fn duration(window: TimeDelta, time: impl Into<ColumnExpr>) -> Self {
        Self {
            window: Some(Window::Duration(window)),
            time: Some(time.into()),
            ..Self::default()
        }
    }

    /// Rows at whole multiples of `offset` back from each row, within `window`.
    pub fn offset(window: TimeDelta, offset: TimeDelta, time: impl Into<ColumnExpr>) -> Self {
        Self {
            window: Some(Window::Duration(window)),
            offset: Some(offset),
            time: Some(time.into()),
            ..Self::default()
        }
    }

    /// Precomputed index. `kind` defaults to [`RollingType::Start`].
    pub fn with_idx(idx: Column, kind: Option<RollingType>) -> Self {
        Self {
            idx: Some(idx),
            kind,
            ..Self::default()
        }
    }

    /// Sets the anchor policy.
    pub fn start_by(mut self, start_by: StartBy) -> Self {
        self.start_by = start_by;
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

    fn resolve_kind(&self) -> Result<RollingType> {
        match (&self.idx, self.window, self.offset) {
            (Some(_), Some(_), _) => Err(SheafError::config(
                "rolling `idx` and `window` are mutually exclusive",
            )),
            (Some(_), None, _) => Ok(self.kind.unwrap_or(RollingType::Start)),
            (None, None, _) => Err(SheafError::config(
                "rolling needs either `window` or `idx`",
            )),
            (None, Some(Window::Count(_)), Some(_)) => Err(SheafError::config(
                "an offset needs a duration window",
            )),
            (None, Some(Window::Count(0)), None) => {
                Err(SheafError::config("window must be greater than zero"))
            }
            (None, Some(Window::Count(_)), None) => Ok(RollingType::Fix),
            (None, Some(Window::Duration(_)), None) => Ok(RollingType::Start),
            (None, Some(Window::Duration(_)), Some(_)) => Ok(RollingType::Offset),
        }
    }
}

/// Rolling window over one expression.
#[derive(Debug, Clone)]
pub struct Rolling {
    expr: Column,
    others: Vec<Column>,
    kind: RollingType,
    index: Column,
    registry: Arc<FunctionRegistry>,
}

impl Rolling {
    /// Rolling window over a standalone expression. Keys cannot be resolved
    /// without a frame; use [`Frame::rolling`] for those.
    pub fn new(
        expr: impl Into<ColumnExpr>,
        opts: RollingOptions,
        registry: Arc<FunctionRegistry>,
    ) -> Result<Self> {
        let expr = expr.into().resolve_standalone(&registry)?;
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
        Self::build(expr, others, time, &opts, registry, "column_")
    }

    pub(crate) fn build(
        expr: Column,
        others: Vec<Column>,
        time: Option<Column>,
        opts: &RollingOptions,
        registry: Arc<FunctionRegistry>,
        prefix: &str,
    ) -> Result<Self> {
        let kind = opts.resolve_kind()?;
        debug!(?kind, window = ?opts.window, offset = ?opts.offset, "resolved rolling type");
        let index = match (&opts.idx, opts.window) {
            (Some(idx), _) => idx.clone(),
            (None, Some(Window::Count(window))) => Column::from_node(Node::Index(
                IndexNode::FixWindow {
                    len_of: expr.clone(),
                    window,
                },
            )),
            (None, Some(Window::Duration(duration))) => {
                let time = time.ok_or_else(|| {
                    SheafError::config("a duration window needs a time column")
                })?;
                let node = match opts.offset {
                    None => IndexNode::TimeWindow {
                        time,
                        duration,
                        start_by: opts.start_by,
                    },
                    Some(offset) => IndexNode::TimeOffset {
                        time,
                        window: duration,
                        offset,
                    },
                };
                Column::from_node(Node::Index(node))
            }
            (None, None) => {
                return Err(SheafError::config("rolling needs either `window` or `idx`"))
            }
        };
        let mut inputs = name_inputs(
            std::iter::once(expr).chain(others).collect(),
            prefix,
        );
        let expr = inputs.remove(0);
        Ok(Self {
            expr,
            others: inputs,
            kind,
            index,
            registry,
        })
    }

    /// Resolved type.
    pub fn kind(&self) -> RollingType {
        self.kind
    }

    /// Lazy index column.
    pub fn index_column(&self) -> &Column {
        &self.index
    }

    fn index(&self) -> WindowIndex {
        if self.kind.uses_starts() {
            WindowIndex::Starts(self.index.clone())
        } else {
            WindowIndex::Idxs(self.index.clone())
        }
    }

    /// Built-in window reduction with default options.
    pub fn agg(&self, method: AggMethod) -> Result<Column> {
        self.agg_with(method, AggOptions::default())
    }

    /// Built-in window reduction. The rolling type picks the primitive:
    /// start-based types reduce contiguous ranges, offset types gather
    /// position lists.
    pub fn agg_with(&self, method: AggMethod, opts: AggOptions) -> Result<Column> {
        window_agg(method, &self.expr, &self.others, self.index(), opts)
    }

    /// Method-style aggregation by name, e.g. `"max"` or `"corr"`.
    pub fn call(&self, name: &str) -> Result<Column> {
        self.agg(name.parse()?)
    }

    /// Evaluates `body` once per window. Keys in `body` address the window's
    /// columns; an unbound selector starts from the primary expression.
    pub fn apply(&self, body: impl Into<ColumnExpr>) -> Result<Vec<Column>> {
        let mut inputs = Vec::with_capacity(self.others.len() + 1);
        inputs.push(self.expr.clone());
        inputs.extend(self.others.iter().cloned());
        window_apply(&body.into(), &inputs, self.index(), &self.registry)
    }

    /// [`Rolling::apply`] for several bodies, results in order.
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

/// Rolling windows over the columns of a frame.
#[derive(Debug, Clone)]
pub struct FrameRolling {
    frame: Frame,
    opts: RollingOptions,
}

impl FrameRolling {
    pub(crate) fn new(frame: Frame, opts: RollingOptions) -> Result<Self> {
        opts.resolve_kind()?;
        Ok(Self { frame, opts })
    }

    fn time(&self) -> Result<Option<Column>> {
        self.opts
            .time
            .as_ref()
            .map(|t| t.resolve_one(&self.frame))
            .transpose()
    }

    fn others(&self) -> Result<Vec<Column>> {
        self.frame.resolve_exprs(self.opts.others.iter().cloned())
    }

    fn prefix(&self) -> String {
        self.frame.session().config().naming.auto_prefix.clone()
    }

    /// Rolling window over one expression of the frame.
    pub fn on(&self, expr: impl Into<ColumnExpr>) -> Result<Rolling> {
        let expr = expr.into().resolve_one(&self.frame)?;
        Rolling::build(
            expr,
            self.others()?,
            self.time()?,
            &self.opts,
            Arc::clone(self.frame.session().registry()),
            &self.prefix(),
        )
    }

    /// Applies `method` to every column except the time column.
    pub fn agg(&self, method: AggMethod, opts: AggOptions) -> Result<Frame> {
        let time = self.time()?;
        let others = self.others()?;
        let mut out = Vec::new();
        for column in self.frame.columns() {
            if time.as_ref().is_some_and(|t| t.same_node(column)) {
                continue;
            }
            let rolling = Rolling::build(
                column.clone(),
                others.clone(),
                time.clone(),
                &self.opts,
                Arc::clone(self.frame.session().registry()),
                &self.prefix(),
            )?;
            out.push(rolling.agg_with(method, opts)?);
        }
        Ok(self.frame.derived(out))
    }

    /// Evaluates `bodies` per window with every frame column in context; the
    /// first column is the primary expression.
    pub fn apply<E, I>(&self, bodies: I) -> Result<Frame>
    where
        E: Into<ColumnExpr>,
        I: IntoIterator<Item = E>,
    {
        let mut columns = self.frame.columns().to_vec();
        if columns.is_empty() {
            return Err(SheafError::invalid("rolling apply on an empty frame"));
        }
        let primary = columns.remove(0);
        let rolling = Rolling::build(
            primary,
            columns,
            self.time()?,
            &self.opts,
            Arc::clone(self.frame.session().registry()),
            &self.prefix(),
        )?;
        Ok(self.frame.derived(rolling.apply_many(bodies)?))
    }
}
