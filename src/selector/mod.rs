//! Deferred column references.
//!
//! A [`Selector`] records a base reference (name, position, list or nothing)
//! and a chain of method and module-function calls. Nothing is looked up until
//! [`Selector::resolve`] runs it against a [`Frame`](crate::frame::Frame), or
//! [`Selector::resolve_in_context`] turns it into placeholders bound per
//! window at evaluation time.
//!
//! ```
//! use sheaf::selector::s;
//! let expr = (s("close") - s("open")).alias("body").mean();
//! assert_eq!(expr.to_string(), "s(`close`).__sub__(s(`open`)).alias(\"body\").mean()");
//! ```

mod resolve;

use std::fmt;
use std::ops::{Add, BitAnd, BitOr, Div, Mul, Neg, Not, Sub};

pub use resolve::Resolved;

use crate::engine::Value;
use crate::expr::Column;
use crate::frame::ColumnKey;

/// Argument recorded for a deferred call.
#[derive(Debug, Clone)]
pub enum Arg {
    /// Literal.
    Value(Value),
    /// Ready-made column.
    Column(Column),
    /// Nested selector, resolved before the call replays.
    Selector(Selector),
    /// List of arguments.
    List(Vec<Arg>),
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Value(Value::Str(s)) => write!(f, "{s:?}"),
            Arg::Value(v) => write!(f, "{v}"),
            Arg::Column(c) => write!(f, "<{}>", c.name().unwrap_or("column")),
            Arg::Selector(s) => write!(f, "{s}"),
            Arg::List(items) => {
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

macro_rules! arg_from_value {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Arg {
            fn from(v: $ty) -> Self {
                Arg::Value(v.into())
            }
        })*
    };
}

arg_from_value!(Value, bool, i64, i32, f64, &str, String);

impl From<usize> for Arg {
    fn from(v: usize) -> Self {
        Arg::Value(Value::Int(v as i64))
    }
}

impl From<Column> for Arg {
    fn from(c: Column) -> Self {
        Arg::Column(c)
    }
}

impl From<&Column> for Arg {
    fn from(c: &Column) -> Self {
        Arg::Column(c.clone())
    }
}

impl From<Selector> for Arg {
    fn from(s: Selector) -> Self {
        Arg::Selector(s)
    }
}

impl From<&Selector> for Arg {
    fn from(s: &Selector) -> Self {
        Arg::Selector(s.clone())
    }
}

impl<T: Into<Arg>> From<Vec<T>> for Arg {
    fn from(items: Vec<T>) -> Self {
        Arg::List(items.into_iter().map(Into::into).collect())
    }
}

/// Positional and keyword arguments of a deferred call.
#[derive(Debug, Clone, Default)]
pub struct SelectorArgs {
    /// Positional arguments.
    pub args: Vec<Arg>,
    /// Keyword arguments in call order.
    pub kwargs: Vec<(String, Arg)>,
}

impl SelectorArgs {
    /// Positional arguments only.
    pub fn positional<A: Into<Arg>>(args: impl IntoIterator<Item = A>) -> Self {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            kwargs: Vec::new(),
        }
    }

    /// Adds a keyword argument.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Arg>) -> Self {
        self.kwargs.push((name.into(), value.into()));
        self
    }
}

impl fmt::Display for SelectorArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for arg in &self.args {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{arg}")?;
        }
        for (name, arg) in &self.kwargs {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{name}={arg}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub(crate) enum SelectorBase {
    Key(ColumnKey),
    Keys(Vec<ColumnKey>),
}

#[derive(Debug, Clone)]
pub(crate) struct LazyCall {
    pub(crate) name: String,
    pub(crate) module: bool,
    /// `None` is attribute access.
    pub(crate) args: Option<SelectorArgs>,
}

#[derive(Debug, Clone)]
struct Pending {
    name: String,
    module: bool,
}

/// Deferred column reference with a recorded call chain.
///
/// Builders never fail; misuse such as calling with nothing pending is stored
/// and reported when the selector is resolved.
#[derive(Debug, Clone, Default)]
pub struct Selector {
    base: Option<SelectorBase>,
    calls: Vec<LazyCall>,
    pending: Option<Pending>,
    error: Option<String>,
}

/// Selector over one column by name, regex or position.
pub fn s(key: impl Into<ColumnKey>) -> Selector {
    Selector {
        base: Some(SelectorBase::Key(key.into())),
        ..Selector::default()
    }
}

/// Selector over the column at `pos`.
pub fn s_at(pos: usize) -> Selector {
    s(pos)
}

/// Selector over several columns; always resolves to a list.
pub fn s_many<K, I>(keys: I) -> Selector
where
    K: Into<ColumnKey>,
    I: IntoIterator<Item = K>,
{
    Selector {
        base: Some(SelectorBase::Keys(keys.into_iter().map(Into::into).collect())),
        ..Selector::default()
    }
}

impl Selector {
    /// Unbound selector. A leading method call applies to the active window's
    /// primary column.
    pub fn new() -> Self {
        Self::default()
    }

    /// Unbound selector with module function `name` pending.
    pub fn module(name: impl Into<String>) -> Self {
        Self::new().module_func(name)
    }

    pub(crate) fn base(&self) -> Option<&SelectorBase> {
        self.base.as_ref()
    }

    pub(crate) fn calls(&self) -> &[LazyCall] {
        &self.calls
    }

    fn flush_pending(&mut self) {
        if let Some(p) = self.pending.take() {
            self.calls.push(LazyCall {
                name: p.name,
                module: p.module,
                args: None,
            });
        }
    }

    /// Records attribute access to method `name`; call it with [`Selector::call`].
    pub fn attr(mut self, name: impl Into<String>) -> Self {
        self.flush_pending();
        self.pending = Some(Pending {
            name: name.into(),
            module: false,
        });
        self
    }

    /// Records module function `name`; its call ignores the current value.
    pub fn module_func(mut self, name: impl Into<String>) -> Self {
        self.flush_pending();
        self.pending = Some(Pending {
            name: name.into(),
            module: true,
        });
        self
    }

    /// Calls the pending function with `args`.
    pub fn call(mut self, args: SelectorArgs) -> Self {
        match self.pending.take() {
            Some(p) => self.calls.push(LazyCall {
                name: p.name,
                module: p.module,
                args: Some(args),
            }),
            None => {
                self.error.get_or_insert_with(|| "no function to call".to_owned());
            }
        }
        self
    }

    /// Calls the pending function without arguments.
    pub fn call0(self) -> Self {
        self.call(SelectorArgs::default())
    }

    /// Records method `name` called with `args`.
    pub fn method(self, name: impl Into<String>, args: SelectorArgs) -> Self {
        self.attr(name).call(args)
    }

    fn method1(self, name: &str, arg: impl Into<Arg>) -> Self {
        self.method(name, SelectorArgs::positional([arg.into()]))
    }

    /// Renames the result.
    pub fn alias(self, name: impl Into<String>) -> Self {
        self.method1("alias", name.into())
    }

    /// Sum.
    pub fn sum(self) -> Self {
        self.attr("sum").call0()
    }

    /// Mean.
    pub fn mean(self) -> Self {
        self.attr("mean").call0()
    }

    /// Maximum.
    pub fn max(self) -> Self {
        self.attr("max").call0()
    }

    /// Minimum.
    pub fn min(self) -> Self {
        self.attr("min").call0()
    }

    /// Standard deviation.
    pub fn std(self) -> Self {
        self.attr("std").call0()
    }

    /// First row.
    pub fn first(self) -> Self {
        self.attr("first").call0()
    }

    /// Last row.
    pub fn last(self) -> Self {
        self.attr("last").call0()
    }

    /// Valid count.
    pub fn count(self) -> Self {
        self.attr("count").call0()
    }

    /// Absolute value.
    pub fn abs(self) -> Self {
        self.attr("abs").call0()
    }

    /// Fixed-window rolling `ts_{name}` over `window` rows.
    pub fn ts(self, name: &str, window: usize) -> Self {
        self.method1(&format!("ts_{name}"), window)
    }

    /// `self == other`
    pub fn eq(self, other: impl Into<Arg>) -> Self {
        self.method1("__eq__", other)
    }

    /// `self != other`
    pub fn ne(self, other: impl Into<Arg>) -> Self {
        self.method1("__ne__", other)
    }

    /// `self < other`
    pub fn lt(self, other: impl Into<Arg>) -> Self {
        self.method1("__lt__", other)
    }

    /// `self <= other`
    pub fn le(self, other: impl Into<Arg>) -> Self {
        self.method1("__le__", other)
    }

    /// `self > other`
    pub fn gt(self, other: impl Into<Arg>) -> Self {
        self.method1("__gt__", other)
    }

    /// `self >= other`
    pub fn ge(self, other: impl Into<Arg>) -> Self {
        self.method1("__ge__", other)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.base {
            None => f.write_str("s()")?,
            Some(SelectorBase::Key(key)) => write!(f, "s({key})")?,
            Some(SelectorBase::Keys(keys)) => {
                f.write_str("s([")?;
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}")?;
                }
                f.write_str("])")?;
            }
        }
        for call in &self.calls {
            let sep = if call.module { "::" } else { "." };
            write!(f, "{sep}{}", call.name)?;
            if let Some(args) = &call.args {
                write!(f, "({args})")?;
            }
        }
        if let Some(p) = &self.pending {
            let sep = if p.module { "::" } else { "." };
            write!(f, "{sep}{}", p.name)?;
        }
        Ok(())
    }
}

macro_rules! selector_binary {
    ($($trait:ident, $fn:ident, $dunder:literal, $rdunder:literal);* $(;)?) => {
        $(
            impl<T: Into<Arg>> $trait<T> for Selector {
                type Output = Selector;
                fn $fn(self, rhs: T) -> Selector {
                    self.method1($dunder, rhs)
                }
            }

            impl<T: Into<Arg>> $trait<T> for &Selector {
                type Output = Selector;
                fn $fn(self, rhs: T) -> Selector {
                    self.clone().method1($dunder, rhs)
                }
            }

            impl $trait<Selector> for i64 {
                type Output = Selector;
                fn $fn(self, rhs: Selector) -> Selector {
                    rhs.method1($rdunder, self)
                }
            }

            impl $trait<Selector> for f64 {
                type Output = Selector;
                fn $fn(self, rhs: Selector) -> Selector {
                    rhs.method1($rdunder, self)
                }
            }
        )*
    };
}

selector_binary! {
    Add, add, "__add__", "__radd__";
    Sub, sub, "__sub__", "__rsub__";
    Mul, mul, "__mul__", "__rmul__";
    Div, div, "__truediv__", "__rtruediv__";
}

impl<T: Into<Arg>> BitAnd<T> for Selector {
    type Output = Selector;
    fn bitand(self, rhs: T) -> Selector {
        self.method1("__and__", rhs)
    }
}

impl<T: Into<Arg>> BitOr<T> for Selector {
    type Output = Selector;
    fn bitor(self, rhs: T) -> Selector {
        self.method1("__or__", rhs)
    }
}

impl Neg for Selector {
    type Output = Selector;
    fn neg(self) -> Selector {
        self.attr("__neg__").call0()
    }
}

impl Not for Selector {
    type Output = Selector;
    fn not(self) -> Selector {
        self.attr("__invert__").call0()
    }
}
