//! Named functions reachable from selectors.
//!
//! Selector chains record method and module-function names. The registry maps
//! those names to typed column operations. It is built explicitly and owned by
//! a [`Session`](crate::session::Session); nothing is registered globally.

use ahash::AHashMap;
use std::fmt;

use super::{Column, Node};
use crate::engine::{AggMethod, AggOptions, BinaryOp, UnaryOp, Value};
use crate::error::{Result, SheafError};

/// A resolved call argument.
#[derive(Debug, Clone)]
pub enum CallArg {
    /// Lazy column.
    Column(Column),
    /// Literal.
    Value(Value),
    /// Nested list.
    List(Vec<CallArg>),
}

impl CallArg {
    /// Column view; literals become broadcasting scalars.
    pub fn to_column(&self) -> Result<Column> {
        match self {
            CallArg::Column(c) => Ok(c.clone()),
            CallArg::Value(v) => Ok(Column::scalar(v.clone())),
            CallArg::List(_) => Err(SheafError::invalid("expected a column, found a list")),
        }
    }

    /// Literal view.
    pub fn to_value(&self) -> Result<&Value> {
        match self {
            CallArg::Value(v) => Ok(v),
            other => Err(SheafError::invalid(format!(
                "expected a literal argument, found {other:?}"
            ))),
        }
    }

    fn flatten_into(&self, out: &mut Vec<Column>) -> Result<()> {
        match self {
            CallArg::List(items) => {
                for item in items {
                    item.flatten_into(out)?;
                }
                Ok(())
            }
            other => {
                out.push(other.to_column()?);
                Ok(())
            }
        }
    }
}

/// Positional and keyword arguments of one call.
#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    /// Positional arguments.
    pub args: Vec<CallArg>,
    /// Keyword arguments in call order.
    pub kwargs: Vec<(String, CallArg)>,
}

impl CallArgs {
    /// Arguments from positional values only.
    pub fn positional(args: Vec<CallArg>) -> Self {
        Self {
            args,
            kwargs: Vec::new(),
        }
    }

    /// Keyword argument by name.
    pub fn kwarg(&self, name: &str) -> Option<&CallArg> {
        self.kwargs.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Positional argument `pos`, falling back to keyword `name`.
    pub fn get(&self, pos: usize, name: &str) -> Option<&CallArg> {
        self.args.get(pos).or_else(|| self.kwarg(name))
    }

    /// Required column argument.
    pub fn column(&self, pos: usize, name: &str) -> Result<Column> {
        self.get(pos, name)
            .ok_or_else(|| SheafError::invalid(format!("missing argument `{name}`")))?
            .to_column()
    }

    /// Optional non-negative integer argument.
    pub fn usize(&self, pos: usize, name: &str) -> Result<Option<usize>> {
        match self.get(pos, name) {
            None => Ok(None),
            Some(arg) => arg
                .to_value()?
                .as_usize()
                .map(Some)
                .ok_or_else(|| SheafError::invalid(format!("`{name}` must be a non-negative integer"))),
        }
    }

    /// Optional boolean keyword.
    pub fn flag(&self, name: &str) -> Result<bool> {
        match self.kwarg(name) {
            None => Ok(false),
            Some(arg) => match arg.to_value()? {
                Value::Bool(b) => Ok(*b),
                other => Err(SheafError::invalid(format!("`{name}` must be a bool, got {other}"))),
            },
        }
    }

    /// Every positional argument as columns, flattening lists.
    pub fn flatten_columns(&self) -> Result<Vec<Column>> {
        let mut out = Vec::new();
        for arg in &self.args {
            arg.flatten_into(&mut out)?;
        }
        Ok(out)
    }

    fn agg_options(&self, default_min_periods: usize) -> Result<AggOptions> {
        Ok(AggOptions {
            min_periods: match self.kwarg("min_periods") {
                None => default_min_periods,
                Some(arg) => arg.to_value()?.as_usize().ok_or_else(|| {
                    SheafError::invalid("`min_periods` must be a non-negative integer")
                })?,
            },
            stable: self.flag("stable")?,
            par: self.flag("par")?,
        })
    }
}

/// User-supplied method body.
pub type MethodFn = fn(&Column, &CallArgs) -> Result<Column>;

/// User-supplied module function body.
pub type ModuleFn = fn(&CallArgs) -> Result<Column>;

/// What a method name dispatches to.
#[derive(Clone, Copy)]
pub enum Method {
    /// Elementwise unary operation.
    Unary(UnaryOp),
    /// Elementwise binary operation; `reflected` puts the receiver on the right.
    Binary {
        /// Operation.
        op: BinaryOp,
        /// Receiver is the right operand.
        reflected: bool,
    },
    /// Whole-column reduction.
    Agg(AggMethod),
    /// Fixed-window rolling reduction (`ts_*`).
    Rolling(AggMethod),
    /// Rename.
    Alias,
    /// Checked row selection.
    Take,
    /// Custom function.
    Custom(MethodFn),
}

/// What a module function name dispatches to.
#[derive(Clone, Copy)]
pub enum ModuleFunc {
    /// Row-wise reduction across the arguments.
    Horizontal {
        /// Reduction.
        method: AggMethod,
        /// Default `min_periods`.
        min_periods: usize,
    },
    /// Custom function.
    Custom(ModuleFn),
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Unary(op) => write!(f, "Unary({op:?})"),
            Method::Binary { op, reflected } => write!(f, "Binary({op:?}, reflected={reflected})"),
            Method::Agg(m) => write!(f, "Agg({m})"),
            Method::Rolling(m) => write!(f, "Rolling({m})"),
            Method::Alias => f.write_str("Alias"),
            Method::Take => f.write_str("Take"),
            Method::Custom(_) => f.write_str("Custom"),
        }
    }
}

impl fmt::Debug for ModuleFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleFunc::Horizontal {
                method,
                min_periods,
            } => write!(f, "Horizontal({method}, min_periods={min_periods})"),
            ModuleFunc::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// Method and module-function tables.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    methods: AHashMap<String, Method>,
    modules: AHashMap<String, ModuleFunc>,
}

const AGG_METHODS: [AggMethod; 20] = [
    AggMethod::Sum,
    AggMethod::Mean,
    AggMethod::Min,
    AggMethod::Max,
    AggMethod::Std,
    AggMethod::Var,
    AggMethod::Skew,
    AggMethod::Kurt,
    AggMethod::Prod,
    AggMethod::Median,
    AggMethod::First,
    AggMethod::Last,
    AggMethod::Count,
    AggMethod::Len,
    AggMethod::ArgMax,
    AggMethod::ArgMin,
    AggMethod::Rank,
    AggMethod::Wma,
    AggMethod::Corr,
    AggMethod::Cov,
];

impl FunctionRegistry {
    /// Registry with no entries.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with operators, reductions, `ts_*` windows and horizontal helpers.
    pub fn builtin() -> Self {
        let mut reg = Self::empty();
        let binaries = [
            ("add", BinaryOp::Add),
            ("sub", BinaryOp::Sub),
            ("mul", BinaryOp::Mul),
            ("truediv", BinaryOp::Div),
            ("pow", BinaryOp::Pow),
            ("and", BinaryOp::And),
            ("or", BinaryOp::Or),
        ];
        for (name, op) in binaries {
            reg.register_method(format!("__{name}__"), Method::Binary { op, reflected: false });
            reg.register_method(format!("__r{name}__"), Method::Binary { op, reflected: true });
        }
        let comparisons = [
            ("eq", BinaryOp::Eq),
            ("ne", BinaryOp::Ne),
            ("lt", BinaryOp::Lt),
            ("le", BinaryOp::Le),
            ("gt", BinaryOp::Gt),
            ("ge", BinaryOp::Ge),
        ];
        for (name, op) in comparisons {
            reg.register_method(format!("__{name}__"), Method::Binary { op, reflected: false });
            reg.register_method(name, Method::Binary { op, reflected: false });
        }
        reg.register_method("pow", Method::Binary {
            op: BinaryOp::Pow,
            reflected: false,
        });
        for (name, op) in [
            ("__neg__", UnaryOp::Neg),
            ("__invert__", UnaryOp::Not),
            ("__abs__", UnaryOp::Abs),
            ("abs", UnaryOp::Abs),
            ("sqrt", UnaryOp::Sqrt),
            ("exp", UnaryOp::Exp),
            ("ln", UnaryOp::Ln),
            ("is_null", UnaryOp::IsNull),
            ("not_null", UnaryOp::NotNull),
        ] {
            reg.register_method(name, Method::Unary(op));
        }
        reg.register_method("alias", Method::Alias);
        reg.register_method("__getitem__", Method::Take);
        reg.register_method("take", Method::Take);
        for method in AGG_METHODS {
            reg.register_method(method.name(), Method::Agg(method));
            reg.register_method(format!("ts_{}", method.name()), Method::Rolling(method));
        }
        reg.register_method("ts_sma", Method::Rolling(AggMethod::Mean));
        for (name, method, min_periods) in [
            ("hmax", AggMethod::Max, 1),
            ("hmin", AggMethod::Min, 1),
            ("hmean", AggMethod::Mean, 1),
            ("hsum", AggMethod::Sum, 1),
            ("hstd", AggMethod::Std, 3),
        ] {
            reg.register_module(name, ModuleFunc::Horizontal {
                method,
                min_periods,
            });
        }
        reg
    }

    /// Adds or replaces a method entry.
    pub fn register_method(&mut self, name: impl Into<String>, method: Method) {
        self.methods.insert(name.into(), method);
    }

    /// Adds or replaces a module-function entry.
    pub fn register_module(&mut self, name: impl Into<String>, func: ModuleFunc) {
        self.modules.insert(name.into(), func);
    }

    /// Method entry by name.
    pub fn method(&self, name: &str) -> Option<Method> {
        self.methods.get(name).copied()
    }

    /// Module entry by name.
    pub fn module(&self, name: &str) -> Option<ModuleFunc> {
        self.modules.get(name).copied()
    }

    /// Applies method `name` to `receiver`.
    pub fn call_method(&self, name: &str, receiver: &Column, args: &CallArgs) -> Result<Column> {
        let method = self
            .method(name)
            .ok_or_else(|| SheafError::Selector(format!("unknown method `{name}`")))?;
        match method {
            Method::Unary(op) => Ok(receiver.unary(op)),
            Method::Binary { op, reflected } => {
                let other = args.column(0, "other")?;
                if reflected {
                    Ok(other
                        .binary(op, receiver)
                        .with_name(receiver.name().map(str::to_owned)))
                } else {
                    Ok(receiver.binary(op, other))
                }
            }
            Method::Agg(agg) => {
                let other = if agg.needs_other() {
                    Some(args.column(0, "other")?)
                } else {
                    None
                };
                Ok(receiver.agg_with(agg, other, args.agg_options(1)?))
            }
            Method::Rolling(agg) => {
                let (window_pos, other) = if agg.needs_other() {
                    (1, Some(args.column(0, "other")?))
                } else {
                    (0, None)
                };
                let window = args
                    .usize(window_pos, "window")?
                    .ok_or_else(|| SheafError::invalid(format!("`{name}` requires a window")))?;
                Ok(receiver.ts_with(agg, window, other, args.agg_options(1)?))
            }
            Method::Alias => match args.get(0, "name").map(CallArg::to_value).transpose()? {
                Some(Value::Str(new_name)) => Ok(receiver.alias(new_name.clone())),
                _ => Err(SheafError::invalid("`alias` requires a string name")),
            },
            Method::Take => Ok(receiver.take(&args.column(0, "idx")?)),
            Method::Custom(f) => f(receiver, args),
        }
    }

    /// Calls module function `name`.
    pub fn call_module(&self, name: &str, args: &CallArgs) -> Result<Column> {
        let func = self
            .module(name)
            .ok_or_else(|| SheafError::Selector(format!("unknown module function `{name}`")))?;
        match func {
            ModuleFunc::Horizontal {
                method,
                min_periods,
            } => {
                let inputs = args.flatten_columns()?;
                if inputs.is_empty() {
                    return Err(SheafError::invalid(format!("`{name}` needs at least one column")));
                }
                let opts = args.agg_options(min_periods)?;
                Ok(Column::from_node(Node::Horizontal {
                    method,
                    inputs,
                    opts,
                })
                .alias(name))
            }
            ModuleFunc::Custom(f) => f(args),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryEngine;

    #[test]
    fn reflected_operators_swap_operands() {
        let reg = FunctionRegistry::builtin();
        let a = Column::new("a", vec![10i64, 20]);
        let args = CallArgs::positional(vec![CallArg::Value(Value::Int(1))]);
        let out = reg.call_method("__rsub__", &a, &args).expect("rsub");
        assert_eq!(out.name(), Some("a"));
        let out = out.eval(&MemoryEngine::new()).expect("eval");
        assert_eq!(out.values().expect("values"), vec![Value::Int(-9), Value::Int(-19)]);
    }

    #[test]
    fn ts_methods_take_window_and_min_periods() {
        let reg = FunctionRegistry::builtin();
        let a = Column::new("a", vec![1.0, 2.0, 3.0]);
        let args = CallArgs {
            args: vec![CallArg::Value(Value::Int(2))],
            kwargs: vec![("min_periods".into(), CallArg::Value(Value::Int(2)))],
        };
        let out = reg
            .call_method("ts_mean", &a, &args)
            .expect("ts_mean")
            .eval(&MemoryEngine::new())
            .expect("eval");
        assert_eq!(
            out.values().expect("values"),
            vec![Value::Null, Value::Float(1.5), Value::Float(2.5)]
        );
    }

    #[test]
    fn unknown_names_are_selector_errors() {
        let reg = FunctionRegistry::builtin();
        let a = Column::new("a", vec![1i64]);
        match reg.call_method("no_such", &a, &CallArgs::default()) {
            Err(SheafError::Selector(msg)) => assert!(msg.contains("no_such")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(reg.call_module("no_such", &CallArgs::default()).is_err());
    }

    #[test]
    fn custom_methods_are_dispatched() {
        fn double(c: &Column, _: &CallArgs) -> Result<Column> {
            Ok(c * 2i64)
        }
        let mut reg = FunctionRegistry::empty();
        reg.register_method("double", Method::Custom(double));
        let a = Column::new("a", vec![3i64]);
        let out = reg
            .call_method("double", &a, &CallArgs::default())
            .expect("double")
            .eval(&MemoryEngine::new())
            .expect("eval");
        assert_eq!(out.values().expect("values"), vec![Value::Int(6)]);
    }
}
