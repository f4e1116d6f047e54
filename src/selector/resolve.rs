use tracing::trace;

use super::{Arg, SelectorArgs, SelectorBase, Selector};
use crate::error::{Result, SheafError};
use crate::expr::registry::{CallArg, CallArgs, FunctionRegistry};
use crate::expr::{Column, ContextKey};
use crate::frame::{Frame, Selected};

/// Shape of a resolved selector.
#[derive(Debug, Clone)]
pub enum Resolved {
    /// Single key or unbound selector.
    One(Column),
    /// List base or regex key.
    Many(Vec<Column>),
}

impl Resolved {
    /// Flattens into columns.
    pub fn into_columns(self) -> Vec<Column> {
        match self {
            Resolved::One(c) => vec![c],
            Resolved::Many(cs) => cs,
        }
    }

    /// The single column; lists are an error.
    pub fn into_one(self) -> Result<Column> {
        match self {
            Resolved::One(c) => Ok(c),
            Resolved::Many(cs) => Err(SheafError::Selector(format!(
                "expected one column, selector produced {}",
                cs.len()
            ))),
        }
    }
}

#[derive(Clone, Copy)]
enum Target<'a> {
    Frame(&'a Frame),
    Context,
}

impl Selector {
    /// Resolves against `frame` through its session's registry.
    pub fn resolve(&self, frame: &Frame) -> Result<Resolved> {
        self.run(Target::Frame(frame), frame.session().registry())
    }

    /// Resolves into window placeholders: keys become context references
    /// bound per window when the enclosing expression is evaluated.
    pub fn resolve_in_context(&self, registry: &FunctionRegistry) -> Result<Resolved> {
        self.run(Target::Context, registry)
    }

    fn check_ready(&self) -> Result<()> {
        if let Some(err) = &self.error {
            return Err(SheafError::Selector(err.clone()));
        }
        match &self.pending {
            Some(p) if p.module => Err(SheafError::Selector(
                "mod_func should not be used before a function call".to_owned(),
            )),
            Some(p) => Err(SheafError::Selector(format!(
                "function `{}` is pending; call it before resolving",
                p.name
            ))),
            None => Ok(()),
        }
    }

    fn run(&self, target: Target<'_>, registry: &FunctionRegistry) -> Result<Resolved> {
        self.check_ready()?;
        trace!(selector = %self, "resolving selector");
        let base = match self.base() {
            None => return Ok(Resolved::One(self.replay(None, target, registry)?)),
            Some(SelectorBase::Key(key)) => lookup(key, target)?,
            Some(SelectorBase::Keys(keys)) => {
                let mut cols = Vec::with_capacity(keys.len());
                for key in keys {
                    cols.extend(lookup(key, target)?.into_columns());
                }
                Resolved::Many(cols)
            }
        };
        match base {
            Resolved::One(c) => Ok(Resolved::One(self.replay(Some(c), target, registry)?)),
            Resolved::Many(cols) => cols
                .into_iter()
                .map(|c| self.replay(Some(c), target, registry))
                .collect::<Result<Vec<_>>>()
                .map(Resolved::Many),
        }
    }

    fn replay(
        &self,
        start: Option<Column>,
        target: Target<'_>,
        registry: &FunctionRegistry,
    ) -> Result<Column> {
        let mut current = start;
        for call in self.calls() {
            let args = match &call.args {
                Some(args) => resolve_args(args, target, registry)?,
                None => CallArgs::default(),
            };
            let next = if call.module {
                registry.call_module(&call.name, &args)?
            } else {
                let receiver = match current.take() {
                    Some(c) => c,
                    None => match target {
                        Target::Context => Column::context(ContextKey::Position(0)),
                        Target::Frame(_) => {
                            return Err(SheafError::Selector(format!(
                                "method `{}` has no receiver outside a window",
                                call.name
                            )))
                        }
                    },
                };
                registry.call_method(&call.name, &receiver, &args)?
            };
            current = Some(next);
        }
        current.ok_or_else(|| SheafError::Selector("empty selector selects nothing".to_owned()))
    }
}

fn lookup(key: &crate::frame::ColumnKey, target: Target<'_>) -> Result<Resolved> {
    match target {
        Target::Context => Ok(Resolved::One(key.to_context()?)),
        Target::Frame(frame) => Ok(match frame.get(key.clone())? {
            Selected::Column(c) => Resolved::One(c),
            Selected::Frame(sub) => Resolved::Many(sub.into_columns()),
        }),
    }
}

fn resolve_args(
    args: &SelectorArgs,
    target: Target<'_>,
    registry: &FunctionRegistry,
) -> Result<CallArgs> {
    let mut out = CallArgs::default();
    for arg in &args.args {
        out.args.push(resolve_arg(arg, target, registry)?);
    }
    for (name, arg) in &args.kwargs {
        out.kwargs.push((name.clone(), resolve_arg(arg, target, registry)?));
    }
    Ok(out)
}

fn resolve_arg(arg: &Arg, target: Target<'_>, registry: &FunctionRegistry) -> Result<CallArg> {
    Ok(match arg {
        Arg::Value(v) => CallArg::Value(v.clone()),
        Arg::Column(c) => CallArg::Column(c.clone()),
        Arg::Selector(sel) => match sel.run(target, registry)? {
            Resolved::One(c) => CallArg::Column(c),
            Resolved::Many(cols) => CallArg::List(cols.into_iter().map(CallArg::Column).collect()),
        },
        Arg::List(items) => CallArg::List(
            items
                .iter()
                .map(|item| resolve_arg(item, target, registry))
                .collect::<Result<_>>()?,
        ),
    })
}
