//! The explicit context shared by frames: engine, function registry and
//! configuration.

use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::config::Config;
use crate::engine::{ArrayEngine, MemoryEngine};
use crate::error::Result;
use crate::expr::registry::FunctionRegistry;
use crate::expr::{eval_columns, Column};
use crate::frame::Frame;

/// Engine, registry and configuration used by frame operations.
#[derive(Clone)]
pub struct Session {
    config: Config,
    registry: Arc<FunctionRegistry>,
    engine: Arc<dyn ArrayEngine>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("engine", &self.engine.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(
            Config::default(),
            FunctionRegistry::builtin(),
            Arc::new(MemoryEngine::new()),
        )
    }
}

impl Session {
    /// Session over explicit parts.
    pub fn new(config: Config, registry: FunctionRegistry, engine: Arc<dyn ArrayEngine>) -> Self {
        Self {
            config,
            registry: Arc::new(registry),
            engine,
        }
    }

    /// Default registry and engine with `config`.
    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Wraps the session for sharing between frames.
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Method and module-function tables.
    pub fn registry(&self) -> &Arc<FunctionRegistry> {
        &self.registry
    }

    /// Engine that evaluates column graphs.
    pub fn engine(&self) -> &Arc<dyn ArrayEngine> {
        &self.engine
    }

    /// Evaluates `columns` in one pass; shared nodes are computed once.
    pub fn eval(&self, columns: &[Column]) -> Result<Vec<Column>> {
        debug!(engine = self.engine.name(), columns = columns.len(), "evaluating columns");
        eval_columns(self.engine.as_ref(), columns)
    }

    /// Evaluates every frame in one pass, so indices shared across frames
    /// (such as aligned join indices) are computed once.
    pub fn eval_frames(&self, frames: &[Frame]) -> Result<Vec<Frame>> {
        let all: Vec<Column> = frames
            .iter()
            .flat_map(|f| f.columns().iter().cloned())
            .collect();
        let mut evaluated = self.eval(&all)?.into_iter();
        Ok(frames
            .iter()
            .map(|f| {
                let columns = evaluated.by_ref().take(f.len()).collect();
                Frame::new(columns, Arc::clone(f.session()), false)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Value;

    #[test]
    fn eval_frames_keeps_frame_boundaries() {
        let session = Session::default().shared();
        let a = Frame::new(
            vec![Column::new("x", vec![1i64, 2]), Column::new("y", vec![3i64, 4])],
            Arc::clone(&session),
            false,
        );
        let x = a.column("x").expect("x");
        let b = Frame::new(vec![(&x + 1i64).alias("z")], Arc::clone(&session), false);
        let out = session.eval_frames(&[a, b]).expect("eval");
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].names(), vec!["x", "y"]);
        assert_eq!(
            out[1].column("z").expect("z").values().expect("values"),
            vec![Value::Int(2), Value::Int(3)]
        );
    }

    #[test]
    fn config_reaches_generated_names() {
        let mut config = Config::default();
        config.naming.auto_prefix = "c".into();
        let session = Session::with_config(config).shared();
        let frame = Frame::new(vec![Column::unnamed(vec![1i64])], session, false);
        assert_eq!(frame.names(), vec!["c0"]);
    }
}
