//! Lazy column algebra with window, group-by and join planning.
//!
//! Frames hold named [`Column`]s whose data is described by a shared compute
//! graph. Selectors, rolling windows, group-bys and joins only record graph
//! nodes; an [`ArrayEngine`] computes them when a frame or column is
//! evaluated.
//!
//! ```
//! use sheaf::prelude::*;
//!
//! let left = Frame::from_pairs([
//!     ("on", Array::from(vec!["a", "b", "a", "c"])),
//!     ("va", Array::from(vec![1i64, 2, 3, 4])),
//! ]);
//! let right = Frame::from_pairs([
//!     ("on", Array::from(vec!["b", "b", "c"])),
//!     ("vb", Array::from(vec![10i64, 20, 30])),
//! ]);
//! let joined = left.join(&right, JoinOptions::on(["on"]))?.eval()?;
//! assert_eq!(
//!     joined.column("vb")?.values()?,
//!     vec![Value::Null, Value::Int(20), Value::Null, Value::Int(30)]
//! );
//! # Ok::<(), sheaf::SheafError>(())
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod engine;
pub mod error;
pub mod expr;
pub mod frame;
pub mod horizontal;
pub mod join;
pub mod logging;
pub mod selector;
pub mod session;
pub mod window;

pub use config::Config;
pub use engine::{Array, ArrayEngine, DType, MemoryEngine, TimeDelta, Value};
pub use error::{Result, SheafError};
pub use expr::Column;
pub use frame::Frame;
pub use session::Session;

/// Common imports.
pub mod prelude {
    pub use crate::engine::{
        AggMethod, AggOptions, Array, ArrayEngine, Closed, Keep, MemoryEngine, StartBy, TimeDelta,
        Value,
    };
    pub use crate::error::{Result, SheafError};
    pub use crate::expr::Column;
    pub use crate::frame::{ColumnExpr, ColumnKey, DropHow, Frame, JoinHow, JoinOptions, Renames};
    pub use crate::horizontal::{hmax, hmean, hmin, hstd, hsum};
    pub use crate::join::{align_frames, get_align_frames_idx, AlignOptions};
    pub use crate::selector::{s, s_at, s_many, Selector, SelectorArgs};
    pub use crate::session::Session;
    pub use crate::window::{
        AggSpec, GroupByOptions, GroupByType, RollingOptions, RollingType, Window,
    };
}
