//! # looptree - Loop Tree Schedule Search
//!
//! A mutable nested-loop IR for one tensor computation, exposed as a
//! discrete action space for automated schedule search:
//! - Loop tree IR with stable node references
//! - Legality-checked transformations (split, merge, swap, annotate,
//!   input materialization, reuse adjustment)
//! - Cursor navigation and side-effect-free legality checks
//! - Metrics (FLOP count, runtime through a pluggable backend, throughput)
//! - State checkpoints and reference search drivers
//!
//! ## Architecture
//!
//! ```text
//! Search driver → Agent → Transform / Metrics → LoopTree
//! ```
//!
//! ## Example
//!
//! ```rust
//! use looptree::prelude::*;
//!
//! let tree = TreeBuilder::new()
//!     .open_loop("m", 64)
//!     .open_loop("n", 64)
//!     .leaf(OpKind::MulAdd, &["A", "B"], "C")
//!     .build()?;
//!
//! let mut agent = Agent::new(tree);
//! agent.apply_action("split_8")?.apply_action("down")?.apply_action("vectorize")?;
//! println!("{}", agent.dump());
//! println!("{:.3e} FLOP/s", agent.eval("FLOPS")?);
//! # Ok::<(), anyhow::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ir;
pub mod transform;
pub mod metrics;
pub mod agent;
pub mod search;
pub mod utils;

// Re-export commonly used types
pub mod prelude {
    //! Convenient re-exports of commonly used types and traits.

    pub use crate::ir::{Annotation, LoopTree, NodeRef, OpKind, TreeBuilder};
    pub use crate::transform::{Rewrite, Transform};
    pub use crate::metrics::{Backend, CostModel, FixedBackend, Metric};
    pub use crate::agent::{Action, Agent};
    pub use crate::search::{run_search, GreedySearch, RandomWalk, SearchConfig, SearchStrategy};
    pub use crate::utils::errors::*;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
