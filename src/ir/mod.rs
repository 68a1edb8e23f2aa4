//! Loop Tree intermediate representation.
//!
//! - `tree`: the IR itself (nodes, references, queries)
//! - `builder`: construction of initial trees
//! - `serial`: text encoding used for checkpoints
//! - `printer`: diagnostic rendering

pub mod tree;
pub mod builder;
pub mod serial;
pub mod printer;

pub use tree::*;
pub use builder::TreeBuilder;
pub use printer::{print_tree, print_tree_with, TreePrinter};
