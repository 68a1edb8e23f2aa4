//! The fixed action catalog.
//!
//! Each action is a zero-argument move at the cursor. Dispatch is a single
//! exhaustive `match` into a [`Plan`], so the legality check and the real
//! application always consult the same primitive with the same arguments.

use crate::ir::{Annotation, LoopTree, NodeRef};
use crate::transform::{
    next_ref, previous_ref, AdjustReuse, Annotate, CopyInput, Merge, ReuseStep, Rewrite, Split,
    Swap, Transform,
};
use crate::utils::errors::TransformResult;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;

/// Split factors offered by the catalog; `Fn` splits off an inner loop of
/// trip count `n`.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SplitFactor {
    F2,
    F3,
    F4,
    F8,
    F16,
    F32,
    F64,
    F128,
    F256,
}

impl SplitFactor {
    /// The inner trip count this factor produces.
    pub fn value(&self) -> u64 {
        match self {
            SplitFactor::F2 => 2,
            SplitFactor::F3 => 3,
            SplitFactor::F4 => 4,
            SplitFactor::F8 => 8,
            SplitFactor::F16 => 16,
            SplitFactor::F32 => 32,
            SplitFactor::F64 => 64,
            SplitFactor::F128 => 128,
            SplitFactor::F256 => 256,
        }
    }
}

/// A move available to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Cursor to the previous node in canonical order
    Up,
    /// Cursor to the next node in canonical order
    Down,
    /// Interchange the cursor loop with the previous node
    SwapUp,
    /// Interchange the cursor loop with the next node
    SwapDown,
    /// Split the cursor loop; the inner piece gets the factor
    Split(SplitFactor),
    /// Merge the cursor loop with its enclosed loop
    Merge,
    /// Toggle vectorization of the cursor node
    Vectorize,
    /// Toggle unrolling of the cursor node
    Unroll,
    /// Materialize input 0 of the cursor's compute leaf
    CopyInput0,
    /// Materialize input 1 of the cursor's compute leaf
    CopyInput1,
    /// Raise the cursor loop's reuse parameter
    IncreaseReuse,
    /// Lower the cursor loop's reuse parameter
    DecreaseReuse,
}

/// What an action does once its arguments are resolved against a state.
pub(crate) enum Plan {
    /// Move the cursor, leaving the tree as is
    Move(NodeRef),
    /// Run a primitive at the cursor
    Rewrite(Box<dyn Transform>),
}

/// Result of applying an action.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The cursor moved; the tree is unchanged
    Moved(NodeRef),
    /// The tree was rewritten; `cursor` is where the old cursor now points
    Rewritten {
        /// The new tree and its retired references
        rewrite: Rewrite,
        /// Cursor in the new tree
        cursor: NodeRef,
    },
}

static BY_NAME: Lazy<HashMap<&'static str, Action>> = Lazy::new(|| {
    Action::ALL.iter().map(|&a| (a.name(), a)).collect()
});

impl Action {
    /// Every action, in catalog order.
    pub const ALL: [Action; 20] = [
        Action::Up,
        Action::Down,
        Action::SwapUp,
        Action::SwapDown,
        Action::Split(SplitFactor::F2),
        Action::Split(SplitFactor::F3),
        Action::Split(SplitFactor::F4),
        Action::Split(SplitFactor::F8),
        Action::Split(SplitFactor::F16),
        Action::Split(SplitFactor::F32),
        Action::Split(SplitFactor::F64),
        Action::Split(SplitFactor::F128),
        Action::Split(SplitFactor::F256),
        Action::Merge,
        Action::Vectorize,
        Action::Unroll,
        Action::CopyInput0,
        Action::CopyInput1,
        Action::IncreaseReuse,
        Action::DecreaseReuse,
    ];

    /// Catalog name, as accepted by [`Action::from_name`].
    pub fn name(&self) -> &'static str {
        match self {
            Action::Up => "up",
            Action::Down => "down",
            Action::SwapUp => "swap_up",
            Action::SwapDown => "swap_down",
            Action::Split(SplitFactor::F2) => "split_2",
            Action::Split(SplitFactor::F3) => "split_3",
            Action::Split(SplitFactor::F4) => "split_4",
            Action::Split(SplitFactor::F8) => "split_8",
            Action::Split(SplitFactor::F16) => "split_16",
            Action::Split(SplitFactor::F32) => "split_32",
            Action::Split(SplitFactor::F64) => "split_64",
            Action::Split(SplitFactor::F128) => "split_128",
            Action::Split(SplitFactor::F256) => "split_256",
            Action::Merge => "merge",
            Action::Vectorize => "vectorize",
            Action::Unroll => "unroll",
            Action::CopyInput0 => "copy_input_0",
            Action::CopyInput1 => "copy_input_1",
            Action::IncreaseReuse => "increase_reuse",
            Action::DecreaseReuse => "decrease_reuse",
        }
    }

    /// Look up an action by its catalog name.
    pub fn from_name(name: &str) -> Option<Action> {
        BY_NAME.get(name).copied()
    }

    /// One-line description for help listings.
    pub fn description(&self) -> &'static str {
        match self {
            Action::Up => "move the cursor to the previous node",
            Action::Down => "move the cursor to the next node",
            Action::SwapUp => "interchange the cursor loop with the previous loop",
            Action::SwapDown => "interchange the cursor loop with the next loop",
            Action::Split(_) => "split the cursor loop by a constant factor",
            Action::Merge => "merge the cursor loop with the loop it encloses",
            Action::Vectorize => "toggle vectorization of the cursor node",
            Action::Unroll => "toggle unrolling of the cursor node",
            Action::CopyInput0 | Action::CopyInput1 => "materialize an input of the compute leaf",
            Action::IncreaseReuse => "raise the reuse parameter of the cursor loop",
            Action::DecreaseReuse => "lower the reuse parameter of the cursor loop",
        }
    }

    /// Whether this action only moves the cursor.
    pub fn is_navigation(&self) -> bool {
        matches!(self, Action::Up | Action::Down)
    }

    pub(crate) fn plan(&self, tree: &LoopTree, cursor: NodeRef) -> TransformResult<Plan> {
        let plan = match self {
            Action::Up => Plan::Move(previous_ref(tree, cursor)?),
            Action::Down => Plan::Move(next_ref(tree, cursor)?),
            Action::SwapUp => Plan::Rewrite(Box::new(Swap::new(previous_ref(tree, cursor)?))),
            Action::SwapDown => Plan::Rewrite(Box::new(Swap::new(next_ref(tree, cursor)?))),
            Action::Split(factor) => Plan::Rewrite(Box::new(Split::new(factor.value()))),
            Action::Merge => Plan::Rewrite(Box::new(Merge::new())),
            Action::Vectorize => Plan::Rewrite(Box::new(Annotate::new(Annotation::Vectorize))),
            Action::Unroll => Plan::Rewrite(Box::new(Annotate::new(Annotation::Unroll))),
            Action::CopyInput0 => Plan::Rewrite(Box::new(CopyInput::new(0))),
            Action::CopyInput1 => Plan::Rewrite(Box::new(CopyInput::new(1))),
            Action::IncreaseReuse => Plan::Rewrite(Box::new(AdjustReuse::new(ReuseStep::Increase))),
            Action::DecreaseReuse => Plan::Rewrite(Box::new(AdjustReuse::new(ReuseStep::Decrease))),
        };
        Ok(plan)
    }

    /// Legality of this action at `cursor`, without building a tree.
    pub fn check(&self, tree: &LoopTree, cursor: NodeRef) -> TransformResult<()> {
        match self.plan(tree, cursor)? {
            Plan::Move(_) => Ok(()),
            Plan::Rewrite(t) => t.check(tree, cursor),
        }
    }

    /// Apply this action at `cursor`.
    pub fn step(&self, tree: &LoopTree, cursor: NodeRef) -> TransformResult<Outcome> {
        match self.plan(tree, cursor)? {
            Plan::Move(to) => Ok(Outcome::Moved(to)),
            Plan::Rewrite(t) => {
                let rewrite = t.apply(tree, cursor)?;
                let cursor = rewrite.follow(cursor);
                Ok(Outcome::Rewritten { rewrite, cursor })
            }
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
