//! Document mutation: invertible steps, the position maps they induce, and
//! the transaction builder that strings them together.

mod step;
mod structure;
mod transaction;

pub use step::{Mapping, Step, StepMap};
pub use structure::{Side, can_join, can_split, find_cut_before, lift_target, textblock_at};
pub use transaction::Transaction;
