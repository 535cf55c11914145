//! Core data model shared across learner threads.

pub mod ledger;
pub mod reward;
pub mod training_state;
