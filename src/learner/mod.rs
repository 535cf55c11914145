//! Learner threads: rollout collection, demonstration replay, pretraining,
//! and evaluation.
//!
//! Each learner owns a private environment and a local model copy; the only
//! shared objects it touches are the global parameters and the training
//! state. A segment is: sync local from global, act for up to `local_t_max`
//! steps, compute gradients against the unrolled returns, push them to the
//! global parameters, sync again.

mod learner;

#[cfg(test)]
mod tests;

pub use learner::{evaluate, A3CLearner, EvalResult, SegmentOutcome};
