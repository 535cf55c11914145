//! Policy/value model interface consumed by the orchestrator.
//!
//! The numeric network behind this trait is an external collaborator; the
//! trainer only needs policy/value prediction, gradient computation and
//! application, parameter synchronization, and snapshot I/O. Gradient
//! application is safe to call concurrently from multiple learners without
//! external locking (see [`params::ParamSet::scaled_add`]).

pub mod linear;
pub mod params;

use std::path::Path;

use params::{GradientSet, ParamError, ParamSet, ParamSnapshot};

/// One recorded step of a rollout segment.
#[derive(Debug, Clone)]
pub struct RolloutStep {
    /// Observation the action was taken from.
    pub observation: Vec<f32>,
    /// Action taken (or replayed from a demonstration).
    pub action: usize,
    /// Transformed reward received.
    pub reward: f32,
    /// Value estimate recorded at selection time.
    pub value: f32,
    /// Log-probability of the action under the policy at selection time.
    pub log_prob: f32,
}

/// A rollout segment with its unrolled returns, ready for a gradient pass.
#[derive(Debug, Clone)]
pub struct RolloutBatch {
    /// Recorded steps, oldest first.
    pub steps: Vec<RolloutStep>,
    /// Discounted returns, aligned with `steps`.
    pub returns: Vec<f32>,
    /// Entropy bonus strength for this segment (demo and live segments use
    /// separately configured strengths).
    pub entropy_beta: f32,
}

/// Actor-critic model interface.
pub trait ActorCritic: Send + Sync {
    /// The model's parameter storage.
    fn params(&self) -> &ParamSet;

    /// Action distribution and value estimate for one observation.
    fn predict(&self, observation: &[f32]) -> (Vec<f32>, f32);

    /// Compute gradients of the combined policy/value loss over a segment:
    /// advantage-weighted negative log-probability plus an entropy bonus,
    /// and a squared value error.
    fn backward(&self, batch: &RolloutBatch) -> GradientSet;

    /// Clear recurrent state, if the variant carries any.
    fn reset_recurrent_state(&mut self) {}

    /// Apply gradients with the given learning rate. Callable concurrently
    /// from multiple learners; last-write-wins per tensor.
    fn apply_gradients(&self, grads: &GradientSet, learning_rate: f32) {
        self.params().scaled_add(grads, -learning_rate);
    }

    /// Copy parameters from another model of the same shape.
    fn sync_from(&self, other: &Self)
    where
        Self: Sized,
    {
        self.params().copy_from(other.params());
    }

    /// Point-in-time parameter copy.
    fn snapshot(&self) -> ParamSnapshot {
        self.params().snapshot()
    }

    /// Restore parameters from a snapshot.
    fn load_snapshot(&self, snapshot: &ParamSnapshot) -> Result<(), ParamError> {
        self.params().restore(snapshot)
    }

    /// Save parameters to disk.
    fn save(&self, path: &Path) -> Result<(), ParamError> {
        self.snapshot().save(path)
    }

    /// Load parameters from disk.
    fn load(&self, path: &Path) -> Result<(), ParamError> {
        self.load_snapshot(&ParamSnapshot::load(path)?)
    }
}

/// Unroll discounted returns backward from a bootstrap value.
pub fn discounted_returns(steps: &[RolloutStep], bootstrap: f32, gamma: f32) -> Vec<f32> {
    let mut returns = vec![0.0; steps.len()];
    let mut running = bootstrap;
    for (i, step) in steps.iter().enumerate().rev() {
        running = step.reward + gamma * running;
        returns[i] = running;
    }
    returns
}
