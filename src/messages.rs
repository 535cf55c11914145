//! Messages sent from learner threads to the driver.
//!
//! The driver's main thread drains these while waiting for learners to
//! finish; they are observational and never affect control flow.

/// Telemetry and lifecycle messages from a learner thread.
#[derive(Debug, Clone)]
pub enum WorkerMsg {
    /// A training episode completed.
    Episode {
        /// Reporting learner index.
        learner_id: usize,
        /// Global step when the episode ended.
        global_t: u64,
        /// Total episode reward.
        reward: f32,
        /// Episode length in environment steps.
        length: u64,
    },

    /// An evaluation finished inside the gate.
    EvalDone {
        /// Boundary the evaluation was run for.
        global_t: u64,
        /// Mean reward per completed evaluation episode.
        reward: f32,
        /// Environment steps consumed.
        steps: u64,
        /// Episodes completed.
        episodes: u32,
    },

    /// A learner converted to or from demo-trajectory replay.
    DemoThread {
        /// Learner index.
        learner_id: usize,
        /// True on conversion, false on reverting to live rollout.
        started: bool,
        /// Concurrent demo threads after the change.
        active: usize,
    },

    /// A learner thread finished.
    Finished {
        /// Learner index.
        learner_id: usize,
        /// Why it finished.
        reason: FinishReason,
    },
}

/// Reason why a learner thread finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// Training budget reached.
    Completed,
    /// Stop flag observed.
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_reason_equality() {
        assert_eq!(FinishReason::Completed, FinishReason::Completed);
        assert_ne!(FinishReason::Completed, FinishReason::Stopped);
    }
}
