//! Append-only reward ledger persisted with each checkpoint.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

/// One recorded reward observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardEntry {
    /// Reward (per-episode for train entries, mean-per-episode for eval).
    pub reward: f32,
    /// Environment steps covered by the observation.
    pub steps: u64,
    /// Episodes covered by the observation.
    pub episodes: u32,
}

/// Train and eval reward histories, keyed by global step.
///
/// Append-only during a run; serialized as a single JSON blob at shutdown
/// and restored wholesale on resume.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RewardLedger {
    /// Per-episode training rewards.
    pub train: BTreeMap<u64, RewardEntry>,
    /// Evaluation results, one per crossed boundary.
    pub eval: BTreeMap<u64, RewardEntry>,
}

impl RewardLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed training episode at the given global step.
    pub fn record_train(&mut self, global_t: u64, reward: f32, steps: u64) {
        self.train.insert(
            global_t,
            RewardEntry {
                reward,
                steps,
                episodes: 1,
            },
        );
    }

    /// Record an evaluation result at the given global step.
    pub fn record_eval(&mut self, global_t: u64, reward: f32, steps: u64, episodes: u32) {
        self.eval.insert(
            global_t,
            RewardEntry {
                reward,
                steps,
                episodes,
            },
        );
    }

    /// Serialize the ledger to a JSON file.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let blob = serde_json::to_string(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, blob)
    }

    /// Load a ledger from a JSON file.
    pub fn load(path: &Path) -> io::Result<Self> {
        let blob = fs::read_to_string(path)?;
        serde_json::from_str(&blob).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_record_and_roundtrip() {
        let mut ledger = RewardLedger::new();
        ledger.record_train(10, 1.5, 42);
        ledger.record_eval(0, -0.5, 100, 3);
        ledger.record_eval(50, 2.0, 100, 4);

        let dir = tempdir().unwrap();
        let path = dir.path().join("rewards.json");
        ledger.save(&path).unwrap();

        let loaded = RewardLedger::load(&path).unwrap();
        assert_eq!(loaded.train.len(), 1);
        assert_eq!(loaded.eval.len(), 2);
        assert_eq!(loaded.eval[&50].episodes, 4);
        assert_eq!(loaded.train[&10].steps, 42);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempdir().unwrap();
        assert!(RewardLedger::load(&dir.path().join("absent.json")).is_err());
    }

    #[test]
    fn test_eval_keys_are_ordered() {
        let mut ledger = RewardLedger::new();
        ledger.record_eval(100, 1.0, 10, 1);
        ledger.record_eval(0, 0.0, 10, 1);
        ledger.record_eval(50, 0.5, 10, 1);
        let keys: Vec<u64> = ledger.eval.keys().copied().collect();
        assert_eq!(keys, vec![0, 50, 100]);
    }
}
