//! Demonstration store: recorded human trajectories used for pretraining,
//! demo-thread replay, and advice/reward-shaping statistics.
//!
//! The store is immutable after load and shared across learners behind an
//! `Arc`; concurrent reads only.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

/// Error type for demonstration loading.
#[derive(Debug)]
pub enum DemoError {
    /// IO error while reading trajectory files.
    Io(io::Error),
    /// Unparseable trajectory file.
    Parse(String),
    /// No trajectories found.
    Empty,
}

impl std::fmt::Display for DemoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DemoError::Io(e) => write!(f, "IO error: {}", e),
            DemoError::Parse(e) => write!(f, "parse error: {}", e),
            DemoError::Empty => write!(f, "no demonstration trajectories found"),
        }
    }
}

impl std::error::Error for DemoError {}

impl From<io::Error> for DemoError {
    fn from(e: io::Error) -> Self {
        DemoError::Io(e)
    }
}

/// One recorded demonstration step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoStep {
    /// Observation the demonstrator acted from.
    pub observation: Vec<f32>,
    /// Recorded action.
    pub action: usize,
    /// Recorded reward.
    pub reward: f32,
    /// Whether the recorded episode ended here.
    pub terminal: bool,
}

/// An ordered, finite, replayable demonstration trajectory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoTrajectory {
    /// Trajectory id within the store.
    pub id: usize,
    /// Recorded steps, oldest first.
    pub steps: Vec<DemoStep>,
}

impl DemoTrajectory {
    /// Number of recorded steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the trajectory has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Sum of recorded rewards.
    pub fn total_reward(&self) -> f32 {
        self.steps.iter().map(|s| s.reward).sum()
    }
}

/// Read-only, indexed collection of demonstration trajectories.
pub struct DemoStore {
    trajectories: Vec<DemoTrajectory>,
}

impl DemoStore {
    /// Build a store from in-memory trajectories.
    pub fn from_trajectories(trajectories: Vec<DemoTrajectory>) -> Result<Self, DemoError> {
        if trajectories.is_empty() {
            return Err(DemoError::Empty);
        }
        Ok(Self { trajectories })
    }

    /// Load every `*.json` trajectory file in a directory, sorted by file
    /// name. Any unreadable or unparseable file is fatal.
    pub fn load(dir: &Path) -> Result<Self, DemoError> {
        let mut paths: Vec<_> = fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|x| x.to_str()) == Some("json"))
            .collect();
        paths.sort();

        let mut trajectories = Vec::with_capacity(paths.len());
        for path in paths {
            let blob = fs::read_to_string(&path)?;
            let trajectory: DemoTrajectory = serde_json::from_str(&blob)
                .map_err(|e| DemoError::Parse(format!("{}: {}", path.display(), e)))?;
            trajectories.push(trajectory);
        }
        Self::from_trajectories(trajectories)
    }

    /// Number of trajectories.
    pub fn len(&self) -> usize {
        self.trajectories.len()
    }

    /// Whether the store holds no trajectories.
    pub fn is_empty(&self) -> bool {
        self.trajectories.is_empty()
    }

    /// Look up one trajectory by id.
    pub fn get_trajectory(&self, id: usize) -> Option<&DemoTrajectory> {
        self.trajectories.get(id)
    }

    /// Count of each recorded action across all trajectories.
    pub fn action_frequency(&self) -> BTreeMap<usize, u64> {
        let mut freq = BTreeMap::new();
        for trajectory in &self.trajectories {
            for step in &trajectory.steps {
                *freq.entry(step.action).or_insert(0) += 1;
            }
        }
        freq
    }

    /// Highest total reward across recorded trajectories.
    pub fn max_recorded_reward(&self) -> f32 {
        self.trajectories
            .iter()
            .map(|t| t.total_reward())
            .fold(f32::NEG_INFINITY, f32::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn trajectory(id: usize, actions: &[usize], final_reward: f32) -> DemoTrajectory {
        let n = actions.len();
        DemoTrajectory {
            id,
            steps: actions
                .iter()
                .enumerate()
                .map(|(i, &action)| DemoStep {
                    observation: vec![i as f32],
                    action,
                    reward: if i == n - 1 { final_reward } else { 0.0 },
                    terminal: i == n - 1,
                })
                .collect(),
        }
    }

    #[test]
    fn test_store_queries() {
        let store = DemoStore::from_trajectories(vec![
            trajectory(0, &[1, 1, 0], 2.0),
            trajectory(1, &[0, 1], 5.0),
        ])
        .unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.get_trajectory(1).unwrap().len(), 2);
        assert!(store.get_trajectory(9).is_none());
        assert_eq!(store.max_recorded_reward(), 5.0);

        let freq = store.action_frequency();
        assert_eq!(freq[&0], 2);
        assert_eq!(freq[&1], 3);
    }

    #[test]
    fn test_empty_store_rejected() {
        assert!(matches!(
            DemoStore::from_trajectories(vec![]),
            Err(DemoError::Empty)
        ));
    }

    #[test]
    fn test_load_from_directory() {
        let dir = tempdir().unwrap();
        for id in 0..3 {
            let t = trajectory(id, &[1, 0], id as f32);
            fs::write(
                dir.path().join(format!("demo_{:03}.json", id)),
                serde_json::to_string(&t).unwrap(),
            )
            .unwrap();
        }
        let store = DemoStore::load(dir.path()).unwrap();
        assert_eq!(store.len(), 3);
        assert_eq!(store.get_trajectory(2).unwrap().id, 2);
    }

    #[test]
    fn test_load_unparseable_file_is_fatal() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("bad.json"), "not json").unwrap();
        assert!(matches!(
            DemoStore::load(dir.path()),
            Err(DemoError::Parse(_))
        ));
    }
}
