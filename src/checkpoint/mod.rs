//! Run-folder checkpointing and crash recovery.
//!
//! Layout per run folder:
//!
//! ```text
//! <run folder>/
//!   checkpoint_<step>.json          final parameter snapshot (shutdown)
//!   wall_t.<step>                   elapsed seconds at that step
//!   pretrain_global_t               pretraining step counter
//!   <env>-rewards.json              serialized reward ledger
//!   model_checkpoints/              rolling snapshots during the run
//!     checkpoint_<step>.json
//!   model_best/                     best evaluation so far
//!     best_model_reward
//!     checkpoint.json
//! ```
//!
//! Restore is all-or-nothing: a snapshot whose companion files are missing
//! or unparseable is fatal, never silently resumed from.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::core::ledger::RewardLedger;
use crate::model::params::{ParamError, ParamSnapshot};

/// Error type for checkpointing operations.
#[derive(Debug)]
pub enum CheckpointError {
    /// IO error during save/load.
    Io(io::Error),
    /// Parameter snapshot error.
    Params(ParamError),
    /// A snapshot exists but a companion file is missing or unparseable.
    Inconsistent(String),
}

impl std::fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckpointError::Io(e) => write!(f, "IO error: {}", e),
            CheckpointError::Params(e) => write!(f, "snapshot error: {}", e),
            CheckpointError::Inconsistent(what) => {
                write!(f, "partially-consistent checkpoint: {}", what)
            }
        }
    }
}

impl std::error::Error for CheckpointError {}

impl From<io::Error> for CheckpointError {
    fn from(e: io::Error) -> Self {
        CheckpointError::Io(e)
    }
}

impl From<ParamError> for CheckpointError {
    fn from(e: ParamError) -> Self {
        CheckpointError::Params(e)
    }
}

/// Everything needed to resume an interrupted run.
#[derive(Debug)]
pub struct RestoredState {
    /// Global step at the checkpoint.
    pub global_t: u64,
    /// Elapsed training seconds accumulated across prior runs.
    pub wall_t: f64,
    /// Pretraining step counter.
    pub pretrain_global_t: u64,
    /// Best evaluation reward seen.
    pub best_reward: f32,
    /// Reward ledger.
    pub ledger: RewardLedger,
    /// Parameter snapshot.
    pub snapshot: ParamSnapshot,
}

/// Checkpoint reader/writer bound to one run folder.
pub struct Checkpointer {
    folder: PathBuf,
    env_tag: String,
}

impl Checkpointer {
    /// Bind to a run folder. Does not touch the filesystem.
    pub fn new(folder: impl Into<PathBuf>, env_tag: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
            env_tag: env_tag.into(),
        }
    }

    /// The run folder.
    pub fn folder(&self) -> &Path {
        &self.folder
    }

    fn rolling_dir(&self) -> PathBuf {
        self.folder.join("model_checkpoints")
    }

    fn best_dir(&self) -> PathBuf {
        self.folder.join("model_best")
    }

    fn ledger_path(&self) -> PathBuf {
        self.folder.join(format!("{}-rewards.json", self.env_tag))
    }

    /// Create the fresh folder layout for a new run.
    pub fn prepare_fresh(&self) -> Result<(), CheckpointError> {
        fs::create_dir_all(&self.folder)?;
        fs::create_dir_all(self.rolling_dir())?;
        fs::create_dir_all(self.best_dir())?;
        Ok(())
    }

    /// Whether a prior final snapshot exists in the run folder.
    pub fn has_checkpoint(&self) -> bool {
        self.find_final_step().ok().flatten().is_some()
    }

    fn find_final_step(&self) -> Result<Option<u64>, CheckpointError> {
        if !self.folder.exists() {
            return Ok(None);
        }
        let mut best: Option<u64> = None;
        for entry in fs::read_dir(&self.folder)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = match name.to_str() {
                Some(n) => n,
                None => continue,
            };
            if let Some(step) = name
                .strip_prefix("checkpoint_")
                .and_then(|n| n.strip_suffix(".json"))
                .and_then(|n| n.parse::<u64>().ok())
            {
                best = Some(best.map_or(step, |b: u64| b.max(step)));
            }
        }
        Ok(best)
    }

    /// Restore the latest final snapshot and all companion state.
    ///
    /// Returns `Ok(None)` when no checkpoint exists. A checkpoint with any
    /// missing or unparseable companion file is an error.
    pub fn restore(&self) -> Result<Option<RestoredState>, CheckpointError> {
        let global_t = match self.find_final_step()? {
            Some(step) => step,
            None => return Ok(None),
        };

        let snapshot =
            ParamSnapshot::load(&self.folder.join(format!("checkpoint_{}.json", global_t)))?;

        let wall_path = self.folder.join(format!("wall_t.{}", global_t));
        let wall_t: f64 = fs::read_to_string(&wall_path)
            .map_err(|_| CheckpointError::Inconsistent(format!("missing {}", wall_path.display())))?
            .trim()
            .parse()
            .map_err(|_| {
                CheckpointError::Inconsistent(format!("unparseable {}", wall_path.display()))
            })?;

        let pretrain_path = self.folder.join("pretrain_global_t");
        let pretrain_global_t: u64 = fs::read_to_string(&pretrain_path)
            .map_err(|_| {
                CheckpointError::Inconsistent(format!("missing {}", pretrain_path.display()))
            })?
            .trim()
            .parse()
            .map_err(|_| {
                CheckpointError::Inconsistent(format!("unparseable {}", pretrain_path.display()))
            })?;

        let best_path = self.best_dir().join("best_model_reward");
        let best_reward: f32 = fs::read_to_string(&best_path)
            .map_err(|_| CheckpointError::Inconsistent(format!("missing {}", best_path.display())))?
            .trim()
            .parse()
            .map_err(|_| {
                CheckpointError::Inconsistent(format!("unparseable {}", best_path.display()))
            })?;

        let ledger = RewardLedger::load(&self.ledger_path()).map_err(|_| {
            CheckpointError::Inconsistent(format!("missing {}", self.ledger_path().display()))
        })?;

        Ok(Some(RestoredState {
            global_t,
            wall_t,
            pretrain_global_t,
            best_reward,
            ledger,
            snapshot,
        }))
    }

    /// Write a rolling snapshot into `model_checkpoints/`.
    pub fn save_rolling(
        &self,
        global_t: u64,
        snapshot: &ParamSnapshot,
    ) -> Result<PathBuf, CheckpointError> {
        let path = self
            .rolling_dir()
            .join(format!("checkpoint_{}.json", global_t));
        snapshot.save(&path)?;
        Ok(path)
    }

    /// Persist the best-model record: reward scalar and its parameter
    /// snapshot, written together and immediately (not batched with the
    /// next full checkpoint).
    pub fn save_best(&self, reward: f32, snapshot: &ParamSnapshot) -> Result<(), CheckpointError> {
        fs::create_dir_all(self.best_dir())?;
        fs::write(self.best_dir().join("best_model_reward"), reward.to_string())?;
        snapshot.save(&self.best_dir().join("checkpoint.json"))?;
        Ok(())
    }

    /// Read the persisted best-model record, if any.
    pub fn load_best(&self) -> Result<Option<(f32, ParamSnapshot)>, CheckpointError> {
        let reward_path = self.best_dir().join("best_model_reward");
        if !reward_path.exists() {
            return Ok(None);
        }
        let reward: f32 = fs::read_to_string(&reward_path)?
            .trim()
            .parse()
            .map_err(|_| {
                CheckpointError::Inconsistent(format!("unparseable {}", reward_path.display()))
            })?;
        let snapshot = ParamSnapshot::load(&self.best_dir().join("checkpoint.json"))?;
        Ok(Some((reward, snapshot)))
    }

    /// Persist the shutdown checkpoint: final snapshot, wall clock,
    /// pretraining counter, and the reward ledger. Called exactly once.
    pub fn save_final(
        &self,
        global_t: u64,
        wall_t: f64,
        pretrain_global_t: u64,
        snapshot: &ParamSnapshot,
        ledger: &RewardLedger,
    ) -> Result<(), CheckpointError> {
        fs::create_dir_all(&self.folder)?;
        snapshot.save(&self.folder.join(format!("checkpoint_{}.json", global_t)))?;
        fs::write(
            self.folder.join(format!("wall_t.{}", global_t)),
            wall_t.to_string(),
        )?;
        fs::write(
            self.folder.join("pretrain_global_t"),
            pretrain_global_t.to_string(),
        )?;
        ledger.save(&self.ledger_path())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::params::ParamSet;
    use tempfile::tempdir;

    fn snapshot() -> ParamSnapshot {
        ParamSet::new()
            .tensor("w", vec![1.0, 2.0, 3.0])
            .snapshot()
    }

    #[test]
    fn test_fresh_layout() {
        let dir = tempdir().unwrap();
        let ckpt = Checkpointer::new(dir.path().join("run"), "Pong_v4");
        ckpt.prepare_fresh().unwrap();
        assert!(dir.path().join("run/model_checkpoints").exists());
        assert!(dir.path().join("run/model_best").exists());
        assert!(!ckpt.has_checkpoint());
        assert!(ckpt.restore().unwrap().is_none());
    }

    #[test]
    fn test_final_roundtrip() {
        let dir = tempdir().unwrap();
        let ckpt = Checkpointer::new(dir.path(), "Pong_v4");
        ckpt.prepare_fresh().unwrap();

        let mut ledger = RewardLedger::new();
        ledger.record_eval(100, 3.5, 50, 2);
        ckpt.save_best(3.5, &snapshot()).unwrap();
        ckpt.save_final(100, 42.5, 7, &snapshot(), &ledger).unwrap();

        let restored = ckpt.restore().unwrap().unwrap();
        assert_eq!(restored.global_t, 100);
        assert!((restored.wall_t - 42.5).abs() < 1e-9);
        assert_eq!(restored.pretrain_global_t, 7);
        assert_eq!(restored.best_reward, 3.5);
        assert_eq!(restored.ledger.eval[&100].reward, 3.5);
        assert_eq!(restored.snapshot, snapshot());
    }

    #[test]
    fn test_latest_final_snapshot_wins() {
        let dir = tempdir().unwrap();
        let ckpt = Checkpointer::new(dir.path(), "Pong_v4");
        ckpt.prepare_fresh().unwrap();
        ckpt.save_best(0.0, &snapshot()).unwrap();

        let ledger = RewardLedger::new();
        ckpt.save_final(50, 1.0, 0, &snapshot(), &ledger).unwrap();
        ckpt.save_final(200, 2.0, 0, &snapshot(), &ledger).unwrap();
        assert_eq!(ckpt.restore().unwrap().unwrap().global_t, 200);
    }

    #[test]
    fn test_missing_companion_is_fatal() {
        let dir = tempdir().unwrap();
        let ckpt = Checkpointer::new(dir.path(), "Pong_v4");
        ckpt.prepare_fresh().unwrap();
        ckpt.save_best(1.0, &snapshot()).unwrap();
        ckpt.save_final(100, 1.0, 0, &snapshot(), &RewardLedger::new())
            .unwrap();

        // delete one companion: resume must fail, not silently continue
        std::fs::remove_file(dir.path().join("wall_t.100")).unwrap();
        assert!(matches!(
            ckpt.restore(),
            Err(CheckpointError::Inconsistent(_))
        ));
    }

    #[test]
    fn test_best_record_pair() {
        let dir = tempdir().unwrap();
        let ckpt = Checkpointer::new(dir.path(), "Pong_v4");
        ckpt.prepare_fresh().unwrap();
        assert!(ckpt.load_best().unwrap().is_none());

        ckpt.save_best(7.25, &snapshot()).unwrap();
        let (reward, snap) = ckpt.load_best().unwrap().unwrap();
        assert_eq!(reward, 7.25);
        assert_eq!(snap, snapshot());
    }
}
