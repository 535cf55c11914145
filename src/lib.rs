//! # A3C Trainer
//!
//! Asynchronous Advantage Actor-Critic training orchestrator with optional
//! demonstration pretraining, demo-thread replay, reward shaping / advice from
//! a frozen reference model, and transfer initialization of parameter subsets.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                         A3CDriver                                  │
//! ├────────────────────────────────────────────────────────────────────┤
//! │  Thread 0           Thread 1           Thread N-1                  │
//! │  ┌──────────┐       ┌──────────┐       ┌──────────┐                │
//! │  │Learner 0 │       │Learner 1 │       │Learner N │                │
//! │  │ env      │       │ env      │       │ env      │                │
//! │  │ local M  │       │ local M  │       │ local M  │                │
//! │  └────┬─────┘       └────┬─────┘       └────┬─────┘                │
//! │       │  apply_gradients │ (Hogwild)        │                      │
//! │       └──────────────────┼──────────────────┘                      │
//! │                          ▼                                         │
//! │              ┌──────────────────────┐   ┌──────────────────┐       │
//! │              │  Global ParamSet     │   │  TrainingState   │       │
//! │              │  (per-tensor locks)  │   │  global_t, gate, │       │
//! │              └──────────────────────┘   │  ledger, markers │       │
//! │                                         └──────────────────┘       │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each learner thread repeatedly syncs its private model copy from the
//! global parameter set, collects a bounded rollout segment, pushes gradients
//! back, and reports the step delta. Whenever a report crosses an evaluation
//! boundary, the reporting thread claims the boundary through the shared
//! evaluation gate, pauses its peers, runs a deterministic evaluation on a
//! dedicated environment, records the result, and conditionally writes
//! rolling / best-model checkpoints. All progress needed to resume after an
//! interruption (global step, wall clock, pretrain step, reward ledger, best
//! model, parameters) is persisted in the run folder.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use a3c_trainer::{A3CConfig, A3CDriver, ChainEnv, LinearActorCritic};
//!
//! let config = A3CConfig::new("ChainEnv-v0")
//!     .with_parallel_size(8)
//!     .with_max_time_step(1_000_000)
//!     .with_eval_freq(10_000);
//!
//! let driver = A3CDriver::new(
//!     config,
//!     || LinearActorCritic::new(10, 2, 1),
//!     |_| ChainEnv::new(10),
//!     None,
//! )?;
//! let stop = driver.stop_handle();
//! let summary = driver.run()?;
//! std::process::exit(summary.exit_code());
//! ```

pub mod checkpoint;
pub mod config;
pub mod core;
pub mod demo;
pub mod driver;
pub mod env;
pub mod learner;
pub mod messages;
pub mod metrics;
pub mod model;

pub use config::{A3CConfig, ConfigError, Role};
pub use core::ledger::{RewardEntry, RewardLedger};
pub use core::reward::{transformed_bellman, RewardTransform};
pub use core::training_state::{EvaluationGate, TrainingState};

pub use model::linear::LinearActorCritic;
pub use model::params::{GradientSet, ParamError, ParamSet, ParamSnapshot};
pub use model::{ActorCritic, RolloutBatch, RolloutStep};

pub use env::{ChainEnv, EnvStep, Environment};

pub use demo::{DemoError, DemoStep, DemoStore, DemoTrajectory};

pub use checkpoint::{CheckpointError, Checkpointer, RestoredState};

pub use learner::{evaluate, A3CLearner, EvalResult, SegmentOutcome};

pub use driver::{demo_rate, A3CDriver, DriverError, RunOutcome, RunSummary, StopHandle};

pub use messages::{FinishReason, WorkerMsg};
pub use metrics::logger::{CSVLogger, ConsoleLogger, MetricsLogger, MultiLogger, TrainingSnapshot};
