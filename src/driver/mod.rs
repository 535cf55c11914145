//! Run orchestration: thread spawning, the shared evaluation/checkpoint
//! gate, demo-thread scheduling, and shutdown persistence.
//!
//! ```text
//!                        +--------------------+
//!                        |     A3CDriver      |
//!                        |  (main thread)     |
//!                        +---------+----------+
//!                                  | spawns, then drains telemetry
//!          +-----------------------+-----------------------+
//!          v                       v                       v
//!   a3c-worker-0            a3c-worker-1    ...     a3c-worker-N
//!   [pretrain]              [pretrain]              rollout loop
//!   baseline eval           wait baseline
//!          |                       |                       |
//!          +----------- gradients / step reports ----------+
//!                                  v
//!                     global ParamSet + TrainingState
//! ```
//!
//! Exactly one learner handles each evaluation boundary; everyone else
//! pauses at their own step-report boundary until the gate reopens.

mod driver;


pub use driver::{demo_rate, A3CDriver, DriverError, RunOutcome, RunSummary, StopHandle};
