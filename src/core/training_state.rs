//! Shared mutable state for concurrent A3C training.
//!
//! `TrainingState` is the single struct handed (via `Arc`) to every learner
//! thread. Field-level concurrency discipline:
//!
//! - `global_t`, `pretrain_global_t`, `pretrain_epoch`: atomic counters,
//!   advanced only through the report paths; monotonically non-decreasing.
//! - `stop`, `baseline_done`, `pretrain_markers`: plain atomic flags. Races
//!   are tolerated as idempotent (setting stop twice, or observing a cleared
//!   marker one tick late, are harmless).
//! - `eval_gate`: the evaluation/checkpoint critical section. At most one
//!   learner is inside it at any time; everyone else observes the paused
//!   flag at their own report boundary.
//! - `ledger`, `best_reward`: mutex-guarded, held briefly.
//! - `num_demo_threads`, `demo_trajectory_ctr`: atomic counters for demo
//!   replay scheduling.

use parking_lot::{Mutex, MutexGuard};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::config::MAX_DEMO_THREADS;
use crate::core::ledger::RewardLedger;

/// Poll interval while waiting on the paused flag or on pretrain markers.
const PAUSE_POLL: Duration = Duration::from_millis(10);

/// Boundary bookkeeping behind the gate lock.
#[derive(Debug, Default)]
pub struct GateInner {
    handled: BTreeSet<u64>,
}

impl GateInner {
    /// Claim an evaluation boundary. Returns false if some learner already
    /// handled this exact boundary value (duplicate-crossing guard).
    ///
    /// Set-membership rather than a last-handled comparison, so duplicates
    /// separated by an intervening different boundary are still detected.
    pub fn claim(&mut self, boundary: u64) -> bool {
        self.handled.insert(boundary)
    }

    /// Whether a boundary was already handled.
    pub fn is_handled(&self, boundary: u64) -> bool {
        self.handled.contains(&boundary)
    }
}

/// The shared evaluation/checkpoint gate: a mutual-exclusion token plus a
/// paused flag every learner polls at its step-report boundary.
#[derive(Debug, Default)]
pub struct EvaluationGate {
    inner: Mutex<GateInner>,
    paused: AtomicBool,
}

impl EvaluationGate {
    /// Create an open gate with no handled boundaries.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the gate's mutual-exclusion token.
    pub fn lock(&self) -> MutexGuard<'_, GateInner> {
        self.inner.lock()
    }

    /// Set the paused flag. Learners stop advancing past their report
    /// boundary until it clears.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    /// Clear the paused flag.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
    }

    /// Whether an evaluation/checkpoint is in progress.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Spin with a short sleep while the paused flag is set. Returns early
    /// when `stop` is set; bounded latency, not bounded correctness.
    pub fn wait_while_paused(&self, stop: &AtomicBool) {
        while self.is_paused() && !stop.load(Ordering::Relaxed) {
            std::thread::sleep(PAUSE_POLL);
        }
    }
}

/// Process-wide shared training state.
pub struct TrainingState {
    global_t: AtomicU64,
    pretrain_global_t: AtomicU64,
    pretrain_epoch: AtomicU64,
    stop: AtomicBool,
    baseline_done: AtomicBool,
    pretrain_markers: Vec<AtomicBool>,
    num_demo_threads: AtomicUsize,
    demo_trajectory_ctr: AtomicUsize,
    /// Evaluation/checkpoint critical section.
    pub eval_gate: EvaluationGate,
    /// Train/eval reward histories.
    pub ledger: Mutex<RewardLedger>,
    /// Best evaluation reward seen; snapshot updates happen together with
    /// this scalar, inside the gate.
    pub best_reward: Mutex<f32>,
    wall_clock_offset: f64,
    started: Instant,
}

impl TrainingState {
    /// Fresh state for a new run.
    pub fn fresh(parallel_size: usize) -> Self {
        Self::with_progress(parallel_size, 0, 0, 0.0, f32::NEG_INFINITY, RewardLedger::new())
    }

    /// State restored from a checkpoint.
    pub fn with_progress(
        parallel_size: usize,
        global_t: u64,
        pretrain_global_t: u64,
        wall_clock_offset: f64,
        best_reward: f32,
        ledger: RewardLedger,
    ) -> Self {
        Self {
            global_t: AtomicU64::new(global_t),
            pretrain_global_t: AtomicU64::new(pretrain_global_t),
            pretrain_epoch: AtomicU64::new(0),
            stop: AtomicBool::new(false),
            // A resumed run already has its step-0 baseline.
            baseline_done: AtomicBool::new(global_t > 0),
            pretrain_markers: (0..parallel_size).map(|_| AtomicBool::new(false)).collect(),
            num_demo_threads: AtomicUsize::new(0),
            demo_trajectory_ctr: AtomicUsize::new(0),
            eval_gate: EvaluationGate::new(),
            ledger: Mutex::new(ledger),
            best_reward: Mutex::new(best_reward),
            wall_clock_offset,
            started: Instant::now(),
        }
    }

    /// Current global step.
    pub fn global_t(&self) -> u64 {
        self.global_t.load(Ordering::SeqCst)
    }

    /// Report one environment step. Returns the new global step, or `None`
    /// once the training budget is exhausted (the counter never exceeds the
    /// budget, so a resumed run restarts from an exact boundary).
    pub fn report_step(&self, budget: u64) -> Option<u64> {
        self.global_t
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |t| {
                if t < budget {
                    Some(t + 1)
                } else {
                    None
                }
            })
            .ok()
            .map(|t| t + 1)
    }

    /// Report one step, first holding at the paused flag. Learners call
    /// this on their report path, so no step lands and no boundary is
    /// crossed while an evaluation snapshot is being produced.
    pub fn report_step_gated(&self, budget: u64) -> Option<u64> {
        self.eval_gate.wait_while_paused(&self.stop);
        self.report_step(budget)
    }

    /// Current pretraining step.
    pub fn pretrain_global_t(&self) -> u64 {
        self.pretrain_global_t.load(Ordering::SeqCst)
    }

    /// Advance the pretraining step counter.
    pub fn add_pretrain_steps(&self, steps: u64) {
        self.pretrain_global_t.fetch_add(steps, Ordering::SeqCst);
    }

    /// Current pretraining iteration count.
    pub fn pretrain_epoch(&self) -> u64 {
        self.pretrain_epoch.load(Ordering::SeqCst)
    }

    /// Count one pretraining iteration.
    pub fn add_pretrain_epoch(&self) {
        self.pretrain_epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Request cooperative shutdown. Idempotent, callable from any thread
    /// (including a signal handler holding only this atomic).
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Whether shutdown was requested.
    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// The raw stop flag, for `wait_while_paused`.
    pub fn stop_flag(&self) -> &AtomicBool {
        &self.stop
    }

    /// Mark the step-0 baseline evaluation as complete.
    pub fn set_baseline_done(&self) {
        self.baseline_done.store(true, Ordering::Release);
    }

    /// Whether the step-0 baseline evaluation has run.
    pub fn baseline_done(&self) -> bool {
        self.baseline_done.load(Ordering::Acquire)
    }

    /// Place a learner into the pretraining phase.
    pub fn set_pretrain_marker(&self, index: usize) {
        self.pretrain_markers[index].store(true, Ordering::Relaxed);
    }

    /// Clear a learner's own pretraining marker.
    pub fn clear_pretrain_marker(&self, index: usize) {
        self.pretrain_markers[index].store(false, Ordering::Relaxed);
    }

    /// Whether the learner at `index` is still pretraining.
    pub fn pretrain_marker(&self, index: usize) -> bool {
        self.pretrain_markers[index].load(Ordering::Relaxed)
    }

    /// Whether any learner is still pretraining.
    pub fn any_pretrain_marker(&self) -> bool {
        self.pretrain_markers
            .iter()
            .any(|m| m.load(Ordering::Relaxed))
    }

    /// Block until every pretraining marker clears or stop is requested.
    pub fn wait_for_pretrain(&self) {
        while self.any_pretrain_marker() && !self.stop_requested() {
            std::thread::sleep(PAUSE_POLL);
        }
    }

    /// Try to take a demo-thread slot. At most [`MAX_DEMO_THREADS`] learners
    /// replay demonstrations concurrently.
    pub fn acquire_demo_slot(&self) -> bool {
        self.num_demo_threads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                if n < MAX_DEMO_THREADS {
                    Some(n + 1)
                } else {
                    None
                }
            })
            .is_ok()
    }

    /// Release a demo-thread slot at trajectory end.
    pub fn release_demo_slot(&self) {
        self.num_demo_threads.fetch_sub(1, Ordering::SeqCst);
    }

    /// Number of learners currently replaying demonstrations.
    pub fn demo_thread_count(&self) -> usize {
        self.num_demo_threads.load(Ordering::SeqCst)
    }

    /// Round-robin index of the next demo trajectory to replay.
    pub fn next_demo_index(&self, store_len: usize) -> usize {
        self.demo_trajectory_ctr.fetch_add(1, Ordering::Relaxed) % store_len
    }

    /// Total elapsed training seconds, accumulated across restarts.
    pub fn elapsed_total(&self) -> f64 {
        self.wall_clock_offset + self.started.elapsed().as_secs_f64()
    }

    /// The wall-clock offset this run started from.
    pub fn wall_clock_offset(&self) -> f64 {
        self.wall_clock_offset
    }
}
