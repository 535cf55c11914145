use crossbeam_channel::{bounded, Sender};
use parking_lot::Mutex;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::checkpoint::{CheckpointError, Checkpointer};
use crate::config::{A3CConfig, ConfigError, DEMO_RATE_FLOOR};
use crate::core::training_state::TrainingState;
use crate::demo::DemoStore;
use crate::env::Environment;
use crate::learner::{evaluate, A3CLearner};
use crate::messages::{FinishReason, WorkerMsg};
use crate::metrics::logger::{ConsoleLogger, MetricsLogger, TrainingSnapshot};
use crate::model::params::{ParamError, ParamSnapshot};
use crate::model::ActorCritic;

const BASELINE_POLL: Duration = Duration::from_millis(10);

/// File name of a transferable snapshot inside a transfer folder.
const TRANSFER_MODEL_FILE: &str = "transfer_model.json";

/// Error type for driver construction and shutdown.
#[derive(Debug)]
pub enum DriverError {
    /// Invalid configuration.
    Config(ConfigError),
    /// Checkpoint restore or persistence failure.
    Checkpoint(CheckpointError),
    /// Transfer or reference snapshot failure.
    Params(ParamError),
    /// Pretraining or demo threads configured without a demonstration store.
    MissingDemoStore,
    /// Thread spawn failure.
    Io(io::Error),
    /// A learner thread panicked.
    WorkerPanic(String),
}

impl std::fmt::Display for DriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverError::Config(e) => write!(f, "configuration error: {}", e),
            DriverError::Checkpoint(e) => write!(f, "checkpoint error: {}", e),
            DriverError::Params(e) => write!(f, "parameter error: {}", e),
            DriverError::MissingDemoStore => {
                write!(f, "pretraining/demo threads require a demonstration store")
            }
            DriverError::Io(e) => write!(f, "IO error: {}", e),
            DriverError::WorkerPanic(msg) => write!(f, "learner thread panicked: {}", msg),
        }
    }
}

impl std::error::Error for DriverError {}

impl From<ConfigError> for DriverError {
    fn from(e: ConfigError) -> Self {
        DriverError::Config(e)
    }
}

impl From<CheckpointError> for DriverError {
    fn from(e: CheckpointError) -> Self {
        DriverError::Checkpoint(e)
    }
}

impl From<ParamError> for DriverError {
    fn from(e: ParamError) -> Self {
        DriverError::Params(e)
    }
}

impl From<io::Error> for DriverError {
    fn from(e: io::Error) -> Self {
        DriverError::Io(e)
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Training budget reached.
    Completed,
    /// Stopped after making progress; a resumable checkpoint was written.
    Interrupted,
    /// Stopped before any global step; nothing was persisted.
    InterruptedBeforeProgress,
}

/// Final report of a training run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// How the run ended.
    pub outcome: RunOutcome,
    /// Global step at shutdown.
    pub global_t: u64,
    /// Best evaluation reward seen across the run (and prior runs, when
    /// resumed).
    pub best_reward: f32,
    /// Elapsed training seconds, accumulated across restarts.
    pub wall_t: f64,
    /// The run folder all artifacts were written under.
    pub run_folder: PathBuf,
}

impl RunSummary {
    /// Process exit code: nonzero only when the run was interrupted before
    /// making any progress.
    pub fn exit_code(&self) -> i32 {
        match self.outcome {
            RunOutcome::InterruptedBeforeProgress => 1,
            _ => 0,
        }
    }
}

/// Cloneable handle that requests cooperative shutdown. Safe to call from
/// any thread, including a signal handler.
#[derive(Clone)]
pub struct StopHandle {
    state: Arc<TrainingState>,
}

impl StopHandle {
    /// Request shutdown. Idempotent.
    pub fn stop(&self) {
        self.state.request_stop();
    }
}

/// Probability that an idle learner converts into a demo thread at the
/// given global step. Decays linearly from 1 at step 0 to the floor at the
/// threshold, and never below the floor while conversion is allowed.
pub fn demo_rate(global_t: u64, threshold: u64) -> f64 {
    if threshold == 0 {
        return 0.0;
    }
    let remaining = threshold.saturating_sub(global_t) as f64 / threshold as f64;
    remaining.max(DEMO_RATE_FLOOR)
}

/// Everything the worker threads share, behind one `Arc`.
struct SharedCtx<M: ActorCritic, E: Environment> {
    config: Arc<A3CConfig>,
    state: Arc<TrainingState>,
    global: M,
    eval_env: Mutex<E>,
    checkpointer: Checkpointer,
    demo_store: Option<Arc<DemoStore>>,
    budget: u64,
    checkpoint_interval: u64,
}

/// The training run orchestrator.
///
/// Construction performs all one-time setup in order: validation, transfer
/// initialization, checkpoint restore (which overrides transferred values),
/// reference-model load, and learner construction. `run` then owns the
/// thread lifecycle end to end.
pub struct A3CDriver<M: ActorCritic + 'static, E: Environment + 'static> {
    ctx: Arc<SharedCtx<M, E>>,
    learners: Vec<A3CLearner<M, E>>,
}

impl<M: ActorCritic + 'static, E: Environment + 'static> A3CDriver<M, E> {
    /// Build a driver. `model_factory` is called once for the global model,
    /// once per learner, and once more when a reference model is needed;
    /// `env_factory` is called once per learner plus once for the dedicated
    /// evaluation environment (index `parallel_size`).
    pub fn new(
        config: A3CConfig,
        mut model_factory: impl FnMut() -> M,
        mut env_factory: impl FnMut(usize) -> E,
        demo_store: Option<DemoStore>,
    ) -> Result<Self, DriverError> {
        config.validate()?;
        let config = Arc::new(config);
        let checkpointer = Checkpointer::new(config.run_folder(), config.env_tag());
        let global = model_factory();

        // transfer first; a restored checkpoint overrides it wholesale
        if config.use_transfer {
            if let Some(folder) = &config.transfer_folder {
                let snapshot = ParamSnapshot::load(&folder.join(TRANSFER_MODEL_FILE))?;
                let subset = config.resolve_transfer_subset(&global.params().names());
                global.params().transfer_from(&snapshot, &subset)?;
            }
        }

        let state = match checkpointer.restore()? {
            Some(restored) => {
                global.load_snapshot(&restored.snapshot)?;
                Arc::new(TrainingState::with_progress(
                    config.parallel_size,
                    restored.global_t,
                    restored.pretrain_global_t,
                    restored.wall_t,
                    restored.best_reward,
                    restored.ledger,
                ))
            }
            None => {
                checkpointer.prepare_fresh()?;
                Arc::new(TrainingState::fresh(config.parallel_size))
            }
        };

        let reference = match (&config.pretrained_model_folder, config.needs_reference_model()) {
            (Some(folder), true) => {
                let model = model_factory();
                model.load(&folder.join(format!("{}_classifier.json", config.env_tag())))?;
                Some(Arc::new(model))
            }
            _ => None,
        };

        if config.needs_demo_store() && demo_store.is_none() {
            return Err(DriverError::MissingDemoStore);
        }
        let demo_store = demo_store.map(Arc::new);

        let learners = (0..config.parallel_size)
            .map(|i| {
                A3CLearner::new(
                    i,
                    Arc::clone(&config),
                    env_factory(i),
                    model_factory(),
                    reference.clone(),
                    demo_store.clone(),
                )
            })
            .collect();
        let eval_env = Mutex::new(env_factory(config.parallel_size));

        let budget = config.training_budget();
        let checkpoint_interval = config.checkpoint_interval();
        Ok(Self {
            ctx: Arc::new(SharedCtx {
                config,
                state,
                global,
                eval_env,
                checkpointer,
                demo_store,
                budget,
                checkpoint_interval,
            }),
            learners,
        })
    }

    /// A shutdown handle, usable before and during `run`.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            state: Arc::clone(&self.ctx.state),
        }
    }

    /// The run folder this driver persists into.
    pub fn run_folder(&self) -> PathBuf {
        self.ctx.checkpointer.folder().to_path_buf()
    }

    /// Point-in-time copy of the global parameters, as initialized by
    /// transfer and checkpoint restore.
    pub fn global_snapshot(&self) -> ParamSnapshot {
        self.ctx.global.snapshot()
    }

    /// Run to completion (or stop), logging completed episodes to the
    /// console at the configured interval.
    pub fn run(self) -> Result<RunSummary, DriverError> {
        let interval = self.ctx.config.log_interval;
        self.run_with_logger(&mut ConsoleLogger::new(interval))
    }

    /// Run to completion (or stop), reporting completed episodes to the
    /// given logger from the main thread.
    pub fn run_with_logger(
        mut self,
        logger: &mut dyn MetricsLogger,
    ) -> Result<RunSummary, DriverError> {
        let ctx = Arc::clone(&self.ctx);

        // fresh runs pretrain their low-index learners before training
        if ctx.config.pretraining_enabled() && ctx.state.global_t() == 0 {
            let workers = ctx.config.pretrain_worker_count.min(ctx.config.parallel_size);
            for i in 0..workers {
                ctx.state.set_pretrain_marker(i);
            }
        }

        let (tx, rx) = bounded::<WorkerMsg>(256);
        let learners = std::mem::take(&mut self.learners);
        let mut handles = Vec::with_capacity(learners.len());
        for learner in learners {
            let ctx = Arc::clone(&self.ctx);
            let tx = tx.clone();
            let handle = thread::Builder::new()
                .name(format!("a3c-worker-{}", learner.id()))
                .spawn(move || worker_loop(&ctx, learner, &tx))?;
            handles.push(handle);
        }
        // the drain loop below ends when the last worker drops its sender
        drop(tx);

        while let Ok(msg) = rx.recv() {
            if let WorkerMsg::Episode {
                learner_id,
                global_t,
                reward,
                length,
            } = msg
            {
                let best_reward = *ctx.state.best_reward.lock();
                logger.log(&TrainingSnapshot {
                    learner_id,
                    global_t,
                    episode_reward: reward,
                    episode_length: length,
                    best_reward,
                });
            }
        }
        logger.flush();

        for handle in handles {
            if let Err(panic) = handle.join() {
                ctx.state.request_stop();
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                return Err(DriverError::WorkerPanic(msg));
            }
        }

        let global_t = ctx.state.global_t();
        let best_reward = *ctx.state.best_reward.lock();
        let wall_t = ctx.state.elapsed_total();
        let run_folder = ctx.checkpointer.folder().to_path_buf();

        if ctx.state.stop_requested() && global_t == 0 {
            return Ok(RunSummary {
                outcome: RunOutcome::InterruptedBeforeProgress,
                global_t,
                best_reward,
                wall_t,
                run_folder,
            });
        }

        ctx.checkpointer.save_final(
            global_t,
            wall_t,
            ctx.state.pretrain_global_t(),
            &ctx.global.snapshot(),
            &ctx.state.ledger.lock(),
        )?;

        let outcome = if global_t >= ctx.budget {
            RunOutcome::Completed
        } else {
            RunOutcome::Interrupted
        };
        Ok(RunSummary {
            outcome,
            global_t,
            best_reward,
            wall_t,
            run_folder,
        })
    }
}

/// Body of one learner thread.
fn worker_loop<M: ActorCritic, E: Environment>(
    ctx: &SharedCtx<M, E>,
    mut learner: A3CLearner<M, E>,
    tx: &Sender<WorkerMsg>,
) {
    let state = &*ctx.state;
    let config = &*ctx.config;
    let id = learner.id();

    if state.pretrain_marker(id) {
        learner.pretrain(&ctx.global, state);
    }
    state.wait_for_pretrain();

    // learner 0 runs the step-0 baseline; everyone else holds until it lands
    if id == 0 {
        if !state.baseline_done() && !state.stop_requested() {
            run_boundary(ctx, tx, 0);
            state.set_baseline_done();
        }
    } else {
        while !state.baseline_done() && !state.stop_requested() {
            thread::sleep(BASELINE_POLL);
        }
    }

    let mut demo_mode = false;
    loop {
        if state.stop_requested() {
            if demo_mode {
                state.release_demo_slot();
            }
            let _ = tx.send(WorkerMsg::Finished {
                learner_id: id,
                reason: FinishReason::Stopped,
            });
            return;
        }
        if state.global_t() >= ctx.budget {
            break;
        }
        state.eval_gate.wait_while_paused(state.stop_flag());

        let outcome = if demo_mode {
            learner.demo_process(&ctx.global)
        } else {
            learner.process(&ctx.global)
        };

        // every step report holds at the paused flag, so no learner
        // advances the counter while an evaluation is in progress
        for _ in 0..outcome.steps {
            match state.report_step_gated(ctx.budget) {
                Some(t) => {
                    if t % config.eval_freq == 0 {
                        run_boundary(ctx, tx, t);
                    }
                }
                None => break,
            }
        }

        if let Some((reward, length)) = outcome.episode {
            let t = state.global_t();
            if demo_mode {
                state.release_demo_slot();
                demo_mode = false;
                let _ = tx.send(WorkerMsg::DemoThread {
                    learner_id: id,
                    started: false,
                    active: state.demo_thread_count(),
                });
            } else {
                state.ledger.lock().record_train(t, reward, length);
                let _ = tx.send(WorkerMsg::Episode {
                    learner_id: id,
                    global_t: t,
                    reward,
                    length,
                });
            }

            // at each episode boundary an idle learner may convert into a
            // demo thread, with probability decaying as training progresses
            if !demo_mode && config.use_demo_threads && t < config.max_steps_threads_as_demo {
                if let Some(store) = &ctx.demo_store {
                    let rate = demo_rate(t, config.max_steps_threads_as_demo);
                    if learner.roll_demo_conversion(rate) && state.acquire_demo_slot() {
                        if learner.start_demo(state.next_demo_index(store.len())) {
                            demo_mode = true;
                            let _ = tx.send(WorkerMsg::DemoThread {
                                learner_id: id,
                                started: true,
                                active: state.demo_thread_count(),
                            });
                        } else {
                            state.release_demo_slot();
                        }
                    }
                }
            }
        }
    }

    if demo_mode {
        state.release_demo_slot();
    }
    let _ = tx.send(WorkerMsg::Finished {
        learner_id: id,
        reason: FinishReason::Completed,
    });
}

/// Handle one evaluation boundary: claim it, pause everyone, evaluate the
/// global model on the dedicated environment, checkpoint and update the
/// best-model record, then reopen the gate. The gate token is held for the
/// whole sequence, so at most one learner is ever inside.
fn run_boundary<M: ActorCritic, E: Environment>(
    ctx: &SharedCtx<M, E>,
    tx: &Sender<WorkerMsg>,
    boundary: u64,
) {
    let mut gate = ctx.state.eval_gate.lock();
    if !gate.claim(boundary) {
        return;
    }
    ctx.state.eval_gate.pause();

    let result = {
        let mut env = ctx.eval_env.lock();
        evaluate(
            &ctx.global,
            &mut *env,
            ctx.config.eval_max_steps,
            ctx.config.eval_max_episodes,
        )
    };
    ctx.state
        .ledger
        .lock()
        .record_eval(boundary, result.reward, result.steps, result.episodes);

    if boundary > 0 && boundary % ctx.checkpoint_interval == 0 {
        if let Err(e) = ctx.checkpointer.save_rolling(boundary, &ctx.global.snapshot()) {
            eprintln!("rolling checkpoint at step {} failed: {}", boundary, e);
        }
    }

    {
        let mut best = ctx.state.best_reward.lock();
        // strictly greater: ties keep the earlier snapshot
        if result.reward > *best {
            *best = result.reward;
            if let Err(e) = ctx.checkpointer.save_best(result.reward, &ctx.global.snapshot()) {
                eprintln!("best-model save at step {} failed: {}", boundary, e);
            }
        }
    }

    let _ = tx.send(WorkerMsg::EvalDone {
        global_t: boundary,
        reward: result.reward,
        steps: result.steps,
        episodes: result.episodes,
    });
    ctx.state.eval_gate.resume();
}
