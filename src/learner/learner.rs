use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

use crate::config::{A3CConfig, Role};
use crate::core::reward::transformed_bellman;
use crate::core::training_state::TrainingState;
use crate::demo::DemoStore;
use crate::env::Environment;
use crate::model::{discounted_returns, ActorCritic, RolloutBatch, RolloutStep};

/// Result of one training segment.
#[derive(Debug, Clone)]
pub struct SegmentOutcome {
    /// Environment (or replayed) steps consumed.
    pub steps: u64,
    /// Set when an episode (or a demonstration trajectory) ended inside the
    /// segment: (total raw reward, length in steps).
    pub episode: Option<(f32, u64)>,
}

/// Result of one evaluation run.
#[derive(Debug, Clone, Copy)]
pub struct EvalResult {
    /// Mean raw reward per completed episode (or the partial episode's
    /// accumulated reward when no episode completed within the bounds).
    pub reward: f32,
    /// Environment steps consumed.
    pub steps: u64,
    /// Episodes completed.
    pub episodes: u32,
}

struct DemoCursor {
    trajectory: usize,
    pos: usize,
    replay_reward: f32,
}

/// One learner: a private environment, a local model copy, and the rollout /
/// replay / pretraining logic that pushes gradients to the global model.
pub struct A3CLearner<M: ActorCritic, E: Environment> {
    id: usize,
    role: Role,
    config: Arc<A3CConfig>,
    env: E,
    local: M,
    reference: Option<Arc<M>>,
    demo_store: Option<Arc<DemoStore>>,
    rng: StdRng,
    last_obs: Vec<f32>,
    episode_reward: f32,
    episode_length: u64,
    needs_reset: bool,
    demo_cursor: Option<DemoCursor>,
}

impl<M: ActorCritic, E: Environment> A3CLearner<M, E> {
    /// Build a learner. The role is fixed for the learner's lifetime.
    pub fn new(
        id: usize,
        config: Arc<A3CConfig>,
        env: E,
        local: M,
        reference: Option<Arc<M>>,
        demo_store: Option<Arc<DemoStore>>,
    ) -> Self {
        let role = config.role_for_index(id);
        Self {
            id,
            role,
            config,
            env,
            local,
            reference,
            demo_store,
            rng: StdRng::seed_from_u64(id as u64),
            last_obs: Vec::new(),
            episode_reward: 0.0,
            episode_length: 0,
            needs_reset: true,
            demo_cursor: None,
        }
    }

    /// Learner index.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Assigned role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Single source of randomness for the demo-thread conversion roll, so
    /// the learner's behavior is reproducible from its seed.
    pub fn roll_demo_conversion(&mut self, rate: f64) -> bool {
        self.rng.gen::<f64>() < rate
    }

    /// Clear episode-in-progress and replay state. Called when a learner
    /// leaves pretraining so stale rollout state never leaks into training.
    pub fn reset_rollout_state(&mut self) {
        self.needs_reset = true;
        self.demo_cursor = None;
        self.episode_reward = 0.0;
        self.episode_length = 0;
        self.local.reset_recurrent_state();
    }

    /// Apply the configured reward compression.
    fn compress(&self, reward: f32) -> f32 {
        if self.config.transformed_bellman {
            transformed_bellman(reward)
        } else {
            self.config.reward_transform.apply(reward)
        }
    }

    /// Reference-model policy for the current observation, when the role
    /// consults one.
    fn reference_policy(&self, observation: &[f32]) -> Option<Vec<f32>> {
        if !(self.role.advises() || self.role.shapes()) {
            return None;
        }
        self.reference
            .as_ref()
            .map(|model| model.predict(observation).0)
    }

    /// One live rollout segment against the global model.
    pub fn process(&mut self, global: &M) -> SegmentOutcome {
        self.local.sync_from(global);
        if self.needs_reset {
            self.last_obs = self.env.reset();
            self.local.reset_recurrent_state();
            self.episode_reward = 0.0;
            self.episode_length = 0;
            self.needs_reset = false;
        }

        let mut steps: Vec<RolloutStep> = Vec::with_capacity(self.config.local_t_max as usize);
        let mut episode = None;
        let mut terminal = false;

        for _ in 0..self.config.local_t_max {
            let (policy, value) = self.local.predict(&self.last_obs);
            let mut action = sample_action(&policy, &mut self.rng);

            let reference_policy = self.reference_policy(&self.last_obs);
            if self.role.advises() {
                if let Some(ref_policy) = &reference_policy {
                    let (best, confidence) = argmax(ref_policy);
                    if confidence >= self.config.advice_confidence {
                        action = best;
                    }
                }
            }

            let env_step = self.env.step(action);
            self.episode_reward += env_step.reward;
            self.episode_length += 1;

            let mut reward = env_step.reward;
            if self.role.shapes() {
                if let Some(ref_policy) = &reference_policy {
                    reward += self.config.shaping_weight * ref_policy[action];
                }
            }

            steps.push(RolloutStep {
                observation: std::mem::replace(&mut self.last_obs, env_step.observation),
                action,
                reward: self.compress(reward),
                value,
                log_prob: policy[action].max(1e-8).ln(),
            });

            if env_step.terminal {
                episode = Some((self.episode_reward, self.episode_length));
                self.needs_reset = true;
                terminal = true;
                break;
            }
        }

        let step_count = steps.len() as u64;
        let bootstrap = if terminal {
            0.0
        } else {
            self.local.predict(&self.last_obs).1
        };
        let returns = discounted_returns(&steps, bootstrap, self.config.gamma);
        let batch = RolloutBatch {
            steps,
            returns,
            entropy_beta: self.config.entropy_beta,
        };
        self.push_gradients(global, &batch);

        SegmentOutcome {
            steps: step_count,
            episode,
        }
    }

    /// Begin replaying a demonstration trajectory. Returns false if the
    /// store has no trajectory with that id.
    pub fn start_demo(&mut self, trajectory_id: usize) -> bool {
        let known = self
            .demo_store
            .as_ref()
            .and_then(|store| store.get_trajectory(trajectory_id))
            .is_some();
        if known {
            self.demo_cursor = Some(DemoCursor {
                trajectory: trajectory_id,
                pos: 0,
                replay_reward: 0.0,
            });
            self.local.reset_recurrent_state();
        }
        known
    }

    /// Whether a demonstration replay is in progress.
    pub fn demo_active(&self) -> bool {
        self.demo_cursor.is_some()
    }

    /// One demonstration-replay segment: recorded actions stand in for the
    /// sampled ones, with the demo entropy strength.
    pub fn demo_process(&mut self, global: &M) -> SegmentOutcome {
        let store = match &self.demo_store {
            Some(store) => Arc::clone(store),
            None => return SegmentOutcome { steps: 0, episode: None },
        };
        let mut cursor = match self.demo_cursor.take() {
            Some(cursor) => cursor,
            None => return SegmentOutcome { steps: 0, episode: None },
        };
        let trajectory = match store.get_trajectory(cursor.trajectory) {
            Some(trajectory) => trajectory,
            None => return SegmentOutcome { steps: 0, episode: None },
        };

        self.local.sync_from(global);

        let mut steps: Vec<RolloutStep> = Vec::with_capacity(self.config.demo_t_max as usize);
        let mut terminal = false;
        for _ in 0..self.config.demo_t_max {
            let recorded = match trajectory.steps.get(cursor.pos) {
                Some(recorded) => recorded,
                None => break,
            };
            let (policy, value) = self.local.predict(&recorded.observation);
            cursor.replay_reward += recorded.reward;
            steps.push(RolloutStep {
                observation: recorded.observation.clone(),
                action: recorded.action,
                reward: self.compress(recorded.reward),
                value,
                log_prob: policy[recorded.action].max(1e-8).ln(),
            });
            cursor.pos += 1;
            if recorded.terminal {
                terminal = true;
                break;
            }
        }

        let step_count = steps.len() as u64;
        let exhausted = terminal || cursor.pos >= trajectory.len();
        let bootstrap = if exhausted {
            0.0
        } else {
            // value of the next recorded observation
            self.local.predict(&trajectory.steps[cursor.pos].observation).1
        };
        let returns = discounted_returns(&steps, bootstrap, self.config.gamma);
        let batch = RolloutBatch {
            steps,
            returns,
            entropy_beta: self.config.demo_entropy_beta,
        };
        self.push_gradients(global, &batch);

        let episode = if exhausted {
            Some((cursor.replay_reward, cursor.pos as u64))
        } else {
            self.demo_cursor = Some(cursor);
            None
        };
        SegmentOutcome {
            steps: step_count,
            episode,
        }
    }

    /// Pretraining sub-loop: replay demonstration trajectories round-robin
    /// until both minimums are satisfied, then clear this learner's marker.
    ///
    /// Pretraining steps advance `pretrain_global_t`, never the global step.
    pub fn pretrain(&mut self, global: &M, state: &TrainingState) {
        let store = match &self.demo_store {
            Some(store) => Arc::clone(store),
            None => {
                state.clear_pretrain_marker(self.id);
                return;
            }
        };

        while state.pretrain_marker(self.id) && !state.stop_requested() {
            let idx = state.next_demo_index(store.len());
            if idx == 0 {
                state.add_pretrain_epoch();
            }
            self.start_demo(idx);
            while self.demo_active() && !state.stop_requested() {
                let outcome = self.demo_process(global);
                state.add_pretrain_steps(outcome.steps);
            }
            if state.pretrain_global_t() >= self.config.pretrain_min_steps
                && state.pretrain_epoch() >= self.config.pretrain_min_epochs
            {
                state.clear_pretrain_marker(self.id);
            }
        }
        self.reset_rollout_state();
    }

    fn push_gradients(&mut self, global: &M, batch: &RolloutBatch) {
        if batch.steps.is_empty() {
            return;
        }
        let mut grads = self.local.backward(batch);
        if let Some(clip) = self.config.grad_norm_clip {
            grads.clip_global_norm(clip);
        }
        global.apply_gradients(&grads, self.config.initial_learning_rate);
        self.local.sync_from(global);
    }
}

/// Greedy evaluation of a model on a dedicated environment. Stops at
/// whichever bound hits first.
pub fn evaluate<M: ActorCritic, E: Environment>(
    model: &M,
    env: &mut E,
    max_steps: u64,
    max_episodes: u32,
) -> EvalResult {
    let mut steps = 0u64;
    let mut episodes = 0u32;
    let mut completed_total = 0.0f32;
    let mut episode_reward = 0.0f32;
    let mut obs = env.reset();

    while steps < max_steps && episodes < max_episodes {
        let (policy, _) = model.predict(&obs);
        let (action, _) = argmax(&policy);
        let env_step = env.step(action);
        steps += 1;
        episode_reward += env_step.reward;
        obs = env_step.observation;
        if env_step.terminal {
            episodes += 1;
            completed_total += episode_reward;
            episode_reward = 0.0;
            obs = env.reset();
        }
    }

    let reward = if episodes > 0 {
        completed_total / episodes as f32
    } else {
        episode_reward
    };
    EvalResult {
        reward,
        steps,
        episodes,
    }
}

fn sample_action(policy: &[f32], rng: &mut StdRng) -> usize {
    let draw: f32 = rng.gen();
    let mut cumulative = 0.0;
    for (i, p) in policy.iter().enumerate() {
        cumulative += p;
        if draw < cumulative {
            return i;
        }
    }
    policy.len() - 1
}

fn argmax(policy: &[f32]) -> (usize, f32) {
    let mut best = 0;
    let mut best_p = f32::NEG_INFINITY;
    for (i, &p) in policy.iter().enumerate() {
        if p > best_p {
            best = i;
            best_p = p;
        }
    }
    (best, best_p)
}
