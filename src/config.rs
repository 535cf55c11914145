//! Training configuration for the A3C driver.
//!
//! A single `A3CConfig` struct replaces the original trainer's scattered
//! feature flags. Run-folder naming and transfer-subset resolution are pure
//! functions so they can be tested without touching the filesystem.

use std::path::PathBuf;

use crate::core::reward::RewardTransform;

/// Probability floor for demo-thread conversion once the global step
/// approaches `max_steps_threads_as_demo`.
pub const DEMO_RATE_FLOOR: f64 = 1.0 / 30.0;

/// Maximum number of learners simultaneously replaying demonstrations.
pub const MAX_DEMO_THREADS: usize = 16;

/// Configuration error raised before any thread starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A numeric field that must be positive was zero.
    ZeroField(&'static str),
    /// `max_time_step_fraction` outside (0, 1].
    InvalidFraction,
    /// Advice or reward shaping requested without a pretrained model folder.
    AdviceWithoutModel,
    /// Transfer initialization requested without a transfer folder.
    TransferWithoutFolder,
    /// Transfer exclusion set while transfer itself is disabled.
    ExcludeWithoutTransfer,
    /// More pretraining workers than learners.
    TooManyPretrainWorkers,
    /// Demo threads enabled with a zero conversion threshold.
    DemoThreadsWithoutThreshold,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ZeroField(name) => write!(f, "{} must be > 0", name),
            ConfigError::InvalidFraction => {
                write!(f, "max_time_step_fraction must be in (0, 1]")
            }
            ConfigError::AdviceWithoutModel => write!(
                f,
                "use_advice/use_reward_shaping require pretrained_model_folder"
            ),
            ConfigError::TransferWithoutFolder => {
                write!(f, "use_transfer requires transfer_folder")
            }
            ConfigError::ExcludeWithoutTransfer => {
                write!(f, "transfer_exclude_top set but use_transfer is false")
            }
            ConfigError::TooManyPretrainWorkers => {
                write!(f, "pretrain_worker_count exceeds parallel_size")
            }
            ConfigError::DemoThreadsWithoutThreshold => {
                write!(f, "use_demo_threads requires max_steps_threads_as_demo > 0")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Per-learner role, assigned once at construction from the learner index.
///
/// Advice and shaping both consume the frozen reference model; which
/// learners carry the role is decided by `index % advice_divisor == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Plain rollout learner.
    Plain,
    /// Action suggestions from the reference model.
    Advisor,
    /// Auxiliary reward signal from the reference model.
    Shaper,
    /// Both advice and shaping.
    AdvisorShaper,
}

impl Role {
    /// Whether this role consults the reference model for actions.
    pub fn advises(&self) -> bool {
        matches!(self, Role::Advisor | Role::AdvisorShaper)
    }

    /// Whether this role blends reference-model confidence into rewards.
    pub fn shapes(&self) -> bool {
        matches!(self, Role::Shaper | Role::AdvisorShaper)
    }
}

/// Full configuration of an A3C training run.
#[derive(Debug, Clone)]
pub struct A3CConfig {
    /// Environment identifier, used for run-folder naming and file prefixes.
    pub env_id: String,
    /// Number of learner threads.
    pub parallel_size: usize,
    /// Nominal maximum global step count.
    pub max_time_step: u64,
    /// Fraction of `max_time_step` actually trained, in (0, 1].
    pub max_time_step_fraction: f64,
    /// Global steps between evaluation boundaries.
    pub eval_freq: u64,
    /// Step bound for one evaluation.
    pub eval_max_steps: u64,
    /// Episode bound for one evaluation (whichever bound hits first).
    pub eval_max_episodes: u32,
    /// Rollout segment horizon.
    pub local_t_max: u64,
    /// Demo replay segment horizon.
    pub demo_t_max: u64,
    /// Discount factor.
    pub gamma: f32,
    /// Entropy bonus strength for live rollouts.
    pub entropy_beta: f32,
    /// Entropy bonus strength for demo segments.
    pub demo_entropy_beta: f32,
    /// Global gradient-norm clip, if any.
    pub grad_norm_clip: Option<f32>,
    /// Learning rate passed to gradient application.
    pub initial_learning_rate: f32,
    /// Reward transform applied to raw environment rewards.
    pub reward_transform: RewardTransform,
    /// Substitute transformed-Bellman reward compression for the transform.
    pub transformed_bellman: bool,
    /// Recurrent model variant (affects folder naming and state resets).
    pub use_recurrent: bool,

    /// One-time transfer initialization from a pretrained snapshot.
    pub use_transfer: bool,
    /// Folder holding `transfer_model.json`.
    pub transfer_folder: Option<PathBuf>,
    /// Number of deepest layers excluded from the transfer (0 = all layers).
    pub transfer_exclude_top: usize,

    /// Minimum pretraining step count before learners leave pretraining.
    pub pretrain_min_steps: u64,
    /// Minimum pretraining iteration count over the demonstration store.
    pub pretrain_min_epochs: u64,
    /// Number of low-index learners placed into the pretraining sub-loop.
    pub pretrain_worker_count: usize,

    /// Allow idle learners to convert into demo threads.
    pub use_demo_threads: bool,
    /// Global-step threshold under which demo-thread conversion may fire.
    pub max_steps_threads_as_demo: u64,

    /// Consult a frozen reference model for action advice.
    pub use_advice: bool,
    /// Blend reference-model confidence into rewards.
    pub use_reward_shaping: bool,
    /// Minimum reference-policy confidence for an advice override.
    pub advice_confidence: f32,
    /// Scale of the shaping signal added to rewards.
    pub shaping_weight: f32,
    /// Folder holding `<env_id>_classifier.json`.
    pub pretrained_model_folder: Option<PathBuf>,
    /// Learners with `index % advice_divisor == 0` receive advice/shaping.
    pub advice_divisor: usize,

    /// Explicit run folder, bypassing deterministic naming.
    pub folder_override: Option<PathBuf>,
    /// Suffix appended to the derived run-folder name.
    pub experiment_suffix: Option<String>,
    /// Root under which derived run folders are created.
    pub results_root: PathBuf,
    /// Steps between console log lines.
    pub log_interval: u64,
}

impl Default for A3CConfig {
    fn default() -> Self {
        Self {
            env_id: String::new(),
            parallel_size: 8,
            max_time_step: 10_000_000,
            max_time_step_fraction: 1.0,
            eval_freq: 100_000,
            eval_max_steps: 1_000,
            eval_max_episodes: 10,
            local_t_max: 20,
            demo_t_max: 20,
            gamma: 0.99,
            entropy_beta: 0.01,
            demo_entropy_beta: 0.01,
            grad_norm_clip: Some(0.5),
            initial_learning_rate: 7e-4,
            reward_transform: RewardTransform::Clip,
            transformed_bellman: false,
            use_recurrent: false,
            use_transfer: false,
            transfer_folder: None,
            transfer_exclude_top: 0,
            pretrain_min_steps: 0,
            pretrain_min_epochs: 0,
            pretrain_worker_count: 2,
            use_demo_threads: false,
            max_steps_threads_as_demo: 1_000_000,
            use_advice: false,
            use_reward_shaping: false,
            advice_confidence: 0.8,
            shaping_weight: 0.5,
            pretrained_model_folder: None,
            advice_divisor: 1,
            folder_override: None,
            experiment_suffix: None,
            results_root: PathBuf::from("results/a3c"),
            log_interval: 1_000,
        }
    }
}

impl A3CConfig {
    /// Create a config for the given environment id with defaults.
    pub fn new(env_id: impl Into<String>) -> Self {
        Self {
            env_id: env_id.into(),
            ..Default::default()
        }
    }

    /// Set the number of learner threads.
    pub fn with_parallel_size(mut self, n: usize) -> Self {
        self.parallel_size = n;
        self
    }

    /// Set the nominal maximum global step count.
    pub fn with_max_time_step(mut self, steps: u64) -> Self {
        self.max_time_step = steps;
        self
    }

    /// Set the trained fraction of the nominal maximum.
    pub fn with_max_time_step_fraction(mut self, fraction: f64) -> Self {
        self.max_time_step_fraction = fraction;
        self
    }

    /// Set the evaluation interval.
    pub fn with_eval_freq(mut self, freq: u64) -> Self {
        self.eval_freq = freq;
        self
    }

    /// Set the evaluation step/episode bounds.
    pub fn with_eval_bounds(mut self, max_steps: u64, max_episodes: u32) -> Self {
        self.eval_max_steps = max_steps;
        self.eval_max_episodes = max_episodes;
        self
    }

    /// Set the rollout segment horizon.
    pub fn with_local_t_max(mut self, t: u64) -> Self {
        self.local_t_max = t;
        self
    }

    /// Set the reward transform.
    pub fn with_reward_transform(mut self, transform: RewardTransform) -> Self {
        self.reward_transform = transform;
        self
    }

    /// Enable one-time transfer initialization from `folder`.
    pub fn with_transfer(mut self, folder: impl Into<PathBuf>, exclude_top: usize) -> Self {
        self.use_transfer = true;
        self.transfer_folder = Some(folder.into());
        self.transfer_exclude_top = exclude_top;
        self
    }

    /// Enable demonstration pretraining.
    pub fn with_pretraining(mut self, min_steps: u64, min_epochs: u64, workers: usize) -> Self {
        self.pretrain_min_steps = min_steps;
        self.pretrain_min_epochs = min_epochs;
        self.pretrain_worker_count = workers;
        self
    }

    /// Enable demo-thread replay below the given global-step threshold.
    pub fn with_demo_threads(mut self, threshold: u64) -> Self {
        self.use_demo_threads = true;
        self.max_steps_threads_as_demo = threshold;
        self
    }

    /// Enable advice and/or shaping from a pretrained classifier snapshot.
    pub fn with_reference_model(
        mut self,
        folder: impl Into<PathBuf>,
        advice: bool,
        shaping: bool,
    ) -> Self {
        self.pretrained_model_folder = Some(folder.into());
        self.use_advice = advice;
        self.use_reward_shaping = shaping;
        self
    }

    /// Override the run folder.
    pub fn with_folder_override(mut self, folder: impl Into<PathBuf>) -> Self {
        self.folder_override = Some(folder.into());
        self
    }

    /// Set the root for derived run folders.
    pub fn with_results_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.results_root = root.into();
        self
    }

    /// Set the console-logging interval for `A3CDriver::run`.
    pub fn with_log_interval(mut self, steps: u64) -> Self {
        self.log_interval = steps;
        self
    }

    /// Append an experiment suffix to the derived folder name.
    pub fn with_experiment_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.experiment_suffix = Some(suffix.into());
        self
    }

    /// Validate the configuration.
    ///
    /// Contradictory flag combinations are fatal at startup, before any
    /// learner thread is constructed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.parallel_size == 0 {
            return Err(ConfigError::ZeroField("parallel_size"));
        }
        if self.max_time_step == 0 {
            return Err(ConfigError::ZeroField("max_time_step"));
        }
        if self.eval_freq == 0 {
            return Err(ConfigError::ZeroField("eval_freq"));
        }
        if self.local_t_max == 0 {
            return Err(ConfigError::ZeroField("local_t_max"));
        }
        if self.demo_t_max == 0 {
            return Err(ConfigError::ZeroField("demo_t_max"));
        }
        if self.advice_divisor == 0 {
            return Err(ConfigError::ZeroField("advice_divisor"));
        }
        if !(self.max_time_step_fraction > 0.0 && self.max_time_step_fraction <= 1.0) {
            return Err(ConfigError::InvalidFraction);
        }
        if (self.use_advice || self.use_reward_shaping) && self.pretrained_model_folder.is_none() {
            return Err(ConfigError::AdviceWithoutModel);
        }
        if self.use_transfer && self.transfer_folder.is_none() {
            return Err(ConfigError::TransferWithoutFolder);
        }
        if self.transfer_exclude_top > 0 && !self.use_transfer {
            return Err(ConfigError::ExcludeWithoutTransfer);
        }
        if self.pretraining_enabled() && self.pretrain_worker_count > self.parallel_size {
            return Err(ConfigError::TooManyPretrainWorkers);
        }
        if self.use_demo_threads && self.max_steps_threads_as_demo == 0 {
            return Err(ConfigError::DemoThreadsWithoutThreshold);
        }
        Ok(())
    }

    /// Whether demonstration pretraining is configured at all.
    pub fn pretraining_enabled(&self) -> bool {
        self.pretrain_min_steps > 0 || self.pretrain_min_epochs > 0
    }

    /// Whether any feature needs the demonstration store.
    pub fn needs_demo_store(&self) -> bool {
        self.pretraining_enabled() || self.use_demo_threads
    }

    /// Whether any feature needs the frozen reference model.
    pub fn needs_reference_model(&self) -> bool {
        self.use_advice || self.use_reward_shaping
    }

    /// Effective training budget: fractional ceiling of the nominal maximum.
    pub fn training_budget(&self) -> u64 {
        (self.max_time_step as f64 * self.max_time_step_fraction).ceil() as u64
    }

    /// Rolling checkpoints are written every 1/5 of the training budget.
    pub fn checkpoint_interval(&self) -> u64 {
        (self.training_budget() / 5).max(1)
    }

    /// Environment id with dashes flattened, used in file names.
    pub fn env_tag(&self) -> String {
        self.env_id.replace('-', "_")
    }

    /// Deterministic run folder derived from the environment id and the
    /// enabled feature flags, unless an explicit override is set.
    pub fn run_folder(&self) -> PathBuf {
        if let Some(folder) = &self.folder_override {
            return folder.clone();
        }
        let mut name = self.env_tag();
        if self.use_recurrent {
            name.push_str("_recurrent");
        }
        match self.reward_transform {
            RewardTransform::Raw => name.push_str("_rawreward"),
            RewardTransform::Log => name.push_str("_logreward"),
            RewardTransform::Clip => {}
        }
        if self.transformed_bellman {
            name.push_str("_transformedbell");
        }
        if self.use_transfer {
            name.push_str("_transfer");
            if self.transfer_exclude_top > 0 {
                name.push_str(&format!("_notop{}", self.transfer_exclude_top));
            }
        }
        if self.pretraining_enabled() {
            name.push_str("_pretrain");
        }
        if self.use_demo_threads {
            name.push_str("_demothreads");
        }
        if self.use_advice {
            name.push_str("_modelasadvice");
        }
        if self.use_reward_shaping {
            name.push_str("_modelasshaping");
        }
        if let Some(suffix) = &self.experiment_suffix {
            name.push('_');
            name.push_str(suffix);
        }
        self.results_root.join(name)
    }

    /// Resolve the ordered subset of layer names copied during transfer
    /// initialization: all layers except the configured number of deepest
    /// ones. Layers outside the subset keep their fresh initialization.
    pub fn resolve_transfer_subset(&self, layer_names: &[String]) -> Vec<String> {
        let keep = layer_names
            .len()
            .saturating_sub(self.transfer_exclude_top);
        layer_names[..keep].to_vec()
    }

    /// Role assigned to the learner at `index`, decided once at construction.
    pub fn role_for_index(&self, index: usize) -> Role {
        if index % self.advice_divisor != 0 {
            return Role::Plain;
        }
        match (self.use_advice, self.use_reward_shaping) {
            (true, true) => Role::AdvisorShaper,
            (true, false) => Role::Advisor,
            (false, true) => Role::Shaper,
            (false, false) => Role::Plain,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_defaults() {
        let config = A3CConfig::new("Pong-v4")
            .with_parallel_size(16)
            .with_max_time_step(1_000)
            .with_eval_freq(100)
            .with_log_interval(500);

        assert_eq!(config.env_id, "Pong-v4");
        assert_eq!(config.parallel_size, 16);
        assert_eq!(config.eval_freq, 100);
        assert_eq!(config.log_interval, 500);
        assert_eq!(config.gamma, 0.99);
        config.validate().unwrap();
    }

    #[test]
    fn test_validation_contradictions() {
        let config = A3CConfig::new("Pong-v4").with_parallel_size(0);
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroField("parallel_size"))
        );

        let config = A3CConfig::new("Pong-v4").with_max_time_step(0);
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroField("max_time_step"))
        );

        let mut config = A3CConfig::new("Pong-v4");
        config.use_advice = true;
        assert_eq!(config.validate(), Err(ConfigError::AdviceWithoutModel));

        let mut config = A3CConfig::new("Pong-v4");
        config.use_transfer = true;
        assert_eq!(config.validate(), Err(ConfigError::TransferWithoutFolder));

        let mut config = A3CConfig::new("Pong-v4");
        config.transfer_exclude_top = 1;
        assert_eq!(config.validate(), Err(ConfigError::ExcludeWithoutTransfer));

        let config = A3CConfig::new("Pong-v4").with_max_time_step_fraction(1.5);
        assert_eq!(config.validate(), Err(ConfigError::InvalidFraction));

        let config = A3CConfig::new("Pong-v4")
            .with_parallel_size(2)
            .with_pretraining(100, 1, 4);
        assert_eq!(config.validate(), Err(ConfigError::TooManyPretrainWorkers));
    }

    #[test]
    fn test_run_folder_naming() {
        let config = A3CConfig::new("PongNoFrameskip-v4");
        assert_eq!(
            config.run_folder(),
            PathBuf::from("results/a3c/PongNoFrameskip_v4")
        );

        let config = A3CConfig::new("PongNoFrameskip-v4")
            .with_reward_transform(RewardTransform::Raw)
            .with_transfer("snap", 2)
            .with_demo_threads(1000)
            .with_experiment_suffix("trial1");
        assert_eq!(
            config.run_folder(),
            PathBuf::from("results/a3c/PongNoFrameskip_v4_rawreward_transfer_notop2_demothreads_trial1")
        );

        let config =
            A3CConfig::new("PongNoFrameskip-v4").with_folder_override("/tmp/explicit");
        assert_eq!(config.run_folder(), PathBuf::from("/tmp/explicit"));
    }

    #[test]
    fn test_transfer_subset_resolution() {
        let names: Vec<String> = ["conv1", "conv2", "fc1", "fc2"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let config = A3CConfig::new("x").with_transfer("snap", 0);
        assert_eq!(config.resolve_transfer_subset(&names), names);

        let config = A3CConfig::new("x").with_transfer("snap", 1);
        assert_eq!(
            config.resolve_transfer_subset(&names),
            vec!["conv1".to_string(), "conv2".to_string(), "fc1".to_string()]
        );

        let config = A3CConfig::new("x").with_transfer("snap", 10);
        assert!(config.resolve_transfer_subset(&names).is_empty());
    }

    #[test]
    fn test_role_assignment() {
        let mut config = A3CConfig::new("x");
        config.use_advice = true;
        config.use_reward_shaping = true;
        config.advice_divisor = 4;

        assert_eq!(config.role_for_index(0), Role::AdvisorShaper);
        assert_eq!(config.role_for_index(1), Role::Plain);
        assert_eq!(config.role_for_index(4), Role::AdvisorShaper);

        config.use_reward_shaping = false;
        assert_eq!(config.role_for_index(0), Role::Advisor);
        assert!(config.role_for_index(0).advises());
        assert!(!config.role_for_index(0).shapes());
    }

    #[test]
    fn test_budget_and_checkpoint_interval() {
        let config = A3CConfig::new("x")
            .with_max_time_step(100)
            .with_max_time_step_fraction(1.0);
        assert_eq!(config.training_budget(), 100);
        assert_eq!(config.checkpoint_interval(), 20);

        let config = A3CConfig::new("x")
            .with_max_time_step(1000)
            .with_max_time_step_fraction(0.5);
        assert_eq!(config.training_budget(), 500);
    }
}
