//! Environment abstraction for learner threads.
//!
//! Each adapter wraps a single game instance and is exclusively owned by one
//! learner; it is never shared across threads. Evaluation uses its own
//! dedicated adapter, never a training one.

/// Result of stepping an environment.
#[derive(Debug, Clone)]
pub struct EnvStep {
    /// Observation after the step.
    pub observation: Vec<f32>,
    /// Reward received.
    pub reward: f32,
    /// Whether the episode ended.
    pub terminal: bool,
}

/// A single-instance game environment.
pub trait Environment: Send {
    /// Start a new episode; returns the initial observation.
    fn reset(&mut self) -> Vec<f32>;

    /// Take one action.
    fn step(&mut self, action: usize) -> EnvStep;

    /// Flat observation length.
    fn observation_len(&self) -> usize;

    /// Number of discrete actions.
    fn action_count(&self) -> usize;

    /// Display-only rendering hook.
    fn render(&self) {}
}

/// Deterministic corridor environment for tests and examples.
///
/// The agent starts at the left end of a chain of `length` cells; action 1
/// moves right, action 0 moves left (floored at 0). Reaching the right end
/// terminates the episode with reward 1. Episodes are capped at
/// `4 * length` steps.
pub struct ChainEnv {
    length: usize,
    pos: usize,
    t: usize,
    max_episode_steps: usize,
}

impl ChainEnv {
    /// Create a chain of the given length (at least 2 cells).
    pub fn new(length: usize) -> Self {
        let length = length.max(2);
        Self {
            length,
            pos: 0,
            t: 0,
            max_episode_steps: 4 * length,
        }
    }

    fn observe(&self) -> Vec<f32> {
        let mut obs = vec![0.0; self.length];
        obs[self.pos] = 1.0;
        obs
    }
}

impl Environment for ChainEnv {
    fn reset(&mut self) -> Vec<f32> {
        self.pos = 0;
        self.t = 0;
        self.observe()
    }

    fn step(&mut self, action: usize) -> EnvStep {
        self.t += 1;
        if action == 1 {
            self.pos += 1;
        } else {
            self.pos = self.pos.saturating_sub(1);
        }
        let reached_goal = self.pos == self.length - 1;
        let reward = if reached_goal { 1.0 } else { 0.0 };
        let terminal = reached_goal || self.t >= self.max_episode_steps;
        EnvStep {
            observation: self.observe(),
            reward,
            terminal,
        }
    }

    fn observation_len(&self) -> usize {
        self.length
    }

    fn action_count(&self) -> usize {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_reaches_goal() {
        let mut env = ChainEnv::new(4);
        let obs = env.reset();
        assert_eq!(obs, vec![1.0, 0.0, 0.0, 0.0]);

        let s = env.step(1);
        assert_eq!(s.reward, 0.0);
        assert!(!s.terminal);
        let s = env.step(1);
        assert!(!s.terminal);
        let s = env.step(1);
        assert_eq!(s.reward, 1.0);
        assert!(s.terminal);
    }

    #[test]
    fn test_chain_episode_cap() {
        let mut env = ChainEnv::new(3);
        env.reset();
        let mut steps = 0;
        loop {
            steps += 1;
            // always step left: never reaches the goal
            if env.step(0).terminal {
                break;
            }
        }
        assert_eq!(steps, 12);
    }

    #[test]
    fn test_left_floors_at_zero() {
        let mut env = ChainEnv::new(3);
        env.reset();
        let s = env.step(0);
        assert_eq!(s.observation, vec![1.0, 0.0, 0.0]);
    }
}
