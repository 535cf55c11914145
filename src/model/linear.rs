//! Softmax-linear actor-critic.
//!
//! A minimal concrete model behind the [`ActorCritic`](super::ActorCritic)
//! interface: a linear softmax policy head and a linear value head over a
//! flat observation. Enough to exercise the full training orchestration;
//! numeric sophistication beyond that is out of scope.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::params::{GradientSet, ParamSet};
use super::{ActorCritic, RolloutBatch};

/// Layer names in registration order, shallowest first.
const POLICY_W: &str = "policy_w";
const POLICY_B: &str = "policy_b";
const VALUE_W: &str = "value_w";
const VALUE_B: &str = "value_b";

/// Linear actor-critic over a flat observation.
pub struct LinearActorCritic {
    params: ParamSet,
    obs_len: usize,
    n_actions: usize,
}

impl LinearActorCritic {
    /// Create a model with small random initialization.
    pub fn new(obs_len: usize, n_actions: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut init = |len: usize| -> Vec<f32> {
            (0..len).map(|_| rng.gen_range(-0.05..0.05)).collect()
        };
        let params = ParamSet::new()
            .tensor(POLICY_W, init(n_actions * obs_len))
            .tensor(POLICY_B, init(n_actions))
            .tensor(VALUE_W, init(obs_len))
            .tensor(VALUE_B, init(1));
        Self {
            params,
            obs_len,
            n_actions,
        }
    }

    /// Observation length this model expects.
    pub fn obs_len(&self) -> usize {
        self.obs_len
    }

    /// Number of discrete actions.
    pub fn n_actions(&self) -> usize {
        self.n_actions
    }

    fn softmax(logits: &[f32]) -> Vec<f32> {
        let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let exps: Vec<f32> = logits.iter().map(|z| (z - max).exp()).collect();
        let sum: f32 = exps.iter().sum();
        exps.iter().map(|e| e / sum).collect()
    }

    fn forward(&self, observation: &[f32]) -> (Vec<f32>, Vec<f32>, f32) {
        let pw = self.params.read(POLICY_W).unwrap_or_default();
        let pb = self.params.read(POLICY_B).unwrap_or_default();
        let vw = self.params.read(VALUE_W).unwrap_or_default();
        let vb = self.params.read(VALUE_B).unwrap_or_default();

        let mut logits = vec![0.0; self.n_actions];
        for a in 0..self.n_actions {
            let mut z = pb[a];
            for (k, x) in observation.iter().enumerate() {
                z += pw[a * self.obs_len + k] * x;
            }
            logits[a] = z;
        }
        let mut value = vb[0];
        for (k, x) in observation.iter().enumerate() {
            value += vw[k] * x;
        }
        let policy = Self::softmax(&logits);
        (policy, logits, value)
    }
}

impl ActorCritic for LinearActorCritic {
    fn params(&self) -> &ParamSet {
        &self.params
    }

    fn predict(&self, observation: &[f32]) -> (Vec<f32>, f32) {
        let (policy, _, value) = self.forward(observation);
        (policy, value)
    }

    fn backward(&self, batch: &RolloutBatch) -> GradientSet {
        let mut gpw = vec![0.0; self.n_actions * self.obs_len];
        let mut gpb = vec![0.0; self.n_actions];
        let mut gvw = vec![0.0; self.obs_len];
        let mut gvb = vec![0.0; 1];

        for (step, &ret) in batch.steps.iter().zip(batch.returns.iter()) {
            let (policy, _, value) = self.forward(&step.observation);
            let advantage = ret - step.value;

            // Policy loss gradient w.r.t. logits: adv * (p - onehot(a)),
            // entropy bonus gradient: beta * p_j * (ln p_j + H).
            let entropy: f32 = policy
                .iter()
                .filter(|&&p| p > 0.0)
                .map(|&p| -p * p.ln())
                .sum();
            let mut dz = vec![0.0; self.n_actions];
            for a in 0..self.n_actions {
                let onehot = if a == step.action { 1.0 } else { 0.0 };
                let p = policy[a];
                dz[a] = advantage * (p - onehot);
                if p > 0.0 {
                    dz[a] += batch.entropy_beta * p * (p.ln() + entropy);
                }
            }

            for a in 0..self.n_actions {
                for (k, x) in step.observation.iter().enumerate() {
                    gpw[a * self.obs_len + k] += dz[a] * x;
                }
                gpb[a] += dz[a];
            }

            // Value loss 0.5 * (v - R)^2.
            let dv = value - ret;
            for (k, x) in step.observation.iter().enumerate() {
                gvw[k] += dv * x;
            }
            gvb[0] += dv;
        }

        GradientSet {
            tensors: vec![
                (POLICY_W.to_string(), gpw),
                (POLICY_B.to_string(), gpb),
                (VALUE_W.to_string(), gvw),
                (VALUE_B.to_string(), gvb),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RolloutStep;

    fn batch_for(model: &LinearActorCritic, obs: Vec<f32>, action: usize, ret: f32) -> RolloutBatch {
        let (policy, value) = model.predict(&obs);
        RolloutBatch {
            steps: vec![RolloutStep {
                observation: obs,
                action,
                reward: ret,
                value,
                log_prob: policy[action].ln(),
            }],
            returns: vec![ret],
            entropy_beta: 0.0,
        }
    }

    #[test]
    fn test_predict_is_distribution() {
        let model = LinearActorCritic::new(4, 3, 7);
        let (policy, value) = model.predict(&[1.0, 0.0, -1.0, 0.5]);
        assert_eq!(policy.len(), 3);
        assert!((policy.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(policy.iter().all(|&p| p > 0.0));
        assert!(value.is_finite());
    }

    #[test]
    fn test_positive_advantage_raises_action_probability() {
        let model = LinearActorCritic::new(2, 2, 3);
        let obs = vec![1.0, 0.0];
        let before = model.predict(&obs).0[1];

        // return well above the value estimate: positive advantage on action 1
        let batch = batch_for(&model, obs.clone(), 1, 5.0);
        let grads = model.backward(&batch);
        model.apply_gradients(&grads, 0.05);

        let after = model.predict(&obs).0[1];
        assert!(
            after > before,
            "probability should rise: {} -> {}",
            before,
            after
        );
    }

    #[test]
    fn test_value_moves_toward_return() {
        let model = LinearActorCritic::new(2, 2, 11);
        let obs = vec![0.0, 1.0];
        let before = model.predict(&obs).1;
        let target = before + 1.0;

        for _ in 0..50 {
            let batch = batch_for(&model, obs.clone(), 0, target);
            let grads = model.backward(&batch);
            model.apply_gradients(&grads, 0.1);
        }
        let after = model.predict(&obs).1;
        assert!((after - target).abs() < (before - target).abs());
    }

    #[test]
    fn test_sync_from_copies_parameters() {
        let a = LinearActorCritic::new(3, 2, 1);
        let b = LinearActorCritic::new(3, 2, 2);
        assert_ne!(
            a.params().read("policy_w"),
            b.params().read("policy_w")
        );
        b.sync_from(&a);
        assert_eq!(
            a.params().read("policy_w"),
            b.params().read("policy_w")
        );
        assert_eq!(a.snapshot(), b.snapshot());
    }

    #[test]
    fn test_layer_order_shallowest_first() {
        let model = LinearActorCritic::new(2, 2, 0);
        assert_eq!(
            model.params().names(),
            vec!["policy_w", "policy_b", "value_w", "value_b"]
        );
    }
}
