//! Reward transforms applied to raw environment rewards.

use serde::{Deserialize, Serialize};

/// Reward transform selected per configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RewardTransform {
    /// Pass-through.
    Raw,
    /// Sign-preserving logarithmic compression.
    Log,
    /// Sign clip to {-1, 0, 1}.
    Clip,
}

impl RewardTransform {
    /// Apply the transform to a raw reward.
    pub fn apply(&self, reward: f32) -> f32 {
        match self {
            RewardTransform::Raw => reward,
            RewardTransform::Log => reward.signum() * (1.0 + reward.abs()).ln(),
            RewardTransform::Clip => {
                if reward > 0.0 {
                    1.0
                } else if reward < 0.0 {
                    -1.0
                } else {
                    0.0
                }
            }
        }
    }
}

/// Transformed-Bellman reward compression:
/// `sign(r) * (sqrt(|r| + 1) - 1) + eps * r`.
///
/// Optional substitute for the configured transform; keeps large reward
/// magnitudes learnable without full clipping.
pub fn transformed_bellman(reward: f32) -> f32 {
    const EPS: f32 = 1e-2;
    reward.signum() * ((reward.abs() + 1.0).sqrt() - 1.0) + EPS * reward
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_maps_to_sign_unit() {
        for r in [-100.0_f32, -0.5, 0.0, 0.5, 100.0] {
            let c = RewardTransform::Clip.apply(r);
            assert!(c == -1.0 || c == 0.0 || c == 1.0);
            assert_eq!(c.signum() * c.abs(), c);
            if r > 0.0 {
                assert_eq!(c, 1.0);
            } else if r < 0.0 {
                assert_eq!(c, -1.0);
            } else {
                assert_eq!(c, 0.0);
            }
        }
    }

    #[test]
    fn test_raw_is_identity() {
        for r in [-3.5_f32, 0.0, 2.25, 1e6] {
            assert_eq!(RewardTransform::Raw.apply(r), r);
        }
    }

    #[test]
    fn test_log_is_sign_and_magnitude_monotonic() {
        let t = RewardTransform::Log;
        assert_eq!(t.apply(0.0), 0.0);
        assert!(t.apply(1.0) > 0.0);
        assert!(t.apply(-1.0) < 0.0);
        assert!(t.apply(10.0) > t.apply(1.0));
        assert!(t.apply(-10.0) < t.apply(-1.0));
        // odd function
        assert!((t.apply(5.0) + t.apply(-5.0)).abs() < 1e-6);
    }

    #[test]
    fn test_transformed_bellman_sign() {
        assert_eq!(transformed_bellman(0.0), 0.0);
        assert!(transformed_bellman(100.0) > 0.0);
        assert!(transformed_bellman(-100.0) < 0.0);
        // compresses large magnitudes below identity
        assert!(transformed_bellman(100.0) < 100.0);
    }
}
