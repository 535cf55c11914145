use std::sync::Arc;

use super::*;
use crate::config::A3CConfig;
use crate::core::training_state::TrainingState;
use crate::demo::{DemoStep, DemoStore, DemoTrajectory};
use crate::env::ChainEnv;
use crate::model::linear::LinearActorCritic;
use crate::model::params::ParamSet;
use crate::model::ActorCritic;

const CHAIN_LEN: usize = 4;

fn config() -> Arc<A3CConfig> {
    Arc::new(
        A3CConfig::new("Chain-v0")
            .with_max_time_step(1_000)
            .with_local_t_max(8),
    )
}

fn learner(
    id: usize,
    config: Arc<A3CConfig>,
    reference: Option<Arc<LinearActorCritic>>,
    demo_store: Option<Arc<DemoStore>>,
) -> A3CLearner<LinearActorCritic, ChainEnv> {
    A3CLearner::new(
        id,
        config,
        ChainEnv::new(CHAIN_LEN),
        LinearActorCritic::new(CHAIN_LEN, 2, 100 + id as u64),
        reference,
        demo_store,
    )
}

/// Model whose greedy (and confident) action is always 1.
fn right_biased_model() -> LinearActorCritic {
    let model = LinearActorCritic::new(CHAIN_LEN, 2, 0);
    let snapshot = ParamSet::new()
        .tensor("policy_w", vec![0.0; 2 * CHAIN_LEN])
        .tensor("policy_b", vec![0.0, 6.0])
        .tensor("value_w", vec![0.0; CHAIN_LEN])
        .tensor("value_b", vec![0.0])
        .snapshot();
    model.load_snapshot(&snapshot).unwrap();
    model
}

fn goal_trajectory(id: usize) -> DemoTrajectory {
    let steps = (0..CHAIN_LEN - 1)
        .map(|i| {
            let mut observation = vec![0.0; CHAIN_LEN];
            observation[i] = 1.0;
            DemoStep {
                observation,
                action: 1,
                reward: if i == CHAIN_LEN - 2 { 1.0 } else { 0.0 },
                terminal: i == CHAIN_LEN - 2,
            }
        })
        .collect();
    DemoTrajectory { id, steps }
}

#[test]
fn test_process_counts_steps_and_reports_episodes() {
    let global = LinearActorCritic::new(CHAIN_LEN, 2, 1);
    let mut learner = learner(0, config(), None, None);

    let mut episodes = 0;
    let mut total_steps = 0;
    for _ in 0..50 {
        let outcome = learner.process(&global);
        assert!(outcome.steps >= 1 && outcome.steps <= 8);
        total_steps += outcome.steps;
        if let Some((_, length)) = outcome.episode {
            assert!(length >= CHAIN_LEN as u64 - 1);
            episodes += 1;
        }
    }
    assert!(total_steps > 0);
    // the chain episode cap guarantees episodes end within 16 steps
    assert!(episodes > 0);
}

#[test]
fn test_process_pushes_gradients_to_global() {
    let global = LinearActorCritic::new(CHAIN_LEN, 2, 1);
    let before = global.snapshot();
    let mut learner = learner(0, config(), None, None);
    learner.process(&global);
    assert_ne!(global.snapshot(), before);
}

#[test]
fn test_advice_override_follows_reference() {
    let mut config = A3CConfig::new("Chain-v0").with_local_t_max(10);
    config.use_advice = true;
    config.advice_confidence = 0.5;
    let reference = Arc::new(right_biased_model());

    let global = LinearActorCritic::new(CHAIN_LEN, 2, 1);
    let mut learner = learner(0, Arc::new(config), Some(reference), None);
    assert!(learner.role().advises());

    // the reference is confident in action 1 everywhere, so the very first
    // segment walks straight to the goal
    let outcome = learner.process(&global);
    let (reward, length) = outcome.episode.unwrap();
    assert_eq!(reward, 1.0);
    assert_eq!(length, CHAIN_LEN as u64 - 1);
}

#[test]
fn test_demo_replay_consumes_whole_trajectory() {
    let store =
        Arc::new(DemoStore::from_trajectories(vec![goal_trajectory(0)]).unwrap());
    let global = LinearActorCritic::new(CHAIN_LEN, 2, 1);
    let mut learner = learner(0, config(), None, Some(store));

    assert!(!learner.demo_active());
    assert!(learner.start_demo(0));
    assert!(learner.demo_active());
    assert!(!learner.start_demo(7), "unknown trajectory id");

    let mut replayed = 0;
    let mut episode = None;
    while learner.demo_active() {
        let outcome = learner.demo_process(&global);
        replayed += outcome.steps;
        if outcome.episode.is_some() {
            episode = outcome.episode;
        }
    }
    assert_eq!(replayed, CHAIN_LEN as u64 - 1);
    let (reward, length) = episode.unwrap();
    assert_eq!(reward, 1.0);
    assert_eq!(length, CHAIN_LEN as u64 - 1);
}

#[test]
fn test_pretrain_clears_marker_and_advances_counter() {
    let store = Arc::new(
        DemoStore::from_trajectories(vec![goal_trajectory(0), goal_trajectory(1)]).unwrap(),
    );
    let global = LinearActorCritic::new(CHAIN_LEN, 2, 1);
    let state = TrainingState::fresh(1);

    let mut config = A3CConfig::new("Chain-v0");
    config.pretrain_min_steps = 12;
    config.pretrain_min_epochs = 1;
    let mut learner = learner(0, Arc::new(config), None, Some(store));

    state.set_pretrain_marker(0);
    learner.pretrain(&global, &state);

    assert!(!state.pretrain_marker(0));
    assert!(state.pretrain_global_t() >= 12);
    assert!(state.pretrain_epoch() >= 1);
    assert_eq!(state.global_t(), 0, "pretraining must not advance global_t");
}

#[test]
fn test_pretrain_without_store_clears_marker() {
    let global = LinearActorCritic::new(CHAIN_LEN, 2, 1);
    let state = TrainingState::fresh(1);
    let mut learner = learner(0, config(), None, None);

    state.set_pretrain_marker(0);
    learner.pretrain(&global, &state);
    assert!(!state.pretrain_marker(0));
}

#[test]
fn test_evaluate_greedy_reaches_goal() {
    let model = right_biased_model();
    let mut env = ChainEnv::new(CHAIN_LEN);
    let result = evaluate(&model, &mut env, 100, 5);

    assert_eq!(result.episodes, 5);
    assert_eq!(result.reward, 1.0);
    assert_eq!(result.steps, 5 * (CHAIN_LEN as u64 - 1));
}

#[test]
fn test_evaluate_respects_step_bound() {
    let model = right_biased_model();
    let mut env = ChainEnv::new(CHAIN_LEN);
    let result = evaluate(&model, &mut env, 2, 100);
    assert_eq!(result.steps, 2);
    assert_eq!(result.episodes, 0);
}

#[test]
fn test_demo_conversion_roll_endpoints() {
    let mut learner = learner(0, config(), None, None);
    assert!(!learner.roll_demo_conversion(0.0));
    assert!(learner.roll_demo_conversion(1.0));
}
