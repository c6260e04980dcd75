//! Properties checked over many seeds rather than hand-built fixtures.

use std::collections::BTreeSet;
use std::sync::Arc;

use fable_engine::logic::{Placeholder, Predicate, fixed_mapping};
use fable_engine::progression::UpdateOutcome;
use fable_engine::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;

const SEEDS: std::ops::Range<u64> = 0..8;

fn random_state(seed: u64) -> State {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut world = make_map(KnowledgeBase::builtin(), 3, &mut rng).unwrap();
    make_objects(&mut world, 6, &mut rng, None).unwrap();
    world.check_invariants().unwrap();
    world.into_state()
}

fn applicable(state: &State) -> Vec<Action> {
    state.all_applicable_actions(state.kb().rules(), &fixed_mapping())
}

#[test]
fn applying_adds_and_removes_exactly_the_action_effects() {
    for seed in SEEDS {
        let state = random_state(seed);
        for action in applicable(&state) {
            let next = state.apply_on_copy(&action).unwrap().unwrap();
            assert!(next.contains_all(action.added()), "{action}");
            assert!(action.removed().iter().all(|f| !next.contains(f)), "{action}");
            let untouched: BTreeSet<&Proposition> = state
                .facts()
                .filter(|f| !action.removed().contains(f))
                .collect();
            assert!(untouched.iter().all(|f| next.contains(f)), "{action}");
        }
    }
}

#[test]
fn world_facts_round_trip() {
    for seed in SEEDS {
        let state = random_state(seed);
        let world = World::from_facts(Arc::clone(state.kb()), state.facts().cloned()).unwrap();
        assert_eq!(world.state(), &state);
        let facts: BTreeSet<Proposition> = world.facts().into_iter().collect();
        assert_eq!(&facts, state.fact_set());
    }
}

#[test]
fn inverse_actions_restore_the_state() {
    let mut checked = 0;
    for seed in SEEDS {
        let state = random_state(seed);
        for action in applicable(&state) {
            if action.added().iter().any(|f| state.contains(f)) {
                continue;
            }
            let next = state.apply_on_copy(&action).unwrap().unwrap();
            let Some(inverse) = next.inverse_of(&action) else {
                continue;
            };
            let back = next.apply_on_copy(&inverse).unwrap().unwrap();
            assert_eq!(back, state, "{action} / {inverse}");
            checked += 1;
        }
    }
    assert!(checked > 0);
}

fn rename(var: &Variable) -> Variable {
    match var.type_name.as_str() {
        "P" | "I" => var.clone(),
        _ => Variable::new(format!("{}_x", var.name), var.type_name.clone()),
    }
}

fn rename_fact(fact: &Proposition) -> Proposition {
    Proposition::new(fact.name.clone(), fact.arguments.iter().map(rename).collect())
}

type Shape = (String, BTreeSet<Proposition>, BTreeSet<Proposition>);

fn shape(action: &Action, map: impl Fn(&Proposition) -> Proposition) -> Shape {
    (
        action.name.clone(),
        action.preconditions.iter().map(&map).collect(),
        action.postconditions.iter().map(&map).collect(),
    )
}

#[test]
fn enumeration_follows_renaming() {
    for seed in SEEDS {
        let state = random_state(seed);
        let renamed = State::from_facts(Arc::clone(state.kb()), state.facts().map(rename_fact)).unwrap();
        let expected: BTreeSet<Shape> = applicable(&state).iter().map(|a| shape(a, rename_fact)).collect();
        let found: BTreeSet<Shape> = applicable(&renamed).iter().map(|a| shape(a, Proposition::clone)).collect();
        assert_eq!(found, expected, "seed {seed}");
    }
}

#[test]
fn backward_chains_reach_their_goal() {
    let goals = [
        vec![Predicate::new("eaten", vec![Placeholder::new("f", "f")])],
        vec![
            Predicate::new("locked", vec![Placeholder::new("c", "c")]),
            Predicate::new("match", vec![Placeholder::new("k", "k"), Placeholder::new("c", "c")]),
        ],
    ];
    let mut found = 0;
    for seed in SEEDS {
        let state = random_state(seed);
        for preds in &goals {
            let goal = goal_from_predicates(preds, &state, &fixed_mapping()).unwrap();
            let options = ChainingOptions {
                backward: true,
                max_depth: 2,
                goal: Some(goal.clone()),
                create_variables: true,
                restricted_types: ["r".to_string()].into_iter().collect(),
                ..ChainingOptions::default()
            };
            let Ok(chain) = Chainer::new(&state, options).chain() else {
                continue;
            };
            found += 1;
            assert!(chain.initial_state.violated_constraint().is_none());
            assert!(state.facts().all(|f| chain.initial_state.contains(f)));
            let mut replay = chain.initial_state.clone();
            for action in &chain.actions {
                assert!(replay.apply(action).unwrap(), "seed {seed}: {action}");
            }
            assert!(replay.contains_all(&goal), "seed {seed}");
        }
    }
    assert!(found > 0);
}

#[test]
fn generation_is_deterministic_per_seed() {
    for seed in 0..3 {
        let options = GameOptions::new(KnowledgeBase::builtin(), seed);
        let first = make_game(&options).unwrap();
        let second = make_game(&options).unwrap();
        assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
    }
    let a = make_game(&GameOptions::new(KnowledgeBase::builtin(), 1)).unwrap();
    let b = make_game(&GameOptions::new(KnowledgeBase::builtin(), 2)).unwrap();
    assert_ne!(a.uuid(), b.uuid());
}

#[test]
fn generated_games_survive_json() {
    for seed in 0..3 {
        let game = make_game(&GameOptions::new(KnowledgeBase::builtin(), seed)).unwrap();
        let back = Game::from_json(&game.to_json().unwrap(), KnowledgeBase::builtin()).unwrap();
        assert_eq!(back, game);
    }
}

#[test]
fn winning_policies_win() {
    for seed in 0..4 {
        let game = make_game(&GameOptions::new(KnowledgeBase::builtin(), seed)).unwrap();
        let start = game.world.state().clone();
        let mut progression = GameProgression::new(start, game.quests.clone(), PolicyOptions::default());
        let plan = progression.winning_policy().unwrap().to_vec();
        assert!(plan.len() <= game.walkthrough().len());
        for action in &plan {
            assert!(!progression.done());
            let outcome = progression.update(action).unwrap();
            assert!(
                matches!(&outcome, UpdateOutcome::Applied { failed, .. } if failed.is_empty()),
                "seed {seed}: {action} gave {outcome:?}"
            );
        }
        assert!(progression.won(), "seed {seed}");
        assert_eq!(progression.score(), game.max_score());
    }
}

#[test]
fn score_never_decreases() {
    let options = PolicyOptions {
        max_depth: 8,
        max_nodes: 5_000,
    };
    for seed in 0..3 {
        let game = make_game(&GameOptions::new(KnowledgeBase::builtin(), seed)).unwrap();
        let max_score = game.max_score();
        let mut env = LogicEnvironment::new(game, options);
        env.reset();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut last = 0;
        for _ in 0..25 {
            let commands = env.admissible_commands().unwrap();
            let Some(command) = commands.choose(&mut rng) else {
                break;
            };
            let outcome = env.step(command).unwrap();
            assert!(outcome.score >= last, "seed {seed}: score dropped on '{command}'");
            assert!(outcome.score <= max_score);
            last = outcome.score;
            if outcome.done {
                break;
            }
        }
    }
}
