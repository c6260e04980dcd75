use std::sync::Arc;

use fable_engine::grammar::EntityInfo;
use fable_engine::logic::{Placeholder, Predicate, fixed_mapping};
use fable_engine::*;
use rand::SeedableRng;
use rand::rngs::StdRng;

fn fact(name: &str, args: &[(&str, &str)]) -> Proposition {
    Proposition::new(name, args.iter().map(|(n, t)| Variable::new(*n, *t)).collect())
}

fn action_for(state: &State, command: &str) -> Action {
    state
        .all_applicable_actions(state.kb().rules(), &fixed_mapping())
        .into_iter()
        .find(|a| a.command() == command)
        .unwrap_or_else(|| panic!("'{command}' is not applicable"))
}

fn after(state: &State, action: &Action) -> State {
    state.apply_on_copy(action).unwrap().unwrap()
}

/// Bedroom and kitchen joined by an open door; a carrot in hand and an open chest next door.
fn cottage(carrot_held: bool) -> State {
    let carrot = if carrot_held {
        fact("in", &[("carrot", "f"), ("I", "I")])
    } else {
        fact("at", &[("carrot", "f"), ("bedroom", "r")])
    };
    World::from_facts(
        KnowledgeBase::builtin(),
        vec![
            fact("at", &[("P", "P"), ("bedroom", "r")]),
            fact("east_of", &[("kitchen", "r"), ("bedroom", "r")]),
            fact("link", &[("bedroom", "r"), ("door", "d"), ("kitchen", "r")]),
            fact("open", &[("door", "d")]),
            fact("free", &[("bedroom", "r"), ("kitchen", "r")]),
            fact("at", &[("chest", "c"), ("kitchen", "r")]),
            fact("open", &[("chest", "c")]),
            carrot,
        ],
    )
    .unwrap()
    .into_state()
}

struct Stash {
    start: State,
    go_east: Action,
    insert: Action,
    close: Action,
    eat: Action,
    quest: Quest,
}

fn stash_the_carrot() -> Stash {
    let start = cottage(true);
    let go_east = action_for(&start, "go east");
    let eat = action_for(&start, "eat carrot");
    let kitchen = after(&start, &go_east);
    let insert = action_for(&kitchen, "insert carrot into chest");
    let close = action_for(&kitchen, "close chest");

    let win = Event::new(vec![go_east.clone(), insert.clone(), close.clone()], []).unwrap();
    let eaten = Event::new(vec![eat.clone()], []).unwrap();
    let shut_out = Event::new(vec![close.clone()], [fact("in", &[("carrot", "f"), ("I", "I")])]).unwrap();
    let quest = Quest::new(vec![win], vec![eaten, shut_out]).unwrap();
    Stash {
        start,
        go_east,
        insert,
        close,
        eat,
        quest,
    }
}

#[test]
fn stashing_the_carrot_wins() {
    let stash = stash_the_carrot();
    let mut progression = GameProgression::new(stash.start, vec![stash.quest], PolicyOptions::default());
    assert_eq!(progression.winning_policy().map(<[Action]>::len), Some(3));

    for action in [&stash.go_east, &stash.insert, &stash.close] {
        assert!(!progression.done());
        progression.update(action).unwrap();
    }
    assert!(progression.won());
    assert!(!progression.lost());
    assert!(progression.done());
    assert_eq!(progression.score(), 1);
    assert_eq!(progression.winning_policy(), Some(&[][..]));
}

#[test]
fn eating_the_carrot_loses() {
    let stash = stash_the_carrot();
    let mut progression = GameProgression::new(stash.start, vec![stash.quest], PolicyOptions::default());
    progression.update(&stash.eat).unwrap();
    assert!(progression.lost());
    assert!(progression.done());
    assert_eq!(progression.score(), 0);
}

#[test]
fn closing_the_chest_too_early_loses() {
    let stash = stash_the_carrot();
    let mut progression = GameProgression::new(stash.start, vec![stash.quest], PolicyOptions::default());
    progression.update(&stash.go_east).unwrap();
    progression.update(&stash.close).unwrap();
    assert_eq!(progression.quest_status(0), Some(QuestStatus::Failed));
    assert!(progression.lost());
    assert!(progression.winning_policy().is_none());
}

fn garage() -> Game {
    let kb = Arc::new(
        KnowledgeBase::builtin()
            .with_rules(&["unlock/c", "open/c", "take/c"])
            .unwrap(),
    );
    let world = World::from_facts(
        kb,
        vec![
            fact("at", &[("P", "P"), ("garage", "r")]),
            fact("in", &[("k1", "k"), ("I", "I")]),
            fact("at", &[("s1", "c"), ("garage", "r")]),
            fact("locked", &[("s1", "c")]),
            fact("match", &[("k1", "k"), ("s1", "c")]),
            fact("in", &[("g1", "o"), ("s1", "c")]),
        ],
    )
    .unwrap();
    let quest = Quest::new(
        vec![Event::from_conditions([fact("in", &[("g1", "o"), ("I", "I")])]).unwrap()],
        Vec::new(),
    )
    .unwrap();
    let mut game = Game::new(world, vec![quest]);
    for (id, name) in [("k1", "key"), ("s1", "safe"), ("g1", "gem"), ("garage", "garage")] {
        game.infos.insert(
            id.to_string(),
            EntityInfo {
                name: Some(name.to_string()),
                ..EntityInfo::default()
            },
        );
    }
    game
}

#[test]
fn locked_safe_policy_unlocks_opens_and_takes() {
    let mut env = LogicEnvironment::new(garage(), PolicyOptions::default());
    env.reset();
    assert_eq!(
        env.policy_commands().unwrap(),
        Some(vec![
            "unlock safe with key".to_string(),
            "open safe".to_string(),
            "take gem from safe".to_string(),
        ])
    );
    assert_eq!(env.admissible_commands().unwrap(), vec!["unlock safe with key".to_string()]);

    let mut last = None;
    for command in ["unlock safe with key", "open safe", "take gem from safe"] {
        last = Some(env.step(command).unwrap());
    }
    let last = last.unwrap();
    assert!(last.done);
    assert_eq!(last.score, 1);
    assert!(last.observation.contains("You won"));
}

fn pantry() -> State {
    State::from_facts(
        KnowledgeBase::builtin(),
        vec![
            fact("at", &[("P", "P"), ("pantry", "r")]),
            fact("in", &[("apple", "f"), ("I", "I")]),
            fact("in", &[("orange", "f"), ("I", "I")]),
        ],
    )
    .unwrap()
}

#[test]
fn independent_quests_complete_in_any_order() {
    let state = pantry();
    let eat_apple = action_for(&state, "eat apple");
    let eat_orange = action_for(&state, "eat orange");
    let quests = vec![
        Quest::from_actions(vec![eat_apple.clone()]).unwrap(),
        Quest::from_actions(vec![eat_orange.clone()]).unwrap(),
    ];

    for order in [[&eat_apple, &eat_orange], [&eat_orange, &eat_apple]] {
        let mut progression = GameProgression::new(state.clone(), quests.clone(), PolicyOptions::default());
        assert_eq!(progression.max_score(), 2);
        progression.update(order[0]).unwrap();
        assert_eq!(progression.score(), 1);
        assert!(!progression.done());
        progression.update(order[1]).unwrap();
        assert_eq!(progression.score(), 2);
        assert!(progression.won());
        assert!(progression.done());
    }
}

#[test]
fn forward_chains_on_random_maps_replay() {
    let kb = KnowledgeBase::builtin();
    let mut found = 0;
    for seed in 0..20 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut world = make_map(Arc::clone(&kb), 5, &mut rng).unwrap();
        make_objects(&mut world, 10, &mut rng, None).unwrap();
        let state = world.state().clone();
        let options = ChainingOptions {
            max_depth: 3,
            max_breadth: 3,
            ..ChainingOptions::default()
        };
        let Ok((chain, quests)) = make_quest(&state, options, &mut rng) else {
            continue;
        };
        found += 1;
        assert!(!chain.is_empty() && chain.len() <= 3);
        assert!(!quests.is_empty());

        let mut replay = state.clone();
        for action in &chain.actions {
            assert!(replay.is_applicable(action), "seed {seed}: '{}' not applicable", action.command());
            replay.apply(action).unwrap();
        }
        assert_eq!(&replay, chain.final_state());
        let last = chain.actions.last().unwrap();
        assert!(!last.is_noop());
    }
    assert!(found > 0);
}

#[test]
fn backward_chain_invents_a_key_for_a_locked_chest() {
    let state = pantry();
    let preds = vec![
        Predicate::new("locked", vec![Placeholder::new("c", "c")]),
        Predicate::new("match", vec![Placeholder::new("k", "k"), Placeholder::new("c", "c")]),
    ];
    let goal = goal_from_predicates(&preds, &state, &fixed_mapping()).unwrap();
    let options = ChainingOptions {
        backward: true,
        max_depth: 2,
        goal: Some(goal.clone()),
        create_variables: true,
        restricted_types: ["r".to_string()].into_iter().collect(),
        ..ChainingOptions::default()
    };
    let chain = Chainer::new(&state, options).chain().unwrap();
    assert_eq!(
        chain.actions.last().map(Action::command).as_deref(),
        Some("lock c_0 with k_0")
    );
    assert!(chain.initial_state.has_variable(&Variable::new("c_0", "c")));
    assert!(chain.initial_state.has_variable(&Variable::new("k_0", "k")));
    assert!(chain.initial_state.contains(&fact("at", &[("c_0", "c"), ("pantry", "r")])));
    assert!(chain.final_state().contains_all(&goal));
}

#[test]
fn dropping_a_taken_item_lengthens_the_policy() {
    let start = cottage(false);
    let take = action_for(&start, "take carrot");
    let held = after(&start, &take);
    let go_east = action_for(&held, "go east");
    let kitchen = after(&held, &go_east);
    let insert = action_for(&kitchen, "insert carrot into chest");
    let quest = Quest::from_actions(vec![take.clone(), go_east, insert]).unwrap();

    let mut progression = GameProgression::new(start, vec![quest], PolicyOptions::default());
    progression.update(&take).unwrap();
    let after_take = progression.winning_policy().map(<[Action]>::len).unwrap();
    assert_eq!(after_take, 2);

    let drop = action_for(progression.state(), "drop carrot");
    progression.update(&drop).unwrap();
    assert_eq!(progression.trackers()[0].win, vec![0]);
    assert_eq!(progression.winning_policy().map(<[Action]>::len), Some(after_take + 1));
}
