//! Procedural game generation: map, objects, quests, names and metadata.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, info, warn};
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;

use crate::chainer::{Chain, Chainer, ChainingOptions};
use crate::config::{ChainingConfig, EngineConfig, GenerationConfig};
use crate::error::{EngineError, EngineResult};
use crate::game::Game;
use crate::grammar::{Grammar, SimpleGrammar};
use crate::idgen::game_uuid;
use crate::knowledge::KnowledgeBase;
use crate::logic::{Action, Proposition, State, Variable};
use crate::quest::Quest;
use crate::rng::RandomGenerator;
use crate::world::{Direction, World};

/// Worlds rebuilt from a fresh sub-generator before giving up on a quest.
const MAX_ATTEMPTS: usize = 16;

/// How a generated connection between two rooms is closed off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Passage {
    Doorless,
    Open,
    Closed,
    Locked,
}

const PASSAGES: [Passage; 4] = [Passage::Doorless, Passage::Open, Passage::Closed, Passage::Locked];

/// Everything `make_game` needs.
#[derive(Debug, Clone)]
pub struct GameOptions {
    pub kb: Arc<KnowledgeBase>,
    pub seed: u64,
    /// Per-concern seeds overriding the ones derived from `seed`.
    pub seeds: BTreeMap<String, u64>,
    pub generation: GenerationConfig,
    pub chaining: ChainingConfig,
}

impl GameOptions {
    pub fn new(kb: Arc<KnowledgeBase>, seed: u64) -> Self {
        Self {
            kb,
            seed,
            seeds: BTreeMap::new(),
            generation: GenerationConfig::default(),
            chaining: ChainingConfig::default(),
        }
    }

    pub fn from_config(kb: Arc<KnowledgeBase>, seed: u64, config: &EngineConfig) -> Self {
        Self {
            generation: config.generation.clone(),
            chaining: config.chaining.clone(),
            ..Self::new(kb, seed)
        }
    }
}

/// Lay out `n_rooms` rooms by a random walk on the grid and put the player in the first.
///
/// Each new room is attached to a random earlier room with a free neighbouring cell. The
/// connection is doorless or gets a door that starts open, closed or locked.
///
/// # Errors
/// Returns [`EngineError::InvalidWorld`] when `n_rooms` is zero, or a fact error.
pub fn make_map<R: Rng + ?Sized>(kb: Arc<KnowledgeBase>, n_rooms: usize, rng: &mut R) -> EngineResult<World> {
    if n_rooms == 0 {
        return Err(EngineError::InvalidWorld("a map needs at least one room".into()));
    }
    let mut world = World::new(kb);
    let first = world.new_variable("r");
    let mut facts = vec![Proposition::new("at", vec![Variable::new("P", "P"), first.clone()])];
    let mut cells: BTreeMap<(i32, i32), Variable> = BTreeMap::new();
    cells.insert((0, 0), first);

    while cells.len() < n_rooms {
        let frontier: Vec<((i32, i32), Direction)> = cells
            .keys()
            .flat_map(|cell| Direction::ALL.map(|dir| (*cell, dir)))
            .filter(|(cell, dir)| !cells.contains_key(&neighbour(*cell, *dir)))
            .collect();
        let Some(&(from, dir)) = frontier.choose(rng) else {
            break;
        };
        let old = cells[&from].clone();
        let room = world.new_variable("r");
        facts.push(Proposition::new(dir.predicate(), vec![room.clone(), old.clone()]));
        let passage = PASSAGES.choose(rng).copied().unwrap_or(Passage::Doorless);
        facts.extend(connect(&mut world, &old, &room, passage));
        debug!("map: '{}' {dir} of '{}' ({passage:?})", room.name, old.name);
        cells.insert(neighbour(from, dir), room);
    }

    world.add_facts(facts)?;
    info!("map of {} rooms generated", cells.len());
    Ok(world)
}

fn neighbour((x, y): (i32, i32), dir: Direction) -> (i32, i32) {
    let (dx, dy) = dir.offset();
    (x + dx, y + dy)
}

fn connect(world: &mut World, a: &Variable, b: &Variable, passage: Passage) -> Vec<Proposition> {
    let free = || {
        [
            Proposition::new("free", vec![a.clone(), b.clone()]),
            Proposition::new("free", vec![b.clone(), a.clone()]),
        ]
    };
    let status = match passage {
        Passage::Doorless => return free().to_vec(),
        Passage::Open => "open",
        Passage::Closed => "closed",
        Passage::Locked => "locked",
    };
    let door = world.new_variable("d");
    let mut facts = vec![
        Proposition::new("link", vec![a.clone(), door.clone(), b.clone()]),
        Proposition::new("link", vec![b.clone(), door.clone(), a.clone()]),
        Proposition::new(status, vec![door]),
    ];
    if passage == Passage::Open {
        facts.extend(free());
    }
    facts
}

/// Add `n` random entities to `world`.
///
/// # Errors
/// See [`World::populate`].
pub fn make_objects<R: Rng + ?Sized>(
    world: &mut World,
    n: usize,
    rng: &mut R,
    type_probs: Option<&BTreeMap<String, f64>>,
) -> EngineResult<Vec<Proposition>> {
    world.populate(n, rng, type_probs)
}

/// Chain forward from `state` and lift the chain into quests, one per breadth segment.
///
/// The chain never undoes the action it has just performed.
///
/// # Errors
/// Returns [`EngineError::QuestGeneration`] when no chain satisfies the bounds.
pub fn make_quest(state: &State, mut options: ChainingOptions, rng: &mut StdRng) -> EngineResult<(Chain, Vec<Quest>)> {
    options.backward = false;
    options.rng = Some(StdRng::seed_from_u64(rng.random()));
    options.check_action = Some(Box::new(|state: &State, previous: Option<&Action>, action: &Action| {
        previous.is_none_or(|prev| state.inverse_of(prev).as_ref() != Some(action))
    }));
    let chain = Chainer::new(state, options).chain()?;
    let quests = chain
        .split_by_breadth()
        .into_iter()
        .map(Quest::from_actions)
        .collect::<EngineResult<Vec<_>>>()?;
    Ok((chain, quests))
}

/// Generate a complete game. Equal options always give the same game.
///
/// # Errors
/// Returns [`EngineError::QuestGeneration`] when no attempt yields a quest, or any error
/// raised while building the world.
pub fn make_game(options: &GameOptions) -> EngineResult<Game> {
    let mut root = RandomGenerator::with_seeds(options.seed, &options.seeds);
    let mut last_error = None;
    for attempt in 0..MAX_ATTEMPTS {
        let mut rngs = if attempt == 0 { root.clone() } else { root.next() };
        match try_make_game(options, &mut rngs) {
            Ok(game) => return Ok(game),
            Err(err @ EngineError::QuestGeneration(_)) => {
                warn!("attempt {attempt} produced no quest ({err}); regenerating the world");
                last_error = Some(err);
            },
            Err(err) => return Err(err),
        }
    }
    Err(last_error.unwrap_or_else(|| EngineError::QuestGeneration("no generation attempt was made".into())))
}

fn try_make_game(options: &GameOptions, rngs: &mut RandomGenerator) -> EngineResult<Game> {
    let generation = &options.generation;
    let mut world = make_map(Arc::clone(&options.kb), generation.rooms, rngs.rng("map"))?;
    make_objects(&mut world, generation.objects, rngs.rng("objects"), Some(&generation.type_probs))?;
    world.check_invariants()?;

    let mut chaining = options.chaining.options();
    chaining.max_depth = generation.quest_length.max(1);
    chaining.min_depth = chaining.min_depth.min(chaining.max_depth);
    chaining.max_breadth = generation.quest_breadth.max(1);
    chaining.min_breadth = chaining.min_breadth.min(chaining.max_breadth);
    let (chain, quests) = make_quest(world.state(), chaining, rngs.rng("quest"))?;

    let mut game = Game::new(world, quests);
    let mut grammar = SimpleGrammar::new(StdRng::seed_from_u64(rngs.rng("grammar").random()));
    let kb = Arc::clone(game.kb());
    let named: Vec<Variable> = game
        .world
        .state()
        .variables()
        .filter(|v| !kb.types().is_descendant_of(&v.type_name, "P") && !kb.types().is_descendant_of(&v.type_name, "I"))
        .cloned()
        .collect();
    for var in named {
        game.infos.insert(var.name.clone(), grammar.entity_info(&var, &kb));
    }

    let walkthrough: Vec<String> = chain.actions.iter().map(|a| game.command_for(a)).collect();
    let descs: Vec<String> = game
        .quests
        .iter()
        .map(|q| {
            let commands: Vec<String> = q.win_events[0].actions.iter().map(|a| game.command_for(a)).collect();
            grammar.objective(&commands)
        })
        .collect();
    for (quest, desc) in game.quests.iter_mut().zip(descs) {
        quest.desc = Some(desc);
    }

    game.metadata.seeds.clone_from(rngs.seeds());
    game.metadata.uuid = format!("fable-{}", game_uuid(rngs.seeds()));
    game.metadata.objective = grammar.objective(&walkthrough);
    game.metadata.walkthrough = walkthrough;
    info!(
        "game '{}' generated: {} rooms, {} facts, {} quests",
        game.uuid(),
        game.world.rooms().count(),
        game.world.state().len(),
        game.quests.len()
    );
    Ok(game)
}
