#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]

pub const FABLE_VERSION: &str = env!("CARGO_PKG_VERSION");

// Logic core
pub mod error;
pub mod knowledge;
pub mod logic;
pub mod policy;
pub mod progression;
pub mod quest;
pub mod world;

// Generation
pub mod chainer;
pub mod generator;
pub mod grammar;
pub mod rng;

// Games, runtime and adapters
pub mod compiler;
pub mod env;
pub mod game;
pub mod repl;

// Support
pub mod config;
pub mod data_paths;
pub mod idgen;
pub mod save_files;
pub mod slug;
pub mod style;

// Re-exports for convenience
pub use chainer::{Chain, Chainer, ChainingOptions, goal_from_predicates};
pub use compiler::{JsonStoryCompiler, LogicInterpreter, StoryCompiler, StoryInterpreter};
pub use config::{EngineConfig, load_config};
pub use env::{LogicEnvironment, StepOutcome};
pub use error::{EngineError, EngineResult};
pub use game::Game;
pub use generator::{GameOptions, make_game, make_map, make_objects, make_quest};
pub use knowledge::KnowledgeBase;
pub use logic::{Action, Proposition, Rule, State, Variable};
pub use policy::{PolicyOptions, PolicyOutcome, winning_policy};
pub use progression::{GameProgression, QuestStatus, QuestTracker};
pub use quest::{Event, Quest};
pub use repl::run_repl;
pub use rng::RandomGenerator;
pub use world::{Direction, World};
