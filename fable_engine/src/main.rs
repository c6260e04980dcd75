#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
//! ** Fable **
//! Generate and play procedural text adventures.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use log::info;

use fable_engine::data_paths::config_path;
use fable_engine::{
    EngineConfig, Game, GameOptions, JsonStoryCompiler, KnowledgeBase, LogicEnvironment, StoryCompiler, load_config,
    make_game, run_repl,
};

#[derive(Parser)]
#[command(name = "fable", version, about = "Generate and play procedural text adventures")]
struct Cli {
    /// Engine configuration (TOML); defaults to data/config.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Knowledge base (.twl or compiled .ron); defaults to the built-in core rules.
    #[arg(long, global = true)]
    kb: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Play a game file, or a freshly generated game.
    Play {
        /// Game record (JSON) to play.
        game: Option<PathBuf>,
        #[command(flatten)]
        size: SizeArgs,
    },
    /// Generate a game and write it as a story file.
    Make {
        /// Directory receiving the story file.
        #[arg(short, long, default_value = "games")]
        output: PathBuf,
        #[command(flatten)]
        size: SizeArgs,
    },
}

#[derive(Args)]
struct SizeArgs {
    #[arg(long, default_value_t = 1234)]
    seed: u64,
    #[arg(long)]
    rooms: Option<usize>,
    #[arg(long)]
    objects: Option<usize>,
    #[arg(long)]
    quest_length: Option<usize>,
}

impl SizeArgs {
    fn options(&self, kb: Arc<KnowledgeBase>, config: &EngineConfig) -> GameOptions {
        let mut options = GameOptions::from_config(kb, self.seed, config);
        if let Some(rooms) = self.rooms {
            options.generation.rooms = rooms;
        }
        if let Some(objects) = self.objects {
            options.generation.objects = objects;
        }
        if let Some(length) = self.quest_length {
            options.generation.quest_length = length;
        }
        options
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = load_config(&cli.config.clone().unwrap_or_else(config_path));
    let kb = match &cli.kb {
        Some(path) => Arc::new(KnowledgeBase::load(path)?),
        None => KnowledgeBase::builtin(),
    };
    info!("using knowledge base '{}'", kb.id());

    match cli.command {
        Command::Play { game, size } => {
            let game = match game {
                Some(path) => Game::load(&path, kb)?,
                None => make_game(&size.options(kb, &config)).context("while generating a game")?,
            };
            println!("{:^72}", "FABLE".bright_yellow().underline());
            let mut env = LogicEnvironment::new(game, config.policy);
            run_repl(&mut env)
        },
        Command::Make { output, size } => {
            let game = make_game(&size.options(kb, &config)).context("while generating a game")?;
            let path = JsonStoryCompiler.compile(&game, &output)?;
            println!("{}", path.display());
            for (step, command) in game.walkthrough().iter().enumerate() {
                println!("  {}. {command}", step + 1);
            }
            Ok(())
        },
    }
}
