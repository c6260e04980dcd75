//! Story compiler and interpreter adapters.
//!
//! A [`StoryCompiler`] turns a [`Game`] into a playable story file; a [`StoryInterpreter`]
//! plays one. The only backend here is plain JSON played by the logic engine itself.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use log::info;

use crate::config::debug_enabled;
use crate::env::LogicEnvironment;
use crate::game::Game;
use crate::knowledge::KnowledgeBase;
use crate::policy::PolicyOptions;
use crate::slug::sanitize_slug;

pub trait StoryCompiler {
    /// Compile `game` into `dest_dir`, returning the story file path.
    ///
    /// # Errors
    /// Returns an error if the story cannot be written.
    fn compile(&self, game: &Game, dest_dir: &Path) -> Result<PathBuf>;
}

pub trait StoryInterpreter {
    /// Load a story and return the opening text.
    ///
    /// # Errors
    /// Returns an error if the story cannot be loaded.
    fn start(&mut self, story: &Path) -> Result<String>;

    /// Send one command; returns `(observation, score, done)`.
    ///
    /// # Errors
    /// Returns an error if no story is running.
    fn send(&mut self, command: &str) -> Result<(String, i32, bool)>;
}

/// Writes the game record as JSON, staging it in a temporary directory first.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonStoryCompiler;

impl StoryCompiler for JsonStoryCompiler {
    fn compile(&self, game: &Game, dest_dir: &Path) -> Result<PathBuf> {
        let staging = tempfile::Builder::new()
            .prefix("fable-story-")
            .tempdir()
            .context("creating staging directory")?;
        let file_name = format!("{}.json", sanitize_slug(game.uuid()));
        let staged = staging.path().join(&file_name);
        fs::write(&staged, game.to_json()?).with_context(|| format!("writing '{}'", staged.display()))?;

        fs::create_dir_all(dest_dir).with_context(|| format!("creating '{}'", dest_dir.display()))?;
        let dest = dest_dir.join(&file_name);
        fs::copy(&staged, &dest).with_context(|| format!("copying story to '{}'", dest.display()))?;

        if debug_enabled() {
            let kept = staging.into_path();
            info!("staging directory kept at '{}'", kept.display());
        }
        info!("story compiled to '{}'", dest.display());
        Ok(dest)
    }
}

/// Plays compiled JSON stories through a [`LogicEnvironment`].
pub struct LogicInterpreter {
    kb: Arc<KnowledgeBase>,
    options: PolicyOptions,
    env: Option<LogicEnvironment>,
}

impl LogicInterpreter {
    pub fn new(kb: Arc<KnowledgeBase>, options: PolicyOptions) -> Self {
        Self { kb, options, env: None }
    }

    pub fn environment(&self) -> Option<&LogicEnvironment> {
        self.env.as_ref()
    }

    pub fn environment_mut(&mut self) -> Option<&mut LogicEnvironment> {
        self.env.as_mut()
    }
}

impl StoryInterpreter for LogicInterpreter {
    fn start(&mut self, story: &Path) -> Result<String> {
        let game = Game::load(story, Arc::clone(&self.kb))?;
        let mut env = LogicEnvironment::new(game, self.options);
        let intro = env.reset();
        self.env = Some(env);
        Ok(intro)
    }

    fn send(&mut self, command: &str) -> Result<(String, i32, bool)> {
        let Some(env) = self.env.as_mut() else {
            bail!("no story is running");
        };
        let outcome = env.step(command)?;
        Ok((outcome.observation, outcome.score, outcome.done))
    }
}
