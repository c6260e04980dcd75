//! A complete game: world, quests, entity names and metadata, with JSON persistence.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};
use serde_json::Value;

use fable_data::{GameDef, MetadataDef, validate_game};

use crate::error::{EngineError, EngineResult};
use crate::grammar::EntityInfo;
use crate::knowledge::KnowledgeBase;
use crate::logic::{Action, Proposition};
use crate::quest::Quest;
use crate::world::World;

#[derive(Debug, Clone, PartialEq)]
pub struct Game {
    pub world: World,
    pub quests: Vec<Quest>,
    pub infos: BTreeMap<String, EntityInfo>,
    pub metadata: MetadataDef,
    extras: BTreeMap<String, Value>,
}

impl Game {
    pub fn new(world: World, quests: Vec<Quest>) -> Self {
        Self {
            world,
            quests,
            infos: BTreeMap::new(),
            metadata: MetadataDef::default(),
            extras: BTreeMap::new(),
        }
    }

    pub fn kb(&self) -> &Arc<KnowledgeBase> {
        self.world.kb()
    }

    pub fn kb_id(&self) -> &str {
        self.kb().id()
    }

    /// Display name of an entity: its info name, or the raw id when it has none.
    pub fn name_of(&self, id: &str) -> String {
        self.infos
            .get(id)
            .and_then(|info| info.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    /// The command a player types for `action`.
    pub fn command_for(&self, action: &Action) -> String {
        action.format_command(|id| self.name_of(id))
    }

    pub fn max_score(&self) -> i32 {
        self.quests.iter().filter(|q| !q.win_events.is_empty()).map(|q| q.reward).sum()
    }

    pub fn objective(&self) -> &str {
        &self.metadata.objective
    }

    pub fn walkthrough(&self) -> &[String] {
        &self.metadata.walkthrough
    }

    pub fn uuid(&self) -> &str {
        &self.metadata.uuid
    }

    pub fn to_def(&self) -> GameDef {
        let name_of = |id: &str| self.name_of(id);
        GameDef {
            version: 1,
            kb_id: self.kb_id().to_string(),
            world: self.world.state().to_defs(),
            infos: self.infos.clone(),
            quests: self.quests.iter().map(|q| q.to_def(&name_of)).collect(),
            metadata: self.metadata.clone(),
            extras: self.extras.clone(),
        }
    }

    /// Rebuild a game over `kb`.
    ///
    /// # Errors
    /// Returns [`EngineError::InvalidWorld`] when the record fails validation, or any fact
    /// or quest error raised while rebuilding.
    pub fn from_def(def: &GameDef, kb: Arc<KnowledgeBase>) -> EngineResult<Self> {
        let problems = validate_game(def);
        if !problems.is_empty() {
            let joined = problems.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ");
            return Err(EngineError::InvalidWorld(joined));
        }
        if def.kb_id != kb.id() {
            warn!(
                "game was built for knowledge base '{}', loading it with '{}'",
                def.kb_id,
                kb.id()
            );
        }
        let world = World::from_facts(kb, def.world.iter().map(Proposition::from_def))?;
        let quests = def.quests.iter().map(Quest::from_def).collect::<EngineResult<Vec<_>>>()?;
        Ok(Self {
            world,
            quests,
            infos: def.infos.clone(),
            metadata: def.metadata.clone(),
            extras: def.extras.clone(),
        })
    }

    /// # Errors
    /// Returns an error if serialisation fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.to_def()).context("serializing game record")
    }

    /// # Errors
    /// Returns an error for malformed JSON or an invalid record.
    pub fn from_json(json: &str, kb: Arc<KnowledgeBase>) -> Result<Self> {
        let def: GameDef = serde_json::from_str(json).context("parsing game record")?;
        Ok(Self::from_def(&def, kb)?)
    }

    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json()?).with_context(|| format!("writing game to '{}'", path.display()))?;
        info!("game saved to '{}'", path.display());
        Ok(())
    }

    /// # Errors
    /// Returns an error if the file cannot be read or does not hold a valid game.
    pub fn load(path: &Path, kb: Arc<KnowledgeBase>) -> Result<Self> {
        let json = fs::read_to_string(path).with_context(|| format!("reading game from '{}'", path.display()))?;
        let game = Self::from_json(&json, kb).with_context(|| format!("loading game from '{}'", path.display()))?;
        info!(
            "game '{}' loaded: {} facts, {} quests",
            game.uuid(),
            game.world.state().len(),
            game.quests.len()
        );
        Ok(game)
    }
}
