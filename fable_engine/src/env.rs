//! Runtime environment: plays a [`Game`] one text command at a time.
//!
//! Commands are matched against the rendered templates of the currently applicable
//! actions, so anything listed by [`LogicEnvironment::admissible_commands`] is accepted
//! verbatim (case and spacing are ignored).

use std::collections::BTreeMap;

use log::{debug, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::game::Game;
use crate::logic::{Action, Proposition};
use crate::policy::PolicyOptions;
use crate::progression::{GameProgression, UpdateOutcome};
use crate::save_files::SavedGame;
use crate::world::{Location, World};

/// Result of one [`LogicEnvironment::step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub observation: String,
    pub score: i32,
    pub done: bool,
}

pub struct LogicEnvironment {
    game: Game,
    options: PolicyOptions,
    progression: Option<GameProgression>,
}

fn normalize(command: &str) -> String {
    command.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

impl LogicEnvironment {
    pub fn new(game: Game, options: PolicyOptions) -> Self {
        Self {
            game,
            options,
            progression: None,
        }
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    /// Start (or restart) the game and describe the starting room.
    pub fn reset(&mut self) -> String {
        let progression = GameProgression::new(self.game.world.state().clone(), self.game.quests.clone(), self.options);
        info!("game '{}' started", self.game.uuid());
        self.progression = Some(progression);
        let mut text = String::new();
        if !self.game.objective().is_empty() {
            text.push_str(self.game.objective());
            text.push_str("\n\n");
        }
        text.push_str(&self.describe_room());
        text
    }

    /// # Errors
    /// Returns [`EngineError::GameNotRunning`] before the first [`reset`](Self::reset).
    pub fn progression(&self) -> EngineResult<&GameProgression> {
        self.progression.as_ref().ok_or(EngineError::GameNotRunning)
    }

    fn actions_by_command(&self) -> EngineResult<BTreeMap<String, Action>> {
        let progression = self.progression()?;
        let mut out = BTreeMap::new();
        for action in progression.valid_actions() {
            out.entry(normalize(&self.game.command_for(&action))).or_insert(action);
        }
        Ok(out)
    }

    /// Commands that are legal right now, sorted.
    ///
    /// # Errors
    /// Returns [`EngineError::GameNotRunning`] before the first reset.
    pub fn admissible_commands(&self) -> EngineResult<Vec<String>> {
        Ok(self.actions_by_command()?.into_keys().collect())
    }

    /// Commands of the current shortest winning policy, if one is known.
    ///
    /// # Errors
    /// Returns [`EngineError::GameNotRunning`] before the first reset.
    pub fn policy_commands(&self) -> EngineResult<Option<Vec<String>>> {
        Ok(self
            .progression()?
            .winning_policy()
            .map(|plan| plan.iter().map(|a| self.game.command_for(a)).collect()))
    }

    /// Facts of the current state.
    ///
    /// # Errors
    /// Returns [`EngineError::GameNotRunning`] before the first reset.
    pub fn facts(&self) -> EngineResult<Vec<Proposition>> {
        Ok(self.progression()?.state().facts().cloned().collect())
    }

    /// Play `command`. Unknown or inapplicable commands leave the game untouched and say so.
    ///
    /// # Errors
    /// Returns [`EngineError::GameNotRunning`] before the first reset, or a fact error raised
    /// by the action.
    pub fn step(&mut self, command: &str) -> EngineResult<StepOutcome> {
        let key = normalize(command);
        let actions = self.actions_by_command()?;
        let progression = self.progression.as_mut().ok_or(EngineError::GameNotRunning)?;
        if progression.done() {
            return Ok(StepOutcome {
                observation: "The game is over.".to_string(),
                score: progression.score(),
                done: true,
            });
        }

        let Some(action) = actions.get(&key) else {
            debug!("{}", EngineError::InvalidCommand(key.clone()));
            return Ok(StepOutcome {
                observation: format!("Invalid command: '{}'.", command.trim()),
                score: progression.score(),
                done: false,
            });
        };

        let (completed, failed) = match progression.update(action)? {
            UpdateOutcome::Applied { completed, failed } => (completed, failed),
            UpdateOutcome::Invalid => (Vec::new(), Vec::new()),
        };
        let mut lines = vec![self.feedback(action)];
        for idx in completed {
            lines.push(format!("Quest complete: {}", self.quest_label(idx)));
        }
        for idx in failed {
            lines.push(format!("Quest failed: {}", self.quest_label(idx)));
        }

        let progression = self.progression()?;
        let (score, max_score, done) = (progression.score(), progression.max_score(), progression.done());
        if done {
            let verdict = if progression.won() {
                "*** You won! ***"
            } else if progression.lost() {
                "*** You lost! ***"
            } else {
                "*** There is no way left to win. ***"
            };
            lines.push(format!("{verdict} Score: {score}/{max_score} in {} moves.", progression.moves()));
        }
        Ok(StepOutcome {
            observation: lines.join("\n"),
            score,
            done,
        })
    }

    fn quest_label(&self, idx: usize) -> String {
        self.game
            .quests
            .get(idx)
            .and_then(|q| q.desc.clone())
            .unwrap_or_else(|| format!("quest #{idx}"))
    }

    fn feedback(&self, action: &Action) -> String {
        match action.name.as_str() {
            "look" => self.describe_room(),
            "inventory" => self.describe_inventory(),
            name if name.starts_with("examine") => action
                .variables()
                .into_iter()
                .filter(|v| !matches!(v.type_name.as_str(), "P" | "I" | "r"))
                .find_map(|v| self.game.infos.get(&v.name).and_then(|info| info.desc.clone()))
                .unwrap_or_else(|| "You see nothing special.".to_string()),
            name if name.starts_with("go/") => self.describe_room(),
            _ => format!("You {}.", self.game.command_for(action)),
        }
    }

    fn current_world(&self) -> Option<World> {
        self.progression
            .as_ref()
            .map(|p| World::from_state(p.state().clone()))
    }

    /// Room name, visible entities and exits of the player's room.
    pub fn describe_room(&self) -> String {
        let Some(world) = self.current_world() else {
            return String::new();
        };
        let Some(room) = world.player_room() else {
            return "You are nowhere.".to_string();
        };
        let mut text = format!("-= {} =-", self.game.name_of(room.id()));
        let visible: Vec<String> = world
            .get_visible_objects_in(room.id())
            .into_iter()
            .map(|entity| {
                let mut name = self.game.name_of(entity.id());
                match &entity.location {
                    Location::In(holder) => name = format!("{name} (in {})", self.game.name_of(holder)),
                    Location::On(holder) => name = format!("{name} (on {})", self.game.name_of(holder)),
                    _ => {},
                }
                for state in ["open", "closed", "locked"] {
                    if entity.is(state) {
                        name = format!("{name} ({state})");
                    }
                }
                name
            })
            .collect();
        if !visible.is_empty() {
            text.push_str(&format!("\nYou see: {}.", visible.join(", ")));
        }
        let exits: Vec<String> = room
            .exits
            .keys()
            .map(|dir| match room.doors.get(dir).and_then(|d| world.entity(d)) {
                Some(door) => format!("{dir} (through {})", self.game.name_of(door.id())),
                None => dir.to_string(),
            })
            .collect();
        if !exits.is_empty() {
            text.push_str(&format!("\nExits: {}.", exits.join(", ")));
        }
        text
    }

    fn describe_inventory(&self) -> String {
        let Some(world) = self.current_world() else {
            return String::new();
        };
        let held: Vec<String> = world.inventory().iter().map(|e| self.game.name_of(e.id())).collect();
        if held.is_empty() {
            "You are empty-handed.".to_string()
        } else {
            format!("You are carrying: {}.", held.join(", "))
        }
    }

    /// Snapshot the running game for a save slot.
    ///
    /// # Errors
    /// Returns [`EngineError::GameNotRunning`] before the first reset.
    pub fn save(&self) -> EngineResult<SavedGame> {
        Ok(SavedGame::new(self.game.uuid(), self.progression()?.snapshot()))
    }

    /// Resume from a save slot.
    ///
    /// # Errors
    /// Returns a fact error when the saved state does not fit the knowledge base.
    pub fn load(&mut self, saved: &SavedGame) -> EngineResult<()> {
        if saved.game_uuid != self.game.uuid() {
            warn!(
                "save belongs to game '{}', restoring it into '{}'",
                saved.game_uuid,
                self.game.uuid()
            );
        }
        let progression = GameProgression::restore(
            std::sync::Arc::clone(self.game.kb()),
            self.game.quests.clone(),
            &saved.progression,
            self.options,
        )?;
        info!("restored save at move {}", progression.moves());
        self.progression = Some(progression);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::KnowledgeBase;
    use crate::logic::{State, Variable, fixed_mapping};
    use crate::quest::Quest;
    use fable_data::EntityInfoDef;

    fn fact(name: &str, args: &[(&str, &str)]) -> Proposition {
        Proposition::new(name, args.iter().map(|(n, t)| Variable::new(*n, *t)).collect())
    }

    fn chest_game() -> Game {
        let facts = vec![
            fact("at", &[("P", "P"), ("r_0", "r")]),
            fact("at", &[("c_0", "c"), ("r_0", "r")]),
            fact("closed", &[("c_0", "c")]),
            fact("in", &[("o_0", "o"), ("c_0", "c")]),
        ];
        let state = State::from_facts(KnowledgeBase::builtin(), facts.clone()).unwrap();
        let open = state
            .all_applicable_actions(state.kb().rules(), &fixed_mapping())
            .into_iter()
            .find(|a| a.name == "open/c")
            .unwrap();
        let opened = state.apply_on_copy(&open).unwrap().unwrap();
        let take = opened
            .all_applicable_actions(opened.kb().rules(), &fixed_mapping())
            .into_iter()
            .find(|a| a.name == "take/c")
            .unwrap();
        let world = World::from_facts(KnowledgeBase::builtin(), facts).unwrap();
        let mut game = Game::new(world, vec![Quest::from_actions(vec![open, take]).unwrap()]);
        for (id, ty, name) in [("r_0", "r", "dusty attic"), ("c_0", "c", "old chest"), ("o_0", "o", "shiny coin")] {
            game.infos.insert(
                id.into(),
                EntityInfoDef {
                    id: id.into(),
                    type_name: ty.into(),
                    name: Some(name.into()),
                    desc: Some(format!("It is a {name}.")),
                    ..EntityInfoDef::default()
                },
            );
        }
        game
    }

    #[test]
    fn stepping_before_reset_is_an_error() {
        let mut env = LogicEnvironment::new(chest_game(), PolicyOptions::default());
        assert!(matches!(env.step("look"), Err(EngineError::GameNotRunning)));
        assert!(matches!(env.admissible_commands(), Err(EngineError::GameNotRunning)));
    }

    #[test]
    fn playing_the_walkthrough_wins() {
        let mut env = LogicEnvironment::new(chest_game(), PolicyOptions::default());
        let intro = env.reset();
        assert!(intro.contains("-= dusty attic =-"));
        assert!(intro.contains("old chest (closed)"));
        assert_eq!(
            env.policy_commands().unwrap(),
            Some(vec!["open old chest".to_string(), "take shiny coin from old chest".to_string()])
        );

        let first = env.step("Open  OLD chest").unwrap();
        assert_eq!(first.score, 0);
        assert!(!first.done);
        let second = env.step("take shiny coin from old chest").unwrap();
        assert_eq!(second.score, 1);
        assert!(second.done);
        assert!(second.observation.contains("You won"));
    }

    #[test]
    fn invalid_commands_change_nothing() {
        let mut env = LogicEnvironment::new(chest_game(), PolicyOptions::default());
        env.reset();
        let before = env.facts().unwrap();
        let outcome = env.step("dance wildly").unwrap();
        assert!(outcome.observation.starts_with("Invalid command"));
        assert_eq!(outcome.score, 0);
        assert!(!outcome.done);
        assert_eq!(env.facts().unwrap(), before);
        assert_eq!(env.progression().unwrap().moves(), 0);
    }

    #[test]
    fn admissible_commands_use_names() {
        let mut env = LogicEnvironment::new(chest_game(), PolicyOptions::default());
        env.reset();
        let commands = env.admissible_commands().unwrap();
        assert!(commands.contains(&"open old chest".to_string()));
        assert!(commands.contains(&"look".to_string()));
        assert!(!commands.iter().any(|c| c.contains("c_0")));
    }

    #[test]
    fn saves_restore_the_same_position() {
        let mut env = LogicEnvironment::new(chest_game(), PolicyOptions::default());
        env.reset();
        env.step("open old chest").unwrap();
        let saved = env.save().unwrap();

        let mut other = LogicEnvironment::new(chest_game(), PolicyOptions::default());
        other.reset();
        other.load(&saved).unwrap();
        assert_eq!(other.facts().unwrap(), env.facts().unwrap());
        assert_eq!(other.progression().unwrap().trackers(), env.progression().unwrap().trackers());
        let outcome = other.step("take shiny coin from old chest").unwrap();
        assert!(outcome.done);
    }
}
