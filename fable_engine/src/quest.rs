//! Events and quests.
//!
//! An [`Event`] is either an ordered action sequence (optionally guarded by extra
//! conditions) or a pure condition set. A [`Quest`] groups win and fail events with a reward.

use std::collections::BTreeSet;

use fable_data::{EventDef, QuestDef};

use crate::error::{EngineError, EngineResult};
use crate::logic::{Action, Proposition};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Event {
    pub actions: Vec<Action>,
    pub conditions: BTreeSet<Proposition>,
}

impl Event {
    /// # Errors
    /// Returns [`EngineError::InvalidQuest`] when both the actions and the conditions are empty.
    pub fn new(actions: Vec<Action>, conditions: impl IntoIterator<Item = Proposition>) -> EngineResult<Self> {
        let conditions: BTreeSet<Proposition> = conditions.into_iter().collect();
        if actions.is_empty() && conditions.is_empty() {
            return Err(EngineError::InvalidQuest(
                "an event needs at least one action or condition".into(),
            ));
        }
        Ok(Self { actions, conditions })
    }

    /// Shorthand for an event that only watches facts.
    ///
    /// # Errors
    /// See [`Event::new`].
    pub fn from_conditions(conditions: impl IntoIterator<Item = Proposition>) -> EngineResult<Self> {
        Self::new(Vec::new(), conditions)
    }

    pub fn is_action_sequence(&self) -> bool {
        !self.actions.is_empty()
    }

    /// Facts that must hold for the event to be observable: the last action's
    /// preconditions plus the explicit conditions.
    pub fn event_condition(&self) -> BTreeSet<Proposition> {
        let mut out = self.conditions.clone();
        if let Some(last) = self.actions.last() {
            out.extend(last.preconditions.iter().cloned());
        }
        out
    }

    /// Facts that hold right after the event: the last action's postconditions plus
    /// the explicit conditions.
    pub fn target_facts(&self) -> BTreeSet<Proposition> {
        let mut out = self.conditions.clone();
        if let Some(last) = self.actions.last() {
            out.extend(last.postconditions.iter().cloned());
        }
        out
    }

    /// Serialise, rendering each action's command through `name_of`.
    pub fn to_def(&self, name_of: &dyn Fn(&str) -> String) -> EventDef {
        EventDef {
            actions: self.actions.iter().map(Action::to_def).collect(),
            conditions: self.conditions.iter().map(Proposition::to_def).collect(),
            commands: self.actions.iter().map(|a| a.format_command(name_of)).collect(),
        }
    }

    /// # Errors
    /// See [`Event::new`].
    pub fn from_def(def: &EventDef) -> EngineResult<Self> {
        Self::new(
            def.actions.iter().map(Action::from_def).collect(),
            def.conditions.iter().map(Proposition::from_def),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Quest {
    pub win_events: Vec<Event>,
    pub fail_events: Vec<Event>,
    pub reward: i32,
    pub desc: Option<String>,
}

impl Quest {
    /// # Errors
    /// Returns [`EngineError::InvalidQuest`] when the quest has no event at all.
    pub fn new(win_events: Vec<Event>, fail_events: Vec<Event>) -> EngineResult<Self> {
        if win_events.is_empty() && fail_events.is_empty() {
            return Err(EngineError::InvalidQuest("a quest needs a win or fail event".into()));
        }
        Ok(Self {
            win_events,
            fail_events,
            reward: 1,
            desc: None,
        })
    }

    #[must_use]
    pub fn with_reward(mut self, reward: i32) -> Self {
        self.reward = reward;
        self
    }

    #[must_use]
    pub fn with_desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = Some(desc.into());
        self
    }

    /// A quest won by replaying `actions` in order.
    ///
    /// # Errors
    /// Returns [`EngineError::InvalidQuest`] for an empty chain.
    pub fn from_actions(actions: Vec<Action>) -> EngineResult<Self> {
        Self::new(vec![Event::new(actions, [])?], Vec::new())
    }

    pub fn has_fail_events(&self) -> bool {
        !self.fail_events.is_empty()
    }

    pub fn to_def(&self, name_of: &dyn Fn(&str) -> String) -> QuestDef {
        QuestDef {
            win_events: self.win_events.iter().map(|e| e.to_def(name_of)).collect(),
            fail_events: self.fail_events.iter().map(|e| e.to_def(name_of)).collect(),
            reward: self.reward,
            desc: self.desc.clone(),
        }
    }

    /// # Errors
    /// Returns [`EngineError::InvalidQuest`] for an event-less quest or an empty event.
    pub fn from_def(def: &QuestDef) -> EngineResult<Self> {
        let events = |defs: &[EventDef]| defs.iter().map(Event::from_def).collect::<EngineResult<Vec<_>>>();
        let mut quest = Self::new(events(&def.win_events)?, events(&def.fail_events)?)?;
        quest.reward = def.reward;
        quest.desc.clone_from(&def.desc);
        Ok(quest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::Variable;

    fn eat(food: &str) -> Action {
        let f = Variable::new(food, "f");
        let inv = Variable::new("I", "I");
        Action::new(
            "eat",
            vec![Proposition::new("in", vec![f.clone(), inv])],
            vec![Proposition::new("eaten", vec![f])],
            Some(format!("eat {{{food}}}")),
        )
    }

    #[test]
    fn empty_events_and_quests_are_rejected() {
        assert!(matches!(Event::new(Vec::new(), []), Err(EngineError::InvalidQuest(_))));
        assert!(matches!(Quest::new(Vec::new(), Vec::new()), Err(EngineError::InvalidQuest(_))));
    }

    #[test]
    fn event_condition_and_targets() {
        let event = Event::new(vec![eat("apple")], []).unwrap();
        assert!(event.is_action_sequence());
        let cond: Vec<String> = event.event_condition().iter().map(ToString::to_string).collect();
        let target: Vec<String> = event.target_facts().iter().map(ToString::to_string).collect();
        assert_eq!(cond, vec!["in(apple, I)"]);
        assert_eq!(target, vec!["eaten(apple)"]);
    }

    #[test]
    fn quest_def_round_trip_renders_commands() {
        let quest = Quest::from_actions(vec![eat("apple")]).unwrap().with_reward(3).with_desc("Snack.");
        let def = quest.to_def(&|id: &str| if id == "apple" { "red apple".into() } else { id.into() });
        assert_eq!(def.win_events[0].commands, vec!["eat red apple"]);
        assert_eq!(def.reward, 3);
        assert_eq!(Quest::from_def(&def).unwrap(), quest);
    }
}
