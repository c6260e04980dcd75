//! Quest tracking at runtime.
//!
//! A [`GameProgression`] owns the live [`State`], one [`QuestTracker`] per quest, the score
//! and the current winning policy. Trackers are small value types so the planner can carry
//! them through its search and replay the exact same monitors.

use std::sync::Arc;

use log::{error, info};
use serde::{Deserialize, Serialize};
use variantly::Variantly;

use fable_data::PropositionDef;

use crate::config::debug_enabled;
use crate::error::EngineResult;
use crate::knowledge::KnowledgeBase;
use crate::logic::{Action, Proposition, State, fixed_mapping};
use crate::policy::{PolicyOptions, PolicyOutcome, winning_policy};
use crate::quest::{Event, Quest};
use crate::world::World;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Variantly)]
pub enum QuestStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

/// Position of every event monitor of one quest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuestTracker {
    pub status: QuestStatus,
    pub win: Vec<usize>,
    pub fail: Vec<usize>,
}

impl QuestTracker {
    pub fn new(quest: &Quest) -> Self {
        Self {
            status: QuestStatus::Pending,
            win: vec![0; quest.win_events.len()],
            fail: vec![0; quest.fail_events.len()],
        }
    }

    /// Re-evaluate the quest against `state` without an action (initial state, restores).
    pub fn observe(&mut self, quest: &Quest, state: &State) -> QuestStatus {
        self.settle(quest, state);
        self.status
    }

    /// Feed `action`, already applied to produce `state`. Returns the status afterwards.
    pub fn progress(&mut self, quest: &Quest, action: &Action, state: &State) -> QuestStatus {
        if self.status.is_pending() {
            for (pointer, event) in self.win.iter_mut().zip(&quest.win_events) {
                *pointer = advance(event, *pointer, action, state);
            }
            for (pointer, event) in self.fail.iter_mut().zip(&quest.fail_events) {
                *pointer = advance(event, *pointer, action, state);
            }
            self.settle(quest, state);
        }
        self.status
    }

    fn settle(&mut self, quest: &Quest, state: &State) {
        if !self.status.is_pending() {
            return;
        }
        let fired = |pointers: &[usize], events: &[Event]| {
            pointers.iter().zip(events).any(|(p, e)| fires(e, *p, state))
        };
        if fired(&self.fail, &quest.fail_events) {
            self.status = QuestStatus::Failed;
        } else if fired(&self.win, &quest.win_events) {
            self.status = QuestStatus::Completed;
        }
    }

    /// How far the win monitors have got; used to order the planner's frontier.
    pub fn progress_score(&self) -> usize {
        match self.status {
            QuestStatus::Completed => 1_000,
            _ => self.win.iter().copied().max().unwrap_or(0),
        }
    }
}

/// An event fires once every action of its sequence has been observed and its
/// explicit conditions hold. Condition-only events have an empty sequence.
fn fires(event: &Event, pointer: usize, state: &State) -> bool {
    pointer == event.actions.len() && state.contains_all(&event.conditions)
}

/// Move an event pointer after `action` has produced `state`.
///
/// The pointer advances on the next expected action; the final step only counts when the
/// explicit conditions hold afterwards. An action that removes a fact added by an
/// already-matched step rewinds the pointer to the earliest such step. Any other action
/// leaves the pointer where it is, so unrelated moves may be interleaved with the sequence.
fn advance(event: &Event, pointer: usize, action: &Action, state: &State) -> usize {
    if let Some(expected) = event.actions.get(pointer)
        && expected == action
    {
        let last = pointer + 1 == event.actions.len();
        return if !last || state.contains_all(&event.conditions) {
            pointer + 1
        } else {
            pointer
        };
    }
    let removed = action.removed();
    event.actions[..pointer.min(event.actions.len())]
        .iter()
        .position(|step| step.added().iter().any(|fact| removed.contains(fact)))
        .unwrap_or(pointer)
}

/// Result of [`GameProgression::update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The action was not applicable; nothing changed.
    Invalid,
    /// The action was applied; lists quests that completed or failed on this step.
    Applied { completed: Vec<usize>, failed: Vec<usize> },
}

/// Serialisable snapshot of a progression, used by save files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressionSnapshot {
    pub facts: Vec<PropositionDef>,
    pub trackers: Vec<QuestTracker>,
    pub score: i32,
    pub moves: usize,
}

#[derive(Debug, Clone)]
pub struct GameProgression {
    state: State,
    quests: Vec<Quest>,
    trackers: Vec<QuestTracker>,
    score: i32,
    moves: usize,
    policy: PolicyOutcome,
    options: PolicyOptions,
}

impl GameProgression {
    /// Start tracking `quests` from `state`. Condition events are evaluated immediately and
    /// quests already complete count toward the score.
    pub fn new(state: State, quests: Vec<Quest>, options: PolicyOptions) -> Self {
        let mut trackers: Vec<QuestTracker> = quests.iter().map(QuestTracker::new).collect();
        let mut score = 0;
        for (tracker, quest) in trackers.iter_mut().zip(&quests) {
            if tracker.observe(quest, &state).is_completed() {
                score += quest.reward;
            }
        }
        let mut progression = Self {
            state,
            quests,
            trackers,
            score,
            moves: 0,
            policy: PolicyOutcome::Unknown,
            options,
        };
        progression.replan(None);
        progression
    }

    /// Rebuild a progression from a snapshot.
    ///
    /// # Errors
    /// Returns [`crate::EngineError::InvalidFact`] if a saved fact does not fit the knowledge base.
    pub fn restore(
        kb: Arc<KnowledgeBase>,
        quests: Vec<Quest>,
        snapshot: &ProgressionSnapshot,
        options: PolicyOptions,
    ) -> EngineResult<Self> {
        let state = State::from_facts(kb, snapshot.facts.iter().map(Proposition::from_def))?;
        let mut trackers = snapshot.trackers.clone();
        trackers.resize_with(quests.len(), || QuestTracker {
            status: QuestStatus::Pending,
            win: Vec::new(),
            fail: Vec::new(),
        });
        for (tracker, quest) in trackers.iter_mut().zip(&quests) {
            tracker.win.resize(quest.win_events.len(), 0);
            tracker.fail.resize(quest.fail_events.len(), 0);
            tracker.observe(quest, &state);
        }
        let mut progression = Self {
            state,
            quests,
            trackers,
            score: snapshot.score,
            moves: snapshot.moves,
            policy: PolicyOutcome::Unknown,
            options,
        };
        progression.replan(None);
        Ok(progression)
    }

    pub fn snapshot(&self) -> ProgressionSnapshot {
        ProgressionSnapshot {
            facts: self.state.to_defs(),
            trackers: self.trackers.clone(),
            score: self.score,
            moves: self.moves,
        }
    }

    /// Apply `action` and re-evaluate every pending quest.
    ///
    /// # Errors
    /// Returns [`crate::EngineError::InvalidFact`] if the action adds an ill-typed fact.
    pub fn update(&mut self, action: &Action) -> EngineResult<UpdateOutcome> {
        if !self.state.apply(action)? {
            return Ok(UpdateOutcome::Invalid);
        }
        self.moves += 1;

        let mut completed = Vec::new();
        let mut failed = Vec::new();
        for (idx, (tracker, quest)) in self.trackers.iter_mut().zip(&self.quests).enumerate() {
            if !tracker.status.is_pending() {
                continue;
            }
            match tracker.progress(quest, action, &self.state) {
                QuestStatus::Completed => {
                    self.score += quest.reward;
                    info!("quest #{idx} completed (+{}), score {}", quest.reward, self.score);
                    completed.push(idx);
                },
                QuestStatus::Failed => {
                    info!("quest #{idx} failed after '{}'", action.command());
                    failed.push(idx);
                },
                QuestStatus::Pending => {},
            }
        }

        if debug_enabled() {
            self.check_consistency();
        }
        self.replan(Some(action));
        Ok(UpdateOutcome::Applied { completed, failed })
    }

    fn replan(&mut self, taken: Option<&Action>) {
        if self.trackers.iter().any(|t| t.status.is_failed()) {
            self.policy = PolicyOutcome::Unreachable;
            return;
        }
        if let (Some(action), PolicyOutcome::Found(plan)) = (taken, &self.policy)
            && plan.first() == Some(action)
        {
            self.policy = PolicyOutcome::Found(plan[1..].to_vec());
            return;
        }
        self.policy = winning_policy(&self.state, &self.quests, &self.trackers, &self.options);
    }

    fn check_consistency(&self) {
        if let Some(name) = self.state.violated_constraint() {
            error!("state violates constraint '{name}' after move {}", self.moves);
        }
        if let Err(err) = World::from_state(self.state.clone()).check_invariants() {
            error!("world invariants broken after move {}: {err}", self.moves);
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn quests(&self) -> &[Quest] {
        &self.quests
    }

    pub fn trackers(&self) -> &[QuestTracker] {
        &self.trackers
    }

    pub fn quest_status(&self, idx: usize) -> Option<QuestStatus> {
        self.trackers.get(idx).map(|t| t.status)
    }

    pub fn score(&self) -> i32 {
        self.score
    }

    pub fn max_score(&self) -> i32 {
        self.quests.iter().filter(|q| !q.win_events.is_empty()).map(|q| q.reward).sum()
    }

    pub fn moves(&self) -> usize {
        self.moves
    }

    fn has_fail_events(&self) -> bool {
        self.quests.iter().any(Quest::has_fail_events)
    }

    /// Every quest that can be won has been won, and none failed.
    pub fn won(&self) -> bool {
        self.trackers.iter().all(|t| !t.status.is_failed())
            && self
                .trackers
                .iter()
                .zip(&self.quests)
                .all(|(t, q)| q.win_events.is_empty() || t.status.is_completed())
    }

    /// A quest failed, or no winning path remains and the game has fail events.
    pub fn lost(&self) -> bool {
        self.trackers.iter().any(|t| t.status.is_failed())
            || (self.policy.is_unreachable() && self.has_fail_events())
    }

    /// No winning path remains in a game without fail events.
    pub fn trapped(&self) -> bool {
        !self.won() && self.policy.is_unreachable() && !self.has_fail_events()
    }

    pub fn done(&self) -> bool {
        self.won() || self.lost() || self.trapped()
    }

    pub fn policy_outcome(&self) -> &PolicyOutcome {
        &self.policy
    }

    /// Shortest action sequence that wins from here; `Some(&[])` once won, `None` when
    /// unreachable or when the search budget ran out.
    pub fn winning_policy(&self) -> Option<&[Action]> {
        match &self.policy {
            PolicyOutcome::Found(plan) => Some(plan),
            _ => None,
        }
    }

    /// Every applicable action, observational ones included, in rule order.
    pub fn valid_actions(&self) -> Vec<Action> {
        self.state
            .all_applicable_actions(self.state.kb().rules(), &fixed_mapping())
    }
}
