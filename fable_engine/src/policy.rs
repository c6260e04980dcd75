//! Winning-policy search.
//!
//! Uniform-cost search over (state, quest trackers). Nodes are ordered by
//! `(depth, -progress, insertion order)`, so among plans of equal length the one that
//! advances more quests at once is preferred and ties resolve in rule order.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashSet};

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use variantly::Variantly;

use crate::logic::{Action, Proposition, State, fixed_mapping};
use crate::progression::{QuestStatus, QuestTracker};
use crate::quest::Quest;

/// Search budgets for the winning policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyOptions {
    pub max_depth: usize,
    pub max_nodes: usize,
}

impl Default for PolicyOptions {
    fn default() -> Self {
        Self {
            max_depth: 32,
            max_nodes: 50_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Variantly)]
pub enum PolicyOutcome {
    /// A shortest winning action sequence (empty when already won).
    Found(Vec<Action>),
    /// The whole bounded search space was explored without a win.
    Unreachable,
    /// A depth or node budget was hit first.
    Unknown,
}

struct Node {
    state: State,
    trackers: Vec<QuestTracker>,
    parent: Option<usize>,
    action: Option<Action>,
    depth: usize,
}

fn is_goal(quests: &[Quest], trackers: &[QuestTracker]) -> bool {
    trackers
        .iter()
        .zip(quests)
        .all(|(t, q)| q.win_events.is_empty() || t.status.is_completed())
}

fn progress(trackers: &[QuestTracker]) -> usize {
    trackers.iter().map(QuestTracker::progress_score).sum()
}

fn path(nodes: &[Node], mut idx: usize) -> Vec<Action> {
    let mut actions = Vec::new();
    while let Some(parent) = nodes[idx].parent {
        if let Some(action) = &nodes[idx].action {
            actions.push(action.clone());
        }
        idx = parent;
    }
    actions.reverse();
    actions
}

/// Find the shortest action sequence from `state` that completes every pending quest with
/// win events without firing a fail event on the way.
pub fn winning_policy(
    state: &State,
    quests: &[Quest],
    trackers: &[QuestTracker],
    options: &PolicyOptions,
) -> PolicyOutcome {
    if trackers.iter().any(|t| t.status.is_failed()) {
        return PolicyOutcome::Unreachable;
    }
    if is_goal(quests, trackers) {
        return PolicyOutcome::Found(Vec::new());
    }

    let kb = state.kb();
    let fixed = fixed_mapping();
    let mut nodes = vec![Node {
        state: state.clone(),
        trackers: trackers.to_vec(),
        parent: None,
        action: None,
        depth: 0,
    }];
    let mut visited: HashSet<(BTreeSet<Proposition>, Vec<QuestTracker>)> = HashSet::new();
    visited.insert((state.fact_set().clone(), trackers.to_vec()));
    let mut frontier = BinaryHeap::new();
    frontier.push(Reverse((0usize, Reverse(progress(trackers)), 0usize)));
    let mut budget_hit = false;

    while let Some(Reverse((depth, _, idx))) = frontier.pop() {
        if depth >= options.max_depth {
            budget_hit = true;
            continue;
        }
        let actions = nodes[idx].state.all_applicable_actions(kb.chaining_rules(), &fixed);
        trace!("expanding node {idx} at depth {depth}: {} actions", actions.len());
        for action in actions {
            if action.is_noop() {
                continue;
            }
            let Ok(Some(child)) = nodes[idx].state.apply_on_copy(&action) else {
                continue;
            };
            let mut child_trackers = nodes[idx].trackers.clone();
            let mut failed = false;
            for (tracker, quest) in child_trackers.iter_mut().zip(quests) {
                if tracker.progress(quest, &action, &child) == QuestStatus::Failed {
                    failed = true;
                }
            }
            if failed {
                continue;
            }
            if !visited.insert((child.fact_set().clone(), child_trackers.clone())) {
                continue;
            }
            let goal = is_goal(quests, &child_trackers);
            let score = progress(&child_trackers);
            nodes.push(Node {
                state: child,
                trackers: child_trackers,
                parent: Some(idx),
                action: Some(action),
                depth: depth + 1,
            });
            let child_idx = nodes.len() - 1;
            if goal {
                let plan = path(&nodes, child_idx);
                debug!("winning policy of {} actions after {} nodes", plan.len(), nodes.len());
                return PolicyOutcome::Found(plan);
            }
            if nodes.len() >= options.max_nodes {
                debug!("policy search hit the node budget ({})", options.max_nodes);
                return PolicyOutcome::Unknown;
            }
            frontier.push(Reverse((nodes[child_idx].depth, Reverse(score), child_idx)));
        }
    }

    if budget_hit {
        PolicyOutcome::Unknown
    } else {
        PolicyOutcome::Unreachable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::KnowledgeBase;
    use crate::logic::Variable;
    use crate::quest::Event;

    fn fact(name: &str, args: &[(&str, &str)]) -> Proposition {
        Proposition::new(name, args.iter().map(|(n, t)| Variable::new(*n, *t)).collect())
    }

    fn hall() -> State {
        State::from_facts(
            KnowledgeBase::builtin(),
            vec![
                fact("at", &[("P", "P"), ("hall", "r")]),
                fact("at", &[("box", "c"), ("hall", "r")]),
                fact("closed", &[("box", "c")]),
                fact("in", &[("coin", "o"), ("box", "c")]),
            ],
        )
        .unwrap()
    }

    fn run(state: &State, quests: &[Quest], options: &PolicyOptions) -> PolicyOutcome {
        let trackers: Vec<QuestTracker> = quests.iter().map(QuestTracker::new).collect();
        winning_policy(state, quests, &trackers, options)
    }

    #[test]
    fn finds_shortest_plan_for_a_condition() {
        let state = hall();
        let goal = Event::from_conditions([fact("in", &[("coin", "o"), ("I", "I")])]).unwrap();
        let quests = vec![Quest::new(vec![goal], Vec::new()).unwrap()];
        let outcome = run(&state, &quests, &PolicyOptions::default());
        let commands: Vec<String> = outcome.unwrap_found().iter().map(Action::command).collect();
        assert_eq!(commands, vec!["open box", "take coin from box"]);
    }

    #[test]
    fn unreachable_goals_are_proven() {
        let state = hall();
        // nothing can ever lock the box without a key
        let goal = Event::from_conditions([fact("locked", &[("box", "c")])]).unwrap();
        let quests = vec![Quest::new(vec![goal], Vec::new()).unwrap()];
        assert_eq!(run(&state, &quests, &PolicyOptions::default()), PolicyOutcome::Unreachable);
    }

    #[test]
    fn budgets_yield_unknown() {
        let state = hall();
        let goal = Event::from_conditions([fact("in", &[("coin", "o"), ("I", "I")])]).unwrap();
        let quests = vec![Quest::new(vec![goal], Vec::new()).unwrap()];
        let options = PolicyOptions {
            max_depth: 1,
            max_nodes: 100,
        };
        assert_eq!(run(&state, &quests, &options), PolicyOutcome::Unknown);
    }

    #[test]
    fn paths_through_fail_events_are_pruned() {
        let state = hall();
        let open = state
            .all_applicable_actions(state.kb().rules(), &fixed_mapping())
            .into_iter()
            .find(|a| a.command() == "open box")
            .unwrap();
        let goal = Event::from_conditions([fact("in", &[("coin", "o"), ("I", "I")])]).unwrap();
        let trap = Event::new(vec![open], []).unwrap();
        let quests = vec![Quest::new(vec![goal], vec![trap]).unwrap()];
        assert_eq!(run(&state, &quests, &PolicyOptions::default()), PolicyOutcome::Unreachable);
    }
}
