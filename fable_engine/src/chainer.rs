//! Quest synthesis by chaining rules.
//!
//! Forward chaining walks applicable actions from a start state. Backward chaining starts
//! from a goal, regresses it through rules whose added facts overlap an outstanding subgoal,
//! and stops once every subgoal is either true in the start state or about a freshly
//! created variable. Both share one priority frontier keyed by `(depth, breadth, order)`.
//!
//! Breadth counts independent subgoals: every fact a chain adds is tagged with the subgoal
//! that introduced it, and an action whose preconditions use none of those facts opens a
//! new subgoal.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};
use std::sync::Arc;

use log::{debug, info, trace};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::error::{EngineError, EngineResult};
use crate::knowledge::KnowledgeBase;
use crate::logic::{Action, FreshNames, Mapping, Placeholder, Predicate, Proposition, Rule, State, Variable, fixed_mapping};

/// Callback vetoing a candidate action: `(state, previous action, candidate)`.
pub type ActionCheck = Box<dyn Fn(&State, Option<&Action>, &Action) -> bool>;
/// Callback vetoing a fresh variable: `(state, type, fresh variables of that type so far)`.
pub type VariableCheck = Box<dyn Fn(&State, &str, usize) -> bool>;

pub struct ChainingOptions {
    pub backward: bool,
    pub min_depth: usize,
    pub max_depth: usize,
    pub min_breadth: usize,
    pub max_breadth: usize,
    /// Search nodes created before giving up.
    pub max_nodes: usize,
    /// Backward only: unbound placeholders may bind to newly minted variables.
    pub create_variables: bool,
    pub fixed_mapping: Mapping,
    /// Types never minted as fresh variables.
    pub restricted_types: BTreeSet<String>,
    /// Also forbid actions that change facts about existing variables of restricted types.
    pub restrict_existing: bool,
    /// Rule names allowed at each search depth; a missing or empty entry allows every rule.
    pub rules_per_depth: Vec<Vec<String>>,
    pub goal: Option<Vec<Proposition>>,
    /// Shuffles candidate actions when set; otherwise candidates follow rule order.
    pub rng: Option<StdRng>,
    pub check_action: Option<ActionCheck>,
    pub check_new_variable: Option<VariableCheck>,
}

impl Default for ChainingOptions {
    fn default() -> Self {
        Self {
            backward: false,
            min_depth: 1,
            max_depth: 1,
            min_breadth: 1,
            max_breadth: 1,
            max_nodes: 10_000,
            create_variables: false,
            fixed_mapping: fixed_mapping(),
            restricted_types: BTreeSet::new(),
            restrict_existing: false,
            rules_per_depth: Vec::new(),
            goal: None,
            rng: None,
            check_action: None,
            check_new_variable: None,
        }
    }
}

/// A sequence of actions together with the states it passes through.
#[derive(Debug, Clone)]
pub struct Chain {
    pub initial_state: State,
    pub actions: Vec<Action>,
    /// State after each action.
    pub states: Vec<State>,
    /// Independent subgoals opened up to and including each action.
    pub breadths: Vec<usize>,
}

impl Chain {
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn final_state(&self) -> &State {
        self.states.last().unwrap_or(&self.initial_state)
    }

    /// Group the chain by independent subgoal. A part starts where the breadth grows and
    /// collects every later action that builds on it, in chain order.
    pub fn split_by_breadth(&self) -> Vec<Vec<Action>> {
        let mut deps = Dependencies::default();
        let mut parts: Vec<Vec<Action>> = Vec::new();
        for action in &self.actions {
            let subgoal = deps.record(action);
            if subgoal == parts.len() {
                parts.push(Vec::new());
            }
            if let Some(part) = parts.get_mut(subgoal) {
                part.push(action.clone());
            }
        }
        parts
    }
}

/// Facts added along a chain, each tagged with the subgoal that introduced it.
#[derive(Debug, Clone, Default)]
struct Dependencies {
    facts: BTreeMap<Proposition, usize>,
    subgoals: usize,
}

impl Dependencies {
    fn replay<'a>(actions: impl IntoIterator<Item = &'a Action>) -> Self {
        let mut deps = Self::default();
        for action in actions {
            deps.record(action);
        }
        deps
    }

    /// Track `action` and return its subgoal: the earliest one among the facts its
    /// preconditions rely on, or a new one when it relies on none.
    fn record(&mut self, action: &Action) -> usize {
        let joined = action
            .preconditions
            .iter()
            .filter_map(|fact| self.facts.get(fact))
            .min()
            .copied();
        let subgoal = joined.unwrap_or_else(|| {
            self.subgoals += 1;
            self.subgoals - 1
        });
        for fact in action.removed() {
            self.facts.remove(fact);
        }
        for fact in action.added() {
            self.facts.insert(fact.clone(), subgoal);
        }
        subgoal
    }

    fn breadth(&self) -> usize {
        self.subgoals
    }
}

fn breadths_of(actions: &[Action]) -> Vec<usize> {
    let mut deps = Dependencies::default();
    actions
        .iter()
        .map(|action| {
            deps.record(action);
            deps.breadth()
        })
        .collect()
}

/// Ground `predicates` with fresh variables (one per placeholder) that `state` does not use.
/// Placeholders bound by `fixed` keep their constant.
///
/// # Errors
/// Returns [`EngineError::InvalidFact`] if a resulting fact does not type-check.
pub fn goal_from_predicates(predicates: &[Predicate], state: &State, fixed: &Mapping) -> EngineResult<Vec<Proposition>> {
    let mut names = FreshNames::new();
    let mut mapping = fixed.clone();
    for pred in predicates {
        for ph in &pred.parameters {
            if !mapping.contains_key(ph) {
                let var = names.mint(&ph.type_name, |name| state.has_variable_named(name));
                mapping.insert(ph.clone(), var);
            }
        }
    }
    let mut goal = Vec::new();
    for pred in predicates {
        if let Some(fact) = pred.instantiate(&mapping) {
            state.kb().check_fact(&fact)?;
            goal.push(fact);
        }
    }
    Ok(goal)
}

struct Node<T> {
    value: T,
    action: Option<Action>,
    parent: Option<usize>,
    depth: usize,
    deps: Dependencies,
}

impl<T> Node<T> {
    fn breadth(&self) -> usize {
        self.deps.breadth()
    }
}

type Frontier = BinaryHeap<Reverse<(usize, usize, usize, usize)>>;

pub struct Chainer {
    kb: Arc<KnowledgeBase>,
    start: State,
    options: ChainingOptions,
    seq: usize,
}

impl Chainer {
    pub fn new(start: &State, options: ChainingOptions) -> Self {
        Self {
            kb: Arc::clone(start.kb()),
            start: start.clone(),
            options,
            seq: 0,
        }
    }

    /// Run the search and return the first chain meeting every bound.
    ///
    /// # Errors
    /// Returns [`EngineError::QuestGeneration`] when budgets are exhausted without a chain.
    pub fn chain(&mut self) -> EngineResult<Chain> {
        let chain = if self.options.backward {
            self.backward()?
        } else {
            self.forward()?
        };
        info!(
            "{} chain of {} actions: {}",
            if self.options.backward { "backward" } else { "forward" },
            chain.len(),
            chain.actions.iter().map(Action::command).collect::<Vec<_>>().join(", ")
        );
        Ok(chain)
    }

    fn push(&mut self, frontier: &mut Frontier, depth: usize, breadth: usize, idx: usize) {
        let ascending = self.options.goal.is_some() || self.options.backward;
        let primary = if ascending { depth } else { usize::MAX - depth };
        frontier.push(Reverse((primary, breadth, self.seq, idx)));
        self.seq += 1;
    }

    fn rules_at(&self, depth: usize) -> Vec<&Rule> {
        let allowed = self.options.rules_per_depth.get(depth).filter(|names| !names.is_empty());
        self.kb
            .chaining_rules()
            .filter(|rule| allowed.is_none_or(|names| names.contains(&rule.name)))
            .collect()
    }

    fn is_restricted(&self, ty: &str) -> bool {
        let types = self.kb.types();
        self.options.restricted_types.iter().any(|r| types.is_descendant_of(ty, r))
    }

    fn allowed(&self, state: &State, previous: Option<&Action>, action: &Action) -> bool {
        if action.is_noop() {
            return false;
        }
        if self.options.restrict_existing {
            let touched = action.added().into_iter().chain(action.removed());
            let mut vars = touched.flat_map(|fact| fact.arguments.iter());
            if vars.any(|v| self.is_restricted(&v.type_name) && self.start.has_variable(v)) {
                return false;
            }
        }
        self.options
            .check_action
            .as_ref()
            .is_none_or(|check| check(state, previous, action))
    }

    fn too_many(&self, nodes: usize) -> EngineResult<()> {
        if nodes > self.options.max_nodes {
            return Err(EngineError::QuestGeneration(format!(
                "node budget of {} exhausted",
                self.options.max_nodes
            )));
        }
        Ok(())
    }

    fn path<T>(nodes: &[Node<T>], mut idx: usize) -> Vec<usize> {
        let mut out = vec![idx];
        while let Some(parent) = nodes[idx].parent {
            out.push(parent);
            idx = parent;
        }
        out
    }

    /// Actions from `idx` up to the root. Backward nodes list them in execution order.
    fn actions_to_root<T>(nodes: &[Node<T>], idx: usize) -> Vec<Action> {
        Self::path(nodes, idx)
            .into_iter()
            .filter_map(|i| nodes[i].action.clone())
            .collect()
    }

    // forward

    fn forward(&mut self) -> EngineResult<Chain> {
        let mut nodes = vec![Node {
            value: self.start.clone(),
            action: None,
            parent: None,
            depth: 0,
            deps: Dependencies::default(),
        }];
        let mut frontier = Frontier::new();
        self.push(&mut frontier, 0, 0, 0);

        while let Some(Reverse((_, _, _, idx))) = frontier.pop() {
            let (depth, breadth) = (nodes[idx].depth, nodes[idx].breadth());
            if self.forward_terminal(&nodes[idx]) {
                return Ok(self.forward_chain(&nodes, idx));
            }
            if depth >= self.options.max_depth {
                continue;
            }
            let children = self.forward_children(&nodes, idx)?;
            trace!("forward node {idx} (depth {depth}): {} children", children.len());
            if children.is_empty()
                && self.options.goal.is_none()
                && depth >= self.options.min_depth
                && breadth >= self.options.min_breadth
            {
                return Ok(self.forward_chain(&nodes, idx));
            }
            for (action, state, deps) in children {
                let child_breadth = deps.breadth();
                nodes.push(Node {
                    value: state,
                    action: Some(action),
                    parent: Some(idx),
                    depth: depth + 1,
                    deps,
                });
                self.too_many(nodes.len())?;
                self.push(&mut frontier, depth + 1, child_breadth, nodes.len() - 1);
            }
        }
        Err(EngineError::QuestGeneration(
            "forward search exhausted without a chain".into(),
        ))
    }

    fn forward_terminal(&self, node: &Node<State>) -> bool {
        let opts = &self.options;
        if node.depth < opts.min_depth || node.breadth() < opts.min_breadth {
            return false;
        }
        match &opts.goal {
            Some(goal) => node.value.contains_all(goal),
            None => node.depth == opts.max_depth,
        }
    }

    fn forward_children(
        &mut self,
        nodes: &[Node<State>],
        idx: usize,
    ) -> EngineResult<Vec<(Action, State, Dependencies)>> {
        let node = &nodes[idx];
        let mut actions = node
            .value
            .all_applicable_actions(self.rules_at(node.depth), &self.options.fixed_mapping);
        if let Some(rng) = self.options.rng.as_mut() {
            actions.shuffle(rng);
        }

        let ancestors = Self::path(nodes, idx);
        let mut out = Vec::new();
        for action in actions {
            if !self.allowed(&node.value, node.action.as_ref(), &action) {
                continue;
            }
            let Some(next) = node.value.apply_on_copy(&action)? else {
                continue;
            };
            if ancestors.iter().any(|&a| nodes[a].value == next) {
                continue;
            }
            let mut deps = node.deps.clone();
            deps.record(&action);
            if deps.breadth() > self.options.max_breadth {
                continue;
            }
            out.push((action, next, deps));
        }
        Ok(out)
    }

    fn forward_chain(&self, nodes: &[Node<State>], idx: usize) -> Chain {
        let mut path = Self::path(nodes, idx);
        path.reverse();
        let steps = &path[1..];
        Chain {
            initial_state: self.start.clone(),
            actions: steps.iter().filter_map(|&i| nodes[i].action.clone()).collect(),
            states: steps.iter().map(|&i| nodes[i].value.clone()).collect(),
            breadths: steps.iter().map(|&i| nodes[i].breadth()).collect(),
        }
    }

    // backward

    fn backward(&mut self) -> EngineResult<Chain> {
        let Some(goal) = self.options.goal.clone() else {
            return Err(EngineError::QuestGeneration("backward chaining needs a goal".into()));
        };
        for fact in &goal {
            self.kb.check_fact(fact)?;
        }
        let mut nodes = vec![Node {
            value: goal.iter().cloned().collect::<BTreeSet<Proposition>>(),
            action: None,
            parent: None,
            depth: 0,
            deps: Dependencies::default(),
        }];
        let mut frontier = Frontier::new();
        self.push(&mut frontier, 0, 0, 0);

        while let Some(Reverse((_, _, _, idx))) = frontier.pop() {
            let depth = nodes[idx].depth;
            if depth >= self.options.min_depth
                && let Some(chain) = self.backward_terminal(&nodes, idx, &goal)
            {
                return Ok(chain);
            }
            if depth >= self.options.max_depth {
                continue;
            }
            let children = self.backward_children(&nodes, idx)?;
            trace!("backward node {idx} (depth {depth}): {} children", children.len());
            let suffix = Self::actions_to_root(&nodes, idx);
            for (action, subgoals) in children {
                // breadth of the suffix in execution order
                let deps = Dependencies::replay(std::iter::once(&action).chain(&suffix));
                let breadth = deps.breadth();
                nodes.push(Node {
                    value: subgoals,
                    action: Some(action),
                    parent: Some(idx),
                    depth: depth + 1,
                    deps,
                });
                self.too_many(nodes.len())?;
                self.push(&mut frontier, depth + 1, breadth, nodes.len() - 1);
            }
        }
        Err(EngineError::QuestGeneration(
            "backward search exhausted without reaching the start state".into(),
        ))
    }

    fn is_fresh(&self, var: &Variable) -> bool {
        !self.start.has_variable(var)
    }

    fn backward_terminal(&self, nodes: &[Node<BTreeSet<Proposition>>], idx: usize, goal: &[Proposition]) -> Option<Chain> {
        let subgoals = &nodes[idx].value;
        let settled = subgoals
            .iter()
            .all(|fact| self.start.contains(fact) || fact.arguments.iter().any(|v| self.is_fresh(v)));
        if !settled {
            return None;
        }

        let mut initial = self.start.clone();
        initial.add_facts(subgoals.iter().cloned()).ok()?;
        if let Some(name) = initial.violated_constraint() {
            trace!("backward candidate rejected: initial state violates '{name}'");
            return None;
        }

        let actions = Self::actions_to_root(nodes, idx);
        let widest = nodes[idx].breadth();
        if widest < self.options.min_breadth || widest > self.options.max_breadth {
            return None;
        }

        let mut states = Vec::with_capacity(actions.len());
        let mut current = initial.clone();
        for action in &actions {
            current = current.apply_on_copy(action).ok()??;
            states.push(current.clone());
        }
        if !current.contains_all(goal) {
            return None;
        }
        debug!("backward chain settled at depth {}", actions.len());
        Some(Chain {
            initial_state: initial,
            breadths: breadths_of(&actions),
            actions,
            states,
        })
    }

    fn backward_children(
        &mut self,
        nodes: &[Node<BTreeSet<Proposition>>],
        idx: usize,
    ) -> EngineResult<Vec<(Action, BTreeSet<Proposition>)>> {
        let node = &nodes[idx];
        let kb = Arc::clone(&self.kb);
        let types = kb.types();
        let ancestors = Self::path(nodes, idx);
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();

        for rule in self.rules_at(node.depth) {
            for pattern in rule.added_patterns() {
                for fact in &node.value {
                    let Some(partial) = pattern.match_with(fact, &self.options.fixed_mapping, types) else {
                        continue;
                    };
                    for mapping in self.complete_mapping(rule, partial, &node.value) {
                        let action = rule.instantiate(&mapping)?;
                        if !seen.insert(action.clone()) {
                            continue;
                        }
                        if let Some(subgoals) = self.regress(&node.value, &action) {
                            if ancestors.iter().any(|&a| nodes[a].value == subgoals) {
                                continue;
                            }
                            if self.allowed(&self.start, None, &action) {
                                out.push((action, subgoals));
                            }
                        }
                    }
                }
            }
        }
        if let Some(rng) = self.options.rng.as_mut() {
            out.shuffle(rng);
        }
        Ok(out)
    }

    /// Subgoals needed before `action` so that `subgoals` hold after it.
    fn regress(&self, subgoals: &BTreeSet<Proposition>, action: &Action) -> Option<BTreeSet<Proposition>> {
        let added = action.added();
        if added.is_empty() || action.removed().iter().any(|fact| subgoals.contains(*fact)) {
            return None;
        }
        let mut next: BTreeSet<Proposition> = subgoals.iter().filter(|f| !added.contains(f)).cloned().collect();
        next.extend(action.preconditions.iter().cloned());
        let probe = State::from_facts(Arc::clone(&self.kb), next.iter().cloned()).ok()?;
        if let Some(name) = probe.violated_constraint() {
            trace!("regressing '{}' violates '{name}'", action.command());
            return None;
        }
        Some(next)
    }

    /// Bind every placeholder `partial` leaves open, to a start-state or subgoal variable or
    /// (with `create_variables`) to one fresh variable per placeholder.
    fn complete_mapping(&self, rule: &Rule, partial: Mapping, subgoals: &BTreeSet<Proposition>) -> Vec<Mapping> {
        let types = self.kb.types();
        let open: Vec<Placeholder> = rule
            .placeholders()
            .into_iter()
            .filter(|ph| !partial.contains_key(ph))
            .collect();
        if open.is_empty() {
            return vec![partial];
        }

        let mut pool: BTreeSet<&Variable> = self.start.variables().collect();
        pool.extend(subgoals.iter().flat_map(|f| f.arguments.iter()));

        let mut fresh_counts: BTreeMap<String, usize> = BTreeMap::new();
        for var in subgoals.iter().flat_map(|f| f.arguments.iter()) {
            if self.is_fresh(var) {
                *fresh_counts.entry(var.type_name.clone()).or_default() += 1;
            }
        }

        let mut names = FreshNames::new();
        let taken = |name: &str| pool.iter().any(|v| v.name == name);
        let mut candidates: Vec<Vec<Variable>> = Vec::with_capacity(open.len());
        for ph in &open {
            let mut options: Vec<Variable> = pool
                .iter()
                .filter(|v| types.is_descendant_of(&v.type_name, &ph.type_name))
                .map(|v| (*v).clone())
                .collect();
            if self.options.create_variables && !self.is_restricted(&ph.type_name) {
                let count = fresh_counts.get(&ph.type_name).copied().unwrap_or(0);
                let permitted = self
                    .options
                    .check_new_variable
                    .as_ref()
                    .is_none_or(|check| check(&self.start, &ph.type_name, count));
                if permitted {
                    options.push(names.mint(&ph.type_name, taken));
                }
            }
            candidates.push(options);
        }

        let mut out = Vec::new();
        bind_all(&open, &candidates, partial, &mut out);
        out
    }
}

fn bind_all(open: &[Placeholder], candidates: &[Vec<Variable>], mapping: Mapping, out: &mut Vec<Mapping>) {
    let (Some((ph, rest)), Some((vars, rest_vars))) = (open.split_first(), candidates.split_first()) else {
        out.push(mapping);
        return;
    };
    for var in vars {
        if mapping.values().any(|bound| bound == var) {
            continue;
        }
        let mut next = mapping.clone();
        next.insert(ph.clone(), var.clone());
        bind_all(rest, rest_vars, next, out);
    }
}
