//! The fact store every world, progression and planner works on.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use fable_data::PropositionDef;

use super::rule::{Action, Rule};
use super::term::{Mapping, Placeholder, Predicate, Proposition, Signature, Variable};
use crate::error::EngineResult;
use crate::knowledge::KnowledgeBase;

/// The mapping every rule is instantiated under: the player `P` and the inventory `I`
/// are constants.
pub fn fixed_mapping() -> Mapping {
    let mut mapping = Mapping::new();
    mapping.insert(Placeholder::new("P", "P"), Variable::new("P", "P"));
    mapping.insert(Placeholder::new("I", "I"), Variable::new("I", "I"));
    mapping
}

/// A set of facts with per-signature and per-variable indices.
///
/// Facts are only changed through [`State::add_facts`], [`State::remove_facts`] and
/// [`State::apply`], which keep the indices in sync. Every fact honours a predicate
/// declared by the knowledge base.
#[derive(Clone)]
pub struct State {
    kb: Arc<KnowledgeBase>,
    facts: BTreeSet<Proposition>,
    by_signature: BTreeMap<Signature, BTreeSet<Proposition>>,
    by_variable: BTreeMap<Variable, BTreeSet<Proposition>>,
}

impl State {
    pub fn new(kb: Arc<KnowledgeBase>) -> Self {
        Self {
            kb,
            facts: BTreeSet::new(),
            by_signature: BTreeMap::new(),
            by_variable: BTreeMap::new(),
        }
    }

    /// Build a state holding `facts`.
    ///
    /// # Errors
    /// Returns [`crate::EngineError::InvalidFact`] if a fact does not type-check.
    pub fn from_facts(kb: Arc<KnowledgeBase>, facts: impl IntoIterator<Item = Proposition>) -> EngineResult<Self> {
        let mut state = Self::new(kb);
        state.add_facts(facts)?;
        Ok(state)
    }

    pub fn kb(&self) -> &Arc<KnowledgeBase> {
        &self.kb
    }

    pub fn facts(&self) -> impl Iterator<Item = &Proposition> {
        self.facts.iter()
    }

    pub fn fact_set(&self) -> &BTreeSet<Proposition> {
        &self.facts
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub fn contains(&self, fact: &Proposition) -> bool {
        self.facts.contains(fact)
    }

    pub fn contains_all<'a>(&self, facts: impl IntoIterator<Item = &'a Proposition>) -> bool {
        facts.into_iter().all(|f| self.facts.contains(f))
    }

    fn insert(&mut self, fact: Proposition) -> bool {
        if self.facts.contains(&fact) {
            return false;
        }
        self.by_signature
            .entry(fact.signature())
            .or_default()
            .insert(fact.clone());
        for var in &fact.arguments {
            self.by_variable.entry(var.clone()).or_default().insert(fact.clone());
        }
        self.facts.insert(fact)
    }

    fn erase(&mut self, fact: &Proposition) -> bool {
        if !self.facts.remove(fact) {
            return false;
        }
        let sig = fact.signature();
        if let Some(set) = self.by_signature.get_mut(&sig) {
            set.remove(fact);
            if set.is_empty() {
                self.by_signature.remove(&sig);
            }
        }
        for var in &fact.arguments {
            if let Some(set) = self.by_variable.get_mut(var) {
                set.remove(fact);
                if set.is_empty() {
                    self.by_variable.remove(var);
                }
            }
        }
        true
    }

    /// Add a single fact. Returns whether it was new.
    ///
    /// # Errors
    /// Returns [`crate::EngineError::InvalidFact`] if the fact does not type-check.
    pub fn add_fact(&mut self, fact: Proposition) -> EngineResult<bool> {
        self.kb.check_fact(&fact)?;
        Ok(self.insert(fact))
    }

    /// Add facts atomically: either every fact type-checks and all are added, or none are.
    ///
    /// # Errors
    /// Returns [`crate::EngineError::InvalidFact`] for the first offending fact.
    pub fn add_facts(&mut self, facts: impl IntoIterator<Item = Proposition>) -> EngineResult<()> {
        let facts: Vec<Proposition> = facts.into_iter().collect();
        for fact in &facts {
            self.kb.check_fact(fact)?;
        }
        for fact in facts {
            self.insert(fact);
        }
        Ok(())
    }

    pub fn remove_fact(&mut self, fact: &Proposition) -> bool {
        self.erase(fact)
    }

    pub fn remove_facts<'a>(&mut self, facts: impl IntoIterator<Item = &'a Proposition>) {
        for fact in facts {
            self.erase(fact);
        }
    }

    /// Every variable mentioned by at least one fact.
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.by_variable.keys()
    }

    pub fn has_variable(&self, var: &Variable) -> bool {
        self.by_variable.contains_key(var)
    }

    pub fn has_variable_named(&self, name: &str) -> bool {
        self.by_variable.keys().any(|v| v.name == name)
    }

    /// Variables whose type is `ty` or one of its subtypes.
    pub fn variables_of_type(&self, ty: &str) -> Vec<&Variable> {
        let types = self.kb.types();
        self.by_variable
            .keys()
            .filter(|v| types.is_descendant_of(&v.type_name, ty))
            .collect()
    }

    /// Facts mentioning `var`.
    pub fn facts_with(&self, var: &Variable) -> impl Iterator<Item = &Proposition> {
        self.by_variable.get(var).into_iter().flatten()
    }

    /// Facts of predicate `name`, whatever the argument types.
    pub fn facts_named<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Proposition> {
        let name = name.to_string();
        let start = Signature {
            name: name.clone(),
            types: Vec::new(),
        };
        self.by_signature
            .range(start..)
            .take_while(move |(sig, _)| sig.name == name)
            .flat_map(|(_, facts)| facts.iter())
    }

    pub fn is_applicable(&self, action: &Action) -> bool {
        self.contains_all(&action.preconditions)
    }

    /// Apply `action` atomically. Returns `Ok(false)` and leaves the state untouched when
    /// a precondition is missing.
    ///
    /// # Errors
    /// Returns [`crate::EngineError::InvalidFact`] if an added fact does not type-check;
    /// the state is unchanged.
    pub fn apply(&mut self, action: &Action) -> EngineResult<bool> {
        if !self.is_applicable(action) {
            return Ok(false);
        }
        let added = action.added();
        for fact in &added {
            self.kb.check_fact(fact)?;
        }
        self.remove_facts(action.removed());
        for fact in added {
            self.insert(fact.clone());
        }
        Ok(true)
    }

    /// Apply `action` to a copy; `None` when it is not applicable.
    ///
    /// # Errors
    /// Propagates type errors from [`State::apply`].
    pub fn apply_on_copy(&self, action: &Action) -> EngineResult<Option<State>> {
        let mut next = self.clone();
        Ok(next.apply(action)?.then_some(next))
    }

    fn candidates<'a>(&'a self, pred: &Predicate, mapping: &Mapping) -> Vec<&'a Proposition> {
        let bound = pred
            .parameters
            .iter()
            .filter_map(|ph| mapping.get(ph))
            .filter_map(|var| self.by_variable.get(var))
            .min_by_key(|facts| facts.len());
        let any_bound = pred.parameters.iter().any(|ph| mapping.contains_key(ph));
        match bound {
            Some(facts) => facts.iter().filter(|f| f.name == pred.name).collect(),
            None if any_bound => Vec::new(),
            None => self.facts_named(&pred.name).collect(),
        }
    }

    /// Every extension of `mapping` that matches `pred` against a fact of this state.
    pub fn match_predicate(&self, pred: &Predicate, mapping: &Mapping) -> Vec<Mapping> {
        let types = self.kb.types();
        self.candidates(pred, mapping)
            .into_iter()
            .filter_map(|fact| pred.match_with(fact, mapping, types))
            .collect()
    }

    /// Every consistent, injective extension of `mapping` under which all `preds` hold.
    ///
    /// Predicates are joined most-constrained first. `limit` stops the search early.
    pub fn match_all(&self, preds: &[Predicate], mapping: &Mapping, limit: Option<usize>) -> Vec<Mapping> {
        let mut remaining: Vec<&Predicate> = preds.iter().collect();
        remaining.dedup();
        let mut out = Vec::new();
        self.join(&mut remaining, mapping.clone(), limit, &mut out);
        out
    }

    fn join(&self, remaining: &mut Vec<&Predicate>, mapping: Mapping, limit: Option<usize>, out: &mut Vec<Mapping>) {
        if limit.is_some_and(|n| out.len() >= n) {
            return;
        }
        if remaining.is_empty() {
            out.push(mapping);
            return;
        }
        let mut best: Option<(usize, Vec<Mapping>)> = None;
        for (idx, pred) in remaining.iter().enumerate() {
            let matches = self.match_predicate(pred, &mapping);
            let better = best.as_ref().is_none_or(|(_, current)| matches.len() < current.len());
            if better {
                let empty = matches.is_empty();
                best = Some((idx, matches));
                if empty {
                    break;
                }
            }
        }
        let Some((idx, matches)) = best else { return };
        if matches.is_empty() {
            return;
        }
        let pred = remaining.remove(idx);
        for next in matches {
            self.join(remaining, next, limit, out);
            if limit.is_some_and(|n| out.len() >= n) {
                break;
            }
        }
        remaining.insert(idx, pred);
    }

    /// Every complete mapping under which `rule` is applicable here.
    ///
    /// Preconditions are joined against the indices; placeholders that appear only in
    /// postconditions are bound to existing variables of a compatible type.
    pub fn all_assignments(&self, rule: &Rule, fixed: &Mapping) -> Vec<Mapping> {
        let placeholders = rule.placeholders();
        let start: Mapping = fixed
            .iter()
            .filter(|(ph, _)| placeholders.contains(ph))
            .map(|(ph, v)| (ph.clone(), v.clone()))
            .collect();

        let joined = self.match_all(&rule.preconditions, &start, None);
        let free: Vec<Placeholder> = placeholders.into_iter().filter(|ph| !start.contains_key(ph)).collect();

        let mut out = Vec::new();
        for mapping in joined {
            let unbound: Vec<&Placeholder> = free.iter().filter(|ph| !mapping.contains_key(ph)).collect();
            self.bind_free(&unbound, mapping, &mut out);
        }
        out
    }

    fn bind_free(&self, unbound: &[&Placeholder], mapping: Mapping, out: &mut Vec<Mapping>) {
        let Some((first, rest)) = unbound.split_first() else {
            out.push(mapping);
            return;
        };
        for var in self.variables_of_type(&first.type_name) {
            if mapping.values().any(|v| v == var) {
                continue;
            }
            let mut next = mapping.clone();
            next.insert((*first).clone(), var.clone());
            self.bind_free(rest, next, out);
        }
    }

    /// Every action `rule` can be instantiated into here.
    pub fn all_instantiations(&self, rule: &Rule, fixed: &Mapping) -> Vec<Action> {
        self.all_assignments(rule, fixed)
            .iter()
            .filter_map(|mapping| rule.instantiate(mapping).ok())
            .collect()
    }

    /// Every applicable action over `rules`, in rule order, without duplicates.
    pub fn all_applicable_actions<'a>(&self, rules: impl IntoIterator<Item = &'a Rule>, fixed: &Mapping) -> Vec<Action> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for rule in rules {
            for action in self.all_instantiations(rule, fixed) {
                if self.is_applicable(&action) && seen.insert(action.clone()) {
                    out.push(action);
                }
            }
        }
        out
    }

    /// Name of the first knowledge-base constraint that holds here, if any.
    pub fn violated_constraint(&self) -> Option<&str> {
        self.kb
            .constraints()
            .iter()
            .find(|c| !self.match_all(&c.pattern, &Mapping::new(), Some(1)).is_empty())
            .map(|c| c.name.as_str())
    }

    /// The action that undoes `action`, assuming `self` is the state right after it.
    ///
    /// It instantiates the rule declared as the inverse, is applicable here, and its
    /// added and removed facts mirror those of `action`.
    pub fn inverse_of(&self, action: &Action) -> Option<Action> {
        let rule = self.kb.inverse_rule(&action.name)?;
        let added = action.added();
        let removed = action.removed();
        self.all_instantiations(rule, &fixed_mapping())
            .into_iter()
            .find(|inv| self.is_applicable(inv) && inv.added() == removed && inv.removed() == added)
    }

    pub fn to_defs(&self) -> Vec<PropositionDef> {
        self.facts.iter().map(Proposition::to_def).collect()
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.facts == other.facts
    }
}

impl Eq for State {}

impl Hash for State {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.facts.hash(state);
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.facts.iter().map(ToString::to_string)).finish()
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let facts: Vec<String> = self.facts.iter().map(ToString::to_string).collect();
        write!(f, "{}", facts.join(" & "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;

    fn v(name: &str, ty: &str) -> Variable {
        Variable::new(name, ty)
    }

    fn fact(name: &str, args: &[(&str, &str)]) -> Proposition {
        Proposition::new(name, args.iter().map(|(n, t)| v(n, t)).collect())
    }

    /// Kitchen with an open chest, a carrot on the floor and the player.
    fn kitchen() -> State {
        State::from_facts(
            KnowledgeBase::builtin(),
            vec![
                fact("at", &[("P", "P"), ("kitchen", "r")]),
                fact("at", &[("chest", "c"), ("kitchen", "r")]),
                fact("open", &[("chest", "c")]),
                fact("at", &[("carrot", "f"), ("kitchen", "r")]),
            ],
        )
        .unwrap()
    }

    fn commands(state: &State) -> Vec<String> {
        let kb = Arc::clone(state.kb());
        let mut cmds: Vec<String> = state
            .all_applicable_actions(kb.chaining_rules(), &fixed_mapping())
            .iter()
            .map(Action::command)
            .collect();
        cmds.sort();
        cmds
    }

    #[test]
    fn indices_follow_mutations() {
        let mut state = kitchen();
        let carrot = v("carrot", "f");
        assert_eq!(state.facts_with(&carrot).count(), 1);
        assert_eq!(state.facts_named("at").count(), 3);

        state.remove_fact(&fact("at", &[("carrot", "f"), ("kitchen", "r")]));
        assert_eq!(state.facts_with(&carrot).count(), 0);
        assert!(!state.has_variable(&carrot));
        assert_eq!(state.facts_named("at").count(), 2);
    }

    #[test]
    fn add_facts_is_atomic() {
        let mut state = kitchen();
        let before = state.clone();
        let err = state
            .add_facts(vec![
                fact("closed", &[("chest", "c")]),
                fact("open", &[("kitchen", "r")]),
            ])
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidFact { .. }));
        assert_eq!(state, before);
    }

    #[test]
    fn applicable_actions_in_kitchen() {
        let state = kitchen();
        assert_eq!(commands(&state), vec!["close chest", "take carrot"]);
    }

    #[test]
    fn apply_is_atomic_and_sound() {
        let mut state = kitchen();
        let kb = Arc::clone(state.kb());
        let take = state
            .all_instantiations(kb.rule("take").unwrap(), &fixed_mapping())
            .pop()
            .unwrap();
        let before = state.clone();
        assert!(state.apply(&take).unwrap());
        assert!(state.contains_all(&take.postconditions));
        for f in before.facts() {
            if !state.contains(f) {
                assert!(take.removed().contains(f));
            }
        }
        assert!(!state.apply(&take).unwrap());
        assert_eq!(commands(&state), vec!["close chest", "drop carrot", "eat carrot", "insert carrot into chest"]);
    }

    #[test]
    fn inverse_restores_state() {
        let mut state = kitchen();
        let kb = Arc::clone(state.kb());
        let original = state.clone();
        for name in ["take", "close/c"] {
            let action = state
                .all_instantiations(kb.rule(name).unwrap(), &fixed_mapping())
                .into_iter()
                .find(|a| state.is_applicable(a))
                .unwrap();
            state.apply(&action).unwrap();
            let inverse = state.inverse_of(&action).unwrap();
            assert_eq!(inverse.name, kb.inverse_rule(name).unwrap().name);
            state.apply(&inverse).unwrap();
            assert_eq!(state, original);
        }
    }

    #[test]
    fn constraints_are_detected() {
        let mut state = kitchen();
        assert_eq!(state.violated_constraint(), None);
        state.add_fact(fact("closed", &[("chest", "c")])).unwrap();
        assert_eq!(state.violated_constraint(), Some("c/open-closed"));
    }

    #[test]
    fn enumeration_is_closed_under_renaming() {
        let state = kitchen();
        let mut extended = state.clone();
        extended
            .add_fact(fact("at", &[("stone", "o"), ("cellar", "r")]))
            .unwrap();
        let renamed = State::from_facts(
            KnowledgeBase::builtin(),
            extended.facts().map(|f| {
                let args = f
                    .arguments
                    .iter()
                    .map(|a| if a.name == "stone" { v("pebble", "o") } else { a.clone() })
                    .collect();
                Proposition::new(&f.name, args)
            }),
        )
        .unwrap();
        assert_eq!(commands(&extended), commands(&renamed));
    }
}
