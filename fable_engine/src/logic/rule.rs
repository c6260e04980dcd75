//! Rules (parameterised transitions) and actions (grounded rule instances).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use fable_data::{ActionDef, RuleDef};

use super::term::{Mapping, Placeholder, Predicate, Proposition, Variable};
use super::types::TypeHierarchy;
use crate::error::{EngineError, EngineResult};

static SLOT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{([^{}]+)\}").expect("slot pattern is valid"));

/// A grounded transition: preconditions are consumed and postconditions produced atomically.
///
/// Facts present on both sides are preserved. The command template has one `{variable}` slot
/// per entity it mentions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    pub preconditions: Vec<Proposition>,
    pub postconditions: Vec<Proposition>,
    pub command_template: Option<String>,
}

impl Action {
    /// Build an action; conditions are sorted and deduplicated so equal actions compare equal.
    pub fn new(
        name: impl Into<String>,
        preconditions: impl IntoIterator<Item = Proposition>,
        postconditions: impl IntoIterator<Item = Proposition>,
        command_template: Option<String>,
    ) -> Self {
        let pre: BTreeSet<Proposition> = preconditions.into_iter().collect();
        let post: BTreeSet<Proposition> = postconditions.into_iter().collect();
        Self {
            name: name.into(),
            preconditions: pre.into_iter().collect(),
            postconditions: post.into_iter().collect(),
            command_template,
        }
    }

    /// Facts this action introduces (`post - pre`).
    pub fn added(&self) -> BTreeSet<&Proposition> {
        self.postconditions
            .iter()
            .filter(|f| !self.preconditions.contains(f))
            .collect()
    }

    /// Facts this action consumes (`pre - post`).
    pub fn removed(&self) -> BTreeSet<&Proposition> {
        self.preconditions
            .iter()
            .filter(|f| !self.postconditions.contains(f))
            .collect()
    }

    pub fn is_noop(&self) -> bool {
        self.added().is_empty() && self.removed().is_empty()
    }

    pub fn variables(&self) -> BTreeSet<&Variable> {
        self.preconditions
            .iter()
            .chain(&self.postconditions)
            .flat_map(|f| f.arguments.iter())
            .collect()
    }

    /// Render the command, substituting each `{variable}` slot through `name_of`.
    /// Actions without a template render as their rule name.
    pub fn format_command(&self, name_of: impl Fn(&str) -> String) -> String {
        match &self.command_template {
            Some(template) => SLOT
                .replace_all(template, |caps: &Captures<'_>| name_of(&caps[1]))
                .into_owned(),
            None => self.name.clone(),
        }
    }

    /// The command using raw variable names.
    pub fn command(&self) -> String {
        self.format_command(str::to_string)
    }

    pub fn to_def(&self) -> ActionDef {
        ActionDef {
            name: self.name.clone(),
            preconditions: self.preconditions.iter().map(Proposition::to_def).collect(),
            postconditions: self.postconditions.iter().map(Proposition::to_def).collect(),
            command_template: self.command_template.clone(),
        }
    }

    pub fn from_def(def: &ActionDef) -> Self {
        Self::new(
            &def.name,
            def.preconditions.iter().map(Proposition::from_def),
            def.postconditions.iter().map(Proposition::from_def),
            def.command_template.clone(),
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command())
    }
}

/// A transition pattern over placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub name: String,
    pub preconditions: Vec<Predicate>,
    pub postconditions: Vec<Predicate>,
    pub command_template: Option<String>,
    /// Observation-only rules are admissible commands but never used for chaining or planning.
    pub observational: bool,
}

impl Rule {
    pub fn from_def(def: &RuleDef) -> Self {
        Self {
            name: def.name.clone(),
            preconditions: def.preconditions.iter().map(Predicate::from_def).collect(),
            postconditions: def.postconditions.iter().map(Predicate::from_def).collect(),
            command_template: def.command.clone(),
            observational: def.observational,
        }
    }

    /// Every placeholder, in order of first appearance.
    pub fn placeholders(&self) -> Vec<Placeholder> {
        let mut out: Vec<Placeholder> = Vec::new();
        for pred in self.preconditions.iter().chain(&self.postconditions) {
            for ph in &pred.parameters {
                if !out.contains(ph) {
                    out.push(ph.clone());
                }
            }
        }
        out
    }

    /// Placeholders that appear only in postconditions.
    pub fn post_only_placeholders(&self) -> Vec<Placeholder> {
        let pre: BTreeSet<&Placeholder> = self.preconditions.iter().flat_map(|p| &p.parameters).collect();
        self.placeholders().into_iter().filter(|ph| !pre.contains(ph)).collect()
    }

    /// Postcondition patterns that are not also preconditions.
    pub fn added_patterns(&self) -> impl Iterator<Item = &Predicate> {
        self.postconditions.iter().filter(|p| !self.preconditions.contains(p))
    }

    /// Ground this rule with `mapping`.
    ///
    /// # Errors
    /// Returns [`EngineError::UnboundPlaceholder`] if any placeholder is missing from `mapping`.
    pub fn instantiate(&self, mapping: &Mapping) -> EngineResult<Action> {
        let ground = |preds: &[Predicate]| -> EngineResult<Vec<Proposition>> {
            preds
                .iter()
                .map(|p| {
                    p.instantiate(mapping).ok_or_else(|| {
                        let missing = p
                            .parameters
                            .iter()
                            .find(|ph| !mapping.contains_key(ph))
                            .map_or_else(String::new, |ph| ph.name.clone());
                        EngineError::UnboundPlaceholder {
                            rule: self.name.clone(),
                            placeholder: missing,
                        }
                    })
                })
                .collect()
        };
        let pre = ground(&self.preconditions)?;
        let post = ground(&self.postconditions)?;

        let by_name: BTreeMap<&str, &Variable> = mapping.iter().map(|(ph, v)| (ph.name.as_str(), v)).collect();
        let template = self.command_template.as_ref().map(|template| {
            SLOT.replace_all(template, |caps: &Captures<'_>| match by_name.get(&caps[1]) {
                Some(var) => format!("{{{}}}", var.name),
                None => caps[0].to_string(),
            })
            .into_owned()
        });
        Ok(Action::new(&self.name, pre, post, template))
    }

    /// Recover the mapping that instantiates this rule into `action`, if any.
    pub fn match_action(&self, action: &Action, types: &TypeHierarchy) -> Option<Mapping> {
        if action.name != self.name {
            return None;
        }
        let mut candidates = Vec::new();
        match_all(&self.preconditions, &action.preconditions, Mapping::new(), types, &mut candidates);
        candidates.into_iter().find_map(|partial| {
            let mut full = Vec::new();
            match_all(&self.postconditions, &action.postconditions, partial, types, &mut full);
            full.into_iter()
                .find(|mapping| self.instantiate(mapping).is_ok_and(|a| &a == action))
        })
    }
}

fn match_all(
    preds: &[Predicate],
    facts: &[Proposition],
    mapping: Mapping,
    types: &TypeHierarchy,
    out: &mut Vec<Mapping>,
) {
    let Some((first, rest)) = preds.split_first() else {
        out.push(mapping);
        return;
    };
    for fact in facts {
        if let Some(next) = first.match_with(fact, &mapping, types) {
            match_all(rest, facts, next, types, out);
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = |preds: &[Predicate]| preds.iter().map(ToString::to_string).collect::<Vec<_>>().join(" & ");
        write!(
            f,
            "{} :: {} -> {}",
            self.name,
            side(&self.preconditions),
            side(&self.postconditions)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ph(name: &str, ty: &str) -> Placeholder {
        Placeholder::new(name, ty)
    }

    fn var(name: &str, ty: &str) -> Variable {
        Variable::new(name, ty)
    }

    fn take_rule() -> Rule {
        let at_p = Predicate::new("at", vec![ph("P", "P"), ph("r", "r")]);
        Rule {
            name: "take".into(),
            preconditions: vec![at_p.clone(), Predicate::new("at", vec![ph("o", "o"), ph("r", "r")])],
            postconditions: vec![at_p, Predicate::new("in", vec![ph("o", "o"), ph("I", "I")])],
            command_template: Some("take {o}".into()),
            observational: false,
        }
    }

    fn take_mapping() -> Mapping {
        let mut mapping = Mapping::new();
        mapping.insert(ph("P", "P"), var("P", "P"));
        mapping.insert(ph("r", "r"), var("kitchen", "r"));
        mapping.insert(ph("o", "o"), var("apple", "o"));
        mapping.insert(ph("I", "I"), var("I", "I"));
        mapping
    }

    fn types() -> TypeHierarchy {
        let mut types = TypeHierarchy::new();
        for name in ["P", "I", "r", "o"] {
            types.add(name, &[]).unwrap();
        }
        types
    }

    #[test]
    fn instantiate_grounds_conditions_and_template() {
        let action = take_rule().instantiate(&take_mapping()).unwrap();
        assert_eq!(action.command_template.as_deref(), Some("take {apple}"));
        assert_eq!(action.command(), "take apple");
        assert_eq!(
            action.format_command(|v| if v == "apple" { "red apple".into() } else { v.into() }),
            "take red apple"
        );
        let added: Vec<String> = action.added().iter().map(ToString::to_string).collect();
        let removed: Vec<String> = action.removed().iter().map(ToString::to_string).collect();
        assert_eq!(added, vec!["in(apple, I)"]);
        assert_eq!(removed, vec!["at(apple, kitchen)"]);
        assert_eq!(action.variables().len(), 4);
    }

    #[test]
    fn instantiate_reports_unbound_placeholders() {
        let mut mapping = take_mapping();
        mapping.remove(&ph("o", "o"));
        let err = take_rule().instantiate(&mapping).unwrap_err();
        assert!(matches!(err, EngineError::UnboundPlaceholder { placeholder, .. } if placeholder == "o"));
    }

    #[test]
    fn match_action_recovers_mapping() {
        let rule = take_rule();
        let action = rule.instantiate(&take_mapping()).unwrap();
        let mapping = rule.match_action(&action, &types()).unwrap();
        assert_eq!(mapping, take_mapping());

        let mut other = action.clone();
        other.name = "drop".into();
        assert!(rule.match_action(&other, &types()).is_none());
    }

    #[test]
    fn post_only_placeholders_are_detected() {
        let rule = Rule {
            name: "go".into(),
            preconditions: vec![Predicate::new("at", vec![ph("P", "P"), ph("r", "r")])],
            postconditions: vec![Predicate::new("at", vec![ph("P", "P"), ph("r'", "r")])],
            command_template: None,
            observational: false,
        };
        assert_eq!(rule.post_only_placeholders(), vec![ph("r'", "r")]);
        assert_eq!(rule.to_string(), "go :: at(P, r) -> at(P, r')");
    }

    #[test]
    fn action_def_round_trip() {
        let action = take_rule().instantiate(&take_mapping()).unwrap();
        assert_eq!(Action::from_def(&action.to_def()), action);
    }
}
