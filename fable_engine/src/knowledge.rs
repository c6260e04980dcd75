//! Knowledge base: the type hierarchy, predicate declarations, rules, constraints,
//! inverse pairs and surface hints a game is built on.
//!
//! A knowledge base is immutable once loaded and is shared between states, worlds and
//! games through an `Arc`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use anyhow::{Context, Result};
use log::info;

use fable_data::KnowledgeBaseDef;

use crate::error::{EngineError, EngineResult};
use crate::logic::{Predicate, Proposition, Rule, Signature, TypeHierarchy};

/// Source of the knowledge base compiled into the engine.
pub const CORE_KB_SOURCE: &str = include_str!("../data/logic/core.twl");

static BUILTIN: LazyLock<Arc<KnowledgeBase>> = LazyLock::new(|| {
    Arc::new(KnowledgeBase::from_source(CORE_KB_SOURCE).expect("embedded core knowledge base is valid"))
});

/// A conjunction of patterns that must never hold in a consistent state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    pub name: String,
    pub pattern: Vec<Predicate>,
}

#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    id: String,
    types: TypeHierarchy,
    /// Declarations indexed by (name, arity).
    signatures: BTreeMap<(String, usize), Vec<Signature>>,
    rules: Vec<Rule>,
    rule_index: BTreeMap<String, usize>,
    constraints: Vec<Constraint>,
    inverses: BTreeMap<String, String>,
    hints: BTreeMap<String, String>,
}

impl KnowledgeBase {
    /// The embedded core knowledge base.
    pub fn builtin() -> Arc<KnowledgeBase> {
        Arc::clone(&BUILTIN)
    }

    /// Parse, validate and build a knowledge base from `.twl` source.
    ///
    /// # Errors
    /// Parse errors carry line and column; semantic errors are reported as
    /// [`EngineError::InvalidKnowledgeBase`].
    pub fn from_source(source: &str) -> EngineResult<Self> {
        let def = fable_script::compile_knowledge_base(source)?;
        Self::from_def(&def)
    }

    /// Build a knowledge base from its definition model.
    ///
    /// # Errors
    /// Returns an error if the definition fails validation.
    pub fn from_def(def: &KnowledgeBaseDef) -> EngineResult<Self> {
        let problems = fable_data::validate_knowledge_base(def);
        if !problems.is_empty() {
            let joined = problems.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ");
            return Err(EngineError::InvalidKnowledgeBase(joined));
        }

        let types = TypeHierarchy::from_defs(&def.types)?;

        let mut signatures: BTreeMap<(String, usize), Vec<Signature>> = BTreeMap::new();
        for sig in &def.predicates {
            signatures
                .entry((sig.name.clone(), sig.types.len()))
                .or_default()
                .push(Signature {
                    name: sig.name.clone(),
                    types: sig.types.clone(),
                });
        }

        let rules: Vec<Rule> = def.rules.iter().map(Rule::from_def).collect();
        let rule_index = rules.iter().enumerate().map(|(i, r)| (r.name.clone(), i)).collect();

        let constraints = def
            .constraints
            .iter()
            .map(|c| Constraint {
                name: c.name.clone(),
                pattern: c.pattern.iter().map(Predicate::from_def).collect(),
            })
            .collect();

        let mut inverses = BTreeMap::new();
        for pair in &def.inverses {
            inverses.insert(pair.rule.clone(), pair.inverse.clone());
            inverses.insert(pair.inverse.clone(), pair.rule.clone());
        }

        let hints = def.hints.iter().map(|h| (h.type_name.clone(), h.text.clone())).collect();

        Ok(Self {
            id: def.id.clone(),
            types,
            signatures,
            rules,
            rule_index,
            constraints,
            inverses,
            hints,
        })
    }

    /// Load a knowledge base from a `.twl` source file or a compiled `.ron` file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).with_context(|| format!("reading knowledge base {}", path.display()))?;
        let kb = if path.extension().and_then(|ext| ext.to_str()) == Some("ron") {
            let def: KnowledgeBaseDef =
                ron::from_str(&raw).with_context(|| format!("parsing compiled knowledge base {}", path.display()))?;
            Self::from_def(&def)
        } else {
            Self::from_source(&raw)
        }
        .with_context(|| format!("loading knowledge base {}", path.display()))?;
        info!(
            "knowledge base '{}' loaded from '{}': {} rules, {} constraints",
            kb.id,
            path.display(),
            kb.rules.len(),
            kb.constraints.len()
        );
        Ok(kb)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn types(&self) -> &TypeHierarchy {
        &self.types
    }

    /// All rules, in declaration order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Look up a rule by name.
    ///
    /// # Errors
    /// Returns [`EngineError::UnknownRule`] if no rule has this name.
    pub fn rule(&self, name: &str) -> EngineResult<&Rule> {
        self.rule_index
            .get(name)
            .map(|&i| &self.rules[i])
            .ok_or_else(|| EngineError::UnknownRule(name.to_string()))
    }

    /// Rules used for chaining and planning (everything but observation rules).
    pub fn chaining_rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(|r| !r.observational)
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// The rule declared as undoing `name`, if any.
    pub fn inverse_rule(&self, name: &str) -> Option<&Rule> {
        let inverse = self.inverses.get(name)?;
        self.rule(inverse).ok()
    }

    /// Surface hint for `ty`, falling back to the nearest ancestor with one.
    pub fn hint(&self, ty: &str) -> Option<&str> {
        if let Some(text) = self.hints.get(ty) {
            return Some(text.as_str());
        }
        self.types
            .ancestors(ty)
            .iter()
            .find_map(|ancestor| self.hints.get(ancestor).map(String::as_str))
    }

    pub fn signatures(&self, name: &str, arity: usize) -> &[Signature] {
        self.signatures
            .get(&(name.to_string(), arity))
            .map_or(&[], Vec::as_slice)
    }

    /// Check that a fact's predicate is declared and its argument types honour a declaration.
    ///
    /// # Errors
    /// Returns [`EngineError::InvalidFact`] naming the fact and the reason.
    pub fn check_fact(&self, fact: &Proposition) -> EngineResult<()> {
        let invalid = |reason: String| EngineError::InvalidFact {
            fact: fact.to_string(),
            reason,
        };
        if let Some(arg) = fact.arguments.iter().find(|a| !self.types.contains(&a.type_name)) {
            return Err(invalid(format!("unknown type '{}' for '{}'", arg.type_name, arg.name)));
        }
        let declared = self.signatures(&fact.name, fact.arguments.len());
        if declared.is_empty() {
            return Err(invalid(format!(
                "predicate '{}/{}' is not declared",
                fact.name,
                fact.arguments.len()
            )));
        }
        let fits = declared.iter().any(|sig| {
            sig.types
                .iter()
                .zip(&fact.arguments)
                .all(|(ty, arg)| self.types.is_descendant_of(&arg.type_name, ty))
        });
        if fits {
            Ok(())
        } else {
            let options = declared.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
            Err(invalid(format!("argument types match none of {options}")))
        }
    }

    /// A copy restricted to the named rules. Inverse pairs survive only when both sides do.
    ///
    /// # Errors
    /// Returns [`EngineError::UnknownRule`] for a name this knowledge base does not define.
    pub fn with_rules(&self, names: &[&str]) -> EngineResult<Self> {
        let mut rules = Vec::new();
        for name in names {
            rules.push(self.rule(name)?.clone());
        }
        let rule_index = rules.iter().enumerate().map(|(i, r)| (r.name.clone(), i)).collect();
        let inverses = self
            .inverses
            .iter()
            .filter(|(a, b)| names.contains(&a.as_str()) && names.contains(&b.as_str()))
            .map(|(a, b)| (a.clone(), b.clone()))
            .collect();
        Ok(Self {
            rules,
            rule_index,
            inverses,
            ..self.clone()
        })
    }
}
