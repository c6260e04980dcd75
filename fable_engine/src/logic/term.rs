//! Terms and facts: placeholders, variables, predicates and propositions.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use fable_data::{PatternDef, PlaceholderDef, PropositionDef, VariableDef};

use super::types::TypeHierarchy;

/// A grounded term. Two variables are equal iff their names and types are equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

impl Variable {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }

    pub fn to_def(&self) -> VariableDef {
        VariableDef {
            name: self.name.clone(),
            type_name: self.type_name.clone(),
        }
    }

    pub fn from_def(def: &VariableDef) -> Self {
        Self::new(&def.name, &def.type_name)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A free, typed term inside a rule. The same name within one rule always binds the same value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Placeholder {
    pub name: String,
    pub type_name: String,
}

impl Placeholder {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }

    pub fn from_def(def: &PlaceholderDef) -> Self {
        Self::new(&def.name, &def.type_name)
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Placeholder bindings produced by matching.
pub type Mapping = BTreeMap<Placeholder, Variable>;

/// Predicate name plus argument types; the key of the per-signature state index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Signature {
    pub name: String,
    pub types: Vec<String>,
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.types.join(", "))
    }
}

/// A grounded fact.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Proposition {
    pub name: String,
    pub arguments: Vec<Variable>,
}

impl Proposition {
    pub fn new(name: impl Into<String>, arguments: Vec<Variable>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    pub fn signature(&self) -> Signature {
        Signature {
            name: self.name.clone(),
            types: self.arguments.iter().map(|v| v.type_name.clone()).collect(),
        }
    }

    pub fn mentions(&self, var: &Variable) -> bool {
        self.arguments.contains(var)
    }

    pub fn to_def(&self) -> PropositionDef {
        PropositionDef {
            name: self.name.clone(),
            arguments: self.arguments.iter().map(Variable::to_def).collect(),
        }
    }

    pub fn from_def(def: &PropositionDef) -> Self {
        Self::new(&def.name, def.arguments.iter().map(Variable::from_def).collect())
    }
}

impl fmt::Display for Proposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<&str> = self.arguments.iter().map(|v| v.name.as_str()).collect();
        write!(f, "{}({})", self.name, args.join(", "))
    }
}

/// A fact pattern over placeholders.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Predicate {
    pub name: String,
    pub parameters: Vec<Placeholder>,
}

impl Predicate {
    pub fn new(name: impl Into<String>, parameters: Vec<Placeholder>) -> Self {
        Self {
            name: name.into(),
            parameters,
        }
    }

    pub fn from_def(def: &PatternDef) -> Self {
        Self::new(&def.name, def.arguments.iter().map(Placeholder::from_def).collect())
    }

    /// Extend `mapping` so that this predicate matches `fact`.
    ///
    /// Fails when names or arities differ, an argument's type is not a descendant of the
    /// placeholder's, a placeholder is already bound elsewhere, or the variable is already
    /// bound to a different placeholder.
    pub fn match_with(&self, fact: &Proposition, mapping: &Mapping, types: &TypeHierarchy) -> Option<Mapping> {
        if self.name != fact.name || self.parameters.len() != fact.arguments.len() {
            return None;
        }
        let mut out = mapping.clone();
        for (ph, var) in self.parameters.iter().zip(&fact.arguments) {
            if !types.is_descendant_of(&var.type_name, &ph.type_name) {
                return None;
            }
            match out.get(ph) {
                Some(bound) if bound != var => return None,
                Some(_) => {},
                None => {
                    if out.values().any(|v| v == var) {
                        return None;
                    }
                    out.insert(ph.clone(), var.clone());
                },
            }
        }
        Some(out)
    }

    /// Ground this predicate; `None` if a placeholder is unbound.
    pub fn instantiate(&self, mapping: &Mapping) -> Option<Proposition> {
        let args = self
            .parameters
            .iter()
            .map(|ph| mapping.get(ph).cloned())
            .collect::<Option<Vec<_>>>()?;
        Some(Proposition::new(&self.name, args))
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<&str> = self.parameters.iter().map(|p| p.name.as_str()).collect();
        write!(f, "{}({})", self.name, args.join(", "))
    }
}

/// Type-indexed counter for minting fresh variable names (`c_0`, `k_1`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreshNames {
    counters: BTreeMap<String, usize>,
}

impl FreshNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a variable of `type_name` whose name is not `taken`.
    pub fn mint(&mut self, type_name: &str, taken: impl Fn(&str) -> bool) -> Variable {
        let counter = self.counters.entry(type_name.to_string()).or_insert(0);
        loop {
            let name = format!("{type_name}_{counter}");
            *counter += 1;
            if !taken(&name) {
                return Variable::new(name, type_name);
            }
        }
    }
}
