//! Type hierarchy shared by every fact and rule in a knowledge base.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use rand::Rng;
use rand::seq::IndexedRandom;

use fable_data::TypeDef;

use crate::error::{EngineError, EngineResult};

/// A DAG of named types. Built once when a knowledge base loads and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeHierarchy {
    parents: BTreeMap<String, Vec<String>>,
    children: BTreeMap<String, BTreeSet<String>>,
}

impl TypeHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a hierarchy from definitions. Parents may be declared after their children.
    ///
    /// # Errors
    /// Returns [`EngineError::UnknownType`] if a parent is never declared.
    pub fn from_defs(defs: &[TypeDef]) -> EngineResult<Self> {
        let mut types = Self::new();
        for def in defs {
            types.parents.entry(def.name.clone()).or_default();
            types.children.entry(def.name.clone()).or_default();
        }
        for def in defs {
            for parent in &def.parents {
                types.link(&def.name, parent)?;
            }
        }
        Ok(types)
    }

    /// Declare a type with the given (already declared) parents.
    ///
    /// # Errors
    /// Returns [`EngineError::UnknownType`] if a parent is unknown.
    pub fn add(&mut self, name: &str, parents: &[&str]) -> EngineResult<()> {
        self.parents.entry(name.to_string()).or_default();
        self.children.entry(name.to_string()).or_default();
        for parent in parents {
            self.link(name, parent)?;
        }
        Ok(())
    }

    fn link(&mut self, child: &str, parent: &str) -> EngineResult<()> {
        if !self.contains(parent) {
            return Err(EngineError::UnknownType(parent.to_string()));
        }
        let parents = self.parents.entry(child.to_string()).or_default();
        if !parents.iter().any(|p| p == parent) {
            parents.push(parent.to_string());
        }
        self.children
            .entry(parent.to_string())
            .or_default()
            .insert(child.to_string());
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.parents.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.parents.keys().map(String::as_str)
    }

    pub fn parents_of(&self, name: &str) -> &[String] {
        self.parents.get(name).map_or(&[], Vec::as_slice)
    }

    /// True when `ty` equals `ancestor` or inherits from it.
    pub fn is_descendant_of(&self, ty: &str, ancestor: &str) -> bool {
        if ty == ancestor {
            return true;
        }
        let mut queue: VecDeque<&str> = self.parents_of(ty).iter().map(String::as_str).collect();
        let mut seen = BTreeSet::new();
        while let Some(current) = queue.pop_front() {
            if current == ancestor {
                return true;
            }
            if seen.insert(current) {
                queue.extend(self.parents_of(current).iter().map(String::as_str));
            }
        }
        false
    }

    /// All strict ancestors of `ty`, nearest first.
    pub fn ancestors(&self, ty: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut queue: VecDeque<&str> = self.parents_of(ty).iter().map(String::as_str).collect();
        while let Some(current) = queue.pop_front() {
            if out.iter().any(|seen| seen == current) {
                continue;
            }
            out.push(current.to_string());
            queue.extend(self.parents_of(current).iter().map(String::as_str));
        }
        out
    }

    /// All strict descendants of `ty`, sorted by name.
    pub fn subtypes(&self, ty: &str) -> Vec<String> {
        let mut found = BTreeSet::new();
        let mut stack = vec![ty];
        while let Some(current) = stack.pop() {
            if let Some(children) = self.children.get(current) {
                for child in children {
                    if found.insert(child.clone()) {
                        stack.push(child);
                    }
                }
            }
        }
        found.into_iter().collect()
    }

    /// Draw a subtype of `parent`.
    ///
    /// Types listed in `exceptions` (and their descendants) are never drawn. With `probs`,
    /// each candidate is weighted by its entry (missing entries weigh zero); otherwise the
    /// draw is uniform. Returns `None` when no candidate has positive weight.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        parent: &str,
        rng: &mut R,
        exceptions: &[&str],
        probs: Option<&BTreeMap<String, f64>>,
        include_parent: bool,
    ) -> Option<String> {
        let mut candidates = self.subtypes(parent);
        if include_parent {
            candidates.insert(0, parent.to_string());
        }
        candidates.retain(|ty| !exceptions.iter().any(|ex| self.is_descendant_of(ty, ex)));

        match probs {
            Some(weights) => {
                let weighted: Vec<(String, f64)> = candidates
                    .into_iter()
                    .filter_map(|ty| {
                        let w = weights.get(&ty).copied().unwrap_or(0.0);
                        (w > 0.0).then_some((ty, w))
                    })
                    .collect();
                weighted.choose_weighted(rng, |(_, w)| *w).ok().map(|(ty, _)| ty.clone())
            },
            None => candidates.choose(rng).cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn sample_types() -> TypeHierarchy {
        let mut types = TypeHierarchy::new();
        types.add("t", &[]).unwrap();
        types.add("r", &[]).unwrap();
        types.add("c", &["t"]).unwrap();
        types.add("s", &["t"]).unwrap();
        types.add("o", &["t"]).unwrap();
        types.add("k", &["o"]).unwrap();
        types.add("f", &["o"]).unwrap();
        types
    }

    #[test]
    fn descendant_checks_are_reflexive_and_transitive() {
        let types = sample_types();
        assert!(types.is_descendant_of("k", "k"));
        assert!(types.is_descendant_of("k", "o"));
        assert!(types.is_descendant_of("k", "t"));
        assert!(!types.is_descendant_of("t", "k"));
        assert!(!types.is_descendant_of("r", "t"));
    }

    #[test]
    fn ancestors_and_subtypes() {
        let types = sample_types();
        assert_eq!(types.ancestors("f"), vec!["o".to_string(), "t".to_string()]);
        assert_eq!(types.subtypes("o"), vec!["f".to_string(), "k".to_string()]);
        assert_eq!(types.subtypes("t").len(), 5);
        assert!(types.subtypes("r").is_empty());
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let mut types = TypeHierarchy::new();
        let err = types.add("c", &["t"]).unwrap_err();
        assert!(matches!(err, EngineError::UnknownType(name) if name == "t"));
    }

    #[test]
    fn from_defs_accepts_any_declaration_order() {
        let defs = vec![
            TypeDef {
                name: "k".into(),
                parents: vec!["o".into()],
            },
            TypeDef {
                name: "o".into(),
                parents: vec![],
            },
        ];
        let types = TypeHierarchy::from_defs(&defs).unwrap();
        assert!(types.is_descendant_of("k", "o"));
    }

    #[test]
    fn sample_respects_exceptions_and_weights() {
        let types = sample_types();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let ty = types.sample("t", &mut rng, &["o"], None, false).unwrap();
            assert!(ty == "c" || ty == "s");
        }

        let mut probs = BTreeMap::new();
        probs.insert("f".to_string(), 1.0);
        probs.insert("k".to_string(), 0.0);
        for _ in 0..20 {
            assert_eq!(types.sample("o", &mut rng, &[], Some(&probs), true).as_deref(), Some("f"));
        }
        assert_eq!(types.sample("r", &mut rng, &[], None, false), None);
        assert_eq!(types.sample("r", &mut rng, &[], None, true).as_deref(), Some("r"));
    }
}
