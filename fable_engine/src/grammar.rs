//! Naming grammar: surface names for generated entities.
//!
//! This is a deliberately small stand-in for a text generator. [`SimpleGrammar`] draws
//! an adjective and a noun per entity from per-type word lists and guarantees that no two
//! entities share a name.

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;

use fable_data::EntityInfoDef;

use crate::knowledge::KnowledgeBase;
use crate::logic::Variable;

/// Surface information about one entity.
pub type EntityInfo = EntityInfoDef;

pub trait Grammar {
    /// Name and describe `var`.
    fn entity_info(&mut self, var: &Variable, kb: &KnowledgeBase) -> EntityInfo;

    /// A one-line objective for a walkthrough.
    fn objective(&mut self, walkthrough: &[String]) -> String;
}

const ADJECTIVES: &[&str] = &[
    "old", "rusty", "small", "heavy", "dusty", "shiny", "wooden", "battered", "tiny", "green", "red", "blue",
    "plain", "curious", "antique", "sturdy",
];

fn nouns_for(ty: &str) -> &'static [&'static str] {
    match ty {
        "r" => &["kitchen", "bedroom", "cellar", "attic", "study", "pantry", "hallway", "garage", "library", "parlor"],
        "d" => &["door", "gate", "hatch", "portal"],
        "c" => &["chest", "box", "safe", "locker", "crate", "cabinet"],
        "s" => &["table", "shelf", "counter", "workbench", "stand"],
        "k" => &["key", "keycard", "passkey"],
        "f" => &["apple", "carrot", "orange", "loaf", "cheese", "pear"],
        "o" => &["coin", "book", "lamp", "rope", "candle", "map", "spoon"],
        _ => &[],
    }
}

fn indefinite_article(word: &str) -> &'static str {
    if word.starts_with(['a', 'e', 'i', 'o', 'u']) { "an" } else { "a" }
}

pub struct SimpleGrammar {
    rng: StdRng,
    used: BTreeSet<String>,
}

impl SimpleGrammar {
    pub fn new(rng: StdRng) -> Self {
        Self {
            rng,
            used: BTreeSet::new(),
        }
    }

    /// Nouns for `ty`, walking up the hierarchy and ending with the knowledge base hint.
    fn nouns(ty: &str, kb: &KnowledgeBase) -> Vec<String> {
        let mut lineage = vec![ty.to_string()];
        lineage.extend(kb.types().ancestors(ty));
        lineage
            .iter()
            .map(|t| nouns_for(t))
            .find(|words| !words.is_empty())
            .map(|words| words.iter().map(ToString::to_string).collect())
            .or_else(|| kb.hint(ty).map(|hint| vec![hint.to_string()]))
            .unwrap_or_else(|| vec!["thing".to_string()])
    }

    fn unique_name(&mut self, nouns: &[String]) -> (String, String) {
        for _ in 0..32 {
            let noun = nouns.choose(&mut self.rng).cloned().unwrap_or_default();
            let adj = ADJECTIVES.choose(&mut self.rng).copied().unwrap_or("plain");
            let name = format!("{adj} {noun}");
            if self.used.insert(name.clone()) {
                return (adj.to_string(), noun);
            }
        }
        // every draw collided: number the noun instead
        let base = nouns.first().cloned().unwrap_or_default();
        let mut n = 2;
        loop {
            let noun = format!("{base} {n}");
            if self.used.insert(format!("plain {noun}")) {
                return ("plain".to_string(), noun);
            }
            n += 1;
        }
    }
}

impl Grammar for SimpleGrammar {
    fn entity_info(&mut self, var: &Variable, kb: &KnowledgeBase) -> EntityInfo {
        let nouns = Self::nouns(&var.type_name, kb);
        let (adj, noun) = self.unique_name(&nouns);
        let name = format!("{adj} {noun}");
        EntityInfo {
            id: var.name.clone(),
            type_name: var.type_name.clone(),
            desc: Some(format!("It is {} {name}.", indefinite_article(&adj))),
            synonyms: vec![noun.clone()],
            definite: Some("the".to_string()),
            indefinite: Some(indefinite_article(&adj).to_string()),
            adj: Some(adj),
            noun: Some(noun),
            name: Some(name),
        }
    }

    fn objective(&mut self, walkthrough: &[String]) -> String {
        match walkthrough {
            [] => "Explore at your leisure.".to_string(),
            [only] => format!("Your task: {only}."),
            [first, .., last] => {
                let openers = ["First", "To begin", "Start out:"];
                let opener = openers.choose(&mut self.rng).copied().unwrap_or("First");
                format!("{opener} {first}. Then, in {} more steps, finish with: {last}.", walkthrough.len() - 1)
            },
        }
    }
}
