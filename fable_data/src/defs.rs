use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Stable identifier used across game record references.
pub type Id = String;

/// Top-level game record written by the generator and read back by the engine.
///
/// Unknown top-level fields are kept in `extras` so that records produced by newer
/// tools survive a load/save round-trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GameDef {
    #[serde(default = "default_record_version")]
    pub version: u32,
    pub kb_id: String,
    #[serde(default)]
    pub world: Vec<PropositionDef>,
    #[serde(default)]
    pub infos: BTreeMap<Id, EntityInfoDef>,
    #[serde(default)]
    pub quests: Vec<QuestDef>,
    #[serde(default)]
    pub metadata: MetadataDef,
    #[serde(flatten)]
    pub extras: BTreeMap<String, Value>,
}

fn default_record_version() -> u32 {
    1
}

/// A grounded term as serialised: `{ name, type }`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VariableDef {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

/// A grounded fact as serialised: `{ name, arguments: [{ name, type }] }`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PropositionDef {
    pub name: String,
    #[serde(default)]
    pub arguments: Vec<VariableDef>,
}

/// A grounded rule instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDef {
    pub name: String,
    #[serde(default)]
    pub preconditions: Vec<PropositionDef>,
    #[serde(default)]
    pub postconditions: Vec<PropositionDef>,
    #[serde(default)]
    pub command_template: Option<String>,
}

/// An observable event: an ordered action sequence, a set of conditions, or both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EventDef {
    #[serde(default)]
    pub actions: Vec<ActionDef>,
    #[serde(default)]
    pub conditions: Vec<PropositionDef>,
    /// Rendered commands for `actions`, kept for readers that do not run the logic.
    #[serde(default)]
    pub commands: Vec<String>,
}

/// A quest: win events, fail events and a reward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestDef {
    #[serde(default)]
    pub win_events: Vec<EventDef>,
    #[serde(default)]
    pub fail_events: Vec<EventDef>,
    #[serde(default = "default_reward")]
    pub reward: i32,
    #[serde(default)]
    pub desc: Option<String>,
}

fn default_reward() -> i32 {
    1
}

/// Surface information about one entity, produced by the naming grammar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EntityInfoDef {
    pub id: Id,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub adj: Option<String>,
    #[serde(default)]
    pub noun: Option<String>,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub definite: Option<String>,
    #[serde(default)]
    pub indefinite: Option<String>,
    #[serde(default)]
    pub desc: Option<String>,
}

/// Generation metadata. Unknown keys are preserved in `extras`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MetadataDef {
    #[serde(default)]
    pub seeds: BTreeMap<String, u64>,
    #[serde(default)]
    pub walkthrough: Vec<String>,
    #[serde(default)]
    pub objective: String,
    #[serde(default)]
    pub uuid: String,
    #[serde(flatten)]
    pub extras: BTreeMap<String, Value>,
}

/// Compiled knowledge base: types, predicate signatures, rules and metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct KnowledgeBaseDef {
    pub id: String,
    #[serde(default)]
    pub types: Vec<TypeDef>,
    #[serde(default)]
    pub predicates: Vec<SignatureDef>,
    #[serde(default)]
    pub rules: Vec<RuleDef>,
    #[serde(default)]
    pub constraints: Vec<ConstraintDef>,
    #[serde(default)]
    pub inverses: Vec<InverseDef>,
    #[serde(default)]
    pub hints: Vec<HintDef>,
}

/// A type and its direct parents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDef {
    pub name: String,
    #[serde(default)]
    pub parents: Vec<String>,
}

/// A predicate signature declaration, e.g. `at(t, r)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureDef {
    pub name: String,
    #[serde(default)]
    pub types: Vec<String>,
}

/// A typed placeholder inside a rule or constraint pattern.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlaceholderDef {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

/// A predicate pattern, e.g. `at(P, r)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternDef {
    pub name: String,
    #[serde(default)]
    pub arguments: Vec<PlaceholderDef>,
}

/// A state-transition rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDef {
    pub name: String,
    #[serde(default)]
    pub preconditions: Vec<PatternDef>,
    #[serde(default)]
    pub postconditions: Vec<PatternDef>,
    #[serde(default)]
    pub command: Option<String>,
    /// Observation-only rules (look, inventory, examine) are skipped by chaining.
    #[serde(default)]
    pub observational: bool,
    /// 1-based source line, when the rule came from a `.twl` file.
    #[serde(default)]
    pub line: Option<usize>,
}

/// A conjunction that must never hold in a consistent state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintDef {
    pub name: String,
    #[serde(default)]
    pub pattern: Vec<PatternDef>,
}

/// Declares that `inverse` undoes `rule` (and vice versa).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InverseDef {
    pub rule: String,
    pub inverse: String,
}

/// Surface hint for a type (e.g. `c` -> "container").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HintDef {
    #[serde(rename = "type")]
    pub type_name: String,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proposition_uses_type_key() {
        let fact = PropositionDef {
            name: "at".into(),
            arguments: vec![
                VariableDef {
                    name: "P".into(),
                    type_name: "P".into(),
                },
                VariableDef {
                    name: "r_0".into(),
                    type_name: "r".into(),
                },
            ],
        };
        let json = serde_json::to_string(&fact).unwrap();
        assert_eq!(
            json,
            r#"{"name":"at","arguments":[{"name":"P","type":"P"},{"name":"r_0","type":"r"}]}"#
        );
        let back: PropositionDef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fact);
    }

    #[test]
    fn quest_reward_defaults_to_one() {
        let quest: QuestDef = serde_json::from_str(r#"{"win_events": []}"#).unwrap();
        assert_eq!(quest.reward, 1);
        assert!(quest.fail_events.is_empty());
    }

    #[test]
    fn unknown_fields_survive_round_trip() {
        let raw = r#"{
            "kb_id": "core",
            "world": [],
            "grammar_flags": {"only_last_action": true},
            "metadata": {"uuid": "abc", "author": "someone"}
        }"#;
        let game: GameDef = serde_json::from_str(raw).unwrap();
        assert_eq!(game.version, 1);
        assert!(game.extras.contains_key("grammar_flags"));
        assert_eq!(game.metadata.extras.get("author"), Some(&Value::from("someone")));

        let again: GameDef = serde_json::from_str(&serde_json::to_string(&game).unwrap()).unwrap();
        assert_eq!(again, game);
    }
}
