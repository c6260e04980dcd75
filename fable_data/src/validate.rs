use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use crate::*;

/// Constants every game binds, whether or not the world mentions them.
const FIXED_ENTITIES: [&str; 2] = ["P", "I"];

/// Validation error for malformed or missing references in a game record or knowledge base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    DuplicateId { kind: &'static str, id: String },
    MissingReference { kind: &'static str, id: String, context: String },
    InvalidValue { context: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::DuplicateId { kind, id } => {
                write!(f, "duplicate {kind} id '{id}'")
            },
            ValidationError::MissingReference { kind, id, context } => {
                write!(f, "missing {kind} '{id}' ({context})")
            },
            ValidationError::InvalidValue { context } => {
                write!(f, "invalid value ({context})")
            },
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate cross-references and basic invariants in a game record.
///
/// ```
/// use fable_data::{GameDef, PropositionDef, QuestDef, VariableDef, validate_game};
///
/// let var = |name: &str, ty: &str| VariableDef { name: name.into(), type_name: ty.into() };
/// let game = GameDef {
///     kb_id: "core".into(),
///     world: vec![PropositionDef { name: "at".into(), arguments: vec![var("P", "P"), var("r_0", "r")] }],
///     ..GameDef::default()
/// };
/// assert!(validate_game(&game).is_empty());
/// ```
pub fn validate_game(game: &GameDef) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if game.kb_id.trim().is_empty() {
        errors.push(ValidationError::InvalidValue {
            context: "game kb_id missing".to_string(),
        });
    }

    // variable name -> type, as declared by the world facts
    let mut entities: BTreeMap<&str, &str> = BTreeMap::new();
    for fact in &game.world {
        for arg in &fact.arguments {
            match entities.get(arg.name.as_str()) {
                Some(existing) if *existing != arg.type_name => {
                    errors.push(ValidationError::InvalidValue {
                        context: format!(
                            "entity '{}' used with types '{}' and '{}'",
                            arg.name, existing, arg.type_name
                        ),
                    });
                },
                Some(_) => {},
                None => {
                    entities.insert(&arg.name, &arg.type_name);
                },
            }
        }
    }
    let mut known: HashSet<String> = entities.keys().map(|name| (*name).to_string()).collect();
    // the player and the inventory exist even when no world fact mentions them
    known.extend(FIXED_ENTITIES.iter().map(|name| (*name).to_string()));

    for (key, info) in &game.infos {
        if key != &info.id {
            errors.push(ValidationError::InvalidValue {
                context: format!("info key '{key}' does not match its id '{}'", info.id),
            });
        }
        check_ref("entity", key, &known, "entity info table".to_string(), &mut errors);
        if let Some(ty) = entities.get(key.as_str())
            && *ty != info.type_name
        {
            errors.push(ValidationError::InvalidValue {
                context: format!("info '{key}' has type '{}' but the world says '{ty}'", info.type_name),
            });
        }
    }

    for (idx, quest) in game.quests.iter().enumerate() {
        let context = format!("quest #{idx}");
        if quest.win_events.is_empty() && quest.fail_events.is_empty() {
            errors.push(ValidationError::InvalidValue {
                context: format!("{context}: no win or fail events"),
            });
        }
        for event in quest.win_events.iter().chain(&quest.fail_events) {
            validate_event(event, &known, &mut errors, &context);
        }
    }

    errors
}

fn validate_event(event: &EventDef, known: &HashSet<String>, errors: &mut Vec<ValidationError>, context: &str) {
    if event.actions.is_empty() && event.conditions.is_empty() {
        errors.push(ValidationError::InvalidValue {
            context: format!("{context}: empty event"),
        });
    }
    if !event.commands.is_empty() && event.commands.len() != event.actions.len() {
        errors.push(ValidationError::InvalidValue {
            context: format!(
                "{context}: {} commands for {} actions",
                event.commands.len(),
                event.actions.len()
            ),
        });
    }
    for action in &event.actions {
        let action_context = format!("{context} action '{}'", action.name);
        for fact in action.preconditions.iter().chain(&action.postconditions) {
            validate_fact(fact, known, errors, &action_context);
        }
    }
    for fact in &event.conditions {
        validate_fact(fact, known, errors, &format!("{context} condition"));
    }
}

fn validate_fact(fact: &PropositionDef, known: &HashSet<String>, errors: &mut Vec<ValidationError>, context: &str) {
    for arg in &fact.arguments {
        check_ref("entity", &arg.name, known, format!("{context}: {}", fact.name), errors);
    }
}

/// Validate a compiled knowledge base: type graph, signatures, rules, inverses and hints.
pub fn validate_knowledge_base(kb: &KnowledgeBaseDef) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let mut types = HashSet::new();
    let mut rules = HashSet::new();
    let mut constraints = HashSet::new();

    track_ids("type", kb.types.iter().map(|t| t.name.as_str()), &mut types, &mut errors);
    track_ids("rule", kb.rules.iter().map(|r| r.name.as_str()), &mut rules, &mut errors);
    track_ids(
        "constraint",
        kb.constraints.iter().map(|c| c.name.as_str()),
        &mut constraints,
        &mut errors,
    );

    for ty in &kb.types {
        for parent in &ty.parents {
            check_ref("type", parent, &types, format!("parent of type '{}'", ty.name), &mut errors);
        }
    }
    if let Some(name) = find_type_cycle(&kb.types) {
        errors.push(ValidationError::InvalidValue {
            context: format!("type '{name}' is its own ancestor"),
        });
    }

    for sig in &kb.predicates {
        for ty in &sig.types {
            check_ref("type", ty, &types, format!("predicate '{}'", sig.name), &mut errors);
        }
    }

    for rule in &kb.rules {
        let context = format!("rule '{}'", rule.name);
        let mut placeholders = BTreeSet::new();
        for pattern in rule.preconditions.iter().chain(&rule.postconditions) {
            validate_pattern(pattern, kb, &types, &mut errors, &context);
            placeholders.extend(pattern.arguments.iter().map(|p| p.name.as_str()));
        }
        if let Some(command) = &rule.command {
            for slot in template_slots(command) {
                if !placeholders.contains(slot) {
                    errors.push(ValidationError::MissingReference {
                        kind: "placeholder",
                        id: slot.to_string(),
                        context: format!("{context} command template"),
                    });
                }
            }
        }
    }

    for constraint in &kb.constraints {
        let context = format!("constraint '{}'", constraint.name);
        if constraint.pattern.is_empty() {
            errors.push(ValidationError::InvalidValue {
                context: format!("{context}: empty pattern"),
            });
        }
        for pattern in &constraint.pattern {
            validate_pattern(pattern, kb, &types, &mut errors, &context);
        }
    }

    for inverse in &kb.inverses {
        let context = format!("inverse '{} :: {}'", inverse.rule, inverse.inverse);
        check_ref("rule", &inverse.rule, &rules, context.clone(), &mut errors);
        check_ref("rule", &inverse.inverse, &rules, context, &mut errors);
    }

    for hint in &kb.hints {
        check_ref("type", &hint.type_name, &types, "surface hint".to_string(), &mut errors);
    }

    errors
}

fn validate_pattern(
    pattern: &PatternDef,
    kb: &KnowledgeBaseDef,
    types: &HashSet<String>,
    errors: &mut Vec<ValidationError>,
    context: &str,
) {
    for arg in &pattern.arguments {
        check_ref(
            "type",
            &arg.type_name,
            types,
            format!("{context}: placeholder '{}'", arg.name),
            errors,
        );
    }
    let declared = kb
        .predicates
        .iter()
        .any(|sig| sig.name == pattern.name && sig.types.len() == pattern.arguments.len());
    if !declared {
        errors.push(ValidationError::MissingReference {
            kind: "predicate",
            id: format!("{}/{}", pattern.name, pattern.arguments.len()),
            context: context.to_string(),
        });
    }
}

/// Extract the `{slot}` names from a command template.
pub fn template_slots(template: &str) -> Vec<&str> {
    let mut slots = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else { break };
        slots.push(&after[..end]);
        rest = &after[end + 1..];
    }
    slots
}

fn find_type_cycle(types: &[TypeDef]) -> Option<String> {
    let parents: BTreeMap<&str, &[String]> = types.iter().map(|t| (t.name.as_str(), t.parents.as_slice())).collect();
    for ty in types {
        let mut stack: Vec<&str> = ty.parents.iter().map(String::as_str).collect();
        let mut seen = BTreeSet::new();
        while let Some(current) = stack.pop() {
            if current == ty.name {
                return Some(ty.name.clone());
            }
            if seen.insert(current)
                && let Some(next) = parents.get(current)
            {
                stack.extend(next.iter().map(String::as_str));
            }
        }
    }
    None
}

fn track_ids<'a>(
    kind: &'static str,
    ids: impl Iterator<Item = &'a str>,
    set: &mut HashSet<String>,
    errors: &mut Vec<ValidationError>,
) {
    for id in ids {
        if !set.insert(id.to_string()) {
            errors.push(ValidationError::DuplicateId {
                kind,
                id: id.to_string(),
            });
        }
    }
}

fn check_ref(kind: &'static str, id: &str, set: &HashSet<String>, context: String, errors: &mut Vec<ValidationError>) {
    if !set.contains(id) {
        errors.push(ValidationError::MissingReference {
            kind,
            id: id.to_string(),
            context,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str, ty: &str) -> VariableDef {
        VariableDef {
            name: name.into(),
            type_name: ty.into(),
        }
    }

    fn fact(name: &str, args: &[(&str, &str)]) -> PropositionDef {
        PropositionDef {
            name: name.into(),
            arguments: args.iter().map(|(n, t)| var(n, t)).collect(),
        }
    }

    fn placeholder(name: &str, ty: &str) -> PlaceholderDef {
        PlaceholderDef {
            name: name.into(),
            type_name: ty.into(),
        }
    }

    fn base_game() -> GameDef {
        GameDef {
            kb_id: "core".into(),
            world: vec![
                fact("at", &[("P", "P"), ("r_0", "r")]),
                fact("in", &[("carrot", "f"), ("I", "I")]),
            ],
            ..GameDef::default()
        }
    }

    fn base_kb() -> KnowledgeBaseDef {
        KnowledgeBaseDef {
            id: "mini".into(),
            types: vec![
                TypeDef {
                    name: "r".into(),
                    parents: vec![],
                },
                TypeDef {
                    name: "P".into(),
                    parents: vec![],
                },
            ],
            predicates: vec![SignatureDef {
                name: "at".into(),
                types: vec!["P".into(), "r".into()],
            }],
            rules: vec![RuleDef {
                name: "go".into(),
                preconditions: vec![PatternDef {
                    name: "at".into(),
                    arguments: vec![placeholder("P", "P"), placeholder("r", "r")],
                }],
                postconditions: vec![PatternDef {
                    name: "at".into(),
                    arguments: vec![placeholder("P", "P"), placeholder("r'", "r")],
                }],
                command: Some("go to {r'}".into()),
                observational: false,
                line: None,
            }],
            ..KnowledgeBaseDef::default()
        }
    }

    #[test]
    fn valid_game_passes() {
        assert!(validate_game(&base_game()).is_empty());
    }

    #[test]
    fn conflicting_entity_types_are_reported() {
        let mut game = base_game();
        game.world.push(fact("at", &[("carrot", "o"), ("r_0", "r")]));
        let errors = validate_game(&game);
        assert!(
            errors
                .iter()
                .any(|e| matches!(e, ValidationError::InvalidValue { context } if context.contains("carrot")))
        );
    }

    #[test]
    fn quest_events_must_reference_world_entities() {
        let mut game = base_game();
        game.quests.push(QuestDef {
            win_events: vec![EventDef {
                conditions: vec![fact("eaten", &[("apple", "f")])],
                ..EventDef::default()
            }],
            fail_events: vec![],
            reward: 1,
            desc: None,
        });
        let errors = validate_game(&game);
        assert_eq!(
            errors,
            vec![ValidationError::MissingReference {
                kind: "entity",
                id: "apple".into(),
                context: "quest #0 condition: eaten".into(),
            }]
        );
    }

    #[test]
    fn empty_inventory_is_still_a_known_entity() {
        let mut game = base_game();
        game.world.retain(|f| f.name != "in");
        game.world.push(fact("at", &[("carrot", "f"), ("r_0", "r")]));
        game.quests.push(QuestDef {
            win_events: vec![EventDef {
                actions: vec![ActionDef {
                    name: "take".into(),
                    preconditions: vec![
                        fact("at", &[("P", "P"), ("r_0", "r")]),
                        fact("at", &[("carrot", "f"), ("r_0", "r")]),
                    ],
                    postconditions: vec![
                        fact("at", &[("P", "P"), ("r_0", "r")]),
                        fact("in", &[("carrot", "f"), ("I", "I")]),
                    ],
                    command_template: None,
                }],
                ..EventDef::default()
            }],
            fail_events: vec![],
            reward: 1,
            desc: None,
        });
        assert!(validate_game(&game).is_empty());
    }

    #[test]
    fn quest_without_events_is_invalid() {
        let mut game = base_game();
        game.quests.push(QuestDef {
            win_events: vec![],
            fail_events: vec![],
            reward: 1,
            desc: None,
        });
        assert_eq!(validate_game(&game).len(), 1);
    }

    #[test]
    fn info_table_must_match_world() {
        let mut game = base_game();
        game.infos.insert(
            "ghost".into(),
            EntityInfoDef {
                id: "ghost".into(),
                type_name: "o".into(),
                ..EntityInfoDef::default()
            },
        );
        let errors = validate_game(&game);
        assert!(matches!(
            &errors[0],
            ValidationError::MissingReference { kind: "entity", id, .. } if id == "ghost"
        ));
    }

    #[test]
    fn valid_kb_passes() {
        assert!(validate_knowledge_base(&base_kb()).is_empty());
    }

    #[test]
    fn kb_reports_unknown_slots_and_types() {
        let mut kb = base_kb();
        kb.rules[0].command = Some("go to {somewhere}".into());
        kb.types[1].parents.push("thing".into());
        let errors = validate_knowledge_base(&kb);
        assert!(errors.contains(&ValidationError::MissingReference {
            kind: "placeholder",
            id: "somewhere".into(),
            context: "rule 'go' command template".into(),
        }));
        assert!(errors.contains(&ValidationError::MissingReference {
            kind: "type",
            id: "thing".into(),
            context: "parent of type 'P'".into(),
        }));
    }

    #[test]
    fn kb_reports_type_cycles_and_bad_inverses() {
        let mut kb = base_kb();
        kb.types[0].parents.push("P".into());
        kb.types[1].parents.push("r".into());
        kb.inverses.push(InverseDef {
            rule: "go".into(),
            inverse: "come".into(),
        });
        let errors = validate_knowledge_base(&kb);
        assert!(errors.iter().any(|e| matches!(e, ValidationError::InvalidValue { .. })));
        assert!(errors.iter().any(|e| matches!(
            e,
            ValidationError::MissingReference { kind: "rule", id, .. } if id == "come"
        )));
    }

    #[test]
    fn template_slots_are_extracted() {
        assert_eq!(template_slots("take {o} from {c}"), vec!["o", "c"]);
        assert!(template_slots("look").is_empty());
        assert_eq!(template_slots("go {r'"), Vec::<&str>::new());
    }
}
