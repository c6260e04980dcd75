use pest::iterators::Pair;

use fable_data::{HintDef, InverseDef, SignatureDef, TypeDef};

use super::helpers::unquote;
use super::{Rule, ScriptError};

fn idents(pair: Pair<'_, Rule>) -> Vec<String> {
    pair.into_inner()
        .filter(|p| p.as_rule() == Rule::ident)
        .map(|p| p.as_str().to_string())
        .collect()
}

pub(super) fn parse_type_pair(pair: Pair<'_, Rule>) -> Result<TypeDef, ScriptError> {
    let mut name = None;
    let mut parents = Vec::new();
    for p in pair.into_inner() {
        match p.as_rule() {
            Rule::ident => name = Some(p.as_str().to_string()),
            Rule::type_list => parents = idents(p),
            _ => {},
        }
    }
    Ok(TypeDef {
        name: name.ok_or(ScriptError::Shape("type without name"))?,
        parents,
    })
}

pub(super) fn parse_predicate_pair(pair: Pair<'_, Rule>) -> Result<SignatureDef, ScriptError> {
    let mut name = None;
    let mut types = Vec::new();
    for p in pair.into_inner() {
        match p.as_rule() {
            Rule::ident => name = Some(p.as_str().to_string()),
            Rule::type_list => types = idents(p),
            _ => {},
        }
    }
    Ok(SignatureDef {
        name: name.ok_or(ScriptError::Shape("predicate without name"))?,
        types,
    })
}

pub(super) fn parse_inverse_pair(pair: Pair<'_, Rule>) -> Result<InverseDef, ScriptError> {
    let mut names = pair.into_inner().filter(|p| p.as_rule() == Rule::rule_name);
    let rule = names.next().ok_or(ScriptError::Shape("inverse without rule"))?;
    let inverse = names.next().ok_or(ScriptError::Shape("inverse without counterpart"))?;
    Ok(InverseDef {
        rule: rule.as_str().to_string(),
        inverse: inverse.as_str().to_string(),
    })
}

pub(super) fn parse_hint_pair(pair: Pair<'_, Rule>) -> Result<HintDef, ScriptError> {
    let mut type_name = None;
    let mut text = None;
    for p in pair.into_inner() {
        match p.as_rule() {
            Rule::ident => type_name = Some(p.as_str().to_string()),
            Rule::string => text = Some(unquote(p)?),
            _ => {},
        }
    }
    Ok(HintDef {
        type_name: type_name.ok_or(ScriptError::Shape("hint without type"))?,
        text: text.ok_or(ScriptError::Shape("hint without text"))?,
    })
}
