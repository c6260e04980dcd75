use pest::iterators::Pair;

use fable_data::{ConstraintDef, PatternDef, PlaceholderDef, RuleDef};

use super::helpers::{inferred_type, unquote};
use super::{Rule, ScriptError};

/// One literal of a conjunction, with its preserved (`$`) marker.
struct Literal {
    preserved: bool,
    pattern: PatternDef,
}

fn parse_placeholder(pair: Pair<'_, Rule>) -> Result<PlaceholderDef, ScriptError> {
    let mut it = pair.into_inner();
    let name = it
        .next()
        .ok_or(ScriptError::Shape("placeholder without name"))?
        .as_str()
        .to_string();
    let type_name = match it.next() {
        Some(ty) => ty.as_str().to_string(),
        None => inferred_type(&name).to_string(),
    };
    Ok(PlaceholderDef { name, type_name })
}

fn parse_literal(pair: Pair<'_, Rule>) -> Result<Literal, ScriptError> {
    let mut preserved = false;
    let mut name = None;
    let mut arguments = Vec::new();
    for p in pair.into_inner() {
        match p.as_rule() {
            Rule::preserved => preserved = true,
            Rule::ident => name = Some(p.as_str().to_string()),
            Rule::placeholder => arguments.push(parse_placeholder(p)?),
            _ => return Err(ScriptError::Shape("unexpected token in literal")),
        }
    }
    Ok(Literal {
        preserved,
        pattern: PatternDef {
            name: name.ok_or(ScriptError::Shape("literal without predicate"))?,
            arguments,
        },
    })
}

fn parse_conjunction(pair: Pair<'_, Rule>) -> Result<Vec<Literal>, ScriptError> {
    pair.into_inner().map(parse_literal).collect()
}

/// Literals of an optional `pre`/`post` wrapper.
fn parse_side(pair: Pair<'_, Rule>) -> Result<Vec<Literal>, ScriptError> {
    match pair.into_inner().next() {
        Some(conj) => parse_conjunction(conj),
        None => Ok(Vec::new()),
    }
}

pub(super) fn parse_rule_pair(pair: Pair<'_, Rule>) -> Result<RuleDef, ScriptError> {
    let line = pair.line_col().0;
    let mut observational = false;
    let mut name = None;
    let mut pre = Vec::new();
    let mut post = Vec::new();
    let mut command = None;
    for p in pair.into_inner() {
        match p.as_rule() {
            Rule::observe => observational = true,
            Rule::rule_name => name = Some(p.as_str().to_string()),
            Rule::pre => pre = parse_side(p)?,
            Rule::post => post = parse_side(p)?,
            Rule::command => {
                let lit = p.into_inner().next().ok_or(ScriptError::Shape("command without string"))?;
                command = Some(unquote(lit)?);
            },
            _ => {},
        }
    }

    let mut preconditions = Vec::new();
    let mut postconditions = Vec::new();
    for lit in pre {
        if lit.preserved {
            postconditions.push(lit.pattern.clone());
        }
        preconditions.push(lit.pattern);
    }
    for lit in post {
        if lit.preserved {
            preconditions.push(lit.pattern.clone());
        }
        postconditions.push(lit.pattern);
    }

    Ok(RuleDef {
        name: name.ok_or(ScriptError::Shape("rule without name"))?,
        preconditions,
        postconditions,
        command,
        observational,
        line: Some(line),
    })
}

pub(super) fn parse_constraint_pair(pair: Pair<'_, Rule>) -> Result<ConstraintDef, ScriptError> {
    let mut name = None;
    let mut pattern = Vec::new();
    for p in pair.into_inner() {
        match p.as_rule() {
            Rule::rule_name => name = Some(p.as_str().to_string()),
            Rule::conjunction => {
                pattern = parse_conjunction(p)?.into_iter().map(|lit| lit.pattern).collect();
            },
            _ => {},
        }
    }
    Ok(ConstraintDef {
        name: name.ok_or(ScriptError::Shape("constraint without name"))?,
        pattern,
    })
}
