//! Parser for the Fable knowledge-base language.
//!
//! Wraps the Pest-generated grammar with builders that produce a
//! [`KnowledgeBaseDef`] ready for validation or serialisation.

use pest::Parser;
use pest::error::LineColLocation;
use pest_derive::Parser as PestParser;

use fable_data::{KnowledgeBaseDef, ValidationError};

mod decl;
mod helpers;
mod rule;

use decl::{parse_hint_pair, parse_inverse_pair, parse_predicate_pair, parse_type_pair};
use rule::{parse_constraint_pair, parse_rule_pair};

#[derive(PestParser)]
#[grammar = "src/grammar.pest"]
struct KbParser;

/// Errors raised while parsing or compiling a knowledge base.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("parse error at {line}:{col}: {message}")]
    Parse { line: usize, col: usize, message: String },
    #[error("unexpected grammar shape: {0}")]
    Shape(&'static str),
    #[error("invalid knowledge base: {}", helpers::render_errors(.0))]
    Invalid(Vec<ValidationError>),
    #[error("serialisation error: {0}")]
    Ron(#[from] ron::Error),
}

impl ScriptError {
    /// Source position of a parse error, if there is one.
    pub fn position(&self) -> Option<(usize, usize)> {
        match self {
            ScriptError::Parse { line, col, .. } => Some((*line, *col)),
            _ => None,
        }
    }
}

impl From<pest::error::Error<Rule>> for ScriptError {
    fn from(err: pest::error::Error<Rule>) -> Self {
        let (line, col) = match err.line_col {
            LineColLocation::Pos(pos) | LineColLocation::Span(pos, _) => pos,
        };
        ScriptError::Parse {
            line,
            col,
            message: err.variant.message().to_string(),
        }
    }
}

/// Parse knowledge-base source into its definition model without semantic checks.
///
/// # Errors
/// Returns [`ScriptError::Parse`] with the line and column of the first syntax error.
pub fn parse_knowledge_base(source: &str) -> Result<KnowledgeBaseDef, ScriptError> {
    let mut pairs = KbParser::parse(Rule::program, source)?;
    let program = pairs.next().ok_or(ScriptError::Shape("expected program"))?;

    let mut kb = KnowledgeBaseDef::default();
    for stmt in program.into_inner() {
        match stmt.as_rule() {
            Rule::name_decl => {
                let lit = stmt
                    .into_inner()
                    .find(|p| p.as_rule() == Rule::string)
                    .ok_or(ScriptError::Shape("name without string"))?;
                kb.id = helpers::unquote(lit)?;
            },
            Rule::type_decl => kb.types.push(parse_type_pair(stmt)?),
            Rule::predicate_decl => kb.predicates.push(parse_predicate_pair(stmt)?),
            Rule::rule_decl => kb.rules.push(parse_rule_pair(stmt)?),
            Rule::constraint_decl => kb.constraints.push(parse_constraint_pair(stmt)?),
            Rule::inverse_decl => kb.inverses.push(parse_inverse_pair(stmt)?),
            Rule::hint_decl => kb.hints.push(parse_hint_pair(stmt)?),
            Rule::EOI => {},
            _ => return Err(ScriptError::Shape("unexpected statement")),
        }
    }
    Ok(kb)
}

/// Parse and validate a knowledge base.
///
/// # Errors
/// Returns a parse error, or [`ScriptError::Invalid`] listing every semantic problem found.
pub fn compile_knowledge_base(source: &str) -> Result<KnowledgeBaseDef, ScriptError> {
    let kb = parse_knowledge_base(source)?;
    let errors = fable_data::validate_knowledge_base(&kb);
    if errors.is_empty() {
        Ok(kb)
    } else {
        Err(ScriptError::Invalid(errors))
    }
}

/// Render a compiled knowledge base as pretty RON.
///
/// # Errors
/// Returns an error if serialisation fails.
pub fn compile_to_ron(kb: &KnowledgeBaseDef) -> Result<String, ScriptError> {
    let pretty = ron::ser::PrettyConfig::new().struct_names(false);
    ron::ser::to_string_pretty(kb, pretty).map_err(ScriptError::from)
}
