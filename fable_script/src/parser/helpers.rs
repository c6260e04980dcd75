use pest::iterators::Pair;

use fable_data::ValidationError;

use super::{Rule, ScriptError};

/// Decode a `string` pair, handling the usual backslash escapes.
pub(super) fn unquote(pair: Pair<'_, Rule>) -> Result<String, ScriptError> {
    let inner = pair.into_inner().next().ok_or(ScriptError::Shape("string without body"))?;
    let mut out = String::new();
    let mut escape = false;
    for ch in inner.as_str().chars() {
        if escape {
            match ch {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                '"' => out.push('"'),
                '\\' => out.push('\\'),
                other => {
                    out.push('\\');
                    out.push(other);
                },
            }
            escape = false;
        } else if ch == '\\' {
            escape = true;
        } else {
            out.push(ch);
        }
    }
    Ok(out)
}

/// Type of a placeholder written without an explicit `name:type`: the name minus trailing primes.
pub(super) fn inferred_type(name: &str) -> &str {
    name.trim_end_matches('\'')
}

pub(super) fn render_errors(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primes_are_stripped() {
        assert_eq!(inferred_type("r''"), "r");
        assert_eq!(inferred_type("k"), "k");
    }
}
