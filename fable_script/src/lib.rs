//! fable_script: the knowledge-base language for Fable.
//!
//! A knowledge base declares the type hierarchy, predicate signatures,
//! transition rules (with command templates), constraints, inverse pairs
//! and surface hints that the engine reasons over:
//!
//! - `name "core";`
//! - `type c : t;`
//! - `predicate open(c);`
//! - `rule open/c :: $at(P, r) & $at(c, r) & closed(c) -> open(c) => "open {c}";`
//! - `observe rule look :: $at(P, r) -> => "look";`
//! - `constraint c/open-closed :: open(c) & closed(c);`
//! - `inverse open/c :: close/c;`
//! - `hint c "container";`
//!
//! `$` marks a fact the rule preserves. Placeholder types are inferred from
//! the name with trailing primes removed (`r'` is an `r`) unless written as
//! `name:type`.

mod parser;
pub use parser::{ScriptError, compile_knowledge_base, compile_to_ron, parse_knowledge_base};
