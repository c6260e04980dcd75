//! Logic substrate: types, terms, rules and the indexed fact store.

mod rule;
mod state;
mod term;
mod types;

pub use rule::{Action, Rule};
pub use state::{State, fixed_mapping};
pub use term::{FreshNames, Mapping, Placeholder, Predicate, Proposition, Signature, Variable};
pub use types::TypeHierarchy;
