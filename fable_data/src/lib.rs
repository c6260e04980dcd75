//! Shared data model for Fable game records and knowledge bases.

pub mod defs;
pub mod validate;

pub use defs::*;
pub use validate::{ValidationError, template_slots, validate_game, validate_knowledge_base};
