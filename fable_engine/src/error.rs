//! Error types for the logic engine.

use thiserror::Error;

/// Errors surfaced by the engine. Only [`EngineError::InvalidCommand`] is recovered locally
/// (by the runtime environment); everything else propagates to the caller.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("knowledge base parse error at {line}:{col}: {message}")]
    KnowledgeBase { line: usize, col: usize, message: String },
    #[error("invalid knowledge base: {0}")]
    InvalidKnowledgeBase(String),
    #[error("unknown type '{0}'")]
    UnknownType(String),
    #[error("unknown rule '{0}'")]
    UnknownRule(String),
    #[error("invalid fact {fact}: {reason}")]
    InvalidFact { fact: String, reason: String },
    #[error("placeholder '{placeholder}' of rule '{rule}' is not bound")]
    UnboundPlaceholder { rule: String, placeholder: String },
    #[error("no free exit in room '{room}' to connect '{target}'")]
    NoFreeExit { room: String, target: String },
    #[error("quest generation failed: {0}")]
    QuestGeneration(String),
    #[error("invalid command '{0}'")]
    InvalidCommand(String),
    #[error("game is not running (call reset first)")]
    GameNotRunning,
    #[error("invalid world: {0}")]
    InvalidWorld(String),
    #[error("invalid quest: {0}")]
    InvalidQuest(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl From<fable_script::ScriptError> for EngineError {
    fn from(err: fable_script::ScriptError) -> Self {
        match err.position() {
            Some((line, col)) => EngineError::KnowledgeBase {
                line,
                col,
                message: err.to_string(),
            },
            None => EngineError::InvalidKnowledgeBase(err.to_string()),
        }
    }
}
