use thiserror::Error;

/// Errors the engine hands back to the transport layer. Both are surfaced to
/// the user as a prompt to send /start again; neither is fatal.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QuizError {
    #[error("unknown level or topic: {0}")]
    UnknownLevel(String),

    #[error("no active quiz session")]
    SessionNotFound,
}

/// The rendering layer could not deliver an effect (message already gone,
/// network hiccup). Logged by the engine and swallowed; a state transition
/// never fails because of cosmetics.
#[derive(Debug, Error, Clone)]
#[error("presentation failure: {0}")]
pub struct PresentationFailure(pub String);

/// Question data could not be loaded. Only possible at startup.
#[derive(Debug, Error)]
pub enum BankError {
    #[error("failed to read question file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse question file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("collection {0:?} has no usable questions")]
    EmptyCollection(String),
}
