use thiserror::Error;

/// Errors raised at the edges of the pipeline: parsing user text, loading
/// settings and opening devices. The running pipeline itself never fails.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid note name `{0}`")]
    InvalidNote(String),

    #[error("invalid chord symbol `{0}`")]
    InvalidChordSymbol(String),

    #[error("unknown instrument type `{0}`")]
    UnknownInstrument(String),

    #[error("unknown effect type `{0}`")]
    UnknownEffect(String),

    #[error("{0}")]
    InvalidCommand(String),

    #[error("MIDI error: {0}")]
    Midi(String),

    #[error("audio output error: {0}")]
    Audio(String),

    #[error("could not determine config directory")]
    NoConfigDir,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings error: {0}")]
    Settings(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
