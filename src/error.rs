use thiserror::Error;

#[derive(Error, Debug)]
pub enum GameError {
    #[error("no words left in the vocabulary")]
    VocabularyExhausted,

    #[error("unknown vocabulary: {0}")]
    UnknownVocabulary(String),

    #[error("invalid vocabulary file: {0}")]
    InvalidVocabulary(#[from] serde_json::Error),

    #[error("cannot allocate a {0}x{1} canvas")]
    CanvasSize(u32, u32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
