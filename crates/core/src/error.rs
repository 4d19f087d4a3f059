use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error("story validation failed: {0}")]
    #[diagnostic(code("sn.invalid_story"))]
    InvalidStory(String),
    #[error("scene '{0}' not found")]
    #[diagnostic(code("sn.scene_not_found"))]
    SceneNotFound(String),
    #[error("choice index {index} out of range for scene '{scene}'")]
    #[diagnostic(code("sn.invalid_choice"))]
    InvalidChoice { scene: String, index: usize },
    #[error("serialization error: {message}")]
    #[diagnostic(code("sn.serialization"))]
    Serialization {
        message: String,
        #[source_code]
        src: String,
        #[label("here")]
        span: SourceSpan,
    },
    #[error("binary format error: {0}")]
    #[diagnostic(code("sn.binary_format"))]
    BinaryFormat(String),
    #[error("persistence error: {0}")]
    #[diagnostic(code("sn.persistence"))]
    Persistence(String),
    #[error("import payload rejected: {0}")]
    #[diagnostic(code("sn.invalid_import"))]
    InvalidImport(String),
}
