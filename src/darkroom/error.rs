use thiserror::Error;

use crate::pipeline::PipelineError;

#[derive(Debug, Error)]
pub enum DarkroomError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Invalid path")]
    InvalidPath,

    #[error("Not found")]
    NotFound,
}
