use thiserror::Error;

#[derive(Error, Debug)]
pub enum FixwiseError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Article slug already exists")]
    SlugConflict,

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
